//! Public API to drive the interpreter.
//!
//! One [`Interpreter`] owns the globals frame, the resolver's depth table,
//! and the reference-id counter, so REPL chunks can keep defining and
//! calling into each other while every chunk runs the full
//! lex -> parse -> resolve -> evaluate pipeline with the short-circuit
//! rule between stages.

use std::collections::HashMap;
use std::io::{self, Write};

use tracing::debug;

use crate::ast::ExprId;
use crate::builtins;
use crate::diagnostics::Diagnostics;
use crate::lexer;
use crate::parser;
use crate::resolver;
use crate::runtime::callable::NativeFunction;
use crate::runtime::class::LoxClass;
use crate::runtime::environment::{EnvRef, Environment};
use crate::runtime::value::Value;

mod evaluator;

use evaluator::Evaluator;

/// A method on an embedder-registered native class. The host callable
/// receives the receiver and the evaluated arguments, and is invoked
/// exactly once per call.
pub struct NativeMethodDef {
    pub name: String,
    pub arity: usize,
    pub is_getter: bool,
    pub callback: Box<dyn Fn(Value, &[Value]) -> Result<Value, String>>,
}

/// An embedder-registered native class: methods (one may be named `init`),
/// plus plain static members.
pub struct NativeClassDef {
    pub name: String,
    pub methods: Vec<NativeMethodDef>,
    pub statics: Vec<(String, Value)>,
}

/// Tree-walk interpreter with persistent globals.
///
/// # Example
///
/// Define a function in one chunk, then call it from later chunks:
///
/// ```
/// use lox::interpreter::Interpreter;
///
/// let mut output: Vec<u8> = Vec::new();
/// let mut interp = Interpreter::new(&mut output);
///
/// interp.run("fun max(x, y) { if (x > y) return x; return y; }");
/// interp.run("print max(10, 20);");
/// interp.run("print max(5, 4);");
///
/// assert_eq!(output, b"20\n5\n");
/// ```
pub struct Interpreter<W: Write> {
    out: W,
    sink: Box<dyn Write>,
    globals: EnvRef,
    locals: HashMap<ExprId, usize>,
    next_id: u32,
}

impl<W: Write> Interpreter<W> {
    /// Interpreter printing to `out` and reporting diagnostics on the
    /// process's standard error.
    pub fn new(out: W) -> Self {
        Self::with_diagnostic_sink(out, Box::new(io::stderr()))
    }

    pub fn with_diagnostic_sink(out: W, sink: Box<dyn Write>) -> Self {
        let globals = Environment::new_global();
        builtins::install(&globals);
        Self {
            out,
            sink,
            globals,
            locals: HashMap::new(),
            next_id: 0,
        }
    }

    /// Run one chunk of source. Diagnostics are flushed to the sink before
    /// returning; the return value is the chunk's `hadError` flag.
    pub fn run(&mut self, source: &str) -> bool {
        let mut diagnostics = Diagnostics::new();
        if let Some(program) = self.front_end(source, &mut diagnostics) {
            self.back_end(&program, &mut diagnostics);
        }
        self.finish(diagnostics)
    }

    /// REPL entry point. If the raw chunk fails to parse and does not end
    /// with `;` or `}`, it is retried wrapped as `print <chunk>;`. When the
    /// retry fails to parse too, the original diagnostics are reported,
    /// not the wrapped form's.
    pub fn run_repl_line(&mut self, source: &str) -> bool {
        let mut diagnostics = Diagnostics::new();
        if let Some(program) = self.front_end(source, &mut diagnostics) {
            self.back_end(&program, &mut diagnostics);
            return self.finish(diagnostics);
        }

        let trimmed = source.trim_end();
        if trimmed.ends_with(';') || trimmed.ends_with('}') {
            return self.finish(diagnostics);
        }

        debug!("retrying chunk in print-wrapped form");
        let wrapped = format!("print {trimmed};");
        let mut retry = Diagnostics::new();
        match self.front_end(&wrapped, &mut retry) {
            Some(program) => {
                self.back_end(&program, &mut retry);
                self.finish(retry)
            }
            None => self.finish(diagnostics),
        }
    }

    fn front_end(&mut self, source: &str, diagnostics: &mut Diagnostics) -> Option<crate::ast::Program> {
        let tokens = lexer::scan(source, diagnostics);
        if diagnostics.had_error() {
            return None;
        }
        debug!(tokens = tokens.len(), "lexed");
        let program = parser::parse(tokens, diagnostics, &mut self.next_id);
        if diagnostics.had_error() {
            return None;
        }
        Some(program)
    }

    fn back_end(&mut self, program: &crate::ast::Program, diagnostics: &mut Diagnostics) {
        resolver::resolve(program, diagnostics, &mut self.locals);
        if diagnostics.had_error() {
            return;
        }
        let mut evaluator = Evaluator::new(&mut self.out, self.globals.clone(), &self.locals);
        if let Err(error) = evaluator.interpret(program) {
            diagnostics.runtime_error(&error);
        }
    }

    fn finish(&mut self, mut diagnostics: Diagnostics) -> bool {
        diagnostics.flush_to(self.sink.as_mut());
        diagnostics.had_error()
    }

    /// Direct access to the globals frame.
    pub fn globals(&self) -> EnvRef {
        self.globals.clone()
    }

    /// Register a host function under `name`. The callable receives the
    /// evaluated arguments and returns a value or an error message.
    pub fn define_native(
        &mut self,
        name: &str,
        arity: usize,
        callback: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) {
        let native = NativeFunction::function(name, arity, callback);
        self.globals
            .borrow_mut()
            .define(name, Some(Value::Native(native)));
    }

    /// Register a host class. A method named `init` becomes the
    /// constructor; getters are invoked implicitly on property reads.
    pub fn define_native_class(&mut self, def: NativeClassDef) {
        let mut methods = HashMap::new();
        for method in def.methods {
            let callback = method.callback;
            let native = NativeFunction::method(
                method.name.clone(),
                method.arity,
                method.is_getter,
                move |receiver, args| callback(receiver, args),
            );
            methods.insert(method.name, Value::Native(native));
        }
        let class = LoxClass::new(def.name.clone(), None, methods);
        for (name, value) in def.statics {
            class.set_static(name, value);
        }
        self.globals
            .borrow_mut()
            .define(def.name, Some(Value::Class(class)));
    }
}

impl<W: Write> std::fmt::Debug for Interpreter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("locals", &self.locals.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::SharedBuffer;
    use super::*;
    use indoc::indoc;

    fn interpret(source: &str) -> String {
        let errors = SharedBuffer::default();
        let mut output: Vec<u8> = Vec::new();
        let mut interp =
            Interpreter::with_diagnostic_sink(&mut output, Box::new(errors.clone()));
        let had_error = interp.run(source);
        assert!(
            !had_error,
            "unexpected diagnostics: {}",
            errors.contents()
        );
        drop(interp);
        String::from_utf8(output).expect("output is UTF-8")
    }

    fn interpret_error(source: &str) -> String {
        let errors = SharedBuffer::default();
        let mut output: Vec<u8> = Vec::new();
        let mut interp =
            Interpreter::with_diagnostic_sink(&mut output, Box::new(errors.clone()));
        let had_error = interp.run(source);
        assert!(had_error, "expected diagnostics");
        errors.contents()
    }

    #[test]
    fn arithmetic_and_stringify() {
        assert_eq!(interpret("print 1 + 2 * 3;"), "7\n");
        assert_eq!(interpret("print 7 / 2;"), "3.5\n");
        assert_eq!(interpret("print 7 % 4;"), "3\n");
        assert_eq!(interpret("print 2 ** 10;"), "1024\n");
        assert_eq!(interpret("print 2 ** 3 ** 2;"), "512\n");
        assert_eq!(interpret("print -(1 + 2);"), "-3\n");
        assert_eq!(interpret("print 'a' + \"b\";"), "ab\n");
    }

    #[test]
    fn equality_and_comparison() {
        assert_eq!(interpret("print nil == nil;"), "true\n");
        assert_eq!(interpret("print nil == false;"), "false\n");
        assert_eq!(interpret("print 1 == 1;"), "true\n");
        assert_eq!(interpret("print 'a' == 'a';"), "true\n");
        assert_eq!(interpret("print 1 <= 2;"), "true\n");
        assert_eq!(interpret("print !nil;"), "true\n");
        assert_eq!(interpret("print !0;"), "false\n");
    }

    #[test]
    fn logical_operators_return_their_operands() {
        assert_eq!(interpret("print 1 or 2;"), "1\n");
        assert_eq!(interpret("print nil or 'fallback';"), "fallback\n");
        assert_eq!(interpret("print 1 and 2;"), "2\n");
        assert_eq!(interpret("print false and 2;"), "false\n");
    }

    #[test]
    fn comma_yields_the_rightmost_operand() {
        assert_eq!(interpret("print (1, 2, 3);"), "3\n");
        assert_eq!(
            interpret("var log = ''; var x = (log = log + 'a', log = log + 'b', 9); print log; print x;"),
            "ab\n9\n"
        );
    }

    #[test]
    fn uninitialized_variables_are_distinct_from_nil() {
        assert_eq!(interpret("var x = nil; print x;"), "nil\n");
        let rendered = interpret_error("var x; print x;");
        assert!(rendered.contains("Uninitialized variable 'x'"));
    }

    #[test]
    fn closures_retain_captures() {
        let source = indoc! {r#"
            fun make() { var i = 0; fun inc() { i = i + 1; return i; } return inc; }
            var c = make(); print c(); print c(); print c();
        "#};
        assert_eq!(interpret(source), "1\n2\n3\n");
    }

    #[test]
    fn getter_invocation() {
        let source = indoc! {r#"
            class A { init() { this.v = 5; } large { return this.v > 10; } }
            var a = A(); print a.large; a.v = 20; print a.large;
        "#};
        assert_eq!(interpret(source), "false\ntrue\n");
    }

    #[test]
    fn super_dispatch_across_static_methods() {
        let source = indoc! {r#"
            class A { static test() { print "test"; } }
            class B < A { static test() { super.test(); } }
            B.test();
        "#};
        assert_eq!(interpret(source), "test\n");
    }

    #[test]
    fn for_with_continue_still_runs_update() {
        let source = indoc! {r#"
            for (var i = 0; i < 5; i = i + 1) { if (i == 2) continue; if (i == 4) break; print i; }
        "#};
        assert_eq!(interpret(source), "0\n1\n3\n");
    }

    #[test]
    fn delete_returns_a_boolean_and_removes_fields() {
        let source = indoc! {r#"
            class O {} var o = O(); o.a = 10; print o.a; print delete o.a;
        "#};
        assert_eq!(interpret(source), "10\ntrue\n");

        let rendered = interpret_error(indoc! {r#"
            class O {} var o = O(); o.a = 10; print delete o.a; print o.a;
        "#});
        assert!(rendered.contains("Undefined property 'a'"));
        assert_eq!(interpret("class O {} print delete O().missing;"), "false\n");
    }

    #[test]
    fn repl_auto_print_fallback() {
        let errors = SharedBuffer::default();
        let mut output: Vec<u8> = Vec::new();
        let mut interp =
            Interpreter::with_diagnostic_sink(&mut output, Box::new(errors.clone()));

        assert!(!interp.run_repl_line("10 + 10"));
        let rendered = errors.contents();
        assert!(rendered.is_empty(), "unexpected diagnostics: {rendered}");

        assert!(interp.run_repl_line("a"));
        assert!(errors.contents().contains("Undefined variable 'a'"));

        drop(interp);
        assert_eq!(String::from_utf8(output).unwrap(), "20\n");
    }

    #[test]
    fn repl_reports_original_errors_when_the_retry_fails() {
        let errors = SharedBuffer::default();
        let mut output: Vec<u8> = Vec::new();
        let mut interp =
            Interpreter::with_diagnostic_sink(&mut output, Box::new(errors.clone()));

        assert!(interp.run_repl_line("var x = 1"));
        let rendered = errors.contents();
        assert!(rendered.contains("Expected ';' after variable declaration"));
        assert!(!rendered.contains("print"));
    }

    #[test]
    fn repl_does_not_wrap_chunks_ending_in_semicolon_or_brace() {
        let errors = SharedBuffer::default();
        let mut output: Vec<u8> = Vec::new();
        let mut interp =
            Interpreter::with_diagnostic_sink(&mut output, Box::new(errors.clone()));

        assert!(interp.run_repl_line("print 1; print;"));
        assert!(errors.contents().contains("Expected expression"));
    }

    #[test]
    fn globals_persist_across_chunks() {
        let mut output: Vec<u8> = Vec::new();
        let mut interp = Interpreter::new(&mut output);
        assert!(!interp.run("var counter = 0; fun bump() { counter = counter + 1; return counter; }"));
        assert!(!interp.run("bump(); bump();"));
        assert!(!interp.run("print bump();"));
        drop(interp);
        assert_eq!(String::from_utf8(output).unwrap(), "3\n");
    }

    #[test]
    fn implicit_return_is_nil() {
        assert_eq!(interpret("fun f() {} print f();"), "nil\n");
        assert_eq!(interpret("fun g() { return; } print g();"), "nil\n");
    }

    #[test]
    fn method_binding_preserves_this_identity() {
        let source = indoc! {r#"
            class Counter {
                init() { this.n = 0; }
                bump() { this.n = this.n + 1; return this.n; }
            }
            var c = Counter();
            var bump = c.bump;
            bump(); bump();
            print c.n;
        "#};
        assert_eq!(interpret(source), "2\n");
    }

    #[test]
    fn init_returns_the_instance_regardless_of_body() {
        let source = indoc! {r#"
            class A { init() { this.v = 1; return; } }
            var a = A();
            print a.v;
            print a.init == nil;
        "#};
        let rendered = interpret_error(source);
        // `init` is extracted from the method map, so reading it is an
        // undefined property; the first prints still happened.
        assert!(rendered.contains("Undefined property 'init'"));

        let source = indoc! {r#"
            class A { init() { this.v = 1; return; } }
            print A().v;
        "#};
        assert_eq!(interpret(source), "1\n");
    }

    #[test]
    fn inheritance_and_super_methods() {
        let source = indoc! {r#"
            class Base {
                greet() { return "base"; }
                describe() { return "I am " + this.greet(); }
            }
            class Derived < Base {
                greet() { return "derived via " + super.greet(); }
            }
            print Derived().describe();
        "#};
        assert_eq!(interpret(source), "I am derived via base\n");
    }

    #[test]
    fn static_members_inherit_and_shadow() {
        let source = indoc! {r#"
            class A { static tag() { return "A"; } }
            class B < A {}
            print B.tag();
            B.tag = fun () { return "patched"; };
            print B.tag();
            print A.tag();
        "#};
        assert_eq!(interpret(source), "A\npatched\nA\n");
    }

    #[test]
    fn class_field_writes_and_deletes_are_local() {
        let source = indoc! {r#"
            class A {}
            A.shared = 1;
            class B < A {}
            print B.shared;
            B.shared = 2;
            print B.shared;
            print A.shared;
            print delete B.shared;
            print B.shared;
        "#};
        assert_eq!(interpret(source), "1\n2\n1\ntrue\n1\n");
    }

    #[test]
    fn loop_scoping_keeps_init_variables_out_of_the_enclosing_scope() {
        let rendered = interpret_error(indoc! {r#"
            for (var i = 0; i < 1; i = i + 1) {}
            print i;
        "#});
        assert!(rendered.contains("Undefined variable 'i'"));
    }

    #[test]
    fn while_loops_support_break_and_continue() {
        let source = indoc! {r#"
            var i = 0;
            while (true) {
                i = i + 1;
                if (i == 2) continue;
                if (i > 3) break;
                print i;
            }
        "#};
        assert_eq!(interpret(source), "1\n3\n");
    }

    #[test]
    fn runtime_error_messages_are_verbatim() {
        assert!(interpret_error("print nil + nil;")
            .contains("Operands must both be a number or a string"));
        assert!(interpret_error("print 'a' + 1;")
            .contains("Operands must both be a number or a string"));
        assert!(interpret_error("print -'x';").contains("Operand must be a number"));
        assert!(interpret_error("print 1 < 'x';").contains("Operand must be a number"));
        assert!(interpret_error("var x = 1; x();").contains("Value is not callable"));
        assert!(interpret_error("fun f(a) {} f(1, 2);")
            .contains("Expected 1 args but got 2"));
        assert!(interpret_error("print (1).field;").contains("Value is not a class instance"));
        assert!(interpret_error("var notclass = 1; class A < notclass {}")
            .contains("Superclass must be a class"));
    }

    #[test]
    fn runtime_errors_render_the_line_and_call_stack() {
        let rendered = interpret_error(indoc! {r#"
            fun inner() { return missing; }
            fun outer() { return inner(); }
            outer();
        "#});
        assert!(rendered.starts_with("[line 1] Undefined variable 'missing'"));
        assert!(rendered.contains("at inner"));
        assert!(rendered.contains("at outer"));
    }

    #[test]
    fn execution_is_skipped_when_any_stage_reports() {
        let errors = SharedBuffer::default();
        let mut output: Vec<u8> = Vec::new();
        let mut interp =
            Interpreter::with_diagnostic_sink(&mut output, Box::new(errors.clone()));
        // Resolver error: nothing may print.
        assert!(interp.run("print 1; return 2;"));
        drop(interp);
        assert_eq!(String::from_utf8(output).unwrap(), "");
        assert!(errors.contents().contains("Cannot return from top-level code"));
    }

    #[test]
    fn builtin_type_time_and_str() {
        assert_eq!(
            interpret("print type(nil), type(true), type(1), type('s');"),
            "string\n"
        );
        assert_eq!(
            interpret(indoc! {r#"
                print type(nil);
                print type(false);
                print type(0);
                print type("");
                fun f() {} print type(f);
                print type(type);
                class A {} print type(A);
                print type(A());
            "#}),
            "nil\nboolean\nnumber\nstring\nfunc\nfunc\nclass\nobject\n"
        );
        assert_eq!(interpret("print str(1 + 2);"), "3\n");
        assert_eq!(interpret("print str(nil) + str(true);"), "niltrue\n");
        assert_eq!(interpret("print type(time());"), "number\n");
        assert_eq!(interpret("print time() > 0;"), "true\n");
    }

    #[test]
    fn stringify_of_functions_classes_and_instances() {
        assert_eq!(interpret("fun f() {} print f;"), "<fn f>\n");
        assert_eq!(interpret("print fun (x) { return x; };"), "<fn anonymous>\n");
        assert_eq!(interpret("print type;"), "<native fn type>\n");
        assert_eq!(interpret("class A {} print A;"), "<class A>\n");
        assert_eq!(
            interpret(indoc! {r#"
                class P {
                    init(x, y) { this.x = x; this.y = y; }
                    sum() { return this.x + this.y; }
                }
                print P(1, 2);
            "#}),
            "P { x: 1, y: 2, sum: <fn sum> }\n"
        );
    }

    #[test]
    fn native_functions_can_be_registered() {
        let mut output: Vec<u8> = Vec::new();
        let mut interp = Interpreter::new(&mut output);
        interp.define_native("double", 1, |args| match &args[0] {
            Value::Number(n) => Ok(Value::Number(n * 2.0)),
            other => Err(format!("cannot double a {}", other.type_tag())),
        });
        assert!(!interp.run("print double(21);"));
        drop(interp);
        assert_eq!(String::from_utf8(output).unwrap(), "42\n");
    }

    #[test]
    fn native_classes_invoke_methods_once_per_call() {
        use std::cell::Cell;
        use std::rc::Rc;

        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();

        let mut output: Vec<u8> = Vec::new();
        let mut interp = Interpreter::new(&mut output);
        interp.define_native_class(NativeClassDef {
            name: "Box".to_string(),
            methods: vec![
                NativeMethodDef {
                    name: "init".to_string(),
                    arity: 1,
                    is_getter: false,
                    callback: Box::new(|receiver, args| {
                        if let Value::Instance(instance) = &receiver {
                            instance.set_field("value", args[0].clone());
                        }
                        Ok(Value::Nil)
                    }),
                },
                NativeMethodDef {
                    name: "bump".to_string(),
                    arity: 0,
                    is_getter: false,
                    callback: Box::new(move |receiver, _args| {
                        seen.set(seen.get() + 1);
                        if let Value::Instance(instance) = &receiver {
                            if let Some(Value::Number(n)) = instance.get_field("value") {
                                instance.set_field("value", Value::Number(n + 1.0));
                            }
                        }
                        Ok(receiver.clone())
                    }),
                },
            ],
            statics: vec![("label".to_string(), Value::String("box".to_string()))],
        });

        assert!(!interp.run(indoc! {r#"
            var b = Box(41);
            b.bump();
            print b.value;
            print Box.label;
        "#}));
        drop(interp);
        assert_eq!(String::from_utf8(output).unwrap(), "42\nbox\n");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unused_variable_warnings_do_not_block_execution() {
        let errors = SharedBuffer::default();
        let mut output: Vec<u8> = Vec::new();
        let mut interp =
            Interpreter::with_diagnostic_sink(&mut output, Box::new(errors.clone()));
        assert!(!interp.run("{ var idle = 1; } print 'ran';"));
        drop(interp);
        assert_eq!(String::from_utf8(output).unwrap(), "ran\n");
        assert!(errors.contents().contains("Warning: Unused variable 'idle'"));
    }
}
