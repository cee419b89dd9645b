use std::collections::HashMap;

use tracing::debug;

use crate::ast::{Expr, ExprId, FunctionDef, Program, Stmt};
use crate::diagnostics::Diagnostics;
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionContext {
    None,
    Function,
    Method,
    Initializer,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassContext {
    None,
    Class,
    Subclass,
}

/// State of one name in a lexical scope. Synthetic bindings (`this`,
/// `super`) carry no token and are exempt from the unused-variable check.
struct Binding {
    token: Option<Token>,
    defined: bool,
    used: bool,
}

/// Static resolution pass: walks the AST once, assigns every local
/// reference its scope depth, and surfaces the placement errors the
/// evaluator relies on never seeing.
///
/// The pass always runs to completion so a single run reports every
/// static problem in the chunk.
pub struct Resolver<'d> {
    scopes: Vec<HashMap<String, Binding>>,
    locals: &'d mut HashMap<ExprId, usize>,
    diagnostics: &'d mut Diagnostics,
    current_function: FunctionContext,
    current_class: ClassContext,
    loop_depth: usize,
}

impl<'d> Resolver<'d> {
    pub fn new(
        diagnostics: &'d mut Diagnostics,
        locals: &'d mut HashMap<ExprId, usize>,
    ) -> Self {
        Self {
            scopes: Vec::new(),
            locals,
            diagnostics,
            current_function: FunctionContext::None,
            current_class: ClassContext::None,
            loop_depth: 0,
        }
    }

    pub fn resolve_program(&mut self, program: &Program) {
        for statement in &program.statements {
            self.resolve_stmt(statement);
        }
        debug!(locals = self.locals.len(), "resolution finished");
    }

    fn resolve_stmt(&mut self, statement: &Stmt) {
        match statement {
            Stmt::Expression(expr) | Stmt::Print(expr) => self.resolve_expr(expr),
            Stmt::Var { name, init } => {
                self.declare(name);
                if let Some(init) = init {
                    self.resolve_expr(init);
                }
                self.define(&name.lexeme);
            }
            Stmt::Block(statements) => {
                self.begin_scope();
                for statement in statements {
                    self.resolve_stmt(statement);
                }
                self.end_scope();
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(cond);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::Loop {
                init,
                cond,
                update,
                body,
            } => {
                // The loop owns one scope covering init, condition, update
                // and body; the evaluator opens the matching frame.
                self.begin_scope();
                if let Some(init) = init {
                    self.resolve_stmt(init);
                }
                self.resolve_expr(cond);
                if let Some(update) = update {
                    self.resolve_expr(update);
                }
                self.loop_depth += 1;
                self.resolve_stmt(body);
                self.loop_depth -= 1;
                self.end_scope();
            }
            Stmt::Break(keyword) | Stmt::Continue(keyword) => {
                if self.loop_depth == 0 {
                    self.diagnostics
                        .error(keyword.line, "Cannot break or continue outside of a loop");
                }
            }
            Stmt::Function(def) => {
                if let Some(name) = &def.name {
                    self.declare(name);
                    self.define(&name.lexeme);
                }
                self.resolve_function(def, FunctionContext::Function);
            }
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionContext::None {
                    self.diagnostics
                        .error(keyword.line, "Cannot return from top-level code");
                }
                if let Some(value) = value {
                    if self.current_function == FunctionContext::Initializer {
                        self.diagnostics
                            .error(keyword.line, "Cannot return a value from an initializer");
                    }
                    self.resolve_expr(value);
                }
            }
            Stmt::Class {
                name,
                superclass,
                methods,
                statics,
            } => self.resolve_class(name, superclass.as_ref(), methods, statics),
        }
    }

    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[std::rc::Rc<FunctionDef>],
        statics: &[std::rc::Rc<FunctionDef>],
    ) {
        let enclosing_class = self.current_class;
        self.current_class = ClassContext::Class;

        self.declare(name);
        self.define(&name.lexeme);

        if let Some(superclass) = superclass {
            if let Expr::Variable {
                name: super_name, ..
            } = superclass
                && super_name.lexeme == name.lexeme
            {
                self.diagnostics
                    .error(super_name.line, "A class cannot inherit from itself");
            }
            self.resolve_expr(superclass);
            self.current_class = ClassContext::Subclass;
            self.begin_scope();
            self.define_synthetic("super");
        }

        // Static methods are plain functions: no `this` frame, but they do
        // close over the `super` scope.
        for def in statics {
            self.resolve_function(def, FunctionContext::Static);
        }

        self.begin_scope();
        self.define_synthetic("this");
        for def in methods {
            let context = if def.name.as_ref().is_some_and(|n| n.lexeme == "init") {
                FunctionContext::Initializer
            } else {
                FunctionContext::Method
            };
            self.resolve_function(def, context);
        }
        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }
        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, def: &FunctionDef, context: FunctionContext) {
        let enclosing_function = std::mem::replace(&mut self.current_function, context);
        // A function body is never lexically inside an outer loop.
        let enclosing_loop_depth = std::mem::take(&mut self.loop_depth);

        self.begin_scope();
        if let Some(params) = &def.params {
            for param in params {
                self.declare(param);
                self.define(&param.lexeme);
            }
        }
        for statement in &def.body {
            self.resolve_stmt(statement);
        }
        self.end_scope();

        self.loop_depth = enclosing_loop_depth;
        self.current_function = enclosing_function;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Unary { right, .. } => self.resolve_expr(right),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Grouping(inner) => self.resolve_expr(inner),
            Expr::Variable { id, name } => {
                if let Some(scope) = self.scopes.last()
                    && scope
                        .get(&name.lexeme)
                        .is_some_and(|binding| !binding.defined)
                {
                    self.diagnostics.error(
                        name.line,
                        "Cannot read local variable in its own initializer",
                    );
                }
                self.resolve_local(*id, name, true);
            }
            Expr::Assign { id, name, value } => {
                self.resolve_expr(value);
                self.resolve_local(*id, name, false);
            }
            Expr::Call { callee, args, .. } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            Expr::Function(def) => self.resolve_function(def, FunctionContext::Function),
            Expr::Get { object, .. } => self.resolve_expr(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::Delete { object, .. } => self.resolve_expr(object),
            Expr::This { id, keyword } => {
                if self.current_class == ClassContext::None {
                    self.diagnostics
                        .error(keyword.line, "Cannot use 'this' outside of a class");
                    return;
                }
                self.resolve_local(*id, keyword, true);
            }
            Expr::Super { id, keyword, .. } => {
                match self.current_class {
                    ClassContext::None => {
                        self.diagnostics
                            .error(keyword.line, "Cannot use 'super' outside of a class");
                        return;
                    }
                    ClassContext::Class => {
                        self.diagnostics.error(
                            keyword.line,
                            "Cannot use 'super' in a class with no superclass",
                        );
                        return;
                    }
                    ClassContext::Subclass => {}
                }
                self.resolve_local(*id, keyword, true);
            }
            Expr::Comma(list) => {
                for expr in list {
                    self.resolve_expr(expr);
                }
            }
        }
    }

    /// Record the hop count from the reference to the defining scope.
    /// Names found in no local scope resolve through globals and get no
    /// entry.
    fn resolve_local(&mut self, id: ExprId, name: &Token, is_read: bool) {
        for (depth, scope) in self.scopes.iter_mut().rev().enumerate() {
            if let Some(binding) = scope.get_mut(&name.lexeme) {
                if is_read {
                    binding.used = true;
                }
                self.locals.insert(id, depth);
                return;
            }
        }
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.contains_key(&name.lexeme) {
            self.diagnostics.error(
                name.line,
                format!("Variable '{}' is already declared in this scope", name.lexeme),
            );
            return;
        }
        scope.insert(
            name.lexeme.clone(),
            Binding {
                token: Some(name.clone()),
                defined: false,
                used: false,
            },
        );
    }

    fn define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut()
            && let Some(binding) = scope.get_mut(name)
        {
            binding.defined = true;
        }
    }

    fn define_synthetic(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name.to_string(),
                Binding {
                    token: None,
                    defined: true,
                    used: false,
                },
            );
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pop the innermost scope and warn for every declared-but-never-read
    /// name, parameters included.
    fn end_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        let mut unused: Vec<&Token> = scope
            .values()
            .filter(|binding| !binding.used)
            .filter_map(|binding| binding.token.as_ref())
            .collect();
        unused.sort_by_key(|token| token.line);
        for token in unused {
            self.diagnostics
                .warning(token.line, format!("Unused variable '{}'", token.lexeme));
        }
    }
}

/// Resolve `program`, populating `locals` with scope depths keyed by
/// reference-expression id. Static errors accumulate in `diagnostics`.
pub fn resolve(
    program: &Program,
    diagnostics: &mut Diagnostics,
    locals: &mut HashMap<ExprId, usize>,
) {
    Resolver::new(diagnostics, locals).resolve_program(program);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};
    use indoc::indoc;

    fn check(source: &str) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let tokens = lexer::scan(source, &mut diags);
        let mut next_id = 0;
        let program = parser::parse(tokens, &mut diags, &mut next_id);
        assert!(!diags.had_error(), "parse failed: {:?}", diags);
        let mut locals = HashMap::new();
        resolve(&program, &mut diags, &mut locals);
        diags
    }

    fn first_message(source: &str) -> String {
        let diags = check(source);
        assert!(diags.had_error(), "expected a resolution error");
        diags.messages()[0].clone()
    }

    #[test]
    fn records_depths_for_nested_reads() {
        let mut diags = Diagnostics::new();
        let tokens = lexer::scan(
            indoc! {r#"
                var global = 1;
                {
                    var outer = 2;
                    {
                        print outer;
                        print global;
                    }
                }
            "#},
            &mut diags,
        );
        let mut next_id = 0;
        let program = parser::parse(tokens, &mut diags, &mut next_id);
        let mut locals = HashMap::new();
        resolve(&program, &mut diags, &mut locals);

        assert!(!diags.had_error());
        // `outer` resolves one hop up; `global` stays global (no entry).
        assert_eq!(locals.values().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn return_at_top_level_is_an_error() {
        assert!(first_message("return 1;").contains("Cannot return from top-level code"));
    }

    #[test]
    fn returning_a_value_from_init_is_an_error() {
        let message = first_message(indoc! {r#"
            class A {
                init() { return 1; }
            }
        "#});
        assert!(message.contains("Cannot return a value from an initializer"));
    }

    #[test]
    fn bare_return_from_init_is_allowed() {
        let diags = check(indoc! {r#"
            class A {
                init() { return; }
            }
        "#});
        assert!(!diags.had_error());
    }

    #[test]
    fn break_and_continue_share_a_diagnostic_outside_loops() {
        assert!(
            first_message("break;").contains("Cannot break or continue outside of a loop")
        );
        assert!(
            first_message("continue;").contains("Cannot break or continue outside of a loop")
        );
        // A function body severs the lexical loop context.
        assert!(first_message("while (true) { fun f() { break; } f(); }")
            .contains("Cannot break or continue outside of a loop"));
    }

    #[test]
    fn this_and_super_placement_checks() {
        assert!(first_message("print this;").contains("Cannot use 'this' outside of a class"));
        assert!(
            first_message("fun f() { return super.x; } f();")
                .contains("Cannot use 'super' outside of a class")
        );
        let message = first_message(indoc! {r#"
            class A {
                m() { return super.m; }
            }
            A().m();
        "#});
        assert!(message.contains("Cannot use 'super' in a class with no superclass"));
    }

    #[test]
    fn redeclaration_in_the_same_scope_is_an_error() {
        let message = first_message("{ var x = 1; var x = 2; print x; }");
        assert!(message.contains("Variable 'x' is already declared in this scope"));
    }

    #[test]
    fn reading_a_local_in_its_own_initializer_is_an_error() {
        let message = first_message("var x = 1; { var x = x; print x; }");
        assert!(message.contains("Cannot read local variable in its own initializer"));
    }

    #[test]
    fn a_class_cannot_inherit_from_itself() {
        assert!(first_message("class A < A {}").contains("A class cannot inherit from itself"));
    }

    #[test]
    fn unused_locals_warn_without_setting_the_error_flag() {
        let diags = check("{ var idle = 1; }");
        assert!(!diags.had_error());
        assert!(diags.messages()[0].contains("Warning: Unused variable 'idle'"));
    }

    #[test]
    fn unused_parameters_warn_too() {
        let diags = check("fun f(ghost) { return 1; } f(2);");
        assert!(!diags.had_error());
        assert!(diags.messages()[0].contains("Warning: Unused variable 'ghost'"));
    }

    #[test]
    fn static_methods_may_use_super() {
        let diags = check(indoc! {r#"
            class A {
                static test() { return 1; }
            }
            class B < A {
                static test() { return super.test(); }
            }
            B.test();
        "#});
        assert!(!diags.had_error());
    }
}
