use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use tracing::trace;

use crate::ast::{Expr, ExprId, FunctionDef, LiteralValue, Program, Stmt};
use crate::runtime::callable::LoxFunction;
use crate::runtime::class::{LoxClass, LoxInstance};
use crate::runtime::environment::{EnvRef, Environment};
use crate::runtime::error::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::runtime::value::Value;
use crate::token::{Token, TokenKind};

/// Control-flow marker threaded through statement execution. Return,
/// break, and continue are ordinary values here, never errors, so they
/// cannot leak past the frame that must consume them.
pub(crate) enum Signal {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Stateful tree walker: one current-environment pointer, the globals
/// frame for name-addressed lookups, and the resolver's depth table.
pub(crate) struct Evaluator<'a, W: Write> {
    out: &'a mut W,
    env: EnvRef,
    globals: EnvRef,
    locals: &'a HashMap<ExprId, usize>,
}

impl<'a, W: Write> Evaluator<'a, W> {
    pub(crate) fn new(out: &'a mut W, globals: EnvRef, locals: &'a HashMap<ExprId, usize>) -> Self {
        Self {
            out,
            env: globals.clone(),
            globals,
            locals,
        }
    }

    pub(crate) fn interpret(&mut self, program: &Program) -> RuntimeResult<()> {
        for statement in &program.statements {
            // The resolver rejects top-level return/break/continue, so the
            // signal is always Normal here.
            self.exec_stmt(statement)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, statement: &Stmt) -> RuntimeResult<Signal> {
        match statement {
            Stmt::Expression(expr) => {
                self.eval_expr(expr)?;
                Ok(Signal::Normal)
            }
            Stmt::Print(expr) => {
                let value = self.eval_expr(expr)?;
                writeln!(self.out, "{}", value.stringify()).map_err(|error| {
                    RuntimeError::new(RuntimeErrorKind::Io(error.to_string()), 0)
                })?;
                Ok(Signal::Normal)
            }
            Stmt::Var { name, init } => {
                let value = match init {
                    Some(init) => Some(self.eval_expr(init)?),
                    None => None,
                };
                self.env.borrow_mut().define(name.lexeme.clone(), value);
                Ok(Signal::Normal)
            }
            Stmt::Block(statements) => {
                let frame = Environment::with_parent(self.env.clone());
                self.exec_block(statements, frame)
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval_expr(cond)?.is_truthy() {
                    self.exec_stmt(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch)
                } else {
                    Ok(Signal::Normal)
                }
            }
            Stmt::Loop {
                init,
                cond,
                update,
                body,
            } => {
                // The loop owns a fresh scope for init/cond/update/body,
                // mirroring the resolver.
                let previous = self.env.clone();
                self.env = Environment::with_parent(previous.clone());
                let result = self.run_loop(init.as_deref(), cond, update.as_ref(), body);
                self.env = previous;
                result
            }
            Stmt::Break(_) => Ok(Signal::Break),
            Stmt::Continue(_) => Ok(Signal::Continue),
            Stmt::Function(def) => {
                let function = LoxFunction::new(def.clone(), self.env.clone(), false);
                let name = def.name.as_ref().expect("function declarations are named");
                self.env
                    .borrow_mut()
                    .define(name.lexeme.clone(), Some(Value::Function(function)));
                Ok(Signal::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.eval_expr(value)?,
                    None => Value::Nil,
                };
                Ok(Signal::Return(value))
            }
            Stmt::Class {
                name,
                superclass,
                methods,
                statics,
            } => self.exec_class(name, superclass.as_ref(), methods, statics),
        }
    }

    fn exec_block(&mut self, statements: &[Stmt], frame: EnvRef) -> RuntimeResult<Signal> {
        let previous = std::mem::replace(&mut self.env, frame);
        let mut signal = Signal::Normal;
        for statement in statements {
            match self.exec_stmt(statement) {
                Ok(Signal::Normal) => {}
                Ok(other) => {
                    signal = other;
                    break;
                }
                Err(error) => {
                    self.env = previous;
                    return Err(error);
                }
            }
        }
        self.env = previous;
        Ok(signal)
    }

    fn run_loop(
        &mut self,
        init: Option<&Stmt>,
        cond: &Expr,
        update: Option<&Expr>,
        body: &Stmt,
    ) -> RuntimeResult<Signal> {
        if let Some(init) = init {
            self.exec_stmt(init)?;
        }
        loop {
            if !self.eval_expr(cond)?.is_truthy() {
                break;
            }
            match self.exec_stmt(body)? {
                // `continue` skips the rest of the body but still runs the
                // update below.
                Signal::Normal | Signal::Continue => {}
                Signal::Break => break,
                escape @ Signal::Return(_) => return Ok(escape),
            }
            if let Some(update) = update {
                self.eval_expr(update)?;
            }
        }
        Ok(Signal::Normal)
    }

    fn exec_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDef>],
        statics: &[Rc<FunctionDef>],
    ) -> RuntimeResult<Signal> {
        let parent = match superclass {
            Some(expr) => {
                let line = match expr {
                    Expr::Variable { name, .. } => name.line,
                    _ => name.line,
                };
                match self.eval_expr(expr)? {
                    Value::Class(class) => Some(class),
                    _ => {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::SuperclassNotClass,
                            line,
                        ));
                    }
                }
            }
            None => None,
        };

        // Declared first and bound to nil so method bodies can resolve the
        // class by name before the object exists.
        self.env
            .borrow_mut()
            .define(name.lexeme.clone(), Some(Value::Nil));

        let class_env = match &parent {
            Some(parent) => {
                let frame = Environment::with_parent(self.env.clone());
                frame
                    .borrow_mut()
                    .define("super", Some(Value::Class(parent.clone())));
                frame
            }
            None => self.env.clone(),
        };

        let mut method_map = HashMap::new();
        for def in methods {
            let method_name = def.name.as_ref().expect("class members are named");
            let is_initializer = method_name.lexeme == "init";
            let function = LoxFunction::new(def.clone(), class_env.clone(), is_initializer);
            method_map.insert(method_name.lexeme.clone(), Value::Function(function));
        }

        let class = LoxClass::new(name.lexeme.clone(), parent, method_map);
        for def in statics {
            let static_name = def.name.as_ref().expect("class members are named");
            let function = LoxFunction::new(def.clone(), class_env.clone(), false);
            class.set_static(static_name.lexeme.clone(), Value::Function(function));
        }

        self.env.borrow_mut().assign(name, Value::Class(class))?;
        Ok(Signal::Normal)
    }

    fn eval_expr(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Nil => Value::Nil,
                LiteralValue::Bool(b) => Value::Bool(*b),
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::String(s) => Value::String(s.clone()),
            }),
            Expr::Grouping(inner) => self.eval_expr(inner),
            Expr::Unary { op, right } => {
                let right = self.eval_expr(right)?;
                match op.kind {
                    TokenKind::Minus => {
                        let n = self.number_operand(&right, op.line)?;
                        Ok(Value::Number(-n))
                    }
                    _ => Ok(Value::Bool(!right.is_truthy())),
                }
            }
            Expr::Binary { left, op, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                self.eval_binary(&left, op, &right)
            }
            Expr::Logical { left, op, right } => {
                let left = self.eval_expr(left)?;
                // The operand itself flows through, not a coerced boolean.
                let short_circuits = match op.kind {
                    TokenKind::Or => left.is_truthy(),
                    _ => !left.is_truthy(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.eval_expr(right)
                }
            }
            Expr::Variable { id, name } => self.look_up(*id, name),
            Expr::Assign { id, name, value } => {
                let value = self.eval_expr(value)?;
                match self.locals.get(id) {
                    Some(&depth) => {
                        Environment::assign_at(&self.env, depth, name, value.clone())?;
                    }
                    None => {
                        self.globals.borrow_mut().assign(name, value.clone())?;
                    }
                }
                Ok(value)
            }
            Expr::Call {
                callee,
                paren,
                args,
            } => {
                let callee = self.eval_expr(callee)?;
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval_expr(arg)?);
                }
                self.call_value(callee, evaluated, paren.line)
            }
            Expr::Function(def) => Ok(Value::Function(LoxFunction::new(
                def.clone(),
                self.env.clone(),
                false,
            ))),
            Expr::Get { object, name } => {
                let object = self.eval_expr(object)?;
                self.get_property(object, name)
            }
            Expr::Set {
                object,
                name,
                value,
            } => {
                let object = self.eval_expr(object)?;
                let value = self.eval_expr(value)?;
                match &object {
                    Value::Instance(instance) => {
                        instance.set_field(name.lexeme.clone(), value.clone());
                        Ok(value)
                    }
                    Value::Class(class) => {
                        class.set_static(name.lexeme.clone(), value.clone());
                        Ok(value)
                    }
                    _ => Err(RuntimeError::new(
                        RuntimeErrorKind::NotAnInstance,
                        name.line,
                    )),
                }
            }
            Expr::Delete { object, name } => {
                let object = self.eval_expr(object)?;
                match &object {
                    Value::Instance(instance) => {
                        Ok(Value::Bool(instance.delete_field(&name.lexeme)))
                    }
                    Value::Class(class) => Ok(Value::Bool(class.delete_static(&name.lexeme))),
                    _ => Err(RuntimeError::new(
                        RuntimeErrorKind::NotAnInstance,
                        name.line,
                    )),
                }
            }
            Expr::This { id, keyword } => self.look_up(*id, keyword),
            Expr::Super {
                id,
                keyword,
                member,
            } => self.eval_super(*id, keyword, member),
            Expr::Comma(list) => {
                let mut result = Value::Nil;
                for expr in list {
                    result = self.eval_expr(expr)?;
                }
                Ok(result)
            }
        }
    }

    fn eval_binary(&mut self, left: &Value, op: &Token, right: &Value) -> RuntimeResult<Value> {
        match op.kind {
            TokenKind::Plus => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => {
                    Ok(Value::String(format!("{a}{b}")))
                }
                _ => Err(RuntimeError::new(
                    RuntimeErrorKind::OperandsNotAddable,
                    op.line,
                )),
            },
            TokenKind::EqualEqual => Ok(Value::Bool(left == right)),
            TokenKind::BangEqual => Ok(Value::Bool(left != right)),
            _ => {
                let a = self.number_operand(left, op.line)?;
                let b = self.number_operand(right, op.line)?;
                Ok(match op.kind {
                    TokenKind::Minus => Value::Number(a - b),
                    TokenKind::Star => Value::Number(a * b),
                    TokenKind::Slash => Value::Number(a / b),
                    TokenKind::Percent => Value::Number(a % b),
                    TokenKind::StarStar => Value::Number(a.powf(b)),
                    TokenKind::Less => Value::Bool(a < b),
                    TokenKind::LessEqual => Value::Bool(a <= b),
                    TokenKind::Greater => Value::Bool(a > b),
                    TokenKind::GreaterEqual => Value::Bool(a >= b),
                    _ => unreachable!("parser only produces binary operators"),
                })
            }
        }
    }

    fn number_operand(&self, value: &Value, line: usize) -> RuntimeResult<f64> {
        match value {
            Value::Number(n) => Ok(*n),
            _ => Err(RuntimeError::new(
                RuntimeErrorKind::OperandNotNumber,
                line,
            )),
        }
    }

    /// Resolve a reference expression: at the recorded depth when the
    /// resolver found a local, through the globals frame otherwise.
    fn look_up(&self, id: ExprId, name: &Token) -> RuntimeResult<Value> {
        match self.locals.get(&id) {
            Some(&depth) => Environment::get_at(&self.env, depth, name),
            None => self.globals.borrow().get(name),
        }
    }

    fn get_property(&mut self, object: Value, name: &Token) -> RuntimeResult<Value> {
        let resolved = match &object {
            Value::Instance(instance) => {
                if let Some(field) = instance.get_field(&name.lexeme) {
                    field
                } else if let Some(method) = instance.class().find_method(&name.lexeme) {
                    Self::bind_member(method, object.clone())
                } else {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::UndefinedProperty(name.lexeme.clone()),
                        name.line,
                    ));
                }
            }
            Value::Class(class) => match class.get_static(&name.lexeme) {
                Some(value) => value,
                None => {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::UndefinedProperty(name.lexeme.clone()),
                        name.line,
                    ));
                }
            },
            _ => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::NotAnInstance,
                    name.line,
                ));
            }
        };
        self.invoke_if_getter(resolved, name.line)
    }

    fn eval_super(&mut self, id: ExprId, keyword: &Token, member: &Token) -> RuntimeResult<Value> {
        let depth = *self
            .locals
            .get(&id)
            .expect("resolver records a depth for every 'super'");
        let superclass = match Environment::get_at(&self.env, depth, keyword)? {
            Value::Class(class) => class,
            _ => unreachable!("'super' frames only ever bind a class"),
        };

        // The `this` frame sits immediately inside the `super` frame; it is
        // absent in static-method contexts.
        let receiver = Environment::get_unchecked_at(&self.env, depth.saturating_sub(1), "this");
        let resolved = match receiver {
            Some(receiver) => match superclass.find_method(&member.lexeme) {
                Some(method) => Self::bind_member(method, receiver),
                None => {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::UndefinedProperty(member.lexeme.clone()),
                        member.line,
                    ));
                }
            },
            None => match superclass.get_static(&member.lexeme) {
                Some(value) => value,
                None => {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::UndefinedProperty(member.lexeme.clone()),
                        member.line,
                    ));
                }
            },
        };
        self.invoke_if_getter(resolved, member.line)
    }

    fn bind_member(method: Value, receiver: Value) -> Value {
        match method {
            Value::Function(function) => Value::Function(function.bind(receiver)),
            Value::Native(native) => Value::Native(native.bind(receiver)),
            other => other,
        }
    }

    /// Getters are invoked implicitly on property read and their result
    /// stands in for the property value.
    fn invoke_if_getter(&mut self, value: Value, line: usize) -> RuntimeResult<Value> {
        let is_getter = match &value {
            Value::Function(function) => function.is_getter(),
            Value::Native(native) => native.is_getter,
            _ => false,
        };
        if is_getter {
            self.call_value(value, Vec::new(), line)
        } else {
            Ok(value)
        }
    }

    fn call_value(&mut self, callee: Value, args: Vec<Value>, line: usize) -> RuntimeResult<Value> {
        match callee {
            Value::Function(function) => {
                self.check_arity(function.arity(), args.len(), line)?;
                self.call_function(&function, args)
            }
            Value::Native(native) => {
                self.check_arity(native.arity, args.len(), line)?;
                native.invoke(&args).map_err(|message| {
                    let mut error =
                        RuntimeError::new(RuntimeErrorKind::Native(message), line);
                    error.stack.push(native.name.clone());
                    error
                })
            }
            Value::Class(class) => {
                self.check_arity(class.arity(), args.len(), line)?;
                let instance = Value::Instance(LoxInstance::new(class.clone()));
                if let Some(init) = class.initializer() {
                    let bound = Self::bind_member(init.clone(), instance.clone());
                    self.call_value(bound, args, line)?;
                }
                Ok(instance)
            }
            _ => Err(RuntimeError::new(RuntimeErrorKind::NotCallable, line)),
        }
    }

    fn check_arity(&self, expected: usize, found: usize, line: usize) -> RuntimeResult<()> {
        if expected == found {
            Ok(())
        } else {
            Err(RuntimeError::new(
                RuntimeErrorKind::ArityMismatch { expected, found },
                line,
            ))
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<LoxFunction>,
        args: Vec<Value>,
    ) -> RuntimeResult<Value> {
        trace!(function = function.name(), "call");
        let frame = Environment::with_parent(function.closure.clone());
        if let Some(params) = &function.decl.params {
            for (param, arg) in params.iter().zip(args) {
                frame.borrow_mut().define(param.lexeme.clone(), Some(arg));
            }
        }

        let previous = std::mem::replace(&mut self.env, frame);
        let mut signal = Signal::Normal;
        for statement in &function.decl.body {
            match self.exec_stmt(statement) {
                Ok(Signal::Normal) => {}
                Ok(other) => {
                    signal = other;
                    break;
                }
                Err(mut error) => {
                    self.env = previous;
                    // Stack frames accumulate innermost-first while the
                    // error unwinds.
                    error.stack.push(function.name().to_string());
                    return Err(error);
                }
            }
        }
        self.env = previous;

        if function.is_initializer {
            // `init` always yields the constructed instance, whatever the
            // body did.
            return Ok(Environment::get_unchecked_at(&function.closure, 0, "this")
                .expect("initializer closures bind 'this'"));
        }
        match signal {
            Signal::Return(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }
}
