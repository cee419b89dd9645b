use std::fmt;
use std::rc::Rc;

use crate::ast::FunctionDef;
use crate::runtime::environment::{EnvRef, Environment};
use crate::runtime::value::Value;

/// A user function value: shared declaration plus the environment captured
/// at its point of creation. Methods named `init` are flagged so calls can
/// substitute the constructed instance for the return value.
pub struct LoxFunction {
    pub decl: Rc<FunctionDef>,
    pub closure: EnvRef,
    pub is_initializer: bool,
}

impl LoxFunction {
    pub fn new(decl: Rc<FunctionDef>, closure: EnvRef, is_initializer: bool) -> Rc<Self> {
        Rc::new(Self {
            decl,
            closure,
            is_initializer,
        })
    }

    pub fn arity(&self) -> usize {
        self.decl.arity()
    }

    pub fn is_getter(&self) -> bool {
        self.decl.is_getter()
    }

    pub fn name(&self) -> &str {
        self.decl
            .name
            .as_ref()
            .map_or("anonymous", |token| token.lexeme.as_str())
    }

    /// Wrap this function in a fresh frame where `this` is bound to the
    /// receiver. The binding frame sits between the call frame and the
    /// captured closure, so `this` resolves at the depth the resolver
    /// recorded.
    pub fn bind(&self, receiver: Value) -> Rc<LoxFunction> {
        let frame = Environment::with_parent(self.closure.clone());
        frame.borrow_mut().define("this", Some(receiver));
        LoxFunction::new(self.decl.clone(), frame, self.is_initializer)
    }
}

impl fmt::Debug for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoxFunction")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .finish()
    }
}

/// Host callable for free native functions.
pub type NativeCallback = Rc<dyn Fn(&[Value]) -> Result<Value, String>>;

/// Host callable for native methods; the first argument is the receiver.
pub type NativeMethodCallback = Rc<dyn Fn(Value, &[Value]) -> Result<Value, String>>;

pub enum NativeKind {
    Function(NativeCallback),
    /// A method as registered on a native class, not yet attached to an
    /// instance. Property access binds it before it can be called.
    Method(NativeMethodCallback),
    Bound {
        receiver: Value,
        method: NativeMethodCallback,
    },
}

/// An embedder-provided callable. Bound native methods hold their receiver
/// and invoke the host callable exactly once per call.
pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    pub is_getter: bool,
    pub kind: NativeKind,
}

impl NativeFunction {
    pub fn function(
        name: impl Into<String>,
        arity: usize,
        callback: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            arity,
            is_getter: false,
            kind: NativeKind::Function(Rc::new(callback)),
        })
    }

    pub fn method(
        name: impl Into<String>,
        arity: usize,
        is_getter: bool,
        callback: impl Fn(Value, &[Value]) -> Result<Value, String> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            arity,
            is_getter,
            kind: NativeKind::Method(Rc::new(callback)),
        })
    }

    /// Attach a receiver to an unbound native method. Already-bound and
    /// free natives are returned unchanged.
    pub fn bind(self: &Rc<Self>, receiver: Value) -> Rc<Self> {
        match &self.kind {
            NativeKind::Method(method) => Rc::new(Self {
                name: self.name.clone(),
                arity: self.arity,
                is_getter: self.is_getter,
                kind: NativeKind::Bound {
                    receiver,
                    method: method.clone(),
                },
            }),
            _ => self.clone(),
        }
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, String> {
        match &self.kind {
            NativeKind::Function(callback) => callback(args),
            NativeKind::Bound { receiver, method } => method(receiver.clone(), args),
            NativeKind::Method(_) => Err(format!(
                "Native method '{}' called without a receiver",
                self.name
            )),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}
