use std::fmt;
use std::rc::Rc;

use crate::runtime::callable::{LoxFunction, NativeFunction};
use crate::runtime::class::{LoxClass, LoxInstance};

/// Runtime value: the tagged union every expression evaluates to.
///
/// Primitives compare by value; callables and instances compare by
/// pointer identity.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Function(Rc<LoxFunction>),
    Native(Rc<NativeFunction>),
    Class(Rc<LoxClass>),
    Instance(Rc<LoxInstance>),
}

impl Value {
    /// `nil` and `false` are falsey; everything else (including `0`, `""`,
    /// and `NaN`) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    /// Tag string reported by the `type` builtin.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) | Value::Native(_) => "func",
            Value::Class(_) => "class",
            Value::Instance(_) => "object",
        }
    }

    /// User-facing rendering, shared by `print`, `str`, and instance
    /// field listings.
    pub fn stringify(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Function(function) => {
                if function.is_getter() {
                    format!("<getter {}>", function.name())
                } else {
                    format!("<fn {}>", function.name())
                }
            }
            Value::Native(native) => format!("<native fn {}>", native.name),
            Value::Class(class) => format!("<class {}>", class.name()),
            Value::Instance(instance) => {
                let fields = instance.field_entries();
                let field_names: Vec<String> =
                    fields.iter().map(|(name, _)| name.clone()).collect();
                let mut entries: Vec<String> = fields
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, value.stringify()))
                    .collect();
                entries.extend(
                    instance
                        .class()
                        .visible_methods(&field_names)
                        .iter()
                        .map(|(name, method)| format!("{}: {}", name, method.stringify())),
                );
                if entries.is_empty() {
                    format!("{} {{}}", instance.class().name())
                } else {
                    format!("{} {{ {} }}", instance.class().name(), entries.join(", "))
                }
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shallow on purpose: closures point back into environment chains
        // that can contain this value.
        write!(f, "Value({})", self.type_tag())
    }
}
