use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::runtime::value::Value;

/// Runtime class object.
///
/// The method map holds unbound method values (user functions or natives);
/// `init` is pulled out of the map at construction time and consulted for
/// arity and constructor dispatch. The class doubles as an instance-like
/// object for static members, which live in its own field bag and fall
/// back to the superclass chain on reads.
pub struct LoxClass {
    name: String,
    superclass: Option<Rc<LoxClass>>,
    methods: HashMap<String, Value>,
    init: Option<Value>,
    statics: RefCell<HashMap<String, Value>>,
}

impl LoxClass {
    pub fn new(
        name: impl Into<String>,
        superclass: Option<Rc<LoxClass>>,
        mut methods: HashMap<String, Value>,
    ) -> Rc<Self> {
        let init = methods.remove("init");
        Rc::new(Self {
            name: name.into(),
            superclass,
            methods,
            init,
            statics: RefCell::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Option<&Rc<LoxClass>> {
        self.superclass.as_ref()
    }

    pub fn initializer(&self) -> Option<&Value> {
        self.init.as_ref()
    }

    /// Arity of the class as a callable: its initializer's arity, or zero.
    pub fn arity(&self) -> usize {
        match &self.init {
            Some(Value::Function(function)) => function.arity(),
            Some(Value::Native(native)) => native.arity,
            _ => 0,
        }
    }

    /// Look an instance method up on this class, then up the superclass
    /// chain. The result is unbound.
    pub fn find_method(&self, name: &str) -> Option<Value> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }
        self.superclass
            .as_ref()
            .and_then(|superclass| superclass.find_method(name))
    }

    /// Read a static member, falling back to the superclass chain.
    pub fn get_static(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.statics.borrow().get(name) {
            return Some(value.clone());
        }
        self.superclass
            .as_ref()
            .and_then(|superclass| superclass.get_static(name))
    }

    /// Static writes are local to this class; they never walk the chain.
    pub fn set_static(&self, name: impl Into<String>, value: Value) {
        self.statics.borrow_mut().insert(name.into(), value);
    }

    pub fn delete_static(&self, name: &str) -> bool {
        self.statics.borrow_mut().remove(name).is_some()
    }

    /// Method entries visible on an instance rendering: every method in the
    /// chain except `init`, with subclass definitions shadowing superclass
    /// ones and `skip` (field names) shadowing both.
    pub fn visible_methods(&self, skip: &[String]) -> Vec<(String, Value)> {
        let mut seen: Vec<(String, Value)> = Vec::new();
        let mut class = Some(self);
        while let Some(current) = class {
            for (name, method) in &current.methods {
                let shadowed = skip.iter().any(|field| field == name)
                    || seen.iter().any(|(existing, _)| existing == name);
                if !shadowed {
                    seen.push((name.clone(), method.clone()));
                }
            }
            class = current.superclass.as_deref();
        }
        seen.sort_by(|(a, _), (b, _)| a.cmp(b));
        seen
    }
}

impl fmt::Debug for LoxClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoxClass").field("name", &self.name).finish()
    }
}

/// Runtime instance: a field bag plus a pointer to its class. Identity is
/// the `Rc` pointer; two instances never compare equal by content.
pub struct LoxInstance {
    class: Rc<LoxClass>,
    fields: RefCell<HashMap<String, Value>>,
}

impl LoxInstance {
    pub fn new(class: Rc<LoxClass>) -> Rc<Self> {
        Rc::new(Self {
            class,
            fields: RefCell::new(HashMap::new()),
        })
    }

    pub fn class(&self) -> &Rc<LoxClass> {
        &self.class
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        self.fields.borrow_mut().insert(name.into(), value);
    }

    pub fn delete_field(&self, name: &str) -> bool {
        self.fields.borrow_mut().remove(name).is_some()
    }

    pub fn field_entries(&self) -> Vec<(String, Value)> {
        let mut entries: Vec<(String, Value)> = self
            .fields
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }
}

impl fmt::Debug for LoxInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoxInstance")
            .field("class", &self.class.name())
            .finish()
    }
}
