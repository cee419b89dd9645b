use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::runtime::error::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::runtime::value::Value;
use crate::token::Token;

pub type EnvRef = Rc<RefCell<Environment>>;

/// One binding frame in the lexical scope chain.
///
/// A slot holding `None` is declared-but-uninitialized, which is distinct
/// from holding `nil`. Globals form the root frame and are addressed by
/// name; every other frame is addressed by the resolver-computed depth.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Option<Value>>,
    parent: Option<EnvRef>,
}

impl Environment {
    pub fn new_global() -> EnvRef {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn with_parent(parent: EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            parent: Some(parent),
        }))
    }

    /// Bind `name` in this frame. `None` leaves the slot uninitialized.
    /// Duplicate definitions are not checked here; the resolver rejects
    /// them before execution.
    pub fn define(&mut self, name: impl Into<String>, value: Option<Value>) {
        self.values.insert(name.into(), value);
    }

    /// Look `name` up in this frame only.
    pub fn get(&self, name: &Token) -> RuntimeResult<Value> {
        match self.values.get(&name.lexeme) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(RuntimeError::new(
                RuntimeErrorKind::UninitializedVariable(name.lexeme.clone()),
                name.line,
            )),
            None => Err(RuntimeError::new(
                RuntimeErrorKind::UndefinedVariable(name.lexeme.clone()),
                name.line,
            )),
        }
    }

    /// Overwrite `name` in this frame only.
    pub fn assign(&mut self, name: &Token, value: Value) -> RuntimeResult<()> {
        match self.values.get_mut(&name.lexeme) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(RuntimeError::new(
                RuntimeErrorKind::UndefinedVariable(name.lexeme.clone()),
                name.line,
            )),
        }
    }

    fn ancestor(env: &EnvRef, depth: usize) -> EnvRef {
        let mut frame = env.clone();
        for _ in 0..depth {
            let parent = frame
                .borrow()
                .parent
                .clone()
                .expect("resolver depth exceeds environment chain");
            frame = parent;
        }
        frame
    }

    /// Read `name` exactly `depth` frames up the chain. A missing slot is
    /// a resolver bug and aborts; an uninitialized slot is a user error.
    pub fn get_at(env: &EnvRef, depth: usize, name: &Token) -> RuntimeResult<Value> {
        let frame = Self::ancestor(env, depth);
        let borrowed = frame.borrow();
        match borrowed.values.get(&name.lexeme) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(RuntimeError::new(
                RuntimeErrorKind::UninitializedVariable(name.lexeme.clone()),
                name.line,
            )),
            None => panic!(
                "resolver recorded depth {depth} for '{}' but the slot is missing",
                name.lexeme
            ),
        }
    }

    /// Write `name` exactly `depth` frames up the chain.
    pub fn assign_at(env: &EnvRef, depth: usize, name: &Token, value: Value) -> RuntimeResult<()> {
        let frame = Self::ancestor(env, depth);
        let mut borrowed = frame.borrow_mut();
        match borrowed.values.get_mut(&name.lexeme) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => panic!(
                "resolver recorded depth {depth} for '{}' but the slot is missing",
                name.lexeme
            ),
        }
    }

    /// As [`Environment::get_at`] but a missing or uninitialized slot
    /// yields `None` instead of an error. Used by `super` dispatch to probe
    /// for the `this` binding that static-method contexts lack.
    pub fn get_unchecked_at(env: &EnvRef, depth: usize, name: &str) -> Option<Value> {
        let frame = Self::ancestor(env, depth);
        let borrowed = frame.borrow();
        borrowed.values.get(name).cloned().flatten()
    }
}
