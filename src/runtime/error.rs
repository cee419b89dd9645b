use thiserror::Error;

/// User-facing runtime failure categories. The display strings are part of
/// the language's observable behavior and are matched verbatim by tests.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeErrorKind {
    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("Uninitialized variable '{0}'")]
    UninitializedVariable(String),
    #[error("Operand must be a number")]
    OperandNotNumber,
    #[error("Operands must both be a number or a string")]
    OperandsNotAddable,
    #[error("Value is not callable")]
    NotCallable,
    #[error("Expected {expected} args but got {found}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("Value is not a class instance")]
    NotAnInstance,
    #[error("Undefined property '{0}'")]
    UndefinedProperty(String),
    #[error("Superclass must be a class")]
    SuperclassNotClass,
    /// Failure surfaced by an embedder-registered native callable.
    #[error("{0}")]
    Native(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// A runtime error annotated with the source line that raised it and a
/// snapshot of the evaluator's call stack, innermost frame first.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("[line {line}] {kind}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub line: usize,
    pub stack: Vec<String>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, line: usize) -> Self {
        Self {
            kind,
            line,
            stack: Vec::new(),
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
