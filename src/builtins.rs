use std::time::{SystemTime, UNIX_EPOCH};

use crate::runtime::callable::NativeFunction;
use crate::runtime::environment::EnvRef;
use crate::runtime::value::Value;

/// Seed the always-present globals: `type`, `time`, and `str`. Arity is
/// enforced by the evaluator before the callbacks run.
pub(crate) fn install(globals: &EnvRef) {
    let natives = [
        NativeFunction::function("type", 1, |args| {
            Ok(Value::String(args[0].type_tag().to_string()))
        }),
        NativeFunction::function("time", 0, |_args| {
            let elapsed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|error| format!("Clock error: {error}"))?;
            Ok(Value::Number(elapsed.as_millis() as f64))
        }),
        NativeFunction::function("str", 1, |args| Ok(Value::String(args[0].stringify()))),
    ];
    for native in natives {
        globals
            .borrow_mut()
            .define(native.name.clone(), Some(Value::Native(native)));
    }
}
