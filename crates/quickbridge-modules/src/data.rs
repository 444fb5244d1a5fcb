//! Shared read-only data arrays
//!
//! `new SharedArray(name, fn)` gives every runtime in a logical run the
//! same array under `name`. The first runtime to construct it runs `fn`
//! once; the produced array is captured as JSON rows in the cross-runtime
//! [`SharedObjects`](quickbridge::SharedObjects) store and parsed back
//! into a deep-frozen array on each access, so scripts cannot mutate the
//! shared contents. Functions inside the data do not survive the JSON
//! round trip.

use std::sync::Arc;

use quickbridge::rquickjs::{Array, CatchResultExt, Ctx, Function, Value};
use quickbridge::{init_env, throw, BridgeError, HostObject, NativeCall, RunContext, SharedValue};

/// Registry name of this module
pub const MODULE_NAME: &str = "bridge/data";

/// Namespace prefix keeping shared arrays apart from other shared objects
const SHARED_ARRAY_NAME_PREFIX: &str = "bridge/data/SharedArray.";

/// JSON rows backing one shared array
#[derive(Debug)]
pub struct SharedRows {
    rows: Vec<String>,
}

impl SharedRows {
    /// Number of elements in the shared array
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True for an empty shared array
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The export table for the data module
pub fn host_object() -> HostObject {
    HostObject::new().raw_method("XSharedArray", shared_array)
}

/// Constructor for a shareable read-only array identified by name, with
/// contents from whatever the callback returns
fn shared_array<'js>(
    run: &RunContext,
    call: NativeCall<'_, 'js>,
) -> quickbridge::rquickjs::Result<Value<'js>> {
    let ctx = call.ctx.clone();

    let Some(env) = init_env(run) else {
        return Err(throw(&ctx, "missing init environment"));
    };

    let name: String = call.get(0)?;
    if name.is_empty() {
        return Err(throw(&ctx, "empty name provided to SharedArray's constructor"));
    }

    let factory = match call.arg(1).and_then(Value::as_function) {
        Some(f) => f.clone(),
        None => {
            return Err(throw(
                &ctx,
                "a function is required as SharedArray's second argument",
            ))
        }
    };

    let key = format!("{SHARED_ARRAY_NAME_PREFIX}{name}");
    let value = env
        .shared_objects
        .get_or_create(run, &key, || rows_from_call(&ctx, &factory))
        .map_err(|e| rethrow(&ctx, e))?;

    let rows: Arc<SharedRows> = match value.downcast() {
        Ok(rows) => rows,
        Err(_) => return Err(throw(&ctx, "wrong type of shared object")),
    };

    wrap(&ctx, &rows)
}

/// Run the script callback once and capture its array as JSON rows
fn rows_from_call<'js>(ctx: &Ctx<'js>, factory: &Function<'js>) -> Result<SharedValue, BridgeError> {
    let produced: Value = factory
        .call(())
        .catch(ctx)
        .map_err(|e| BridgeError::Exception(e.to_string()))?;

    let Some(array) = produced.as_array() else {
        return Err(BridgeError::Message(
            "only arrays can be made into SharedArray".to_string(),
        ));
    };

    let mut rows = Vec::with_capacity(array.len());
    for i in 0..array.len() {
        let item: Value = array.get(i)?;
        let row = match ctx.json_stringify(item)? {
            Some(s) => s.to_string()?,
            // JSON.stringify yields no output for undefined entries.
            None => "null".to_string(),
        };
        rows.push(row);
    }

    Ok(Arc::new(SharedRows { rows }))
}

/// Parse the rows back into a fresh, deep-frozen array
fn wrap<'js>(ctx: &Ctx<'js>, rows: &SharedRows) -> quickbridge::rquickjs::Result<Value<'js>> {
    let array = Array::new(ctx.clone())?;
    for (i, row) in rows.rows.iter().enumerate() {
        array.set(i, ctx.json_parse(row.clone())?)?;
    }
    let freezer: Function = ctx.eval(DEEP_FREEZE)?;
    freezer.call((array.into_value(),))
}

const DEEP_FREEZE: &str = r#"(function freeze(value) {
    if (value !== null && typeof value === "object") {
        Object.getOwnPropertyNames(value).forEach(function (name) { freeze(value[name]); });
        Object.freeze(value);
    }
    return value;
})"#;

fn rethrow(ctx: &Ctx<'_>, err: BridgeError) -> quickbridge::rquickjs::Error {
    throw(ctx, err)
}
