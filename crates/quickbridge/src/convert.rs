//! Value marshalling between the engine and the host
//!
//! [`FromScript`] and [`IntoScript`] are the host-side counterparts of the
//! engine's own conversion primitives. `FromScript` additionally fixes the
//! missing-argument rule: an absent or `undefined` script argument converts
//! to the declared type's zero value instead of failing the call.

use rquickjs::convert::Coerced;
use rquickjs::{Array, Ctx, Error, FromJs, IntoJs, Value};

/// Marker collecting all remaining call arguments into one sequence.
///
/// Used as the last parameter of a variadic host method. Zero remaining
/// arguments produce an empty vector, never an absent one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rest<T>(pub Vec<T>);

impl<T> Rest<T> {
    /// Consume the wrapper
    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

/// Convert a script argument to a host value.
///
/// `value` is `None` when the caller supplied fewer arguments than the
/// method declares.
pub trait FromScript: Sized + 'static {
    /// Type name used in conversion error messages
    fn type_name() -> &'static str;

    /// Convert, applying the zero-value rule for missing arguments
    fn from_script<'js>(ctx: &Ctx<'js>, value: Option<Value<'js>>) -> rquickjs::Result<Self>;
}

fn present<'js>(value: Option<Value<'js>>) -> Option<Value<'js>> {
    value.filter(|v| !v.is_undefined())
}

impl FromScript for bool {
    fn type_name() -> &'static str {
        "bool"
    }

    fn from_script<'js>(_ctx: &Ctx<'js>, value: Option<Value<'js>>) -> rquickjs::Result<Self> {
        Ok(present(value).map(|v| truthiness(&v)).unwrap_or(false))
    }
}

impl FromScript for i64 {
    fn type_name() -> &'static str {
        "i64"
    }

    fn from_script<'js>(_ctx: &Ctx<'js>, value: Option<Value<'js>>) -> rquickjs::Result<Self> {
        match present(value) {
            None => Ok(0),
            Some(v) => number_of(&v)
                .map(|f| f as i64)
                .ok_or_else(|| Error::new_from_js("value", "i64")),
        }
    }
}

impl FromScript for i32 {
    fn type_name() -> &'static str {
        "i32"
    }

    fn from_script<'js>(ctx: &Ctx<'js>, value: Option<Value<'js>>) -> rquickjs::Result<Self> {
        i64::from_script(ctx, value).map(|v| v as i32)
    }
}

impl FromScript for f64 {
    fn type_name() -> &'static str {
        "f64"
    }

    fn from_script<'js>(_ctx: &Ctx<'js>, value: Option<Value<'js>>) -> rquickjs::Result<Self> {
        match present(value) {
            None => Ok(0.0),
            Some(v) => number_of(&v).ok_or_else(|| Error::new_from_js("value", "f64")),
        }
    }
}

impl FromScript for String {
    fn type_name() -> &'static str {
        "string"
    }

    fn from_script<'js>(ctx: &Ctx<'js>, value: Option<Value<'js>>) -> rquickjs::Result<Self> {
        match present(value) {
            None => Ok(String::new()),
            // Engine coercion: numbers format, objects go through toString.
            Some(v) => Ok(Coerced::<String>::from_js(ctx, v)?.0),
        }
    }
}

impl<T: FromScript> FromScript for Option<T> {
    fn type_name() -> &'static str {
        "optional value"
    }

    fn from_script<'js>(ctx: &Ctx<'js>, value: Option<Value<'js>>) -> rquickjs::Result<Self> {
        match present(value) {
            None => Ok(None),
            Some(v) if v.is_null() => Ok(None),
            Some(v) => T::from_script(ctx, Some(v)).map(Some),
        }
    }
}

impl<T: FromScript> FromScript for Vec<T> {
    fn type_name() -> &'static str {
        "array"
    }

    fn from_script<'js>(ctx: &Ctx<'js>, value: Option<Value<'js>>) -> rquickjs::Result<Self> {
        let Some(v) = present(value) else {
            return Ok(Vec::new());
        };
        let Some(array) = v.as_array() else {
            return Err(Error::new_from_js("value", "array"));
        };
        let mut out = Vec::with_capacity(array.len());
        for i in 0..array.len() {
            let item: Value = array.get(i)?;
            out.push(T::from_script(ctx, Some(item))?);
        }
        Ok(out)
    }
}

fn number_of(v: &Value<'_>) -> Option<f64> {
    if let Some(i) = v.as_int() {
        Some(i as f64)
    } else {
        v.as_float()
    }
}

fn truthiness(v: &Value<'_>) -> bool {
    if let Some(b) = v.as_bool() {
        return b;
    }
    if v.is_undefined() || v.is_null() {
        return false;
    }
    if let Some(f) = number_of(v) {
        return f != 0.0 && !f.is_nan();
    }
    if let Some(s) = v.as_string() {
        return s.to_string().map(|s| !s.is_empty()).unwrap_or(false);
    }
    true
}

/// Convert a host return value to a script value
pub trait IntoScript: 'static {
    /// Convert. A host method with no meaningful result yields `undefined`
    /// through the `()` implementation.
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>>;
}

impl IntoScript for () {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(Value::new_undefined(ctx.clone()))
    }
}

impl IntoScript for bool {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.into_js(ctx)
    }
}

impl IntoScript for i32 {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.into_js(ctx)
    }
}

impl IntoScript for i64 {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.into_js(ctx)
    }
}

impl IntoScript for f64 {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.into_js(ctx)
    }
}

impl IntoScript for String {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.into_js(ctx)
    }
}

impl IntoScript for &'static str {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.into_js(ctx)
    }
}

impl<T: IntoScript> IntoScript for Option<T> {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match self {
            Some(v) => v.into_script(ctx),
            None => Ok(Value::new_undefined(ctx.clone())),
        }
    }
}

impl<T: IntoScript> IntoScript for Vec<T> {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        let array = Array::new(ctx.clone())?;
        for (i, item) in self.into_iter().enumerate() {
            array.set(i, item.into_script(ctx)?)?;
        }
        Ok(array.into_value())
    }
}

impl IntoScript for serde_json::Value {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        json_to_js(ctx, &self)
    }
}

/// Recursively build a script value from parsed JSON
pub(crate) fn json_to_js<'js>(
    ctx: &Ctx<'js>,
    json: &serde_json::Value,
) -> rquickjs::Result<Value<'js>> {
    use serde_json::Value as Json;
    match json {
        Json::Null => Ok(Value::new_null(ctx.clone())),
        Json::Bool(b) => (*b).into_js(ctx),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into_js(ctx)
            } else {
                n.as_f64().unwrap_or(f64::NAN).into_js(ctx)
            }
        }
        Json::String(s) => s.as_str().into_js(ctx),
        Json::Array(items) => {
            let array = Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                array.set(i, json_to_js(ctx, item)?)?;
            }
            Ok(array.into_value())
        }
        Json::Object(map) => {
            let object = rquickjs::Object::new(ctx.clone())?;
            for (key, item) in map {
                object.set(key.as_str(), json_to_js(ctx, item)?)?;
            }
            Ok(object.into_value())
        }
    }
}
