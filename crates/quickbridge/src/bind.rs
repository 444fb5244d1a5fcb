//! Host object exporter
//!
//! Converts a host object's registered members into script-callable
//! bindings. Rust has no runtime reflection, so the member survey the
//! bridge needs is recorded once per host object in an explicit
//! registration table ([`HostObject`]); the table keeps the host-side
//! identifiers, and the name mapper derives the script-visible names.
//!
//! Three signature traits decide how a method is wrapped, and all three
//! compose freely:
//!
//! - a leading `&RunContext` parameter receives the context of the
//!   evaluation that triggered the call, injected by the runtime;
//! - a `Result<T, E>` return raises a script exception on `Err` and
//!   produces no return value;
//! - a trailing [`Rest<T>`] parameter collects all remaining supplied
//!   arguments.
//!
//! A method that wants raw access to the whole invocation (receiver and
//! uninterpreted arguments) registers through [`HostObject::raw_method`]
//! and receives the engine's call descriptor as a [`NativeCall`].
//!
//! Methods whose host identifier carries the reserved `X` prefix are
//! exported through a script-side trampoline so script code can invoke
//! them with `new`.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use rquickjs::{Ctx, Value};

use crate::context::RunContext;
use crate::convert::{FromScript, IntoScript, Rest};
use crate::error::throw;
use crate::namemap;

/// The engine's call descriptor: receiver plus uninterpreted arguments.
///
/// Handed to raw methods that want full control over argument handling;
/// `undefined` arguments arrive unconverted.
pub struct NativeCall<'a, 'js> {
    /// Engine handle for the duration of the call
    pub ctx: Ctx<'js>,
    /// The `this` value of the script-side invocation
    pub this: Value<'js>,
    /// The supplied arguments, in order
    pub args: &'a [Value<'js>],
}

impl<'a, 'js> NativeCall<'a, 'js> {
    /// Argument at `index`, if supplied
    pub fn arg(&self, index: usize) -> Option<&Value<'js>> {
        self.args.get(index)
    }

    /// Convert the argument at `index`, applying the zero-value rule for
    /// missing arguments
    pub fn get<T: FromScript>(&self, index: usize) -> rquickjs::Result<T> {
        T::from_script(&self.ctx, self.args.get(index).cloned())
    }

    /// Number of supplied arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// True when the call carried no arguments
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// A host function taking the execution context and the raw call descriptor
pub trait RawHostFn: 'static {
    /// Invoke with the context of the currently running evaluation
    fn call_raw<'js>(
        &self,
        run: &RunContext,
        call: NativeCall<'_, 'js>,
    ) -> rquickjs::Result<Value<'js>>;
}

impl<F> RawHostFn for F
where
    F: for<'a, 'js> Fn(&'a RunContext, NativeCall<'a, 'js>) -> rquickjs::Result<Value<'js>>
        + 'static,
{
    fn call_raw<'js>(
        &self,
        run: &RunContext,
        call: NativeCall<'_, 'js>,
    ) -> rquickjs::Result<Value<'js>> {
        self(run, call)
    }
}

/// Object-safe callable installed into the engine by the runtime
pub(crate) trait NativeCallable {
    fn call_native<'js>(
        &self,
        run: &RunContext,
        ctx: &Ctx<'js>,
        this: &Value<'js>,
        args: &[Value<'js>],
    ) -> rquickjs::Result<Value<'js>>;
}

struct TypedMethod<F, M> {
    f: F,
    _marker: PhantomData<fn() -> M>,
}

impl<F, M> NativeCallable for TypedMethod<F, M>
where
    F: HostMethod<M>,
    M: 'static,
{
    fn call_native<'js>(
        &self,
        run: &RunContext,
        ctx: &Ctx<'js>,
        _this: &Value<'js>,
        args: &[Value<'js>],
    ) -> rquickjs::Result<Value<'js>> {
        self.f.invoke(run, ctx, args)
    }
}

struct RawMethod<F> {
    f: F,
}

impl<F: RawHostFn> NativeCallable for RawMethod<F> {
    fn call_native<'js>(
        &self,
        run: &RunContext,
        ctx: &Ctx<'js>,
        this: &Value<'js>,
        args: &[Value<'js>],
    ) -> rquickjs::Result<Value<'js>> {
        self.f.call_raw(
            run,
            NativeCall {
                ctx: ctx.clone(),
                this: this.clone(),
                args,
            },
        )
    }
}

/// A host method in any of the supported signature shapes.
///
/// Implemented for plain functions and closures of up to four declared
/// parameters, optionally taking a leading `&RunContext`, optionally
/// variadic through a trailing [`Rest<T>`], optionally fallible through a
/// `Result` return. The `M` parameter is inferred; callers never name it.
pub trait HostMethod<M>: 'static {
    /// Marshal `args`, invoke the host code, marshal the result
    fn invoke<'js>(
        &self,
        run: &RunContext,
        ctx: &Ctx<'js>,
        args: &[Value<'js>],
    ) -> rquickjs::Result<Value<'js>>;
}

#[doc(hidden)]
pub mod markers {
    //! Signature-family markers used to select a [`super::HostMethod`]
    //! implementation during inference. Never named by callers.

    /// Plain parameters, infallible return
    pub struct ByValue;
    /// Leading `&RunContext`
    pub struct WithContext;
    /// `Result` return
    pub struct Fallible;
    /// Leading `&RunContext`, `Result` return
    pub struct WithContextFallible;
    /// Trailing `Rest<T>`
    pub struct Variadic;
    /// Leading `&RunContext`, trailing `Rest<T>`
    pub struct WithContextVariadic;
    /// Trailing `Rest<T>`, `Result` return
    pub struct VariadicFallible;
    /// Leading `&RunContext`, trailing `Rest<T>`, `Result` return
    pub struct WithContextVariadicFallible;
}

fn convert_arg<'js, T: FromScript>(
    ctx: &Ctx<'js>,
    args: &[Value<'js>],
    index: usize,
) -> rquickjs::Result<T> {
    T::from_script(ctx, args.get(index).cloned()).map_err(|e| rethrow_conversion(ctx, index, T::type_name(), e))
}

fn convert_rest<'js, T: FromScript>(
    ctx: &Ctx<'js>,
    args: &[Value<'js>],
    start: usize,
) -> rquickjs::Result<Rest<T>> {
    let mut rest = Vec::new();
    if start < args.len() {
        rest.reserve(args.len() - start);
        for (offset, value) in args[start..].iter().enumerate() {
            let item = T::from_script(ctx, Some(value.clone()))
                .map_err(|e| rethrow_conversion(ctx, start + offset, T::type_name(), e))?;
            rest.push(item);
        }
    }
    Ok(Rest(rest))
}

fn rethrow_conversion<'js>(
    ctx: &Ctx<'js>,
    index: usize,
    expected: &str,
    e: rquickjs::Error,
) -> rquickjs::Error {
    if matches!(e, rquickjs::Error::Exception) {
        return e;
    }
    throw(ctx, format!("cannot convert argument {index} to {expected}: {e}"))
}

fn fallible_result<'js, T, E>(ctx: &Ctx<'js>, ret: Result<T, E>) -> rquickjs::Result<Value<'js>>
where
    T: IntoScript,
    E: fmt::Display,
{
    match ret {
        Ok(value) => value.into_script(ctx),
        Err(e) => Err(throw(ctx, e)),
    }
}

macro_rules! impl_host_method {
    ($($A:ident),*) => {
        impl<Fun, $($A,)* R> HostMethod<(markers::ByValue, ($($A,)*), R)> for Fun
        where
            Fun: Fn($($A),*) -> R + 'static,
            $($A: FromScript,)*
            R: IntoScript,
        {
            #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
            fn invoke<'js>(
                &self,
                _run: &RunContext,
                ctx: &Ctx<'js>,
                args: &[Value<'js>],
            ) -> rquickjs::Result<Value<'js>> {
                let mut index = 0usize;
                $(let $A: $A = convert_arg(ctx, args, index)?; index += 1;)*
                (self)($($A),*).into_script(ctx)
            }
        }

        impl<Fun, $($A,)* R> HostMethod<(markers::WithContext, ($($A,)*), R)> for Fun
        where
            Fun: Fn(&RunContext, $($A),*) -> R + 'static,
            $($A: FromScript,)*
            R: IntoScript,
        {
            #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
            fn invoke<'js>(
                &self,
                run: &RunContext,
                ctx: &Ctx<'js>,
                args: &[Value<'js>],
            ) -> rquickjs::Result<Value<'js>> {
                let mut index = 0usize;
                $(let $A: $A = convert_arg(ctx, args, index)?; index += 1;)*
                (self)(run, $($A),*).into_script(ctx)
            }
        }

        impl<Fun, $($A,)* T, E> HostMethod<(markers::Fallible, ($($A,)*), T, E)> for Fun
        where
            Fun: Fn($($A),*) -> Result<T, E> + 'static,
            $($A: FromScript,)*
            T: IntoScript,
            E: fmt::Display + 'static,
        {
            #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
            fn invoke<'js>(
                &self,
                _run: &RunContext,
                ctx: &Ctx<'js>,
                args: &[Value<'js>],
            ) -> rquickjs::Result<Value<'js>> {
                let mut index = 0usize;
                $(let $A: $A = convert_arg(ctx, args, index)?; index += 1;)*
                fallible_result(ctx, (self)($($A),*))
            }
        }

        impl<Fun, $($A,)* T, E> HostMethod<(markers::WithContextFallible, ($($A,)*), T, E)> for Fun
        where
            Fun: Fn(&RunContext, $($A),*) -> Result<T, E> + 'static,
            $($A: FromScript,)*
            T: IntoScript,
            E: fmt::Display + 'static,
        {
            #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
            fn invoke<'js>(
                &self,
                run: &RunContext,
                ctx: &Ctx<'js>,
                args: &[Value<'js>],
            ) -> rquickjs::Result<Value<'js>> {
                let mut index = 0usize;
                $(let $A: $A = convert_arg(ctx, args, index)?; index += 1;)*
                fallible_result(ctx, (self)(run, $($A),*))
            }
        }

        impl<Fun, $($A,)* V, R> HostMethod<(markers::Variadic, ($($A,)*), V, R)> for Fun
        where
            Fun: Fn($($A,)* Rest<V>) -> R + 'static,
            $($A: FromScript,)*
            V: FromScript,
            R: IntoScript,
        {
            #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
            fn invoke<'js>(
                &self,
                _run: &RunContext,
                ctx: &Ctx<'js>,
                args: &[Value<'js>],
            ) -> rquickjs::Result<Value<'js>> {
                let mut index = 0usize;
                $(let $A: $A = convert_arg(ctx, args, index)?; index += 1;)*
                let rest = convert_rest::<V>(ctx, args, index)?;
                (self)($($A,)* rest).into_script(ctx)
            }
        }

        impl<Fun, $($A,)* V, R> HostMethod<(markers::WithContextVariadic, ($($A,)*), V, R)> for Fun
        where
            Fun: Fn(&RunContext, $($A,)* Rest<V>) -> R + 'static,
            $($A: FromScript,)*
            V: FromScript,
            R: IntoScript,
        {
            #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
            fn invoke<'js>(
                &self,
                run: &RunContext,
                ctx: &Ctx<'js>,
                args: &[Value<'js>],
            ) -> rquickjs::Result<Value<'js>> {
                let mut index = 0usize;
                $(let $A: $A = convert_arg(ctx, args, index)?; index += 1;)*
                let rest = convert_rest::<V>(ctx, args, index)?;
                (self)(run, $($A,)* rest).into_script(ctx)
            }
        }

        impl<Fun, $($A,)* V, T, E> HostMethod<(markers::VariadicFallible, ($($A,)*), V, T, E)> for Fun
        where
            Fun: Fn($($A,)* Rest<V>) -> Result<T, E> + 'static,
            $($A: FromScript,)*
            V: FromScript,
            T: IntoScript,
            E: fmt::Display + 'static,
        {
            #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
            fn invoke<'js>(
                &self,
                _run: &RunContext,
                ctx: &Ctx<'js>,
                args: &[Value<'js>],
            ) -> rquickjs::Result<Value<'js>> {
                let mut index = 0usize;
                $(let $A: $A = convert_arg(ctx, args, index)?; index += 1;)*
                let rest = convert_rest::<V>(ctx, args, index)?;
                fallible_result(ctx, (self)($($A,)* rest))
            }
        }

        impl<Fun, $($A,)* V, T, E> HostMethod<(markers::WithContextVariadicFallible, ($($A,)*), V, T, E)> for Fun
        where
            Fun: Fn(&RunContext, $($A,)* Rest<V>) -> Result<T, E> + 'static,
            $($A: FromScript,)*
            V: FromScript,
            T: IntoScript,
            E: fmt::Display + 'static,
        {
            #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
            fn invoke<'js>(
                &self,
                run: &RunContext,
                ctx: &Ctx<'js>,
                args: &[Value<'js>],
            ) -> rquickjs::Result<Value<'js>> {
                let mut index = 0usize;
                $(let $A: $A = convert_arg(ctx, args, index)?; index += 1;)*
                let rest = convert_rest::<V>(ctx, args, index)?;
                fallible_result(ctx, (self)(run, $($A,)* rest))
            }
        }
    };
}

impl_host_method!();
impl_host_method!(A1);
impl_host_method!(A1, A2);
impl_host_method!(A1, A2, A3);
impl_host_method!(A1, A2, A3, A4);

/// A callable binding plus the flags the runtime needs to install it
#[derive(Clone)]
pub struct NativeFunc {
    pub(crate) callable: Rc<dyn NativeCallable>,
    pub(crate) constructor: bool,
}

impl fmt::Debug for NativeFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunc")
            .field("constructor", &self.constructor)
            .finish()
    }
}

/// The mapping produced by exporting one host object: script-visible name
/// to bindable, in registration order
pub type ExportSet = Vec<(String, Bindable)>;

/// A host value in a form the runtime's converter understands
#[derive(Clone, Debug)]
pub enum Bindable {
    /// Script `null`
    Null,
    /// A boolean scalar
    Bool(bool),
    /// An integer scalar
    Int(i64),
    /// A float scalar
    Float(f64),
    /// A string scalar
    Str(String),
    /// Structured data, converted field by field
    Json(serde_json::Value),
    /// A callable binding
    Func(NativeFunc),
    /// A nested namespace, converted recursively
    Map(ExportSet),
}

impl Bindable {
    /// A bare native function consuming the execution context and the raw
    /// call descriptor. The runtime's converter rewrites it into a
    /// context-free script function that reads the current-context cell at
    /// call time.
    pub fn ctx_fn(f: impl RawHostFn) -> Self {
        Bindable::Func(NativeFunc {
            callable: Rc::new(RawMethod { f }),
            constructor: false,
        })
    }
}

impl From<bool> for Bindable {
    fn from(v: bool) -> Self {
        Bindable::Bool(v)
    }
}

impl From<i32> for Bindable {
    fn from(v: i32) -> Self {
        Bindable::Int(v as i64)
    }
}

impl From<i64> for Bindable {
    fn from(v: i64) -> Self {
        Bindable::Int(v)
    }
}

impl From<f64> for Bindable {
    fn from(v: f64) -> Self {
        Bindable::Float(v)
    }
}

impl From<&str> for Bindable {
    fn from(v: &str) -> Self {
        Bindable::Str(v.to_string())
    }
}

impl From<String> for Bindable {
    fn from(v: String) -> Self {
        Bindable::Str(v)
    }
}

impl From<serde_json::Value> for Bindable {
    fn from(v: serde_json::Value) -> Self {
        Bindable::Json(v)
    }
}

impl From<&HostObject> for Bindable {
    fn from(v: &HostObject) -> Self {
        Bindable::Map(v.export())
    }
}

impl From<HostObject> for Bindable {
    fn from(v: HostObject) -> Self {
        Bindable::Map(v.exports)
    }
}

/// Registration table describing one host object's exported surface.
///
/// Members are registered under their host-side identifiers; the name
/// mapper derives the script-visible names at registration time. Exporting
/// the table produces an [`ExportSet`] the runtime installs with
/// [`crate::Runtime::bind`]; the same table can be bound any number of
/// times under different names.
#[derive(Clone, Default)]
pub struct HostObject {
    exports: ExportSet,
}

impl HostObject {
    /// An empty registration table
    pub fn new() -> Self {
        Self::default()
    }

    fn push_func(mut self, name: String, callable: Rc<dyn NativeCallable>, constructor: bool) -> Self {
        self.exports.push((
            name,
            Bindable::Func(NativeFunc {
                callable,
                constructor,
            }),
        ));
        self
    }

    /// Register a method under its host identifier.
    ///
    /// Accepts any [`HostMethod`] shape; an `X`-prefixed identifier marks
    /// the method constructible from script.
    pub fn method<M: 'static>(self, ident: &str, f: impl HostMethod<M>) -> Self {
        let name = namemap::method_name(ident);
        let constructor = namemap::is_constructor(ident);
        self.push_func(
            name,
            Rc::new(TypedMethod {
                f,
                _marker: PhantomData,
            }),
            constructor,
        )
    }

    /// Register a method that receives the raw call descriptor
    pub fn raw_method(self, ident: &str, f: impl RawHostFn) -> Self {
        let name = namemap::method_name(ident);
        let constructor = namemap::is_constructor(ident);
        self.push_func(name, Rc::new(RawMethod { f }), constructor)
    }

    /// Register a field under its host identifier; host-private names are
    /// silently skipped
    pub fn field(self, ident: &str, value: impl Into<Bindable>) -> Self {
        self.field_with_tag(ident, None, value)
    }

    /// Register a field with an explicit override tag; the literal `"-"`
    /// hides the field
    pub fn tagged_field(self, ident: &str, tag: &str, value: impl Into<Bindable>) -> Self {
        self.field_with_tag(ident, Some(tag), value)
    }

    fn field_with_tag(mut self, ident: &str, tag: Option<&str>, value: impl Into<Bindable>) -> Self {
        if let Some(name) = namemap::field_name(ident, tag) {
            self.exports.push((name, value.into()));
        }
        self
    }

    /// The export mapping, in registration order
    pub fn export(&self) -> ExportSet {
        self.exports.clone()
    }

    /// True when a member is exported under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.exports.iter().any(|(n, _)| n == name)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("exports", &self.exports.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_names_are_mapped() {
        let obj = HostObject::new()
            .method("Add", |a: i64, b: i64| a + b)
            .method("XSharedArray", || 0i64)
            .field("URL", "https://example.com")
            .field("TLSVersion", "1.3");

        assert!(obj.contains("add"));
        assert!(obj.contains("SharedArray"));
        assert!(obj.contains("url"));
        assert!(obj.contains("tls_version"));
        assert!(!obj.contains("Add"));
    }

    #[test]
    fn test_hidden_and_private_fields_absent() {
        let obj = HostObject::new()
            .tagged_field("Secret", "-", "nope")
            .field("internal", "nope")
            .tagged_field("Alias", "other_name", 1i64);

        assert!(!obj.contains("secret"));
        assert!(!obj.contains("internal"));
        assert!(obj.contains("other_name"));
    }

    #[test]
    fn test_constructor_flag() {
        let obj = HostObject::new()
            .method("XThing", || 0i64)
            .method("Plain", || 0i64);

        let exports = obj.export();
        let ctor = exports.iter().find(|(n, _)| n == "Thing").unwrap();
        let plain = exports.iter().find(|(n, _)| n == "plain").unwrap();
        assert!(matches!(&ctor.1, Bindable::Func(f) if f.constructor));
        assert!(matches!(&plain.1, Bindable::Func(f) if !f.constructor));
    }
}
