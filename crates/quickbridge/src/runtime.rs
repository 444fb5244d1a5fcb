//! Context-aware runtime
//!
//! Wraps one embedded engine instance and attaches a [`RunContext`] to
//! every evaluation. The context lives in a current-context cell for the
//! duration of the call; native bindings installed through the converter
//! read the cell at call time, which is how a callback registered long
//! before an evaluation still observes the context of the call that
//! triggered it.
//!
//! A runtime is single-threaded. Run several runtimes on separate threads
//! for parallel executions; share state between them only through
//! [`crate::SharedObjects`].

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use parking_lot::Mutex;
use rquickjs::function::{Rest as JsRest, This};
use rquickjs::{
    CatchResultExt, CaughtError, Context, Ctx, FromJs, Function, IntoJs, Object, Persistent, Value,
};

use crate::bind::{Bindable, ExportSet, HostObject, NativeCallable, NativeFunc};
use crate::compat::{
    validate_compatibility_mode, CompatibilityMode, RuntimeOptions, EXTENDED_PRELUDE,
};
use crate::context::{CancelToken, RunContext};
use crate::convert::json_to_js;
use crate::error::{BridgeError, BridgeResult};

/// Script-side trampoline making a native function reachable through
/// `new`: a script-defined function forwards `this` and the argument
/// object to the native implementation, which the engine will not
/// construct directly.
const CONSTRUCT_WRAP: &str =
    "(function(impl) { return function() { return impl.apply(this, arguments); } })";

/// A program accepted by [`Runtime::run_program`]: source that passed a
/// syntax check under the runtime's compatibility mode
#[derive(Clone, Debug)]
pub struct Program {
    name: String,
    source: String,
}

impl Program {
    /// The name given at compile time, for diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The prepared source
    pub fn source(&self) -> &str {
        &self.source
    }
}

pub(crate) struct RuntimeCore {
    context: Context,
    // Kept alive for the context's lifetime; also owns the interrupt
    // handler wired to the cancel slot below.
    #[allow(dead_code)]
    engine: rquickjs::Runtime,
    compat: CompatibilityMode,
    /// Context of the currently executing top-level evaluation
    current: RefCell<RunContext>,
    /// Cancellation tokens of the current evaluation, polled by the
    /// engine interrupt handler (which may run while `current` is
    /// borrowed, so it gets its own `Send` slot)
    cancel_slot: Arc<Mutex<Vec<CancelToken>>>,
    trampoline: Persistent<Function<'static>>,
}

/// One embedded engine instance plus the machinery to evaluate under a
/// [`RunContext`]. Cloning shares the instance.
#[derive(Clone)]
pub struct Runtime {
    core: Rc<RuntimeCore>,
}

impl Runtime {
    /// A runtime with default options
    pub fn new() -> BridgeResult<Self> {
        Self::with_options(&RuntimeOptions::default())
    }

    /// A runtime configured by `options`.
    ///
    /// An unknown compatibility mode name fails here, never mid-script.
    pub fn with_options(options: &RuntimeOptions) -> BridgeResult<Self> {
        let compat = validate_compatibility_mode(&options.compatibility_mode)?;
        let engine = rquickjs::Runtime::new()?;
        let context = Context::full(&engine)?;

        let cancel_slot: Arc<Mutex<Vec<CancelToken>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let tokens = cancel_slot.clone();
            engine.set_interrupt_handler(Some(Box::new(move || {
                tokens.lock().iter().any(CancelToken::is_cancelled)
            })));
        }

        let trampoline = context.with(
            |ctx| -> rquickjs::Result<Persistent<Function<'static>>> {
                if compat == CompatibilityMode::Extended {
                    ctx.eval::<(), _>(EXTENDED_PRELUDE)?;
                }
                let wrap: Function = ctx.eval(CONSTRUCT_WRAP)?;
                Ok(Persistent::save(&ctx, wrap))
            },
        )?;

        let runtime = Runtime {
            core: Rc::new(RuntimeCore {
                context,
                engine,
                compat,
                current: RefCell::new(RunContext::background()),
                cancel_slot,
                trampoline,
            }),
        };

        let env: ExportSet = options
            .env
            .iter()
            .map(|(k, v)| (k.clone(), Bindable::Str(v.clone())))
            .collect();
        runtime.set("__ENV", Bindable::Map(env))?;

        Ok(runtime)
    }

    /// The mode selected at construction
    pub fn compatibility_mode(&self) -> CompatibilityMode {
        self.core.compat
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeCore> {
        Rc::downgrade(&self.core)
    }

    pub(crate) fn from_core(core: Rc<RuntimeCore>) -> Self {
        Runtime { core }
    }

    /// Syntax-check `source` and prepare it for [`Runtime::run_program`]
    pub fn compile(&self, name: &str, source: &str) -> BridgeResult<Program> {
        self.core.context.with(|ctx| {
            // Compile without running: function bodies are checked but not
            // evaluated. Top-level statements survive the wrapping intact.
            let probe = format!("(function() {{\n{source}\n}})");
            ctx.eval::<Value, _>(probe)
                .catch(&ctx)
                .map(|_| ())
                .map_err(caught_to_error)
        })?;
        Ok(Program {
            name: name.to_string(),
            source: source.to_string(),
        })
    }

    /// Evaluate `source` under `run`.
    ///
    /// The runtime is attached to the context first, so native code
    /// invoked mid-script can recover it with [`RunContext::runtime`].
    /// The value-or-error is exactly what the engine produced.
    ///
    /// This is the top-level entry point; native code already inside an
    /// evaluation must use [`Runtime::run_string_in`] instead.
    pub fn run_string<R>(&self, run: &RunContext, source: &str) -> BridgeResult<R>
    where
        R: for<'js> FromJs<'js>,
    {
        self.run_inner(run, source)
    }

    /// Evaluate a compiled program under `run`
    pub fn run_program<R>(&self, run: &RunContext, program: &Program) -> BridgeResult<R>
    where
        R: for<'js> FromJs<'js>,
    {
        self.run_inner(run, &program.source)
    }

    /// Evaluate `source` under `run` from inside an active engine scope.
    ///
    /// This is the nested-evaluation entry point for native code invoked
    /// mid-script: recover the runtime with [`RunContext::runtime`] and
    /// pass the call descriptor's engine handle. The current-context cell
    /// is swapped to `run` for the duration of the nested call and
    /// restored afterwards, so the outer evaluation keeps its own context.
    pub fn run_string_in<'js, R>(
        &self,
        ctx: &Ctx<'js>,
        run: &RunContext,
        source: &str,
    ) -> BridgeResult<R>
    where
        R: FromJs<'js>,
    {
        let attached = run.with_runtime(self);
        if attached.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let saved = self.core.current.replace(attached.clone());
        let saved_tokens = {
            let mut slot = self.core.cancel_slot.lock();
            std::mem::replace(&mut *slot, attached.cancel_tokens())
        };

        let result = ctx
            .eval::<R, _>(source)
            .catch(ctx)
            .map_err(caught_to_error);

        *self.core.cancel_slot.lock() = saved_tokens;
        self.core.current.replace(saved);
        result
    }

    fn run_inner<R>(&self, run: &RunContext, source: &str) -> BridgeResult<R>
    where
        R: for<'js> FromJs<'js>,
    {
        let attached = run.with_runtime(self);
        if attached.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        // Save and restore the cell so a native callback re-entering the
        // runtime for a nested evaluation does not clobber the context of
        // the outer call.
        let saved = self.core.current.replace(attached.clone());
        let saved_tokens = {
            let mut slot = self.core.cancel_slot.lock();
            std::mem::replace(&mut *slot, attached.cancel_tokens())
        };

        let result = self.core.context.with(|ctx| {
            ctx.eval::<R, _>(source).catch(&ctx).map_err(caught_to_error)
        });

        *self.core.cancel_slot.lock() = saved_tokens;
        self.core.current.replace(saved);
        result
    }

    /// Install a host object's export set as the global `name`
    pub fn bind(&self, name: &str, object: &HostObject) -> BridgeResult<()> {
        self.set(name, object)
    }

    /// Install a converted host value as the global `name`
    pub fn set(&self, name: &str, value: impl Into<Bindable>) -> BridgeResult<()> {
        let bindable = value.into();
        self.core
            .context
            .with(|ctx| -> rquickjs::Result<()> {
                let value = self.realize(&ctx, &bindable)?;
                ctx.globals().set(name, value)
            })
            .map_err(BridgeError::from)
    }

    /// Run `f` against the raw engine scope.
    ///
    /// Escape hatch for embedders that need engine facilities the bridge
    /// does not wrap.
    pub fn with_engine<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(Ctx<'js>) -> R,
    {
        self.core.context.with(f)
    }

    /// Convert a host value to a script value within an engine scope.
    ///
    /// This is the value converter: a context-consuming function becomes a
    /// context-free script function reading the current-context cell at
    /// call time; a namespace converts recursively; scalars and data pass
    /// through to the engine's native conversion.
    pub fn to_value<'js>(&self, ctx: &Ctx<'js>, value: &Bindable) -> rquickjs::Result<Value<'js>> {
        self.realize(ctx, value)
    }

    /// Install fresh `exports` / `module` globals for CommonJS-style code
    pub fn instantiate_env(&self) -> BridgeResult<()> {
        self.core
            .context
            .with(|ctx| -> rquickjs::Result<()> {
                let exports = Object::new(ctx.clone())?;
                let module = Object::new(ctx.clone())?;
                module.set("exports", exports.clone())?;
                let globals = ctx.globals();
                globals.set("exports", exports)?;
                globals.set("module", module)?;
                Ok(())
            })
            .map_err(BridgeError::from)
    }

    fn realize<'js>(&self, ctx: &Ctx<'js>, bindable: &Bindable) -> rquickjs::Result<Value<'js>> {
        match bindable {
            Bindable::Null => Ok(Value::new_null(ctx.clone())),
            Bindable::Bool(b) => (*b).into_js(ctx),
            Bindable::Int(i) => (*i).into_js(ctx),
            Bindable::Float(f) => (*f).into_js(ctx),
            Bindable::Str(s) => s.as_str().into_js(ctx),
            Bindable::Json(json) => json_to_js(ctx, json),
            Bindable::Map(entries) => {
                let object = Object::new(ctx.clone())?;
                for (name, value) in entries {
                    object.set(name.as_str(), self.realize(ctx, value)?)?;
                }
                Ok(object.into_value())
            }
            Bindable::Func(func) => self.realize_func(ctx, func),
        }
    }

    fn realize_func<'js>(&self, ctx: &Ctx<'js>, func: &NativeFunc) -> rquickjs::Result<Value<'js>> {
        let weak = Rc::downgrade(&self.core);
        let callable = func.callable.clone();
        let function = native_function(ctx, move |fctx, this, args| {
            let Some(core) = weak.upgrade() else {
                return Err(rquickjs::Error::Unknown);
            };
            let run = core.current.borrow().clone();
            callable.call_native(&run, &fctx, &this.0, &args.0)
        })?;

        if func.constructor {
            let trampoline = self.core.trampoline.clone().restore(ctx)?;
            let constructible: Function = trampoline.call((function,))?;
            Ok(constructible.into_value())
        } else {
            Ok(function.into_value())
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("compatibility_mode", &self.core.compat)
            .finish()
    }
}

/// Pin the closure to the exact shape the engine invokes bindings with
fn native_function<'js, F>(ctx: &Ctx<'js>, f: F) -> rquickjs::Result<Function<'js>>
where
    F: for<'a> Fn(Ctx<'a>, This<Value<'a>>, JsRest<Value<'a>>) -> rquickjs::Result<Value<'a>>
        + 'static,
{
    Function::new(ctx.clone(), f)
}

fn caught_to_error(err: CaughtError<'_>) -> BridgeError {
    match err {
        CaughtError::Error(e) => BridgeError::Engine(e.to_string()),
        other => BridgeError::Exception(other.to_string()),
    }
}
