//! quickbridge - Embed QuickJS in a Rust host
//!
//! This crate wires a host application into an embedded JavaScript engine:
//! host objects become script-callable bindings, every evaluation carries a
//! [`RunContext`] that native callbacks can observe, and independent
//! runtimes can share lazily-built immutable data through a single-flight
//! [`SharedObjects`] store.
//!
//! # Example
//!
//! ```ignore
//! use quickbridge::{HostObject, RunContext, Runtime};
//!
//! let rt = Runtime::new()?;
//! rt.bind("calc", &HostObject::new().method("Add", |a: i64, b: i64| a + b))?;
//!
//! let ctx = RunContext::background();
//! let sum: i64 = rt.run_string(&ctx, "calc.add(2, 3)")?;
//! assert_eq!(sum, 5);
//! ```
//!
//! A method whose first parameter is `&RunContext` sees the context of the
//! evaluation that invoked it, not the context at registration time:
//!
//! ```ignore
//! let obj = HostObject::new().method("Lookup", |run: &RunContext, key: String| {
//!     run.value_as::<String>(&key).map(|v| (*v).clone()).unwrap_or_default()
//! });
//! ```

#![warn(missing_docs)]

pub mod bind;
pub mod compat;
pub mod console;
pub mod context;
pub mod convert;
pub mod error;
pub mod namemap;
pub mod runtime;
pub mod shared;

pub use bind::{Bindable, ExportSet, HostMethod, HostObject, NativeCall, RawHostFn};
pub use compat::{validate_compatibility_mode, CompatibilityMode, RuntimeOptions};
pub use console::{Console, ConsoleLevel, ConsoleSink, LogEntry, MemorySink, StdioSink};
pub use context::{CancelToken, RunContext};
pub use convert::{FromScript, IntoScript, Rest};
pub use error::{throw, BridgeError, BridgeResult};
pub use runtime::{Program, Runtime};
pub use shared::{init_env, with_init_env, InitEnvironment, SharedObjects, SharedValue};

// The embedded engine, for raw access through `Runtime::with_engine`.
pub use rquickjs;
