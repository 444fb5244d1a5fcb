//! Per-evaluation execution context
//!
//! A [`RunContext`] carries request-scoped values and a cancellation token
//! into native callbacks invoked from script code. It is an immutable chain:
//! every `with_*` call returns a new context that shadows its parent, and
//! lookups walk the chain from the newest entry outward.
//!
//! Contexts are cheap to clone and stay on the thread that created them.
//! The cancellation token alone is `Send`, so another thread can cancel an
//! evaluation in flight.

use std::any::Any;
use std::borrow::Cow;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::runtime::{Runtime, RuntimeCore};

/// Cancellation token carried by a [`RunContext`].
///
/// Cloning shares the underlying flag. The token is `Send + Sync`; hand a
/// clone to another thread to cancel a running evaluation.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every context holding this token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether the token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

enum Entry {
    Value {
        key: Cow<'static, str>,
        value: Rc<dyn Any>,
    },
    Cancel(CancelToken),
    Runtime(Weak<RuntimeCore>),
}

struct Node {
    parent: Option<Rc<Node>>,
    entry: Entry,
}

/// Ambient carrier of request-scoped values and cancellation for one
/// evaluation call.
#[derive(Clone, Default)]
pub struct RunContext {
    head: Option<Rc<Node>>,
}

impl RunContext {
    /// The empty root context
    pub fn background() -> Self {
        Self::default()
    }

    fn push(&self, entry: Entry) -> Self {
        RunContext {
            head: Some(Rc::new(Node {
                parent: self.head.clone(),
                entry,
            })),
        }
    }

    /// Derive a context carrying `value` under `key`.
    ///
    /// The new entry shadows any parent entry with the same key.
    pub fn with_value<V: Any + 'static>(&self, key: impl Into<Cow<'static, str>>, value: V) -> Self {
        self.push(Entry::Value {
            key: key.into(),
            value: Rc::new(value),
        })
    }

    /// Look up the nearest value stored under `key`
    pub fn value(&self, key: &str) -> Option<Rc<dyn Any>> {
        let mut node = self.head.as_ref();
        while let Some(n) = node {
            if let Entry::Value { key: k, value } = &n.entry {
                if k == key {
                    return Some(value.clone());
                }
            }
            node = n.parent.as_ref();
        }
        None
    }

    /// Look up `key` and downcast the stored value to `T`
    pub fn value_as<T: Any>(&self, key: &str) -> Option<Rc<T>> {
        self.value(key).and_then(|v| v.downcast::<T>().ok())
    }

    /// Derive a cancellable context. The returned token cancels it.
    pub fn with_cancel(&self) -> (Self, CancelToken) {
        let token = CancelToken::new();
        (self.push(Entry::Cancel(token.clone())), token)
    }

    /// True if this context or any ancestor has been cancelled
    pub fn is_cancelled(&self) -> bool {
        let mut node = self.head.as_ref();
        while let Some(n) = node {
            if let Entry::Cancel(token) = &n.entry {
                if token.is_cancelled() {
                    return true;
                }
            }
            node = n.parent.as_ref();
        }
        false
    }

    /// Snapshot of every cancellation token on the chain, newest first.
    ///
    /// The tokens are `Send`; the engine interrupt handler polls them from
    /// whatever thread the engine calls back on.
    pub(crate) fn cancel_tokens(&self) -> Vec<CancelToken> {
        let mut tokens = Vec::new();
        let mut node = self.head.as_ref();
        while let Some(n) = node {
            if let Entry::Cancel(token) = &n.entry {
                tokens.push(token.clone());
            }
            node = n.parent.as_ref();
        }
        tokens
    }

    /// Derive a context that records `rt` as the runtime evaluating on its
    /// behalf. The context does not keep the runtime alive.
    pub fn with_runtime(&self, rt: &Runtime) -> Self {
        self.push(Entry::Runtime(rt.downgrade()))
    }

    /// Recover the runtime evaluating on behalf of this context, if it is
    /// still alive. Native code invoked mid-script uses this to call back
    /// into the engine.
    pub fn runtime(&self) -> Option<Runtime> {
        let mut node = self.head.as_ref();
        while let Some(n) = node {
            if let Entry::Runtime(weak) = &n.entry {
                return weak.upgrade().map(Runtime::from_core);
            }
            node = n.parent.as_ref();
        }
        None
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut depth = 0usize;
        let mut node = self.head.as_ref();
        while let Some(n) = node {
            depth += 1;
            node = n.parent.as_ref();
        }
        f.debug_struct("RunContext").field("entries", &depth).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_lookup_and_shadowing() {
        let root = RunContext::background();
        assert!(root.value("a").is_none());

        let a = root.with_value("a", "one".to_string());
        let b = a.with_value("b", 2i64);
        let shadowed = b.with_value("a", "two".to_string());

        assert_eq!(*b.value_as::<String>("a").unwrap(), "one");
        assert_eq!(*shadowed.value_as::<String>("a").unwrap(), "two");
        assert_eq!(*shadowed.value_as::<i64>("b").unwrap(), 2);
        // The parent chain is untouched.
        assert_eq!(*a.value_as::<String>("a").unwrap(), "one");
    }

    #[test]
    fn test_value_downcast_mismatch() {
        let ctx = RunContext::background().with_value("n", 7i64);
        assert!(ctx.value_as::<String>("n").is_none());
        assert!(ctx.value_as::<i64>("n").is_some());
    }

    #[test]
    fn test_cancel_propagates_to_children() {
        let (parent, token) = RunContext::background().with_cancel();
        let child = parent.with_value("k", 1i64);
        assert!(!child.is_cancelled());

        token.cancel();
        assert!(parent.is_cancelled());
        assert!(child.is_cancelled());
        // Siblings derived from the root are unaffected.
        assert!(!RunContext::background().is_cancelled());
    }

    #[test]
    fn test_cancel_token_is_send() {
        let (ctx, token) = RunContext::background().with_cancel();
        let handle = std::thread::spawn(move || token.cancel());
        handle.join().unwrap();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_runtime_absent() {
        assert!(RunContext::background().runtime().is_none());
    }
}
