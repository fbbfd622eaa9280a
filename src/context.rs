//! Immutable propagation contexts and the thread-local scope stack.
//!
//! A [`Context`] is a value: a baggage map plus an optional active span.
//! Deriving one never mutates the original, and values cross threads
//! freely. What is thread-bound is the *scope stack*: each OS thread has
//! its own stack of attached contexts, and [`Context::current`] reads its
//! top.
//!
//! Attach/detach is token-keyed, not depth-keyed. [`Context::attach`]
//! returns a [`ScopeToken`] proving that specific attach; detaching it
//! restores the context that was current immediately before it, removing
//! any frames attached on top in the process. A token whose frame was
//! already removed that way reports [`ContextError::StaleToken`].
//!
//! Asynchronous hand-off is explicit value passing: capture a `Context`
//! before scheduling a continuation, attach it inside the continuation,
//! detach at its end. [`Context::enter`] wraps the pair in an RAII guard.

use crate::span::Span;
use crate::types::SpanId;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Clone)]
struct StackFrame {
    token_id: u64,
    context: Context,
}

thread_local! {
    static SCOPE_STACK: RefCell<Vec<StackFrame>> = const { RefCell::new(Vec::new()) };
}

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

fn push_frame(context: Context) -> u64 {
    let token_id = NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed);
    SCOPE_STACK.with(|stack| {
        stack.borrow_mut().push(StackFrame { token_id, context });
    });
    token_id
}

fn detach_frame(token_id: u64) -> Result<(), ContextError> {
    SCOPE_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.iter().rposition(|frame| frame.token_id == token_id) {
            Some(pos) => {
                stack.truncate(pos);
                Ok(())
            }
            None => Err(ContextError::StaleToken),
        }
    })
}

/// Errors from scope operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The token's frame is no longer on this thread's stack. An enclosing
    /// detach already removed it.
    #[error("scope token is stale: its frame was already detached")]
    StaleToken,
}

/// An immutable propagation context.
///
/// Carries a baggage map of string pairs and an optional active span.
/// Every `with_*` derivation returns a new value; clones share nothing
/// mutable.
#[derive(Debug, Clone, Default)]
pub struct Context {
    baggage: BTreeMap<String, String>,
    active_span: Option<Span>,
}

impl Context {
    /// The well-defined empty context: no baggage, no active span.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a context with `key` set to `value` in the baggage.
    #[must_use]
    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.insert(key.into(), value.into());
        self
    }

    /// Returns a context with `key` removed from the baggage.
    #[must_use]
    pub fn without_baggage(mut self, key: &str) -> Self {
        self.baggage.remove(key);
        self
    }

    /// Returns a context with `span` as the active span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.active_span = Some(span);
        self
    }

    /// Returns a context with no active span.
    #[must_use]
    pub fn without_span(mut self) -> Self {
        self.active_span = None;
        self
    }

    /// Merges another context into this one.
    ///
    /// Baggage entries from `other` win on key collision. The active span
    /// from `other` wins if present.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (k, v) in &other.baggage {
            merged.baggage.insert(k.clone(), v.clone());
        }
        if let Some(span) = &other.active_span {
            merged.active_span = Some(span.clone());
        }
        merged
    }

    /// Gets a baggage entry.
    #[must_use]
    pub fn baggage(&self, key: &str) -> Option<&str> {
        self.baggage.get(key).map(String::as_str)
    }

    /// Iterates over baggage entries in key order.
    pub fn baggage_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.baggage.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of baggage entries.
    #[must_use]
    pub fn baggage_len(&self) -> usize {
        self.baggage.len()
    }

    /// Returns the active span, if any.
    #[must_use]
    pub fn active_span(&self) -> Option<&Span> {
        self.active_span.as_ref()
    }

    /// Returns the active span's ID, if any.
    #[must_use]
    pub fn active_span_id(&self) -> Option<SpanId> {
        self.active_span.as_ref().map(Span::id)
    }

    /// Makes this context current on this thread.
    ///
    /// Returns a token that must be handed back to [`ScopeToken::detach`]
    /// to restore the previous context. Prefer [`Context::enter`] unless
    /// attach and detach happen in different stack frames.
    pub fn attach(&self) -> ScopeToken {
        ScopeToken {
            id: push_frame(self.clone()),
            _not_send: PhantomData,
        }
    }

    /// Makes this context current on this thread for the returned guard's
    /// lifetime.
    ///
    /// The guard restores the previous context when dropped, on every
    /// exit path including unwinds.
    #[must_use]
    pub fn enter(&self) -> ContextScope {
        ContextScope {
            token_id: push_frame(self.clone()),
            _not_send: PhantomData,
        }
    }

    /// Returns the context current on this thread.
    ///
    /// If nothing is attached, returns [`Context::root`].
    #[must_use]
    pub fn current() -> Self {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map_or_else(Self::root, |frame| frame.context.clone())
        })
    }
}

/// Proof of a specific attach.
///
/// Detaching restores the context that was current immediately before the
/// matching attach; frames attached after it are removed too. Tokens are
/// thread-bound and cannot be sent to another thread.
#[must_use = "detach the token to restore the previous context"]
pub struct ScopeToken {
    id: u64,
    _not_send: PhantomData<Rc<()>>,
}

impl ScopeToken {
    /// Restores the context that was current before the matching attach.
    ///
    /// Fails with [`ContextError::StaleToken`] if this token's frame was
    /// already removed by an enclosing detach.
    pub fn detach(self) -> Result<(), ContextError> {
        detach_frame(self.id)
    }
}

impl std::fmt::Debug for ScopeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeToken").field("id", &self.id).finish()
    }
}

/// RAII guard over an attach; detaches on drop.
pub struct ContextScope {
    token_id: u64,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        // A stale frame here means an enclosing detach already removed it;
        // there is nothing left to restore.
        let _ = detach_frame(self.token_id);
    }
}

impl std::fmt::Debug for ContextScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextScope")
            .field("token_id", &self.token_id)
            .finish()
    }
}
