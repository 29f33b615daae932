//! Ordered interceptor chains.
//!
//! A [`Chain`] is an ordered list of interceptors. [`Chain::then`] nests
//! them around a handler right-to-left, so the first interceptor in the
//! list is the outermost wrapper: it is entered first and exited last.
//!
//! ```text
//! Chain [logging, metrics, auth].then(handler)
//!
//!   logging ─▶ metrics ─▶ auth ─▶ handler
//!   logging ◀─ metrics ◀─ auth ◀─┘
//! ```
//!
//! Chains hold shared interceptor instances, not registry references, so
//! changes to a registry never affect a chain that was already built.

use crate::handler::BoxedHandler;
use crate::interceptor::BoxedInterceptor;
use std::fmt;
use std::sync::Arc;

/// An ordered sequence of interceptors.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<BoxedInterceptor>,
}

impl Chain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chain from interceptors in outermost-first order.
    #[must_use]
    pub fn from_layers(layers: Vec<BoxedInterceptor>) -> Self {
        Self { layers }
    }

    /// Appends one more (innermost) layer.
    #[must_use]
    pub fn with(mut self, interceptor: BoxedInterceptor) -> Self {
        self.layers.push(interceptor);
        self
    }

    /// Returns a new chain with `other`'s layers after this chain's layers.
    ///
    /// Neither chain is modified.
    #[must_use]
    pub fn append(&self, other: &Self) -> Self {
        let mut layers = Vec::with_capacity(self.layers.len() + other.layers.len());
        layers.extend(self.layers.iter().cloned());
        layers.extend(other.layers.iter().cloned());
        Self { layers }
    }

    /// Wraps `handler` with every layer.
    ///
    /// An empty chain returns `handler` itself.
    #[must_use]
    pub fn then(&self, handler: BoxedHandler) -> BoxedHandler {
        self.layers
            .iter()
            .rev()
            .fold(handler, |next, layer| Arc::clone(layer).wrap(next))
    }

    /// Returns the number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns true if the chain has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Returns the layer names, outermost first.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("layers", &self.names())
            .finish()
    }
}
