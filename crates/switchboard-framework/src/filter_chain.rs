//! Filter ordering and execution.
//!
//! Filters are totally ordered by `(priority, declaration index)`, lower
//! first. Filters that declare no priority run after all prioritized ones,
//! in declaration order. The order is fixed when the chain is built and is
//! never recomputed while dispatching.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, trace, warn};

use switchboard_core::{
    BuildError, BuildResult, FilterRef, InstanceRegistry, RequestView, Session, SocketFilter,
    TypeToken,
};

/// One filter bound to a route, with its ordering key.
#[derive(Clone)]
pub struct FilterBinding {
    filter: Arc<dyn SocketFilter>,
    token: TypeToken,
    priority: Option<i32>,
    index: usize,
}

impl FilterBinding {
    /// Binds `filter`, declared at position `index` of the route's filter list.
    pub fn new(filter: Arc<dyn SocketFilter>, token: TypeToken, index: usize) -> Self {
        let priority = filter.priority();
        Self {
            filter,
            token,
            priority,
            index,
        }
    }

    /// The declared priority, if any.
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// Position in the route's declared filter list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The filter type.
    pub fn token(&self) -> TypeToken {
        self.token
    }

    /// The filter instance.
    pub fn filter(&self) -> &Arc<dyn SocketFilter> {
        &self.filter
    }

    fn order_key(&self) -> (bool, i32, usize) {
        (
            self.priority.is_none(),
            self.priority.unwrap_or_default(),
            self.index,
        )
    }
}

impl fmt::Debug for FilterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterBinding")
            .field("filter", &self.token)
            .field("priority", &self.priority)
            .field("index", &self.index)
            .finish()
    }
}

/// Result of running a [`FilterChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Every filter admitted the request (or the chain is empty).
    Admitted,
    /// A filter refused the request; later filters were not run.
    Rejected {
        /// Name of the refusing filter.
        filter: &'static str,
        /// Its position in execution order.
        position: usize,
    },
}

/// An immutable, ordered sequence of filters.
#[derive(Clone, Default)]
pub struct FilterChain {
    bindings: Vec<FilterBinding>,
}

impl FilterChain {
    /// Orders `bindings` by `(priority, declaration index)`.
    pub fn new(mut bindings: Vec<FilterBinding>) -> Self {
        bindings.sort_by_key(FilterBinding::order_key);
        Self { bindings }
    }

    /// An empty chain.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolves the declared filters of a handler and orders them.
    ///
    /// A filter without a priority is admitted with a warning.
    pub fn resolve(
        owner: &'static str,
        method: &'static str,
        refs: &[FilterRef],
        registry: &InstanceRegistry,
    ) -> BuildResult<Self> {
        let mut bindings = Vec::with_capacity(refs.len());

        for (index, filter_ref) in refs.iter().enumerate() {
            let filter =
                filter_ref
                    .resolve(registry)
                    .ok_or_else(|| BuildError::UnresolvedFilter {
                        owner,
                        method,
                        filter: filter_ref.token(),
                    })?;

            let binding = FilterBinding::new(filter, filter_ref.token(), index);
            if binding.priority().is_none() {
                warn!(
                    filter = %filter_ref.token(),
                    owner,
                    method,
                    "Filter declares no priority, it will run after prioritized filters"
                );
            }
            bindings.push(binding);
        }

        Ok(Self::new(bindings))
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if there are no filters.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &FilterBinding> {
        self.bindings.iter()
    }

    /// Runs the filters one after another, stopping at the first refusal.
    ///
    /// A filter that panics counts as a refusal.
    pub async fn run(
        &self,
        session: &Session,
        message: &str,
        request: &dyn RequestView,
    ) -> FilterVerdict {
        for (position, binding) in self.bindings.iter().enumerate() {
            let filter = binding.filter();
            let admitted = AssertUnwindSafe(filter.do_filter(session, message, request))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    error!(
                        filter = filter.name(),
                        panic = %panic_message(&*panic),
                        "Filter panicked, rejecting request"
                    );
                    false
                });

            trace!(filter = filter.name(), position, admitted, "Filter evaluated");

            if !admitted {
                return FilterVerdict::Rejected {
                    filter: filter.name(),
                    position,
                };
            }
        }

        FilterVerdict::Admitted
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.bindings.iter()).finish()
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
