//! Admission filters for message routes.
//!
//! A filter is a predicate that runs before a message handler. Each route
//! owns an ordered chain of filters, built once at startup; the first filter
//! that returns `false` rejects the request.
//!
//! ```rust,ignore
//! struct RequireToken;
//!
//! #[async_trait]
//! impl SocketFilter for RequireToken {
//!     async fn do_filter(&self, session: &Session, _: &str, _: &dyn RequestView) -> bool {
//!         session.attribute("authorization").is_some()
//!     }
//!
//!     fn priority(&self) -> Option<i32> {
//!         Some(0)
//!     }
//! }
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::RequestView;
use crate::registry::InstanceRegistry;
use crate::session::Session;
use crate::types::TypeToken;

/// An admission predicate run before a message handler.
#[async_trait]
pub trait SocketFilter: Send + Sync + 'static {
    /// Returns `true` to admit the request.
    ///
    /// `message` is the raw payload text exactly as received.
    async fn do_filter(&self, session: &Session, message: &str, request: &dyn RequestView)
    -> bool;

    /// Execution priority; lower runs first.
    ///
    /// Filters without a priority run after every prioritized filter.
    fn priority(&self) -> Option<i32> {
        None
    }

    /// Name used in logs.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

type ResolveFilterFn = fn(&InstanceRegistry) -> Option<Arc<dyn SocketFilter>>;

/// A reference to a filter type, resolved to an instance at build time.
#[derive(Clone, Copy)]
pub struct FilterRef {
    token: TypeToken,
    resolve: ResolveFilterFn,
}

impl FilterRef {
    /// References filter type `F`.
    pub fn of<F: SocketFilter>() -> Self {
        Self {
            token: TypeToken::of::<F>(),
            resolve: resolve_filter::<F>,
        }
    }

    /// Token of the filter type.
    pub fn token(&self) -> TypeToken {
        self.token
    }

    /// Looks the filter instance up in `registry`.
    pub fn resolve(&self, registry: &InstanceRegistry) -> Option<Arc<dyn SocketFilter>> {
        (self.resolve)(registry)
    }
}

impl fmt::Debug for FilterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilterRef").field(&self.token).finish()
    }
}

fn resolve_filter<F: SocketFilter>(registry: &InstanceRegistry) -> Option<Arc<dyn SocketFilter>> {
    registry.get::<F>().map(|filter| filter as Arc<dyn SocketFilter>)
}
