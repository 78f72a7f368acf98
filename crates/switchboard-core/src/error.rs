//! Error types shared across the Switchboard crates.
//!
//! Build-time errors ([`BuildError`] and its parts) abort route table
//! construction. Runtime errors ([`DecodeError`], [`SendError`],
//! [`InvokeError`]) are reported by the dispatcher and never escape it.

use thiserror::Error;

use crate::types::TypeToken;

// =============================================================================
// Build-time errors
// =============================================================================

/// A handler method whose declared shape does not match its event kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingSignatureError {
    /// Wrong number of parameters.
    #[error("{owner}::{method}: the number of parameters is not {expected} (found {found})")]
    ParameterCount {
        owner: &'static str,
        method: &'static str,
        expected: usize,
        found: usize,
    },

    /// Wrong return type.
    #[error("{owner}::{method}: return type is not {expected} (found {found})")]
    ReturnType {
        owner: &'static str,
        method: &'static str,
        expected: TypeToken,
        found: TypeToken,
    },

    /// A positional parameter has the wrong type.
    #[error("{owner}::{method}: bad parameter #{position}, expected {expected} (found {found})")]
    ParameterType {
        owner: &'static str,
        method: &'static str,
        position: usize,
        expected: TypeToken,
        found: TypeToken,
    },

    /// A message handler whose parameter is not a `Request<T>` envelope.
    #[error("{owner}::{method}: parameter {found} is not a request envelope")]
    NotAnEnvelope {
        owner: &'static str,
        method: &'static str,
        found: TypeToken,
    },
}

/// Two message handlers mapped to the same path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{owner}::{method}: path '{path}' is already in use by {existing_owner}::{existing_method}")]
pub struct RoutePathConflict {
    /// The conflicting path.
    pub path: String,
    /// Owner of the handler being registered.
    pub owner: &'static str,
    /// Name of the handler being registered.
    pub method: &'static str,
    /// Owner of the handler already holding the path.
    pub existing_owner: &'static str,
    /// Name of the handler already holding the path.
    pub existing_method: &'static str,
}

/// Fatal route table construction failure.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// A handler failed signature validation.
    #[error(transparent)]
    Signature(#[from] MappingSignatureError),

    /// Two handlers claim the same message path.
    #[error(transparent)]
    PathConflict(#[from] RoutePathConflict),

    /// No instance registered for a handler-owning type.
    #[error("no instance registered for controller {0}")]
    UnresolvedInstance(TypeToken),

    /// No instance registered for a filter type.
    #[error("{owner}::{method}: no instance registered for filter {filter}")]
    UnresolvedFilter {
        owner: &'static str,
        method: &'static str,
        filter: TypeToken,
    },
}

/// Result type for route table construction.
pub type BuildResult<T> = Result<T, BuildError>;

// =============================================================================
// Runtime errors
// =============================================================================

/// Failure to decode a raw payload.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The payload is not well-formed for the decoder's format.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The payload is well-formed but does not fit the target type.
    #[error("payload does not match {target}: {reason}")]
    Shape {
        target: &'static str,
        reason: String,
    },

    /// The payload carries no route path.
    #[error("payload has no '{0}' field")]
    MissingPath(String),
}

/// Failure to deliver an outbound message.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The target session is not (or no longer) connected.
    #[error("session '{0}' is not connected")]
    SessionNotFound(String),

    /// The session's outbound channel is closed.
    #[error("session '{0}' outbound channel is closed")]
    Closed(String),

    /// The response could not be encoded.
    #[error("failed to encode response: {0}")]
    Encode(String),
}

/// Failure raised while invoking a handler.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// The resolved owner instance is not of the handler's owning type.
    #[error("owner instance is not a {0}")]
    OwnerMismatch(&'static str),

    /// The invoker asked for more arguments than were supplied.
    #[error("missing argument #{0}")]
    MissingArgument(usize),

    /// A supplied argument is not of the declared parameter type.
    #[error("argument #{position} is not a {expected}")]
    ArgumentType {
        position: usize,
        expected: &'static str,
    },

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}
