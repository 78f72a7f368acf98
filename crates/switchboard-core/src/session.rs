//! Socket session handles.
//!
//! The transport owns the connection; the dispatcher only ever sees a
//! [`Session`], a cheap clonable handle carrying the session identifier and
//! whatever connection metadata the transport chose to attach.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of one socket session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug)]
struct SessionInner {
    id: SessionId,
    remote_addr: Option<String>,
    attributes: HashMap<String, String>,
}

/// A handle to one live socket session.
///
/// Cloning is cheap; all clones refer to the same session data.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Creates a session with the given identifier and no metadata.
    pub fn new(id: impl Into<SessionId>) -> Self {
        Self::builder(id).build()
    }

    /// Starts building a session with metadata.
    pub fn builder(id: impl Into<SessionId>) -> SessionBuilder {
        SessionBuilder {
            id: id.into(),
            remote_addr: None,
            attributes: HashMap::new(),
        }
    }

    /// Returns the session identifier.
    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// Returns the remote peer address, if the transport recorded one.
    pub fn remote_addr(&self) -> Option<&str> {
        self.inner.remote_addr.as_deref()
    }

    /// Returns a connection attribute (for example an upgrade header).
    ///
    /// Keys are stored lowercase.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.inner
            .attributes
            .get(&key.to_lowercase())
            .map(String::as_str)
    }

    /// Returns all connection attributes.
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.inner.attributes
    }
}

/// Builder for [`Session`].
#[derive(Debug)]
pub struct SessionBuilder {
    id: SessionId,
    remote_addr: Option<String>,
    attributes: HashMap<String, String>,
}

impl SessionBuilder {
    /// Records the remote peer address.
    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Adds a connection attribute. The key is lowercased.
    pub fn attribute(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(key.as_ref().to_lowercase(), value.into());
        self
    }

    /// Finishes the session.
    pub fn build(self) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                id: self.id,
                remote_addr: self.remote_addr,
                attributes: self.attributes,
            }),
        }
    }
}

/// Status reported when a session closes.
///
/// Codes follow RFC 6455 section 7.4.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseStatus {
    code: u16,
    reason: Option<String>,
}

impl CloseStatus {
    pub const NORMAL: CloseStatus = CloseStatus::from_code(1000);
    pub const GOING_AWAY: CloseStatus = CloseStatus::from_code(1001);
    pub const PROTOCOL_ERROR: CloseStatus = CloseStatus::from_code(1002);
    pub const NOT_ACCEPTABLE: CloseStatus = CloseStatus::from_code(1003);
    pub const NO_STATUS: CloseStatus = CloseStatus::from_code(1005);
    pub const NO_CLOSE_FRAME: CloseStatus = CloseStatus::from_code(1006);
    pub const BAD_DATA: CloseStatus = CloseStatus::from_code(1007);
    pub const POLICY_VIOLATION: CloseStatus = CloseStatus::from_code(1008);
    pub const TOO_BIG: CloseStatus = CloseStatus::from_code(1009);
    pub const SERVER_ERROR: CloseStatus = CloseStatus::from_code(1011);

    /// Creates a status with a code and no reason.
    pub const fn from_code(code: u16) -> Self {
        Self { code, reason: None }
    }

    /// Creates a status with a code and a reason.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: Some(reason.into()),
        }
    }

    /// Returns a copy of this status with the given reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Returns the numeric close code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Returns the close reason, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Returns `true` for a clean `1000` close.
    pub fn is_normal(&self) -> bool {
        self.code == 1000
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({reason})", self.code),
            None => write!(f, "{}", self.code),
        }
    }
}
