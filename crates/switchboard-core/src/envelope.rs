//! Request and response envelopes.
//!
//! Every inbound message is decoded into a [`Request<T>`] where `T` is the
//! body type the target handler declared. Filters see the request through
//! the type-erased [`RequestView`], since one filter can guard routes with
//! different body types.
//!
//! Wire shape (JSON, camelCase):
//!
//! ```text
//! {"reqPath": "/echo", "requestBody": "hi"}
//! ```

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::error::SendError;
use crate::session::SessionId;
use crate::types::TypeToken;

/// Typed request envelope handed to message handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    /// The route path carried in the payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_path: Option<String>,

    /// The originating session. Attached by the dispatcher, never read from
    /// the payload.
    #[serde(default, skip_deserializing)]
    pub session_id: SessionId,

    /// The decoded body. `None` when the payload omitted it or sent `null`.
    pub request_body: Option<T>,
}

impl<T> Request<T> {
    /// Creates a request with a body and no path.
    pub fn new(body: T) -> Self {
        Self {
            req_path: None,
            session_id: SessionId::default(),
            request_body: Some(body),
        }
    }

    /// Creates a request without a body.
    pub fn empty() -> Self {
        Self {
            req_path: None,
            session_id: SessionId::default(),
            request_body: None,
        }
    }

    /// Sets the originating session.
    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Returns the body, if present.
    pub fn body(&self) -> Option<&T> {
        self.request_body.as_ref()
    }

    /// Consumes the request and returns the body.
    pub fn into_body(self) -> Option<T> {
        self.request_body
    }
}

/// Type-erased, read-only view of a decoded [`Request`].
pub trait RequestView: Send + Sync {
    /// The originating session.
    fn session_id(&self) -> &SessionId;

    /// The route path carried in the payload, if any.
    fn req_path(&self) -> Option<&str>;

    /// Whether a body is present.
    fn has_body(&self) -> bool;

    /// The body as `dyn Any`, for filters that know the concrete type.
    fn body_any(&self) -> Option<&dyn Any>;

    /// The declared body type.
    fn body_type(&self) -> TypeToken;
}

impl dyn RequestView + '_ {
    /// Downcasts the body to `T`.
    pub fn body<T: 'static>(&self) -> Option<&T> {
        self.body_any()?.downcast_ref::<T>()
    }
}

/// A decoded request as produced by a [`BodyType`](crate::codec::BodyType).
///
/// The dispatcher attaches the session, lets filters inspect it, and finally
/// hands the boxed `Request<T>` to the handler's invoker.
pub trait DecodedRequest: RequestView {
    /// Attaches the originating session.
    fn attach_session(&mut self, session_id: SessionId);

    /// Borrows the request as a [`RequestView`].
    fn as_view(&self) -> &dyn RequestView;

    /// Converts into the boxed concrete `Request<T>`.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Send + Sync + 'static> RequestView for Request<T> {
    fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn req_path(&self) -> Option<&str> {
        self.req_path.as_deref()
    }

    fn has_body(&self) -> bool {
        self.request_body.is_some()
    }

    fn body_any(&self) -> Option<&dyn Any> {
        self.request_body.as_ref().map(|b| b as &dyn Any)
    }

    fn body_type(&self) -> TypeToken {
        TypeToken::of::<T>()
    }
}

impl<T: Send + Sync + 'static> DecodedRequest for Request<T> {
    fn attach_session(&mut self, session_id: SessionId) {
        self.session_id = session_id;
    }

    fn as_view(&self) -> &dyn RequestView {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Outcome marker of a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Outbound response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response<T = ()> {
    pub status: ResponseStatus,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<T>,
}

impl<T> Response<T> {
    /// A `200` response carrying `body`.
    pub fn ok(body: T) -> Self {
        Self {
            status: ResponseStatus::Ok,
            code: 200,
            message: None,
            req_path: None,
            response_body: Some(body),
        }
    }

    /// An error response without a body.
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            code,
            message: Some(message.into()),
            req_path: None,
            response_body: None,
        }
    }

    /// Tags the response with the route path it answers.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.req_path = Some(path.into());
        self
    }

    /// Returns `true` for an error response.
    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

impl<T: Serialize> Response<T> {
    /// Encodes the response as JSON text.
    pub fn to_json(&self) -> Result<String, SendError> {
        serde_json::to_string(self).map_err(|e| SendError::Encode(e.to_string()))
    }
}

/// Rejections the dispatcher sends on a handler's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseError {
    /// A filter refused the request.
    FilteringFail,
    /// The route requires a body and none was sent.
    RequestBodyRequired,
    /// The payload could not be decoded for the route's body type.
    MalformedRequest,
    /// No route is registered for the path.
    UnknownPath,
}

impl ResponseError {
    /// Numeric code of the rejection.
    pub fn code(&self) -> u16 {
        match self {
            Self::FilteringFail => 403,
            Self::RequestBodyRequired | Self::MalformedRequest => 400,
            Self::UnknownPath => 404,
        }
    }

    /// Human-readable message of the rejection.
    pub fn message(&self) -> &'static str {
        match self {
            Self::FilteringFail => "request rejected by filter",
            Self::RequestBodyRequired => "request body is required",
            Self::MalformedRequest => "request payload could not be decoded",
            Self::UnknownPath => "no handler is mapped to this path",
        }
    }

    /// Builds the error response for this rejection.
    pub fn response(&self) -> Response {
        Response::error(self.code(), self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_decodes_camel_case() {
        let request: Request<String> =
            serde_json::from_str(r#"{"reqPath":"/echo","requestBody":"hi","sessionId":"x"}"#)
                .unwrap();
        assert_eq!(request.req_path.as_deref(), Some("/echo"));
        assert_eq!(request.body().map(String::as_str), Some("hi"));
        // Never taken from the payload.
        assert_eq!(request.session_id, SessionId::default());
    }

    #[test]
    fn test_request_null_body_is_absent() {
        let request: Request<String> = serde_json::from_str(r#"{"requestBody":null}"#).unwrap();
        assert!(!request.has_body());
        let request: Request<String> = serde_json::from_str("{}").unwrap();
        assert!(request.into_body().is_none());
    }

    #[test]
    fn test_view_downcasts_body() {
        let request = Request::new(7_u32).with_session("s-1");
        let view: &dyn RequestView = &request;
        assert_eq!(view.body::<u32>(), Some(&7));
        assert_eq!(view.body::<String>(), None);
        assert_eq!(view.session_id().as_str(), "s-1");
        assert!(view.body_type().is::<u32>());
    }

    #[test]
    fn test_error_response_json() {
        let json = ResponseError::FilteringFail.response().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["code"], 403);
        assert!(value.get("responseBody").is_none());
    }

    /// A body type with no `Default` impl.
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    #[test]
    fn test_body_without_default_decodes() {
        let request: Request<Note> =
            serde_json::from_str(r#"{"reqPath":"/note","requestBody":{"text":"hi"}}"#).unwrap();
        assert_eq!(request.body(), Some(&Note { text: "hi".into() }));

        let request: Request<Note> = serde_json::from_str(r#"{"reqPath":"/note"}"#).unwrap();
        assert!(!request.has_body());
    }

    #[test]
    fn test_response_without_body_decodes() {
        let response: Response<Note> =
            serde_json::from_str(r#"{"status":"error","code":400,"message":"bad"}"#).unwrap();
        assert!(response.is_error());
        assert!(response.response_body.is_none());

        let response: Response<Note> =
            serde_json::from_str(r#"{"status":"ok","code":200,"responseBody":{"text":"x"}}"#)
                .unwrap();
        assert!(!response.is_error());
        assert_eq!(response.response_body, Some(Note { text: "x".into() }));
    }
}
