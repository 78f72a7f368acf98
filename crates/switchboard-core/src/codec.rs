//! Payload decoding boundary.
//!
//! Decoding is split in two steps. A [`PayloadDecoder`] turns raw frame text
//! into a format-neutral [`Value`]; the route's [`BodyType`] then shapes that
//! value into the `Request<T>` its handler declared. Swapping the decoder
//! changes the wire format without touching any route.

use std::any::type_name;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::envelope::{DecodedRequest, Request};
use crate::error::DecodeError;
use crate::types::TypeToken;

/// Turns a raw text payload into a [`Value`].
pub trait PayloadDecoder: Send + Sync {
    /// Decodes one raw payload.
    fn decode(&self, raw: &str) -> Result<Value, DecodeError>;
}

/// The default JSON decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl PayloadDecoder for JsonDecoder {
    fn decode(&self, raw: &str) -> Result<Value, DecodeError> {
        serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))
    }
}

/// Reads the route path from a decoded payload.
pub fn route_path(payload: &Value, field: &str) -> Result<String, DecodeError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| DecodeError::MissingPath(field.to_owned()))
}

type DecodeFn = fn(Value) -> Result<Box<dyn DecodedRequest>, DecodeError>;

/// The body type `T` of a message route, with the means to build `Request<T>`.
#[derive(Clone, Copy)]
pub struct BodyType {
    body: TypeToken,
    envelope: TypeToken,
    decode: DecodeFn,
}

impl BodyType {
    /// The body type for `Request<T>`.
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Self {
            body: TypeToken::of::<T>(),
            envelope: TypeToken::of::<Request<T>>(),
            decode: decode_request::<T>,
        }
    }

    /// Token of `T`.
    pub fn body(&self) -> TypeToken {
        self.body
    }

    /// Token of `Request<T>`.
    pub fn envelope(&self) -> TypeToken {
        self.envelope
    }

    /// Shapes a decoded payload into a boxed `Request<T>`.
    pub fn decode(&self, payload: Value) -> Result<Box<dyn DecodedRequest>, DecodeError> {
        (self.decode)(payload)
    }
}

impl fmt::Debug for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyType")
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

fn decode_request<T>(payload: Value) -> Result<Box<dyn DecodedRequest>, DecodeError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    serde_json::from_value::<Request<T>>(payload)
        .map(|request| Box::new(request) as Box<dyn DecodedRequest>)
        .map_err(|e| DecodeError::Shape {
            target: type_name::<Request<T>>(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Greeting {
        name: String,
    }

    #[test]
    fn test_json_decoder_rejects_garbage() {
        assert!(matches!(
            JsonDecoder.decode("{not json"),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_body_type_shapes_request() {
        let body = BodyType::of::<Greeting>();
        assert!(body.body().is::<Greeting>());
        assert!(body.envelope().is::<Request<Greeting>>());

        let payload = JsonDecoder
            .decode(r#"{"reqPath":"/hello","requestBody":{"name":"ada"}}"#)
            .unwrap();
        let decoded = body.decode(payload).unwrap();
        assert_eq!(decoded.req_path(), Some("/hello"));

        let request = decoded.into_any().downcast::<Request<Greeting>>().unwrap();
        assert_eq!(
            request.into_body(),
            Some(Greeting {
                name: "ada".into()
            })
        );
    }

    #[test]
    fn test_body_type_shape_mismatch() {
        let payload = JsonDecoder.decode(r#"{"requestBody":42}"#).unwrap();
        let err = BodyType::of::<Greeting>().decode(payload).err().unwrap();
        assert!(matches!(err, DecodeError::Shape { .. }));
    }

    #[test]
    fn test_route_path() {
        let payload = JsonDecoder.decode(r#"{"reqPath":"/a"}"#).unwrap();
        assert_eq!(route_path(&payload, "reqPath").unwrap(), "/a");
        assert!(matches!(
            route_path(&payload, "path"),
            Err(DecodeError::MissingPath(_))
        ));
    }
}
