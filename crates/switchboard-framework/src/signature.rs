//! Handler signature validation.
//!
//! Every candidate handler is checked against the shape its event kind
//! requires before it is admitted into a routing table:
//!
//! | Kind         | Required shape                   |
//! |--------------|----------------------------------|
//! | `Connect`    | `(Session) -> ()`                |
//! | `Disconnect` | `(Session, CloseStatus) -> ()`   |
//! | `Message`    | `(Request<T>) -> ()`             |
//!
//! Checks run in a fixed order: parameter count, return type, then each
//! parameter by position. The first mismatch is reported.

use switchboard_core::{
    BodyType, CloseStatus, HandlerMethod, MappingSignatureError, MessageMapping, Session,
    TypeToken,
};

/// Checks `method` against a required return type and parameter list.
pub fn validate_signature(
    owner: &'static str,
    method: &HandlerMethod,
    returns: TypeToken,
    params: &[TypeToken],
) -> Result<(), MappingSignatureError> {
    let signature = method.signature();

    if signature.arity() != params.len() {
        return Err(MappingSignatureError::ParameterCount {
            owner,
            method: method.name(),
            expected: params.len(),
            found: signature.arity(),
        });
    }

    if signature.returns() != returns {
        return Err(MappingSignatureError::ReturnType {
            owner,
            method: method.name(),
            expected: returns,
            found: signature.returns(),
        });
    }

    for (position, (found, expected)) in signature.params().iter().zip(params).enumerate() {
        if found != expected {
            return Err(MappingSignatureError::ParameterType {
                owner,
                method: method.name(),
                position,
                expected: *expected,
                found: *found,
            });
        }
    }

    Ok(())
}

/// Checks a connect handler: `(Session) -> ()`.
pub fn validate_connect(
    owner: &'static str,
    method: &HandlerMethod,
) -> Result<(), MappingSignatureError> {
    validate_signature(
        owner,
        method,
        TypeToken::unit(),
        &[TypeToken::of::<Session>()],
    )
}

/// Checks a disconnect handler: `(Session, CloseStatus) -> ()`.
pub fn validate_disconnect(
    owner: &'static str,
    method: &HandlerMethod,
) -> Result<(), MappingSignatureError> {
    validate_signature(
        owner,
        method,
        TypeToken::unit(),
        &[TypeToken::of::<Session>(), TypeToken::of::<CloseStatus>()],
    )
}

/// Checks a message handler: `(Request<T>) -> ()`, returning the body type `T`.
pub fn validate_message(
    owner: &'static str,
    method: &HandlerMethod,
    mapping: &MessageMapping,
) -> Result<BodyType, MappingSignatureError> {
    let Some(body) = mapping.body_type() else {
        let signature = method.signature();
        return Err(match signature.params() {
            [_] if signature.returns() != TypeToken::unit() => MappingSignatureError::ReturnType {
                owner,
                method: method.name(),
                expected: TypeToken::unit(),
                found: signature.returns(),
            },
            [found] => MappingSignatureError::NotAnEnvelope {
                owner,
                method: method.name(),
                found: *found,
            },
            params => MappingSignatureError::ParameterCount {
                owner,
                method: method.name(),
                expected: 1,
                found: params.len(),
            },
        });
    };

    validate_signature(owner, method, TypeToken::unit(), &[body.envelope()])?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use switchboard_core::{HandlerKind, MethodSignature, Request};

    const OWNER: &str = "tests::Lobby";

    fn method(params: Vec<TypeToken>, returns: TypeToken) -> HandlerMethod {
        HandlerMethod::new("candidate", MethodSignature::new(params, returns), |_, _| {
            async { Ok(()) }.boxed()
        })
    }

    #[test]
    fn test_connect_exact_shape_is_admitted() {
        let m = method(vec![TypeToken::of::<Session>()], TypeToken::unit());
        assert!(validate_connect(OWNER, &m).is_ok());
    }

    #[test]
    fn test_connect_wrong_count() {
        let m = method(
            vec![TypeToken::of::<Session>(), TypeToken::of::<u32>()],
            TypeToken::unit(),
        );
        assert_eq!(
            validate_connect(OWNER, &m),
            Err(MappingSignatureError::ParameterCount {
                owner: OWNER,
                method: "candidate",
                expected: 1,
                found: 2,
            })
        );

        let m = method(vec![], TypeToken::unit());
        assert!(matches!(
            validate_connect(OWNER, &m),
            Err(MappingSignatureError::ParameterCount { found: 0, .. })
        ));
    }

    #[test]
    fn test_connect_wrong_type() {
        let m = method(vec![TypeToken::of::<String>()], TypeToken::unit());
        let err = validate_connect(OWNER, &m).unwrap_err();
        assert!(matches!(
            err,
            MappingSignatureError::ParameterType { position: 0, .. }
        ));
        assert!(err.to_string().contains("bad parameter #0"));
    }

    #[test]
    fn test_return_checked_before_parameters() {
        let m = method(vec![TypeToken::of::<String>()], TypeToken::of::<bool>());
        assert!(matches!(
            validate_connect(OWNER, &m),
            Err(MappingSignatureError::ReturnType { .. })
        ));
    }

    #[test]
    fn test_disconnect_shape() {
        let ok = method(
            vec![TypeToken::of::<Session>(), TypeToken::of::<CloseStatus>()],
            TypeToken::unit(),
        );
        assert!(validate_disconnect(OWNER, &ok).is_ok());

        let swapped = method(
            vec![TypeToken::of::<CloseStatus>(), TypeToken::of::<Session>()],
            TypeToken::unit(),
        );
        assert!(matches!(
            validate_disconnect(OWNER, &swapped),
            Err(MappingSignatureError::ParameterType { position: 0, .. })
        ));
    }

    #[test]
    fn test_message_infers_body() {
        let m = method(vec![TypeToken::of::<Request<String>>()], TypeToken::unit());
        let mapping = MessageMapping::new("/echo").body(BodyType::of::<String>());
        let body = validate_message(OWNER, &m, &mapping).unwrap();
        assert!(body.body().is::<String>());
    }

    #[test]
    fn test_message_body_must_match_parameter() {
        let m = method(vec![TypeToken::of::<Request<String>>()], TypeToken::unit());
        let mapping = MessageMapping::new("/echo").body(BodyType::of::<u64>());
        assert!(matches!(
            validate_message(OWNER, &m, &mapping),
            Err(MappingSignatureError::ParameterType { .. })
        ));
    }

    #[test]
    fn test_message_without_envelope() {
        let m = method(vec![TypeToken::of::<String>()], TypeToken::unit())
            .kind(HandlerKind::Message(MessageMapping::new("/raw")));
        let mapping = MessageMapping::new("/raw");
        assert!(matches!(
            validate_message(OWNER, &m, &mapping),
            Err(MappingSignatureError::NotAnEnvelope { .. })
        ));

        let m = method(vec![], TypeToken::unit());
        assert!(matches!(
            validate_message(OWNER, &m, &mapping),
            Err(MappingSignatureError::ParameterCount { found: 0, .. })
        ));
    }

    #[test]
    fn test_message_without_envelope_reports_return_first() {
        let m = method(vec![TypeToken::of::<String>()], TypeToken::of::<u32>());
        let mapping = MessageMapping::new("/raw");
        let Err(err) = validate_message(OWNER, &m, &mapping) else {
            panic!("non-unit return must be refused");
        };
        assert_eq!(
            err,
            MappingSignatureError::ReturnType {
                owner: OWNER,
                method: "candidate",
                expected: TypeToken::unit(),
                found: TypeToken::of::<u32>(),
            }
        );
    }
}
