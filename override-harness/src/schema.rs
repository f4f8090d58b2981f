use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::api::{Decision, Endpoint, ErrorResponse, OverrideResponse};
use crate::errors::SchemaError;

/// Checks an outgoing body against the endpoint's request schema.
pub fn validate_request(endpoint: Endpoint, payload: &str) -> Result<(), SchemaError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|source| SchemaError::MalformedRequest { endpoint, source })?;
    let object = value
        .as_object()
        .ok_or(SchemaError::NotAnObject { endpoint })?;

    match endpoint {
        Endpoint::Override => {
            required_string(endpoint, object, "userId", false)?;
            required_string(endpoint, object, "experimentKey", false)?;
            // empty variationKey is how an override gets cleared
            required_string(endpoint, object, "variationKey", true)?;
        }
        Endpoint::Activate => {
            required_string(endpoint, object, "userId", false)?;
            match object.get("userAttributes") {
                None | Some(Value::Object(_)) => {}
                Some(_) => {
                    return Err(SchemaError::WrongType {
                        endpoint,
                        field: "userAttributes",
                        expected: "object",
                    })
                }
            }
        }
    }
    Ok(())
}

/// Checks an agent response against the endpoint's response schema.
pub fn validate_response(
    endpoint: Endpoint,
    status: StatusCode,
    body: &str,
) -> Result<(), SchemaError> {
    match (endpoint, status) {
        (Endpoint::Override, StatusCode::OK) => decode::<OverrideResponse>(endpoint, status, body),
        (Endpoint::Activate, StatusCode::OK) => decode::<Vec<Decision>>(endpoint, status, body),
        _ => decode::<ErrorResponse>(endpoint, status, body),
    }
}

fn decode<T: DeserializeOwned>(
    endpoint: Endpoint,
    status: StatusCode,
    body: &str,
) -> Result<(), SchemaError> {
    serde_json::from_str::<T>(body)
        .map(|_| ())
        .map_err(|e| SchemaError::Response {
            endpoint,
            status,
            reason: e.to_string(),
        })
}

fn required_string(
    endpoint: Endpoint,
    object: &Map<String, Value>,
    field: &'static str,
    allow_empty: bool,
) -> Result<(), SchemaError> {
    match object.get(field) {
        None => Err(SchemaError::MissingField { endpoint, field }),
        Some(Value::String(s)) if s.is_empty() && !allow_empty => {
            Err(SchemaError::EmptyField { endpoint, field })
        }
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(SchemaError::WrongType {
            endpoint,
            field,
            expected: "string",
        }),
    }
}
