use std::collections::HashMap;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;

use crate::api::{ActivateRequest, Decision, Endpoint, ErrorResponse, OverrideRequest};
use crate::errors::{HarnessError, SchemaError};
use crate::schema;
use crate::session::Session;

/// A response from the agent, kept as raw text so assertions can compare exact bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessResponse {
    pub status: StatusCode,
    pub text: String,
}

impl HarnessResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.text)
    }

    pub fn decisions(&self) -> Result<Vec<Decision>, serde_json::Error> {
        self.json()
    }
}

/// Activates the session's experiment for the session's user.
#[instrument(skip_all, fields(user_id = %session.subject().user_id, experiment_key = %session.subject().experiment_key))]
pub async fn activate(session: &Session) -> Result<HarnessResponse, HarnessError> {
    let mut user_attributes = HashMap::new();
    user_attributes.insert("attr_1".to_string(), Value::from("hola"));
    let payload = serde_json::to_string(&ActivateRequest {
        user_id: session.subject().user_id.clone(),
        user_attributes,
    })?;

    raw_request(
        Endpoint::Activate,
        Method::POST,
        session,
        false,
        Some(&payload),
    )
    .await
}

/// Forces `variation_key` for the session's user and experiment. An empty key clears the override.
#[instrument(skip(session), fields(user_id = %session.subject().user_id))]
pub async fn override_variation(
    session: &Session,
    variation_key: &str,
) -> Result<HarnessResponse, HarnessError> {
    let payload = serde_json::to_string(&OverrideRequest {
        user_id: session.subject().user_id.clone(),
        experiment_key: session.subject().experiment_key.clone(),
        variation_key: variation_key.to_string(),
    })?;

    raw_request(
        Endpoint::Override,
        Method::POST,
        session,
        false,
        Some(&payload),
    )
    .await
}

/// Sends `payload` to `endpoint` as-is.
///
/// Unless `bypass_validation` is set, the payload is checked against the endpoint's request
/// schema before anything is sent, and the response against its response schema afterwards.
/// Bypassing is how malformed input reaches the agent unmodified.
///
/// Agent error statuses come back as ordinary responses, except a rejected credential
/// (401/403), which is raised as [`HarnessError::CredentialRejected`].
#[instrument(skip(session, payload))]
pub async fn raw_request(
    endpoint: Endpoint,
    method: Method,
    session: &Session,
    bypass_validation: bool,
    payload: Option<&str>,
) -> Result<HarnessResponse, HarnessError> {
    if !bypass_validation {
        match payload {
            Some(body) => schema::validate_request(endpoint, body)?,
            None => return Err(SchemaError::MissingBody { endpoint }.into()),
        }
    }

    let url = session.url_for(endpoint)?;
    let (header_name, header_value) = session.credential();
    let mut request = session
        .http()
        .request(method, url.clone())
        .header(header_name, header_value);
    if endpoint == Endpoint::Activate {
        request = request.query(&[("experimentKey", &session.subject().experiment_key)]);
    }
    if let Some(body) = payload {
        tracing::debug!(json = body, "sending request");
        request = request.body(body.to_owned());
    }

    let response = request
        .send()
        .await
        .map_err(|source| HarnessError::Transport {
            url: url.to_string(),
            source,
        })?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|source| HarnessError::Transport {
            url: url.to_string(),
            source,
        })?;
    tracing::debug!(%status, body = text, "received response");

    if is_credential_rejection(status) {
        tracing::warn!(%status, "agent rejected the sdk key");
        return Err(HarnessError::CredentialRejected {
            status,
            message: error_message(&text),
        });
    }

    if !bypass_validation {
        schema::validate_response(endpoint, status, &text)?;
    }

    Ok(HarnessResponse { status, text })
}

fn is_credential_rejection(status: StatusCode) -> bool {
    status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED
}

/// Pulls the `error` field out of an agent error body, falling back to the raw text.
fn error_message(text: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(text) {
        Ok(body) => body.error,
        Err(_) => text.trim().to_string(),
    }
}
