use reqwest::StatusCode;
use thiserror::Error;

use crate::api::Endpoint;

/// Errors raised by the harness itself. Responses from the agent are never errors here,
/// with the one exception of a rejected credential.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("invalid agent url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid sdk key header: {0}")]
    InvalidHeader(String),
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("agent rejected the sdk key with {status}: {message}")]
    CredentialRejected { status: StatusCode, message: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, HarnessError::CredentialRejected { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HarnessError::CredentialRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("{endpoint} request body is not valid json: {source}")]
    MalformedRequest {
        endpoint: Endpoint,
        #[source]
        source: serde_json::Error,
    },
    #[error("{endpoint} request has no body")]
    MissingBody { endpoint: Endpoint },
    #[error("{endpoint} request body must be a json object")]
    NotAnObject { endpoint: Endpoint },
    #[error("{endpoint} request is missing required field '{field}'")]
    MissingField {
        endpoint: Endpoint,
        field: &'static str,
    },
    #[error("{endpoint} request field '{field}' has the wrong type, expected {expected}")]
    WrongType {
        endpoint: Endpoint,
        field: &'static str,
        expected: &'static str,
    },
    #[error("{endpoint} request field '{field}' must not be empty")]
    EmptyField {
        endpoint: Endpoint,
        field: &'static str,
    },
    #[error("{endpoint} response with status {status} does not match the schema: {reason}")]
    Response {
        endpoint: Endpoint,
        status: StatusCode,
        reason: String,
    },
}

/// A failed scenario step. Every variant names the step that failed.
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("{step}: {source}")]
    Harness {
        step: String,
        #[source]
        source: HarnessError,
    },
    #[error("{step}: expected status {expected}, got {actual}: {body}")]
    UnexpectedStatus {
        step: String,
        expected: StatusCode,
        actual: StatusCode,
        body: String,
    },
    #[error("{step}: expected {field} to be {expected:?}, got {actual:?}")]
    Mismatch {
        step: String,
        field: &'static str,
        expected: String,
        actual: String,
    },
    #[error("{step}: response body could not be decoded: {source}")]
    Body {
        step: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{step}: activation returned no decisions")]
    NoDecision { step: String },
    #[error("{step}: expected the agent to reject the sdk key, got {status}")]
    CredentialAccepted { step: String, status: StatusCode },
}

impl VerificationError {
    pub fn mismatch(
        step: impl Into<String>,
        field: &'static str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        VerificationError::Mismatch {
            step: step.into(),
            field,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
