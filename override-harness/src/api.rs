use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const NO_PRE_EXISTING_OVERRIDE: &str = "no pre-existing override";
pub const UPDATING_PREVIOUS_OVERRIDE: &str = "updating previous override";
pub const REMOVING_PREVIOUS_OVERRIDE: &str = "removing previous override";
pub const EXPERIMENT_KEY_NOT_FOUND: &str = "experimentKey not found in configuration";
pub const VARIATION_KEY_NOT_FOUND: &str = "variationKey not found in configuration";

pub const EMPTY_USER_ID_ERROR: &str = "userId cannot be empty";
pub const EMPTY_EXPERIMENT_KEY_ERROR: &str = "experimentKey cannot be empty";
pub const DATAFILE_FORBIDDEN_ERROR: &str =
    "unable to fetch fresh datafile (consider rechecking SDK key), status code: 403 Forbidden";

/// The agent endpoints the harness knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Activate,
    Override,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Activate => "activate",
            Endpoint::Override => "override",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    pub user_id: String,
    pub experiment_key: String,
    pub variation_key: String,
}

/// Body of a 200 from the override endpoint. Field order matches the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OverrideResponse {
    pub user_id: String,
    pub experiment_key: String,
    pub variation_key: String,
    pub prev_variation_key: String,
    pub messages: Option<Vec<String>>,
}

impl OverrideResponse {
    pub fn has_message(&self, message: &str) -> bool {
        self.messages
            .as_ref()
            .is_some_and(|messages| messages.iter().any(|m| m == message))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    pub user_id: String,
    #[serde(default)]
    pub user_attributes: HashMap<String, Value>,
}

#[derive(Deserialize, Default)]
pub struct ActivateQueryParams {
    #[serde(rename = "experimentKey")]
    pub experiment_key: Option<String>,
}

/// One entry of the activation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_key: Option<String>,
    pub variation_key: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub decision_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    // Agents add fields over time (error, variables, ...), keep them around
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
