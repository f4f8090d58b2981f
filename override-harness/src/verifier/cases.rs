use reqwest::StatusCode;
use serde_json::json;

use crate::session::Subject;

/// One row of the invalid-argument table: a raw override payload and the exact reply expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidArgumentCase {
    pub id: &'static str,
    pub user_id: &'static str,
    pub experiment_key: &'static str,
    pub variation_key: &'static str,
    pub expected_status: StatusCode,
    pub expected_body: &'static str,
    /// Rows the harness's own schema would reject must skip validation to reach the agent.
    pub bypass_validation: bool,
    /// Whether the agent keeps an override after this row, which needs clearing afterwards.
    pub leaves_override: bool,
}

impl InvalidArgumentCase {
    pub fn payload(&self) -> String {
        json!({
            "userId": self.user_id,
            "experimentKey": self.experiment_key,
            "variationKey": self.variation_key,
        })
        .to_string()
    }

    pub fn subject(&self) -> Subject {
        Subject::new(self.user_id, self.experiment_key)
    }
}

pub const INVALID_ARGUMENT_CASES: &[InvalidArgumentCase] = &[
    InvalidArgumentCase {
        id: "empty_userId",
        user_id: "",
        experiment_key: "ab_test1",
        variation_key: "variation_2",
        expected_status: StatusCode::BAD_REQUEST,
        expected_body: "{\"error\":\"userId cannot be empty\"}\n",
        bypass_validation: true,
        leaves_override: false,
    },
    InvalidArgumentCase {
        id: "empty_experiment_key",
        user_id: "matjaz",
        experiment_key: "",
        variation_key: "variation_2",
        expected_status: StatusCode::BAD_REQUEST,
        expected_body: "{\"error\":\"experimentKey cannot be empty\"}\n",
        bypass_validation: true,
        leaves_override: false,
    },
    InvalidArgumentCase {
        id: "empty_variationKey",
        user_id: "matjaz",
        experiment_key: "ab_test1",
        variation_key: "",
        expected_status: StatusCode::OK,
        expected_body: "{\"userId\":\"matjaz\",\"experimentKey\":\"ab_test1\",\
                        \"variationKey\":\"\",\"prevVariationKey\":\"\",\"messages\":\
                        [\"no pre-existing override\"]}\n",
        bypass_validation: false,
        leaves_override: false,
    },
    InvalidArgumentCase {
        id: "invalid_userId",
        user_id: "invalid_user",
        experiment_key: "ab_test1",
        variation_key: "variation_2",
        expected_status: StatusCode::OK,
        expected_body: "{\"userId\":\"invalid_user\",\"experimentKey\":\"ab_test1\",\
                        \"variationKey\":\"variation_2\",\"prevVariationKey\":\"\",\
                        \"messages\":null}\n",
        bypass_validation: false,
        leaves_override: true,
    },
    InvalidArgumentCase {
        id: "invalid_experimentKey",
        user_id: "matjaz",
        experiment_key: "invalid_experimentKey",
        variation_key: "variation_2",
        expected_status: StatusCode::OK,
        expected_body: "{\"userId\":\"matjaz\",\"experimentKey\":\
                        \"invalid_experimentKey\",\"variationKey\":\"variation_2\",\
                        \"prevVariationKey\":\"\",\"messages\":\
                        [\"experimentKey not found in configuration\"]}\n",
        bypass_validation: false,
        leaves_override: false,
    },
    InvalidArgumentCase {
        id: "invalid_variationKey",
        user_id: "matjaz",
        experiment_key: "ab_test1",
        variation_key: "invalid_variation",
        expected_status: StatusCode::OK,
        expected_body: "{\"userId\":\"matjaz\",\"experimentKey\":\"ab_test1\",\
                        \"variationKey\":\"invalid_variation\",\
                        \"prevVariationKey\":\"\",\"messages\":\
                        [\"variationKey not found in configuration\"]}\n",
        bypass_validation: false,
        leaves_override: false,
    },
];

pub fn invalid_argument_case(id: &str) -> Option<&'static InvalidArgumentCase> {
    INVALID_ARGUMENT_CASES.iter().find(|case| case.id == id)
}
