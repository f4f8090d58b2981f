//! Scenarios that drive the agent's override endpoint through its state machine.
//!
//! Expected override responses are derived from [`OverrideState`] rather than written out per
//! step, so every scenario is just a list of [`Step`]s.

pub mod cases;
pub mod model;

use reqwest::{Method, StatusCode};

use crate::api::{
    Endpoint, OverrideResponse, DATAFILE_FORBIDDEN_ERROR, NO_PRE_EXISTING_OVERRIDE,
    REMOVING_PREVIOUS_OVERRIDE,
};
use crate::client::{self, HarnessResponse};
use crate::config::Config;
use crate::errors::{HarnessError, VerificationError};
use crate::session::{Session, Subject};

pub use cases::{InvalidArgumentCase, INVALID_ARGUMENT_CASES};
pub use model::{ExpectedOverride, OverrideState};

/// Variation keys a scenario is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectations {
    pub default_variation: String,
    pub override_variation: String,
}

impl Expectations {
    pub fn from_config(config: &Config) -> Self {
        Expectations {
            default_variation: config.default_variation.clone(),
            override_variation: config.override_variation.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Activation must report the variation the model says is in effect.
    Activate,
    /// Override with this key (empty clears); the response must match the model.
    Override(String),
}

impl Step {
    pub fn set(variation_key: &str) -> Step {
        Step::Override(variation_key.to_string())
    }

    pub fn clear() -> Step {
        Step::Override(String::new())
    }
}

/// activate, force the override, activate, force it again, clear, activate.
pub fn lifecycle_steps(expectations: &Expectations) -> Vec<Step> {
    vec![
        Step::Activate,
        Step::set(&expectations.override_variation),
        Step::Activate,
        Step::set(&expectations.override_variation),
        Step::clear(),
        Step::Activate,
    ]
}

/// Forcing the default variation first, then switching away from it.
pub fn switch_steps(expectations: &Expectations) -> Vec<Step> {
    vec![
        Step::set(&expectations.default_variation),
        Step::Activate,
        Step::set(&expectations.override_variation),
        Step::Activate,
        Step::clear(),
    ]
}

/// set -> clear -> set has to look like a first set, and a second clear finds nothing.
pub fn round_trip_steps(expectations: &Expectations) -> Vec<Step> {
    vec![
        Step::set(&expectations.override_variation),
        Step::clear(),
        Step::set(&expectations.override_variation),
        Step::clear(),
        Step::clear(),
        Step::Activate,
    ]
}

/// Runs `steps` in order, starting from a subject with no override. Returns the final state.
pub async fn run_steps(
    session: &Session,
    expectations: &Expectations,
    steps: &[Step],
) -> Result<OverrideState, VerificationError> {
    let mut state = OverrideState::NoOverride;

    for (index, step) in steps.iter().enumerate() {
        match step {
            Step::Activate => {
                let label = format!("step {} activate", index + 1);
                let expected = state.effective_variation(&expectations.default_variation);
                check_activation(session, &label, expected).await?;
            }
            Step::Override(variation_key) => {
                let label = format!("step {} override {:?}", index + 1, variation_key);
                let expected = state.apply(variation_key);
                let response = client::override_variation(session, variation_key)
                    .await
                    .map_err(|source| harness_error(&label, source))?;
                check_override(&label, session.subject(), variation_key, &expected, &response)?;
                state = expected.next;
            }
        }
    }

    Ok(state)
}

pub async fn verify_override_lifecycle(
    session: &Session,
    expectations: &Expectations,
) -> Result<(), VerificationError> {
    run_steps(session, expectations, &lifecycle_steps(expectations))
        .await
        .map(|_| ())
}

/// Sends one invalid-argument row and compares status and body text exactly.
pub async fn verify_invalid_argument(
    session: &Session,
    case: &InvalidArgumentCase,
) -> Result<(), VerificationError> {
    let payload = case.payload();
    let response = client::raw_request(
        Endpoint::Override,
        Method::POST,
        session,
        case.bypass_validation,
        Some(&payload),
    )
    .await
    .map_err(|source| harness_error(case.id, source))?;

    expect_status(case.id, case.expected_status, &response)?;
    if response.text != case.expected_body {
        return Err(VerificationError::mismatch(
            case.id,
            "body",
            case.expected_body,
            response.text,
        ));
    }
    Ok(())
}

/// Clears overrides that invalid-argument rows leave behind.
pub async fn clean_up_invalid_arguments(
    session: &Session,
    cases: &[InvalidArgumentCase],
) -> Result<(), VerificationError> {
    for case in cases.iter().filter(|case| case.leaves_override) {
        let cleanup = session.clone().with_subject(case.subject());
        let label = format!("{} cleanup", case.id);
        let response = client::override_variation(&cleanup, "")
            .await
            .map_err(|source| harness_error(&label, source))?;
        expect_status(&label, StatusCode::OK, &response)?;
    }
    Ok(())
}

/// An override through a session the agent can't fetch a datafile for must raise, not answer.
pub async fn verify_forbidden(
    invalid_session: &Session,
    variation_key: &str,
) -> Result<(), VerificationError> {
    let step = "forbidden override";
    match client::override_variation(invalid_session, variation_key).await {
        Err(HarnessError::CredentialRejected { status, message }) => {
            check_forbidden(step, status, &message)
        }
        Err(source) => Err(harness_error(step, source)),
        Ok(response) => Err(VerificationError::CredentialAccepted {
            step: step.to_string(),
            status: response.status,
        }),
    }
}

/// A rejection only counts if it is the 403 the agent sends when it can't fetch a datafile.
fn check_forbidden(
    step: &str,
    status: StatusCode,
    message: &str,
) -> Result<(), VerificationError> {
    if status != StatusCode::FORBIDDEN {
        return Err(VerificationError::mismatch(
            step,
            "status",
            StatusCode::FORBIDDEN.to_string(),
            status.to_string(),
        ));
    }
    if message != DATAFILE_FORBIDDEN_ERROR {
        return Err(VerificationError::mismatch(
            step,
            "error",
            DATAFILE_FORBIDDEN_ERROR,
            message,
        ));
    }
    Ok(())
}

/// Clears whatever override the session's subject holds, so a scenario starts from
/// `NoOverride` no matter what an earlier scenario or run left behind.
pub async fn reset_subject(session: &Session) -> Result<(), VerificationError> {
    let step = format!(
        "reset {}/{}",
        session.subject().user_id,
        session.subject().experiment_key
    );
    let response = client::override_variation(session, "")
        .await
        .map_err(|source| harness_error(&step, source))?;
    expect_status(&step, StatusCode::OK, &response)?;

    let body: OverrideResponse = response.json().map_err(|source| VerificationError::Body {
        step: step.clone(),
        source,
    })?;
    if body.has_message(REMOVING_PREVIOUS_OVERRIDE) || body.has_message(NO_PRE_EXISTING_OVERRIDE)
    {
        Ok(())
    } else {
        Err(VerificationError::mismatch(
            step,
            "messages",
            format!("{} or {}", REMOVING_PREVIOUS_OVERRIDE, NO_PRE_EXISTING_OVERRIDE),
            format!("{:?}", body.messages),
        ))
    }
}

/// Runs `steps` between two resets. The trailing reset only happens when the steps fail,
/// since a passing scenario already ends in `NoOverride`.
async fn run_scenario(
    session: &Session,
    expectations: &Expectations,
    steps: &[Step],
) -> Result<(), VerificationError> {
    reset_subject(session).await?;
    match run_steps(session, expectations, steps).await {
        Ok(_) => Ok(()),
        Err(e) => {
            if let Err(reset) = reset_subject(session).await {
                tracing::warn!(error = %reset, "failed to clear override after a failed scenario");
            }
            Err(e)
        }
    }
}

#[derive(Debug)]
pub struct ScenarioOutcome {
    pub name: String,
    pub result: Result<(), VerificationError>,
}

#[derive(Debug, Default)]
pub struct Report {
    outcomes: Vec<ScenarioOutcome>,
}

impl Report {
    fn record(&mut self, name: impl Into<String>, result: Result<(), VerificationError>) {
        let name = name.into();
        match &result {
            Ok(()) => tracing::info!(scenario = name, "scenario passed"),
            Err(e) => tracing::error!(scenario = name, error = %e, "scenario failed"),
        }
        self.outcomes.push(ScenarioOutcome { name, result });
    }

    pub fn outcomes(&self) -> &[ScenarioOutcome] {
        &self.outcomes
    }

    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.result.is_err())
    }
}

/// Runs every scenario against the configured agent, one after the other.
pub async fn run_all(config: &Config) -> Result<Report, HarnessError> {
    let session = Session::valid(config)?;
    let invalid_session = Session::invalid_sdk_key(config)?;
    let expectations = Expectations::from_config(config);
    let mut report = Report::default();

    report.record(
        "lifecycle",
        run_scenario(&session, &expectations, &lifecycle_steps(&expectations)).await,
    );
    report.record(
        "switch",
        run_scenario(&session, &expectations, &switch_steps(&expectations)).await,
    );
    report.record(
        "round_trip",
        run_scenario(&session, &expectations, &round_trip_steps(&expectations)).await,
    );
    // the table expects a clean slate for its own subjects as well
    let setup = match reset_subject(&session).await {
        Ok(()) => clean_up_invalid_arguments(&session, INVALID_ARGUMENT_CASES).await,
        Err(e) => Err(e),
    };
    report.record("invalid_arguments::setup", setup);
    for case in INVALID_ARGUMENT_CASES {
        report.record(
            format!("invalid_arguments::{}", case.id),
            verify_invalid_argument(&session, case).await,
        );
    }
    report.record(
        "invalid_arguments::cleanup",
        clean_up_invalid_arguments(&session, INVALID_ARGUMENT_CASES).await,
    );
    report.record(
        "forbidden",
        verify_forbidden(&invalid_session, "my_new_variation").await,
    );

    Ok(report)
}

async fn check_activation(
    session: &Session,
    step: &str,
    expected_variation: &str,
) -> Result<(), VerificationError> {
    let response = client::activate(session)
        .await
        .map_err(|source| harness_error(step, source))?;
    expect_status(step, StatusCode::OK, &response)?;

    let decisions = response
        .decisions()
        .map_err(|source| VerificationError::Body {
            step: step.to_string(),
            source,
        })?;
    let decision = decisions.first().ok_or_else(|| VerificationError::NoDecision {
        step: step.to_string(),
    })?;
    if decision.variation_key != expected_variation {
        return Err(VerificationError::mismatch(
            step,
            "variationKey",
            expected_variation,
            decision.variation_key.as_str(),
        ));
    }
    Ok(())
}

fn check_override(
    step: &str,
    subject: &Subject,
    variation_key: &str,
    expected: &ExpectedOverride,
    response: &HarnessResponse,
) -> Result<(), VerificationError> {
    expect_status(step, StatusCode::OK, response)?;
    let body: OverrideResponse = response.json().map_err(|source| VerificationError::Body {
        step: step.to_string(),
        source,
    })?;

    let echoed = [
        ("userId", subject.user_id.as_str(), body.user_id.as_str()),
        (
            "experimentKey",
            subject.experiment_key.as_str(),
            body.experiment_key.as_str(),
        ),
        ("variationKey", variation_key, body.variation_key.as_str()),
        (
            "prevVariationKey",
            expected.prev_variation_key.as_str(),
            body.prev_variation_key.as_str(),
        ),
    ];
    for (field, want, got) in echoed {
        if want != got {
            return Err(VerificationError::mismatch(step, field, want, got));
        }
    }

    match expected.message {
        None if body.messages.is_some() => Err(VerificationError::mismatch(
            step,
            "messages",
            "null",
            format!("{:?}", body.messages),
        )),
        Some(message) if !body.has_message(message) => Err(VerificationError::mismatch(
            step,
            "messages",
            message,
            format!("{:?}", body.messages),
        )),
        _ => Ok(()),
    }
}

fn expect_status(
    step: &str,
    expected: StatusCode,
    response: &HarnessResponse,
) -> Result<(), VerificationError> {
    if response.status != expected {
        return Err(VerificationError::UnexpectedStatus {
            step: step.to_string(),
            expected,
            actual: response.status,
            body: response.text.clone(),
        });
    }
    Ok(())
}

fn harness_error(step: &str, source: HarnessError) -> VerificationError {
    VerificationError::Harness {
        step: step.to_string(),
        source,
    }
}
