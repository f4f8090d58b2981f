use anyhow::Result;
use reqwest::{Method, StatusCode};
use rstest::rstest;

use crate::common::*;

use override_harness::api::{
    Endpoint, OverrideResponse, NO_PRE_EXISTING_OVERRIDE, REMOVING_PREVIOUS_OVERRIDE,
    UPDATING_PREVIOUS_OVERRIDE,
};
use override_harness::client::{activate, override_variation, raw_request};
use override_harness::errors::{HarnessError, VerificationError};
use override_harness::verifier::{
    self, cases::invalid_argument_case, Expectations, OverrideState, Step, INVALID_ARGUMENT_CASES,
};

pub mod common;

fn first_variation(res: &override_harness::client::HarnessResponse) -> String {
    res.decisions()
        .expect("activation body is a decision list")
        .first()
        .expect("at least one decision")
        .variation_key
        .clone()
}

#[tokio::test]
async fn test_overrides() -> Result<()> {
    let test = TestAgent::start().await;
    let session = &test.session;

    // default decision
    let activating = activate(session).await?;
    assert_eq!(activating.status, StatusCode::OK, "{}", activating.text);
    assert_eq!(first_variation(&activating), "variation_1");

    let resp_over = override_variation(session, "variation_2").await?;
    assert_eq!(resp_over.status, StatusCode::OK, "{}", resp_over.text);
    let body: OverrideResponse = resp_over.json()?;
    assert_eq!(body.messages, None);
    assert_eq!(body.prev_variation_key, "");

    let activating_again = activate(session).await?;
    assert_eq!(activating_again.status, StatusCode::OK);
    assert_eq!(first_variation(&activating_again), "variation_2");

    // overriding with the same variation is an update, not a silent no-op
    let resp_same = override_variation(session, "variation_2").await?;
    assert_eq!(resp_same.status, StatusCode::OK, "{}", resp_same.text);
    let body: OverrideResponse = resp_same.json()?;
    assert!(body.has_message(UPDATING_PREVIOUS_OVERRIDE));
    assert_eq!(body.prev_variation_key, "variation_2");

    let resp_delete = override_variation(session, "").await?;
    assert_eq!(resp_delete.status, StatusCode::OK, "{}", resp_delete.text);
    let body: OverrideResponse = resp_delete.json()?;
    assert!(body.has_message(REMOVING_PREVIOUS_OVERRIDE));
    assert_eq!(body.prev_variation_key, "variation_2");

    let resp_default_again = activate(session).await?;
    assert_eq!(resp_default_again.status, StatusCode::OK);
    assert_eq!(first_variation(&resp_default_again), "variation_1");

    Ok(())
}

#[rstest]
#[case::empty_user_id("empty_userId")]
#[case::empty_experiment_key("empty_experiment_key")]
#[case::empty_variation_key("empty_variationKey")]
#[case::invalid_user_id("invalid_userId")]
#[case::invalid_experiment_key("invalid_experimentKey")]
#[case::invalid_variation_key("invalid_variationKey")]
#[tokio::test]
async fn test_overrides_invalid_arguments(#[case] id: &str) -> Result<()> {
    let test = TestAgent::start().await;
    let case = invalid_argument_case(id).expect("case exists");

    let resp = raw_request(
        Endpoint::Override,
        Method::POST,
        &test.session,
        case.bypass_validation,
        Some(&case.payload()),
    )
    .await?;

    assert_eq!(resp.status, case.expected_status, "{}", resp.text);
    assert_eq!(resp.text, case.expected_body);

    Ok(())
}

#[tokio::test]
async fn test_overrides_403() -> Result<()> {
    let test = TestAgent::start().await;
    let payload = r#"{"userId": "matjaz","experimentKey": "ab_test1", "variationKey": "my_new_variation"}"#;

    let result = raw_request(
        Endpoint::Override,
        Method::POST,
        &test.invalid_session,
        false,
        Some(payload),
    )
    .await;

    match result {
        Err(e) => {
            assert!(e.is_credential_rejected());
            assert_eq!(e.status(), Some(StatusCode::FORBIDDEN));
            assert_eq!(
                e.to_string(),
                "agent rejected the sdk key with 403 Forbidden: unable to fetch fresh datafile \
                 (consider rechecking SDK key), status code: 403 Forbidden"
            );
        }
        Ok(resp) => panic!("Expected an error, got {} {}", resp.status, resp.text),
    }

    Ok(())
}

#[tokio::test]
async fn test_set_then_activate_reports_every_variation() -> Result<()> {
    let test = TestAgent::start().await;

    for variation in ["variation_1", "variation_2"] {
        override_variation(&test.session, variation).await?;
        assert_eq!(first_variation(&activate(&test.session).await?), variation);
    }
    override_variation(&test.session, "").await?;
    assert_eq!(
        first_variation(&activate(&test.session).await?),
        "variation_1"
    );

    Ok(())
}

#[tokio::test]
async fn test_unknown_keys_are_not_stored() -> Result<()> {
    let test = TestAgent::start().await;

    // neither soft failure may leave an override behind
    for id in ["invalid_variationKey", "invalid_experimentKey"] {
        verifier::verify_invalid_argument(&test.session, invalid_argument_case(id).unwrap())
            .await?;
    }
    assert_eq!(
        first_variation(&activate(&test.session).await?),
        "variation_1"
    );
    verifier::verify_invalid_argument(
        &test.session,
        invalid_argument_case("empty_variationKey").unwrap(),
    )
    .await?;

    Ok(())
}

#[tokio::test]
async fn test_verifier_scenarios_pass_against_stub() -> Result<()> {
    let test = TestAgent::start().await;
    let expectations = Expectations::from_config(&test.config);

    verifier::verify_override_lifecycle(&test.session, &expectations).await?;

    let end = verifier::run_steps(
        &test.session,
        &expectations,
        &verifier::switch_steps(&expectations),
    )
    .await?;
    assert_eq!(end, OverrideState::NoOverride);

    let end = verifier::run_steps(
        &test.session,
        &expectations,
        &verifier::round_trip_steps(&expectations),
    )
    .await?;
    assert_eq!(end, OverrideState::NoOverride);

    verifier::verify_forbidden(&test.invalid_session, "my_new_variation").await?;

    Ok(())
}

#[tokio::test]
async fn test_run_all_is_repeatable() -> Result<()> {
    let test = TestAgent::start().await;

    for _ in 0..2 {
        let report = verifier::run_all(&test.config).await?;
        let failures: Vec<_> = report
            .failures()
            .map(|outcome| format!("{}: {:?}", outcome.name, outcome.result))
            .collect();
        assert!(failures.is_empty(), "{:?}", failures);
        assert_eq!(report.outcomes().len(), 6 + INVALID_ARGUMENT_CASES.len());
    }

    Ok(())
}

#[tokio::test]
async fn test_run_all_clears_overrides_left_on_the_agent() -> Result<()> {
    let test = TestAgent::start().await;
    let invalid_user = test
        .session
        .clone()
        .with_subject(
            invalid_argument_case("invalid_userId")
                .expect("case exists")
                .subject(),
        );

    // leftovers from an interrupted run: one on the configured subject, one from the table
    override_variation(&test.session, "variation_2").await?;
    override_variation(&invalid_user, "variation_2").await?;

    let report = verifier::run_all(&test.config).await?;
    let failures: Vec<_> = report
        .failures()
        .map(|outcome| format!("{}: {:?}", outcome.name, outcome.result))
        .collect();
    assert!(failures.is_empty(), "{:?}", failures);

    Ok(())
}

#[tokio::test]
async fn test_run_all_recovers_after_a_scenario_fails_midway() -> Result<()> {
    let test = TestAgent::start().await;
    let wrong = Expectations {
        default_variation: "variation_2".to_string(),
        override_variation: "variation_2".to_string(),
    };

    // the set succeeds, the activation check then fails and leaves the override behind
    let steps = [Step::set("variation_2"), Step::clear(), Step::Activate];
    assert!(verifier::run_steps(&test.session, &wrong, &steps).await.is_err());
    override_variation(&test.session, "variation_2").await?;

    let report = verifier::run_all(&test.config).await?;
    assert!(report.passed());

    // and a clean agent again afterwards
    let res = override_variation(&test.session, "").await?;
    let body: OverrideResponse = res.json()?;
    assert!(body.has_message(NO_PRE_EXISTING_OVERRIDE));

    Ok(())
}

#[tokio::test]
async fn test_reset_subject_accepts_either_clear_reply() -> Result<()> {
    let test = TestAgent::start().await;

    verifier::reset_subject(&test.session).await?;
    override_variation(&test.session, "variation_2").await?;
    verifier::reset_subject(&test.session).await?;

    let res = activate(&test.session).await?;
    assert_eq!(first_variation(&res), "variation_1");

    Ok(())
}

#[tokio::test]
async fn test_verifier_reports_step_on_mismatch() -> Result<()> {
    let test = TestAgent::start().await;
    let wrong = Expectations {
        default_variation: "variation_2".to_string(),
        override_variation: "variation_2".to_string(),
    };

    match verifier::run_steps(&test.session, &wrong, &[Step::Activate]).await {
        Err(VerificationError::Mismatch {
            step,
            field,
            expected,
            actual,
        }) => {
            assert_eq!(step, "step 1 activate");
            assert_eq!(field, "variationKey");
            assert_eq!(expected, "variation_2");
            assert_eq!(actual, "variation_1");
        }
        other => panic!("Expected Mismatch, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_verifier_flags_accepted_credentials() -> Result<()> {
    let test = TestAgent::start().await;

    // a valid session is not rejected, which the forbidden scenario must report
    match verifier::verify_forbidden(&test.session, "variation_2").await {
        Err(VerificationError::CredentialAccepted { status, .. }) => {
            assert_eq!(status, StatusCode::OK)
        }
        other => panic!("Expected CredentialAccepted, got {:?}", other),
    }

    match verifier::verify_forbidden(&test.invalid_session, "variation_2").await {
        Ok(()) => {}
        Err(VerificationError::Harness {
            source: HarnessError::CredentialRejected { .. },
            ..
        }) => panic!("credential rejection must count as a pass"),
        Err(e) => panic!("unexpected error {:?}", e),
    }

    Ok(())
}
