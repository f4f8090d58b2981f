use crate::api::{NO_PRE_EXISTING_OVERRIDE, REMOVING_PREVIOUS_OVERRIDE, UPDATING_PREVIOUS_OVERRIDE};

/// What the agent should hold for one (userId, experimentKey) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OverrideState {
    #[default]
    NoOverride,
    Overridden(String),
}

/// The response an override request should produce, and the state it leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedOverride {
    pub prev_variation_key: String,
    /// `None` means the agent must answer with `messages: null`.
    pub message: Option<&'static str>,
    pub next: OverrideState,
}

impl OverrideState {
    /// Applies an override request for a known experiment and variation.
    pub fn apply(&self, variation_key: &str) -> ExpectedOverride {
        match (self, variation_key.is_empty()) {
            (OverrideState::NoOverride, true) => ExpectedOverride {
                prev_variation_key: String::new(),
                message: Some(NO_PRE_EXISTING_OVERRIDE),
                next: OverrideState::NoOverride,
            },
            (OverrideState::Overridden(previous), true) => ExpectedOverride {
                prev_variation_key: previous.clone(),
                message: Some(REMOVING_PREVIOUS_OVERRIDE),
                next: OverrideState::NoOverride,
            },
            (OverrideState::NoOverride, false) => ExpectedOverride {
                prev_variation_key: String::new(),
                message: None,
                next: OverrideState::Overridden(variation_key.to_string()),
            },
            (OverrideState::Overridden(previous), false) => ExpectedOverride {
                prev_variation_key: previous.clone(),
                message: Some(UPDATING_PREVIOUS_OVERRIDE),
                next: OverrideState::Overridden(variation_key.to_string()),
            },
        }
    }

    /// The variation activation should report in this state.
    pub fn effective_variation<'a>(&'a self, default_variation: &'a str) -> &'a str {
        match self {
            OverrideState::NoOverride => default_variation,
            OverrideState::Overridden(variation) => variation,
        }
    }
}
