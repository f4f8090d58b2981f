//! An in-memory agent that honours the override contract, for tests that need something to
//! talk to. It only knows about the datafiles it was started with and never persists anything.

use std::collections::HashMap;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Serialize;
use sha1::{Digest, Sha1};
use tokio::net::TcpListener;
use tokio::sync::{Notify, RwLock};

use crate::api::{
    ActivateQueryParams, ActivateRequest, Decision, ErrorResponse, OverrideRequest,
    OverrideResponse, DATAFILE_FORBIDDEN_ERROR, EMPTY_EXPERIMENT_KEY_ERROR, EMPTY_USER_ID_ERROR,
    EXPERIMENT_KEY_NOT_FOUND, NO_PRE_EXISTING_OVERRIDE, REMOVING_PREVIOUS_OVERRIDE,
    UPDATING_PREVIOUS_OVERRIDE, VARIATION_KEY_NOT_FOUND,
};
use crate::config::{Config, DEFAULT_TEST_CONFIG};

const LONG_SCALE: u64 = 0xfffffffffffffff;

#[derive(Debug, Clone)]
pub struct Variation {
    pub key: String,
    pub rollout_percentage: f64,
}

#[derive(Debug, Clone)]
pub struct Experiment {
    pub key: String,
    pub variations: Vec<Variation>,
}

impl Experiment {
    pub fn new(key: &str, variations: &[(&str, f64)]) -> Self {
        Experiment {
            key: key.to_string(),
            variations: variations
                .iter()
                .map(|(key, rollout_percentage)| Variation {
                    key: key.to_string(),
                    rollout_percentage: *rollout_percentage,
                })
                .collect(),
        }
    }

    fn has_variation(&self, variation_key: &str) -> bool {
        self.variations.iter().any(|v| v.key == variation_key)
    }

    /// Deterministic bucketing: the same user always lands on the same variation.
    pub fn allocate(&self, user_id: &str) -> Option<&str> {
        let hash = bucket(&self.key, user_id);
        let mut total_percentage = 0.0;

        for variation in &self.variations {
            total_percentage += variation.rollout_percentage / 100.0;
            if hash < total_percentage {
                return Some(&variation.key);
            }
        }
        None
    }
}

/// The experiments an sdk key resolves to.
#[derive(Debug, Clone, Default)]
pub struct Datafile {
    experiments: HashMap<String, Experiment>,
}

impl Datafile {
    pub fn with_experiment(mut self, experiment: Experiment) -> Self {
        self.experiments.insert(experiment.key.clone(), experiment);
        self
    }

    /// `ab_test1` sends everyone to `variation_1` unless overridden.
    pub fn acceptance() -> Self {
        Datafile::default()
            .with_experiment(Experiment::new(
                "ab_test1",
                &[("variation_1", 100.0), ("variation_2", 0.0)],
            ))
            .with_experiment(Experiment::new("feature_test", &[("on", 50.0), ("off", 50.0)]))
    }
}

/// Maps a user into [0, 1] from the first 15 hex chars of sha1("<experiment>.<user>").
fn bucket(experiment_key: &str, user_id: &str) -> f64 {
    let mut hasher = Sha1::new();
    hasher.update(format!("{}.{}", experiment_key, user_id).as_bytes());
    let result = hasher.finalize();
    let hex_str: String = result.iter().fold(String::new(), |mut acc, byte| {
        let _ = write!(acc, "{:02x}", byte);
        acc
    });
    // 15 hex chars always fit a u64
    let hash_val = u64::from_str_radix(&hex_str[..15], 16).unwrap_or(0);

    hash_val as f64 / LONG_SCALE as f64
}

type OverrideKey = (String, String);

#[derive(Clone)]
struct AgentState {
    sdk_key_header: String,
    datafiles: Arc<HashMap<String, Datafile>>,
    overrides: Arc<RwLock<HashMap<OverrideKey, String>>>,
}

impl AgentState {
    fn datafile(&self, headers: &HeaderMap) -> Result<&Datafile, Response> {
        headers
            .get(self.sdk_key_header.as_str())
            .and_then(|value| value.to_str().ok())
            .and_then(|sdk_key| self.datafiles.get(sdk_key))
            .ok_or_else(|| render_error(StatusCode::FORBIDDEN, DATAFILE_FORBIDDEN_ERROR))
    }
}

/// Writes `value` the way the agent does: compact json plus a trailing newline.
fn render<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_string(value) {
        Ok(mut body) => {
            body.push('\n');
            (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Err(e) => {
            tracing::error!("failed to serialize response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn render_error(status: StatusCode, error: &str) -> Response {
    render(
        status,
        &ErrorResponse {
            error: error.to_string(),
        },
    )
}

async fn activate(
    State(state): State<AgentState>,
    Query(params): Query<ActivateQueryParams>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let datafile = match state.datafile(&headers) {
        Ok(datafile) => datafile,
        Err(response) => return response,
    };
    let request: ActivateRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => return render_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    if request.user_id.is_empty() {
        return render_error(StatusCode::BAD_REQUEST, EMPTY_USER_ID_ERROR);
    }

    let mut experiments: Vec<&Experiment> = match &params.experiment_key {
        Some(key) => datafile.experiments.get(key).into_iter().collect(),
        None => datafile.experiments.values().collect(),
    };
    experiments.sort_by(|a, b| a.key.cmp(&b.key));

    let overrides = state.overrides.read().await;
    let decisions: Vec<Decision> = experiments
        .into_iter()
        .map(|experiment| {
            let forced = overrides.get(&(request.user_id.clone(), experiment.key.clone()));
            let variation_key = forced
                .map(String::as_str)
                .or_else(|| experiment.allocate(&request.user_id))
                .unwrap_or_default();
            Decision {
                experiment_key: Some(experiment.key.clone()),
                feature_key: None,
                variation_key: variation_key.to_string(),
                decision_type: Some("experiment".to_string()),
                enabled: Some(!variation_key.is_empty()),
                extra: Default::default(),
            }
        })
        .collect();

    render(StatusCode::OK, &decisions)
}

async fn set_override(
    State(state): State<AgentState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let datafile = match state.datafile(&headers) {
        Ok(datafile) => datafile,
        Err(response) => return response,
    };
    let request: OverrideRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => return render_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    if request.user_id.is_empty() {
        return render_error(StatusCode::BAD_REQUEST, EMPTY_USER_ID_ERROR);
    }
    if request.experiment_key.is_empty() {
        return render_error(StatusCode::BAD_REQUEST, EMPTY_EXPERIMENT_KEY_ERROR);
    }

    let key = (request.user_id.clone(), request.experiment_key.clone());
    let mut overrides = state.overrides.write().await;
    let previous = overrides.get(&key).cloned();
    let mut messages = Vec::new();

    if request.variation_key.is_empty() {
        match overrides.remove(&key) {
            Some(_) => messages.push(REMOVING_PREVIOUS_OVERRIDE),
            None => messages.push(NO_PRE_EXISTING_OVERRIDE),
        }
    } else {
        match datafile.experiments.get(&request.experiment_key) {
            None => messages.push(EXPERIMENT_KEY_NOT_FOUND),
            Some(experiment) if !experiment.has_variation(&request.variation_key) => {
                messages.push(VARIATION_KEY_NOT_FOUND)
            }
            Some(_) => {
                if previous.is_some() {
                    messages.push(UPDATING_PREVIOUS_OVERRIDE);
                }
                overrides.insert(key, request.variation_key.clone());
            }
        }
    }
    tracing::debug!(
        user_id = request.user_id,
        experiment_key = request.experiment_key,
        variation_key = request.variation_key,
        ?messages,
        "override applied"
    );

    render(
        StatusCode::OK,
        &OverrideResponse {
            user_id: request.user_id,
            experiment_key: request.experiment_key,
            variation_key: request.variation_key,
            prev_variation_key: previous.unwrap_or_default(),
            messages: if messages.is_empty() {
                None
            } else {
                Some(messages.into_iter().map(String::from).collect())
            },
        },
    )
}

fn router(config: &Config, datafiles: HashMap<String, Datafile>) -> Router {
    let state = AgentState {
        sdk_key_header: config.sdk_key_header.clone(),
        datafiles: Arc::new(datafiles),
        overrides: Arc::new(RwLock::new(HashMap::new())),
    };
    Router::new()
        .route(&config.activate_path, post(activate))
        .route(&config.override_path, post(set_override))
        .with_state(state)
}

/// A running stub agent. Shuts down when dropped.
pub struct StubAgent {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl StubAgent {
    /// Starts an agent serving the acceptance datafile for the test config's sdk key.
    pub async fn start() -> StubAgent {
        let mut datafiles = HashMap::new();
        datafiles.insert(DEFAULT_TEST_CONFIG.sdk_key.clone(), Datafile::acceptance());
        StubAgent::with_datafiles(&DEFAULT_TEST_CONFIG, datafiles).await
    }

    pub async fn with_datafiles(config: &Config, datafiles: HashMap<String, Datafile>) -> StubAgent {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();
        let app = router(config, datafiles);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { notify.notified().await })
                .await
        });
        StubAgent { addr, shutdown }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The test config pointed at this agent.
    pub fn config(&self) -> Config {
        Config {
            agent_url: self.url(),
            ..DEFAULT_TEST_CONFIG.clone()
        }
    }
}

impl Drop for StubAgent {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}
