use std::time::Duration;

use rand::{distributions::Alphanumeric, Rng};
use reqwest::header::{self, HeaderName, HeaderValue};
use url::Url;

use crate::api::Endpoint;
use crate::config::Config;
use crate::errors::HarnessError;

/// The user/experiment pair a session makes decisions for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub user_id: String,
    pub experiment_key: String,
}

impl Subject {
    pub fn new(user_id: impl Into<String>, experiment_key: impl Into<String>) -> Self {
        Subject {
            user_id: user_id.into(),
            experiment_key: experiment_key.into(),
        }
    }

    /// A subject with a random user id, for suites sharing one agent.
    pub fn isolated(prefix: &str, experiment_key: impl Into<String>) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        Subject::new(format!("{}{}", prefix, suffix), experiment_key)
    }
}

/// Everything a harness call needs to reach the agent. Immutable once built.
#[derive(Debug, Clone)]
pub struct Session {
    base_url: Url,
    sdk_key: HeaderValue,
    sdk_key_header: HeaderName,
    activate_path: String,
    override_path: String,
    subject: Subject,
    http: reqwest::Client,
}

impl Session {
    /// A session authenticated with the configured sdk key.
    pub fn valid(config: &Config) -> Result<Session, HarnessError> {
        Session::with_sdk_key(config, &config.sdk_key)
    }

    /// A session whose sdk key the agent cannot fetch a datafile for.
    pub fn invalid_sdk_key(config: &Config) -> Result<Session, HarnessError> {
        Session::with_sdk_key(config, &config.invalid_sdk_key)
    }

    pub fn with_sdk_key(config: &Config, sdk_key: &str) -> Result<Session, HarnessError> {
        let base_url = Url::parse(&config.agent_url).map_err(|source| HarnessError::InvalidUrl {
            url: config.agent_url.clone(),
            source,
        })?;
        let sdk_key_header = HeaderName::from_bytes(config.sdk_key_header.as_bytes())
            .map_err(|e| HarnessError::InvalidHeader(format!("{}: {}", config.sdk_key_header, e)))?;
        let mut sdk_key = HeaderValue::from_str(sdk_key)
            .map_err(|e| HarnessError::InvalidHeader(e.to_string()))?;
        sdk_key.set_sensitive(true);

        Ok(Session {
            base_url,
            sdk_key,
            sdk_key_header,
            activate_path: config.activate_path.clone(),
            override_path: config.override_path.clone(),
            subject: Subject::new(config.user_id.clone(), config.experiment_key.clone()),
            http: build_http_client(config.request_timeout())
                .map_err(HarnessError::ClientBuild)?,
        })
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn credential(&self) -> (HeaderName, HeaderValue) {
        (self.sdk_key_header.clone(), self.sdk_key.clone())
    }

    /// Resolves an endpoint against the base url, keeping any path prefix the base carries.
    pub fn url_for(&self, endpoint: Endpoint) -> Result<Url, HarnessError> {
        let path = match endpoint {
            Endpoint::Activate => &self.activate_path,
            Endpoint::Override => &self.override_path,
        };
        let url = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&url).map_err(|source| HarnessError::InvalidUrl { url, source })
    }
}

pub fn build_http_client(request_timeout: Duration) -> reqwest::Result<reqwest::Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent("override-harness")
        .timeout(request_timeout)
        .build()
}
