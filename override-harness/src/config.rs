use envconfig::Envconfig;
use once_cell::sync::Lazy;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {}", s)),
        }
    }
}

impl From<FlexBool> for bool {
    fn from(flex: FlexBool) -> Self {
        flex.0
    }
}

impl Deref for FlexBool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(default = "http://localhost:8080")]
    pub agent_url: String,

    #[envconfig(from = "SDK_KEY")]
    pub sdk_key: String,

    // Any key the agent cannot fetch a datafile for works here
    #[envconfig(default = "invalid_sdk_key")]
    pub invalid_sdk_key: String,

    #[envconfig(default = "X-Optimizely-SDK-Key")]
    pub sdk_key_header: String,

    #[envconfig(default = "/v1/activate")]
    pub activate_path: String,

    #[envconfig(default = "/v1/override")]
    pub override_path: String,

    #[envconfig(default = "matjaz")]
    pub user_id: String,

    #[envconfig(default = "ab_test1")]
    pub experiment_key: String,

    #[envconfig(default = "variation_1")]
    pub default_variation: String,

    #[envconfig(default = "variation_2")]
    pub override_variation: String,

    #[envconfig(default = "5000")]
    pub request_timeout_ms: u64,

    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: FlexBool,
}

impl Config {
    pub fn default_test_config() -> Self {
        Self {
            agent_url: "http://127.0.0.1:0".to_string(),
            sdk_key: "test_sdk_key".to_string(),
            invalid_sdk_key: "invalid_sdk_key".to_string(),
            sdk_key_header: "X-Optimizely-SDK-Key".to_string(),
            activate_path: "/v1/activate".to_string(),
            override_path: "/v1/override".to_string(),
            user_id: "matjaz".to_string(),
            experiment_key: "ab_test1".to_string(),
            default_variation: "variation_1".to_string(),
            override_variation: "variation_2".to_string(),
            request_timeout_ms: 2000,
            debug: FlexBool(false),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

pub static DEFAULT_TEST_CONFIG: Lazy<Config> = Lazy::new(Config::default_test_config);
