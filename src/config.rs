use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub uploadthing: UploadThingConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub app: PublicAppConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    /// Upper bound on one `generateContent` call.
    #[serde(default = "default_gemini_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            request_timeout_secs: default_gemini_timeout(),
        }
    }
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Deserialize, Clone)]
pub struct UploadThingConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_uploadthing_api_url")]
    pub api_url: String,
    #[serde(default = "default_uploadthing_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for UploadThingConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_uploadthing_api_url(),
            request_timeout_secs: default_uploadthing_timeout(),
        }
    }
}

impl std::fmt::Debug for UploadThingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadThingConfig")
            .field("token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default)]
    pub webhook_url: String,
    /// Signing secret of the Slack app. Interactivity requests are only
    /// verified when this is set.
    #[serde(default)]
    pub signing_secret: Option<String>,
    #[serde(default = "default_slack_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            signing_secret: None,
            request_timeout_secs: default_slack_timeout(),
        }
    }
}

// The webhook URL embeds its own credential
impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("webhook_url", &"[REDACTED]")
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PublicAppConfig {
    /// Externally reachable base URL used to build approval links.
    #[serde(default)]
    pub public_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_secs: u64,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_submitter")]
    pub default_submitter: String,
    #[serde(default = "default_token_retention")]
    pub token_retention_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            approval_timeout_secs: default_approval_timeout(),
            state_dir: default_state_dir(),
            default_submitter: default_submitter(),
            token_retention_secs: default_token_retention(),
        }
    }
}

impl WorkflowConfig {
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    pub fn token_retention(&self) -> Duration {
        Duration::from_secs(self.token_retention_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash-preview-image-generation".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_uploadthing_api_url() -> String {
    "https://api.uploadthing.com".to_string()
}

fn default_gemini_timeout() -> u64 {
    300
}

fn default_uploadthing_timeout() -> u64 {
    120
}

fn default_slack_timeout() -> u64 {
    120
}

fn default_approval_timeout() -> u64 {
    10 * 60
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./memepick-state")
}

fn default_submitter() -> String {
    "default".to_string()
}

fn default_token_retention() -> u64 {
    60 * 60
}

/// Plain environment variables honoured as fallbacks, lowest priority.
const ENV_FALLBACKS: &[(&str, &str)] = &[
    ("GEMINI_API_KEY", "gemini.api_key"),
    ("UPLOADTHING_TOKEN", "uploadthing.token"),
    ("SLACK_WEBHOOK_URL", "slack.webhook_url"),
    ("SLACK_SIGNING_SECRET", "slack.signing_secret"),
    // Later entries win
    ("APP_URL", "app.public_url"),
    ("NEXT_PUBLIC_APP_URL", "app.public_url"),
];

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        for (var, key) in ENV_FALLBACKS {
            if let Ok(value) = std::env::var(var) {
                builder = builder
                    .set_default(*key, value)
                    .map_err(|e| AppError::Config(e.to_string()))?;
            }
        }

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("memepick").required(false));
        }

        // Environment variable overrides with MEMEPICK_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("MEMEPICK")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject missing required settings before any work is attempted.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("gemini.api_key (GEMINI_API_KEY)", &self.gemini.api_key),
            ("uploadthing.token (UPLOADTHING_TOKEN)", &self.uploadthing.token),
            ("slack.webhook_url (SLACK_WEBHOOK_URL)", &self.slack.webhook_url),
            ("app.public_url (NEXT_PUBLIC_APP_URL)", &self.app.public_url),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::Config(format!("{name} is not set")));
            }
        }

        for (name, secs) in [
            ("gemini.request_timeout_secs", self.gemini.request_timeout_secs),
            ("uploadthing.request_timeout_secs", self.uploadthing.request_timeout_secs),
            ("slack.request_timeout_secs", self.slack.request_timeout_secs),
        ] {
            if secs == 0 {
                return Err(AppError::Config(format!("{name} must be greater than zero")));
            }
        }

        if self.workflow.approval_timeout_secs == 0 {
            return Err(AppError::Config(
                "workflow.approval_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn public_url(&self) -> &str {
        self.app.public_url.trim_end_matches('/')
    }

    pub fn signing_secret(&self) -> Option<&str> {
        self.slack
            .signing_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}
