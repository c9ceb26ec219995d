//! Typed configuration.
//!
//! Process settings come from environment variables and are loaded once at
//! startup; secrets are wrapped in `secrecy::SecretString` so they never
//! reach the logs. Workflow settings come from an optional TOML file where
//! every key has a default.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::ChannelId;
use crate::time::minutes;

#[derive(Debug)]
pub struct Config {
    pub bot_token: SecretString,
    /// Selects the Postgres artifact store when set.
    pub database_url: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Workflow TOML; defaults apply when unset.
    pub workflow_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bot_token: SecretString::from(required_var("SEAVENT_BOT_TOKEN")?),
            database_url: std::env::var("DATABASE_URL").ok().map(SecretString::from),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            workflow_path: std::env::var("SEAVENT_CONFIG").ok(),
        })
    }

    /// The workflow config named by `SEAVENT_CONFIG`, or the defaults.
    pub fn workflow(&self) -> Result<WorkflowConfig> {
        match &self.workflow_path {
            Some(path) => WorkflowConfig::load(path),
            None => Ok(WorkflowConfig::default()),
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// An event category and the channel its published events go to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub name: String,
    pub channel: ChannelId,
}

/// Role-based gate on who may run the authoring command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoleGate {
    /// When non-empty, the user must hold at least one of these.
    pub allowed: Vec<String>,
    /// Holding any of these refuses the user outright.
    pub denied: Vec<String>,
}

impl RoleGate {
    pub fn permits(&self, roles: &[String]) -> bool {
        if roles.iter().any(|r| self.denied.contains(r)) {
            return false;
        }
        self.allowed.is_empty() || roles.iter().any(|r| self.allowed.contains(r))
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Command name echoed back in user-facing texts.
    pub command_name: String,
    /// How long the review controls stay live.
    pub editing_timeout: Duration,
    /// How long an image prompt waits for a reply.
    pub attachment_timeout: Duration,
    /// Never empty; the first entry is the default category.
    pub categories: Vec<Category>,
    pub roles: RoleGate,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawWorkflowConfig {
    command_name: String,
    editing_timeout_minutes: u64,
    attachment_timeout_minutes: u64,
    categories: Vec<Category>,
    roles: RoleGate,
}

impl Default for RawWorkflowConfig {
    fn default() -> Self {
        Self {
            command_name: "seavent".to_string(),
            editing_timeout_minutes: 30,
            attachment_timeout_minutes: 10,
            categories: vec![
                Category {
                    name: "Meetup".to_string(),
                    channel: ChannelId::new("meetups"),
                },
                Category {
                    name: "Happening".to_string(),
                    channel: ChannelId::new("happenings"),
                },
            ],
            roles: RoleGate::default(),
        }
    }
}

impl TryFrom<RawWorkflowConfig> for WorkflowConfig {
    type Error = Error;

    fn try_from(raw: RawWorkflowConfig) -> Result<Self> {
        if raw.categories.is_empty() {
            return Err(Error::Config("at least one category is required".into()));
        }
        if raw.command_name.trim().is_empty() {
            return Err(Error::Config("command_name must not be empty".into()));
        }
        Ok(Self {
            command_name: raw.command_name,
            editing_timeout: timeout_minutes(
                "editing_timeout_minutes",
                raw.editing_timeout_minutes,
            )?,
            attachment_timeout: timeout_minutes(
                "attachment_timeout_minutes",
                raw.attachment_timeout_minutes,
            )?,
            categories: raw.categories,
            roles: raw.roles,
        })
    }
}

fn timeout_minutes(key: &str, value: u64) -> Result<Duration> {
    if value == 0 {
        return Err(Error::Config(format!("{key} must be at least 1")));
    }
    Ok(minutes(value))
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let raw = RawWorkflowConfig::default();
        Self {
            command_name: raw.command_name,
            editing_timeout: minutes(raw.editing_timeout_minutes),
            attachment_timeout: minutes(raw.attachment_timeout_minutes),
            categories: raw.categories,
            roles: raw.roles,
        }
    }
}

impl WorkflowConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawWorkflowConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        raw.try_into()
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// `None` only if an embedder emptied `categories` after loading.
    pub fn default_category(&self) -> Option<&Category> {
        self.categories.first()
    }

    pub fn saved_text(&self) -> String {
        format!(
            "Saved for later! You can continue from where you left off with \"/{}\". \
             Don't wait too long, or you will have to start over again!",
            self.command_name
        )
    }
}
