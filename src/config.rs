//! Project credentials and endpoint selection

use std::env;
use std::fmt;

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Environment variable holding the project identifier.
pub const PROJECT_ID_VAR: &str = "KOJI_PROJECT_ID";
/// Environment variable holding the project secret token.
pub const PROJECT_TOKEN_VAR: &str = "KOJI_PROJECT_TOKEN";
/// Environment variable that switches the client to the local test endpoint.
pub const TEST_MODE_VAR: &str = "KOJI_TEST_MODE";

/// Base URL used when `KOJI_TEST_MODE` is set.
pub const LOCAL_ENDPOINT: &str = "http://localhost:3129";
/// Base URL of the hosted service.
pub const PRODUCTION_ENDPOINT: &str = "https://database.api.gokoji.com";

/// Project secret token. Zeroed on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ProjectToken(String);

impl ProjectToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Drop for ProjectToken {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for ProjectToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProjectToken(<redacted>)")
    }
}

/// Credentials addressing one Koji project.
///
/// Immutable once built; clients share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub project_id: String,
    pub project_token: ProjectToken,
}

impl ProjectConfig {
    pub fn new(project_id: impl Into<String>, project_token: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            project_token: ProjectToken::new(project_token),
        }
    }
}

/// Source of project credentials, consulted once when a client is built.
pub trait ConfigProvider {
    fn resolve(&self) -> Result<ProjectConfig>;
}

impl ConfigProvider for ProjectConfig {
    fn resolve(&self) -> Result<ProjectConfig> {
        Ok(self.clone())
    }
}

/// Reads `KOJI_PROJECT_ID` and `KOJI_PROJECT_TOKEN` from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigProvider;

impl ConfigProvider for EnvConfigProvider {
    fn resolve(&self) -> Result<ProjectConfig> {
        let project_id = required_var(PROJECT_ID_VAR)?;
        let project_token = required_var(PROJECT_TOKEN_VAR)?;
        Ok(ProjectConfig::new(project_id, project_token))
    }
}

fn required_var(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::ConfigurationMissing(format!(
            "{} environment variable must be set",
            name
        ))),
    }
}

/// Returns `explicit` unchanged when given, otherwise asks `provider`.
pub fn resolve_config(
    explicit: Option<ProjectConfig>,
    provider: &dyn ConfigProvider,
) -> Result<ProjectConfig> {
    match explicit {
        Some(config) => Ok(config),
        None => provider.resolve(),
    }
}

/// Base URL of the remote service, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    /// Local test endpoint when `KOJI_TEST_MODE` is `true` or `1`, production otherwise.
    pub fn from_env() -> Self {
        let test_mode = env::var(TEST_MODE_VAR)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        if test_mode {
            Self(LOCAL_ENDPOINT.to_string())
        } else {
            Self(PRODUCTION_ENDPOINT.to_string())
        }
    }

    pub fn production() -> Self {
        Self(PRODUCTION_ENDPOINT.to_string())
    }

    pub fn custom(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::InvalidUrl(format!("Invalid endpoint URL '{}': {}", url, e)))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::InvalidUrl(format!(
                    "Unsupported endpoint scheme '{}'",
                    other
                )))
            }
        }
        Ok(Self(url.trim_end_matches('/').to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL of `path` (which starts with `/`).
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.0, path)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::from_env()
    }
}
