//! Environment selection and configuration errors.
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Target environment of a municipal web service.
///
/// Every municipality publishes a production endpoint and, usually, a
/// homologation ("sandbox") endpoint with identical contracts. Which URL is
/// used for a given operation is decided by the municipality descriptor.
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use nfse_core::config::Environment;
///
/// let env = Environment::from_str("sandbox")?;
/// assert_eq!(env, Environment::Sandbox);
/// # Ok::<(), nfse_core::config::EnvironmentParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    Production,
    Sandbox,
}

/// Error returned when parsing an [`Environment`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentParseError {
    #[error("invalid environment: {input}")]
    Invalid { input: String },
}

impl FromStr for Environment {
    type Err = EnvironmentParseError;
    fn from_str(env: &str) -> Result<Environment, EnvironmentParseError> {
        match env.to_ascii_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "sandbox" | "homologation" | "test" => Ok(Environment::Sandbox),
            _ => Err(EnvironmentParseError::Invalid {
                input: env.to_string(),
            }),
        }
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Sandbox => "sandbox",
        }
    }
}

/// Configuration errors. All of these are detectable before any network
/// activity and are fatal for the operation that hit them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("operation {operation} is not registered for municipality {municipality}")]
    UnknownOperation {
        municipality: String,
        operation: &'static str,
    },
    #[error("no {environment} endpoint declared for operation {operation}")]
    MissingEndpoint {
        environment: &'static str,
        operation: &'static str,
    },
    #[error("operation {operation} declares no SOAP action name")]
    MissingOperationName { operation: &'static str },
    #[error("operation {operation} declares no payload template")]
    MissingTemplate { operation: &'static str },
    #[error("template {name}.xml not found in any of {searched:?}")]
    TemplateNotFound {
        name: String,
        searched: Vec<std::path::PathBuf>,
    },
    #[error("failed to read template {name}: {source}")]
    TemplateRead {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("template rendering failed: {0}")]
    Render(String),
}
