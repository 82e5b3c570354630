use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Longest value accepted for any configuration field.
pub const MAX_FIELD_LENGTH: usize = 63;

/// A value that did not fit its [`BoundedString`] capacity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value of {len} characters exceeds the limit of {max}")]
pub struct LengthExceeded {
    pub len: usize,
    pub max: usize,
}

/// Owned string holding at most `N` characters.
///
/// Construction fails instead of truncating.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BoundedString<const N: usize>(String);

impl<const N: usize> BoundedString<N> {
    pub fn new(value: &str) -> Result<Self, LengthExceeded> {
        let len = value.chars().count();
        if len > N {
            return Err(LengthExceeded { len, max: N });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> fmt::Debug for BoundedString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl<const N: usize> fmt::Display for BoundedString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type ConfigField = BoundedString<MAX_FIELD_LENGTH>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config is empty")]
    Empty,
    #[error("config is missing field {0}")]
    MissingField(&'static str),
    #[error("config field {field} is longer than {max} characters")]
    FieldTooLong { field: &'static str, max: usize },
}

/// Database credentials and table prefix read from the config file.
///
/// The file holds four whitespace separated values, in order:
///
/// ```text
/// DB_NAME DB_USER DB_PSWD TABLE_PREFIX
/// ```
///
/// Values must not contain quotes or whitespace. Anything after the fourth
/// value is ignored.
#[derive(Clone, PartialEq, Eq)]
pub struct ImportConfig {
    pub store_name: ConfigField,
    pub store_user: ConfigField,
    pub store_credential: ConfigField,
    pub table_prefix: ConfigField,
}

impl ImportConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut tokens = contents.split_whitespace().peekable();
        if tokens.peek().is_none() {
            return Err(ConfigError::Empty);
        }

        let mut next_field = |field: &'static str| -> Result<ConfigField, ConfigError> {
            let token = tokens.next().ok_or(ConfigError::MissingField(field))?;
            ConfigField::new(token).map_err(|err| ConfigError::FieldTooLong {
                field,
                max: err.max,
            })
        };

        Ok(Self {
            store_name: next_field("DB_NAME")?,
            store_user: next_field("DB_USER")?,
            store_credential: next_field("DB_PSWD")?,
            table_prefix: next_field("TABLE_PREFIX")?,
        })
    }
}

impl fmt::Debug for ImportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportConfig")
            .field("store_name", &self.store_name)
            .field("store_user", &self.store_user)
            .field("store_credential", &"<redacted>")
            .field("table_prefix", &self.table_prefix)
            .finish()
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

/// Where the database server lives. Credentials come from [`ImportConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
}

impl ConnectionSettings {
    pub fn from_env() -> Self {
        Self {
            host: env_string("IMPORT_DB_HOST", "localhost"),
            port: env_u16("IMPORT_DB_PORT", 3306),
        }
    }

    /// Replace env-derived values with explicitly supplied ones.
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_env()
    }
}
