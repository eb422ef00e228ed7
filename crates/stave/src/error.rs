use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error in {path}: {message}")]
    TomlParse { path: PathBuf, message: String },

    #[error("{message}: {key}")]
    Config { key: String, message: String },

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Unknown plugin: {name}")]
    UnknownPlugin { name: String },

    #[error("Directory walk error in {path}: {message}")]
    WalkDir { path: PathBuf, message: String },

    #[error("{plugin} failed on {path}: {source}")]
    Plugin {
        plugin: &'static str,
        path: PathBuf,
        #[source]
        source: PluginError,
    },
}

impl StaveError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Failure of a single plugin on a single item.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("converter failed: {output}")]
    Conversion { output: String },

    #[error("could not run {program}: {message}")]
    Process { program: String, message: String },

    #[error("security violation in template '{template}': {reason}")]
    SecurityViolation { template: String, reason: String },

    #[error("malformed option '{key}': {value:?}")]
    MalformedOption { key: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
}

impl PluginError {
    pub fn is_security_violation(&self) -> bool {
        matches!(self, Self::SecurityViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, StaveError>;

pub type PluginResult<T> = std::result::Result<T, PluginError>;
