use artifex_utils::error::{FileSystemError, HashError, PathError, UtilsError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(artifex_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(artifex_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Configuration file already exists")]
    #[diagnostic(
        code(artifex_config::already_exists),
        help("Remove the existing config file or use a different location")
    )]
    ConfigAlreadyExists,

    #[error("`{0}` must not be empty")]
    #[diagnostic(
        code(artifex_config::empty_value),
        help("Remove the key to use the default, or give it a value")
    )]
    EmptyValue(&'static str),

    #[error("Unknown checksum algorithm: {0}")]
    #[diagnostic(
        code(artifex_config::checksum_algorithm),
        help("Supported algorithms are `sha256` and `blake3`")
    )]
    InvalidChecksumAlgorithm(String),

    #[error("Invalid timeout: {0}")]
    #[diagnostic(
        code(artifex_config::timeout),
        help("Use a duration such as `30s`, `5m` or `1h30m`")
    )]
    InvalidTimeout(String),

    #[error("Invalid header `{0}`")]
    #[diagnostic(
        code(artifex_config::header),
        help("Header names must not be empty or contain whitespace")
    )]
    InvalidHeader(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(artifex_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(artifex_config::utils))]
    Utils(#[from] UtilsError),

    #[error("Failed to parse TOML: {0}")]
    #[diagnostic(code(artifex_config::toml))]
    Toml(#[from] toml_edit::TomlError),

    #[error("Encountered unexpected TOML item: {0}")]
    #[diagnostic(code(artifex_config::unexpected_toml_item))]
    UnexpectedTomlItem(String),
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<FileSystemError> for ConfigError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

impl From<HashError> for ConfigError {
    fn from(err: HashError) -> Self {
        match err {
            HashError::UnknownAlgorithm { name } => Self::InvalidChecksumAlgorithm(name),
            other => Self::Utils(UtilsError::Hash(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
