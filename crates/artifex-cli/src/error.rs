use artifex_config::error::ConfigError;
use artifex_dl::error::DownloadError;
use artifex_utils::error::{FileSystemError, PathError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    #[diagnostic(code(artifex::path))]
    Path(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(code(artifex::filesystem))]
    FileSystem(#[from] FileSystemError),

    #[error("Error while {action}")]
    #[diagnostic(code(artifex::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid header `{0}`")]
    #[diagnostic(code(artifex::header), help("Pass headers as `Name: value`"))]
    InvalidHeader(String),

    #[error("Invalid proxy `{url}`")]
    #[diagnostic(code(artifex::proxy))]
    InvalidProxy {
        url: String,
        #[source]
        source: ureq::Error,
    },

    #[error("A checksum can only be given for a single artifact")]
    #[diagnostic(
        code(artifex::checksum_with_batch),
        help("Download artifacts one at a time to verify each of them")
    )]
    ChecksumWithBatch,

    #[error("{failed} of {total} artifacts failed")]
    #[diagnostic(code(artifex::batch))]
    BatchFailed { failed: usize, total: usize },

    #[error(transparent)]
    #[diagnostic(code(artifex::toml))]
    TomlError(#[from] toml::ser::Error),

    #[error("Failed to encode output as JSON")]
    #[diagnostic(code(artifex::json))]
    Json(#[from] serde_json::Error),
}

pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, CliError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, CliError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            CliError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

pub type CliResult<T> = std::result::Result<T, CliError>;
