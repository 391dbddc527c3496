use std::path::PathBuf;

use artifex_utils::error::{FileSystemError, HashError, PathError};
use miette::Diagnostic;
use thiserror::Error;

use crate::scan::ScanResult;

#[derive(Error, Diagnostic, Debug)]
pub enum DownloadError {
    #[error("Invalid URL: {url}")]
    #[diagnostic(code(artifex_dl::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    #[diagnostic(code(artifex_dl::extract_error))]
    ExtractError(#[from] compak::error::ArchiveError),

    #[error("Request to {url} failed: {source}")]
    #[diagnostic(
        code(artifex_dl::network),
        help("Check your internet connection or try again later")
    )]
    Network {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(artifex_dl::http_error))]
    HttpError { status: u16, url: String },

    #[error("Failed to {action} `{}`: {source}", .path.display())]
    #[diagnostic(code(artifex_dl::io))]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rename `{}` to `{}`: {source}", .from.display(), .to.display())]
    #[diagnostic(code(artifex_dl::rename))]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove stale staging file `{}`: {source}", .path.display())]
    #[diagnostic(
        code(artifex_dl::stale_staging),
        help("Remove the file manually and retry")
    )]
    StaleStaging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(artifex_dl::filesystem))]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(artifex_dl::path))]
    Path(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(code(artifex_dl::hash))]
    Hash(#[from] HashError),

    #[error(
        "Checksum mismatch for `{}`: expected {expected}, computed {computed}",
        .path.display()
    )]
    #[diagnostic(
        code(artifex_dl::checksum_mismatch),
        help("The file was kept on disk; delete it or fix the expected checksum")
    )]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        computed: String,
    },

    #[error("Local file `{}` requested without a trusted root", .path.display())]
    #[diagnostic(
        code(artifex_dl::local_file_not_allowed),
        help("Configure a trusted root directory to read local files")
    )]
    LocalFileNotAllowed { path: PathBuf },

    #[error("{context}: {source}")]
    #[diagnostic(code(artifex_dl::delegated))]
    Context {
        context: String,
        #[source]
        source: Box<DownloadError>,
    },

    #[error("Layer with media type {media_type} not found in {reference}")]
    #[diagnostic(code(artifex_dl::layer_not_found))]
    LayerNotFound {
        reference: String,
        media_type: String,
    },

    #[error("Invalid response from {url}: {reason}")]
    #[diagnostic(code(artifex_dl::invalid_response))]
    InvalidResponse { url: String, reason: String },

    #[error("Failed to parse response from {url}: {source}")]
    #[diagnostic(code(artifex_dl::invalid_json))]
    InvalidJson {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{input}` is neither an image URL nor a base64 image data URI")]
    #[diagnostic(
        code(artifex_dl::invalid_image),
        help("Pass an http(s) URL or a `data:image/<type>;base64,` string")
    )]
    InvalidImage { input: String },

    #[error("File name could not be determined")]
    #[diagnostic(
        code(artifex_dl::no_filename),
        help("Try specifying an output path explicitly")
    )]
    NoFilename,

    #[error("`{identifier}` is not a Hugging Face repository")]
    #[diagnostic(
        code(artifex_dl::not_hub_resource),
        help("Scanning is only available for huggingface:// URIs or huggingface.co URLs")
    )]
    NotHubResource { identifier: String },

    #[error("Repository {} contains unsafe files", .result.repository_id)]
    #[diagnostic(
        code(artifex_dl::unsafe_files),
        help(
            "Infected: [{}]. Dangerous pickles: [{}]",
            .result.clamav_infected_files.join(", "),
            .result.dangerous_pickles.join(", ")
        )
    )]
    UnsafeFiles { result: Box<ScanResult> },
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl DownloadError {
    pub fn network(url: impl Into<String>, err: ureq::Error) -> Self {
        Self::Network {
            url: url.into(),
            source: Box::new(err),
        }
    }

    /// Wraps a collaborator's error, prefixing it with what was being attempted.
    pub fn context(context: impl Into<String>, err: DownloadError) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(err),
        }
    }

    /// Follows [`DownloadError::Context`] wrappers down to the originating error.
    pub fn root(&self) -> &DownloadError {
        match self {
            DownloadError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}
