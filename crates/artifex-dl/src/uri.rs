//! Artifact identifier normalization.
//!
//! Callers hand us shorthand like `github:org/project/file.yaml` or
//! `huggingface://owner/repo/model.gguf@v2`. [`normalize`] rewrites those to the concrete
//! HTTPS location and leaves every other string alone, and [`ArtifactUri::parse`] sorts the
//! result into the closed set of backends the download engine knows how to serve.

use std::{fmt, path::PathBuf};

pub const GITHUB_PREFIX: &str = "github:";
pub const GITHUB_URL_PREFIX: &str = "github://";
pub const HUGGINGFACE_PREFIX: &str = "huggingface://";
pub const HF_PREFIX: &str = "hf://";
pub const OCI_PREFIX: &str = "oci://";
pub const OLLAMA_PREFIX: &str = "ollama://";
pub const FILE_PREFIX: &str = "file://";
pub const HTTP_PREFIX: &str = "http://";
pub const HTTPS_PREFIX: &str = "https://";

pub const GITHUB_RAW_HOST: &str = "raw.githubusercontent.com";
pub const HUGGINGFACE_HOST: &str = "huggingface.co";

const DEFAULT_REF: &str = "main";

/// Rewrites shorthand repository identifiers into fetchable HTTPS URLs.
///
/// * `github:org/project/path[@ref]` and `github://...` become
///   `https://raw.githubusercontent.com/org/project/<ref>/path`.
/// * `huggingface://owner/repo/path[@ref]` and `hf://...` become
///   `https://huggingface.co/owner/repo/resolve/<ref>/path`.
///
/// The ref is taken from the first path segment that contains `@`; that segment keeps only
/// the part before `@`. Without one the ref is `main`. Shorthands with too few segments
/// (and any other input) are returned unchanged, which also makes the function idempotent.
///
/// # Example
///
/// ```
/// use artifex_dl::uri::normalize;
///
/// assert_eq!(
///     normalize("github:acme/widgets@dev/models/a.bin"),
///     "https://raw.githubusercontent.com/acme/widgets/dev/models/a.bin"
/// );
/// assert_eq!(normalize("oci://ubuntu:22.04"), "oci://ubuntu:22.04");
/// ```
pub fn normalize(identifier: &str) -> String {
    if let Some(rest) = identifier
        .strip_prefix(GITHUB_URL_PREFIX)
        .or_else(|| identifier.strip_prefix(GITHUB_PREFIX))
    {
        return normalize_github(rest).unwrap_or_else(|| identifier.to_string());
    }

    if let Some(rest) = identifier
        .strip_prefix(HUGGINGFACE_PREFIX)
        .or_else(|| identifier.strip_prefix(HF_PREFIX))
    {
        return normalize_huggingface(rest).unwrap_or_else(|| identifier.to_string());
    }

    identifier.to_string()
}

fn normalize_github(rest: &str) -> Option<String> {
    let (segments, reference) = split_ref(rest);
    if segments.len() < 2 {
        return None;
    }

    Some(format!(
        "https://{GITHUB_RAW_HOST}/{}/{}/{}/{}",
        segments[0],
        segments[1],
        reference.unwrap_or_else(|| DEFAULT_REF.to_string()),
        segments[2..].join("/")
    ))
}

fn normalize_huggingface(rest: &str) -> Option<String> {
    let (segments, reference) = split_ref(rest);
    if segments.len() < 3 {
        return None;
    }

    Some(format!(
        "https://{HUGGINGFACE_HOST}/{}/{}/resolve/{}/{}",
        segments[0],
        segments[1],
        reference.unwrap_or_else(|| DEFAULT_REF.to_string()),
        segments[2..].join("/")
    ))
}

/// Splits `path` on `/` and pulls the ref out of the first segment carrying `@`.
fn split_ref(path: &str) -> (Vec<String>, Option<String>) {
    let mut reference = None;
    let mut segments = Vec::new();

    for segment in path.split('/') {
        match segment.split_once('@') {
            Some((name, rev)) if reference.is_none() => {
                if !rev.is_empty() {
                    reference = Some(rev.to_string());
                }
                segments.push(name.to_string());
            }
            _ => segments.push(segment.to_string()),
        }
    }

    (segments, reference)
}

/// Schemes that name something fetched over the network.
const REMOTE_PREFIXES: &[&str] = &[
    HTTP_PREFIX,
    HTTPS_PREFIX,
    HUGGINGFACE_PREFIX,
    HF_PREFIX,
    GITHUB_PREFIX,
    OCI_PREFIX,
    OLLAMA_PREFIX,
];

/// Returns true for strings carrying any recognised remote scheme.
///
/// `github://` is covered by the `github:` prefix. `file://` is local and not matched.
pub fn looks_like_url(s: &str) -> bool {
    REMOTE_PREFIXES.iter().any(|prefix| s.starts_with(prefix))
}

/// Returns true for strings naming a container image or registry model alias.
pub fn looks_like_oci(s: &str) -> bool {
    s.starts_with(OCI_PREFIX) || s.starts_with(OLLAMA_PREFIX)
}

/// A normalized artifact location, split by the backend that serves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactUri {
    /// A plain HTTP(S) URL.
    Http(String),
    /// A container image reference (without the `oci://` prefix).
    Registry(String),
    /// A registry model alias such as `gemma:2b` (without the `ollama://` prefix).
    RegistryAlias(String),
    /// A path on the local filesystem (without the `file://` prefix).
    LocalFile(PathBuf),
}

impl ArtifactUri {
    /// Normalizes `identifier` and classifies it.
    ///
    /// Strings without a recognized scheme are treated as HTTP locations; the request layer
    /// reports them if they turn out not to be valid URLs.
    pub fn parse(identifier: &str) -> Self {
        let normalized = normalize(identifier.trim());

        if let Some(reference) = normalized.strip_prefix(OCI_PREFIX) {
            ArtifactUri::Registry(reference.to_string())
        } else if let Some(reference) = normalized.strip_prefix(OLLAMA_PREFIX) {
            ArtifactUri::RegistryAlias(reference.to_string())
        } else if let Some(path) = normalized.strip_prefix(FILE_PREFIX) {
            ArtifactUri::LocalFile(PathBuf::from(path))
        } else {
            ArtifactUri::Http(normalized)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactUri::Http(_) => "http",
            ArtifactUri::Registry(_) => "oci",
            ArtifactUri::RegistryAlias(_) => "ollama",
            ArtifactUri::LocalFile(_) => "file",
        }
    }
}

impl fmt::Display for ArtifactUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactUri::Http(url) => f.write_str(url),
            ArtifactUri::Registry(reference) => write!(f, "{OCI_PREFIX}{reference}"),
            ArtifactUri::RegistryAlias(reference) => write!(f, "{OLLAMA_PREFIX}{reference}"),
            ArtifactUri::LocalFile(path) => write!(f, "{FILE_PREFIX}{}", path.display()),
        }
    }
}
