use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use artifex_utils::{
    fs::{ensure_dir_exists, parent_dir, remove_file_if_exists},
    hash::{ChecksumAlgorithm, Checksummer, ExpectedChecksum},
};
use serde::Deserialize;
use tracing::{debug, info};
use ureq::{
    http::{
        header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE},
        Response,
    },
    Body,
};
use url::Url;

use crate::{
    archive::{ArchiveExtractor, CompakExtractor},
    error::{DownloadError, Result},
    http::Http,
    http_client::HttpClient,
    observer::ChunkObserver,
    progress::ProgressReporter,
    registry::{ProgressFactory, RegistryBackend},
    staging::StagingFile,
};

pub const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";
pub const OLLAMA_REGISTRY: &str = "registry.ollama.ai";
pub const OLLAMA_MODEL_MEDIA_TYPE: &str = "application/vnd.ollama.image.model";

const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json";

const DEFAULT_TAG: &str = "latest";
const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    pub registry: String,
    pub repository: String,
    /// A tag such as `22.04` or a digest such as `sha256:...`.
    pub tag: String,
}

impl OciReference {
    /// Parses a Docker-style image reference.
    ///
    /// The first path component is taken as the registry host when it looks like one (it
    /// contains `.` or `:`, or is `localhost`); otherwise Docker Hub is assumed and single
    /// component names live under `library/`.
    ///
    /// ```
    /// use artifex_dl::oci::OciReference;
    ///
    /// let r = OciReference::parse("ghcr.io/acme/models:v1");
    /// assert_eq!(r.registry, "ghcr.io");
    /// assert_eq!(r.repository, "acme/models");
    /// assert_eq!(r.tag, "v1");
    ///
    /// let r = OciReference::parse("ubuntu");
    /// assert_eq!(r.repository, "library/ubuntu");
    /// assert_eq!(r.tag, "latest");
    /// ```
    pub fn parse(value: &str) -> Self {
        let (name, tag) = split_tag(value.trim());

        let (registry, repository) = match name.split_once('/') {
            Some((host, rest)) if looks_like_host(host) => {
                let host = if host == "docker.io" {
                    DOCKER_HUB_REGISTRY
                } else {
                    host
                };
                (host.to_string(), rest.to_string())
            }
            _ => (DOCKER_HUB_REGISTRY.to_string(), name.to_string()),
        };

        let repository = if registry == DOCKER_HUB_REGISTRY && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository
        };

        Self {
            registry,
            repository,
            tag,
        }
    }

    /// Parses a model alias such as `gemma:2b` or `user/model:tag` against the model registry.
    pub fn ollama(value: &str) -> Self {
        let (name, tag) = split_tag(value.trim());

        let (registry, repository) = match name.split_once('/') {
            Some((host, rest)) if looks_like_host(host) => (host.to_string(), rest.to_string()),
            _ => (OLLAMA_REGISTRY.to_string(), name.to_string()),
        };

        let repository = if repository.contains('/') {
            repository
        } else {
            format!("library/{repository}")
        };

        Self {
            registry,
            repository,
            tag,
        }
    }

    pub fn api(&self) -> String {
        format!("https://{}/v2", self.registry)
    }
}

impl fmt::Display for OciReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.tag.contains(':') { '@' } else { ':' };
        write!(f, "{}/{}{}{}", self.registry, self.repository, sep, self.tag)
    }
}

fn split_tag(value: &str) -> (&str, String) {
    if let Some((name, digest)) = value.split_once('@') {
        return (name, digest.to_string());
    }

    let last_slash = value.rfind('/').map(|i| i + 1).unwrap_or(0);
    match value[last_slash..].rfind(':') {
        Some(i) => {
            let split = last_slash + i;
            (&value[..split], value[split + 1..].to_string())
        }
        None => (value, DEFAULT_TAG.to_string()),
    }
}

fn looks_like_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

#[derive(Debug, Clone, Deserialize)]
pub struct OciDescriptor {
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl OciDescriptor {
    pub fn title(&self) -> Option<&str> {
        self.annotations.get(TITLE_ANNOTATION).map(|s| s.as_str())
    }

    fn hex(&self) -> &str {
        self.digest
            .split_once(':')
            .map(|(_, hex)| hex)
            .unwrap_or(&self.digest)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OciManifest {
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub config: Option<OciDescriptor>,
    #[serde(default)]
    pub layers: Vec<OciDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OciPlatform {
    pub architecture: String,
    pub os: String,
}

impl OciPlatform {
    /// The platform of the running host in registry terms (`amd64`, `arm64`, ...).
    pub fn host() -> Self {
        let architecture = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            "arm" => "arm",
            other => other,
        };

        Self {
            architecture: architecture.to_string(),
            os: std::env::consts::OS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct IndexEntry {
    digest: String,
    #[serde(default)]
    platform: Option<OciPlatform>,
}

/// A manifest or an index, told apart by which list is present.
#[derive(Debug, Deserialize)]
struct ManifestDocument {
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
    #[serde(default)]
    config: Option<OciDescriptor>,
    #[serde(default)]
    layers: Vec<OciDescriptor>,
    #[serde(default)]
    manifests: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// A resolved image: where it came from and what it is made of.
#[derive(Debug, Clone)]
pub struct OciImage {
    pub reference: OciReference,
    pub manifest: OciManifest,
}

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

impl BearerChallenge {
    fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut challenge = BearerChallenge::default();
        for (key, value) in parse_auth_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => challenge.realm = value,
                "service" => challenge.service = Some(value),
                "scope" => challenge.scope = Some(value),
                _ => {}
            }
        }

        (!challenge.realm.is_empty()).then_some(challenge)
    }
}

/// Splits `a="x,y",b=z` into pairs, honouring quotes.
fn parse_auth_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let mut push = |raw: &str| {
        if let Some((key, value)) = raw.split_once('=') {
            pairs.push((
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ));
        }
    };

    for c in params.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                push(&current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push(&current);

    pairs
}

/// Maps a layer media type to the archive suffix the extractor needs, if it is a tarball.
fn layer_archive_suffix(media_type: &str) -> Option<&'static str> {
    let media_type = media_type.to_ascii_lowercase();
    if !(media_type.contains(".tar") || media_type.contains("rootfs")) {
        return None;
    }

    if media_type.contains("gzip") {
        Some(".tar.gz")
    } else if media_type.contains("zstd") {
        Some(".tar.zst")
    } else {
        Some(".tar")
    }
}

/// Default registry backend speaking the OCI distribution API.
pub struct OciRegistry {
    client: HttpClient,
    api: Option<String>,
    ollama_api: String,
    platform: OciPlatform,
    archives: Arc<dyn ArchiveExtractor>,
    tokens: Mutex<HashMap<String, String>>,
}

impl OciRegistry {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            api: None,
            ollama_api: format!("https://{OLLAMA_REGISTRY}/v2"),
            platform: OciPlatform::host(),
            archives: Arc::new(CompakExtractor),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Sends every image request to `api` instead of the registry named in the reference.
    pub fn api(mut self, api: impl Into<String>) -> Self {
        self.api = Some(api.into());
        self
    }

    pub fn ollama_api(mut self, api: impl Into<String>) -> Self {
        self.ollama_api = api.into();
        self
    }

    pub fn platform(mut self, platform: OciPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn archives(mut self, archives: Arc<dyn ArchiveExtractor>) -> Self {
        self.archives = archives;
        self
    }

    fn api_for(&self, reference: &OciReference) -> String {
        self.api.clone().unwrap_or_else(|| reference.api())
    }

    fn send(&self, url: &str, accept: Option<&str>, token: Option<&str>) -> Result<Response<Body>> {
        let mut req = self.client.get(url);
        if let Some(accept) = accept {
            req = req.header(ACCEPT, accept);
        }
        if let Some(token) = token {
            req = req.header(AUTHORIZATION, &format!("Bearer {token}"));
        }
        req.call().map_err(|err| DownloadError::network(url, err))
    }

    /// GETs `url`, answering a bearer challenge once if the registry asks for one.
    fn get_authorized(
        &self,
        url: &str,
        accept: Option<&str>,
        repository: &str,
    ) -> Result<Response<Body>> {
        let cached = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(repository)
            .cloned();

        let resp = self.send(url, accept, cached.as_deref())?;
        if resp.status().as_u16() != 401 {
            return Http::ensure_success(resp, url);
        }

        let challenge = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|h| h.to_str().ok())
            .and_then(BearerChallenge::parse)
            .ok_or_else(|| {
                DownloadError::HttpError {
                    status: 401,
                    url: url.to_string(),
                }
            })?;

        let token = self.request_token(&challenge)?;
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(repository.to_string(), token.clone());

        let resp = self.send(url, accept, Some(&token))?;
        Http::ensure_success(resp, url)
    }

    fn request_token(&self, challenge: &BearerChallenge) -> Result<String> {
        let mut url = Url::parse(&challenge.realm).map_err(|err| {
            DownloadError::InvalidUrl {
                url: challenge.realm.clone(),
                source: err,
            }
        })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            if let Some(scope) = &challenge.scope {
                query.append_pair("scope", scope);
            }
        }

        debug!("Requesting registry token from {}", challenge.realm);
        let response: TokenResponse = Http::json(&self.client, url.as_str())?;
        response
            .token
            .or(response.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                DownloadError::InvalidResponse {
                    url: challenge.realm.clone(),
                    reason: "token response carries no token".into(),
                }
            })
    }

    fn fetch_document(&self, api: &str, repository: &str, tag: &str) -> Result<ManifestDocument> {
        let url = format!(
            "{}/{}/manifests/{}",
            api.trim_end_matches('/'),
            repository,
            tag
        );
        let resp = self.get_authorized(&url, Some(MANIFEST_ACCEPT), repository)?;
        let body = Http::read_body(resp, &url)?;
        serde_json::from_slice(&body).map_err(|err| DownloadError::InvalidJson { url, source: err })
    }

    /// Fetches the manifest for `tag`, following an index to the entry for this platform.
    fn fetch_manifest(&self, api: &str, repository: &str, tag: &str) -> Result<OciManifest> {
        let document = self.fetch_document(api, repository, tag)?;
        if document.manifests.is_empty() {
            return Ok(OciManifest {
                media_type: document.media_type,
                config: document.config,
                layers: document.layers,
            });
        }

        let entry = match document
            .manifests
            .iter()
            .find(|m| m.platform.as_ref() == Some(&self.platform))
        {
            Some(entry) => entry,
            None => {
                debug!(
                    "No manifest for {}/{} in {}, using the first entry",
                    self.platform.os, self.platform.architecture, repository
                );
                &document.manifests[0]
            }
        };

        debug!("Selected manifest {} for {}", entry.digest, repository);
        let document = self.fetch_document(api, repository, &entry.digest)?;
        Ok(OciManifest {
            media_type: document.media_type,
            config: document.config,
            layers: document.layers,
        })
    }

    /// Streams one blob into `dest` through a staging file, verifying its digest first.
    fn download_blob(
        &self,
        api: &str,
        repository: &str,
        layer: &OciDescriptor,
        dest: &Path,
        mut reporter: Option<ProgressReporter>,
    ) -> Result<()> {
        let url = format!(
            "{}/{}/blobs/{}",
            api.trim_end_matches('/'),
            repository,
            layer.digest
        );
        let expected = ExpectedChecksum::parse(&layer.digest, ChecksumAlgorithm::Sha256)?;
        let resp = self.get_authorized(&url, None, repository)?;

        ensure_dir_exists(parent_dir(dest))?;
        let mut staging = StagingFile::create(dest)?;
        let mut checksum = Checksummer::new(expected.algorithm);
        let mut reader = resp.into_body().into_reader();

        let mut observers: Vec<&mut dyn ChunkObserver> = vec![&mut checksum];
        if let Some(reporter) = reporter.as_mut() {
            observers.push(reporter);
        }
        staging.stream_from(&mut reader, observers)?;

        let computed = checksum.finalize();
        if !expected.matches(&computed) {
            staging.discard();
            return Err(DownloadError::ChecksumMismatch {
                path: dest.to_path_buf(),
                expected: expected.to_string(),
                computed: format!("{}:{}", expected.algorithm, computed),
            });
        }

        staging.commit()?;
        Ok(())
    }

    fn extract_layer(
        &self,
        api: &str,
        image: &OciImage,
        layer: &OciDescriptor,
        dest: &Path,
    ) -> Result<()> {
        let repository = &image.reference.repository;

        if let Some(suffix) = layer_archive_suffix(&layer.media_type) {
            let blob = dest.join(format!("{}{}", layer.hex(), suffix));
            self.download_blob(api, repository, layer, &blob, None)?;
            let extracted = self.archives.extract(&blob, dest);
            remove_file_if_exists(&blob)?;
            return extracted;
        }

        match layer.title().and_then(|t| Path::new(t).file_name()) {
            Some(name) => {
                let target: PathBuf = dest.join(name);
                self.download_blob(api, repository, layer, &target, None)
            }
            None => {
                debug!(
                    "Skipping layer {} with media type {}",
                    layer.digest, layer.media_type
                );
                Ok(())
            }
        }
    }
}

impl RegistryBackend for OciRegistry {
    fn resolve_image(&self, reference: &str) -> Result<OciImage> {
        let reference = OciReference::parse(reference);
        let api = self.api_for(&reference);
        let manifest = self.fetch_manifest(&api, &reference.repository, &reference.tag)?;

        Ok(OciImage {
            reference,
            manifest,
        })
    }

    fn extract_image(&self, image: &OciImage, dest: &Path) -> Result<()> {
        ensure_dir_exists(dest)?;
        let api = self.api_for(&image.reference);

        for layer in &image.manifest.layers {
            self.extract_layer(&api, image, layer, dest)?;
        }

        info!("Extracted {} into {}", image.reference, dest.display());
        Ok(())
    }

    fn fetch_alias_model(
        &self,
        reference: &str,
        dest: &Path,
        progress: ProgressFactory<'_>,
    ) -> Result<()> {
        let reference = OciReference::ollama(reference);
        let api = if reference.registry == OLLAMA_REGISTRY {
            self.ollama_api.clone()
        } else {
            reference.api()
        };

        let manifest = self.fetch_manifest(&api, &reference.repository, &reference.tag)?;
        let layer = manifest
            .layers
            .iter()
            .find(|l| l.media_type == OLLAMA_MODEL_MEDIA_TYPE)
            .ok_or_else(|| {
                DownloadError::LayerNotFound {
                    reference: reference.to_string(),
                    media_type: OLLAMA_MODEL_MEDIA_TYPE.into(),
                }
            })?;

        let reporter = progress(&dest.display().to_string(), Some(layer.size));
        self.download_blob(&api, &reference.repository, layer, dest, Some(reporter))?;

        info!("Fetched {} into {}", reference, dest.display());
        Ok(())
    }
}
