use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{DownloadError, Result},
    http::Http,
    http_client::HttpClient,
    uri::{normalize, HF_PREFIX, HUGGINGFACE_HOST, HUGGINGFACE_PREFIX},
};

pub const HUGGINGFACE_API: &str = "https://huggingface.co";

/// Verdict returned by the model hub's scan endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanResult {
    #[serde(rename = "repositoryId", deserialize_with = "null_as_default")]
    pub repository_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub revision: String,
    #[serde(rename = "hasUnsafeFile", deserialize_with = "null_as_default")]
    pub has_unsafe_file: bool,
    #[serde(rename = "clamAVInfectedFiles", deserialize_with = "null_as_default")]
    pub clamav_infected_files: Vec<String>,
    #[serde(rename = "dangerousPickles", deserialize_with = "null_as_default")]
    pub dangerous_pickles: Vec<String>,
    #[serde(rename = "scansDone", deserialize_with = "null_as_default")]
    pub scans_done: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Extracts `(owner, repo)` from a model hub identifier.
///
/// Accepts `huggingface://owner/repo[/...]`, `hf://...` and `https://huggingface.co/owner/repo/...`.
/// Anything else yields `None`.
pub fn hub_repository(identifier: &str) -> Option<(String, String)> {
    let identifier = identifier.trim();

    if let Some(rest) = identifier
        .strip_prefix(HUGGINGFACE_PREFIX)
        .or_else(|| identifier.strip_prefix(HF_PREFIX))
    {
        let mut parts = rest.split('/').map(|p| p.split('@').next().unwrap_or(p));
        let owner = parts.next().filter(|s| !s.is_empty())?;
        let repo = parts.next().filter(|s| !s.is_empty())?;
        return Some((owner.to_string(), repo.to_string()));
    }

    let url = Url::parse(&normalize(identifier)).ok()?;
    if url.host_str() != Some(HUGGINGFACE_HOST) {
        return None;
    }

    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    Some((owner.to_string(), repo.to_string()))
}

/// Asks the model hub whether a repository contains unsafe files.
#[derive(Debug, Clone)]
pub struct HubScanner {
    client: HttpClient,
    api: String,
}

impl HubScanner {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            api: HUGGINGFACE_API.to_string(),
        }
    }

    pub fn api(mut self, api: impl Into<String>) -> Self {
        self.api = api.into();
        self
    }

    /// Scans the repository behind `identifier`.
    ///
    /// # Errors
    ///
    /// * [`DownloadError::NotHubResource`] if the identifier is not a model hub resource
    /// * [`DownloadError::HttpError`] if the scan endpoint answers with anything but 200
    /// * [`DownloadError::UnsafeFiles`] if the hub flags unsafe content; the full result is
    ///   carried in the error
    pub fn scan(&self, identifier: &str) -> Result<ScanResult> {
        let (owner, repo) = hub_repository(identifier).ok_or_else(|| {
            DownloadError::NotHubResource {
                identifier: identifier.to_string(),
            }
        })?;

        let url = format!(
            "{}/api/models/{}/{}/scan",
            self.api.trim_end_matches('/'),
            owner,
            repo
        );
        debug!("Scanning {}/{} via {}", owner, repo, url);

        let resp = Http::fetch(&self.client, &url)?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(DownloadError::HttpError { status, url });
        }

        let body = Http::read_body(resp, &url)?;
        let result: ScanResult = serde_json::from_slice(&body)
            .map_err(|err| DownloadError::InvalidJson { url, source: err })?;

        if result.has_unsafe_file {
            warn!(
                "{}/{} flagged as unsafe: infected {:?}, dangerous pickles {:?}",
                owner, repo, result.clamav_infected_files, result.dangerous_pickles
            );
            return Err(DownloadError::UnsafeFiles {
                result: Box::new(result),
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_hub_repository() {
        assert_eq!(
            hub_repository("huggingface://OrgX/RepoY/file.bin@v2"),
            Some(("OrgX".into(), "RepoY".into()))
        );
        assert_eq!(
            hub_repository("hf://OrgX/RepoY@dev"),
            Some(("OrgX".into(), "RepoY".into()))
        );
        assert_eq!(
            hub_repository("https://huggingface.co/OrgX/RepoY/resolve/main/file.bin"),
            Some(("OrgX".into(), "RepoY".into()))
        );
        assert_eq!(hub_repository("https://example.com/OrgX/RepoY"), None);
        assert_eq!(hub_repository("huggingface://OrgX"), None);
        assert_eq!(hub_repository("oci://ubuntu"), None);
    }

    #[test]
    fn test_scan_result_tolerates_nulls_and_missing_fields() {
        let result: ScanResult = serde_json::from_value(json!({
            "repositoryId": "OrgX/RepoY",
            "clamAVInfectedFiles": null,
            "scansDone": true
        }))
        .unwrap();
        assert_eq!(result.repository_id, "OrgX/RepoY");
        assert!(result.clamav_infected_files.is_empty());
        assert!(result.dangerous_pickles.is_empty());
        assert!(!result.has_unsafe_file);
        assert!(result.scans_done);
    }

    #[test]
    fn test_scan_safe_repository() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/models/OrgX/RepoY/scan");
            then.status(200).json_body(json!({
                "repositoryId": "OrgX/RepoY",
                "revision": "abc123",
                "hasUnsafeFile": false,
                "clamAVInfectedFiles": [],
                "dangerousPickles": [],
                "scansDone": true
            }));
        });

        let scanner = HubScanner::new(HttpClient::default()).api(server.base_url());
        let result = scanner.scan("huggingface://OrgX/RepoY/file.bin").unwrap();
        assert_eq!(result.revision, "abc123");
        assert!(result.scans_done);
        mock.assert();
    }

    #[test]
    fn test_scan_unsafe_repository_returns_result_with_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/models/OrgX/RepoY/scan");
            then.status(200).json_body(json!({
                "repositoryId": "OrgX/RepoY",
                "hasUnsafeFile": true,
                "dangerousPickles": ["model.pkl"]
            }));
        });

        let scanner = HubScanner::new(HttpClient::default()).api(server.base_url());
        match scanner.scan("https://huggingface.co/OrgX/RepoY/resolve/main/model.pkl") {
            Err(DownloadError::UnsafeFiles { result }) => {
                assert!(result.has_unsafe_file);
                assert_eq!(result.dangerous_pickles, vec!["model.pkl"]);
            }
            other => panic!("Expected UnsafeFiles, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_non_hub_identifier() {
        let scanner = HubScanner::new(HttpClient::default());
        assert!(matches!(
            scanner.scan("https://example.com/a.bin"),
            Err(DownloadError::NotHubResource { .. })
        ));
    }

    #[test]
    fn test_scan_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/models/OrgX/RepoY/scan");
            then.status(404);
        });

        let scanner = HubScanner::new(HttpClient::default()).api(server.base_url());
        assert!(matches!(
            scanner.scan("hf://OrgX/RepoY"),
            Err(DownloadError::HttpError { status: 404, .. })
        ));
    }
}
