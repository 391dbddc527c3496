use std::io::Read;

use ureq::{
    http::{header::CONTENT_LENGTH, Response},
    Body,
};

use crate::{
    error::{DownloadError, Result},
    http_client::HttpClient,
};

pub struct Http;

impl Http {
    /// Issues a GET and returns the response whatever its status.
    pub fn fetch(client: &HttpClient, url: &str) -> Result<Response<Body>> {
        client
            .get(url)
            .call()
            .map_err(|err| DownloadError::network(url, err))
    }

    /// Issues a GET and turns any status of 400 or above into [`DownloadError::HttpError`].
    pub fn fetch_ok(client: &HttpClient, url: &str) -> Result<Response<Body>> {
        let resp = Self::fetch(client, url)?;
        Self::ensure_success(resp, url)
    }

    pub fn ensure_success(resp: Response<Body>, url: &str) -> Result<Response<Body>> {
        let status = resp.status().as_u16();
        if status >= 400 {
            return Err(DownloadError::HttpError {
                status,
                url: url.to_string(),
            });
        }
        Ok(resp)
    }

    pub fn json<T: serde::de::DeserializeOwned>(client: &HttpClient, url: &str) -> Result<T> {
        let resp = Self::fetch_ok(client, url)?;
        let body = Self::read_body(resp, url)?;
        serde_json::from_slice(&body).map_err(|err| {
            DownloadError::InvalidJson {
                url: url.to_string(),
                source: err,
            }
        })
    }

    pub fn content_length(resp: &Response<Body>) -> Option<u64> {
        resp.headers()
            .get(CONTENT_LENGTH)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
    }

    /// Reads the whole body without the size cap `read_to_vec` applies.
    pub fn read_body(resp: Response<Body>, url: &str) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|err| {
                DownloadError::InvalidResponse {
                    url: url.to_string(),
                    reason: err.to_string(),
                }
            })?;
        Ok(body)
    }
}
