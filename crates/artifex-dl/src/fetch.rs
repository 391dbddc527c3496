use std::{fs, path::Path};

use artifex_utils::{error::PathError, path::ensure_within_root};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    error::{DownloadError, Result},
    http::Http,
    http_client::HttpClient,
    uri::{normalize, FILE_PREFIX, HTTPS_PREFIX, HTTP_PREFIX},
};

/// Reads a `file://` identifier (or bare path), refusing anything outside `base_dir`.
///
/// Both the target and `base_dir` are resolved through symbolic links before the
/// containment check, so `..` segments and links pointing out of the root are rejected.
///
/// # Errors
///
/// * [`DownloadError::Path`] with [`PathError::EscapesRoot`] if the file lies outside
///   `base_dir`, or [`PathError::Canonicalize`] if either path cannot be resolved
/// * [`DownloadError::Io`] if the file cannot be read
pub fn read_trusted_file(identifier: &str, base_dir: &Path) -> Result<Vec<u8>> {
    let raw = identifier.strip_prefix(FILE_PREFIX).unwrap_or(identifier);

    let path = ensure_within_root(raw, base_dir).map_err(|err| {
        if let PathError::EscapesRoot { path, root } = &err {
            debug!(
                "Blocked read of {} outside of trusted root {}",
                path.display(),
                root.display()
            );
        }
        DownloadError::Path(err)
    })?;

    fs::read(&path).map_err(|err| {
        DownloadError::Io {
            action: "read",
            path,
            source: err,
        }
    })
}

/// Retrieves `identifier` and hands the raw bytes to `consumer`.
///
/// The identifier is normalized first. `file://` locations go through
/// [`read_trusted_file`]; everything else is fetched over HTTP. The response status is not
/// inspected, so the consumer sees error pages as they are.
///
/// The consumer receives the normalized location along with the body, and its error type
/// only needs to absorb [`DownloadError`].
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
///
/// use artifex_dl::{error::DownloadError, fetch::fetch_and_parse, http_client::HttpClient};
///
/// let lines = fetch_and_parse(
///     &HttpClient::default(),
///     "github:acme/gallery/index.txt",
///     Path::new("/srv/models"),
///     |_, body| Ok::<_, DownloadError>(body.split(|b| *b == b'\n').count()),
/// )
/// .unwrap();
/// ```
pub fn fetch_and_parse<T, E, F>(
    client: &HttpClient,
    identifier: &str,
    base_dir: &Path,
    consumer: F,
) -> std::result::Result<T, E>
where
    E: From<DownloadError>,
    F: FnOnce(&str, &[u8]) -> std::result::Result<T, E>,
{
    let location = normalize(identifier);

    let body = if location.starts_with(FILE_PREFIX) {
        read_trusted_file(&location, base_dir)?
    } else {
        debug!("Fetching {}", location);
        let resp = Http::fetch(client, &location)?;
        let status = resp.status().as_u16();
        if status >= 400 {
            warn!("{} answered with status {}", location, status);
        }
        Http::read_body(resp, &location)?
    };

    consumer(&location, &body)
}

/// [`fetch_and_parse`] with a JSON consumer.
pub fn fetch_json<T: DeserializeOwned>(
    client: &HttpClient,
    identifier: &str,
    base_dir: &Path,
) -> Result<T> {
    fetch_and_parse(client, identifier, base_dir, |location, body| {
        serde_json::from_slice(body).map_err(|err| {
            DownloadError::InvalidJson {
                url: location.to_string(),
                source: err,
            }
        })
    })
}

const IMAGE_DATA_PREFIX: &str = "data:image/";
const BASE64_MARKER: &str = ";base64,";

/// Returns an image as standard base64.
///
/// `http(s)` URLs are downloaded into memory and encoded. A `data:image/<type>;base64,`
/// URI has its prefix stripped, and the payload must decode as base64.
///
/// # Errors
///
/// * [`DownloadError::HttpError`] or [`DownloadError::Network`] if the download fails
/// * [`DownloadError::InvalidImage`] for anything else, or a data URI with a broken payload
pub fn fetch_base64_image(client: &HttpClient, input: &str) -> Result<String> {
    let input = input.trim();

    if input.starts_with(HTTP_PREFIX) || input.starts_with(HTTPS_PREFIX) {
        debug!("Fetching image {}", input);
        let resp = Http::fetch_ok(client, input)?;
        let body = Http::read_body(resp, input)?;
        return Ok(STANDARD.encode(body));
    }

    let payload = input
        .strip_prefix(IMAGE_DATA_PREFIX)
        .and_then(|rest| rest.split_once(BASE64_MARKER))
        .map(|(_, payload)| payload)
        .filter(|payload| STANDARD.decode(payload).is_ok())
        .ok_or_else(|| {
            DownloadError::InvalidImage {
                input: input.chars().take(64).collect(),
            }
        })?;

    Ok(payload.to_string())
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Gallery {
        name: String,
    }

    #[test]
    fn test_read_trusted_file_inside_root() {
        let root = tempdir().unwrap();
        let file = root.path().join("gallery.json");
        fs::write(&file, r#"{"name":"local"}"#).unwrap();

        let identifier = format!("file://{}", file.display());
        let body = read_trusted_file(&identifier, root.path()).unwrap();
        assert_eq!(body, br#"{"name":"local"}"#);
    }

    #[test]
    fn test_read_trusted_file_escape_is_rejected() {
        let parent = tempdir().unwrap();
        let root = parent.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(parent.path().join("secret.txt"), "secret").unwrap();

        let identifier = format!("file://{}/../secret.txt", root.display());
        let result = read_trusted_file(&identifier, &root);
        assert!(matches!(
            result,
            Err(DownloadError::Path(PathError::EscapesRoot { .. }))
        ));
    }

    #[test]
    fn test_fetch_json_over_http() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/gallery.json");
            then.status(200).body(r#"{"name":"remote"}"#);
        });

        let root = tempdir().unwrap();
        let gallery: Gallery =
            fetch_json(&HttpClient::default(), &server.url("/gallery.json"), root.path()).unwrap();
        assert_eq!(
            gallery,
            Gallery {
                name: "remote".into()
            }
        );
    }

    #[test]
    fn test_fetch_json_from_trusted_file() {
        let root = tempdir().unwrap();
        let file = root.path().join("gallery.json");
        fs::write(&file, r#"{"name":"local"}"#).unwrap();

        let gallery: Gallery = fetch_json(
            &HttpClient::default(),
            &format!("file://{}", file.display()),
            root.path(),
        )
        .unwrap();
        assert_eq!(gallery.name, "local");
    }

    #[test]
    fn test_fetch_and_parse_hands_error_bodies_to_consumer() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing.yaml");
            then.status(404).body("not here");
        });

        let root = tempdir().unwrap();
        let url = server.url("/missing.yaml");
        let seen = fetch_and_parse(&HttpClient::default(), &url, root.path(), |location, body| {
            Ok::<_, DownloadError>((location.to_string(), body.to_vec()))
        })
        .unwrap();
        assert_eq!(seen, (url, b"not here".to_vec()));
    }

    #[derive(Debug)]
    enum GalleryError {
        Download(DownloadError),
        Empty,
    }

    impl From<DownloadError> for GalleryError {
        fn from(err: DownloadError) -> Self {
            GalleryError::Download(err)
        }
    }

    #[test]
    fn test_fetch_and_parse_with_caller_error_type() {
        let root = tempdir().unwrap();
        let file = root.path().join("empty.yaml");
        fs::write(&file, "").unwrap();

        let result: std::result::Result<(), GalleryError> = fetch_and_parse(
            &HttpClient::default(),
            &format!("file://{}", file.display()),
            root.path(),
            |_, body| {
                if body.is_empty() {
                    Err(GalleryError::Empty)
                } else {
                    Ok(())
                }
            },
        );
        assert!(matches!(result, Err(GalleryError::Empty)));

        let outside = tempdir().unwrap();
        let stray = outside.path().join("stray.yaml");
        fs::write(&stray, "x").unwrap();
        let result: std::result::Result<(), GalleryError> = fetch_and_parse(
            &HttpClient::default(),
            &format!("file://{}", stray.display()),
            root.path(),
            |_, _| Ok(()),
        );
        assert!(matches!(result, Err(GalleryError::Download(_))));
    }

    #[test]
    fn test_fetch_base64_image_from_url() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/cat.png");
            then.status(200).body(b"\x89PNG\r\n");
        });
        server.mock(|when, then| {
            when.method(GET).path("/missing.png");
            then.status(404);
        });

        let client = HttpClient::default();
        assert_eq!(
            fetch_base64_image(&client, &server.url("/cat.png")).unwrap(),
            "iVBORw0K"
        );
        assert!(matches!(
            fetch_base64_image(&client, &server.url("/missing.png")),
            Err(DownloadError::HttpError { status: 404, .. })
        ));
    }

    #[test]
    fn test_fetch_base64_image_from_data_uri() {
        let client = HttpClient::default();
        assert_eq!(
            fetch_base64_image(&client, "data:image/jpeg;base64,aGVsbG8=").unwrap(),
            "aGVsbG8="
        );
        assert_eq!(
            fetch_base64_image(&client, "data:image/png;base64,aGk=").unwrap(),
            "aGk="
        );
    }

    #[test]
    fn test_fetch_base64_image_rejects_other_input() {
        let client = HttpClient::default();
        for input in [
            "cat.png",
            "ftp://example.com/cat.png",
            "data:text/plain;base64,aGk=",
            "data:image/jpeg;base64,not base64!",
        ] {
            assert!(
                matches!(
                    fetch_base64_image(&client, input),
                    Err(DownloadError::InvalidImage { .. })
                ),
                "{input} was accepted"
            );
        }
    }
}
