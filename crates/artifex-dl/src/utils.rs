use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use crate::{
    error::{DownloadError, Result},
    oci::OciReference,
    uri::ArtifactUri,
};

/// Extract filename from URL path
pub fn filename_from_url(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut s| s.next_back())
            .filter(|s| !s.is_empty())
            .and_then(|s| {
                percent_decode_str(s)
                    .decode_utf8()
                    .ok()
                    .map(|cow| cow.into_owned())
            })
    })
}

/// Picks a local file name for an artifact when the caller did not name one.
///
/// Images have no single file and yield their repository's last component, which callers
/// use as a directory name.
pub fn default_output_name(uri: &ArtifactUri) -> Option<String> {
    match uri {
        ArtifactUri::Http(url) => filename_from_url(url),
        ArtifactUri::Registry(reference) => {
            let reference = OciReference::parse(reference);
            reference
                .repository
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(String::from)
        }
        ArtifactUri::RegistryAlias(reference) => {
            let reference = OciReference::ollama(reference);
            let name = reference.repository.rsplit('/').next()?;
            Some(format!("{}-{}", name, reference.tag))
        }
        ArtifactUri::LocalFile(path) => {
            path.file_name().map(|n| n.to_string_lossy().into_owned())
        }
    }
}

/// Determine output path
///
/// An explicit output ending in `/` or naming an existing directory gets the derived file
/// name appended.
pub fn resolve_output_path(output: Option<&Path>, uri: &ArtifactUri) -> Result<PathBuf> {
    match output {
        Some(p) if p.as_os_str().to_string_lossy().ends_with('/') || p.is_dir() => {
            let filename = default_output_name(uri).ok_or(DownloadError::NoFilename)?;
            Ok(p.join(filename))
        }
        Some(p) => Ok(p.to_path_buf()),
        None => {
            default_output_name(uri)
                .map(PathBuf::from)
                .ok_or(DownloadError::NoFilename)
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/path/to/file.tar.gz"),
            Some("file.tar.gz".to_string())
        );
        assert_eq!(
            filename_from_url("https://example.com/my%20model.gguf"),
            Some("my model.gguf".to_string())
        );
        assert_eq!(filename_from_url("https://example.com/"), None);
        assert_eq!(filename_from_url("not a url"), None);
    }

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_output_name(&ArtifactUri::parse("hf://OrgX/RepoY/model.gguf@v2")),
            Some("model.gguf".into())
        );
        assert_eq!(
            default_output_name(&ArtifactUri::parse("oci://ghcr.io/acme/tiny-model:v1")),
            Some("tiny-model".into())
        );
        assert_eq!(
            default_output_name(&ArtifactUri::parse("ollama://gemma:2b")),
            Some("gemma-2b".into())
        );
        assert_eq!(
            default_output_name(&ArtifactUri::parse("file:///srv/models/a.yaml")),
            Some("a.yaml".into())
        );
    }

    #[test]
    fn test_resolve_output_path() {
        let uri = ArtifactUri::parse("https://example.com/a/model.bin");
        assert_eq!(
            resolve_output_path(None, &uri).unwrap(),
            PathBuf::from("model.bin")
        );
        assert_eq!(
            resolve_output_path(Some(Path::new("out/")), &uri).unwrap(),
            PathBuf::from("out/model.bin")
        );
        assert_eq!(
            resolve_output_path(Some(Path::new("renamed.bin")), &uri).unwrap(),
            PathBuf::from("renamed.bin")
        );

        let dir = tempdir().unwrap();
        assert_eq!(
            resolve_output_path(Some(dir.path()), &uri).unwrap(),
            dir.path().join("model.bin")
        );

        let bare = ArtifactUri::parse("https://example.com/");
        assert!(matches!(
            resolve_output_path(None, &bare),
            Err(DownloadError::NoFilename)
        ));
    }
}
