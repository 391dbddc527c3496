use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use artifex_utils::{
    fs::{ensure_dir_exists, parent_dir, remove_file_if_exists},
    hash::{calculate_checksum, ChecksumAlgorithm, Checksummer, ExpectedChecksum},
    path::ensure_within_root,
};
use tracing::{debug, info};

use crate::{
    archive::{ArchiveExtractor, CompakExtractor},
    error::{DownloadError, Result},
    http::Http,
    http_client::HttpClient,
    observer::ChunkObserver,
    oci::OciRegistry,
    progress::{ProgressCallback, ProgressReporter, ProgressUpdate},
    registry::RegistryBackend,
    scan::{hub_repository, HubScanner},
    staging::StagingFile,
    uri::ArtifactUri,
};

/// Downloads one artifact to a fixed path.
///
/// Plain HTTP artifacts are skipped when the destination already exists (and matches the
/// expected checksum, if one is given), otherwise streamed into `<output>.partial`, renamed
/// into place, verified, and expanded when they are archives. Registry identifiers are
/// handed to a [`RegistryBackend`].
pub struct ArtifactDownload {
    identifier: String,
    output: PathBuf,
    checksum: Option<String>,
    default_algorithm: ChecksumAlgorithm,
    file_index: usize,
    file_count: usize,
    extract: bool,
    scan: bool,
    trusted_root: Option<PathBuf>,
    client: HttpClient,
    registry: Option<Arc<dyn RegistryBackend>>,
    archives: Arc<dyn ArchiveExtractor>,
    scanner: Option<HubScanner>,
    on_progress: Option<ProgressCallback>,
}

impl ArtifactDownload {
    /// Creates a download of `identifier` into `output`.
    ///
    /// Defaults: no expected checksum (SHA-256 is still computed), position 1 of 1, archive
    /// expansion on, no safety scan, no local files, a default [`HttpClient`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use artifex_dl::download::ArtifactDownload;
    ///
    /// let path = ArtifactDownload::new("hf://acme/tiny/model.gguf@v2", "/srv/models/tiny.gguf")
    ///     .checksum("sha256:0a1b...")
    ///     .execute()
    ///     .unwrap();
    /// ```
    pub fn new(identifier: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            output: output.into(),
            checksum: None,
            default_algorithm: ChecksumAlgorithm::default(),
            file_index: 1,
            file_count: 1,
            extract: true,
            scan: false,
            trusted_root: None,
            client: HttpClient::default(),
            registry: None,
            archives: Arc::new(CompakExtractor),
            scanner: None,
            on_progress: None,
        }
    }

    /// Sets the expected checksum, as `algo:hex` or bare hex. Empty strings are ignored.
    pub fn checksum(mut self, checksum: impl Into<String>) -> Self {
        let checksum = checksum.into();
        self.checksum = (!checksum.trim().is_empty()).then_some(checksum);
        self
    }

    /// Algorithm for bare-hex checksums and for the digest computed when none is expected.
    pub fn algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.default_algorithm = algorithm;
        self
    }

    /// Positions this artifact at `index` (1-based) of a batch of `count`.
    pub fn batch(mut self, index: usize, count: usize) -> Self {
        self.file_index = index;
        self.file_count = count;
        self
    }

    pub fn extract(mut self, extract: bool) -> Self {
        self.extract = extract;
        self
    }

    /// Runs the model hub safety scan before downloading hub artifacts.
    pub fn scan(mut self, scan: bool) -> Self {
        self.scan = scan;
        self
    }

    /// Allows `file://` identifiers, confined to `root`.
    pub fn trusted_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.trusted_root = Some(root.into());
        self
    }

    pub fn client(mut self, client: HttpClient) -> Self {
        self.client = client;
        self
    }

    pub fn registry(mut self, registry: Arc<dyn RegistryBackend>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn archives(mut self, archives: Arc<dyn ArchiveExtractor>) -> Self {
        self.archives = archives;
        self
    }

    pub fn scanner(mut self, scanner: HubScanner) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProgressUpdate) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_progress(mut self, callback: Option<ProgressCallback>) -> Self {
        self.on_progress = callback;
        self
    }

    /// Acquires the artifact and returns the output path.
    pub fn execute(self) -> Result<PathBuf> {
        let expected = self
            .checksum
            .as_deref()
            .map(|c| ExpectedChecksum::parse(c, self.default_algorithm))
            .transpose()?;

        let uri = ArtifactUri::parse(&self.identifier);
        debug!("Resolved {} to {} ({})", self.identifier, uri, uri.kind());

        match &uri {
            ArtifactUri::RegistryAlias(reference) => self.fetch_alias(reference)?,
            ArtifactUri::Registry(reference) => self.fetch_image(reference)?,
            ArtifactUri::LocalFile(path) => self.copy_local(path, expected.as_ref())?,
            ArtifactUri::Http(url) => self.download_http(url, expected.as_ref())?,
        }

        Ok(self.output)
    }

    fn registry_backend(&self) -> Arc<dyn RegistryBackend> {
        self.registry
            .clone()
            .unwrap_or_else(|| Arc::new(OciRegistry::new(self.client.clone())))
    }

    fn reporter(&self, name: &str, total: Option<u64>) -> ProgressReporter {
        ProgressReporter::new(name, total)
            .batch(self.file_index, self.file_count)
            .callback(self.on_progress.clone())
    }

    fn display_name(&self) -> String {
        self.output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.output.display().to_string())
    }

    fn fetch_alias(&self, reference: &str) -> Result<()> {
        let progress = |name: &str, total: Option<u64>| self.reporter(name, total);
        self.registry_backend()
            .fetch_alias_model(reference, &self.output, &progress)
            .map_err(|err| {
                DownloadError::context(format!("failed to fetch model {reference}"), err)
            })
    }

    fn fetch_image(&self, reference: &str) -> Result<()> {
        let registry = self.registry_backend();
        let image = registry.resolve_image(reference).map_err(|err| {
            DownloadError::context(format!("failed to get image {reference}"), err)
        })?;

        let dest = parent_dir(&self.output);
        registry.extract_image(&image, &dest).map_err(|err| {
            DownloadError::context(
                format!("failed to extract image {reference} into {}", dest.display()),
                err,
            )
        })
    }

    fn download_http(&self, url: &str, expected: Option<&ExpectedChecksum>) -> Result<()> {
        if self.reuse_existing(expected)? {
            return Ok(());
        }

        if self.scan {
            self.scan_hub()?;
        }

        info!("Downloading {} to {}", url, self.output.display());
        let resp = Http::fetch_ok(&self.client, url)?;
        let total = Http::content_length(&resp);
        let mut reader = resp.into_body().into_reader();
        self.materialize(&mut reader, total, expected)
    }

    fn copy_local(&self, path: &Path, expected: Option<&ExpectedChecksum>) -> Result<()> {
        let root = self.trusted_root.as_ref().ok_or_else(|| {
            DownloadError::LocalFileNotAllowed {
                path: path.to_path_buf(),
            }
        })?;

        if self.reuse_existing(expected)? {
            return Ok(());
        }

        let source = ensure_within_root(path, root)?;
        let mut file = File::open(&source).map_err(|err| {
            DownloadError::Io {
                action: "open",
                path: source.clone(),
                source: err,
            }
        })?;
        let total = file.metadata().ok().map(|m| m.len());

        info!("Copying {} to {}", source.display(), self.output.display());
        self.materialize(&mut file, total, expected)
    }

    fn scan_hub(&self) -> Result<()> {
        if hub_repository(&self.identifier).is_none() {
            debug!("{} is not a model hub artifact, skipping scan", self.identifier);
            return Ok(());
        }

        let scanner = self
            .scanner
            .clone()
            .unwrap_or_else(|| HubScanner::new(self.client.clone()));
        let result = scanner.scan(&self.identifier)?;
        debug!(
            "Scan of {} at {} found nothing unsafe",
            result.repository_id, result.revision
        );
        Ok(())
    }

    /// Returns true when the destination can be used as is.
    ///
    /// An existing file with the wrong checksum is deleted so the caller downloads afresh.
    fn reuse_existing(&self, expected: Option<&ExpectedChecksum>) -> Result<bool> {
        match fs::metadata(&self.output) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(DownloadError::Io {
                    action: "stat",
                    path: self.output.clone(),
                    source: err,
                });
            }
        }

        let Some(expected) = expected else {
            debug!("{} already exists, skipping download", self.output.display());
            return Ok(true);
        };

        let computed = calculate_checksum(&self.output, expected.algorithm)?;
        if expected.matches(&computed) {
            debug!(
                "{} already exists with matching checksum, skipping download",
                self.output.display()
            );
            return Ok(true);
        }

        info!(
            "Removing {} (checksum {} does not match {})",
            self.output.display(),
            computed,
            expected
        );
        remove_file_if_exists(&self.output)?;
        Ok(false)
    }

    /// Streams `reader` through staging, hashing and progress, then verifies and expands.
    fn materialize<R: Read>(
        &self,
        reader: &mut R,
        total: Option<u64>,
        expected: Option<&ExpectedChecksum>,
    ) -> Result<()> {
        let parent = parent_dir(&self.output);
        ensure_dir_exists(&parent)?;

        let algorithm = expected
            .map(|e| e.algorithm)
            .unwrap_or(self.default_algorithm);
        let mut checksum = Checksummer::new(algorithm);
        let mut reporter = self.reporter(&self.display_name(), total);

        let mut staging = StagingFile::create(&self.output)?;
        let observers: Vec<&mut dyn ChunkObserver> = vec![&mut checksum, &mut reporter];
        let written = staging.stream_from(reader, observers)?;
        staging.commit()?;

        let computed = checksum.finalize();
        debug!(
            "Wrote {} bytes to {} ({}:{})",
            written,
            self.output.display(),
            algorithm,
            computed
        );

        match expected {
            Some(expected) if !expected.matches(&computed) => {
                return Err(DownloadError::ChecksumMismatch {
                    path: self.output.clone(),
                    expected: expected.to_string(),
                    computed: format!("{algorithm}:{computed}"),
                });
            }
            Some(_) => info!("File {} downloaded and verified", self.output.display()),
            None => {
                debug!(
                    "No checksum given for {}, skipping verification",
                    self.output.display()
                )
            }
        }

        if self.extract && self.archives.is_archive(&self.output) {
            info!(
                "Extracting {} into {}",
                self.output.display(),
                parent.display()
            );
            self.archives
                .extract(&self.output, &parent)
                .map_err(|err| {
                    DownloadError::context(
                        format!("failed to extract {}", self.output.display()),
                        err,
                    )
                })?;
        }

        Ok(())
    }
}

/// Downloads `identifier` to `dest` with a caller-supplied client.
///
/// Shorthand for [`ArtifactDownload`] with an optional checksum, batch position and
/// progress callback.
pub fn download_file(
    client: &HttpClient,
    identifier: &str,
    dest: &Path,
    checksum: Option<&str>,
    file_index: usize,
    file_count: usize,
    on_progress: Option<ProgressCallback>,
) -> Result<PathBuf> {
    let mut download = ArtifactDownload::new(identifier, dest)
        .client(client.clone())
        .batch(file_index, file_count)
        .on_progress(on_progress);

    if let Some(checksum) = checksum {
        download = download.checksum(checksum);
    }

    download.execute()
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Write},
        net::{TcpListener, TcpStream},
        sync::Mutex,
        thread,
        time::Duration,
    };

    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        http_client::ClientConfig,
        oci::{OciImage, OciManifest, OciReference},
        registry::ProgressFactory,
    };

    const HELLO: &[u8] = b"hello world\n";
    const HELLO_SHA256: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";
    const WRONG_SHA256: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    fn serve_hello<'a>(server: &'a MockServer, path: &str) -> httpmock::Mock<'a> {
        let path = path.to_string();
        server.mock(|when, then| {
            when.method(GET).path(path);
            then.status(200).body(HELLO);
        })
    }

    #[test]
    fn test_download_with_checksum() {
        let server = MockServer::start();
        let mock = serve_hello(&server, "/a.bin");
        let dir = tempdir().unwrap();
        let dest = dir.path().join("nested").join("a.bin");

        let path = ArtifactDownload::new(server.url("/a.bin"), &dest)
            .checksum(HELLO_SHA256.to_uppercase())
            .execute()
            .unwrap();

        assert_eq!(path, dest);
        assert_eq!(fs::read(&dest).unwrap(), HELLO);
        assert!(!crate::staging::staging_path(&dest).exists());
        mock.assert_hits(1);
    }

    #[test]
    fn test_existing_file_with_matching_checksum_skips_network() {
        let server = MockServer::start();
        let mock = serve_hello(&server, "/a.bin");
        let dir = tempdir().unwrap();
        let dest = dir.path().join("a.bin");
        fs::write(&dest, HELLO).unwrap();

        ArtifactDownload::new(server.url("/a.bin"), &dest)
            .checksum(format!("sha256:{HELLO_SHA256}"))
            .execute()
            .unwrap();

        mock.assert_hits(0);
    }

    #[test]
    fn test_existing_file_without_checksum_is_trusted() {
        let server = MockServer::start();
        let mock = serve_hello(&server, "/a.bin");
        let dir = tempdir().unwrap();
        let dest = dir.path().join("a.bin");
        fs::write(&dest, "something else").unwrap();

        ArtifactDownload::new(server.url("/a.bin"), &dest)
            .execute()
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"something else");
        mock.assert_hits(0);
    }

    #[test]
    fn test_existing_file_with_wrong_checksum_is_replaced() {
        let server = MockServer::start();
        let mock = serve_hello(&server, "/a.bin");
        let dir = tempdir().unwrap();
        let dest = dir.path().join("a.bin");
        fs::write(&dest, "corrupted").unwrap();

        download_file(
            &HttpClient::default(),
            &server.url("/a.bin"),
            &dest,
            Some(HELLO_SHA256),
            1,
            1,
            None,
        )
        .unwrap();

        assert_eq!(
            calculate_checksum(&dest, ChecksumAlgorithm::Sha256).unwrap(),
            HELLO_SHA256
        );
        mock.assert_hits(1);
    }

    #[test]
    fn test_checksum_mismatch_keeps_file_and_names_both_digests() {
        let server = MockServer::start();
        serve_hello(&server, "/a.bin");
        let dir = tempdir().unwrap();
        let dest = dir.path().join("a.bin");

        let err = ArtifactDownload::new(server.url("/a.bin"), &dest)
            .checksum(WRONG_SHA256)
            .execute()
            .unwrap_err();

        let msg = err.to_string();
        assert!(matches!(err, DownloadError::ChecksumMismatch { .. }));
        assert!(msg.contains(WRONG_SHA256));
        assert!(msg.contains(HELLO_SHA256));
        assert_eq!(fs::read(&dest).unwrap(), HELLO);
    }

    #[test]
    fn test_error_status_fails_without_touching_destination() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing.bin");
            then.status(404);
        });
        let dir = tempdir().unwrap();
        let dest = dir.path().join("missing.bin");

        let result = ArtifactDownload::new(server.url("/missing.bin"), &dest).execute();

        assert!(matches!(
            result,
            Err(DownloadError::HttpError { status: 404, .. })
        ));
        assert!(!dest.exists());
        assert!(!crate::staging::staging_path(&dest).exists());
    }

    /// Accepts one connection, reads the request head and hands the stream to `respond`.
    fn serve_once<F>(respond: F) -> String
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            respond(stream);
        });

        format!("http://{addr}/a.bin")
    }

    /// Serves one response that promises more bytes than it sends, then hangs up.
    fn serve_truncated_once() -> String {
        serve_once(|mut stream| {
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\nhello")
                .unwrap();
        })
    }

    #[test]
    fn test_timeout_does_not_cut_off_a_body_that_keeps_flowing() {
        let url = serve_once(|mut stream| {
            let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", HELLO.len());
            stream.write_all(head.as_bytes()).unwrap();
            for byte in HELLO {
                thread::sleep(Duration::from_millis(250));
                stream.write_all(&[*byte]).unwrap();
                stream.flush().unwrap();
            }
        });

        let client = ClientConfig {
            timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        }
        .build();
        let dir = tempdir().unwrap();
        let dest = dir.path().join("a.bin");

        ArtifactDownload::new(url, &dest)
            .client(client)
            .checksum(HELLO_SHA256)
            .execute()
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), HELLO);
    }

    #[test]
    fn test_interrupted_download_leaves_destination_absent_and_retry_succeeds() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("a.bin");

        let result = ArtifactDownload::new(serve_truncated_once(), &dest).execute();
        assert!(result.is_err());
        assert!(!dest.exists());

        let server = MockServer::start();
        serve_hello(&server, "/a.bin");
        ArtifactDownload::new(server.url("/a.bin"), &dest)
            .checksum(HELLO_SHA256)
            .execute()
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), HELLO);
        assert!(!crate::staging::staging_path(&dest).exists());
    }

    #[test]
    fn test_stale_staging_file_is_replaced() {
        let server = MockServer::start();
        serve_hello(&server, "/a.bin");
        let dir = tempdir().unwrap();
        let dest = dir.path().join("a.bin");
        fs::write(crate::staging::staging_path(&dest), "left over from a crash").unwrap();

        ArtifactDownload::new(server.url("/a.bin"), &dest)
            .execute()
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), HELLO);
        assert!(!crate::staging::staging_path(&dest).exists());
    }

    #[test]
    fn test_progress_reports_batch_fraction() {
        let server = MockServer::start();
        serve_hello(&server, "/b.bin");
        let dir = tempdir().unwrap();
        let dest = dir.path().join("b.bin");

        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = updates.clone();
        ArtifactDownload::new(server.url("/b.bin"), &dest)
            .batch(2, 2)
            .progress(move |update| sink.lock().unwrap().push(update.clone()))
            .execute()
            .unwrap();

        let updates = updates.lock().unwrap();
        let last = updates.last().unwrap();
        assert_eq!(last.name, "b.bin");
        assert_eq!(last.downloaded_bytes, HELLO.len() as u64);
        assert_eq!(last.total_bytes, Some(HELLO.len() as u64));
        assert_eq!(last.fraction, Some(1.0));
        assert!(updates.iter().all(|u| u.fraction.unwrap() >= 0.5));
    }

    #[derive(Default)]
    struct RecordingExtractor {
        calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl ArchiveExtractor for RecordingExtractor {
        fn is_archive(&self, path: &Path) -> bool {
            crate::archive::is_archive(path)
        }

        fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((archive.to_path_buf(), dest.to_path_buf()));
            Ok(())
        }
    }

    #[test]
    fn test_archives_are_expanded_into_parent_directory() {
        let server = MockServer::start();
        serve_hello(&server, "/bundle.tar.gz");
        serve_hello(&server, "/model.bin");
        let dir = tempdir().unwrap();
        let extractor = Arc::new(RecordingExtractor::default());

        let archive = dir.path().join("bundle.tar.gz");
        ArtifactDownload::new(server.url("/bundle.tar.gz"), &archive)
            .archives(extractor.clone())
            .execute()
            .unwrap();

        ArtifactDownload::new(server.url("/model.bin"), dir.path().join("model.bin"))
            .archives(extractor.clone())
            .execute()
            .unwrap();

        let calls = extractor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (archive, dir.path().to_path_buf()));
    }

    #[test]
    fn test_extraction_can_be_disabled() {
        let server = MockServer::start();
        serve_hello(&server, "/bundle.zip");
        let dir = tempdir().unwrap();
        let extractor = Arc::new(RecordingExtractor::default());

        ArtifactDownload::new(server.url("/bundle.zip"), dir.path().join("bundle.zip"))
            .archives(extractor.clone())
            .extract(false)
            .execute()
            .unwrap();

        assert!(extractor.calls.lock().unwrap().is_empty());
    }

    #[derive(Default)]
    struct FakeRegistry {
        resolved: Mutex<Vec<String>>,
        extracted: Mutex<Vec<PathBuf>>,
        fetched: Mutex<Vec<(String, PathBuf, ProgressUpdate)>>,
        fail: bool,
    }

    impl RegistryBackend for FakeRegistry {
        fn resolve_image(&self, reference: &str) -> Result<OciImage> {
            if self.fail {
                return Err(DownloadError::HttpError {
                    status: 404,
                    url: "https://registry.example/v2".into(),
                });
            }
            self.resolved.lock().unwrap().push(reference.to_string());
            Ok(OciImage {
                reference: OciReference::parse(reference),
                manifest: OciManifest {
                    media_type: None,
                    config: None,
                    layers: Vec::new(),
                },
            })
        }

        fn extract_image(&self, _image: &OciImage, dest: &Path) -> Result<()> {
            self.extracted.lock().unwrap().push(dest.to_path_buf());
            Ok(())
        }

        fn fetch_alias_model(
            &self,
            reference: &str,
            dest: &Path,
            progress: ProgressFactory<'_>,
        ) -> Result<()> {
            let mut reporter = progress("model", Some(4));
            reporter.observe(b"data");
            self.fetched.lock().unwrap().push((
                reference.to_string(),
                dest.to_path_buf(),
                reporter.snapshot(),
            ));
            Ok(())
        }
    }

    #[test]
    fn test_registry_image_is_extracted_next_to_output() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(FakeRegistry::default());

        ArtifactDownload::new("oci://ubuntu:22.04", dir.path().join("ubuntu"))
            .registry(registry.clone())
            .execute()
            .unwrap();

        assert_eq!(*registry.resolved.lock().unwrap(), vec!["ubuntu:22.04"]);
        assert_eq!(
            *registry.extracted.lock().unwrap(),
            vec![dir.path().to_path_buf()]
        );
    }

    #[test]
    fn test_registry_alias_gets_batch_bound_progress() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("gemma");
        let registry = Arc::new(FakeRegistry::default());

        ArtifactDownload::new("ollama://gemma:2b", &dest)
            .registry(registry.clone())
            .batch(3, 4)
            .execute()
            .unwrap();

        let fetched = registry.fetched.lock().unwrap();
        let (reference, path, update) = &fetched[0];
        assert_eq!(reference, "gemma:2b");
        assert_eq!(path, &dest);
        assert_eq!(update.file_index, 3);
        assert_eq!(update.file_count, 4);
        assert_eq!(update.fraction, Some(0.75));
    }

    #[test]
    fn test_registry_errors_carry_context() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(FakeRegistry {
            fail: true,
            ..Default::default()
        });

        let err = ArtifactDownload::new("oci://ubuntu", dir.path().join("ubuntu"))
            .registry(registry)
            .execute()
            .unwrap_err();

        assert!(err.to_string().starts_with("failed to get image ubuntu"));
        assert!(matches!(
            err.root(),
            DownloadError::HttpError { status: 404, .. }
        ));
    }

    #[test]
    fn test_local_file_requires_trusted_root() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.bin");
        fs::write(&source, HELLO).unwrap();
        let identifier = format!("file://{}", source.display());

        let result = ArtifactDownload::new(&identifier, dir.path().join("copy.bin")).execute();
        assert!(matches!(
            result,
            Err(DownloadError::LocalFileNotAllowed { .. })
        ));

        let copy = dir.path().join("copy.bin");
        ArtifactDownload::new(&identifier, &copy)
            .trusted_root(dir.path())
            .checksum(HELLO_SHA256)
            .execute()
            .unwrap();
        assert_eq!(fs::read(&copy).unwrap(), HELLO);
    }

    #[test]
    fn test_local_file_outside_root_is_rejected() {
        let root = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let secret = outside.path().join("secret.bin");
        fs::write(&secret, "secret").unwrap();

        let dest = root.path().join("copy.bin");
        let result = ArtifactDownload::new(format!("file://{}", secret.display()), &dest)
            .trusted_root(root.path())
            .execute();

        assert!(matches!(result, Err(DownloadError::Path(_))));
        assert!(!dest.exists());
    }

    #[test]
    fn test_unsafe_hub_repository_is_not_downloaded() {
        let server = MockServer::start();
        let scan = server.mock(|when, then| {
            when.method(GET).path("/api/models/OrgX/RepoY/scan");
            then.status(200).json_body(json!({
                "repositoryId": "OrgX/RepoY",
                "hasUnsafeFile": true,
                "clamAVInfectedFiles": ["model.bin"]
            }));
        });
        let dir = tempdir().unwrap();
        let dest = dir.path().join("model.bin");

        let result = ArtifactDownload::new("hf://OrgX/RepoY/model.bin", &dest)
            .scan(true)
            .scanner(HubScanner::new(HttpClient::default()).api(server.base_url()))
            .execute();

        match result {
            Err(DownloadError::UnsafeFiles { result }) => {
                assert_eq!(result.clamav_infected_files, vec!["model.bin"]);
            }
            other => panic!("Expected UnsafeFiles, got {:?}", other),
        }
        scan.assert_hits(1);
        assert!(!dest.exists());
    }

    #[test]
    fn test_scan_is_skipped_for_non_hub_urls() {
        let server = MockServer::start();
        let scan = server.mock(|when, then| {
            when.method(GET).path_contains("/scan");
            then.status(500);
        });
        let file = serve_hello(&server, "/a.bin");
        let dir = tempdir().unwrap();

        ArtifactDownload::new(server.url("/a.bin"), dir.path().join("a.bin"))
            .scan(true)
            .scanner(HubScanner::new(HttpClient::default()).api(server.base_url()))
            .execute()
            .unwrap();

        scan.assert_hits(0);
        file.assert_hits(1);
    }

    #[test]
    fn test_unknown_checksum_algorithm_is_rejected_up_front() {
        let server = MockServer::start();
        let mock = serve_hello(&server, "/a.bin");
        let dir = tempdir().unwrap();

        let result = ArtifactDownload::new(server.url("/a.bin"), dir.path().join("a.bin"))
            .checksum("md5:abc")
            .execute();

        assert!(matches!(result, Err(DownloadError::Hash(_))));
        mock.assert_hits(0);
    }
}
