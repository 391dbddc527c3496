use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use artifex_config::config::Config;
use artifex_dl::{
    download::ArtifactDownload,
    http_client::HttpClient,
    oci::OciRegistry,
    registry::RegistryBackend,
    scan::HubScanner,
    uri::{looks_like_url, ArtifactUri},
    utils::resolve_output_path,
};
use artifex_utils::fs::ensure_dir_exists;
use nu_ansi_term::Color::{Green, Red};
use tracing::{error, info, warn};

use crate::{
    error::{CliError, CliResult},
    progress::{create_download_job, progress_callback},
    utils::Colored,
};

pub struct DownloadContext {
    pub client: HttpClient,
    pub config: Config,
    pub output: Option<String>,
    pub checksum: Option<String>,
    pub extract: bool,
    pub scan: bool,
    pub trusted_root: Option<PathBuf>,
}

impl DownloadContext {
    fn registry(&self) -> Arc<dyn RegistryBackend> {
        let ollama_api = format!(
            "{}/v2",
            self.config.ollama_registry().trim_end_matches('/')
        );
        Arc::new(OciRegistry::new(self.client.clone()).ollama_api(ollama_api))
    }

    /// Where `uri` lands. Batches always treat an explicit output as a directory.
    fn output_path(&self, uri: &ArtifactUri, batch: bool) -> CliResult<PathBuf> {
        match &self.output {
            Some(output) if batch => {
                ensure_dir_exists(output)?;
                Ok(resolve_output_path(Some(Path::new(output).join("").as_path()), uri)?)
            }
            Some(output) => Ok(resolve_output_path(Some(Path::new(output)), uri)?),
            None => {
                let dir = self.config.get_download_dir()?;
                ensure_dir_exists(&dir)?;
                Ok(resolve_output_path(Some(dir.as_path()), uri)?)
            }
        }
    }
}

/// Downloads every identifier in turn. Failures are logged and counted; the batch keeps
/// going and reports [`CliError::BatchFailed`] at the end.
pub fn download(ctx: &DownloadContext, identifiers: &[String]) -> CliResult<Vec<PathBuf>> {
    if ctx.checksum.is_some() && identifiers.len() > 1 {
        return Err(CliError::ChecksumWithBatch);
    }

    let algorithm = ctx.config.get_checksum_algorithm()?;
    let registry = ctx.registry();
    let scanner = HubScanner::new(ctx.client.clone()).api(ctx.config.hub_api());
    let total = identifiers.len();

    let mut downloaded = Vec::with_capacity(total);
    let mut failed = 0;

    for (idx, identifier) in identifiers.iter().enumerate() {
        let uri = ArtifactUri::parse(identifier);
        if !looks_like_url(identifier.trim()) && !matches!(uri, ArtifactUri::LocalFile(_)) {
            warn!("{} has no recognised scheme, fetching it as a URL", identifier);
        }
        let pb = create_download_job(identifier);

        let result = ctx.output_path(&uri, total > 1).and_then(|output| {
            let mut job = ArtifactDownload::new(identifier.as_str(), output)
                .algorithm(algorithm)
                .batch(idx + 1, total)
                .extract(ctx.extract)
                .scan(ctx.scan)
                .client(ctx.client.clone())
                .registry(registry.clone())
                .scanner(scanner.clone())
                .on_progress(Some(progress_callback(&pb)));

            if let Some(checksum) = &ctx.checksum {
                job = job.checksum(checksum.as_str());
            }
            if let Some(root) = &ctx.trusted_root {
                job = job.trusted_root(root.clone());
            }

            Ok(job.execute()?)
        });
        pb.finish_and_clear();

        match result {
            Ok(path) => {
                info!("{} {}", Colored(Green, "Downloaded"), path.display());
                downloaded.push(path);
            }
            Err(err) => {
                error!("{} {}: {}", Colored(Red, "Failed"), identifier, err);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(CliError::BatchFailed { failed, total });
    }

    Ok(downloaded)
}
