use std::path::Path;

use crate::{error::Result, oci::OciImage, progress::ProgressReporter};

/// Builds a progress reporter for a file name and an optional total size.
pub type ProgressFactory<'a> = &'a dyn Fn(&str, Option<u64>) -> ProgressReporter;

/// Container registry operations the download engine delegates to.
pub trait RegistryBackend: Send + Sync {
    /// Resolves an image reference such as `ubuntu:22.04` to its manifest.
    fn resolve_image(&self, reference: &str) -> Result<OciImage>;

    /// Unpacks every layer of `image` into `dest`.
    fn extract_image(&self, image: &OciImage, dest: &Path) -> Result<()>;

    /// Fetches the model blob behind a registry alias such as `gemma:2b` into `dest`.
    fn fetch_alias_model(
        &self,
        reference: &str,
        dest: &Path,
        progress: ProgressFactory<'_>,
    ) -> Result<()>;
}
