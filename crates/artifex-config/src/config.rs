use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    sync::{LazyLock, RwLock},
    time::Duration,
};

use artifex_utils::{
    hash::ChecksumAlgorithm,
    path::{resolve_path, xdg_config_home},
    time::parse_duration,
};
use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    annotations::{annotated_document, append_commented_fields},
    error::{ConfigError, Result},
};

pub const DEFAULT_HUB_API: &str = "https://huggingface.co";
pub const DEFAULT_OLLAMA_REGISTRY: &str = "https://registry.ollama.ai";
pub const DEFAULT_TIMEOUT: &str = "5m";

/// Commented-out examples written by `defconfig` for keys without a default.
const UNSET_KEY_EXAMPLES: &[(&str, &str)] = &[
    ("download_dir", "download_dir = \"~/models\""),
    ("trusted_root", "trusted_root = \"~/models\""),
    ("user_agent", "user_agent = \"my-tool/1.0\""),
    ("proxy", "proxy = \"http://127.0.0.1:3128\""),
    ("headers", "[headers]\nAuthorization = \"Bearer <token>\""),
];

/// artifex configuration
///
/// Generated with `artifex defconfig`. Every key is optional.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// Directory downloads are written to when no output path is given.
    /// Default: "." (the current directory)
    pub download_dir: Option<String>,

    /// Directory `file://` sources must live in. Local files are refused when unset.
    pub trusted_root: Option<String>,

    /// Algorithm assumed for checksums given without an `algo:` prefix.
    /// One of "sha256" or "blake3". Default: "sha256"
    pub checksum_algorithm: Option<String>,

    /// Unpack tar and zip archives after download.
    /// Default: true
    pub extract_archives: Option<bool>,

    /// Ask the model hub to scan a repository before downloading from it.
    /// Default: false
    pub scan_before_download: Option<bool>,

    /// Base URL of the model hub API used for scans.
    /// Default: "https://huggingface.co"
    pub hub_api: Option<String>,

    /// Registry serving `ollama://` models.
    /// Default: "https://registry.ollama.ai"
    pub ollama_registry: Option<String>,

    /// User agent sent with every request.
    /// Default: "artifex/<version>"
    pub user_agent: Option<String>,

    /// Proxy URL for all requests, e.g. "http://127.0.0.1:3128".
    pub proxy: Option<String>,

    /// Time limit for connecting and for receiving response headers, e.g. "30s", "5m".
    /// Reading the body is never timed. Default: "5m"
    pub timeout: Option<String>,

    /// Extra headers sent with every request.
    pub headers: Option<BTreeMap<String, String>>,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("ARTIFEX_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("artifex").join("config.toml"),
    })
});

/// Returns the active config file location.
pub fn config_path() -> PathBuf {
    CONFIG_PATH
        .read()
        .map(|path| path.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
}

/// Points the global config at `path`. Has no effect on an already loaded config.
pub fn set_config_path(path: PathBuf) {
    match CONFIG_PATH.write() {
        Ok(mut guard) => *guard = path,
        Err(poisoned) => *poisoned.into_inner() = path,
    }
}

/// Loads the config file into the global config.
pub fn init() -> Result<()> {
    let config = Config::new()?;
    match CONFIG.write() {
        Ok(mut guard) => *guard = Some(config),
        Err(poisoned) => *poisoned.into_inner() = Some(config),
    }
    Ok(())
}

/// Returns the global config, falling back to defaults if [`init`] was never called.
pub fn get_config() -> Config {
    let loaded = match CONFIG.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    loaded.unwrap_or_else(Config::default_config)
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            download_dir: Some(".".to_string()),
            trusted_root: None,
            checksum_algorithm: Some(ChecksumAlgorithm::default().name().to_string()),
            extract_archives: Some(true),
            scan_before_download: Some(false),
            hub_api: Some(DEFAULT_HUB_API.to_string()),
            ollama_registry: Some(DEFAULT_OLLAMA_REGISTRY.to_string()),
            user_agent: None,
            proxy: None,
            timeout: Some(DEFAULT_TIMEOUT.to_string()),
            headers: None,
        }
    }

    /// Loads the configuration file, using defaults when it does not exist.
    pub fn new() -> Result<Self> {
        let config_path = config_path();

        let mut config = match fs::read_to_string(&config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "No config at {}, using defaults",
                    config_path.display()
                );
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    /// Fills unset keys with their defaults and validates the rest.
    pub fn resolve(&mut self) -> Result<()> {
        for (name, value) in [
            ("download_dir", &self.download_dir),
            ("trusted_root", &self.trusted_root),
            ("hub_api", &self.hub_api),
            ("ollama_registry", &self.ollama_registry),
            ("user_agent", &self.user_agent),
            ("proxy", &self.proxy),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ConfigError::EmptyValue(name));
            }
        }

        let algorithm = self
            .checksum_algorithm
            .get_or_insert_with(|| ChecksumAlgorithm::default().name().to_string());
        let algorithm: ChecksumAlgorithm = algorithm.parse()?;
        self.checksum_algorithm = Some(algorithm.name().to_string());

        let timeout = self
            .timeout
            .get_or_insert_with(|| DEFAULT_TIMEOUT.to_string());
        if parse_duration(timeout).is_none() {
            return Err(ConfigError::InvalidTimeout(timeout.clone()));
        }

        if let Some(headers) = &self.headers {
            if let Some(name) = headers
                .keys()
                .find(|k| k.is_empty() || k.chars().any(char::is_whitespace))
            {
                return Err(ConfigError::InvalidHeader(name.clone()));
            }
        }

        self.extract_archives.get_or_insert(true);
        self.scan_before_download.get_or_insert(false);
        self.hub_api.get_or_insert_with(|| DEFAULT_HUB_API.to_string());
        self.ollama_registry
            .get_or_insert_with(|| DEFAULT_OLLAMA_REGISTRY.to_string());

        Ok(())
    }

    pub fn get_download_dir(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("ARTIFEX_DOWNLOAD_DIR") {
            return Ok(resolve_path(&env_path)?);
        }
        Ok(resolve_path(self.download_dir.as_deref().unwrap_or("."))?)
    }

    pub fn get_trusted_root(&self) -> Result<Option<PathBuf>> {
        if let Ok(env_path) = std::env::var("ARTIFEX_TRUSTED_ROOT") {
            return Ok(Some(resolve_path(&env_path)?));
        }
        self.trusted_root
            .as_deref()
            .map(|root| resolve_path(root).map_err(ConfigError::from))
            .transpose()
    }

    pub fn get_checksum_algorithm(&self) -> Result<ChecksumAlgorithm> {
        match &self.checksum_algorithm {
            Some(name) => Ok(name.parse()?),
            None => Ok(ChecksumAlgorithm::default()),
        }
    }

    pub fn get_timeout(&self) -> Result<Duration> {
        let value = self.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT);
        parse_duration(value).ok_or_else(|| ConfigError::InvalidTimeout(value.to_string()))
    }

    pub fn extract_archives(&self) -> bool {
        self.extract_archives.unwrap_or(true)
    }

    pub fn scan_before_download(&self) -> bool {
        self.scan_before_download.unwrap_or(false)
    }

    pub fn hub_api(&self) -> &str {
        self.hub_api.as_deref().unwrap_or(DEFAULT_HUB_API)
    }

    pub fn ollama_registry(&self) -> &str {
        self.ollama_registry
            .as_deref()
            .unwrap_or(DEFAULT_OLLAMA_REGISTRY)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = config_path();
        let serialized = toml::to_string_pretty(self)?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&config_path, serialized)?;
        info!("Configuration saved to {}", config_path.display());
        Ok(())
    }

    /// Renders the config as TOML with each key preceded by its documentation.
    ///
    /// Unset keys follow as commented-out examples.
    pub fn to_annotated_string(&self) -> Result<String> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = annotated_document::<Config>(&toml_string)?;
        append_commented_fields::<Config>(&mut doc, UNSET_KEY_EXAMPLES);
        Ok(doc.to_string())
    }
}

/// Writes a documented default config to the config path. Refuses to overwrite.
pub fn generate_default_config() -> Result<PathBuf> {
    let config_path = config_path();

    if config_path.exists() {
        return Err(ConfigError::ConfigAlreadyExists);
    }

    let annotated = Config::default_config().to_annotated_string()?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&config_path, annotated)?;
    info!(
        "Default configuration file generated with documentation at: {}",
        config_path.display()
    );
    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::tempdir;

    use super::*;
    use crate::{error::ConfigError, test_utils::with_env};

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.checksum_algorithm.as_deref(), Some("sha256"));
        assert_eq!(config.extract_archives, Some(true));
        assert_eq!(config.scan_before_download, Some(false));
        assert_eq!(config.hub_api(), DEFAULT_HUB_API);
        assert_eq!(config.ollama_registry(), DEFAULT_OLLAMA_REGISTRY);
        assert_eq!(config.get_timeout().unwrap(), Duration::from_secs(300));
        assert!(config.trusted_root.is_none());
    }

    #[test]
    fn test_config_resolve_sets_defaults() {
        let mut config = Config::default();
        config.resolve().unwrap();

        assert_eq!(config.checksum_algorithm.as_deref(), Some("sha256"));
        assert_eq!(config.timeout.as_deref(), Some(DEFAULT_TIMEOUT));
        assert_eq!(config.extract_archives, Some(true));
        assert_eq!(config.scan_before_download, Some(false));
        assert_eq!(config.hub_api.as_deref(), Some(DEFAULT_HUB_API));
        assert_eq!(
            config.ollama_registry.as_deref(),
            Some(DEFAULT_OLLAMA_REGISTRY)
        );
    }

    #[test]
    fn test_config_resolve_normalizes_algorithm() {
        let mut config = Config {
            checksum_algorithm: Some("BLAKE3".into()),
            ..Default::default()
        };
        config.resolve().unwrap();
        assert_eq!(config.checksum_algorithm.as_deref(), Some("blake3"));
        assert_eq!(
            config.get_checksum_algorithm().unwrap(),
            ChecksumAlgorithm::Blake3
        );
    }

    #[test]
    fn test_config_resolve_unknown_algorithm() {
        let mut config = Config {
            checksum_algorithm: Some("md5".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidChecksumAlgorithm(name)) if name == "md5"
        ));
    }

    #[test]
    fn test_config_resolve_bad_timeout() {
        let mut config = Config {
            timeout: Some("soon".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_config_resolve_empty_path() {
        let mut config = Config {
            trusted_root: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::EmptyValue("trusted_root"))
        ));
    }

    #[test]
    fn test_config_resolve_bad_header() {
        let mut config = Config {
            headers: Some(BTreeMap::from([("X Token".into(), "abc".into())])),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_config_parses_partial_file() {
        let mut config: Config = toml::from_str(
            r#"
            trusted_root = "/srv/models"
            timeout = "30s"

            [headers]
            Authorization = "Bearer abc"
            "#,
        )
        .unwrap();
        config.resolve().unwrap();

        assert_eq!(config.get_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(
            config.headers.as_ref().and_then(|h| h.get("Authorization")),
            Some(&"Bearer abc".to_string())
        );
        assert!(config.extract_archives());
    }

    #[test]
    #[serial]
    fn test_trusted_root_expands_variables() {
        with_env(&[("ARTIFEX_TEST_ROOT", "/srv/models")], || {
            let config = Config {
                trusted_root: Some("$ARTIFEX_TEST_ROOT/gallery".into()),
                ..Default::default()
            };
            assert_eq!(
                config.get_trusted_root().unwrap(),
                Some(PathBuf::from("/srv/models/gallery"))
            );
        });
    }

    #[test]
    #[serial]
    fn test_download_dir_env_override() {
        with_env(&[("ARTIFEX_DOWNLOAD_DIR", "/custom/downloads")], || {
            let config = Config::default_config();
            assert_eq!(
                config.get_download_dir().unwrap(),
                PathBuf::from("/custom/downloads")
            );
        });
    }

    #[test]
    #[serial]
    fn test_load_save_and_defconfig() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("artifex").join("config.toml");
        let previous = config_path();
        set_config_path(path.clone());

        let missing = Config::new().unwrap();
        assert_eq!(missing, {
            let mut defaults = Config::default_config();
            defaults.resolve().unwrap();
            defaults
        });

        let written = generate_default_config().unwrap();
        assert_eq!(written, path);
        assert!(fs::read_to_string(&path).unwrap().contains("# "));
        assert!(matches!(
            generate_default_config(),
            Err(ConfigError::ConfigAlreadyExists)
        ));

        let mut config = Config::new().unwrap();
        config.scan_before_download = Some(true);
        config.save().unwrap();

        init().unwrap();
        assert!(get_config().scan_before_download());

        set_config_path(previous);
    }

    #[test]
    fn test_default_annotated_config_covers_every_key() {
        let rendered = Config::default_config().to_annotated_string().unwrap();
        let lines: Vec<&str> = rendered.lines().collect();

        for &name in Config::FIELD_NAMES {
            let line = lines
                .iter()
                .position(|&l| {
                    let entry = l.strip_prefix("# ").unwrap_or(l);
                    entry.starts_with(&format!("{name} =")) || entry == format!("[{name}]")
                })
                .unwrap_or_else(|| panic!("missing key {name}"));
            assert!(lines[line - 1].starts_with('#'), "{name} is not documented");
        }

        let mut reparsed: Config = toml::from_str(&rendered).unwrap();
        reparsed.resolve().unwrap();
        let mut defaults = Config::default_config();
        defaults.resolve().unwrap();
        assert_eq!(reparsed, defaults);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized, config);
    }
}
