use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{LazyLock, RwLock},
    time::Duration,
};

use documented::{Documented, DocumentedFields};
use metspack_utils::{bytes::parse_bytes, fs::ensure_parent_dir, path::xdg_config_home};
use serde::{Deserialize, Serialize};
use toml_edit::DocumentMut;
use tracing::info;

use crate::{
    annotations::annotate_toml_table,
    error::{ConfigError, Result},
    packager::PackagerConfig,
};

/// metspack configuration
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// Name of the archive, recorded as the custodian agent in every manifest header.
    pub site_name: String,

    /// Packager used when none is requested explicitly.
    pub default_packager: String,

    /// Packager definitions keyed by name.
    pub packager: HashMap<String, PackagerConfig>,

    /// Ingest crosswalk to use for a METS metadata type, keyed by MDTYPE label.
    /// Types not listed here use the crosswalk named after the label itself.
    pub crosswalk_aliases: Option<HashMap<String, String>>,

    /// Base URL for content links in bare (manifest-only) packages.
    /// Default: none, file locations then carry archive-relative names.
    pub retrieval_base_url: Option<String>,

    /// Timeout in seconds for fetching remote content referenced by bare manifests.
    /// Default: 60
    pub fetch_timeout: Option<u64>,

    /// Largest remote file a bare manifest may pull in.
    /// Default: "1GiB"
    pub fetch_limit: Option<String>,

    /// User agent sent when fetching remote content.
    /// Default: "metspack"
    pub user_agent: Option<String>,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("METSPACK_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => xdg_config_home().join("metspack").join("config.toml"),
    })
});

pub fn init() -> Result<()> {
    let config = Config::new()?;
    *CONFIG.write().unwrap() = Some(config);
    Ok(())
}

pub fn get_config() -> Config {
    if let Some(config) = CONFIG.read().unwrap().as_ref() {
        return config.clone();
    }

    let mut guard = CONFIG.write().unwrap();
    guard.get_or_insert_with(Config::default_config).clone()
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            site_name: "DSpace".to_string(),
            default_packager: "AIP".to_string(),
            packager: HashMap::from([
                ("AIP".to_string(), PackagerConfig::aip()),
                ("SIP".to_string(), PackagerConfig::sip()),
            ]),
            crosswalk_aliases: Some(HashMap::new()),
            retrieval_base_url: None,
            fetch_timeout: Some(60),
            fetch_limit: Some("1GiB".to_string()),
            user_agent: Some("metspack".to_string()),
        }
    }

    /// Loads the configuration file, falling back to defaults when it does not exist.
    pub fn new() -> Result<Self> {
        let config_path = CONFIG_PATH.read().unwrap().to_path_buf();

        let mut config = match fs::read_to_string(&config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default_config(),
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;
        Ok(config)
    }

    pub fn resolve(&mut self) -> Result<()> {
        if !self.packager.contains_key(&self.default_packager) {
            return Err(ConfigError::MissingDefaultPackager(
                self.default_packager.clone(),
            ));
        }

        for (name, packager) in &mut self.packager {
            packager.resolve(name)?;
        }

        self.crosswalk_aliases.get_or_insert_with(HashMap::new);
        self.fetch_timeout.get_or_insert(60);
        self.user_agent.get_or_insert_with(|| "metspack".to_string());

        let limit = self.fetch_limit.get_or_insert_with(|| "1GiB".to_string());
        parse_bytes(limit)?;

        Ok(())
    }

    pub fn default_packager(&self) -> Result<&PackagerConfig> {
        self.packager
            .get(&self.default_packager)
            .ok_or_else(|| ConfigError::MissingDefaultPackager(self.default_packager.clone()))
    }

    pub fn get_packager(&self, name: &str) -> Result<&PackagerConfig> {
        self.packager
            .get(name)
            .ok_or_else(|| ConfigError::MissingPackager(name.to_string()))
    }

    pub fn crosswalk_aliases(&self) -> HashMap<String, String> {
        self.crosswalk_aliases.clone().unwrap_or_default()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout.unwrap_or(60))
    }

    pub fn fetch_limit(&self) -> Result<u64> {
        Ok(parse_bytes(self.fetch_limit.as_deref().unwrap_or("1GiB"))?)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("metspack")
    }

    pub fn save(&self) -> Result<()> {
        let config_path = CONFIG_PATH.read().unwrap().to_path_buf();
        let serialized = toml::to_string_pretty(self)?;
        ensure_parent_dir(&config_path)?;
        fs::write(&config_path, serialized)?;
        info!("Configuration saved to {}", config_path.display());
        Ok(())
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;

        annotate_toml_table::<Config>(doc.as_table_mut(), true)?;

        if let Some(packagers) = doc.get_mut("packager").and_then(|p| p.as_table_mut()) {
            for (_name, item) in packagers.iter_mut() {
                if let Some(table) = item.as_table_mut() {
                    annotate_toml_table::<PackagerConfig>(table, false)?;
                }
            }
        }

        Ok(doc)
    }
}

pub fn generate_default_config() -> Result<PathBuf> {
    let config_path = CONFIG_PATH.read().unwrap().to_path_buf();

    if config_path.exists() {
        return Err(ConfigError::ConfigAlreadyExists);
    }

    let annotated = Config::default_config().to_annotated_document()?;

    ensure_parent_dir(&config_path)?;
    fs::write(&config_path, annotated.to_string())?;

    info!(
        "Default configuration file generated with documentation at: {}",
        config_path.display()
    );
    Ok(config_path)
}
