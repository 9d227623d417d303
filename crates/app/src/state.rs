use std::{fs, path::Path, path::PathBuf};

use common::access::AccessController;
use common::actor::ActorId;
use common::context::RequestContext;
use common::merge::MergerConfig;
use common::prelude::SecretKey;
use common::store::{MemoryDocumentStore, MemorySnapshot};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "carelock";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "key.pem";
pub const STORE_FILE_NAME: &str = "store.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Data owner this workspace acts as
    pub actor_id: String,
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily rolling log files, none to log to stderr only
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub merger: MergerConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl AppConfig {
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            log_level: default_log_level(),
            log_dir: None,
            merger: MergerConfig::default(),
        }
    }

    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        self.log_level
            .parse()
            .map_err(|_| StateError::InvalidLogLevel(self.log_level.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the carelock directory (~/.carelock)
    pub carelock_dir: PathBuf,
    /// Path to the actor's private key PEM file
    pub key_path: PathBuf,
    /// Path to the document store snapshot
    pub store_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the carelock directory path (custom or default ~/.carelock)
    pub fn carelock_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new carelock directory with a fresh key and an empty store
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let carelock_dir = Self::carelock_dir(custom_path)?;

        if carelock_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&carelock_dir)?;

        let key = SecretKey::generate();
        let key_path = carelock_dir.join(KEY_FILE_NAME);
        fs::write(&key_path, key.to_pem())?;

        let config_path = carelock_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        let state = Self {
            store_path: carelock_dir.join(STORE_FILE_NAME),
            carelock_dir,
            key_path,
            config_path,
            config,
        };
        state.persist_store(&MemoryDocumentStore::new())?;
        Ok(state)
    }

    /// Load existing state from the carelock directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let carelock_dir = Self::carelock_dir(custom_path)?;

        if !carelock_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let key_path = carelock_dir.join(KEY_FILE_NAME);
        let store_path = carelock_dir.join(STORE_FILE_NAME);
        let config_path = carelock_dir.join(CONFIG_FILE_NAME);

        for (path, name) in [
            (&key_path, KEY_FILE_NAME),
            (&store_path, STORE_FILE_NAME),
            (&config_path, CONFIG_FILE_NAME),
        ] {
            if !path.exists() {
                return Err(StateError::MissingFile(name.to_string()));
            }
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            carelock_dir,
            key_path,
            store_path,
            config_path,
            config,
        })
    }

    pub fn actor_id(&self) -> ActorId {
        ActorId::new(self.config.actor_id.clone())
    }

    pub fn context(&self) -> RequestContext {
        RequestContext::new(self.actor_id())
    }

    /// Load the secret key from the key file
    pub fn load_key(&self) -> Result<SecretKey, StateError> {
        read_key(&self.key_path)
    }

    /// Replace the key file, keeping the previous key next to it
    pub fn replace_key(&self, key: &SecretKey) -> Result<PathBuf, StateError> {
        let previous = self.load_key()?;
        let backup = self.carelock_dir.join(format!(
            "key.{}.pem",
            previous.public().fingerprint().as_str()
        ));
        fs::rename(&self.key_path, &backup)?;
        fs::write(&self.key_path, key.to_pem())?;
        Ok(backup)
    }

    pub fn open_store(&self) -> Result<MemoryDocumentStore, StateError> {
        let json = fs::read_to_string(&self.store_path)?;
        let snapshot: MemorySnapshot = serde_json::from_str(&json)?;
        Ok(MemoryDocumentStore::restore(snapshot))
    }

    pub fn persist_store(&self, store: &MemoryDocumentStore) -> Result<(), StateError> {
        let snapshot = store
            .snapshot()
            .map_err(|e| StateError::Store(e.to_string()))?;
        let staging = self.store_path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_string_pretty(&snapshot)?)?;
        fs::rename(&staging, &self.store_path)?;
        tracing::debug!("persisted {} documents", snapshot.len());
        Ok(())
    }

    pub fn controller(&self) -> Result<AccessController<MemoryDocumentStore>, StateError> {
        Ok(AccessController::new(self.open_store()?, self.config.merger))
    }
}

/// Read a PEM private key, e.g. one handed over by another actor
pub fn read_key(path: &Path) -> Result<SecretKey, StateError> {
    let pem = fs::read_to_string(path)?;
    SecretKey::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("carelock directory not initialized. Run 'carelock init' first")]
    NotInitialized,

    #[error("carelock directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::store::DocumentStore;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("carelock");
        (temp, path)
    }

    #[test]
    fn test_init_then_load() {
        let (_temp, path) = workspace();
        let created = AppState::init(Some(path.clone()), AppConfig::new("hcp-1")).unwrap();
        let loaded = AppState::load(Some(path)).unwrap();

        assert_eq!(loaded.actor_id(), created.actor_id());
        assert_eq!(loaded.config.merger, MergerConfig::default());
        assert_eq!(loaded.config.log_level().unwrap(), tracing::Level::WARN);
        assert_eq!(
            loaded.load_key().unwrap().public().to_hex(),
            created.load_key().unwrap().public().to_hex()
        );
        assert!(loaded.open_store().unwrap().snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_init_and_load_guards() {
        let (_temp, path) = workspace();
        assert!(matches!(
            AppState::load(Some(path.clone())),
            Err(StateError::NotInitialized)
        ));
        AppState::init(Some(path.clone()), AppConfig::new("hcp-1")).unwrap();
        assert!(matches!(
            AppState::init(Some(path.clone()), AppConfig::new("hcp-1")),
            Err(StateError::AlreadyInitialized)
        ));

        fs::remove_file(path.join(STORE_FILE_NAME)).unwrap();
        assert!(matches!(
            AppState::load(Some(path)),
            Err(StateError::MissingFile(_))
        ));
    }

    #[tokio::test]
    async fn test_store_survives_reopen() {
        let (_temp, path) = workspace();
        let state = AppState::init(Some(path), AppConfig::new("hcp-1")).unwrap();

        let store = state.open_store().unwrap();
        store
            .save(common::store::RawDocument {
                id: "doc".to_string(),
                rev: None,
                conflicts: Vec::new(),
                body: serde_json::json!({"n": 1}),
            })
            .await
            .unwrap();
        state.persist_store(&store).unwrap();

        let reopened = state.open_store().unwrap();
        assert_eq!(
            reopened.load("doc").await.unwrap().body,
            serde_json::json!({"n": 1})
        );
    }

    #[test]
    fn test_replace_key_keeps_previous() {
        let (_temp, path) = workspace();
        let state = AppState::init(Some(path), AppConfig::new("hcp-1")).unwrap();
        let previous = state.load_key().unwrap();

        let next = SecretKey::generate();
        let backup = state.replace_key(&next).unwrap();
        assert_eq!(
            read_key(&backup).unwrap().public().to_hex(),
            previous.public().to_hex()
        );
        assert_eq!(
            state.load_key().unwrap().public().to_hex(),
            next.public().to_hex()
        );
    }
}
