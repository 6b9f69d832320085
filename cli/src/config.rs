use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use nosh_core::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL};

/// Shortest hand-edited server key accepted from the `api_key` file.
const MIN_API_KEY_LEN: usize = 16;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub ai_endpoint: String,
    pub ai_model: String,
}

/// The signed-in account, persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user: String,
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os("NOSH_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "nosh")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };

        let mut config = Self::from_data_dir(data_dir)?;
        if let Ok(endpoint) = std::env::var("NOSH_AI_ENDPOINT") {
            config.ai_endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("NOSH_AI_MODEL") {
            config.ai_model = model;
        }
        Ok(config)
    }

    pub fn from_data_dir(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("nosh.db"),
            data_dir,
            ai_endpoint: DEFAULT_ENDPOINT.to_string(),
            ai_model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Where `nosh serve` keeps its documents.
    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join("documents.db")
    }

    fn account_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    pub fn load_account(&self) -> Result<Option<Account>> {
        let path = self.account_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let account = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt session file: {}", path.display()))?;
        Ok(Some(account))
    }

    pub fn save_account(&self, account: &Account) -> Result<()> {
        let path = self.account_path();
        std::fs::write(&path, serde_json::to_string_pretty(account)?)
            .context("Failed to write session file")?;
        restrict_permissions(&path)
    }

    /// Returns false when nobody was signed in.
    pub fn clear_account(&self) -> Result<bool> {
        let path = self.account_path();
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).context("Failed to remove session file")?;
        Ok(true)
    }

    /// Load the API key from disk, or generate a new one.
    pub fn load_or_create_api_key(&self) -> Result<String> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if key.chars().count() >= MIN_API_KEY_LEN {
                return Ok(key);
            }
            if !key.is_empty() {
                anyhow::bail!(
                    "API key in {} is shorter than {MIN_API_KEY_LEN} characters. Delete the file to generate a new one",
                    path.display()
                );
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        restrict_permissions(&path)?;
        eprintln!("Generated new API key: {key}");
        eprintln!("Sign in with: nosh login <user> --server <url> --token {key}");
        Ok(key)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_data_dir(dir.path().join("nosh")).unwrap();
        (dir, config)
    }

    #[test]
    fn test_from_data_dir_creates_directory() {
        let (_dir, config) = temp_config();
        assert!(config.data_dir.is_dir());
        assert_eq!(config.db_path, config.data_dir.join("nosh.db"));
        assert_eq!(config.ai_model, DEFAULT_MODEL);
    }

    #[test]
    fn test_account_round_trip() {
        let (_dir, config) = temp_config();
        assert!(config.load_account().unwrap().is_none());

        let account = Account {
            user: "alice".to_string(),
            server: "http://127.0.0.1:8080".to_string(),
            token: Some("abc".to_string()),
        };
        config.save_account(&account).unwrap();
        assert_eq!(config.load_account().unwrap(), Some(account));

        assert!(config.clear_account().unwrap());
        assert!(!config.clear_account().unwrap());
        assert!(config.load_account().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_account_file_is_an_error() {
        let (_dir, config) = temp_config();
        std::fs::write(config.data_dir.join("session.json"), "{not json").unwrap();
        assert!(config.load_account().is_err());
    }

    #[test]
    fn test_api_key_is_stable() {
        let (_dir, config) = temp_config();
        let first = config.load_or_create_api_key().unwrap();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(config.load_or_create_api_key().unwrap(), first);
    }

    #[test]
    fn test_short_api_key_file_is_an_error() {
        let (_dir, config) = temp_config();
        let path = config.data_dir.join("api_key");
        std::fs::write(&path, "abc\n").unwrap();
        let err = config.load_or_create_api_key().unwrap_err();
        assert!(err.to_string().contains("shorter than 16"));

        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(config.load_or_create_api_key().unwrap().len(), 64);

        std::fs::write(&path, "é-hand-picked-key-é").unwrap();
        assert_eq!(
            config.load_or_create_api_key().unwrap(),
            "é-hand-picked-key-é"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_api_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, config) = temp_config();
        config.load_or_create_api_key().unwrap();
        let mode = std::fs::metadata(config.data_dir.join("api_key"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
