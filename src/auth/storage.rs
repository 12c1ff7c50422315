use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Stored OAuth credentials for the single upstream identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as epoch milliseconds.
    pub expires_at: u64,
}

/// JSON-file-backed credential store with an in-memory copy.
pub struct CredentialStore {
    path: PathBuf,
    credentials: RwLock<Option<Credentials>>,
}

impl CredentialStore {
    pub async fn open(path: PathBuf) -> Self {
        let credentials = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).ok(),
            Err(_) => None,
        };

        Self {
            path,
            credentials: RwLock::new(credentials),
        }
    }

    pub async fn get(&self) -> Option<Credentials> {
        self.credentials.read().await.clone()
    }

    pub async fn is_configured(&self) -> bool {
        self.credentials.read().await.is_some()
    }

    pub async fn set(&self, credentials: Credentials) -> Result<(), std::io::Error> {
        {
            let mut guard = self.credentials.write().await;
            *guard = Some(credentials);
        }
        self.save().await
    }

    pub async fn clear(&self) -> Result<(), std::io::Error> {
        {
            let mut guard = self.credentials.write().await;
            *guard = None;
        }
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let guard = self.credentials.read().await;
        let content = serde_json::to_string_pretty(&*guard)?;

        // Write to a temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
