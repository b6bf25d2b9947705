//! JSON-file-backed SessionRepository implementation.
//!
//! The session history lives in one `sessions.json` file holding a list of
//! session records, images and liked images embedded. Saving appends to the
//! list rather than upserting, matching the append-only history semantics
//! of the repository trait.

use async_trait::async_trait;
use restyle_core::error::{RestyleError, Result};
use restyle_core::session::{SessionRepository, SwipeSession};
use std::path::{Path, PathBuf};

pub struct JsonSessionRepository {
    file_path: PathBuf,
}

impl JsonSessionRepository {
    /// Creates a repository storing its history under the given base
    /// directory, which is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|err| {
            RestyleError::io(format!(
                "failed to create session directory {}: {err}",
                base_dir.display()
            ))
        })?;
        Ok(Self {
            file_path: base_dir.join("sessions.json"),
        })
    }

    /// Creates a repository at the default location (`~/.restyle`).
    pub fn default_location() -> Result<Self> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| RestyleError::config("failed to get home directory"))?;
        Self::new(home_dir.join(".restyle"))
    }

    async fn read_history(&self) -> Result<Vec<SwipeSession>> {
        match tokio::fs::read_to_string(&self.file_path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|err| {
                RestyleError::data_access(format!(
                    "failed to parse {}: {err}",
                    self.file_path.display()
                ))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl SessionRepository for JsonSessionRepository {
    async fn append(&self, session: &SwipeSession) -> Result<()> {
        let mut history = self.read_history().await?;
        history.push(session.clone());
        let content = serde_json::to_string_pretty(&history)?;
        tokio::fs::write(&self.file_path, content).await?;
        tracing::debug!(
            "[JsonSessionRepository] Appended session {} ({} stored)",
            session.id,
            history.len()
        );
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<SwipeSession>> {
        self.read_history().await
    }
}
