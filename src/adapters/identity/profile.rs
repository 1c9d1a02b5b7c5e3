//! File-backed identity profile.
//!
//! Credential acquisition happens outside this process; whatever signed the
//! user in writes `profile.json` next to the database. Absence of the file
//! means the anonymous local profile.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::DomainError;
use crate::ports::Identity;

const PROFILE_FILE: &str = "profile.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Profile {
    user_id: String,
    bearer_token: String,
}

pub struct FileProfile {
    path: PathBuf,
    current: RwLock<Option<Profile>>,
}

impl FileProfile {
    /// Read the profile file if present. A missing file is the anonymous
    /// profile, not an error.
    pub fn load(base_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = base_dir.as_ref().join(PROFILE_FILE);
        let current: Option<Profile> = match std::fs::read_to_string(&path) {
            Ok(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| DomainError::Storage(format!("parse {PROFILE_FILE}: {e}")))?,
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(DomainError::Storage(e.to_string())),
        };
        if let Some(profile) = &current {
            info!(user_id = %profile.user_id, "signed-in profile loaded");
        }
        Ok(Self {
            path,
            current: RwLock::new(current),
        })
    }
}

#[async_trait::async_trait]
impl Identity for FileProfile {
    async fn current_user_id(&self) -> Option<String> {
        self.current.read().await.as_ref().map(|p| p.user_id.clone())
    }

    async fn bearer_token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|p| p.bearer_token.clone())
    }

    async fn sign_out(&self) -> Result<(), DomainError> {
        let mut current = self.current.write().await;
        if current.take().is_some() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(DomainError::Storage(e.to_string())),
            }
            info!("profile removed, back to anonymous");
        }
        Ok(())
    }
}
