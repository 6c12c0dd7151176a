//! File system backed secret store
//!
//! Layout under the data root:
//!
//! ```text
//! projects/{project}/secrets/{id}/{id}.json     secret metadata
//! projects/{project}/secrets/{id}/versions.json version manifest
//! projects/{project}/secrets/{id}/{uuid}        version payloads
//! ```

use chrono::Utc;
use cloudone_core::{FileSystem, KeyedLocks};
use prost_types::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::names::{ProjectName, SecretName};
use crate::proto::{secret_version, Secret, SecretPayload, SecretVersion};
use crate::wire::SecretJson;

const MANIFEST_FILE: &str = "versions.json";
const MUTABLE_FIELDS: &[&str] = &["labels"];

/// Secret store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Per-secret version manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub next: u64,
    pub versions: BTreeMap<u64, VersionRecord>,
}

impl Default for VersionManifest {
    fn default() -> Self {
        Self {
            next: 1,
            versions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    /// Payload blob name inside the secret directory
    pub file: String,
    pub number: u64,
    /// Unix seconds
    pub create_time: i64,
}

/// Versioned secret storage on a pluggable file system
pub struct SecretStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    locks: KeyedLocks,
}

impl SecretStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Result<Self, StoreError> {
        let root = root.into();
        fs.create_dir_all(&root).await?;
        Ok(Self {
            root,
            fs,
            locks: KeyedLocks::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn secret_dir(&self, name: &SecretName) -> PathBuf {
        self.root.join(name.to_string())
    }

    fn secret_file(&self, name: &SecretName) -> PathBuf {
        self.secret_dir(name).join(format!("{}.json", name.id()))
    }

    fn manifest_file(&self, name: &SecretName) -> PathBuf {
        self.secret_dir(name).join(MANIFEST_FILE)
    }

    /// Create (or silently replace) a secret
    pub async fn create_secret(
        &self,
        parent: &ProjectName,
        secret_id: &str,
        secret: Secret,
    ) -> Result<Secret, StoreError> {
        let name = parent.secret(secret_id)?;
        let secret = Secret {
            name: name.to_string(),
            create_time: Some(now()),
            ..secret
        };

        let _guard = self.locks.lock(&name.to_string()).await;
        self.fs.create_dir_all(&self.secret_dir(&name)).await?;
        self.write_secret(&name, &secret).await?;
        debug!(secret = %name, "Created secret");
        Ok(secret)
    }

    /// Store a new payload as the next version of an existing secret
    pub async fn add_secret_version(
        &self,
        name: &SecretName,
        payload: SecretPayload,
    ) -> Result<SecretVersion, StoreError> {
        if let Some(expected) = payload.data_crc32c {
            let actual = i64::from(crc32c::crc32c(&payload.data));
            if actual != expected {
                return Err(StoreError::InvalidArgument(format!(
                    "payload checksum mismatch: dataCrc32c is {expected}, payload has {actual}"
                )));
            }
        }

        let _guard = self.locks.lock(&name.to_string()).await;
        if !self.fs.exists(&self.secret_file(name)).await? {
            return Err(StoreError::NotFound(name.to_string()));
        }

        let mut manifest = self.read_manifest(name).await?;
        let record = VersionRecord {
            file: Uuid::new_v4().to_string(),
            number: manifest.next,
            create_time: Utc::now().timestamp(),
        };

        self.fs
            .write(&self.secret_dir(name).join(&record.file), &payload.data)
            .await?;
        manifest.versions.insert(record.number, record.clone());
        manifest.next += 1;
        self.write_json(&self.manifest_file(name), &manifest).await?;

        debug!(secret = %name, version = record.number, "Added secret version");
        Ok(SecretVersion {
            name: name.version(record.number),
            create_time: Some(Timestamp {
                seconds: record.create_time,
                nanos: 0,
            }),
            state: secret_version::State::Enabled as i32,
            ..Default::default()
        })
    }

    pub async fn get_secret(&self, name: &SecretName) -> Result<Secret, StoreError> {
        let data = match self.fs.read(&self.secret_file(name)).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let json: SecretJson = serde_json::from_slice(&data)
            .map_err(|e| StoreError::Serialization(format!("{name}: {e}")))?;
        let mut secret =
            Secret::try_from(json).map_err(|e| StoreError::Serialization(format!("{name}: {e}")))?;
        secret.name = name.to_string();
        Ok(secret)
    }

    /// All secrets of a project, ordered by secret id
    pub async fn list_secrets(&self, parent: &ProjectName) -> Result<Vec<Secret>, StoreError> {
        let dir = self.root.join(parent.to_string()).join("secrets");
        let entries = match self.fs.read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids: Vec<String> = entries
            .into_iter()
            .filter(|entry| entry.is_dir)
            .map(|entry| entry.name)
            .collect();
        ids.sort();

        let mut secrets = Vec::with_capacity(ids.len());
        for id in ids {
            let name = match parent.secret(&id) {
                Ok(name) => name,
                Err(e) => {
                    warn!(directory = %id, error = %e, "Skipping unexpected secret directory");
                    continue;
                }
            };
            match self.get_secret(&name).await {
                Ok(secret) => secrets.push(secret),
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(secrets)
    }

    /// Apply a field-masked update; only `labels` can change
    pub async fn update_secret(
        &self,
        name: &SecretName,
        labels: HashMap<String, String>,
        update_mask: &[String],
    ) -> Result<Secret, StoreError> {
        validate_update_mask(update_mask)?;

        let _guard = self.locks.lock(&name.to_string()).await;
        let mut secret = self.get_secret(name).await?;
        secret.labels = labels;
        self.write_secret(name, &secret).await?;
        debug!(secret = %name, "Updated secret labels");
        Ok(secret)
    }

    /// Version manifest of a secret, empty when no version was added yet
    pub async fn read_manifest(&self, name: &SecretName) -> Result<VersionManifest, StoreError> {
        match self.fs.read(&self.manifest_file(name)).await {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| StoreError::Serialization(format!("{name} versions: {e}"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(VersionManifest::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_secret(&self, name: &SecretName, secret: &Secret) -> Result<(), StoreError> {
        let json = SecretJson::try_from(secret)
            .map_err(|e| StoreError::Serialization(format!("{name}: {e}")))?;
        self.write_json(&self.secret_file(name), &json).await
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.fs.write(path, &bytes).await?;
        Ok(())
    }
}

fn validate_update_mask(paths: &[String]) -> Result<(), StoreError> {
    if paths.is_empty() || paths.iter().any(|p| !MUTABLE_FIELDS.contains(&p.as_str())) {
        return Err(StoreError::InvalidArgument(
            "Update mask must only contain mutable fields".to_string(),
        ));
    }
    Ok(())
}

fn now() -> Timestamp {
    let now = Utc::now();
    Timestamp {
        seconds: now.timestamp(),
        nanos: i32::try_from(now.timestamp_subsec_nanos()).unwrap_or(0),
    }
}
