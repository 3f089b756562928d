//! File-backed state store.
//!
//! Each object key owns one JSON document under the store root. The file name
//! is the URL-safe base64 form of the key, so arbitrary keys map to valid
//! names. Keys whose encoded form would be too long for a file name are stored
//! under the hex BLAKE2b digest of the key instead. Every document records the
//! key it belongs to, and a load that finds a different key is rejected.
//!
//! Values are stored base64-encoded. A commit writes the complete new document
//! to a temporary file and renames it over the old one, so readers see either
//! the previous state or the new state, never a mix.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use blake2::{Blake2b512, Digest};

use super::store::{apply_writes, KeyedStateStore, StateWrite};
use crate::error::EndpointError;

const STATE_FILE_EXTENSION: &str = "json";

/// Marker between the digest and the extension of hashed file names. Base64
/// names never contain a dot, so hashed and encoded names cannot collide.
const DIGEST_NAME_MARKER: &str = "blake2b";

/// Longest encoded key used verbatim as a file name. Leaves room for the
/// extensions under the usual 255-byte name limit.
const MAX_ENCODED_NAME_LEN: usize = 200;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateDocument {
    object_key: String,
    state: BTreeMap<String, String>,
}

/// State store persisting one JSON document per object key.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    /// Creates a store rooted at `root`. The directory is created on first commit.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, object_key: &str) -> PathBuf {
        let encoded = URL_SAFE_NO_PAD.encode(object_key.as_bytes());
        let file_name = if encoded.len() <= MAX_ENCODED_NAME_LEN {
            format!("{}.{}", encoded, STATE_FILE_EXTENSION)
        } else {
            format!(
                "{}.{}.{}",
                hex::encode(Blake2b512::digest(object_key.as_bytes())),
                DIGEST_NAME_MARKER,
                STATE_FILE_EXTENSION
            )
        };
        self.root.join(file_name)
    }

    fn temp_path(&self, object_key: &str) -> PathBuf {
        self.object_path(object_key).with_extension("tmp")
    }

    async fn load(&self, object_key: &str) -> Result<HashMap<String, Bytes>, EndpointError> {
        let path = self.object_path(object_key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(EndpointError::store_unavailable(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let document: StateDocument = serde_json::from_slice(&raw).map_err(|e| {
            EndpointError::store_unavailable(format!(
                "corrupt state file {}: {}",
                path.display(),
                e
            ))
        })?;
        if document.object_key != object_key {
            return Err(EndpointError::store_unavailable(format!(
                "state file {} belongs to a different object key",
                path.display()
            )));
        }

        document
            .state
            .into_iter()
            .map(|(name, value)| {
                STANDARD
                    .decode(value.as_bytes())
                    .map(|decoded| (name, Bytes::from(decoded)))
                    .map_err(|e| {
                        EndpointError::store_unavailable(format!(
                            "corrupt value in {}: {}",
                            path.display(),
                            e
                        ))
                    })
            })
            .collect()
    }

    async fn persist(
        &self,
        object_key: &str,
        state: &HashMap<String, Bytes>,
    ) -> Result<(), EndpointError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let document = StateDocument {
            object_key: object_key.to_string(),
            state: state
                .iter()
                .map(|(name, value)| (name.clone(), STANDARD.encode(value)))
                .collect(),
        };
        let raw = serde_json::to_vec_pretty(&document)?;

        let path = self.object_path(object_key);
        let tmp_path = self.temp_path(object_key);
        tokio::fs::write(&tmp_path, &raw).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl KeyedStateStore for FileStateStore {
    async fn get(
        &self,
        object_key: &str,
        state_name: &str,
    ) -> Result<Option<Bytes>, EndpointError> {
        let mut state = self.load(object_key).await?;
        Ok(state.remove(state_name))
    }

    async fn snapshot(&self, object_key: &str) -> Result<HashMap<String, Bytes>, EndpointError> {
        self.load(object_key).await
    }

    async fn commit(
        &self,
        object_key: &str,
        writes: Vec<StateWrite>,
    ) -> Result<(), EndpointError> {
        let mut state = self.load(object_key).await?;
        apply_writes(&mut state, writes);
        self.persist(object_key, &state).await?;
        tracing::debug!(
            object_key = object_key,
            entries = state.len(),
            "Persisted object state"
        );
        Ok(())
    }
}
