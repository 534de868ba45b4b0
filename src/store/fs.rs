//! JSON-on-disk store.
//!
//! Layout under the data directory:
//!
//! ```text
//! <id>/kb.json
//! <id>/metadata.json
//! <id>/checkpoints/checkpoint_<n>.json
//! <id>/final_profile.json
//! <id>/images/<file>
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use super::{Checkpoint, MetadataUpdate, RunMetadata, Store};
use crate::character::{CharacterId, FinalProfile, KnowledgeBase};
use crate::util::{blocking, write_atomic, write_new};
use crate::{wlog_debug, Error, Result};

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    metadata_lock: Arc<Mutex<()>>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn character_dir(&self, id: CharacterId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn checkpoint_path(&self, id: CharacterId, number: u32) -> PathBuf {
        self.character_dir(id)
            .join("checkpoints")
            .join(format!("checkpoint_{}.json", number))
    }

    fn existing_dir(&self, id: CharacterId) -> Result<PathBuf> {
        let dir = self.character_dir(id);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(Error::CharacterNotFound(id))
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

/// Read a JSON file, mapping a missing file to `missing`.
fn read_json<T: DeserializeOwned>(path: &Path, missing: Error) -> Result<T> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(missing),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Store for FsStore {
    async fn save_kb(&self, kb: &KnowledgeBase) -> Result<()> {
        let path = self.character_dir(kb.character_id()).join("kb.json");
        let kb = kb.clone();
        blocking(move || write_json(&path, &kb)).await
    }

    async fn load_kb(&self, id: CharacterId) -> Result<KnowledgeBase> {
        let path = self.character_dir(id).join("kb.json");
        blocking(move || read_json(&path, Error::CharacterNotFound(id))).await
    }

    async fn save_metadata(&self, id: CharacterId, metadata: &RunMetadata) -> Result<()> {
        let path = self.character_dir(id).join("metadata.json");
        let metadata = metadata.clone();
        blocking(move || write_json(&path, &metadata)).await
    }

    async fn load_metadata(&self, id: CharacterId) -> Result<RunMetadata> {
        let path = self.character_dir(id).join("metadata.json");
        blocking(move || read_json(&path, Error::CharacterNotFound(id))).await
    }

    async fn update_metadata(&self, id: CharacterId, apply: MetadataUpdate) -> Result<RunMetadata> {
        let _writer = self.metadata_lock.lock().await;
        let mut metadata = self.load_metadata(id).await?;
        apply(&mut metadata);
        metadata.touch();
        self.save_metadata(id, &metadata).await?;
        Ok(metadata)
    }

    async fn save_checkpoint(&self, id: CharacterId, checkpoint: &Checkpoint) -> Result<()> {
        self.existing_dir(id)?;
        let number = checkpoint.checkpoint_number;
        let path = self.checkpoint_path(id, number);
        let checkpoint = checkpoint.clone();
        blocking(move || {
            let json = serde_json::to_vec_pretty(&checkpoint)?;
            match write_new(&path, &json) {
                Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    Err(Error::CheckpointExists {
                        character: id,
                        number,
                    })
                }
                other => other,
            }
        })
        .await?;
        wlog_debug!("[store] {} wrote checkpoint {}", id.short(), number);
        Ok(())
    }

    async fn load_checkpoint(&self, id: CharacterId, number: u32) -> Result<Checkpoint> {
        self.existing_dir(id)?;
        let path = self.checkpoint_path(id, number);
        blocking(move || {
            read_json(
                &path,
                Error::CheckpointNotFound {
                    character: id,
                    number,
                },
            )
        })
        .await
    }

    async fn list_checkpoints(&self, id: CharacterId) -> Result<Vec<u32>> {
        let dir = self.existing_dir(id)?.join("checkpoints");
        blocking(move || {
            if !dir.exists() {
                return Ok(Vec::new());
            }
            let mut numbers = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let name = entry?.file_name();
                let number = name
                    .to_str()
                    .and_then(|n| n.strip_prefix("checkpoint_"))
                    .and_then(|n| n.strip_suffix(".json"))
                    .and_then(|n| n.parse::<u32>().ok());
                if let Some(number) = number {
                    numbers.push(number);
                }
            }
            numbers.sort_unstable();
            Ok(numbers)
        })
        .await
    }

    async fn save_final_profile(&self, id: CharacterId, profile: &FinalProfile) -> Result<()> {
        let path = self.existing_dir(id)?.join("final_profile.json");
        let profile = profile.clone();
        blocking(move || write_json(&path, &profile)).await
    }

    async fn load_final_profile(&self, id: CharacterId) -> Result<FinalProfile> {
        let path = self.existing_dir(id)?.join("final_profile.json");
        blocking(move || read_json(&path, Error::ProfileNotFound(id))).await
    }

    async fn save_image(&self, id: CharacterId, file_name: &str, data: &[u8]) -> Result<String> {
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| Error::Validation(format!("invalid image file name: {}", file_name)))?
            .to_owned();
        let path = self.existing_dir(id)?.join("images").join(name);
        let data = data.to_vec();
        let written = path.clone();
        blocking(move || write_atomic(&written, &data)).await?;
        Ok(path.display().to_string())
    }
}
