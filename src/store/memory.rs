//! In-process store for tests and ephemeral runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Checkpoint, MetadataUpdate, RunMetadata, Store};
use crate::character::{CharacterId, FinalProfile, KnowledgeBase};
use crate::{Error, Result};

#[derive(Default)]
struct Record {
    kb: Option<KnowledgeBase>,
    metadata: Option<RunMetadata>,
    checkpoints: BTreeMap<u32, Checkpoint>,
    final_profile: Option<FinalProfile>,
    images: BTreeMap<String, Vec<u8>>,
}

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<CharacterId, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of an image saved with `save_image`.
    pub async fn image(&self, id: CharacterId, file_name: &str) -> Option<Vec<u8>> {
        self.records
            .read()
            .await
            .get(&id)
            .and_then(|r| r.images.get(file_name).cloned())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_kb(&self, kb: &KnowledgeBase) -> Result<()> {
        let mut records = self.records.write().await;
        records.entry(kb.character_id()).or_default().kb = Some(kb.clone());
        Ok(())
    }

    async fn load_kb(&self, id: CharacterId) -> Result<KnowledgeBase> {
        self.records
            .read()
            .await
            .get(&id)
            .and_then(|r| r.kb.clone())
            .ok_or(Error::CharacterNotFound(id))
    }

    async fn save_metadata(&self, id: CharacterId, metadata: &RunMetadata) -> Result<()> {
        let mut records = self.records.write().await;
        records.entry(id).or_default().metadata = Some(metadata.clone());
        Ok(())
    }

    async fn load_metadata(&self, id: CharacterId) -> Result<RunMetadata> {
        self.records
            .read()
            .await
            .get(&id)
            .and_then(|r| r.metadata.clone())
            .ok_or(Error::CharacterNotFound(id))
    }

    async fn update_metadata(&self, id: CharacterId, apply: MetadataUpdate) -> Result<RunMetadata> {
        let mut records = self.records.write().await;
        let metadata = records
            .get_mut(&id)
            .and_then(|r| r.metadata.as_mut())
            .ok_or(Error::CharacterNotFound(id))?;
        apply(&mut *metadata);
        metadata.touch();
        Ok(metadata.clone())
    }

    async fn save_checkpoint(&self, id: CharacterId, checkpoint: &Checkpoint) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(Error::CharacterNotFound(id))?;
        let number = checkpoint.checkpoint_number;
        if record.checkpoints.contains_key(&number) {
            return Err(Error::CheckpointExists {
                character: id,
                number,
            });
        }
        record.checkpoints.insert(number, checkpoint.clone());
        Ok(())
    }

    async fn load_checkpoint(&self, id: CharacterId, number: u32) -> Result<Checkpoint> {
        let records = self.records.read().await;
        let record = records.get(&id).ok_or(Error::CharacterNotFound(id))?;
        record
            .checkpoints
            .get(&number)
            .cloned()
            .ok_or(Error::CheckpointNotFound {
                character: id,
                number,
            })
    }

    async fn list_checkpoints(&self, id: CharacterId) -> Result<Vec<u32>> {
        let records = self.records.read().await;
        let record = records.get(&id).ok_or(Error::CharacterNotFound(id))?;
        Ok(record.checkpoints.keys().copied().collect())
    }

    async fn save_final_profile(&self, id: CharacterId, profile: &FinalProfile) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(Error::CharacterNotFound(id))?;
        record.final_profile = Some(profile.clone());
        Ok(())
    }

    async fn load_final_profile(&self, id: CharacterId) -> Result<FinalProfile> {
        let records = self.records.read().await;
        let record = records.get(&id).ok_or(Error::CharacterNotFound(id))?;
        record
            .final_profile
            .clone()
            .ok_or(Error::ProfileNotFound(id))
    }

    async fn save_image(&self, id: CharacterId, file_name: &str, data: &[u8]) -> Result<String> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(Error::CharacterNotFound(id))?;
        record.images.insert(file_name.to_string(), data.to_vec());
        Ok(format!("memory://{}/images/{}", id, file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterSeed, ConceptInput, DevelopmentMode};

    fn input() -> ConceptInput {
        ConceptInput {
            characters: vec![CharacterSeed {
                name: "Mara".into(),
                ..Default::default()
            }],
            storyline: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let store = MemoryStore::new();
        let id = store.create(input(), DevelopmentMode::Deep).await.unwrap();
        assert_eq!(store.load_kb(id).await.unwrap().character_id(), id);
        assert_eq!(store.load_metadata(id).await.unwrap().current_checkpoint, 0);
        assert!(store.list_checkpoints(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = MemoryStore::new();
        let id = CharacterId::new();
        assert!(store.load_metadata(id).await.unwrap_err().is_not_found());

        let id = store.create(input(), DevelopmentMode::Fast).await.unwrap();
        assert!(matches!(
            store.load_final_profile(id).await.unwrap_err(),
            Error::ProfileNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_metadata_updates_are_kept() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let id = store.create(input(), DevelopmentMode::Fast).await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_metadata(id, Box::new(|m| m.regenerations += 1))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.load_metadata(id).await.unwrap().regenerations, 16);
    }

    #[tokio::test]
    async fn test_images_are_kept() {
        let store = MemoryStore::new();
        let id = store.create(input(), DevelopmentMode::Fast).await.unwrap();
        let path = store.save_image(id, "portrait.png", b"abc").await.unwrap();
        assert!(path.ends_with("/images/portrait.png"));
        assert_eq!(store.image(id, "portrait.png").await.unwrap(), b"abc");
    }
}
