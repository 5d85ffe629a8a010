//! Grove persistence for save/load.
//!
//! A save is the whole [`GameWorld`] as pretty JSON plus a small metadata
//! block that can be read without deserializing the world.

use crate::world::GameWorld;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current save file version.
const SAVE_VERSION: u32 = 1;

/// A saved grove with all state needed to resume play.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedGrove {
    /// Save format version for compatibility checking.
    pub version: u32,

    pub saved_at: DateTime<Utc>,

    pub world: GameWorld,

    pub metadata: SaveMetadata,
}

/// Metadata about the save file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    pub character_name: String,
    pub level: u32,
    pub streak: u32,
    pub vibration: i64,

    /// Duplicated from the parent for peek access.
    pub saved_at: DateTime<Utc>,
}

impl SavedGrove {
    pub fn new(world: GameWorld, saved_at: DateTime<Utc>) -> Self {
        let c = &world.character;
        let metadata = SaveMetadata {
            character_name: c.name.clone(),
            level: c.level,
            streak: c.streak,
            vibration: c.vibration,
            saved_at,
        };

        Self {
            version: SAVE_VERSION,
            saved_at,
            world,
            metadata,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file. Fusions that were in flight when the save was
    /// written can never be answered, so their mana is refunded.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let mut saved: Self = serde_json::from_str(&content)?;

        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        saved.world.release_stale_fusions();
        Ok(saved)
    }

    /// Read only the metadata of a save.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SaveMetadata, PersistError> {
        let content = fs::read_to_string(path).await?;

        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: SaveMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;

        if partial.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: partial.version,
            });
        }

        Ok(partial.metadata)
    }
}

/// Information about a save file.
#[derive(Debug, Clone)]
pub struct SaveInfo {
    pub path: PathBuf,
    pub metadata: SaveMetadata,
}

/// List readable saves in a directory, most recently saved first. Files
/// that are not grove saves are skipped.
pub async fn list_saves(dir: impl AsRef<Path>) -> Result<Vec<SaveInfo>, PersistError> {
    let mut saves = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "json") {
            match SavedGrove::peek_metadata(&path).await {
                Ok(metadata) => saves.push(SaveInfo { path, metadata }),
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "skipping file"),
            }
        }
    }

    saves.sort_by(|a, b| b.metadata.saved_at.cmp(&a.metadata.saved_at));
    Ok(saves)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Autosave file for a character.
pub fn auto_save_path(base_dir: impl AsRef<Path>, character_name: &str) -> PathBuf {
    base_dir
        .as_ref()
        .join(format!("{}_autosave.json", sanitize(character_name)))
}

/// Manual save file name with a timestamp.
pub fn manual_save_path(
    base_dir: impl AsRef<Path>,
    character_name: &str,
    at: DateTime<Utc>,
) -> PathBuf {
    base_dir.as_ref().join(format!(
        "{}_{}.json",
        sanitize(character_name),
        at.format("%Y%m%d_%H%M%S")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Character;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_saved_grove_creation() {
        let mut world = GameWorld::new(Character::new("Ivy"));
        world.character.streak = 4;
        let saved = SavedGrove::new(world, at(9));

        assert_eq!(saved.version, SAVE_VERSION);
        assert_eq!(saved.metadata.character_name, "Ivy");
        assert_eq!(saved.metadata.level, 1);
        assert_eq!(saved.metadata.streak, 4);
    }

    #[test]
    fn test_save_paths() {
        let path = auto_save_path("/saves", "Ivy the Bold!");
        assert!(path.to_string_lossy().ends_with("Ivy_the_Bold__autosave.json"));

        let path = manual_save_path("/saves", "Ivy", at(9));
        assert!(path.to_string_lossy().ends_with("Ivy_20240501_090000.json"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("grove.json");

        let mut world = GameWorld::new(Character::new("Ivy"));
        world.character.vibration = 240;
        world.add_idea("Paint the hallway", at(8));
        SavedGrove::new(world.clone(), at(9))
            .save_json(&path)
            .await
            .expect("Save should succeed");

        let loaded = SavedGrove::load_json(&path).await.expect("Load should succeed");
        assert_eq!(loaded.world, world);
        assert_eq!(loaded.saved_at, at(9));
    }

    #[tokio::test]
    async fn test_load_refunds_pending_fusions() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("fusing.json");

        let mut world = GameWorld::new(Character::new("Ivy"));
        let ids: Vec<_> = world.inventory.items().iter().map(|i| i.id).collect();
        let mana = world.character.mana;
        world.begin_fusion(ids[0], ids[1], at(8)).expect("fusion should start");
        assert_eq!(world.character.mana, mana - 50);

        SavedGrove::new(world, at(9)).save_json(&path).await.unwrap();
        let loaded = SavedGrove::load_json(&path).await.unwrap();

        assert!(loaded.world.pending_fusions.is_empty());
        assert_eq!(loaded.world.character.mana, mana);
        assert_eq!(loaded.world.inventory.len(), 3);
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("old.json");

        let mut saved = SavedGrove::new(GameWorld::default(), at(9));
        saved.version = 99;
        saved.save_json(&path).await.unwrap();

        let err = SavedGrove::load_json(&path).await.unwrap_err();
        assert!(matches!(
            err,
            PersistError::VersionMismatch {
                expected: 1,
                found: 99
            }
        ));
        assert!(SavedGrove::peek_metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_list_saves_newest_first() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        for (name, hour) in [("Alder", 7), ("Birch", 11), ("Cedar", 9)] {
            let world = GameWorld::new(Character::new(name));
            SavedGrove::new(world, at(hour))
                .save_json(auto_save_path(temp_dir.path(), name))
                .await
                .unwrap();
        }
        std::fs::write(temp_dir.path().join("notes.json"), "{}").unwrap();
        std::fs::write(temp_dir.path().join("readme.txt"), "hello").unwrap();

        let saves = list_saves(temp_dir.path()).await.expect("List should succeed");
        let names: Vec<_> = saves
            .iter()
            .map(|s| s.metadata.character_name.as_str())
            .collect();
        assert_eq!(names, vec!["Birch", "Cedar", "Alder"]);
    }
}
