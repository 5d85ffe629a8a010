//! The asynchronous boundary.
//!
//! Operations that need the oracle hand back a request. The session runs the
//! call off the synchronous core and the answer comes back as a [`Patch`],
//! which only [`apply_patch`] turns into state changes. Patches may arrive in
//! any order and are applied to whatever the world looks like at that point.

use crate::inventory::{InventoryItem, ItemDescriptor};
use crate::oracle::MuseGift;
use crate::quests::{TaskCategory, TaskDraft};
use crate::stats::Stats;
use crate::world::{FusionId, FusionOutcome, GameWorld, ItemId, TaskId};
use chrono::{DateTime, Utc};

// ============================================================================
// Requests
// ============================================================================

/// Generate loot for a completed quest that carried none.
#[derive(Debug, Clone, PartialEq)]
pub struct LootRequest {
    pub task_id: TaskId,
    pub title: String,
    pub category: TaskCategory,
    pub difficulty: u32,
}

/// Fuse two reserved items.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionRequest {
    pub fusion: FusionId,
    pub first: InventoryItem,
    pub second: InventoryItem,
}

/// Bind an item to a real-world object.
#[derive(Debug, Clone, PartialEq)]
pub struct BindRequest {
    pub item_id: ItemId,
    pub artifact_name: String,
    pub real_name: String,
    /// Name used for the bound item's new visual.
    pub visual_name: String,
    pub description: String,
}

/// Generate an image for an item.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualRequest {
    pub item_id: ItemId,
    pub name: String,
    pub description: String,
}

impl VisualRequest {
    pub fn for_item(item: &InventoryItem) -> Self {
        Self {
            item_id: item.id,
            name: item.name.clone(),
            description: item.description.clone(),
        }
    }
}

// ============================================================================
// Patches
// ============================================================================

/// The answer to one oracle call. Fallbacks are already folded in.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Quests interpreted from a captured thought.
    ThoughtInterpreted { drafts: Vec<TaskDraft> },

    /// Loot generated for a completed quest; `None` when generation failed.
    LootGenerated {
        task_id: TaskId,
        item: Option<ItemDescriptor>,
    },

    /// A fusion result; `None` releases the reservation.
    FusionResolved {
        fusion: FusionId,
        item: Option<ItemDescriptor>,
    },

    /// Bound stats plus an optional new visual.
    ItemBound {
        item_id: ItemId,
        real_name: String,
        stats: Stats,
        image: Option<String>,
    },

    /// A generated item image.
    ItemVisual {
        item_id: ItemId,
        image: Option<String>,
    },

    /// Fresh words from the grove spirit.
    Guidance { text: String },

    /// A gift from the muse familiar.
    MuseGift { gift: MuseGift },
}

impl Patch {
    pub fn kind(&self) -> &'static str {
        match self {
            Patch::ThoughtInterpreted { .. } => "thought_interpreted",
            Patch::LootGenerated { .. } => "loot_generated",
            Patch::FusionResolved { .. } => "fusion_resolved",
            Patch::ItemBound { .. } => "item_bound",
            Patch::ItemVisual { .. } => "item_visual",
            Patch::Guidance { .. } => "guidance",
            Patch::MuseGift { .. } => "muse_gift",
        }
    }
}

/// What applying a patch changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    TasksAdded(Vec<TaskId>),
    /// A new item entered the inventory and wants a visual.
    ItemAdded(ItemId),
    Fusion(FusionOutcome),
    ItemUpdated(ItemId),
    GuidanceSet,
    MuseGiftReceived,
    /// The patch had nothing to apply to.
    Nothing,
}

/// Apply one patch to the world.
pub fn apply_patch(world: &mut GameWorld, patch: Patch, now: DateTime<Utc>) -> Applied {
    tracing::debug!(kind = patch.kind(), "applying patch");
    match patch {
        Patch::ThoughtInterpreted { drafts } => Applied::TasksAdded(world.add_tasks(drafts, now)),

        Patch::LootGenerated { task_id, item } => match item {
            Some(descriptor) => {
                let id = world.add_generated_loot(descriptor);
                tracing::info!(task = %task_id, item = %id, "generated loot arrived");
                Applied::ItemAdded(id)
            }
            None => Applied::Nothing,
        },

        Patch::FusionResolved { fusion, item } => match world.resolve_fusion(fusion, item) {
            FusionOutcome::Fused(id) => Applied::ItemAdded(id),
            outcome => Applied::Fusion(outcome),
        },

        Patch::ItemBound {
            item_id,
            real_name,
            stats,
            image,
        } => {
            if world.apply_binding(item_id, real_name, stats, image) {
                Applied::ItemUpdated(item_id)
            } else {
                Applied::Nothing
            }
        }

        Patch::ItemVisual { item_id, image } => match image {
            Some(image) => {
                if world.set_item_visual(item_id, image) {
                    Applied::ItemUpdated(item_id)
                } else {
                    Applied::Nothing
                }
            }
            None => Applied::Nothing,
        },

        Patch::Guidance { text } => {
            world.set_guidance(text);
            Applied::GuidanceSet
        }

        Patch::MuseGift { gift } => {
            world.muse_gift = Some(gift);
            Applied::MuseGiftReceived
        }
    }
}

/// Apply patches in arrival order.
pub fn apply_patches(
    world: &mut GameWorld,
    patches: impl IntoIterator<Item = Patch>,
    now: DateTime<Utc>,
) -> Vec<Applied> {
    patches
        .into_iter()
        .map(|p| apply_patch(world, p, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{EquipmentSlot, Rarity};
    use crate::oracle::MuseGiftKind;
    use crate::stats::StatDelta;

    fn descriptor(name: &str) -> ItemDescriptor {
        ItemDescriptor {
            name: name.to_string(),
            description: "Forged in tests.".to_string(),
            rarity: Rarity::Uncommon,
            slot: None,
            stats: StatDelta::default().focus(2.0),
        }
    }

    #[test]
    fn test_thought_adds_tasks() {
        let mut world = GameWorld::default();
        let applied = apply_patch(
            &mut world,
            Patch::ThoughtInterpreted {
                drafts: vec![TaskDraft::new("a"), TaskDraft::new("b")],
            },
            Utc::now(),
        );
        let Applied::TasksAdded(ids) = applied else {
            panic!("expected tasks");
        };
        assert_eq!(ids.len(), 2);
        assert_eq!(world.tasks.len(), 2);
    }

    #[test]
    fn test_loot_arrives_after_task_deleted() {
        let mut world = GameWorld::default();
        let applied = apply_patch(
            &mut world,
            Patch::LootGenerated {
                task_id: TaskId::new(),
                item: Some(descriptor("Late Charm")),
            },
            Utc::now(),
        );
        let Applied::ItemAdded(id) = applied else {
            panic!("expected item");
        };
        assert_eq!(world.inventory.get(id).unwrap().slot, Some(EquipmentSlot::Accessory));
    }

    #[test]
    fn test_failed_loot_is_nothing() {
        let mut world = GameWorld::default();
        let applied = apply_patch(
            &mut world,
            Patch::LootGenerated {
                task_id: TaskId::new(),
                item: None,
            },
            Utc::now(),
        );
        assert_eq!(applied, Applied::Nothing);
        assert_eq!(world.inventory.len(), 3);
    }

    #[test]
    fn test_unknown_fusion() {
        let mut world = GameWorld::default();
        let applied = apply_patch(
            &mut world,
            Patch::FusionResolved {
                fusion: FusionId::new(),
                item: Some(descriptor("Ghost")),
            },
            Utc::now(),
        );
        assert_eq!(applied, Applied::Fusion(FusionOutcome::Unknown));
        assert_eq!(world.inventory.len(), 3);
    }

    #[test]
    fn test_visual_for_missing_item() {
        let mut world = GameWorld::default();
        let applied = apply_patch(
            &mut world,
            Patch::ItemVisual {
                item_id: ItemId::new(),
                image: Some("data:image/png;base64,AAAA".to_string()),
            },
            Utc::now(),
        );
        assert_eq!(applied, Applied::Nothing);
    }

    #[test]
    fn test_visual_sets_item_image() {
        let mut world = GameWorld::default();
        let harp = world.inventory.find_by_name("Crystal Harp").unwrap().id;

        let applied = apply_patch(
            &mut world,
            Patch::ItemVisual {
                item_id: harp,
                image: Some("data:image/png;base64,AAAA".to_string()),
            },
            Utc::now(),
        );
        assert_eq!(applied, Applied::ItemUpdated(harp));
        assert_eq!(
            world.inventory.get(harp).unwrap().image.as_deref(),
            Some("data:image/png;base64,AAAA")
        );

        let missing = apply_patch(
            &mut world,
            Patch::ItemVisual {
                item_id: harp,
                image: None,
            },
            Utc::now(),
        );
        assert_eq!(missing, Applied::Nothing);
        assert!(world.inventory.get(harp).unwrap().image.is_some());
    }

    #[test]
    fn test_guidance_and_muse() {
        let mut world = GameWorld::default();
        let now = Utc::now();
        apply_patches(
            &mut world,
            [
                Patch::Guidance {
                    text: "Stillness.".to_string(),
                },
                Patch::MuseGift {
                    gift: MuseGift::new(MuseGiftKind::Spark, "Paint the sound of rain."),
                },
            ],
            now,
        );
        assert_eq!(world.guidance, "Stillness.");
        assert_eq!(world.muse_gift.unwrap().kind, MuseGiftKind::Spark);
    }
}
