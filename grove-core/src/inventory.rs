//! Inventory, equipment slots and fusion reservations.

use crate::quests::{Loot, LootKind};
use crate::stats::StatDelta;
use crate::world::{FusionId, ItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Mana spent on one fusion.
pub const FUSION_COST: i64 = 50;

// ============================================================================
// Items
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Legendary,
    Relic,
}

/// Equipment slot. Each slot holds at most one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentSlot {
    /// Instruments and creative tools.
    Weapon,
    /// Workspace and environment.
    Armor,
    /// Software and digital tools.
    Relic,
    /// Biohacking and health tools.
    Accessory,
}

impl EquipmentSlot {
    pub const ALL: [EquipmentSlot; 4] = [
        EquipmentSlot::Weapon,
        EquipmentSlot::Armor,
        EquipmentSlot::Relic,
        EquipmentSlot::Accessory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EquipmentSlot::Weapon => "WEAPON",
            EquipmentSlot::Armor => "ARMOR",
            EquipmentSlot::Relic => "RELIC",
            EquipmentSlot::Accessory => "ACCESSORY",
        }
    }

    /// First slot whose name appears in `name`, else ACCESSORY.
    pub fn guess_from_name(name: &str) -> Self {
        let upper = name.to_uppercase();
        Self::ALL
            .into_iter()
            .find(|slot| upper.contains(slot.as_str()))
            .unwrap_or(EquipmentSlot::Accessory)
    }
}

impl fmt::Display for EquipmentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item shape returned by loot generation and fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub rarity: Rarity,
    #[serde(default)]
    pub slot: Option<EquipmentSlot>,
    #[serde(default)]
    pub stats: StatDelta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,
    pub name: String,
    pub rarity: Rarity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub slot: Option<EquipmentSlot>,
    #[serde(default)]
    pub stats: Option<StatDelta>,
    #[serde(default)]
    pub real_world_counterpart: Option<String>,
    /// Generated image reference.
    #[serde(default)]
    pub image: Option<String>,
}

impl InventoryItem {
    pub fn new(name: impl Into<String>, rarity: Rarity, description: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            rarity,
            description: description.into(),
            slot: None,
            stats: None,
            real_world_counterpart: None,
            image: None,
        }
    }

    pub fn with_slot(mut self, slot: EquipmentSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_stats(mut self, stats: StatDelta) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Build an item from a collaborator descriptor. A missing slot falls
    /// back to `default_slot`.
    pub fn from_descriptor(descriptor: ItemDescriptor, default_slot: EquipmentSlot) -> Self {
        Self {
            id: ItemId::new(),
            name: descriptor.name,
            rarity: descriptor.rarity,
            description: descriptor.description,
            slot: Some(descriptor.slot.unwrap_or(default_slot)),
            stats: Some(descriptor.stats),
            real_world_counterpart: None,
            image: None,
        }
    }

    /// Materialize pre-assigned ITEM loot; other loot kinds are not items.
    pub fn from_loot(loot: &Loot) -> Option<Self> {
        if loot.kind != LootKind::Item {
            return None;
        }
        Some(
            Self::new(&loot.name, Rarity::Rare, &loot.description)
                .with_slot(EquipmentSlot::guess_from_name(&loot.name))
                .with_stats(StatDelta::default().resonance(5.0).quality(1.05)),
        )
    }

    /// Items without an image that are not bound to a real object get a
    /// generated visual.
    pub fn needs_visual(&self) -> bool {
        self.image.is_none() && self.real_world_counterpart.is_none()
    }
}

// ============================================================================
// Inventory & Equipment
// ============================================================================

/// Every item the character owns, in acquisition order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    items: Vec<InventoryItem>,
}

impl Inventory {
    pub fn new(items: Vec<InventoryItem>) -> Self {
        Self { items }
    }

    /// The three relics every seeker starts with.
    pub fn starting() -> Self {
        Self::new(vec![
            InventoryItem::new(
                "Crystal Harp",
                Rarity::Legendary,
                "Enhances creative focus. +25% Mana gain.",
            )
            .with_slot(EquipmentSlot::Weapon)
            .with_stats(StatDelta::default().focus(25.0).resonance(10.0)),
            InventoryItem::new(
                "Alchemist M1",
                Rarity::Relic,
                "The core processor of your reality. +20% Efficiency.",
            )
            .with_slot(EquipmentSlot::Relic)
            .with_stats(StatDelta::default().efficiency(20.0).resonance(15.0)),
            InventoryItem::new(
                "Zen Sanctuary",
                Rarity::Rare,
                "A workspace tuned for silence. +15% Efficiency.",
            )
            .with_slot(EquipmentSlot::Armor)
            .with_stats(StatDelta::default().efficiency(15.0)),
        ])
    }

    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&InventoryItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut InventoryItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&InventoryItem> {
        self.items.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    pub fn add(&mut self, item: InventoryItem) -> ItemId {
        let id = item.id;
        self.items.push(item);
        id
    }

    pub fn remove(&mut self, id: ItemId) -> Option<InventoryItem> {
        let pos = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(pos))
    }

    pub fn needing_visuals(&self) -> impl Iterator<Item = &InventoryItem> {
        self.items.iter().filter(|i| i.needs_visual())
    }
}

/// Slot assignments. Slots reference inventory items by id; equipping never
/// copies an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Equipment {
    slots: BTreeMap<EquipmentSlot, ItemId>,
}

impl Equipment {
    pub fn get(&self, slot: EquipmentSlot) -> Option<ItemId> {
        self.slots.get(&slot).copied()
    }

    /// Put an item in its declared slot, replacing the previous occupant.
    /// Slotless items are refused.
    pub fn equip(&mut self, item: &InventoryItem) -> bool {
        match item.slot {
            Some(slot) => {
                self.slots.insert(slot, item.id);
                true
            }
            None => false,
        }
    }

    /// Clear every slot that references `id`.
    pub fn release(&mut self, id: ItemId) {
        self.slots.retain(|_, equipped| *equipped != id);
    }

    pub fn is_equipped(&self, id: ItemId) -> bool {
        self.slots.values().any(|equipped| *equipped == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EquipmentSlot, ItemId)> + '_ {
        self.slots.iter().map(|(slot, id)| (*slot, *id))
    }

    /// Stat deltas of equipped items that still exist in `inventory`.
    pub fn deltas<'a>(&'a self, inventory: &'a Inventory) -> impl Iterator<Item = &'a StatDelta> + 'a {
        self.slots
            .values()
            .filter_map(move |id| inventory.get(*id))
            .filter_map(|item| item.stats.as_ref())
    }
}

// ============================================================================
// Fusion
// ============================================================================

/// Mana held while a fusion request is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionReservation {
    pub id: FusionId,
    pub inputs: [ItemId; 2],
    pub cost: i64,
    pub started_at: DateTime<Utc>,
}

impl FusionReservation {
    pub fn new(first: ItemId, second: ItemId, cost: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: FusionId::new(),
            inputs: [first, second],
            cost,
            started_at: now,
        }
    }

    pub fn holds(&self, id: ItemId) -> bool {
        self.inputs.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{resolve_effective_stats, Stats};

    #[test]
    fn test_starting_inventory() {
        let inv = Inventory::starting();
        assert_eq!(inv.len(), 3);
        let harp = inv.find_by_name("crystal harp").unwrap();
        assert_eq!(harp.slot, Some(EquipmentSlot::Weapon));
        assert_eq!(harp.rarity, Rarity::Legendary);
        assert_eq!(inv.needing_visuals().count(), 3);
    }

    #[test]
    fn test_equip_references_without_copying() {
        let inv = Inventory::starting();
        let harp = inv.find_by_name("Crystal Harp").unwrap().clone();
        let mut equipment = Equipment::default();

        assert!(equipment.equip(&harp));
        assert_eq!(equipment.get(EquipmentSlot::Weapon), Some(harp.id));
        assert!(inv.contains(harp.id));
        assert!(equipment.is_equipped(harp.id));
    }

    #[test]
    fn test_equip_slotless_is_refused() {
        let mut equipment = Equipment::default();
        let pebble = InventoryItem::new("Pebble", Rarity::Common, "Just a pebble.");
        assert!(!equipment.equip(&pebble));
        assert_eq!(equipment.iter().count(), 0);
    }

    #[test]
    fn test_equip_overwrites_slot() {
        let mut equipment = Equipment::default();
        let a = InventoryItem::new("A", Rarity::Common, "").with_slot(EquipmentSlot::Armor);
        let b = InventoryItem::new("B", Rarity::Common, "").with_slot(EquipmentSlot::Armor);

        equipment.equip(&a);
        equipment.equip(&b);
        assert_eq!(equipment.get(EquipmentSlot::Armor), Some(b.id));
        assert!(!equipment.is_equipped(a.id));
    }

    #[test]
    fn test_equipped_deltas_feed_resolver() {
        let inv = Inventory::starting();
        let mut equipment = Equipment::default();
        for item in inv.items() {
            equipment.equip(item);
        }

        let stats = resolve_effective_stats(&Stats::default(), equipment.deltas(&inv));
        assert_eq!(stats.focus, 35.0);
        assert_eq!(stats.efficiency, 45.0);
        assert_eq!(stats.resonance, 35.0);
        assert_eq!(stats.quality, 1.0);
    }

    #[test]
    fn test_loot_item_slot_guess() {
        let loot = Loot::new(LootKind::Item, "Armor of Inbox Zero", "Shiny");
        let item = InventoryItem::from_loot(&loot).unwrap();
        assert_eq!(item.slot, Some(EquipmentSlot::Armor));
        assert_eq!(item.rarity, Rarity::Rare);
        assert_eq!(item.stats.unwrap().quality, Some(1.05));

        let plain = InventoryItem::from_loot(&Loot::new(LootKind::Item, "Potion of Clarity", "")).unwrap();
        assert_eq!(plain.slot, Some(EquipmentSlot::Accessory));

        assert!(InventoryItem::from_loot(&Loot::new(LootKind::Lore, "Scroll", "")).is_none());
    }

    #[test]
    fn test_descriptor_default_slot() {
        let descriptor = ItemDescriptor {
            name: "Fused Thing".to_string(),
            description: String::new(),
            rarity: Rarity::Legendary,
            slot: None,
            stats: StatDelta::default().focus(3.0),
        };
        let item = InventoryItem::from_descriptor(descriptor, EquipmentSlot::Relic);
        assert_eq!(item.slot, Some(EquipmentSlot::Relic));
    }

    #[test]
    fn test_release_clears_every_reference() {
        let mut equipment = Equipment::default();
        let a = InventoryItem::new("A", Rarity::Common, "").with_slot(EquipmentSlot::Weapon);
        equipment.equip(&a);
        equipment.release(a.id);
        assert_eq!(equipment.get(EquipmentSlot::Weapon), None);
    }
}
