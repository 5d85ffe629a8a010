//! The skill graph ("Celestial Lattice").
//!
//! Skills form a forest: each node names at most one prerequisite. Unlocking
//! spends vibration, is monotonic, and folds the node's stat delta into the
//! character's base stats.

use crate::quests::TaskCategory;
use crate::stats::{StatDelta, Stats};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for skill nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkillId(pub String);

impl SkillId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SkillId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Tier of a skill node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillType {
    Minor,
    Major,
    /// Top-tier node with a trade-off alongside its benefit.
    Keystone,
}

/// Branch tag used by energy boosts to pick the category they affect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillBranch {
    Visionary,
    Alchemist,
    /// Social / neutral work.
    Bridge,
    /// Physical work.
    Vitality,
}

/// What an unlocked skill does beyond its stat delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillEffect {
    XpBoost {
        multiplier: f64,
        applies_to: TaskCategory,
    },
    ManaBoost {
        multiplier: f64,
    },
    EnergyBoost {
        multiplier: f64,
        branch: SkillBranch,
    },
    UnlockFeature {
        feature_id: String,
    },
    GameRule {
        description: String,
    },
}

/// Layout coordinates; presentation only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node in the skill graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillNode {
    pub id: SkillId,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: SkillType,
    pub position: Position,
    pub unlocked: bool,
    /// Cost in vibration.
    pub cost: i64,
    #[serde(default)]
    pub prerequisite: Option<SkillId>,
    #[serde(default)]
    pub stats: Option<StatDelta>,
    #[serde(default)]
    pub effect: Option<SkillEffect>,
    #[serde(default)]
    pub trade_off: Option<String>,
}

impl SkillNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        kind: SkillType,
        cost: i64,
    ) -> Self {
        Self {
            id: SkillId::new(id),
            name: name.into(),
            description: description.into(),
            kind,
            position: Position::default(),
            unlocked: false,
            cost,
            prerequisite: None,
            stats: None,
            effect: None,
            trade_off: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn requires(mut self, prerequisite: &str) -> Self {
        self.prerequisite = Some(SkillId::new(prerequisite));
        self
    }

    pub fn with_stats(mut self, stats: StatDelta) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_effect(mut self, effect: SkillEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn with_trade_off(mut self, trade_off: impl Into<String>) -> Self {
        self.trade_off = Some(trade_off.into());
        self
    }

    pub fn unlocked(mut self) -> Self {
        self.unlocked = true;
        self
    }

    fn matches(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(query) || self.description.to_lowercase().contains(query)
    }
}

/// The full skill graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillTree {
    nodes: Vec<SkillNode>,
}

impl SkillTree {
    pub fn new(nodes: Vec<SkillNode>) -> Self {
        Self { nodes }
    }

    /// The seeded Celestial Lattice.
    pub fn lattice() -> Self {
        Self::new(LATTICE.clone())
    }

    pub fn nodes(&self) -> &[SkillNode] {
        &self.nodes
    }

    pub fn get(&self, id: &SkillId) -> Option<&SkillNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn is_unlocked(&self, id: &SkillId) -> bool {
        self.get(id).map(|n| n.unlocked).unwrap_or(false)
    }

    /// Whether a node can be interacted with: unlocked, a root, or its
    /// prerequisite is unlocked.
    pub fn is_reachable(&self, id: &SkillId) -> bool {
        match self.get(id) {
            Some(node) => {
                node.unlocked
                    || node
                        .prerequisite
                        .as_ref()
                        .map(|p| self.is_unlocked(p))
                        .unwrap_or(true)
            }
            None => false,
        }
    }

    /// Reachable nodes in declaration order.
    pub fn visible(&self) -> Vec<&SkillNode> {
        self.nodes
            .iter()
            .filter(|n| self.is_reachable(&n.id))
            .collect()
    }

    /// Case-insensitive search over name and description, ignoring reachability.
    pub fn search(&self, query: &str) -> Vec<&SkillNode> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.nodes.iter().collect();
        }
        self.nodes.iter().filter(|n| n.matches(&query)).collect()
    }

    /// Whether a node satisfies every unlock condition against a wallet.
    pub fn can_unlock(&self, id: &SkillId, vibration: i64) -> bool {
        match self.get(id) {
            Some(node) => {
                !node.unlocked
                    && vibration >= node.cost
                    && node
                        .prerequisite
                        .as_ref()
                        .map(|p| self.is_unlocked(p))
                        .unwrap_or(true)
            }
            None => false,
        }
    }

    /// Unlock a node, spending from `vibration` and folding its stat delta
    /// into `base`. A refused unlock changes nothing.
    pub fn unlock(&mut self, id: &SkillId, vibration: &mut i64, base: &mut Stats) -> bool {
        if !self.can_unlock(id, *vibration) {
            return false;
        }
        let Some(node) = self.nodes.iter_mut().find(|n| &n.id == id) else {
            return false;
        };

        node.unlocked = true;
        *vibration -= node.cost;
        if let Some(delta) = &node.stats {
            base.absorb(delta);
        }
        true
    }

    /// Effects of unlocked nodes in declaration order.
    pub fn unlocked_effects(&self) -> Vec<SkillEffect> {
        self.nodes
            .iter()
            .filter(|n| n.unlocked)
            .filter_map(|n| n.effect.clone())
            .collect()
    }

    /// Whether an unlocked node gates the named feature.
    pub fn has_feature(&self, feature_id: &str) -> bool {
        self.nodes.iter().any(|n| {
            n.unlocked
                && matches!(&n.effect, Some(SkillEffect::UnlockFeature { feature_id: f }) if f == feature_id)
        })
    }
}

impl Default for SkillTree {
    fn default() -> Self {
        Self::lattice()
    }
}

lazy_static::lazy_static! {
    // North (-y) creation, east (+x) order, south (+y) vitality, west (-x) connection.
    static ref LATTICE: Vec<SkillNode> = vec![
        SkillNode::new("source", "The Source", "Your core consciousness.", SkillType::Major, 0)
            .unlocked()
            .with_stats(StatDelta::default().focus(1.0).efficiency(1.0)),

        // North: creation
        SkillNode::new("n1", "Gem Polish", "+5% XP from Admin Tasks.", SkillType::Minor, 100)
            .at(0.0, -150.0)
            .requires("source")
            .with_stats(StatDelta::default().resonance(5.0))
            .with_effect(SkillEffect::XpBoost { multiplier: 1.05, applies_to: TaskCategory::Neutral }),
        SkillNode::new("n2", "Flow Trigger", "Easier to enter deep work.", SkillType::Minor, 150)
            .at(0.0, -300.0)
            .requires("n1")
            .with_stats(StatDelta::default().focus(5.0))
            .with_effect(SkillEffect::ManaBoost { multiplier: 1.1 }),
        SkillNode::new("n_major_1", "The Silas Lock", "Unlocks Task Locking mechanism.", SkillType::Major, 400)
            .at(0.0, -500.0)
            .requires("n2")
            .with_effect(SkillEffect::UnlockFeature { feature_id: "lock_task".to_string() }),
        SkillNode::new("n_keystone", "The Monk's Vow", "Double XP/Focus. Social Tab Disabled until 2PM.", SkillType::Keystone, 1000)
            .at(0.0, -750.0)
            .requires("n_major_1")
            .with_trade_off("Cannot access Email/Socials until 14:00.")
            .with_effect(SkillEffect::GameRule { description: "Socials locked until 14:00".to_string() }),

        // East: order
        SkillNode::new("e1", "Pocket Dimension", "Task Log Capacity +1.", SkillType::Minor, 100)
            .at(150.0, 0.0)
            .requires("source")
            .with_stats(StatDelta::default().efficiency(5.0)),
        SkillNode::new("e2", "Ledger Keeper", "Reduced Mana cost for neutral tasks.", SkillType::Minor, 150)
            .at(300.0, 0.0)
            .requires("e1")
            .with_stats(StatDelta::default().efficiency(10.0)),
        SkillNode::new("e_major_1", "Echoes of Past", "Unlocks History View.", SkillType::Major, 400)
            .at(500.0, 0.0)
            .requires("e2")
            .with_effect(SkillEffect::UnlockFeature { feature_id: "history_view".to_string() }),
        SkillNode::new("e_keystone", "Delegator's Pact", "300% XP for Reviewing. 0% for Doing.", SkillType::Keystone, 1000)
            .at(750.0, 0.0)
            .requires("e_major_1")
            .with_trade_off("You gain 0 XP for completing neutral tasks yourself.")
            .with_effect(SkillEffect::GameRule { description: "Reviewing pays triple, doing pays nothing".to_string() }),

        // South: vitality
        SkillNode::new("s1", "Extended Breath", "Forgiveness Buffer +1.", SkillType::Minor, 100)
            .at(0.0, 150.0)
            .requires("source")
            .with_stats(StatDelta::default().efficiency(2.0)),
        SkillNode::new("s2", "Rooted Stance", "Energy drain reduced by 10%.", SkillType::Minor, 150)
            .at(0.0, 300.0)
            .requires("s1")
            .with_stats(StatDelta::default().efficiency(10.0))
            .with_effect(SkillEffect::EnergyBoost { multiplier: 1.1, branch: SkillBranch::Vitality }),

        // West: connection
        SkillNode::new("w1", "Open Ear", "Better rewards for social quests.", SkillType::Minor, 100)
            .at(-150.0, 0.0)
            .requires("source")
            .with_stats(StatDelta::default().quality(1.05))
            .with_effect(SkillEffect::EnergyBoost { multiplier: 1.1, branch: SkillBranch::Bridge }),
        SkillNode::new("w2", "Silver Tongue", "High charisma output.", SkillType::Minor, 150)
            .at(-300.0, 0.0)
            .requires("w1")
            .with_stats(StatDelta::default().quality(1.1)),
        SkillNode::new("w_major_1", "Merchant's Ear", "Custom notification sounds.", SkillType::Major, 400)
            .at(-500.0, 0.0)
            .requires("w2")
            .with_effect(SkillEffect::UnlockFeature { feature_id: "custom_sounds".to_string() }),

        // North-east hybrid: adrenaline engine
        SkillNode::new("ne1", "Rapid Fire", "Speed +10%.", SkillType::Minor, 250)
            .at(200.0, -200.0)
            .requires("n1")
            .with_stats(StatDelta::default().efficiency(5.0).focus(5.0)),
        SkillNode::new("ne_keystone", "Adrenaline Engine", "Activate Crunch Mode (Infinite Mana).", SkillType::Keystone, 1500)
            .at(400.0, -400.0)
            .requires("ne1")
            .with_trade_off("Next day locked in Recovery Mode (Max 3 Tasks).")
            .with_effect(SkillEffect::GameRule { description: "Crunch mode, recovery day after".to_string() }),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SkillId {
        SkillId::new(s)
    }

    #[test]
    fn test_lattice_shape() {
        let tree = SkillTree::lattice();
        assert_eq!(tree.nodes().len(), 16);
        assert!(tree.is_unlocked(&id("source")));
        // Every prerequisite names an existing node.
        for node in tree.nodes() {
            if let Some(p) = &node.prerequisite {
                assert!(tree.get(p).is_some(), "{} has dangling prerequisite", node.id);
            }
        }
    }

    #[test]
    fn test_unlock_spends_and_applies_stats() {
        let mut tree = SkillTree::lattice();
        let mut vibration = 200;
        let mut base = Stats::default();

        assert!(tree.unlock(&id("n1"), &mut vibration, &mut base));
        assert_eq!(vibration, 100);
        assert_eq!(base.resonance, 15.0);
        assert!(tree.is_unlocked(&id("n1")));
    }

    #[test]
    fn test_unlock_is_idempotent() {
        let mut tree = SkillTree::lattice();
        let mut vibration = 1000;
        let mut base = Stats::default();

        assert!(tree.unlock(&id("e1"), &mut vibration, &mut base));
        assert!(!tree.unlock(&id("e1"), &mut vibration, &mut base));
        assert_eq!(vibration, 900);
        assert_eq!(base.efficiency, 15.0);
    }

    #[test]
    fn test_unlock_refuses_unaffordable() {
        let mut tree = SkillTree::lattice();
        let mut vibration = 99;
        let mut base = Stats::default();

        assert!(!tree.unlock(&id("n1"), &mut vibration, &mut base));
        assert_eq!(vibration, 99);
        assert_eq!(base, Stats::default());
        assert!(!tree.is_unlocked(&id("n1")));
    }

    #[test]
    fn test_unlock_refuses_missing_prerequisite() {
        let mut tree = SkillTree::lattice();
        let mut vibration = 10_000;
        let mut base = Stats::default();

        assert!(!tree.unlock(&id("n2"), &mut vibration, &mut base));
        assert!(!tree.unlock(&id("nope"), &mut vibration, &mut base));
        assert_eq!(vibration, 10_000);
    }

    #[test]
    fn test_quality_unlocks_round() {
        let mut tree = SkillTree::lattice();
        let mut vibration = 1000;
        let mut base = Stats::default();

        tree.unlock(&id("w1"), &mut vibration, &mut base);
        tree.unlock(&id("w2"), &mut vibration, &mut base);
        assert_eq!(base.quality, 1.16);
    }

    #[test]
    fn test_reachability_follows_prerequisites() {
        let mut tree = SkillTree::lattice();
        assert!(tree.is_reachable(&id("n1")));
        assert!(!tree.is_reachable(&id("n2")));

        let mut vibration = 1000;
        let mut base = Stats::default();
        tree.unlock(&id("n1"), &mut vibration, &mut base);

        assert!(tree.is_reachable(&id("n2")));
        assert!(tree.is_reachable(&id("ne1")));
        assert!(!tree.is_reachable(&id("n_major_1")));
    }

    #[test]
    fn test_search_finds_hidden_nodes() {
        let tree = SkillTree::lattice();
        let found = tree.search("adrenaline");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id("ne_keystone"));
        assert!(!tree.visible().iter().any(|n| n.id == id("ne_keystone")));
    }

    #[test]
    fn test_feature_gate() {
        let mut tree = SkillTree::lattice();
        assert!(!tree.has_feature("history_view"));

        let mut vibration = 10_000;
        let mut base = Stats::default();
        for s in ["e1", "e2", "e_major_1"] {
            assert!(tree.unlock(&id(s), &mut vibration, &mut base));
        }
        assert!(tree.has_feature("history_view"));
        assert!(!tree.has_feature("lock_task"));
    }

    #[test]
    fn test_unlocked_effects_only_from_unlocked() {
        let mut tree = SkillTree::lattice();
        assert!(tree.unlocked_effects().is_empty());

        let mut vibration = 1000;
        let mut base = Stats::default();
        tree.unlock(&id("w1"), &mut vibration, &mut base);

        assert_eq!(
            tree.unlocked_effects(),
            vec![SkillEffect::EnergyBoost {
                multiplier: 1.1,
                branch: SkillBranch::Bridge
            }]
        );
    }
}
