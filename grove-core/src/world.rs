//! The grove: the single application-state aggregate.
//!
//! `GameWorld` owns the character, the quest log, the skill tree and the
//! inventory. Every synchronous game operation is a method here. Operations
//! that need the oracle return a request describing the call; its answer
//! comes back later as a [`Patch`](crate::patch::Patch).

use crate::config::GameRules;
use crate::inventory::{
    Equipment, EquipmentSlot, FusionReservation, Inventory, InventoryItem, ItemDescriptor,
};
use crate::oracle::MuseGift;
use crate::patch::{BindRequest, FusionRequest, LootRequest, VisualRequest};
use crate::progression::{self, CompletionLedger, MicroQuest, StreakCheck};
use crate::quests::{Loot, LootKind, QuestType, Task, TaskCategory, TaskDraft};
use crate::rewards::Rewards;
use crate::skills::{SkillEffect, SkillId, SkillTree};
use crate::stats::{resolve_effective_stats, StatDelta, Stats};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Unique identifier for tasks.
    TaskId
);
id_type!(
    /// Unique identifier for inventory items.
    ItemId
);
id_type!(
    /// Unique identifier for nebula ideas.
    IdeaId
);
id_type!(
    /// Unique identifier for burned worries.
    WorryId
);
id_type!(
    /// Unique identifier for in-flight fusions.
    FusionId
);

// ============================================================================
// Guidance
// ============================================================================

pub const WELCOME_GUIDANCE: &str = "Welcome to the Grove, seeker.";
pub const SHADOW_GUIDANCE: &str =
    "A quest has slipped into the shadows. Perform the Recovery Ritual to clear the air.";
pub const LOOT_PENDING_GUIDANCE: &str = "The cosmos is weaving a reward for your triumph...";
pub const FUSION_COMPLETE_GUIDANCE: &str = "Fusion Complete. A new artifact is born.";
pub const FUSION_FAILED_GUIDANCE: &str = "The Alchemical process failed. Mana restored.";
pub const BINDING_COMPLETE_GUIDANCE: &str =
    "Essence Bound. Your reality is now anchored to this relic.";
pub const TRUST_BUFF_GUIDANCE: &str = "Trust Buff active! Complete this quest for +10% bonus XP.";

// ============================================================================
// Character
// ============================================================================

/// Starting archetype; decides base stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Archetype {
    Weaver,
    Warden,
    Scholar,
}

impl Archetype {
    pub fn base_stats(self) -> Stats {
        match self {
            Archetype::Weaver => Stats::new(20.0, 5.0, 15.0, 1.0),
            Archetype::Warden => Stats::new(5.0, 20.0, 5.0, 1.0),
            Archetype::Scholar => Stats::new(10.0, 10.0, 10.0, 1.1),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Archetype::Weaver => "WEAVER",
            Archetype::Warden => "WARDEN",
            Archetype::Scholar => "SCHOLAR",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Feature toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub bionic_reading: bool,
    pub high_juice: bool,
    pub battle_mode: bool,
    pub sanctuary_mode: bool,
    /// Low-capacity economy: embers instead of rewards, streak frozen.
    pub twilight_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bionic_reading: true,
            high_juice: true,
            battle_mode: false,
            sanctuary_mode: false,
            twilight_mode: false,
        }
    }
}

/// A captured idea waiting in the nebula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub id: IdeaId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub color: String,
}

pub const IDEA_COLORS: [&str; 5] = ["purple", "blue", "emerald", "amber", "rose"];

/// A worry released into the transmutation fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worry {
    pub id: WorryId,
    pub text: String,
    pub burned_at: DateTime<Utc>,
}

/// Gallery entry for a defeated boss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedBossTask {
    pub id: TaskId,
    pub title: String,
    pub completed_at: DateTime<Utc>,
}

/// The player character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub archetype: Option<Archetype>,
    #[serde(default)]
    pub backstory: Option<String>,

    pub level: u32,
    /// Experience toward the next level.
    pub xp: i64,
    pub next_level_xp: i64,
    /// Spendable experience.
    pub vibration: i64,
    pub mana: i64,
    pub energy: i64,
    /// Twilight-mode currency.
    pub embers: i64,

    pub streak: u32,
    pub forgiveness_buffer: u32,
    pub last_active_date: Option<NaiveDate>,

    pub lore_unlocked: Vec<String>,
    pub equipment: Equipment,
    pub base_stats: Stats,
    pub settings: Settings,

    pub transmutation_count: u32,
    pub gold_rush_active: bool,

    pub last_potion_use: Option<DateTime<Utc>>,
    pub micro_quest: Option<MicroQuest>,

    pub nebula_ideas: Vec<Idea>,
    pub worry_log: Vec<Worry>,
    pub resilience_xp: i64,
    pub completed_boss_tasks: Vec<CompletedBossTask>,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            archetype: None,
            backstory: None,
            level: 1,
            xp: 0,
            next_level_xp: 100,
            vibration: 200,
            mana: 50,
            energy: 50,
            embers: 0,
            streak: 0,
            forgiveness_buffer: progression::INITIAL_FORGIVENESS_BUFFER,
            last_active_date: None,
            lore_unlocked: Vec::new(),
            equipment: Equipment::default(),
            base_stats: Stats::default(),
            settings: Settings::default(),
            transmutation_count: 0,
            gold_rush_active: false,
            last_potion_use: None,
            micro_quest: None,
            nebula_ideas: Vec::new(),
            worry_log: Vec::new(),
            resilience_xp: 0,
            completed_boss_tasks: Vec::new(),
        }
    }
}

impl Default for Character {
    fn default() -> Self {
        Self::new("Seeker")
    }
}

// ============================================================================
// Operation results
// ============================================================================

/// How loot was resolved for a completed task.
#[derive(Debug, Clone, PartialEq)]
pub enum LootOutcome {
    /// The task does not grant loot.
    None,
    /// Pre-assigned item loot was added to the inventory.
    Item(ItemId),
    /// Lore was appended to the lore log.
    Lore(String),
    /// Badges are announced, nothing is stored.
    Badge(Loot),
    /// No loot was attached; the oracle must generate it.
    Requested(LootRequest),
}

/// Result of completing a task.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub task_id: TaskId,
    pub rewards: Rewards,
    pub ledger: CompletionLedger,
    pub loot: LootOutcome,
    /// The oracle-compass trust buff applied to this completion.
    pub trusted: bool,
}

/// Result of resolving a fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionOutcome {
    Fused(ItemId),
    Refunded(i64),
    /// No reservation with that id exists.
    Unknown,
}

/// An energy-spending rest activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeisureActivity {
    pub name: &'static str,
    pub cost: i64,
}

pub const LEISURE_ACTIVITIES: [LeisureActivity; 3] = [
    LeisureActivity {
        name: "Short Rest",
        cost: 20,
    },
    LeisureActivity {
        name: "Entertainment Block",
        cost: 50,
    },
    LeisureActivity {
        name: "Deep Reset",
        cost: 120,
    },
];

// ============================================================================
// Game World
// ============================================================================

/// The complete game state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameWorld {
    pub character: Character,
    /// Newest first.
    pub tasks: Vec<Task>,
    pub skills: SkillTree,
    pub inventory: Inventory,
    /// Fusions whose mana is held until the oracle answers.
    #[serde(default)]
    pub pending_fusions: Vec<FusionReservation>,
    pub guidance: String,
    /// Task chosen through the oracle compass.
    #[serde(default)]
    pub trust_buff: Option<TaskId>,
    /// Most recent loot to announce.
    #[serde(default)]
    pub latest_loot: Option<Loot>,
    #[serde(default)]
    pub muse_gift: Option<MuseGift>,
    #[serde(default)]
    pub rules: GameRules,
}

impl GameWorld {
    /// A fresh grove with the seeded lattice and starting relics.
    pub fn new(character: Character) -> Self {
        Self {
            character,
            tasks: Vec::new(),
            skills: SkillTree::lattice(),
            inventory: Inventory::starting(),
            pending_fusions: Vec::new(),
            guidance: WELCOME_GUIDANCE.to_string(),
            trust_buff: None,
            latest_loot: None,
            muse_gift: None,
            rules: GameRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: GameRules) -> Self {
        self.rules = rules;
        self
    }

    /// Set identity and archetype-derived base stats.
    pub fn create_character(
        &mut self,
        name: impl Into<String>,
        archetype: Archetype,
        backstory: impl Into<String>,
    ) {
        let c = &mut self.character;
        c.name = name.into();
        c.archetype = Some(archetype);
        c.backstory = Some(backstory.into());
        c.base_stats = archetype.base_stats();
        tracing::info!(name = %c.name, %archetype, "character created");
    }

    pub fn set_guidance(&mut self, text: impl Into<String>) {
        self.guidance = text.into();
    }

    /// Base stats merged with every equipped item.
    pub fn effective_stats(&self) -> Stats {
        resolve_effective_stats(
            &self.character.base_stats,
            self.character.equipment.deltas(&self.inventory),
        )
    }

    pub fn unlocked_effects(&self) -> Vec<SkillEffect> {
        self.skills.unlocked_effects()
    }

    /// One-line status handed to the guidance spirit.
    pub fn status_summary(&self) -> String {
        let c = &self.character;
        format!(
            "Level {}, {} quests active. Streak: {}. Vibration: {}. Stats: F{} E{}",
            c.level,
            self.active_tasks().count(),
            c.streak,
            c.vibration,
            c.base_stats.focus,
            c.base_stats.efficiency,
        )
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Create a task priced against the current stats.
    pub fn add_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> TaskId {
        let task = Task::from_draft(
            draft,
            &self.unlocked_effects(),
            &self.effective_stats(),
            now,
        );
        let id = task.id;
        tracing::debug!(task = %id, title = %task.title, rewards = ?task.rewards, "task added");
        self.tasks.insert(0, task);
        id
    }

    pub fn add_tasks(
        &mut self,
        drafts: impl IntoIterator<Item = TaskDraft>,
        now: DateTime<Utc>,
    ) -> Vec<TaskId> {
        drafts.into_iter().map(|d| self.add_task(d, now)).collect()
    }

    pub fn delete_task(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        if self.trust_buff == Some(id) {
            self.trust_buff = None;
        }
        self.tasks.len() != before
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn active_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.is_active())
    }

    /// Tasks shown on the quest log. Twilight mode narrows this to the three
    /// easiest.
    pub fn visible_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.active_tasks().collect();
        if self.character.settings.twilight_mode {
            tasks.sort_by_key(|t| t.difficulty);
            tasks.truncate(3);
        }
        tasks
    }

    /// Raised while more than three neutral tasks are pending.
    pub fn admin_curse(&self) -> bool {
        self.active_tasks()
            .filter(|t| t.category == TaskCategory::Neutral)
            .count()
            > 3
    }

    /// Recast an active task as a shadow quest.
    pub fn fail_task(&mut self, id: TaskId) -> bool {
        let effects = self.unlocked_effects();
        let stats = self.effective_stats();
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        if !task.recast_as_shadow(&effects, &stats) {
            return false;
        }
        tracing::info!(task = %id, title = %task.title, "quest fell into shadow");
        self.guidance = SHADOW_GUIDANCE.to_string();
        true
    }

    /// Complete an active task: finalize its rewards, resolve loot and route
    /// the rewards through the progression engine.
    pub fn complete_task(
        &mut self,
        id: TaskId,
        in_flow: bool,
        now: DateTime<Utc>,
    ) -> Option<Completion> {
        let effects = self.unlocked_effects();
        let stats = self.effective_stats();
        let trusted = self.trust_buff == Some(id);
        let trust_multiplier = self.rules.trust_buff_multiplier;

        let task = self.tasks.iter_mut().find(|t| t.id == id && t.is_active())?;
        let mut rewards = task.rewards_for(&effects, &stats, in_flow);
        if trusted {
            rewards.experience = (rewards.experience as f64 * trust_multiplier).round() as i64;
        }
        task.finish(rewards, now);
        let task = task.clone();

        if trusted {
            self.trust_buff = None;
        }

        let loot = if task.quest_type.grants_loot() {
            self.resolve_loot(&task)
        } else {
            LootOutcome::None
        };

        if task.quest_type == QuestType::Boss {
            self.character.completed_boss_tasks.push(CompletedBossTask {
                id: task.id,
                title: task.title.clone(),
                completed_at: now,
            });
        }

        let ledger = progression::apply_completion(
            &mut self.character,
            &rewards,
            task.category,
            now.date_naive(),
        );
        tracing::info!(task = %id, ?rewards, ?ledger, "quest completed");

        Some(Completion {
            task_id: id,
            rewards,
            ledger,
            loot,
            trusted,
        })
    }

    fn resolve_loot(&mut self, task: &Task) -> LootOutcome {
        let Some(loot) = &task.loot else {
            self.guidance = LOOT_PENDING_GUIDANCE.to_string();
            return LootOutcome::Requested(LootRequest {
                task_id: task.id,
                title: task.title.clone(),
                category: task.category,
                difficulty: task.difficulty,
            });
        };

        self.latest_loot = Some(loot.clone());
        match loot.kind {
            LootKind::Item => match InventoryItem::from_loot(loot) {
                Some(item) => LootOutcome::Item(self.inventory.add(item)),
                None => LootOutcome::None,
            },
            LootKind::Lore => {
                let entry = loot.lore_entry();
                self.character.lore_unlocked.push(entry.clone());
                LootOutcome::Lore(entry)
            }
            LootKind::Badge => LootOutcome::Badge(loot.clone()),
        }
    }

    /// Add oracle-generated loot. A missing slot becomes ACCESSORY.
    pub fn add_generated_loot(&mut self, descriptor: ItemDescriptor) -> ItemId {
        self.latest_loot = Some(Loot::new(
            LootKind::Item,
            &descriptor.name,
            &descriptor.description,
        ));
        self.inventory
            .add(InventoryItem::from_descriptor(descriptor, EquipmentSlot::Accessory))
    }

    // ========================================================================
    // Skills
    // ========================================================================

    /// Unlock a skill with vibration. Refusals change nothing.
    pub fn unlock_skill(&mut self, id: &SkillId) -> bool {
        let unlocked = self.skills.unlock(
            id,
            &mut self.character.vibration,
            &mut self.character.base_stats,
        );
        if unlocked {
            tracing::info!(skill = %id, vibration = self.character.vibration, "skill unlocked");
        }
        unlocked
    }

    pub fn has_feature(&self, feature_id: &str) -> bool {
        self.skills.has_feature(feature_id)
    }

    // ========================================================================
    // Inventory & Equipment
    // ========================================================================

    /// Equip an owned item into its declared slot.
    pub fn equip(&mut self, item: ItemId) -> bool {
        match self.inventory.get(item) {
            Some(item) => self.character.equipment.equip(item),
            None => false,
        }
    }

    /// Mana currently held by in-flight fusions.
    pub fn reserved_mana(&self) -> i64 {
        self.pending_fusions.iter().map(|r| r.cost).sum()
    }

    fn is_reserved(&self, item: ItemId) -> bool {
        self.pending_fusions.iter().any(|r| r.holds(item))
    }

    /// Reserve mana and describe a fusion of two distinct owned items.
    /// Refused without enough mana or when either item is already part of
    /// a pending fusion.
    pub fn begin_fusion(
        &mut self,
        first: ItemId,
        second: ItemId,
        now: DateTime<Utc>,
    ) -> Option<FusionRequest> {
        let cost = self.rules.fusion_cost;
        if first == second || self.character.mana < cost {
            return None;
        }
        if self.is_reserved(first) || self.is_reserved(second) {
            return None;
        }
        let a = self.inventory.get(first)?.clone();
        let b = self.inventory.get(second)?.clone();

        self.character.mana -= cost;
        let reservation = FusionReservation::new(first, second, cost, now);
        let fusion = reservation.id;
        self.pending_fusions.push(reservation);
        self.guidance = format!(
            "Merging {} and {}... The Alchemist is working.",
            a.name, b.name
        );
        tracing::info!(%fusion, first = %a.name, second = %b.name, cost, "fusion started");

        Some(FusionRequest {
            fusion,
            first: a,
            second: b,
        })
    }

    /// Commit or release a fusion reservation.
    pub fn resolve_fusion(
        &mut self,
        fusion: FusionId,
        result: Option<ItemDescriptor>,
    ) -> FusionOutcome {
        let Some(pos) = self.pending_fusions.iter().position(|r| r.id == fusion) else {
            return FusionOutcome::Unknown;
        };
        let reservation = self.pending_fusions.remove(pos);

        match result {
            Some(descriptor) => {
                for input in reservation.inputs {
                    self.inventory.remove(input);
                    self.character.equipment.release(input);
                }
                self.latest_loot = Some(Loot::new(
                    LootKind::Item,
                    &descriptor.name,
                    &descriptor.description,
                ));
                let item = self
                    .inventory
                    .add(InventoryItem::from_descriptor(descriptor, EquipmentSlot::Relic));
                self.guidance = FUSION_COMPLETE_GUIDANCE.to_string();
                tracing::info!(%fusion, %item, "fusion complete");
                FusionOutcome::Fused(item)
            }
            None => {
                self.character.mana += reservation.cost;
                self.guidance = FUSION_FAILED_GUIDANCE.to_string();
                tracing::warn!(%fusion, refund = reservation.cost, "fusion failed, mana refunded");
                FusionOutcome::Refunded(reservation.cost)
            }
        }
    }

    /// Refund every pending fusion. Used when no oracle call can answer
    /// them anymore, such as after loading a save.
    pub fn release_stale_fusions(&mut self) -> i64 {
        let refund = self.reserved_mana();
        if refund > 0 {
            tracing::info!(count = self.pending_fusions.len(), refund, "released stale fusions");
        }
        self.character.mana += refund;
        self.pending_fusions.clear();
        refund
    }

    /// Describe the oracle calls needed to bind an item to a real object.
    pub fn begin_binding(&mut self, item: ItemId, real_name: &str) -> Option<BindRequest> {
        let item = self.inventory.get(item)?;
        let request = BindRequest {
            item_id: item.id,
            artifact_name: item.name.clone(),
            real_name: real_name.to_string(),
            visual_name: format!("{} merged with {}", item.name, real_name),
            description: item.description.clone(),
        };
        self.guidance = format!("Deeply analyzing {real_name}... Unweaving its technical essence.");
        Some(request)
    }

    /// Replace an item's stats with its bound stats.
    pub fn apply_binding(
        &mut self,
        item: ItemId,
        real_name: impl Into<String>,
        stats: Stats,
        image: Option<String>,
    ) -> bool {
        let Some(item) = self.inventory.get_mut(item) else {
            return false;
        };
        item.real_world_counterpart = Some(real_name.into());
        item.stats = Some(StatDelta::from(stats));
        if image.is_some() {
            item.image = image;
        }
        tracing::info!(item = %item.id, name = %item.name, "item bound");
        self.guidance = BINDING_COMPLETE_GUIDANCE.to_string();
        true
    }

    /// Visual requests for every item that still lacks one.
    pub fn visual_requests(&self) -> Vec<VisualRequest> {
        self.inventory
            .needing_visuals()
            .map(VisualRequest::for_item)
            .collect()
    }

    pub fn set_item_visual(&mut self, item: ItemId, image: String) -> bool {
        match self.inventory.get_mut(item) {
            Some(item) => {
                item.image = Some(image);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Progression
    // ========================================================================

    /// Daily streak check against `now`'s calendar date.
    pub fn check_streak(&mut self, now: DateTime<Utc>) -> StreakCheck {
        let reset = self.rules.forgiveness_buffer;
        progression::check_streak(&mut self.character, now.date_naive(), reset)
    }

    /// Spend energy on leisure. Refused when energy is short.
    pub fn spend_energy(&mut self, cost: i64) -> bool {
        if self.character.energy < cost {
            return false;
        }
        self.character.energy -= cost;
        true
    }

    pub fn take_leisure(&mut self, name: &str) -> bool {
        match LEISURE_ACTIVITIES.iter().find(|a| a.name == name) {
            Some(activity) => self.spend_energy(activity.cost),
            None => false,
        }
    }

    pub fn set_battle_mode(&mut self, active: bool) {
        self.character.settings.battle_mode = active;
    }

    pub fn toggle_sanctuary_mode(&mut self) -> bool {
        let s = &mut self.character.settings;
        s.sanctuary_mode = !s.sanctuary_mode;
        s.sanctuary_mode
    }

    pub fn toggle_twilight_mode(&mut self) -> bool {
        let s = &mut self.character.settings;
        s.twilight_mode = !s.twilight_mode;
        s.twilight_mode
    }

    pub fn set_bionic_reading(&mut self, on: bool) {
        self.character.settings.bionic_reading = on;
    }

    pub fn set_high_juice(&mut self, on: bool) {
        self.character.settings.high_juice = on;
    }

    // ========================================================================
    // Micro-quest
    // ========================================================================

    pub fn activate_potion(&mut self, task: impl Into<String>, now: DateTime<Utc>) -> bool {
        let task = task.into();
        let activated = progression::activate_micro_quest(
            &mut self.character,
            task.clone(),
            now,
            self.rules.potion_cooldown(),
            self.rules.micro_quest_window(),
        );
        if activated {
            self.guidance = format!(
                "Micro-Quest activated! Complete \"{task}\" in {} minutes for 3x XP!",
                self.rules.micro_quest_minutes
            );
        }
        activated
    }

    pub fn micro_quest_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.character.micro_quest.as_ref().map(|q| q.remaining(now))
    }

    pub fn complete_micro_quest(&mut self) -> Option<u32> {
        let bonus = self.rules.micro_quest_bonus;
        let levels = progression::complete_micro_quest(&mut self.character, bonus)?;
        self.guidance = format!("CRITICAL SUCCESS! +{bonus} Vibration from your micro-quest!");
        Some(levels)
    }

    pub fn cancel_micro_quest(&mut self) -> bool {
        progression::cancel_micro_quest(&mut self.character)
    }

    // ========================================================================
    // Ideas, worries, oracle compass
    // ========================================================================

    pub fn add_idea(&mut self, text: impl Into<String>, now: DateTime<Utc>) -> IdeaId {
        self.add_idea_with_rng(text, now, &mut rand::thread_rng())
    }

    pub fn add_idea_with_rng<R: Rng>(
        &mut self,
        text: impl Into<String>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> IdeaId {
        let color = IDEA_COLORS.choose(rng).copied().unwrap_or(IDEA_COLORS[0]);
        let idea = Idea {
            id: IdeaId::new(),
            text: text.into(),
            created_at: now,
            color: color.to_string(),
        };
        let id = idea.id;
        self.character.nebula_ideas.push(idea);
        id
    }

    /// Turn an idea into a small creative side quest.
    pub fn harvest_idea(&mut self, id: IdeaId, now: DateTime<Utc>) -> Option<TaskId> {
        let pos = self.character.nebula_ideas.iter().position(|i| i.id == id)?;
        let idea = self.character.nebula_ideas.remove(pos);
        let draft = TaskDraft::new(&idea.text)
            .with_description("Harvested from the Nebula of Ideas")
            .with_type(QuestType::Side)
            .with_category(TaskCategory::Creative)
            .with_difficulty(3)
            .with_urgency(3);
        let task = self.add_task(draft, now);
        let preview: String = idea.text.chars().take(30).collect();
        self.guidance = format!("Idea \"{preview}...\" harvested into a Quest!");
        Some(task)
    }

    /// Let an idea go for a small mana return.
    pub fn dissolve_idea(&mut self, id: IdeaId) -> bool {
        let before = self.character.nebula_ideas.len();
        self.character.nebula_ideas.retain(|i| i.id != id);
        if self.character.nebula_ideas.len() == before {
            return false;
        }
        self.character.mana += self.rules.idea_dissolve_refund;
        true
    }

    pub fn burn_worry(&mut self, text: impl Into<String>, now: DateTime<Utc>) -> WorryId {
        let worry = Worry {
            id: WorryId::new(),
            text: text.into(),
            burned_at: now,
        };
        let id = worry.id;
        self.character.worry_log.push(worry);
        let gain = self.rules.worry_resilience;
        self.character.resilience_xp += gain;
        self.guidance = format!("Worry transmuted. +{gain} Resilience XP. Let it go.");
        id
    }

    /// Pick a random active MAIN or BOSS quest.
    pub fn consult_compass(&self) -> Option<TaskId> {
        self.consult_compass_with_rng(&mut rand::thread_rng())
    }

    pub fn consult_compass_with_rng<R: Rng>(&self, rng: &mut R) -> Option<TaskId> {
        let candidates: Vec<TaskId> = self
            .active_tasks()
            .filter(|t| matches!(t.quest_type, QuestType::Main | QuestType::Boss))
            .map(|t| t.id)
            .collect();
        candidates.choose(rng).copied()
    }

    /// Trust the compass: the chosen quest pays bonus experience.
    pub fn accept_oracle_choice(&mut self, id: TaskId) -> bool {
        if !self.task(id).map(|t| t.is_active()).unwrap_or(false) {
            return false;
        }
        self.trust_buff = Some(id);
        self.guidance = TRUST_BUFF_GUIDANCE.to_string();
        true
    }

    // ========================================================================
    // Muse
    // ========================================================================

    /// The muse only offers gifts while energy is at or above the threshold.
    pub fn muse_awake(&self) -> bool {
        self.character.energy >= self.rules.muse_hibernation_threshold
    }
}

impl Default for GameWorld {
    fn default() -> Self {
        Self::new(Character::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Rarity;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn world() -> GameWorld {
        GameWorld::default()
    }

    #[test]
    fn test_initial_state() {
        let w = world();
        let c = &w.character;
        assert_eq!(c.name, "Seeker");
        assert_eq!((c.level, c.xp, c.next_level_xp), (1, 0, 100));
        assert_eq!((c.mana, c.energy, c.vibration), (50, 50, 200));
        assert_eq!((c.streak, c.forgiveness_buffer), (0, 2));
        assert!(c.settings.bionic_reading && c.settings.high_juice);
        assert!(!c.settings.twilight_mode);
        assert_eq!(w.inventory.len(), 3);
        assert_eq!(w.guidance, WELCOME_GUIDANCE);
    }

    #[test]
    fn test_create_character_sets_archetype_stats() {
        let mut w = world();
        w.create_character("Ivy", Archetype::Scholar, "You are Ivy.");
        assert_eq!(w.character.name, "Ivy");
        assert_eq!(w.character.base_stats, Stats::new(10.0, 10.0, 10.0, 1.1));
        assert_eq!(w.character.backstory.as_deref(), Some("You are Ivy."));
    }

    #[test]
    fn test_status_summary() {
        let mut w = world();
        w.add_task(TaskDraft::new("one"), now());
        assert_eq!(
            w.status_summary(),
            "Level 1, 1 quests active. Streak: 0. Vibration: 200. Stats: F10 E10"
        );
    }

    #[test]
    fn test_equipping_changes_effective_stats() {
        let mut w = world();
        let harp = w.inventory.find_by_name("Crystal Harp").unwrap().id;
        assert!(w.equip(harp));
        let stats = w.effective_stats();
        assert_eq!(stats.focus, 35.0);
        assert_eq!(stats.resonance, 20.0);
        assert!(!w.equip(ItemId::new()));
    }

    #[test]
    fn test_complete_side_task() {
        let mut w = world();
        let id = w.add_task(TaskDraft::new("Inbox"), now());

        let done = w.complete_task(id, false, now()).unwrap();

        assert_eq!(done.rewards.experience, 66);
        assert_eq!(done.loot, LootOutcome::None);
        assert_eq!(w.character.vibration, 266);
        assert_eq!(w.character.mana, 67);
        assert!(w.task(id).unwrap().is_completed);
        assert!(w.complete_task(id, false, now()).is_none());
    }

    #[test]
    fn test_main_task_without_loot_requests_generation() {
        let mut w = world();
        let id = w.add_task(
            TaskDraft::new("Launch").with_type(QuestType::Main).with_difficulty(8),
            now(),
        );
        let done = w.complete_task(id, true, now()).unwrap();
        match done.loot {
            LootOutcome::Requested(req) => {
                assert_eq!(req.task_id, id);
                assert_eq!(req.difficulty, 8);
            }
            other => panic!("expected loot request, got {other:?}"),
        }
        assert_eq!(w.guidance, LOOT_PENDING_GUIDANCE);
    }

    #[test]
    fn test_preassigned_loot_kinds() {
        let mut w = world();
        let lore = w.add_task(
            TaskDraft::new("Plan Q3")
                .with_type(QuestType::Main)
                .with_loot(Loot::new(LootKind::Lore, "The Scroll of Q3", "Plans")),
            now(),
        );
        let item = w.add_task(
            TaskDraft::new("Deadline")
                .with_type(QuestType::Boss)
                .with_loot(Loot::new(LootKind::Item, "Potion of Clarity", "Clear")),
            now(),
        );

        w.complete_task(lore, false, now());
        assert_eq!(w.character.lore_unlocked, vec!["The Scroll of Q3: Plans"]);

        let done = w.complete_task(item, false, now()).unwrap();
        let LootOutcome::Item(item_id) = done.loot else {
            panic!("expected item loot");
        };
        let granted = w.inventory.get(item_id).unwrap();
        assert_eq!(granted.rarity, Rarity::Rare);
        assert_eq!(granted.slot, Some(EquipmentSlot::Accessory));
        assert_eq!(w.character.completed_boss_tasks.len(), 1);
    }

    #[test]
    fn test_fail_task_guidance() {
        let mut w = world();
        let id = w.add_task(TaskDraft::new("Run"), now());
        assert!(w.fail_task(id));
        assert_eq!(w.guidance, SHADOW_GUIDANCE);
        assert!(!w.fail_task(id));
        assert!(!w.fail_task(TaskId::new()));
    }

    #[test]
    fn test_fusion_insufficient_mana_is_noop() {
        let mut w = world();
        w.character.mana = 40;
        let ids: Vec<ItemId> = w.inventory.items().iter().map(|i| i.id).collect();

        assert!(w.begin_fusion(ids[0], ids[1], now()).is_none());
        assert_eq!(w.character.mana, 40);
        assert_eq!(w.guidance, WELCOME_GUIDANCE);
    }

    #[test]
    fn test_fusion_failure_refunds() {
        let mut w = world();
        w.character.mana = 60;
        let ids: Vec<ItemId> = w.inventory.items().iter().map(|i| i.id).collect();

        let req = w.begin_fusion(ids[0], ids[1], now()).unwrap();
        assert_eq!(w.character.mana, 10);
        assert_eq!(w.reserved_mana(), 50);

        assert_eq!(w.resolve_fusion(req.fusion, None), FusionOutcome::Refunded(50));
        assert_eq!(w.character.mana, 60);
        assert_eq!(w.inventory.len(), 3);
        assert!(w.pending_fusions.is_empty());
    }

    #[test]
    fn test_fusion_success_replaces_inputs_and_unequips() {
        let mut w = world();
        let ids: Vec<ItemId> = w.inventory.items().iter().map(|i| i.id).collect();
        w.equip(ids[0]);

        let req = w.begin_fusion(ids[0], ids[1], now()).unwrap();
        // Reserved items cannot enter a second fusion.
        w.character.mana = 100;
        assert!(w.begin_fusion(ids[1], ids[2], now()).is_none());

        let descriptor = ItemDescriptor {
            name: "Harmonic Core".to_string(),
            description: "Both at once.".to_string(),
            rarity: Rarity::Relic,
            slot: None,
            stats: StatDelta::default().focus(30.0),
        };
        let FusionOutcome::Fused(new_id) = w.resolve_fusion(req.fusion, Some(descriptor)) else {
            panic!("fusion should succeed");
        };

        assert_eq!(w.inventory.len(), 2);
        assert!(!w.inventory.contains(ids[0]));
        assert!(!w.inventory.contains(ids[1]));
        assert_eq!(w.character.equipment.get(EquipmentSlot::Weapon), None);
        assert_eq!(w.inventory.get(new_id).unwrap().slot, Some(EquipmentSlot::Relic));
        assert_eq!(w.guidance, FUSION_COMPLETE_GUIDANCE);
        assert_eq!(w.resolve_fusion(req.fusion, None), FusionOutcome::Unknown);
    }

    #[test]
    fn test_fusion_rejects_same_item() {
        let mut w = world();
        let id = w.inventory.items()[0].id;
        assert!(w.begin_fusion(id, id, now()).is_none());
        assert_eq!(w.character.mana, 50);
    }

    #[test]
    fn test_release_stale_fusions() {
        let mut w = world();
        w.character.mana = 120;
        let ids: Vec<ItemId> = w.inventory.items().iter().map(|i| i.id).collect();
        w.begin_fusion(ids[0], ids[1], now()).unwrap();

        assert_eq!(w.release_stale_fusions(), 50);
        assert_eq!(w.character.mana, 120);
        assert_eq!(w.reserved_mana(), 0);
    }

    #[test]
    fn test_binding_replaces_stats() {
        let mut w = world();
        let id = w.inventory.items()[0].id;
        let req = w.begin_binding(id, "Noise-cancelling headphones").unwrap();
        assert_eq!(req.visual_name, "Crystal Harp merged with Noise-cancelling headphones");

        assert!(w.apply_binding(id, req.real_name, Stats::new(25.0, 5.0, 5.0, 1.1), None));
        let item = w.inventory.get(id).unwrap();
        assert_eq!(item.stats.unwrap().focus, Some(25.0));
        assert_eq!(item.real_world_counterpart.as_deref(), Some("Noise-cancelling headphones"));
        assert!(!item.needs_visual());
        assert_eq!(w.guidance, BINDING_COMPLETE_GUIDANCE);
    }

    #[test]
    fn test_spend_energy() {
        let mut w = world();
        assert!(!w.take_leisure("Deep Reset"));
        assert!(w.take_leisure("Short Rest"));
        assert_eq!(w.character.energy, 30);
        assert!(!w.spend_energy(31));
        assert_eq!(w.character.energy, 30);
    }

    #[test]
    fn test_ideas() {
        let mut w = world();
        let mut rng = StdRng::seed_from_u64(7);
        let a = w.add_idea_with_rng("A garden of small tools", now(), &mut rng);
        let b = w.add_idea_with_rng("Let it go", now(), &mut rng);
        assert!(IDEA_COLORS.contains(&w.character.nebula_ideas[0].color.as_str()));

        let task = w.harvest_idea(a, now()).unwrap();
        let task = w.task(task).unwrap();
        assert_eq!(task.category, TaskCategory::Creative);
        assert_eq!(task.description, "Harvested from the Nebula of Ideas");
        assert_eq!((task.difficulty, task.urgency), (3, 3));

        assert!(w.dissolve_idea(b));
        assert_eq!(w.character.mana, 55);
        assert!(!w.dissolve_idea(b));
        assert!(w.character.nebula_ideas.is_empty());
    }

    #[test]
    fn test_burn_worry() {
        let mut w = world();
        w.burn_worry("The deadline", now());
        assert_eq!(w.character.resilience_xp, 5);
        assert_eq!(w.character.worry_log.len(), 1);
    }

    #[test]
    fn test_compass_and_trust_buff() {
        let mut w = world();
        w.add_task(TaskDraft::new("side"), now());
        let main = w.add_task(TaskDraft::new("main").with_type(QuestType::Main), now());

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(w.consult_compass_with_rng(&mut rng), Some(main));

        let plain = w.task(main).unwrap().rewards_for(&[], &w.effective_stats(), false);
        assert!(w.accept_oracle_choice(main));
        let done = w.complete_task(main, false, now()).unwrap();
        assert!(done.trusted);
        assert_eq!(
            done.rewards.experience,
            (plain.experience as f64 * 1.1).round() as i64
        );
        assert!(w.trust_buff.is_none());
        assert_eq!(w.consult_compass_with_rng(&mut rng), None);
    }

    #[test]
    fn test_twilight_view_and_curse() {
        let mut w = world();
        for d in [7, 2, 9, 4, 1] {
            w.add_task(TaskDraft::new(format!("d{d}")).with_difficulty(d), now());
        }
        assert_eq!(w.visible_tasks().len(), 5);
        assert!(w.admin_curse());

        w.toggle_twilight_mode();
        let visible: Vec<u32> = w.visible_tasks().iter().map(|t| t.difficulty).collect();
        assert_eq!(visible, vec![1, 2, 4]);
    }

    #[test]
    fn test_micro_quest_through_world() {
        let mut w = world();
        let t = now();
        assert!(w.activate_potion("Reply to Ana", t));
        assert_eq!(w.micro_quest_remaining(t), Some(Duration::minutes(5)));
        assert!(!w.activate_potion("again", t));
        assert_eq!(w.complete_micro_quest(), Some(1));
        assert_eq!(w.character.vibration, 350);
    }

    #[test]
    fn test_skill_unlock_and_features() {
        let mut w = world();
        assert!(w.unlock_skill(&SkillId::new("n1")));
        assert_eq!(w.character.vibration, 100);
        assert!(!w.unlock_skill(&SkillId::new("n1")));
        assert!(!w.has_feature("lock_task"));
    }

    #[test]
    fn test_muse_hibernation() {
        let mut w = world();
        assert!(w.muse_awake());
        w.character.energy = 29;
        assert!(!w.muse_awake());
    }
}
