//! Testing utilities for the grove.
//!
//! This module provides tools for integration testing:
//! - `ScriptedOracle` for deterministic testing without API calls
//! - `FixedClock` for controlling dates and cooldowns
//! - `TestHarness` for scripted progression scenarios
//! - Assertion helpers for verifying game state

use crate::config::GroveConfig;
use crate::inventory::{InventoryItem, ItemDescriptor};
use crate::oracle::{MuseGift, Oracle, OracleError, QuestDraft};
use crate::patch::Applied;
use crate::quests::{Task, TaskCategory, TaskDraft};
use crate::session::{Clock, GroveSession};
use crate::skills::SkillId;
use crate::stats::Stats;
use crate::world::{Archetype, Completion, GameWorld, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// Scripted oracle
// ============================================================================

#[derive(Debug, Default)]
struct Script {
    quests: VecDeque<Vec<QuestDraft>>,
    loot: VecDeque<ItemDescriptor>,
    fusions: VecDeque<ItemDescriptor>,
    bindings: VecDeque<Stats>,
    backstories: VecDeque<String>,
    visuals: VecDeque<String>,
    guidance: VecDeque<String>,
    gifts: VecDeque<MuseGift>,
    calls: Vec<&'static str>,
}

/// An oracle that answers from queued responses.
///
/// Each call pops the next scripted answer for its method. A call with
/// nothing scripted fails, so the collaborator falls back. Clones share the
/// same script, which lets a test keep a handle after giving the oracle to
/// a session.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOracle {
    script: Arc<Mutex<Script>>,
}

fn unscripted(method: &str) -> OracleError {
    OracleError::Malformed(format!("no scripted response for {method}"))
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        // A panicking test may poison the lock; the script itself is still usable.
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_quests(self, quests: Vec<QuestDraft>) -> Self {
        self.queue_quests(quests);
        self
    }

    pub fn with_guidance(self, text: impl Into<String>) -> Self {
        self.queue_guidance(text);
        self
    }

    pub fn with_backstory(self, text: impl Into<String>) -> Self {
        self.queue_backstory(text);
        self
    }

    pub fn queue_quests(&self, quests: Vec<QuestDraft>) {
        self.script().quests.push_back(quests);
    }

    pub fn queue_loot(&self, item: ItemDescriptor) {
        self.script().loot.push_back(item);
    }

    pub fn queue_fusion(&self, item: ItemDescriptor) {
        self.script().fusions.push_back(item);
    }

    pub fn queue_binding(&self, stats: Stats) {
        self.script().bindings.push_back(stats);
    }

    pub fn queue_backstory(&self, text: impl Into<String>) {
        self.script().backstories.push_back(text.into());
    }

    pub fn queue_visual(&self, image: impl Into<String>) {
        self.script().visuals.push_back(image.into());
    }

    pub fn queue_guidance(&self, text: impl Into<String>) {
        self.script().guidance.push_back(text.into());
    }

    pub fn queue_muse_gift(&self, gift: MuseGift) {
        self.script().gifts.push_back(gift);
    }

    /// Methods called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.script().calls.clone()
    }

    fn next<T>(
        &self,
        method: &'static str,
        queue: impl FnOnce(&mut Script) -> Option<T>,
    ) -> Result<T, OracleError> {
        let mut script = self.script();
        script.calls.push(method);
        queue(&mut script).ok_or_else(|| unscripted(method))
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn interpret_thought(&self, _thought: &str) -> Result<Vec<QuestDraft>, OracleError> {
        self.next("interpret_thought", |s| s.quests.pop_front())
    }

    async fn generate_loot(
        &self,
        _task_title: &str,
        _category: TaskCategory,
        _difficulty: u32,
    ) -> Result<ItemDescriptor, OracleError> {
        self.next("generate_loot", |s| s.loot.pop_front())
    }

    async fn fuse_items(
        &self,
        _first: &InventoryItem,
        _second: &InventoryItem,
    ) -> Result<ItemDescriptor, OracleError> {
        self.next("fuse_items", |s| s.fusions.pop_front())
    }

    async fn bind_real_world_item(
        &self,
        _artifact_name: &str,
        _real_world_name: &str,
    ) -> Result<Stats, OracleError> {
        self.next("bind_real_world_item", |s| s.bindings.pop_front())
    }

    async fn generate_backstory(
        &self,
        _name: &str,
        _archetype: Archetype,
    ) -> Result<String, OracleError> {
        self.next("generate_backstory", |s| s.backstories.pop_front())
    }

    async fn generate_item_visual(
        &self,
        _name: &str,
        _description: &str,
    ) -> Result<String, OracleError> {
        self.next("generate_item_visual", |s| s.visuals.pop_front())
    }

    async fn guidance(&self, _status: &str) -> Result<String, OracleError> {
        self.next("guidance", |s| s.guidance.pop_front())
    }

    async fn muse_gift(&self, _energy: i64) -> Result<MuseGift, OracleError> {
        self.next("muse_gift", |s| s.gifts.pop_front())
    }
}

// ============================================================================
// Fixed clock
// ============================================================================

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = *now + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Test harness
// ============================================================================

/// Test harness for running grove scenarios.
pub struct TestHarness {
    pub session: GroveSession,
    pub oracle: ScriptedOracle,
    pub clock: FixedClock,
}

impl TestHarness {
    /// A session for "Test Seeker" at 09:00 UTC on 1 May 2024.
    pub fn new() -> Self {
        Self::with_config(GroveConfig::new().with_character_name("Test Seeker"))
    }

    pub fn with_config(config: GroveConfig) -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let oracle = ScriptedOracle::new();
        let clock = FixedClock::new(start);
        let session = GroveSession::with_oracle(config, oracle.clone()).with_clock(clock.clone());
        Self {
            session,
            oracle,
            clock,
        }
    }

    /// Queue quests for the next captured thought.
    pub fn expect_quests(&mut self, quests: Vec<QuestDraft>) -> &mut Self {
        self.oracle.queue_quests(quests);
        self
    }

    pub fn expect_loot(&mut self, item: ItemDescriptor) -> &mut Self {
        self.oracle.queue_loot(item);
        self
    }

    pub fn expect_fusion(&mut self, item: ItemDescriptor) -> &mut Self {
        self.oracle.queue_fusion(item);
        self
    }

    pub fn expect_binding(&mut self, stats: Stats) -> &mut Self {
        self.oracle.queue_binding(stats);
        self
    }

    pub fn expect_visual(&mut self, image: impl Into<String>) -> &mut Self {
        self.oracle.queue_visual(image);
        self
    }

    pub fn expect_guidance(&mut self, text: impl Into<String>) -> &mut Self {
        self.oracle.queue_guidance(text);
        self
    }

    pub fn expect_muse_gift(&mut self, gift: MuseGift) -> &mut Self {
        self.oracle.queue_muse_gift(gift);
        self
    }

    /// Move the clock forward.
    pub fn advance(&mut self, by: Duration) -> &mut Self {
        self.clock.advance(by);
        self
    }

    pub fn advance_days(&mut self, days: i64) -> &mut Self {
        self.advance(Duration::days(days))
    }

    pub fn world(&self) -> &GameWorld {
        self.session.world()
    }

    pub fn world_mut(&mut self) -> &mut GameWorld {
        self.session.world_mut()
    }

    pub fn add_task(&mut self, draft: TaskDraft) -> TaskId {
        self.session.add_task(draft)
    }

    /// Capture a thought and wait for its quests.
    pub async fn capture(&mut self, thought: &str) -> Vec<TaskId> {
        self.session.capture_thought(thought);
        self.settle()
            .await
            .into_iter()
            .filter_map(|a| match a {
                Applied::TasksAdded(ids) => Some(ids),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Complete a task outside flow state.
    pub fn complete(&mut self, id: TaskId) -> Option<Completion> {
        self.session.complete_task(id, false)
    }

    pub async fn settle(&mut self) -> Vec<Applied> {
        self.session.settle().await
    }

    pub fn task_by_title(&self, title: &str) -> Option<&Task> {
        self.world().tasks.iter().find(|t| t.title == title)
    }

    pub fn item_by_name(&self, name: &str) -> Option<&InventoryItem> {
        self.world().inventory.find_by_name(name)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert level and experience toward the next level.
#[track_caller]
pub fn assert_level(harness: &TestHarness, level: u32, xp: i64) {
    let c = &harness.world().character;
    assert_eq!(
        (c.level, c.xp),
        (level, xp),
        "Expected level {level} with {xp} xp, got level {} with {} xp",
        c.level,
        c.xp
    );
}

#[track_caller]
pub fn assert_currencies(harness: &TestHarness, vibration: i64, mana: i64, energy: i64) {
    let c = &harness.world().character;
    assert_eq!(
        (c.vibration, c.mana, c.energy),
        (vibration, mana, energy),
        "Expected vibration/mana/energy {vibration}/{mana}/{energy}, got {}/{}/{}",
        c.vibration,
        c.mana,
        c.energy
    );
}

#[track_caller]
pub fn assert_streak(harness: &TestHarness, streak: u32, buffer: u32) {
    let c = &harness.world().character;
    assert_eq!(
        (c.streak, c.forgiveness_buffer),
        (streak, buffer),
        "Expected streak {streak} with buffer {buffer}, got {} with {}",
        c.streak,
        c.forgiveness_buffer
    );
}

#[track_caller]
pub fn assert_has_item(harness: &TestHarness, name: &str) {
    assert!(
        harness.item_by_name(name).is_some(),
        "Expected item '{name}' in inventory"
    );
}

#[track_caller]
pub fn assert_no_item(harness: &TestHarness, name: &str) {
    assert!(
        harness.item_by_name(name).is_none(),
        "Expected no item '{name}' in inventory"
    );
}

#[track_caller]
pub fn assert_task_completed(harness: &TestHarness, id: TaskId) {
    let task = harness.world().task(id);
    assert!(
        task.is_some_and(|t| t.is_completed),
        "Expected task {id} to be completed, got {task:?}"
    );
}

#[track_caller]
pub fn assert_guidance(harness: &TestHarness, text: &str) {
    assert_eq!(harness.world().guidance, text, "Unexpected guidance");
}

#[track_caller]
pub fn assert_skill_unlocked(harness: &TestHarness, id: &str) {
    assert!(
        harness.world().skills.is_unlocked(&SkillId::new(id)),
        "Expected skill '{id}' to be unlocked"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quests::QuestType;

    #[tokio::test]
    async fn test_scripted_oracle_pops_in_order() {
        let oracle = ScriptedOracle::new()
            .with_guidance("first")
            .with_guidance("second");
        assert_eq!(oracle.guidance("").await.unwrap(), "first");
        assert_eq!(oracle.guidance("").await.unwrap(), "second");
        assert!(oracle.guidance("").await.is_err());
        assert_eq!(oracle.calls(), vec!["guidance"; 3]);
    }

    #[test]
    fn test_fixed_clock_is_shared() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let other = clock.clone();
        clock.advance(Duration::hours(25));
        assert_eq!(other.now(), Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_harness_capture() {
        let mut h = TestHarness::new();
        h.expect_quests(vec![QuestDraft::new(
            "Water the ferns",
            QuestType::Side,
            TaskCategory::Physical,
        )]);

        let ids = h.capture("the plants look sad").await;
        assert_eq!(ids.len(), 1);
        assert!(h.task_by_title("Water the ferns").is_some());
        assert_level(&h, 1, 0);
        assert_currencies(&h, 200, 50, 50);
        assert_streak(&h, 0, 2);
    }
}
