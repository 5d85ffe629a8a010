//! The progression engine: leveling, daily streaks, completion routing and
//! the micro-quest timer.
//!
//! Every function here runs to completion without suspending and either
//! applies all of its effects or none of them.

use crate::quests::TaskCategory;
use crate::rewards::{xp_to_next_level, Rewards};
use crate::world::Character;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Buffer restored after a streak collapses.
pub const INITIAL_FORGIVENESS_BUFFER: u32 = 2;

/// Neutral completions per gold rush.
pub const GOLD_RUSH_INTERVAL: u32 = 3;

// ============================================================================
// Leveling
// ============================================================================

/// Clear as many level thresholds as the current xp allows. Returns the
/// number of levels gained.
pub fn level_up(character: &mut Character) -> u32 {
    let mut gained = 0;
    while character.xp >= character.next_level_xp {
        character.xp -= character.next_level_xp;
        character.level += 1;
        character.next_level_xp = xp_to_next_level(character.level);
        gained += 1;
    }
    if gained > 0 {
        tracing::info!(level = character.level, gained, "level up");
    }
    gained
}

/// Add experience to both the leveling pool and vibration, then level up.
pub fn grant_experience(character: &mut Character, amount: i64) -> u32 {
    character.xp += amount;
    character.vibration += amount;
    level_up(character)
}

// ============================================================================
// Streaks
// ============================================================================

/// Result of the daily streak check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakCheck {
    /// First ever check; the date was recorded.
    Started,
    SameDay,
    /// Twilight mode: the date advanced, nothing else changed.
    Frozen,
    /// Consecutive day, no penalty.
    Continued,
    /// Missed days were absorbed by the forgiveness buffer.
    BufferSpent { missed_days: i64, remaining: u32 },
    /// The buffer ran out; streak reset and buffer refilled.
    Collapsed { missed_days: i64 },
}

/// Run the first-interaction-of-the-day streak check.
pub fn check_streak(character: &mut Character, today: NaiveDate, reset_buffer: u32) -> StreakCheck {
    let Some(last) = character.last_active_date else {
        character.last_active_date = Some(today);
        return StreakCheck::Started;
    };
    if last == today {
        return StreakCheck::SameDay;
    }
    character.last_active_date = Some(today);

    if character.settings.twilight_mode {
        return StreakCheck::Frozen;
    }

    let missed_days = (today - last).num_days() - 1;
    if missed_days <= 0 {
        return StreakCheck::Continued;
    }

    let buffer = i64::from(character.forgiveness_buffer) - missed_days;
    if buffer < 0 {
        tracing::info!(missed_days, lost = character.streak, "streak collapsed");
        character.streak = 0;
        character.forgiveness_buffer = reset_buffer;
        StreakCheck::Collapsed { missed_days }
    } else {
        character.forgiveness_buffer = buffer as u32;
        StreakCheck::BufferSpent {
            missed_days,
            remaining: character.forgiveness_buffer,
        }
    }
}

// ============================================================================
// Completion routing
// ============================================================================

/// What applying a completion did to the character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionLedger {
    /// Embers earned instead of normal rewards (twilight mode only).
    pub embers: Option<i64>,
    pub levels_gained: u32,
    pub streak_extended: bool,
    /// This completion started a gold rush.
    pub gold_rush_started: bool,
}

/// Route a completed task's rewards into the character.
///
/// In twilight mode only embers accrue. Otherwise experience, mana and
/// energy are applied together, the streak grows on a new calendar day and
/// the gold-rush counter advances for neutral work.
pub fn apply_completion(
    character: &mut Character,
    rewards: &Rewards,
    category: TaskCategory,
    today: NaiveDate,
) -> CompletionLedger {
    let is_new_day = character.last_active_date != Some(today);

    if character.settings.twilight_mode {
        let embers = (rewards.experience as f64 / 10.0).round() as i64;
        character.embers += embers;
        character.last_active_date = Some(today);
        return CompletionLedger {
            embers: Some(embers),
            ..Default::default()
        };
    }

    let levels_gained = grant_experience(character, rewards.experience);
    character.mana += rewards.mana;
    character.energy += rewards.energy;
    if is_new_day {
        character.streak += 1;
    }
    character.last_active_date = Some(today);

    let mut gold_rush_started = false;
    if category == TaskCategory::Neutral {
        character.transmutation_count += 1;
        if character.transmutation_count % GOLD_RUSH_INTERVAL == 0 {
            gold_rush_started = !character.gold_rush_active;
            character.gold_rush_active = true;
        }
    } else {
        character.gold_rush_active = false;
    }

    CompletionLedger {
        embers: None,
        levels_gained,
        streak_extended: is_new_day,
        gold_rush_started,
    }
}

// ============================================================================
// Micro-quest
// ============================================================================

/// A timed five-minute burst of focus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroQuest {
    pub task: String,
    pub ends_at: DateTime<Utc>,
}

impl MicroQuest {
    /// Time left; zero once expired. Expiry never fails the quest.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.ends_at - now).max(Duration::zero())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at
    }
}

/// Whether the potion cooldown has elapsed.
pub fn potion_ready(character: &Character, now: DateTime<Utc>, cooldown: Duration) -> bool {
    character
        .last_potion_use
        .map(|last| now - last >= cooldown)
        .unwrap_or(true)
}

/// Drink the potion and start a micro-quest. Refused while the potion is
/// cooling down or another micro-quest is running.
pub fn activate_micro_quest(
    character: &mut Character,
    task: impl Into<String>,
    now: DateTime<Utc>,
    cooldown: Duration,
    window: Duration,
) -> bool {
    if character.micro_quest.is_some() || !potion_ready(character, now, cooldown) {
        return false;
    }
    character.last_potion_use = Some(now);
    character.micro_quest = Some(MicroQuest {
        task: task.into(),
        ends_at: now + window,
    });
    true
}

/// Finish the running micro-quest, granting `bonus` experience and
/// vibration. Returns levels gained, or `None` when nothing was running.
pub fn complete_micro_quest(character: &mut Character, bonus: i64) -> Option<u32> {
    character.micro_quest.take()?;
    Some(grant_experience(character, bonus))
}

/// Abandon the running micro-quest without reward.
pub fn cancel_micro_quest(character: &mut Character) -> bool {
    character.micro_quest.take().is_some()
}
