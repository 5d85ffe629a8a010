//! Stat blocks and the effective-stat resolver.
//!
//! Focus, efficiency and resonance are additive percentage bonuses.
//! Quality is a multiplier and always composes by multiplication.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A complete stat block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Increases mana gain.
    pub focus: f64,
    /// Increases energy gain.
    pub efficiency: f64,
    /// Increases experience gain.
    pub resonance: f64,
    /// Multiplier applied to both secondary currencies.
    pub quality: f64,
}

impl Stats {
    pub const fn new(focus: f64, efficiency: f64, resonance: f64, quality: f64) -> Self {
        Self {
            focus,
            efficiency,
            resonance,
            quality,
        }
    }

    /// Merge a delta the way equipment does: sum the additive fields and
    /// multiply quality without rounding.
    pub fn with_item_delta(mut self, delta: &StatDelta) -> Self {
        self.add_additive(delta);
        if let Some(q) = delta.quality {
            self.quality *= q;
        }
        self
    }

    /// Merge a delta permanently into a base block (skill unlocks).
    ///
    /// Quality is rounded to two decimals after composing so repeated
    /// unlocks do not accumulate float drift.
    pub fn absorb(&mut self, delta: &StatDelta) {
        self.add_additive(delta);
        if let Some(q) = delta.quality {
            self.quality = compose_quality(self.quality, q);
        }
    }

    fn add_additive(&mut self, delta: &StatDelta) {
        self.focus += delta.focus.unwrap_or(0.0);
        self.efficiency += delta.efficiency.unwrap_or(0.0);
        self.resonance += delta.resonance.unwrap_or(0.0);
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new(10.0, 10.0, 10.0, 1.0)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "F{} E{} R{} Q{:.2}",
            self.focus, self.efficiency, self.resonance, self.quality
        )
    }
}

/// A partial stat block. Absent fields are identity (0 or 1.0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resonance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
}

impl StatDelta {
    pub fn focus(mut self, value: f64) -> Self {
        self.focus = Some(value);
        self
    }

    pub fn efficiency(mut self, value: f64) -> Self {
        self.efficiency = Some(value);
        self
    }

    pub fn resonance(mut self, value: f64) -> Self {
        self.resonance = Some(value);
        self
    }

    pub fn quality(mut self, value: f64) -> Self {
        self.quality = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.focus.is_none()
            && self.efficiency.is_none()
            && self.resonance.is_none()
            && self.quality.is_none()
    }
}

impl From<Stats> for StatDelta {
    fn from(stats: Stats) -> Self {
        Self {
            focus: Some(stats.focus),
            efficiency: Some(stats.efficiency),
            resonance: Some(stats.resonance),
            quality: Some(stats.quality),
        }
    }
}

/// Multiply two quality factors, rounded to two decimal places.
pub fn compose_quality(current: f64, factor: f64) -> f64 {
    (current * factor * 100.0).round() / 100.0
}

/// Resolve effective stats from a base block and every equipped item's delta.
///
/// Total: missing fields contribute nothing.
pub fn resolve_effective_stats<'a>(
    base: &Stats,
    equipped: impl IntoIterator<Item = &'a StatDelta>,
) -> Stats {
    equipped
        .into_iter()
        .fold(*base, |acc, delta| acc.with_item_delta(delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_without_equipment_is_base() {
        let base = Stats::new(10.0, 5.0, 3.0, 1.1);
        let resolved = resolve_effective_stats(&base, std::iter::empty());
        assert_eq!(resolved, base);
    }

    #[test]
    fn test_resolve_sums_additive_and_multiplies_quality() {
        let base = Stats::new(10.0, 10.0, 10.0, 1.0);
        let harp = StatDelta::default().focus(25.0).resonance(10.0);
        let charm = StatDelta::default().efficiency(5.0).quality(1.2);
        let lens = StatDelta::default().quality(1.5);

        let resolved = resolve_effective_stats(&base, [&harp, &charm, &lens]);

        assert_eq!(resolved.focus, 35.0);
        assert_eq!(resolved.efficiency, 15.0);
        assert_eq!(resolved.resonance, 20.0);
        assert!((resolved.quality - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_absorb_rounds_quality_to_two_decimals() {
        let mut base = Stats::new(10.0, 10.0, 10.0, 1.0);
        base.absorb(&StatDelta::default().quality(1.05));
        base.absorb(&StatDelta::default().quality(1.1));
        // 1.05 * 1.1 = 1.155 -> 1.16 (float product is 1.1550000000000002)
        assert_eq!(base.quality, 1.16);
    }

    #[test]
    fn test_absorb_additive_fields() {
        let mut base = Stats::default();
        base.absorb(&StatDelta::default().focus(5.0).efficiency(2.0));
        assert_eq!(base.focus, 15.0);
        assert_eq!(base.efficiency, 12.0);
        assert_eq!(base.resonance, 10.0);
        assert_eq!(base.quality, 1.0);
    }

    #[test]
    fn test_delta_deserializes_partial() {
        let delta: StatDelta = serde_json::from_str(r#"{"focus": 12}"#).unwrap();
        assert_eq!(delta.focus, Some(12.0));
        assert!(delta.quality.is_none());
        assert!(!delta.is_empty());
        assert!(StatDelta::default().is_empty());
    }
}
