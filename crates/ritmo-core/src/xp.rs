//! Experience points and leveling.
//!
//! The level curve is a fixed cross-user contract: the XP needed to
//! advance from level `k` to `k+1` is `100 * 1.2^(k-1)` rounded to the
//! nearest ten (100, 120, 140, 170, 210, ...). [`level_info`] is a pure,
//! monotonic function of total XP. Award sizing (base, streak bonus,
//! multipliers) is configurable; the curve itself is not.

use serde::{Deserialize, Serialize};

use crate::storage::XpConfig;

/// Base XP for advancing out of level 1.
const LEVEL_BASE: f64 = 100.0;
/// Per-level growth factor.
const LEVEL_MULTIPLIER: f64 = 1.2;

/// Position within the level curve for a given XP total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub level: u32,
    /// XP accumulated inside the current level.
    pub xp_into_level: u64,
    /// XP required to advance to the next level.
    pub xp_for_next_level: u64,
    /// 0.0 .. 100.0 progress toward the next level.
    pub progress_pct: f64,
}

/// XP required to advance from `level` to `level + 1`.
pub fn threshold_for(level: u32) -> u64 {
    let raw = LEVEL_BASE * LEVEL_MULTIPLIER.powi(level as i32 - 1);
    ((raw / 10.0).round() * 10.0) as u64
}

/// Resolve a total-XP figure to its level position.
///
/// Accumulates thresholds until the next one would exceed `total_xp`.
/// Monotonic: more XP never yields a lower level.
pub fn level_info(total_xp: u64) -> LevelInfo {
    let mut level: u32 = 1;
    let mut remaining = total_xp;
    let mut threshold = threshold_for(level);
    while remaining >= threshold {
        remaining -= threshold;
        level += 1;
        threshold = threshold_for(level);
    }
    LevelInfo {
        level,
        xp_into_level: remaining,
        xp_for_next_level: threshold,
        progress_pct: (remaining as f64 / threshold as f64) * 100.0,
    }
}

/// Which award multiplier applied to a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardMultiplier {
    /// The user's first-ever completion of any habit (1.5x).
    FirstCompletion,
    /// Every active, eligible habit satisfied today (1.2x).
    PerfectDay,
    /// No multiplier.
    Standard,
}

impl AwardMultiplier {
    fn factor(self, config: &XpConfig) -> f64 {
        match self {
            AwardMultiplier::FirstCompletion => config.first_completion_multiplier,
            AwardMultiplier::PerfectDay => config.perfect_day_multiplier,
            AwardMultiplier::Standard => 1.0,
        }
    }
}

/// Itemized XP award for one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardBreakdown {
    pub base_xp: u32,
    pub streak_bonus: u32,
    pub multiplier: AwardMultiplier,
    pub multiplier_bonus: u32,
    pub total: u32,
}

/// Compute the award for a completion at the given streak length.
pub fn award(streak_length: u32, multiplier: AwardMultiplier, config: &XpConfig) -> AwardBreakdown {
    let base_xp = config.base_xp;
    let streak_bonus =
        (streak_length.saturating_mul(config.streak_bonus_per_day)).min(config.streak_bonus_cap);
    let subtotal = base_xp + streak_bonus;
    let multiplier_bonus = (f64::from(subtotal) * (multiplier.factor(config) - 1.0)).floor() as u32;
    AwardBreakdown {
        base_xp,
        streak_bonus,
        multiplier,
        multiplier_bonus,
        total: subtotal + multiplier_bonus,
    }
}

/// Reward attached to a level-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reward {
    /// Every fifth level carries a badge.
    Badge { level: u32 },
    /// Every tenth level grants a forgiveness token (ledger cap applies).
    ForgivenessToken,
}

/// A detected level increase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub from_level: u32,
    pub to_level: u32,
    /// Every level crossed, in order.
    pub levels_crossed: Vec<u32>,
    pub rewards: Vec<Reward>,
}

/// Compare level positions before and after an XP change.
pub fn detect_level_up(old_total: u64, new_total: u64) -> Option<LevelUp> {
    let from_level = level_info(old_total).level;
    let to_level = level_info(new_total).level;
    if to_level <= from_level {
        return None;
    }
    let levels_crossed: Vec<u32> = (from_level + 1..=to_level).collect();
    let mut rewards = Vec::new();
    for &level in &levels_crossed {
        if level % 5 == 0 {
            rewards.push(Reward::Badge { level });
        }
        if level % 10 == 0 {
            rewards.push(Reward::ForgivenessToken);
        }
    }
    Some(LevelUp {
        from_level,
        to_level,
        levels_crossed,
        rewards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_curve_first_levels() {
        assert_eq!(threshold_for(1), 100);
        assert_eq!(threshold_for(2), 120);
        assert_eq!(threshold_for(3), 140); // 144 rounds down
        assert_eq!(threshold_for(4), 170); // 172.8 rounds down
        assert_eq!(threshold_for(5), 210); // 207.36 rounds up
    }

    #[test]
    fn level_one_starts_at_zero() {
        let info = level_info(0);
        assert_eq!(info.level, 1);
        assert_eq!(info.xp_into_level, 0);
        assert_eq!(info.xp_for_next_level, 100);
        assert_eq!(info.progress_pct, 0.0);
    }

    #[test]
    fn level_boundaries() {
        assert_eq!(level_info(99).level, 1);
        assert_eq!(level_info(100).level, 2);
        assert_eq!(level_info(219).level, 2); // 100 + 120 = 220
        assert_eq!(level_info(220).level, 3);
    }

    #[test]
    fn xp_into_level_tracks_remainder() {
        let info = level_info(150);
        assert_eq!(info.level, 2);
        assert_eq!(info.xp_into_level, 50);
        assert_eq!(info.xp_for_next_level, 120);
        assert!((info.progress_pct - 41.666).abs() < 0.01);
    }

    #[test]
    fn level_is_monotonic_in_xp() {
        let mut last = 0;
        for xp in (0..50_000).step_by(37) {
            let level = level_info(xp).level;
            assert!(level >= last, "level dropped at {xp} xp");
            last = level;
        }
    }

    #[test]
    fn award_example_from_the_book() {
        // Streak 10, first-ever completion: 10 + 20 + floor(30 * 0.5) = 45.
        let breakdown = award(10, AwardMultiplier::FirstCompletion, &XpConfig::default());
        assert_eq!(breakdown.base_xp, 10);
        assert_eq!(breakdown.streak_bonus, 20);
        assert_eq!(breakdown.multiplier_bonus, 15);
        assert_eq!(breakdown.total, 45);
    }

    #[test]
    fn streak_bonus_caps_at_fifty() {
        let breakdown = award(40, AwardMultiplier::Standard, &XpConfig::default());
        assert_eq!(breakdown.streak_bonus, 50);
        assert_eq!(breakdown.total, 60);
    }

    #[test]
    fn perfect_day_bonus_floors() {
        // 10 + 6 = 16; floor(16 * 0.2) = 3.
        let breakdown = award(3, AwardMultiplier::PerfectDay, &XpConfig::default());
        assert_eq!(breakdown.streak_bonus, 6);
        assert_eq!(breakdown.multiplier_bonus, 3);
        assert_eq!(breakdown.total, 19);
    }

    #[test]
    fn no_level_up_within_level() {
        assert!(detect_level_up(0, 99).is_none());
        assert!(detect_level_up(50, 50).is_none());
    }

    #[test]
    fn level_up_lists_crossed_levels() {
        // 0 XP is level 1; 100+120+140 = 360 XP reaches level 4.
        let up = detect_level_up(0, 360).unwrap();
        assert_eq!(up.from_level, 1);
        assert_eq!(up.to_level, 4);
        assert_eq!(up.levels_crossed, vec![2, 3, 4]);
        assert!(up.rewards.is_empty());
    }

    #[test]
    fn badge_at_multiples_of_five() {
        // Cross from level 4 into level 5.
        let to_level_5: u64 = (1..5).map(threshold_for).sum();
        let up = detect_level_up(to_level_5 - 1, to_level_5).unwrap();
        assert_eq!(up.to_level, 5);
        assert_eq!(up.rewards, vec![Reward::Badge { level: 5 }]);
    }

    #[test]
    fn token_at_multiples_of_ten() {
        let to_level_10: u64 = (1..10).map(threshold_for).sum();
        let up = detect_level_up(to_level_10 - 1, to_level_10).unwrap();
        assert_eq!(up.to_level, 10);
        assert_eq!(
            up.rewards,
            vec![Reward::Badge { level: 10 }, Reward::ForgivenessToken]
        );
    }
}
