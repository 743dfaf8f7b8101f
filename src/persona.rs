// Player build rules and the power-up meter.

use std::time::Duration;

use crate::scoring::StatTriple;

pub const MIN_STAT: i32 = 1;
pub const MAX_STAT: i32 = 10;
/// Points a player may spread across the three stats.
pub const MAX_STAT_POINTS: i32 = 24;

pub const MAX_BONUS_POINTS: i32 = 15;
/// One full sweep of the power-up meter.
pub const POWER_UP_CYCLE: Duration = Duration::from_millis(1000);

/// Check a player build against the persona rules.
pub fn validate_stats(stats: &StatTriple) -> Result<(), String> {
    for (name, value) in [
        ("logic", stats.logic),
        ("charisma", stats.charisma),
        ("risk", stats.risk),
    ] {
        if !(MIN_STAT..=MAX_STAT).contains(&value) {
            return Err(format!(
                "{name} must be between {MIN_STAT} and {MAX_STAT}, got {value}"
            ));
        }
    }
    if stats.total() > MAX_STAT_POINTS {
        return Err(format!(
            "stat total {} exceeds the {MAX_STAT_POINTS} point budget",
            stats.total()
        ));
    }
    Ok(())
}

pub fn validate_bonus(points: i32) -> Result<(), String> {
    if (0..=MAX_BONUS_POINTS).contains(&points) {
        Ok(())
    } else {
        Err(format!(
            "bonus_points must be between 0 and {MAX_BONUS_POINTS}, got {points}"
        ))
    }
}

/// Points earned by holding the power-up for `hold`.
///
/// The meter wraps every [`POWER_UP_CYCLE`], so only the position within the
/// current sweep counts.
pub fn bonus_from_hold(hold: Duration) -> i32 {
    let cycle_ms = POWER_UP_CYCLE.as_millis();
    let in_cycle = hold.as_millis() % cycle_ms;
    let points = in_cycle * MAX_BONUS_POINTS as u128 / cycle_ms;
    (points as i32).min(MAX_BONUS_POINTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_build() {
        assert!(validate_stats(&StatTriple::new(8, 8, 8)).is_ok());
        assert!(validate_stats(&StatTriple::new(10, 10, 4)).is_ok());
        assert!(validate_stats(&StatTriple::new(1, 1, 1)).is_ok());
    }

    #[test]
    fn test_stat_out_of_range() {
        let err = validate_stats(&StatTriple::new(0, 5, 5)).unwrap_err();
        assert!(err.contains("logic"));
        let err = validate_stats(&StatTriple::new(5, 11, 5)).unwrap_err();
        assert!(err.contains("charisma"));
    }

    #[test]
    fn test_over_budget() {
        let err = validate_stats(&StatTriple::new(10, 10, 5)).unwrap_err();
        assert!(err.contains("25"));
    }

    #[test]
    fn test_bonus_bounds() {
        assert!(validate_bonus(0).is_ok());
        assert!(validate_bonus(15).is_ok());
        assert!(validate_bonus(16).is_err());
        assert!(validate_bonus(-1).is_err());
    }

    #[test]
    fn test_bonus_from_hold() {
        assert_eq!(bonus_from_hold(Duration::ZERO), 0);
        assert_eq!(bonus_from_hold(Duration::from_millis(66)), 0);
        assert_eq!(bonus_from_hold(Duration::from_millis(67)), 1);
        assert_eq!(bonus_from_hold(Duration::from_millis(500)), 7);
        assert_eq!(bonus_from_hold(Duration::from_millis(999)), 14);
        // Meter wraps after a full sweep
        assert_eq!(bonus_from_hold(Duration::from_millis(1000)), 0);
        assert_eq!(bonus_from_hold(Duration::from_millis(1500)), 7);
    }
}
