//! Fire-time computation for task schedules.
//!
//! Interval schedules fire every N units after the previous firing. Cron
//! schedules use standard 5-field expressions (minute hour day-of-month
//! month day-of-week); the `cron` crate expects a seconds field, so a `0`
//! is prepended before parsing.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use core_store::ScheduleKind;
use cron::Schedule;
use std::str::FromStr;

use crate::error::{Result, SyncError};

/// Check that a schedule definition is well-formed.
///
/// Called when a task is handed to the scheduler so a bad cron expression
/// fails at registration, not at the first firing.
pub fn validate_schedule(schedule: &ScheduleKind) -> Result<()> {
    match schedule {
        ScheduleKind::Disabled => Ok(()),
        ScheduleKind::Interval { value, .. } => {
            if *value == 0 {
                return Err(SyncError::InvalidSchedule(
                    "interval value must be > 0".to_string(),
                ));
            }
            Ok(())
        }
        ScheduleKind::Cron { expr } => {
            parse_cron(expr)?;
            Ok(())
        }
    }
}

/// Soonest time strictly after `after` at which the schedule fires.
///
/// Returns `None` for disabled schedules.
pub fn next_fire_time(
    schedule: &ScheduleKind,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    match schedule {
        ScheduleKind::Disabled => Ok(None),
        ScheduleKind::Interval { .. } => {
            // validate_schedule rejects zero intervals up front
            let secs = schedule.interval_secs().unwrap_or(0);
            if secs == 0 {
                return Err(SyncError::InvalidSchedule(
                    "interval value must be > 0".to_string(),
                ));
            }
            Ok(Some(after + ChronoDuration::seconds(secs as i64)))
        }
        ScheduleKind::Cron { expr } => {
            let parsed = parse_cron(expr)?;
            Ok(parsed.after(&after).next())
        }
    }
}

fn parse_cron(expr: &str) -> Result<Schedule> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(SyncError::InvalidSchedule(format!(
            "cron expression must have 5 fields, got {fields}: '{expr}'"
        )));
    }
    // Prepend the seconds field the cron crate requires.
    let with_seconds = format!("0 {expr}");
    Schedule::from_str(&with_seconds)
        .map_err(|e| SyncError::InvalidSchedule(format!("'{expr}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_store::IntervalUnit;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn disabled_never_fires() {
        assert_eq!(
            next_fire_time(&ScheduleKind::Disabled, Utc::now()).unwrap(),
            None
        );
    }

    #[test]
    fn interval_adds_duration() {
        let schedule = ScheduleKind::Interval {
            value: 15,
            unit: IntervalUnit::Minutes,
        };
        let base = at(2024, 6, 1, 12, 0, 0);
        assert_eq!(
            next_fire_time(&schedule, base).unwrap(),
            Some(at(2024, 6, 1, 12, 15, 0))
        );
    }

    #[test]
    fn cron_daily_at_three() {
        let schedule = ScheduleKind::Cron {
            expr: "0 3 * * *".to_string(),
        };
        let base = at(2024, 6, 1, 12, 0, 0);
        assert_eq!(
            next_fire_time(&schedule, base).unwrap(),
            Some(at(2024, 6, 2, 3, 0, 0))
        );
    }

    #[test]
    fn cron_every_half_hour() {
        let schedule = ScheduleKind::Cron {
            expr: "*/30 * * * *".to_string(),
        };
        let base = at(2024, 6, 1, 12, 10, 0);
        assert_eq!(
            next_fire_time(&schedule, base).unwrap(),
            Some(at(2024, 6, 1, 12, 30, 0))
        );
    }

    #[test]
    fn cron_fire_is_strictly_after() {
        let schedule = ScheduleKind::Cron {
            expr: "0 3 * * *".to_string(),
        };
        // Exactly at a fire time: the next one is tomorrow
        let base = at(2024, 6, 1, 3, 0, 0);
        assert_eq!(
            next_fire_time(&schedule, base).unwrap(),
            Some(at(2024, 6, 2, 3, 0, 0))
        );
    }

    #[test]
    fn rejects_malformed_schedules() {
        assert!(validate_schedule(&ScheduleKind::Cron {
            expr: "not a cron".to_string(),
        })
        .is_err());
        assert!(validate_schedule(&ScheduleKind::Cron {
            expr: "0 3 * *".to_string(),
        })
        .is_err());
        assert!(validate_schedule(&ScheduleKind::Interval {
            value: 0,
            unit: IntervalUnit::Hours,
        })
        .is_err());
        assert!(validate_schedule(&ScheduleKind::Disabled).is_ok());
    }
}
