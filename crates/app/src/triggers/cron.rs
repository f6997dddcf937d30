//! `cron` — fired on a schedule.
//!
//! Expressions are accepted in several dialects and rewritten into the
//! seconds-first form of the `cron` crate before parsing. The trigger keeps
//! exactly one timer: a single task sleeps until the next fire time, fires,
//! then recomputes from the clock.

use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::task::AbortHandle;

use autostart_domain::error::ConfigError;
use autostart_domain::rule::CronFormat;
use autostart_domain::time::{self, Timestamp};

use super::{Trigger, TriggerCallback, firing_context, launch};

/// Delay before rescheduling after a fire time that was already due.
const MIN_RESCHEDULE_DELAY: Duration = Duration::from_secs(1);

/// Time zone a schedule is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CronZone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl CronZone {
    /// Next fire time strictly after `now`.
    #[must_use]
    pub fn next_after(&self, schedule: &Schedule, now: Timestamp) -> Option<Timestamp> {
        match self {
            Self::Named(tz) => next_in(schedule, now, tz),
            Self::Fixed(offset) => next_in(schedule, now, offset),
        }
    }
}

impl Default for CronZone {
    fn default() -> Self {
        Self::Named(Tz::UTC)
    }
}

fn next_in<Z: TimeZone>(schedule: &Schedule, now: Timestamp, zone: &Z) -> Option<Timestamp> {
    schedule
        .after(&now.with_timezone(zone))
        .next()
        .map(|at| at.with_timezone(&Utc))
}

/// Parse an IANA zone name or a UTC offset (`UTC+2`, `GMT-03:30`, `+05:45`).
#[must_use]
pub fn parse_time_zone(raw: &str) -> Option<CronZone> {
    let raw = raw.trim();
    if let Ok(tz) = raw.parse::<Tz>() {
        return Some(CronZone::Named(tz));
    }
    let offset = raw
        .strip_prefix("UTC")
        .or_else(|| raw.strip_prefix("GMT"))
        .unwrap_or(raw);
    let (sign, rest) = match offset.chars().next()? {
        '+' => (1, &offset[1..]),
        '-' => (-1, &offset[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if !(0..=18).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(CronZone::Fixed)
}

/// Rewrite `expression` from `format` into the `cron` crate's syntax.
///
/// # Errors
///
/// Returns a reason when the field count does not fit the dialect.
pub fn translate(expression: &str, format: CronFormat) -> Result<String, String> {
    let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();
    let count = fields.len();
    match format {
        CronFormat::Unix | CronFormat::Cron4j => {
            if count != 5 {
                return Err(format!("{format} expressions have 5 fields, got {count}"));
            }
            fields[4] = weekdays_sunday_zero(&fields[4]);
            fields.insert(0, "0".to_string());
        }
        CronFormat::Spring | CronFormat::Spring53 => {
            if count != 6 {
                return Err(format!("{format} expressions have 6 fields, got {count}"));
            }
            fields[5] = weekdays_sunday_zero(&fields[5]);
        }
        CronFormat::Quartz => {
            if !(6..=7).contains(&count) {
                return Err(format!("quartz expressions have 6 or 7 fields, got {count}"));
            }
        }
    }
    Ok(fields
        .iter()
        .map(|field| if field == "?" { "*" } else { field.as_str() })
        .collect::<Vec<_>>()
        .join(" "))
}

/// Renumber a day-of-week field from Sunday = 0 (or 7) to Sunday = 1.
fn weekdays_sunday_zero(field: &str) -> String {
    if field == "*" || field == "?" {
        return field.to_string();
    }
    let mut days: Vec<u32> = Vec::new();
    for part in field.split(',') {
        let Some(expanded) = expand_weekdays(part) else {
            // Names and anything we do not understand go through untouched.
            return field.to_string();
        };
        days.extend(expanded.into_iter().map(|day| day % 7 + 1));
    }
    days.sort_unstable();
    days.dedup();
    days.iter().map(u32::to_string).collect::<Vec<_>>().join(",")
}

fn expand_weekdays(part: &str) -> Option<Vec<u32>> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, step.parse::<usize>().ok().filter(|s| *s > 0)?),
        None => (part, 1),
    };
    let (start, end) = match range {
        "*" => (0, 6),
        _ => match range.split_once('-') {
            Some((a, b)) => (a.parse::<u32>().ok()?, b.parse::<u32>().ok()?),
            None => {
                let day = range.parse::<u32>().ok()?;
                (day, if step > 1 { 6 } else { day })
            }
        },
    };
    if start > 7 || end > 7 || start > end {
        return None;
    }
    Some((start..=end).step_by(step).collect())
}

/// Parsed form of a cron configuration.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    pub expression: String,
    pub format: CronFormat,
    pub zone_name: String,
    pub zone: CronZone,
    pub schedule: Schedule,
}

impl CronSchedule {
    /// Parse the configuration. Unknown formats and zones fall back to
    /// unix and UTC with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCron`] when the expression is invalid
    /// in its dialect.
    pub fn parse(
        expression: &str,
        format: Option<&str>,
        time_zone: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let format = match format.map(str::trim).filter(|f| !f.is_empty()) {
            None => CronFormat::default(),
            Some(raw) => CronFormat::from_str(raw).unwrap_or_else(|err| {
                tracing::warn!(%err, "falling back to unix cron format");
                CronFormat::Unix
            }),
        };
        let (zone_name, zone) = match time_zone.map(str::trim).filter(|z| !z.is_empty()) {
            None => ("UTC".to_string(), CronZone::default()),
            Some(raw) => match parse_time_zone(raw) {
                Some(zone) => (raw.to_string(), zone),
                None => {
                    tracing::warn!(time_zone = raw, "invalid time zone, using UTC");
                    ("UTC".to_string(), CronZone::default())
                }
            },
        };
        let invalid = |reason: String| ConfigError::InvalidCron {
            expression: expression.to_string(),
            reason,
        };
        let translated = translate(expression, format).map_err(invalid)?;
        let schedule = Schedule::from_str(&translated).map_err(|err| invalid(err.to_string()))?;
        Ok(Self {
            expression: expression.to_string(),
            format,
            zone_name,
            zone,
            schedule,
        })
    }

    #[must_use]
    pub fn next_after(&self, now: Timestamp) -> Option<Timestamp> {
        self.zone.next_after(&self.schedule, now)
    }
}

/// Fires its rule whenever the schedule comes due.
pub struct CronTrigger {
    expression: String,
    format: Option<String>,
    time_zone: Option<String>,
    timer: Mutex<Option<AbortHandle>>,
}

impl CronTrigger {
    #[must_use]
    pub fn new(expression: &str, format: Option<&str>, time_zone: Option<&str>) -> Self {
        Self {
            expression: expression.to_string(),
            format: format.map(str::to_string),
            time_zone: time_zone.map(str::to_string),
            timer: Mutex::new(None),
        }
    }
}

async fn run_schedule(rule: String, schedule: CronSchedule, callback: TriggerCallback) {
    // Never schedule at or before a time that already fired, even when
    // the timer wakes a little before the wall clock reaches it.
    let mut fired_up_to = time::now();
    loop {
        let now = time::now();
        let Some(next) = schedule.next_after(now.max(fired_up_to)) else {
            tracing::warn!(rule, expression = %schedule.expression, "cron schedule has no future fire time");
            return;
        };
        let delay = time::elapsed_between(now, next);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let ctx = firing_context("cron");
        ctx.set("cron.expression", schedule.expression.as_str());
        ctx.set("cron.format", schedule.format.as_str());
        ctx.set("cron.time_zone", schedule.zone_name.as_str());
        ctx.set("cron.scheduled_time", next.to_rfc3339());
        ctx.set("cron.actual_time", time::now().to_rfc3339());
        tracing::debug!(rule, scheduled = %next, "cron trigger fired");
        launch(&callback, ctx);
        fired_up_to = next;

        if delay.is_zero() {
            tokio::time::sleep(MIN_RESCHEDULE_DELAY).await;
        }
    }
}

impl Trigger for CronTrigger {
    fn kind(&self) -> &'static str {
        "cron"
    }

    fn activate(&self, rule: &str, callback: TriggerCallback) -> Result<(), ConfigError> {
        let schedule = CronSchedule::parse(
            &self.expression,
            self.format.as_deref(),
            self.time_zone.as_deref(),
        )?;
        let next: Option<DateTime<Utc>> = schedule.next_after(time::now());
        tracing::info!(
            rule,
            expression = %schedule.expression,
            format = %schedule.format,
            time_zone = %schedule.zone_name,
            next = ?next,
            "cron trigger scheduled"
        );
        let task = tokio::spawn(run_schedule(rule.to_string(), schedule, callback));
        if let Some(previous) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task.abort_handle())
        {
            previous.abort();
        }
        Ok(())
    }

    fn deactivate(&self) {
        if let Some(timer) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Datelike, Timelike};

    use super::*;
    use crate::triggers::test_support::recording;

    fn at(rfc3339: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    // ── Dialects ──

    #[test]
    fn should_prepend_seconds_to_unix_expressions() {
        assert_eq!(translate("30 4 * * *", CronFormat::Unix).unwrap(), "0 30 4 * * *");
    }

    #[test]
    fn should_renumber_sunday_based_weekdays() {
        assert_eq!(translate("0 4 * * 0", CronFormat::Unix).unwrap(), "0 0 4 * * 1");
        assert_eq!(translate("0 4 * * 7", CronFormat::Cron4j).unwrap(), "0 0 4 * * 1");
        assert_eq!(translate("0 4 * * 5-7", CronFormat::Unix).unwrap(), "0 0 4 * * 1,6,7");
        assert_eq!(translate("0 4 * * MON-FRI", CronFormat::Unix).unwrap(), "0 0 4 * * MON-FRI");
    }

    #[test]
    fn should_accept_question_mark_in_quartz() {
        assert_eq!(
            translate("0 15 10 ? * 2", CronFormat::Quartz).unwrap(),
            "0 15 10 * * 2"
        );
    }

    #[test]
    fn should_reject_wrong_field_count() {
        assert!(translate("* * * *", CronFormat::Unix).is_err());
        assert!(translate("0 * * * *", CronFormat::Spring).is_err());
        assert!(translate("* * * * *", CronFormat::Quartz).is_err());
    }

    #[test]
    fn should_fall_back_to_unix_for_unknown_format() {
        let schedule = CronSchedule::parse("0 4 * * *", Some("posix"), None).unwrap();
        assert_eq!(schedule.format, CronFormat::Unix);
    }

    #[test]
    fn should_reject_invalid_expression() {
        let err = CronSchedule::parse("61 * * * *", None, None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCron { .. }));
    }

    // ── Time zones ──

    #[test]
    fn should_parse_zone_names_and_offsets() {
        assert_eq!(
            parse_time_zone("Europe/Paris"),
            Some(CronZone::Named(chrono_tz::Europe::Paris))
        );
        assert_eq!(
            parse_time_zone("UTC+2"),
            Some(CronZone::Fixed(FixedOffset::east_opt(7200).unwrap()))
        );
        assert_eq!(
            parse_time_zone("-03:30"),
            Some(CronZone::Fixed(FixedOffset::west_opt(12_600).unwrap()))
        );
        assert_eq!(parse_time_zone("Mars/Olympus"), None);
    }

    #[test]
    fn should_fall_back_to_utc_for_invalid_zone() {
        let schedule = CronSchedule::parse("0 4 * * *", None, Some("Mars/Olympus")).unwrap();
        assert_eq!(schedule.zone, CronZone::default());
        assert_eq!(schedule.zone_name, "UTC");
    }

    #[test]
    fn should_compute_next_fire_time_in_zone() {
        let schedule = CronSchedule::parse("0 4 * * *", None, Some("UTC+2")).unwrap();
        let next = schedule.next_after(at("2026-03-10T12:00:00Z")).unwrap();
        assert_eq!(next, at("2026-03-11T02:00:00Z"));
    }

    #[test]
    fn should_honour_sunday_in_unix_weekdays() {
        let schedule = CronSchedule::parse("0 4 * * 0", None, None).unwrap();
        // 2026-03-10 is a Tuesday.
        let next = schedule.next_after(at("2026-03-10T12:00:00Z")).unwrap();
        assert_eq!(next.weekday(), chrono::Weekday::Sun);
        assert_eq!(next.hour(), 4);
    }

    // ── Lifecycle ──

    #[tokio::test]
    async fn should_fire_with_cron_variables() {
        let trigger = CronTrigger::new("* * * * * ?", Some("quartz"), None);
        let (callback, seen) = recording();
        trigger.activate("tick", callback).unwrap();

        let fired = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                if !seen.lock().unwrap().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        trigger.deactivate();
        assert!(fired.is_ok());

        let seen = seen.lock().unwrap();
        let ctx = &seen[0];
        assert_eq!(ctx.get_string("cron.expression").as_deref(), Some("* * * * * ?"));
        assert_eq!(ctx.get_string("cron.format").as_deref(), Some("quartz"));
        assert_eq!(ctx.get_string("cron.time_zone").as_deref(), Some("UTC"));
        assert!(ctx.contains("cron.scheduled_time"));
        assert!(ctx.contains("cron.actual_time"));
    }

    // Schedules follow the wall clock, so these run in real time.

    #[tokio::test]
    async fn should_fire_repeatedly_then_never_after_deactivate() {
        let trigger = CronTrigger::new("* * * * * ?", Some("quartz"), None);
        let (callback, seen) = recording();
        trigger.activate("every-second", callback).unwrap();

        tokio::time::sleep(Duration::from_millis(3_300)).await;
        let fired = seen.lock().unwrap().len();
        assert!((2..=4).contains(&fired), "fired {fired} times");

        trigger.deactivate();
        tokio::time::sleep(Duration::from_millis(2_200)).await;
        assert_eq!(seen.lock().unwrap().len(), fired);
        assert!(!trigger.is_active());
    }

    #[tokio::test]
    async fn should_keep_a_single_schedule_when_activated_twice() {
        let trigger = CronTrigger::new("* * * * * ?", Some("quartz"), None);
        let (callback, seen) = recording();
        trigger.activate("every-second", Arc::clone(&callback)).unwrap();
        trigger.activate("every-second", callback).unwrap();

        tokio::time::sleep(Duration::from_millis(2_300)).await;
        trigger.deactivate();
        let fired = seen.lock().unwrap().len();
        assert!((1..=3).contains(&fired), "fired {fired} times");
    }

    #[tokio::test]
    async fn should_refuse_activation_for_invalid_expression() {
        let trigger = CronTrigger::new("not a cron", None, None);
        let (callback, _) = recording();
        assert!(trigger.activate("broken", callback).is_err());
        assert!(!trigger.is_active());
    }

    #[tokio::test]
    async fn should_be_inactive_after_deactivate() {
        let trigger = CronTrigger::new("0 4 * * *", None, None);
        let (callback, _) = recording();
        trigger.activate("nightly", callback).unwrap();
        assert!(trigger.is_active());
        trigger.deactivate();
        trigger.deactivate();
        assert!(!trigger.is_active());
    }
}
