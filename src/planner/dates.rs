//! `resolveTaskDates` (`spec.md` §4.5): rewrites step tasks that mention a
//! relative time phrase to carry an absolute RFC-3339 timestamp, without
//! requiring a live LLM call for date math.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;

use crate::plan::PlanStep;

/// Rewrites every step's `task` in place, appending `(resolved: <RFC3339>)`
/// when a relative-time phrase is recognized.
pub fn resolve_task_dates(steps: &mut [PlanStep], now: DateTime<Utc>, tz: Tz) {
    for step in steps.iter_mut() {
        if let Some(resolved) = resolve_phrase(&step.task, now, tz) {
            step.task = format!("{} (resolved: {})", step.task, resolved.to_rfc3339());
        }
    }
}

fn resolve_phrase(task: &str, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    let lower = task.to_lowercase();
    let local_now = now.with_timezone(&tz);

    if lower.contains("tomorrow") {
        return Some(at_time_on(local_now.date_naive() + Duration::days(1), extract_time(&lower), tz));
    }
    if lower.contains("today") {
        return Some(at_time_on(local_now.date_naive(), extract_time(&lower), tz));
    }
    if let Some(caps) = hours_re().captures(&lower) {
        let n: i64 = caps[1].parse().ok()?;
        return Some(now + Duration::hours(n));
    }
    if let Some(caps) = minutes_re().captures(&lower) {
        let n: i64 = caps[1].parse().ok()?;
        return Some(now + Duration::minutes(n));
    }
    for (target, day_name) in WEEKDAYS {
        if lower.contains(day_name) {
            let days_ahead = days_until(local_now.weekday(), target);
            return Some(at_time_on(local_now.date_naive() + Duration::days(days_ahead), extract_time(&lower), tz));
        }
    }
    None
}

const WEEKDAYS: [(Weekday, &str); 7] = [
    (Weekday::Mon, "monday"),
    (Weekday::Tue, "tuesday"),
    (Weekday::Wed, "wednesday"),
    (Weekday::Thu, "thursday"),
    (Weekday::Fri, "friday"),
    (Weekday::Sat, "saturday"),
    (Weekday::Sun, "sunday"),
];

fn days_until(from: Weekday, to: Weekday) -> i64 {
    let diff = (to.num_days_from_monday() as i64) - (from.num_days_from_monday() as i64);
    if diff <= 0 {
        diff + 7
    } else {
        diff
    }
}

fn extract_time(lower: &str) -> Option<(u32, u32)> {
    let caps = time_re().captures(lower)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map(|m| m.as_str().parse().unwrap_or(0)).unwrap_or(0);
    if let Some(meridiem) = caps.get(3) {
        let is_pm = meridiem.as_str().eq_ignore_ascii_case("pm");
        if is_pm && hour != 12 {
            hour += 12;
        } else if !is_pm && hour == 12 {
            hour = 0;
        }
    }
    Some((hour, minute))
}

fn at_time_on(date: chrono::NaiveDate, time: Option<(u32, u32)>, tz: Tz) -> DateTime<Utc> {
    let (hour, minute) = time.unwrap_or((9, 0));
    let naive = date.and_hms_opt(hour, minute, 0).unwrap_or_else(|| date.and_hms_opt(9, 0, 0).unwrap());
    tz.from_local_datetime(&naive).single().unwrap_or_else(|| tz.from_utc_datetime(&naive)).with_timezone(&Utc)
}

fn time_re() -> Regex {
    Regex::new(r"(\d{1,2})(?::(\d{2}))?\s*(am|pm)?").unwrap()
}

fn hours_re() -> Regex {
    Regex::new(r"in (\d+)\s*hours?").unwrap()
}

fn minutes_re() -> Regex {
    Regex::new(r"in (\d+)\s*minutes?").unwrap()
}
