//! Next-run computation for an alert's wait policy.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc};

use crate::models::{SchedulePolicy, WaitPolicy};

/// How often a count-policy alert is polled, independent of delivery.
pub const COUNT_POLL_INTERVAL_SECS: i64 = 60 * 60;

/// Next instant the alert becomes eligible, or `None` when the policy has no
/// reachable slot within a week. Schedule slots are read in `offset`.
pub fn next_run(wait: &WaitPolicy, now: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
    match wait {
        WaitPolicy::Count(_) => Some(now + Duration::seconds(COUNT_POLL_INTERVAL_SECS)),
        WaitPolicy::Schedule(schedule) => next_slot(schedule, now, offset),
    }
}

fn next_slot(schedule: &SchedulePolicy, now: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let mut hours: Vec<u32> = schedule.hours.iter().copied().filter(|h| *h < 24).collect();
    hours.sort_unstable();
    hours.dedup();

    // Eight days: a slot that fired today recurs on the same weekday next week.
    let today = now.with_timezone(&offset).date_naive();
    for day in 0..=7 {
        let date = today + Duration::days(day);
        if !schedule.days.contains(&date.weekday()) {
            continue;
        }
        for hour in &hours {
            let Some(time) = NaiveTime::from_hms_opt(*hour, 0, 0) else {
                continue;
            };
            let Some(candidate) = offset.from_local_datetime(&date.and_time(time)).single() else {
                continue;
            };
            // Strictly after: a slot equal to `now` already fired.
            if candidate > now {
                return Some(candidate.with_timezone(&Utc));
            }
        }
    }
    None
}

/// Human description of the cadence, shown in email digests.
pub fn describe(wait: &WaitPolicy) -> String {
    match wait {
        WaitPolicy::Count(1) => "Sent as soon as a new story is found".to_string(),
        WaitPolicy::Count(n) => format!("Sent once {n} new stories are found"),
        WaitPolicy::Schedule(schedule) => {
            let days = schedule
                .days
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let mut hours: Vec<u32> = schedule.hours.clone();
            hours.sort_unstable();
            let hours = hours
                .iter()
                .map(|h| format!("{h:02}:00"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("Sent on {days} at {hours}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn schedule(days: Vec<Weekday>, hours: Vec<u32>) -> WaitPolicy {
        WaitPolicy::Schedule(SchedulePolicy { days, hours })
    }

    // 2026-10-19 is a Monday.

    #[test]
    fn count_policy_rearms_one_hour_out() {
        let now = at(2026, 10, 19, 8, 0);
        assert_eq!(next_run(&WaitPolicy::Count(5), now, utc()), Some(at(2026, 10, 19, 9, 0)));
    }

    #[test]
    fn monday_nine_before_slot_fires_same_day() {
        let wait = schedule(vec![Weekday::Mon], vec![9]);
        let now = at(2026, 10, 19, 8, 0);
        assert_eq!(next_run(&wait, now, utc()), Some(at(2026, 10, 19, 9, 0)));
    }

    #[test]
    fn monday_nine_exactly_on_slot_waits_a_week() {
        let wait = schedule(vec![Weekday::Mon], vec![9]);
        let now = at(2026, 10, 19, 9, 0);
        assert_eq!(next_run(&wait, now, utc()), Some(at(2026, 10, 26, 9, 0)));
    }

    #[test]
    fn single_weekday_schedule_is_never_parked() {
        // Each of the last slots of the week, hit exactly, re-arms seven days out.
        for (day, weekday) in (19..=25).zip([
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]) {
            let wait = schedule(vec![weekday], vec![23]);
            let now = at(2026, 10, day, 23, 0);
            assert_eq!(next_run(&wait, now, utc()), Some(now + Duration::days(7)));
        }
    }

    #[test]
    fn unsorted_hours_pick_earliest_remaining_slot() {
        let wait = schedule(vec![Weekday::Mon], vec![17, 9, 12]);
        let now = at(2026, 10, 19, 10, 30);
        assert_eq!(next_run(&wait, now, utc()), Some(at(2026, 10, 19, 12, 0)));
    }

    #[test]
    fn skips_to_next_listed_weekday() {
        let wait = schedule(vec![Weekday::Wed, Weekday::Fri], vec![7]);
        let now = at(2026, 10, 19, 8, 0);
        assert_eq!(next_run(&wait, now, utc()), Some(at(2026, 10, 21, 7, 0)));
    }

    #[test]
    fn empty_or_out_of_range_schedule_has_no_next_run() {
        let now = at(2026, 10, 19, 8, 0);
        assert_eq!(next_run(&schedule(vec![], vec![9]), now, utc()), None);
        assert_eq!(next_run(&schedule(vec![Weekday::Mon], vec![]), now, utc()), None);
        assert_eq!(next_run(&schedule(vec![Weekday::Mon], vec![24]), now, utc()), None);
    }

    #[test]
    fn slots_are_read_in_local_offset() {
        // 09:00 at UTC+2 is 07:00 UTC.
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let wait = schedule(vec![Weekday::Mon], vec![9]);
        let now = at(2026, 10, 19, 6, 0);
        assert_eq!(next_run(&wait, now, plus_two), Some(at(2026, 10, 19, 7, 0)));
    }

    #[test]
    fn describes_cadence() {
        assert_eq!(describe(&WaitPolicy::Count(3)), "Sent once 3 new stories are found");
        assert_eq!(
            describe(&schedule(vec![Weekday::Mon, Weekday::Thu], vec![17, 9])),
            "Sent on Mon, Thu at 09:00, 17:00"
        );
    }
}
