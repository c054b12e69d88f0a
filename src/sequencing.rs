/*!
Pedagogical sequencing rules for timetable generation.

This module centralizes the CM → TD → TP → TPE cycle logic:
- Time-of-day and day-of-week scoring per session type
- Minimum/optimal delays between dependent session types
- Next-session-type selection against the target ratios
- Sequence validation used to prune candidates during placement

All functions here are deterministic and side-effect-free. `ScoreCache`
memoizes the table lookups by argument tuple for hot placement loops.
*/

use chrono::{NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::SessionType;

/// Target share of each session type over a course's sessions
/// (CM:TD:TP:TPE = 2:3:3:2).
pub const TARGET_RATIOS: [(SessionType, f64); 4] = [
    (SessionType::Cm, 0.20),
    (SessionType::Td, 0.30),
    (SessionType::Tp, 0.30),
    (SessionType::Tpe, 0.20),
];

/// Days before the memory-decay cutoff used by the delay scoring.
pub const MAX_DELAY_DAYS: i64 = 7;

struct TimePreferences {
    preferred: &'static [(u32, u32)],
    acceptable: &'static [(u32, u32)],
    avoid: &'static [(u32, u32)],
}

// Lectures belong to the morning; labs and supervised work to the afternoon.
const CM_TIMES: TimePreferences = TimePreferences {
    preferred: &[(8, 0), (10, 15)],
    acceptable: &[],
    avoid: &[(14, 0), (16, 0)],
};
const TD_TIMES: TimePreferences = TimePreferences {
    preferred: &[(10, 15), (14, 0)],
    acceptable: &[(8, 0), (16, 0)],
    avoid: &[],
};
const TP_TIMES: TimePreferences = TimePreferences {
    preferred: &[(14, 0), (16, 0)],
    acceptable: &[(10, 15)],
    avoid: &[(8, 0)],
};
const TPE_TIMES: TimePreferences = TimePreferences {
    preferred: &[(14, 0), (16, 0)],
    acceptable: &[(10, 15)],
    avoid: &[(8, 0)],
};

fn time_preferences(session_type: SessionType) -> &'static TimePreferences {
    match session_type {
        SessionType::Cm => &CM_TIMES,
        SessionType::Td => &TD_TIMES,
        SessionType::Tp => &TP_TIMES,
        SessionType::Tpe => &TPE_TIMES,
    }
}

fn preferred_days(session_type: SessionType) -> [Weekday; 2] {
    match session_type {
        SessionType::Cm => [Weekday::Mon, Weekday::Tue],
        SessionType::Td => [Weekday::Tue, Weekday::Wed],
        SessionType::Tp => [Weekday::Wed, Weekday::Thu],
        SessionType::Tpe => [Weekday::Thu, Weekday::Fri],
    }
}

/// Score a start time for a session type: preferred = 100, acceptable = 60,
/// avoided = 10 (strong penalty), anything else = 40.
pub fn time_score(session_type: SessionType, start: NaiveTime) -> u32 {
    let hm = (start.hour(), start.minute());
    let prefs = time_preferences(session_type);

    if prefs.preferred.contains(&hm) {
        100
    } else if prefs.acceptable.contains(&hm) {
        60
    } else if prefs.avoid.contains(&hm) {
        10
    } else {
        40
    }
}

/// Score a weekday for a session type. Friday lectures are penalized hard.
pub fn day_score(session_type: SessionType, weekday: Weekday) -> u32 {
    if preferred_days(session_type).contains(&weekday) {
        return 100;
    }
    if session_type == SessionType::Cm && weekday == Weekday::Fri {
        return 20;
    }
    50
}

/// Optimal `(min, max)` delay in days between two dependent session types.
pub fn optimal_delay(from: SessionType, to: SessionType) -> Option<(i64, i64)> {
    match (from, to) {
        (SessionType::Cm, SessionType::Td) => Some((1, 2)),
        (SessionType::Cm, SessionType::Tp) => Some((2, 4)),
        (SessionType::Td, SessionType::Tp) => Some((1, 2)),
        (SessionType::Cm, SessionType::Tpe) => Some((3, MAX_DELAY_DAYS)),
        _ => None,
    }
}

/// Summary of a placed session, kept per course during a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub date: NaiveDate,
    pub session_type: SessionType,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl SessionRecord {
    pub fn duration_hours(&self) -> f64 {
        crate::types::duration_hours(self.start_time, self.end_time)
    }
}

/// Minimum-delay violation raised when a candidate lands too early after a
/// dependent session. Soft-blocking: the candidate is skipped, not the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceViolation {
    pub from: SessionType,
    pub to: SessionType,
    pub days: i64,
    pub min_days: i64,
}

impl fmt::Display for SequenceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} day(s) after {} (minimum {})",
            self.to, self.days, self.from, self.min_days
        )
    }
}

/// Validate the minimum delays for a proposed session against the course
/// history. Only minimums block; the optimal windows are handled by scoring.
pub fn validate_sequence(
    history: &[SessionRecord],
    proposed_date: NaiveDate,
    proposed_type: SessionType,
) -> Result<(), SequenceViolation> {
    // No constraint on the very first session
    if history.is_empty() {
        return Ok(());
    }

    for record in history {
        let days = (proposed_date - record.date).num_days();

        let min_days = match (record.session_type, proposed_type) {
            (SessionType::Cm, SessionType::Td) => 1,
            (SessionType::Cm, SessionType::Tp) => 2,
            (SessionType::Td, SessionType::Tp) => 1,
            (SessionType::Cm, SessionType::Tpe) => 3,
            _ => continue,
        };

        if days < min_days {
            return Err(SequenceViolation {
                from: record.session_type,
                to: proposed_type,
                days,
                min_days,
            });
        }
    }

    Ok(())
}

/// Pick the next session type for a course following the pedagogical cycle.
///
/// Cascade: first session is always CM; then at least one TD, then at least
/// one TP; afterwards, the type furthest below its target ratio.
pub fn next_session_type(history: &[SessionRecord]) -> SessionType {
    next_session_type_among(history, &SessionType::all())
        .expect("all session types allowed, one is always selectable")
}

/// Cascade restricted to the session types a course actually requires.
/// Returns `None` when `allowed` is empty (the course's remaining volume
/// fits no type).
pub fn next_session_type_among(
    history: &[SessionRecord],
    allowed: &[SessionType],
) -> Option<SessionType> {
    if allowed.is_empty() {
        return None;
    }

    let mut counts: HashMap<SessionType, usize> = HashMap::new();
    for record in history {
        *counts.entry(record.session_type).or_default() += 1;
    }
    let total = history.len() as f64;
    let count = |t: SessionType| counts.get(&t).copied().unwrap_or(0);
    let permits = |t: SessionType| allowed.contains(&t);

    if permits(SessionType::Cm) && count(SessionType::Cm) == 0 {
        return Some(SessionType::Cm);
    }
    if history.is_empty() {
        // A course with no lecture requirement starts at its first type in
        // cycle order
        return SessionType::all().into_iter().find(|t| permits(*t));
    }
    if permits(SessionType::Td) && count(SessionType::Cm) > 0 && count(SessionType::Td) == 0 {
        return Some(SessionType::Td);
    }
    if permits(SessionType::Tp) && count(SessionType::Td) > 0 && count(SessionType::Tp) == 0 {
        return Some(SessionType::Tp);
    }

    // Most-lagging type relative to the 2:3:3:2 targets; ties resolve in
    // cycle order CM, TD, TP, TPE.
    let mut best = None;
    let mut max_deficit = f64::NEG_INFINITY;
    for (session_type, target) in TARGET_RATIOS {
        if !permits(session_type) {
            continue;
        }
        let share = count(session_type) as f64 / total;
        let deficit = target - share;
        if deficit > max_deficit {
            max_deficit = deficit;
            best = Some(session_type);
        }
    }
    best.or_else(|| allowed.first().copied())
}

/// Score the delay between a proposed session and its nearest prior
/// dependency: 100 inside the optimal window, decaying by 10 per day outside,
/// floored at 30 when late and at 0 when (exceptionally) early.
pub fn delay_score(
    history: &[SessionRecord],
    proposed_date: NaiveDate,
    proposed_type: SessionType,
) -> u32 {
    if history.is_empty() {
        return 100;
    }

    // TD/TP/TPE hang off the most recent CM; a TP without one falls back to
    // the most recent TD.
    let mut relevant = None;
    if matches!(proposed_type, SessionType::Td | SessionType::Tp | SessionType::Tpe) {
        relevant = history.iter().rev().find(|r| r.session_type == SessionType::Cm);
    }
    if proposed_type == SessionType::Tp && relevant.is_none() {
        relevant = history.iter().rev().find(|r| r.session_type == SessionType::Td);
    }

    let Some(previous) = relevant else {
        return 100;
    };
    let Some((min_delay, max_delay)) = optimal_delay(previous.session_type, proposed_type) else {
        return 100;
    };

    let days = (proposed_date - previous.date).num_days();
    if (min_delay..=max_delay).contains(&days) {
        100
    } else if days < min_delay {
        // Too early; normally pruned by validate_sequence upstream
        (50 - (min_delay - days) * 10).max(0) as u32
    } else {
        let excess = days - max_delay;
        (100 - excess * 10).max(30) as u32
    }
}

/// Global placement priority for one candidate: `time + day + delay`,
/// each component in 0..=100.
pub fn session_priority(
    session_type: SessionType,
    start: NaiveTime,
    weekday: Weekday,
    history: &[SessionRecord],
    proposed_date: NaiveDate,
) -> u32 {
    let time = time_score(session_type, start);
    let day = day_score(session_type, weekday);
    let delay = delay_score(history, proposed_date, session_type);

    let total = time + day + delay;
    log::debug!(
        "priority {session_type} {weekday:?} {start}: time={time} day={day} delay={delay} total={total}"
    );
    total
}

/// Run-local memo cache for the pure score tables.
#[derive(Debug, Default)]
pub struct ScoreCache {
    time: HashMap<(SessionType, NaiveTime), u32>,
    day: HashMap<(SessionType, Weekday), u32>,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_score(&mut self, session_type: SessionType, start: NaiveTime) -> u32 {
        *self.time.entry((session_type, start)).or_insert_with(|| time_score(session_type, start))
    }

    pub fn day_score(&mut self, session_type: SessionType, weekday: Weekday) -> u32 {
        *self.day.entry((session_type, weekday)).or_insert_with(|| day_score(session_type, weekday))
    }

    /// Cached variant of [`session_priority`].
    pub fn session_priority(
        &mut self,
        session_type: SessionType,
        start: NaiveTime,
        weekday: Weekday,
        history: &[SessionRecord],
        proposed_date: NaiveDate,
    ) -> u32 {
        self.time_score(session_type, start)
            + self.day_score(session_type, weekday)
            + delay_score(history, proposed_date, session_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, day).unwrap()
    }

    fn record(day: u32, session_type: SessionType) -> SessionRecord {
        SessionRecord { date: d(day), session_type, start_time: t(8, 0), end_time: t(10, 0) }
    }

    #[test]
    fn test_time_score_tables() {
        // CM: morning preferred, afternoon strongly penalized
        assert_eq!(time_score(SessionType::Cm, t(8, 0)), 100);
        assert_eq!(time_score(SessionType::Cm, t(10, 15)), 100);
        assert_eq!(time_score(SessionType::Cm, t(14, 0)), 10);
        assert_eq!(time_score(SessionType::Cm, t(16, 0)), 10);
        assert_eq!(time_score(SessionType::Cm, t(9, 0)), 40);

        // TD: late morning / early afternoon
        assert_eq!(time_score(SessionType::Td, t(10, 15)), 100);
        assert_eq!(time_score(SessionType::Td, t(14, 0)), 100);
        assert_eq!(time_score(SessionType::Td, t(8, 0)), 60);
        assert_eq!(time_score(SessionType::Td, t(16, 0)), 60);

        // TP/TPE: afternoon preferred, early morning avoided
        for st in [SessionType::Tp, SessionType::Tpe] {
            assert_eq!(time_score(st, t(14, 0)), 100);
            assert_eq!(time_score(st, t(16, 0)), 100);
            assert_eq!(time_score(st, t(10, 15)), 60);
            assert_eq!(time_score(st, t(8, 0)), 10);
        }
    }

    #[test]
    fn test_day_score_tables() {
        assert_eq!(day_score(SessionType::Cm, Weekday::Mon), 100);
        assert_eq!(day_score(SessionType::Cm, Weekday::Tue), 100);
        assert_eq!(day_score(SessionType::Cm, Weekday::Fri), 20);
        assert_eq!(day_score(SessionType::Cm, Weekday::Wed), 50);

        assert_eq!(day_score(SessionType::Td, Weekday::Wed), 100);
        assert_eq!(day_score(SessionType::Tp, Weekday::Thu), 100);
        assert_eq!(day_score(SessionType::Tpe, Weekday::Fri), 100);
        assert_eq!(day_score(SessionType::Tpe, Weekday::Mon), 50);
    }

    #[test]
    fn test_next_session_type_cascade() {
        assert_eq!(next_session_type(&[]), SessionType::Cm);

        let after_cm = vec![record(1, SessionType::Cm)];
        assert_eq!(next_session_type(&after_cm), SessionType::Td);

        let after_td = vec![record(1, SessionType::Cm), record(2, SessionType::Td)];
        assert_eq!(next_session_type(&after_td), SessionType::Tp);
    }

    #[test]
    fn test_next_session_type_ratio_catchup() {
        // One of each: shares (.25, .25, .25, .25) vs targets (.20, .30, .30, .20)
        // -> TD and TP are tied for the biggest deficit; TD wins in cycle order.
        let history = vec![
            record(1, SessionType::Cm),
            record(2, SessionType::Td),
            record(4, SessionType::Tp),
            record(8, SessionType::Tpe),
        ];
        assert_eq!(next_session_type(&history), SessionType::Td);

        // Lots of TD, no deficit there: TP is furthest behind.
        let history = vec![
            record(1, SessionType::Cm),
            record(2, SessionType::Td),
            record(3, SessionType::Td),
            record(4, SessionType::Td),
            record(5, SessionType::Tp),
            record(8, SessionType::Tpe),
        ];
        assert_eq!(next_session_type(&history), SessionType::Tp);
    }

    #[test]
    fn test_next_session_type_among_restrictions() {
        // Lecture-and-tutorial-only course never proposes TP/TPE
        let allowed = [SessionType::Cm, SessionType::Td];
        assert_eq!(next_session_type_among(&[], &allowed), Some(SessionType::Cm));

        let after_cm = vec![record(1, SessionType::Cm)];
        assert_eq!(next_session_type_among(&after_cm, &allowed), Some(SessionType::Td));

        let balanced = vec![record(1, SessionType::Cm), record(2, SessionType::Td)];
        // TP would come next in the open cascade but is not required here
        assert_eq!(next_session_type(&balanced), SessionType::Tp);
        assert_eq!(next_session_type_among(&balanced, &allowed), Some(SessionType::Td));

        // No type left to schedule
        assert_eq!(next_session_type_among(&balanced, &[]), None);

        // A lab-only course starts with TP
        assert_eq!(next_session_type_among(&[], &[SessionType::Tp]), Some(SessionType::Tp));
    }

    #[test]
    fn test_validate_sequence_minimum_delays() {
        let history = vec![record(1, SessionType::Cm)];

        // TD at least 1 day after CM
        assert!(validate_sequence(&history, d(1), SessionType::Td).is_err());
        assert!(validate_sequence(&history, d(2), SessionType::Td).is_ok());

        // TP at least 2 days after CM
        assert!(validate_sequence(&history, d(2), SessionType::Tp).is_err());
        assert!(validate_sequence(&history, d(3), SessionType::Tp).is_ok());

        // TPE at least 3 days after CM
        assert!(validate_sequence(&history, d(3), SessionType::Tpe).is_err());
        assert!(validate_sequence(&history, d(4), SessionType::Tpe).is_ok());

        // No constraint on the first session at all
        assert!(validate_sequence(&[], d(1), SessionType::Tp).is_ok());
    }

    #[test]
    fn test_validate_sequence_td_tp_gap() {
        let history = vec![record(1, SessionType::Cm), record(3, SessionType::Td)];

        // Same day as the TD: rejected even though the CM delay is satisfied
        let err = validate_sequence(&history, d(3), SessionType::Tp).unwrap_err();
        assert_eq!(err.from, SessionType::Td);
        assert_eq!(err.days, 0);
        assert_eq!(err.min_days, 1);

        assert!(validate_sequence(&history, d(4), SessionType::Tp).is_ok());
    }

    #[test]
    fn test_delay_score_window() {
        let history = vec![record(1, SessionType::Cm)];

        // Inside the optimal CM->TD window (1-2 days)
        assert_eq!(delay_score(&history, d(2), SessionType::Td), 100);
        assert_eq!(delay_score(&history, d(3), SessionType::Td), 100);

        // Late: decays 10/day, floored at 30
        assert_eq!(delay_score(&history, d(4), SessionType::Td), 90);
        assert_eq!(delay_score(&history, d(8), SessionType::Td), 50);
        assert_eq!(delay_score(&history, d(30), SessionType::Td), 30);

        // First session of a course always scores full
        assert_eq!(delay_score(&[], d(2), SessionType::Cm), 100);
    }

    #[test]
    fn test_tp_falls_back_to_td_dependency() {
        // No CM in history: the TP delay hangs off the TD
        let history = vec![record(2, SessionType::Td)];
        assert_eq!(delay_score(&history, d(3), SessionType::Tp), 100);
        assert_eq!(delay_score(&history, d(10), SessionType::Tp), 40);
    }

    #[test]
    fn test_cache_matches_fresh_computation() {
        let mut cache = ScoreCache::new();
        let times = [t(8, 0), t(10, 15), t(14, 0), t(16, 0), t(9, 30)];
        let days =
            [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri, Weekday::Sat];

        for st in SessionType::all() {
            for time in times {
                // Query twice so the second read comes from the cache
                assert_eq!(cache.time_score(st, time), time_score(st, time));
                assert_eq!(cache.time_score(st, time), time_score(st, time));
            }
            for day in days {
                assert_eq!(cache.day_score(st, day), day_score(st, day));
                assert_eq!(cache.day_score(st, day), day_score(st, day));
            }
        }
    }

    #[test]
    fn test_session_priority_composition() {
        let history = vec![record(1, SessionType::Cm)];
        // Tuesday Sept 2 2025, TD at 10:15: time=100, day=100, delay=100
        assert_eq!(
            session_priority(SessionType::Td, t(10, 15), Weekday::Tue, &history, d(2)),
            300
        );
        // CM on a Friday afternoon: time=10, day=20, delay=100
        assert_eq!(session_priority(SessionType::Cm, t(14, 0), Weekday::Fri, &[], d(5)), 130);
    }
}
