/*!
In-memory allocation index used by the generator for O(1) conflict lookups.

Two slot maps keyed by `(date, start_time)` track occupied rooms and
instructors; a weekly ledger tracks instructor hours per ISO week. The index
is preloaded once from the persisted occurrences (planning window extended by
seven days on each side to catch boundary conflicts) and then updated in
place as the placement loop commits sessions. It is owned exclusively by one
generation run.
*/

use chrono::{Datelike, NaiveDate, NaiveTime};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::types::Occurrence;

/// Days added on each side of the planning window when preloading.
pub const PRELOAD_MARGIN_DAYS: i64 = 7;

type SlotKey = (NaiveDate, NaiveTime);
type IsoWeekKey = (i32, u32);

fn iso_week_key(date: NaiveDate) -> IsoWeekKey {
    let week = date.iso_week();
    (week.year(), week.week())
}

#[derive(Debug, Default)]
pub struct AllocationIndex {
    room_slots: HashMap<SlotKey, HashSet<Uuid>>,
    instructor_slots: HashMap<SlotKey, HashSet<Uuid>>,
    weekly_hours: HashMap<(Uuid, IsoWeekKey), f64>,
    room_usage: HashMap<Uuid, usize>,
}

impl AllocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load committed occurrences in one pass. Only `scheduled`
    /// occurrences occupy resources.
    pub fn preload(&mut self, occurrences: &[Occurrence]) {
        let mut loaded = 0usize;
        for occurrence in occurrences {
            if !occurrence.is_scheduled() {
                continue;
            }
            self.mark_used(
                occurrence.actual_date,
                occurrence.start_time,
                occurrence.room_id,
                occurrence.instructor_id,
                occurrence.duration_hours(),
            );
            loaded += 1;
        }
        log::info!("Preloaded {loaded} occurrence allocations across {} slots", self.slot_count());
    }

    /// Atomically record a committed placement in all three structures.
    pub fn mark_used(
        &mut self,
        date: NaiveDate,
        start: NaiveTime,
        room_id: Uuid,
        instructor_id: Option<Uuid>,
        duration_hours: f64,
    ) {
        let key = (date, start);
        self.room_slots.entry(key).or_default().insert(room_id);
        *self.room_usage.entry(room_id).or_default() += 1;

        if let Some(instructor_id) = instructor_id {
            self.instructor_slots.entry(key).or_default().insert(instructor_id);
            *self.weekly_hours.entry((instructor_id, iso_week_key(date))).or_default() +=
                duration_hours;
        }
    }

    pub fn is_room_free(&self, date: NaiveDate, start: NaiveTime, room_id: Uuid) -> bool {
        self.room_slots.get(&(date, start)).is_none_or(|set| !set.contains(&room_id))
    }

    pub fn is_instructor_free(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        instructor_id: Uuid,
    ) -> bool {
        self.instructor_slots.get(&(date, start)).is_none_or(|set| !set.contains(&instructor_id))
    }

    /// Hours already committed for the ISO week containing `date`.
    pub fn instructor_week_hours(&self, instructor_id: Uuid, date: NaiveDate) -> f64 {
        self.weekly_hours.get(&(instructor_id, iso_week_key(date))).copied().unwrap_or(0.0)
    }

    /// How many sessions a room already hosts; used to spread load across the
    /// room pool during selection.
    pub fn room_usage_count(&self, room_id: Uuid) -> usize {
        self.room_usage.get(&room_id).copied().unwrap_or(0)
    }

    pub fn slot_count(&self) -> usize {
        self.room_slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OccurrenceStatus, SessionTemplate, SessionType};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, day).unwrap()
    }

    fn occurrence(
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        room: Uuid,
        instructor: Option<Uuid>,
    ) -> Occurrence {
        let template = SessionTemplate {
            id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            room_id: room,
            instructor_id: instructor,
            time_slot_id: Uuid::new_v4(),
            session_type: SessionType::Cm,
            specific_date: None,
            specific_start: None,
            specific_end: None,
            expected_students: None,
            is_cancelled: false,
        };
        Occurrence::from_template(&template, date, start, end)
    }

    #[test]
    fn test_mark_and_lookup() {
        let mut index = AllocationIndex::new();
        let room = Uuid::new_v4();
        let instructor = Uuid::new_v4();

        assert!(index.is_room_free(d(1), t(8, 0), room));
        assert!(index.is_instructor_free(d(1), t(8, 0), instructor));

        index.mark_used(d(1), t(8, 0), room, Some(instructor), 2.0);

        assert!(!index.is_room_free(d(1), t(8, 0), room));
        assert!(!index.is_instructor_free(d(1), t(8, 0), instructor));

        // Different start or date: free
        assert!(index.is_room_free(d(1), t(10, 15), room));
        assert!(index.is_room_free(d(2), t(8, 0), room));
        // Another room at the same slot: free
        assert!(index.is_room_free(d(1), t(8, 0), Uuid::new_v4()));
    }

    #[test]
    fn test_weekly_ledger_accumulates_per_iso_week() {
        let mut index = AllocationIndex::new();
        let room = Uuid::new_v4();
        let instructor = Uuid::new_v4();

        // Monday and Wednesday of the same ISO week
        index.mark_used(d(1), t(8, 0), room, Some(instructor), 2.0);
        index.mark_used(d(3), t(14, 0), room, Some(instructor), 1.5);
        // Next week
        index.mark_used(d(8), t(8, 0), room, Some(instructor), 2.0);

        assert_eq!(index.instructor_week_hours(instructor, d(1)), 3.5);
        assert_eq!(index.instructor_week_hours(instructor, d(5)), 3.5);
        assert_eq!(index.instructor_week_hours(instructor, d(8)), 2.0);
        assert_eq!(index.instructor_week_hours(Uuid::new_v4(), d(1)), 0.0);
    }

    #[test]
    fn test_preload_skips_non_scheduled() {
        let room = Uuid::new_v4();
        let instructor = Uuid::new_v4();

        let live = occurrence(d(1), t(8, 0), t(10, 0), room, Some(instructor));
        let mut cancelled = occurrence(d(1), t(10, 15), t(12, 15), room, Some(instructor));
        cancelled.status = OccurrenceStatus::Cancelled;

        let mut index = AllocationIndex::new();
        index.preload(&[live, cancelled]);

        assert!(!index.is_room_free(d(1), t(8, 0), room));
        assert!(index.is_room_free(d(1), t(10, 15), room));
        assert_eq!(index.instructor_week_hours(instructor, d(1)), 2.0);
    }

    #[test]
    fn test_room_usage_counter() {
        let mut index = AllocationIndex::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();

        index.mark_used(d(1), t(8, 0), room_a, None, 2.0);
        index.mark_used(d(2), t(8, 0), room_a, None, 2.0);
        index.mark_used(d(1), t(10, 15), room_b, None, 2.0);

        assert_eq!(index.room_usage_count(room_a), 2);
        assert_eq!(index.room_usage_count(room_b), 1);
        assert_eq!(index.room_usage_count(Uuid::new_v4()), 0);
    }
}
