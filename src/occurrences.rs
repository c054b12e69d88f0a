/*!
Mutations on materialised occurrences: cancel, reschedule, modify.

These are the operations a planner performs after generation; each one sets
the matching modification flags so partial regeneration can preserve the
human edits. Conflict re-checks happen in the engine facade, which sees the
whole occurrence set.
*/

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Occurrence, OccurrenceStatus};

/// Patch applied by the modify operation; absent fields stay untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OccurrenceModification {
    pub room_id: Option<Uuid>,
    pub instructor_id: Option<Uuid>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub notes: Option<String>,
}

impl OccurrenceModification {
    pub fn is_empty(&self) -> bool {
        self.room_id.is_none()
            && self.instructor_id.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.notes.is_none()
    }
}

/// Cancel an occurrence in place, keeping it in the schedule as a tombstone.
pub fn cancel(occurrence: &mut Occurrence, reason: impl Into<String>) {
    occurrence.status = OccurrenceStatus::Cancelled;
    occurrence.cancellation_reason = Some(reason.into());
    log::info!(
        "Cancelled occurrence {} on {}",
        occurrence.id,
        occurrence.actual_date
    );
}

/// Reschedule an occurrence: the old one is marked `rescheduled` and a new
/// occurrence is created at the target slot, linked through
/// `rescheduled_from`.
pub fn reschedule(
    occurrence: &mut Occurrence,
    new_date: NaiveDate,
    new_start: NaiveTime,
    new_end: NaiveTime,
    new_room: Option<Uuid>,
    new_instructor: Option<Uuid>,
) -> Occurrence {
    let mut replacement = Occurrence {
        id: Uuid::new_v4(),
        template_id: occurrence.template_id,
        actual_date: new_date,
        start_time: new_start,
        end_time: new_end,
        room_id: new_room.unwrap_or(occurrence.room_id),
        instructor_id: new_instructor.or(occurrence.instructor_id),
        status: OccurrenceStatus::Scheduled,
        room_modified: false,
        instructor_modified: false,
        time_modified: true,
        cancellation_reason: None,
        rescheduled_from: Some(occurrence.id),
        notes: occurrence.notes.clone(),
    };
    replacement.room_modified = replacement.room_id != occurrence.room_id;
    replacement.instructor_modified = replacement.instructor_id != occurrence.instructor_id;

    occurrence.status = OccurrenceStatus::Rescheduled;

    log::info!(
        "Rescheduled occurrence {} from {} to {new_date} {new_start}",
        occurrence.id,
        occurrence.actual_date
    );

    replacement
}

/// Apply a field-level patch, flipping the corresponding modification flags.
pub fn apply_modification(occurrence: &mut Occurrence, patch: &OccurrenceModification) {
    if let Some(room_id) = patch.room_id {
        if room_id != occurrence.room_id {
            occurrence.room_id = room_id;
            occurrence.room_modified = true;
        }
    }
    if let Some(instructor_id) = patch.instructor_id {
        if occurrence.instructor_id != Some(instructor_id) {
            occurrence.instructor_id = Some(instructor_id);
            occurrence.instructor_modified = true;
        }
    }
    if let Some(start) = patch.start_time {
        occurrence.start_time = start;
        occurrence.time_modified = true;
    }
    if let Some(end) = patch.end_time {
        occurrence.end_time = end;
        occurrence.time_modified = true;
    }
    if let Some(notes) = &patch.notes {
        occurrence.notes = Some(notes.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SessionTemplate, SessionType};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, day).unwrap()
    }

    fn occurrence() -> Occurrence {
        let template = SessionTemplate {
            id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            instructor_id: Some(Uuid::new_v4()),
            time_slot_id: Uuid::new_v4(),
            session_type: SessionType::Cm,
            specific_date: None,
            specific_start: None,
            specific_end: None,
            expected_students: None,
            is_cancelled: false,
        };
        Occurrence::from_template(&template, d(1), t(8, 0), t(10, 0))
    }

    #[test]
    fn test_cancel_sets_tombstone() {
        let mut occ = occurrence();
        cancel(&mut occ, "Instructor on sick leave");

        assert_eq!(occ.status, OccurrenceStatus::Cancelled);
        assert_eq!(occ.cancellation_reason.as_deref(), Some("Instructor on sick leave"));
        assert!(!occ.is_scheduled());
    }

    #[test]
    fn test_reschedule_links_and_flags() {
        let mut old = occurrence();
        let new_room = Uuid::new_v4();

        let new = reschedule(&mut old, d(8), t(14, 0), t(16, 0), Some(new_room), None);

        assert_eq!(old.status, OccurrenceStatus::Rescheduled);
        assert_eq!(new.rescheduled_from, Some(old.id));
        assert_eq!(new.actual_date, d(8));
        assert!(new.time_modified);
        assert!(new.room_modified);
        assert!(!new.instructor_modified);
        assert_eq!(new.instructor_id, old.instructor_id);
        // Hour volume is conserved across the chain
        assert_eq!(new.duration_hours(), old.duration_hours());
    }

    #[test]
    fn test_modification_flags_only_on_change() {
        let mut occ = occurrence();
        let same_room = occ.room_id;

        apply_modification(
            &mut occ,
            &OccurrenceModification { room_id: Some(same_room), ..Default::default() },
        );
        assert!(!occ.room_modified);

        apply_modification(
            &mut occ,
            &OccurrenceModification {
                room_id: Some(Uuid::new_v4()),
                start_time: Some(t(10, 15)),
                notes: Some("moved".into()),
                ..Default::default()
            },
        );
        assert!(occ.room_modified);
        assert!(occ.time_modified);
        assert!(!occ.instructor_modified);
        assert_eq!(occ.notes.as_deref(), Some("moved"));
    }
}
