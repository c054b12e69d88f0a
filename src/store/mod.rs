/*!
Storage seams for the engine.

The core never talks to a database: reads go through [`EntityGateway`] and
writes through [`ScheduleWriter`]. Callers adapt these traits to their
storage; [`InMemoryStore`] is the bundled implementation used by tests and
lightweight embedders.
*/

mod memory;

pub use memory::InMemoryStore;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::StoreError;
use crate::types::{
    Course, Instructor, Occurrence, Room, Schedule, SessionTemplate, StudentClass, TimeSlot,
};

/// Read contracts consumed by the generator and evaluator.
pub trait EntityGateway {
    fn schedule(&self, id: Uuid) -> Result<Schedule, StoreError>;
    fn class(&self, id: Uuid) -> Result<StudentClass, StoreError>;
    fn course(&self, id: Uuid) -> Result<Course, StoreError>;
    fn courses_for_class(&self, class_id: Uuid) -> Result<Vec<Course>, StoreError>;
    fn room(&self, id: Uuid) -> Result<Room, StoreError>;
    /// Active rooms with at least `min_capacity` seats.
    fn rooms_with_capacity(&self, min_capacity: u32) -> Result<Vec<Room>, StoreError>;
    fn instructor(&self, id: Uuid) -> Result<Instructor, StoreError>;
    fn instructors(&self, department_id: Option<Uuid>) -> Result<Vec<Instructor>, StoreError>;
    fn time_slot(&self, id: Uuid) -> Result<TimeSlot, StoreError>;
    /// Active time slots ordered by weekday then start time.
    fn active_time_slots(&self) -> Result<Vec<TimeSlot>, StoreError>;
    fn template(&self, id: Uuid) -> Result<SessionTemplate, StoreError>;
    fn templates_for(&self, schedule_id: Uuid) -> Result<Vec<SessionTemplate>, StoreError>;
    fn occurrence(&self, id: Uuid) -> Result<Occurrence, StoreError>;
    /// All occurrences dated inside `[from, to]`, any schedule.
    fn occurrences_in(&self, from: NaiveDate, to: NaiveDate)
    -> Result<Vec<Occurrence>, StoreError>;
    fn occurrences_for_schedule(
        &self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Occurrence>, StoreError>;
}

/// Which resource a rejected write collided on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolatedResource {
    Room(Uuid),
    Instructor(Uuid),
}

/// One uniqueness violation reported by a rejected bulk write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UniquenessViolation {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub resource: ViolatedResource,
    pub message: String,
}

/// Outcome of a transactional bulk write. `violations` being non-empty means
/// nothing was written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BulkWriteReport {
    pub templates_written: usize,
    pub occurrences_written: usize,
    pub violations: Vec<UniquenessViolation>,
}

impl BulkWriteReport {
    pub fn committed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Transactional write contracts.
pub trait ScheduleWriter {
    /// Persist templates and occurrences in one all-or-nothing batch. The
    /// scheduled-occurrence uniqueness invariants — no two share
    /// `(date, start, room)` or `(date, start, instructor)` — are enforced
    /// here; violations reject the whole batch and are reported back.
    fn bulk_write(
        &mut self,
        templates: Vec<SessionTemplate>,
        occurrences: Vec<Occurrence>,
    ) -> Result<BulkWriteReport, StoreError>;

    /// Delete a schedule's occurrences dated inside `[from, to]`. With
    /// `preserve_modified`, occurrences carrying modification flags survive,
    /// as do non-scheduled tombstones (cancelled, rescheduled, completed).
    /// Returns the number deleted.
    fn delete_occurrences_in(
        &mut self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        preserve_modified: bool,
    ) -> Result<usize, StoreError>;

    /// Remove a schedule's dated templates inside `[from, to]` that no longer
    /// have any occurrence referencing them, typically after a regeneration
    /// deleted their occurrences. Abstract (undated) templates are never
    /// touched. Returns the number removed.
    fn purge_orphan_templates(
        &mut self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<usize, StoreError>;

    fn insert_occurrence(&mut self, occurrence: Occurrence) -> Result<(), StoreError>;
    fn update_occurrence(&mut self, occurrence: &Occurrence) -> Result<(), StoreError>;
    fn update_schedule(&mut self, schedule: &Schedule) -> Result<(), StoreError>;
}
