/*!
Facade over the whole engine: generation, evaluation, conflict detection and
occurrence-level operations, all bound to one store.

The engine owns the store exclusively, which gives each schedule the
single-writer discipline the generator requires; hosts wanting concurrent
generations run one engine per disjoint schedule set.
*/

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::conflicts::{AuditContext, ConflictDetector};
use crate::evaluator::{Evaluator, ScoreReport};
use crate::generator::Generator;
use crate::occurrences::{self, OccurrenceModification};
use crate::store::{EntityGateway, ScheduleWriter};
use crate::types::{
    Conflict, Course, GenerationConfig, GenerationResult, Instructor, Occurrence, Room,
    SessionTemplate, risk_score,
};
use crate::{EngineError, EvaluationError, Result, StoreError};

/// Conflict audit of a schedule plus its weighted risk roll-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictReport {
    pub schedule_id: Uuid,
    pub conflicts: Vec<Conflict>,
    /// Weighted severity sum, capped at 100.
    pub risk_score: u32,
}

/// An occurrence mutation outcome together with the conflicts the change
/// introduced, re-checked against that day's committed occurrences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OccurrenceUpdate {
    pub occurrence: Occurrence,
    pub conflicts: Vec<Conflict>,
}

pub struct TimetableEngine<S> {
    store: S,
    evaluator: Evaluator,
}

impl<S: EntityGateway + ScheduleWriter> TimetableEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store, evaluator: Evaluator::default() }
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Run a full generation for one schedule.
    pub fn generate(
        &mut self,
        schedule_id: Uuid,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        let mut generator = Generator::new(&mut self.store);
        Ok(generator.generate(schedule_id, config)?)
    }

    /// Score a finalised schedule.
    pub fn evaluate(&self, schedule_id: Uuid) -> Result<ScoreReport> {
        Ok(self.evaluator.evaluate(&self.store, schedule_id)?)
    }

    /// Post-hoc conflict audit over a schedule's whole period.
    pub fn detect_conflicts(&self, schedule_id: Uuid) -> Result<ConflictReport> {
        let schedule = self
            .store
            .schedule(schedule_id)
            .map_err(|_| EngineError::Evaluation(EvaluationError::UnknownSchedule(schedule_id)))?;
        let occurrences = self.store.occurrences_for_schedule(
            schedule_id,
            schedule.period.start_date,
            schedule.period.end_date,
        )?;

        let conflicts = self.audit(&occurrences)?;
        let risk = risk_score(&conflicts);
        Ok(ConflictReport { schedule_id, conflicts, risk_score: risk })
    }

    /// Cancel one occurrence; it stays in the schedule as a tombstone.
    pub fn cancel_occurrence(
        &mut self,
        occurrence_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<Occurrence> {
        let mut occurrence = self.store.occurrence(occurrence_id)?;
        occurrences::cancel(&mut occurrence, reason);
        self.store.update_occurrence(&occurrence)?;
        Ok(occurrence)
    }

    /// Move an occurrence to a new slot. The original is marked
    /// `rescheduled`; the replacement links back through `rescheduled_from`.
    #[allow(clippy::too_many_arguments)]
    pub fn reschedule_occurrence(
        &mut self,
        occurrence_id: Uuid,
        new_date: NaiveDate,
        new_start: NaiveTime,
        new_end: NaiveTime,
        new_room: Option<Uuid>,
        new_instructor: Option<Uuid>,
    ) -> Result<OccurrenceUpdate> {
        let mut old = self.store.occurrence(occurrence_id)?;
        let replacement =
            occurrences::reschedule(&mut old, new_date, new_start, new_end, new_room, new_instructor);

        self.store.update_occurrence(&old)?;
        self.store.insert_occurrence(replacement.clone())?;

        let conflicts = self.day_conflicts(new_date, &replacement)?;
        Ok(OccurrenceUpdate { occurrence: replacement, conflicts })
    }

    /// Patch an occurrence in place, flipping modification flags, and
    /// re-check the affected day.
    pub fn modify_occurrence(
        &mut self,
        occurrence_id: Uuid,
        patch: &OccurrenceModification,
    ) -> Result<OccurrenceUpdate> {
        let mut occurrence = self.store.occurrence(occurrence_id)?;
        occurrences::apply_modification(&mut occurrence, patch);
        self.store.update_occurrence(&occurrence)?;

        let conflicts = self.day_conflicts(occurrence.actual_date, &occurrence)?;
        Ok(OccurrenceUpdate { occurrence, conflicts })
    }

    /// Conflicts on one date that involve the given occurrence's resources.
    fn day_conflicts(&self, date: NaiveDate, focus: &Occurrence) -> Result<Vec<Conflict>> {
        let day_occurrences = self.store.occurrences_in(date, date)?;
        let conflicts = self.audit(&day_occurrences)?;

        let focus_room = self
            .store
            .room(focus.room_id)
            .map(|r| r.code)
            .unwrap_or_else(|_| focus.room_id.to_string());
        let focus_instructor = focus
            .instructor_id
            .and_then(|id| self.store.instructor(id).ok())
            .map(|i| i.name);

        Ok(conflicts
            .into_iter()
            .filter(|c| {
                let resource = c.resource.as_deref();
                resource == Some(focus_room.as_str())
                    || (focus_instructor.is_some() && resource == focus_instructor.as_deref())
            })
            .collect())
    }

    /// Resolve entities referenced by `occurrences` and run the audit.
    fn audit(&self, occurrences: &[Occurrence]) -> std::result::Result<Vec<Conflict>, StoreError> {
        let mut rooms: HashMap<Uuid, Room> = HashMap::new();
        let mut instructors: HashMap<Uuid, Instructor> = HashMap::new();
        let mut courses: HashMap<Uuid, Course> = HashMap::new();
        let mut templates: HashMap<Uuid, SessionTemplate> = HashMap::new();
        let mut student_count = 0u32;

        for occurrence in occurrences {
            if !rooms.contains_key(&occurrence.room_id) {
                if let Ok(room) = self.store.room(occurrence.room_id) {
                    rooms.insert(occurrence.room_id, room);
                }
            }
            if let Some(instructor_id) = occurrence.instructor_id {
                if !instructors.contains_key(&instructor_id) {
                    if let Ok(instructor) = self.store.instructor(instructor_id) {
                        instructors.insert(instructor_id, instructor);
                    }
                }
            }
        }

        // Resolve course context through the templates
        for occurrence in occurrences {
            if templates.contains_key(&occurrence.template_id) {
                continue;
            }
            if let Ok(template) = self.store.template(occurrence.template_id) {
                if let Ok(course) = self.store.course(template.course_id) {
                    courses.insert(course.id, course);
                }
                templates.insert(template.id, template);
            }
        }

        // Student count: take the largest class among the schedules involved
        for template in templates.values() {
            if let Ok(schedule) = self.store.schedule(template.schedule_id) {
                if let Ok(class) = self.store.class(schedule.class_id) {
                    student_count = student_count.max(class.student_count);
                }
            }
        }

        let ctx = AuditContext {
            courses_by_template: templates
                .values()
                .filter_map(|t| courses.get(&t.course_id).map(|c| (t.id, c)))
                .collect(),
            rooms: rooms.iter().map(|(id, r)| (*id, r)).collect(),
            instructors: instructors.iter().map(|(id, i)| (*id, i)).collect(),
            student_count,
        };

        let detector = ConflictDetector::default();
        Ok(detector.audit(occurrences, &ctx))
    }
}
