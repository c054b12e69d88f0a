use chrono::{NaiveDate, NaiveTime};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{BulkWriteReport, EntityGateway, ScheduleWriter, UniquenessViolation, ViolatedResource};
use crate::StoreError;
use crate::types::{
    Course, Instructor, Occurrence, Room, Schedule, SessionTemplate, StudentClass, TimeSlot,
};

/// Hash-map backed store implementing both engine ports. Suitable for tests
/// and embedders that manage persistence elsewhere.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    schedules: HashMap<Uuid, Schedule>,
    classes: HashMap<Uuid, StudentClass>,
    courses: HashMap<Uuid, Course>,
    rooms: HashMap<Uuid, Room>,
    instructors: HashMap<Uuid, Instructor>,
    time_slots: HashMap<Uuid, TimeSlot>,
    templates: HashMap<Uuid, SessionTemplate>,
    occurrences: HashMap<Uuid, Occurrence>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_schedule(&mut self, schedule: Schedule) {
        self.schedules.insert(schedule.id, schedule);
    }

    pub fn insert_class(&mut self, class: StudentClass) {
        self.classes.insert(class.id, class);
    }

    pub fn insert_course(&mut self, course: Course) {
        self.courses.insert(course.id, course);
    }

    pub fn insert_room(&mut self, room: Room) {
        self.rooms.insert(room.id, room);
    }

    pub fn insert_instructor(&mut self, instructor: Instructor) {
        self.instructors.insert(instructor.id, instructor);
    }

    pub fn insert_time_slot(&mut self, slot: TimeSlot) {
        self.time_slots.insert(slot.id, slot);
    }

    pub fn insert_template(&mut self, template: SessionTemplate) {
        self.templates.insert(template.id, template);
    }

    pub fn occurrence_count(&self) -> usize {
        self.occurrences.len()
    }

    pub fn all_occurrences(&self) -> Vec<Occurrence> {
        let mut all: Vec<_> = self.occurrences.values().cloned().collect();
        all.sort_by_key(|o| (o.actual_date, o.start_time));
        all
    }

    /// Scheduled occurrences conflicting with `(date, start..end, room)` or
    /// `(date, start..end, instructor)` among `existing`.
    fn find_violations(
        existing: impl Iterator<Item = (NaiveDate, NaiveTime, NaiveTime, Uuid, Option<Uuid>)>,
        candidate: &Occurrence,
    ) -> Vec<UniquenessViolation> {
        let mut violations = Vec::new();
        for (date, start, _end, room, instructor) in existing {
            if date != candidate.actual_date || start != candidate.start_time {
                continue;
            }
            if room == candidate.room_id {
                violations.push(UniquenessViolation {
                    date,
                    start_time: start,
                    end_time: candidate.end_time,
                    resource: ViolatedResource::Room(room),
                    message: format!("room {room} already booked at {date} {start}"),
                });
            }
            if let (Some(a), Some(b)) = (instructor, candidate.instructor_id) {
                if a == b {
                    violations.push(UniquenessViolation {
                        date,
                        start_time: start,
                        end_time: candidate.end_time,
                        resource: ViolatedResource::Instructor(a),
                        message: format!("instructor {a} already booked at {date} {start}"),
                    });
                }
            }
        }
        violations
    }
}

impl EntityGateway for InMemoryStore {
    fn schedule(&self, id: Uuid) -> Result<Schedule, StoreError> {
        self.schedules.get(&id).cloned().ok_or_else(|| StoreError::NotFound(format!("schedule {id}")))
    }

    fn class(&self, id: Uuid) -> Result<StudentClass, StoreError> {
        self.classes.get(&id).cloned().ok_or_else(|| StoreError::NotFound(format!("class {id}")))
    }

    fn course(&self, id: Uuid) -> Result<Course, StoreError> {
        self.courses.get(&id).cloned().ok_or_else(|| StoreError::NotFound(format!("course {id}")))
    }

    fn courses_for_class(&self, class_id: Uuid) -> Result<Vec<Course>, StoreError> {
        let class = self.class(class_id)?;
        let mut courses = Vec::with_capacity(class.course_ids.len());
        for course_id in &class.course_ids {
            let course = self.course(*course_id)?;
            if course.is_active {
                courses.push(course);
            }
        }
        Ok(courses)
    }

    fn room(&self, id: Uuid) -> Result<Room, StoreError> {
        self.rooms.get(&id).cloned().ok_or_else(|| StoreError::NotFound(format!("room {id}")))
    }

    fn rooms_with_capacity(&self, min_capacity: u32) -> Result<Vec<Room>, StoreError> {
        let mut rooms: Vec<Room> = self
            .rooms
            .values()
            .filter(|r| r.is_active && r.capacity >= min_capacity)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(rooms)
    }

    fn instructor(&self, id: Uuid) -> Result<Instructor, StoreError> {
        self.instructors
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("instructor {id}")))
    }

    fn instructors(&self, department_id: Option<Uuid>) -> Result<Vec<Instructor>, StoreError> {
        let mut instructors: Vec<Instructor> = self
            .instructors
            .values()
            .filter(|i| i.is_active)
            .filter(|i| department_id.is_none() || i.department_id == department_id)
            .cloned()
            .collect();
        instructors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(instructors)
    }

    fn time_slot(&self, id: Uuid) -> Result<TimeSlot, StoreError> {
        self.time_slots
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("time slot {id}")))
    }

    fn active_time_slots(&self) -> Result<Vec<TimeSlot>, StoreError> {
        let mut slots: Vec<TimeSlot> =
            self.time_slots.values().filter(|s| s.is_active).cloned().collect();
        slots.sort_by_key(|s| (s.weekday.num_days_from_monday(), s.start_time));
        Ok(slots)
    }

    fn template(&self, id: Uuid) -> Result<SessionTemplate, StoreError> {
        self.templates
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("template {id}")))
    }

    fn templates_for(&self, schedule_id: Uuid) -> Result<Vec<SessionTemplate>, StoreError> {
        let mut templates: Vec<SessionTemplate> = self
            .templates
            .values()
            .filter(|t| t.schedule_id == schedule_id)
            .cloned()
            .collect();
        templates.sort_by_key(|t| t.id);
        Ok(templates)
    }

    fn occurrence(&self, id: Uuid) -> Result<Occurrence, StoreError> {
        self.occurrences
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("occurrence {id}")))
    }

    fn occurrences_in(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Occurrence>, StoreError> {
        let mut result: Vec<Occurrence> = self
            .occurrences
            .values()
            .filter(|o| from <= o.actual_date && o.actual_date <= to)
            .cloned()
            .collect();
        result.sort_by_key(|o| (o.actual_date, o.start_time));
        Ok(result)
    }

    fn occurrences_for_schedule(
        &self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Occurrence>, StoreError> {
        let template_ids: HashSet<Uuid> = self
            .templates
            .values()
            .filter(|t| t.schedule_id == schedule_id)
            .map(|t| t.id)
            .collect();
        let mut result: Vec<Occurrence> = self
            .occurrences
            .values()
            .filter(|o| template_ids.contains(&o.template_id))
            .filter(|o| from <= o.actual_date && o.actual_date <= to)
            .cloned()
            .collect();
        result.sort_by_key(|o| (o.actual_date, o.start_time));
        Ok(result)
    }
}

impl ScheduleWriter for InMemoryStore {
    fn bulk_write(
        &mut self,
        templates: Vec<SessionTemplate>,
        occurrences: Vec<Occurrence>,
    ) -> Result<BulkWriteReport, StoreError> {
        // Abstract weekly templates are unique per (schedule, time_slot,
        // room); dated templates repeat the same slot across weeks.
        let mut template_keys = HashSet::new();
        for template in
            self.templates.values().chain(templates.iter()).filter(|t| t.specific_date.is_none())
        {
            let key = (template.schedule_id, template.time_slot_id, template.room_id);
            if !template_keys.insert(key) {
                return Err(StoreError::Constraint(format!(
                    "duplicate template for schedule {} slot {} room {}",
                    template.schedule_id, template.time_slot_id, template.room_id
                )));
            }
        }

        // Occurrence uniqueness against committed state and within the batch
        let mut violations = Vec::new();
        for (i, candidate) in occurrences.iter().enumerate() {
            if !candidate.is_scheduled() {
                continue;
            }
            let stored = self.occurrences.values().filter(|o| o.is_scheduled()).map(|o| {
                (o.actual_date, o.start_time, o.end_time, o.room_id, o.instructor_id)
            });
            violations.extend(Self::find_violations(stored, candidate));

            let in_batch = occurrences[..i].iter().filter(|o| o.is_scheduled()).map(|o| {
                (o.actual_date, o.start_time, o.end_time, o.room_id, o.instructor_id)
            });
            violations.extend(Self::find_violations(in_batch, candidate));
        }

        if !violations.is_empty() {
            log::warn!("Bulk write rejected: {} uniqueness violation(s)", violations.len());
            return Ok(BulkWriteReport {
                templates_written: 0,
                occurrences_written: 0,
                violations,
            });
        }

        let report = BulkWriteReport {
            templates_written: templates.len(),
            occurrences_written: occurrences.len(),
            violations: Vec::new(),
        };
        for template in templates {
            self.templates.insert(template.id, template);
        }
        for occurrence in occurrences {
            self.occurrences.insert(occurrence.id, occurrence);
        }
        Ok(report)
    }

    fn delete_occurrences_in(
        &mut self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        preserve_modified: bool,
    ) -> Result<usize, StoreError> {
        let template_ids: HashSet<Uuid> = self
            .templates
            .values()
            .filter(|t| t.schedule_id == schedule_id)
            .map(|t| t.id)
            .collect();

        let doomed: Vec<Uuid> = self
            .occurrences
            .values()
            .filter(|o| template_ids.contains(&o.template_id))
            .filter(|o| from <= o.actual_date && o.actual_date <= to)
            .filter(|o| {
                if !preserve_modified {
                    return true;
                }
                // Human edits and tombstones (cancelled, rescheduled,
                // completed) survive regeneration
                !o.is_modified() && o.is_scheduled()
            })
            .map(|o| o.id)
            .collect();

        for id in &doomed {
            self.occurrences.remove(id);
        }
        Ok(doomed.len())
    }

    fn purge_orphan_templates(
        &mut self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<usize, StoreError> {
        let referenced: HashSet<Uuid> = self.occurrences.values().map(|o| o.template_id).collect();
        let doomed: Vec<Uuid> = self
            .templates
            .values()
            .filter(|t| t.schedule_id == schedule_id)
            .filter(|t| t.specific_date.is_some_and(|d| from <= d && d <= to))
            .filter(|t| !referenced.contains(&t.id))
            .map(|t| t.id)
            .collect();
        for id in &doomed {
            self.templates.remove(id);
        }
        Ok(doomed.len())
    }

    fn insert_occurrence(&mut self, occurrence: Occurrence) -> Result<(), StoreError> {
        if !self.templates.contains_key(&occurrence.template_id) {
            return Err(StoreError::NotFound(format!("template {}", occurrence.template_id)));
        }
        self.occurrences.insert(occurrence.id, occurrence);
        Ok(())
    }

    fn update_occurrence(&mut self, occurrence: &Occurrence) -> Result<(), StoreError> {
        if !self.occurrences.contains_key(&occurrence.id) {
            return Err(StoreError::NotFound(format!("occurrence {}", occurrence.id)));
        }
        self.occurrences.insert(occurrence.id, occurrence.clone());
        Ok(())
    }

    fn update_schedule(&mut self, schedule: &Schedule) -> Result<(), StoreError> {
        if !self.schedules.contains_key(&schedule.id) {
            return Err(StoreError::NotFound(format!("schedule {}", schedule.id)));
        }
        self.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }
}
