/*!
Conflict detection over allocations and occurrence sets.

Two usage modes:
- During generation, the pruning predicates consult the allocation index
  before a candidate commits; each hit produces a structured conflict record.
- Post-hoc, `audit` sweeps a finished occurrence set grouped by date and
  reports double bookings, equipment mismatches and overcapacity.

Interval overlap applies the configured transition buffer so back-to-back
sessions keep a few minutes of slack between rooms.
*/

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use std::collections::HashMap;
use uuid::Uuid;

use crate::allocation::AllocationIndex;
use crate::types::{
    Conflict, ConflictType, Course, Instructor, Occurrence, Room, Severity, duration_hours,
};

/// Lookup tables the post-hoc audit needs to resolve ids into records.
#[derive(Debug, Default)]
pub struct AuditContext<'a> {
    pub courses_by_template: HashMap<Uuid, &'a Course>,
    pub rooms: HashMap<Uuid, &'a Room>,
    pub instructors: HashMap<Uuid, &'a Instructor>,
    pub student_count: u32,
}

impl<'a> AuditContext<'a> {
    fn course_code(&self, template_id: Uuid) -> String {
        self.courses_by_template
            .get(&template_id)
            .map_or_else(|| template_id.to_string(), |c| c.code.clone())
    }

    fn room_code(&self, room_id: Uuid) -> String {
        self.rooms.get(&room_id).map_or_else(|| room_id.to_string(), |r| r.code.clone())
    }

    fn instructor_name(&self, instructor_id: Uuid) -> String {
        self.instructors
            .get(&instructor_id)
            .map_or_else(|| instructor_id.to_string(), |i| i.name.clone())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector {
    /// Transition slack applied to interval-overlap checks, in minutes.
    pub transition_buffer_minutes: i64,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self { transition_buffer_minutes: 5 }
    }
}

impl ConflictDetector {
    pub fn new(transition_buffer_minutes: i64) -> Self {
        Self { transition_buffer_minutes }
    }

    /// Overlap test between two same-day time ranges, buffer included.
    pub fn times_overlap(
        &self,
        start1: NaiveTime,
        end1: NaiveTime,
        start2: NaiveTime,
        end2: NaiveTime,
    ) -> bool {
        let buffer = Duration::minutes(self.transition_buffer_minutes);
        let end1 = end1.overflowing_add_signed(buffer).0;
        let end2 = end2.overflowing_add_signed(buffer).0;
        !(end1 <= start2 || end2 <= start1)
    }

    /// Pruning check: the room is already taken at `(date, start)`.
    pub fn room_booked(
        &self,
        index: &AllocationIndex,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        room: &Room,
        course: &Course,
    ) -> Option<Conflict> {
        if index.is_room_free(date, start, room.id) {
            return None;
        }
        Some(
            Conflict::new(
                ConflictType::RoomDoubleBooking,
                Severity::Critical,
                date,
                Conflict::format_time_range(start, end),
                format!("Room {} is already booked", room.code),
            )
            .with_resource(room.code.clone())
            .with_courses(vec![course.code.clone()]),
        )
    }

    /// Pruning check: the instructor is already teaching at `(date, start)`.
    pub fn instructor_booked(
        &self,
        index: &AllocationIndex,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        instructor: &Instructor,
        course: &Course,
    ) -> Option<Conflict> {
        if index.is_instructor_free(date, start, instructor.id) {
            return None;
        }
        Some(
            Conflict::new(
                ConflictType::InstructorDoubleBooking,
                Severity::Critical,
                date,
                Conflict::format_time_range(start, end),
                format!("Instructor {} is already booked", instructor.name),
            )
            .with_resource(instructor.name.clone())
            .with_courses(vec![course.code.clone()]),
        )
    }

    /// Pruning check: committing this session would push the instructor past
    /// their weekly ceiling.
    pub fn instructor_overload(
        &self,
        index: &AllocationIndex,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        instructor: &Instructor,
        course: &Course,
    ) -> Option<Conflict> {
        let committed = index.instructor_week_hours(instructor.id, date);
        let total = committed + duration_hours(start, end);
        if total <= instructor.max_hours_per_week {
            return None;
        }

        let week_start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        Some(
            Conflict::new(
                ConflictType::InstructorOverload,
                Severity::High,
                date,
                Conflict::format_time_range(start, end),
                format!(
                    "Overload for {} in week of {week_start}: {total:.1}h > {:.0}h",
                    instructor.name, instructor.max_hours_per_week
                ),
            )
            .with_resource(instructor.name.clone())
            .with_courses(vec![course.code.clone()]),
        )
    }

    /// Post-hoc audit over a finished occurrence set.
    pub fn audit(&self, occurrences: &[Occurrence], ctx: &AuditContext<'_>) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        let mut by_date: HashMap<NaiveDate, Vec<&Occurrence>> = HashMap::new();
        for occurrence in occurrences.iter().filter(|o| o.is_scheduled()) {
            by_date.entry(occurrence.actual_date).or_default().push(occurrence);
        }

        let mut dates: Vec<_> = by_date.keys().copied().collect();
        dates.sort();

        for date in dates {
            let day = &by_date[&date];
            for (i, first) in day.iter().enumerate() {
                for second in &day[i + 1..] {
                    if !self.times_overlap(
                        first.start_time,
                        first.end_time,
                        second.start_time,
                        second.end_time,
                    ) {
                        continue;
                    }

                    let courses = vec![
                        ctx.course_code(first.template_id),
                        ctx.course_code(second.template_id),
                    ];

                    if first.room_id == second.room_id {
                        let room = ctx.room_code(first.room_id);
                        conflicts.push(
                            Conflict::new(
                                ConflictType::RoomDoubleBooking,
                                Severity::Critical,
                                date,
                                Conflict::format_time_range(first.start_time, first.end_time),
                                format!("Room {room} double-booked"),
                            )
                            .with_resource(room)
                            .with_courses(courses.clone()),
                        );
                    }

                    if let (Some(a), Some(b)) = (first.instructor_id, second.instructor_id) {
                        if a == b {
                            let name = ctx.instructor_name(a);
                            conflicts.push(
                                Conflict::new(
                                    ConflictType::InstructorDoubleBooking,
                                    Severity::Critical,
                                    date,
                                    Conflict::format_time_range(first.start_time, first.end_time),
                                    format!("Instructor {name} double-booked"),
                                )
                                .with_resource(name)
                                .with_courses(courses),
                            );
                        }
                    }
                }

                conflicts.extend(self.check_room_fit(first, ctx));
            }
        }

        if !conflicts.is_empty() {
            log::warn!("Audit found {} conflict(s)", conflicts.len());
        }
        conflicts
    }

    /// Equipment and capacity checks for one occurrence.
    fn check_room_fit(&self, occurrence: &Occurrence, ctx: &AuditContext<'_>) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        let Some(room) = ctx.rooms.get(&occurrence.room_id) else {
            return conflicts;
        };
        let course = ctx.courses_by_template.get(&occurrence.template_id);

        if let Some(course) = course {
            if !course.room_satisfies(room) {
                let mut missing = Vec::new();
                if course.requires_projector && !room.has_projector {
                    missing.push("projector");
                }
                if course.requires_computer && !room.has_computer {
                    missing.push("computers");
                }
                if course.requires_laboratory && !room.is_laboratory {
                    missing.push("laboratory");
                }
                conflicts.push(
                    Conflict::new(
                        ConflictType::EquipmentMismatch,
                        Severity::Medium,
                        occurrence.actual_date,
                        Conflict::format_time_range(occurrence.start_time, occurrence.end_time),
                        format!("Room {} lacks required {}", room.code, missing.join(", ")),
                    )
                    .with_resource(room.code.clone())
                    .with_courses(vec![course.code.clone()]),
                );
            }
        }

        if ctx.student_count > room.capacity {
            let mut conflict = Conflict::new(
                ConflictType::RoomOvercapacity,
                Severity::High,
                occurrence.actual_date,
                Conflict::format_time_range(occurrence.start_time, occurrence.end_time),
                format!(
                    "Room {} seats {} but {} students are expected",
                    room.code, room.capacity, ctx.student_count
                ),
            )
            .with_resource(room.code.clone());
            if let Some(course) = course {
                conflict = conflict.with_courses(vec![course.code.clone()]);
            }
            conflicts.push(conflict);
        }

        conflicts
    }
}
