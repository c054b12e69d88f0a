/*!
Timetable generation orchestrator.

A run works in phases, mirroring the shape of the whole engine:
1. Preload entities and build the allocation index from committed state
   (planning window extended by a safety margin on each side).
2. Order courses most-constrained first.
3. Either place sessions from scratch across the planning grid, or expand the
   schedule's weekly templates into dated occurrences.
4. Audit the batch, then persist it in a single transactional write.

Per-candidate rejections (occupied room, sequencing violation, unavailable
instructor) are normal control flow and only feed the statistics; run-level
failures surface as errors or as a `success = false` result carrying the
conflict list.
*/

pub mod difficulty;


use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use uuid::Uuid;

use crate::GenerationError;
use crate::allocation::{AllocationIndex, PRELOAD_MARGIN_DAYS};
use crate::conflicts::{AuditContext, ConflictDetector};
use crate::recurrence::expand_template;
use crate::sequencing::{
    ScoreCache, SessionRecord, next_session_type, next_session_type_among, validate_sequence,
};
use crate::store::{EntityGateway, ScheduleWriter};
use crate::types::{
    Conflict, ConflictType, Course, FlexibilityLevel, GenerationConfig, GenerationResult,
    GenerationStats, Instructor, Occurrence, PreviewData, Room, Schedule, SessionTemplate,
    SessionType, Severity, StudentClass, TimeSlot, duration_hours,
};

/// Caps applied to the placement-score bonuses so neither can drown out the
/// pedagogical component.
pub struct PlacementLimits;

impl PlacementLimits {
    pub const MAX_COVERAGE_BONUS: f64 = 30.0;
    pub const MAX_DISTRIBUTION_BONUS: f64 = 100.0;

    /// Coverage shortfall below which a course counts as under-delivered.
    pub const HOURS_TOLERANCE: f64 = 0.1;
}

/// Everything a run produces before the final write.
#[derive(Debug, Default)]
struct RunOutcome {
    templates: Vec<SessionTemplate>,
    occurrences: Vec<Occurrence>,
    conflicts: Vec<Conflict>,
    stats: GenerationStats,
}

/// Wall-clock budget and cooperative cancellation, checked between outer
/// iterations only.
struct RunGuard {
    started: Instant,
    budget_seconds: Option<u64>,
    cancel: Option<Arc<AtomicBool>>,
}

impl RunGuard {
    fn check(&self) -> Result<(), GenerationError> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(GenerationError::Cancelled);
            }
        }
        if let Some(budget) = self.budget_seconds {
            let elapsed = self.started.elapsed().as_secs_f64();
            if elapsed > budget as f64 {
                return Err(GenerationError::Timeout {
                    budget_seconds: budget,
                    elapsed_seconds: elapsed,
                });
            }
        }
        Ok(())
    }
}

pub struct Generator<'a, S> {
    store: &'a mut S,
    ordering: difficulty::OrderingFn,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, S: EntityGateway + ScheduleWriter> Generator<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store, ordering: difficulty::order_by_difficulty, cancel: None }
    }

    /// Swap in an alternative course-ordering strategy.
    pub fn with_ordering(mut self, ordering: difficulty::OrderingFn) -> Self {
        self.ordering = ordering;
        self
    }

    /// Attach a cooperative cancellation flag, polled between day iterations.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn generate(
        &mut self,
        schedule_id: Uuid,
        config: &GenerationConfig,
    ) -> Result<GenerationResult, GenerationError> {
        let started = Instant::now();
        config.validate().map_err(GenerationError::InvalidConfig)?;

        let mut schedule = self
            .store
            .schedule(schedule_id)
            .map_err(|_| GenerationError::UnknownSchedule(schedule_id))?;
        let class = self
            .store
            .class(schedule.class_id)
            .map_err(|e| GenerationError::DataIntegrity(e.to_string()))?;
        let courses = self.store.courses_for_class(class.id)?;
        if courses.is_empty() {
            return Err(GenerationError::EmptyClass(class.id));
        }

        log::info!(
            "Generating schedule '{}' for class {} ({} courses)",
            schedule.name,
            class.code,
            courses.len()
        );

        let (window_start, window_end) = config.window();
        let guard = RunGuard {
            started,
            budget_seconds: config.timeout_seconds,
            cancel: self.cancel.clone(),
        };

        // Phase 1: preload committed occurrences over the extended window
        let margin = Duration::days(PRELOAD_MARGIN_DAYS);
        let committed = self.store.occurrences_in(window_start - margin, window_end + margin)?;
        let own_templates = self.store.templates_for(schedule_id)?;
        let own_template_ids: HashSet<Uuid> = own_templates.iter().map(|t| t.id).collect();

        let own_in_window = committed
            .iter()
            .filter(|o| own_template_ids.contains(&o.template_id))
            .filter(|o| window_start <= o.actual_date && o.actual_date <= window_end);

        if !config.force_regenerate && own_in_window.clone().next().is_some() {
            return Ok(GenerationResult::failure(
                "Occurrences already exist in this window; set force_regenerate to rebuild them",
                Vec::new(),
            ));
        }

        // Human edits survive regeneration and stay resource-occupying
        let preserved: Vec<Occurrence> = if config.preserve_modifications {
            own_in_window.filter(|o| o.is_modified() || !o.is_scheduled()).cloned().collect()
        } else {
            Vec::new()
        };

        let mut index = AllocationIndex::new();
        let foreign: Vec<Occurrence> = committed
            .iter()
            .filter(|o| !own_template_ids.contains(&o.template_id))
            .cloned()
            .collect();
        index.preload(&foreign);
        index.preload(&preserved);

        let detector = ConflictDetector::new(config.transition_buffer_minutes);
        let templates_by_id: HashMap<Uuid, &SessionTemplate> =
            own_templates.iter().map(|t| (t.id, t)).collect();

        // Phase 2/3: place from scratch unless the schedule carries weekly
        // templates to expand
        let abstract_templates: Vec<&SessionTemplate> = own_templates
            .iter()
            .filter(|t| !t.is_cancelled && t.specific_date.is_none())
            .collect();

        let mut outcome = if abstract_templates.is_empty() {
            self.place_from_scratch(
                &schedule,
                &class,
                &courses,
                config,
                &mut index,
                &detector,
                &guard,
                &preserved,
                &templates_by_id,
            )?
        } else {
            self.expand_schedule_templates(
                &class,
                &courses,
                &abstract_templates,
                config,
                &mut index,
                &detector,
                &guard,
                &preserved,
            )?
        };

        // Phase 4: audit the batch and roll missing volume into the result
        let audit_conflicts = self.audit_outcome(&outcome, &class, &detector)?;
        outcome.conflicts.extend(audit_conflicts);
        outcome.conflicts.extend(self.missing_hours_conflicts(
            &courses,
            &outcome,
            &preserved,
            &templates_by_id,
            window_end,
        ));

        let blocking: Vec<Conflict> = outcome
            .conflicts
            .iter()
            .filter(|c| c.is_blocking() || c.conflict_type == ConflictType::MissingCourseHours)
            .cloned()
            .collect();

        if !blocking.is_empty() && !config.allow_conflicts && !config.preview_mode {
            log::warn!("Generation aborted: {} blocking conflict(s)", blocking.len());
            let mut result = GenerationResult::failure(
                format!("{} blocking conflict(s) detected; generation aborted", blocking.len()),
                outcome.conflicts,
            );
            result.stats = outcome.stats;
            result.elapsed_seconds = started.elapsed().as_secs_f64();
            return Ok(result);
        }

        if config.preview_mode {
            let preview = PreviewData::from_occurrences(&outcome.occurrences);
            return Ok(GenerationResult {
                success: true,
                message: format!(
                    "{} occurrence(s) generated (preview only, nothing persisted)",
                    outcome.occurrences.len()
                ),
                occurrences_created: outcome.occurrences.len(),
                conflicts_detected: outcome.conflicts.len(),
                conflicts: outcome.conflicts,
                preview: Some(preview),
                elapsed_seconds: started.elapsed().as_secs_f64(),
                stats: outcome.stats,
            });
        }

        // Single transactional write; one retry on a commit race
        if config.force_regenerate {
            let deleted = self.store.delete_occurrences_in(
                schedule_id,
                window_start,
                window_end,
                config.preserve_modifications,
            )?;
            let purged = self.store.purge_orphan_templates(schedule_id, window_start, window_end)?;
            log::info!("Cleared {deleted} occurrence(s) and {purged} orphan template(s)");
        }

        let occurrences_created = outcome.occurrences.len();
        let mut report =
            self.store.bulk_write(outcome.templates.clone(), outcome.occurrences.clone())?;
        if !report.committed() {
            log::warn!(
                "Commit rejected with {} uniqueness violation(s); retrying once",
                report.violations.len()
            );
            report = self.store.bulk_write(outcome.templates, outcome.occurrences)?;
        }
        if !report.committed() {
            let conflicts: Vec<Conflict> = report
                .violations
                .iter()
                .map(|v| {
                    Conflict::new(
                        match v.resource {
                            crate::store::ViolatedResource::Room(_) => {
                                ConflictType::RoomDoubleBooking
                            },
                            crate::store::ViolatedResource::Instructor(_) => {
                                ConflictType::InstructorDoubleBooking
                            },
                        },
                        Severity::Critical,
                        v.date,
                        Conflict::format_time_range(v.start_time, v.end_time),
                        v.message.clone(),
                    )
                })
                .collect();
            let mut result = GenerationResult::failure(
                "Commit rejected after retry: a concurrent writer took the slots",
                conflicts,
            );
            result.stats = outcome.stats;
            result.elapsed_seconds = started.elapsed().as_secs_f64();
            return Ok(result);
        }

        schedule.version += 1;
        self.store.update_schedule(&schedule)?;

        let elapsed = started.elapsed().as_secs_f64();
        log::info!(
            "Generated {occurrences_created} occurrence(s) in {elapsed:.2}s ({} slots evaluated)",
            outcome.stats.slots_evaluated
        );

        Ok(GenerationResult {
            success: true,
            message: format!("{occurrences_created} occurrence(s) generated"),
            occurrences_created,
            conflicts_detected: outcome.conflicts.len(),
            conflicts: outcome.conflicts,
            preview: None,
            elapsed_seconds: elapsed,
            stats: outcome.stats,
        })
    }

    /// True when no session may be placed on `date`.
    fn day_is_blocked(date: NaiveDate, config: &GenerationConfig) -> bool {
        match date.weekday() {
            Weekday::Sun => return true,
            Weekday::Sat if !config.include_saturday => return true,
            _ => {},
        }
        config.is_date_excluded(date) || config.is_suspended(date)
    }

    #[allow(clippy::too_many_arguments)]
    fn place_from_scratch(
        &mut self,
        schedule: &Schedule,
        class: &StudentClass,
        courses: &[Course],
        config: &GenerationConfig,
        index: &mut AllocationIndex,
        detector: &ConflictDetector,
        guard: &RunGuard,
        preserved: &[Occurrence],
        templates_by_id: &HashMap<Uuid, &SessionTemplate>,
    ) -> Result<RunOutcome, GenerationError> {
        let mut outcome = RunOutcome::default();

        let rooms = self.store.rooms_with_capacity(class.student_count)?;
        if rooms.is_empty() {
            log::warn!("No room fits {} students; nothing can be placed", class.student_count);
        }
        let slots = self.store.active_time_slots()?;
        if slots.is_empty() {
            return Err(GenerationError::DataIntegrity("no active time slots".to_string()));
        }
        let instructors = self.load_instructors(courses)?;

        let ordered = (self.ordering)(courses);
        let course_by_id: HashMap<Uuid, &Course> = courses.iter().map(|c| (c.id, c)).collect();

        let mut cache = ScoreCache::new();
        let mut hours: HashMap<Uuid, f64> = HashMap::new();
        let mut history: HashMap<Uuid, Vec<SessionRecord>> = HashMap::new();

        // Preserved human edits already deliver part of the volume
        for occurrence in preserved.iter().filter(|o| o.is_scheduled()) {
            let Some(template) = templates_by_id.get(&occurrence.template_id) else {
                continue;
            };
            *hours.entry(template.course_id).or_default() += occurrence.duration_hours();
            history.entry(template.course_id).or_default().push(SessionRecord {
                date: occurrence.actual_date,
                session_type: template.session_type,
                start_time: occurrence.start_time,
                end_time: occurrence.end_time,
            });
        }
        for records in history.values_mut() {
            records.sort_by_key(|r| r.date);
        }

        let (window_start, window_end) = config.window();
        let mut date = window_start;

        while date <= window_end {
            guard.check()?;

            if Self::day_is_blocked(date, config) {
                date += Duration::days(1);
                continue;
            }

            let mut sessions_today: HashSet<Uuid> = HashSet::new();
            let mut placed_today = 0u32;

            for slot in slots.iter().filter(|s| s.weekday == date.weekday()) {
                if placed_today >= config.max_sessions_per_day {
                    break;
                }
                outcome.stats.slots_evaluated += 1;

                let Some((course, session_type)) = self.best_course_for_slot(
                    &ordered,
                    slot,
                    date,
                    &hours,
                    &history,
                    &sessions_today,
                    &mut cache,
                    config,
                    &mut outcome.stats,
                ) else {
                    continue;
                };
                let course = course_by_id[&course];

                let Some(room) =
                    select_room(&rooms, course, class.student_count, date, slot, index)
                else {
                    outcome.stats.room_conflicts_avoided += 1;
                    log::debug!(
                        "No room available for {} on {date} at {}",
                        course.code,
                        slot.start_time
                    );
                    continue;
                };

                if let Some(instructor_id) = course.instructor_id {
                    let instructor = &instructors[&instructor_id];
                    if !self.instructor_can_take(
                        instructor, date, slot, index, detector, config, course,
                    ) {
                        outcome.stats.instructor_conflicts_avoided += 1;
                        continue;
                    }
                }

                // Commit the placement
                let duration = slot.duration_hours();
                let template = SessionTemplate {
                    id: Uuid::new_v4(),
                    schedule_id: schedule.id,
                    course_id: course.id,
                    room_id: room.id,
                    instructor_id: course.instructor_id,
                    time_slot_id: slot.id,
                    session_type,
                    specific_date: Some(date),
                    specific_start: Some(slot.start_time),
                    specific_end: Some(slot.end_time),
                    expected_students: Some(class.student_count),
                    is_cancelled: false,
                };
                let occurrence =
                    Occurrence::from_template(&template, date, slot.start_time, slot.end_time);

                index.mark_used(date, slot.start_time, room.id, course.instructor_id, duration);
                *hours.entry(course.id).or_default() += duration;
                history.entry(course.id).or_default().push(SessionRecord {
                    date,
                    session_type,
                    start_time: slot.start_time,
                    end_time: slot.end_time,
                });
                sessions_today.insert(course.id);
                placed_today += 1;
                outcome.stats.sessions_created += 1;

                log::debug!(
                    "Placed {} ({session_type}) on {date} at {} in {}",
                    course.code,
                    slot.start_time,
                    room.code
                );

                outcome.templates.push(template);
                outcome.occurrences.push(occurrence);
            }

            date += Duration::days(1);
        }

        Ok(outcome)
    }

    /// Evaluate every eligible course for one slot and keep the best scorer.
    #[allow(clippy::too_many_arguments)]
    fn best_course_for_slot(
        &self,
        ordered: &[Course],
        slot: &TimeSlot,
        date: NaiveDate,
        hours: &HashMap<Uuid, f64>,
        history: &HashMap<Uuid, Vec<SessionRecord>>,
        sessions_today: &HashSet<Uuid>,
        cache: &mut ScoreCache,
        config: &GenerationConfig,
        stats: &mut GenerationStats,
    ) -> Option<(Uuid, SessionType)> {
        let duration = slot.duration_hours();
        if duration <= 0.0 {
            return None;
        }

        let total_sessions: usize = history.values().map(Vec::len).sum();
        let avg_sessions = total_sessions as f64 / ordered.len().max(1) as f64;

        let mut best: Option<(Uuid, SessionType, f64)> = None;

        for course in ordered {
            let done = hours.get(&course.id).copied().unwrap_or(0.0);
            if course.total_hours - done < duration - f64::EPSILON {
                continue;
            }
            if sessions_today.contains(&course.id) {
                continue;
            }
            if course.is_time_excluded(date.weekday(), slot.start_time) {
                continue;
            }

            let course_history = history.get(&course.id).map(Vec::as_slice).unwrap_or(&[]);

            // Weekly pacing cap per course
            if course.max_sessions_per_week > 0 {
                let this_week = course_history
                    .iter()
                    .filter(|r| r.date.iso_week() == date.iso_week())
                    .count();
                if this_week >= course.max_sessions_per_week as usize {
                    continue;
                }
            }

            let fixed = course.fixed_session_type();
            let session_type = match fixed {
                Some(fixed) => fixed,
                None => {
                    // Only types whose required volume still has room for
                    // this session (10% overshoot tolerance) are eligible
                    let session_type = if course.session_hours.is_empty() {
                        Some(next_session_type(course_history))
                    } else {
                        let allowed: Vec<SessionType> = SessionType::all()
                            .into_iter()
                            .filter(|t| {
                                let required =
                                    course.session_hours.get(t).copied().unwrap_or(0.0);
                                if required <= 0.0 {
                                    return false;
                                }
                                let done: f64 = course_history
                                    .iter()
                                    .filter(|r| r.session_type == *t)
                                    .map(SessionRecord::duration_hours)
                                    .sum();
                                done + duration
                                    <= required * (1.0 + PlacementLimits::HOURS_TOLERANCE)
                                        + f64::EPSILON
                            })
                            .collect();
                        next_session_type_among(course_history, &allowed)
                    };
                    match session_type {
                        Some(session_type) => session_type,
                        None => continue,
                    }
                },
            };

            if fixed.is_none() {
                if let Err(violation) = validate_sequence(course_history, date, session_type) {
                    stats.sequence_violations_avoided += 1;
                    log::debug!("Sequencing rejected {}: {violation}", course.code);
                    continue;
                }
            }

            let pedagogical = cache.session_priority(
                session_type,
                slot.start_time,
                date.weekday(),
                course_history,
                date,
            ) as f64;

            let coverage = if course.total_hours > 0.0 {
                ((1.0 - done / course.total_hours) * PlacementLimits::MAX_COVERAGE_BONUS)
                    .clamp(0.0, PlacementLimits::MAX_COVERAGE_BONUS)
            } else {
                0.0
            };

            let sessions_count = course_history.len() as f64;
            let distribution = if sessions_count < avg_sessions {
                ((avg_sessions - sessions_count) * 50.0)
                    .min(PlacementLimits::MAX_DISTRIBUTION_BONUS)
            } else {
                0.0
            };

            let score = config.weights.pedagogical * pedagogical
                + config.weights.coverage * coverage
                + config.weights.distribution * distribution;

            if best.as_ref().is_none_or(|(_, _, s)| score > *s) {
                best = Some((course.id, session_type, score));
            }
        }

        best.map(|(id, session_type, _)| (id, session_type))
    }

    fn instructor_can_take(
        &self,
        instructor: &Instructor,
        date: NaiveDate,
        slot: &TimeSlot,
        index: &AllocationIndex,
        detector: &ConflictDetector,
        config: &GenerationConfig,
        course: &Course,
    ) -> bool {
        if !index.is_instructor_free(date, slot.start_time, instructor.id) {
            log::debug!("{} already booked on {date} at {}", instructor.name, slot.start_time);
            return false;
        }
        if detector
            .instructor_overload(index, date, slot.start_time, slot.end_time, instructor, course)
            .is_some()
        {
            return false;
        }
        if config.respect_instructor_preferences
            && !instructor.is_available(date, slot.start_time, slot.end_time)
        {
            log::debug!("{} unavailable on {date} at {}", instructor.name, slot.start_time);
            return false;
        }
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_schedule_templates(
        &mut self,
        class: &StudentClass,
        courses: &[Course],
        templates: &[&SessionTemplate],
        config: &GenerationConfig,
        index: &mut AllocationIndex,
        detector: &ConflictDetector,
        guard: &RunGuard,
        preserved: &[Occurrence],
    ) -> Result<RunOutcome, GenerationError> {
        let mut outcome = RunOutcome::default();

        let rooms = self.store.rooms_with_capacity(0)?;
        let course_by_id: HashMap<Uuid, &Course> = courses.iter().map(|c| (c.id, c)).collect();

        let preserved_dates: HashSet<(Uuid, NaiveDate)> =
            preserved.iter().map(|o| (o.template_id, o.actual_date)).collect();

        for template in templates {
            guard.check()?;

            let course = course_by_id.get(&template.course_id).copied().ok_or_else(|| {
                GenerationError::DataIntegrity(format!(
                    "template {} references course {} outside the class",
                    template.id, template.course_id
                ))
            })?;
            let slot = self
                .store
                .time_slot(template.time_slot_id)
                .map_err(|e| GenerationError::DataIntegrity(e.to_string()))?;
            let template_room = self
                .store
                .room(template.room_id)
                .map_err(|e| GenerationError::DataIntegrity(e.to_string()))?;
            let instructor = match template.instructor_id {
                Some(id) => Some(
                    self.store
                        .instructor(id)
                        .map_err(|e| GenerationError::DataIntegrity(e.to_string()))?,
                ),
                None => None,
            };
            let students = template.expected_students.unwrap_or(class.student_count);

            let expansion = expand_template(template, course, &slot, config, None);
            outcome.conflicts.extend(expansion.warnings);

            for candidate in expansion.candidates {
                outcome.stats.slots_evaluated += 1;

                // A preserved human edit already covers this date
                if preserved_dates.contains(&(template.id, candidate.date)) {
                    continue;
                }

                let resolution = self.resolve_room(
                    template,
                    &template_room,
                    course,
                    students,
                    candidate.date,
                    candidate.start_time,
                    candidate.end_time,
                    &rooms,
                    index,
                    config,
                );
                let (date, room_id) = match resolution {
                    RoomResolution::Keep(date) => (date, template.room_id),
                    RoomResolution::Substitute(date, room_id) => (date, room_id),
                    RoomResolution::Blocked(conflict) => {
                        outcome.stats.room_conflicts_avoided += 1;
                        outcome.conflicts.push(conflict);
                        continue;
                    },
                };

                if let Some(instructor) = &instructor {
                    if !index.is_instructor_free(date, candidate.start_time, instructor.id) {
                        outcome.stats.instructor_conflicts_avoided += 1;
                        outcome.conflicts.push(
                            Conflict::new(
                                ConflictType::InstructorDoubleBooking,
                                Severity::Critical,
                                date,
                                Conflict::format_time_range(
                                    candidate.start_time,
                                    candidate.end_time,
                                ),
                                format!("Instructor {} is already booked", instructor.name),
                            )
                            .with_resource(instructor.name.clone())
                            .with_courses(vec![course.code.clone()]),
                        );
                        if !config.allow_conflicts {
                            continue;
                        }
                    } else if let Some(conflict) = detector.instructor_overload(
                        index,
                        date,
                        candidate.start_time,
                        candidate.end_time,
                        instructor,
                        course,
                    ) {
                        outcome.conflicts.push(conflict);
                        if !config.allow_conflicts {
                            continue;
                        }
                    } else if config.respect_instructor_preferences
                        && !instructor.is_available(date, candidate.start_time, candidate.end_time)
                    {
                        outcome.stats.instructor_conflicts_avoided += 1;
                        log::debug!(
                            "{} unavailable on {date}; occurrence skipped",
                            instructor.name
                        );
                        continue;
                    }
                }

                let mut occurrence = Occurrence::from_template(
                    template,
                    date,
                    candidate.start_time,
                    candidate.end_time,
                );
                occurrence.room_id = room_id;
                occurrence.room_modified = room_id != template.room_id;
                occurrence.time_modified = date != candidate.date;

                index.mark_used(
                    date,
                    candidate.start_time,
                    room_id,
                    template.instructor_id,
                    duration_hours(candidate.start_time, candidate.end_time),
                );
                outcome.stats.sessions_created += 1;
                outcome.occurrences.push(occurrence);
            }
        }

        Ok(outcome)
    }

    /// Room choice for one expanded candidate, governed by the flexibility
    /// level: `rigid` keeps the template room or skips, `balanced` substitutes
    /// the best available room, `flexible` additionally tries the adjacent
    /// weekdays.
    #[allow(clippy::too_many_arguments)]
    fn resolve_room(
        &self,
        template: &SessionTemplate,
        template_room: &Room,
        course: &Course,
        students: u32,
        date: NaiveDate,
        start: chrono::NaiveTime,
        end: chrono::NaiveTime,
        rooms: &[Room],
        index: &AllocationIndex,
        config: &GenerationConfig,
    ) -> RoomResolution {
        let rigid = config.flexibility == FlexibilityLevel::Rigid || config.respect_room_preferences;

        if index.is_room_free(date, start, template.room_id) {
            return RoomResolution::Keep(date);
        }

        let blocked = || {
            RoomResolution::Blocked(
                Conflict::new(
                    ConflictType::RoomDoubleBooking,
                    Severity::Critical,
                    date,
                    Conflict::format_time_range(start, end),
                    format!("Room {} is already booked", template_room.code),
                )
                .with_resource(template_room.code.clone())
                .with_courses(vec![course.code.clone()]),
            )
        };

        if rigid {
            return blocked();
        }

        if let Some(substitute) = select_substitute(rooms, course, students, date, start, index) {
            return RoomResolution::Substitute(date, substitute.id);
        }

        if config.flexibility == FlexibilityLevel::Flexible {
            // Temporal shift: the neighbouring weekdays at the same start time
            for delta in [-1i64, 1] {
                let shifted = date + Duration::days(delta);
                let (window_start, window_end) = config.window();
                if shifted < window_start
                    || shifted > window_end
                    || Self::day_is_blocked(shifted, config)
                {
                    continue;
                }
                if index.is_room_free(shifted, start, template.room_id) {
                    return RoomResolution::Keep(shifted);
                }
                if let Some(substitute) =
                    select_substitute(rooms, course, students, shifted, start, index)
                {
                    return RoomResolution::Substitute(shifted, substitute.id);
                }
            }
        }

        blocked()
    }

    fn load_instructors(
        &self,
        courses: &[Course],
    ) -> Result<HashMap<Uuid, Instructor>, GenerationError> {
        let mut instructors = HashMap::new();
        for course in courses {
            if let Some(instructor_id) = course.instructor_id {
                if instructors.contains_key(&instructor_id) {
                    continue;
                }
                let instructor = self.store.instructor(instructor_id).map_err(|_| {
                    GenerationError::DataIntegrity(format!(
                        "course {} references unknown instructor {instructor_id}",
                        course.code
                    ))
                })?;
                instructors.insert(instructor_id, instructor);
            }
        }
        Ok(instructors)
    }

    /// Post-placement audit over the new batch.
    fn audit_outcome(
        &self,
        outcome: &RunOutcome,
        class: &StudentClass,
        detector: &ConflictDetector,
    ) -> Result<Vec<Conflict>, GenerationError> {
        let mut courses: HashMap<Uuid, Course> = HashMap::new();
        let mut rooms: HashMap<Uuid, Room> = HashMap::new();
        let mut instructors: HashMap<Uuid, Instructor> = HashMap::new();
        let mut template_course: HashMap<Uuid, Uuid> = HashMap::new();

        for template in &outcome.templates {
            template_course.insert(template.id, template.course_id);
            if !courses.contains_key(&template.course_id) {
                if let Ok(course) = self.store.course(template.course_id) {
                    courses.insert(template.course_id, course);
                }
            }
        }
        for occurrence in &outcome.occurrences {
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

        let ctx = AuditContext {
            courses_by_template: template_course
                .iter()
                .filter_map(|(tid, cid)| courses.get(cid).map(|c| (*tid, c)))
                .collect(),
            rooms: rooms.iter().map(|(id, r)| (*id, r)).collect(),
            instructors: instructors.iter().map(|(id, i)| (*id, i)).collect(),
            student_count: class.student_count,
        };

        Ok(detector.audit(&outcome.occurrences, &ctx))
    }

    /// One conflict per course whose delivered volume falls short of the
    /// requirement beyond the tolerance.
    fn missing_hours_conflicts(
        &self,
        courses: &[Course],
        outcome: &RunOutcome,
        preserved: &[Occurrence],
        templates_by_id: &HashMap<Uuid, &SessionTemplate>,
        window_end: NaiveDate,
    ) -> Vec<Conflict> {
        let mut delivered: HashMap<Uuid, f64> = HashMap::new();

        let new_template_courses: HashMap<Uuid, Uuid> =
            outcome.templates.iter().map(|t| (t.id, t.course_id)).collect();

        for occurrence in outcome.occurrences.iter().filter(|o| o.is_scheduled()) {
            let course_id = new_template_courses
                .get(&occurrence.template_id)
                .copied()
                .or_else(|| templates_by_id.get(&occurrence.template_id).map(|t| t.course_id));
            if let Some(course_id) = course_id {
                *delivered.entry(course_id).or_default() += occurrence.duration_hours();
            }
        }
        for occurrence in preserved.iter().filter(|o| o.is_scheduled()) {
            if let Some(template) = templates_by_id.get(&occurrence.template_id) {
                *delivered.entry(template.course_id).or_default() += occurrence.duration_hours();
            }
        }

        let mut conflicts = Vec::new();
        for course in courses {
            if course.total_hours <= 0.0 {
                continue;
            }
            let scheduled = delivered.get(&course.id).copied().unwrap_or(0.0);
            let floor = course.total_hours * (1.0 - PlacementLimits::HOURS_TOLERANCE);
            if scheduled < floor {
                log::warn!(
                    "Course {} under-delivered: {scheduled:.1}h of {:.1}h",
                    course.code,
                    course.total_hours
                );
                conflicts.push(
                    Conflict::new(
                        ConflictType::MissingCourseHours,
                        Severity::High,
                        window_end,
                        "00:00-00:00".to_string(),
                        format!(
                            "Course {} is missing {:.1}h of {:.1}h required",
                            course.code,
                            course.total_hours - scheduled,
                            course.total_hours
                        ),
                    )
                    .with_courses(vec![course.code.clone()]),
                );
            }
        }
        conflicts
    }
}

enum RoomResolution {
    /// Template room is usable on this date.
    Keep(NaiveDate),
    /// A substitute room was selected on this date.
    Substitute(NaiveDate, Uuid),
    Blocked(Conflict),
}

/// Best room for a fresh placement: capacity and equipment compatible, free
/// at `(date, start)`, minimising capacity waste plus a strong reuse penalty
/// so load spreads across the pool.
fn select_room<'r>(
    rooms: &'r [Room],
    course: &Course,
    student_count: u32,
    date: NaiveDate,
    slot: &TimeSlot,
    index: &AllocationIndex,
) -> Option<&'r Room> {
    let needed = student_count.max(course.min_room_capacity);
    rooms
        .iter()
        .filter(|r| r.capacity >= needed)
        .filter(|r| course.room_satisfies(r))
        .filter(|r| index.is_room_free(date, slot.start_time, r.id))
        .min_by_key(|r| {
            (r.capacity as i64 - student_count as i64).abs()
                + 100 * index.room_usage_count(r.id) as i64
        })
}

/// Substitute search used by template expansion; same cost curve as
/// [`select_room`].
fn select_substitute<'r>(
    rooms: &'r [Room],
    course: &Course,
    students: u32,
    date: NaiveDate,
    start: chrono::NaiveTime,
    index: &AllocationIndex,
) -> Option<&'r Room> {
    rooms
        .iter()
        .filter(|r| r.capacity >= students.max(course.min_room_capacity))
        .filter(|r| course.room_satisfies(r))
        .filter(|r| index.is_room_free(date, start, r.id))
        .min_by_key(|r| {
            (r.capacity as i64 - students as i64).abs() + 100 * index.room_usage_count(r.id) as i64
        })
}
