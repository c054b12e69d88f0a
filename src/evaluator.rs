/*!
Objective function over a finalised schedule.

Hard constraints (double bookings, missing course volume) make the schedule
invalid: the global score collapses to negative infinity. Otherwise the score
is the weighted sum of five soft components — pedagogical quality plus four
raw penalty/bonus terms — with letter grades A (>800) through F.

The evaluator is pure and read-only; it may run concurrently over distinct
schedules and never raises on valid input.
*/

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::EvaluationError;
use crate::conflicts::{AuditContext, ConflictDetector};
use crate::sequencing::{day_score, time_score};
use crate::store::EntityGateway;
use crate::types::{ConflictType, Course, Instructor, Occurrence, Room, SessionTemplate};

/// Weights applied to the soft components.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EvaluationWeights {
    pub pedagogical_quality: f64,
    pub instructor_satisfaction: f64,
    pub room_utilisation: f64,
    pub student_load_balance: f64,
    pub instructor_load_balance: f64,
}

impl Default for EvaluationWeights {
    fn default() -> Self {
        Self {
            pedagogical_quality: 100.0,
            instructor_satisfaction: 50.0,
            room_utilisation: 30.0,
            student_load_balance: 40.0,
            instructor_load_balance: 45.0,
        }
    }
}

/// Raw hard-violation counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HardViolations {
    pub room_conflicts: usize,
    pub instructor_conflicts: usize,
    pub missing_course_hours: usize,
}

impl HardViolations {
    pub fn total(&self) -> usize {
        self.room_conflicts + self.instructor_conflicts + self.missing_course_hours
    }
}

/// Soft components. Pedagogical quality is normalised to 0..100; the other
/// four are raw penalty/bonus sums and may be negative.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SoftScores {
    pub pedagogical_quality: f64,
    pub instructor_satisfaction: f64,
    pub room_utilisation: f64,
    pub student_load_balance: f64,
    pub instructor_load_balance: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score > 800.0 {
            Self::A
        } else if score > 600.0 {
            Self::B
        } else if score > 400.0 {
            Self::C
        } else if score > 200.0 {
            Self::D
        } else {
            Self::F
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreReport {
    pub schedule_id: Uuid,
    pub schedule_name: String,
    /// Weighted sum of the soft components; `None` when hard constraints
    /// are violated (conceptually negative infinity).
    pub global_score: Option<f64>,
    pub grade: Grade,
    pub hard_violations: HardViolations,
    pub soft_scores: SoftScores,
    pub weights: EvaluationWeights,
}

impl ScoreReport {
    pub fn is_valid(&self) -> bool {
        self.hard_violations.total() == 0
    }

    /// Score with negative infinity flattened to zero, for display layers.
    pub fn safe_score(&self) -> f64 {
        self.global_score.unwrap_or(0.0)
    }
}

/// Weighted sum of the soft components.
pub fn composite_score(soft: &SoftScores, weights: &EvaluationWeights) -> f64 {
    soft.pedagogical_quality * weights.pedagogical_quality
        + soft.instructor_satisfaction * weights.instructor_satisfaction
        + soft.room_utilisation * weights.room_utilisation
        + soft.student_load_balance * weights.student_load_balance
        + soft.instructor_load_balance * weights.instructor_load_balance
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    pub weights: EvaluationWeights,
    pub transition_buffer_minutes: i64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self { weights: EvaluationWeights::default(), transition_buffer_minutes: 5 }
    }
}

/// Internal working view of one schedule, resolved once per evaluation.
struct ScheduleView {
    occurrences: Vec<Occurrence>,
    templates: HashMap<Uuid, SessionTemplate>,
    courses: Vec<Course>,
    rooms: HashMap<Uuid, Room>,
    instructors: HashMap<Uuid, Instructor>,
    student_count: u32,
}

impl Evaluator {
    pub fn new(weights: EvaluationWeights) -> Self {
        Self { weights, transition_buffer_minutes: 5 }
    }

    pub fn evaluate<S: EntityGateway>(
        &self,
        store: &S,
        schedule_id: Uuid,
    ) -> Result<ScoreReport, EvaluationError> {
        let schedule =
            store.schedule(schedule_id).map_err(|_| EvaluationError::UnknownSchedule(schedule_id))?;
        log::info!("Evaluating schedule '{}'", schedule.name);

        let view = self.resolve_view(store, &schedule)?;

        let hard_violations = self.check_hard_constraints(&view);
        let soft_scores = SoftScores {
            pedagogical_quality: self.pedagogical_quality(&view),
            instructor_satisfaction: self.instructor_satisfaction(&view),
            room_utilisation: self.room_utilisation(&view),
            student_load_balance: self.student_load_balance(&view),
            instructor_load_balance: self.instructor_load_balance(&view),
        };

        let (global_score, grade) = if hard_violations.total() > 0 {
            log::warn!(
                "Schedule '{}' violates {} hard constraint(s)",
                schedule.name,
                hard_violations.total()
            );
            (None, Grade::F)
        } else {
            let score = composite_score(&soft_scores, &self.weights);
            (Some(score), Grade::from_score(score))
        };

        Ok(ScoreReport {
            schedule_id,
            schedule_name: schedule.name,
            global_score,
            grade,
            hard_violations,
            soft_scores,
            weights: self.weights,
        })
    }

    fn resolve_view<S: EntityGateway>(
        &self,
        store: &S,
        schedule: &crate::types::Schedule,
    ) -> Result<ScheduleView, EvaluationError> {
        let class = store.class(schedule.class_id)?;
        let courses = store.courses_for_class(class.id)?;
        let templates: HashMap<Uuid, SessionTemplate> =
            store.templates_for(schedule.id)?.into_iter().map(|t| (t.id, t)).collect();
        let occurrences = store.occurrences_for_schedule(
            schedule.id,
            schedule.period.start_date,
            schedule.period.end_date,
        )?;

        let mut rooms = HashMap::new();
        let mut instructors = HashMap::new();
        for occurrence in &occurrences {
            if !rooms.contains_key(&occurrence.room_id) {
                if let Ok(room) = store.room(occurrence.room_id) {
                    rooms.insert(occurrence.room_id, room);
                }
            }
            if let Some(instructor_id) = occurrence.instructor_id {
                if !instructors.contains_key(&instructor_id) {
                    if let Ok(instructor) = store.instructor(instructor_id) {
                        instructors.insert(instructor_id, instructor);
                    }
                }
            }
        }

        Ok(ScheduleView {
            occurrences,
            templates,
            courses,
            rooms,
            instructors,
            student_count: class.student_count,
        })
    }

    fn check_hard_constraints(&self, view: &ScheduleView) -> HardViolations {
        let course_by_id: HashMap<Uuid, &Course> = view.courses.iter().map(|c| (c.id, c)).collect();
        let ctx = AuditContext {
            courses_by_template: view
                .templates
                .values()
                .filter_map(|t| course_by_id.get(&t.course_id).map(|c| (t.id, *c)))
                .collect(),
            rooms: view.rooms.iter().map(|(id, r)| (*id, r)).collect(),
            instructors: view.instructors.iter().map(|(id, i)| (*id, i)).collect(),
            student_count: view.student_count,
        };

        let detector = ConflictDetector::new(self.transition_buffer_minutes);
        let conflicts = detector.audit(&view.occurrences, &ctx);

        let mut violations = HardViolations {
            room_conflicts: conflicts
                .iter()
                .filter(|c| c.conflict_type == ConflictType::RoomDoubleBooking)
                .count(),
            instructor_conflicts: conflicts
                .iter()
                .filter(|c| c.conflict_type == ConflictType::InstructorDoubleBooking)
                .count(),
            missing_course_hours: 0,
        };

        // Delivered volume per course and per session type, 10% tolerance on
        // the shortfall
        let mut delivered: HashMap<Uuid, f64> = HashMap::new();
        let mut delivered_by_type: HashMap<(Uuid, crate::types::SessionType), f64> = HashMap::new();
        for occurrence in view.occurrences.iter().filter(|o| o.is_scheduled()) {
            if let Some(template) = view.templates.get(&occurrence.template_id) {
                *delivered.entry(template.course_id).or_default() += occurrence.duration_hours();
                *delivered_by_type
                    .entry((template.course_id, template.session_type))
                    .or_default() += occurrence.duration_hours();
            }
        }
        for course in &view.courses {
            if course.total_hours > 0.0 {
                let scheduled = delivered.get(&course.id).copied().unwrap_or(0.0);
                if scheduled < course.total_hours * 0.9 {
                    violations.missing_course_hours += 1;
                    continue;
                }
            }
            for (session_type, required) in &course.session_hours {
                if *required <= 0.0 {
                    continue;
                }
                let scheduled = delivered_by_type
                    .get(&(course.id, *session_type))
                    .copied()
                    .unwrap_or(0.0);
                if scheduled < required * 0.9 {
                    violations.missing_course_hours += 1;
                    break;
                }
            }
        }

        violations
    }

    /// Mean of `(time_score + day_score) / 2` over all scheduled sessions.
    fn pedagogical_quality(&self, view: &ScheduleView) -> f64 {
        let mut total = 0.0;
        let mut count = 0usize;
        for occurrence in view.occurrences.iter().filter(|o| o.is_scheduled()) {
            let Some(template) = view.templates.get(&occurrence.template_id) else {
                continue;
            };
            let time = time_score(template.session_type, occurrence.start_time) as f64;
            let day = day_score(template.session_type, occurrence.actual_date.weekday()) as f64;
            total += (time + day) / 2.0;
            count += 1;
        }
        if count == 0 { 0.0 } else { (total / count as f64).clamp(0.0, 100.0) }
    }

    /// Ten penalty points per intra-day gap longer than one hour.
    fn instructor_satisfaction(&self, view: &ScheduleView) -> f64 {
        let mut by_instructor_day: HashMap<(Uuid, NaiveDate), Vec<&Occurrence>> = HashMap::new();
        for occurrence in view.occurrences.iter().filter(|o| o.is_scheduled()) {
            if let Some(instructor_id) = occurrence.instructor_id {
                by_instructor_day
                    .entry((instructor_id, occurrence.actual_date))
                    .or_default()
                    .push(occurrence);
            }
        }

        let mut gaps = 0usize;
        for day_sessions in by_instructor_day.values_mut() {
            day_sessions.sort_by_key(|o| o.start_time);
            for pair in day_sessions.windows(2) {
                let idle = crate::types::duration_hours(pair[0].end_time, pair[1].start_time);
                if idle > 1.0 {
                    gaps += 1;
                }
            }
        }

        -10.0 * gaps as f64
    }

    /// Rooms are happiest around 70% relative usage; each room's deviation
    /// costs a hundred points.
    fn room_utilisation(&self, view: &ScheduleView) -> f64 {
        let mut usage: HashMap<Uuid, usize> = HashMap::new();
        let mut total = 0usize;
        for occurrence in view.occurrences.iter().filter(|o| o.is_scheduled()) {
            *usage.entry(occurrence.room_id).or_default() += 1;
            total += 1;
        }
        if total == 0 {
            return 0.0;
        }

        let target = 0.70;
        let deviation_sum: f64 = usage
            .values()
            .map(|count| (*count as f64 / total as f64 - target).abs())
            .sum();

        -(deviation_sum * 100.0)
    }

    /// Class days are best between four and six hours of sessions: a bonus
    /// for balanced days, graded penalties for overloaded or light ones.
    fn student_load_balance(&self, view: &ScheduleView) -> f64 {
        let mut daily_hours: HashMap<NaiveDate, f64> = HashMap::new();
        for occurrence in view.occurrences.iter().filter(|o| o.is_scheduled()) {
            *daily_hours.entry(occurrence.actual_date).or_default() += occurrence.duration_hours();
        }

        daily_hours
            .values()
            .map(|hours| {
                if *hours > 6.0 {
                    -(hours - 6.0) * 50.0
                } else if *hours < 4.0 {
                    -(4.0 - hours) * 30.0
                } else {
                    50.0
                }
            })
            .sum()
    }

    /// Instructor weeks are best between twelve and eighteen hours; beyond
    /// twenty, the penalty is steep. Weeks outside both bands contribute
    /// nothing.
    fn instructor_load_balance(&self, view: &ScheduleView) -> f64 {
        let mut weekly: HashMap<(Uuid, (i32, u32)), f64> = HashMap::new();
        for occurrence in view.occurrences.iter().filter(|o| o.is_scheduled()) {
            if let Some(instructor_id) = occurrence.instructor_id {
                let week = occurrence.actual_date.iso_week();
                *weekly.entry((instructor_id, (week.year(), week.week()))).or_default() +=
                    occurrence.duration_hours();
            }
        }

        weekly
            .values()
            .map(|hours| {
                if (12.0..=18.0).contains(hours) {
                    50.0
                } else if *hours > 20.0 {
                    -(hours - 20.0) * 100.0
                } else {
                    0.0
                }
            })
            .sum()
    }
}
