use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::conflict::Conflict;
use super::entities::{SessionType, duration_hours};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Draft,
    Review,
    Approved,
    Published,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcademicPeriod {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Container for one class's timetable over an academic period.
///
/// Session templates and occurrences are stored separately and linked by id;
/// the back-references form a DAG, never owning-pointer cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,
    pub class_id: Uuid,
    pub period: AcademicPeriod,
    pub status: ScheduleStatus,
    pub version: u32,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(name: impl Into<String>, class_id: Uuid, period: AcademicPeriod) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            class_id,
            period,
            status: ScheduleStatus::Draft,
            version: 1,
            published_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn publish(&mut self) {
        self.status = ScheduleStatus::Published;
        self.published_at = Some(Utc::now());
    }

    pub fn archive(&mut self) {
        self.status = ScheduleStatus::Archived;
    }
}

/// Abstract weekly entry within a schedule. The recurrence expander turns a
/// template into dated occurrences; the generator emits dated templates
/// directly (with `specific_date` set) when placing from scratch.
///
/// Uniqueness invariant per schedule: `(schedule_id, time_slot_id, room_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionTemplate {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub course_id: Uuid,
    pub room_id: Uuid,
    pub instructor_id: Option<Uuid>,
    pub time_slot_id: Uuid,
    pub session_type: SessionType,
    pub specific_date: Option<NaiveDate>,
    pub specific_start: Option<NaiveTime>,
    pub specific_end: Option<NaiveTime>,
    pub expected_students: Option<u32>,
    pub is_cancelled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceStatus {
    Scheduled,
    Cancelled,
    Completed,
    Modified,
    Rescheduled,
}

/// A concrete dated instance of a session template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Occurrence {
    pub id: Uuid,
    pub template_id: Uuid,
    pub actual_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub room_id: Uuid,
    pub instructor_id: Option<Uuid>,
    pub status: OccurrenceStatus,
    pub room_modified: bool,
    pub instructor_modified: bool,
    pub time_modified: bool,
    pub cancellation_reason: Option<String>,
    /// Link to the occurrence this one replaces after a reschedule.
    pub rescheduled_from: Option<Uuid>,
    pub notes: Option<String>,
}

impl Occurrence {
    pub fn from_template(
        template: &SessionTemplate,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            template_id: template.id,
            actual_date: date,
            start_time: start,
            end_time: end,
            room_id: template.room_id,
            instructor_id: template.instructor_id,
            status: OccurrenceStatus::Scheduled,
            room_modified: false,
            instructor_modified: false,
            time_modified: false,
            cancellation_reason: None,
            rescheduled_from: None,
            notes: None,
        }
    }

    pub fn duration_hours(&self) -> f64 {
        duration_hours(self.start_time, self.end_time)
    }

    pub fn is_modified(&self) -> bool {
        self.room_modified || self.instructor_modified || self.time_modified
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == OccurrenceStatus::Scheduled
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePolicy {
    #[default]
    Weekly,
    Biweekly,
    Monthly,
}

/// How a monthly recurrence advances. The thirty-day step matches the
/// original deployment; calendar months preserve the day of month.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MonthlyStep {
    #[default]
    ThirtyDays,
    CalendarMonth,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlexibilityLevel {
    Rigid,
    #[default]
    Balanced,
    Flexible,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialWeek {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub suspend_regular: bool,
}

/// Weights applied to the three components of the placement score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoringWeights {
    pub pedagogical: f64,
    pub coverage: f64,
    pub distribution: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { pedagogical: 1.0, coverage: 0.3, distribution: 0.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub recurrence: RecurrencePolicy,
    pub monthly_step: MonthlyStep,
    pub flexibility: FlexibilityLevel,
    pub allow_conflicts: bool,
    pub max_sessions_per_day: u32,
    pub respect_room_preferences: bool,
    pub respect_instructor_preferences: bool,
    pub excluded_dates: BTreeSet<NaiveDate>,
    pub special_weeks: Vec<SpecialWeek>,
    pub preview_mode: bool,
    pub force_regenerate: bool,
    pub preserve_modifications: bool,
    /// Optional sub-window for partial regeneration.
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub include_saturday: bool,
    /// Transition time applied by interval-overlap checks, in minutes.
    pub transition_buffer_minutes: i64,
    /// Wall-clock budget for a run; checked between day iterations.
    pub timeout_seconds: Option<u64>,
    pub weights: ScoringWeights,
}

impl GenerationConfig {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            recurrence: RecurrencePolicy::Weekly,
            monthly_step: MonthlyStep::ThirtyDays,
            flexibility: FlexibilityLevel::Balanced,
            allow_conflicts: false,
            max_sessions_per_day: 6,
            respect_room_preferences: false,
            respect_instructor_preferences: true,
            excluded_dates: BTreeSet::new(),
            special_weeks: Vec::new(),
            preview_mode: false,
            force_regenerate: false,
            preserve_modifications: true,
            date_from: None,
            date_to: None,
            include_saturday: false,
            transition_buffer_minutes: 5,
            timeout_seconds: None,
            weights: ScoringWeights::default(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.end_date <= self.start_date {
            return Err(format!(
                "end_date ({}) must be after start_date ({})",
                self.end_date, self.start_date
            ));
        }
        if self.max_sessions_per_day == 0 {
            return Err("max_sessions_per_day must be at least 1".to_string());
        }
        if !(0..=60).contains(&self.transition_buffer_minutes) {
            return Err("transition_buffer_minutes must be between 0 and 60".to_string());
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if to < from {
                return Err(format!("date_to ({to}) must not precede date_from ({from})"));
            }
        }
        if let Some(budget) = self.timeout_seconds {
            if budget == 0 {
                return Err("timeout_seconds must be positive when set".to_string());
            }
        }
        Ok(())
    }

    /// Effective planning window: the configured period narrowed by the
    /// optional partial-regeneration bounds.
    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        let from = self.date_from.map_or(self.start_date, |d| d.max(self.start_date));
        let to = self.date_to.map_or(self.end_date, |d| d.min(self.end_date));
        (from, to)
    }

    pub fn is_date_excluded(&self, date: NaiveDate) -> bool {
        self.excluded_dates.contains(&date)
    }

    pub fn special_week_for(&self, date: NaiveDate) -> Option<&SpecialWeek> {
        self.special_weeks.iter().find(|w| w.start_date <= date && date <= w.end_date)
    }

    pub fn is_suspended(&self, date: NaiveDate) -> bool {
        self.special_week_for(date).is_some_and(|w| w.suspend_regular)
    }
}

/// Per-run counters, reported alongside the generation result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationStats {
    pub slots_evaluated: usize,
    pub sessions_created: usize,
    pub room_conflicts_avoided: usize,
    pub instructor_conflicts_avoided: usize,
    pub sequence_violations_avoided: usize,
}

/// Occurrence counts per ISO week start, shown in preview mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreviewData {
    pub total_occurrences: usize,
    pub occurrences_per_week: BTreeMap<NaiveDate, usize>,
}

impl PreviewData {
    pub fn from_occurrences(occurrences: &[Occurrence]) -> Self {
        let mut per_week: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for occurrence in occurrences {
            let week_start = occurrence.actual_date
                - chrono::Duration::days(
                    occurrence.actual_date.weekday().num_days_from_monday() as i64
                );
            *per_week.entry(week_start).or_default() += 1;
        }
        Self { total_occurrences: occurrences.len(), occurrences_per_week: per_week }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub success: bool,
    pub message: String,
    pub occurrences_created: usize,
    pub conflicts_detected: usize,
    pub conflicts: Vec<Conflict>,
    #[serde(rename = "preview_data", default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<PreviewData>,
    pub elapsed_seconds: f64,
    pub stats: GenerationStats,
}

impl GenerationResult {
    pub fn failure(message: impl Into<String>, conflicts: Vec<Conflict>) -> Self {
        Self {
            success: false,
            message: message.into(),
            occurrences_created: 0,
            conflicts_detected: conflicts.len(),
            conflicts,
            preview: None,
            elapsed_seconds: 0.0,
            stats: GenerationStats::default(),
        }
    }
}
