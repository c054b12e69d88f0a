/*!
Recurrence expansion: turns an abstract weekly session template into a finite
ordered list of dated candidates over the planning window.

The expander honours exclusion dates and suspended special weeks, caps the
occurrence count by the course's required hours, and cross-checks the
declared weekly volume against the window length. Emitted candidates are
abstract — resources are only committed by the generator.
*/

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::types::{
    Conflict, ConflictType, Course, GenerationConfig, MonthlyStep, RecurrencePolicy, Severity,
    SessionTemplate, TimeSlot, duration_hours,
};

/// A dated, not-yet-committed occurrence candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Expansion output: candidates in date order plus any volume warnings.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<Conflict>,
}

fn next_date(current: NaiveDate, config: &GenerationConfig) -> NaiveDate {
    match config.recurrence {
        RecurrencePolicy::Weekly => current + Duration::days(7),
        RecurrencePolicy::Biweekly => current + Duration::days(14),
        RecurrencePolicy::Monthly => match config.monthly_step {
            MonthlyStep::ThirtyDays => current + Duration::days(30),
            MonthlyStep::CalendarMonth => {
                current.checked_add_months(Months::new(1)).unwrap_or(current + Duration::days(30))
            },
        },
    }
}

/// Expand one template over the configured window.
///
/// `hour_cap` overrides the course's `total_hours` bound when set; when both
/// are absent the expansion is bounded only by the window.
pub fn expand_template(
    template: &SessionTemplate,
    course: &Course,
    slot: &TimeSlot,
    config: &GenerationConfig,
    hour_cap: Option<f64>,
) -> Expansion {
    let mut expansion = Expansion::default();

    let start_time = template.specific_start.unwrap_or(slot.start_time);
    let end_time = template.specific_end.unwrap_or(slot.end_time);
    let session_hours = duration_hours(start_time, end_time);
    if session_hours <= 0.0 {
        log::warn!(
            "Template {} for {} has a non-positive duration; nothing to expand",
            template.id,
            course.code
        );
        return expansion;
    }

    let (window_start, window_end) = config.window();

    // Occurrence count bounded by the required volume, when known
    let capped_hours = hour_cap.or((course.total_hours > 0.0).then_some(course.total_hours));
    let max_occurrences = capped_hours.map(|hours| (hours / session_hours).ceil() as usize);

    // Cross-check declared weekly volume against the window length
    if course.total_hours > 0.0 && course.hours_per_week > 0.0 {
        let weeks = ((window_end - window_start).num_days() / 7 + 1) as f64;
        let expected = course.hours_per_week * weeks;
        if (expected - course.total_hours).abs() > expected * 0.1 {
            log::warn!(
                "Volume inconsistency for {}: total_hours={}h but {}h/week x {weeks} weeks = {expected}h expected",
                course.code,
                course.total_hours,
                course.hours_per_week
            );
            expansion.warnings.push(
                Conflict::new(
                    ConflictType::VolumeInconsistency,
                    Severity::Low,
                    window_start,
                    Conflict::format_time_range(start_time, end_time),
                    format!(
                        "Volume inconsistency for {}: {}h declared but {expected:.0}h expected over the window",
                        course.code, course.total_hours
                    ),
                )
                .with_courses(vec![course.code.clone()]),
            );
        }
    }

    // Advance to the first occurrence of the slot's weekday
    let mut current = window_start;
    while current.weekday() != slot.weekday {
        current += Duration::days(1);
        if current > window_end {
            return expansion;
        }
    }

    while current <= window_end {
        if let Some(max) = max_occurrences {
            if expansion.candidates.len() >= max {
                break;
            }
        }

        if !config.is_date_excluded(current) && !config.is_suspended(current) {
            expansion.candidates.push(Candidate { date: current, start_time, end_time });
        }

        current = next_date(current, config);
    }

    expansion
}
