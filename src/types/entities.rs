use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Pedagogical session types, ordered by their place in the teaching cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionType {
    #[serde(rename = "CM")]
    Cm,
    #[serde(rename = "TD")]
    Td,
    #[serde(rename = "TP")]
    Tp,
    #[serde(rename = "TPE")]
    Tpe,
}

impl SessionType {
    pub fn all() -> [Self; 4] {
        [Self::Cm, Self::Td, Self::Tp, Self::Tpe]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cm => "CM",
            Self::Td => "TD",
            Self::Tp => "TP",
            Self::Tpe => "TPE",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurring weekly window, used for course-level excluded times.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurringWindow {
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl RecurringWindow {
    pub fn covers(&self, weekday: Weekday, start: NaiveTime) -> bool {
        self.weekday == weekday && self.start_time <= start && start < self.end_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub department_id: Option<Uuid>,
    pub instructor_id: Option<Uuid>,
    /// Total required hours over the planning horizon.
    pub total_hours: f64,
    /// Default weekly hours, cross-checked against `total_hours` at expansion.
    pub hours_per_week: f64,
    /// Required hours broken down by session type.
    pub session_hours: BTreeMap<SessionType, f64>,
    pub min_sessions_per_week: u8,
    pub max_sessions_per_week: u8,
    pub min_room_capacity: u32,
    pub requires_projector: bool,
    pub requires_computer: bool,
    pub requires_laboratory: bool,
    /// Optional difficulty hint produced by an external predictor.
    pub difficulty_score: Option<f64>,
    /// Optional scheduling priority: 1 = highest, 5 = lowest.
    pub priority: Option<u8>,
    pub excluded_times: Vec<RecurringWindow>,
    pub is_active: bool,
}

impl Course {
    /// A type suffix in the course code pins the session type and bypasses the
    /// sequencing cascade. TPE is checked first so `-TPE` is not read as `-TP`.
    pub fn fixed_session_type(&self) -> Option<SessionType> {
        let code = self.code.to_uppercase();
        if code.contains("-TPE") || code.contains("_TPE") {
            return Some(SessionType::Tpe);
        }
        if code.contains("-CM") || code.contains("_CM") {
            return Some(SessionType::Cm);
        }
        if code.contains("-TD") || code.contains("_TD") {
            return Some(SessionType::Td);
        }
        if code.contains("-TP") || code.contains("_TP") {
            return Some(SessionType::Tp);
        }
        None
    }

    pub fn is_time_excluded(&self, weekday: Weekday, start: NaiveTime) -> bool {
        self.excluded_times.iter().any(|w| w.covers(weekday, start))
    }

    /// Equipment-aware room compatibility check.
    pub fn room_satisfies(&self, room: &Room) -> bool {
        (!self.requires_projector || room.has_projector)
            && (!self.requires_computer || room.has_computer)
            && (!self.requires_laboratory || room.is_laboratory)
    }
}

/// Instructor unavailability: either a recurring weekly window or a date range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Unavailability {
    Recurring { weekday: Weekday, start_time: NaiveTime, end_time: NaiveTime },
    DateRange { from: NaiveDate, to: NaiveDate },
}

impl Unavailability {
    pub fn blocks(&self, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> bool {
        match self {
            Self::Recurring { weekday, start_time, end_time } => {
                date.weekday() == *weekday && *start_time < end && start < *end_time
            },
            Self::DateRange { from, to } => *from <= date && date <= *to,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instructor {
    pub id: Uuid,
    pub name: String,
    pub department_id: Option<Uuid>,
    pub max_hours_per_week: f64,
    pub preferred_days: Vec<Weekday>,
    pub unavailabilities: Vec<Unavailability>,
    pub is_active: bool,
}

impl Instructor {
    pub fn is_available(&self, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> bool {
        !self.unavailabilities.iter().any(|u| u.blocks(date, start, end))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub capacity: u32,
    pub has_projector: bool,
    pub has_computer: bool,
    pub is_laboratory: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    pub id: Uuid,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
}

impl TimeSlot {
    pub fn duration_hours(&self) -> f64 {
        duration_hours(self.start_time, self.end_time)
    }
}

/// A group of students following a common set of courses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentClass {
    pub id: Uuid,
    pub code: String,
    pub level: String,
    pub student_count: u32,
    pub course_ids: Vec<Uuid>,
}

/// Signed duration between two times of day, in fractional hours.
pub fn duration_hours(start: NaiveTime, end: NaiveTime) -> f64 {
    let start_secs = start.num_seconds_from_midnight() as f64;
    let end_secs = end.num_seconds_from_midnight() as f64;
    (end_secs - start_secs) / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn course_with_code(code: &str) -> Course {
        Course {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: "Test".into(),
            department_id: None,
            instructor_id: None,
            total_hours: 30.0,
            hours_per_week: 3.0,
            session_hours: BTreeMap::new(),
            min_sessions_per_week: 1,
            max_sessions_per_week: 3,
            min_room_capacity: 0,
            requires_projector: false,
            requires_computer: false,
            requires_laboratory: false,
            difficulty_score: None,
            priority: None,
            excluded_times: vec![],
            is_active: true,
        }
    }

    #[test]
    fn test_fixed_session_type_from_code() {
        assert_eq!(course_with_code("MATH101").fixed_session_type(), None);
        assert_eq!(course_with_code("MATH101-CM").fixed_session_type(), Some(SessionType::Cm));
        assert_eq!(course_with_code("info_td_2").fixed_session_type(), Some(SessionType::Td));
        assert_eq!(course_with_code("PHY-TP").fixed_session_type(), Some(SessionType::Tp));
        // TPE must win over the TP substring
        assert_eq!(course_with_code("CHEM-TPE").fixed_session_type(), Some(SessionType::Tpe));
    }

    #[test]
    fn test_duration_hours() {
        assert_eq!(duration_hours(t(8, 0), t(10, 0)), 2.0);
        assert_eq!(duration_hours(t(10, 15), t(12, 15)), 2.0);
        assert_eq!(duration_hours(t(14, 0), t(15, 30)), 1.5);
    }

    #[test]
    fn test_unavailability_blocks() {
        let recurring = Unavailability::Recurring {
            weekday: Weekday::Mon,
            start_time: t(8, 0),
            end_time: t(12, 0),
        };
        let monday = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2025, 9, 2).unwrap();

        assert!(recurring.blocks(monday, t(10, 0), t(12, 0)));
        assert!(!recurring.blocks(monday, t(14, 0), t(16, 0)));
        assert!(!recurring.blocks(tuesday, t(10, 0), t(12, 0)));

        let range = Unavailability::DateRange {
            from: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2025, 9, 5).unwrap(),
        };
        assert!(range.blocks(tuesday, t(8, 0), t(10, 0)));
        assert!(!range.blocks(NaiveDate::from_ymd_opt(2025, 9, 8).unwrap(), t(8, 0), t(10, 0)));
    }

    #[test]
    fn test_room_satisfies_equipment() {
        let mut course = course_with_code("BIO200");
        course.requires_laboratory = true;

        let lab = Room {
            id: Uuid::new_v4(),
            code: "LAB1".into(),
            name: "Biology lab".into(),
            capacity: 24,
            has_projector: false,
            has_computer: false,
            is_laboratory: true,
            is_active: true,
        };
        let amphi = Room { is_laboratory: false, ..lab.clone() };

        assert!(course.room_satisfies(&lab));
        assert!(!course.room_satisfies(&amphi));
    }
}
