use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    RoomDoubleBooking,
    InstructorDoubleBooking,
    InstructorOverload,
    EquipmentMismatch,
    RoomOvercapacity,
    VolumeInconsistency,
    MissingCourseHours,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used by the risk-score roll-up.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Critical => 50,
            Self::High => 30,
            Self::Medium => 15,
            Self::Low => 5,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Wire-stable conflict record surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub date: NaiveDate,
    /// "HH:MM-HH:MM" range of the affected slot.
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub courses: Vec<String>,
    pub message: String,
}

impl Conflict {
    pub fn new(
        conflict_type: ConflictType,
        severity: Severity,
        date: NaiveDate,
        time: String,
        message: impl Into<String>,
    ) -> Self {
        Self {
            conflict_type,
            severity,
            date,
            time,
            resource: None,
            courses: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_courses(mut self, courses: Vec<String>) -> Self {
        self.courses = courses;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// A conflict that must block a commit when `allow_conflicts` is off.
    pub fn is_blocking(&self) -> bool {
        matches!(self.severity, Severity::Critical | Severity::High)
            && matches!(
                self.conflict_type,
                ConflictType::RoomDoubleBooking
                    | ConflictType::InstructorDoubleBooking
                    | ConflictType::InstructorOverload
            )
    }

    pub fn format_time_range(start: NaiveTime, end: NaiveTime) -> String {
        format!("{}-{}", start.format("%H:%M"), end.format("%H:%M"))
    }
}

/// Weighted conflict roll-up, capped at 100.
pub fn risk_score(conflicts: &[Conflict]) -> u32 {
    conflicts.iter().map(|c| c.severity.weight()).sum::<u32>().min(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(severity: Severity) -> Conflict {
        Conflict::new(
            ConflictType::RoomDoubleBooking,
            severity,
            NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            "08:00-10:00".to_string(),
            "test",
        )
    }

    #[test]
    fn test_risk_score_weights_and_cap() {
        assert_eq!(risk_score(&[]), 0);
        assert_eq!(risk_score(&[conflict(Severity::Low)]), 5);
        assert_eq!(risk_score(&[conflict(Severity::Medium), conflict(Severity::High)]), 45);
        // Three criticals would be 150; capped at 100
        let many = vec![
            conflict(Severity::Critical),
            conflict(Severity::Critical),
            conflict(Severity::Critical),
        ];
        assert_eq!(risk_score(&many), 100);
    }

    #[test]
    fn test_blocking_classification() {
        assert!(conflict(Severity::Critical).is_blocking());
        assert!(conflict(Severity::High).is_blocking());
        assert!(!conflict(Severity::Medium).is_blocking());

        let warning = Conflict::new(
            ConflictType::VolumeInconsistency,
            Severity::Low,
            NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            "08:00-10:00".to_string(),
            "volume mismatch",
        );
        assert!(!warning.is_blocking());
    }

    #[test]
    fn test_wire_format() {
        let t8 = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let t10 = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let c = Conflict::new(
            ConflictType::InstructorDoubleBooking,
            Severity::Critical,
            NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            Conflict::format_time_range(t8, t10),
            "Instructor already booked",
        )
        .with_resource("Dr. Ada")
        .with_courses(vec!["MATH101".into(), "PHY201".into()]);

        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "instructor_double_booking");
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["date"], "2025-09-01");
        assert_eq!(json["time"], "08:00-10:00");
        assert_eq!(json["resource"], "Dr. Ada");
        assert_eq!(json["courses"][0], "MATH101");
    }
}
