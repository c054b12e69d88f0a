mod conflict;
mod entities;
mod schedule;

pub use conflict::{Conflict, ConflictType, Severity, risk_score};
pub use entities::{
    Course, Instructor, RecurringWindow, Room, SessionType, StudentClass, TimeSlot, Unavailability,
    duration_hours,
};
pub use schedule::{
    AcademicPeriod, FlexibilityLevel, GenerationConfig, GenerationResult, GenerationStats,
    MonthlyStep, Occurrence, OccurrenceStatus, PreviewData, RecurrencePolicy, Schedule,
    ScheduleStatus, ScoringWeights, SessionTemplate, SpecialWeek,
};
