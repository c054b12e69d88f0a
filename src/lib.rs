//! Chronotable - a university timetable generation and evaluation engine
//!
//! This library provides the core scheduling machinery, including:
//! - Greedy constraint-propagating placement with pedagogical sequencing
//! - Recurrence expansion of weekly templates into dated occurrences
//! - O(1) allocation indices for room/instructor conflict checks
//! - Conflict detection during generation and post-hoc auditing
//! - A weighted objective function for schedule quality

pub mod allocation;
pub mod conflicts;
pub mod engine;
pub mod evaluator;
pub mod generator;
pub mod occurrences;
pub mod recurrence;
pub mod sequencing;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use types::{
    AcademicPeriod, Conflict, ConflictType, Course, FlexibilityLevel, GenerationConfig,
    GenerationResult, GenerationStats, Instructor, MonthlyStep, Occurrence, OccurrenceStatus,
    PreviewData, RecurrencePolicy, RecurringWindow, Room, Schedule, ScheduleStatus, ScoringWeights,
    SessionTemplate, SessionType, Severity, SpecialWeek, StudentClass, TimeSlot, Unavailability,
};

// Re-export core functionality
pub use allocation::AllocationIndex;
pub use conflicts::{AuditContext, ConflictDetector};
pub use engine::{ConflictReport, OccurrenceUpdate, TimetableEngine};
pub use evaluator::{
    EvaluationWeights, Evaluator, Grade, HardViolations, ScoreReport, SoftScores, composite_score,
};
pub use generator::Generator;
pub use occurrences::OccurrenceModification;
pub use recurrence::{Candidate, Expansion, expand_template};
pub use sequencing::{
    ScoreCache, SessionRecord, day_score, next_session_type, session_priority, time_score,
    validate_sequence,
};
pub use store::{BulkWriteReport, EntityGateway, InMemoryStore, ScheduleWriter};

// Error types
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown schedule: {0}")]
    UnknownSchedule(Uuid),

    #[error("Class {0} has no courses to schedule")]
    EmptyClass(Uuid),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Generation exceeded its {budget_seconds}s budget after {elapsed_seconds:.1}s")]
    Timeout { budget_seconds: u64, elapsed_seconds: f64 },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Unknown schedule: {0}")]
    UnknownSchedule(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
