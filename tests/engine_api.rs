//! Engine-level scenarios through the public facade: generate, evaluate,
//! detect conflicts, and the occurrence operations.

use chrono::{NaiveDate, NaiveTime, Weekday};
use std::collections::BTreeMap;
use uuid::Uuid;

use chronotable::{
    AcademicPeriod, Course, GenerationConfig, Grade, InMemoryStore, Instructor, Occurrence,
    OccurrenceModification, OccurrenceStatus, Room, Schedule, SessionType, Severity, StudentClass,
    TimeSlot, TimetableEngine,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

struct Campus {
    engine: TimetableEngine<InMemoryStore>,
    schedule_id: Uuid,
    second_room_id: Uuid,
}

/// One class, one course (30h split CM/TD), two rooms, one instructor, and
/// the standard Mon-Fri morning/afternoon slot grid.
fn campus() -> Campus {
    init_logging();
    let mut store = InMemoryStore::new();

    for weekday in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
        for (start, end) in [(t(8, 0), t(10, 0)), (t(14, 0), t(16, 0))] {
            store.insert_time_slot(TimeSlot {
                id: Uuid::new_v4(),
                weekday,
                start_time: start,
                end_time: end,
                is_active: true,
            });
        }
    }

    let instructor = Instructor {
        id: Uuid::new_v4(),
        name: "Dr. Nkotto".into(),
        department_id: None,
        max_hours_per_week: 20.0,
        preferred_days: vec![Weekday::Mon, Weekday::Tue],
        unavailabilities: vec![],
        is_active: true,
    };

    let course = Course {
        id: Uuid::new_v4(),
        code: "MATH101".into(),
        name: "Mathematical Analysis".into(),
        department_id: None,
        instructor_id: Some(instructor.id),
        total_hours: 30.0,
        hours_per_week: 0.0,
        session_hours: BTreeMap::from([(SessionType::Cm, 15.0), (SessionType::Td, 15.0)]),
        min_sessions_per_week: 1,
        max_sessions_per_week: 5,
        min_room_capacity: 0,
        requires_projector: false,
        requires_computer: false,
        requires_laboratory: false,
        difficulty_score: None,
        priority: None,
        excluded_times: vec![],
        is_active: true,
    };

    let class = StudentClass {
        id: Uuid::new_v4(),
        code: "L3-MATH".into(),
        level: "L3".into(),
        student_count: 30,
        course_ids: vec![course.id],
    };

    let schedule = Schedule::new(
        "L3 Mathematics S1",
        class.id,
        AcademicPeriod {
            name: "2025-S1".into(),
            start_date: d(2025, 9, 1),
            end_date: d(2025, 12, 31),
        },
    );
    let schedule_id = schedule.id;

    let main_room = Room {
        id: Uuid::new_v4(),
        code: "A101".into(),
        name: "Amphi A101".into(),
        capacity: 40,
        has_projector: true,
        has_computer: false,
        is_laboratory: false,
        is_active: true,
    };
    let second_room = Room { id: Uuid::new_v4(), code: "A102".into(), ..main_room.clone() };
    let second_room_id = second_room.id;

    store.insert_instructor(instructor);
    store.insert_course(course);
    store.insert_class(class);
    store.insert_schedule(schedule);
    store.insert_room(main_room);
    store.insert_room(second_room);

    Campus { engine: TimetableEngine::new(store), schedule_id, second_room_id }
}

fn scheduled_hours(store: &InMemoryStore) -> f64 {
    store
        .all_occurrences()
        .iter()
        .filter(|o| o.is_scheduled())
        .map(Occurrence::duration_hours)
        .sum()
}

#[test]
fn test_generate_then_evaluate_and_audit() {
    let mut campus = campus();
    let config = GenerationConfig::new(d(2025, 9, 1), d(2025, 12, 12));

    let result = campus.engine.generate(campus.schedule_id, &config).unwrap();
    assert!(result.success, "{}", result.message);
    assert_eq!(result.occurrences_created, 15);

    // A conflict-free run never reports critical records
    let report = campus.engine.detect_conflicts(campus.schedule_id).unwrap();
    assert!(report.conflicts.iter().all(|c| c.severity != Severity::Critical));
    assert_eq!(report.risk_score, 0);

    // The evaluation is valid and deterministic
    let first = campus.engine.evaluate(campus.schedule_id).unwrap();
    assert!(first.is_valid(), "hard violations: {:?}", first.hard_violations);
    assert!(first.global_score.is_some());
    assert!(first.soft_scores.pedagogical_quality > 0.0);

    let second = campus.engine.evaluate(campus.schedule_id).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_empty_schedule_scores_f() {
    let mut campus = campus();
    // Nothing generated: the course volume is entirely missing
    let report = campus.engine.evaluate(campus.schedule_id).unwrap();
    assert!(!report.is_valid());
    assert_eq!(report.hard_violations.missing_course_hours, 1);
    assert_eq!(report.global_score, None);
    assert_eq!(report.grade, Grade::F);
    assert_eq!(report.safe_score(), 0.0);

    let _ = campus.engine.generate(campus.schedule_id, &GenerationConfig::new(
        d(2025, 9, 1),
        d(2025, 12, 12),
    ));
    let report = campus.engine.evaluate(campus.schedule_id).unwrap();
    assert!(report.is_valid());
}

#[test]
fn test_cancel_then_reschedule_restores_hour_total() {
    let mut campus = campus();
    let config = GenerationConfig::new(d(2025, 9, 1), d(2025, 12, 12));
    campus.engine.generate(campus.schedule_id, &config).unwrap();

    let before = scheduled_hours(campus.engine.store());
    assert_eq!(before, 30.0);

    let victim = campus.engine.store().all_occurrences()[3].clone();
    let cancelled = campus
        .engine
        .cancel_occurrence(victim.id, "Amphitheater maintenance")
        .unwrap();
    assert_eq!(cancelled.status, OccurrenceStatus::Cancelled);
    assert_eq!(scheduled_hours(campus.engine.store()), before - 2.0);

    // Put the hours back on a free slot in December
    let update = campus
        .engine
        .reschedule_occurrence(victim.id, d(2025, 12, 1), t(8, 0), t(10, 0), None, None)
        .unwrap();
    assert_eq!(update.occurrence.rescheduled_from, Some(victim.id));
    assert!(update.occurrence.time_modified);
    assert!(update.conflicts.is_empty(), "unexpected: {:?}", update.conflicts);
    assert_eq!(scheduled_hours(campus.engine.store()), before);
}

#[test]
fn test_modify_occurrence_sets_flags_and_rechecks() {
    let mut campus = campus();
    let config = GenerationConfig::new(d(2025, 9, 1), d(2025, 12, 12));
    campus.engine.generate(campus.schedule_id, &config).unwrap();

    let victim = campus.engine.store().all_occurrences()[0].clone();
    let update = campus
        .engine
        .modify_occurrence(
            victim.id,
            &OccurrenceModification {
                room_id: Some(campus.second_room_id),
                notes: Some("Moved for the open-day event".into()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(update.occurrence.room_id, campus.second_room_id);
    assert!(update.occurrence.room_modified);
    assert!(!update.occurrence.time_modified);
    assert_eq!(update.occurrence.notes.as_deref(), Some("Moved for the open-day event"));
    assert!(update.conflicts.is_empty(), "unexpected: {:?}", update.conflicts);

    // The change is persisted
    let stored = campus
        .engine
        .store()
        .all_occurrences()
        .into_iter()
        .find(|o| o.id == victim.id)
        .unwrap();
    assert_eq!(stored.room_id, campus.second_room_id);
}

#[test]
fn test_resolving_a_clash_restores_a_valid_score() {
    let mut campus = campus();
    let config = GenerationConfig::new(d(2025, 9, 1), d(2025, 12, 12));
    campus.engine.generate(campus.schedule_id, &config).unwrap();

    let occurrences = campus.engine.store().all_occurrences();
    let (first, second) = (occurrences[0].clone(), occurrences[1].clone());

    // Force a room and instructor double booking
    let update = campus
        .engine
        .reschedule_occurrence(
            second.id,
            first.actual_date,
            first.start_time,
            first.end_time,
            Some(first.room_id),
            None,
        )
        .unwrap();
    assert!(update.conflicts.iter().any(|c| c.severity == Severity::Critical));

    let audit = campus.engine.detect_conflicts(campus.schedule_id).unwrap();
    assert!(audit.risk_score >= 50, "risk {}", audit.risk_score);
    let broken = campus.engine.evaluate(campus.schedule_id).unwrap();
    assert!(!broken.is_valid());
    assert_eq!(broken.global_score, None);

    // Resolving the clash without creating new ones strictly improves the
    // schedule: the score climbs back from invalid to a finite value
    let clashing = update.occurrence.id;
    campus.engine.cancel_occurrence(clashing, "Resolved double booking").unwrap();
    let repaired = campus.engine.evaluate(campus.schedule_id).unwrap();
    assert!(repaired.is_valid(), "still invalid: {:?}", repaired.hard_violations);
    assert!(
        repaired.global_score.unwrap_or(f64::NEG_INFINITY)
            > broken.global_score.unwrap_or(f64::NEG_INFINITY)
    );
}

#[test]
fn test_modify_into_a_clash_is_reported() {
    let mut campus = campus();
    let config = GenerationConfig::new(d(2025, 9, 1), d(2025, 12, 12));
    campus.engine.generate(campus.schedule_id, &config).unwrap();

    let occurrences = campus.engine.store().all_occurrences();
    let first = &occurrences[0];
    let second = &occurrences[1];

    // Drag the second occurrence onto the first one's slot and room
    let update = campus
        .engine
        .modify_occurrence(
            second.id,
            &OccurrenceModification {
                start_time: Some(first.start_time),
                end_time: Some(first.end_time),
                ..Default::default()
            },
        )
        .unwrap();

    // Same day only when the two initial placements shared a date; force the
    // date match through a reschedule otherwise
    if second.actual_date == first.actual_date {
        assert!(
            update.conflicts.iter().any(|c| c.severity == Severity::Critical),
            "expected a critical clash, got {:?}",
            update.conflicts
        );
    } else {
        let update = campus
            .engine
            .reschedule_occurrence(
                second.id,
                first.actual_date,
                first.start_time,
                first.end_time,
                Some(first.room_id),
                None,
            )
            .unwrap();
        assert!(
            update.conflicts.iter().any(|c| c.severity == Severity::Critical),
            "expected a critical clash, got {:?}",
            update.conflicts
        );
    }
}
