/*!
Most-constrained-variable ordering for the placement loop.

Courses that are hardest to place go first: tight time-of-day constraints,
large hour volumes, special equipment, and instructors shared across many
courses all narrow the candidate space. The score is a heuristic, not a lower
bound; the ordering function is pluggable so deployments can experiment with
alternatives (random seeds, manual priority overrides).
*/

use crate::types::Course;

/// Signature of a course-ordering strategy.
pub type OrderingFn = fn(&[Course]) -> Vec<Course>;

/// Difficulty heuristic for one course relative to its peers.
pub fn difficulty_score(course: &Course, peers: &[Course]) -> f64 {
    let mut difficulty = 0.0;

    // Fixed-type courses compete for a reduced slot pool: CM is morning-only,
    // TP afternoon-only.
    let code = course.code.to_uppercase();
    if code.contains("-CM") || code.contains("_CM") {
        difficulty += 50.0;
    }
    if code.contains("-TP") || code.contains("_TP") {
        difficulty += 40.0;
    }

    // Volume to place
    difficulty += course.total_hours * 2.0;

    // Equipment narrows the room pool
    if course.requires_laboratory {
        difficulty += 30.0;
    }
    if course.requires_computer {
        difficulty += 20.0;
    }

    // A shared instructor is less available
    if let Some(instructor_id) = course.instructor_id {
        let shared = peers
            .iter()
            .filter(|c| c.id != course.id && c.instructor_id == Some(instructor_id))
            .count();
        difficulty += shared as f64 * 10.0;
    }

    // External hints: predicted difficulty and manual priority (1 = high)
    if let Some(hint) = course.difficulty_score {
        difficulty += hint * 20.0;
    }
    if let Some(priority) = course.priority {
        difficulty += f64::from(5u8.saturating_sub(priority)) * 10.0;
    }

    difficulty
}

/// Default ordering: descending difficulty, course code as tiebreaker.
pub fn order_by_difficulty(courses: &[Course]) -> Vec<Course> {
    let mut ordered: Vec<Course> = courses.to_vec();
    ordered.sort_by(|a, b| {
        difficulty_score(b, courses)
            .partial_cmp(&difficulty_score(a, courses))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.code.cmp(&b.code))
    });

    for (i, course) in ordered.iter().take(5).enumerate() {
        log::info!(
            "Placement order {}: {} (difficulty {:.0})",
            i + 1,
            course.code,
            difficulty_score(course, courses)
        );
    }

    ordered
}
