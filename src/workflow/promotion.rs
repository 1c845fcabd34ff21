/*!
Level promotion.

A student may move up a level once every subject in the catalog at the
student's current level has at least one passing attempt by that student.
Enrollment doesn't enter into it: a level-1 subject the student never
enrolled in still has to be passed. Levels only ever go up, one at a time,
and stop at `MAX_LEVEL`.
*/
use crate::{
    ledger::Ledger,
    user::Student,
    MAX_LEVEL,
};

use super::{Entity, Error};

/// Ids of the subjects at the student's level without a passing attempt.
pub async fn missing_subjects<L: Ledger>(
    l: &mut L,
    student: &Student,
) -> Result<Vec<i64>, Error> {
    let student_id = student.base.id;
    let gating = l.subjects_at_level(student.level).await?;
    let passed = l.passed_subjects(student_id).await?;

    let missing: Vec<i64> = gating.iter()
        .map(|s| s.id)
        .filter(|id| !passed.contains(id))
        .collect();

    log::trace!(
        "Student {} at level {}: {} gating subjects, {} missing.",
        &student_id, &student.level, gating.len(), missing.len()
    );
    Ok(missing)
}

pub async fn can_advance<L: Ledger>(
    l: &mut L,
    student_id: i64,
) -> Result<bool, Error> {
    log::trace!("can_advance( L, {} ) called.", &student_id);

    let student = match l.student(student_id).await? {
        Some(s) => s,
        None => { return Err(Error::NotFound(Entity::Student, student_id)); },
    };

    Ok(missing_subjects(l, &student).await?.is_empty())
}

/**
Moves the student up exactly one level.

Eligibility is checked before the ceiling, so a level-5 student who hasn't
passed everything is told `PromotionDenied` rather than `MaxLevelReached`.
*/
pub async fn promote<L: Ledger>(
    l: &mut L,
    student_id: i64,
) -> Result<Student, Error> {
    log::trace!("promote( L, {} ) called.", &student_id);

    let mut student = match l.student(student_id).await? {
        Some(s) => s,
        None => { return Err(Error::NotFound(Entity::Student, student_id)); },
    };

    let missing = missing_subjects(l, &student).await?;
    if !missing.is_empty() {
        return Err(Error::PromotionDenied {
            student_id,
            level: student.level,
            missing,
        });
    }

    if student.level >= MAX_LEVEL {
        return Err(Error::MaxLevelReached(student_id));
    }

    let new_level = student.level + 1;
    l.set_level(student_id, new_level).await?;
    log::info!(
        "Student {} ({}) promoted from level {} to {}.",
        &student_id, &student.base.uname, &student.level, &new_level
    );

    student.level = new_level;
    Ok(student)
}
