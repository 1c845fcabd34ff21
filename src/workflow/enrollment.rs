/*!
Enrolling students in subjects and tracking the state of each enrollment.
*/
use crate::{
    ledger::{Enrollment, Ledger},
    MAX_ENROLLMENTS,
};

use super::{Entity, Error};

/**
Enrolls a student in a subject, with neither payment approved nor exam
passed.

Checks, in order: the student exists, the student has room for another
subject, the subject exists, and the student isn't already enrolled in it.
*/
pub async fn enroll<L: Ledger>(
    l: &mut L,
    student_id: i64,
    subject_id: i64,
) -> Result<Enrollment, Error> {
    log::trace!("enroll( L, {}, {} ) called.", &student_id, &subject_id);

    if l.student(student_id).await?.is_none() {
        return Err(Error::NotFound(Entity::Student, student_id));
    }

    let held = l.enrollments_for(student_id).await?;
    if held.len() >= MAX_ENROLLMENTS {
        return Err(Error::CapacityExceeded { student_id, held: held.len() });
    }

    if l.subject(subject_id).await?.is_none() {
        return Err(Error::NotFound(Entity::Subject, subject_id));
    }

    if held.iter().any(|e| e.subject_id == subject_id) {
        return Err(Error::DuplicateEnrollment { student_id, subject_id });
    }

    let e = l.insert_enrollment(student_id, subject_id).await?;
    log::info!(
        "Student {} enrolled in subject {} (enrollment {}).",
        &student_id, &subject_id, &e.id
    );
    Ok(e)
}

/// Marks payment for an enrollment as approved. Approving twice is fine.
pub async fn approve_payment<L: Ledger>(
    l: &mut L,
    enrollment_id: i64,
) -> Result<Enrollment, Error> {
    log::trace!("approve_payment( L, {} ) called.", &enrollment_id);

    match l.approve_payment(enrollment_id).await? {
        Some(e) => Ok(e),
        None => Err(Error::NotFound(Entity::Enrollment, enrollment_id)),
    }
}

/// Flags the student's enrollment in the subject as passed.
///
/// A missing enrollment is `NotEnrolled`; `record_exam()` reports it as a
/// `ConsistencyViolation`.
pub async fn mark_exam_passed<L: Ledger>(
    l: &mut L,
    student_id: i64,
    subject_id: i64,
) -> Result<Enrollment, Error> {
    log::trace!("mark_exam_passed( L, {}, {} ) called.", &student_id, &subject_id);

    match l.set_exam_passed(student_id, subject_id).await? {
        Some(e) => Ok(e),
        None => Err(Error::NotEnrolled { student_id, subject_id }),
    }
}

pub async fn enrollments_for<L: Ledger>(
    l: &mut L,
    student_id: i64,
) -> Result<Vec<Enrollment>, Error> {
    log::trace!("enrollments_for( L, {} ) called.", &student_id);

    if l.student(student_id).await?.is_none() {
        return Err(Error::NotFound(Entity::Student, student_id));
    }
    Ok(l.enrollments_for(student_id).await?)
}
