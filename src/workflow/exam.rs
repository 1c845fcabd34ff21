/*!
Recording and listing exam attempts.
*/
use time::OffsetDateTime;

use crate::ledger::{ExamRecord, Ledger, NewExam};

use super::{enrollment::mark_exam_passed, Entity, Error};

/**
Records one exam sitting, stamped with the current time.

A passing attempt also flags the matching enrollment as passed. If there
is no such enrollment the whole thing fails with `ConsistencyViolation`;
the caller must not commit, so the attempt isn't kept either.
*/
pub async fn record_exam<L: Ledger>(
    l: &mut L,
    student_id: i64,
    subject_id: i64,
    teacher_id: i64,
    passed: bool,
    score: f64,
) -> Result<ExamRecord, Error> {
    log::trace!(
        "record_exam( L, {}, {}, {}, {}, {} ) called.",
        &student_id, &subject_id, &teacher_id, &passed, &score
    );

    if !score.is_finite() {
        return Err(Error::Invalid(format!("{} is not a usable score.", &score)));
    }
    if l.student(student_id).await?.is_none() {
        return Err(Error::NotFound(Entity::Student, student_id));
    }
    if l.subject(subject_id).await?.is_none() {
        return Err(Error::NotFound(Entity::Subject, subject_id));
    }
    if !l.teacher_exists(teacher_id).await? {
        return Err(Error::NotFound(Entity::Teacher, teacher_id));
    }

    let exam = NewExam {
        student_id,
        subject_id,
        teacher_id,
        taken_at: OffsetDateTime::now_utc(),
        passed,
        score,
    };
    let rec = l.insert_exam(&exam).await?;

    if passed {
        match mark_exam_passed(l, student_id, subject_id).await {
            Ok(_) => {},
            Err(Error::NotEnrolled { .. }) => {
                log::error!(
                    "Passing exam recorded for student {} in subject {}, who isn't enrolled.",
                    &student_id, &subject_id
                );
                return Err(Error::ConsistencyViolation { student_id, subject_id });
            },
            Err(e) => { return Err(e); },
        }
    }

    log::info!(
        "Exam {} recorded: student {}, subject {}, passed: {}, score: {}.",
        &rec.id, &student_id, &subject_id, &passed, &score
    );
    Ok(rec)
}

/// All attempts for the pair in the order they were recorded. Unknown ids
/// just give an empty list.
pub async fn list_attempts<L: Ledger>(
    l: &mut L,
    student_id: i64,
    subject_id: i64,
) -> Result<Vec<ExamRecord>, Error> {
    log::trace!("list_attempts( L, {}, {} ) called.", &student_id, &subject_id);

    Ok(l.attempts(student_id, subject_id).await?)
}
