/*!
The enrollment, exam and promotion rules.

Every operation here is generic over a `Ledger`, runs entirely inside the
unit of work that ledger represents, and leaves committing (or not) to the
caller. `Store` wraps each of them in a Postgres transaction.
*/
use thiserror::Error;

use crate::{auth::AuthError, store::DbError};

mod enrollment;
mod exam;
mod promotion;

pub use enrollment::{approve_payment, enroll, enrollments_for, mark_exam_passed};
pub use exam::{list_attempts, record_exam};
pub use promotion::{can_advance, missing_subjects, promote};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    User,
    Student,
    Teacher,
    Manager,
    Subject,
    Enrollment,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Entity::User       => "user",
            Entity::Student    => "student",
            Entity::Teacher    => "teacher",
            Entity::Manager    => "manager",
            Entity::Subject    => "subject",
            Entity::Enrollment => "enrollment",
        };

        write!(f, "{}", token)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("There is no {0} with id {1}.")]
    NotFound(Entity, i64),

    #[error("Student {student_id} is not enrolled in subject {subject_id}.")]
    NotEnrolled { student_id: i64, subject_id: i64 },

    #[error("Student {student_id} is already enrolled in subject {subject_id}.")]
    DuplicateEnrollment { student_id: i64, subject_id: i64 },

    #[error("Student {student_id} already holds {held} enrollments; no more may be added.")]
    CapacityExceeded { student_id: i64, held: usize },

    #[error("Student {student_id} has not passed every level {level} subject (missing: {missing:?}).")]
    PromotionDenied { student_id: i64, level: i16, missing: Vec<i64> },

    #[error("Student {0} is already at the maximum level.")]
    MaxLevelReached(i64),

    #[error("Student {student_id} passed an exam in subject {subject_id} without being enrolled in it.")]
    ConsistencyViolation { student_id: i64, subject_id: i64 },

    #[error("Manager {manager_id} cannot report to manager {reports_to}; that would form a cycle.")]
    HierarchyCycle { manager_id: i64, reports_to: i64 },

    #[error("User name {0:?} is already in use.")]
    DuplicateUsername(String),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<tokio_postgres::Error> for Error {
    fn from(e: tokio_postgres::Error) -> Error {
        Error::Db(DbError::from(e))
    }
}

#[cfg(test)]
mod tests;
