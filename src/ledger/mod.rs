/*!
Enrollment and exam records, and the `Ledger` trait through which the
workflow reads and writes them.

A `Ledger` is always a single unit of work: the Postgres implementation
wraps one transaction, and nothing written through it is visible to anyone
else until the caller commits.
*/
use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    store::DbError,
    subject::Subject,
    user::Student,
};

#[cfg(test)]
pub mod mem;

/// A student's registration in a subject.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    pub payment_approved: bool,
    pub exam_passed: bool,
}

/// One recorded exam sitting. Never altered once written.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExamRecord {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub taken_at: OffsetDateTime,
    pub passed: bool,
    pub score: f64,
}

/// An exam attempt that hasn't been assigned an `id` yet.
#[derive(Clone, Debug, PartialEq)]
pub struct NewExam {
    pub student_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub taken_at: OffsetDateTime,
    pub passed: bool,
    pub score: f64,
}

#[async_trait]
pub trait Ledger: Send {
    async fn student(&mut self, id: i64) -> Result<Option<Student>, DbError>;

    async fn subject(&mut self, id: i64) -> Result<Option<Subject>, DbError>;

    async fn teacher_exists(&mut self, id: i64) -> Result<bool, DbError>;

    async fn subjects_at_level(&mut self, level: i16) -> Result<Vec<Subject>, DbError>;

    /// All of a student's enrollments, in `id` order.
    async fn enrollments_for(&mut self, student_id: i64) -> Result<Vec<Enrollment>, DbError>;

    async fn insert_enrollment(
        &mut self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Enrollment, DbError>;

    /// Sets `payment_approved`; `None` if there's no such enrollment.
    async fn approve_payment(&mut self, enrollment_id: i64) -> Result<Option<Enrollment>, DbError>;

    /// Sets `exam_passed` on the enrollment for the pair; `None` if there
    /// isn't one.
    async fn set_exam_passed(
        &mut self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Option<Enrollment>, DbError>;

    async fn insert_exam(&mut self, exam: &NewExam) -> Result<ExamRecord, DbError>;

    /// Every attempt for the pair, in the order they were recorded.
    async fn attempts(
        &mut self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Vec<ExamRecord>, DbError>;

    /// Ids of the subjects in which the student has at least one passing
    /// attempt.
    async fn passed_subjects(&mut self, student_id: i64) -> Result<HashSet<i64>, DbError>;

    async fn set_level(&mut self, student_id: i64, level: i16) -> Result<(), DbError>;
}
