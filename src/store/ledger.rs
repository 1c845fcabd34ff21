/*!
The Postgres `Ledger`, and the `Store` methods that run each workflow
operation in its own transaction.
*/
use std::collections::HashSet;

use async_trait::async_trait;
use tokio_postgres::{Client, Row, Transaction};

use super::{Store, DbError};
use crate::{
    ledger::{Enrollment, ExamRecord, Ledger, NewExam},
    subject::Subject,
    user::Student,
    workflow::{self, Error},
};

pub(super) fn enrollment_from_row(row: &Row) -> Result<Enrollment, DbError> {
    Ok(Enrollment {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        payment_approved: row.try_get("payment_approved")?,
        exam_passed: row.try_get("exam_passed")?,
    })
}

fn exam_from_row(row: &Row) -> Result<ExamRecord, DbError> {
    Ok(ExamRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        teacher_id: row.try_get("teacher_id")?,
        taken_at: row.try_get("taken_at")?,
        passed: row.try_get("passed")?,
        score: row.try_get("score")?,
    })
}

/// A `Ledger` over one open transaction. Nothing it writes sticks until
/// `commit()`; dropping it rolls everything back.
pub struct PgLedger<'a> {
    t: Transaction<'a>,
}

impl<'a> PgLedger<'a> {
    pub async fn begin(client: &'a mut Client) -> Result<PgLedger<'a>, DbError> {
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;
        Ok(PgLedger { t })
    }

    pub async fn commit(self) -> Result<(), DbError> {
        self.t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }
}

#[async_trait]
impl<'a> Ledger for PgLedger<'a> {
    /// Locks the student's row for the rest of the transaction, so
    /// concurrent enrollments and promotions of one student queue up.
    async fn student(&mut self, id: i64) -> Result<Option<Student>, DbError> {
        match self.t.query_opt(
            "SELECT users.id, users.name, users.uname, users.password,
                    students.gpa, students.level
                FROM users JOIN students ON students.id = users.id
                WHERE users.id = $1
                FOR UPDATE OF students",
            &[&id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(super::users::student_from_row(&row)?)),
        }
    }

    async fn subject(&mut self, id: i64) -> Result<Option<Subject>, DbError> {
        match self.t.query_opt(
            "SELECT id, name, level FROM subjects WHERE id = $1",
            &[&id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(super::subjects::subject_from_row(&row)?)),
        }
    }

    async fn teacher_exists(&mut self, id: i64) -> Result<bool, DbError> {
        let row = self.t.query_opt(
            "SELECT id FROM teachers WHERE id = $1",
            &[&id]
        ).await?;
        Ok(row.is_some())
    }

    async fn subjects_at_level(&mut self, level: i16) -> Result<Vec<Subject>, DbError> {
        let rows = self.t.query(
            "SELECT id, name, level FROM subjects WHERE level = $1 ORDER BY id",
            &[&level]
        ).await?;
        rows.iter().map(super::subjects::subject_from_row).collect()
    }

    async fn enrollments_for(&mut self, student_id: i64) -> Result<Vec<Enrollment>, DbError> {
        let rows = self.t.query(
            "SELECT * FROM enrollments WHERE student_id = $1 ORDER BY id",
            &[&student_id]
        ).await?;
        rows.iter().map(enrollment_from_row).collect()
    }

    async fn insert_enrollment(
        &mut self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Enrollment, DbError> {
        let row = self.t.query_one(
            "INSERT INTO enrollments (student_id, subject_id)
                VALUES ($1, $2)
                RETURNING *",
            &[&student_id, &subject_id]
        ).await?;
        enrollment_from_row(&row)
    }

    async fn approve_payment(&mut self, enrollment_id: i64) -> Result<Option<Enrollment>, DbError> {
        match self.t.query_opt(
            "UPDATE enrollments SET payment_approved = TRUE
                WHERE id = $1
                RETURNING *",
            &[&enrollment_id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(enrollment_from_row(&row)?)),
        }
    }

    async fn set_exam_passed(
        &mut self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Option<Enrollment>, DbError> {
        match self.t.query_opt(
            "UPDATE enrollments SET exam_passed = TRUE
                WHERE student_id = $1 AND subject_id = $2
                RETURNING *",
            &[&student_id, &subject_id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(enrollment_from_row(&row)?)),
        }
    }

    async fn insert_exam(&mut self, exam: &NewExam) -> Result<ExamRecord, DbError> {
        let row = self.t.query_one(
            "INSERT INTO exams
                (student_id, subject_id, teacher_id, taken_at, passed, score)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *",
            &[
                &exam.student_id, &exam.subject_id, &exam.teacher_id,
                &exam.taken_at, &exam.passed, &exam.score,
            ]
        ).await?;
        exam_from_row(&row)
    }

    async fn attempts(
        &mut self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Vec<ExamRecord>, DbError> {
        let rows = self.t.query(
            "SELECT * FROM exams
                WHERE student_id = $1 AND subject_id = $2
                ORDER BY id",
            &[&student_id, &subject_id]
        ).await?;
        rows.iter().map(exam_from_row).collect()
    }

    async fn passed_subjects(&mut self, student_id: i64) -> Result<HashSet<i64>, DbError> {
        let rows = self.t.query(
            "SELECT DISTINCT subject_id FROM exams
                WHERE student_id = $1 AND passed",
            &[&student_id]
        ).await?;
        let mut passed: HashSet<i64> = HashSet::with_capacity(rows.len());
        for row in rows.iter() {
            passed.insert(row.try_get("subject_id")?);
        }
        Ok(passed)
    }

    async fn set_level(&mut self, student_id: i64, level: i16) -> Result<(), DbError> {
        let n = self.t.execute(
            "UPDATE students SET level = $2 WHERE id = $1",
            &[&student_id, &level]
        ).await?;
        if n == 1 {
            Ok(())
        } else {
            Err(DbError(format!(
                "Setting level of student {} affected {} rows.", &student_id, &n
            )))
        }
    }
}

impl Store {
    pub async fn enroll(
        &self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Enrollment, Error> {
        log::trace!("Store::enroll( {}, {} ) called.", &student_id, &subject_id);

        let mut client = self.connect().await?;
        let mut l = PgLedger::begin(&mut client).await?;
        let e = workflow::enroll(&mut l, student_id, subject_id).await?;
        l.commit().await?;
        Ok(e)
    }

    pub async fn approve_payment(&self, enrollment_id: i64) -> Result<Enrollment, Error> {
        log::trace!("Store::approve_payment( {} ) called.", &enrollment_id);

        let mut client = self.connect().await?;
        let mut l = PgLedger::begin(&mut client).await?;
        let e = workflow::approve_payment(&mut l, enrollment_id).await?;
        l.commit().await?;
        Ok(e)
    }

    pub async fn enrollments_for(&self, student_id: i64) -> Result<Vec<Enrollment>, Error> {
        log::trace!("Store::enrollments_for( {} ) called.", &student_id);

        let mut client = self.connect().await?;
        let mut l = PgLedger::begin(&mut client).await?;
        let held = workflow::enrollments_for(&mut l, student_id).await?;
        Ok(held)
    }

    pub async fn record_exam(
        &self,
        student_id: i64,
        subject_id: i64,
        teacher_id: i64,
        passed: bool,
        score: f64,
    ) -> Result<ExamRecord, Error> {
        log::trace!(
            "Store::record_exam( {}, {}, {}, {}, {} ) called.",
            &student_id, &subject_id, &teacher_id, &passed, &score
        );

        let mut client = self.connect().await?;
        let mut l = PgLedger::begin(&mut client).await?;
        let rec = workflow::record_exam(
            &mut l, student_id, subject_id, teacher_id, passed, score
        ).await?;
        l.commit().await?;
        Ok(rec)
    }

    pub async fn list_attempts(
        &self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Vec<ExamRecord>, Error> {
        log::trace!("Store::list_attempts( {}, {} ) called.", &student_id, &subject_id);

        let mut client = self.connect().await?;
        let mut l = PgLedger::begin(&mut client).await?;
        let attempts = workflow::list_attempts(&mut l, student_id, subject_id).await?;
        Ok(attempts)
    }

    pub async fn can_advance(&self, student_id: i64) -> Result<bool, Error> {
        log::trace!("Store::can_advance( {} ) called.", &student_id);

        let mut client = self.connect().await?;
        let mut l = PgLedger::begin(&mut client).await?;
        let ok = workflow::can_advance(&mut l, student_id).await?;
        Ok(ok)
    }

    pub async fn promote(&self, student_id: i64) -> Result<Student, Error> {
        log::trace!("Store::promote( {} ) called.", &student_id);

        let mut client = self.connect().await?;
        let mut l = PgLedger::begin(&mut client).await?;
        let s = workflow::promote(&mut l, student_id).await?;
        l.commit().await?;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use float_cmp::approx_eq;
    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::subject::NewSubject;
    use crate::tests::ensure_logging;
    use crate::user::{NewStudent, NewTeacher, User};

    fn new_student(uname: &str) -> NewStudent {
        NewStudent {
            name: uname.to_owned(),
            uname: uname.to_owned(),
            password: "hunter2".to_owned(),
            gpa: "3.0".to_owned(),
            level: None,
        }
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn promotion_workflow() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let stud = match db.insert_student(&new_student("jsmith")).await.unwrap() {
            User::Student(s) => s.base.id,
            x => panic!("inserted a student, got {:?}", &x),
        };
        let teach = db.insert_teacher(&NewTeacher {
            name: "Mr Berro".to_owned(),
            uname: "berro".to_owned(),
            password: "toot".to_owned(),
            department: "Math".to_owned(),
            subject: "Math".to_owned(),
            salary: None,
        }).await.unwrap().id();
        let math = db.insert_subject(&NewSubject { name: "Math".to_owned(), level: 1 })
            .await.unwrap().id;
        let eng = db.insert_subject(&NewSubject { name: "English".to_owned(), level: 1 })
            .await.unwrap().id;

        let e = db.enroll(stud, math).await.unwrap();
        db.enroll(stud, eng).await.unwrap();
        assert!(matches!(
            db.enroll(stud, math).await,
            Err(Error::DuplicateEnrollment { .. })
        ));
        assert!(db.approve_payment(e.id).await.unwrap().payment_approved);

        let rec = db.record_exam(stud, math, teach, true, 81.5).await.unwrap();
        assert!(approx_eq!(f64, rec.score, 81.5));
        assert_eq!(db.list_attempts(stud, math).await.unwrap(), vec![rec]);
        assert!(matches!(db.promote(stud).await, Err(Error::PromotionDenied { .. })));

        db.record_exam(stud, eng, teach, true, 70.0).await.unwrap();
        assert!(db.can_advance(stud).await.unwrap());
        assert_eq!(db.promote(stud).await.unwrap().level, 2);

        let held = db.enrollments_for(stud).await.unwrap();
        assert!(held.iter().all(|e| e.exam_passed));

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn consistency_violation_rolls_back() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let stud = db.insert_student(&new_student("mjones")).await.unwrap().id();
        let teach = db.insert_teacher(&NewTeacher {
            name: "Ms Jenny".to_owned(),
            uname: "jenny".to_owned(),
            password: "toot".to_owned(),
            department: "English".to_owned(),
            subject: "English".to_owned(),
            salary: Some(1000.0),
        }).await.unwrap().id();
        let eng = db.insert_subject(&NewSubject { name: "English".to_owned(), level: 1 })
            .await.unwrap().id;

        assert!(matches!(
            db.record_exam(stud, eng, teach, true, 90.0).await,
            Err(Error::ConsistencyViolation { .. })
        ));
        assert!(db.list_attempts(stud, eng).await.unwrap().is_empty());

        db.nuke_database().await.unwrap();
    }
}
