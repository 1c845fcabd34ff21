/*!
An in-memory `Ledger` for exercising the workflow without a database.

`MemStore::begin()` hands out a `MemLedger` working on a private copy of
the tables; `MemLedger::commit()` writes the copy back. Dropping a
`MemLedger` without committing discards everything it did, the same way an
uncommitted Postgres transaction would.
*/
use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::*;
use crate::user::BaseUser;

#[derive(Clone, Debug, Default)]
struct Tables {
    students: Vec<Student>,
    teachers: Vec<i64>,
    subjects: Vec<Subject>,
    enrollments: Vec<Enrollment>,
    exams: Vec<ExamRecord>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemStore {
    tables: Mutex<Tables>,
}

impl MemStore {
    pub fn new() -> Self { Self::default() }

    pub fn begin(&self) -> MemLedger<'_> {
        let work = self.tables.lock().unwrap().clone();
        MemLedger { store: self, work }
    }

    pub fn add_student(&self, uname: &str, level: i16) -> i64 {
        let mut t = self.tables.lock().unwrap();
        let id = t.next_id();
        t.students.push(Student {
            base: BaseUser {
                id,
                name: uname.to_owned(),
                uname: uname.to_owned(),
                password_hash: String::new(),
            },
            gpa: "0.0".to_owned(),
            level,
        });
        id
    }

    pub fn add_teacher(&self) -> i64 {
        let mut t = self.tables.lock().unwrap();
        let id = t.next_id();
        t.teachers.push(id);
        id
    }

    pub fn add_subject(&self, name: &str, level: i16) -> i64 {
        let mut t = self.tables.lock().unwrap();
        let id = t.next_id();
        t.subjects.push(Subject { id, name: name.to_owned(), level });
        id
    }

    pub fn student(&self, id: i64) -> Option<Student> {
        self.tables.lock().unwrap()
            .students.iter()
            .find(|s| s.base.id == id)
            .cloned()
    }

    pub fn enrollments(&self) -> Vec<Enrollment> {
        self.tables.lock().unwrap().enrollments.clone()
    }

    pub fn exams(&self) -> Vec<ExamRecord> {
        self.tables.lock().unwrap().exams.clone()
    }
}

pub struct MemLedger<'a> {
    store: &'a MemStore,
    work: Tables,
}

impl<'a> MemLedger<'a> {
    pub fn commit(self) {
        *self.store.tables.lock().unwrap() = self.work;
    }
}

#[async_trait]
impl<'a> Ledger for MemLedger<'a> {
    async fn student(&mut self, id: i64) -> Result<Option<Student>, DbError> {
        Ok(self.work.students.iter().find(|s| s.base.id == id).cloned())
    }

    async fn subject(&mut self, id: i64) -> Result<Option<Subject>, DbError> {
        Ok(self.work.subjects.iter().find(|s| s.id == id).cloned())
    }

    async fn teacher_exists(&mut self, id: i64) -> Result<bool, DbError> {
        Ok(self.work.teachers.contains(&id))
    }

    async fn subjects_at_level(&mut self, level: i16) -> Result<Vec<Subject>, DbError> {
        Ok(self.work.subjects.iter().filter(|s| s.level == level).cloned().collect())
    }

    async fn enrollments_for(&mut self, student_id: i64) -> Result<Vec<Enrollment>, DbError> {
        Ok(self.work.enrollments.iter()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn insert_enrollment(
        &mut self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Enrollment, DbError> {
        if self.work.enrollments.iter()
            .any(|e| e.student_id == student_id && e.subject_id == subject_id)
        {
            return Err(DbError::from(format!(
                "unique violation: enrollment ({}, {})", student_id, subject_id
            )));
        }
        let e = Enrollment {
            id: self.work.next_id(),
            student_id,
            subject_id,
            payment_approved: false,
            exam_passed: false,
        };
        self.work.enrollments.push(e.clone());
        Ok(e)
    }

    async fn approve_payment(&mut self, enrollment_id: i64) -> Result<Option<Enrollment>, DbError> {
        Ok(self.work.enrollments.iter_mut()
            .find(|e| e.id == enrollment_id)
            .map(|e| {
                e.payment_approved = true;
                e.clone()
            }))
    }

    async fn set_exam_passed(
        &mut self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Option<Enrollment>, DbError> {
        Ok(self.work.enrollments.iter_mut()
            .find(|e| e.student_id == student_id && e.subject_id == subject_id)
            .map(|e| {
                e.exam_passed = true;
                e.clone()
            }))
    }

    async fn insert_exam(&mut self, exam: &NewExam) -> Result<ExamRecord, DbError> {
        let rec = ExamRecord {
            id: self.work.next_id(),
            student_id: exam.student_id,
            subject_id: exam.subject_id,
            teacher_id: exam.teacher_id,
            taken_at: exam.taken_at,
            passed: exam.passed,
            score: exam.score,
        };
        self.work.exams.push(rec.clone());
        Ok(rec)
    }

    async fn attempts(
        &mut self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Vec<ExamRecord>, DbError> {
        Ok(self.work.exams.iter()
            .filter(|x| x.student_id == student_id && x.subject_id == subject_id)
            .cloned()
            .collect())
    }

    async fn passed_subjects(&mut self, student_id: i64) -> Result<HashSet<i64>, DbError> {
        Ok(self.work.exams.iter()
            .filter(|x| x.student_id == student_id && x.passed)
            .map(|x| x.subject_id)
            .collect())
    }

    async fn set_level(&mut self, student_id: i64, level: i16) -> Result<(), DbError> {
        match self.work.students.iter_mut().find(|s| s.base.id == student_id) {
            Some(s) => {
                s.level = level;
                Ok(())
            },
            None => Err(DbError::from(format!("no student with id {}", student_id))),
        }
    }
}

/**
Runs `$body` against a fresh `MemLedger` bound to `$l`, committing only if
the result is `Ok`.

```ignore
let e = tx!(mem, |l| enroll(&mut l, stud, math).await).unwrap();
```
*/
macro_rules! tx {
    ($store:expr, |$l:ident| $body:expr) => {{
        let mut $l = $store.begin();
        let res = $body;
        if res.is_ok() {
            $l.commit();
        }
        res
    }};
}
pub(crate) use tx;
