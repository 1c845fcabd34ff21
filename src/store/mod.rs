/*!
Database interaction module.

The Postgres database to which this connects is meant to have the following
tables. Every user has a row in `users`; the role-specific data lives in
the table named by its `role`.

```sql
CREATE TABLE users (
    id       BIGSERIAL PRIMARY KEY,
    name     TEXT NOT NULL,
    uname    TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL,   /* Argon2id PHC string */
    role     TEXT NOT NULL    /* one of { 'STUDENT', 'TEACHER', 'MANAGER' } */
);

CREATE TABLE students (
    id    BIGINT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    gpa   TEXT NOT NULL,
    level SMALLINT NOT NULL CHECK (level BETWEEN 1 AND 5)
);

CREATE TABLE teachers (
    id         BIGINT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    department TEXT NOT NULL,
    subject    TEXT NOT NULL,
    salary     DOUBLE PRECISION
);

CREATE TABLE managers (
    id         BIGINT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    department TEXT NOT NULL,
    salary     DOUBLE PRECISION,
    reports_to BIGINT REFERENCES managers(id)
);

CREATE TABLE subjects (
    id    BIGSERIAL PRIMARY KEY,
    name  TEXT UNIQUE NOT NULL,
    level SMALLINT NOT NULL CHECK (level BETWEEN 1 AND 5)
);

CREATE TABLE enrollments (
    id               BIGSERIAL PRIMARY KEY,
    student_id       BIGINT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    subject_id       BIGINT NOT NULL REFERENCES subjects(id),
    payment_approved BOOL NOT NULL DEFAULT FALSE,
    exam_passed      BOOL NOT NULL DEFAULT FALSE,
    UNIQUE (student_id, subject_id)
);

CREATE TABLE exams (
    id         BIGSERIAL PRIMARY KEY,
    student_id BIGINT NOT NULL,   /* no REFERENCES; exams outlive students */
    subject_id BIGINT NOT NULL,
    teacher_id BIGINT NOT NULL,
    taken_at   TIMESTAMPTZ NOT NULL,
    passed     BOOL NOT NULL,
    score      DOUBLE PRECISION NOT NULL
);
```
*/
use std::collections::HashSet;
use std::fmt::Write;

use tokio_postgres::{Client, NoTls};

mod ledger;
mod subjects;
mod users;

pub use ledger::PgLedger;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'users'",
        "CREATE TABLE users (
            id       BIGSERIAL PRIMARY KEY,
            name     TEXT NOT NULL,
            uname    TEXT UNIQUE NOT NULL,
            password TEXT NOT NULL,
            role     TEXT NOT NULL
        )",
        "DROP TABLE users",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'students'",
        "CREATE TABLE students (
            id    BIGINT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            gpa   TEXT NOT NULL,
            level SMALLINT NOT NULL CHECK (level BETWEEN 1 AND 5)
        )",
        "DROP TABLE students",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'teachers'",
        "CREATE TABLE teachers (
            id         BIGINT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            department TEXT NOT NULL,
            subject    TEXT NOT NULL,
            salary     DOUBLE PRECISION
        )",
        "DROP TABLE teachers",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'managers'",
        "CREATE TABLE managers (
            id         BIGINT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            department TEXT NOT NULL,
            salary     DOUBLE PRECISION,
            reports_to BIGINT REFERENCES managers(id)
        )",
        "DROP TABLE managers",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'subjects'",
        "CREATE TABLE subjects (
            id    BIGSERIAL PRIMARY KEY,
            name  TEXT UNIQUE NOT NULL,
            level SMALLINT NOT NULL CHECK (level BETWEEN 1 AND 5)
        )",
        "DROP TABLE subjects",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'enrollments'",
        "CREATE TABLE enrollments (
            id               BIGSERIAL PRIMARY KEY,
            student_id       BIGINT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            subject_id       BIGINT NOT NULL REFERENCES subjects(id),
            payment_approved BOOL NOT NULL DEFAULT FALSE,
            exam_passed      BOOL NOT NULL DEFAULT FALSE,
            UNIQUE (student_id, subject_id)
        )",
        "DROP TABLE enrollments",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'exams'",
        "CREATE TABLE exams (
            id         BIGSERIAL PRIMARY KEY,
            student_id BIGINT NOT NULL,
            subject_id BIGINT NOT NULL,
            teacher_id BIGINT NOT NULL,
            taken_at   TIMESTAMPTZ NOT NULL,
            passed     BOOL NOT NULL,
            score      DOUBLE PRECISION NOT NULL
        )",
        "DROP TABLE exams",
    ),

    (
        "SELECT FROM pg_indexes WHERE indexname = 'exams_student_subject'",
        "CREATE INDEX exams_student_subject ON exams (student_id, subject_id)",
        "DROP INDEX IF EXISTS exams_student_subject",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    pub fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl std::error::Error for DbError {}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("Data DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            // Writing to a String can't fail.
            let _ = write!(&mut s, "; {}", dbe);
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

/// Names occurring more than once in an upload batch, sorted, each listed
/// once.
fn batch_duplicates<'a, I>(names: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashSet<&str> = HashSet::new();
    let mut dupes: Vec<&str> = names.into_iter()
        .filter(|n| !seen.insert(*n))
        .collect();
    dupes.sort_unstable();
    dupes.dedup();
    dupes
}

#[derive(Debug)]
pub struct Store {
    connection_string: String,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( {:?} ) called.", &connection_string);

        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!(
            "Store::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Data DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look at
    the ERROR level log output when testing to ensure this method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ....nuking complete.");
        Ok(())
    }
}
