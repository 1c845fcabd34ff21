/*!
`Store` methods for the subject catalog.
*/
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{Row, types::{ToSql, Type}};

use super::{batch_duplicates, Store, DbError};
use crate::{
    subject::{NewSubject, Subject},
    user::check_level,
    workflow::{Entity, Error},
};

pub(super) fn subject_from_row(row: &Row) -> Result<Subject, DbError> {
    Ok(Subject {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        level: row.try_get("level")?,
    })
}

impl Store {
    pub async fn insert_subject(&self, ns: &NewSubject) -> Result<Subject, Error> {
        log::trace!("Store::insert_subject( {:?} ) called.", ns);

        check_level(ns.level).map_err(Error::Invalid)?;

        let client = self.connect().await?;
        let row = client.query_opt(
            "INSERT INTO subjects (name, level) VALUES ($1, $2)
                ON CONFLICT (name) DO NOTHING
                RETURNING id, name, level",
            &[&ns.name, &ns.level]
        ).await?;

        match row {
            Some(row) => Ok(subject_from_row(&row)?),
            None => Err(Error::Invalid(format!(
                "A subject named {:?} already exists.", &ns.name
            ))),
        }
    }

    /// Inserts every subject in one transaction, or none of them.
    pub async fn insert_subjects(&self, subjects: &[NewSubject]) -> Result<usize, Error> {
        log::trace!("Store::insert_subjects( [ {} subjects ] ) called.", subjects.len());

        for ns in subjects.iter() {
            check_level(ns.level)
                .map_err(|e| Error::Invalid(format!("{:?}: {}", &ns.name, &e)))?;
        }
        let repeated = batch_duplicates(subjects.iter().map(|s| s.name.as_str()));
        if !repeated.is_empty() {
            return Err(Error::Invalid(format!(
                "Subjects named more than once: {}", repeated.join(", ")
            )));
        }

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let names: Vec<&str> = subjects.iter().map(|s| s.name.as_str()).collect();
        let extant = t.query(
            "SELECT name FROM subjects WHERE name = ANY($1)",
            &[&names]
        ).await?;
        if !extant.is_empty() {
            let mut taken: Vec<String> = Vec::with_capacity(extant.len());
            for row in extant.iter() {
                taken.push(row.try_get("name")?);
            }
            return Err(Error::Invalid(format!(
                "Subjects already exist: {}", taken.join(", ")
            )));
        }

        let insert_query = t.prepare_typed(
            "INSERT INTO subjects (name, level) VALUES ($1, $2)",
            &[Type::TEXT, Type::INT2]
        ).await?;

        let mut n_inserted: u64 = 0;
        {
            let pvec: Vec<[&(dyn ToSql + Sync); 2]> = subjects.iter()
                .map(|s| {
                    let p: [&(dyn ToSql + Sync); 2] = [&s.name, &s.level];
                    p
                }).collect();

            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(t.execute(&insert_query, &params[..]));
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(n) => { n_inserted += n; },
                    Err(e) => {
                        return Err(DbError::from(e)
                            .annotate("Error inserting subject")
                            .into());
                    },
                }
            }
        }

        t.commit().await?;
        log::trace!("Inserted {} subjects.", &n_inserted);
        Ok(n_inserted as usize)
    }

    pub async fn get_subjects(&self) -> Result<Vec<Subject>, DbError> {
        log::trace!("Store::get_subjects() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT id, name, level FROM subjects ORDER BY level, name",
            &[]
        ).await?;
        rows.iter().map(subject_from_row).collect()
    }

    /// A subject somebody is enrolled in can't be removed.
    pub async fn delete_subject(&self, id: i64) -> Result<(), Error> {
        log::trace!("Store::delete_subject( {} ) called.", &id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let row = t.query_one(
            "SELECT COUNT(*) AS n FROM enrollments WHERE subject_id = $1",
            &[&id]
        ).await?;
        let n_enrolled: i64 = row.try_get("n")?;
        if n_enrolled > 0 {
            return Err(Error::Invalid(format!(
                "Subject {} has {} enrollment(s) and can't be deleted.",
                &id, &n_enrolled
            )));
        }

        let n = t.execute("DELETE FROM subjects WHERE id = $1", &[&id]).await?;
        if n == 0 {
            return Err(Error::NotFound(Entity::Subject, id));
        }

        t.commit().await?;
        log::info!("Deleted subject {}.", &id);
        Ok(())
    }
}
