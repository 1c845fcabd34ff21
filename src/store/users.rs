/*!
`Store` methods et. al. for dealing with the different kinds of users.

Inserts hash the supplied plaintext password; nothing here ever sees a
password leave the database in anything but hashed form.
*/
use std::collections::HashMap;
use std::fmt::Write;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{Row, Transaction, types::{ToSql, Type}};

use super::{batch_duplicates, Store, DbError};
use crate::{
    auth::hash_password,
    hierarchy,
    user::*,
    workflow::{Entity, Error},
};

/// Every user column, with the role-specific tables left-joined in.
const USER_SELECT: &str =
    "SELECT users.id, users.name, users.uname, users.password, users.role,
            students.gpa, students.level,
            teachers.department AS t_department, teachers.subject,
            teachers.salary AS t_salary,
            managers.department AS m_department, managers.salary AS m_salary,
            managers.reports_to
        FROM users
        LEFT JOIN students ON students.id = users.id
        LEFT JOIN teachers ON teachers.id = users.id
        LEFT JOIN managers ON managers.id = users.id";

fn base_user_from_row(row: &Row) -> Result<BaseUser, DbError> {
    Ok(BaseUser {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        uname: row.try_get("uname")?,
        password_hash: row.try_get("password")?,
    })
}

pub(super) fn student_from_row(row: &Row) -> Result<Student, DbError> {
    Ok(Student {
        base: base_user_from_row(row)?,
        gpa: row.try_get("gpa")?,
        level: row.try_get("level")?,
    })
}

/// Expects a row from a query beginning with `USER_SELECT`.
fn user_from_row(row: &Row) -> Result<User, DbError> {
    log::trace!("user_from_row( {:?} ) called", row);

    let role_str: &str = row.try_get("role")?;
    let role: Role = role_str.parse()?;
    let base = base_user_from_row(row)?;

    let u = match role {
        Role::Student => base.into_student(
            row.try_get("gpa")?,
            row.try_get("level")?,
        ),
        Role::Teacher => base.into_teacher(
            row.try_get("t_department")?,
            row.try_get("subject")?,
            row.try_get("t_salary")?,
        ),
        Role::Manager | Role::SuperManager => base.into_manager(
            row.try_get("m_department")?,
            row.try_get("m_salary")?,
            row.try_get("reports_to")?,
        ),
    };

    Ok(u)
}

/// Return the role of extant user `uname`, if any.
///
/// Used when inserting new users, mainly to ensure good error messaging
/// when a username is already in use.
async fn check_existing_user_role(
    t: &Transaction<'_>,
    uname: &str,
) -> Result<Option<Role>, DbError> {
    log::trace!("check_existing_user_role( T, {:?} ) called.", uname);

    match t.query_opt(
        "SELECT role FROM users WHERE uname = $1",
        &[&uname]
    ).await.map_err(|e|
        DbError::from(e).annotate("Error querying for preexisting uname")
    )? {
        None => Ok(None),
        Some(row) => {
            let role_str: &str = row.try_get("role")?;
            let role: Role = role_str.parse()
                .map_err(|e: String|
                    DbError(e).annotate("Error parsing role of preexisting uname")
                )?;
            Ok(Some(role))
        },
    }
}

/// Every manager's `reports_to`, locked against concurrent changes to the
/// hierarchy for the rest of the transaction.
async fn manager_edges(t: &Transaction<'_>) -> Result<HashMap<i64, Option<i64>>, DbError> {
    let rows = t.query(
        "SELECT id, reports_to FROM managers FOR UPDATE",
        &[]
    ).await?;

    let mut edges: HashMap<i64, Option<i64>> = HashMap::with_capacity(rows.len());
    for row in rows.iter() {
        edges.insert(row.try_get("id")?, row.try_get("reports_to")?);
    }
    Ok(edges)
}

impl Store {

    /// Inserts the `BaseUser` information into the `users` table and
    /// returns the new `id`.
    ///
    /// This is used by the `Store::insert_xxx()` methods to insert this part
    /// of the information. It also calls `check_existing_user_role()` and
    /// returns `DuplicateUsername` if the given uname already exists.
    async fn insert_base_user(
        &self,
        t: &Transaction<'_>,
        name: &str,
        uname: &str,
        password: &str,
        role: Role,
    ) -> Result<BaseUser, Error> {
        log::trace!(
            "insert_base_user( T, {:?}, {:?}, [ password ], {} ) called.",
            name, uname, role
        );

        if let Some(role) = check_existing_user_role(t, uname).await? {
            log::trace!("User name {:?} already exists with role {}.", uname, &role);
            return Err(Error::DuplicateUsername(uname.to_owned()));
        }

        let password_hash = hash_password(password)?;
        let row = t.query_one(
            "INSERT INTO users (name, uname, password, role)
                VALUES ($1, $2, $3, $4)
                RETURNING id",
            &[&name, &uname, &password_hash, &role.to_string()]
        ).await?;

        Ok(BaseUser {
            id: row.try_get("id")?,
            name: name.to_owned(),
            uname: uname.to_owned(),
            password_hash,
        })
    }

    pub async fn insert_student(&self, s: &NewStudent) -> Result<User, Error> {
        log::trace!("Store::insert_student( {:?} ) called.", &s.uname);

        let level = check_level(s.level.unwrap_or(1)).map_err(Error::Invalid)?;

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let base = self.insert_base_user(
            &t, &s.name, &s.uname, &s.password, Role::Student
        ).await?;
        t.execute(
            "INSERT INTO students (id, gpa, level) VALUES ($1, $2, $3)",
            &[&base.id, &s.gpa, &level]
        ).await?;

        t.commit().await?;
        log::trace!("Inserted Student {:?} ({}).", &s.uname, &base.id);
        Ok(base.into_student(s.gpa.clone(), level))
    }

    /**
    Inserts a batch of students in a single transaction; if any of them
    can't be inserted, none are.
    */
    pub async fn insert_students(&self, students: &[NewStudent]) -> Result<usize, Error> {
        log::trace!("Store::insert_students( [ {} students ] ) called.", students.len());

        if students.is_empty() {
            return Ok(0);
        }
        let new_unames: Vec<&str> = students.iter()
            .map(|s| s.uname.as_str())
            .collect();
        let repeated = batch_duplicates(new_unames.iter().copied());
        if !repeated.is_empty() {
            return Err(Error::DuplicateUsername(repeated.join(" ")));
        }
        let mut levels: Vec<i16> = Vec::with_capacity(students.len());
        for s in students.iter() {
            levels.push(check_level(s.level.unwrap_or(1)).map_err(Error::Invalid)?);
        }

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let preexisting_uname_query = t.prepare_typed(
            "SELECT uname, role FROM users WHERE uname = ANY($1)",
            &[Type::TEXT_ARRAY]
        ).await?;
        let preexisting_uname_rows = t.query(
            &preexisting_uname_query,
            &[&new_unames]
        ).await?;
        if !preexisting_uname_rows.is_empty() {
            let mut taken = String::new();
            for row in preexisting_uname_rows.iter() {
                let uname: &str = row.try_get("uname")?;
                let role: &str = row.try_get("role")?;
                // Writing to a String can't fail.
                let _ = write!(&mut taken, "{} ({}) ", uname, role);
            }
            return Err(Error::DuplicateUsername(taken.trim_end().to_owned()));
        }

        let mut hashes: Vec<String> = Vec::with_capacity(students.len());
        for s in students.iter() {
            hashes.push(hash_password(&s.password)?);
        }

        let base_insert_query = t.prepare_typed(
            "INSERT INTO users (name, uname, password, role)
                VALUES ($1, $2, $3, $4)
                RETURNING id",
            &[Type::TEXT, Type::TEXT, Type::TEXT, Type::TEXT]
        ).await?;
        let student_insert_query = t.prepare_typed(
            "INSERT INTO students (id, gpa, level) VALUES ($1, $2, $3)",
            &[Type::INT8, Type::TEXT, Type::INT2]
        ).await?;

        /*
        The parameter slices have to outlive the futures in `inserts`, so
        they're all built up front. The base user inserts have to finish
        before the student rows can reference their ids.
        */
        let student_role = Role::Student.to_string();
        let mut ids: Vec<i64> = vec![0; students.len()];
        {
            let pvec: Vec<[&(dyn ToSql + Sync); 4]> = students.iter()
                .enumerate()
                .map(|(n, s)| {
                    let p: [&(dyn ToSql + Sync); 4] =
                        [&s.name, &s.uname, &hashes[n], &student_role];
                    p
                }).collect();

            let mut inserts = FuturesUnordered::new();
            for (n, params) in pvec.iter().enumerate() {
                let q = &base_insert_query;
                let t = &t;
                inserts.push(async move {
                    (n, t.query_one(q, &params[..]).await)
                });
            }

            while let Some((n, res)) = inserts.next().await {
                match res {
                    Ok(row) => { ids[n] = row.try_get("id")?; },
                    Err(e) => {
                        return Err(DbError::from(e)
                            .annotate("Error inserting base user into database")
                            .into());
                    },
                }
            }
        }

        let mut n_inserted: u64 = 0;
        {
            let pvec: Vec<[&(dyn ToSql + Sync); 3]> = students.iter()
                .enumerate()
                .map(|(n, s)| {
                    let p: [&(dyn ToSql + Sync); 3] = [&ids[n], &s.gpa, &levels[n]];
                    p
                }).collect();

            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(t.execute(&student_insert_query, &params[..]));
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(n) => { n_inserted += n; },
                    Err(e) => {
                        return Err(DbError::from(e)
                            .annotate("Error inserting into students table")
                            .into());
                    },
                }
            }
        }

        t.commit().await?;
        log::trace!("Inserted {} students.", &n_inserted);
        Ok(n_inserted as usize)
    }

    pub async fn insert_teacher(&self, nt: &NewTeacher) -> Result<User, Error> {
        log::trace!("Store::insert_teacher( {:?} ) called.", &nt.uname);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let base = self.insert_base_user(
            &t, &nt.name, &nt.uname, &nt.password, Role::Teacher
        ).await?;
        t.execute(
            "INSERT INTO teachers (id, department, subject, salary)
                VALUES ($1, $2, $3, $4)",
            &[&base.id, &nt.department, &nt.subject, &nt.salary]
        ).await?;

        t.commit().await?;
        log::trace!("Inserted Teacher {:?} ({}).", &nt.uname, &base.id);
        Ok(base.into_teacher(nt.department.clone(), nt.subject.clone(), nt.salary))
    }

    /// A brand new manager has no subordinates, so the only thing to check
    /// about `reports_to` is that it names an existing manager.
    pub async fn insert_manager(&self, nm: &NewManager) -> Result<User, Error> {
        log::trace!("Store::insert_manager( {:?} ) called.", &nm.uname);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        if let Some(boss) = nm.reports_to {
            if t.query_opt("SELECT id FROM managers WHERE id = $1", &[&boss]).await?.is_none() {
                return Err(Error::NotFound(Entity::Manager, boss));
            }
        }

        let base = self.insert_base_user(
            &t, &nm.name, &nm.uname, &nm.password, Role::Manager
        ).await?;
        t.execute(
            "INSERT INTO managers (id, department, salary, reports_to)
                VALUES ($1, $2, $3, $4)",
            &[&base.id, &nm.department, &nm.salary, &nm.reports_to]
        ).await?;

        t.commit().await?;
        log::trace!("Inserted Manager {:?} ({}).", &nm.uname, &base.id);
        Ok(base.into_manager(nm.department.clone(), nm.salary, nm.reports_to))
    }

    /**
    Self-service registration.

    Only identity data is supplied, so the role-specific fields get
    defaults: students start at level 1 with a GPA of 0.0.

    Managers can't register themselves; a top-level manager would hold
    super-manager rights, and anyone lower needs a superior to place them.
    Those come through `insert_manager()` instead.
    */
    pub async fn register(
        &self,
        name: &str,
        uname: &str,
        password: &str,
        role: Role,
    ) -> Result<User, Error> {
        log::trace!(
            "Store::register( {:?}, {:?}, [ password ], {} ) called.",
            name, uname, &role
        );

        match role {
            Role::Student => self.insert_student(&NewStudent {
                name: name.to_owned(),
                uname: uname.to_owned(),
                password: password.to_owned(),
                gpa: "0.0".to_owned(),
                level: None,
            }).await,
            Role::Teacher => self.insert_teacher(&NewTeacher {
                name: name.to_owned(),
                uname: uname.to_owned(),
                password: password.to_owned(),
                department: String::new(),
                subject: String::new(),
                salary: None,
            }).await,
            Role::Manager | Role::SuperManager => Err(Error::Invalid(format!(
                "{} accounts can't be self-registered; a super manager must add them.",
                &role
            ))),
        }
    }

    pub async fn get_user_by_uname(&self, uname: &str) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_uname( {:?} ) called.", uname);

        let client = self.connect().await?;
        let query = format!("{} WHERE users.uname = $1", USER_SELECT);
        match client.query_opt(query.as_str(), &[&uname]).await? {
            None => Ok(None),
            Some(row) => Ok(Some(user_from_row(&row)?)),
        }
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user( {} ) called.", &id);

        let client = self.connect().await?;
        let query = format!("{} WHERE users.id = $1", USER_SELECT);
        match client.query_opt(query.as_str(), &[&id]).await? {
            None => Ok(None),
            Some(row) => Ok(Some(user_from_row(&row)?)),
        }
    }

    /// All users with the given stored `role`, in `id` order.
    ///
    /// Managers are stored as `Role::Manager` whatever their effective role.
    pub async fn get_users_by_role(&self, role: Role) -> Result<Vec<User>, DbError> {
        log::trace!("Store::get_users_by_role( {} ) called.", &role);

        let role = match role {
            Role::SuperManager => Role::Manager,
            x => x,
        };

        let client = self.connect().await?;
        let query = format!("{} WHERE users.role = $1 ORDER BY users.id", USER_SELECT);
        let rows = client.query(query.as_str(), &[&role.to_string()]).await?;
        rows.iter().map(user_from_row).collect()
    }

    pub async fn update_student(&self, upd: &StudentUpdate) -> Result<User, Error> {
        log::trace!("Store::update_student( {:?} ) called.", &upd.id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        if t.query_opt("SELECT id FROM students WHERE id = $1", &[&upd.id]).await?.is_none() {
            return Err(Error::NotFound(Entity::Student, upd.id));
        }
        if let Some(uname) = &upd.uname {
            let row = t.query_opt(
                "SELECT id FROM users WHERE uname = $1 AND id <> $2",
                &[uname, &upd.id]
            ).await?;
            if row.is_some() {
                return Err(Error::DuplicateUsername(uname.clone()));
            }
        }
        let password_hash = match &upd.password {
            Some(p) => Some(hash_password(p)?),
            None => None,
        };

        t.execute(
            "UPDATE users SET
                name = COALESCE($2, name),
                uname = COALESCE($3, uname),
                password = COALESCE($4, password)
                WHERE id = $1",
            &[&upd.id, &upd.name, &upd.uname, &password_hash]
        ).await?;
        t.execute(
            "UPDATE students SET gpa = COALESCE($2, gpa) WHERE id = $1",
            &[&upd.id, &upd.gpa]
        ).await?;

        t.commit().await?;
        self.get_user(upd.id).await?
            .ok_or(Error::NotFound(Entity::Student, upd.id))
    }

    pub async fn update_teacher(&self, upd: &TeacherUpdate) -> Result<User, Error> {
        log::trace!("Store::update_teacher( {:?} ) called.", &upd.id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        if t.query_opt("SELECT id FROM teachers WHERE id = $1", &[&upd.id]).await?.is_none() {
            return Err(Error::NotFound(Entity::Teacher, upd.id));
        }
        let password_hash = match &upd.password {
            Some(p) => Some(hash_password(p)?),
            None => None,
        };

        t.execute(
            "UPDATE users SET
                name = COALESCE($2, name),
                password = COALESCE($3, password)
                WHERE id = $1",
            &[&upd.id, &upd.name, &password_hash]
        ).await?;
        t.execute(
            "UPDATE teachers SET
                department = COALESCE($2, department),
                subject = COALESCE($3, subject),
                salary = COALESCE($4, salary)
                WHERE id = $1",
            &[&upd.id, &upd.department, &upd.subject, &upd.salary]
        ).await?;

        t.commit().await?;
        self.get_user(upd.id).await?
            .ok_or(Error::NotFound(Entity::Teacher, upd.id))
    }

    /// Changing `reports_to` is checked against the whole hierarchy; the
    /// update is refused if it would close a loop.
    pub async fn update_manager(&self, upd: &ManagerUpdate) -> Result<User, Error> {
        log::trace!("Store::update_manager( {:?} ) called.", &upd.id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let edges = manager_edges(&t).await?;
        if !edges.contains_key(&upd.id) {
            return Err(Error::NotFound(Entity::Manager, upd.id));
        }
        if let Some(new_boss) = upd.reports_to {
            hierarchy::check_reports_to(&edges, upd.id, new_boss)?;
        }
        let password_hash = match &upd.password {
            Some(p) => Some(hash_password(p)?),
            None => None,
        };

        t.execute(
            "UPDATE users SET
                name = COALESCE($2, name),
                password = COALESCE($3, password)
                WHERE id = $1",
            &[&upd.id, &upd.name, &password_hash]
        ).await?;
        t.execute(
            "UPDATE managers SET
                department = COALESCE($2, department),
                salary = COALESCE($3, salary)
                WHERE id = $1",
            &[&upd.id, &upd.department, &upd.salary]
        ).await?;
        if let Some(new_boss) = upd.reports_to {
            t.execute(
                "UPDATE managers SET reports_to = $2 WHERE id = $1",
                &[&upd.id, &new_boss]
            ).await?;
        }

        t.commit().await?;
        self.get_user(upd.id).await?
            .ok_or(Error::NotFound(Entity::Manager, upd.id))
    }

    /// Deletes a student. Enrollments go with the student; exam records
    /// are kept.
    pub async fn delete_student(&self, id: i64) -> Result<(), Error> {
        log::trace!("Store::delete_student( {} ) called.", &id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM users WHERE id = $1 AND role = $2",
            &[&id, &Role::Student.to_string()]
        ).await?;

        match n {
            0 => Err(Error::NotFound(Entity::Student, id)),
            _ => Ok(()),
        }
    }

    pub async fn delete_teacher(&self, id: i64) -> Result<(), Error> {
        log::trace!("Store::delete_teacher( {} ) called.", &id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM users WHERE id = $1 AND role = $2",
            &[&id, &Role::Teacher.to_string()]
        ).await?;

        match n {
            0 => Err(Error::NotFound(Entity::Teacher, id)),
            _ => Ok(()),
        }
    }

    /// The deleted manager's direct reports move up to report to the
    /// deleted manager's own superior.
    pub async fn delete_manager(&self, id: i64) -> Result<(), Error> {
        log::trace!("Store::delete_manager( {} ) called.", &id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let edges = manager_edges(&t).await?;
        let boss = match edges.get(&id) {
            Some(boss) => *boss,
            None => { return Err(Error::NotFound(Entity::Manager, id)); },
        };

        let n = t.execute(
            "UPDATE managers SET reports_to = $2 WHERE reports_to = $1",
            &[&id, &boss]
        ).await?;
        if n > 0 {
            log::info!("Moved {} report(s) of manager {} to {:?}.", &n, &id, &boss);
        }
        t.execute("DELETE FROM users WHERE id = $1", &[&id]).await?;

        t.commit().await?;
        Ok(())
    }

    /// Managers who report directly to manager `id`.
    pub async fn subordinates(&self, id: i64) -> Result<Vec<User>, Error> {
        log::trace!("Store::subordinates( {} ) called.", &id);

        let managers = self.get_users_by_role(Role::Manager).await?;
        let edges: HashMap<i64, Option<i64>> = managers.iter()
            .filter_map(|u| match u {
                User::Manager(m) => Some((m.base.id, m.reports_to)),
                _ => None,
            }).collect();
        if !edges.contains_key(&id) {
            return Err(Error::NotFound(Entity::Manager, id));
        }

        let reports = hierarchy::direct_reports(&edges, id);
        Ok(managers.into_iter()
            .filter(|u| reports.contains(&u.id()))
            .collect())
    }
}
