/*!
Users of the system.

Every user shares a `BaseUser` identity; the role-specific data hangs off
the variants of `User`.
*/
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::MAX_LEVEL;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
    Manager,
    SuperManager,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Student      => "STUDENT",
            Role::Teacher      => "TEACHER",
            Role::Manager      => "MANAGER",
            Role::SuperManager => "SUPER_MANAGER",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    /// Case is ignored, as are underscores, so `"super_manager"` and
    /// `"SuperManager"` both parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token: String = s.trim()
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match token.as_str() {
            "STUDENT"      => Ok(Role::Student),
            "TEACHER"      => Ok(Role::Teacher),
            "MANAGER"      => Ok(Role::Manager),
            "SUPERMANAGER" => Ok(Role::SuperManager),
            _ => Err(format!(
                "{:?} is not a valid Role. Allowed: STUDENT, TEACHER, MANAGER, SUPER_MANAGER",
                s
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BaseUser {
    pub id: i64,
    pub name: String,
    pub uname: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

impl BaseUser {
    pub fn into_student(self, gpa: String, level: i16) -> User {
        User::Student(Student { base: self, gpa, level })
    }
    pub fn into_teacher(
        self,
        department: String,
        subject: String,
        salary: Option<f64>,
    ) -> User {
        User::Teacher(Teacher { base: self, department, subject, salary })
    }
    pub fn into_manager(
        self,
        department: String,
        salary: Option<f64>,
        reports_to: Option<i64>,
    ) -> User {
        User::Manager(Manager { base: self, department, salary, reports_to })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Student {
    #[serde(flatten)]
    pub base: BaseUser,
    /// Grade point average, kept as entered.
    pub gpa: String,
    /// Curriculum level, 1 through `MAX_LEVEL`.
    pub level: i16,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Teacher {
    #[serde(flatten)]
    pub base: BaseUser,
    pub department: String,
    /// Subject specialty.
    pub subject: String,
    pub salary: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Manager {
    #[serde(flatten)]
    pub base: BaseUser,
    pub department: String,
    pub salary: Option<f64>,
    /// `id` of this manager's superior; `None` for top-level managers.
    pub reports_to: Option<i64>,
}

impl Manager {
    /// Managers with nobody above them act as super managers.
    pub fn role(&self) -> Role {
        match self.reports_to {
            None => Role::SuperManager,
            Some(_) => Role::Manager,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum User {
    Student(Student),
    Teacher(Teacher),
    Manager(Manager),
}

impl User {
    pub fn base(&self) -> &BaseUser {
        match self {
            User::Student(s) => &s.base,
            User::Teacher(t) => &t.base,
            User::Manager(m) => &m.base,
        }
    }

    pub fn id(&self) -> i64 { self.base().id }

    pub fn uname(&self) -> &str { &self.base().uname }

    pub fn name(&self) -> &str { &self.base().name }

    pub fn password_hash(&self) -> &str { &self.base().password_hash }

    /// The role used for access decisions.
    pub fn role(&self) -> Role {
        match self {
            User::Student(_) => Role::Student,
            User::Teacher(_) => Role::Teacher,
            User::Manager(m) => m.role(),
        }
    }
}

/// Checks that `level` is a valid curriculum level.
pub fn check_level(level: i16) -> Result<i16, String> {
    if (1..=MAX_LEVEL).contains(&level) {
        Ok(level)
    } else {
        Err(format!("Level must be between 1 and {}; got {}.", MAX_LEVEL, level))
    }
}

/// Data required to insert a new student.
#[derive(Clone, Debug, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub uname: String,
    pub password: String,
    #[serde(default = "default_gpa")]
    pub gpa: String,
    /// Starting level; defaults to 1.
    pub level: Option<i16>,
}

fn default_gpa() -> String { "0.0".to_owned() }

impl NewStudent {
    /**
    Student .csv rows should look like this

    ```csv
    #uname,  name,        password,  gpa, level
    jsmith,  John Smith,  hunter2,   3.2, 1
    ```

    `gpa` and `level` may be left blank (defaults `0.0` and 1).
    */
    pub fn from_csv_line(
        row: &csv::StringRecord
    ) -> Result<NewStudent, String> {
        log::trace!("NewStudent::from_csv_line( {:?} ) called.", row);

        let uname = match row.get(0) {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => { return Err("no uname".to_owned()); }
        };
        let name = match row.get(1) {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => { return Err("no name".to_owned()); },
        };
        let password = match row.get(2) {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => { return Err("no password".to_owned()); },
        };
        let gpa = match row.get(3) {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => default_gpa(),
        };
        let level = match row.get(4) {
            Some(s) if !s.is_empty() => {
                let n: i16 = s.parse()
                    .map_err(|e| format!("bad level {:?}: {}", s, &e))?;
                Some(check_level(n)?)
            },
            _ => None,
        };

        Ok(NewStudent { name, uname, password, gpa, level })
    }

    pub fn vec_from_csv_reader<R: Read>(r: R) -> Result<Vec<NewStudent>, String> {
        log::trace!("NewStudent::vec_from_csv_reader(...) called.");

        let mut csv_reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(true)
            .has_headers(false)
            .from_reader(r);

        let mut students: Vec<NewStudent> = Vec::new();

        for (n, res) in csv_reader.records().enumerate() {
            let record = res.map_err(|e| match e.position() {
                Some(p) => format!("Error on line {}: {}", p.line(), &e),
                None => format!("Error in CSV record {}: {}", &n, &e),
            })?;
            match NewStudent::from_csv_line(&record) {
                Ok(stud) => { students.push(stud); },
                Err(e) => {
                    let estr = match record.position() {
                        Some(p) => format!("Error on line {}: {}", p.line(), &e),
                        None => format!("Error in CSV record {}: {}", &n, &e),
                    };
                    return Err(estr);
                },
            }
        }

        log::trace!(
            "NewStudent::vec_from_csv_reader() returns {} students.",
            students.len()
        );
        Ok(students)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewTeacher {
    pub name: String,
    pub uname: String,
    pub password: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub subject: String,
    pub salary: Option<f64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewManager {
    pub name: String,
    pub uname: String,
    pub password: String,
    #[serde(default)]
    pub department: String,
    pub salary: Option<f64>,
    pub reports_to: Option<i64>,
}

/// Changes to an existing student. `None` fields are left alone; the
/// level is deliberately absent, as only promotion may change it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StudentUpdate {
    pub id: i64,
    pub name: Option<String>,
    pub uname: Option<String>,
    pub password: Option<String>,
    pub gpa: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TeacherUpdate {
    pub id: i64,
    pub name: Option<String>,
    pub password: Option<String>,
    pub department: Option<String>,
    pub subject: Option<String>,
    pub salary: Option<f64>,
}

/// `reports_to` uses a nested `Option`: absent leaves it alone, `null`
/// makes the manager top-level.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ManagerUpdate {
    pub id: i64,
    pub name: Option<String>,
    pub password: Option<String>,
    pub department: Option<String>,
    pub salary: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub reports_to: Option<Option<i64>>,
}

fn deserialize_some<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(d).map(Some)
}
