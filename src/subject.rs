/*!
Catalog subjects.
*/
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::user::check_level;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    /// Difficulty tier, 1 through `MAX_LEVEL`.
    pub level: i16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct NewSubject {
    pub name: String,
    pub level: i16,
}

impl NewSubject {
    /**
    Subject .csv rows should look like this

    ```csv
    #name,     level
    Algebra,   2
    ```
    */
    pub fn from_csv_line(row: &csv::StringRecord) -> Result<NewSubject, String> {
        log::trace!("NewSubject::from_csv_line( {:?} ) called.", row);

        let name = match row.get(0) {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => { return Err("no subject name".to_owned()); },
        };
        let level_str = match row.get(1) {
            Some(s) if !s.is_empty() => s,
            _ => { return Err("no level".to_owned()); },
        };
        let level: i16 = level_str.parse()
            .map_err(|e| format!("bad level {:?}: {}", level_str, &e))?;

        Ok(NewSubject { name, level: check_level(level)? })
    }

    pub fn vec_from_csv_reader<R: Read>(r: R) -> Result<Vec<NewSubject>, String> {
        log::trace!("NewSubject::vec_from_csv_reader(...) called.");

        let mut csv_reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(false)
            .has_headers(false)
            .from_reader(r);

        let mut subjects: Vec<NewSubject> = Vec::new();

        for (n, res) in csv_reader.records().enumerate() {
            let record = res.map_err(|e| match e.position() {
                Some(p) => format!("Error on line {}: {}", p.line(), &e),
                None => format!("Error in CSV record {}: {}", &n, &e),
            })?;
            let subj = NewSubject::from_csv_line(&record)
                .map_err(|e| match record.position() {
                    Some(p) => format!("Error on line {}: {}", p.line(), &e),
                    None => format!("Error in CSV record {}: {}", &n, &e),
                })?;
            subjects.push(subj);
        }

        Ok(subjects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    #[test]
    fn subjects_from_csv() {
        ensure_logging();
        let f = std::fs::File::open("test/good_subjects_0.csv").unwrap();
        let subjs = NewSubject::vec_from_csv_reader(f).unwrap();
        assert_eq!(subjs.len(), 5);
        assert_eq!(
            subjs[0],
            NewSubject { name: "Math".to_owned(), level: 1 }
        );
        assert_eq!(subjs.iter().filter(|s| s.level == 2).count(), 2);
    }

    #[test]
    fn bad_subjects_from_csv() {
        ensure_logging();
        let f = std::fs::File::open("test/bad_subjects_0.csv").unwrap();
        let e = NewSubject::vec_from_csv_reader(f).unwrap_err();
        log::trace!("Expected error: {}", &e);
        assert!(e.contains("bad level \"one\""), "{}", &e);
    }
}
