/*!
The manager reporting hierarchy.

Each manager records at most one superior (`reports_to`); subordinates
are never stored, only derived from those edges. The edges must always
form a forest.
*/
use std::collections::{HashMap, HashSet};

use crate::workflow::{Entity, Error};

/// Maps each manager to the ids of the managers directly below it.
pub fn child_index(edges: &HashMap<i64, Option<i64>>) -> HashMap<i64, Vec<i64>> {
    let mut kids: HashMap<i64, Vec<i64>> = HashMap::new();
    for (id, parent) in edges.iter() {
        if let Some(p) = parent {
            kids.entry(*p).or_default().push(*id);
        }
    }
    for v in kids.values_mut() {
        v.sort_unstable();
    }
    kids
}

/// Ids of the managers reporting directly to `id`, sorted.
pub fn direct_reports(edges: &HashMap<i64, Option<i64>>, id: i64) -> Vec<i64> {
    child_index(edges).remove(&id).unwrap_or_default()
}

/**
Checks whether manager `manager_id` may be made to report to `new_parent`.

`None` (becoming top-level) is always fine. Otherwise the new superior must
exist and must not be `manager_id` itself or anyone beneath it.
*/
pub fn check_reports_to(
    edges: &HashMap<i64, Option<i64>>,
    manager_id: i64,
    new_parent: Option<i64>,
) -> Result<(), Error> {
    log::trace!("check_reports_to( [ {} edges ], {}, {:?} ) called.", edges.len(), &manager_id, &new_parent);

    let parent = match new_parent {
        None => { return Ok(()); },
        Some(p) => p,
    };
    if !edges.contains_key(&parent) {
        return Err(Error::NotFound(Entity::Manager, parent));
    }

    // Walk up from the proposed superior; meeting `manager_id` on the way
    // means the new edge would close a loop. The visited set keeps an
    // already-damaged hierarchy from spinning forever.
    let mut visited: HashSet<i64> = HashSet::new();
    let mut cur = Some(parent);
    while let Some(m) = cur {
        if m == manager_id || !visited.insert(m) {
            return Err(Error::HierarchyCycle { manager_id, reports_to: parent });
        }
        cur = edges.get(&m).copied().flatten();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /*
         1        6
        / \
       2   3
       |
       4
       |
       5
    */
    fn forest() -> HashMap<i64, Option<i64>> {
        [
            (1, None), (2, Some(1)), (3, Some(1)),
            (4, Some(2)), (5, Some(4)), (6, None),
        ].into_iter().collect()
    }

    #[test]
    fn reports() {
        let edges = forest();
        assert_eq!(direct_reports(&edges, 1), vec![2, 3]);
        assert_eq!(direct_reports(&edges, 5), Vec::<i64>::new());
        assert_eq!(direct_reports(&edges, 6), Vec::<i64>::new());
        assert_eq!(direct_reports(&edges, 99), Vec::<i64>::new());
        assert_eq!(child_index(&edges).get(&4), Some(&vec![5]));
    }

    #[test]
    fn legal_moves() {
        let edges = forest();
        assert!(check_reports_to(&edges, 5, Some(6)).is_ok());
        assert!(check_reports_to(&edges, 2, Some(3)).is_ok());
        assert!(check_reports_to(&edges, 1, None).is_ok());
        assert!(check_reports_to(&edges, 1, Some(6)).is_ok());
    }

    #[test]
    fn cycles_refused() {
        let edges = forest();
        assert!(matches!(
            check_reports_to(&edges, 3, Some(3)),
            Err(Error::HierarchyCycle { manager_id: 3, reports_to: 3 })
        ));
        assert!(matches!(
            check_reports_to(&edges, 1, Some(5)),
            Err(Error::HierarchyCycle { manager_id: 1, reports_to: 5 })
        ));
        assert!(matches!(
            check_reports_to(&edges, 2, Some(4)),
            Err(Error::HierarchyCycle { .. })
        ));
    }

    #[test]
    fn unknown_superior() {
        let edges = forest();
        assert!(matches!(
            check_reports_to(&edges, 2, Some(99)),
            Err(Error::NotFound(Entity::Manager, 99))
        ));
    }

    #[test]
    fn damaged_hierarchy_terminates() {
        let mut edges = forest();
        edges.insert(7, Some(8));
        edges.insert(8, Some(7));
        assert!(matches!(
            check_reports_to(&edges, 1, Some(7)),
            Err(Error::HierarchyCycle { .. })
        ));
    }
}
