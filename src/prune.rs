use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db::{self, Filter};

#[derive(Debug)]
pub struct PruneReport {
    pub deleted: usize,
    pub remaining: usize,
}

/// Permanently delete every row not labelled student-friendly.
///
/// Acts on the labels as stored; run the classifier first.
pub fn apply(conn: &Connection) -> Result<PruneReport> {
    let unfriendly = Filter::StudentFriendly(false);
    let to_delete = db::count(conn, &unfriendly)?;
    if to_delete == 0 {
        info!("No non-student vacancies to delete");
        let remaining = db::count(conn, &Filter::All)?;
        return Ok(PruneReport { deleted: 0, remaining });
    }

    warn!("Deleting {} non-student vacancies (irreversible)", to_delete);
    let deleted = db::delete_where(conn, &unfriendly)?;
    let remaining = db::count(conn, &Filter::All)?;
    info!("Deleted {}. Remaining rows: {}", deleted, remaining);
    Ok(PruneReport { deleted, remaining })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;
    use crate::db::tests::{memory_db, row};
    use crate::db::upsert_bulk;

    #[test]
    fn removes_exactly_the_unlabelled_rows() {
        let mut conn = memory_db();
        let titles = ["Intern Developer", "Senior Backend", "Accountant", "Trainee QA", "Lead Designer"];
        let rows: Vec<_> = titles
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut r = row(&format!("u{}", i), "Engineer");
                r.title = Some(t.to_string());
                r
            })
            .collect();
        upsert_bulk(&mut conn, &rows).unwrap();

        let report = classify::apply(&mut conn).unwrap();
        let m = report.total;
        let n = m - report.friendly;
        assert_eq!((m, n), (5, 3));

        let pruned = apply(&conn).unwrap();
        assert_eq!(pruned.deleted, n);
        assert_eq!(pruned.remaining, m - n);

        // Second run has nothing left to do
        let again = apply(&conn).unwrap();
        assert_eq!(again.deleted, 0);
        assert_eq!(again.remaining, m - n);
    }

    #[test]
    fn empty_store_is_a_noop() {
        let conn = memory_db();
        let report = apply(&conn).unwrap();
        assert_eq!((report.deleted, report.remaining), (0, 0));
    }
}
