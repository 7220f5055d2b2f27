//! Read-only validation of the on-disk tree, plus the repair stub.
//!
//! The checker enumerates every entry once and verifies the structural
//! invariants the tree engine relies on: local names free of the delimiter,
//! unique ids, and exactly-once reachability from the root. Cost grows with
//! the number of entries, at least O(n).

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::store::{Store, ROOT_ID};

impl Store {
    /// Verifies the consistency of the stored tree.
    ///
    /// Runs as a read-only scan and reports the first violated invariant:
    ///
    /// - [`Error::InvalidEntryNameFound`] — a local name contains the
    ///   active delimiter
    /// - [`Error::EntryIdNotUnique`] — an id occurred twice during
    ///   enumeration
    /// - [`Error::InvalidEntryLinking`] — an entry was reached twice while
    ///   descending from the root
    /// - [`Error::AbandonedEntry`] — entries unreachable from the root
    ///
    /// The error messages embed the offending ids for diagnosis.
    pub fn check_data_consistency(&self) -> Result<()> {
        let _txn = self.read_transaction()?;

        self.check_entry_names()?;
        self.check_entry_linking()?;
        Ok(())
    }

    /// Repairs inconsistencies found by [`check_data_consistency`] and
    /// returns the number of entries moved.
    ///
    /// Currently a stub: no repair is performed and the count is always 0.
    /// TODO: move abandoned and mis-linked entries into a lost+found
    /// subtree instead of leaving them in place.
    ///
    /// [`check_data_consistency`]: Store::check_data_consistency
    pub fn repair_data_consistency(&self) -> Result<i64> {
        let txn = self.write_transaction()?;
        txn.commit()?;

        Ok(0)
    }

    /// No stored local name may contain the delimiter; such a name could
    /// never be addressed and would alias a longer path.
    fn check_entry_names(&self) -> Result<()> {
        let delimiter = self.name_delimiter();

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT id, name FROM entries")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut bad = Vec::new();
        for row in rows {
            let (id, name) = row?;
            if name.contains(delimiter) {
                bad.push(id);
            }
        }

        if !bad.is_empty() {
            tracing::warn!(ids = ?bad, "entries with the delimiter in their local name");
            return Err(Error::InvalidEntryNameFound { ids: bad });
        }
        Ok(())
    }

    /// Every non-root entry must be reachable from the root through parent
    /// links, exactly once.
    fn check_entry_linking(&self) -> Result<()> {
        // Collect all non-root ids; enumeration doubling as the uniqueness
        // check.
        let mut entries = BTreeSet::new();
        {
            let mut stmt = self
                .conn()
                .prepare_cached("SELECT id FROM entries WHERE id != 0")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            for id in rows {
                let id = id?;
                if !entries.insert(id) {
                    return Err(Error::EntryIdNotUnique { id });
                }
            }
        }

        // Walk the tree; every visit removes its id from the set. A visit
        // that finds nothing to remove saw that id a second time.
        let mut revisited = Vec::new();
        self.traverse_children(ROOT_ID, |id| {
            if !entries.remove(&id) {
                revisited.push(id);
            }
            Ok(())
        })?;

        if !revisited.is_empty() {
            tracing::warn!(ids = ?revisited, "entries reached more than once from the root");
            return Err(Error::InvalidEntryLinking { ids: revisited });
        }

        if !entries.is_empty() {
            let ids: Vec<i64> = entries.into_iter().collect();
            tracing::warn!(ids = ?ids, "entries unreachable from the root");
            return Err(Error::AbandonedEntry { ids });
        }

        Ok(())
    }

    /// Calls `visit` for every entry below `root`, in pre-order.
    ///
    /// Iterates with an explicit work list; recursion depth would otherwise
    /// be bounded by tree depth.
    fn traverse_children(
        &self,
        root: i64,
        mut visit: impl FnMut(i64) -> Result<()>,
    ) -> Result<()> {
        let mut stack = self.child_ids(root)?;
        stack.reverse();

        while let Some(id) = stack.pop() {
            visit(id)?;

            let mut children = self.child_ids(id)?;
            children.reverse();
            stack.append(&mut children);
        }
        Ok(())
    }
}
