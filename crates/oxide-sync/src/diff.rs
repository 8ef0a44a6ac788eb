//! Name-keyed diffing.
//!
//! Columns, indices, foreign keys and primary keys are all compared the same
//! way: two entities are "the same" iff their names match. Presence on only
//! one side is an addition or a removal, and same-named entities whose
//! attributes differ are changes.

/// Something identified by name within its owning table.
pub trait Named {
    /// The identifying name.
    fn name(&self) -> &str;
}

/// Outcome of comparing a live collection against a desired one.
#[derive(Debug)]
pub struct NameDiff<'a, L, D> {
    /// Desired entities with no live counterpart, in desired order.
    pub added: Vec<&'a D>,
    /// Live entities with no desired counterpart, in live order.
    pub removed: Vec<&'a L>,
    /// Same-named pairs whose attributes differ, in live order.
    pub changed: Vec<(&'a L, &'a D)>,
}

impl<L, D> NameDiff<'_, L, D> {
    /// Returns true if nothing was added, removed or changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compares `live` against `desired` by name.
///
/// `same` decides whether a same-named pair is unchanged; it is only called
/// for pairs whose names match.
///
/// Collections inside a single table are small, so lookups are linear scans,
/// which also keeps the output order deterministic.
pub fn diff_by_name<'a, L, D, F>(live: &'a [L], desired: &'a [D], mut same: F) -> NameDiff<'a, L, D>
where
    L: Named,
    D: Named,
    F: FnMut(&L, &D) -> bool,
{
    let added = desired
        .iter()
        .filter(|d| !live.iter().any(|l| l.name() == d.name()))
        .collect();

    let mut removed = Vec::new();
    let mut changed = Vec::new();
    for l in live {
        match desired.iter().find(|d| d.name() == l.name()) {
            None => removed.push(l),
            Some(d) if !same(l, d) => changed.push((l, d)),
            Some(_) => {}
        }
    }

    NameDiff {
        added,
        removed,
        changed,
    }
}

/// Compares by name presence only; same-named pairs are never "changed".
pub fn diff_names<'a, L, D>(live: &'a [L], desired: &'a [D]) -> NameDiff<'a, L, D>
where
    L: Named,
    D: Named,
{
    diff_by_name(live, desired, |_, _| true)
}
