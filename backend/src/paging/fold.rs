//! Folding of joined rows into parent aggregates.
//!
//! A left join of locations against their group assignments yields one row per
//! (location, assignment) pair, or a single row with null assignment columns. Folding groups
//! those rows back into one aggregate per parent, in the order parents first appear.

use std::collections::HashMap;
use std::hash::Hash;

use futures::{Stream, StreamExt};

use crate::db::repository::RepositoryResult;

/// A row that contributes a parent and, optionally, one child to an aggregate.
pub trait JoinedRow {
    type Key: Eq + Hash;
    type Parent;
    type Child;

    fn parent_key(&self) -> Self::Key;

    /// Split the row. The child is `None` when all of its columns were null.
    fn into_parts(self) -> (Self::Parent, Option<Self::Child>);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Folded<P, C> {
    pub parent: P,
    pub children: Vec<C>,
}

/// Ordered accumulator. Lives for one page only.
pub struct Folder<R: JoinedRow> {
    index: HashMap<R::Key, usize>,
    out: Vec<Folded<R::Parent, R::Child>>,
}

impl<R: JoinedRow> Default for Folder<R> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            out: Vec::new(),
        }
    }
}

impl<R: JoinedRow> Folder<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: R) {
        let key = row.parent_key();
        let (parent, child) = row.into_parts();
        let slot = match self.index.get(&key) {
            Some(slot) => *slot,
            None => {
                self.out.push(Folded {
                    parent,
                    children: Vec::new(),
                });
                self.index.insert(key, self.out.len() - 1);
                self.out.len() - 1
            }
        };
        if let Some(child) = child {
            self.out[slot].children.push(child);
        }
    }

    /// Number of distinct parents seen so far.
    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn finish(self) -> Vec<Folded<R::Parent, R::Child>> {
        self.out
    }
}

pub fn fold<R, I>(rows: I) -> Vec<Folded<R::Parent, R::Child>>
where
    R: JoinedRow,
    I: IntoIterator<Item = R>,
{
    let mut folder = Folder::new();
    for row in rows {
        folder.push(row);
    }
    folder.finish()
}

/// Drain a row stream into aggregates, stopping at the first backend error.
pub async fn fold_stream<R, S>(mut rows: S) -> RepositoryResult<Vec<Folded<R::Parent, R::Child>>>
where
    R: JoinedRow,
    S: Stream<Item = RepositoryResult<R>> + Unpin,
{
    let mut folder = Folder::new();
    while let Some(row) = rows.next().await {
        folder.push(row?);
    }
    Ok(folder.finish())
}
