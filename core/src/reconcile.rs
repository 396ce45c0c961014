//! Ordered-child reconciliation.
//!
//! A client submits the full list of a recipe's ingredients (or method steps)
//! as it wants them to be. Each submitted draft is matched by identity against
//! the stored list: matches are updated in place, everything else is appended
//! after the stored children. The plan is computed by [`plan_reconcile`] and
//! applied by [`Reconciler`] through a [`ChildStore`].

use tracing::debug;

use crate::error::Result;
use crate::models::ChildDraft;

/// A stored child as seen by the reconciler.
pub trait ChildRecord {
    fn id(&self) -> i64;
}

/// Persistence for one kind of ordered child collection.
///
/// `list_children` must return the parent's children ordered by sort order
/// ascending.
pub trait ChildStore {
    type Child: ChildRecord;
    type Fields;

    fn list_children(&self, parent_id: i64) -> Result<Vec<Self::Child>>;
    fn insert_child(&self, parent_id: i64, fields: &Self::Fields, order: i64) -> Result<i64>;
    fn update_child(&self, id: i64, fields: &Self::Fields, order: i64) -> Result<()>;
    fn delete_child(&self, id: i64) -> Result<bool>;
}

/// One write of a reconciliation plan.
#[derive(Debug, PartialEq)]
pub enum PlannedWrite<'a, F> {
    Update { id: i64, fields: &'a F, order: i64 },
    Insert { fields: &'a F, order: i64 },
}

fn rank(position: usize) -> i64 {
    i64::try_from(position).unwrap_or(i64::MAX)
}

/// Order for a draft that matched the stored child at `position`. Zero means
/// "keep the current slot"; slots are 1-based.
fn order_for_existing(position: usize, requested: i64) -> i64 {
    if requested == 0 {
        rank(position + 1)
    } else {
        requested
    }
}

fn position_of<C: ChildRecord>(existing: &[C], id: i64) -> Option<usize> {
    if id == 0 {
        return None;
    }
    existing.iter().position(|child| child.id() == id)
}

/// Compute the writes that merge `submitted` into `existing`.
///
/// `existing` must be ordered by sort order ascending. Drafts with identity 0
/// or an identity not present in `existing` are inserted after the stored
/// children, in submission order.
pub fn plan_reconcile<'a, C, F>(
    existing: &[C],
    submitted: &'a [ChildDraft<F>],
) -> Vec<PlannedWrite<'a, F>>
where
    C: ChildRecord,
{
    submitted
        .iter()
        .enumerate()
        .map(|(index, draft)| match position_of(existing, draft.id) {
            Some(position) => PlannedWrite::Update {
                id: draft.id,
                fields: &draft.fields,
                order: order_for_existing(position, draft.sort_order),
            },
            None => PlannedWrite::Insert {
                fields: &draft.fields,
                order: rank(index + 1 + existing.len()),
            },
        })
        .collect()
}

/// Applies reconciliation plans through a [`ChildStore`].
///
/// The reconciler performs no transaction handling of its own; callers that
/// need all-or-nothing behavior hand it a store bound to an open transaction.
pub struct Reconciler<S> {
    store: S,
}

impl<S: ChildStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Merge `submitted` into the children of `parent_id` and return the
    /// parent's refreshed, ordered list. Stops at the first failing write.
    pub fn reconcile(
        &self,
        parent_id: i64,
        submitted: &[ChildDraft<S::Fields>],
    ) -> Result<Vec<S::Child>> {
        let existing = self.store.list_children(parent_id)?;
        let plan = plan_reconcile(&existing, submitted);

        let mut inserted = 0;
        for write in &plan {
            match write {
                PlannedWrite::Update { id, fields, order } => {
                    self.store.update_child(*id, fields, *order)?;
                }
                PlannedWrite::Insert { fields, order } => {
                    self.store.insert_child(parent_id, fields, *order)?;
                    inserted += 1;
                }
            }
        }
        debug!(
            parent_id,
            inserted,
            updated = plan.len() - inserted,
            "reconciled children"
        );

        self.store.list_children(parent_id)
    }

    /// Insert or update a single child. An unmatched draft lands at the tail.
    pub fn upsert(
        &self,
        parent_id: i64,
        draft: &ChildDraft<S::Fields>,
    ) -> Result<Vec<S::Child>> {
        self.reconcile(parent_id, std::slice::from_ref(draft))
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        self.store.delete_child(id)
    }
}
