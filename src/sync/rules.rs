//! Generic diff/merge of a remote light list against local entities.
//!
//! Given remote set R and local set L for one parent scope, one pass
//! produces L' such that:
//! - every r in R has exactly one match in L' (copied if changed,
//!   created if absent)
//! - every local entity with no remote counterpart is removed in the
//!   same pass
//! - entities carrying bulk binary payloads land in a needs-download
//!   accumulator, unless already scheduled earlier in the run
//!
//! The pass is O(|R|·|L|), which is fine at catalog scale (tens to low
//! hundreds of children per parent). Ambiguous matches are a rules
//! defect, not defended against.

use std::collections::HashSet;

/// Matching and copying rules for one entity kind.
///
/// One implementation per kind, instantiated once per reconciliation
/// pass with whatever context it needs (identity policy, parent id).
pub trait ReconcileRules {
    type Remote;
    type Local;

    /// Does this remote entity correspond to this local one, under the
    /// active identity policy?
    fn is_match(&self, remote: &Self::Remote, local: &Self::Local) -> bool;

    /// Apply mutable fields from the remote entity, but only when the
    /// change timestamps differ. Returns whether anything changed -
    /// a no-op copy must report false (idempotence depends on it).
    fn copy(&self, remote: &Self::Remote, local: &mut Self::Local) -> bool;

    /// Materialize a brand-new local entity. Under BusinessKey the id
    /// is left at 0 for the store to assign.
    fn to_entity(&self, remote: &Self::Remote) -> Self::Local;

    /// Whether this kind carries a bulk binary payload that must be
    /// downloaded when the entity is new or changed.
    fn wants_download(&self, _remote: &Self::Remote) -> bool {
        false
    }

    fn local_id(&self, local: &Self::Local) -> i64;
}

/// Where a needs-download entry points: an entity that already has a
/// local id, or one of the `created` entities (by index) whose id only
/// exists after it has been persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadSlot {
    Existing(i64),
    New(usize),
}

/// Result of one reconciliation pass over a parent scope.
#[derive(Debug)]
pub struct ReconcileOutcome<R, L> {
    /// Matched, timestamps equal - untouched
    pub unchanged: Vec<L>,
    /// Matched, remote changed - fields copied, needs an UPDATE
    pub updated: Vec<L>,
    /// No local match - needs an INSERT
    pub created: Vec<L>,
    /// No remote match - needs a DELETE, in this same pass
    pub removed: Vec<L>,
    /// Needs-download accumulator: (slot, remote light)
    pub to_download: Vec<(DownloadSlot, R)>,
}

impl<R, L> ReconcileOutcome<R, L> {
    fn new() -> Self {
        ReconcileOutcome {
            unchanged: Vec::new(),
            updated: Vec::new(),
            created: Vec::new(),
            removed: Vec::new(),
            to_download: Vec::new(),
        }
    }

    /// Total number of surviving local entities.
    pub fn kept(&self) -> usize {
        self.unchanged.len() + self.updated.len() + self.created.len()
    }
}

/// One reconciliation pass: match / copy-if-changed / create-if-absent /
/// delete-if-missing.
///
/// `already_scheduled` is shared across every pass of a run; an entity
/// whose id is in it never receives a second download request, even if
/// its content changed again.
pub fn reconcile<Ru>(
    rules: &Ru,
    remote: &[Ru::Remote],
    local: Vec<Ru::Local>,
    already_scheduled: &HashSet<i64>,
) -> ReconcileOutcome<Ru::Remote, Ru::Local>
where
    Ru: ReconcileRules,
    Ru::Remote: Clone,
{
    let mut out = ReconcileOutcome::new();
    let mut pool: Vec<Option<Ru::Local>> = local.into_iter().map(Some).collect();

    for r in remote {
        let slot = pool
            .iter()
            .position(|candidate| matches!(candidate, Some(l) if rules.is_match(r, l)));

        match slot {
            Some(i) => {
                let mut l = pool[i].take().expect("matched slot is still occupied");
                let changed = rules.copy(r, &mut l);
                if changed {
                    let id = rules.local_id(&l);
                    if rules.wants_download(r) && !already_scheduled.contains(&id) {
                        out.to_download.push((DownloadSlot::Existing(id), r.clone()));
                    }
                    out.updated.push(l);
                } else {
                    out.unchanged.push(l);
                }
            }
            None => {
                let l = rules.to_entity(r);
                if rules.wants_download(r) {
                    out.to_download
                        .push((DownloadSlot::New(out.created.len()), r.clone()));
                }
                out.created.push(l);
            }
        }
    }

    // Set-difference deletion: whatever is still in the pool has no
    // remote counterpart
    out.removed = pool.into_iter().flatten().collect();
    out
}
