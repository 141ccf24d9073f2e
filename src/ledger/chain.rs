//! Per-account journal entry chain
//!
//! An [`AccountChain`] is an arena of one account's entries with index-based
//! previous/next links, rebuilt from the persisted `next_entry_id` foreign
//! keys. Links are plain slot indices, so neighbours never own each other.
//!
//! Invariants kept by every mutation:
//! - the links form one acyclic sequence with a single head and tail
//! - dates never decrease along the chain
//! - within a posted date, `order` strictly increases along the chain and is
//!   therefore unique per `(account, posted_date)`
//!
//! Inserting ahead of same-day entries increments the order of every entry of
//! that day after the insertion point. The cascade walks only that same-day
//! run, so an insert costs O(k) in the number of same-day successors; the
//! outcome reports k so callers can watch it.
//!
//! A chain is a working copy. When a mutation returns an error the copy must
//! be discarded, never persisted.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use crate::types::*;
use crate::utils::validation::validate_adjacency;

#[derive(Debug, Clone)]
struct Node {
    entry_id: EntryId,
    posted_date: NaiveDate,
    order: u32,
    previous: Option<usize>,
    next: Option<usize>,
}

/// Position of one linked entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLink {
    pub entry_id: EntryId,
    pub posted_date: NaiveDate,
    pub order: u32,
    pub previous_entry_id: Option<EntryId>,
    pub next_entry_id: Option<EntryId>,
}

impl ChainLink {
    /// Copy the link fields onto a persisted entry row
    pub fn apply(&self, entry: &mut JournalEntry) {
        entry.posted_date = self.posted_date;
        entry.order = self.order;
        entry.previous_entry_id = self.previous_entry_id;
        entry.next_entry_id = self.next_entry_id;
        entry.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// Result of linking a new entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub link: ChainLink,
    /// Number of same-day successors whose order was incremented
    pub cascaded: usize,
}

/// The ordered, doubly linked entries of one account
#[derive(Debug, Clone)]
pub struct AccountChain {
    account_id: AccountId,
    // Removed entries stay behind as unreachable tombstones.
    nodes: Vec<Node>,
    slots: HashMap<EntryId, usize>,
    index: BTreeMap<(NaiveDate, u32), usize>,
    head: Option<usize>,
    tail: Option<usize>,
    touched: BTreeSet<usize>,
}

impl AccountChain {
    /// An empty chain
    pub fn new(account_id: impl Into<AccountId>) -> Self {
        Self {
            account_id: account_id.into(),
            nodes: Vec::new(),
            slots: HashMap::new(),
            index: BTreeMap::new(),
            head: None,
            tail: None,
            touched: BTreeSet::new(),
        }
    }

    /// Rebuild a chain from persisted rows and verify every invariant.
    ///
    /// Links come from `next_entry_id`; a stored `previous_entry_id` must
    /// mirror them. Any inconsistency is an `Integrity` error.
    pub fn load(account_id: &str, entries: &[JournalEntry]) -> LedgerResult<Self> {
        let mut chain = Self::new(account_id);

        for entry in entries {
            if entry.account_id != account_id {
                return Err(LedgerError::Integrity(format!(
                    "entry {} belongs to account {}, not {}",
                    entry.id, entry.account_id, account_id
                )));
            }
            if chain.slots.contains_key(&entry.id) {
                return Err(LedgerError::Integrity(format!(
                    "entry {} appears twice in account {}",
                    entry.id, account_id
                )));
            }
            chain.slots.insert(entry.id, chain.nodes.len());
            chain.nodes.push(Node {
                entry_id: entry.id,
                posted_date: entry.posted_date,
                order: entry.order,
                previous: None,
                next: None,
            });
        }

        for (idx, entry) in entries.iter().enumerate() {
            let Some(next_id) = entry.next_entry_id else {
                continue;
            };
            let next = *chain.slots.get(&next_id).ok_or_else(|| {
                LedgerError::Integrity(format!(
                    "entry {} links to {}, which is not in account {}",
                    entry.id, next_id, account_id
                ))
            })?;
            if next == idx || chain.nodes[next].previous.is_some() {
                return Err(LedgerError::Integrity(format!(
                    "entry {} is linked from more than one predecessor in account {}",
                    next_id, account_id
                )));
            }
            chain.nodes[idx].next = Some(next);
            chain.nodes[next].previous = Some(idx);
        }

        for (idx, entry) in entries.iter().enumerate() {
            let derived = chain.nodes[idx].previous.map(|p| chain.nodes[p].entry_id);
            if entry.previous_entry_id != derived {
                return Err(LedgerError::Integrity(format!(
                    "entry {} records previous entry {:?} but is linked from {:?}",
                    entry.id, entry.previous_entry_id, derived
                )));
            }
        }

        let heads: Vec<usize> = (0..chain.nodes.len())
            .filter(|&i| chain.nodes[i].previous.is_none())
            .collect();
        let tails: Vec<usize> = (0..chain.nodes.len())
            .filter(|&i| chain.nodes[i].next.is_none())
            .collect();
        if !entries.is_empty() && (heads.len() != 1 || tails.len() != 1) {
            return Err(LedgerError::Integrity(format!(
                "account {} has {} chain heads and {} chain tails",
                account_id,
                heads.len(),
                tails.len()
            )));
        }
        chain.head = heads.first().copied();
        chain.tail = tails.first().copied();

        for (idx, node) in chain.nodes.iter().enumerate() {
            if chain.index.insert((node.posted_date, node.order), idx).is_some() {
                return Err(LedgerError::Integrity(format!(
                    "order {} is used twice on {} in account {}",
                    node.order, node.posted_date, account_id
                )));
            }
        }

        chain.verify()?;
        Ok(chain)
    }

    /// Walk the chain and check every structural and ordering invariant
    pub fn verify(&self) -> LedgerResult<()> {
        let mut visited = 0usize;
        let mut previous: Option<usize> = None;
        let mut cursor = self.head;

        while let Some(idx) = cursor {
            visited += 1;
            if visited > self.slots.len() {
                return Err(self.broken("chain is cyclic"));
            }

            let node = &self.nodes[idx];
            if node.previous != previous {
                return Err(self.broken(&format!(
                    "entry {} has an inconsistent previous link",
                    node.entry_id
                )));
            }
            if let Some(p) = previous {
                let prev = &self.nodes[p];
                if prev.posted_date > node.posted_date {
                    return Err(self.broken(&format!(
                        "entry {} is posted before its predecessor {}",
                        node.entry_id, prev.entry_id
                    )));
                }
                if prev.posted_date == node.posted_date && prev.order >= node.order {
                    return Err(self.broken(&format!(
                        "entry {} does not follow {} in same-day order",
                        node.entry_id, prev.entry_id
                    )));
                }
            }

            previous = Some(idx);
            cursor = node.next;
        }

        if visited != self.slots.len() {
            return Err(self.broken(&format!(
                "{} of {} entries are reachable from the head",
                visited,
                self.slots.len()
            )));
        }
        if previous != self.tail {
            return Err(self.broken("chain does not end at its tail"));
        }
        if self.index.len() != self.slots.len() {
            return Err(self.broken("order index is out of sync"));
        }
        Ok(())
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, entry_id: EntryId) -> bool {
        self.slots.contains_key(&entry_id)
    }

    pub fn head(&self) -> Option<ChainLink> {
        self.head.map(|idx| self.link(idx))
    }

    pub fn tail(&self) -> Option<ChainLink> {
        self.tail.map(|idx| self.link(idx))
    }

    pub fn get(&self, entry_id: EntryId) -> Option<ChainLink> {
        self.slots.get(&entry_id).map(|&idx| self.link(idx))
    }

    /// Links in chain order
    pub fn iter(&self) -> Links<'_> {
        Links {
            chain: self,
            cursor: self.head,
        }
    }

    /// Current links of every entry changed since the chain was loaded
    pub fn touched(&self) -> Vec<ChainLink> {
        self.touched
            .iter()
            .filter(|&&idx| self.is_live(idx))
            .map(|&idx| self.link(idx))
            .collect()
    }

    /// Link a new entry into the chain.
    ///
    /// With [`Placement::Auto`] the successor is the first entry posted after
    /// `posted_date`; with [`Placement::Before`] it is the given anchor, and
    /// the resulting neighbours are validated before anything changes. The
    /// predecessor is the successor's predecessor, or the tail when there is
    /// no successor.
    pub fn insert(
        &mut self,
        entry_id: EntryId,
        posted_date: NaiveDate,
        placement: Placement,
    ) -> LedgerResult<InsertOutcome> {
        if self.slots.contains_key(&entry_id) {
            return Err(LedgerError::Integrity(format!(
                "entry {} is already linked in account {}",
                entry_id, self.account_id
            )));
        }

        let successor = match placement {
            Placement::Auto => self.first_after(posted_date),
            Placement::Before(anchor_id) => Some(*self.slots.get(&anchor_id).ok_or_else(|| {
                LedgerError::Validation(
                    ValidationError::PlacementOutsideAccount {
                        entry_id,
                        anchor_id,
                        account_id: self.account_id.clone(),
                    }
                    .into(),
                )
            })?),
        };
        let predecessor = match successor {
            Some(idx) => self.nodes[idx].previous,
            None => self.tail,
        };

        validate_adjacency(
            entry_id,
            posted_date,
            predecessor.map(|idx| self.neighbour(idx)),
            successor.map(|idx| self.neighbour(idx)),
        )
        .into_result()?;

        let order = match predecessor {
            Some(idx) if self.nodes[idx].posted_date == posted_date => {
                self.nodes[idx].order.checked_add(1).ok_or_else(|| {
                    self.broken(&format!("order overflow on {}", posted_date))
                })?
            }
            _ => 1,
        };

        let cascaded = self.shift_same_day_run(successor, posted_date)?;

        let idx = self.nodes.len();
        self.nodes.push(Node {
            entry_id,
            posted_date,
            order,
            previous: predecessor,
            next: successor,
        });
        match predecessor {
            Some(p) => {
                self.nodes[p].next = Some(idx);
                self.touched.insert(p);
            }
            None => self.head = Some(idx),
        }
        match successor {
            Some(s) => {
                self.nodes[s].previous = Some(idx);
                self.touched.insert(s);
            }
            None => self.tail = Some(idx),
        }
        self.slots.insert(entry_id, idx);
        if self.index.insert((posted_date, order), idx).is_some() {
            return Err(self.broken(&format!(
                "order {} on {} collided while linking {}",
                order, posted_date, entry_id
            )));
        }
        self.touched.insert(idx);

        tracing::debug!(
            account_id = %self.account_id,
            entry_id = %entry_id,
            %posted_date,
            order,
            cascaded,
            "linked journal entry"
        );

        Ok(InsertOutcome {
            link: self.link(idx),
            cascaded,
        })
    }

    /// Unlink an entry, joining its predecessor and successor directly.
    ///
    /// Surviving orders are left alone; gaps are allowed. Fails with
    /// `Integrity` when the entry's neighbours do not point back at it, since
    /// unlinking it would then orphan another entry.
    pub fn remove(&mut self, entry_id: EntryId) -> LedgerResult<ChainLink> {
        let idx = *self.slots.get(&entry_id).ok_or_else(|| {
            LedgerError::Integrity(format!(
                "entry {} is not linked in account {}",
                entry_id, self.account_id
            ))
        })?;
        let removed = self.link(idx);
        let Node {
            previous,
            next,
            posted_date,
            order,
            ..
        } = self.nodes[idx].clone();

        let previous_ok = match previous {
            Some(p) => self.nodes[p].next == Some(idx),
            None => self.head == Some(idx),
        };
        let next_ok = match next {
            Some(n) => self.nodes[n].previous == Some(idx),
            None => self.tail == Some(idx),
        };
        if !previous_ok || !next_ok {
            return Err(self.broken(&format!(
                "removing entry {} would orphan a neighbour",
                entry_id
            )));
        }

        match previous {
            Some(p) => {
                self.nodes[p].next = next;
                self.touched.insert(p);
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                self.nodes[n].previous = previous;
                self.touched.insert(n);
            }
            None => self.tail = previous,
        }

        self.index.remove(&(posted_date, order));
        self.slots.remove(&entry_id);
        self.nodes[idx].previous = None;
        self.nodes[idx].next = None;
        self.touched.remove(&idx);

        tracing::debug!(
            account_id = %self.account_id,
            entry_id = %entry_id,
            "unlinked journal entry"
        );

        Ok(removed)
    }

    /// Check a linked entry's date against its current neighbours
    pub fn validate_links(&self, entry_id: EntryId) -> LedgerResult<ValidationErrors> {
        let idx = *self
            .slots
            .get(&entry_id)
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        let node = &self.nodes[idx];
        Ok(validate_adjacency(
            entry_id,
            node.posted_date,
            node.previous.map(|p| self.neighbour(p)),
            node.next.map(|n| self.neighbour(n)),
        ))
    }

    fn first_after(&self, posted_date: NaiveDate) -> Option<usize> {
        self.index
            .range((Bound::Excluded((posted_date, u32::MAX)), Bound::Unbounded))
            .next()
            .map(|(_, &idx)| idx)
    }

    // Increments the order of every entry from `start` while it is posted on
    // `posted_date`. Keys are moved in two passes so they never collide.
    fn shift_same_day_run(
        &mut self,
        start: Option<usize>,
        posted_date: NaiveDate,
    ) -> LedgerResult<usize> {
        let mut run = Vec::new();
        let mut cursor = start;
        while let Some(idx) = cursor {
            if self.nodes[idx].posted_date != posted_date {
                break;
            }
            run.push(idx);
            cursor = self.nodes[idx].next;
        }

        for &idx in &run {
            self.index.remove(&(posted_date, self.nodes[idx].order));
        }
        for &idx in &run {
            let order = self.nodes[idx].order.checked_add(1).ok_or_else(|| {
                self.broken(&format!("order overflow on {}", posted_date))
            })?;
            self.nodes[idx].order = order;
            self.index.insert((posted_date, order), idx);
            self.touched.insert(idx);
        }

        Ok(run.len())
    }

    fn is_live(&self, idx: usize) -> bool {
        self.slots.get(&self.nodes[idx].entry_id) == Some(&idx)
    }

    fn neighbour(&self, idx: usize) -> (EntryId, NaiveDate) {
        (self.nodes[idx].entry_id, self.nodes[idx].posted_date)
    }

    fn link(&self, idx: usize) -> ChainLink {
        let node = &self.nodes[idx];
        ChainLink {
            entry_id: node.entry_id,
            posted_date: node.posted_date,
            order: node.order,
            previous_entry_id: node.previous.map(|p| self.nodes[p].entry_id),
            next_entry_id: node.next.map(|n| self.nodes[n].entry_id),
        }
    }

    fn broken(&self, reason: &str) -> LedgerError {
        LedgerError::Integrity(format!("account {}: {}", self.account_id, reason))
    }
}

/// Iterator over a chain's links from head to tail
pub struct Links<'a> {
    chain: &'a AccountChain,
    cursor: Option<usize>,
}

impl Iterator for Links<'_> {
    type Item = ChainLink;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        self.cursor = self.chain.nodes[idx].next;
        Some(self.chain.link(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn ids(chain: &AccountChain) -> Vec<EntryId> {
        chain.iter().map(|l| l.entry_id).collect()
    }

    fn order_of(chain: &AccountChain, id: EntryId) -> u32 {
        chain.get(id).unwrap().order
    }

    fn insert(chain: &mut AccountChain, d: u32) -> EntryId {
        let id = Uuid::new_v4();
        chain.insert(id, day(d), Placement::Auto).unwrap();
        id
    }

    fn persisted(chain: &AccountChain) -> Vec<JournalEntry> {
        chain
            .iter()
            .map(|link| {
                let mut draft = EntryDraft::credit(chain.account_id(), 100, link.posted_date);
                draft.id = link.entry_id;
                let mut entry = JournalEntry::from_draft(&draft, "t", link.posted_date);
                link.apply(&mut entry);
                entry
            })
            .collect()
    }

    #[test]
    fn test_first_entry_is_head_and_tail() {
        let mut chain = AccountChain::new("cash");
        let id = Uuid::new_v4();

        let outcome = chain.insert(id, day(1), Placement::Auto).unwrap();

        assert_eq!(outcome.link.order, 1);
        assert_eq!(outcome.cascaded, 0);
        assert_eq!(chain.head().unwrap().entry_id, id);
        assert_eq!(chain.tail().unwrap().entry_id, id);
        assert!(outcome.link.previous_entry_id.is_none());
        assert!(outcome.link.next_entry_id.is_none());
    }

    #[test]
    fn test_insert_between_days() {
        let mut chain = AccountChain::new("cash");
        let e1 = insert(&mut chain, 1);
        let e2 = insert(&mut chain, 3);
        let e3 = insert(&mut chain, 2);

        assert_eq!(ids(&chain), vec![e1, e3, e2]);
        assert!(chain.iter().all(|l| l.order == 1));
        assert_eq!(chain.get(e3).unwrap().previous_entry_id, Some(e1));
        assert_eq!(chain.get(e3).unwrap().next_entry_id, Some(e2));
        chain.verify().unwrap();
    }

    #[test]
    fn test_same_day_appends_after_existing() {
        let mut chain = AccountChain::new("cash");
        let a = insert(&mut chain, 1);
        let b = insert(&mut chain, 1);

        assert_eq!(ids(&chain), vec![a, b]);
        assert_eq!(order_of(&chain, a), 1);
        assert_eq!(order_of(&chain, b), 2);
    }

    #[test]
    fn test_same_day_insert_before_cascades() {
        let mut chain = AccountChain::new("cash");
        let a = insert(&mut chain, 1);
        let c = insert(&mut chain, 1);
        let next_day = insert(&mut chain, 2);

        let b = Uuid::new_v4();
        let outcome = chain.insert(b, day(1), Placement::Before(c)).unwrap();

        assert_eq!(outcome.cascaded, 1);
        assert_eq!(ids(&chain), vec![a, b, c, next_day]);
        assert_eq!(order_of(&chain, a), 1);
        assert_eq!(order_of(&chain, b), 2);
        assert_eq!(order_of(&chain, c), 3);
        assert_eq!(order_of(&chain, next_day), 1);
        chain.verify().unwrap();
    }

    #[test]
    fn test_insert_before_head_renumbers_whole_day() {
        let mut chain = AccountChain::new("cash");
        let a = insert(&mut chain, 1);
        let b = Uuid::new_v4();

        chain.insert(b, day(1), Placement::Before(a)).unwrap();

        assert_eq!(chain.head().unwrap().entry_id, b);
        assert_eq!(order_of(&chain, b), 1);
        assert_eq!(order_of(&chain, a), 2);
    }

    #[test]
    fn test_cascade_does_not_cross_days() {
        let mut chain = AccountChain::new("cash");
        let later = insert(&mut chain, 2);
        let earlier = insert(&mut chain, 1);

        assert_eq!(order_of(&chain, later), 1);
        assert_eq!(order_of(&chain, earlier), 1);
        assert_eq!(ids(&chain), vec![earlier, later]);
    }

    #[test]
    fn test_touched_reports_changed_neighbours() {
        let mut chain = AccountChain::new("cash");
        let a = insert(&mut chain, 1);
        let c = insert(&mut chain, 3);
        let chain_before = persisted(&chain);
        let mut chain = AccountChain::load("cash", &chain_before).unwrap();

        let b = insert(&mut chain, 2);

        let touched: Vec<EntryId> = chain.touched().iter().map(|l| l.entry_id).collect();
        assert_eq!(touched.len(), 3);
        assert!(touched.contains(&a) && touched.contains(&b) && touched.contains(&c));
    }

    #[test]
    fn test_remove_head() {
        let mut chain = AccountChain::new("cash");
        let a = insert(&mut chain, 1);
        let b = insert(&mut chain, 1);
        let c = insert(&mut chain, 1);

        chain.remove(a).unwrap();

        assert_eq!(ids(&chain), vec![b, c]);
        let head = chain.head().unwrap();
        assert_eq!(head.entry_id, b);
        assert!(head.previous_entry_id.is_none());
        assert_eq!(head.order, 2);
        chain.verify().unwrap();
    }

    #[test]
    fn test_remove_middle_and_tail() {
        let mut chain = AccountChain::new("cash");
        let a = insert(&mut chain, 1);
        let b = insert(&mut chain, 1);
        let c = insert(&mut chain, 1);

        chain.remove(b).unwrap();
        assert_eq!(chain.get(a).unwrap().next_entry_id, Some(c));
        assert_eq!(chain.get(c).unwrap().previous_entry_id, Some(a));
        assert_eq!(order_of(&chain, c), 3);

        chain.remove(c).unwrap();
        assert_eq!(chain.tail().unwrap().entry_id, a);

        chain.remove(a).unwrap();
        assert!(chain.is_empty());
        assert!(chain.head().is_none() && chain.tail().is_none());
        chain.verify().unwrap();
    }

    #[test]
    fn test_insert_after_gap_keeps_orders_unique() {
        let mut chain = AccountChain::new("cash");
        let a = insert(&mut chain, 1);
        let b = insert(&mut chain, 1);
        let c = insert(&mut chain, 1);
        chain.remove(b).unwrap();

        let d = Uuid::new_v4();
        chain.insert(d, day(1), Placement::Before(c)).unwrap();

        assert_eq!(order_of(&chain, a), 1);
        assert_eq!(order_of(&chain, d), 2);
        assert_eq!(order_of(&chain, c), 4);
        chain.verify().unwrap();
    }

    #[test]
    fn test_remove_unknown_entry_is_integrity_error() {
        let mut chain = AccountChain::new("cash");
        assert!(matches!(
            chain.remove(Uuid::new_v4()),
            Err(LedgerError::Integrity(_))
        ));
    }

    #[test]
    fn test_placement_outside_account() {
        let mut chain = AccountChain::new("cash");
        insert(&mut chain, 1);

        let err = chain
            .insert(Uuid::new_v4(), day(1), Placement::Before(Uuid::new_v4()))
            .unwrap_err();

        let errors = err.validation_errors().unwrap();
        assert!(matches!(
            errors.errors()[0],
            ValidationError::PlacementOutsideAccount { .. }
        ));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_placement_violating_dates_is_rejected_without_mutation() {
        let mut chain = AccountChain::new("cash");
        let a = insert(&mut chain, 1);
        let b = insert(&mut chain, 3);

        let err = chain
            .insert(Uuid::new_v4(), day(5), Placement::Before(b))
            .unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors.errors()[0],
            ValidationError::PostedAfterNextEntry { next_entry_id, .. } if next_entry_id == b
        ));

        let err = chain
            .insert(Uuid::new_v4(), day(1), Placement::Before(a))
            .map(|_| ());
        assert!(err.is_ok());
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_double_insert_is_integrity_error() {
        let mut chain = AccountChain::new("cash");
        let a = insert(&mut chain, 1);
        assert!(matches!(
            chain.insert(a, day(2), Placement::Auto),
            Err(LedgerError::Integrity(_))
        ));
    }

    #[test]
    fn test_validate_links() {
        let mut chain = AccountChain::new("cash");
        let a = insert(&mut chain, 1);
        assert!(chain.validate_links(a).unwrap().is_empty());
        assert!(matches!(
            chain.validate_links(Uuid::new_v4()),
            Err(LedgerError::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_load_round_trips_links() {
        let mut chain = AccountChain::new("cash");
        for d in [3, 1, 2, 1, 3] {
            insert(&mut chain, d);
        }

        let rows = persisted(&chain);
        let loaded = AccountChain::load("cash", &rows).unwrap();

        assert_eq!(ids(&loaded), ids(&chain));
        assert!(loaded.touched().is_empty());
    }

    #[test]
    fn test_load_rejects_cycle() {
        let mut chain = AccountChain::new("cash");
        insert(&mut chain, 1);
        insert(&mut chain, 2);
        let mut rows = persisted(&chain);
        rows[1].next_entry_id = Some(rows[0].id);
        rows[0].previous_entry_id = Some(rows[1].id);

        assert!(matches!(
            AccountChain::load("cash", &rows),
            Err(LedgerError::Integrity(_))
        ));
    }

    #[test]
    fn test_load_rejects_two_heads() {
        let mut chain = AccountChain::new("cash");
        insert(&mut chain, 1);
        insert(&mut chain, 2);
        let mut rows = persisted(&chain);
        rows[0].next_entry_id = None;
        rows[1].previous_entry_id = None;

        assert!(matches!(
            AccountChain::load("cash", &rows),
            Err(LedgerError::Integrity(_))
        ));
    }

    #[test]
    fn test_load_rejects_duplicate_order() {
        let mut chain = AccountChain::new("cash");
        insert(&mut chain, 1);
        insert(&mut chain, 1);
        let mut rows = persisted(&chain);
        rows[1].order = 1;

        assert!(matches!(
            AccountChain::load("cash", &rows),
            Err(LedgerError::Integrity(_))
        ));
    }

    #[test]
    fn test_load_rejects_out_of_order_dates() {
        let mut chain = AccountChain::new("cash");
        insert(&mut chain, 1);
        insert(&mut chain, 2);
        let mut rows = persisted(&chain);
        rows[0].posted_date = day(9);

        assert!(matches!(
            AccountChain::load("cash", &rows),
            Err(LedgerError::Integrity(_))
        ));
    }

    #[test]
    fn test_load_rejects_foreign_entry() {
        let mut chain = AccountChain::new("cash");
        insert(&mut chain, 1);
        let rows = persisted(&chain);

        assert!(matches!(
            AccountChain::load("savings", &rows),
            Err(LedgerError::Integrity(_))
        ));
    }

    fn assert_invariants(chain: &AccountChain) {
        chain.verify().unwrap();
        let links: Vec<ChainLink> = chain.iter().collect();
        for pair in links.windows(2) {
            assert!(pair[0].posted_date <= pair[1].posted_date);
            if pair[0].posted_date == pair[1].posted_date {
                assert!(pair[0].order < pair[1].order);
            }
        }
        let mut keys: Vec<(NaiveDate, u32)> =
            links.iter().map(|l| (l.posted_date, l.order)).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), links.len());
    }

    proptest! {
        #[test]
        fn prop_distinct_days_shape_is_insert_order_independent(
            days in Just((1u32..=20).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let mut chain = AccountChain::new("cash");
            for d in &days {
                chain.insert(Uuid::new_v4(), day(*d), Placement::Auto).unwrap();
            }
            let dates: Vec<NaiveDate> = chain.iter().map(|l| l.posted_date).collect();
            let expected: Vec<NaiveDate> = (1u32..=20).map(day).collect();
            prop_assert_eq!(dates, expected);
            prop_assert!(chain.iter().all(|l| l.order == 1));
        }

        #[test]
        fn prop_mutations_preserve_invariants(
            ops in prop::collection::vec((1u32..=4, any::<bool>(), any::<prop::sample::Index>()), 1..60)
        ) {
            let mut chain = AccountChain::new("cash");
            for (d, remove, pick) in ops {
                let linked: Vec<ChainLink> = chain.iter().collect();
                if remove && !linked.is_empty() {
                    let victim = linked[pick.index(linked.len())];
                    let before: Vec<(EntryId, u32)> = linked
                        .iter()
                        .filter(|l| l.entry_id != victim.entry_id)
                        .map(|l| (l.entry_id, l.order))
                        .collect();
                    chain.remove(victim.entry_id).unwrap();
                    let after: Vec<(EntryId, u32)> =
                        chain.iter().map(|l| (l.entry_id, l.order)).collect();
                    prop_assert_eq!(before, after);
                } else if !linked.is_empty() && pick.index(2) == 0 {
                    // Place before an anchor on the same day so the neighbours agree.
                    let anchor = linked[pick.index(linked.len())];
                    let same_day_before: Vec<(EntryId, u32)> = linked
                        .iter()
                        .filter(|l| l.posted_date == anchor.posted_date)
                        .map(|l| (l.entry_id, l.order))
                        .collect();
                    chain
                        .insert(Uuid::new_v4(), anchor.posted_date, Placement::Before(anchor.entry_id))
                        .unwrap();
                    for (id, order) in same_day_before {
                        let now = chain.get(id).unwrap().order;
                        if order >= anchor.order {
                            prop_assert_eq!(now, order + 1);
                        } else {
                            prop_assert_eq!(now, order);
                        }
                    }
                } else {
                    chain.insert(Uuid::new_v4(), day(d), Placement::Auto).unwrap();
                }
                assert_invariants(&chain);
            }
        }
    }
}
