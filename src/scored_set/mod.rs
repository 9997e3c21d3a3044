//! Score-ordered set of keys, the in-memory index of the queue.
//!
//! A [`ScoredSet`] maps each key to a single `i64` score and keeps the
//! entries ordered by `(score, key)` ascending. It is a probabilistic skip
//! list in the redis style: arena-allocated nodes carry per-level forward
//! links, each link annotated with the number of bottom-level steps it
//! covers (its *span*), which makes rank-addressed access logarithmic. A
//! side table maps keys to their arena slots so point lookups never walk
//! the list.
//!
//! # Operations
//!
//! - `upsert` / `get` / `remove` / `count`: O(log N) or better
//! - `pop_by_score_range`: extract entries whose score lies in `[min, max]`
//! - `pop_by_rank_range`: extract entries at 1-based ranks `[start, end]`
//!
//! Both pop variants return entries in ascending `(score, key)` order and
//! remove what they return, so concurrent callers (serialized by the owner's
//! lock) never observe the same entry twice.
//!
//! The set performs no I/O and has no failure modes beyond allocation.

use std::collections::HashMap;
use std::fmt;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[cfg(test)]
mod tests;

/// Hard cap on tower height. 2^32 entries would be needed to profit from
/// more levels than this.
const MAX_LEVEL: usize = 32;

/// A forward pointer at one level of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    /// Arena slot of the next node at this level, if any.
    forward: Option<usize>,
    /// Number of bottom-level steps from the link's owner to `forward`
    /// (or to the end of the list when `forward` is `None`).
    span: usize,
}

impl Link {
    const EMPTY: Link = Link {
        forward: None,
        span: 0,
    };
}

#[derive(Debug)]
struct Node {
    key: String,
    score: i64,
    /// One link per level this node participates in; index 0 is the full
    /// bottom-level chain.
    links: Vec<Link>,
}

/// An ordered set of `(key, score)` pairs with rank- and score-range pops.
pub struct ScoredSet {
    /// Head links, one per level. Only the first `level` entries are live.
    head: [Link; MAX_LEVEL],
    /// Number of levels currently in use, always at least 1.
    level: usize,
    /// Node arena. `None` slots are free and tracked in `free`.
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    /// Key to arena slot, for O(1) point lookup.
    slots: HashMap<String, usize>,
    len: usize,
    rng: SmallRng,
}

impl ScoredSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        ScoredSet {
            head: [Link::EMPTY; MAX_LEVEL],
            level: 1,
            nodes: Vec::new(),
            free: Vec::new(),
            slots: HashMap::new(),
            len: 0,
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Number of entries in the set.
    pub fn count(&self) -> usize {
        self.len
    }

    /// Returns true if the set holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the score stored for `key`, if present.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.slots.get(key).map(|&slot| self.node(slot).score)
    }

    /// Inserts `key` with `score`, or moves an existing `key` to `score`.
    ///
    /// Returns `true` if the key was newly inserted, `false` if an existing
    /// entry was updated (or left alone because the score was unchanged).
    pub fn upsert(&mut self, key: impl Into<String>, score: i64) -> bool {
        let key = key.into();
        if let Some(&slot) = self.slots.get(&key) {
            if self.node(slot).score != score {
                self.slots.remove(&key);
                let node = self.unlink(slot);
                self.insert_node(node.key, score);
            }
            false
        } else {
            self.insert_node(key, score);
            true
        }
    }

    /// Removes `key` from the set. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.slots.remove(key) {
            Some(slot) => {
                self.unlink(slot);
                true
            }
            None => false,
        }
    }

    /// Extracts up to `limit` entries whose scores lie in `[min, max]`,
    /// in ascending `(score, key)` order.
    ///
    /// `i64::MIN` serves as the unbounded lower end. A `limit` of zero
    /// extracts nothing.
    pub fn pop_by_score_range(&mut self, min: i64, max: i64, limit: usize) -> Vec<(String, i64)> {
        if limit == 0 || min > max || self.len == 0 {
            return Vec::new();
        }

        // Descend to the last node with score < min.
        let mut pred: Option<usize> = None;
        for lvl in (0..self.level).rev() {
            loop {
                let link = self.link(pred, lvl);
                let Some(next) = link.forward else { break };
                if self.node(next).score < min {
                    pred = Some(next);
                } else {
                    break;
                }
            }
        }

        let mut popped = Vec::new();
        let mut cursor = self.link(pred, 0).forward;
        while let Some(slot) = cursor {
            if popped.len() >= limit {
                break;
            }
            let node = self.node(slot);
            if node.score > max {
                break;
            }
            popped.push((node.key.clone(), node.score));
            cursor = node.links[0].forward;
        }

        for (key, _) in &popped {
            self.remove(key);
        }
        popped
    }

    /// Extracts the entries at 1-based ranks `[start, end]` in ascending
    /// order. `end` is clamped to the current count; a `start` of zero is
    /// treated as 1. Returns empty when the range selects nothing.
    pub fn pop_by_rank_range(&mut self, start: usize, end: usize) -> Vec<(String, i64)> {
        let start = start.max(1);
        let end = end.min(self.len);
        if start > end {
            return Vec::new();
        }

        // Walk spans down to the node at rank start - 1.
        let mut pred: Option<usize> = None;
        let mut traversed = 0usize;
        for lvl in (0..self.level).rev() {
            loop {
                let link = self.link(pred, lvl);
                if link.forward.is_some() && traversed + link.span < start {
                    traversed += link.span;
                    pred = link.forward;
                } else {
                    break;
                }
            }
        }

        let take = end - start + 1;
        let mut popped = Vec::with_capacity(take);
        let mut cursor = self.link(pred, 0).forward;
        while let Some(slot) = cursor {
            if popped.len() >= take {
                break;
            }
            let node = self.node(slot);
            popped.push((node.key.clone(), node.score));
            cursor = node.links[0].forward;
        }

        for (key, _) in &popped {
            self.remove(key);
        }
        popped
    }

    /// Iterates the entries in ascending `(score, key)` order without
    /// removing them.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            set: self,
            cursor: self.head[0].forward,
        }
    }

    // ─── Internals ───

    fn node(&self, slot: usize) -> &Node {
        self.nodes[slot].as_ref().expect("arena slot is live")
    }

    fn link(&self, pred: Option<usize>, lvl: usize) -> Link {
        match pred {
            None => self.head[lvl],
            Some(slot) => self.node(slot).links[lvl],
        }
    }

    fn link_mut(&mut self, pred: Option<usize>, lvl: usize) -> &mut Link {
        match pred {
            None => &mut self.head[lvl],
            Some(slot) => &mut self.nodes[slot].as_mut().expect("arena slot is live").links[lvl],
        }
    }

    /// Geometric tower height with branching factor 4.
    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.random_ratio(1, 4) {
            level += 1;
        }
        level
    }

    /// Finds, per level, the last node ordered strictly before `(score, key)`
    /// (`None` meaning the head), along with its 0-based bottom-level rank.
    fn find_update(
        &self,
        score: i64,
        key: &str,
    ) -> ([Option<usize>; MAX_LEVEL], [usize; MAX_LEVEL]) {
        let mut update = [None; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];
        let mut pred: Option<usize> = None;
        let mut traversed = 0usize;

        for lvl in (0..self.level).rev() {
            loop {
                let link = self.link(pred, lvl);
                let Some(next) = link.forward else { break };
                let node = self.node(next);
                if (node.score, node.key.as_str()) < (score, key) {
                    traversed += link.span;
                    pred = Some(next);
                } else {
                    break;
                }
            }
            update[lvl] = pred;
            rank[lvl] = traversed;
        }
        (update, rank)
    }

    /// Links a fresh node into the list. The key must not be present.
    fn insert_node(&mut self, key: String, score: i64) {
        let (mut update, mut rank) = self.find_update(score, &key);

        let height = self.random_level();
        if height > self.level {
            for lvl in self.level..height {
                rank[lvl] = 0;
                update[lvl] = None;
                self.head[lvl] = Link {
                    forward: None,
                    span: self.len,
                };
            }
            self.level = height;
        }

        // New node's links, derived from each predecessor's link before it
        // is redirected. rank[0] is the rank of the immediate predecessor.
        let links: Vec<Link> = (0..height)
            .map(|lvl| {
                let through = self.link(update[lvl], lvl);
                Link {
                    forward: through.forward,
                    span: through.span - (rank[0] - rank[lvl]),
                }
            })
            .collect();

        let node = Node { key: key.clone(), score, links };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };

        for lvl in 0..height {
            let link = self.link_mut(update[lvl], lvl);
            link.forward = Some(slot);
            link.span = (rank[0] - rank[lvl]) + 1;
        }
        // Levels above the new tower now skip over one more node.
        for lvl in height..self.level {
            self.link_mut(update[lvl], lvl).span += 1;
        }

        self.slots.insert(key, slot);
        self.len += 1;
    }

    /// Unlinks the node in `slot` and returns it. The caller maintains the
    /// `slots` table.
    fn unlink(&mut self, slot: usize) -> Node {
        let (score, key) = {
            let node = self.node(slot);
            (node.score, node.key.clone())
        };
        let (update, _) = self.find_update(score, &key);
        let removed_links = self.node(slot).links.clone();

        for lvl in 0..self.level {
            let link = self.link_mut(update[lvl], lvl);
            if link.forward == Some(slot) {
                link.span += removed_links[lvl].span;
                link.span -= 1;
                link.forward = removed_links[lvl].forward;
            } else {
                link.span -= 1;
            }
        }

        while self.level > 1 && self.head[self.level - 1].forward.is_none() {
            self.head[self.level - 1] = Link::EMPTY;
            self.level -= 1;
        }

        self.len -= 1;
        let node = self.nodes[slot].take().expect("arena slot is live");
        self.free.push(slot);
        node
    }
}

impl Default for ScoredSet {
    fn default() -> Self {
        ScoredSet::new()
    }
}

impl fmt::Debug for ScoredSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoredSet")
            .field("len", &self.len)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

/// Non-destructive in-order iterator over a [`ScoredSet`].
pub struct Iter<'a> {
    set: &'a ScoredSet,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, i64);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.set.node(slot);
        self.cursor = node.links[0].forward;
        Some((node.key.as_str(), node.score))
    }
}
