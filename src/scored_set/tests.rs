use std::collections::BTreeSet;

use proptest::prelude::*;

use super::ScoredSet;

// ─── Basic operations ───

#[test]
fn new_set_is_empty() {
    let set = ScoredSet::new();
    assert_eq!(set.count(), 0);
    assert!(set.is_empty());
    assert_eq!(set.get("missing"), None);
}

#[test]
fn upsert_reports_new_vs_existing() {
    let mut set = ScoredSet::new();
    assert!(set.upsert("a", 10));
    assert!(!set.upsert("a", 20));
    assert!(!set.upsert("a", 20));
    assert_eq!(set.count(), 1);
    assert_eq!(set.get("a"), Some(20));
}

#[test]
fn upsert_resorts_on_score_change() {
    let mut set = ScoredSet::new();
    set.upsert("a", 10);
    set.upsert("b", 20);
    set.upsert("a", 30);

    let order: Vec<_> = set.iter().map(|(k, s)| (k.to_string(), s)).collect();
    assert_eq!(order, vec![("b".to_string(), 20), ("a".to_string(), 30)]);
}

#[test]
fn remove_returns_presence() {
    let mut set = ScoredSet::new();
    set.upsert("a", 1);
    assert!(set.remove("a"));
    assert!(!set.remove("a"));
    assert_eq!(set.count(), 0);
    assert_eq!(set.get("a"), None);
}

#[test]
fn iter_orders_by_score_then_key() {
    let mut set = ScoredSet::new();
    set.upsert("b", 2);
    set.upsert("c", 1);
    set.upsert("a", 2);

    let order: Vec<_> = set.iter().map(|(k, _)| k.to_string()).collect();
    assert_eq!(order, vec!["c", "a", "b"]);
}

// ─── pop_by_score_range ───

#[test]
fn pop_by_score_range_is_inclusive() {
    let mut set = ScoredSet::new();
    set.upsert("a", 1);
    set.upsert("b", 2);
    set.upsert("c", 3);

    let popped = set.pop_by_score_range(2, 3, 10);
    assert_eq!(
        popped,
        vec![("b".to_string(), 2), ("c".to_string(), 3)]
    );
    assert_eq!(set.count(), 1);
    assert_eq!(set.get("a"), Some(1));
}

#[test]
fn pop_by_score_range_honors_limit() {
    let mut set = ScoredSet::new();
    for (key, score) in [("a", 1), ("b", 2), ("c", 3)] {
        set.upsert(key, score);
    }

    let popped = set.pop_by_score_range(i64::MIN, i64::MAX, 2);
    assert_eq!(popped, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    assert_eq!(set.count(), 1);
}

#[test]
fn pop_by_score_range_zero_limit_is_a_noop() {
    let mut set = ScoredSet::new();
    set.upsert("a", 1);
    assert!(set.pop_by_score_range(i64::MIN, i64::MAX, 0).is_empty());
    assert_eq!(set.count(), 1);
}

#[test]
fn pop_by_score_range_unbounded_min() {
    let mut set = ScoredSet::new();
    set.upsert("low", i64::MIN);
    set.upsert("high", i64::MAX);

    let popped = set.pop_by_score_range(i64::MIN, 0, 10);
    assert_eq!(popped, vec![("low".to_string(), i64::MIN)]);
}

#[test]
fn pop_by_score_range_ties_break_by_key() {
    let mut set = ScoredSet::new();
    set.upsert("b", 5);
    set.upsert("a", 5);
    set.upsert("c", 5);

    let popped = set.pop_by_score_range(5, 5, 10);
    let keys: Vec<_> = popped.into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
}

// ─── pop_by_rank_range ───

#[test]
fn pop_by_rank_range_selects_by_rank() {
    let mut set = ScoredSet::new();
    for (key, score) in [("a", 10), ("b", 20), ("c", 30), ("d", 40)] {
        set.upsert(key, score);
    }

    let popped = set.pop_by_rank_range(2, 3);
    assert_eq!(
        popped,
        vec![("b".to_string(), 20), ("c".to_string(), 30)]
    );
    assert_eq!(set.count(), 2);
    assert_eq!(set.get("a"), Some(10));
    assert_eq!(set.get("d"), Some(40));
}

#[test]
fn pop_by_rank_range_clamps_end() {
    let mut set = ScoredSet::new();
    set.upsert("a", 1);
    set.upsert("b", 2);

    let popped = set.pop_by_rank_range(1, 100);
    assert_eq!(popped.len(), 2);
    assert!(set.is_empty());
}

#[test]
fn pop_by_rank_range_beyond_count_is_empty() {
    let mut set = ScoredSet::new();
    set.upsert("a", 1);
    assert!(set.pop_by_rank_range(2, 5).is_empty());
    assert_eq!(set.count(), 1);
}

#[test]
fn pop_by_rank_range_on_empty_set() {
    let mut set = ScoredSet::new();
    assert!(set.pop_by_rank_range(1, 10).is_empty());
}

// ─── Scale ───

#[test]
fn large_population_stays_ordered() {
    let mut set = ScoredSet::new();
    // Insert in a scattered order.
    for i in 0..1000u64 {
        let key = format!("key-{:04}", (i * 7919) % 1000);
        set.upsert(key, ((i * 7919) % 1000) as i64);
    }
    assert_eq!(set.count(), 1000);

    let mut previous = None;
    for (key, score) in set.iter() {
        if let Some((prev_key, prev_score)) = previous {
            assert!((prev_score, prev_key) < (score, key.to_string()));
        }
        previous = Some((key.to_string(), score));
    }

    // Drain through ranks and confirm global ordering survives removal.
    let mut drained = Vec::new();
    while set.count() > 0 {
        drained.extend(set.pop_by_rank_range(1, 17));
    }
    assert_eq!(drained.len(), 1000);
    assert!(drained.windows(2).all(|w| (w[0].1, &w[0].0) < (w[1].1, &w[1].0)));
}

// ─── Model-based properties ───
//
// The reference model is a BTreeSet of (score, key) pairs: exactly the
// ordering contract the skip list promises, with none of the machinery.

#[derive(Debug, Clone)]
enum Op {
    Upsert(String, i64),
    Remove(String),
    PopScore(i64, i64, usize),
    PopRank(usize, usize),
}

fn arb_key() -> impl Strategy<Value = String> {
    // A deliberately small keyspace so updates and removals hit often.
    "[a-e]{1,2}".prop_map(String::from)
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (arb_key(), -50i64..50).prop_map(|(k, s)| Op::Upsert(k, s)),
        2 => arb_key().prop_map(Op::Remove),
        1 => (-60i64..60, -60i64..60, 0usize..8)
            .prop_map(|(a, b, limit)| Op::PopScore(a.min(b), a.max(b), limit)),
        1 => (0usize..10, 0usize..10)
            .prop_map(|(a, b)| Op::PopRank(a.min(b), a.max(b))),
    ]
}

#[derive(Default)]
struct Model {
    ordered: BTreeSet<(i64, String)>,
}

impl Model {
    fn upsert(&mut self, key: &str, score: i64) -> bool {
        let existing = self
            .ordered
            .iter()
            .find(|(_, k)| k == key)
            .cloned();
        match existing {
            Some(entry) => {
                self.ordered.remove(&entry);
                self.ordered.insert((score, key.to_string()));
                false
            }
            None => {
                self.ordered.insert((score, key.to_string()));
                true
            }
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        let existing = self.ordered.iter().find(|(_, k)| k == key).cloned();
        match existing {
            Some(entry) => {
                self.ordered.remove(&entry);
                true
            }
            None => false,
        }
    }

    fn pop_score(&mut self, min: i64, max: i64, limit: usize) -> Vec<(String, i64)> {
        let selected: Vec<(i64, String)> = self
            .ordered
            .iter()
            .filter(|(s, _)| *s >= min && *s <= max)
            .take(limit)
            .cloned()
            .collect();
        for entry in &selected {
            self.ordered.remove(entry);
        }
        selected.into_iter().map(|(s, k)| (k, s)).collect()
    }

    fn pop_rank(&mut self, start: usize, end: usize) -> Vec<(String, i64)> {
        let start = start.max(1);
        let end = end.min(self.ordered.len());
        if start > end {
            return Vec::new();
        }
        let selected: Vec<(i64, String)> = self
            .ordered
            .iter()
            .skip(start - 1)
            .take(end - start + 1)
            .cloned()
            .collect();
        for entry in &selected {
            self.ordered.remove(entry);
        }
        selected.into_iter().map(|(s, k)| (k, s)).collect()
    }
}

proptest! {
    /// The skip list agrees with the reference model on every operation's
    /// return value and on the full in-order contents after every step.
    #[test]
    fn matches_reference_model(ops in proptest::collection::vec(arb_op(), 1..120)) {
        let mut set = ScoredSet::new();
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Upsert(key, score) => {
                    let inserted = set.upsert(key.clone(), score);
                    prop_assert_eq!(inserted, model.upsert(&key, score));
                }
                Op::Remove(key) => {
                    prop_assert_eq!(set.remove(&key), model.remove(&key));
                }
                Op::PopScore(min, max, limit) => {
                    let got = set.pop_by_score_range(min, max, limit);
                    prop_assert_eq!(got, model.pop_score(min, max, limit));
                }
                Op::PopRank(start, end) => {
                    let got = set.pop_by_rank_range(start, end);
                    prop_assert_eq!(got, model.pop_rank(start, end));
                }
            }

            prop_assert_eq!(set.count(), model.ordered.len());
            let contents: Vec<(i64, String)> =
                set.iter().map(|(k, s)| (s, k.to_string())).collect();
            let expected: Vec<(i64, String)> = model.ordered.iter().cloned().collect();
            prop_assert_eq!(contents, expected);
        }
    }

    /// Popping the full score range drains the set in sorted order.
    #[test]
    fn full_score_range_drains_sorted(
        entries in proptest::collection::btree_map("[a-z]{1,6}", -1000i64..1000, 0..60)
    ) {
        let mut set = ScoredSet::new();
        for (key, score) in &entries {
            set.upsert(key.clone(), *score);
        }

        let popped = set.pop_by_score_range(i64::MIN, i64::MAX, usize::MAX);
        prop_assert!(set.is_empty());
        prop_assert_eq!(popped.len(), entries.len());
        prop_assert!(
            popped
                .windows(2)
                .all(|w| (w[0].1, &w[0].0) < (w[1].1, &w[1].0))
        );
    }

    /// Rank and score pops agree when both select the whole set.
    #[test]
    fn rank_drain_equals_score_drain(
        entries in proptest::collection::btree_map("[a-z]{1,4}", -100i64..100, 1..40)
    ) {
        let mut by_score = ScoredSet::new();
        let mut by_rank = ScoredSet::new();
        for (key, score) in &entries {
            by_score.upsert(key.clone(), *score);
            by_rank.upsert(key.clone(), *score);
        }

        let scored = by_score.pop_by_score_range(i64::MIN, i64::MAX, entries.len());
        let ranked = by_rank.pop_by_rank_range(1, entries.len());
        prop_assert_eq!(scored, ranked);
    }
}
