//! Pairwise rewriting of operand lists and memoisation of constructor results.
//!
//! Every associative operation (operator products, circuit series and
//! concatenation) is normalised the same way: its flattened operand list is
//! swept from left to right, and each adjacent pair is offered to an ordered
//! list of [`BinaryRule`]s. The first rule that fires replaces the pair. The
//! replacement is spliced back into the list if it is an instance of the same
//! operation, dropped if it is the neutral element, and the sweep backs up by
//! one position so that the new neighbours get a chance to combine.
//!
//! A sweep cut short by the step limit marks the current thread; [`memoize`]
//! does not store results computed while that mark was set.

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::hash::Hash;
use std::thread::LocalKey;

use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::config;

thread_local! {
    static TRUNCATED: Cell<bool> = const { Cell::new(false) };
}

/// A named rewrite rule for two adjacent operands.
///
/// `apply` returns `Ok(None)` when the rule does not match.
pub struct BinaryRule<T: 'static, E: 'static = Infallible> {
    /// Name used in trace output.
    pub name: &'static str,
    /// The rule body.
    pub apply: fn(&T, &T) -> Result<Option<T>, E>,
}

/// An ordered set of binary rules for one associative operation.
pub struct RuleSet<T: 'static, E: 'static = Infallible> {
    name: &'static str,
    rules: &'static [BinaryRule<T, E>],
    splice: fn(T) -> Vec<T>,
    is_neutral: fn(&T) -> bool,
}

impl<T, E> RuleSet<T, E> {
    /// Create a rule set.
    ///
    /// `splice` turns a replacement into the operands it contributes (an
    /// instance of the operation itself contributes its operands),
    /// `is_neutral` identifies replacements that are dropped.
    pub const fn new(
        name: &'static str,
        rules: &'static [BinaryRule<T, E>],
        splice: fn(T) -> Vec<T>,
        is_neutral: fn(&T) -> bool,
    ) -> Self {
        Self {
            name,
            rules,
            splice,
            is_neutral,
        }
    }

    /// Name of the operation this set rewrites.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Names of the rules, in the order they are tried.
    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.name)
    }

    /// Rewrite `operands` until no rule matches any adjacent pair.
    ///
    /// The sweep stops early once the configured step limit is reached; the
    /// partially rewritten list is still a valid representation, but it is
    /// never memoised.
    pub fn apply(&self, operands: Vec<T>) -> Result<Vec<T>, E> {
        let limit = config::current().max_rewrite_steps;
        let mut ops = operands;
        let mut steps = 0usize;
        let mut j = 0usize;

        while j + 1 < ops.len() {
            let Some((rule, replacement)) = self.first_match(&ops[j], &ops[j + 1])? else {
                j += 1;
                continue;
            };
            trace!(operation = self.name, rule, position = j, "rewrite");

            let replacement: Vec<T> = (self.splice)(replacement)
                .into_iter()
                .filter(|op| !(self.is_neutral)(op))
                .collect();
            ops.splice(j..j + 2, replacement);

            steps += 1;
            if steps >= limit {
                warn!(
                    operation = self.name,
                    steps, "rewrite step limit reached, result may not be canonical"
                );
                TRUNCATED.with(|t| t.set(true));
                break;
            }
            j = j.saturating_sub(1);
        }

        Ok(ops)
    }

    fn first_match(&self, lhs: &T, rhs: &T) -> Result<Option<(&'static str, T)>, E> {
        for rule in self.rules {
            if let Some(replacement) = (rule.apply)(lhs, rhs)? {
                return Ok(Some((rule.name, replacement)));
            }
        }
        Ok(None)
    }
}

/// A bounded memo table for constructor results.
#[derive(Debug)]
pub struct Memo<K, V> {
    entries: FxHashMap<K, V>,
    hits: u64,
    misses: u64,
}

impl<K: Eq + Hash, V> Memo<K, V> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            hits: 0,
            misses: 0,
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since the table was created or last cleared.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Drop all entries and reset the statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    fn lookup(&mut self, key: &K) -> Option<&V> {
        let found = self.entries.get(key);
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    fn insert(&mut self, key: K, value: V, capacity: usize) {
        if self.entries.len() >= capacity {
            self.entries.clear();
        }
        self.entries.insert(key, value);
    }
}

impl<K: Eq + Hash, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Look `key` up in a thread-local memo table, computing and storing the
/// value on a miss.
///
/// The table is not borrowed while `compute` runs, so constructors may
/// recurse into themselves. Values whose computation hit the rewrite step
/// limit are returned but not stored.
pub fn memoize<K, V, E>(
    table: &'static LocalKey<RefCell<Memo<K, V>>>,
    key: K,
    compute: impl FnOnce(K) -> Result<V, E>,
) -> Result<V, E>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    let config = config::current();
    if !config.use_cache {
        return compute(key);
    }
    if let Some(hit) = table.with(|t| t.borrow_mut().lookup(&key).cloned()) {
        return Ok(hit);
    }
    let outer = TRUNCATED.with(|t| t.replace(false));
    let value = compute(key.clone());
    let truncated = TRUNCATED.with(|t| {
        let hit = t.get();
        t.set(outer || hit);
        hit
    });
    let value = value?;
    if !truncated {
        table.with(|t| {
            t.borrow_mut()
                .insert(key, value.clone(), config.cache_capacity);
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlgebraConfig, with_config};

    // Toy algebra: adjacent equal numbers merge into their sum, opposite
    // numbers cancel to the neutral zero.
    fn merge_equal(a: &i64, b: &i64) -> Result<Option<i64>, Infallible> {
        Ok((a == b).then_some(a + b))
    }

    fn cancel(a: &i64, b: &i64) -> Result<Option<i64>, Infallible> {
        Ok((*a == -*b).then_some(0))
    }

    fn reject_seven(a: &i64, _b: &i64) -> Result<Option<i64>, String> {
        if *a == 7 {
            Err("seven".into())
        } else {
            Ok(None)
        }
    }

    static MERGE: RuleSet<i64> = RuleSet::new(
        "merge",
        &[
            BinaryRule {
                name: "merge_equal",
                apply: merge_equal,
            },
            BinaryRule {
                name: "cancel",
                apply: cancel,
            },
        ],
        |x| vec![x],
        |x| *x == 0,
    );

    static FALLIBLE: RuleSet<i64, String> = RuleSet::new(
        "fallible",
        &[BinaryRule {
            name: "reject_seven",
            apply: reject_seven,
        }],
        |x| vec![x],
        |_| false,
    );

    #[test]
    fn test_backtracking_sweep() {
        // 1 1 2 -> 2 2 -> 4
        let Ok(ops) = MERGE.apply(vec![1, 1, 2]);
        assert_eq!(ops, vec![4]);
    }

    #[test]
    fn test_neutral_dropped() {
        let Ok(ops) = MERGE.apply(vec![3, 5, -5, 3]);
        assert_eq!(ops, vec![6]);
    }

    #[test]
    fn test_rule_names() {
        let names: Vec<_> = MERGE.rule_names().collect();
        assert_eq!(names, vec!["merge_equal", "cancel"]);
        assert_eq!(MERGE.name(), "merge");
    }

    #[test]
    fn test_error_propagates() {
        assert_eq!(FALLIBLE.apply(vec![1, 7, 2]), Err("seven".to_string()));
        assert_eq!(FALLIBLE.apply(vec![1, 2, 7]), Ok(vec![1, 2, 7]));
    }

    #[test]
    fn test_step_limit() {
        let config = AlgebraConfig::new().with_max_rewrite_steps(1);
        let Ok(ops) = with_config(config, || MERGE.apply(vec![1, 1, 2]));
        assert_eq!(ops, vec![2, 2]);
    }

    thread_local! {
        static SQUARES: RefCell<Memo<u64, u64>> = RefCell::new(Memo::new());
    }

    #[test]
    fn test_memoize() {
        let mut calls = 0;
        let mut square = |k: u64| {
            memoize::<_, _, Infallible>(&SQUARES, k, |k| {
                calls += 1;
                Ok(k * k)
            })
        };
        assert_eq!(square(3), Ok(9));
        assert_eq!(square(3), Ok(9));
        assert_eq!(calls, 1);
        assert_eq!(SQUARES.with(|t| t.borrow().stats()), (1, 1));
    }

    thread_local! {
        static MERGED: RefCell<Memo<Vec<i64>, Vec<i64>>> = RefCell::new(Memo::new());
    }

    fn merged(ops: Vec<i64>) -> Vec<i64> {
        let Ok(ops) = memoize(&MERGED, ops, |ops| MERGE.apply(ops));
        ops
    }

    #[test]
    fn test_truncated_sweep_not_memoized() {
        let limited = AlgebraConfig::new().with_max_rewrite_steps(1);
        assert_eq!(with_config(limited, || merged(vec![1, 1, 2])), vec![2, 2]);
        assert!(MERGED.with(|t| t.borrow().is_empty()));
        assert_eq!(merged(vec![1, 1, 2]), vec![4]);
        assert_eq!(MERGED.with(|t| t.borrow().len()), 1);
        assert_eq!(merged(vec![1, 1, 2]), vec![4]);
        assert_eq!(MERGED.with(|t| t.borrow().stats()), (1, 2));
    }

    #[test]
    fn test_memo_capacity() {
        let mut memo = Memo::new();
        memo.insert(1, 1, 2);
        memo.insert(2, 2, 2);
        memo.insert(3, 3, 2);
        assert_eq!(memo.len(), 1);
        memo.clear();
        assert!(memo.is_empty());
    }
}
