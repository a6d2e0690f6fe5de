//! The relation solver at the heart of the lookahead computation.
//!
//! Given a finite relation `R` over the keys of `result` and an initial
//! assignment `F1` (the map's contents on entry), computes the least fixed
//! point of
//!
//! ```text
//! F2(x) = F1(x) ∪ ⋃ { F2(y) | x R y }
//! ```
//!
//! in place, following DeRemer and Pennello's digraph algorithm: a
//! depth-first traversal with Tarjan-style low-link marking so that every
//! member of a strongly connected component ends up with the component
//! root's final set. The traversal keeps its own frame stack instead of
//! recursing; `includes` chains on pathological grammars grow deep enough
//! to exhaust the host call stack otherwise.
//!
//! The two lookahead passes differ only in which relation and seed they
//! supply, never in traversal logic.

use crate::types::Map;
use indexmap::map::Slice;
use std::{cmp, hash::Hash};

pub trait Set {
    fn union_with(&mut self, other: &Self);
}

impl<T> Set for crate::types::Set<T>
where
    T: Clone + Eq + Hash,
{
    fn union_with(&mut self, other: &Self) {
        self.extend(other.iter().cloned())
    }
}

impl Set for crate::grammar::SymbolSet {
    fn union_with(&mut self, other: &Self) {
        self.union_with(other)
    }
}

pub fn digraph<K, T>(result: &mut Map<K, T>, relation: impl Fn(&K, &K) -> bool)
where
    K: Clone + Eq + Hash,
    T: Set,
{
    let keys: Vec<_> = result.keys().cloned().collect();
    Digraph {
        result: result.as_mut_slice(),
        relation,
        keys: &keys[..],
        n: vec![0usize; keys.len()],
        scc: vec![],
        frames: vec![],
    }
    .run()
}

struct Frame {
    x: usize,
    /// `|scc|` at the time `x` was pushed; `x` roots its component iff
    /// `n[x]` still equals this after all successors are done.
    depth: usize,
    /// Next successor candidate to examine.
    next: usize,
}

struct Digraph<'a, K, T, F> {
    result: &'a mut Slice<K, T>,
    relation: F,
    keys: &'a [K],
    n: Vec<usize>,
    scc: Vec<usize>,
    frames: Vec<Frame>,
}

impl<K, T, F> Digraph<'_, K, T, F>
where
    K: Eq + Hash,
    T: Set,
    F: Fn(&K, &K) -> bool,
{
    fn run(&mut self) {
        for x in 0..self.keys.len() {
            if self.n[x] == 0 {
                self.traverse(x);
            }
        }
    }

    fn traverse(&mut self, root: usize) {
        self.enter(root);

        'next_frame: while let Some(top) = self.frames.len().checked_sub(1) {
            let x = self.frames[top].x;

            while self.frames[top].next < self.keys.len() {
                let y = self.frames[top].next;
                self.frames[top].next += 1;
                if !(self.relation)(&self.keys[x], &self.keys[y]) {
                    continue;
                }

                if self.n[y] == 0 {
                    // Descend; x picks up F2(y) when y's frame completes.
                    self.enter(y);
                    continue 'next_frame;
                }

                self.n[x] = cmp::min(self.n[x], self.n[y]);
                if x != y {
                    // F(x) <- F(x) ∪ F(y)
                    let (slot, added) = get_two_mut(self.result, x, y);
                    slot.union_with(added);
                }
            }

            // All successors of x visited.
            let depth = self.frames[top].depth;
            self.frames.pop();

            if self.n[x] == depth {
                // x roots its component: everything above it on the SCC
                // stack shares x's final set.
                while let Some(s) = self.scc.pop() {
                    self.n[s] = usize::MAX;
                    if s == x {
                        break;
                    }
                    // F(s) <- F(x)
                    let (slot, added) = get_two_mut(self.result, s, x);
                    slot.union_with(added);
                }
            }

            if let Some(parent) = self.frames.last() {
                let p = parent.x;
                self.n[p] = cmp::min(self.n[p], self.n[x]);
                if p != x {
                    let (slot, added) = get_two_mut(self.result, p, x);
                    slot.union_with(added);
                }
            }
        }
    }

    fn enter(&mut self, x: usize) {
        self.scc.push(x);
        let depth = self.scc.len();
        self.n[x] = depth;
        self.frames.push(Frame { x, depth, next: 0 });
    }
}

fn get_two_mut<K, V>(slice: &mut Slice<K, V>, x: usize, y: usize) -> (&mut V, &mut V) {
    assert!(
        x != y && cmp::max(x, y) < slice.len(),
        "index condition not satisfied"
    );
    let i = (x + y) / 2 + 1;
    let (a, b) = slice.split_at_mut(i);
    if x < y {
        (&mut a[x], &mut b[y - i])
    } else {
        (&mut b[x - i], &mut a[y])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Set as IndexedSet;

    type Graph = Vec<Vec<bool>>;

    fn solve(n: usize, edges: &[(usize, usize)], seeds: &[(usize, u32)]) -> Vec<Vec<u32>> {
        let mut adjacency: Graph = vec![vec![false; n]; n];
        for &(from, to) in edges {
            adjacency[from][to] = true;
        }

        let mut result: Map<usize, IndexedSet<u32>> = Map::default();
        for x in 0..n {
            result.insert(x, IndexedSet::default());
        }
        for &(x, value) in seeds {
            result[&x].insert(value);
        }

        digraph(&mut result, |x, y| adjacency[*x][*y]);

        (0..n)
            .map(|x| {
                let mut values: Vec<_> = result[&x].iter().copied().collect();
                values.sort_unstable();
                values
            })
            .collect()
    }

    /// The reference solver: keep unioning along edges until settled.
    fn solve_naive(n: usize, edges: &[(usize, usize)], seeds: &[(usize, u32)]) -> Vec<Vec<u32>> {
        let mut sets: Vec<std::collections::BTreeSet<u32>> = vec![Default::default(); n];
        for &(x, value) in seeds {
            sets[x].insert(value);
        }
        loop {
            let mut changed = false;
            for &(from, to) in edges {
                let added: Vec<_> = sets[to].iter().copied().collect();
                for value in added {
                    changed |= sets[from].insert(value);
                }
            }
            if !changed {
                break;
            }
        }
        sets.into_iter()
            .map(|s| s.into_iter().collect())
            .collect()
    }

    #[test]
    fn test_get_two_mut() {
        let mut map = Map::default();
        map.insert("a", "a");
        map.insert("b", "b");
        map.insert("c", "c");
        map.insert("d", "d");
        let slice = map.as_mut_slice();
        assert!(matches!(get_two_mut(slice, 0, 1), t if *t.0=="a" && *t.1=="b"));
        assert!(matches!(get_two_mut(slice, 1, 0), t if *t.0=="b" && *t.1=="a"));
        assert!(matches!(get_two_mut(slice, 0, 2), t if *t.0=="a" && *t.1=="c"));
        assert!(matches!(get_two_mut(slice, 2, 1), t if *t.0=="c" && *t.1=="b"));
        assert!(matches!(get_two_mut(slice, 3, 2), t if *t.0=="d" && *t.1=="c"));
    }

    #[test]
    fn pure_cycle_shares_one_set() {
        // a→b→c→a with F1(a)={X}: every member converges to {X}.
        let solved = solve(3, &[(0, 1), (1, 2), (2, 0)], &[(0, 7)]);
        assert_eq!(solved, vec![vec![7], vec![7], vec![7]]);
    }

    #[test]
    fn chain_propagates_backwards() {
        // a→b→c with the seed at the sink.
        let solved = solve(3, &[(0, 1), (1, 2)], &[(2, 3), (1, 2)]);
        assert_eq!(solved, vec![vec![2, 3], vec![2, 3], vec![3]]);
    }

    #[test]
    fn self_loop_is_inert() {
        let solved = solve(2, &[(0, 0), (0, 1)], &[(0, 1), (1, 2)]);
        assert_eq!(solved, vec![vec![1, 2], vec![2]]);
    }

    #[test]
    fn long_chain_does_not_recurse() {
        // A dependency path long enough to make recursion uncomfortable;
        // the explicit frame stack keeps this flat.
        let n = 2000;
        let edges: Vec<_> = (0..n - 1).map(|x| (x, x + 1)).collect();
        let solved = solve(n, &edges, &[(n - 1, 42)]);
        assert!(solved.iter().all(|set| set == &[42]));
    }

    #[test]
    fn random_graphs_match_naive_fixed_point() {
        let mut seed = 0x9e3779b97f4a7c15u64;
        let mut next = move || {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };

        for round in 0..40 {
            let n = 2 + next() % 49;
            let mut edges = vec![];
            for from in 0..n {
                for to in 0..n {
                    // Denser graphs on later rounds; self-loops included.
                    if next() % 100 < 5 + round {
                        edges.push((from, to));
                    }
                }
            }
            let mut seeds = vec![];
            for x in 0..n {
                if next() % 3 == 0 {
                    seeds.push((x, (next() % 8) as u32));
                }
            }

            assert_eq!(
                solve(n, &edges, &seeds),
                solve_naive(n, &edges, &seeds),
                "divergence on round {} (n = {})",
                round,
                n,
            );
        }
    }
}
