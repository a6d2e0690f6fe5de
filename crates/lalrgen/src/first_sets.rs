//! Calculation of First and Follow set functions.
//!
//! Both are monotone fixed points over a finite symbol universe, so the
//! plain "loop until a full pass changes nothing" strategy terminates. The
//! empty-sequence sentinel is not stored inside the sets; it is the
//! grammar's nullable membership.
//!
//! The Follow sets computed here are the LR(0) notion only. The lookahead
//! sets that drive LALR reduce decisions come from the digraph passes in
//! [`crate::lalr::lookahead`]; conflating the two is the classic mistake,
//! so the LR(0) Follow sets are consumed exclusively by the `-L` table mode.

use crate::{
    grammar::{Grammar, SymbolID, SymbolSet},
    types::Map,
};

#[derive(Debug)]
pub struct FirstSets {
    map: Map<SymbolID, SymbolSet>,
}

impl FirstSets {
    pub fn new(g: &Grammar) -> Self {
        let mut map: Map<SymbolID, SymbolSet> = Map::default();

        // Rule 1: First(t) = {t} for every terminal.
        for t in g.terminals() {
            map.insert(t, Some(t).into_iter().collect());
        }
        // Rule 2 is the nullable membership of actions-only left-hand
        // sides; their First sets start empty like any nonterminal's.
        for n in g.nonterminals() {
            map.insert(n, SymbolSet::default());
        }
        map.insert(SymbolID::START, SymbolSet::default());

        // Rule 3: First(A) ⊇ First(Xi) while X1..Xi-1 are all nullable.
        loop {
            let mut changed = false;
            for (_, p) in g.productions() {
                for &x in p.right() {
                    let added = map[&x].clone();
                    let first = &mut map[&p.left()];
                    let before = first.len();
                    first.union_with(&added);
                    changed |= first.len() != before;
                    if !g.nullable(x) {
                        break;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        Self { map }
    }

    pub fn first(&self, id: SymbolID) -> &SymbolSet {
        &self.map[&id]
    }

    /// `First(seq)`, honoring nullable prefixes.
    pub fn first_of(&self, g: &Grammar, seq: &[SymbolID]) -> SymbolSet {
        let mut result = SymbolSet::default();
        for &x in seq {
            result.union_with(&self.map[&x]);
            if !g.nullable(x) {
                break;
            }
        }
        result
    }

    pub fn is_nullable_seq(&self, g: &Grammar, seq: &[SymbolID]) -> bool {
        seq.iter().all(|&x| g.nullable(x))
    }
}

#[derive(Debug)]
pub struct FollowSets {
    map: Map<SymbolID, SymbolSet>,
}

impl FollowSets {
    pub fn new(g: &Grammar, first: &FirstSets) -> Self {
        let mut map: Map<SymbolID, SymbolSet> = Map::default();
        for n in g.nonterminals() {
            map.insert(n, SymbolSet::default());
        }
        let mut start_follow = SymbolSet::default();
        start_follow.insert(SymbolID::EOI);
        map.insert(SymbolID::START, start_follow);

        loop {
            let mut changed = false;
            for (_, p) in g.productions() {
                // Walk the right-hand side back to front, carrying First of
                // the remainder and whether it can still derive ε.
                let mut tail_first = SymbolSet::default();
                let mut tail_nullable = true;
                for &x in p.right().iter().rev() {
                    if g.is_nonterminal(x) {
                        let follow = &mut map[&x];
                        let before = follow.len();
                        follow.union_with(&tail_first);
                        changed |= follow.len() != before;
                        if tail_nullable {
                            let added = map[&p.left()].clone();
                            let follow = &mut map[&x];
                            let before = follow.len();
                            follow.union_with(&added);
                            changed |= follow.len() != before;
                        }
                    }
                    if g.nullable(x) {
                        tail_first.union_with(first.first(x));
                    } else {
                        tail_first = first.first(x).clone();
                        tail_nullable = false;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        Self { map }
    }

    pub fn follow(&self, id: SymbolID) -> &SymbolSet {
        &self.map[&id]
    }
}
