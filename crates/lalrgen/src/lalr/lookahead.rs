//! LALR(1) look-ahead computation.
//!
//! Follows DeRemer and Pennello, "Efficient Computation of LALR(1)
//! Look-Ahead Sets" (1982): build the `reads` and `includes` relations over
//! the nonterminal transitions of the LR(0) automaton, then run the digraph
//! solver twice — once seeded with the direct-read sets to obtain `Read`,
//! once seeded with `Read` to obtain the LALR `Follow` — and assemble the
//! per-reduction look-ahead sets through the `lookback` relation.

use super::{
    digraph::digraph,
    lr0::{LR0Automaton, StateID},
};
use crate::{
    grammar::{Grammar, ProductionID, SymbolID, SymbolSet},
    types::{Map, Set},
};
use std::fmt;

/// A nonterminal transition of the automaton. Its position in the
/// insertion-ordered tables below is the stable transition number.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Goto {
    pub from: StateID,
    pub symbol: SymbolID,
}

impl fmt::Debug for Goto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?},{:?})", self.from, self.symbol)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Reduce {
    pub state: StateID,
    pub production: ProductionID,
}

impl fmt::Debug for Reduce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?},{:?})", self.state, self.production)
    }
}

#[derive(Debug)]
pub struct Lookaheads {
    /// Destination of every nonterminal transition.
    pub gotos: Map<Goto, StateID>,
    /// Pass A output: `Read(p,A)`.
    pub read_sets: Map<Goto, SymbolSet>,
    /// Pass B output: the LALR `Follow(p,A)`. Not the LR(0) Follow.
    pub follow_sets: Map<Goto, SymbolSet>,
    /// `LA(q, A->ω)` for every reduction.
    pub lookaheads: Map<Reduce, SymbolSet>,
}

/// Compute the look-ahead sets for the reductions in the provided automaton.
pub fn lookaheads(g: &Grammar, lr0: &LR0Automaton) -> Lookaheads {
    // The direct-read set of the transition (p,A) collects the terminals
    // visible immediately after it:
    //   DR(p,A) := { t | p --(A)--> r --(t)--> }
    let mut gotos = Map::default();
    let mut direct_reads = Map::default();
    for (from, state) in lr0.live_states() {
        for (&n, &to) in &state.gotos {
            let key = Goto { from, symbol: n };
            gotos.insert(key, to);
            direct_reads.insert(
                key,
                lr0.state(to).shifts.keys().copied().collect::<SymbolSet>(),
            );
        }
    }

    // - (p,A) `reads` (r,C)    <==> p --(A)--> r --(C)--> && C =>* ε
    // - (p,A) `includes` (p',B) <==> B -> βAγ, γ =>* ε, p' --(β)--> p
    // - (q, A->ω) `lookback` (p,A) <==> p --(ω)--> q
    let reads = calc_reads(g, lr0, &gotos);
    let includes = calc_includes(g, lr0, &gotos);
    let lookbacks = calc_lookbacks(g, lr0);

    // Pass A: Read(p,A) = DR(p,A) ∪ ⋃ { Read(r,C) | (p,A) reads (r,C) }
    let mut read_sets = direct_reads;
    digraph(&mut read_sets, |a, b| {
        reads.get(a).map_or(false, |s| s.contains(b))
    });

    // Pass B: Follow(p,A) = Read(p,A) ∪ ⋃ { Follow(p',B) | (p,A) includes (p',B) }
    let mut follow_sets = read_sets.clone();
    digraph(&mut follow_sets, |a, b| {
        includes.get(a).map_or(false, |s| s.contains(b))
    });

    // LA(q, A->ω) = ⋃ { Follow(p,A) | (q, A->ω) lookback (p,A) }
    let mut lookaheads = Map::<Reduce, SymbolSet>::default();
    for (state, lr0_state) in lr0.live_states() {
        for &production in &lr0_state.reduces {
            let reduce = Reduce { state, production };
            let entry = lookaheads.entry(reduce).or_default();
            if let Some(lookbacks) = lookbacks.get(&reduce) {
                for goto in lookbacks {
                    if let Some(follow) = follow_sets.get(goto) {
                        entry.union_with(follow);
                    }
                }
            }
        }
    }

    tracing::debug!(
        transitions = gotos.len(),
        reductions = lookaheads.len(),
        "lalr lookaheads computed"
    );

    Lookaheads {
        gotos,
        read_sets,
        follow_sets,
        lookaheads,
    }
}

fn calc_reads(g: &Grammar, lr0: &LR0Automaton, gotos: &Map<Goto, StateID>) -> Map<Goto, Set<Goto>> {
    let mut reads = Map::<Goto, Set<Goto>>::default();

    for (a_key, &r) in gotos {
        reads.entry(*a_key).or_default().extend(
            lr0.state(r)
                .gotos
                .keys()
                .filter(|&c| g.nullable(*c))
                .map(|&c| Goto { from: r, symbol: c }),
        );
    }

    reads
}

fn calc_includes(
    g: &Grammar,
    lr0: &LR0Automaton,
    gotos: &Map<Goto, StateID>,
) -> Map<Goto, Set<Goto>> {
    let mut includes = Map::<Goto, Set<Goto>>::default();

    // For every transition (p',B) and production B -> βAγ with γ nullable,
    // walking β from p' lands on the state p carrying the (p,A) transition
    // that includes (p',B). Walking visits every occurrence of every
    // nonterminal in the right-hand side.
    for b_key in gotos.keys() {
        for (_, p) in g.productions_of(b_key.symbol) {
            let mut current = b_key.from;
            for (i, &sym) in p.right().iter().enumerate() {
                if g.is_nonterminal(sym) {
                    let gamma_nullable =
                        p.right()[i + 1..].iter().all(|&s| g.nullable(s));
                    if gamma_nullable {
                        includes
                            .entry(Goto {
                                from: current,
                                symbol: sym,
                            })
                            .or_default()
                            .insert(*b_key);
                    }
                }
                let state = lr0.state(current);
                let next = if g.is_terminal(sym) {
                    state.shifts.get(&sym)
                } else {
                    state.gotos.get(&sym)
                };
                match next {
                    Some(&next) => current = next,
                    None => break,
                }
            }
        }
    }

    includes
}

fn calc_lookbacks(g: &Grammar, lr0: &LR0Automaton) -> Map<Reduce, Set<Goto>> {
    let mut lookbacks = Map::<Reduce, Set<Goto>>::default();

    for (from, _) in lr0.live_states() {
        for (p_id, p) in g.productions() {
            let mut current = from;
            let mut right = p.right();
            while let Some(&sym) = right.first() {
                let state = lr0.state(current);
                let next = if g.is_terminal(sym) {
                    state.shifts.get(&sym)
                } else {
                    state.gotos.get(&sym)
                };
                match next {
                    Some(&next) => {
                        current = next;
                        right = &right[1..];
                    }
                    None => break,
                }
            }
            if right.is_empty() {
                let reduce = Reduce {
                    state: current,
                    production: p_id,
                };
                lookbacks.entry(reduce).or_default().insert(Goto {
                    from,
                    symbol: p.left(),
                });
            }
        }
    }

    lookbacks
}
