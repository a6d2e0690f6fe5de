//! Parse-table construction: state reduction, conflict resolution, and
//! per-symbol metadata.

use super::{
    lookahead::{Lookaheads, Reduce},
    lr0::{LR0Automaton, LR0State, StateID},
};
use crate::{
    diag::{self, Abort, Reporter},
    first_sets::FollowSets,
    grammar::{Assoc, Grammar, Precedence, ProductionID, SymbolID, SymbolKind, SymbolSet},
    types::Map,
    util::display_fn,
};
use std::{cmp::Ordering, fmt};

/// Where the look-ahead of a reduction comes from: the digraph passes, or
/// the LR(0) Follow sets when the `-L` mode skipped them.
#[derive(Debug)]
pub enum ReduceLookaheads<'a> {
    Lalr(&'a Lookaheads),
    Slr(&'a FollowSets),
}

impl ReduceLookaheads<'_> {
    fn get(&self, g: &Grammar, state: StateID, production: ProductionID) -> SymbolSet {
        match self {
            Self::Lalr(la) => la
                .lookaheads
                .get(&Reduce { state, production })
                .cloned()
                .unwrap_or_default(),
            Self::Slr(follow) => follow.follow(g.production(production).left()).clone(),
        }
    }
}

/// The action the parser performs in a state on a look-ahead symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Shift(StateID),
    Reduce(ProductionID),
    Accept,
    /// An explicit error entry produced by a nonassoc conflict resolution.
    Fail,
}

#[derive(Debug)]
pub struct ParseTableRow {
    pub actions: Map<SymbolID, Action>,
    pub gotos: Map<SymbolID, StateID>,
}

/// Which flat table a symbol indexes into.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TableRef {
    Action { index: u16 },
    Goto { index: u16 },
}

/// Per-symbol parsing metadata. Node symbols resolve their table reference
/// through `base`, never by copying.
#[derive(Debug)]
pub struct SymbolEntry {
    pub symbol: SymbolID,
    pub base: SymbolID,
    pub table: TableRef,
}

#[derive(Debug)]
pub struct ParseTable {
    pub states: Map<StateID, ParseTableRow>,
    pub symbols: Map<SymbolID, SymbolEntry>,
    pub start_state: StateID,
}

impl ParseTable {
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for (i, (id, row)) in self.states.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                writeln!(f, "#### State {:?}", id)?;
                writeln!(f, "## actions")?;
                for (token, action) in &row.actions {
                    let token = g.symbol(*token);
                    match action {
                        Action::Shift(n) => writeln!(f, "- {} => shift({:?})", token, n)?,
                        Action::Reduce(p) => {
                            writeln!(f, "- {} => reduce({})", token, g.production(*p).display(g))?
                        }
                        Action::Accept => writeln!(f, "- {} => accept", token)?,
                        Action::Fail => writeln!(f, "- {} => fail", token)?,
                    }
                }
                if !row.gotos.is_empty() {
                    writeln!(f, "## gotos")?;
                    for (symbol, goto) in &row.gotos {
                        writeln!(f, "- {} => goto({:?})", g.symbol(*symbol), goto)?;
                    }
                }
            }
            Ok(())
        })
    }
}

/// Merge states whose outgoing behavior is indistinguishable: identical
/// shift rows, goto rows, reduce sets and per-reduce look-ahead sets. The
/// lowest state number survives; every transition destination is rewritten
/// in place and the merged state stays in the table behind a forward
/// reference, keeping transition numbering stable. Returns the number of
/// states merged away.
pub fn reduce_states(
    g: &Grammar,
    automaton: &mut LR0Automaton,
    lookaheads: &ReduceLookaheads<'_>,
) -> usize {
    struct RowSig {
        shifts: Vec<(SymbolID, StateID)>,
        gotos: Vec<(SymbolID, StateID)>,
        reduces: Vec<(ProductionID, Vec<SymbolID>)>,
    }

    fn signature(
        g: &Grammar,
        id: StateID,
        state: &LR0State,
        lookaheads: &ReduceLookaheads<'_>,
    ) -> RowSig {
        let mut shifts: Vec<_> = state.shifts.iter().map(|(&s, &to)| (s, to)).collect();
        shifts.sort_unstable();
        let mut gotos: Vec<_> = state.gotos.iter().map(|(&s, &to)| (s, to)).collect();
        gotos.sort_unstable();
        let mut reduces: Vec<_> = state
            .reduces
            .iter()
            .map(|&p| {
                let la = lookaheads.get(g, id, p);
                (p, la.iter().collect::<Vec<_>>())
            })
            .collect();
        reduces.sort_unstable();
        RowSig {
            shifts,
            gotos,
            reduces,
        }
    }

    let mut merged_total = 0;
    loop {
        let mut representatives: Vec<(RowSig, StateID)> = Vec::new();
        let mut redirects: Map<StateID, StateID> = Map::default();
        for (id, state) in automaton.live_states() {
            let sig = signature(g, id, state, lookaheads);
            match representatives.iter().find(|(existing, _)| {
                existing.shifts == sig.shifts
                    && existing.gotos == sig.gotos
                    && existing.reduces == sig.reduces
            }) {
                Some(&(_, survivor)) => {
                    redirects.insert(id, survivor);
                }
                None => representatives.push((sig, id)),
            }
        }

        if redirects.is_empty() {
            break;
        }
        merged_total += redirects.len();

        for state in automaton.states.values_mut() {
            for to in state.shifts.values_mut().chain(state.gotos.values_mut()) {
                if let Some(&survivor) = redirects.get(to) {
                    *to = survivor;
                }
            }
        }
        if let Some(&survivor) = redirects.get(&automaton.accept_state) {
            automaton.accept_state = survivor;
        }
        for (&id, &survivor) in &redirects {
            automaton.states[&id].merged_into = Some(survivor);
        }
    }

    if merged_total > 0 {
        tracing::debug!(merged = merged_total, "reduced equivalent states");
    }
    merged_total
}

/// Build the action/goto table from the reduced automaton and look-ahead
/// sets, resolving conflicts by precedence where declared.
pub fn generate(
    g: &Grammar,
    automaton: &LR0Automaton,
    lookaheads: &ReduceLookaheads<'_>,
    reporter: &mut Reporter,
) -> Result<ParseTable, Abort> {
    let mut states = Map::default();
    for (id, lr0_state) in automaton.live_states() {
        #[derive(Default)]
        struct PendingAction {
            shift: Option<StateID>,
            accept: bool,
            reduces: Vec<ProductionID>,
        }
        let mut pending = Map::<SymbolID, PendingAction>::default();
        for (&t, &next) in &lr0_state.shifts {
            let action = pending.entry(t).or_default();
            if t == SymbolID::EOI {
                action.accept = true;
            } else {
                action.shift.replace(next);
            }
        }
        for &reduce in &lr0_state.reduces {
            if reduce != ProductionID::ACCEPT {
                for t in lookaheads.get(g, id, reduce).iter() {
                    pending.entry(t).or_default().reduces.push(reduce);
                }
            }
        }

        let mut actions = Map::<SymbolID, Action>::default();
        for (symbol, action) in pending {
            let resolved = resolve_conflict(
                g,
                id,
                symbol,
                action.shift,
                action.accept,
                &action.reduces,
                reporter,
            )?;
            actions.insert(symbol, resolved);
        }

        let gotos = lr0_state
            .gotos
            .iter()
            .map(|(&n, &next)| (n, next))
            .collect();

        states.insert(id, ParseTableRow { actions, gotos });
    }

    Ok(ParseTable {
        states,
        symbols: symbol_entries(g),
        start_state: StateID::INITIAL,
    })
}

/// One descriptor per grammar symbol: terminals index the action columns,
/// nonterminals and markers the goto columns, and node symbols delegate
/// through their base chain.
fn symbol_entries(g: &Grammar) -> Map<SymbolID, SymbolEntry> {
    let mut entries = Map::default();
    let mut action_columns = 0u16;
    let mut goto_columns = 0u16;
    for (id, symbol) in g.symbols() {
        let table = match symbol.kind() {
            SymbolKind::Terminal => {
                let index = action_columns;
                action_columns += 1;
                TableRef::Action { index }
            }
            SymbolKind::Nonterminal | SymbolKind::Marker => {
                let index = goto_columns;
                goto_columns += 1;
                TableRef::Goto { index }
            }
            SymbolKind::Node { .. } | SymbolKind::Unknown => continue,
        };
        entries.insert(
            id,
            SymbolEntry {
                symbol: id,
                base: id,
                table,
            },
        );
    }

    // Node symbols delegate to the entry at the end of their base chain.
    for (id, symbol) in g.symbols() {
        if let SymbolKind::Node { base } = symbol.kind() {
            let mut target = base;
            while let SymbolKind::Node { base } = g.symbol(target).kind() {
                target = base;
            }
            let table = entries[&target].table;
            entries.insert(
                id,
                SymbolEntry {
                    symbol: id,
                    base: target,
                    table,
                },
            );
        }
    }

    entries
}

#[allow(clippy::too_many_arguments)]
fn resolve_conflict(
    g: &Grammar,
    state: StateID,
    symbol: SymbolID,
    shift: Option<StateID>,
    accept: bool,
    reduces: &[ProductionID],
    reporter: &mut Reporter,
) -> Result<Action, Abort> {
    if accept {
        if !reduces.is_empty() {
            reporter.error(
                diag::E_ACCEPT_CONFLICT,
                None,
                format!(
                    "reduce/accept conflict in {:?} on {}",
                    state,
                    g.symbol(symbol)
                ),
            )?;
        }
        return Ok(Action::Accept);
    }

    // A reduce/reduce conflict is reported once per table cell, naming
    // every claimant; the earliest production wins so keep-going still
    // produces a usable table.
    let winner = match reduces {
        [] => None,
        [single] => Some(*single),
        _ => {
            let claims = reduces
                .iter()
                .map(|&p| g.production(p).display(g).to_string())
                .collect::<Vec<_>>()
                .join(" and ");
            reporter.error(
                diag::E_REDUCE_REDUCE,
                None,
                format!(
                    "reduce/reduce conflict in {:?} on {} between {}",
                    state,
                    g.symbol(symbol),
                    claims
                ),
            )?;
            reduces.iter().copied().min()
        }
    };

    match (shift, winner) {
        (Some(next), None) => Ok(Action::Shift(next)),
        (None, Some(reduce)) => Ok(Action::Reduce(reduce)),
        (None, None) => unreachable!("empty action cell"),

        (Some(next), Some(reduce)) => {
            let shift_prec = g.symbol(symbol).precedence();
            let reduce_prec = g.production(reduce).precedence(g);

            match compare_precs(shift_prec, reduce_prec) {
                Some(PrecChoice::Shift) => Ok(Action::Shift(next)),
                Some(PrecChoice::Reduce) => Ok(Action::Reduce(reduce)),
                Some(PrecChoice::Neither) => Ok(Action::Fail),
                None => {
                    // No declared precedence on one of the sides: the
                    // classic default favors the shift.
                    reporter.warning(
                        diag::W_DEFAULT_SHIFT,
                        None,
                        format!(
                            "shift/reduce conflict in {:?} on {} resolved as shift over {}",
                            state,
                            g.symbol(symbol),
                            g.production(reduce).display(g)
                        ),
                    );
                    Ok(Action::Shift(next))
                }
            }
        }
    }
}

#[derive(Copy, Clone)]
enum PrecChoice {
    Shift,
    Reduce,
    Neither,
}

fn compare_precs(
    shift_prec: Option<Precedence>,
    reduce_prec: Option<Precedence>,
) -> Option<PrecChoice> {
    match (shift_prec, reduce_prec) {
        (Some(p1), Some(p2)) => match Ord::cmp(&p1.priority, &p2.priority) {
            Ordering::Greater => Some(PrecChoice::Shift),
            Ordering::Less => Some(PrecChoice::Reduce),
            Ordering::Equal => match p1.assoc {
                Assoc::Left => Some(PrecChoice::Reduce),
                Assoc::Right => Some(PrecChoice::Shift),
                Assoc::Nonassoc => Some(PrecChoice::Neither),
            },
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diag::{Policy, Reporter},
        first_sets::FirstSets,
        lalr::lr0::LR0State,
        types::Set,
    };

    fn state(
        shifts: &[(SymbolID, StateID)],
        gotos: &[(SymbolID, StateID)],
        reduces: &[ProductionID],
    ) -> LR0State {
        LR0State {
            kernels: Vec::new(),
            shifts: shifts.iter().copied().collect(),
            gotos: gotos.iter().copied().collect(),
            reduces: reduces.iter().copied().collect::<Set<_>>(),
            merged_into: None,
        }
    }

    /// Two states with identical rows collapse onto the lower number, their
    /// predecessors are rewritten in place, and the rewrite cascades until
    /// the automaton settles.
    #[test]
    fn reduce_states_rewrites_in_place() {
        let mut reporter = Reporter::new(Policy::default());
        let g = Grammar::define(&mut reporter, |def| {
            let t = def.terminal("T", None)?;
            let s = def.nonterminal("s")?;
            def.start_symbol(s);
            def.production(s, [t])?;
            Ok(())
        })
        .unwrap();
        let t = g.resolve("T").unwrap();
        let s = g.resolve("s").unwrap();
        let prod = g.productions_of(s).next().map(|(id, _)| id).unwrap();

        let ids: Vec<StateID> = (0..5).map(StateID::from_raw).collect();
        let mut states = Map::default();
        states.insert(ids[0], state(&[(t, ids[1])], &[], &[]));
        states.insert(ids[1], state(&[], &[(s, ids[3])], &[]));
        states.insert(ids[2], state(&[], &[(s, ids[3])], &[]));
        states.insert(ids[3], state(&[], &[], &[prod]));
        states.insert(ids[4], state(&[(t, ids[2])], &[], &[]));
        let mut automaton = LR0Automaton {
            states,
            accept_state: ids[3],
        };

        let first = FirstSets::new(&g);
        let follow = FollowSets::new(&g, &first);
        let merged = reduce_states(&g, &mut automaton, &ReduceLookaheads::Slr(&follow));

        // Round one folds S#002 into S#001; rewriting S#004's shift makes it
        // identical to S#000, so round two folds that pair as well.
        assert_eq!(merged, 2);
        assert_eq!(automaton.states[&ids[2]].merged_into, Some(ids[1]));
        assert_eq!(automaton.states[&ids[4]].merged_into, Some(ids[0]));
        assert_eq!(automaton.states[&ids[0]].shifts[&t], ids[1]);
        assert_eq!(automaton.live_states().count(), 3);
        assert_eq!(automaton.accept_state, ids[3]);
    }

    #[test]
    fn symbol_entries_delegate_node_chains() {
        let mut reporter = Reporter::new(Policy::default());
        let g = Grammar::define(&mut reporter, |def| {
            let num = def.terminal("NUM", None)?;
            let e = def.nonterminal("e")?;
            def.start_symbol(e);
            def.production(e, [num])?;
            def.node("Literal", e, None)?;
            Ok(())
        })
        .unwrap();

        let entries = symbol_entries(&g);
        let e = g.resolve("e").unwrap();
        let node = g.resolve("Literal").unwrap();
        assert_eq!(entries[&node].base, e);
        assert_eq!(entries[&node].table, entries[&e].table);
        assert!(matches!(entries[&e].table, TableRef::Goto { .. }));
        let num = g.resolve("NUM").unwrap();
        assert!(matches!(entries[&num].table, TableRef::Action { .. }));
    }
}
