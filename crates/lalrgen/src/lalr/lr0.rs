//! LR(0) automaton construction.

use crate::{
    diag::{self, Abort, Reporter},
    grammar::{Grammar, ProductionID, SymbolID},
    types::{Map, Set},
    util::display_fn,
};
use std::{collections::VecDeque, fmt};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateID(u16);

impl StateID {
    pub const INITIAL: Self = Self(0);

    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn into_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{:03}", self.0)
    }
}

/// The LR(0) item, a production paired with a dot position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LR0Item {
    pub production: ProductionID,
    pub index: u16,
}

impl LR0Item {
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            let production = g.production(self.production);
            write!(f, "{} -> [", g.symbol(production.left()))?;
            for (i, &r) in production.right().iter().enumerate() {
                if i == self.index as usize {
                    f.write_str(" .")?;
                }
                write!(f, " {}", g.symbol(r))?;
            }
            if production.right().len() == self.index as usize {
                f.write_str(" .")?;
            }
            f.write_str(" ]")
        })
    }
}

#[derive(Debug, Clone)]
pub struct LR0State {
    pub kernels: Vec<LR0Item>,
    /// Outgoing edges over terminals.
    pub shifts: Map<SymbolID, StateID>,
    /// Outgoing edges over nonterminals and markers.
    pub gotos: Map<SymbolID, StateID>,
    pub reduces: Set<ProductionID>,
    /// Set by the state-reduction pass; a merged state stays in the table
    /// so transition numbering is untouched, but it no longer owns a row.
    pub merged_into: Option<StateID>,
}

impl LR0State {
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            writeln!(f, "## kernels:")?;
            for kernel in &self.kernels {
                writeln!(f, "- {}", kernel.display(g))?;
            }
            if !self.shifts.is_empty() {
                writeln!(f, "## shifts:")?;
                for (t, to) in &self.shifts {
                    writeln!(f, "- {} => {:?}", g.symbol(*t), to)?;
                }
            }
            if !self.gotos.is_empty() {
                writeln!(f, "## gotos:")?;
                for (n, to) in &self.gotos {
                    writeln!(f, "- {} => {:?}", g.symbol(*n), to)?;
                }
            }
            if !self.reduces.is_empty() {
                writeln!(f, "## reduces:")?;
                for &reduce in &self.reduces {
                    writeln!(f, "- {}", g.production(reduce).display(g))?;
                }
            }
            if let Some(into) = self.merged_into {
                writeln!(f, "## merged into {:?}", into)?;
            }
            Ok(())
        })
    }
}

#[derive(Debug)]
pub struct LR0Automaton {
    pub states: Map<StateID, LR0State>,
    pub accept_state: StateID,
}

impl LR0Automaton {
    /// States that still own a table row, in numbering order.
    pub fn live_states(&self) -> impl Iterator<Item = (StateID, &LR0State)> + '_ {
        self.states
            .iter()
            .filter(|(_, state)| state.merged_into.is_none())
            .map(|(&id, state)| (id, state))
    }

    pub fn state(&self, id: StateID) -> &LR0State {
        &self.states[&id]
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for (i, (id, state)) in self.states.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                writeln!(f, "#### {:?}", id)?;
                write!(f, "{}", state.display(g))?;
            }
            Ok(())
        })
    }
}

/// Calculate the LR(0) automaton for the specified grammar.
///
/// States are identified by their kernel item sets; `goto` reuses an
/// existing state whenever the advanced kernel already exists. The accept
/// state is the one reached by shifting the start symbol and then `$eoi`.
pub fn lr0(g: &Grammar, reporter: &mut Reporter) -> Result<LR0Automaton, Abort> {
    let nonkernels = nonkernels(g);

    let mut states = Map::<StateID, LR0State>::default();
    let mut next_state_id = 0u16;
    let mut state_id = move || {
        let id = StateID(next_state_id);
        next_state_id += 1;
        id
    };

    let mut pending_states = VecDeque::<(StateID, Vec<LR0Item>)>::new();
    pending_states.push_back((
        state_id(),
        vec![LR0Item {
            production: ProductionID::ACCEPT,
            index: 0,
        }],
    ));

    let mut isocores = Map::<Vec<LR0Item>, StateID>::default();
    while let Some((current, kernels)) = pending_states.pop_front() {
        let mut items = Set::default();
        for &kernel in &kernels {
            items.insert(kernel);
            let production = g.production(kernel.production);
            if let Some(&next) = production.right().get::<usize>(kernel.index.into()) {
                if g.is_nonterminal(next) {
                    items.extend(&nonkernels[&next]);
                }
            }
        }

        let mut reduces = Set::default();
        let mut new_kernels = Map::<SymbolID, Set<LR0Item>>::default();
        for item in items {
            let production = g.production(item.production);
            match production.right().get::<usize>(item.index.into()) {
                Some(&sym) => {
                    new_kernels.entry(sym).or_default().insert(LR0Item {
                        index: item.index + 1,
                        ..item
                    });
                }
                None => {
                    reduces.insert(item.production);
                }
            }
        }

        let mut shifts = Map::default();
        let mut gotos = Map::default();
        for (sym, new_kernel) in new_kernels {
            let mut new_kernel: Vec<_> = new_kernel.into_iter().collect();
            new_kernel.sort_unstable();
            let next = match isocores.get(&new_kernel) {
                Some(&id) => id,
                None => {
                    let id = state_id();
                    isocores.insert(new_kernel.clone(), id);
                    pending_states.push_back((id, new_kernel));
                    id
                }
            };
            if g.is_terminal(sym) {
                shifts.insert(sym, next);
            } else {
                gotos.insert(sym, next);
            }
        }

        states.insert(
            current,
            LR0State {
                kernels,
                shifts,
                gotos,
                reduces,
                merged_into: None,
            },
        );
    }

    let accept_state = states[&StateID::INITIAL]
        .gotos
        .get(&g.start_symbol())
        .and_then(|next| states[next].shifts.get(&SymbolID::EOI))
        .copied()
        .ok_or_else(|| reporter.fatal(diag::E_NO_ACCEPT_STATE, None, "No accept state"))?;

    tracing::debug!(states = states.len(), ?accept_state, "lr0 automaton built");

    Ok(LR0Automaton {
        states,
        accept_state,
    })
}

fn nonkernels(g: &Grammar) -> Map<SymbolID, Set<LR0Item>> {
    let mut nonkernels: Map<SymbolID, Set<LR0Item>> = Map::default();
    for n in g.nonterminals() {
        let mut items = Set::default();
        let mut visited = Set::default();
        let mut pending = vec![n];
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            for (id, p) in g.productions_of(current) {
                items.insert(LR0Item {
                    production: id,
                    index: 0,
                });
                if let Some(&first) = p.right().first() {
                    if g.is_nonterminal(first) {
                        pending.push(first);
                    }
                }
            }
        }
        nonkernels.insert(n, items);
    }
    nonkernels
}
