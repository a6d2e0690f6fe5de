//! The table-generation pipeline.

pub mod digraph;
pub mod lookahead;
pub mod lr0;
pub mod table;

use self::table::{ParseTable, ReduceLookaheads};
use crate::{
    diag::{Abort, Reporter},
    first_sets::{FirstSets, FollowSets},
    grammar::Grammar,
};

/// Which look-ahead computation drives the reduce decisions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    /// DeRemer/Pennello digraph look-aheads.
    #[default]
    Lalr,
    /// Skip the look-ahead computation and fall back to the LR(0) Follow
    /// sets (the `-L` switch).
    Lr0,
}

/// Run the whole pipeline: LR(0) automaton, look-aheads, state reduction,
/// table construction.
pub fn compute(g: &Grammar, mode: Mode, reporter: &mut Reporter) -> Result<ParseTable, Abort> {
    let mut automaton = lr0::lr0(g, reporter)?;

    match mode {
        Mode::Lalr => {
            let la = lookahead::lookaheads(g, &automaton);
            let lookaheads = ReduceLookaheads::Lalr(&la);
            table::reduce_states(g, &mut automaton, &lookaheads);
            table::generate(g, &automaton, &lookaheads, reporter)
        }
        Mode::Lr0 => {
            let first = FirstSets::new(g);
            let follow = FollowSets::new(g, &first);
            let lookaheads = ReduceLookaheads::Slr(&follow);
            table::reduce_states(g, &mut automaton, &lookaheads);
            table::generate(g, &automaton, &lookaheads, reporter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{table::Action, *};
    use crate::{
        diag::{self, Policy},
        grammar::{samples, SymbolID},
    };

    fn keep_going() -> Reporter {
        Reporter::new(Policy {
            keep_going: true,
            verbose: false,
        })
    }

    fn run(
        f: impl FnOnce(&mut crate::grammar::GrammarDef<'_>) -> Result<(), Abort>,
        mode: Mode,
        reporter: &mut Reporter,
    ) -> (Grammar, ParseTable) {
        let g = Grammar::define(reporter, f).unwrap();
        let table = compute(&g, mode, reporter).unwrap();
        (g, table)
    }

    /// Drive the table over a token string, returning true on accept.
    fn parses(g: &Grammar, table: &ParseTable, tokens: &[&str]) -> bool {
        let mut stack = vec![table.start_state];
        let mut input: Vec<SymbolID> = tokens.iter().map(|t| g.resolve(t).unwrap()).collect();
        input.push(SymbolID::EOI);
        let mut cursor = 0;
        loop {
            let state = *stack.last().unwrap();
            let row = &table.states[&state];
            match row.actions.get(&input[cursor]) {
                Some(Action::Shift(next)) => {
                    stack.push(*next);
                    cursor += 1;
                }
                Some(Action::Reduce(p)) => {
                    let production = g.production(*p);
                    for _ in 0..production.right().len() {
                        stack.pop();
                    }
                    let top = *stack.last().unwrap();
                    match table.states[&top].gotos.get(&production.left()) {
                        Some(next) => stack.push(*next),
                        None => return false,
                    }
                }
                Some(Action::Accept) => return true,
                Some(Action::Fail) | None => return false,
            }
        }
    }

    #[test]
    fn ambiguous_sum_defaults_to_shift() {
        let mut reporter = keep_going();
        let (g, table) = run(samples::ambiguous_sum, Mode::Lalr, &mut reporter);

        // The ambiguity on '+' is resolved by default-favor-shift with a
        // diagnostic, not an error.
        assert_eq!(reporter.error_count(), 0);
        assert!(reporter
            .diagnostics()
            .iter()
            .any(|d| d.code == diag::W_DEFAULT_SHIFT));

        let plus = g.resolve("'+'").unwrap();
        let shifted = table.states.values().any(|row| {
            matches!(row.actions.get(&plus), Some(Action::Shift(_)))
                && row.actions.len() > 1
        });
        assert!(shifted);

        assert!(parses(&g, &table, &["NUM", "'+'", "NUM"]));
        assert!(parses(&g, &table, &["NUM", "'+'", "NUM", "'+'", "NUM"]));
        assert!(!parses(&g, &table, &["NUM", "NUM"]));
    }

    #[test]
    fn reduce_reduce_is_reported_once_naming_both() {
        let mut reporter = keep_going();
        let (g, table) = run(samples::reduce_reduce, Mode::Lalr, &mut reporter);

        let conflicts: Vec<_> = reporter
            .diagnostics()
            .iter()
            .filter(|d| d.code == diag::E_REDUCE_REDUCE)
            .collect();
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].message.contains("A := ε"));
        assert!(conflicts[0].message.contains("B := ε"));
        assert_eq!(reporter.error_count(), 1);

        // Keep-going still yields a usable (if degenerate) table: the
        // earlier production wins, so `S : A` is the parse that survives.
        assert!(parses(&g, &table, &[]));
    }

    #[test]
    fn reduce_reduce_aborts_without_keep_going() {
        let mut reporter = Reporter::new(Policy::default());
        let g = Grammar::define(&mut reporter, samples::reduce_reduce).unwrap();
        assert!(compute(&g, Mode::Lalr, &mut reporter).is_err());
        assert_eq!(reporter.error_count(), 1);
    }

    #[test]
    fn precedence_resolves_arithmetic() {
        let mut reporter = Reporter::new(Policy::default());
        let (g, table) = run(samples::arithmetic_prec, Mode::Lalr, &mut reporter);

        // Every conflict is covered by the declared precedence.
        assert_eq!(reporter.error_count(), 0);
        assert!(reporter
            .diagnostics()
            .iter()
            .all(|d| d.code != diag::W_DEFAULT_SHIFT));

        assert!(parses(&g, &table, &["NUM", "PLUS", "NUM", "STAR", "NUM"]));
        assert!(parses(&g, &table, &["NUM", "SLASH", "NUM", "MINUS", "NUM"]));
        assert!(!parses(&g, &table, &["PLUS", "NUM"]));
    }

    #[test]
    fn assignments_clean_under_lalr_but_not_slr() {
        // The point of the digraph passes: this grammar has no LALR
        // conflicts, while the LR(0)-Follow fallback reports one.
        let mut reporter = keep_going();
        let (_g, _table) = run(samples::assignments, Mode::Lalr, &mut reporter);
        assert_eq!(reporter.error_count(), 0);
        assert!(reporter.diagnostics().is_empty());

        let mut reporter = keep_going();
        let (_g, _table) = run(samples::assignments, Mode::Lr0, &mut reporter);
        assert!(reporter
            .diagnostics()
            .iter()
            .any(|d| d.code == diag::W_DEFAULT_SHIFT));
    }

    #[test]
    fn nonassoc_produces_error_entries() {
        let mut reporter = Reporter::new(Policy::default());
        let (g, table) = run(
            |def| {
                let eq = def.terminal(
                    "EQ",
                    Some(crate::grammar::Precedence::new(0, crate::grammar::Assoc::Nonassoc)),
                )?;
                let num = def.terminal("NUM", None)?;
                let e = def.nonterminal("e")?;
                def.start_symbol(e);
                def.production(e, [e, eq, e])?;
                def.production(e, [num])?;
                Ok(())
            },
            Mode::Lalr,
            &mut reporter,
        );

        assert!(parses(&g, &table, &["NUM", "EQ", "NUM"]));
        // `a = b = c` must be rejected through the explicit error entry.
        assert!(!parses(&g, &table, &["NUM", "EQ", "NUM", "EQ", "NUM"]));
        let eq = g.resolve("EQ").unwrap();
        assert!(table
            .states
            .values()
            .any(|row| matches!(row.actions.get(&eq), Some(Action::Fail))));
    }

    #[test]
    fn state_reduction_preserves_the_table() {
        let mut reporter = Reporter::new(Policy::default());
        let g = Grammar::define(&mut reporter, samples::arithmetic).unwrap();

        // Reference table from an untouched automaton.
        let mut plain = lr0::lr0(&g, &mut reporter).unwrap();
        let la = lookahead::lookaheads(&g, &plain);
        let lookaheads = ReduceLookaheads::Lalr(&la);
        let reference = table::generate(&g, &plain, &lookaheads, &mut reporter).unwrap();

        let merged = table::reduce_states(&g, &mut plain, &lookaheads);
        let reduced = table::generate(&g, &plain, &lookaheads, &mut reporter).unwrap();

        // Merged states drop out of the table...
        assert_eq!(reference.states.len(), reduced.states.len() + merged);
        // ...and every surviving row is unchanged up to destination
        // rewriting into surviving states.
        for (id, row) in &reduced.states {
            let reference_row = &reference.states[id];
            assert_eq!(reference_row.actions.len(), row.actions.len());
            assert_eq!(reference_row.gotos.len(), row.gotos.len());
        }
        for word in [
            &["NUM", "PLUS", "NUM", "STAR", "NUM"][..],
            &["LPAREN", "NUM", "RPAREN"][..],
            &["NUM", "SLASH", "NUM"][..],
        ] {
            assert!(parses(&g, &reduced, word));
        }
        assert!(!parses(&g, &reduced, &["NUM", "PLUS"]));
    }

    #[test]
    fn marker_actions_parse_transparently() {
        let mut reporter = Reporter::new(Policy::default());
        let (g, table) = run(
            |def| {
                let num = def.terminal("NUM", None)?;
                let s = def.nonterminal("s")?;
                let marker = def.marker("on_num($1)".into())?;
                def.start_symbol(s);
                def.production(s, [marker, num])?;
                Ok(())
            },
            Mode::Lalr,
            &mut reporter,
        );
        assert_eq!(reporter.error_count(), 0);
        assert!(parses(&g, &table, &["NUM"]));
    }
}
