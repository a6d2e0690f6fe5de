//! Rendering the finished table and symbol metadata as a Rust source
//! artifact.
//!
//! The generator's real contract is the [`ParseTable`] plus the per-symbol
//! descriptors; this module is one serialization of it — flat action/goto
//! arrays, a factory registration per node symbol, and the semantic-action
//! dispatch function with `$$`/`$n`/`$-n` and alias references rewritten.

use crate::{
    grammar::{Grammar, SemanticAction, SymbolID, SymbolKind},
    lalr::{
        lr0::StateID,
        table::{Action, ParseTable},
    },
    types::{Map, Set},
};
use std::fmt;

#[derive(Debug)]
pub struct Codegen<'g> {
    grammar: &'g Grammar,
    table: &'g ParseTable,
    keep_concrete: bool,
}

impl<'g> Codegen<'g> {
    pub fn new(grammar: &'g Grammar, table: &'g ParseTable) -> Self {
        Self {
            grammar,
            table,
            keep_concrete: true,
        }
    }

    /// `-C` discards concrete-syntax retention in the emitted parser.
    pub fn keep_concrete(mut self, keep: bool) -> Self {
        self.keep_concrete = keep;
        self
    }

    fn dense_states(&self) -> Map<StateID, usize> {
        self.table
            .states
            .keys()
            .enumerate()
            .map(|(dense, &id)| (id, dense))
            .collect()
    }

    fn terminal_columns(&self) -> Vec<SymbolID> {
        self.grammar
            .symbols()
            .filter(|(_, s)| matches!(s.kind(), SymbolKind::Terminal))
            .map(|(id, _)| id)
            .collect()
    }

    fn goto_columns(&self) -> Vec<SymbolID> {
        self.grammar
            .symbols()
            .filter(|(_, s)| {
                matches!(s.kind(), SymbolKind::Nonterminal | SymbolKind::Marker)
            })
            .map(|(id, _)| id)
            .collect()
    }

    fn emit(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;
        let dense = self.dense_states();
        let terminals = self.terminal_columns();
        let gotos = self.goto_columns();
        let class = g.parser_name().unwrap_or("Parser");

        writeln!(f, "// This file is automatically generated by lalrgen.")?;
        writeln!(f, "// Do not edit by hand.")?;
        writeln!(f)?;
        if let Some(namespace) = g.namespace() {
            writeln!(f, "pub mod {} {{", namespace)?;
        }

        writeln!(f, "pub const START_STATE: usize = {};", dense[&self.table.start_state])?;
        writeln!(f, "pub const STATE_COUNT: usize = {};", self.table.states.len())?;
        writeln!(f, "pub const TOKEN_COUNT: usize = {};", terminals.len())?;
        writeln!(f, "pub const ACCEPT: i32 = i32::MAX;")?;
        writeln!(f)?;

        // Row-major: ACTION[state * TOKEN_COUNT + token]. Positive entries
        // shift to `entry - 1`, negative entries reduce `-entry - 1`, zero
        // is an error cell.
        writeln!(f, "#[rustfmt::skip]")?;
        writeln!(f, "pub static ACTION: &[i32] = &[")?;
        for (_, row) in &self.table.states {
            f.write_str("    ")?;
            for &t in &terminals {
                let entry = match row.actions.get(&t) {
                    Some(Action::Shift(next)) => dense[next] as i32 + 1,
                    Some(Action::Reduce(p)) => -(p.into_raw() as i32 + 1),
                    Some(Action::Accept) => i32::MAX,
                    Some(Action::Fail) | None => 0,
                };
                if entry == i32::MAX {
                    write!(f, "ACCEPT, ")?;
                } else {
                    write!(f, "{}, ", entry)?;
                }
            }
            writeln!(f)?;
        }
        writeln!(f, "];")?;
        writeln!(f)?;

        // GOTO[state * GOTO_COUNT + nonterminal]; zero is an empty cell.
        writeln!(f, "pub const GOTO_COUNT: usize = {};", gotos.len())?;
        writeln!(f, "#[rustfmt::skip]")?;
        writeln!(f, "pub static GOTO: &[i32] = &[")?;
        for (_, row) in &self.table.states {
            f.write_str("    ")?;
            for &n in &gotos {
                let entry = match row.gotos.get(&n) {
                    Some(next) => dense[next] as i32 + 1,
                    None => 0,
                };
                write!(f, "{}, ", entry)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "];")?;
        writeln!(f)?;

        // Reduction metadata: (popped symbols, goto column of the lhs).
        writeln!(f, "#[rustfmt::skip]")?;
        writeln!(f, "pub static PRODUCTIONS: &[(usize, usize)] = &[")?;
        for (_, p) in g.productions() {
            let column = gotos.iter().position(|&n| n == p.left()).unwrap_or(0);
            writeln!(f, "    ({}, {}), // {}", p.right().len(), column, p.display(g))?;
        }
        writeln!(f, "];")?;
        writeln!(f)?;

        // One descriptor per symbol: (name, kind, table index, base).
        writeln!(f, "pub static SYMBOLS: &[(&str, &str, usize, &str)] = &[")?;
        for (id, symbol) in g.symbols() {
            let entry = match self.table.symbols.get(&id) {
                Some(entry) => entry,
                None => continue,
            };
            let kind = match symbol.kind() {
                SymbolKind::Terminal => "terminal",
                SymbolKind::Nonterminal => "nonterminal",
                SymbolKind::Marker => "marker",
                SymbolKind::Node { .. } => "node",
                SymbolKind::Unknown => continue,
            };
            let index = match entry.table {
                crate::lalr::table::TableRef::Action { index } => index,
                crate::lalr::table::TableRef::Goto { index } => index,
            };
            writeln!(
                f,
                "    ({:?}, {:?}, {}, {:?}),",
                symbol.name(),
                kind,
                index,
                g.symbol(entry.base).name(),
            )?;
        }
        writeln!(f, "];")?;
        writeln!(f)?;

        writeln!(f, "#[derive(Debug, Default, Clone)]")?;
        writeln!(f, "pub struct Value {{")?;
        writeln!(f, "    pub symbol: &'static str,")?;
        writeln!(f, "    pub children: Vec<Value>,")?;
        if self.keep_concrete {
            writeln!(f, "    pub text: Option<String>,")?;
        }
        writeln!(f, "}}")?;
        writeln!(f)?;

        self.emit_factories(f)?;
        writeln!(f)?;
        self.emit_dispatch(f)?;
        writeln!(f)?;

        writeln!(f, "#[derive(Debug, Default)]")?;
        writeln!(f, "pub struct {} {{", class)?;
        writeln!(f, "    pub stack: Vec<(usize, Value)>,")?;
        writeln!(f, "}}")?;
        writeln!(f)?;
        writeln!(f, "impl {} {{", class)?;
        writeln!(f, "    pub fn new() -> Self {{")?;
        writeln!(f, "        Self::with_state(START_STATE)")?;
        writeln!(f, "    }}")?;
        writeln!(f)?;
        writeln!(f, "    pub fn with_state(state: usize) -> Self {{")?;
        writeln!(f, "        Self {{ stack: vec![(state, Value::default())] }}")?;
        writeln!(f, "    }}")?;
        writeln!(f, "}}")?;

        if g.namespace().is_some() {
            writeln!(f, "}}")?;
        }
        Ok(())
    }

    /// One class-factory registration per declared node symbol. The emitted
    /// set guards against registering a symbol twice in one run.
    fn emit_factories(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;
        writeln!(
            f,
            "pub fn register_factories(registry: &mut dyn FnMut(&'static str, &'static str)) {{"
        )?;
        let mut emitted = Set::<SymbolID>::default();
        for (id, symbol) in g.symbols() {
            if let SymbolKind::Node { .. } = symbol.kind() {
                if !emitted.insert(id) {
                    continue;
                }
                let base = self.table.symbols[&id].base;
                writeln!(
                    f,
                    "    registry({:?}, {:?});",
                    symbol.name(),
                    g.symbol(base).name(),
                )?;
            }
        }
        writeln!(f, "}}")
    }

    fn emit_dispatch(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;
        writeln!(f, "#[allow(unused_variables, unused_mut)]")?;
        writeln!(
            f,
            "pub fn dispatch(production: usize, args: &[Value], below: &[Value]) -> Value {{"
        )?;
        writeln!(f, "    let mut __result = Value::default();")?;
        writeln!(f, "    match production {{")?;
        for (id, p) in g.productions() {
            let Some(action) = p.action() else { continue };
            writeln!(f, "        {} => {{ // {}", id.into_raw(), p.display(g))?;
            match g.action(action) {
                SemanticAction::Inline { body } => {
                    for line in rewrite_action(body, p.aliases()).trim().lines() {
                        writeln!(f, "            {}", line.trim_end())?;
                    }
                }
                SemanticAction::Node { symbol, args, init } => {
                    writeln!(
                        f,
                        "            __result.symbol = {:?};",
                        g.symbol(*symbol).name()
                    )?;
                    for (k, arg) in args.iter().enumerate() {
                        let position = p.aliases().get(arg).copied().unwrap_or(k + 1);
                        writeln!(
                            f,
                            "            __result.children.push(args[{}].clone()); // {}",
                            position - 1,
                            arg,
                        )?;
                    }
                    if let Some(init) = init {
                        for line in rewrite_action(init, p.aliases()).trim().lines() {
                            writeln!(f, "            {}", line.trim_end())?;
                        }
                    }
                }
            }
            writeln!(f, "        }}")?;
        }
        writeln!(f, "        _ => {{}}")?;
        writeln!(f, "    }}")?;
        if self.keep_concrete {
            writeln!(f, "    if __result.text.is_none() {{")?;
            writeln!(
                f,
                "        __result.text = args.iter().filter_map(|a| a.text.clone()).reduce(|a, b| a + &b);"
            )?;
            writeln!(f, "    }}")?;
        }
        writeln!(f, "    __result")?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for Codegen<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.emit(f)
    }
}

/// Rewrite `$$`, `$n`, `$-n`, `$<Type>n` and `$alias` references in an
/// action body. Anything unrecognized passes through untouched.
fn rewrite_action(body: &str, aliases: &Map<String, usize>) -> String {
    let chars: Vec<char> = body.chars().collect();
    let mut out = String::with_capacity(body.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '$' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;

        // `$<Type>` casts are recognized and dropped; the value slots are
        // untyped in the emitted parser.
        if i < chars.len() && chars[i] == '<' {
            if let Some(close) = chars[i..].iter().position(|&c| c == '>') {
                i += close + 1;
            }
        }

        match chars.get(i) {
            Some('$') => {
                out.push_str("__result");
                i += 1;
            }
            Some('-') if chars.get(i + 1).map_or(false, |c| c.is_ascii_digit()) => {
                i += 1;
                let n = read_number(&chars, &mut i);
                out.push_str(&format!("below[{}]", n.saturating_sub(1)));
            }
            Some(c) if c.is_ascii_digit() => {
                let n = read_number(&chars, &mut i);
                out.push_str(&format!("args[{}]", n.saturating_sub(1)));
            }
            Some(&c) if c == '_' || c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i] == '_' || chars[i].is_alphanumeric()) {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                match aliases.get(&name) {
                    Some(&position) => out.push_str(&format!("args[{}]", position - 1)),
                    None => {
                        out.push('$');
                        out.push_str(&name);
                    }
                }
            }
            _ => out.push('$'),
        }
    }
    out
}

fn read_number(chars: &[char], i: &mut usize) -> usize {
    let mut n = 0usize;
    while *i < chars.len() && chars[*i].is_ascii_digit() {
        n = n * 10 + chars[*i].to_digit(10).unwrap() as usize;
        *i += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diag::{Policy, Reporter},
        grammar::{samples, Grammar},
        lalr::{self, Mode},
    };

    fn aliases(pairs: &[(&str, usize)]) -> Map<String, usize> {
        pairs
            .iter()
            .map(|&(name, position)| (name.to_owned(), position))
            .collect()
    }

    #[test]
    fn rewrite_positional_references() {
        assert_eq!(
            rewrite_action("$$ = $1 + $3;", &Map::default()),
            "__result = args[0] + args[2];"
        );
    }

    #[test]
    fn rewrite_negative_and_typed_references() {
        assert_eq!(
            rewrite_action("check($-2, $<int>1)", &Map::default()),
            "check(below[1], args[0])"
        );
    }

    #[test]
    fn rewrite_alias_references() {
        let aliases = aliases(&[("lhs", 1), ("rhs", 3)]);
        assert_eq!(
            rewrite_action("$$ = add($lhs, $rhs);", &aliases),
            "__result = add(args[0], args[2]);"
        );
        // Unknown names pass through.
        assert_eq!(rewrite_action("$unknown", &aliases), "$unknown");
    }

    #[test]
    fn artifact_contains_tables_and_metadata() {
        let mut reporter = Reporter::new(Policy::default());
        let g = Grammar::define(&mut reporter, samples::arithmetic_prec).unwrap();
        let table = lalr::compute(&g, Mode::Lalr, &mut reporter).unwrap();
        let rendered = Codegen::new(&g, &table).to_string();

        assert!(rendered.contains("pub static ACTION: &[i32]"));
        assert!(rendered.contains("pub static GOTO: &[i32]"));
        assert!(rendered.contains("pub static SYMBOLS"));
        assert!(rendered.contains("(\"NUM\", \"terminal\""));
        assert!(rendered.contains("pub struct Parser"));
        assert!(rendered.contains("ACCEPT"));
    }

    #[test]
    fn discarding_concrete_syntax_removes_retention() {
        let mut reporter = Reporter::new(Policy::default());
        let g = Grammar::define(&mut reporter, samples::arithmetic).unwrap();
        let table = lalr::compute(&g, Mode::Lalr, &mut reporter).unwrap();

        let kept = Codegen::new(&g, &table).to_string();
        let dropped = Codegen::new(&g, &table).keep_concrete(false).to_string();
        assert!(kept.contains("pub text: Option<String>"));
        assert!(!dropped.contains("pub text"));
        assert!(kept.len() > dropped.len());
    }

    #[test]
    fn pipeline_is_idempotent() {
        let render = || {
            let mut reporter = Reporter::new(Policy::default());
            let g = Grammar::define(&mut reporter, samples::arithmetic_prec).unwrap();
            let table = lalr::compute(&g, Mode::Lalr, &mut reporter).unwrap();
            Codegen::new(&g, &table).to_string()
        };
        assert_eq!(render(), render());
    }
}
