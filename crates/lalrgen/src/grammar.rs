//! Grammar model: interned symbols, productions, precedence.
//!
//! Symbols live in a single arena keyed by [`SymbolID`]; every other
//! structure holds handles, never names. A symbol's kind starts out
//! [`SymbolKind::Unknown`] and is resolved to a concrete kind exactly once
//! before any set computation begins — anything that never appears on a
//! left-hand side must be a terminal.

use crate::{
    diag::{self, Abort, Pos, Reporter},
    syntax::{self, ast},
    types::{Map, Set},
    util::display_fn,
};
use std::{fmt, fs, path::Path};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolID(u16);

impl SymbolID {
    /// Reserved terminal meaning the end of input.
    pub const EOI: Self = Self(0);

    /// Left-hand side of the synthetic accept production.
    pub const START: Self = Self(1);

    const OFFSET: u16 = 2;

    pub const fn into_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for SymbolID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::EOI => write!(f, "S#Eoi"),
            &Self::START => write!(f, "S#Start"),
            _ => write!(f, "S#{:03}", self.0),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    /// Not yet resolved; defaults to `Terminal` after the main parse pass.
    Unknown,
    Terminal,
    Nonterminal,
    /// Left-hand side of a hoisted mid-rule action. Behaves like a
    /// nonterminal with a single empty production.
    Marker,
    /// Synthesized node symbol declared by a simple action. Delegates its
    /// parse-table entry to `base`.
    Node { base: SymbolID },
}

#[derive(Debug)]
pub struct Symbol {
    name: String,
    kind: SymbolKind,
    precedence: Option<Precedence>,
    defined: bool,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn precedence(&self) -> Option<Precedence> {
        self.precedence
    }

    /// Whether the symbol was introduced by a declaration (token script,
    /// left-hand side, node or marker synthesis) rather than bare usage.
    pub fn defined(&self) -> bool {
        self.defined
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A set of symbols backed by a bit vector, cheap to clone and union.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SymbolSet {
    inner: bit_set::BitSet,
}

impl SymbolSet {
    pub fn contains(&self, id: SymbolID) -> bool {
        self.inner.contains(id.0.into())
    }

    pub fn insert(&mut self, id: SymbolID) -> bool {
        self.inner.insert(id.0.into())
    }

    pub fn union_with(&mut self, other: &Self) {
        self.inner.union_with(&other.inner)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = SymbolID> + '_ {
        self.inner
            .iter()
            .map(|raw| u16::try_from(raw).map(SymbolID).unwrap())
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for (i, id) in self.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", g.symbol(id))?;
            }
            Ok(())
        })
    }
}

impl fmt::Debug for SymbolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<SymbolID> for SymbolSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = SymbolID>,
    {
        Self {
            inner: iter.into_iter().map(|s| s.0.into()).collect(),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductionID(u16);

impl ProductionID {
    /// The synthetic `$start := <start> $eoi` production seeding the automaton.
    pub const ACCEPT: Self = Self(0);

    const OFFSET: u16 = 1;

    pub const fn into_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for ProductionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::ACCEPT => write!(f, "P#Accept"),
            _ => write!(f, "P#{:03}", self.0),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionID(u16);

impl fmt::Debug for ActionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A#{:03}", self.0)
    }
}

/// A semantic action attached to a production.
#[derive(Debug)]
pub enum SemanticAction {
    /// Inline `{ ... }` body, copied through to the dispatch function.
    Inline { body: String },
    /// `%Name(args){init}` — construct the named node symbol.
    Node {
        symbol: SymbolID,
        args: Vec<String>,
        init: Option<String>,
    },
}

#[derive(Debug)]
pub struct Production {
    left: SymbolID,
    right: Vec<SymbolID>,
    aliases: Map<String, usize>,
    actions_only: bool,
    precedence: Option<Precedence>,
    action: Option<ActionID>,
}

impl Production {
    pub fn left(&self) -> SymbolID {
        self.left
    }

    pub fn right(&self) -> &[SymbolID] {
        &self.right
    }

    /// Symbol name to 1-based right-hand-side position, for named references
    /// in action bodies. Later occurrences of the same name shadow earlier.
    pub fn aliases(&self) -> &Map<String, usize> {
        &self.aliases
    }

    /// True when the right-hand side carries no real grammar symbols.
    pub fn actions_only(&self) -> bool {
        self.actions_only
    }

    pub fn action(&self) -> Option<ActionID> {
        self.action
    }

    /// The `%prec` override if present, otherwise the precedence of the
    /// rightmost terminal in the production.
    pub fn precedence(&self, g: &Grammar) -> Option<Precedence> {
        match self.precedence {
            Some(prec) => Some(prec),
            None => {
                for &symbol in self.right.iter().rev() {
                    if g.is_terminal(symbol) {
                        return g.symbol(symbol).precedence();
                    }
                }
                None
            }
        }
    }

    // `"LHS := R1 R2 R3"`
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            write!(f, "{} := ", g.symbol(self.left))?;
            if self.right.is_empty() {
                f.write_str("ε")?;
            } else {
                for (i, &symbol) in self.right.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", g.symbol(symbol))?;
                }
            }
            Ok(())
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Precedence {
    pub priority: u16,
    pub assoc: Assoc,
}

impl Precedence {
    pub const fn new(priority: u16, assoc: Assoc) -> Self {
        Self { priority, assoc }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
    Nonassoc,
}

impl fmt::Display for Assoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Nonassoc => write!(f, "nonassoc"),
        }
    }
}

/// The grammar definition used to derive the parser tables.
#[derive(Debug)]
pub struct Grammar {
    symbols: Map<SymbolID, Symbol>,
    names: Map<String, SymbolID>,
    productions: Map<ProductionID, Production>,
    actions: Map<ActionID, SemanticAction>,
    start_symbol: SymbolID,
    nullables: Set<SymbolID>,
    parser_name: Option<String>,
    namespace: Option<String>,
}

impl Grammar {
    pub fn from_file(path: impl AsRef<Path>, reporter: &mut Reporter) -> Result<Self, Abort> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|err| {
            reporter.fatal(
                diag::E_IO,
                None,
                format!("cannot open {}: {}", path.display(), err),
            )
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_source(&source, base_dir, reporter)
    }

    pub fn from_str(source: &str, reporter: &mut Reporter) -> Result<Self, Abort> {
        Self::from_source(source, Path::new("."), reporter)
    }

    pub fn from_source(
        source: &str,
        base_dir: &Path,
        reporter: &mut Reporter,
    ) -> Result<Self, Abort> {
        let ast = syntax::parse(source, reporter)?;
        Self::define(reporter, |def| lower(def, &ast, base_dir))
    }

    /// Define a grammar using the specified function.
    pub fn define<F>(reporter: &mut Reporter, f: F) -> Result<Self, Abort>
    where
        F: FnOnce(&mut GrammarDef<'_>) -> Result<(), Abort>,
    {
        let mut def = GrammarDef::new(reporter);
        f(&mut def)?;
        def.end()
    }

    pub fn symbol(&self, id: SymbolID) -> &Symbol {
        &self.symbols[&id]
    }

    pub fn production(&self, id: ProductionID) -> &Production {
        &self.productions[&id]
    }

    pub fn action(&self, id: ActionID) -> &SemanticAction {
        &self.actions[&id]
    }

    pub fn resolve(&self, name: &str) -> Option<SymbolID> {
        self.names.get(name).copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.symbols.iter().map(|(&id, sym)| (id, sym))
    }

    pub fn productions(&self) -> impl Iterator<Item = (ProductionID, &Production)> + '_ {
        self.productions.iter().map(|(&id, p)| (id, p))
    }

    pub fn start_symbol(&self) -> SymbolID {
        self.start_symbol
    }

    pub fn parser_name(&self) -> Option<&str> {
        self.parser_name.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn is_terminal(&self, id: SymbolID) -> bool {
        matches!(self.symbols[&id].kind, SymbolKind::Terminal)
    }

    /// Terminals never derive ε; markers always do.
    pub fn is_nonterminal(&self, id: SymbolID) -> bool {
        matches!(
            self.symbols[&id].kind,
            SymbolKind::Nonterminal | SymbolKind::Marker
        )
    }

    pub fn nullable(&self, id: SymbolID) -> bool {
        self.nullables.contains(&id)
    }

    pub fn nullables(&self) -> &Set<SymbolID> {
        &self.nullables
    }

    pub fn terminals(&self) -> impl Iterator<Item = SymbolID> + '_ {
        self.symbols()
            .filter(|(_, s)| matches!(s.kind, SymbolKind::Terminal))
            .map(|(id, _)| id)
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = SymbolID> + '_ {
        self.symbols()
            .filter(|(_, s)| {
                matches!(s.kind, SymbolKind::Nonterminal | SymbolKind::Marker)
            })
            .map(|(id, _)| id)
    }

    pub fn productions_of(
        &self,
        left: SymbolID,
    ) -> impl Iterator<Item = (ProductionID, &Production)> + '_ {
        self.productions().filter(move |(_, p)| p.left == left)
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#### terminals: ")?;
        for (i, id) in self.terminals().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let symbol = self.symbol(id);
            write!(f, "{}", symbol)?;
            if let Some(prec) = symbol.precedence() {
                write!(f, " ({}, {})", prec.priority, prec.assoc)?;
            }
        }
        write!(f, "\n#### nonterminals: ")?;
        for (i, id) in self.nonterminals().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", self.symbol(id))?;
            if id == self.start_symbol {
                f.write_str(" (start)")?;
            }
        }
        writeln!(f, "\n#### productions:")?;
        for (_, p) in self.productions() {
            writeln!(f, "- {}", p.display(self))?;
        }
        Ok(())
    }
}

/// The contextual values for building a [`Grammar`].
#[derive(Debug)]
pub struct GrammarDef<'r> {
    reporter: &'r mut Reporter,
    symbols: Map<SymbolID, Symbol>,
    names: Map<String, SymbolID>,
    productions: Map<ProductionID, Production>,
    actions: Map<ActionID, SemanticAction>,
    start: Option<SymbolID>,
    start_name: Option<(String, Pos)>,
    parser_name: Option<String>,
    namespace: Option<String>,
    script_loaded: bool,
    next_symbol: u16,
    next_production: u16,
    next_action: u16,
    next_priority: u16,
    next_marker: u16,
}

impl<'r> GrammarDef<'r> {
    fn new(reporter: &'r mut Reporter) -> Self {
        let mut def = Self {
            reporter,
            symbols: Map::default(),
            names: Map::default(),
            productions: Map::default(),
            actions: Map::default(),
            start: None,
            start_name: None,
            parser_name: None,
            namespace: None,
            script_loaded: false,
            next_symbol: SymbolID::OFFSET,
            next_production: ProductionID::OFFSET,
            next_action: 0,
            next_priority: 0,
            next_marker: 0,
        };
        def.insert_symbol("$eoi", SymbolID::EOI, SymbolKind::Terminal, true);
        def.insert_symbol("$start", SymbolID::START, SymbolKind::Nonterminal, true);
        def
    }

    pub fn reporter(&mut self) -> &mut Reporter {
        &mut *self.reporter
    }

    fn insert_symbol(&mut self, name: &str, id: SymbolID, kind: SymbolKind, defined: bool) {
        self.symbols.insert(
            id,
            Symbol {
                name: name.to_owned(),
                kind,
                precedence: None,
                defined,
            },
        );
        self.names.insert(name.to_owned(), id);
    }

    /// Intern `name`, returning the existing handle or a fresh `Unknown` one.
    pub fn intern(&mut self, name: &str) -> SymbolID {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = SymbolID(self.next_symbol);
        self.next_symbol += 1;
        self.insert_symbol(name, id, SymbolKind::Unknown, false);
        id
    }

    /// Declare a terminal symbol.
    pub fn terminal(
        &mut self,
        name: &str,
        precedence: Option<Precedence>,
    ) -> Result<SymbolID, Abort> {
        let id = self.intern(name);
        let symbol = &mut self.symbols[&id];
        match symbol.kind {
            SymbolKind::Unknown => {
                symbol.kind = SymbolKind::Terminal;
                symbol.defined = true;
                symbol.precedence = precedence;
            }
            SymbolKind::Terminal if !symbol.defined => {
                symbol.defined = true;
                symbol.precedence = precedence;
            }
            _ => {
                self.reporter.error(
                    diag::E_DUPLICATE_DECL,
                    None,
                    format!("symbol `{}' is already declared", name),
                )?;
            }
        }
        Ok(id)
    }

    /// Declare a nonterminal symbol.
    pub fn nonterminal(&mut self, name: &str) -> Result<SymbolID, Abort> {
        let id = self.intern(name);
        let symbol = &mut self.symbols[&id];
        match symbol.kind {
            SymbolKind::Unknown => {
                symbol.kind = SymbolKind::Nonterminal;
                symbol.defined = true;
            }
            SymbolKind::Nonterminal => {}
            _ => {
                self.reporter.error(
                    diag::E_DUPLICATE_DECL,
                    None,
                    format!("symbol `{}' is already declared", name),
                )?;
            }
        }
        Ok(id)
    }

    /// Declare a terminal listed in the companion token script.
    pub fn script_terminal(&mut self, name: &str) -> Result<SymbolID, Abort> {
        self.script_loaded = true;
        self.terminal(name, None)
    }

    /// `DeclarePrecedence`: assign one priority level to a group of symbols.
    /// An explicit strength pins the level; redeclaration shadows the
    /// symbol's previous precedence.
    pub fn precedence<'a, I>(&mut self, assoc: Assoc, strength: Option<u16>, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let priority = match strength {
            Some(s) => {
                self.next_priority = self.next_priority.max(s + 1);
                s
            }
            None => {
                let p = self.next_priority;
                self.next_priority += 1;
                p
            }
        };
        for name in names {
            let id = self.intern(name);
            let symbol = &mut self.symbols[&id];
            symbol.precedence = Some(Precedence::new(priority, assoc));
            // A precedence declaration also declares the symbol, so pure
            // precedence tokens never trip the token-script check.
            symbol.defined = true;
        }
    }

    pub fn symbol_precedence(&self, id: SymbolID) -> Option<Precedence> {
        self.symbols[&id].precedence
    }

    fn add_action(&mut self, action: SemanticAction) -> ActionID {
        let id = ActionID(self.next_action);
        self.next_action += 1;
        self.actions.insert(id, action);
        id
    }

    /// Hoist a mid-rule action into a fresh marker nonterminal with a single
    /// empty, actions-only production.
    pub fn marker(&mut self, body: String) -> Result<SymbolID, Abort> {
        let name = format!("$act{}", self.next_marker);
        self.next_marker += 1;
        let id = self.intern(&name);
        self.symbols[&id].kind = SymbolKind::Marker;
        self.symbols[&id].defined = true;
        let action = self.add_action(SemanticAction::Inline { body });
        self.production_ext(id, vec![], Map::default(), None, Some(action), None)?;
        Ok(id)
    }

    /// Declare a synthesized node symbol delegating to `base`.
    pub fn node(&mut self, name: &str, base: SymbolID, pos: Option<Pos>) -> Result<SymbolID, Abort> {
        if !verify_ident(name) {
            self.reporter.error(
                diag::E_BAD_IDENT,
                pos,
                format!("`{}' is not a valid node name", name),
            )?;
        }
        let id = self.intern(name);
        let symbol = &mut self.symbols[&id];
        match symbol.kind {
            SymbolKind::Unknown => {
                symbol.kind = SymbolKind::Node { base };
                symbol.defined = true;
                Ok(id)
            }
            _ => {
                self.reporter.error(
                    diag::E_DUPLICATE_DECL,
                    pos,
                    format!("node symbol `{}' is already declared", name),
                )?;
                Ok(id)
            }
        }
    }

    /// `AddProduction`: append one rule. The left-hand side resolves to a
    /// nonterminal here; a terminal on the left is a malformed grammar and
    /// fatal.
    pub fn production<I>(&mut self, left: SymbolID, right: I) -> Result<ProductionID, Abort>
    where
        I: IntoIterator<Item = SymbolID>,
    {
        self.production_ext(
            left,
            right.into_iter().collect(),
            Map::default(),
            None,
            None,
            None,
        )
    }

    pub fn production_ext(
        &mut self,
        left: SymbolID,
        right: Vec<SymbolID>,
        aliases: Map<String, usize>,
        precedence: Option<Precedence>,
        action: Option<ActionID>,
        pos: Option<Pos>,
    ) -> Result<ProductionID, Abort> {
        {
            let symbol = &mut self.symbols[&left];
            match symbol.kind {
                SymbolKind::Unknown => {
                    symbol.kind = SymbolKind::Nonterminal;
                    symbol.defined = true;
                }
                SymbolKind::Nonterminal | SymbolKind::Marker => {
                    symbol.defined = true;
                }
                _ => {
                    let name = symbol.name.clone();
                    return Err(self.reporter.fatal(
                        diag::E_TERMINAL_LHS,
                        pos,
                        format!("left-hand side `{}' resolves to a terminal", name),
                    ));
                }
            }
        }

        for p in self.productions.values() {
            if p.left == left && p.right == right {
                self.reporter.error(
                    diag::E_DUPLICATE_RULE,
                    pos,
                    format!(
                        "duplicate production for `{}'",
                        self.symbols[&left].name
                    ),
                )?;
            }
        }

        let actions_only = (action.is_some() || !right.is_empty())
            && right
                .iter()
                .all(|s| matches!(self.symbols[s].kind, SymbolKind::Marker));

        let id = ProductionID(self.next_production);
        self.next_production += 1;
        self.productions.insert(
            id,
            Production {
                left,
                right,
                aliases,
                actions_only,
                precedence,
                action,
            },
        );
        Ok(id)
    }

    /// Specify the start symbol for this grammar.
    pub fn start_symbol(&mut self, symbol: SymbolID) {
        self.start.replace(symbol);
    }

    pub fn start_name(&mut self, name: &str, pos: Pos) {
        self.start_name.replace((name.to_owned(), pos));
    }

    pub fn parser_name(&mut self, name: &str, pos: Pos) -> Result<(), Abort> {
        if !verify_ident(name) {
            self.reporter.error(
                diag::E_BAD_IDENT,
                Some(pos),
                format!("`{}' is not a valid parser class name", name),
            )?;
        }
        self.parser_name.replace(name.to_owned());
        Ok(())
    }

    pub fn namespace(&mut self, name: &str, pos: Pos) -> Result<(), Abort> {
        if !verify_ident(name) {
            self.reporter.error(
                diag::E_BAD_IDENT,
                Some(pos),
                format!("`{}' is not a valid namespace", name),
            )?;
        }
        self.namespace.replace(name.to_owned());
        Ok(())
    }

    fn end(mut self) -> Result<Grammar, Abort> {
        // Anything never used as a left-hand side is a terminal.
        for symbol in self.symbols.values_mut() {
            if matches!(symbol.kind, SymbolKind::Unknown) {
                symbol.kind = SymbolKind::Terminal;
            }
        }

        // A node symbol in a right-hand side stands for its base: node
        // symbols delegate, they never own grammar positions themselves.
        for production in self.productions.values_mut() {
            for symbol in &mut production.right {
                while let SymbolKind::Node { base } = self.symbols[&*symbol].kind {
                    *symbol = base;
                }
            }
        }

        if self.script_loaded {
            // Rule 1 check: the lexer must produce every terminal the grammar
            // consumes. Quoted literals match themselves and are exempt.
            let undefined: Vec<String> = self
                .symbols
                .values()
                .filter(|s| {
                    matches!(s.kind, SymbolKind::Terminal)
                        && !s.defined
                        && !s.name.starts_with('\'')
                })
                .map(|s| s.name.clone())
                .collect();
            for name in undefined {
                self.reporter.error(
                    diag::E_UNDEFINED_TOKEN,
                    None,
                    format!("lexer script should define symbol {}", name),
                )?;
            }
        }

        let start = match (self.start, self.start_name.take()) {
            (_, Some((name, pos))) => match self.names.get(&name) {
                Some(&id) if matches!(self.symbols[&id].kind, SymbolKind::Nonterminal) => id,
                _ => {
                    return Err(self.reporter.fatal(
                        diag::E_UNDEFINED_START,
                        Some(pos),
                        format!("start symbol `{}' is not a nonterminal", name),
                    ))
                }
            },
            (Some(id), None) => id,
            (None, None) => match self.productions.values().next() {
                Some(p) => p.left,
                None => {
                    return Err(self.reporter.fatal(
                        diag::E_EMPTY_GRAMMAR,
                        None,
                        "grammar contains no productions",
                    ))
                }
            },
        };

        self.productions.insert(
            ProductionID::ACCEPT,
            Production {
                left: SymbolID::START,
                right: vec![start, SymbolID::EOI],
                aliases: Map::default(),
                actions_only: false,
                precedence: None,
                action: None,
            },
        );

        let mut nullables = Set::default();
        loop {
            let mut changed = false;
            for p in self.productions.values() {
                if p.right.iter().all(|s| nullables.contains(s)) {
                    changed |= nullables.insert(p.left);
                }
            }
            if !changed {
                break;
            }
        }

        Ok(Grammar {
            symbols: self.symbols,
            names: self.names,
            productions: self.productions,
            actions: self.actions,
            start_symbol: start,
            nullables,
            parser_name: self.parser_name,
            namespace: self.namespace,
        })
    }
}

fn lower(def: &mut GrammarDef<'_>, ast: &ast::Grammar, base_dir: &Path) -> Result<(), Abort> {
    for stmt in &ast.stmts {
        match stmt {
            ast::Stmt::Parser(decl) => {
                let path = base_dir.join(&decl.token_script);
                let decls = syntax::tokens::load(&path).map_err(|err| {
                    def.reporter.fatal(
                        diag::E_IO,
                        Some(decl.pos),
                        format!("cannot load token script {}: {}", path.display(), err),
                    )
                })?;
                for token in &decls {
                    def.script_terminal(&token.name)?;
                }
                if let Some(class_name) = &decl.class_name {
                    def.parser_name(class_name, decl.pos)?;
                }
            }

            ast::Stmt::Namespace(decl) => {
                def.namespace(&decl.name, decl.pos)?;
            }

            ast::Stmt::Start(decl) => {
                def.start_name(&decl.name, decl.pos);
            }

            ast::Stmt::Prec(decl) => {
                def.precedence(
                    decl.assoc,
                    decl.strength,
                    decl.names.iter().map(String::as_str),
                );
            }

            ast::Stmt::Rule(decl) => {
                let left = def.intern(&decl.left);
                for production in &decl.productions {
                    lower_production(def, left, production)?;
                }
            }
        }
    }
    Ok(())
}

fn lower_production(
    def: &mut GrammarDef<'_>,
    left: SymbolID,
    production: &ast::Production,
) -> Result<(), Abort> {
    let mut right = Vec::new();
    let mut aliases = Map::default();
    let mut precedence = None;
    let mut action = None;

    for (i, elem) in production.elems.iter().enumerate() {
        let is_last = i + 1 == production.elems.len();
        match elem {
            ast::Elem::Symbol { name, .. } => {
                let id = def.intern(name);
                right.push(id);
                if !name.starts_with('\'') {
                    aliases.insert(name.clone(), right.len());
                }
            }

            ast::Elem::Prec { name, pos } => {
                if right.is_empty() {
                    def.reporter.error(
                        diag::E_PREC_FIRST,
                        Some(*pos),
                        "%prec may not start a right-hand side",
                    )?;
                    continue;
                }
                let id = def.intern(name);
                match def.symbol_precedence(id) {
                    Some(prec) => precedence = Some(prec),
                    None => {
                        def.reporter.error(
                            diag::E_NO_PRECEDENCE,
                            Some(*pos),
                            format!("`{}' has no declared precedence", name),
                        )?;
                    }
                }
            }

            ast::Elem::Action { body, .. } => {
                if is_last {
                    action = Some(def.add_action(SemanticAction::Inline {
                        body: body.clone(),
                    }));
                } else {
                    let marker = def.marker(body.clone())?;
                    right.push(marker);
                }
            }

            ast::Elem::Node {
                name,
                args,
                init,
                pos,
            } => {
                if !is_last {
                    def.reporter.error(
                        diag::E_MIDRULE_NODE,
                        Some(*pos),
                        format!("simple action %{} must end its production", name),
                    )?;
                    continue;
                }
                let symbol = def.node(name, left, Some(*pos))?;
                action = Some(def.add_action(SemanticAction::Node {
                    symbol,
                    args: args.clone(),
                    init: init.clone(),
                }));
            }
        }
    }

    def.production_ext(left, right, aliases, precedence, action, Some(production.pos))?;
    Ok(())
}

fn verify_ident(mut s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if let Some(stripped) = s.strip_prefix("r#") {
        s = stripped;
    }
    let mut chars = s.chars();
    let first = chars.next().unwrap();
    if first != '_' && !unicode_ident::is_xid_start(first) {
        return false;
    }
    chars.all(unicode_ident::is_xid_continue)
}

/// Grammars shared between unit tests and the benchmark.
pub mod samples {
    use super::*;
    use crate::diag::Abort;

    /// `E : E '+' E | NUM ;`
    pub fn ambiguous_sum(def: &mut GrammarDef<'_>) -> Result<(), Abort> {
        let num = def.terminal("NUM", None)?;
        let plus = def.terminal("'+'", None)?;
        let e = def.nonterminal("E")?;
        def.start_symbol(e);
        def.production(e, [e, plus, e])?;
        def.production(e, [num])?;
        Ok(())
    }

    pub fn arithmetic(def: &mut GrammarDef<'_>) -> Result<(), Abort> {
        let lparen = def.terminal("LPAREN", None)?;
        let rparen = def.terminal("RPAREN", None)?;
        let plus = def.terminal("PLUS", None)?;
        let minus = def.terminal("MINUS", None)?;
        let star = def.terminal("STAR", None)?;
        let slash = def.terminal("SLASH", None)?;
        let num = def.terminal("NUM", None)?;

        let expr = def.nonterminal("expr")?;
        let term = def.nonterminal("term")?;
        let factor = def.nonterminal("factor")?;

        def.start_symbol(expr);

        def.production(expr, [expr, plus, term])?;
        def.production(expr, [expr, minus, term])?;
        def.production(expr, [term])?;

        def.production(term, [term, star, factor])?;
        def.production(term, [term, slash, factor])?;
        def.production(term, [factor])?;

        def.production(factor, [num])?;
        def.production(factor, [lparen, expr, rparen])?;
        Ok(())
    }

    pub fn arithmetic_prec(def: &mut GrammarDef<'_>) -> Result<(), Abort> {
        let prec_add = Some(Precedence::new(0, Assoc::Left));
        let prec_mul = Some(Precedence::new(1, Assoc::Left));

        let plus = def.terminal("PLUS", prec_add)?;
        let minus = def.terminal("MINUS", prec_add)?;
        let star = def.terminal("STAR", prec_mul)?;
        let slash = def.terminal("SLASH", prec_mul)?;
        let num = def.terminal("NUM", None)?;

        let expr = def.nonterminal("expr")?;
        def.start_symbol(expr);

        def.production(expr, [expr, plus, expr])?;
        def.production(expr, [expr, minus, expr])?;
        def.production(expr, [expr, star, expr])?;
        def.production(expr, [expr, slash, expr])?;
        def.production(expr, [num])?;
        Ok(())
    }

    /// The classic grammar that is LALR(1) but not SLR(1):
    /// `S : L '=' R | R ; L : '*' R | ID ; R : L ;`
    pub fn assignments(def: &mut GrammarDef<'_>) -> Result<(), Abort> {
        let eq = def.terminal("'='", None)?;
        let star = def.terminal("'*'", None)?;
        let ident = def.terminal("ID", None)?;

        let s = def.nonterminal("S")?;
        let l = def.nonterminal("L")?;
        let r = def.nonterminal("R")?;

        def.start_symbol(s);

        def.production(s, [l, eq, r])?;
        def.production(s, [r])?;
        def.production(l, [star, r])?;
        def.production(l, [ident])?;
        def.production(r, [l])?;
        Ok(())
    }

    /// `S : A | B ; A : ε ; B : ε ;` — a genuine reduce/reduce conflict.
    pub fn reduce_reduce(def: &mut GrammarDef<'_>) -> Result<(), Abort> {
        let s = def.nonterminal("S")?;
        let a = def.nonterminal("A")?;
        let b = def.nonterminal("B")?;
        def.start_symbol(s);
        def.production(s, [a])?;
        def.production(s, [b])?;
        def.production(a, [])?;
        def.production(b, [])?;
        Ok(())
    }

    /// Nullable-rich grammar exercising ε-propagation in First/Follow.
    pub fn with_nullable(def: &mut GrammarDef<'_>) -> Result<(), Abort> {
        let lparen = def.terminal("LPAREN", None)?;
        let rparen = def.terminal("RPAREN", None)?;
        let plus = def.terminal("PLUS", None)?;
        let dash = def.terminal("DASH", None)?;
        let num = def.terminal("NUM", None)?;

        let expr = def.nonterminal("expr")?;
        let term = def.nonterminal("term")?;
        let nullable = def.nonterminal("nullable")?;

        def.start_symbol(expr);

        def.production(expr, [expr, plus, nullable])?;
        def.production(expr, [term])?;

        def.production(term, [dash])?;
        def.production(term, [lparen, expr, nullable, rparen])?;
        def.production(term, [nullable, dash])?;

        def.production(nullable, [])?;
        def.production(nullable, [num])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Policy;

    fn reporter() -> Reporter {
        Reporter::new(Policy::default())
    }

    #[test]
    fn interning_is_stable() {
        let mut r = reporter();
        let grammar = Grammar::define(&mut r, |def| {
            let a = def.intern("a");
            let b = def.intern("b");
            assert_ne!(a, b);
            assert_eq!(a, def.intern("a"));
            let s = def.nonterminal("s")?;
            def.production(s, [a, b])?;
            Ok(())
        })
        .unwrap();

        let a = grammar.resolve("a").unwrap();
        assert!(grammar.is_terminal(a), "unused symbols default to terminal");
        let s = grammar.resolve("s").unwrap();
        assert!(grammar.is_nonterminal(s));
    }

    #[test]
    fn terminal_lhs_is_fatal() {
        let mut r = reporter();
        let result = Grammar::define(&mut r, |def| {
            let num = def.terminal("NUM", None)?;
            let s = def.nonterminal("s")?;
            def.production(s, [num])?;
            def.production(num, [s])?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(r.diagnostics()[0].code, diag::E_TERMINAL_LHS);
    }

    #[test]
    fn duplicate_production_is_recoverable() {
        let mut r = Reporter::new(Policy {
            keep_going: true,
            verbose: false,
        });
        let grammar = Grammar::define(&mut r, |def| {
            let num = def.terminal("NUM", None)?;
            let s = def.nonterminal("s")?;
            def.production(s, [num])?;
            def.production(s, [num])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(r.error_count(), 1);
        // The duplicate is still recorded; the grammar stays usable.
        assert_eq!(grammar.productions().count(), 3);
    }

    #[test]
    fn precedence_shadowing() {
        let mut r = reporter();
        let grammar = Grammar::define(&mut r, |def| {
            def.precedence(Assoc::Left, None, ["PLUS"]);
            def.precedence(Assoc::Right, Some(7), ["PLUS"]);
            let plus = def.intern("PLUS");
            let num = def.intern("NUM");
            let e = def.nonterminal("e")?;
            def.production(e, [e, plus, e])?;
            def.production(e, [num])?;
            Ok(())
        })
        .unwrap();

        let plus = grammar.resolve("PLUS").unwrap();
        let prec = grammar.symbol(plus).precedence().unwrap();
        assert_eq!(prec.priority, 7);
        assert_eq!(prec.assoc, Assoc::Right);
    }

    #[test]
    fn accept_production_is_installed() {
        let mut r = reporter();
        let grammar = Grammar::define(&mut r, samples::arithmetic).unwrap();
        let accept = grammar.production(ProductionID::ACCEPT);
        assert_eq!(accept.left(), SymbolID::START);
        assert_eq!(accept.right().len(), 2);
        assert_eq!(accept.right()[0], grammar.start_symbol());
        assert_eq!(accept.right()[1], SymbolID::EOI);
    }

    #[test]
    fn nullables_reach_through_chains() {
        let mut r = reporter();
        let grammar = Grammar::define(&mut r, samples::with_nullable).unwrap();
        let nullable = grammar.resolve("nullable").unwrap();
        let expr = grammar.resolve("expr").unwrap();
        assert!(grammar.nullable(nullable));
        assert!(!grammar.nullable(expr));
    }

    #[test]
    fn node_references_in_rules_delegate_to_base() {
        let mut r = reporter();
        let grammar = Grammar::define(&mut r, |def| {
            let num = def.terminal("NUM", None)?;
            let e = def.nonterminal("e")?;
            def.production(e, [num])?;
            let literal = def.node("Literal", e, None)?;
            let s = def.nonterminal("s")?;
            def.start_symbol(s);
            def.production(s, [literal])?;
            Ok(())
        })
        .unwrap();

        let s = grammar.resolve("s").unwrap();
        let e = grammar.resolve("e").unwrap();
        let (_, p) = grammar.productions_of(s).next().unwrap();
        assert_eq!(p.right(), [e]);
    }

    #[test]
    fn empty_grammar_is_fatal() {
        let mut r = reporter();
        let result = Grammar::define(&mut r, |_| Ok(()));
        assert!(result.is_err());
        assert_eq!(r.diagnostics()[0].code, diag::E_EMPTY_GRAMMAR);
    }
}
