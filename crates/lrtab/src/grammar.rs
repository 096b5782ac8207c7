//! Grammar types: interned symbols, productions and FIRST/nullability sets.

use crate::{
    collections::{OrderedSet, SortedMap},
    util::display_with,
};
use std::{fmt, fs, io, path::Path};

/// Name of the reserved end-of-input symbol.
pub const END_OF_INPUT: &str = "$";
/// Name of the reserved empty (epsilon) symbol.
pub const EMPTY: &str = "~";
/// Name of the reserved error symbol.
pub const ERROR: &str = "!";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolId {
    raw: u32,
}

impl SymbolId {
    /// Reserved symbol marking the end of the input stream.
    pub const END_OF_INPUT: Self = Self::new(0);

    /// Reserved symbol standing for the empty string.
    pub const EMPTY: Self = Self::new(1);

    /// Reserved symbol used as an error token.
    pub const ERROR: Self = Self::new(2);

    const RESERVED: u32 = 3;

    pub(crate) const fn new(raw: u32) -> Self {
        Self { raw }
    }

    pub fn index(self) -> usize {
        self.raw as usize
    }

    fn is_reserved(self) -> bool {
        self.raw < Self::RESERVED
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ProductionId {
    raw: u32,
}

impl ProductionId {
    /// The grammar's start production.
    pub const START: Self = Self::new(0);

    pub(crate) const fn new(raw: u32) -> Self {
        Self { raw }
    }

    pub fn index(self) -> usize {
        self.raw as usize
    }
}

/// A grammar symbol. Identity (`name`, `terminal`) is fixed at ingestion;
/// `nullable` and `first` are produced by the FIRST fixed-point pass.
#[derive(Debug)]
pub struct Symbol {
    name: String,
    terminal: bool,
    nullable: bool,
    first: OrderedSet<SymbolId>,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Terminals that can begin a derivation of this symbol.
    pub fn first(&self) -> &OrderedSet<SymbolId> {
        &self.first
    }
}

/// A production rule. Immutable once the grammar is finished.
#[derive(Debug)]
pub struct Production {
    id: ProductionId,
    name: Option<String>,
    left: SymbolId,
    right: Vec<SymbolId>,
}

impl Production {
    pub fn id(&self) -> ProductionId {
        self.id
    }

    /// Optional name, used by consumers to attach a semantic action.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn left(&self) -> SymbolId {
        self.left
    }

    pub fn right(&self) -> &[SymbolId] {
        &self.right
    }

    // `"E -> E + T {add}"`
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_with(move |f| {
            write!(f, "{} ->", g.symbol(self.left).name())?;
            for &sym in &self.right {
                write!(f, " {}", g.symbol(sym).name())?;
            }
            if let Some(name) = &self.name {
                write!(f, " {{{}}}", name)?;
            }
            Ok(())
        })
    }
}

/// A finished grammar: the symbol arena, the name-ordered symbol table and
/// the production list. Obtained from [`GrammarBuilder::finish`] or the
/// grammar-file front end ([`Grammar::from_file`]).
#[derive(Debug)]
pub struct Grammar {
    symbols: Vec<Symbol>,
    table: SortedMap<SymbolId>,
    productions: Vec<Production>,
}

impl Grammar {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GrammarError> {
        let source = fs::read_to_string(path).map_err(GrammarError::Io)?;
        Self::from_str(&source)
    }

    pub fn from_str(source: &str) -> Result<Self, GrammarError> {
        crate::syntax::parse(source)
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn production(&self, id: ProductionId) -> &Production {
        &self.productions[id.index()]
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn production_count(&self) -> usize {
        self.productions.len()
    }

    /// Symbols in arena order (interning order).
    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| (SymbolId::new(i as u32), symbol))
    }

    pub fn productions(&self) -> impl Iterator<Item = (ProductionId, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .map(|(i, production)| (ProductionId::new(i as u32), production))
    }

    /// Look a symbol up by name.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.table.get(name).copied()
    }

    /// Symbols in symbol-table (name) order. This order assigns the
    /// parse-table columns.
    pub fn table_order(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.table.values().copied()
    }

    /// Recompute `nullable` and `first` for every symbol.
    ///
    /// Runs the pass to a fixed point: terminals seed their own FIRST sets,
    /// then every production folds its right-hand FIRSTs into its left
    /// symbol, stopping at the first non-nullable right symbol and marking
    /// the left symbol nullable when the scan falls off the end. Re-running
    /// on a settled grammar changes nothing.
    pub fn build_first_sets(&mut self) {
        for i in 0..self.symbols.len() {
            if self.symbols[i].terminal {
                let id = SymbolId::new(i as u32);
                self.symbols[i].first.insert(id);
            }
        }

        let mut passes = 0usize;
        let mut updated = true;
        while updated {
            updated = false;
            passes += 1;
            for p in 0..self.productions.len() {
                let left = self.productions[p].left;
                let len = self.productions[p].right.len();
                let mut stopped = false;
                for at in 0..len {
                    let sym = self.productions[p].right[at];
                    if sym != left {
                        // lift the destination set out to satisfy the
                        // borrow checker, then put it back
                        let mut first = std::mem::take(&mut self.symbols[left.index()].first);
                        updated |= first.merge(&self.symbols[sym.index()].first) > 0;
                        self.symbols[left.index()].first = first;
                    }
                    if !self.symbols[sym.index()].nullable {
                        stopped = true;
                        break;
                    }
                }
                if !stopped && !self.symbols[left.index()].nullable {
                    self.symbols[left.index()].nullable = true;
                    updated = true;
                }
            }
        }
        tracing::debug!(passes, "first sets settled");
    }

    /// `First(sequence · lookahead)`: union the FIRST of each sequence
    /// symbol until the first non-nullable one; if the whole sequence is
    /// nullable the lookahead's FIRST is unioned in as well.
    pub fn first_of(&self, sequence: &[SymbolId], lookahead: SymbolId) -> OrderedSet<SymbolId> {
        let mut first = OrderedSet::new();
        for &sym in sequence.iter().chain(Some(&lookahead)) {
            first.merge(self.symbol(sym).first());
            if !self.symbol(sym).is_nullable() {
                break;
            }
        }
        first
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## symbols:")?;
        for (_, symbol) in self.symbols() {
            write!(
                f,
                "- {} ({}{})",
                symbol.name(),
                if symbol.is_terminal() {
                    "terminal"
                } else {
                    "non-terminal"
                },
                if symbol.is_nullable() { ", nullable" } else { "" },
            )?;
            if !symbol.first().is_empty() {
                write!(f, " first:")?;
                for &s in symbol.first() {
                    write!(f, " {}", self.symbol(s).name())?;
                }
            }
            writeln!(f)?;
        }

        writeln!(f, "\n## productions:")?;
        for (id, production) in self.productions() {
            writeln!(f, "- {}: {}", id.index(), production.display(self))?;
        }
        Ok(())
    }
}

/// Incremental grammar ingestion.
///
/// Symbols are interned terminal-by-default; nothing is classified until
/// [`finish`](Self::finish), because a symbol only becomes a non-terminal
/// once some rule uses it as a left side, and rules arrive one at a time.
#[derive(Debug)]
pub struct GrammarBuilder {
    symbols: Vec<Symbol>,
    table: SortedMap<SymbolId>,
    productions: Vec<Production>,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            symbols: Vec::new(),
            table: SortedMap::new(),
            productions: Vec::new(),
        };
        builder.intern(END_OF_INPUT);
        let empty = builder.intern(EMPTY);
        builder.intern(ERROR);
        builder.symbols[empty.index()].nullable = true;
        builder
    }

    /// Intern `name`, creating a terminal-by-default symbol on first use.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.table.get(name) {
            return id;
        }
        let id = SymbolId::new(self.symbols.len() as u32);
        tracing::trace!(name, "new symbol");
        self.symbols.push(Symbol {
            name: name.to_owned(),
            terminal: true,
            nullable: false,
            first: OrderedSet::new(),
        });
        self.table.insert(name, id);
        id
    }

    /// Add a production. `name` attaches a semantic-action hook for the
    /// table consumer and must be a valid identifier.
    pub fn production(
        &mut self,
        name: Option<&str>,
        left: SymbolId,
        right: Vec<SymbolId>,
    ) -> Result<ProductionId, GrammarError> {
        if let Some(name) = name {
            if !verify_ident(name) {
                return Err(GrammarError::BadProductionName(name.to_owned()));
            }
        }
        if left.is_reserved() {
            return Err(GrammarError::ReservedLeft(
                self.symbols[left.index()].name.clone(),
            ));
        }
        let id = ProductionId::new(self.productions.len() as u32);
        self.productions.push(Production {
            id,
            name: name.map(str::to_owned),
            left,
            right,
        });
        Ok(id)
    }

    /// Finalize ingestion: classify symbols, terminate the start
    /// production with the end-of-input symbol and compute FIRST sets.
    pub fn finish(self) -> Result<Grammar, GrammarError> {
        let Self {
            mut symbols,
            table,
            mut productions,
        } = self;

        if symbols.len() as u32 <= SymbolId::RESERVED {
            return Err(GrammarError::NoSymbols);
        }
        if productions.is_empty() {
            return Err(GrammarError::NoProductions);
        }

        // a symbol is a non-terminal iff it is some production's left side
        for (i, symbol) in symbols.iter_mut().enumerate() {
            let id = SymbolId::new(i as u32);
            symbol.terminal = !productions.iter().any(|p| p.left == id);
            tracing::trace!(
                name = symbol.name.as_str(),
                terminal = symbol.terminal,
                "classified"
            );
        }

        // the start production must consume the whole input
        let start = &mut productions[ProductionId::START.index()];
        if start.right.last() != Some(&SymbolId::END_OF_INPUT) {
            start.right.push(SymbolId::END_OF_INPUT);
        }

        let mut grammar = Grammar {
            symbols,
            table,
            productions,
        };
        grammar.build_first_sets();
        Ok(grammar)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("syntax error: {0}")]
    Syntax(anyhow::Error),

    #[error("grammar has no symbols")]
    NoSymbols,

    #[error("grammar has no productions")]
    NoProductions,

    #[error("production name `{0}' is not a valid identifier")]
    BadProductionName(String),

    #[error("reserved symbol `{0}' cannot be a rule's left side")]
    ReservedLeft(String),
}

fn verify_ident(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let mut chars = s.chars();
    let first = chars.next().unwrap();
    if first != '_' && !unicode_ident::is_xid_start(first) {
        return false;
    }
    chars.all(unicode_ident::is_xid_continue)
}
