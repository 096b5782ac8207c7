//! Parse-table construction and conflict detection.

use crate::{
    automaton::{Automaton, StateId, Target},
    grammar::{Grammar, ProductionId, SymbolId},
    util::display_with,
};
use std::fmt;

/// One table cell. Cells start as `Error` and are written at most once;
/// a second write aborts construction with a [`ConflictError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Error,
    Accept,
    Shift(StateId),
    Reduce(ProductionId),
    Goto(StateId),
}

/// The action grid: one row per automaton state, one column per grammar
/// symbol. Column order is symbol-table (name) order.
#[derive(Debug)]
pub struct ParseTable {
    header: Vec<SymbolId>,
    column_of: Vec<usize>,
    rows: usize,
    actions: Vec<Action>,
}

impl ParseTable {
    pub fn generate(grammar: &Grammar, automaton: &Automaton) -> Result<Self, ConflictError> {
        let header: Vec<SymbolId> = grammar.table_order().collect();
        let mut column_of = vec![0usize; grammar.symbol_count()];
        for (col, &symbol) in header.iter().enumerate() {
            column_of[symbol.index()] = col;
        }

        let cols = header.len();
        let rows = automaton.state_count();
        let mut actions = vec![Action::Error; rows * cols];

        for (id, state) in automaton.states() {
            let row = id.index();
            for item in state.items().iter() {
                let production = grammar.production(item.production());
                match production.right().get(item.position()) {
                    None => {
                        // completed item: reduce under every lookahead
                        for &lookahead in item.lookaheads().iter() {
                            let cell = row * cols + column_of[lookahead.index()];
                            write_cell(
                                &mut actions,
                                cell,
                                Action::Reduce(item.production()),
                                item.production(),
                                grammar,
                                row,
                                lookahead,
                            )?;
                        }
                    }
                    Some(&symbol) => {
                        let target = state.transition_on(symbol).expect(
                            "settled automaton has a transition for every symbol after a dot",
                        );
                        let cell = row * cols + column_of[symbol.index()];
                        if grammar.symbol(symbol).is_terminal() {
                            let incoming = match target {
                                Target::Accept => Action::Accept,
                                Target::State(next) => Action::Shift(next),
                            };
                            write_cell(
                                &mut actions,
                                cell,
                                incoming,
                                item.production(),
                                grammar,
                                row,
                                symbol,
                            )?;
                        } else {
                            // non-terminal columns never carry terminal
                            // actions, so gotos need no conflict check
                            let next = match target {
                                Target::State(next) => next,
                                Target::Accept => unreachable!(
                                    "only the end-of-input symbol reaches the accept sentinel"
                                ),
                            };
                            actions[cell] = Action::Goto(next);
                        }
                    }
                }
            }
        }

        tracing::debug!(rows, cols, "parse table built");
        Ok(Self {
            header,
            column_of,
            rows,
            actions,
        })
    }

    /// Symbols in column order.
    pub fn header(&self) -> &[SymbolId] {
        &self.header
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    pub fn column_of(&self, symbol: SymbolId) -> usize {
        self.column_of[symbol.index()]
    }

    pub fn action(&self, row: usize, column: usize) -> Action {
        self.actions[row * self.header.len() + column]
    }

    /// The whole grid, row-major.
    pub fn cells(&self) -> &[Action] {
        &self.actions
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_with(move |f| {
            for row in 0..self.rows {
                writeln!(f, "state {}:", row)?;
                for (col, &symbol) in self.header.iter().enumerate() {
                    let name = g.symbol(symbol).name();
                    match self.action(row, col) {
                        Action::Error => {}
                        Action::Accept => writeln!(f, "  {} => accept", name)?,
                        Action::Shift(next) => writeln!(f, "  {} => shift({})", name, next)?,
                        Action::Reduce(p) => {
                            writeln!(f, "  {} => reduce({})", name, g.production(p).display(g))?
                        }
                        Action::Goto(next) => writeln!(f, "  {} => goto({})", name, next)?,
                    }
                }
            }
            Ok(())
        })
    }
}

fn write_cell(
    actions: &mut [Action],
    cell: usize,
    incoming: Action,
    item_production: ProductionId,
    grammar: &Grammar,
    state: usize,
    symbol: SymbolId,
) -> Result<(), ConflictError> {
    match actions[cell] {
        Action::Error => {
            actions[cell] = incoming;
            Ok(())
        }
        existing => {
            let err = classify_conflict(grammar, state, symbol, existing, incoming, item_production);
            tracing::debug!(%err, "table construction aborted");
            Err(err)
        }
    }
}

fn classify_conflict(
    grammar: &Grammar,
    state: usize,
    symbol: SymbolId,
    existing: Action,
    incoming: Action,
    item_production: ProductionId,
) -> ConflictError {
    let symbol = grammar.symbol(symbol).name().to_owned();
    match (existing, incoming) {
        (Action::Reduce(first), Action::Reduce(second)) => ConflictError::ReduceReduce {
            state,
            symbol,
            first: ProductionRef::of(grammar, first),
            second: ProductionRef::of(grammar, second),
        },
        (Action::Reduce(p), _) | (_, Action::Reduce(p)) => ConflictError::ShiftReduce {
            state,
            symbol,
            production: ProductionRef::of(grammar, p),
        },
        _ => ConflictError::ShiftShift {
            state,
            symbol,
            production: ProductionRef::of(grammar, item_production),
        },
    }
}

/// A production named the way diagnostics want it: by index, plus the
/// production's name when it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionRef {
    pub index: usize,
    pub name: Option<String>,
}

impl ProductionRef {
    fn of(grammar: &Grammar, id: ProductionId) -> Self {
        Self {
            index: id.index(),
            name: grammar.production(id).name().map(str::to_owned),
        }
    }
}

impl fmt::Display for ProductionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "production {} {{{}}}", self.index, name),
            None => write!(f, "production {}", self.index),
        }
    }
}

/// A table cell received a second action. Construction aborts and the
/// table is discarded; nothing is emitted.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConflictError {
    #[error("reduce/reduce conflict in state {state} on `{symbol}': {first} vs {second}")]
    ReduceReduce {
        state: usize,
        symbol: String,
        first: ProductionRef,
        second: ProductionRef,
    },

    #[error("shift/reduce conflict in state {state} on `{symbol}' involving {production}")]
    ShiftReduce {
        state: usize,
        symbol: String,
        production: ProductionRef,
    },

    #[error("shift/shift collision in state {state} on `{symbol}' in {production}")]
    ShiftShift {
        state: usize,
        symbol: String,
        production: ProductionRef,
    },
}
