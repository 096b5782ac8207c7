//! LR(1)/LALR(1) automaton construction.
//!
//! States are discovered by a worklist fixed point: every pass re-scans the
//! whole state list, computing the GOTO of each state over every symbol
//! that appears after some item's dot, until a full pass adds no state, no
//! transition and (in LALR(1) mode) widens no lookahead set. The full
//! re-scan matters: LALR merging can widen lookaheads on a state whose
//! successors were already built, and the widening has to reach them.

use crate::{
    collections::OrderedSet,
    grammar::{Grammar, ProductionId, SymbolId},
    util::display_with,
};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StateId {
    raw: u32,
}

impl StateId {
    pub(crate) const fn new(raw: u32) -> Self {
        Self { raw }
    }

    pub fn index(self) -> usize {
        self.raw as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.raw, f)
    }
}

/// An LR(1) item: a production, a dot position and the lookahead set under
/// which the production may eventually be reduced.
#[derive(Debug, Clone)]
pub struct Item {
    core: bool,
    production: ProductionId,
    position: usize,
    lookaheads: OrderedSet<SymbolId>,
}

impl Item {
    fn new(core: bool, production: ProductionId, position: usize) -> Self {
        Self {
            core,
            production,
            position,
            lookaheads: OrderedSet::new(),
        }
    }

    /// Whether this item entered its state through a GOTO step rather than
    /// through closure.
    pub fn is_core(&self) -> bool {
        self.core
    }

    pub fn production(&self) -> ProductionId {
        self.production
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn lookaheads(&self) -> &OrderedSet<SymbolId> {
        &self.lookaheads
    }

    /// Same production and dot position; lookaheads ignored.
    pub fn similar(&self, other: &Self) -> bool {
        self.production == other.production && self.position == other.position
    }

    /// Similar, with lookahead sets equal as sets.
    pub fn equivalent(&self, other: &Self) -> bool {
        self.similar(other) && self.lookaheads.set_eq(&other.lookaheads)
    }

    // `"+E -> [ E . + T ] {+ / $}"` (closure items carry the `+` prefix)
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_with(move |f| {
            let production = g.production(self.production);
            if !self.core {
                f.write_str("+")?;
            }
            write!(f, "{} -> [", g.symbol(production.left()).name())?;
            for (i, &sym) in production.right().iter().enumerate() {
                if i == self.position {
                    f.write_str(" .")?;
                }
                write!(f, " {}", g.symbol(sym).name())?;
            }
            if self.position == production.right().len() {
                f.write_str(" .")?;
            }
            f.write_str(" ] {")?;
            for (i, &la) in self.lookaheads.iter().enumerate() {
                if i > 0 {
                    f.write_str(" / ")?;
                }
                f.write_str(g.symbol(la).name())?;
            }
            f.write_str("}")
        })
    }
}

/// Where a transition leads: a real state, or the accept sentinel reached
/// by shifting the end-of-input symbol.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Target {
    Accept,
    State(StateId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Transition {
    symbol: SymbolId,
    target: Target,
}

impl Transition {
    pub fn symbol(&self) -> SymbolId {
        self.symbol
    }

    pub fn target(&self) -> Target {
        self.target
    }
}

#[derive(Debug)]
pub struct State {
    items: OrderedSet<Item>,
    transitions: OrderedSet<Transition>,
}

impl State {
    pub fn items(&self) -> &OrderedSet<Item> {
        &self.items
    }

    pub fn transitions(&self) -> &OrderedSet<Transition> {
        &self.transitions
    }

    pub fn transition_on(&self, symbol: SymbolId) -> Option<Target> {
        self.transitions
            .iter()
            .find(|t| t.symbol == symbol)
            .map(|t| t.target)
    }
}

/// State-matching rule applied while the automaton grows.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Algorithm {
    /// Canonical construction: a candidate joins an existing state only
    /// when cores and lookahead sets both match.
    #[default]
    Lr1,
    /// Candidates join any state with a matching core; lookaheads are
    /// unioned into it.
    Lalr1,
}

/// Automaton generation options.
#[derive(Debug, Default)]
pub struct Config {
    algorithm: Algorithm,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_lr1(&mut self) -> &mut Self {
        self.algorithm = Algorithm::Lr1;
        self
    }

    pub fn use_lalr1(&mut self) -> &mut Self {
        self.algorithm = Algorithm::Lalr1;
        self
    }

    pub fn generate(&self, grammar: &Grammar) -> Automaton {
        Automaton::generate(grammar, self.algorithm)
    }
}

/// The finished automaton. A state's identity is its position in the list;
/// the order is construction order and carries no meaning beyond being
/// stable and unique.
#[derive(Debug)]
pub struct Automaton {
    states: OrderedSet<State>,
}

impl Automaton {
    pub fn generate(grammar: &Grammar, algorithm: Algorithm) -> Self {
        let mut states: OrderedSet<State> = OrderedSet::new();

        let mut start = Item::new(true, ProductionId::START, 0);
        start.lookaheads.insert(SymbolId::END_OF_INPUT);
        let mut items = OrderedSet::new();
        items.push(start);
        close(grammar, &mut items);
        states.push(State {
            items,
            transitions: OrderedSet::new(),
        });

        let mut changed = true;
        while changed {
            changed = false;
            let mut i = 0;
            while i < states.len() {
                for &symbol in current_symbols(grammar, &states[i]).iter() {
                    let target = if symbol == SymbolId::END_OF_INPUT {
                        Target::Accept
                    } else {
                        let candidate = goto_items(grammar, &states[i], symbol);
                        let matched = states.iter().position(|existing| match algorithm {
                            Algorithm::Lr1 => items_equivalent(&existing.items, &candidate),
                            Algorithm::Lalr1 => items_similar(&existing.items, &candidate),
                        });
                        match matched {
                            Some(j) => {
                                if algorithm == Algorithm::Lalr1
                                    && merge_lookaheads(&mut states[j].items, &candidate)
                                {
                                    changed = true;
                                    tracing::trace!(state = j, "lookaheads widened");
                                }
                                Target::State(StateId::new(j as u32))
                            }
                            None => {
                                let id = StateId::new(states.len() as u32);
                                states.push(State {
                                    items: candidate,
                                    transitions: OrderedSet::new(),
                                });
                                changed = true;
                                tracing::trace!(state = id.index(), "state discovered");
                                Target::State(id)
                            }
                        }
                    };

                    let state = &mut states[i];
                    if !state.transitions.contains_by(|t| t.symbol == symbol) {
                        state.transitions.push(Transition { symbol, target });
                        changed = true;
                    }
                }
                i += 1;
            }
        }

        tracing::debug!(states = states.len(), ?algorithm, "automaton settled");
        Self { states }
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.index()]
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states
            .iter()
            .enumerate()
            .map(|(i, state)| (StateId::new(i as u32), state))
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_with(move |f| {
            for (id, state) in self.states() {
                writeln!(f, "state {}:", id)?;
                for item in state.items.iter() {
                    writeln!(f, "  {}", item.display(g))?;
                }
                if !state.transitions.is_empty() {
                    writeln!(f, " transitions:")?;
                    for t in state.transitions.iter() {
                        let name = g.symbol(t.symbol).name();
                        match t.target {
                            Target::Accept => writeln!(f, "  {} -> accept", name)?,
                            Target::State(s) => writeln!(f, "  {} -> {}", name, s)?,
                        }
                    }
                }
            }
            Ok(())
        })
    }
}

/// Close an item set: for every `[A -> alpha . B beta, L]` with
/// non-terminal `B`, add `[B -> . gamma, First(beta, l)]` for every
/// production of `B` and every `l` in `L`, merging lookaheads into an
/// already-present similar item. Runs until nothing changes.
fn close(grammar: &Grammar, items: &mut OrderedSet<Item>) {
    let mut changed = true;
    while changed {
        changed = false;
        let mut i = 0;
        while i < items.len() {
            let production = items[i].production;
            let position = items[i].position;
            let right = grammar.production(production).right();
            let next = match right.get(position) {
                Some(&symbol) if !grammar.symbol(symbol).is_terminal() => symbol,
                _ => {
                    i += 1;
                    continue;
                }
            };
            let tail = &right[position + 1..];
            let lookaheads: Vec<SymbolId> = items[i].lookaheads.iter().copied().collect();
            for lookahead in lookaheads {
                let first = grammar.first_of(tail, lookahead);
                for (id, candidate) in grammar.productions() {
                    if candidate.left() != next {
                        continue;
                    }
                    let existing = items
                        .iter_mut()
                        .find(|item| item.production == id && item.position == 0);
                    match existing {
                        Some(item) => {
                            changed |= item.lookaheads.merge(&first) > 0;
                        }
                        None => {
                            let mut item = Item::new(false, id, 0);
                            item.lookaheads = first.clone();
                            items.push(item);
                            changed = true;
                        }
                    }
                }
            }
            i += 1;
        }
    }
}

/// The GOTO item set of `state` over `symbol`: every item with the dot
/// before `symbol` advances one place, keeping its lookaheads verbatim,
/// and the result is closed.
fn goto_items(grammar: &Grammar, state: &State, symbol: SymbolId) -> OrderedSet<Item> {
    let mut items = OrderedSet::new();
    for item in state.items.iter() {
        let right = grammar.production(item.production).right();
        if right.get(item.position) == Some(&symbol) {
            let mut advanced = Item::new(true, item.production, item.position + 1);
            advanced.lookaheads = item.lookaheads.clone();
            items.push(advanced);
        }
    }
    close(grammar, &mut items);
    items
}

/// Symbols appearing right after a dot in `state`, in first-seen order.
fn current_symbols(grammar: &Grammar, state: &State) -> OrderedSet<SymbolId> {
    let mut symbols = OrderedSet::new();
    for item in state.items.iter() {
        let right = grammar.production(item.production).right();
        if let Some(&symbol) = right.get(item.position) {
            symbols.insert(symbol);
        }
    }
    symbols
}

/// Bijection over items ignoring lookaheads (LALR(1) state matching).
fn items_similar(a: &OrderedSet<Item>, b: &OrderedSet<Item>) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|u| b.iter().filter(|v| u.similar(v)).count() == 1)
}

/// Bijection over items with equal lookahead sets (LR(1) state matching).
fn items_equivalent(a: &OrderedSet<Item>, b: &OrderedSet<Item>) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|u| b.iter().filter(|v| u.equivalent(v)).count() == 1)
}

/// Union each candidate item's lookaheads into the similar item of an
/// existing state. Returns whether any set actually grew.
fn merge_lookaheads(existing: &mut OrderedSet<Item>, candidate: &OrderedSet<Item>) -> bool {
    let mut grown = false;
    for u in existing.iter_mut() {
        for v in candidate.iter() {
            if u.similar(v) {
                grown |= u.lookaheads.merge(&v.lookaheads) > 0;
            }
        }
    }
    grown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr_grammar() -> Grammar {
        Grammar::from_str("S -> E; E -> E + T | T; T -> id;").unwrap()
    }

    fn snapshot(items: &OrderedSet<Item>) -> Vec<(ProductionId, usize, Vec<SymbolId>)> {
        items
            .iter()
            .map(|item| {
                (
                    item.production,
                    item.position,
                    item.lookaheads.iter().copied().collect(),
                )
            })
            .collect()
    }

    #[test]
    fn closing_a_closed_set_changes_nothing() {
        let grammar = expr_grammar();
        let mut start = Item::new(true, ProductionId::START, 0);
        start.lookaheads.insert(SymbolId::END_OF_INPUT);
        let mut items = OrderedSet::new();
        items.push(start);

        close(&grammar, &mut items);
        let before = snapshot(&items);
        close(&grammar, &mut items);
        assert_eq!(before, snapshot(&items));
    }

    #[test]
    fn closure_items_are_marked_non_core() {
        let grammar = expr_grammar();
        let automaton = Automaton::generate(&grammar, Algorithm::Lr1);
        let start = automaton.state(StateId::new(0));
        assert!(start.items()[0].is_core());
        assert!(start.items().iter().skip(1).all(|item| !item.is_core()));
    }

    #[test]
    fn end_of_input_shifts_into_the_accept_sentinel() {
        let grammar = expr_grammar();
        let automaton = Automaton::generate(&grammar, Algorithm::Lr1);
        let accepts: Vec<_> = automaton
            .states()
            .filter_map(|(id, state)| {
                state
                    .transition_on(SymbolId::END_OF_INPUT)
                    .map(|target| (id, target))
            })
            .collect();
        assert_eq!(accepts.len(), 1);
        assert_eq!(accepts[0].1, Target::Accept);
    }

    #[test]
    fn transitions_are_unique_per_symbol() {
        let grammar = expr_grammar();
        let automaton = Automaton::generate(&grammar, Algorithm::Lalr1);
        for (_, state) in automaton.states() {
            for t in state.transitions().iter() {
                let same = state
                    .transitions()
                    .iter()
                    .filter(|other| other.symbol() == t.symbol())
                    .count();
                assert_eq!(same, 1);
            }
        }
    }
}
