use lrtab::{
    automaton::{Algorithm, Automaton},
    encode::{self, Format, RawAction, TableImage},
    grammar::{Grammar, SymbolId},
    parse_table::{Action, ConflictError, ParseTable},
};
use std::io::Cursor;

const EXPR: &str = "S -> E; E -> E + T {add} | T; T -> id;";

// LR(1) needs distinct lookahead contexts for `C`, LALR(1) folds them
const KNUTH: &str = "S -> C C; C -> c C | d;";

// the `a` path only reaches `X` after three shifts, so its lookaheads merge
// into a `d`-state whose successors were already built and visited; the
// widening has to reach them on a later pass
const DEEP: &str = "S -> T; T -> b X c | a a a X; X -> d Y; Y -> e;";

fn table_for(source: &str, algorithm: Algorithm) -> (Grammar, Automaton, ParseTable) {
    let grammar = Grammar::from_str(source).unwrap();
    let automaton = Automaton::generate(&grammar, algorithm);
    let table = ParseTable::generate(&grammar, &automaton).unwrap();
    (grammar, automaton, table)
}

fn raw(action: Action) -> RawAction {
    match action {
        Action::Error => RawAction::Error,
        Action::Accept => RawAction::Accept,
        Action::Shift(s) => RawAction::Shift(s.index() as u32),
        Action::Reduce(p) => RawAction::Reduce(p.index() as u32),
        Action::Goto(s) => RawAction::Goto(s.index() as u32),
    }
}

#[test]
fn terminals_are_their_own_first_set() {
    let grammar = Grammar::from_str(EXPR).unwrap();
    for (id, symbol) in grammar.symbols() {
        if symbol.is_terminal() {
            assert_eq!(symbol.first().as_slice(), &[id], "{}", symbol.name());
            if id != SymbolId::EMPTY {
                assert!(!symbol.is_nullable());
            }
        }
    }
    assert!(grammar.symbol(SymbolId::EMPTY).is_nullable());
}

#[test]
fn first_sets_are_stable_once_settled() {
    let mut grammar = Grammar::from_str(DEEP).unwrap();
    let snapshot = |g: &Grammar| -> Vec<(bool, Vec<SymbolId>)> {
        g.symbols()
            .map(|(_, s)| (s.is_nullable(), s.first().iter().copied().collect()))
            .collect()
    };
    let before = snapshot(&grammar);
    grammar.build_first_sets();
    assert_eq!(before, snapshot(&grammar));
}

#[test]
fn expression_grammar_builds_a_deterministic_table() {
    let (grammar, automaton, table) = table_for(EXPR, Algorithm::Lr1);

    // state 0 shifts `id` and reduces nothing
    let id_col = table.column_of(grammar.lookup("id").unwrap());
    assert!(matches!(table.action(0, id_col), Action::Shift(_)));
    for col in 0..table.column_count() {
        assert!(!matches!(table.action(0, col), Action::Reduce(_)));
    }

    // exactly one accept cell, in the end-of-input column
    let eoi_col = table.column_of(SymbolId::END_OF_INPUT);
    let accepts: Vec<(usize, usize)> = (0..table.row_count())
        .flat_map(|row| (0..table.column_count()).map(move |col| (row, col)))
        .filter(|&(row, col)| table.action(row, col) == Action::Accept)
        .collect();
    assert_eq!(accepts.len(), 1);
    assert_eq!(accepts[0].1, eoi_col);

    // no lookahead splitting in this grammar
    let lalr = Automaton::generate(&grammar, Algorithm::Lalr1);
    assert_eq!(automaton.state_count(), lalr.state_count());
}

#[test]
fn lalr_never_has_more_states_than_lr1() {
    for source in [EXPR, KNUTH, DEEP] {
        let grammar = Grammar::from_str(source).unwrap();
        let lr1 = Automaton::generate(&grammar, Algorithm::Lr1);
        let lalr = Automaton::generate(&grammar, Algorithm::Lalr1);
        assert!(lalr.state_count() <= lr1.state_count(), "{}", source);
    }
}

#[test]
fn lalr_folds_lookahead_split_states() {
    let grammar = Grammar::from_str(KNUTH).unwrap();
    let lr1 = Automaton::generate(&grammar, Algorithm::Lr1);
    let lalr = Automaton::generate(&grammar, Algorithm::Lalr1);
    assert!(lalr.state_count() < lr1.state_count());

    // merging must not create conflicts here
    ParseTable::generate(&grammar, &lalr).unwrap();
}

#[test]
fn lalr_lookahead_growth_reaches_previously_built_states() {
    let (grammar, _, table) = table_for(DEEP, Algorithm::Lalr1);

    // the `Y -> e` reduction has to fire under `c` (b-path) and `$`
    // (a-path) from the same merged state
    let reduce_y = grammar
        .productions()
        .find(|(_, p)| {
            p.right().len() == 1 && grammar.symbol(p.right()[0]).name() == "e"
        })
        .map(|(id, _)| id)
        .unwrap();
    let mut cells: Vec<(usize, usize)> = Vec::new();
    for row in 0..table.row_count() {
        for col in 0..table.column_count() {
            if table.action(row, col) == Action::Reduce(reduce_y) {
                cells.push((row, col));
            }
        }
    }
    let rows: Vec<usize> = cells.iter().map(|&(row, _)| row).collect();
    let mut cols: Vec<usize> = cells.iter().map(|&(_, col)| col).collect();
    cols.sort_unstable();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], rows[1], "merged state reduces from one row");
    let mut expected = vec![
        table.column_of(SymbolId::END_OF_INPUT),
        table.column_of(grammar.lookup("c").unwrap()),
    ];
    expected.sort_unstable();
    assert_eq!(cols, expected);
}

#[test]
fn reduce_reduce_conflict_reports_both_productions() {
    let grammar =
        Grammar::from_str("S -> A; A -> B | C; B -> X {bee}; C -> X {cee}; X -> x;").unwrap();
    let automaton = Automaton::generate(&grammar, Algorithm::Lr1);
    let err = ParseTable::generate(&grammar, &automaton).unwrap_err();
    match err {
        ConflictError::ReduceReduce { first, second, .. } => {
            assert_eq!(first.index, 3);
            assert_eq!(first.name.as_deref(), Some("bee"));
            assert_eq!(second.index, 4);
            assert_eq!(second.name.as_deref(), Some("cee"));
        }
        other => panic!("expected a reduce/reduce conflict, got {}", other),
    }
}

#[test]
fn both_encodings_round_trip() {
    let (grammar, _, table) = table_for(EXPR, Algorithm::Lalr1);

    let mut standard = Vec::new();
    encode::write_table(&table, &grammar, Format::Standard, &mut standard).unwrap();
    let mut compact = Vec::new();
    encode::write_table(&table, &grammar, Format::Compact, &mut compact).unwrap();

    assert_eq!(&standard[..4], encode::STANDARD_MAGIC);
    assert_eq!(&compact[..4], encode::COMPACT_MAGIC);

    let std_image = TableImage::read(&mut Cursor::new(&standard)).unwrap();
    let cpt_image = TableImage::read(&mut Cursor::new(&compact)).unwrap();

    for image in [&std_image, &cpt_image] {
        // production metadata
        assert_eq!(image.productions.len(), grammar.production_count());
        for (record, (_, production)) in image.productions.iter().zip(grammar.productions()) {
            assert_eq!(
                record.left as usize,
                table.column_of(production.left()),
                "left symbol column"
            );
            assert_eq!(record.arity as usize, production.right().len());
        }

        // named productions
        assert_eq!(image.names, vec![(1, "add".to_owned())]);

        // column names in table order
        let expected: Vec<&str> = table
            .header()
            .iter()
            .map(|&s| grammar.symbol(s).name())
            .collect();
        assert_eq!(image.columns, expected);

        // every cell
        assert_eq!(image.rows as usize, table.row_count());
        let expected: Vec<RawAction> = table.cells().iter().map(|&a| raw(a)).collect();
        assert_eq!(image.cells, expected);
    }
}

#[test]
fn compact_limits_do_not_invalidate_the_table() {
    let long_name = "t".repeat(300);
    let source = format!("S -> {};", long_name);
    let (grammar, _, table) = table_for(&source, Algorithm::Lr1);

    let mut out = Vec::new();
    let err = encode::write_table(&table, &grammar, Format::Compact, &mut out).unwrap_err();
    assert!(matches!(err, encode::EncodeError::NameTooLong { .. }));
    assert!(out.is_empty(), "no bytes written on a limit failure");

    // the in-memory table is still encodable in the standard layout
    encode::write_table(&table, &grammar, Format::Standard, &mut out).unwrap();
    assert!(!out.is_empty());
}
