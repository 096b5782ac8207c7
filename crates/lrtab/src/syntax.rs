//! Grammar-file front end.
//!
//! The rule format is line-oriented only in its comments; rules themselves
//! run to the terminating `;`:
//!
//! ```text
//! # expression grammar
//! S -> E;
//! E -> E + T {add}
//!    | T;
//! T -> id;
//! ```
//!
//! `|` separates alternative productions of one rule, `{name}` names the
//! production it follows, and any other whitespace-delimited token is a
//! symbol reference. The reserved names `$`, `~` and `!` resolve to the
//! end-of-input, empty and error symbols.

use crate::grammar::{Grammar, GrammarBuilder, GrammarError};
use anyhow::anyhow;

pub(crate) fn parse(source: &str) -> Result<Grammar, GrammarError> {
    let mut builder = GrammarBuilder::new();

    // comments end at the line break, rules at `;`
    let mut text = String::with_capacity(source.len());
    for line in source.lines() {
        match line.find('#') {
            Some(at) => text.push_str(&line[..at]),
            None => text.push_str(line),
        }
        text.push('\n');
    }

    let mut rest = text.as_str();
    let mut rule_no = 0usize;
    while let Some(at) = rest.find(';') {
        let rule = &rest[..at];
        rest = &rest[at + 1..];
        rule_no += 1;
        parse_rule(&mut builder, rule, rule_no)?;
    }
    if !rest.trim().is_empty() {
        tracing::warn!(rule = rule_no + 1, "ignoring unterminated trailing rule text");
    }

    builder.finish()
}

fn parse_rule(builder: &mut GrammarBuilder, rule: &str, rule_no: usize) -> Result<(), GrammarError> {
    let malformed =
        |msg: &str| GrammarError::Syntax(anyhow!("malformed rule {}: {}", rule_no, msg));

    let mut tokens = rule.split_whitespace();

    let left = tokens.next().ok_or_else(|| malformed("empty rule"))?;
    if left == "->" || left == "|" || left.starts_with('{') {
        return Err(malformed("missing left-side symbol"));
    }
    match tokens.next() {
        Some("->") => {}
        _ => return Err(malformed("missing `->' separator")),
    }

    tracing::debug!(rule = rule_no, left, "rule found");
    let left = builder.intern(left);

    let mut right = Vec::new();
    let mut name: Option<String> = None;
    loop {
        match tokens.next() {
            Some("|") => {
                builder.production(name.as_deref(), left, std::mem::take(&mut right))?;
                name = None;
            }
            Some("->") => return Err(malformed("unexpected `->'")),
            Some(token) if token.starts_with('{') => {
                if name.is_some() {
                    return Err(malformed("production named twice"));
                }
                name = Some(read_name(token, &mut tokens).ok_or_else(|| {
                    malformed("unterminated production name")
                })?);
            }
            Some(token) => right.push(builder.intern(token)),
            None => {
                builder.production(name.as_deref(), left, right)?;
                return Ok(());
            }
        }
    }
}

/// Collect a `{name}` annotation, which the tokenizer may have split if the
/// braces were whitespace-separated from the name.
fn read_name<'a>(
    first: &'a str,
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Option<String> {
    let mut joined = first.to_owned();
    while !joined.ends_with('}') {
        joined.push(' ');
        joined.push_str(tokens.next()?);
    }
    let inner = joined.strip_prefix('{')?.strip_suffix('}')?;
    Some(inner.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use crate::grammar::{Grammar, GrammarError, SymbolId};

    #[test]
    fn classification_is_deferred_to_end_of_ingestion() {
        // `A` is used on a right side before its own rule appears
        let grammar = Grammar::from_str("S -> A x; A -> y;").unwrap();
        let a = grammar.lookup("A").unwrap();
        let x = grammar.lookup("x").unwrap();
        assert!(!grammar.symbol(a).is_terminal());
        assert!(grammar.symbol(x).is_terminal());
    }

    #[test]
    fn comments_and_layout_are_ignored() {
        let grammar = Grammar::from_str(
            "# grammar\nS -> E; # trailing comment\nE -> E + T\n   | T;\nT -> id;",
        )
        .unwrap();
        assert_eq!(grammar.production_count(), 4);
        assert!(grammar.lookup("#").is_none());
    }

    #[test]
    fn named_productions_are_recorded() {
        let grammar = Grammar::from_str("S -> E; E -> E + E {add} | id;").unwrap();
        let named: Vec<_> = grammar
            .productions()
            .filter_map(|(_, p)| p.name())
            .collect();
        assert_eq!(named, ["add"]);
    }

    #[test]
    fn spaced_name_braces_are_accepted() {
        let grammar = Grammar::from_str("S -> E; E -> id { leaf };").unwrap();
        let named: Vec<_> = grammar
            .productions()
            .filter_map(|(_, p)| p.name())
            .collect();
        assert_eq!(named, ["leaf"]);
    }

    #[test]
    fn empty_alternative_yields_an_empty_production() {
        let grammar = Grammar::from_str("S -> A x; A -> y | ;").unwrap();
        let empty = grammar
            .productions()
            .find(|(_, p)| p.right().is_empty())
            .map(|(id, _)| id);
        assert!(empty.is_some());
        let a = grammar.lookup("A").unwrap();
        assert!(grammar.symbol(a).is_nullable());
    }

    #[test]
    fn reserved_names_resolve_to_reserved_symbols() {
        let grammar = Grammar::from_str("S -> E $; E -> ~ | ! ;").unwrap();
        assert_eq!(grammar.lookup("$"), Some(SymbolId::END_OF_INPUT));
        assert_eq!(grammar.lookup("~"), Some(SymbolId::EMPTY));
        assert_eq!(grammar.lookup("!"), Some(SymbolId::ERROR));
    }

    #[test]
    fn missing_arrow_is_a_syntax_error() {
        let err = Grammar::from_str("S E;").unwrap_err();
        assert!(matches!(err, GrammarError::Syntax(_)));
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = Grammar::from_str("# nothing here\n").unwrap_err();
        assert!(matches!(err, GrammarError::NoSymbols));
    }
}
