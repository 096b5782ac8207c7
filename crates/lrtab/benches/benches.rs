use criterion::{criterion_group, criterion_main, Criterion};
use lrtab::{automaton::Config, grammar::Grammar};

criterion_main!(benches);
criterion_group!(benches, bench_arithmetic, bench_lookahead_split);

const ARITHMETIC: &str = "\
S -> E;
E -> E + T {add} | E - T {sub} | T;
T -> T * F {mul} | T / F {div} | F;
F -> ( E ) | num | id;
";

const SPLIT: &str = "S -> C C; C -> c C | d;";

fn bench_arithmetic(c: &mut Criterion) {
    bench_automaton(c, "arithmetic", ARITHMETIC);
}

fn bench_lookahead_split(c: &mut Criterion) {
    bench_automaton(c, "lookahead_split", SPLIT);
}

fn bench_automaton(c: &mut Criterion, name: &str, source: &str) {
    let grammar = Grammar::from_str(source).unwrap();

    let mut group = c.benchmark_group(name);
    group.bench_function("LR1", |b| {
        b.iter(|| Config::new().use_lr1().generate(&grammar));
    });
    group.bench_function("LALR1", |b| {
        b.iter(|| Config::new().use_lalr1().generate(&grammar));
    });
    group.finish();
}
