use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use lrtab::{
    automaton::Config,
    encode::{self, Format},
    grammar::Grammar,
    parse_table::ParseTable,
};
use std::{fs, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The path of the grammar rule file.
    grammar: PathBuf,

    /// Where to write the encoded table.
    #[arg(short, long)]
    output: PathBuf,

    /// Table construction algorithm.
    #[arg(short, long, value_enum, default_value = "LR1")]
    algorithm: AlgorithmArg,

    /// Emit the 16-bit compact layout instead of the standard one.
    #[arg(short, long)]
    compact: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum AlgorithmArg {
    #[value(name = "LR1")]
    Lr1,
    #[value(name = "LALR1")]
    Lalr1,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::trace!("CLI args = {:?}", args);

    let grammar = Grammar::from_file(&args.grammar)
        .with_context(|| format!("failed to ingest grammar from {}", args.grammar.display()))?;
    tracing::debug!("grammar:\n{}", grammar);

    let mut config = Config::new();
    match args.algorithm {
        AlgorithmArg::Lr1 => config.use_lr1(),
        AlgorithmArg::Lalr1 => config.use_lalr1(),
    };
    let automaton = config.generate(&grammar);
    tracing::debug!("automaton:\n{}", automaton.display(&grammar));

    let table = ParseTable::generate(&grammar, &automaton).context("table construction failed")?;

    let format = if args.compact {
        Format::Compact
    } else {
        Format::Standard
    };
    // encode fully in memory so a failure never leaves a partial file
    let mut encoded = Vec::new();
    encode::write_table(&table, &grammar, format, &mut encoded)
        .context("failed to encode the parse table")?;
    fs::write(&args.output, &encoded)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    tracing::info!(
        states = automaton.state_count(),
        bytes = encoded.len(),
        "table written"
    );
    Ok(())
}
