use anyhow::Context as _;
use clap::Parser;
use lalrgen::{
    codegen::Codegen,
    diag::{Policy, Reporter},
    grammar::{Grammar, SymbolKind},
    lalr::{self, Mode},
};
use std::{fs, path::PathBuf, process::ExitCode, time::Instant};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Show parser diagnostics while generating (implies keep-going).
    #[arg(short = 'D')]
    diagnostics: bool,

    /// Keep going past reduce/reduce errors instead of aborting.
    #[arg(short = 'K')]
    keep_going: bool,

    /// Skip the LALR(1) look-ahead computation and emit an LR(0)-only table.
    #[arg(short = 'L')]
    lr0_only: bool,

    /// Discard concrete-syntax retention in the emitted parser.
    #[arg(short = 'C')]
    discard_concrete: bool,

    /// Specify the path of the generated source file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// The path of the grammar definition file.
    #[arg(default_value = "test.parser")]
    input: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::debug!("parsed CLI args = {:?}", args);

    let mut reporter = Reporter::new(Policy {
        keep_going: args.keep_going || args.diagnostics,
        verbose: args.diagnostics,
    });

    let result = process_file(&args, &mut reporter);

    for diagnostic in reporter.diagnostics() {
        eprintln!("{}", diagnostic);
    }
    eprintln!("{} error(s)", reporter.error_count());

    match result {
        Ok(()) if reporter.error_count() == 0 => ExitCode::SUCCESS,
        Ok(()) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn process_file(args: &Args, reporter: &mut Reporter) -> anyhow::Result<()> {
    let out_file = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("rs"));
    let backup_file = out_file.with_extension("rs.bak");

    let s = Instant::now();
    let grammar = Grammar::from_file(&args.input, reporter)
        .with_context(|| format!("errored during processing {}", args.input.display()))?;
    tracing::info!("grammar loaded: {:?} elapsed", s.elapsed());

    let mut unused = vec![];
    for (id, symbol) in grammar.symbols() {
        if matches!(symbol.kind(), SymbolKind::Nonterminal)
            && grammar.productions_of(id).next().is_none()
        {
            unused.push(symbol.name().to_owned());
        }
    }
    for name in unused {
        reporter.warning(
            lalrgen::diag::W_UNUSED_NONTERMINAL,
            None,
            format!("nonterminal `{}' has no associated production rule", name),
        );
    }

    let mode = if args.lr0_only { Mode::Lr0 } else { Mode::Lalr };

    let s = Instant::now();
    let table = lalr::compute(&grammar, mode, reporter)
        .context("errored during table construction")?;
    tracing::info!("table computed: {:?} elapsed", s.elapsed());

    if reporter.policy().verbose {
        eprintln!("{}", grammar);
        eprintln!("{}", table.display(&grammar));
    }

    if out_file.exists() {
        fs::copy(&out_file, &backup_file).with_context(|| {
            format!("failed to backup the output file to {}", backup_file.display())
        })?;
    }

    let codegen = Codegen::new(&grammar, &table).keep_concrete(!args.discard_concrete);
    fs::write(&out_file, codegen.to_string())
        .with_context(|| format!("failed to write generated parser to {}", out_file.display()))?;

    Ok(())
}
