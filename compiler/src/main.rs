use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tally::arch::Architecture;
use tally::plugin::PluginRegistry;
use tally::session::{Session, UnitFailure};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    Value,
    Cost,
    Types,
    Ast,
}

#[derive(Parser, Debug)]
#[command(
    name = "tally",
    version,
    about = "Tally: compiles and evaluates cost-bounded scripts"
)]
struct Cli {
    /// Input source file
    source: PathBuf,

    /// Unit to make importable, named by its file stem (repeatable)
    #[arg(long = "import")]
    imports: Vec<PathBuf>,

    /// Architecture JSON (node costs and cost ceiling)
    #[arg(long)]
    arch: Option<PathBuf>,

    /// Override the cost ceiling
    #[arg(long)]
    ceiling: Option<u64>,

    /// What to print
    #[arg(long, value_enum, default_value_t = EmitStage::Value)]
    emit: EmitStage,

    /// Log pass timings and cost checks
    #[arg(long)]
    verbose: bool,
}

const EXIT_COMPILE: u8 = 1;
const EXIT_IO: u8 = 2;
const EXIT_RUNTIME: u8 = 3;

fn unit_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string())
}

fn read(path: &Path) -> Result<String, ExitCode> {
    std::fs::read_to_string(path).map_err(|e| {
        eprintln!("tally: error: {}: {}", path.display(), e);
        ExitCode::from(EXIT_IO)
    })
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("TALLY_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report(failures: &[UnitFailure], sources: &[(String, String)]) {
    for failure in failures {
        let source = sources
            .iter()
            .find(|(name, _)| *name == failure.name)
            .map(|(_, s)| s.as_str())
            .unwrap_or("");
        for diag in &failure.diagnostics {
            eprintln!("{}", diag.render(&failure.name, source));
        }
    }
}

fn run(cli: Cli) -> Result<(), ExitCode> {
    let mut arch = match &cli.arch {
        Some(path) => Architecture::from_file(path).map_err(|e| {
            eprintln!("tally: error: {}", e);
            ExitCode::from(EXIT_IO)
        })?,
        None => Architecture::default(),
    };
    if let Some(ceiling) = cli.ceiling {
        arch = arch.with_ceiling(ceiling);
    }

    let mut sources = Vec::new();
    for path in cli.imports.iter().chain(std::iter::once(&cli.source)) {
        sources.push((unit_name(path), read(path)?));
    }
    let main = unit_name(&cli.source);
    tracing::debug!(units = sources.len(), ceiling = arch.cost_upper_limit, "starting");

    let mut session = Session::new(arch, PluginRegistry::standard()).map_err(|e| {
        eprintln!("tally: error: {}", e);
        ExitCode::from(EXIT_COMPILE)
    })?;
    let batch: Vec<(&str, &str)> = sources
        .iter()
        .map(|(n, s)| (n.as_str(), s.as_str()))
        .collect();
    if let Err(failures) = session.compile_all(&batch) {
        report(&failures, &sources);
        return Err(ExitCode::from(EXIT_COMPILE));
    }
    let Some(artifact) = session.artifact(&main).cloned() else {
        eprintln!("tally: error: unit '{}' was not compiled", main);
        return Err(ExitCode::from(EXIT_COMPILE));
    };

    match cli.emit {
        EmitStage::Ast => println!("{:#?}", artifact.program),
        EmitStage::Types => print!("{}", artifact.symbols),
        EmitStage::Cost => match &artifact.tree_cost {
            Some(cost) => println!("{}", cost),
            None => println!("0"),
        },
        EmitStage::Value => {
            let value = session.evaluate(&artifact).map_err(|e| {
                eprintln!("{}:<runtime>: error: {}", main, e);
                ExitCode::from(EXIT_RUNTIME)
            })?;
            println!("{}", value);
            if cli.verbose {
                eprintln!(
                    "tally: cost {}",
                    artifact.cost().map_or("symbolic".to_string(), |c| c.to_string())
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}
