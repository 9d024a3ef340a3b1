//! uberts CLI: run and check fact-engine programs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use uberts::config::UbertsConfig;
use uberts::engine::{RunResult, Uberts};
use uberts::fact::Fact;
use uberts::program::Program;
use uberts::score::Adjoints;

#[derive(Parser)]
#[command(name = "uberts", version, about = "Score-driven forward-chaining fact engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program to completion and print the final state.
    Run {
        /// Program file (`def`, `rule`, `x`, ... statements).
        #[arg(long)]
        program: PathBuf,

        /// TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print a JSON report instead of the sorted state.
        #[arg(long)]
        json: bool,

        /// Also print what is left on the agenda.
        #[arg(long)]
        agenda: bool,
    },

    /// Parse a program, compile its rules and print pattern-trie statistics.
    Check {
        #[arg(long)]
        program: PathBuf,
    },

    /// Print the default configuration as TOML.
    DefaultConfig,
}

#[derive(Serialize)]
struct Scored {
    fact: String,
    score: f64,
}

#[derive(Serialize)]
struct Report {
    steps: usize,
    stop: String,
    committed: Vec<Scored>,
    pruned: Vec<Scored>,
    retracted: Vec<String>,
    state: Vec<String>,
}

impl Report {
    fn new(engine: &Uberts, result: &RunResult) -> Self {
        let schema = engine.schema();
        let scored = |items: &[(Fact, Adjoints)]| -> Vec<Scored> {
            items
                .iter()
                .map(|(f, s)| Scored {
                    fact: schema.display_fact(f),
                    score: s.forward(),
                })
                .collect()
        };
        Self {
            steps: result.steps,
            stop: format!("{:?}", result.stop),
            committed: scored(&result.committed),
            pruned: scored(&result.pruned),
            retracted: result.retracted.iter().map(|f| schema.display_fact(f)).collect(),
            state: engine.dump_state().lines().map(str::to_string).collect(),
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            program,
            config,
            json,
            agenda,
        } => {
            let config = match config {
                Some(path) => UbertsConfig::load(&path)?,
                None => UbertsConfig::default(),
            };
            let mut engine = Program::load(&program)?.build(config)?;
            let result = engine.run()?;

            if json {
                let report = Report::new(&engine, &result);
                let out = serde_json::to_string_pretty(&report).into_diagnostic()?;
                println!("{out}");
            } else {
                print!("{}", engine.dump_state());
                if agenda {
                    println!("-- agenda --");
                    print!("{}", engine.dump_agenda());
                }
                eprintln!(
                    "{} steps, {} committed, {} pruned ({:?})",
                    result.steps,
                    result.committed.len(),
                    result.pruned.len(),
                    result.stop
                );
            }
        }

        Commands::Check { program } => {
            let parsed = Program::load(&program)?;
            let engine = parsed.build(UbertsConfig::default())?;
            let stats = engine.trie_stats();
            println!("Program: {}", program.display());
            println!("  statements:        {}", parsed.statements.len());
            println!("  relations:         {}", engine.schema().relations().len());
            println!("  rules:             {}", stats.rules);
            println!("  trie nodes:        {}", stats.nodes);
            println!("  trigger relations: {}", stats.trigger_relations);
            println!("  accepting paths:   {}", stats.accepting_paths);
            println!("  free edges:        {}", stats.free_edges);
            println!("  max depth:         {}", stats.max_depth);
            println!("  initial facts:     {}", engine.state().len());
            println!("  pending:           {}", engine.agenda().len());
        }

        Commands::DefaultConfig => {
            let out = toml::to_string_pretty(&UbertsConfig::default()).into_diagnostic()?;
            print!("{out}");
        }
    }

    Ok(())
}
