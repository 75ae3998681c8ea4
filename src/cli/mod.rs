pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use self::commands::{compile, graph, scan};

#[derive(Parser)]
#[command(name = "ilaot")]
#[command(about = "Ahead-of-time native image compiler driver", version, author)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a module to a native image
    Compile {
        /// The primary module description to compile
        #[arg(required = true)]
        input: PathBuf,

        /// Glob pattern matching reference module descriptions
        #[arg(short, long)]
        reference: Option<String>,

        /// The output image (defaults to <input>.native.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// TOML options file applied over the environment flags
        #[arg(long)]
        options: Option<PathBuf>,

        /// Rooting mode: entrypoint, library, or method:<Type::Method>
        #[arg(long, default_value = "entrypoint")]
        root_mode: String,

        /// Write the scanner dependency graph as Graphviz DOT
        #[arg(long)]
        dump_graph: Option<PathBuf>,

        /// Log every method as its compilation begins
        #[arg(long, default_value_t = false)]
        verbose: bool,
    },

    /// Run the scanner only and dump the scan results as JSON
    Scan {
        /// The primary module description to scan
        #[arg(required = true)]
        input: PathBuf,

        /// Glob pattern matching reference module descriptions
        #[arg(short, long)]
        reference: Option<String>,

        /// The output JSON file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rooting mode: entrypoint, library, or method:<Type::Method>
        #[arg(long, default_value = "entrypoint")]
        root_mode: String,
    },

    /// Emit the scanner dependency graph in Graphviz DOT form
    Graph {
        /// The primary module description to scan
        #[arg(required = true)]
        input: PathBuf,

        /// Glob pattern matching reference module descriptions
        #[arg(short, long)]
        reference: Option<String>,

        /// The output DOT file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rooting mode: entrypoint, library, or method:<Type::Method>
        #[arg(long, default_value = "entrypoint")]
        root_mode: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            input,
            reference,
            output,
            options,
            root_mode,
            dump_graph,
            verbose,
        } => compile::execute(input, reference, output, options, root_mode, dump_graph, verbose),

        Commands::Scan {
            input,
            reference,
            output,
            root_mode,
        } => scan::execute(input, reference, output, root_mode),

        Commands::Graph {
            input,
            reference,
            output,
            root_mode,
        } => graph::execute(input, reference, output, root_mode),
    }
}
