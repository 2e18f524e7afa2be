//! The `ark` command line interface.
//!
//! Thin consumer of the compiler and the VM: `run` compiles (when given
//! source) and executes, `compile` emits a `.arkc` container, `dump`
//! disassembles one, `ast` prints the parsed tree as JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ark_bc::Segment;
use ark_drv::Pipeline;
use ark_vm::{State, Vm};

/// ArkScript compiler and virtual machine
#[derive(Parser, Debug)]
#[command(name = "ark")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "ArkScript compiler and virtual machine", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase debug verbosity (-d, -dd, -ddd)
    #[arg(short = 'd', action = clap::ArgAction::Count, global = true)]
    debug: u8,

    /// Prepend a directory to the module search path
    #[arg(short = 'L', long = "lib", global = true)]
    lib: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile (if needed) and execute a program
    Run {
        /// A `.ark` source file or a `.arkc` bytecode file
        file: PathBuf,
    },

    /// Compile a source file to bytecode
    Compile {
        /// Input `.ark` source file
        src: PathBuf,
        /// Output path (defaults to the input with an `.arkc` extension)
        dst: Option<PathBuf>,
    },

    /// Disassemble a bytecode file
    Dump {
        /// A `.arkc` bytecode file
        file: PathBuf,
        /// Segment to display: all, headers, symbols, values or code
        #[arg(long, default_value = "all")]
        segment: String,
        /// Display a single code page
        #[arg(long)]
        page: Option<u16>,
    },

    /// Print the parsed AST
    Ast {
        /// Input `.ark` source file
        file: PathBuf,
        /// Emit JSON (the only supported format)
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Search path: `-L` directories first, then `ARKSCRIPT_PATH` entries.
fn search_paths(cli_paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = cli_paths.to_vec();
    if let Ok(env_paths) = std::env::var("ARKSCRIPT_PATH") {
        paths.extend(env_paths.split([':', ';']).filter(|p| !p.is_empty()).map(PathBuf::from));
    }
    paths
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let paths = search_paths(&cli.lib);
    match cli.command {
        Commands::Run { file } => run(&file, paths),
        Commands::Compile { src, dst } => {
            let dst = dst.unwrap_or_else(|| src.with_extension("arkc"));
            compile_to(&src, &dst, paths)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Dump {
            file,
            segment,
            page,
        } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("unable to read {}", file.display()))?;
            let decoded = ark_bc::read(&bytes)?;
            let segment = match page {
                Some(page) => Segment::Page(page),
                None => parse_segment(&segment)?,
            };
            print!("{}", ark_bc::disassemble(&decoded, segment));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ast { file, json: _ } => {
            let mut pipeline = Pipeline::new(paths);
            let ast = pipeline
                .parse_file(&file)
                .map_err(|e| anyhow!(pipeline.render_error(&e)))?;
            println!("{}", serde_json::to_string_pretty(&ast)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run(file: &PathBuf, paths: Vec<PathBuf>) -> Result<ExitCode> {
    let state = if file.extension().is_some_and(|e| e == "arkc") {
        let bytes =
            std::fs::read(file).with_context(|| format!("unable to read {}", file.display()))?;
        State::from_bytecode(&bytes)?
    } else {
        let mut pipeline = Pipeline::new(paths);
        let program = pipeline
            .compile_file(file)
            .map_err(|e| anyhow!(pipeline.render_error(&e)))?;
        State::from_program(program)
    };

    let vm = Vm::new(state);
    match vm.run() {
        Ok(_) => {
            let code = vm.exit_code();
            Ok(ExitCode::from(u8::try_from(code.clamp(0, 255)).unwrap_or(1)))
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn compile_to(src: &PathBuf, dst: &PathBuf, paths: Vec<PathBuf>) -> Result<()> {
    let mut pipeline = Pipeline::new(paths);
    let program = pipeline
        .compile_file(src)
        .map_err(|e| anyhow!(pipeline.render_error(&e)))?;
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let bytes = ark_bc::emit(&program, timestamp);
    std::fs::write(dst, bytes).with_context(|| format!("unable to write {}", dst.display()))?;
    Ok(())
}

fn parse_segment(name: &str) -> Result<Segment> {
    Ok(match name {
        "all" => Segment::All,
        "headers" => Segment::HeadersOnly,
        "symbols" => Segment::Symbols,
        "values" => Segment::Values,
        "code" => Segment::Code,
        other => {
            return Err(anyhow!(
                "unknown segment `{other}' (expected all, headers, symbols, values or code)"
            ))
        }
    })
}
