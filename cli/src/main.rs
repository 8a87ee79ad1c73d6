use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Once};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use stackvm_core::vm::{Vm, VmContext, VmError, VmOptions};
use stackvm_stdlib::register_stdlib;

mod loader;

use loader::{default_output_path, ensure_distinct_output, load_unit, write_container};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "stackvm=debug,stackvm_core=info,stackvm_cli=info";

#[derive(Debug, Parser)]
#[command(
    name = "stackvm",
    author,
    version,
    about = "Run, compile and inspect stackvm bytecode",
    long_about = None,
    args_conflicts_with_subcommands = true,
    arg_required_else_help = true
)]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Commands>,

    /// If no subcommand, run FILE (`.json` assembly or `.svmb` container)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    #[command(flatten)]
    run: RunOpts,
}

#[derive(Debug, Clone, Default, Args)]
struct RunOpts {
    /// Print the result as JSON instead of its repr
    #[arg(long)]
    json: bool,

    /// Maximum call depth before RecursionError is raised
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute a code unit and print its result.
    Run {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Assemble a code unit into an `.svmb` container.
    Compile {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Output path (defaults to FILE with an `.svmb` extension)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },
    /// Print the instruction listing of a code unit.
    Disasm {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !["0", "false", "off"].iter().any(|off| trimmed.eq_ignore_ascii_case(off))
}

/// `1`/`true`/`on` select the default filter; anything else is an `EnvFilter` expression.
fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || ["1", "true", "on"].iter().any(|on| trimmed.eq_ignore_ascii_case(on)) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let Ok(raw) = std::env::var("STACKVM_TRACE") else {
        return;
    };
    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let builder = fmt().with_writer(std::io::stderr);
        let builder = match filter_expr_from(&raw).and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };
        let _ = builder.try_init();
    });
}

fn vm_options(opts: &RunOpts) -> VmOptions {
    match opts.max_depth {
        Some(depth) => VmOptions::new().with_max_call_depth(depth),
        None => VmOptions::new(),
    }
}

/// Render a VM failure for stderr: guest exceptions get the traceback report.
fn describe_failure(err: &VmError) -> String {
    match err.failure() {
        Some(failure) => failure.report(),
        None => format!("Error: {err}"),
    }
}

fn run_file(file: &Path, opts: &RunOpts) -> anyhow::Result<ExitCode> {
    let unit = Arc::new(load_unit(file)?);
    let mut ctx = VmContext::new();
    register_stdlib(&mut ctx);
    let mut vm = Vm::with_options(vm_options(opts));

    let result = match vm.execute(&unit, &mut ctx) {
        Ok(result) => result,
        Err(err) => {
            tracing::debug!(target: "stackvm::cli", kind = ?err.kind(), "execution failed");
            eprintln!("{}", describe_failure(&err));
            return Ok(ExitCode::FAILURE);
        }
    };

    if opts.json {
        let json = serde_json::to_string(&result).context("failed to serialize result")?;
        println!("{json}");
    } else {
        println!("{}", result.repr());
    }
    Ok(ExitCode::SUCCESS)
}

fn dispatch(args: CliArgs) -> anyhow::Result<ExitCode> {
    let CliArgs { command, file, run } = args;
    match command {
        Some(Commands::Run { file, opts }) => run_file(&file, &opts),
        Some(Commands::Compile { file, output }) => {
            let unit = load_unit(&file)?;
            let out = output.unwrap_or_else(|| default_output_path(&file));
            ensure_distinct_output(&file, &out)?;
            let written = write_container(&unit, &out)?;
            eprintln!("Wrote {} ({} bytes)", out.display(), written);
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Disasm { file }) => {
            let unit = load_unit(&file)?;
            print!("{}", unit.disassemble());
            Ok(ExitCode::SUCCESS)
        }
        None => match file {
            Some(file) => run_file(&file, &run),
            None => anyhow::bail!("no input file given"),
        },
    }
}

fn main() -> ExitCode {
    maybe_init_tracing();

    match dispatch(CliArgs::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
