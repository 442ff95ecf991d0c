//! Command-line front end for the `pyvm` engine (spec.md §6 "CLI": two entry
//! surfaces, run a file or run a module by dotted name; exit code is the
//! engine's return value interpreted as an integer, an uncaught exception
//! exits nonzero with a formatted traceback). Everything in this binary —
//! argument parsing, module search, logging setup — is explicitly out of
//! scope for the engine itself (spec.md §1), so it all lives here.

mod container;
mod loader;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pyvm::{Frame, Interpreter, PyVersion, RunConfig, RunError, TraceFlags};

#[derive(Parser)]
#[command(name = "pyvm", about = "A cross-version interpreter for Python stack-machine bytecode")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Target Python version, e.g. "3.10" or "2.7". Defaults to the version
    /// recorded in the loaded container.
    #[arg(long, global = true)]
    version: Option<String>,

    /// Maximum call depth before the engine raises RecursionError.
    #[arg(long, global = true)]
    recursion_limit: Option<usize>,

    /// Enable line-level tracing to stderr (spec.md §4.7).
    #[arg(long, global = true)]
    trace_lines: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single file (a bytecode container; see `pyvm-cli`'s loader docs
    /// for why bare source text is rejected without a host compiler).
    Run {
        file: PathBuf,
        /// Extra arguments passed through as the program's argv.
        #[arg(trailing_var_arg = true)]
        argv: Vec<String>,
    },
    /// Run a module by dotted name, searched for along `--path` roots (or
    /// `PYVM_PATH`, colon-separated) the way `sys.path` resolves imports.
    RunModule {
        dotted_name: String,
        #[arg(long, value_delimiter = ':')]
        path: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Run { file, .. } => run_file(&cli, file),
        Command::RunModule { dotted_name, path } => {
            let mut search_path = path.clone();
            if search_path.is_empty() {
                search_path = std::env::var("PYVM_PATH").map(|p| p.split(':').map(PathBuf::from).collect()).unwrap_or_default();
                search_path.push(PathBuf::from("."));
            }
            match loader::resolve_module(dotted_name, &search_path) {
                Ok(file) => run_file(&cli, &file),
                Err(e) => {
                    log::error!("{e}");
                    eprintln!("error: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_file(cli: &Cli, file: &PathBuf) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let loaded = loader::read(file)?;

    let version = match &cli.version {
        Some(v) => parse_version(v)?,
        None => loaded.meta.version,
    };
    log::info!("loaded {} as Python {version} (is_pypy={})", file.display(), loaded.meta.is_pypy);

    let mut config = RunConfig::new(version);
    if let Some(limit) = cli.recursion_limit {
        config = config.with_recursion_limit(limit);
    }
    if cli.trace_lines {
        config = config.with_trace_flags(TraceFlags::LINE);
    }

    let mut interp = Interpreter::new(config);
    let code = loaded.materialize(&mut interp.heap, &mut interp.interns);

    let globals = interp.heap.allocate(pyvm::HeapData::Namespace(pyvm::PyDict::new()));
    let builtins = interp.builtins_for(globals);
    let frame = Frame::new(std::rc::Rc::new(code), globals, builtins, globals, 1);

    match interp.run(frame) {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(RunError::Exception(exc)) => {
            eprintln!("Traceback (most recent call last):");
            print_traceback(&interp, exc.0.traceback);
            eprintln!("{}: {}", exc.0.exc_type, exc.0.message.as_deref().unwrap_or(""));
            Ok(ExitCode::FAILURE)
        }
        Err(RunError::Engine(e)) => Err(Box::new(e)),
    }
}

fn print_traceback(interp: &Interpreter, traceback: Option<pyvm::ObjectId>) {
    use pyvm::HeapData;
    let mut current = traceback;
    while let Some(id) = current {
        if let HeapData::Traceback(entry) = interp.heap.get(id) {
            eprintln!(
                "  File \"{}\", line {}, in {}",
                interp.interns.get(entry.filename),
                entry.line.map_or_else(|| "?".to_string(), |l| l.to_string()),
                interp.interns.get(entry.function_name)
            );
            current = entry.next;
        } else {
            break;
        }
    }
}

fn parse_version(s: &str) -> Result<PyVersion, Box<dyn std::error::Error>> {
    let (major, minor) = s.split_once('.').ok_or_else(|| format!("invalid version {s:?}, expected MAJOR.MINOR"))?;
    let version = PyVersion::new(major.parse()?, minor.parse()?);
    if !version.is_supported() {
        return Err(format!("unsupported Python version {version}").into());
    }
    Ok(version)
}
