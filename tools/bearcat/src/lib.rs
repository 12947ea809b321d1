pub mod capture;
pub mod classifier;
pub mod config;
pub mod demo;
pub mod engines;
pub mod equivalence;
pub mod errors;
pub mod logging;
pub mod replay;
pub mod runtime;
pub mod session;
pub mod trace;
pub mod types;
pub mod value;

use clap::{error::ErrorKind, Parser};
use config::{env_to_map, load_config};
use errors::BearcatError;
use replay::comparator::compare_logs;
use runtime::ProductionRuntime;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "bearcat-diff")]
#[command(about = "Compare two bearcat recordings value by value")]
pub struct Cli {
    /// Log recorded against the reference engine.
    pub left: PathBuf,
    /// Log recorded against the engine under test.
    pub right: PathBuf,
}

pub fn run() -> Result<i32, BearcatError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| BearcatError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &env, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    cwd: &std::path::Path,
    runtime: &ProductionRuntime,
) -> Result<i32, BearcatError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(BearcatError::Cli(error.to_string())),
        },
    };

    let env_map = env_to_map(env);
    let cfg = load_config(&env_map, cwd, runtime.file_system.as_ref())?;
    session::init_logging(&cfg);

    let left = cwd.join(&cli.left);
    let right = cwd.join(&cli.right);
    logging::append_run_log(
        "info",
        "compare.started",
        serde_json::json!({
            "left": left.display().to_string(),
            "right": right.display().to_string(),
        }),
    );
    compare_logs(&left, &right, &cfg.compare, runtime.terminal.as_ref())?;
    Ok(0)
}
