use bearcat::config::env_to_map;
use bearcat::demo::run_example_for;
use bearcat::errors::BearcatError;
use bearcat::runtime::ProductionRuntime;
use bearcat::session;

fn run() -> Result<i32, BearcatError> {
    let env = env_to_map(&std::env::vars_os().collect::<Vec<_>>());
    let cwd = std::env::current_dir().map_err(|e| BearcatError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();

    let session = session::setup(&env, &cwd, runtime.file_system.as_ref())?;
    run_example_for(session.package.kind, runtime.terminal.as_ref())?;
    if let Some(recorder) = session.recorder() {
        eprintln!(
            "recorded {} values to {}",
            recorder.records_written(),
            recorder.path().display()
        );
    }
    Ok(0)
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    }
}
