use crate::config::{load_config, AppConfig, EnvMap};
use crate::engines::{package_for, Package};
use crate::errors::BearcatError;
use crate::logging::{append_run_log, init_run_logger, JsonlLogger};
use crate::replay::recorder::Recorder;
use crate::runtime::FileSystem;
use serde_json::json;
use std::path::Path;
use std::rc::Rc;

pub struct Session {
    pub config: AppConfig,
    pub package: Package,
    recorder: Option<Rc<Recorder>>,
}

/// Load configuration and, unless autostart is disabled, open the log and
/// install the recorder on this thread. Every failure here is fatal.
pub fn setup(env: &EnvMap, cwd: &Path, fs: &dyn FileSystem) -> Result<Session, BearcatError> {
    let config = load_config(env, cwd, fs)?;
    init_logging(&config);

    let package = package_for(config.engine_kind()?)?;
    let mut session = Session {
        config,
        package,
        recorder: None,
    };
    if session.config.recorder.autostart {
        session.start_recorder()?;
    } else {
        append_run_log(
            "info",
            "recorder.autostart.disabled",
            json!({ "package": session.package.name() }),
        );
    }
    Ok(session)
}

pub fn init_logging(cfg: &AppConfig) {
    if let Some(path) = &cfg.logging.run_log {
        let mut logger = JsonlLogger::new(path);
        logger.max_payload_bytes = cfg.logging.max_payload_bytes;
        init_run_logger(logger);
    }
}

impl Session {
    /// Start recording if it has not started yet.
    pub fn start_recorder(&mut self) -> Result<Rc<Recorder>, BearcatError> {
        if let Some(recorder) = &self.recorder {
            return Ok(recorder.clone());
        }
        let recorder = Recorder::open(&self.config, &self.package)?;
        recorder.start();
        self.recorder = Some(recorder.clone());
        Ok(recorder)
    }

    pub fn recorder(&self) -> Option<&Rc<Recorder>> {
        self.recorder.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NO_AUTOSTART_ENV, OUTPUT_DIR_ENV, PACKAGE_ENV};
    use crate::runtime::FakeFileSystem;
    use crate::trace::hook_installed;
    use crate::types::EngineKind;

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn setup_requires_a_package() {
        let err = setup(&EnvMap::new(), Path::new("/work"), &FakeFileSystem::default())
            .err()
            .expect("missing package");
        assert!(matches!(err, BearcatError::InvalidConfig(_)));
    }

    #[test]
    fn unknown_package_is_rejected_before_anything_is_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().display().to_string();
        let err = setup(
            &env(&[(PACKAGE_ENV, "modin.pandas"), (OUTPUT_DIR_ENV, &output)]),
            dir.path(),
            &FakeFileSystem::default(),
        )
        .err()
        .expect("unknown package");
        assert!(matches!(err, BearcatError::InvalidConfig(_)));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }

    #[test]
    fn autostart_can_be_deferred() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().display().to_string();
        let mut session = setup(
            &env(&[
                (PACKAGE_ENV, "shard.tabula"),
                (NO_AUTOSTART_ENV, "1"),
                (OUTPUT_DIR_ENV, &output),
            ]),
            dir.path(),
            &FakeFileSystem::default(),
        )
        .expect("setup");
        assert_eq!(session.package.kind, EngineKind::Shard);
        assert!(session.recorder().is_none());
        assert!(!hook_installed());

        let recorder = session.start_recorder().expect("start");
        assert!(hook_installed());
        assert!(recorder.path().starts_with(dir.path()));
        assert!(recorder.path().exists());
        let again = session.start_recorder().expect("start twice");
        assert!(Rc::ptr_eq(&recorder, &again));
    }
}
