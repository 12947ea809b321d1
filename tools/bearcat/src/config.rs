use crate::errors::BearcatError;
use crate::runtime::FileSystem;
use crate::types::EngineKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub type EnvMap = BTreeMap<String, String>;

pub const PACKAGE_ENV: &str = "BEARCAT_PANDAS";
pub const NO_AUTOSTART_ENV: &str = "BEARCAT_NO_AUTOSTART";
pub const OUTPUT_DIR_ENV: &str = "BEARCAT_OUTPUT_DIR";
pub const RUN_LOG_ENV: &str = "BEARCAT_RUN_LOG";
pub const CONFIG_PATH_ENV: &str = "BEARCAT_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub recorder: RecorderConfig,
    pub classifier: ClassifierConfig,
    pub compare: CompareConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Package to wrap; required by the recorder, unused by the comparator.
    pub package: Option<String>,
    pub autostart: bool,
    pub output_dir: PathBuf,
    pub record_native_returns: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub attribute_hooks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompareConfig {
    pub max_render_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub run_log: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recorder: RecorderConfig {
                package: None,
                autostart: true,
                output_dir: PathBuf::from("."),
                record_native_returns: false,
            },
            classifier: ClassifierConfig {
                attribute_hooks: vec!["getattr".to_string(), "getattribute".to_string()],
            },
            compare: CompareConfig {
                max_render_bytes: 16 * 1024,
            },
            logging: LoggingConfig {
                run_log: None,
                max_payload_bytes: crate::logging::DEFAULT_MAX_PAYLOAD_BYTES,
            },
        }
    }
}

impl AppConfig {
    /// The wrapped package, validated against the packages bearcat knows.
    pub fn engine_kind(&self) -> Result<EngineKind, BearcatError> {
        let name = self.recorder.package.as_deref().ok_or_else(|| {
            BearcatError::InvalidConfig(format!(
                "{PACKAGE_ENV} must name the dataframe package to wrap"
            ))
        })?;
        EngineKind::parse_package(name).ok_or_else(|| {
            BearcatError::InvalidConfig(format!(
                "unknown package {name:?}; expected one of {}",
                EngineKind::known_packages().join(", ")
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialAppConfig {
    recorder: Option<PartialRecorderConfig>,
    classifier: Option<PartialClassifierConfig>,
    compare: Option<PartialCompareConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRecorderConfig {
    package: Option<String>,
    autostart: Option<bool>,
    output_dir: Option<PathBuf>,
    record_native_returns: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialClassifierConfig {
    attribute_hooks: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialCompareConfig {
    max_render_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    run_log: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

/// Defaults, then the optional TOML file named by `BEARCAT_CONFIG`, then the
/// environment overrides.
pub fn load_config(
    env: &EnvMap,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<AppConfig, BearcatError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = env.get(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
        let path = absolutize_path(process_cwd, Path::new(path));
        let file_contents = fs.read_to_string(&path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| BearcatError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_env_overrides(&mut cfg, env)?;

    cfg.recorder.output_dir = absolutize_path(process_cwd, &cfg.recorder.output_dir);
    if let Some(run_log) = &cfg.logging.run_log {
        cfg.logging.run_log = Some(absolutize_path(process_cwd, run_log));
    }
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(recorder) = partial.recorder {
        if let Some(package) = recorder.package {
            cfg.recorder.package = Some(package);
        }
        if let Some(autostart) = recorder.autostart {
            cfg.recorder.autostart = autostart;
        }
        if let Some(output_dir) = recorder.output_dir {
            cfg.recorder.output_dir = output_dir;
        }
        if let Some(value) = recorder.record_native_returns {
            cfg.recorder.record_native_returns = value;
        }
    }

    if let Some(classifier) = partial.classifier {
        if let Some(hooks) = classifier.attribute_hooks {
            cfg.classifier.attribute_hooks = hooks;
        }
    }

    if let Some(compare) = partial.compare {
        if let Some(value) = compare.max_render_bytes {
            cfg.compare.max_render_bytes = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(run_log) = logging.run_log {
            cfg.logging.run_log = Some(run_log);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
    }
}

fn apply_env_overrides(cfg: &mut AppConfig, env: &EnvMap) -> Result<(), BearcatError> {
    if let Some(package) = env.get(PACKAGE_ENV) {
        cfg.recorder.package = Some(package.trim().to_string());
    }
    if let Some(raw) = env.get(NO_AUTOSTART_ENV) {
        cfg.recorder.autostart = !parse_env_bool(NO_AUTOSTART_ENV, raw)?;
    }
    if let Some(dir) = env.get(OUTPUT_DIR_ENV).filter(|d| !d.trim().is_empty()) {
        cfg.recorder.output_dir = PathBuf::from(dir);
    }
    if let Some(path) = env.get(RUN_LOG_ENV).filter(|p| !p.trim().is_empty()) {
        cfg.logging.run_log = Some(PathBuf::from(path));
    }
    Ok(())
}

pub fn parse_env_bool(name: &str, raw: &str) -> Result<bool, BearcatError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BearcatError::InvalidConfig(format!(
            "{name} must be a boolean, got {other:?}"
        ))),
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), BearcatError> {
    if cfg
        .classifier
        .attribute_hooks
        .iter()
        .any(|hook| hook.trim().is_empty())
    {
        return Err(BearcatError::InvalidConfig(
            "classifier.attribute_hooks must not contain empty names".to_string(),
        ));
    }

    if cfg.compare.max_render_bytes == 0 {
        return Err(BearcatError::InvalidConfig(
            "compare.max_render_bytes must be greater than zero".to_string(),
        ));
    }

    if cfg.logging.max_payload_bytes == 0 {
        return Err(BearcatError::InvalidConfig(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

pub fn env_to_map(env: &[(std::ffi::OsString, std::ffi::OsString)]) -> EnvMap {
    let mut map = EnvMap::new();
    for (key, value) in env {
        if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}
