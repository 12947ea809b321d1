use thiserror::Error;

#[derive(Debug, Error)]
pub enum BearcatError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("initialization error: {0}")]
    Init(String),
    #[error("serialization error: {0}")]
    Serialize(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("engine error: {0}")]
    Engine(String),
    #[error("recorded values differ at position {position}: {detail}")]
    Mismatch { position: usize, detail: String },
}
