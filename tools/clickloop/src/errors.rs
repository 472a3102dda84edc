use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClickError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("routine parse error: {0}")]
    RoutineParse(String),
    #[error("cannot start input listener: {0}")]
    InputUnavailable(String),
    #[error("pointer device error: {0}")]
    Device(String),
    #[error("player error: {0}")]
    Player(String),
}
