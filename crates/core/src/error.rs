use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("missing required config key: {0}")]
    MissingConfig(String),
}
