use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedfemError {
    #[error("Input error: {0}")]
    Input(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Filename format error: {0}")]
    FilenameFormat(String),
    #[error("Integration data error: {0}")]
    IntegrationData(String),
    #[error("Mesh error: {0}")]
    Mesh(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Post processor error: {0}")]
    PostProcessor(String),
}
