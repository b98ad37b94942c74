use shared::{
    error::{ApiException, ErrorCode},
    import::ImportError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Rejection reported by the server; displays the server's message as-is.
    #[error("{}", .0.message)]
    Api(#[from] ApiException),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("live feed failed: {0}")]
    Feed(String),
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Import(#[from] ImportError),
}

impl ClientError {
    pub fn api_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api(err) => Some(err.code),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.api_code() == Some(ErrorCode::Unauthorized)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
