use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("invalid orchestrator URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("orchestrator URL cannot carry path segments: {0}")]
    OpaqueUrl(Url),

    #[error("cannot derive a websocket address from {0}")]
    WebsocketAddress(Url),

    #[error("invalid authorization header: {0}")]
    AuthHeader(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket failed: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("{0} is not a collection endpoint")]
    NotACollection(String),

    #[error("orchestrator returned no projects")]
    NoProjects,
}

pub type Result<T> = std::result::Result<T, ExporterError>;
