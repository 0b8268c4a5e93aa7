use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream responded with status {0}")]
    Status(u16),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("not configured: {0}")]
    NotConfigured(&'static str),

    #[error("all fetch strategies failed for {0}")]
    Exhausted(String),
}

impl Error {
    /// Short machine-readable tag, surfaced as `reason` in degraded image responses.
    pub fn reason(&self) -> String {
        match self {
            Error::Http(e) if e.is_timeout() => "timeout".to_string(),
            Error::Http(_) => "network".to_string(),
            Error::Status(code) => format!("status_{code}"),
            Error::InvalidUrl(_) => "invalid_url".to_string(),
            Error::Json(_) | Error::FeedParse(_) => "parse".to_string(),
            Error::NotConfigured(_) => "no_token".to_string(),
            Error::Exhausted(_) => "unreachable".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_tags() {
        assert_eq!(Error::Status(403).reason(), "status_403");
        assert_eq!(Error::NotConfigured("FB_ACCESS_TOKEN").reason(), "no_token");
        assert_eq!(Error::Exhausted("x".into()).reason(), "unreachable");
    }
}
