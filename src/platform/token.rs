use std::error::Error;
use std::fmt;

use async_trait::async_trait;

/// Failure reported by an [`AsyncTokenProvider`] while minting or refreshing
/// an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenError {
    message: String,
}

impl TokenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn from_error(err: impl Error) -> Self {
        Self::new(err.to_string())
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for TokenError {}

/// Source of OAuth2 access tokens for REST calls.
///
/// Implement this over a service-account signer, a user session or a metadata
/// server. `force_refresh` is set after the server rejected the last token.
/// `Ok(None)` sends the request unauthenticated.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait AsyncTokenProvider: Send + Sync {
    async fn get_token(&self, force_refresh: bool) -> Result<Option<String>, TokenError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_source_error_message() {
        let source = std::io::Error::new(std::io::ErrorKind::Other, "metadata server unreachable");
        let err = TokenError::from_error(source);
        assert_eq!(err.message(), "metadata server unreachable");
        assert_eq!(err.to_string(), "metadata server unreachable");
    }
}
