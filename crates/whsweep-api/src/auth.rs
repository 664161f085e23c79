//! Token authentication for the workspace APIs.

use std::fmt;

/// Token provider for workspace authentication.
#[derive(Clone)]
pub enum TokenProvider {
    /// Static personal access token.
    Static(String),

    /// No authentication (mock servers, local gateways).
    None,
}

impl TokenProvider {
    pub fn static_token(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    pub fn from_option(token: Option<&String>) -> Self {
        match token {
            Some(t) if !t.is_empty() => Self::static_token(t.as_str()),
            _ => Self::None,
        }
    }

    /// Value for the `Authorization` header, if any.
    pub fn bearer(&self) -> Option<String> {
        match self {
            Self::Static(token) => Some(format!("Bearer {}", token)),
            Self::None => None,
        }
    }
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("TokenProvider::Static(<redacted>)"),
            Self::None => f.write_str("TokenProvider::None"),
        }
    }
}
