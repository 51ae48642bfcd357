use http::HeaderMap;
use thiserror::Error;

/// `X-Argoos-Token`
pub const TOKEN_HEADER: &str = "x-argoos-token";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Bad Token")]
    AuthenticationFailure,
}

/// Shared-secret check for inbound registry notifications.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    token: Option<String>,
}

impl Authenticator {
    /// A blank or missing token disables authentication.
    pub fn new(token: Option<&str>) -> Self {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Self { token }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let Some(expected) = self.token.as_deref() else {
            return Ok(());
        };

        let presented = headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        if presented.is_empty() || presented != expected {
            return Err(AuthError::AuthenticationFailure);
        }
        Ok(())
    }
}
