use std::fmt;

use url::Url;

use crate::error::{ApiError, Result};

/// Connection identity for a tracker instance. Immutable once built.
#[derive(Clone)]
pub struct Credentials {
    base_url: Url,
    username: String,
    secret: String,
}

impl Credentials {
    /// `secret` is either the account password or an API token; both are sent
    /// as HTTP Basic credentials.
    pub fn new(
        base_url: impl AsRef<str>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref().trim())?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ApiError::validation(format!(
                "base URL must be an http(s) URL, got {base_url}"
            )));
        }

        let username = username.into();
        if username.trim().is_empty() {
            return Err(ApiError::validation("username must not be empty"));
        }

        let secret = secret.into();
        if secret.is_empty() {
            return Err(ApiError::validation("password or API token must not be empty"));
        }

        Ok(Self {
            base_url,
            username,
            secret,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_credentials() {
        let creds =
            Credentials::new("https://example.atlassian.net", "me@example.com", "tok").unwrap();
        assert_eq!(creds.base_url().host_str(), Some("example.atlassian.net"));
        assert_eq!(creds.username(), "me@example.com");
        assert_eq!(creds.secret(), "tok");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("https://example.atlassian.net", "me", "hunter2").unwrap();
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(matches!(
            Credentials::new("not a url", "me", "tok"),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            Credentials::new("mailto:me@example.com", "me", "tok"),
            Err(ApiError::Validation { .. })
        ));
        assert!(matches!(
            Credentials::new("https://example.atlassian.net", "  ", "tok"),
            Err(ApiError::Validation { .. })
        ));
        assert!(matches!(
            Credentials::new("https://example.atlassian.net", "me", ""),
            Err(ApiError::Validation { .. })
        ));
    }
}
