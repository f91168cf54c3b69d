use std::fmt;

use super::RemoteError;

/// Basic-auth credentials for the Confluence REST API
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub api_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Where and as whom to migrate
#[derive(Debug, Clone)]
pub struct ConfluenceConfig {
    /// Wiki root, e.g. `https://acme.atlassian.net/wiki`
    pub base_url: String,
    pub credentials: Credentials,
}

impl ConfluenceConfig {
    pub const API_KEY_VAR: &'static str = "CONFLUENCE_API_KEY";
    pub const USER_VAR: &'static str = "CONFLUENCE_USER";
    pub const BASE_URL_VAR: &'static str = "CONFLUENCE_BASE_URL";
    pub const DOMAIN_VAR: &'static str = "JIRA_DOMAIN";

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, RemoteError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RemoteError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| RemoteError::Config(format!("{} is not set", name)))
        };

        let base_url = match lookup(Self::BASE_URL_VAR).filter(|v| !v.trim().is_empty()) {
            Some(url) => url.trim().trim_end_matches('/').to_string(),
            None => format!("https://{}.atlassian.net/wiki", require(Self::DOMAIN_VAR)?),
        };

        Ok(Self {
            base_url,
            credentials: Credentials {
                username: require(Self::USER_VAR)?,
                api_token: require(Self::API_KEY_VAR)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_domain_builds_cloud_url() {
        let config = ConfluenceConfig::from_lookup(lookup(&[
            ("JIRA_DOMAIN", "acme"),
            ("CONFLUENCE_USER", "me@acme.io"),
            ("CONFLUENCE_API_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://acme.atlassian.net/wiki");
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_base_url_overrides_domain() {
        let config = ConfluenceConfig::from_lookup(lookup(&[
            ("CONFLUENCE_BASE_URL", "http://localhost:8090/wiki/"),
            ("CONFLUENCE_USER", "me"),
            ("CONFLUENCE_API_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:8090/wiki");
    }

    #[test]
    fn test_missing_variable_is_named() {
        let err = ConfluenceConfig::from_lookup(lookup(&[("JIRA_DOMAIN", "acme")])).unwrap_err();
        assert!(err.to_string().contains("CONFLUENCE_USER"));
    }
}
