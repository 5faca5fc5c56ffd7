use std::fmt;

/// Environment variable holding the primary provider credential
pub const PRIMARY_KEY_VAR: &str = "DEEPSEEK_API_KEY";
/// Environment variable holding the secondary provider credential
pub const SECONDARY_KEY_VAR: &str = "OPENAI_API_KEY";
/// Environment variable holding the GitHub token
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";
/// Environment variable holding the external database URL
pub const DATABASE_URL_VAR: &str = "SUPABASE_URL";
/// Environment variable holding the external database key
pub const DATABASE_KEY_VAR: &str = "SUPABASE_KEY";

/// Credentials read from the environment once at startup
///
/// Never serialized and never read from the config file.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKeys {
    /// Credential for the primary answer provider
    pub primary: Option<String>,
    /// Credential for the secondary answer provider
    pub secondary: Option<String>,
    /// GitHub API token for authenticated requests
    pub github_token: Option<String>,
    /// External database URL
    pub database_url: Option<String>,
    /// External database key
    pub database_key: Option<String>,
}

impl ApiKeys {
    /// Loads API keys from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(get_env_value)
    }

    /// Loads API keys through an arbitrary lookup
    ///
    /// Values are trimmed; blank values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            primary: get(PRIMARY_KEY_VAR),
            secondary: get(SECONDARY_KEY_VAR),
            github_token: get(GITHUB_TOKEN_VAR),
            database_url: get(DATABASE_URL_VAR),
            database_key: get(DATABASE_KEY_VAR),
        }
    }

    /// Whether both halves of the external database configuration are present
    pub fn database_configured(&self) -> bool {
        self.database_url.is_some() && self.database_key.is_some()
    }
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("ApiKeys")
            .field("primary", &mask(&self.primary))
            .field("secondary", &mask(&self.secondary))
            .field("github_token", &mask(&self.github_token))
            .field("database_url", &self.database_url)
            .field("database_key", &mask(&self.database_key))
            .finish()
    }
}

/// Reads an environment variable, returning `None` when unset or empty
pub fn get_env_value(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
