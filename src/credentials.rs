use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::utils::encoding::read_text;
use crate::utils::error::AppError;
use crate::Result;

/// Shop login read from a `key=value` file with `email` and `password` keys.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

fn clean(value: &str) -> String {
    value.trim().trim_matches('"').trim().to_string()
}

impl Credentials {
    pub fn parse(content: &str) -> Result<Self> {
        let pairs: HashMap<String, String> = content
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_lowercase(), clean(value)))
            .collect();

        let email = pairs.get("email").cloned().unwrap_or_default();
        let password = pairs.get("password").cloned().unwrap_or_default();
        if email.is_empty() || password.is_empty() {
            return Err(AppError::Credentials("email/password missing or empty".to_string()));
        }
        Ok(Self { email, password })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (content, _) = read_text(path)
            .map_err(|e| AppError::Credentials(format!("cannot read {}: {}", path.display(), e)))?;
        let credentials = Self::parse(&content)?;
        info!(file = %path.display(), email = %credentials.email, "Credentials loaded");
        Ok(credentials)
    }
}
