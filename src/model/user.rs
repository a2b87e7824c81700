//! User accounts created on the target system.

use serde::{Deserialize, Serialize};

/// Longest login useradd accepts without warnings
pub const MAX_LOGIN_LEN: usize = 31;

/// A user account to create on the installed system.
///
/// Identity is the login: the model never holds two users with the same
/// login, whatever their other attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct User {
    pub login: String,

    /// Full name for the GECOS field
    #[serde(default, rename = "username", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Password hash (crypt(3) format); never a clear-text password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default)]
    pub admin: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
}

impl User {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            ..Self::default()
        }
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password = Some(hash.into());
        self
    }

    /// Check the login against useradd's portable name rules.
    ///
    /// 1-31 characters, starting with a lowercase letter or underscore,
    /// followed by lowercase letters, digits, underscores or hyphens.
    pub fn validate_login(&self) -> Result<(), String> {
        let login = self.login.as_str();

        if login.is_empty() {
            return Err("login must not be empty".to_string());
        }
        if login.len() > MAX_LOGIN_LEN {
            return Err(format!("login must be at most {} characters", MAX_LOGIN_LEN));
        }
        if let Some(first) = login.chars().next() {
            if !(first.is_ascii_lowercase() || first == '_') {
                return Err("login must start with a lowercase letter or underscore".to_string());
            }
        }
        if !login
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(
                "login can only contain lowercase letters, digits, underscores and hyphens"
                    .to_string(),
            );
        }
        if let Some(name) = &self.full_name {
            if name.contains(':') || name.contains('\n') {
                return Err("full name cannot contain ':' or newlines".to_string());
            }
        }

        Ok(())
    }
}
