//! Request authentication
//!
//! Every RPC method carries an optional username/password pair which is
//! handed to a pluggable [`Authenticator`]. Plain closures of the shape
//! `Fn(Option<&str>, Option<&str>) -> bool` work as authenticators too.

use std::sync::Arc;

use crate::config::{AuthConfig, AuthKind};

/// Credential check used by every service operation
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, username: Option<&str>, password: Option<&str>) -> bool;
}

impl<F> Authenticator for F
where
    F: Fn(Option<&str>, Option<&str>) -> bool + Send + Sync,
{
    fn authenticate(&self, username: Option<&str>, password: Option<&str>) -> bool {
        self(username, password)
    }
}

/// Accepts every request
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl Authenticator for Anonymous {
    fn authenticate(&self, _username: Option<&str>, _password: Option<&str>) -> bool {
        true
    }
}

/// Single configured username/password pair
#[derive(Debug, Clone)]
pub struct SimpleAuth {
    username: String,
    password: String,
}

impl SimpleAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Authenticator for SimpleAuth {
    fn authenticate(&self, username: Option<&str>, password: Option<&str>) -> bool {
        username == Some(self.username.as_str()) && password == Some(self.password.as_str())
    }
}

/// Build the authenticator selected by configuration
pub fn from_config(config: &AuthConfig) -> Arc<dyn Authenticator> {
    match config.kind {
        AuthKind::Anonymous => Arc::new(Anonymous),
        AuthKind::Simple => Arc::new(SimpleAuth::new(
            config.username.clone().unwrap_or_default(),
            config.password.clone().unwrap_or_default(),
        )),
    }
}
