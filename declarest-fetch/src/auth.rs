//! Authenticators that decorate requests with credentials.
//!
//! Credentials are resolved once, when the authenticator is built. An empty
//! credential is a configuration error: sending an unauthenticated request
//! because a config key was misspelled is never what anyone wants.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use declarest_core::{Authenticator, Config, CoreError, RequestDescriptor, Template};
use serde::{Deserialize, Serialize};

/// Header used by bearer and basic authentication.
pub const AUTHORIZATION: &str = "Authorization";

fn resolve_secret(template: &Template, config: &Config, what: &str) -> Result<String, CoreError> {
    let secret = template.eval_config(config);
    if secret.is_empty() {
        return Err(CoreError::InvalidConfig(format!(
            "{what} evaluated to an empty string (template {:?})",
            template.source()
        )));
    }
    Ok(secret)
}

// ============================================================================
// No Auth
// ============================================================================

/// Leaves requests untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn apply(&self, request: RequestDescriptor) -> RequestDescriptor {
        request
    }
}

// ============================================================================
// Bearer
// ============================================================================

/// Sends `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct BearerAuthenticator {
    token: String,
}

impl BearerAuthenticator {
    /// Creates an authenticator for a literal token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Resolves the token template against the config.
    pub fn from_template(token: &Template, config: &Config) -> Result<Self, CoreError> {
        Ok(Self::new(resolve_secret(token, config, "bearer token")?))
    }
}

impl fmt::Debug for BearerAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthenticator")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Authenticator for BearerAuthenticator {
    fn apply(&self, request: RequestDescriptor) -> RequestDescriptor {
        request.with_header(AUTHORIZATION, format!("Bearer {}", self.token))
    }
}

// ============================================================================
// API Key
// ============================================================================

/// Where an API key is injected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyLocation {
    /// As a request header.
    #[default]
    Header,
    /// As a query parameter.
    Query,
}

/// Sends an API key in a named header or query parameter.
#[derive(Clone)]
pub struct ApiKeyAuthenticator {
    name: String,
    key: String,
    location: ApiKeyLocation,
}

impl ApiKeyAuthenticator {
    /// Creates an authenticator for a literal key.
    pub fn new(name: impl Into<String>, key: impl Into<String>, location: ApiKeyLocation) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            location,
        }
    }

    /// Resolves the key template against the config.
    pub fn from_template(
        name: impl Into<String>,
        key: &Template,
        location: ApiKeyLocation,
        config: &Config,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::InvalidConfig(
                "API key authenticator needs a header or parameter name".to_string(),
            ));
        }
        let key = resolve_secret(key, config, "API key")?;
        Ok(Self::new(name, key, location))
    }
}

impl fmt::Debug for ApiKeyAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyAuthenticator")
            .field("name", &self.name)
            .field("key", &"<redacted>")
            .field("location", &self.location)
            .finish()
    }
}

impl Authenticator for ApiKeyAuthenticator {
    fn apply(&self, request: RequestDescriptor) -> RequestDescriptor {
        match self.location {
            ApiKeyLocation::Header => request.with_header(&self.name, &self.key),
            ApiKeyLocation::Query => request.with_query_param(&self.name, &self.key),
        }
    }
}

// ============================================================================
// Basic
// ============================================================================

/// Sends `Authorization: Basic base64(username:password)`.
#[derive(Clone)]
pub struct BasicAuthenticator {
    encoded: String,
}

impl BasicAuthenticator {
    /// Creates an authenticator for literal credentials.
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            encoded: STANDARD.encode(format!("{username}:{password}")),
        }
    }

    /// Resolves both templates against the config. The password may be empty.
    pub fn from_templates(
        username: &Template,
        password: &Template,
        config: &Config,
    ) -> Result<Self, CoreError> {
        let username = resolve_secret(username, config, "basic auth username")?;
        let password = password.eval_config(config);
        Ok(Self::new(&username, &password))
    }
}

impl fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthenticator")
            .field("credentials", &"<redacted>")
            .finish()
    }
}

impl Authenticator for BasicAuthenticator {
    fn apply(&self, request: RequestDescriptor) -> RequestDescriptor {
        request.with_header(AUTHORIZATION, format!("Basic {}", self.encoded))
    }
}
