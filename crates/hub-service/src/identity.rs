//! Identity of an incoming connection.
//!
//! Token verification happens upstream. By the time a request reaches the
//! acceptor the caller is either described by an [`AuthenticatedUser`]
//! extension (set by in-process middleware) or by a header injected by the
//! authentication gateway. A request with neither is accepted as anonymous.

use crate::errors::HubError;
use axum::http::{HeaderMap, HeaderName};
use common::types::UserId;

/// Verified user attached to a request by authentication middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

/// Resolves the owner of a connection from request headers.
pub trait IdentityResolver: Send + Sync {
    /// `None` means the connection is anonymous.
    fn resolve(&self, headers: &HeaderMap) -> Option<UserId>;
}

/// Trusts a single header carrying the token subject.
#[derive(Debug, Clone)]
pub struct HeaderIdentityResolver {
    header: HeaderName,
}

impl HeaderIdentityResolver {
    /// # Errors
    ///
    /// Returns `HubError::Config` if `header` is not a valid header name.
    pub fn new(header: &str) -> Result<Self, HubError> {
        let header = HeaderName::try_from(header)
            .map_err(|e| HubError::Config(format!("invalid identity header '{header}': {e}")))?;
        Ok(Self { header })
    }
}

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<UserId> {
        headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .and_then(UserId::parse)
    }
}
