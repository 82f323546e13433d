use serde::{Deserialize, Serialize};

/// Role flags carried by an authenticated identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleFlags {
    /// Staff members may subscribe to the admin dashboard stream
    pub is_staff: bool,
}

/// Authenticated context supplied by the identity provider
///
/// Channels never read identity from shared state; callers hand it in on
/// `open` and whenever it changes.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    pub authenticated: bool,
    pub token: Option<String>,
    #[serde(default)]
    pub roles: RoleFlags,
}

impl Identity {
    /// Identity with no credential
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Authenticated identity holding an access token
    pub fn authenticated(token: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            token: Some(token.into()),
            roles: RoleFlags::default(),
        }
    }

    pub fn with_staff(mut self, is_staff: bool) -> Self {
        self.roles.is_staff = is_staff;
        self
    }

    /// Access token, if the identity is authenticated and holds a non-empty one
    pub fn access_token(&self) -> Option<&str> {
        if !self.authenticated {
            return None;
        }
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_staff(&self) -> bool {
        self.roles.is_staff
    }
}

// Keep tokens out of logs.
impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("authenticated", &self.authenticated)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("roles", &self.roles)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_requires_authentication() {
        assert_eq!(Identity::anonymous().access_token(), None);
        assert_eq!(Identity::authenticated("abc").access_token(), Some("abc"));

        let revoked = Identity {
            authenticated: false,
            token: Some("abc".to_string()),
            roles: RoleFlags::default(),
        };
        assert_eq!(revoked.access_token(), None);

        assert_eq!(Identity::authenticated("").access_token(), None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let identity = Identity::authenticated("secret-token").with_staff(true);
        let debug = format!("{:?}", identity);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("is_staff: true"));
    }
}
