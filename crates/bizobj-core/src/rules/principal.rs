//! Current-user surface consumed by authorization rules

use std::collections::HashSet;
use std::sync::Arc;

/// Identity and role membership of the current user
pub trait UserInfo: Send + Sync {
    fn user_name(&self) -> &str;

    fn is_in_role(&self, role: &str) -> bool;

    fn is_in_any_role(&self, roles: &[String]) -> bool {
        roles.iter().any(|r| self.is_in_role(r))
    }

    fn is_in_all_roles(&self, roles: &[String]) -> bool {
        roles.iter().all(|r| self.is_in_role(r))
    }
}

/// Supplies the user an operation runs on behalf of
///
/// Returning `None` is valid and denies every role check.
pub trait PrincipalProvider: Send + Sync {
    fn current_user(&self) -> Option<Arc<dyn UserInfo>>;
}

/// User with a fixed name and role set
#[derive(Debug, Clone)]
pub struct SimpleUser {
    name: String,
    roles: HashSet<String>,
}

impl SimpleUser {
    pub fn new<I, S>(name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl UserInfo for SimpleUser {
    fn user_name(&self) -> &str {
        &self.name
    }

    fn is_in_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// No current user
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl PrincipalProvider for Anonymous {
    fn current_user(&self) -> Option<Arc<dyn UserInfo>> {
        None
    }
}

/// Always the same user
#[derive(Clone)]
pub struct FixedPrincipal(Arc<dyn UserInfo>);

impl FixedPrincipal {
    pub fn new(user: impl UserInfo + 'static) -> Self {
        Self(Arc::new(user))
    }
}

impl PrincipalProvider for FixedPrincipal {
    fn current_user(&self) -> Option<Arc<dyn UserInfo>> {
        Some(self.0.clone())
    }
}
