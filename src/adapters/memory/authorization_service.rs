use crate::domain::{Role, UserId};
use crate::ports::authorization::{AuthorizationService as AuthorizationServiceTrait, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory implementation of AuthorizationService
///
/// A role table filled from configuration or by tests.
/// Users that were never added are unknown.
pub struct AuthorizationService {
    roles: Mutex<HashMap<UserId, Role>>,
}

impl AuthorizationService {
    pub fn new() -> Self {
        Self {
            roles: Mutex::new(HashMap::new()),
        }
    }

    /// Register a user with the given role
    pub fn add_user(&self, user_id: UserId, role: Role) {
        if let Ok(mut roles) = self.roles.lock() {
            roles.insert(user_id, role);
        }
    }

    /// Forget a user, so later role checks return `None`
    pub fn remove_user(&self, user_id: UserId) {
        if let Ok(mut roles) = self.roles.lock() {
            roles.remove(&user_id);
        }
    }
}

impl Default for AuthorizationService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorizationServiceTrait for AuthorizationService {
    async fn check_role(&self, user_id: UserId) -> Result<Option<Role>> {
        let roles = self.roles.lock().map_err(|_| "role table lock poisoned")?;
        Ok(roles.get(&user_id).copied())
    }
}
