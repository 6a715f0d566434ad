use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::model::User;

/// In-memory user storage, shared between handler invocations.
#[derive(Debug, Clone, Default)]
pub struct UserStore {
    users: Arc<RwLock<BTreeMap<String, User>>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, User>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, User>> {
        self.users.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: &str) -> Option<User> {
        self.read().get(id).cloned()
    }

    pub fn find_by_msisdn(&self, msisdn: &str) -> Option<User> {
        self.read().values().find(|u| u.msisdn == msisdn).cloned()
    }

    /// Every user, ordered by id.
    pub fn all(&self) -> Vec<User> {
        self.read().values().cloned().collect()
    }

    /// Insert or replace a user.
    pub fn save(&self, user: User) {
        self.write().insert(user.id.clone(), user);
    }

    /// Insert `user` unless its msisdn is already taken. The check and the
    /// insert happen under one write lock. On conflict the current holder
    /// is returned.
    pub fn insert_unique(&self, user: User) -> Result<(), User> {
        let mut users = self.write();
        if let Some(holder) = users.values().find(|u| u.msisdn == user.msisdn) {
            return Err(holder.clone());
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Option<User> {
        self.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
