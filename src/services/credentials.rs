use std::sync::RwLock;

use crate::models::Credentials;

/// Active provider account, held in memory only
#[derive(Default)]
pub struct CredentialStore {
    active: RwLock<Option<Credentials>>,
}

impl CredentialStore {
    pub fn new(initial: Option<Credentials>) -> Self {
        Self {
            active: RwLock::new(initial.filter(Credentials::is_complete)),
        }
    }

    pub fn get(&self) -> Option<Credentials> {
        self.active.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, credentials: Credentials) {
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = Some(credentials);
    }

    pub fn clear(&self) {
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_logged_in(&self) -> bool {
        self.active.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}
