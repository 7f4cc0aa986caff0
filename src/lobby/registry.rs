//! Process-wide lobby registry
//!
//! The registry is an explicit store object with process lifetime, injected
//! into the playback engine and the gateway rather than reached through any
//! ambient lookup, so the core stays testable without a live network layer.

use crate::error::{LobbyError, Result};
use crate::lobby::instance::LobbyInstance;
use crate::types::LobbyId;
use std::collections::HashMap;
use std::sync::RwLock;

/// Map of live lobbies by ID
#[derive(Debug, Default)]
pub struct LobbyRegistry {
    lobbies: RwLock<HashMap<LobbyId, LobbyInstance>>,
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created lobby. No two lobbies ever share an id;
    /// ids are v4 UUIDs generated at construction.
    pub fn insert(&self, lobby: LobbyInstance) -> Result<LobbyId> {
        let id = lobby.id();
        let mut lobbies = self
            .lobbies
            .write()
            .map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire lobbies lock".to_string(),
            })?;
        lobbies.insert(id, lobby);
        Ok(id)
    }

    /// Run a closure against a lobby under the read lock
    pub fn with_lobby<R>(
        &self,
        lobby_id: LobbyId,
        f: impl FnOnce(&LobbyInstance) -> R,
    ) -> Result<R> {
        let lobbies = self
            .lobbies
            .read()
            .map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire lobbies lock".to_string(),
            })?;
        let lobby = lobbies
            .get(&lobby_id)
            .ok_or_else(|| LobbyError::LobbyNotFound {
                lobby_id: lobby_id.to_string(),
            })?;
        Ok(f(lobby))
    }

    /// Run a closure against a lobby under the write lock.
    ///
    /// All queue and guard mutation funnels through here, which is what makes
    /// the advance guard's check-and-set atomic across concurrent triggers.
    pub fn with_lobby_mut<R>(
        &self,
        lobby_id: LobbyId,
        f: impl FnOnce(&mut LobbyInstance) -> R,
    ) -> Result<R> {
        let mut lobbies = self
            .lobbies
            .write()
            .map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire lobbies lock".to_string(),
            })?;
        let lobby = lobbies
            .get_mut(&lobby_id)
            .ok_or_else(|| LobbyError::LobbyNotFound {
                lobby_id: lobby_id.to_string(),
            })?;
        Ok(f(lobby))
    }

    /// Remove a lobby. The caller is responsible for canceling any armed
    /// advance timer so no dangling callback mutates a dead lobby.
    pub fn remove(&self, lobby_id: LobbyId) -> Result<Option<LobbyInstance>> {
        let mut lobbies = self
            .lobbies
            .write()
            .map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire lobbies lock".to_string(),
            })?;
        Ok(lobbies.remove(&lobby_id))
    }

    pub fn contains(&self, lobby_id: LobbyId) -> bool {
        self.lobbies
            .read()
            .map(|lobbies| lobbies.contains_key(&lobby_id))
            .unwrap_or(false)
    }

    /// Number of live lobbies
    pub fn active_count(&self) -> usize {
        self.lobbies.read().map(|lobbies| lobbies.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{generate_lobby_id, generate_user_id};

    #[test]
    fn test_insert_and_lookup() {
        let registry = LobbyRegistry::new();
        let mut lobby = LobbyInstance::new();
        lobby.join(generate_user_id(), "alice").unwrap();
        let id = registry.insert(lobby).unwrap();

        let user_count = registry.with_lobby(id, |l| l.user_count()).unwrap();
        assert_eq!(user_count, 1);
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_lookup_missing_lobby_fails() {
        let registry = LobbyRegistry::new();
        let result = registry.with_lobby(generate_lobby_id(), |l| l.user_count());
        assert!(matches!(
            result.unwrap_err().downcast_ref::<LobbyError>(),
            Some(LobbyError::LobbyNotFound { .. })
        ));
    }

    #[test]
    fn test_remove_is_teardown() {
        let registry = LobbyRegistry::new();
        let id = registry.insert(LobbyInstance::new()).unwrap();

        assert!(registry.remove(id).unwrap().is_some());
        assert!(!registry.contains(id));
        assert_eq!(registry.active_count(), 0);

        // Removing again is not an error
        assert!(registry.remove(id).unwrap().is_none());
    }

    #[test]
    fn test_mutation_through_closure() {
        let registry = LobbyRegistry::new();
        let id = registry.insert(LobbyInstance::new()).unwrap();

        registry
            .with_lobby_mut(id, |l| l.join(generate_user_id(), "bob").map(|_| ()))
            .unwrap()
            .unwrap();
        assert_eq!(registry.with_lobby(id, |l| l.user_count()).unwrap(), 1);
    }
}
