use std::collections::BTreeMap;

use takt_types::{User, UserId};

use crate::error::StateError;

#[derive(Debug, Clone, Default)]
pub struct UserCollection {
    users: BTreeMap<UserId, User>,
}

impl UserCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.users.values().filter(|u| u.active).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn get(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn get_mut(&mut self, id: UserId) -> Result<&mut User, StateError> {
        self.users.get_mut(&id).ok_or(StateError::UserNotFound(id))
    }

    /// User ids and names are both unique.
    pub fn add(&mut self, user: User) -> Result<(), StateError> {
        if self.users.contains_key(&user.id) {
            return Err(StateError::DuplicateUser(user.id));
        }
        if self.users.values().any(|u| u.name.eq_ignore_ascii_case(&user.name)) {
            return Err(StateError::DuplicateUserName(user.name));
        }
        self.users.insert(user.id, user);
        Ok(())
    }

    pub fn remove(&mut self, id: UserId) -> Result<User, StateError> {
        self.users.remove(&id).ok_or(StateError::UserNotFound(id))
    }

    pub fn rename(&mut self, id: UserId, name: String) -> Result<(), StateError> {
        if self
            .users
            .values()
            .any(|u| u.id != id && u.name.eq_ignore_ascii_case(&name))
        {
            return Err(StateError::DuplicateUserName(name));
        }
        self.get_mut(id)?.name = name;
        Ok(())
    }
}
