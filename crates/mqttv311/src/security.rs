//! The authorization collaborator: connect-time authentication plus
//! per-topic publish/subscribe permission checks. An absent checker means
//! everything is permitted.

use std::collections::HashMap;

/// Policy hook consulted by the broker dispatch.
///
/// `token` is the authentication token bound to the session at CONNECT
/// time (the username, when one was presented).
pub trait SecurityChecker: Send + Sync {
    fn authenticate(&self, username: Option<&str>, password: Option<&[u8]>) -> bool;

    fn can_publish(&self, token: Option<&str>, topic: &str) -> bool;

    fn can_subscribe(&self, token: Option<&str>, topic: &str) -> bool;
}

/// One grant: what a client identity may do on one exact topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlEntry {
    pub topic: String,
    pub can_publish: bool,
    pub can_subscribe: bool,
}

impl AccessControlEntry {
    #[must_use]
    pub fn new(topic: impl Into<String>, can_publish: bool, can_subscribe: bool) -> Self {
        Self {
            topic: topic.into(),
            can_publish,
            can_subscribe,
        }
    }
}

/// A static `SecurityChecker` built from username/password credentials and
/// per-user access control entries. Topics compare byte for byte; a user
/// with no entry for a topic is denied.
#[derive(Debug, Default)]
pub struct AccessControlList {
    credentials: HashMap<String, Vec<u8>>,
    grants: HashMap<String, Vec<AccessControlEntry>>,
}

impl AccessControlList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user(
        mut self,
        username: impl Into<String>,
        password: impl Into<Vec<u8>>,
        entries: Vec<AccessControlEntry>,
    ) -> Self {
        let username = username.into();
        self.credentials.insert(username.clone(), password.into());
        self.grants.insert(username, entries);
        self
    }

    fn entries(&self, token: Option<&str>) -> &[AccessControlEntry] {
        token
            .and_then(|user| self.grants.get(user))
            .map_or(&[], Vec::as_slice)
    }
}

impl SecurityChecker for AccessControlList {
    fn authenticate(&self, username: Option<&str>, password: Option<&[u8]>) -> bool {
        let Some(username) = username else {
            return false;
        };
        self.credentials
            .get(username)
            .is_some_and(|expected| password == Some(expected.as_slice()))
    }

    fn can_publish(&self, token: Option<&str>, topic: &str) -> bool {
        self.entries(token)
            .iter()
            .any(|entry| entry.topic == topic && entry.can_publish)
    }

    fn can_subscribe(&self, token: Option<&str>, topic: &str) -> bool {
        self.entries(token)
            .iter()
            .any(|entry| entry.topic == topic && entry.can_subscribe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acl() -> AccessControlList {
        AccessControlList::new().with_user(
            "alice",
            &b"secret"[..],
            vec![
                AccessControlEntry::new("sensors/temp", true, true),
                AccessControlEntry::new("commands", false, true),
            ],
        )
    }

    #[test]
    fn test_authenticate() {
        let acl = acl();
        assert!(acl.authenticate(Some("alice"), Some(b"secret")));
        assert!(!acl.authenticate(Some("alice"), Some(b"wrong")));
        assert!(!acl.authenticate(Some("alice"), None));
        assert!(!acl.authenticate(Some("bob"), Some(b"secret")));
        assert!(!acl.authenticate(None, None));
    }

    #[test]
    fn test_topic_grants() {
        let acl = acl();
        assert!(acl.can_publish(Some("alice"), "sensors/temp"));
        assert!(!acl.can_publish(Some("alice"), "commands"));
        assert!(acl.can_subscribe(Some("alice"), "commands"));
        assert!(!acl.can_subscribe(Some("alice"), "other"));
        assert!(!acl.can_publish(None, "sensors/temp"));
    }
}
