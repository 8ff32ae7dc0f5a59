use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentChoice {
    Allow,
    Deny,
}

const CUSTOM_ID_PREFIX: &str = "gmshare";

/// Component custom_id for the Allow/Deny pair of one dialog. The dialog id
/// rides inside so a button press routes back to its waiting flow task.
pub fn consent_custom_id(dialog_id: &Uuid, choice: ConsentChoice) -> String {
    let verb = match choice {
        ConsentChoice::Allow => "allow",
        ConsentChoice::Deny => "deny",
    };
    format!("{CUSTOM_ID_PREFIX}:{dialog_id}:{verb}")
}

pub fn parse_consent_custom_id(custom_id: &str) -> Option<(String, ConsentChoice)> {
    let mut parts = custom_id.splitn(3, ':');
    if parts.next()? != CUSTOM_ID_PREFIX {
        return None;
    }
    let dialog_id = parts.next()?.to_string();
    let choice = match parts.next()? {
        "allow" => ConsentChoice::Allow,
        "deny" => ConsentChoice::Deny,
        _ => return None,
    };
    Some((dialog_id, choice))
}

/// In-memory dialog state: one live exchange per author, one pending
/// comment prompt per reactor, and oneshot routes from gateway events back
/// into waiting flow tasks. Durable outcomes land on Member rows only.
#[derive(Default)]
pub struct DialogRegistry {
    author_locks: DashMap<u64, Uuid>,
    comment_waiters: DashMap<u64, oneshot::Sender<String>>,
    consent_waiters: DashMap<String, oneshot::Sender<ConsentChoice>>,
}

impl DialogRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// One in-flight exchange per author: try-lock semantics, no waiting.
    pub fn try_lock_author(
        self: &Arc<Self>,
        author_id: u64,
        dialog_id: Uuid,
    ) -> Option<AuthorLockGuard> {
        let entry = self.author_locks.entry(author_id);
        match entry {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(dialog_id);
                Some(AuthorLockGuard {
                    registry: Arc::clone(self),
                    author_id,
                })
            }
        }
    }

    /// Register interest in the reactor's next DM. Refuses when the reactor
    /// already has a pending prompt.
    pub fn register_comment_waiter(&self, reactor_id: u64) -> Option<oneshot::Receiver<String>> {
        if self.comment_waiters.contains_key(&reactor_id) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.comment_waiters.insert(reactor_id, tx);
        Some(rx)
    }

    pub fn cancel_comment_waiter(&self, reactor_id: u64) {
        self.comment_waiters.remove(&reactor_id);
    }

    /// Route a DM from `user_id` to a waiting dialog. Returns true when the
    /// message was consumed as a dialog reply.
    pub fn deliver_comment(&self, user_id: u64, content: &str) -> bool {
        if let Some((_, tx)) = self.comment_waiters.remove(&user_id) {
            let _ = tx.send(content.to_string());
            return true;
        }
        false
    }

    pub fn register_consent_waiter(&self, dialog_id: &Uuid) -> oneshot::Receiver<ConsentChoice> {
        let (tx, rx) = oneshot::channel();
        self.consent_waiters.insert(dialog_id.to_string(), tx);
        rx
    }

    pub fn cancel_consent_waiter(&self, dialog_id: &Uuid) {
        self.consent_waiters.remove(&dialog_id.to_string());
    }

    /// Route a component interaction to its dialog, if one is waiting.
    pub fn deliver_consent(&self, custom_id: &str) -> bool {
        let Some((dialog_id, choice)) = parse_consent_custom_id(custom_id) else {
            return false;
        };
        if let Some((_, tx)) = self.consent_waiters.remove(&dialog_id) {
            let _ = tx.send(choice);
            return true;
        }
        debug!(dialog_id, "consent interaction for finished dialog ignored");
        false
    }
}

/// Releases the per-author mutex when the dialog's task exits, normally or
/// otherwise.
pub struct AuthorLockGuard {
    registry: Arc<DialogRegistry>,
    author_id: u64,
}

impl Drop for AuthorLockGuard {
    fn drop(&mut self) {
        self.registry.author_locks.remove(&self.author_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_lock_is_exclusive_until_dropped() {
        let reg = DialogRegistry::new();
        let d1 = Uuid::new_v4();
        let guard = reg.try_lock_author(7, d1).expect("first lock");
        assert!(reg.try_lock_author(7, Uuid::new_v4()).is_none());
        drop(guard);
        assert!(reg.try_lock_author(7, Uuid::new_v4()).is_some());
    }

    #[tokio::test]
    async fn comment_roundtrip() {
        let reg = DialogRegistry::new();
        let rx = reg.register_comment_waiter(5).unwrap();
        // Second registration for the same reactor is refused.
        assert!(reg.register_comment_waiter(5).is_none());
        assert!(reg.deliver_comment(5, "wow"));
        assert_eq!(rx.await.unwrap(), "wow");
        // Consumed: a second DM is no longer a dialog reply.
        assert!(!reg.deliver_comment(5, "again"));
    }

    #[tokio::test]
    async fn consent_custom_ids_roundtrip() {
        let reg = DialogRegistry::new();
        let dialog = Uuid::new_v4();
        let rx = reg.register_consent_waiter(&dialog);
        let id = consent_custom_id(&dialog, ConsentChoice::Deny);
        assert!(reg.deliver_consent(&id));
        assert_eq!(rx.await.unwrap(), ConsentChoice::Deny);
        assert!(!reg.deliver_consent("gmshare:unknown:allow"));
        assert!(!reg.deliver_consent("other:thing"));
    }
}
