use crypto_core::UserKeyPair;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc::Sender, RwLock};

pub mod broadcast;
pub mod message_types;
pub mod session;
pub mod writer;

/// Identity assigned to a connection at registration
///
/// Values start at 0 and increase by one per registration. They are never
/// reused within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(u64);

impl UserId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound half of a session: lines queued here are written by its writer task.
///
/// The queue is bounded; a peer that stops reading fills it and gets skipped.
pub type Outbound = Sender<String>;

/// A connected user as seen by the registry
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub keys: Arc<UserKeyPair>,
    /// Set once the handshake completes; the name is frozen afterwards
    pub joined: bool,
}

/// One registry entry: the user and its transport are inserted and removed together
#[derive(Debug, Clone)]
pub struct Member {
    pub user: User,
    pub outbound: Outbound,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    // registration order
    members: Vec<Member>,
}

/// Directory of live users and their outbound transports
///
/// All mutation goes through `register`, `rename`, `mark_joined` and `remove`.
/// Readers get a `snapshot` copy so fan-out never holds the lock while
/// delivering.
#[derive(Default, Clone)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with the next identity and a `User<id>` placeholder name
    pub async fn register(&self, keys: UserKeyPair, outbound: Outbound) -> User {
        let mut guard = self.inner.write().await;

        let id = UserId(guard.next_id);
        guard.next_id += 1;

        let user = User {
            id,
            name: format!("User{}", id),
            keys: Arc::new(keys),
            joined: false,
        };
        guard.members.push(Member {
            user: user.clone(),
            outbound,
        });

        tracing::debug!(
            user_id = %id,
            total = guard.members.len(),
            "registered user"
        );

        user
    }

    /// Set the display name chosen during the handshake.
    ///
    /// Returns the new name, or `None` when nothing changed: empty input,
    /// unknown id, or a user that already finished the handshake.
    pub async fn rename(&self, id: UserId, new_name: &str) -> Option<String> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return None;
        }

        let mut guard = self.inner.write().await;
        let member = guard.members.iter_mut().find(|m| m.user.id == id)?;
        if member.user.joined {
            tracing::debug!(user_id = %id, "ignoring rename after handshake");
            return None;
        }

        member.user.name = new_name.to_string();
        Some(member.user.name.clone())
    }

    pub async fn mark_joined(&self, id: UserId) -> bool {
        let mut guard = self.inner.write().await;
        match guard.members.iter_mut().find(|m| m.user.id == id) {
            Some(member) => {
                member.user.joined = true;
                true
            }
            None => false,
        }
    }

    /// Remove a user and its transport; removing twice is a no-op.
    ///
    /// Returns the number of users left, counted under the same lock as the
    /// removal, or `None` when the id was not registered.
    pub async fn remove(&self, id: UserId) -> Option<usize> {
        let mut guard = self.inner.write().await;
        let before = guard.members.len();
        guard.members.retain(|m| m.user.id != id);
        let remaining = guard.members.len();

        if remaining == before {
            return None;
        }
        tracing::debug!(user_id = %id, remaining, "removed user");
        Some(remaining)
    }

    /// Point-in-time copy of all live members in registration order
    pub async fn snapshot(&self) -> Vec<Member> {
        self.inner.read().await.members.clone()
    }

    pub async fn get(&self, id: UserId) -> Option<User> {
        let guard = self.inner.read().await;
        guard
            .members
            .iter()
            .find(|m| m.user.id == id)
            .map(|m| m.user.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.members.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
