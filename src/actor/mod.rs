//! Keyed actors: one serialized owner of state per stable string id.
//!
//! # Data Flow
//! ```text
//! caller ──► ActorRegistry::handle(key) ──► mpsc mailbox ──► actor task
//!   ▲                                                         │
//!   └──────────────────── oneshot reply ◄─────────────────────┘
//! ```
//!
//! # Design Decisions
//! - Exactly one task per key, created lazily under the map's entry lock
//! - The actor task owns its state; there is no lock around it
//! - Messages for a key are handled strictly in arrival order

pub mod counter;
pub mod session;

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

pub use counter::{CounterActor, CounterRegistry};
pub use session::{SessionActor, SessionRecord, SessionRegistry};

/// Mailbox depth per actor.
const MAILBOX_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("actor for key {0:?} is no longer running")]
    Stopped(String),
}

/// A unit of state that processes its messages one at a time.
pub trait Actor: Send + 'static {
    type Message: Send + 'static;

    /// Build the initial state for `key`.
    fn start(key: &str) -> Self;

    fn handle(&mut self, message: Self::Message);
}

/// Address of a running actor.
pub struct ActorHandle<A: Actor> {
    key: Arc<str>,
    tx: mpsc::Sender<A::Message>,
}

impl<A: Actor> fmt::Debug for ActorHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("key", &self.key)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<A: Actor> Clone for ActorHandle<A> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<A: Actor> ActorHandle<A> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Send a message built around a reply channel and wait for the answer.
    pub async fn ask<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> A::Message,
    ) -> Result<R, ActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| ActorError::Stopped(self.key.to_string()))?;
        reply_rx
            .await
            .map_err(|_| ActorError::Stopped(self.key.to_string()))
    }
}

/// Lazily spawns and addresses actors by key.
pub struct ActorRegistry<A: Actor> {
    actors: DashMap<String, ActorHandle<A>>,
}

impl<A: Actor> fmt::Debug for ActorRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRegistry")
            .field("actors", &self.actors.len())
            .finish()
    }
}

impl<A: Actor> Default for ActorRegistry<A> {
    fn default() -> Self {
        Self {
            actors: DashMap::new(),
        }
    }
}

impl<A: Actor> ActorRegistry<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the actor for `key`, spawning it on first use.
    pub fn handle(&self, key: &str) -> ActorHandle<A> {
        if let Some(existing) = self.actors.get(key) {
            return existing.clone();
        }
        self.actors
            .entry(key.to_string())
            .or_insert_with(|| Self::spawn(key))
            .clone()
    }

    /// Address the actor for `key` only if it already exists.
    pub fn existing(&self, key: &str) -> Option<ActorHandle<A>> {
        self.actors.get(key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    fn spawn(key: &str) -> ActorHandle<A> {
        let (tx, mut rx) = mpsc::channel::<A::Message>(MAILBOX_CAPACITY);
        let mut actor = A::start(key);
        let key: Arc<str> = Arc::from(key);
        let task_key = key.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                actor.handle(message);
            }
            tracing::trace!(key = %task_key, "Actor mailbox closed");
        });
        ActorHandle { key, tx }
    }
}
