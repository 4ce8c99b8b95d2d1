//! Session state, one authoritative actor per session id.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::actor::{Actor, ActorError, ActorRegistry};

/// Arbitrary caller-supplied session attributes.
pub type Attributes = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: Uuid,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub attributes: Attributes,
}

pub enum SessionMessage {
    Create {
        attributes: Attributes,
        reply: oneshot::Sender<SessionRecord>,
    },
    Get {
        reply: oneshot::Sender<Option<SessionRecord>>,
    },
}

#[derive(Debug)]
pub struct SessionActor {
    id: Option<Uuid>,
    record: Option<SessionRecord>,
}

impl Actor for SessionActor {
    type Message = SessionMessage;

    fn start(key: &str) -> Self {
        Self {
            id: Uuid::parse_str(key).ok(),
            record: None,
        }
    }

    fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Create { attributes, reply } => {
                // A second create for the same id keeps the first record.
                let record = match self.record.clone() {
                    Some(existing) => existing,
                    None => {
                        let record = SessionRecord {
                            session_id: self.id.unwrap_or_else(Uuid::new_v4),
                            created_at: unix_millis(),
                            attributes,
                        };
                        self.record = Some(record.clone());
                        record
                    }
                };
                let _ = reply.send(record);
            }
            SessionMessage::Get { reply } => {
                let _ = reply.send(self.record.clone());
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Creates and validates sessions. Sessions never expire at this layer.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    actors: ActorRegistry<SessionActor>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, attributes: Attributes) -> Result<SessionRecord, ActorError> {
        let id = Uuid::new_v4();
        self.actors
            .handle(&id.to_string())
            .ask(|reply| SessionMessage::Create { attributes, reply })
            .await
    }

    /// Look up a session. Unknown or malformed ids return `None`
    /// without spawning an actor.
    pub async fn validate(&self, session_id: &str) -> Result<Option<SessionRecord>, ActorError> {
        let Ok(id) = Uuid::parse_str(session_id) else {
            return Ok(None);
        };
        match self.actors.existing(&id.to_string()) {
            Some(actor) => actor.ask(|reply| SessionMessage::Get { reply }).await,
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
