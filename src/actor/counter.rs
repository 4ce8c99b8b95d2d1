//! Strongly-consistent counter, one actor per rate-limit identity.
//!
//! Unlike the approximate window counters in `security::rate_limit`,
//! increments here are serialized, so the returned count is exact.

use tokio::sync::oneshot;

use crate::actor::{Actor, ActorError, ActorRegistry};

pub enum CounterMessage {
    Increment { reply: oneshot::Sender<u64> },
    Get { reply: oneshot::Sender<u64> },
}

#[derive(Debug, Default)]
pub struct CounterActor {
    count: u64,
}

impl Actor for CounterActor {
    type Message = CounterMessage;

    fn start(_key: &str) -> Self {
        Self::default()
    }

    fn handle(&mut self, message: CounterMessage) {
        match message {
            CounterMessage::Increment { reply } => {
                self.count += 1;
                let _ = reply.send(self.count);
            }
            CounterMessage::Get { reply } => {
                let _ = reply.send(self.count);
            }
        }
    }
}

/// Exact per-identity counters.
#[derive(Debug, Default)]
pub struct CounterRegistry {
    actors: ActorRegistry<CounterActor>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for `identity` and return the new exact count.
    pub async fn increment(&self, identity: &str) -> Result<u64, ActorError> {
        self.actors
            .handle(identity)
            .ask(|reply| CounterMessage::Increment { reply })
            .await
    }

    /// Current count, zero for identities never seen.
    pub async fn get(&self, identity: &str) -> Result<u64, ActorError> {
        match self.actors.existing(identity) {
            Some(actor) => actor.ask(|reply| CounterMessage::Get { reply }).await,
            None => Ok(0),
        }
    }
}
