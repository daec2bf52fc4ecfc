//! Memory manager: the only writer of Identity and Memory records.
//!
//! Every mutation is a read-modify-write against the latest stored value,
//! committed with compare-and-swap and retried when a concurrent writer
//! got there first. Nothing is cached between calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use confidant_types::config::MemoryConfig;
use confidant_types::error::StoreError;
use confidant_types::identity::{Identity, UserId};
use confidant_types::memory::{Memory, Turn, TurnRole};

use super::nudge::{self, NudgeDecision, NudgePolicy};
use crate::clock::Clock;
use crate::storage::state_store::{StateStore, identity_key, memory_key};

/// Attempts of one read-modify-write before giving up with `Conflict`.
const MAX_CAS_ATTEMPTS: usize = 5;

/// Result of a mutation closure.
enum Change<R> {
    /// The record changed and must be written.
    Write(R),
    /// Nothing to persist.
    Keep(R),
}

pub struct MemoryManager<S: StateStore> {
    store: Arc<S>,
    config: MemoryConfig,
    clock: Arc<dyn Clock>,
}

impl<S: StateStore> MemoryManager<S> {
    pub fn new(store: Arc<S>, config: MemoryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The user's memory, created and stored on first access.
    pub async fn get_memory(&self, user_id: &UserId) -> Result<Memory, StoreError> {
        let now = self.now();
        self.update(&memory_key(user_id), || Memory::new(now), |m| Change::Keep(m.clone()))
            .await
    }

    /// The user's identity, created and stored on first access.
    pub async fn get_identity(&self, user_id: &UserId) -> Result<Identity, StoreError> {
        let now = self.now();
        self.update(&identity_key(user_id), || Identity::new(now), |i| Change::Keep(i.clone()))
            .await
    }

    /// Append a turn stamped with the current time, capping the thread.
    pub async fn append_turn(
        &self,
        user_id: &UserId,
        role: TurnRole,
        text: &str,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let cap = self.config.thread_cap;
        self.update(&memory_key(user_id), || Memory::new(now), |memory| {
            memory.push_turn(Turn::new(role, text, now), cap);
            Change::Write(())
        })
        .await
    }

    /// Merge facts into the set. Writes only if the set changed; returns
    /// whether it did.
    pub async fn add_facts(&self, user_id: &UserId, facts: &[String]) -> Result<bool, StoreError> {
        let now = self.now();
        self.update(&memory_key(user_id), || Memory::new(now), |memory| {
            let mut changed = false;
            for fact in facts {
                changed |= memory.add_fact(fact);
            }
            if changed {
                Change::Write(true)
            } else {
                Change::Keep(false)
            }
        })
        .await
    }

    /// Count a nudge sent now.
    pub async fn note_nudge_sent(&self, user_id: &UserId) -> Result<(), StoreError> {
        let now = self.now();
        self.update(&memory_key(user_id), || Memory::new(now), |memory| {
            memory.record_nudge(now);
            Change::Write(())
        })
        .await
    }

    /// Evaluate the nudge policy against the stored memory. No side effects.
    pub async fn can_nudge(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
        policy: &NudgePolicy,
    ) -> Result<bool, StoreError> {
        let memory = self.get_memory(user_id).await?;
        Ok(nudge::can_nudge(&memory, now, policy))
    }

    /// Evaluate the policy and, if allowed, count the nudge in the same
    /// compare-and-swap write, so racing callers cannot both pass.
    pub async fn try_reserve_nudge(
        &self,
        user_id: &UserId,
        policy: &NudgePolicy,
    ) -> Result<NudgeDecision, StoreError> {
        let now = self.now();
        self.update(&memory_key(user_id), || Memory::new(now), |memory| {
            let decision = nudge::evaluate(memory, now, policy);
            if decision.allowed() {
                memory.record_nudge(now);
                Change::Write(decision)
            } else {
                Change::Keep(decision)
            }
        })
        .await
    }

    /// Store the user's name and the matching fact. Returns the updated identity.
    pub async fn learn_name(&self, user_id: &UserId, name: &str) -> Result<Identity, StoreError> {
        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        let now = self.now();
        let identity = self
            .update(&identity_key(user_id), || Identity::new(now), |identity| {
                identity.name = Some(name.clone());
                identity.last_seen_at = now;
                Change::Write(identity.clone())
            })
            .await?;
        self.add_facts(user_id, &[format!("Name is {name}")]).await?;
        Ok(identity)
    }

    /// Mark activity on the identity, optionally recording the topic.
    pub async fn touch_identity(
        &self,
        user_id: &UserId,
        topic: Option<&str>,
    ) -> Result<Identity, StoreError> {
        let now = self.now();
        self.update(&identity_key(user_id), || Identity::new(now), |identity| {
            identity.last_seen_at = now;
            if let Some(topic) = topic {
                identity.set_topic(topic);
            }
            Change::Write(identity.clone())
        })
        .await
    }

    /// Read-modify-write loop over one record.
    ///
    /// An absent record is initialised with `init` and always written, which
    /// is how records come into existence on first access.
    async fn update<T, R>(
        &self,
        key: &str,
        init: impl Fn() -> T,
        mut mutate: impl FnMut(&mut T) -> Change<R>,
    ) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (mut record, version) = match self.store.get(key).await? {
                Some(stored) => (decode::<T>(key, stored.value)?, Some(stored.version)),
                None => (init(), None),
            };

            let result = match mutate(&mut record) {
                Change::Keep(result) if version.is_some() => return Ok(result),
                Change::Keep(result) | Change::Write(result) => result,
            };

            let value = serde_json::to_value(&record).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

            match self.store.put(key, &value, version).await {
                Ok(_) => return Ok(result),
                Err(StoreError::Conflict { .. }) => {
                    debug!(key, attempt, "Concurrent update, re-reading record");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(key, attempts = MAX_CAS_ATTEMPTS, "Giving up after repeated update conflicts");
        Err(StoreError::Conflict {
            key: key.to_string(),
        })
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
