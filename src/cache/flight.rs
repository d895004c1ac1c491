//! Single-flight registry for deduplicated fetches
//!
//! The first caller for a key becomes the leader and runs the producer.
//! Later callers for the same key subscribe to the leader's watch channel
//! and receive the same outcome. The registration is released when the
//! leader's guard is dropped, whether it completed, failed or was cancelled.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::error::{Error, Result};

/// Outcome shared with every caller of one flight
pub type FlightOutcome = std::result::Result<Value, Arc<anyhow::Error>>;

type Slot = Option<FlightOutcome>;

struct Flight {
    id: u64,
    rx: watch::Receiver<Slot>,
}

/// In-flight producers keyed by cache key
#[derive(Default)]
pub struct FlightRegistry {
    flights: Mutex<HashMap<String, Flight>>,
    next_id: AtomicU64,
}

/// Role assigned to a caller of [`FlightRegistry::join_or_lead`]
pub enum Role<'a> {
    /// Run the producer and publish through the guard
    Leader(FlightGuard<'a>),
    /// Wait for the leader's outcome
    Follower(watch::Receiver<Slot>),
}

impl FlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Become the leader for `key`, or join the flight already running.
    pub fn join_or_lead(&self, key: &str) -> Role<'_> {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(flight) = flights.get(key) {
            return Role::Follower(flight.rx.clone());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        flights.insert(key.to_string(), Flight { id, rx });

        Role::Leader(FlightGuard {
            registry: self,
            key: key.to_string(),
            id,
            tx,
        })
    }

    /// Number of producers currently running
    pub fn in_flight(&self) -> usize {
        self.flights.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn release(&self, key: &str, id: u64) {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        if flights.get(key).is_some_and(|f| f.id == id) {
            flights.remove(key);
        }
    }
}

/// Leadership of one flight; dropping it releases the registration
pub struct FlightGuard<'a> {
    registry: &'a FlightRegistry,
    key: String,
    id: u64,
    tx: watch::Sender<Slot>,
}

impl FlightGuard<'_> {
    /// Publish the outcome to every follower and release the registration
    pub fn complete(self, outcome: FlightOutcome) {
        // send_replace never fails, even with no followers subscribed
        self.tx.send_replace(Some(outcome));
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.id);
    }
}

/// Wait for the leader of `key` to publish its outcome.
pub async fn wait(key: &str, mut rx: watch::Receiver<Slot>) -> Result<Value> {
    let outcome = match rx.wait_for(|slot| slot.is_some()).await {
        Ok(slot) => slot.clone(),
        Err(_) => None,
    };

    match outcome {
        Some(Ok(value)) => Ok(value),
        Some(Err(err)) => Err(Error::Producer(err)),
        None => Err(Error::ProducerAbandoned(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_caller_leads() {
        let registry = FlightRegistry::new();
        let role = registry.join_or_lead("k");

        assert!(matches!(role, Role::Leader(_)));
        assert_eq!(registry.in_flight(), 1);
    }

    #[test]
    fn test_second_caller_follows() {
        let registry = FlightRegistry::new();
        let _leader = registry.join_or_lead("k");

        assert!(matches!(registry.join_or_lead("k"), Role::Follower(_)));
        assert!(matches!(registry.join_or_lead("other"), Role::Leader(_)));
    }

    #[test]
    fn test_drop_releases_registration() {
        let registry = FlightRegistry::new();
        {
            let _leader = registry.join_or_lead("k");
        }
        assert_eq!(registry.in_flight(), 0);
        assert!(matches!(registry.join_or_lead("k"), Role::Leader(_)));
    }

    #[tokio::test]
    async fn test_follower_receives_value() {
        let registry = FlightRegistry::new();
        let Role::Leader(guard) = registry.join_or_lead("k") else {
            panic!("expected leader");
        };
        let Role::Follower(rx) = registry.join_or_lead("k") else {
            panic!("expected follower");
        };

        guard.complete(Ok(json!({"n": 1})));

        assert_eq!(wait("k", rx).await.unwrap(), json!({"n": 1}));
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_follower_receives_error() {
        let registry = FlightRegistry::new();
        let Role::Leader(guard) = registry.join_or_lead("k") else {
            panic!("expected leader");
        };
        let Role::Follower(rx) = registry.join_or_lead("k") else {
            panic!("expected follower");
        };

        guard.complete(Err(Arc::new(anyhow::anyhow!("boom"))));

        let err = wait("k", rx).await.unwrap_err();
        assert!(matches!(err, Error::Producer(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_abandoned_leader() {
        let registry = FlightRegistry::new();
        let leader = registry.join_or_lead("k");
        let Role::Follower(rx) = registry.join_or_lead("k") else {
            panic!("expected follower");
        };

        drop(leader);

        assert!(matches!(
            wait("k", rx).await,
            Err(Error::ProducerAbandoned(_))
        ));
    }
}
