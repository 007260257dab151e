use crate::model::CandidateScore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Debug, Clone)]
enum FlightState {
    Pending,
    Done(Arc<CandidateScore>),
    Failed,
}

/// Coordinates in-flight computations per fingerprint.
///
/// The first claimant of a key becomes its leader and is expected to publish
/// a score; later claimants follow and observe whatever the leader ends with.
/// A leader dropped without completing resolves its followers as failed.
#[derive(Default)]
pub struct SingleFlight {
    inflight: Mutex<HashMap<String, watch::Receiver<FlightState>>>,
}

pub enum Claim {
    Leader(FlightLeader),
    Follower(FlightFollower),
}

impl SingleFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, watch::Receiver<FlightState>>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn claim(self: &Arc<Self>, key: &str) -> Claim {
        let mut inflight = self.lock();
        if let Some(rx) = inflight.get(key) {
            return Claim::Follower(FlightFollower { rx: rx.clone() });
        }
        let (tx, rx) = watch::channel(FlightState::Pending);
        inflight.insert(key.to_string(), rx);
        Claim::Leader(FlightLeader {
            key: key.to_string(),
            tx,
            flights: Arc::clone(self),
            finished: false,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }
}

pub struct FlightLeader {
    key: String,
    tx: watch::Sender<FlightState>,
    flights: Arc<SingleFlight>,
    finished: bool,
}

impl FlightLeader {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publishes the score to every follower of this key.
    pub fn complete(mut self, score: Arc<CandidateScore>) {
        self.tx.send_replace(FlightState::Done(score));
        self.finished = true;
    }
}

impl Drop for FlightLeader {
    fn drop(&mut self) {
        if !self.finished {
            self.tx.send_replace(FlightState::Failed);
        }
        self.flights.lock().remove(&self.key);
    }
}

pub struct FlightFollower {
    rx: watch::Receiver<FlightState>,
}

impl FlightFollower {
    /// Waits for the leader. `None` means the leader failed or went away.
    pub async fn wait(mut self) -> Option<Arc<CandidateScore>> {
        let state = self
            .rx
            .wait_for(|s| !matches!(s, FlightState::Pending))
            .await
            .ok()?
            .clone();
        match state {
            FlightState::Done(score) => Some(score),
            FlightState::Failed | FlightState::Pending => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(v: f64) -> Arc<CandidateScore> {
        Arc::new(CandidateScore {
            candidate_id: "c".into(),
            overall_score: v,
            process_time: 1.0,
            user_rating: 0.0,
        })
    }

    #[tokio::test]
    async fn followers_observe_leader_result() {
        let flights = SingleFlight::new();
        let Claim::Leader(leader) = flights.claim("k") else {
            panic!("first claim must lead");
        };
        let Claim::Follower(follower) = flights.claim("k") else {
            panic!("second claim must follow");
        };
        let waiter = tokio::spawn(follower.wait());
        leader.complete(score(42.0));
        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.overall_score, 42.0);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn dropped_leader_fails_followers() {
        let flights = SingleFlight::new();
        let leader = match flights.claim("k") {
            Claim::Leader(l) => l,
            Claim::Follower(_) => panic!("first claim must lead"),
        };
        let follower = match flights.claim("k") {
            Claim::Follower(f) => f,
            Claim::Leader(_) => panic!("second claim must follow"),
        };
        drop(leader);
        assert!(follower.wait().await.is_none());

        // Key is free again after the failed flight.
        assert!(matches!(flights.claim("k"), Claim::Leader(_)));
    }

    #[tokio::test]
    async fn distinct_keys_lead_independently() {
        let flights = SingleFlight::new();
        let a = flights.claim("a");
        let b = flights.claim("b");
        assert!(matches!(a, Claim::Leader(_)));
        assert!(matches!(b, Claim::Leader(_)));
        assert_eq!(flights.in_flight(), 2);
    }
}
