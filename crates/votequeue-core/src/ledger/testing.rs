//! Scripted in-memory ledger used by engine and monitor tests.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use super::{LedgerClient, LedgerError};
use crate::models::{VoteBallot, VoterKey};

#[derive(Default)]
struct LedgerState {
    voted: HashSet<VoterKey>,
    submit_script: VecDeque<Result<String, LedgerError>>,
    precheck_script: VecDeque<LedgerError>,
    submitted: Vec<VoteBallot>,
    precheck_calls: usize,
    next_tx: usize,
}

#[derive(Clone)]
pub struct ScriptedLedger {
    state: Arc<Mutex<LedgerState>>,
    signer: Arc<Mutex<bool>>,
    gate: Option<Arc<Semaphore>>,
    pub entered_submit: Arc<Notify>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            signer: Arc::new(Mutex::new(true)),
            gate: None,
            entered_submit: Arc::new(Notify::new()),
        }
    }

    /// Every submission waits for a permit on the returned semaphore
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn set_signer(&self, available: bool) {
        *self.signer.lock().unwrap() = available;
    }

    /// Queue the outcome of the next `submit_vote` call; unscripted calls succeed
    pub fn script_submit(&self, outcome: Result<String, LedgerError>) {
        self.state.lock().unwrap().submit_script.push_back(outcome);
    }

    /// Make the next `has_already_voted` call fail
    pub fn script_precheck_error(&self, error: LedgerError) {
        self.state.lock().unwrap().precheck_script.push_back(error);
    }

    /// Record a vote cast through some other channel
    pub fn mark_voted(&self, voter_key: &VoterKey) {
        self.state.lock().unwrap().voted.insert(voter_key.clone());
    }

    pub fn submitted(&self) -> Vec<VoteBallot> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn precheck_calls(&self) -> usize {
        self.state.lock().unwrap().precheck_calls
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    fn signer_available(&self) -> bool {
        *self.signer.lock().unwrap()
    }

    async fn has_already_voted(&self, voter_key: &VoterKey) -> Result<bool, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.precheck_calls += 1;
        if let Some(error) = state.precheck_script.pop_front() {
            return Err(error);
        }
        Ok(state.voted.contains(voter_key))
    }

    async fn submit_vote(&self, ballot: &VoteBallot) -> Result<String, LedgerError> {
        self.entered_submit.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let mut state = self.state.lock().unwrap();
        state.submitted.push(ballot.clone());
        let outcome = state.submit_script.pop_front().unwrap_or_else(|| {
            state.next_tx += 1;
            Ok(format!("0xTX{}", state.next_tx))
        });
        if outcome.is_ok() {
            state.voted.insert(ballot.voter_key.clone());
        }
        outcome
    }
}
