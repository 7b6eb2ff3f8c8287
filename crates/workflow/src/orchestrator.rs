//! The proof workflow state machine.
//!
//! One [`ProofWorkflow`] owns one proving session. Each call to
//! [`ProofWorkflow::calculate_proof`] runs a full attempt: witness, proof,
//! local verification, chain verification. The session is torn down when the
//! attempt reaches a terminal state and must be re-created with
//! [`ProofWorkflow::reset_session`] before the next attempt.

use serde::{Deserialize, Serialize};
use starter_backend::{BackendFactory, SrsProvider};
use starter_common::{ErrorKind, Input, Proof};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, watch, Mutex, OnceCell, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::chain::{ChainVerifierBridge, VerifierContract};
use crate::circuit::{CircuitArtifact, LoadedCircuit};
use crate::error::WorkflowError;
use crate::events::{FailureReport, WorkflowEvent, WorkflowSnapshot, WorkflowState};
use crate::session::{ProvingSession, SessionError};
use crate::witness::{WitnessBuilder, WitnessError};

const EVENT_CAPACITY: usize = 64;

/// What to do with a submission while another attempt holds the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    #[default]
    Reject,
    /// Wait for the session; only the latest waiting submission runs
    Queue,
}

impl FromStr for BusyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(BusyPolicy::Reject),
            "queue" => Ok(BusyPolicy::Queue),
            other => Err(format!("unknown busy policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Verified(Proof),
    Failed(FailureReport),
    /// A newer submission arrived; this attempt's result was discarded
    Superseded,
    /// The current input is empty, no attempt was made
    InvalidInput,
}

type SessionSlot = Option<ProvingSession>;

pub struct ProofWorkflow {
    artifact: CircuitArtifact,
    backends: Arc<dyn BackendFactory>,
    srs: Arc<dyn SrsProvider>,
    bridge: ChainVerifierBridge,
    policy: BusyPolicy,
    witness_builder: WitnessBuilder,
    circuit: OnceCell<Arc<LoadedCircuit>>,
    session: Arc<Mutex<SessionSlot>>,
    state: Arc<watch::Sender<WorkflowSnapshot>>,
    events: broadcast::Sender<WorkflowEvent>,
    generation: AtomicU64,
    waiters: QueuedWaiters,
}

impl ProofWorkflow {
    pub fn new(
        artifact: CircuitArtifact,
        backends: Arc<dyn BackendFactory>,
        srs: Arc<dyn SrsProvider>,
        chain: Arc<dyn VerifierContract>,
        policy: BusyPolicy,
    ) -> Self {
        let (state, _) = watch::channel(WorkflowSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            artifact,
            backends,
            srs,
            bridge: ChainVerifierBridge::new(chain),
            policy,
            witness_builder: WitnessBuilder::new(),
            circuit: OnceCell::new(),
            session: Arc::new(Mutex::new(None)),
            state: Arc::new(state),
            events,
            generation: AtomicU64::new(0),
            waiters: QueuedWaiters::default(),
        }
    }

    /// The decoded circuit, once a session has been initialized
    pub fn circuit(&self) -> Option<Arc<LoadedCircuit>> {
        self.circuit.get().cloned()
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    pub fn input(&self) -> Input {
        self.state.borrow().input.clone()
    }

    /// Parse the input text and store the result.
    ///
    /// Malformed text stores the empty input; it is not an error.
    pub fn handle_input(&self, raw: &str) -> Input {
        let input = Input::parse(raw);
        if input.is_empty() {
            debug!("Input {:?} is not a pair of integers, clearing it", raw);
        }
        let stored = input.clone();
        self.publish(|s| s.input = stored);
        input
    }

    /// Create the proving session.
    ///
    /// A no-op while a live session exists. A destroyed session is only
    /// replaced through [`ProofWorkflow::reset_session`].
    pub async fn initialize(&self) -> Result<(), WorkflowError> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            if session.is_destroyed() {
                return Err(WorkflowError::SessionDestroyed);
            }
            debug!("Proving session already initialized");
            return Ok(());
        }
        self.start_session(&mut slot).await
    }

    /// Tear down the current session, if any, and initialize a new one
    pub async fn reset_session(&self) -> Result<(), WorkflowError> {
        let mut slot = match self.policy {
            BusyPolicy::Reject => self
                .session
                .try_lock()
                .map_err(|_| WorkflowError::SessionBusy)?,
            BusyPolicy::Queue => self.session.lock().await,
        };
        teardown(&mut slot, &self.state, &self.events);
        *slot = None;
        self.publish(|s| {
            s.proof = None;
            s.local_verification = None;
            s.verification = None;
        });
        self.start_session(&mut slot).await
    }

    /// Destroy the session after any in-flight attempt finishes
    pub async fn shutdown(&self) {
        let mut slot = self.session.lock().await;
        teardown(&mut slot, &self.state, &self.events);
        self.publish(|s| s.state = WorkflowState::Idle);
        info!("Proof workflow shut down");
    }

    /// Store `raw` as the input and run an attempt on it
    pub async fn submit_inputs(&self, raw: &str) -> Result<AttemptOutcome, WorkflowError> {
        self.handle_input(raw);
        self.calculate_proof().await
    }

    /// Run one attempt on the current input.
    ///
    /// Attempt failures come back as [`AttemptOutcome::Failed`]; `Err` means
    /// no attempt ran.
    pub async fn calculate_proof(&self) -> Result<AttemptOutcome, WorkflowError> {
        let input = self.input();
        if input.is_empty() {
            warn!("Ignoring proof request: input is not a pair of integers");
            return Ok(AttemptOutcome::InvalidInput);
        }

        let (guard, generation) = match self.policy {
            BusyPolicy::Reject => {
                let guard = self.session.clone().try_lock_owned().map_err(|_| {
                    warn!("Rejecting proof request: an attempt is already in flight");
                    WorkflowError::SessionBusy
                })?;
                (guard, self.next_generation())
            }
            BusyPolicy::Queue => {
                let generation = self.next_generation();
                let ticket = self.waiters.join(generation);
                let guard = self.session.clone().lock_owned().await;
                drop(ticket);
                if self.is_stale(generation) {
                    debug!("Skipping queued attempt {}: superseded", generation);
                    return Ok(AttemptOutcome::Superseded);
                }
                (guard, generation)
            }
        };

        let circuit = match guard.as_ref() {
            None => return Err(WorkflowError::SessionUnavailable),
            Some(session) if session.is_destroyed() => {
                return Err(WorkflowError::SessionDestroyed)
            }
            Some(session) => session.circuit().clone(),
        };

        info!("Starting proof attempt {} for input {}", generation, input);
        self.publish(|s| {
            s.state = WorkflowState::ProvingInFlight;
            s.pending = true;
            s.chain_pending = false;
            s.generation = generation;
            s.proof = None;
            s.local_verification = None;
            s.verification = None;
        });
        self.emit(WorkflowEvent::ProofGenerationStarted {
            generation,
            input: input.clone(),
        });

        let release = SessionRelease::new(guard, self.state.clone(), self.events.clone());
        let builder = self.witness_builder.clone();
        let (release, proved) = tokio::task::spawn_blocking(move || {
            let mut release = release;
            let proved = builder
                .build(&circuit, &input)
                .map_err(witness_report)
                .and_then(|witness| {
                    release
                        .session()
                        .and_then(|session| session.generate_proof(&witness))
                        .map_err(session_report)
                });
            (release, proved)
        })
        .await
        .map_err(|e| self.worker_failed(generation, e))?;

        if self.is_stale(generation) {
            return Ok(supersede(release, generation));
        }

        let proof = match proved {
            Ok(proof) => proof,
            Err(report) => {
                error!("Proof attempt {} failed: {}", generation, report);
                let failed = report.clone();
                self.publish(|s| {
                    s.state = WorkflowState::Failed(failed);
                    s.pending = false;
                });
                self.emit(WorkflowEvent::ProofGenerationFailed {
                    generation,
                    report: report.clone(),
                });
                drop(release);
                return Ok(AttemptOutcome::Failed(report));
            }
        };

        let proof_hex = proof.to_hex();
        debug!("Attempt {} produced a {}-byte proof", generation, proof.len());
        let shown = proof_hex.clone();
        self.publish(|s| {
            s.state = WorkflowState::LocalVerifying;
            s.pending = false;
            s.proof = Some(shown);
        });
        self.emit(WorkflowEvent::ProofGenerated {
            generation,
            proof: proof_hex,
        });

        let checked = proof.clone();
        let (release, verified) = tokio::task::spawn_blocking(move || {
            let mut release = release;
            let verified = release
                .session()
                .and_then(|session| session.verify_proof(&checked));
            (release, verified)
        })
        .await
        .map_err(|e| self.worker_failed(generation, e))?;

        if self.is_stale(generation) {
            return Ok(supersede(release, generation));
        }

        let rejection = match verified {
            Ok(true) => None,
            Ok(false) => Some(FailureReport::new(
                ErrorKind::LocalRejection,
                "proof rejected by local verification",
            )),
            Err(e) => Some(session_report(e)),
        };
        if let Some(report) = rejection {
            warn!("Attempt {} failed local verification: {}", generation, report);
            let failed = report.clone();
            self.publish(|s| {
                s.state = WorkflowState::Failed(failed);
                s.local_verification = Some(false);
            });
            self.emit(WorkflowEvent::LocalVerificationResult {
                generation,
                verified: false,
                error: Some(report.clone()),
            });
            drop(release);
            return Ok(AttemptOutcome::Failed(report));
        }

        info!("Attempt {} verified locally", generation);
        self.publish(|s| {
            s.state = WorkflowState::LocalVerified;
            s.local_verification = Some(true);
        });
        self.emit(WorkflowEvent::LocalVerificationResult {
            generation,
            verified: true,
            error: None,
        });

        self.publish(|s| {
            s.state = WorkflowState::ChainVerifying;
            s.chain_pending = true;
        });
        let submitted = self.bridge.submit(&proof).await;

        if self.is_stale(generation) {
            return Ok(supersede(release, generation));
        }

        let (verification, failure) = match submitted {
            Ok(true) => (Some(true), None),
            Ok(false) => (
                Some(false),
                Some(FailureReport::new(
                    ErrorKind::OnChainRejection,
                    "on-chain rejection",
                )),
            ),
            Err(e) => (
                None,
                Some(FailureReport::new(
                    e.kind(),
                    format!("chain call error: {}", e),
                )),
            ),
        };

        let outcome = match failure {
            None => {
                info!("Attempt {} verified on-chain", generation);
                self.publish(|s| {
                    s.state = WorkflowState::Verified;
                    s.chain_pending = false;
                    s.verification = verification;
                });
                self.emit(WorkflowEvent::ChainVerificationResult {
                    generation,
                    verified: true,
                    error: None,
                });
                AttemptOutcome::Verified(proof)
            }
            Some(report) => {
                warn!("Attempt {} failed on-chain: {}", generation, report);
                let failed = report.clone();
                self.publish(|s| {
                    s.state = WorkflowState::Failed(failed);
                    s.chain_pending = false;
                    s.verification = verification;
                });
                self.emit(WorkflowEvent::ChainVerificationResult {
                    generation,
                    verified: false,
                    error: Some(report.clone()),
                });
                AttemptOutcome::Failed(report)
            }
        };
        drop(release);
        Ok(outcome)
    }

    async fn start_session(&self, slot: &mut SessionSlot) -> Result<(), WorkflowError> {
        info!("Initializing proving session");
        self.publish(|s| {
            s.state = WorkflowState::Initializing;
            s.pending = true;
        });

        match self.open_session().await {
            Ok(session) => {
                let sizes = session.sizes();
                let subgroup_size = session.subgroup_size();
                *slot = Some(session);
                self.publish(|s| {
                    s.state = WorkflowState::AwaitingInput;
                    s.pending = false;
                    s.session_live = true;
                });
                self.emit(WorkflowEvent::SessionInitialized {
                    sizes,
                    subgroup_size,
                });
                Ok(())
            }
            Err(report) => {
                error!("Session initialization failed: {}", report);
                let failed = report.clone();
                self.publish(|s| {
                    s.state = WorkflowState::Failed(failed);
                    s.pending = false;
                    s.session_live = false;
                });
                Err(WorkflowError::Init(report))
            }
        }
    }

    async fn open_session(&self) -> Result<ProvingSession, FailureReport> {
        let circuit = self.load_circuit().await?;
        let backend = self.backends.create().map_err(|e| {
            FailureReport::new(ErrorKind::BackendInitError, e.to_string())
        })?;
        ProvingSession::init(backend, circuit, self.srs.as_ref())
            .await
            .map_err(session_report)
    }

    async fn load_circuit(&self) -> Result<Arc<LoadedCircuit>, FailureReport> {
        let artifact = self.artifact.clone();
        self.circuit
            .get_or_try_init(|| async move {
                let loaded = tokio::task::spawn_blocking(move || artifact.load())
                    .await
                    .map_err(|e| FailureReport::new(ErrorKind::Internal, e.to_string()))?
                    .map_err(|e| FailureReport::new(e.kind(), e.to_string()))?;
                debug!("Loaded circuit of {} bytes", loaded.bytecode().len());
                Ok::<_, FailureReport>(Arc::new(loaded))
            })
            .await
            .cloned()
    }

    /// The worker died; its release guard has already torn the session down
    fn worker_failed(&self, generation: u64, e: tokio::task::JoinError) -> WorkflowError {
        error!("Proof attempt {} worker failed: {}", generation, e);
        let report = FailureReport::new(ErrorKind::Internal, format!("worker failed: {}", e));
        self.publish(|s| {
            s.state = WorkflowState::Failed(report);
            s.pending = false;
        });
        WorkflowError::Task(e)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// A live queued submission newer than `generation` exists
    fn is_stale(&self, generation: u64) -> bool {
        self.waiters.newer_than(generation)
    }

    fn publish(&self, update: impl FnOnce(&mut WorkflowSnapshot)) {
        self.state.send_modify(update);
    }

    fn emit(&self, event: WorkflowEvent) {
        emit(&self.events, event);
    }
}

fn emit(events: &broadcast::Sender<WorkflowEvent>, event: WorkflowEvent) {
    debug!("Workflow event: {:?}", event);
    // no subscribers is fine
    let _ = events.send(event);
}

fn witness_report(e: WitnessError) -> FailureReport {
    let kind = e.kind();
    if kind == ErrorKind::UnexpectedOracleCall {
        error!("Circuit made an unsupported oracle call: {}", e);
    }
    FailureReport::new(kind, e.to_string())
}

fn session_report(e: SessionError) -> FailureReport {
    FailureReport::new(e.kind(), e.to_string())
}

fn supersede(release: SessionRelease, generation: u64) -> AttemptOutcome {
    debug!("Discarding result of attempt {}: superseded", generation);
    release.disarm();
    AttemptOutcome::Superseded
}

/// Destroy a live session and publish the change
fn teardown(
    slot: &mut SessionSlot,
    state: &watch::Sender<WorkflowSnapshot>,
    events: &broadcast::Sender<WorkflowEvent>,
) {
    let Some(session) = slot.as_mut() else {
        return;
    };
    if session.is_destroyed() {
        return;
    }
    if let Err(e) = session.destroy() {
        warn!("Session teardown failed: {}", e);
    }
    state.send_modify(|s| {
        s.session_live = false;
        s.pending = false;
        s.chain_pending = false;
    });
    info!("Proving session destroyed");
    emit(events, WorkflowEvent::SessionDestroyed);
}

/// Generations of the submissions currently waiting for the session
#[derive(Default)]
struct QueuedWaiters(StdMutex<BTreeSet<u64>>);

impl QueuedWaiters {
    fn join(&self, generation: u64) -> WaitTicket<'_> {
        self.waiting().insert(generation);
        WaitTicket {
            waiters: self,
            generation,
        }
    }

    fn newer_than(&self, generation: u64) -> bool {
        self.waiting().range(generation + 1..).next().is_some()
    }

    fn waiting(&self) -> std::sync::MutexGuard<'_, BTreeSet<u64>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Membership in [`QueuedWaiters`]; a dropped waiter no longer supersedes
/// the attempt ahead of it
struct WaitTicket<'a> {
    waiters: &'a QueuedWaiters,
    generation: u64,
}

impl Drop for WaitTicket<'_> {
    fn drop(&mut self) {
        self.waiters.waiting().remove(&self.generation);
    }
}

/// Exclusive use of the session for one attempt.
///
/// Destroys the session when dropped unless disarmed, so a terminal state,
/// a worker panic and a dropped attempt future all release the backend.
struct SessionRelease {
    guard: OwnedMutexGuard<SessionSlot>,
    state: Arc<watch::Sender<WorkflowSnapshot>>,
    events: broadcast::Sender<WorkflowEvent>,
    armed: bool,
}

impl SessionRelease {
    fn new(
        guard: OwnedMutexGuard<SessionSlot>,
        state: Arc<watch::Sender<WorkflowSnapshot>>,
        events: broadcast::Sender<WorkflowEvent>,
    ) -> Self {
        Self {
            guard,
            state,
            events,
            armed: true,
        }
    }

    fn session(&mut self) -> Result<&mut ProvingSession, SessionError> {
        match self.guard.as_mut() {
            Some(session) if !session.is_destroyed() => Ok(session),
            _ => Err(SessionError::Destroyed),
        }
    }

    /// Give the lock back without touching the session
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SessionRelease {
    fn drop(&mut self) {
        if self.armed {
            teardown(&mut self.guard, &self.state, &self.events);
        }
    }
}
