//! Sequencing of allowance, approval, submission and confirmation for a
//! single intent.
//!
//! ```text
//! idle ──(allowance short)──▶ approving ──▶ approved ──▶ submitting ──▶ confirmed
//!   └──────(allowance ok)──────────────────────────────▲
//! any step ──▶ failed
//! ```
//!
//! The approval receipt is awaited before the main call is submitted; a
//! broadcast approval is not enough.

use super::{ExecutionIntent, Receipt, Signer, SignerError, TxHandle};
use crate::domain::Decimal;
use crate::error::ErrorKind;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionState {
    Idle,
    Approving,
    Approved,
    Submitting,
    Confirmed,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionState::Confirmed | ExecutionState::Failed)
    }

    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        match (self, next) {
            (Idle, Approving) | (Idle, Submitting) => true,
            (Approving, Approved) => true,
            (Approved, Submitting) => true,
            (Submitting, Confirmed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Approving => "approving",
            ExecutionState::Approved => "approved",
            ExecutionState::Submitting => "submitting",
            ExecutionState::Confirmed => "confirmed",
            ExecutionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Ordered progress notifications. `Display` gives the human-readable line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    CheckingAllowance,
    AllowanceSufficient,
    ApprovalSubmitted { tx: TxHandle },
    ApprovalConfirmed { tx: TxHandle },
    Submitted { tx: TxHandle },
    Confirmed { receipt: Receipt },
    Failed { kind: ErrorKind, message: String },
}

impl ProgressEvent {
    /// State the intent is in once this event has been emitted.
    pub fn state(&self) -> ExecutionState {
        match self {
            ProgressEvent::CheckingAllowance | ProgressEvent::AllowanceSufficient => {
                ExecutionState::Idle
            }
            ProgressEvent::ApprovalSubmitted { .. } => ExecutionState::Approving,
            ProgressEvent::ApprovalConfirmed { .. } => ExecutionState::Approved,
            ProgressEvent::Submitted { .. } => ExecutionState::Submitting,
            ProgressEvent::Confirmed { .. } => ExecutionState::Confirmed,
            ProgressEvent::Failed { .. } => ExecutionState::Failed,
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::CheckingAllowance => write!(f, "Checking allowance…"),
            ProgressEvent::AllowanceSufficient => write!(f, "Allowance sufficient."),
            ProgressEvent::ApprovalSubmitted { tx } => {
                write!(f, "Approval submitted: {}", tx.short())
            }
            ProgressEvent::ApprovalConfirmed { .. } => write!(f, "Approval confirmed."),
            ProgressEvent::Submitted { tx } => write!(f, "Submitted: {}", tx.short()),
            ProgressEvent::Confirmed { .. } => write!(f, "Confirmed."),
            ProgressEvent::Failed { message, .. } => write!(f, "Failed: {}", message),
        }
    }
}

/// Caller-supplied progress callback.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: &ProgressEvent) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ControlState {
    Pending,
    Cancelled,
    Broadcasting,
    Submitted(TxHandle),
    Finished,
}

/// Cancellation handle shared between the caller and a running execution.
///
/// Cancelling works until the main transaction is handed to the signer.
/// From then on `cancel` reports `AlreadySubmitted`.
#[derive(Debug, Clone)]
pub struct IntentControl {
    state: Arc<Mutex<ControlState>>,
}

impl Default for IntentControl {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentControl {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ControlState::Pending)),
        }
    }

    pub fn cancel(&self) -> Result<(), ExecutionError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ExecutionError::internal("control lock poisoned"))?;
        let current = state.clone();
        match current {
            ControlState::Pending | ControlState::Cancelled => {
                *state = ControlState::Cancelled;
                Ok(())
            }
            ControlState::Broadcasting => Err(ExecutionError {
                kind: ErrorKind::AlreadySubmitted,
                stage: ExecutionState::Submitting,
                message: "transaction is being broadcast and cannot be cancelled".to_string(),
                tx: None,
            }),
            ControlState::Submitted(tx) => Err(ExecutionError {
                kind: ErrorKind::AlreadySubmitted,
                stage: ExecutionState::Submitting,
                message: format!("transaction {} already submitted", tx),
                tx: Some(tx),
            }),
            ControlState::Finished => Ok(()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state
            .lock()
            .map(|s| *s == ControlState::Cancelled)
            .unwrap_or(false)
    }

    /// Atomically check for cancellation and claim the broadcast.
    fn begin_broadcast(&self) -> bool {
        match self.state.lock() {
            Ok(mut state) if *state == ControlState::Pending => {
                *state = ControlState::Broadcasting;
                true
            }
            _ => false,
        }
    }

    fn set(&self, next: ControlState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }
}

/// Classified failure. `message` is the collaborator's error text verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} while {stage}: {message}")]
pub struct ExecutionError {
    pub kind: ErrorKind,
    /// State the intent was in when it failed.
    pub stage: ExecutionState,
    pub message: String,
    /// Main transaction, when one was broadcast.
    pub tx: Option<TxHandle>,
}

impl ExecutionError {
    fn from_signer(stage: ExecutionState, err: SignerError, tx: Option<TxHandle>) -> Self {
        ExecutionError {
            kind: err.kind(),
            stage,
            message: err.to_string(),
            tx,
        }
    }

    fn internal(message: &str) -> Self {
        ExecutionError {
            kind: ErrorKind::NetworkError,
            stage: ExecutionState::Idle,
            message: message.to_string(),
            tx: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub intent_id: Uuid,
    pub approval: Option<Receipt>,
    pub receipt: Receipt,
}

/// Tracks one intent's state and forwards events to the sink.
struct Run<'a> {
    intent_id: Uuid,
    state: ExecutionState,
    sink: &'a dyn ProgressSink,
}

impl Run<'_> {
    fn advance(&mut self, next: ExecutionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        info!("Intent {}: {} -> {}", self.intent_id, self.state, next);
        self.state = next;
    }

    fn emit(&self, event: ProgressEvent) {
        self.sink.emit(&event);
    }

    fn fail(&self, kind: ErrorKind, message: String, tx: Option<TxHandle>) -> ExecutionError {
        ExecutionError {
            kind,
            stage: self.state,
            message,
            tx,
        }
    }

    fn signer_err(&self, err: SignerError, tx: Option<TxHandle>) -> ExecutionError {
        ExecutionError::from_signer(self.state, err, tx)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOrchestrator {
    signer: Arc<dyn Signer>,
}

impl ExecutionOrchestrator {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }

    pub async fn execute(
        &self,
        intent: &ExecutionIntent,
        sink: &dyn ProgressSink,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        self.execute_with_control(intent, sink, &IntentControl::new())
            .await
    }

    /// Run `intent` to confirmation. Nothing is retried; every collaborator
    /// error ends the run in `failed` and is returned with its kind.
    pub async fn execute_with_control(
        &self,
        intent: &ExecutionIntent,
        sink: &dyn ProgressSink,
        control: &IntentControl,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let mut run = Run {
            intent_id: intent.id,
            state: ExecutionState::Idle,
            sink,
        };

        let result = self.drive(intent, &mut run, control).await;
        match &result {
            Ok(_) => control.set(ControlState::Finished),
            Err(err) => {
                if err.kind != ErrorKind::Cancelled {
                    control.set(ControlState::Finished);
                }
                if !run.state.is_terminal() {
                    run.advance(ExecutionState::Failed);
                }
                run.emit(ProgressEvent::Failed {
                    kind: err.kind,
                    message: err.message.clone(),
                });
            }
        }
        result
    }

    async fn drive(
        &self,
        intent: &ExecutionIntent,
        run: &mut Run<'_>,
        control: &IntentControl,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let approval = match &intent.allowance {
            Some(req) => {
                run.emit(ProgressEvent::CheckingAllowance);
                let owner = self.signer.address();
                let current = self
                    .signer
                    .get_allowance(&req.token, &owner, &req.spender)
                    .await
                    .map_err(|e| run.signer_err(e, None))?;

                if current < req.amount {
                    if control.is_cancelled() {
                        return Err(cancelled(run));
                    }
                    run.advance(ExecutionState::Approving);
                    let tx = self
                        .signer
                        .approve(&req.token, &req.spender, req.amount)
                        .await
                        .map_err(|e| run.signer_err(e, None))?;
                    run.emit(ProgressEvent::ApprovalSubmitted { tx: tx.clone() });

                    let receipt = self
                        .signer
                        .wait_for_confirmation(&tx)
                        .await
                        .map_err(|e| run.signer_err(e, None))?;
                    if !receipt.success {
                        return Err(run.fail(
                            ErrorKind::Reverted,
                            format!("approval {} reverted", tx),
                            None,
                        ));
                    }
                    run.advance(ExecutionState::Approved);
                    run.emit(ProgressEvent::ApprovalConfirmed { tx });

                    let after = self
                        .signer
                        .get_allowance(&req.token, &owner, &req.spender)
                        .await
                        .map_err(|e| run.signer_err(e, None))?;
                    if after < req.amount {
                        return Err(run.fail(
                            ErrorKind::AllowanceInsufficient,
                            allowance_message(after, req.amount),
                            None,
                        ));
                    }
                    Some(receipt)
                } else {
                    run.emit(ProgressEvent::AllowanceSufficient);
                    None
                }
            }
            None => None,
        };

        if !control.begin_broadcast() {
            return Err(cancelled(run));
        }
        run.advance(ExecutionState::Submitting);
        let tx = self
            .signer
            .submit(&intent.call)
            .await
            .map_err(|e| run.signer_err(e, None))?;
        control.set(ControlState::Submitted(tx.clone()));
        run.emit(ProgressEvent::Submitted { tx: tx.clone() });

        let receipt = self
            .signer
            .wait_for_confirmation(&tx)
            .await
            .map_err(|e| run.signer_err(e, Some(tx.clone())))?;
        if !receipt.success {
            return Err(run.fail(
                ErrorKind::Reverted,
                format!("{} reverted", intent.call.method()),
                Some(tx),
            ));
        }
        run.advance(ExecutionState::Confirmed);
        run.emit(ProgressEvent::Confirmed {
            receipt: receipt.clone(),
        });

        Ok(ExecutionOutcome {
            intent_id: intent.id,
            approval,
            receipt,
        })
    }
}

fn cancelled(run: &Run<'_>) -> ExecutionError {
    run.fail(
        ErrorKind::Cancelled,
        "cancelled before submission".to_string(),
        None,
    )
}

fn allowance_message(current: Decimal, required: Decimal) -> String {
    format!(
        "allowance {} still below required {} after approval",
        current, required
    )
}
