//! Scriptable signer for tests and dry runs.

use super::{CallDescriptor, Receipt, Signer, SignerError, TxHandle};
use crate::domain::{Address, Decimal};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Every collaborator call the mock received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerCall {
    GetAllowance { token: Address, spender: Address },
    Approve { token: Address, spender: Address, amount: Decimal },
    Submit { method: String },
    WaitForConfirmation(TxHandle),
}

#[derive(Debug, Default)]
struct SignerState {
    allowances: HashMap<(Address, Address), Decimal>,
    /// Approvals broadcast but not yet mined.
    pending_approvals: HashMap<TxHandle, (Address, Address, Decimal)>,
    calls: Vec<SignerCall>,
}

/// Mock signer. Approvals only take effect once their confirmation has been
/// awaited, so callers that skip the wait see the old allowance.
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct MockSigner {
    owner: Address,
    state: Arc<Mutex<SignerState>>,
    tx_counter: Arc<AtomicU64>,
    reject_approval: bool,
    reject_submit: bool,
    revert_submit: bool,
    approval_not_granting: bool,
    failing_confirmations: HashSet<u64>,
}

impl MockSigner {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            state: Arc::new(Mutex::new(SignerState::default())),
            tx_counter: Arc::new(AtomicU64::new(0)),
            reject_approval: false,
            reject_submit: false,
            revert_submit: false,
            approval_not_granting: false,
            failing_confirmations: HashSet::new(),
        }
    }

    pub fn with_allowance(self, token: Address, spender: Address, amount: Decimal) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.allowances.insert((token, spender), amount);
        }
        self
    }

    pub fn with_rejected_approval(mut self) -> Self {
        self.reject_approval = true;
        self
    }

    pub fn with_rejected_submit(mut self) -> Self {
        self.reject_submit = true;
        self
    }

    /// Main transactions get mined with a failed status.
    pub fn with_reverted_submit(mut self) -> Self {
        self.revert_submit = true;
        self
    }

    /// Approvals confirm but leave the allowance unchanged.
    pub fn with_approval_not_granting(mut self) -> Self {
        self.approval_not_granting = true;
        self
    }

    /// The n-th transaction (1-based) fails while awaiting confirmation.
    pub fn with_confirmation_failure(mut self, nth_tx: u64) -> Self {
        self.failing_confirmations.insert(nth_tx);
        self
    }

    pub fn calls(&self) -> Vec<SignerCall> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    pub fn allowance(&self, token: &Address, spender: &Address) -> Decimal {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.allowances.get(&(token.clone(), spender.clone())).copied())
            .unwrap_or_else(Decimal::zero)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SignerState>, SignerError> {
        self.state
            .lock()
            .map_err(|_| SignerError::Other("signer state poisoned".to_string()))
    }

    fn record(&self, call: SignerCall) -> Result<(), SignerError> {
        self.lock()?.calls.push(call);
        Ok(())
    }

    fn next_tx(&self) -> (u64, TxHandle) {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        (n, TxHandle(format!("0x{:064x}", n)))
    }

    fn tx_number(tx: &TxHandle) -> Option<u64> {
        u64::from_str_radix(tx.0.trim_start_matches("0x"), 16).ok()
    }
}

#[async_trait]
impl Signer for MockSigner {
    fn address(&self) -> Address {
        self.owner.clone()
    }

    async fn get_allowance(
        &self,
        token: &Address,
        _owner: &Address,
        spender: &Address,
    ) -> Result<Decimal, SignerError> {
        self.record(SignerCall::GetAllowance {
            token: token.clone(),
            spender: spender.clone(),
        })?;
        Ok(self.allowance(token, spender))
    }

    async fn approve(
        &self,
        token: &Address,
        spender: &Address,
        amount: Decimal,
    ) -> Result<TxHandle, SignerError> {
        self.record(SignerCall::Approve {
            token: token.clone(),
            spender: spender.clone(),
            amount,
        })?;
        if self.reject_approval {
            return Err(SignerError::UserRejected(
                "User denied transaction signature".to_string(),
            ));
        }
        let (_, tx) = self.next_tx();
        self.lock()?
            .pending_approvals
            .insert(tx.clone(), (token.clone(), spender.clone(), amount));
        Ok(tx)
    }

    async fn submit(&self, call: &CallDescriptor) -> Result<TxHandle, SignerError> {
        self.record(SignerCall::Submit {
            method: call.method().to_string(),
        })?;
        if self.reject_submit {
            return Err(SignerError::UserRejected(
                "User denied transaction signature".to_string(),
            ));
        }
        let (_, tx) = self.next_tx();
        Ok(tx)
    }

    async fn wait_for_confirmation(&self, tx: &TxHandle) -> Result<Receipt, SignerError> {
        self.record(SignerCall::WaitForConfirmation(tx.clone()))?;
        let n = Self::tx_number(tx)
            .ok_or_else(|| SignerError::Other(format!("unknown transaction {}", tx)))?;
        if self.failing_confirmations.contains(&n) {
            return Err(SignerError::Network(format!(
                "timed out waiting for {}",
                tx.short()
            )));
        }

        let mut state = self.lock()?;
        let is_approval = match state.pending_approvals.remove(tx) {
            Some((token, spender, amount)) => {
                if !self.approval_not_granting {
                    state.allowances.insert((token, spender), amount);
                }
                true
            }
            None => false,
        };

        Ok(Receipt {
            tx: tx.clone(),
            block_number: 100 + n,
            success: is_approval || !self.revert_submit,
        })
    }
}
