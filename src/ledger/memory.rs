//! In-memory payment ledger.
//!
//! Mirrors the bookkeeping of the storage payment service closely enough to
//! drive a preflight end to end without a chain: wallet balances, deposited
//! funds, per-service rate/lockup allowances and their usage. Failures can be
//! injected to exercise the error paths.

use super::{DepositEvent, DepositObserver, Ledger, LedgerError, StorageRequest, TransactionReceipt};
use crate::config::{ProtocolConstants, SimulatedLedgerConfig};
use crate::payment::{BalanceSnapshot, ServicePrice};
use alloy_primitives::{keccak256, Address, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info};

/// Default address of the simulated storage service.
const DEFAULT_SERVICE: Address = Address::repeat_byte(0x5a);

/// Balances and allowances of one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
    /// Token balance held by the wallet.
    pub wallet_balance: U256,
    /// Token allowance granted by the wallet to the payment contract.
    pub token_allowance: U256,
    /// Funds deposited into the payment contract.
    pub funds: U256,
    /// Rate allowance granted to the storage service.
    pub rate_allowance: U256,
    /// Lockup allowance granted to the storage service.
    pub lockup_allowance: U256,
    /// Lockup period of the current approval, in epochs.
    pub lockup_period_epochs: u64,
    /// Rate allowance in use.
    pub rate_used: U256,
    /// Lockup allowance in use.
    pub lockup_used: U256,
    /// Whether a data set exists for this client.
    pub has_data_set: bool,
}

#[derive(Debug, Default)]
struct Failures {
    not_ready_attempts: u32,
    balance: Option<LedgerError>,
    deposit: Option<LedgerError>,
    approval: Option<LedgerError>,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<Address, AccountState>,
    block_number: u64,
    deposits: u32,
    approvals: u32,
    failures: Failures,
}

/// Deterministic in-memory [`Ledger`] bound to a single signer.
#[derive(Debug)]
pub struct InMemoryLedger {
    signer: Address,
    service: Address,
    price: ServicePrice,
    constants: ProtocolConstants,
    state: Mutex<State>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::from_config(
            Address::ZERO,
            &SimulatedLedgerConfig::default(),
            ProtocolConstants::default(),
        )
    }
}

impl InMemoryLedger {
    /// Create a ledger whose signer starts with the seeded state.
    #[must_use]
    pub fn from_config(
        signer: Address,
        seed: &SimulatedLedgerConfig,
        constants: ProtocolConstants,
    ) -> Self {
        let account = AccountState {
            wallet_balance: seed.wallet_balance,
            token_allowance: U256::ZERO,
            funds: seed.deposited_funds,
            rate_allowance: seed.rate_allowance,
            lockup_allowance: seed.lockup_allowance,
            lockup_period_epochs: 0,
            rate_used: seed.rate_used,
            lockup_used: seed.lockup_used,
            has_data_set: seed.has_data_set,
        };
        let mut accounts = HashMap::new();
        accounts.insert(signer, account);

        Self {
            signer,
            service: DEFAULT_SERVICE,
            price: ServicePrice {
                price_per_tib_per_month_no_cdn: seed.price_per_tib_per_month_no_cdn,
                price_per_tib_per_month_with_cdn: seed.price_per_tib_per_month_with_cdn,
            },
            constants,
            state: Mutex::new(State {
                accounts,
                ..State::default()
            }),
        }
    }

    /// Use a different storage service address.
    #[must_use]
    pub fn with_service(mut self, service: Address) -> Self {
        self.service = service;
        self
    }

    /// Address that signs deposits and approvals.
    #[must_use]
    pub fn signer(&self) -> Address {
        self.signer
    }

    /// Current state of `client`, if it has ever been touched.
    #[must_use]
    pub fn account(&self, client: Address) -> Option<AccountState> {
        self.state.lock().accounts.get(&client).cloned()
    }

    /// Replace the state of `client`.
    pub fn set_account(&self, client: Address, account: AccountState) {
        self.state.lock().accounts.insert(client, account);
    }

    /// Number of confirmed deposits.
    #[must_use]
    pub fn deposit_count(&self) -> u32 {
        self.state.lock().deposits
    }

    /// Number of confirmed service approvals.
    #[must_use]
    pub fn approval_count(&self) -> u32 {
        self.state.lock().approvals
    }

    /// Report "not ready" for the next `attempts` readiness checks.
    pub fn fail_readiness(&self, attempts: u32) {
        self.state.lock().failures.not_ready_attempts = attempts;
    }

    /// Fail the next balance fetch with `error`.
    pub fn fail_next_balance(&self, error: LedgerError) {
        self.state.lock().failures.balance = Some(error);
    }

    /// Fail the next deposit with `error`.
    pub fn fail_next_deposit(&self, error: LedgerError) {
        self.state.lock().failures.deposit = Some(error);
    }

    /// Fail the next service approval with `error`.
    pub fn fail_next_approval(&self, error: LedgerError) {
        self.state.lock().failures.approval = Some(error);
    }

    /// Record that `request` was stored for `client`: its rate and lockup
    /// become used and the client now owns a data set.
    pub fn commit_storage(&self, client: Address, request: &StorageRequest) {
        let costs = self.costs_for(request);
        let lockup = costs
            .per_epoch
            .saturating_mul(U256::from(self.lockup_epochs(request)));
        let mut state = self.state.lock();
        let account = state.accounts.entry(client).or_default();
        account.rate_used = account.rate_used.saturating_add(costs.per_epoch);
        account.lockup_used = account.lockup_used.saturating_add(lockup);
        account.has_data_set = true;
    }

    fn costs_for(&self, request: &StorageRequest) -> crate::payment::StorageCosts {
        self.price.costs_for(
            request.size_bytes,
            request.with_cdn,
            self.constants.epochs_per_day,
        )
    }

    fn lockup_epochs(&self, request: &StorageRequest) -> u64 {
        self.constants
            .lockup_period_epochs(request.persistence_period_days)
    }

    fn next_receipt(state: &mut State, kind: &str) -> TransactionReceipt {
        state.block_number += 1;
        let mut preimage = kind.as_bytes().to_vec();
        preimage.extend_from_slice(&state.block_number.to_be_bytes());
        TransactionReceipt {
            tx_hash: keccak256(&preimage),
            block_number: state.block_number,
        }
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    fn service_address(&self) -> Address {
        self.service
    }

    async fn ensure_ready(&self) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        if state.failures.not_ready_attempts > 0 {
            state.failures.not_ready_attempts -= 1;
            return Err(LedgerError::NotReady("provider still connecting".to_string()));
        }
        Ok(())
    }

    async fn service_price(&self) -> Result<ServicePrice, LedgerError> {
        Ok(self.price)
    }

    async fn fetch_balance(
        &self,
        client: Address,
        request: &StorageRequest,
    ) -> Result<BalanceSnapshot, LedgerError> {
        let costs = self.costs_for(request);
        let new_lockup = costs
            .per_epoch
            .saturating_mul(U256::from(self.lockup_epochs(request)));

        let mut state = self.state.lock();
        if let Some(error) = state.failures.balance.take() {
            return Err(error);
        }
        let account = state.accounts.get(&client).cloned().unwrap_or_default();

        let available_funds = account.funds.saturating_sub(account.lockup_used);
        let snapshot = BalanceSnapshot {
            rate_allowance_needed: account.rate_used.saturating_add(costs.per_epoch),
            lockup_allowance_needed: account.lockup_used.saturating_add(new_lockup),
            current_rate_allowance: account.rate_allowance,
            current_lockup_allowance: account.lockup_allowance,
            current_rate_used: account.rate_used,
            current_lockup_used: account.lockup_used,
            costs,
            deposit_amount_needed: new_lockup.saturating_sub(available_funds),
        };
        debug!("Simulated balance for {client}: {snapshot:?}");
        Ok(snapshot)
    }

    async fn has_data_set(&self, client: Address) -> Result<bool, LedgerError> {
        Ok(self
            .state
            .lock()
            .accounts
            .get(&client)
            .is_some_and(|a| a.has_data_set))
    }

    async fn deposit(
        &self,
        amount: U256,
        token: &str,
        observer: DepositObserver<'_>,
    ) -> Result<TransactionReceipt, LedgerError> {
        if token != self.constants.token {
            return Err(LedgerError::Rejected(format!("unsupported token {token}")));
        }
        observer(DepositEvent::Starting);

        let (current_allowance, approval, receipt) = {
            let mut state = self.state.lock();
            if let Some(error) = state.failures.deposit.take() {
                return Err(error);
            }
            let mut account = state.accounts.get(&self.signer).cloned().unwrap_or_default();
            if account.wallet_balance < amount {
                return Err(LedgerError::InsufficientFunds {
                    available: account.wallet_balance,
                    required: amount,
                });
            }
            let current_allowance = account.token_allowance;
            let approval = if current_allowance < amount {
                account.token_allowance = amount;
                Some(Self::next_receipt(&mut state, "token-approve"))
            } else {
                None
            };
            account.token_allowance -= amount;
            account.wallet_balance -= amount;
            account.funds = account.funds.saturating_add(amount);
            state.accounts.insert(self.signer, account);
            state.deposits += 1;
            (current_allowance, approval, Self::next_receipt(&mut state, "deposit"))
        };

        observer(DepositEvent::AllowanceChecked {
            current: current_allowance,
            required: amount,
        });
        if let Some(approval_receipt) = approval {
            observer(DepositEvent::ApprovalSubmitted {
                tx_hash: approval_receipt.tx_hash,
            });
            observer(DepositEvent::ApprovalConfirmed {
                tx_hash: approval_receipt.tx_hash,
            });
        }

        info!("Simulated deposit of {amount} {token} in block {}", receipt.block_number);
        Ok(receipt)
    }

    async fn approve_service(
        &self,
        service: Address,
        rate_allowance: U256,
        lockup_allowance: U256,
        lockup_period_epochs: u64,
    ) -> Result<TransactionReceipt, LedgerError> {
        let mut state = self.state.lock();
        if let Some(error) = state.failures.approval.take() {
            return Err(error);
        }
        if service != self.service {
            return Err(LedgerError::Rejected(format!("unknown service {service}")));
        }
        let account = state.accounts.entry(self.signer).or_default();
        account.rate_allowance = rate_allowance;
        account.lockup_allowance = lockup_allowance;
        account.lockup_period_epochs = lockup_period_epochs;
        state.approvals += 1;
        let receipt = Self::next_receipt(&mut state, "approve-service");
        info!(
            "Simulated approval of {service}: rate={rate_allowance} lockup={lockup_allowance} \
             period={lockup_period_epochs} epochs"
        );
        Ok(receipt)
    }
}
