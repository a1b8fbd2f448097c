//! Economic Ledger
//!
//! The ledger is the central bank of the agent society: one account per
//! agent, a strictly append-only transaction log, and atomic
//! charge/credit/transfer operations serialized by a single mutex.
//! Balances never go negative: a charge that would overdraw fails and
//! leaves a zero-amount [`TransactionKind::AgentDeath`] record behind for
//! forensic traceability.
//!
//! The transaction log is the source of truth for expenditure:
//! [`Ledger::total_expenditure`] sums the absolute value of every
//! negative entry.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentos::{Ledger, TransactionKind};
//!
//! # async {
//! let ledger = Ledger::new();
//! ledger.create_account("a1", 10.0).await.unwrap();
//! ledger
//!     .charge("a1", 3.5, TransactionKind::ApiCall, "LLM API usage")
//!     .await
//!     .unwrap();
//! assert_eq!(ledger.balance("a1").await, 6.5);
//! # };
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::path::Path;
use tokio::sync::Mutex;

/// Categories of ledger movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    ApiCall,
    SpawnAgent,
    ToolUsage,
    BudgetAllocation,
    /// Zero-amount marker recorded when a charge is denied for lack of funds.
    AgentDeath,
    Refund,
}

/// A single append-only ledger entry.  Negative amounts are debits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub kind: TransactionKind,
    pub amount: f64,
    pub description: String,
}

/// Errors raised by ledger operations.
#[derive(Debug, Clone)]
pub enum LedgerError {
    /// `create_account` called for an id that already has an account.
    DuplicateAccount(String),
    /// Charge/credit/transfer against an account that was never created.
    AccountNotFound(String),
    /// Transfer denied because the source balance is too low.
    InsufficientFunds { agent_id: String, amount: f64 },
    /// Amounts to charge/credit/transfer must be strictly positive;
    /// initial balances must be non-negative.
    InvalidAmount(String),
    /// Snapshot persistence failed.
    Io(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::DuplicateAccount(id) => {
                write!(f, "Account for agent {} already exists", id)
            }
            LedgerError::AccountNotFound(id) => write!(f, "Account {} not found", id),
            LedgerError::InsufficientFunds { agent_id, amount } => {
                write!(
                    f,
                    "Agent {} has insufficient funds for ${:.4}",
                    agent_id, amount
                )
            }
            LedgerError::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),
            LedgerError::Io(msg) => write!(f, "Ledger I/O error: {}", msg),
        }
    }
}

impl Error for LedgerError {}

/// Serializable snapshot used by `save_to_file` / `load_from_file`.
#[derive(Serialize, Deserialize)]
struct LedgerSnapshot {
    transactions: Vec<Transaction>,
    balances: HashMap<String, f64>,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, f64>,
    transactions: Vec<Transaction>,
}

impl LedgerState {
    fn record(&mut self, agent_id: &str, kind: TransactionKind, amount: f64, description: &str) {
        let transaction = Transaction {
            timestamp: Utc::now(),
            agent_id: agent_id.to_string(),
            kind,
            amount,
            description: description.to_string(),
        };
        log::debug!(target: "aos::ledger", "Transaction recorded: {:?}", transaction);
        self.transactions.push(transaction);
    }
}

/// The in-memory account book shared by every agent.
///
/// All mutating operations take the single internal mutex, so transactions
/// are linearizable.  Nothing blocks on external I/O while the lock is
/// held: snapshot persistence serializes an in-memory copy first.
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Open an account.  Each agent gets exactly one, at admission time.
    pub async fn create_account(&self, agent_id: &str, initial: f64) -> Result<(), LedgerError> {
        if initial < 0.0 {
            return Err(LedgerError::InvalidAmount(
                "Initial balance cannot be negative".to_string(),
            ));
        }
        let mut state = self.state.lock().await;
        if state.balances.contains_key(agent_id) {
            return Err(LedgerError::DuplicateAccount(agent_id.to_string()));
        }
        state.balances.insert(agent_id.to_string(), initial);
        log::info!(
            target: "aos::ledger",
            "Account created for agent {} with balance ${:.2}",
            agent_id,
            initial
        );
        Ok(())
    }

    /// Current balance.  Missing accounts read as zero.
    pub async fn balance(&self, agent_id: &str) -> f64 {
        let state = self.state.lock().await;
        state.balances.get(agent_id).copied().unwrap_or(0.0)
    }

    /// Debit `amount` from `agent_id`.
    ///
    /// Returns `Ok(true)` when the account covered the charge.  When the
    /// balance is too low the account is left untouched, a zero-amount
    /// [`TransactionKind::AgentDeath`] entry is appended, and `Ok(false)`
    /// is returned; the caller decides whether the agent dies.
    pub async fn charge(
        &self,
        agent_id: &str,
        amount: f64,
        kind: TransactionKind,
        description: &str,
    ) -> Result<bool, LedgerError> {
        if amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(
                "Charge amount must be positive".to_string(),
            ));
        }
        let mut state = self.state.lock().await;
        let balance = match state.balances.get(agent_id) {
            Some(balance) => *balance,
            None => return Err(LedgerError::AccountNotFound(agent_id.to_string())),
        };
        if balance < amount {
            log::warn!(
                target: "aos::ledger",
                "Charge failed: agent {} has insufficient funds for '{}' (cost: ${:.4})",
                agent_id,
                description,
                amount
            );
            state.record(
                agent_id,
                TransactionKind::AgentDeath,
                0.0,
                &format!("Agent died - insufficient funds for: {}", description),
            );
            return Ok(false);
        }
        state.balances.insert(agent_id.to_string(), balance - amount);
        state.record(agent_id, kind, -amount, description);
        log::debug!(
            target: "aos::ledger",
            "Charged agent {} ${:.4} for '{}'. New balance: ${:.4}",
            agent_id,
            amount,
            description,
            balance - amount
        );
        Ok(true)
    }

    /// Credit `amount` to an existing account.
    pub async fn credit(
        &self,
        agent_id: &str,
        amount: f64,
        kind: TransactionKind,
        description: &str,
    ) -> Result<(), LedgerError> {
        if amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(
                "Credit amount must be positive".to_string(),
            ));
        }
        let mut state = self.state.lock().await;
        let balance = match state.balances.get(agent_id) {
            Some(balance) => *balance,
            None => return Err(LedgerError::AccountNotFound(agent_id.to_string())),
        };
        state.balances.insert(agent_id.to_string(), balance + amount);
        state.record(agent_id, kind, amount, description);
        Ok(())
    }

    /// Move funds between two existing accounts, atomically.
    ///
    /// Both legs are recorded as [`TransactionKind::BudgetAllocation`]
    /// entries (a negative one for the source, a positive one for the
    /// destination) or not at all.
    pub async fn transfer(
        &self,
        from_agent: &str,
        to_agent: &str,
        amount: f64,
        description: &str,
    ) -> Result<(), LedgerError> {
        if amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(
                "Transfer amount must be positive".to_string(),
            ));
        }
        let mut state = self.state.lock().await;
        let from_balance = match state.balances.get(from_agent) {
            Some(balance) => *balance,
            None => return Err(LedgerError::AccountNotFound(from_agent.to_string())),
        };
        let to_balance = match state.balances.get(to_agent) {
            Some(balance) => *balance,
            None => return Err(LedgerError::AccountNotFound(to_agent.to_string())),
        };
        if from_balance < amount {
            return Err(LedgerError::InsufficientFunds {
                agent_id: from_agent.to_string(),
                amount,
            });
        }
        state.balances.insert(from_agent.to_string(), from_balance - amount);
        state.balances.insert(to_agent.to_string(), to_balance + amount);
        state.record(
            from_agent,
            TransactionKind::BudgetAllocation,
            -amount,
            &format!("Transfer to {}: {}", to_agent, description),
        );
        state.record(
            to_agent,
            TransactionKind::BudgetAllocation,
            amount,
            &format!("Transfer from {}: {}", from_agent, description),
        );
        Ok(())
    }

    /// Sum of |amount| over every debit in the log.
    pub async fn total_expenditure(&self) -> f64 {
        let state = self.state.lock().await;
        state
            .transactions
            .iter()
            .filter(|t| t.amount < 0.0)
            .map(|t| t.amount.abs())
            .sum()
    }

    /// All transactions touching one agent, in log order.
    pub async fn transaction_history(&self, agent_id: &str) -> Vec<Transaction> {
        let state = self.state.lock().await;
        state
            .transactions
            .iter()
            .filter(|t| t.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// Persist the ledger as a JSON snapshot.
    ///
    /// The lock is held only while cloning the in-memory state; the
    /// serialization and file write happen outside it.
    pub async fn save_to_file(&self, path: &Path) -> Result<(), LedgerError> {
        let snapshot = {
            let state = self.state.lock().await;
            LedgerSnapshot {
                transactions: state.transactions.clone(),
                balances: state.balances.clone(),
            }
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| LedgerError::Io(e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| LedgerError::Io(e.to_string()))?;
        log::info!(target: "aos::ledger", "Ledger state saved to {}", path.display());
        Ok(())
    }

    /// Restore a snapshot written by [`Ledger::save_to_file`].
    ///
    /// A missing file is not an error: the ledger simply starts empty, as
    /// on a fresh boot.
    pub async fn load_from_file(&self, path: &Path) -> Result<(), LedgerError> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    target: "aos::ledger",
                    "Ledger file {} not found. Starting with empty ledger.",
                    path.display()
                );
                return Ok(());
            }
            Err(e) => return Err(LedgerError::Io(e.to_string())),
        };
        let snapshot: LedgerSnapshot =
            serde_json::from_str(&json).map_err(|e| LedgerError::Io(e.to_string()))?;
        let mut state = self.state.lock().await;
        state.transactions = snapshot.transactions;
        state.balances = snapshot.balances;
        log::info!(target: "aos::ledger", "Ledger state loaded from {}", path.display());
        Ok(())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_account_reads_as_zero() {
        let ledger = Ledger::new();
        assert_eq!(ledger.balance("ghost").await, 0.0);
    }

    #[tokio::test]
    async fn duplicate_account_is_rejected() {
        let ledger = Ledger::new();
        ledger.create_account("a1", 1.0).await.unwrap();
        assert!(matches!(
            ledger.create_account("a1", 1.0).await,
            Err(LedgerError::DuplicateAccount(_))
        ));
    }

    #[tokio::test]
    async fn negative_initial_balance_is_rejected() {
        let ledger = Ledger::new();
        assert!(ledger.create_account("a1", -0.5).await.is_err());
    }

    #[tokio::test]
    async fn charge_of_exact_balance_leaves_zero() {
        let ledger = Ledger::new();
        ledger.create_account("a1", 2.5).await.unwrap();
        let ok = ledger
            .charge("a1", 2.5, TransactionKind::ApiCall, "all of it")
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(ledger.balance("a1").await, 0.0);
    }

    #[tokio::test]
    async fn denied_charge_records_agent_death_marker() {
        let ledger = Ledger::new();
        ledger.create_account("a1", 1.0).await.unwrap();
        let ok = ledger
            .charge("a1", 5.0, TransactionKind::ToolUsage, "too much")
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(ledger.balance("a1").await, 1.0);

        let history = ledger.transaction_history("a1").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::AgentDeath);
        assert_eq!(history[0].amount, 0.0);
        // The forensic marker does not count toward expenditure.
        assert_eq!(ledger.total_expenditure().await, 0.0);
    }

    #[tokio::test]
    async fn charge_on_unknown_account_propagates() {
        let ledger = Ledger::new();
        assert!(matches!(
            ledger
                .charge("ghost", 1.0, TransactionKind::ApiCall, "x")
                .await,
            Err(LedgerError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn balances_reconcile_with_the_log() {
        let ledger = Ledger::new();
        ledger.create_account("a1", 10.0).await.unwrap();
        ledger
            .charge("a1", 4.0, TransactionKind::ApiCall, "calls")
            .await
            .unwrap();
        ledger
            .credit("a1", 1.5, TransactionKind::Refund, "refund")
            .await
            .unwrap();

        let history = ledger.transaction_history("a1").await;
        let net: f64 = history.iter().map(|t| t.amount).sum();
        assert!((10.0 + net - ledger.balance("a1").await).abs() < 1e-9);
    }

    #[tokio::test]
    async fn transfer_moves_funds_atomically() {
        let ledger = Ledger::new();
        ledger.create_account("a1", 10.0).await.unwrap();
        ledger.create_account("a2", 0.0).await.unwrap();
        ledger.transfer("a1", "a2", 4.0, "seed").await.unwrap();
        assert_eq!(ledger.balance("a1").await, 6.0);
        assert_eq!(ledger.balance("a2").await, 4.0);
    }

    #[tokio::test]
    async fn transfer_errors_leave_balances_untouched() {
        let ledger = Ledger::new();
        ledger.create_account("a1", 1.0).await.unwrap();

        assert!(matches!(
            ledger.transfer("a1", "ghost", 0.5, "x").await,
            Err(LedgerError::AccountNotFound(_))
        ));
        assert!(matches!(
            ledger.transfer("a1", "a1", 0.0, "x").await,
            Err(LedgerError::InvalidAmount(_))
        ));

        ledger.create_account("a2", 0.0).await.unwrap();
        assert!(matches!(
            ledger.transfer("a1", "a2", 2.0, "x").await,
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert_eq!(ledger.balance("a1").await, 1.0);
        assert_eq!(ledger.balance("a2").await, 0.0);
    }
}
