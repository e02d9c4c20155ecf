//! In-memory credit ledger with per-account serialization.

use crate::error::LedgerError;
use crate::types::*;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Lowest balance a debit may leave behind. Default 0; set negative to
    /// allow overdraft.
    pub balance_floor_microcents: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            balance_floor_microcents: 0,
        }
    }
}

/// All state for one account, guarded by a single per-account mutex so the
/// idempotency check, floor validation, balance write, and entry append
/// happen as one indivisible unit.
struct AccountSlot {
    account: Account,
    entries: Vec<LedgerEntry>,
    /// (external_source, external_id) -> index into `entries`.
    external_keys: HashMap<(String, String), usize>,
}

impl AccountSlot {
    fn new(account: Account) -> Self {
        Self {
            account,
            entries: Vec::new(),
            external_keys: HashMap::new(),
        }
    }

    fn apply(
        &mut self,
        amount_microcents: i64,
        entry_type: EntryType,
        reason: &str,
        external: Option<&ExternalRef>,
    ) -> LedgerEntry {
        let balance_after = self.account.balance_microcents + amount_microcents;
        let entry = LedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: self.account.account_id.clone(),
            amount_microcents,
            entry_type,
            reason: reason.to_string(),
            external_source: external.map(|e| e.source.clone()),
            external_id: external.map(|e| e.id.clone()),
            balance_after_microcents: balance_after,
            created_at: Utc::now(),
        };

        if let Some(external) = external {
            self.external_keys.insert(
                (external.source.clone(), external.id.clone()),
                self.entries.len(),
            );
        }
        self.entries.push(entry.clone());
        self.account.balance_microcents = balance_after;
        entry
    }

    fn find_external(&self, external: &ExternalRef) -> Option<&LedgerEntry> {
        self.external_keys
            .get(&(external.source.clone(), external.id.clone()))
            .map(|&idx| &self.entries[idx])
    }
}

/// In-memory account/ledger store.
///
/// Mutations for one account are serialized against each other; unrelated
/// accounts never contend (the outer map lock is held only long enough to
/// clone the slot handle).
pub struct CreditLedger {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<AccountSlot>>>>,
    config: LedgerConfig,
}

impl CreditLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create an account with a zero balance. Fails if it already exists;
    /// initial funds arrive through [`CreditLedger::credit`].
    #[instrument(skip(self))]
    pub async fn open_account(&self, account_id: &str) -> Result<Account, LedgerError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(account_id) {
            return Err(LedgerError::AccountExists(account_id.to_string()));
        }
        let account = Account::new(account_id.to_string());
        accounts.insert(
            account_id.to_string(),
            Arc::new(Mutex::new(AccountSlot::new(account.clone()))),
        );
        info!("Opened account {}", account_id);
        Ok(account)
    }

    /// Update auto-reload settings for an account.
    pub async fn configure_auto_reload(
        &self,
        account_id: &str,
        enabled: bool,
        threshold_microcents: Option<i64>,
        amount_microcents: Option<i64>,
    ) -> Result<Account, LedgerError> {
        let slot = self.slot(account_id).await?;
        let mut slot = slot.lock().await;
        slot.account.auto_reload_enabled = enabled;
        slot.account.auto_reload_threshold_microcents = threshold_microcents;
        slot.account.auto_reload_amount_microcents = amount_microcents;
        Ok(slot.account.clone())
    }

    /// Current snapshot of an account.
    pub async fn get_account(&self, account_id: &str) -> Result<Account, LedgerError> {
        let slot = self.slot(account_id).await?;
        let slot = slot.lock().await;
        Ok(slot.account.clone())
    }

    /// Add funds to an account.
    #[instrument(skip(self, external))]
    pub async fn credit(
        &self,
        account_id: &str,
        amount_microcents: i64,
        reason: &str,
        external: Option<ExternalRef>,
    ) -> Result<LedgerReceipt, LedgerError> {
        if amount_microcents <= 0 {
            return Err(LedgerError::InvalidAmount(amount_microcents));
        }

        let slot = self.slot(account_id).await?;
        let mut slot = slot.lock().await;

        if let Some(ref external) = external {
            if let Some(existing) = slot.find_external(external) {
                debug!(
                    "Replayed credit {}:{} for {}",
                    external.source, external.id, account_id
                );
                return Ok(LedgerReceipt {
                    entry: existing.clone(),
                    replayed: true,
                });
            }
        }

        let entry = slot.apply(amount_microcents, EntryType::Credit, reason, external.as_ref());
        info!(
            "Credited {} microcents to {} (balance {})",
            amount_microcents, account_id, entry.balance_after_microcents
        );
        Ok(LedgerReceipt {
            entry,
            replayed: false,
        })
    }

    /// Remove funds from an account. Fails closed when the resulting
    /// balance would drop below the configured floor.
    #[instrument(skip(self, external))]
    pub async fn debit(
        &self,
        account_id: &str,
        amount_microcents: i64,
        reason: &str,
        external: Option<ExternalRef>,
    ) -> Result<LedgerReceipt, LedgerError> {
        if amount_microcents <= 0 {
            return Err(LedgerError::InvalidAmount(amount_microcents));
        }

        let slot = self.slot(account_id).await?;
        let mut slot = slot.lock().await;

        if let Some(ref external) = external {
            if let Some(existing) = slot.find_external(external) {
                debug!(
                    "Replayed debit {}:{} for {}",
                    external.source, external.id, account_id
                );
                return Ok(LedgerReceipt {
                    entry: existing.clone(),
                    replayed: true,
                });
            }
        }

        let balance = slot.account.balance_microcents;
        if balance - amount_microcents < self.config.balance_floor_microcents {
            return Err(LedgerError::InsufficientCredits {
                required: amount_microcents,
                balance,
            });
        }

        let entry = slot.apply(-amount_microcents, EntryType::Debit, reason, external.as_ref());
        info!(
            "Debited {} microcents from {} (balance {})",
            amount_microcents, account_id, entry.balance_after_microcents
        );
        Ok(LedgerReceipt {
            entry,
            replayed: false,
        })
    }

    /// All entries for an account in creation order.
    pub async fn entries(&self, account_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let slot = self.slot(account_id).await?;
        let slot = slot.lock().await;
        Ok(slot.entries.clone())
    }

    /// Reconstruct the balance by folding the entry log. Used for audit:
    /// the result must always equal the live balance.
    pub async fn replayed_balance(&self, account_id: &str) -> Result<i64, LedgerError> {
        let entries = self.entries(account_id).await?;
        Ok(entries.iter().map(|e| e.amount_microcents).sum())
    }

    /// Evaluate the auto-reload rule against the current account state.
    pub async fn reload_decision(&self, account_id: &str) -> Result<ReloadDecision, LedgerError> {
        let account = self.get_account(account_id).await?;
        Ok(evaluate_auto_reload(&account))
    }

    async fn slot(&self, account_id: &str) -> Result<Arc<Mutex<AccountSlot>>, LedgerError> {
        let accounts = self.accounts.read().await;
        accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| LedgerError::MissingAccount(account_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    async fn ledger_with_account(balance: i64) -> CreditLedger {
        let ledger = CreditLedger::new(LedgerConfig::default());
        ledger.open_account("acct-1").await.unwrap();
        if balance > 0 {
            ledger
                .credit("acct-1", balance, "opening", None)
                .await
                .unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn test_credit_and_debit() {
        let ledger = ledger_with_account(10_000_000).await;

        let receipt = ledger
            .debit("acct-1", 2_300_000, "generation", None)
            .await
            .unwrap();
        assert_eq!(receipt.balance_after(), 7_700_000);

        let account = ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, 7_700_000);
    }

    #[tokio::test]
    async fn test_debit_idempotency() {
        let ledger = ledger_with_account(10_000_000).await;
        let external = ExternalRef::new("generation", "gen-123");

        let first = ledger
            .debit("acct-1", 2_300_000, "generation", Some(external.clone()))
            .await
            .unwrap();
        assert!(!first.replayed);
        assert_eq!(first.balance_after(), 7_700_000);

        // Duplicate debit with the same key is a no-op returning the
        // already-posted balance.
        let second = ledger
            .debit("acct-1", 2_300_000, "generation", Some(external))
            .await
            .unwrap();
        assert!(second.replayed);
        assert_eq!(second.balance_after(), 7_700_000);
        assert_eq!(second.entry.id, first.entry.id);

        let account = ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, 7_700_000);
        assert_eq!(ledger.entries("acct-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_credit_idempotency() {
        let ledger = ledger_with_account(0).await;
        let external = ExternalRef::new("deposit", "tx-9");

        ledger
            .credit("acct-1", 5_000, "deposit", Some(external.clone()))
            .await
            .unwrap();
        let replay = ledger
            .credit("acct-1", 5_000, "deposit", Some(external))
            .await
            .unwrap();
        assert!(replay.replayed);

        let account = ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, 5_000);
    }

    #[tokio::test]
    async fn test_floor_boundary() {
        let ledger = ledger_with_account(500).await;

        let result = ledger.debit("acct-1", 600, "generation", None).await;
        match result {
            Err(LedgerError::InsufficientCredits { required, balance }) => {
                assert_eq!(required, 600);
                assert_eq!(balance, 500);
            }
            other => panic!("Expected InsufficientCredits, got {:?}", other.map(|r| r.entry)),
        }

        // Balance untouched.
        let account = ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, 500);
        assert_eq!(ledger.entries("acct-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_debit_to_exact_floor_succeeds() {
        let ledger = ledger_with_account(500).await;
        let receipt = ledger.debit("acct-1", 500, "generation", None).await.unwrap();
        assert_eq!(receipt.balance_after(), 0);
    }

    #[tokio::test]
    async fn test_negative_floor_allows_overdraft() {
        let ledger = CreditLedger::new(LedgerConfig {
            balance_floor_microcents: -1_000,
        });
        ledger.open_account("acct-1").await.unwrap();

        let receipt = ledger.debit("acct-1", 800, "generation", None).await.unwrap();
        assert_eq!(receipt.balance_after(), -800);

        let result = ledger.debit("acct-1", 300, "generation", None).await;
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientCredits { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_account() {
        let ledger = CreditLedger::new(LedgerConfig::default());
        let result = ledger.debit("nobody", 100, "generation", None).await;
        assert!(matches!(result, Err(LedgerError::MissingAccount(_))));
    }

    #[tokio::test]
    async fn test_invalid_amount() {
        let ledger = ledger_with_account(1_000).await;
        assert!(matches!(
            ledger.credit("acct-1", 0, "x", None).await,
            Err(LedgerError::InvalidAmount(0))
        ));
        assert!(matches!(
            ledger.debit("acct-1", -5, "x", None).await,
            Err(LedgerError::InvalidAmount(-5))
        ));
    }

    #[tokio::test]
    async fn test_entry_chain_consistency() {
        let ledger = ledger_with_account(10_000).await;
        ledger.debit("acct-1", 1_000, "a", None).await.unwrap();
        ledger.credit("acct-1", 2_500, "b", None).await.unwrap();
        ledger.debit("acct-1", 500, "c", None).await.unwrap();

        let entries = ledger.entries("acct-1").await.unwrap();
        let mut running = 0i64;
        for entry in &entries {
            running += entry.amount_microcents;
            assert_eq!(entry.balance_after_microcents, running);
        }

        let account = ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, running);
        assert_eq!(
            ledger.replayed_balance("acct-1").await.unwrap(),
            account.balance_microcents
        );
    }

    #[tokio::test]
    async fn test_concurrent_interleaved_mutations() {
        let ledger = StdArc::new(CreditLedger::new(LedgerConfig {
            // Allow deep overdraft so no debit is rejected; this test is
            // about lost updates, not the floor.
            balance_floor_microcents: i64::MIN / 2,
        }));
        ledger.open_account("acct-1").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..25 {
                    if (i + j) % 2 == 0 {
                        ledger
                            .credit("acct-1", 7, "interleave", None)
                            .await
                            .unwrap();
                    } else {
                        ledger.debit("acct-1", 3, "interleave", None).await.unwrap();
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entries = ledger.entries("acct-1").await.unwrap();
        assert_eq!(entries.len(), 20 * 25);

        // No lost updates: the live balance equals the entry fold, and every
        // balance_after links to its predecessor.
        let account = ledger.get_account("acct-1").await.unwrap();
        let folded: i64 = entries.iter().map(|e| e.amount_microcents).sum();
        assert_eq!(account.balance_microcents, folded);

        let mut running = 0i64;
        for entry in &entries {
            running += entry.amount_microcents;
            assert_eq!(entry.balance_after_microcents, running);
        }
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_debits_apply_once() {
        let ledger = StdArc::new(ledger_with_account(10_000_000).await);
        let external = ExternalRef::new("generation", "gen-dup");

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            let external = external.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .debit("acct-1", 2_300_000, "generation", Some(external))
                    .await
                    .unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            let receipt = handle.await.unwrap();
            assert_eq!(receipt.balance_after(), 7_700_000);
            if !receipt.replayed {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);

        let account = ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, 7_700_000);
    }
}
