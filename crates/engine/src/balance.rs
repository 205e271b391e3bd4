//! Balance derivation and withdrawal admission.
//!
//! The balance is never stored: it is `accrued - withdrawn`, read from the
//! same totals the worker pool writes through the [`OrderLedger`].

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{
    AccrualTotals, EngineError, MinorUnits, OrderLedger, ResultEngine, Withdrawal, luhn,
};

/// Balance as shown to a user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Balance {
    pub current: MinorUnits,
    pub withdrawn: MinorUnits,
}

impl TryFrom<AccrualTotals> for Balance {
    type Error = EngineError;

    fn try_from(totals: AccrualTotals) -> ResultEngine<Self> {
        Ok(Self {
            current: totals.current()?,
            withdrawn: totals.withdrawn,
        })
    }
}

/// One caller's share of a per-user lock. The map entry is removed when the
/// last share goes away, waiters included.
struct UserLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    owner: &'a str,
    lock: Arc<Mutex<()>>,
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        // Two references left: the map's and ours.
        self.locks.remove_if(self.owner, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

/// Reads balances and admits withdrawals, one withdrawal per user at a time.
///
/// A user's lock lives in `user_locks` only while some withdrawal holds or
/// waits for it.
#[derive(Clone)]
pub struct BalanceLedger {
    ledger: Arc<dyn OrderLedger>,
    user_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl BalanceLedger {
    pub fn new(ledger: Arc<dyn OrderLedger>) -> Self {
        Self {
            ledger,
            user_locks: Arc::new(DashMap::new()),
        }
    }

    fn user_lock<'a>(&'a self, owner: &'a str) -> UserLock<'a> {
        let lock = self
            .user_locks
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        UserLock {
            locks: &self.user_locks,
            owner,
            lock,
        }
    }

    #[cfg(test)]
    fn locked_users(&self) -> usize {
        self.user_locks.len()
    }

    /// Raw accrued and withdrawn totals.
    pub async fn totals(&self, owner: &str) -> ResultEngine<AccrualTotals> {
        self.ledger.accrual_totals(owner).await
    }

    pub async fn balance(&self, owner: &str) -> ResultEngine<Balance> {
        Balance::try_from(self.totals(owner).await?)
    }

    /// Withdraw `sum` from `owner`'s balance, attributed to `order_number`.
    ///
    /// The read-check-append sequence runs under a per-user lock, so
    /// concurrent withdrawals for the same user cannot both pass the check.
    pub async fn withdraw(
        &self,
        owner: &str,
        order_number: &str,
        sum: MinorUnits,
    ) -> ResultEngine<Withdrawal> {
        let order_number = order_number.trim();
        if !luhn::is_valid(order_number) {
            return Err(EngineError::InvalidNumber(order_number.to_string()));
        }
        if !sum.is_positive() {
            return Err(EngineError::InvalidAmount(
                "withdrawal sum must be > 0".to_string(),
            ));
        }

        let user_lock = self.user_lock(owner);
        let _guard = user_lock.lock.lock().await;
        self.admit(owner, order_number, sum).await
    }

    /// Balance check and append. Callers hold `owner`'s lock.
    async fn admit(
        &self,
        owner: &str,
        order_number: &str,
        sum: MinorUnits,
    ) -> ResultEngine<Withdrawal> {
        let current = self.ledger.accrual_totals(owner).await?.current()?;
        if current < sum {
            tracing::info!(
                owner,
                balance = %current,
                %sum,
                "withdrawal rejected: insufficient funds"
            );
            return Err(EngineError::InsufficientFunds(format!(
                "balance {current} is lower than {sum}"
            )));
        }

        let withdrawal = self
            .ledger
            .record_withdrawal(owner, order_number, sum)
            .await?;
        tracing::info!(owner, order = order_number, %sum, "withdrawal recorded");
        Ok(withdrawal)
    }

    /// Withdrawal history, newest first.
    pub async fn withdrawals(&self, owner: &str) -> ResultEngine<Vec<Withdrawal>> {
        self.ledger.list_withdrawals(owner).await
    }
}
