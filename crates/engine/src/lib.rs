//! Loyalty order reconciliation engine.
//!
//! - [`Engine`] is the sea-orm backed [`OrderLedger`].
//! - [`BalanceLedger`] derives balances and admits withdrawals.
//! - [`WorkerPool`] polls the accrual authority and converges order state.

use sea_orm::DatabaseConnection;

pub use balance::{Balance, BalanceLedger};
pub use error::{AccrualError, EngineError};
pub use intake::{OrderIntake, Submission};
pub use ledger::{AccrualTotals, OrderLedger};
pub use money::{MinorUnits, to_decimal, to_minor_units};
pub use orders::{Order, OrderStatus};
pub use queue::{Task, TaskQueue};
pub use rust_decimal::Decimal;
pub use updater::{AccrualReply, AccrualSource, Observation, Throttle, Updater};
pub use withdrawals::Withdrawal;
pub use worker::{PoolConfig, PoolHandle, WorkerPool};

mod balance;
mod error;
mod intake;
mod ledger;
pub mod luhn;
mod money;
pub mod orders;
mod queue;
mod updater;
pub mod users;
pub mod withdrawals;
mod worker;

type ResultEngine<T> = Result<T, EngineError>;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Storage-backed order and withdrawal ledger.
#[derive(Debug, Clone)]
pub struct Engine {
    database: DatabaseConnection,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
        })
    }
}
