//! The storage facade the reconciliation core depends on, and its sea-orm
//! implementation on [`Engine`].

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
    sea_query::{Expr, OnConflict},
};

use crate::{
    Engine, EngineError, MinorUnits, Order, OrderStatus, ResultEngine, Withdrawal, orders,
    with_tx, withdrawals,
};

/// Accrued and withdrawn totals of one user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccrualTotals {
    pub accrued: MinorUnits,
    pub withdrawn: MinorUnits,
}

impl AccrualTotals {
    /// Spendable balance: accrued minus withdrawn.
    ///
    /// Totals that do not fit the difference in `i64` can only come from
    /// broken rows and are reported as [`EngineError::Corrupted`].
    pub fn current(&self) -> ResultEngine<MinorUnits> {
        self.accrued.checked_sub(self.withdrawn).ok_or_else(|| {
            EngineError::Corrupted(format!(
                "balance overflow: accrued {} withdrawn {}",
                self.accrued, self.withdrawn
            ))
        })
    }
}

/// Persistence operations used by order intake, the worker pool and the
/// balance ledger.
///
/// Status updates only move orders forward along the [`OrderStatus`] graph;
/// they return `false` when nothing was changed (unknown number, or a stored
/// status that is already equal or further along).
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Insert a `NEW` order. Fails with [`EngineError::ExistingKey`] if the
    /// number is already stored, whoever owns it.
    async fn insert_order(&self, owner: &str, number: &str) -> ResultEngine<Order>;

    /// Fails with [`EngineError::KeyNotFound`] for unknown numbers.
    async fn order_by_number(&self, number: &str) -> ResultEngine<Order>;

    async fn update_status(&self, number: &str, status: OrderStatus) -> ResultEngine<bool>;

    /// Status and accrual in a single atomic update.
    async fn update_status_and_accrual(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: MinorUnits,
    ) -> ResultEngine<bool>;

    async fn accrual_totals(&self, owner: &str) -> ResultEngine<AccrualTotals>;

    /// Append a withdrawal. The balance is re-checked in the same storage
    /// transaction, so this fails with [`EngineError::InsufficientFunds`]
    /// rather than overdraw.
    async fn record_withdrawal(
        &self,
        owner: &str,
        order_number: &str,
        sum: MinorUnits,
    ) -> ResultEngine<Withdrawal>;

    /// Orders of `owner`, newest upload first.
    async fn list_orders(&self, owner: &str) -> ResultEngine<Vec<Order>>;

    /// Withdrawals of `owner`, newest first.
    async fn list_withdrawals(&self, owner: &str) -> ResultEngine<Vec<Withdrawal>>;

    /// Every order that has not reached a terminal status, oldest first.
    async fn pending_orders(&self) -> ResultEngine<Vec<(String, OrderStatus)>>;
}

async fn totals_for<C: ConnectionTrait>(db: &C, owner: &str) -> ResultEngine<AccrualTotals> {
    let accrued: Option<Option<i64>> = orders::Entity::find()
        .select_only()
        .column_as(Expr::col(orders::Column::Accrual).sum(), "total")
        .filter(orders::Column::Owner.eq(owner))
        .filter(orders::Column::Status.eq(OrderStatus::Processed.as_str()))
        .into_tuple()
        .one(db)
        .await?;
    let withdrawn: Option<Option<i64>> = withdrawals::Entity::find()
        .select_only()
        .column_as(Expr::col(withdrawals::Column::Sum).sum(), "total")
        .filter(withdrawals::Column::Owner.eq(owner))
        .into_tuple()
        .one(db)
        .await?;

    Ok(AccrualTotals {
        accrued: MinorUnits::new(accrued.flatten().unwrap_or_default()),
        withdrawn: MinorUnits::new(withdrawn.flatten().unwrap_or_default()),
    })
}

fn status_names(statuses: Vec<OrderStatus>) -> Vec<&'static str> {
    statuses.into_iter().map(OrderStatus::as_str).collect()
}

#[async_trait]
impl OrderLedger for Engine {
    async fn insert_order(&self, owner: &str, number: &str) -> ResultEngine<Order> {
        let order = Order::new(number.to_string(), owner.to_string());
        let inserted = orders::Entity::insert(orders::ActiveModel::from(&order))
            .on_conflict(
                OnConflict::column(orders::Column::Number)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.database)
            .await?;
        if inserted == 0 {
            return Err(EngineError::ExistingKey(number.to_string()));
        }
        tracing::debug!(order = number, owner, "order stored");
        Ok(order)
    }

    async fn order_by_number(&self, number: &str) -> ResultEngine<Order> {
        orders::Entity::find_by_id(number.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(number.to_string()))
            .and_then(Order::try_from)
    }

    async fn update_status(&self, number: &str, status: OrderStatus) -> ResultEngine<bool> {
        let result = orders::Entity::update_many()
            .col_expr(orders::Column::Status, Expr::value(status.as_str()))
            .filter(orders::Column::Number.eq(number))
            .filter(orders::Column::Status.is_in(status_names(status.predecessors())))
            .exec(&self.database)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn update_status_and_accrual(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: MinorUnits,
    ) -> ResultEngine<bool> {
        if accrual.get() < 0 {
            return Err(EngineError::InvalidAmount(
                "accrual must be >= 0".to_string(),
            ));
        }
        let result = orders::Entity::update_many()
            .col_expr(orders::Column::Status, Expr::value(status.as_str()))
            .col_expr(orders::Column::Accrual, Expr::value(accrual.get()))
            .filter(orders::Column::Number.eq(number))
            .filter(orders::Column::Status.is_in(status_names(status.predecessors())))
            .exec(&self.database)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn accrual_totals(&self, owner: &str) -> ResultEngine<AccrualTotals> {
        totals_for(&self.database, owner).await
    }

    async fn record_withdrawal(
        &self,
        owner: &str,
        order_number: &str,
        sum: MinorUnits,
    ) -> ResultEngine<Withdrawal> {
        let withdrawal = Withdrawal::new(owner.to_string(), order_number.to_string(), sum)?;
        with_tx!(self, |db_tx| {
            let current = totals_for(&db_tx, owner).await?.current()?;
            if current < sum {
                Err(EngineError::InsufficientFunds(format!(
                    "balance {current} is lower than {sum}"
                )))
            } else {
                withdrawals::ActiveModel::from(&withdrawal)
                    .insert(&db_tx)
                    .await?;
                Ok(withdrawal)
            }
        })
    }

    async fn list_orders(&self, owner: &str) -> ResultEngine<Vec<Order>> {
        orders::Entity::find()
            .filter(orders::Column::Owner.eq(owner))
            .order_by_desc(orders::Column::UploadedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Order::try_from)
            .collect()
    }

    async fn list_withdrawals(&self, owner: &str) -> ResultEngine<Vec<Withdrawal>> {
        withdrawals::Entity::find()
            .filter(withdrawals::Column::Owner.eq(owner))
            .order_by_desc(withdrawals::Column::ProcessedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Withdrawal::try_from)
            .collect()
    }

    async fn pending_orders(&self) -> ResultEngine<Vec<(String, OrderStatus)>> {
        let open: Vec<OrderStatus> = OrderStatus::ALL
            .into_iter()
            .filter(|status| !status.is_terminal())
            .collect();
        orders::Entity::find()
            .filter(orders::Column::Status.is_in(status_names(open)))
            .order_by_asc(orders::Column::UploadedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(|model| -> ResultEngine<(String, OrderStatus)> {
                let status = OrderStatus::try_from(model.status.as_str())?;
                Ok((model.number, status))
            })
            .collect()
    }
}
