//! Order primitives.
//!
//! An `Order` is a number submitted by a user whose status and accrual are
//! reconciled against the external accrual authority.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, MinorUnits};

/// Processing status of an order.
///
/// ```text
/// NEW ──> REGISTERED ──> PROCESSING ──> PROCESSED
///  │                         │
///  └──────> INVALID <────────┘
/// ```
///
/// `PROCESSED` and `INVALID` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Registered => "REGISTERED",
            Self::Processing => "PROCESSING",
            Self::Invalid => "INVALID",
            Self::Processed => "PROCESSED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Invalid | Self::Processed)
    }

    /// Statuses reachable in one step.
    fn successors(self) -> &'static [OrderStatus] {
        match self {
            Self::New => &[Self::Registered, Self::Invalid],
            Self::Registered => &[Self::Processing],
            Self::Processing => &[Self::Processed, Self::Invalid],
            Self::Invalid | Self::Processed => &[],
        }
    }

    /// Whether `next` is reachable from `self` through one or more steps.
    ///
    /// Polling can miss intermediate states, so `NEW -> PROCESSED` is a valid
    /// advance even though it is not a single edge.
    pub fn can_advance_to(self, next: OrderStatus) -> bool {
        self.successors()
            .iter()
            .any(|&step| step == next || step.can_advance_to(next))
    }

    /// Every status from which `self` can be reached.
    pub fn predecessors(self) -> Vec<OrderStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_advance_to(self))
            .collect()
    }

    pub const ALL: [OrderStatus; 5] = [
        Self::New,
        Self::Registered,
        Self::Processing,
        Self::Invalid,
        Self::Processed,
    ];
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "NEW" => Ok(Self::New),
            "REGISTERED" => Ok(Self::Registered),
            "PROCESSING" => Ok(Self::Processing),
            "INVALID" => Ok(Self::Invalid),
            "PROCESSED" => Ok(Self::Processed),
            other => Err(EngineError::InvalidStatus(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub number: String,
    pub owner: String,
    pub status: OrderStatus,
    pub accrual: MinorUnits,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    pub fn new(number: String, owner: String) -> Self {
        Self {
            number,
            owner,
            status: OrderStatus::New,
            accrual: MinorUnits::ZERO,
            uploaded_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub number: String,
    pub owner: String,
    pub status: String,
    pub accrual: i64,
    pub uploaded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Order> for ActiveModel {
    fn from(order: &Order) -> Self {
        Self {
            number: ActiveValue::Set(order.number.clone()),
            owner: ActiveValue::Set(order.owner.clone()),
            status: ActiveValue::Set(order.status.as_str().to_string()),
            accrual: ActiveValue::Set(order.accrual.get()),
            uploaded_at: ActiveValue::Set(order.uploaded_at),
        }
    }
}

impl TryFrom<Model> for Order {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            status: OrderStatus::try_from(model.status.as_str())?,
            number: model.number,
            owner: model.owner,
            accrual: MinorUnits::new(model.accrual),
            uploaded_at: model.uploaded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Processed.is_terminal());
        assert!(OrderStatus::Invalid.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Registered.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
    }

    #[test]
    fn advances_follow_the_graph() {
        assert!(OrderStatus::New.can_advance_to(OrderStatus::Registered));
        assert!(OrderStatus::New.can_advance_to(OrderStatus::Processed));
        assert!(OrderStatus::Registered.can_advance_to(OrderStatus::Invalid));
        assert!(OrderStatus::Processing.can_advance_to(OrderStatus::Processed));

        assert!(!OrderStatus::Processing.can_advance_to(OrderStatus::Registered));
        assert!(!OrderStatus::Registered.can_advance_to(OrderStatus::New));
        assert!(!OrderStatus::Processed.can_advance_to(OrderStatus::Invalid));
        assert!(!OrderStatus::Invalid.can_advance_to(OrderStatus::Processed));
        assert!(!OrderStatus::Processing.can_advance_to(OrderStatus::Processing));
    }

    #[test]
    fn predecessors_of_processed() {
        assert_eq!(
            OrderStatus::Processed.predecessors(),
            vec![
                OrderStatus::New,
                OrderStatus::Registered,
                OrderStatus::Processing
            ]
        );
        assert!(OrderStatus::New.predecessors().is_empty());
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(OrderStatus::try_from("REFUNDED").is_err());
        assert_eq!(
            OrderStatus::try_from("PROCESSING").unwrap(),
            OrderStatus::Processing
        );
    }
}
