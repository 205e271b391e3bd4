//! Append-only withdrawal records.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MinorUnits, ResultEngine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub owner: String,
    pub order_number: String,
    pub sum: MinorUnits,
    pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn new(owner: String, order_number: String, sum: MinorUnits) -> ResultEngine<Self> {
        if !sum.is_positive() {
            return Err(EngineError::InvalidAmount(
                "withdrawal sum must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            owner,
            order_number,
            sum,
            processed_at: Utc::now(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "withdrawals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner: String,
    pub order_number: String,
    pub sum: i64,
    pub processed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Withdrawal> for ActiveModel {
    fn from(withdrawal: &Withdrawal) -> Self {
        Self {
            id: ActiveValue::Set(withdrawal.id.to_string()),
            owner: ActiveValue::Set(withdrawal.owner.clone()),
            order_number: ActiveValue::Set(withdrawal.order_number.clone()),
            sum: ActiveValue::Set(withdrawal.sum.get()),
            processed_at: ActiveValue::Set(withdrawal.processed_at),
        }
    }
}

impl TryFrom<Model> for Withdrawal {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id).map_err(|err| {
                EngineError::Corrupted(format!("withdrawal id {:?}: {err}", model.id))
            })?,
            owner: model.owner,
            order_number: model.order_number,
            sum: MinorUnits::new(model.sum),
            processed_at: model.processed_at,
        })
    }
}
