//! Status queries against the external accrual authority.
//!
//! [`AccrualSource`] is the raw lookup (implemented over HTTP by the
//! `accrual` crate); [`Updater`] maps its replies onto order statuses and
//! never touches local storage.

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::time::Instant;

use crate::{AccrualError, MinorUnits, OrderStatus};

/// What the accrual authority answered for one order number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccrualReply {
    /// The authority does not know the order (yet).
    NotRegistered,
    /// Too many requests; `retry_after` comes from the `Retry-After` header.
    RateLimited { retry_after: Option<Duration> },
    /// The authority failed to answer (5xx and friends).
    Unavailable,
    /// Raw status string and, for processed orders, the reward amount.
    Status {
        status: String,
        accrual: Option<Decimal>,
    },
}

/// Read-only lookup of an order at the accrual authority.
#[async_trait]
pub trait AccrualSource: Send + Sync {
    async fn fetch(&self, number: &str) -> Result<AccrualReply, AccrualError>;
}

/// Outcome of one status query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// No status to report; ask again later.
    Unchanged,
    /// The authority refused to answer (rate limited or down); ask again,
    /// but less often each time.
    Unavailable,
    /// The authority reports `status`; `accrual` is zero unless processed.
    Status {
        status: OrderStatus,
        accrual: MinorUnits,
    },
}

/// Longest pause a `Retry-After` can impose unless configured otherwise.
pub const DEFAULT_MAX_PAUSE: Duration = Duration::from_secs(60);

/// Shared pause gate, closed while the authority is rate limiting us.
#[derive(Debug)]
pub struct Throttle {
    until: Mutex<Option<Instant>>,
    max_pause: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAUSE)
    }
}

impl Throttle {
    /// A gate that never stays closed longer than `max_pause` at a time.
    pub fn new(max_pause: Duration) -> Self {
        Self {
            until: Mutex::new(None),
            max_pause,
        }
    }

    /// Close the gate for `delay`, at most `max_pause`. An already longer
    /// pause is kept.
    pub fn pause_for(&self, delay: Duration) {
        let now = Instant::now();
        let Some(deadline) = now.checked_add(delay.min(self.max_pause)) else {
            return;
        };
        if let Ok(mut until) = self.until.lock() {
            match *until {
                Some(current) if current >= deadline => {}
                _ => *until = Some(deadline),
            }
        }
    }

    /// Time left until the gate opens, `None` when open.
    pub fn remaining(&self) -> Option<Duration> {
        let until = self.until.lock().ok().and_then(|until| *until)?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }
}

pub struct Updater {
    source: Box<dyn AccrualSource>,
    throttle: Throttle,
}

impl Updater {
    pub fn new(source: impl AccrualSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            throttle: Throttle::default(),
        }
    }

    /// Cap the pause a single `Retry-After` can impose on every worker.
    pub fn with_max_pause(mut self, max_pause: Duration) -> Self {
        self.throttle = Throttle::new(max_pause);
        self
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Ask the authority for the status of `number`.
    ///
    /// Transport and decoding failures are the only errors. Rate limiting and
    /// unavailability map to [`Observation::Unavailable`]; unknown orders and
    /// unrecognized statuses to [`Observation::Unchanged`].
    pub async fn query_status(&self, number: &str) -> Result<Observation, AccrualError> {
        tracing::debug!(order = number, "querying accrual authority");
        let reply = self.source.fetch(number).await?;

        let observation = match reply {
            AccrualReply::NotRegistered => {
                tracing::info!(order = number, "order not registered at accrual authority");
                Observation::Unchanged
            }
            AccrualReply::RateLimited { retry_after } => {
                tracing::warn!(
                    order = number,
                    retry_after_secs = retry_after.map(|d| d.as_secs()),
                    "accrual authority is rate limiting"
                );
                if let Some(delay) = retry_after {
                    self.throttle.pause_for(delay);
                }
                Observation::Unavailable
            }
            AccrualReply::Unavailable => {
                tracing::warn!(order = number, "accrual authority unavailable");
                Observation::Unavailable
            }
            AccrualReply::Status { status, accrual } => {
                let Ok(status) = OrderStatus::try_from(status.as_str()) else {
                    tracing::warn!(order = number, status = %status, "unrecognized accrual status");
                    return Ok(Observation::Unchanged);
                };
                let accrual = match (status, accrual) {
                    (OrderStatus::Processed, Some(amount)) => {
                        MinorUnits::checked_from_decimal(amount).ok_or_else(|| {
                            AccrualError::Decode(format!(
                                "accrual {amount} for order {number} is out of range"
                            ))
                        })?
                    }
                    _ => MinorUnits::ZERO,
                };
                if accrual.get() < 0 {
                    return Err(AccrualError::Decode(format!(
                        "negative accrual {accrual} for order {number}"
                    )));
                }
                Observation::Status { status, accrual }
            }
        };

        Ok(observation)
    }
}
