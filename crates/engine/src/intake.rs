//! Order intake: the producer side of the task queue.

use std::sync::Arc;

use crate::{EngineError, Order, OrderLedger, ResultEngine, Task, TaskQueue, luhn};

/// Result of submitting an order number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    /// New order stored and queued for reconciliation.
    Accepted,
    /// The same user already submitted this number; nothing changed.
    AlreadyUploaded,
}

/// Validates, stores and enqueues submitted order numbers.
#[derive(Clone)]
pub struct OrderIntake {
    ledger: Arc<dyn OrderLedger>,
    queue: TaskQueue,
}

impl OrderIntake {
    pub fn new(ledger: Arc<dyn OrderLedger>, queue: TaskQueue) -> Self {
        Self { ledger, queue }
    }

    /// Submit `number` on behalf of `owner`.
    ///
    /// Fails with [`EngineError::InvalidNumber`] on a bad check digit and with
    /// [`EngineError::Conflict`] when another user owns the number.
    pub async fn submit(&self, owner: &str, number: &str) -> ResultEngine<Submission> {
        let number = number.trim();
        if number.is_empty() {
            return Err(EngineError::InvalidNumber(
                "order number must not be empty".to_string(),
            ));
        }
        if !luhn::is_valid(number) {
            return Err(EngineError::InvalidNumber(number.to_string()));
        }

        match self.ledger.insert_order(owner, number).await {
            Ok(_) => {}
            Err(EngineError::ExistingKey(_)) => {
                let existing = self.ledger.order_by_number(number).await?;
                if existing.owner != owner {
                    return Err(EngineError::Conflict(format!(
                        "order {number} was uploaded by another user"
                    )));
                }
                return Ok(Submission::AlreadyUploaded);
            }
            Err(err) => return Err(err),
        }

        self.queue.push(Task::new(number)).await;
        tracing::info!(order = number, owner, "order accepted for processing");
        Ok(Submission::Accepted)
    }

    /// Orders of `owner`, newest first.
    pub async fn orders(&self, owner: &str) -> ResultEngine<Vec<Order>> {
        self.ledger.list_orders(owner).await
    }
}
