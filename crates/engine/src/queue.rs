//! Bounded FIFO of pending reconciliation tasks.
//!
//! Producers (order intake, startup re-seeding, delayed requeues) and
//! consumers (workers) share clones of one [`TaskQueue`]. Order numbers are
//! tracked from the first push until [`TaskQueue::complete`], so a number is
//! reconciled by at most one task at a time.

use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::{Mutex, mpsc};

use crate::OrderStatus;

/// Ephemeral unit of work: one order number and its last known status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub number: String,
    pub status: OrderStatus,
    /// Consecutive failed attempts, reset after a successful query.
    pub attempts: u32,
}

impl Task {
    /// A task for a freshly accepted order.
    pub fn new(number: impl Into<String>) -> Self {
        Self::with_status(number, OrderStatus::New)
    }

    /// A task resuming from a stored status.
    pub fn with_status(number: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            number: number.into(),
            status,
            attempts: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TaskQueue {
    sender: mpsc::Sender<Task>,
    receiver: Arc<Mutex<mpsc::Receiver<Task>>>,
    tracked: Arc<DashSet<String>>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            tracked: Arc::new(DashSet::new()),
        }
    }

    /// Enqueue a task, waiting while the queue is full.
    ///
    /// Returns `false` without enqueuing when the number is already queued or
    /// in flight.
    pub async fn push(&self, task: Task) -> bool {
        if self.tracked.contains(&task.number) {
            tracing::debug!(order = %task.number, "task already in flight, merged");
            return false;
        }
        // Track only once a slot is held, so a cancelled push leaves no trace.
        let Ok(permit) = self.sender.reserve().await else {
            return false;
        };
        if !self.tracked.insert(task.number.clone()) {
            tracing::debug!(order = %task.number, "task already in flight, merged");
            return false;
        }
        permit.send(task);
        true
    }

    /// Put a task that is already tracked back at the tail of the queue.
    pub(crate) async fn requeue(&self, task: Task) {
        match self.sender.reserve().await {
            Ok(permit) => permit.send(task),
            Err(_) => self.complete(&task.number),
        }
    }

    /// Wait for the next task.
    ///
    /// Returns `None` only if every sender is gone, which cannot happen while
    /// this queue is alive.
    pub async fn pop(&self) -> Option<Task> {
        self.receiver.lock().await.recv().await
    }

    /// Stop tracking `number`; a later push for it is accepted again.
    pub fn complete(&self, number: &str) {
        self.tracked.remove(number);
    }

    /// Whether `number` is queued or in flight.
    pub fn is_tracked(&self, number: &str) -> bool {
        self.tracked.contains(number)
    }

    /// Tasks currently waiting in the channel.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn pops_in_fifo_order() {
        let queue = TaskQueue::new(4);
        assert!(queue.push(Task::new("1")).await);
        assert!(queue.push(Task::new("2")).await);

        assert_eq!(queue.pop().await.unwrap().number, "1");
        assert_eq!(queue.pop().await.unwrap().number, "2");
    }

    #[tokio::test]
    async fn duplicate_numbers_are_merged() {
        let queue = TaskQueue::new(4);
        assert!(queue.push(Task::new("18")).await);
        assert!(!queue.push(Task::new("18")).await);
        assert_eq!(queue.len(), 1);

        let task = queue.pop().await.unwrap();
        assert!(queue.is_tracked(&task.number));
        assert!(!queue.push(Task::new("18")).await);

        queue.complete(&task.number);
        assert!(!queue.is_tracked("18"));
        assert!(queue.push(Task::new("18")).await);
    }

    #[tokio::test]
    async fn push_waits_while_full() {
        let queue = TaskQueue::new(1);
        assert!(queue.push(Task::new("1")).await);

        let blocked = tokio::time::timeout(Duration::from_millis(20), queue.push(Task::new("2")));
        assert!(blocked.await.is_err());
        assert!(!queue.is_tracked("2"));

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(Task::new("3")).await })
        };
        assert_eq!(queue.pop().await.unwrap().number, "1");
        assert!(producer.await.unwrap());
        assert_eq!(queue.pop().await.unwrap().number, "3");
    }

    #[tokio::test]
    async fn pop_waits_for_a_producer() {
        let queue = TaskQueue::new(2);
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(Task::new("7")).await;
        assert_eq!(consumer.await.unwrap().unwrap().number, "7");
    }
}
