//! Aggregate delivery progress.

use tokio::sync::mpsc;

use crate::transport::{Transaction, TransportEvent};

/// Normalizes per-message render progress and finalized-transaction
/// counts into one 0–100 aggregate over the whole queue.
#[derive(Debug)]
pub(super) struct ProgressTracker {
    total: usize,
    finished: usize,
    last_emitted: u8,
}

impl ProgressTracker {
    pub(super) fn new(total: usize) -> Self {
        Self {
            total: total.max(1),
            finished: 0,
            last_emitted: 0,
        }
    }

    /// Accounts one finalized transaction.
    pub(super) fn transaction_done(&mut self, events: &mpsc::UnboundedSender<TransportEvent>) {
        self.finished += 1;
        let aggregate = (self.finished * 100 / self.total).min(100);
        self.emit(events, aggregate);
    }

    /// Publishes the in-flight message's chunk progress on its
    /// transaction and folds it into the aggregate.
    pub(super) fn message_progress(
        &mut self,
        events: &mpsc::UnboundedSender<TransportEvent>,
        txn: &Transaction,
        done: usize,
        total_chunks: usize,
    ) {
        let percent = if total_chunks == 0 {
            100
        } else {
            (done * 100 / total_chunks).min(100)
        };
        txn.set_progress(u8::try_from(percent).unwrap_or(100));

        let aggregate = ((self.finished * 100 + percent) / self.total).min(100);
        self.emit(events, aggregate);
    }

    fn emit(&mut self, events: &mpsc::UnboundedSender<TransportEvent>, aggregate: usize) {
        let aggregate = u8::try_from(aggregate).unwrap_or(100);
        if aggregate > self.last_emitted {
            self.last_emitted = aggregate;
            let _ = events.send(TransportEvent::Progress(aggregate));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::Transaction;

    fn drain(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TransportEvent::Progress(p) = event {
                out.push(p);
            }
        }
        out
    }

    #[test]
    fn aggregate_is_monotone_and_clamped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tracker = ProgressTracker::new(2);
        let txn = Transaction::new("<a@b>".to_string());

        tracker.message_progress(&tx, &txn, 1, 4);
        tracker.message_progress(&tx, &txn, 4, 4);
        tracker.transaction_done(&tx);
        tracker.transaction_done(&tx);
        tracker.transaction_done(&tx); // over-count must clamp

        let values = drain(&mut rx);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*values.last().unwrap(), 100);
    }

    #[test]
    fn per_transaction_progress_is_published() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut tracker = ProgressTracker::new(1);
        let txn = Transaction::new("<a@b>".to_string());

        tracker.message_progress(&tx, &txn, 2, 8);
        assert_eq!(*txn.progress().borrow(), 25);
        tracker.message_progress(&tx, &txn, 8, 8);
        assert_eq!(*txn.progress().borrow(), 100);
    }
}
