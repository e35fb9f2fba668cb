//! The SMTP transport: queue, session lifecycle, and events.

mod config;
mod progress;
mod session;
mod transaction;

pub use config::{AuthMech, TlsLevel, TransportConfig, TransportConfigBuilder};
pub use transaction::Transaction;

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use mailspool_mime::{Message, MessageRenderer};

use crate::connection::SmtpStream;
use crate::error::TransactionErrorKind;
use crate::resolver::{self, IpProtocol};

use progress::ProgressTracker;
use session::{Session, SessionEnd};

/// Events emitted by the transport while a delivery run is in flight.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Aggregate progress over all queued transactions, 0–100.
    Progress(u8),
    /// One transaction has been finalized.
    TransactionFinished(Transaction),
    /// All queued transactions have been processed and the connection is
    /// closed.
    Finished,
}

/// Envelope derived from a message at enqueue time.
#[derive(Debug, Clone)]
pub(crate) struct Envelope {
    pub sender: Option<String>,
    pub recipients: Vec<String>,
}

impl Envelope {
    /// Sender precedence: the explicit sender field when valid, else the
    /// first valid From address. Recipients are To ++ Cc ++ Bcc as bare
    /// addr-specs, deduplicated keeping the first occurrence.
    fn derive(message: &Message) -> Self {
        let sender = message
            .sender()
            .filter(|a| a.is_valid())
            .or_else(|| message.from().first().filter(|a| a.is_valid()))
            .map(|a| a.addr_spec().to_string());

        let mut recipients = Vec::new();
        for address in message
            .to()
            .iter()
            .chain(message.cc())
            .chain(message.bcc())
        {
            if !address.is_valid() {
                continue;
            }
            let spec = address.addr_spec().to_string();
            if !recipients.contains(&spec) {
                recipients.push(spec);
            }
        }

        Self { sender, recipients }
    }
}

/// One queued message: its transaction handle, derived envelope, and the
/// renderer bound at enqueue time.
pub(crate) struct Delivery {
    pub txn: Transaction,
    pub envelope: Envelope,
    pub renderer: MessageRenderer,
}

/// Handle for aborting a running delivery from outside the session.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    inner: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Drops the connection and finalizes all pending transactions with
    /// the Aborted classification.
    pub fn abort(&self) {
        // send_replace stores the flag even while nothing is subscribed.
        let _ = self.inner.send_replace(true);
    }
}

/// Asynchronous SMTP submission transport.
///
/// Queue messages with [`SmtpTransport::enqueue`], then deliver the whole
/// queue over one server connection with [`SmtpTransport::run`] (or
/// [`SmtpTransport::run_addr`] to skip resolution). Outcomes surface on
/// the per-message [`Transaction`] handles and on the event stream from
/// [`SmtpTransport::take_events`].
///
/// A session borrows the transport mutably for its whole duration, so the
/// queue cannot change and the configuration cannot be edited while
/// delivery is in flight.
pub struct SmtpTransport {
    config: TransportConfig,
    queue: VecDeque<Delivery>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    abort: Arc<watch::Sender<bool>>,
}

impl SmtpTransport {
    /// Creates a transport with the given configuration.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (abort, _) = watch::channel(false);
        Self {
            config,
            queue: VecDeque::new(),
            events_tx,
            events_rx: Some(events_rx),
            abort: Arc::new(abort),
        }
    }

    /// Returns the transport configuration.
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Returns the number of messages waiting for delivery.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Takes the event stream. Yields `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events_rx.take()
    }

    /// Returns a handle that aborts a running delivery.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            inner: Arc::clone(&self.abort),
        }
    }

    /// Queues a message and returns its transaction handle.
    ///
    /// The envelope is derived and the renderer bound immediately; the
    /// message itself moves into the renderer.
    pub fn enqueue(&mut self, message: Message) -> Transaction {
        let txn = Transaction::new(message.message_id().to_string());
        let envelope = Envelope::derive(&message);
        let renderer = MessageRenderer::new(message);
        self.queue.push_back(Delivery {
            txn: txn.clone(),
            envelope,
            renderer,
        });
        txn
    }

    /// Delivers the queue to `host:port`, resolving the hostname first
    /// and connecting to one record picked uniformly at random.
    ///
    /// All failures surface through the transactions and the event
    /// stream; the final event is always [`TransportEvent::Finished`].
    pub async fn run(&mut self, host: &str, port: u16, protocol: IpProtocol) {
        if self.queue.is_empty() {
            let _ = self.events_tx.send(TransportEvent::Finished);
            return;
        }

        let records = match resolver::resolve(host, protocol).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(host, error = %e, "resolution failed");
                let mut progress = ProgressTracker::new(self.queue.len());
                self.finalize_queue(
                    &mut progress,
                    TransactionErrorKind::Resolver,
                    Some(e.to_string()),
                );
                let _ = self.events_tx.send(TransportEvent::Finished);
                return;
            }
        };

        let Some(address) = resolver::pick_random(&records) else {
            // resolve() never returns an empty set.
            let _ = self.events_tx.send(TransportEvent::Finished);
            return;
        };
        tracing::debug!(host, %address, "resolved");
        self.run_at(SocketAddr::new(address, port), host.to_string())
            .await;
    }

    /// Delivers the queue to a known address, skipping resolution.
    pub async fn run_addr(&mut self, address: IpAddr, port: u16) {
        if self.queue.is_empty() {
            let _ = self.events_tx.send(TransportEvent::Finished);
            return;
        }
        self.run_at(SocketAddr::new(address, port), address.to_string())
            .await;
    }

    async fn run_at(&mut self, addr: SocketAddr, tls_host: String) {
        let _ = self.abort.send_replace(false);

        let mut progress = ProgressTracker::new(self.queue.len());
        let mut reached_rts = false;
        let mut fruitless_drops = 0u32;

        loop {
            let deadline = Instant::now() + self.config.timeout;
            let stream = match self.connect_guarded(addr, deadline).await {
                ConnectOutcome::Connected(stream) => stream,
                ConnectOutcome::TimedOut => {
                    self.finalize_queue(&mut progress, TransactionErrorKind::Timeout, None);
                    break;
                }
                ConnectOutcome::Aborted => {
                    self.finalize_queue(&mut progress, TransactionErrorKind::Aborted, None);
                    break;
                }
                ConnectOutcome::Failed(e) => {
                    self.finalize_queue(
                        &mut progress,
                        TransactionErrorKind::Connection,
                        Some(e),
                    );
                    break;
                }
            };

            let queued_before = self.queue.len();
            let session = Session {
                config: &self.config,
                queue: &mut self.queue,
                events: &self.events_tx,
                progress: &mut progress,
                reached_rts: &mut reached_rts,
                abort: self.abort.subscribe(),
                stream: Some(stream),
                tls_host: tls_host.clone(),
                deadline,
            };

            match session.drive().await {
                SessionEnd::Drained
                | SessionEnd::TlsUnavailable
                | SessionEnd::ProtocolError => break,
                SessionEnd::TimedOut => {
                    self.finalize_queue(&mut progress, TransactionErrorKind::Timeout, None);
                    break;
                }
                SessionEnd::Aborted => {
                    self.finalize_queue(&mut progress, TransactionErrorKind::Aborted, None);
                    break;
                }
                SessionEnd::Dropped(reason) => {
                    if *self.abort.borrow() {
                        self.finalize_queue(&mut progress, TransactionErrorKind::Aborted, None);
                        break;
                    }
                    if self.queue.is_empty() {
                        break;
                    }
                    if !reached_rts {
                        self.finalize_queue(
                            &mut progress,
                            TransactionErrorKind::Connection,
                            Some(reason),
                        );
                        break;
                    }
                    // Resume once the session was usable at least once.
                    // Repeated drops without any delivered message mean
                    // the server is not going to cooperate.
                    if self.queue.len() < queued_before {
                        fruitless_drops = 0;
                    } else {
                        fruitless_drops += 1;
                        if fruitless_drops > 1 {
                            self.finalize_queue(
                                &mut progress,
                                TransactionErrorKind::Connection,
                                Some(reason),
                            );
                            break;
                        }
                    }
                    tracing::info!(reason = %reason, remaining = self.queue.len(), "reconnecting");
                }
            }
        }

        let _ = self.events_tx.send(TransportEvent::Finished);
    }

    async fn connect_guarded(&self, addr: SocketAddr, deadline: Instant) -> ConnectOutcome {
        let mut abort = self.abort.subscribe();
        if *abort.borrow() {
            return ConnectOutcome::Aborted;
        }

        tokio::select! {
            _ = abort.wait_for(|aborted| *aborted) => ConnectOutcome::Aborted,
            result = tokio::time::timeout_at(deadline, SmtpStream::connect(addr)) => match result {
                Err(_) => ConnectOutcome::TimedOut,
                Ok(Ok(stream)) => ConnectOutcome::Connected(stream),
                Ok(Err(e)) => ConnectOutcome::Failed(e.to_string()),
            },
        }
    }

    fn finalize_queue(
        &mut self,
        progress: &mut ProgressTracker,
        kind: TransactionErrorKind,
        text: Option<String>,
    ) {
        while let Some(delivery) = self.queue.pop_front() {
            delivery.txn.finalize(kind, text.clone());
            let _ = self
                .events_tx
                .send(TransportEvent::TransactionFinished(delivery.txn));
            progress.transaction_done(&self.events_tx);
        }
    }
}

enum ConnectOutcome {
    Connected(SmtpStream),
    TimedOut,
    Aborted,
    Failed(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mailspool_mime::Address;

    fn message(from: &str, to: &[&str], cc: &[&str], bcc: &[&str]) -> Message {
        let mut msg = Message::new();
        msg.set_from(Address::new(from));
        for addr in to {
            msg.append_to(Address::new(*addr));
        }
        for addr in cc {
            msg.append_cc(Address::new(*addr));
        }
        for addr in bcc {
            msg.append_bcc(Address::new(*addr));
        }
        msg
    }

    #[test]
    fn envelope_concatenates_and_deduplicates() {
        let msg = message(
            "a@x.org",
            &["b@x.org", "c@x.org"],
            &["b@x.org"],
            &["d@x.org"],
        );
        let envelope = Envelope::derive(&msg);
        assert_eq!(envelope.sender.as_deref(), Some("a@x.org"));
        assert_eq!(envelope.recipients, vec!["b@x.org", "c@x.org", "d@x.org"]);
    }

    #[test]
    fn envelope_prefers_explicit_sender() {
        let mut msg = message("from@x.org", &["to@x.org"], &[], &[]);
        msg.set_sender(Address::new("bounce@x.org"));
        let envelope = Envelope::derive(&msg);
        assert_eq!(envelope.sender.as_deref(), Some("bounce@x.org"));
    }

    #[test]
    fn envelope_falls_back_past_invalid_sender() {
        let mut msg = message("from@x.org", &["to@x.org"], &[], &[]);
        msg.set_sender(Address::new("not-an-address"));
        let envelope = Envelope::derive(&msg);
        assert_eq!(envelope.sender.as_deref(), Some("from@x.org"));
    }

    #[test]
    fn envelope_without_sender_or_recipients() {
        let msg = Message::new();
        let envelope = Envelope::derive(&msg);
        assert!(envelope.sender.is_none());
        assert!(envelope.recipients.is_empty());
    }

    #[test]
    fn enqueue_returns_live_handle() {
        let mut transport = SmtpTransport::new(TransportConfig::new());
        let txn = transport.enqueue(message("a@x.org", &["b@x.org"], &[], &[]));
        assert_eq!(transport.queued(), 1);
        assert!(!txn.is_finished());
        assert!(txn.message_id().contains('@'));
    }

    #[tokio::test]
    async fn run_with_empty_queue_finishes_immediately() {
        let mut transport = SmtpTransport::new(TransportConfig::new());
        let mut events = transport.take_events().unwrap();
        transport
            .run_addr(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 2525)
            .await;
        assert!(matches!(events.try_recv(), Ok(TransportEvent::Finished)));
    }
}
