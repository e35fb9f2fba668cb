//! Per-message delivery transaction.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::connection::TlsParameters;
use crate::error::TransactionErrorKind;
use crate::types::AuthMechanism;

#[derive(Debug, Default, Clone)]
struct TransactionState {
    error: TransactionErrorKind,
    error_text: String,
    status: u16,
    status_text: String,
    encrypted: bool,
    tls_parameters: Option<TlsParameters>,
    authenticated: bool,
    auth_mechanism: Option<AuthMechanism>,
    username: String,
    finished: bool,
}

#[derive(Debug)]
struct Inner {
    message_id: String,
    state: Mutex<TransactionState>,
    progress: watch::Sender<u8>,
    done: watch::Sender<bool>,
}

/// Handle for one queued message delivery.
///
/// Returned by [`SmtpTransport::enqueue`](crate::SmtpTransport::enqueue).
/// The handle is cheap to clone and stays valid after delivery; the final
/// outcome is readable through the accessors once [`Transaction::finished`]
/// resolves. Exactly one completion is signalled per transaction, and the
/// error classification is recorded before the completion becomes visible.
#[derive(Debug, Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

impl Transaction {
    pub(crate) fn new(message_id: String) -> Self {
        let (progress, _) = watch::channel(0);
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                message_id,
                state: Mutex::new(TransactionState::default()),
                progress,
                done,
            }),
        }
    }

    /// Returns the message id of the queued message.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.inner.message_id
    }

    /// Returns a watch over the delivery progress (0–100, non-decreasing).
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<u8> {
        self.inner.progress.subscribe()
    }

    /// Waits until the transaction has been finalized.
    pub async fn finished(&self) {
        let mut done = self.inner.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Returns true once the transaction has been finalized.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Returns the terminal error classification.
    #[must_use]
    pub fn error(&self) -> TransactionErrorKind {
        self.lock().error
    }

    /// Returns the human-readable error text.
    #[must_use]
    pub fn error_text(&self) -> String {
        self.lock().error_text.clone()
    }

    /// Returns the last server reply code recorded for this transaction.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.lock().status
    }

    /// Returns the last server reply text, lines joined with spaces.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.lock().status_text.clone()
    }

    /// Returns true if the message was submitted over TLS.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.lock().encrypted
    }

    /// Returns the TLS parameters in effect during submission.
    #[must_use]
    pub fn tls_parameters(&self) -> Option<TlsParameters> {
        self.lock().tls_parameters.clone()
    }

    /// Returns true if the session authenticated before submission.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.lock().authenticated
    }

    /// Returns the authentication mechanism that was used.
    #[must_use]
    pub fn auth_mechanism(&self) -> Option<AuthMechanism> {
        self.lock().auth_mechanism
    }

    /// Returns the username the session authenticated with.
    #[must_use]
    pub fn username(&self) -> String {
        self.lock().username.clone()
    }

    pub(crate) fn set_session_info(
        &self,
        encrypted: bool,
        tls_parameters: Option<TlsParameters>,
        authenticated: bool,
        auth_mechanism: Option<AuthMechanism>,
        username: String,
    ) {
        let mut state = self.lock();
        state.encrypted = encrypted;
        state.tls_parameters = tls_parameters;
        state.authenticated = authenticated;
        state.auth_mechanism = auth_mechanism;
        state.username = username;
    }

    pub(crate) fn set_status(&self, code: u16, text: String) {
        let mut state = self.lock();
        state.status = code;
        state.status_text = text;
    }

    /// Publishes a progress value, never going backwards.
    pub(crate) fn set_progress(&self, percent: u8) {
        let percent = percent.min(100);
        self.inner.progress.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }

    /// Records the terminal classification and signals completion.
    ///
    /// The first finalization wins; later calls are ignored.
    pub(crate) fn finalize(&self, kind: TransactionErrorKind, text: Option<String>) {
        {
            let mut state = self.lock();
            if state.finished {
                return;
            }
            state.error = kind;
            state.error_text = text.unwrap_or_else(|| kind.default_text().to_string());
            state.finished = true;
        }
        // send_replace stores the flag even while nothing is subscribed,
        // so a later finished() still observes completion.
        self.inner.done.send_replace(true);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TransactionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
