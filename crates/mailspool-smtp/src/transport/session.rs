//! One SMTP session over one connection.
//!
//! The session drives the protocol conversation for the whole transaction
//! queue: banner, EHLO (with HELO fallback), the STARTTLS policy, the
//! AUTH challenge loop, and the MAIL/RCPT/DATA cycle per queued message.
//! Every outbound command suspends until the next complete reply; a
//! single inactivity deadline re-arms on each write and completed reply.

use std::collections::VecDeque;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::command::Command;
use crate::connection::{ServerInfo, SmtpStream};
use crate::error::{Error, TransactionErrorKind};
use crate::parser::ReplyAccumulator;
use crate::sasl;
use crate::transport::config::{AuthMech, TlsLevel, TransportConfig};
use crate::transport::progress::ProgressTracker;
use crate::transport::{Delivery, TransportEvent};
use crate::types::{AuthMechanism, Extension, Reply};

/// How a session ended, from the transport's perspective.
#[derive(Debug)]
pub(super) enum SessionEnd {
    /// Queue drained; QUIT was exchanged.
    Drained,
    /// TLS was required but unavailable; the queue has been finalized.
    TlsUnavailable,
    /// A session-level protocol error; the queue has been finalized.
    ProtocolError,
    /// The inactivity deadline expired.
    TimedOut,
    /// The caller aborted the session.
    Aborted,
    /// The connection dropped or failed mid-session.
    Dropped(String),
}

/// I/O-level failures that unwind the session.
enum IoFailure {
    Timeout,
    Aborted,
    Protocol(String),
    Io(String),
}

enum BodyError {
    Render(String),
    Io(IoFailure),
}

pub(super) struct Session<'a> {
    pub config: &'a TransportConfig,
    pub queue: &'a mut VecDeque<Delivery>,
    pub events: &'a mpsc::UnboundedSender<TransportEvent>,
    pub progress: &'a mut ProgressTracker,
    pub reached_rts: &'a mut bool,
    pub abort: watch::Receiver<bool>,
    pub stream: Option<SmtpStream>,
    pub tls_host: String,
    pub deadline: Instant,
}

impl Session<'_> {
    /// Runs the session to an end state. Queue finalization for halting
    /// end states happens in here; `Dropped`/`TimedOut`/`Aborted` leave
    /// the queue to the transport's disconnect handling.
    pub(super) async fn drive(mut self) -> SessionEnd {
        match self.run_protocol().await {
            Ok(end) => end,
            Err(IoFailure::Timeout) => SessionEnd::TimedOut,
            Err(IoFailure::Aborted) => SessionEnd::Aborted,
            Err(IoFailure::Io(e)) => SessionEnd::Dropped(e),
            Err(IoFailure::Protocol(e)) => {
                tracing::warn!(error = %e, "protocol error, closing session");
                self.finalize_all(TransactionErrorKind::Response, Some(e), None);
                self.quit_best_effort().await;
                SessionEnd::ProtocolError
            }
        }
    }

    async fn run_protocol(&mut self) -> Result<SessionEnd, IoFailure> {
        // Banner
        let banner = self.read_reply().await?;
        if banner.code() != 220 {
            return Ok(self.session_error(&banner).await);
        }

        // EHLO, falling back to HELO on an invalid-command error.
        let ehlo = Command::Ehlo {
            hostname: self.config.system_identifier.clone(),
        };
        self.write_command(&ehlo).await?;
        let reply = self.read_reply().await?;

        let mut server = ServerInfo::default();
        if (500..510).contains(&reply.code()) {
            let helo = Command::Helo {
                hostname: self.config.system_identifier.clone(),
            };
            self.write_command(&helo).await?;
            let reply = self.read_reply().await?;
            if reply.code() != 250 {
                return Ok(self.session_error(&reply).await);
            }
            // A HELO-only server offers no STARTTLS.
            if self.config.tls_level == TlsLevel::Required {
                return Ok(self.tls_required_halt().await);
            }
        } else if reply.code() == 250 {
            server = ServerInfo::from_ehlo_lines(&reply.lines);

            let want_tls = match self.config.tls_level {
                TlsLevel::Disabled => false,
                TlsLevel::Optional => server.supports_starttls(),
                TlsLevel::Required => {
                    if !server.supports_starttls() {
                        return Ok(self.tls_required_halt().await);
                    }
                    true
                }
            };

            if want_tls {
                self.write_command(&Command::StartTls).await?;
                let reply = self.read_reply().await?;
                match reply.code() {
                    220 => {
                        self.upgrade_tls().await?;
                        // RFC 3207 section 4.2: the pre-TLS capabilities
                        // are void; re-enumerate over the encrypted
                        // channel.
                        self.write_command(&ehlo).await?;
                        let reply = self.read_reply().await?;
                        if reply.code() != 250 {
                            return Ok(self.session_error(&reply).await);
                        }
                        server = ServerInfo::from_ehlo_lines(&reply.lines);
                    }
                    454 => {
                        if self.config.tls_level == TlsLevel::Required {
                            return Ok(self.tls_required_halt().await);
                        }
                        tracing::warn!("server refused STARTTLS, continuing in plaintext");
                    }
                    _ => return Ok(self.session_error(&reply).await),
                }
            }
        } else {
            return Ok(self.session_error(&reply).await);
        }

        // Authentication
        let selected = self.select_mechanism(&server);
        let mut authenticated = false;
        if let Some(mechanism) = selected {
            if !self.config.user.is_empty() || !self.config.password.is_empty() {
                self.authenticate(mechanism).await?;
                authenticated = true;
            }
        }

        self.send_queue(selected, authenticated).await
    }

    /// Picks the mechanism to use, honoring the AutoSelect preference
    /// order. A server that advertises no AUTH extension gets none.
    fn select_mechanism(&self, server: &ServerInfo) -> Option<AuthMechanism> {
        let advertises_auth = server
            .extensions
            .iter()
            .any(|e| matches!(e, Extension::Auth(_)));
        if !advertises_auth {
            return None;
        }

        match self.config.auth_mech {
            AuthMech::Disabled => None,
            AuthMech::AutoSelect => {
                let advertised = server.auth_mechanisms();
                [
                    AuthMechanism::CramMd5,
                    AuthMechanism::Login,
                    AuthMechanism::Plain,
                ]
                .into_iter()
                .find(|m| advertised.contains(m))
            }
            AuthMech::CramMd5 => Some(AuthMechanism::CramMd5),
            AuthMech::Login => Some(AuthMechanism::Login),
            AuthMech::Plain => Some(AuthMechanism::Plain),
        }
    }

    /// Runs the AUTH challenge/response loop until 235.
    async fn authenticate(&mut self, mechanism: AuthMechanism) -> Result<(), IoFailure> {
        self.write_command(&Command::Auth { mechanism }).await?;
        loop {
            let reply = self.read_reply().await?;
            match reply.code() {
                334 => {
                    let challenge = reply.message().trim();
                    let response = match mechanism {
                        AuthMechanism::CramMd5 => sasl::cram_md5_response(
                            challenge,
                            &self.config.user,
                            &self.config.password,
                        ),
                        AuthMechanism::Login => sasl::login_response(
                            challenge,
                            &self.config.user,
                            &self.config.password,
                        ),
                        AuthMechanism::Plain => {
                            sasl::plain_response(&self.config.user, &self.config.password)
                        }
                    };
                    self.write_command(&Command::AuthResponse(response)).await?;
                }
                235 => return Ok(()),
                _ => {
                    return Err(IoFailure::Protocol(format!(
                        "authentication failed: {} {}",
                        reply.code(),
                        reply.message()
                    )));
                }
            }
        }
    }

    /// The ready-to-send cycle: envelope preflight, MAIL/RCPT/DATA per
    /// message, RSET recovery on per-message errors, QUIT when drained.
    async fn send_queue(
        &mut self,
        mechanism: Option<AuthMechanism>,
        authenticated: bool,
    ) -> Result<SessionEnd, IoFailure> {
        loop {
            *self.reached_rts = true;

            // Envelope preflight; invalid messages finalize locally and
            // the session continues.
            let envelope = loop {
                let Some(front) = self.queue.front() else {
                    self.write_command(&Command::Quit).await?;
                    // Closing transitions straight to disconnect; the
                    // farewell is read best-effort and never answered.
                    let _ = self.read_reply().await;
                    return Ok(SessionEnd::Drained);
                };

                if front.envelope.sender.is_none() {
                    self.finalize_front(TransactionErrorKind::NoSender, None, None);
                    continue;
                }
                if front.envelope.recipients.is_empty() {
                    self.finalize_front(TransactionErrorKind::NoRecipients, None, None);
                    continue;
                }
                break front.envelope.clone();
            };

            if let Some(front) = self.queue.front() {
                let encrypted = self.stream.as_ref().is_some_and(SmtpStream::is_encrypted);
                front.txn.set_session_info(
                    encrypted,
                    encrypted.then(|| self.config.tls_parameters.clone()),
                    authenticated,
                    mechanism,
                    self.config.user.clone(),
                );
            }

            let sender = envelope.sender.clone().unwrap_or_default();
            tracing::debug!(sender = %sender, recipients = envelope.recipients.len(), "delivering message");

            self.write_command(&Command::MailFrom { addr_spec: sender }).await?;
            let reply = self.read_reply().await?;
            if reply.code() != 250 {
                self.recover_message(&reply).await?;
                continue;
            }

            let mut rejected = false;
            for recipient in &envelope.recipients {
                self.write_command(&Command::RcptTo {
                    addr_spec: recipient.clone(),
                })
                .await?;
                let reply = self.read_reply().await?;
                if reply.code() != 250 {
                    self.recover_message(&reply).await?;
                    rejected = true;
                    break;
                }
            }
            if rejected {
                continue;
            }

            self.write_command(&Command::Data).await?;
            let reply = self.read_reply().await?;
            if reply.code() != 354 {
                self.recover_message(&reply).await?;
                continue;
            }

            match self.stream_body().await {
                Ok(ends_with_crlf) => {
                    let terminator: &[u8] = if ends_with_crlf { b".\r\n" } else { b"\r\n.\r\n" };
                    self.write_raw(terminator).await?;
                }
                Err(BodyError::Render(text)) => {
                    // The protocol cannot recover mid-DATA; fail this
                    // transaction and drop the connection.
                    self.finalize_front(TransactionErrorKind::Data, Some(text), None);
                    self.stream = None;
                    return Ok(SessionEnd::Dropped("message rendering failed".into()));
                }
                Err(BodyError::Io(failure)) => return Err(failure),
            }

            let reply = self.read_reply().await?;
            if reply.code() == 250 {
                if let Some(delivery) = self.queue.pop_front() {
                    delivery.txn.set_status(reply.code(), reply.text());
                    delivery.txn.finalize(TransactionErrorKind::NoError, None);
                    let _ = self
                        .events
                        .send(TransportEvent::TransactionFinished(delivery.txn));
                    self.progress.transaction_done(self.events);
                }
                continue;
            }
            self.recover_message(&reply).await?;
        }
    }

    /// Streams the rendered message body, returning whether the last
    /// written byte pair was a CRLF.
    async fn stream_body(&mut self) -> Result<bool, BodyError> {
        let mut crlf_state = 0u8;
        loop {
            if *self.abort.borrow() {
                return Err(BodyError::Io(IoFailure::Aborted));
            }

            let Some(front) = self.queue.front_mut() else {
                return Err(BodyError::Io(IoFailure::Io("queue emptied mid-DATA".into())));
            };
            front
                .renderer
                .pump()
                .map_err(|e| BodyError::Render(e.to_string()))?;

            let (done, total) = front.renderer.progress();
            self.progress
                .message_progress(self.events, &front.txn, done, total);

            let written = {
                let Some(stream) = self.stream.as_mut() else {
                    return Err(BodyError::Io(IoFailure::Io("connection closed".into())));
                };
                let view = front.renderer.view();
                if view.is_empty() {
                    if front.renderer.is_finished() {
                        break;
                    }
                    continue;
                }

                track_crlf(&mut crlf_state, view);
                match tokio::time::timeout_at(self.deadline, stream.write_all(view)).await {
                    Err(_) => return Err(BodyError::Io(IoFailure::Timeout)),
                    Ok(Err(e)) => return Err(BodyError::Io(IoFailure::Io(e.to_string()))),
                    Ok(Ok(())) => view.len(),
                }
            };

            if let Some(front) = self.queue.front_mut() {
                front.renderer.consume(written);
            }
            self.deadline = Instant::now() + self.config.timeout;
        }

        // Account the final chunks that completed without producing bytes.
        if let Some(front) = self.queue.front_mut() {
            let (done, total) = front.renderer.progress();
            self.progress
                .message_progress(self.events, &front.txn, done, total);
        }
        Ok(crlf_state == 2)
    }

    /// Per-message recovery: finalize the front transaction with the
    /// server's reply, reset the protocol, and carry on with the next
    /// message on the same session.
    async fn recover_message(&mut self, reply: &Reply) -> Result<(), IoFailure> {
        tracing::debug!(code = reply.code(), "message rejected, resetting transaction");
        self.finalize_front(TransactionErrorKind::Response, None, Some(reply));
        self.write_command(&Command::Rset).await?;
        let _ = self.read_reply().await?;
        Ok(())
    }

    /// Session-level protocol failure: every remaining transaction gets
    /// the server status, then the session closes via QUIT.
    async fn session_error(&mut self, reply: &Reply) -> SessionEnd {
        tracing::warn!(code = reply.code(), text = %reply.text(), "unrecoverable protocol error");
        self.finalize_all(TransactionErrorKind::Response, None, Some(reply));
        self.quit_best_effort().await;
        SessionEnd::ProtocolError
    }

    async fn tls_required_halt(&mut self) -> SessionEnd {
        tracing::warn!("TLS required but not available, refusing delivery");
        self.finalize_all(TransactionErrorKind::TlsRequired, None, None);
        self.quit_best_effort().await;
        SessionEnd::TlsUnavailable
    }

    async fn quit_best_effort(&mut self) {
        if self.write_command(&Command::Quit).await.is_ok() {
            let _ = self.read_reply().await;
        }
        self.stream = None;
    }

    async fn upgrade_tls(&mut self) -> Result<(), IoFailure> {
        let Some(stream) = self.stream.take() else {
            return Err(IoFailure::Io("connection closed".into()));
        };
        match stream
            .upgrade_to_tls(&self.tls_host, &self.config.tls_parameters)
            .await
        {
            Ok(tls) => {
                tracing::debug!("TLS handshake complete");
                self.stream = Some(tls);
                self.deadline = Instant::now() + self.config.timeout;
                Ok(())
            }
            Err(e) => Err(IoFailure::Io(e.to_string())),
        }
    }

    fn finalize_front(
        &mut self,
        kind: TransactionErrorKind,
        text: Option<String>,
        reply: Option<&Reply>,
    ) {
        if let Some(delivery) = self.queue.pop_front() {
            if let Some(reply) = reply {
                delivery.txn.set_status(reply.code(), reply.text());
            }
            delivery.txn.finalize(kind, text);
            let _ = self
                .events
                .send(TransportEvent::TransactionFinished(delivery.txn));
            self.progress.transaction_done(self.events);
        }
    }

    fn finalize_all(
        &mut self,
        kind: TransactionErrorKind,
        text: Option<String>,
        reply: Option<&Reply>,
    ) {
        while !self.queue.is_empty() {
            self.finalize_front(kind, text.clone(), reply);
        }
    }

    /// Reads lines until a complete reply is assembled, bounded by the
    /// inactivity deadline and the abort signal.
    async fn read_reply(&mut self) -> Result<Reply, IoFailure> {
        let mut accumulator = ReplyAccumulator::new();
        loop {
            let line = self.read_line().await?;
            match accumulator.push(&line) {
                Ok(Some(reply)) => {
                    tracing::trace!(code = reply.code(), "reply complete");
                    self.deadline = Instant::now() + self.config.timeout;
                    return Ok(reply);
                }
                Ok(None) => {}
                Err(Error::Protocol(e)) => return Err(IoFailure::Protocol(e)),
                Err(e) => return Err(IoFailure::Io(e.to_string())),
            }
        }
    }

    async fn read_line(&mut self) -> Result<String, IoFailure> {
        let deadline = self.deadline;
        let Some(stream) = self.stream.as_mut() else {
            return Err(IoFailure::Io("connection closed".into()));
        };
        let abort = &mut self.abort;

        tokio::select! {
            _ = abort.wait_for(|aborted| *aborted) => Err(IoFailure::Aborted),
            result = tokio::time::timeout_at(deadline, stream.read_line()) => match result {
                Err(_) => Err(IoFailure::Timeout),
                Ok(Ok(line)) => Ok(line),
                Ok(Err(e)) => Err(IoFailure::Io(e.to_string())),
            },
        }
    }

    async fn write_command(&mut self, command: &Command) -> Result<(), IoFailure> {
        self.write_raw(&command.serialize()).await
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<(), IoFailure> {
        if *self.abort.borrow() {
            return Err(IoFailure::Aborted);
        }
        let deadline = self.deadline;
        let Some(stream) = self.stream.as_mut() else {
            return Err(IoFailure::Io("connection closed".into()));
        };

        match tokio::time::timeout_at(deadline, stream.write_all(data)).await {
            Err(_) => Err(IoFailure::Timeout),
            Ok(Ok(())) => {
                self.deadline = Instant::now() + self.config.timeout;
                Ok(())
            }
            Ok(Err(e)) => Err(IoFailure::Io(e.to_string())),
        }
    }
}

/// Tracks whether the stream of written chunks currently ends in CRLF.
fn track_crlf(state: &mut u8, chunk: &[u8]) {
    for &byte in chunk {
        *state = match (byte, *state) {
            (b'\r', _) => 1,
            (b'\n', 1) => 2,
            _ => 0,
        };
    }
}
