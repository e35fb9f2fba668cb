//! End-to-end transport tests against scripted local servers.
//!
//! Each test binds a listener on a loopback port and spawns a task that
//! plays the server side of the conversation, asserting the exact
//! commands the client sends.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::io::AsyncBufReadExt;
use tokio::net::{TcpListener, TcpStream};

use mailspool_mime::{Address, BodyPart, Message, MimePart};
use mailspool_smtp::{
    AuthMech, AuthMechanism, SmtpTransport, TlsLevel, TlsParameters, TransactionErrorKind,
    TransportConfig, TransportEvent, TrustPolicy,
};

/// Server side of one scripted connection.
struct ServerConn<S> {
    reader: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ServerConn<S> {
    fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }

    async fn send(&mut self, data: &str) {
        self.reader
            .get_mut()
            .write_all(data.as_bytes())
            .await
            .expect("server write");
    }

    async fn recv(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.expect("server read");
        assert!(n > 0, "client closed unexpectedly");
        line.trim_end().to_string()
    }

    async fn expect(&mut self, expected: &str) {
        assert_eq!(self.recv().await, expected);
    }

    /// Reads DATA content until the terminating dot line.
    async fn recv_body(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.recv().await;
            if line == "." {
                return lines;
            }
            lines.push(line);
        }
    }

    /// Reads until the client closes the connection.
    async fn drain(mut self) {
        let mut buf = [0u8; 256];
        while matches!(self.reader.read(&mut buf).await, Ok(n) if n > 0) {}
    }

    fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

fn text_message(from: &str, to: &str, subject: &str, body: &str) -> Message {
    let mut msg = Message::new();
    msg.set_from(Address::new(from));
    msg.set_to(Address::new(to));
    msg.set_subject(subject);
    let mut part = MimePart::new(body);
    part.set_content_type("text/plain; charset=us-ascii");
    msg.set_body(part);
    msg
}

fn plain_config() -> TransportConfig {
    TransportConfig::builder()
        .tls_level(TlsLevel::Disabled)
        .auth_mech(AuthMech::Disabled)
        .build()
}

/// Greets, answers EHLO, and accepts one full message transaction.
async fn accept_one_message<S: AsyncRead + AsyncWrite + Unpin>(
    conn: &mut ServerConn<S>,
    sender: &str,
    recipient: &str,
) -> Vec<String> {
    conn.expect(&format!("MAIL FROM:<{sender}>")).await;
    conn.send("250 sender ok\r\n").await;
    conn.expect(&format!("RCPT TO:<{recipient}>")).await;
    conn.send("250 recipient ok\r\n").await;
    conn.expect("DATA").await;
    conn.send("354 go ahead\r\n").await;
    let body = conn.recv_body().await;
    conn.send("250 ok queued=42\r\n").await;
    body
}

#[tokio::test]
async fn plain_delivery_single_recipient() {
    let (listener, addr) = bind().await;

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.expect("accept");
        let mut conn = ServerConn::new(sock);
        conn.send("220 ready\r\n").await;
        conn.expect("EHLO localhost").await;
        conn.send("250-ok\r\n250 HELP\r\n").await;
        let body = accept_one_message(&mut conn, "a@x", "b@y").await;
        conn.expect("QUIT").await;
        conn.send("221 bye\r\n").await;
        body
    });

    let mut transport = SmtpTransport::new(plain_config());
    let mut events = transport.take_events().expect("events");
    let txn = transport.enqueue(text_message("a@x", "b@y", "hi", "hello world\r\n"));
    transport.run_addr(addr.ip(), addr.port()).await;

    txn.finished().await;
    assert_eq!(txn.error(), TransactionErrorKind::NoError);
    assert_eq!(txn.status(), 250);
    assert!(txn.status_text().contains("ok queued=42"));
    assert!(!txn.is_encrypted());
    assert!(!txn.is_authenticated());
    assert_eq!(*txn.progress().borrow(), 100);

    let body = server.await.expect("server task");
    assert!(body.iter().any(|l| l.starts_with("Subject: hi")));
    assert!(body.iter().any(|l| l.starts_with("Message-ID: <")));
    assert!(body.iter().any(|l| l == "hello world"));

    let mut saw_finished = false;
    let mut last_progress = 0u8;
    while let Ok(event) = events.try_recv() {
        match event {
            TransportEvent::Progress(p) => {
                assert!(p >= last_progress);
                last_progress = p;
            }
            TransportEvent::TransactionFinished(t) => {
                assert_eq!(t.message_id(), txn.message_id());
            }
            TransportEvent::Finished => saw_finished = true,
        }
    }
    assert!(saw_finished);
    assert_eq!(last_progress, 100);
}

#[tokio::test]
async fn starttls_optional_with_plain_auth() {
    let (listener, addr) = bind().await;

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.expect("accept");
        let mut conn = ServerConn::new(sock);
        conn.send("220 mail.test ready\r\n").await;
        conn.expect("EHLO localhost").await;
        conn.send("250-mail.test\r\n250-STARTTLS\r\n250 AUTH PLAIN\r\n")
            .await;
        conn.expect("STARTTLS").await;
        conn.send("220 go ahead\r\n").await;

        let tls = tls_accept(conn.into_inner()).await;
        let mut conn = ServerConn::new(tls);
        conn.expect("EHLO localhost").await;
        conn.send("250-mail.test\r\n250 AUTH PLAIN\r\n").await;
        conn.expect("AUTH PLAIN").await;
        conn.send("334 \r\n").await;
        // base64("\0u\0p")
        conn.expect("AHUAcA==").await;
        conn.send("235 authenticated\r\n").await;
        accept_one_message(&mut conn, "a@x", "b@y").await;
        conn.expect("QUIT").await;
        conn.send("221 bye\r\n").await;
    });

    let config = TransportConfig::builder()
        .tls_level(TlsLevel::Optional)
        .auth_mech(AuthMech::AutoSelect)
        .user("u")
        .password("p")
        .tls_parameters(TlsParameters {
            trust: TrustPolicy::AcceptAny,
            ..TlsParameters::default()
        })
        .build();
    let mut transport = SmtpTransport::new(config);
    let txn = transport.enqueue(text_message("a@x", "b@y", "secure", "over tls\r\n"));
    transport.run_addr(addr.ip(), addr.port()).await;

    txn.finished().await;
    assert_eq!(txn.error(), TransactionErrorKind::NoError);
    assert!(txn.is_encrypted());
    assert!(txn.is_authenticated());
    assert_eq!(txn.auth_mechanism(), Some(AuthMechanism::Plain));
    assert_eq!(txn.username(), "u");

    server.await.expect("server task");
}

#[tokio::test]
async fn required_tls_not_offered_fails_everything() {
    let (listener, addr) = bind().await;

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.expect("accept");
        let mut conn = ServerConn::new(sock);
        conn.send("220 plaintext only\r\n").await;
        conn.expect("EHLO localhost").await;
        conn.send("250-ok\r\n250 HELP\r\n").await;
        // No STARTTLS advertised: the client must give up without ever
        // opening a mail transaction.
        conn.expect("QUIT").await;
        conn.send("221 bye\r\n").await;
        conn.drain().await;
    });

    let config = TransportConfig::builder()
        .tls_level(TlsLevel::Required)
        .auth_mech(AuthMech::Disabled)
        .build();
    let mut transport = SmtpTransport::new(config);
    let first = transport.enqueue(text_message("a@x", "b@y", "one", "1\r\n"));
    let second = transport.enqueue(text_message("a@x", "c@y", "two", "2\r\n"));
    transport.run_addr(addr.ip(), addr.port()).await;

    for txn in [&first, &second] {
        txn.finished().await;
        assert_eq!(txn.error(), TransactionErrorKind::TlsRequired);
        assert!(!txn.is_encrypted());
    }

    server.await.expect("server task");
}

#[tokio::test]
async fn rejected_recipient_recovers_with_rset() {
    let (listener, addr) = bind().await;

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.expect("accept");
        let mut conn = ServerConn::new(sock);
        conn.send("220 ready\r\n").await;
        conn.expect("EHLO localhost").await;
        conn.send("250 ok\r\n").await;

        conn.expect("MAIL FROM:<a@x>").await;
        conn.send("250 sender ok\r\n").await;
        conn.expect("RCPT TO:<nobody@y>").await;
        conn.send("550 no such user\r\n").await;
        conn.expect("RSET").await;
        conn.send("250 reset\r\n").await;

        accept_one_message(&mut conn, "a@x", "b@y").await;
        conn.expect("QUIT").await;
        conn.send("221 bye\r\n").await;
    });

    let mut transport = SmtpTransport::new(plain_config());
    let rejected = transport.enqueue(text_message("a@x", "nobody@y", "first", "1\r\n"));
    let delivered = transport.enqueue(text_message("a@x", "b@y", "second", "2\r\n"));
    transport.run_addr(addr.ip(), addr.port()).await;

    rejected.finished().await;
    assert_eq!(rejected.error(), TransactionErrorKind::Response);
    assert_eq!(rejected.status(), 550);
    assert!(rejected.status_text().contains("no such user"));

    delivered.finished().await;
    assert_eq!(delivered.error(), TransactionErrorKind::NoError);
    assert_eq!(delivered.status(), 250);

    server.await.expect("server task");
}

#[tokio::test]
async fn inactivity_timeout_finalizes_queue() {
    let (listener, addr) = bind().await;

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.expect("accept");
        let mut conn = ServerConn::new(sock);
        conn.send("220 ready\r\n").await;
        conn.expect("EHLO localhost").await;
        // Stall: never answer the EHLO. The client must hang up.
        conn.drain().await;
    });

    let config = TransportConfig::builder()
        .tls_level(TlsLevel::Disabled)
        .auth_mech(AuthMech::Disabled)
        .timeout(Duration::from_millis(200))
        .build();
    let mut transport = SmtpTransport::new(config);
    let mut events = transport.take_events().expect("events");
    let first = transport.enqueue(text_message("a@x", "b@y", "one", "1\r\n"));
    let second = transport.enqueue(text_message("a@x", "c@y", "two", "2\r\n"));

    let started = std::time::Instant::now();
    transport.run_addr(addr.ip(), addr.port()).await;
    assert!(started.elapsed() >= Duration::from_millis(200));

    for txn in [&first, &second] {
        txn.finished().await;
        assert_eq!(txn.error(), TransactionErrorKind::Timeout);
    }

    let mut saw_finished = false;
    while let Ok(event) = events.try_recv() {
        saw_finished |= matches!(event, TransportEvent::Finished);
    }
    assert!(saw_finished);

    server.await.expect("server task");
}

#[tokio::test]
async fn reconnects_after_server_drop() {
    let (listener, addr) = bind().await;

    let server = tokio::spawn(async move {
        // First connection: deliver message one, then drop the socket
        // when the client opens the next transaction.
        {
            let (sock, _) = listener.accept().await.expect("accept");
            let mut conn = ServerConn::new(sock);
            conn.send("220 ready\r\n").await;
            conn.expect("EHLO localhost").await;
            conn.send("250 ok\r\n").await;
            accept_one_message(&mut conn, "a@x", "one@y").await;
            conn.expect("MAIL FROM:<a@x>").await;
            // Connection dropped here.
        }

        // Second connection: the client repeats the handshake and
        // delivers the rest of the queue.
        let (sock, _) = listener.accept().await.expect("accept");
        let mut conn = ServerConn::new(sock);
        conn.send("220 ready again\r\n").await;
        conn.expect("EHLO localhost").await;
        conn.send("250 ok\r\n").await;
        accept_one_message(&mut conn, "a@x", "two@y").await;
        accept_one_message(&mut conn, "a@x", "three@y").await;
        conn.expect("QUIT").await;
        conn.send("221 bye\r\n").await;
    });

    let mut transport = SmtpTransport::new(plain_config());
    let mut events = transport.take_events().expect("events");
    let txns = [
        transport.enqueue(text_message("a@x", "one@y", "1", "first\r\n")),
        transport.enqueue(text_message("a@x", "two@y", "2", "second\r\n")),
        transport.enqueue(text_message("a@x", "three@y", "3", "third\r\n")),
    ];
    transport.run_addr(addr.ip(), addr.port()).await;

    for txn in &txns {
        txn.finished().await;
        assert_eq!(txn.error(), TransactionErrorKind::NoError);
    }

    // Finalization order matches enqueue order.
    let mut finished_ids = Vec::new();
    let mut saw_finished = false;
    while let Ok(event) = events.try_recv() {
        match event {
            TransportEvent::TransactionFinished(t) => finished_ids.push(t.message_id().to_string()),
            TransportEvent::Finished => saw_finished = true,
            TransportEvent::Progress(_) => {}
        }
    }
    let expected: Vec<String> = txns.iter().map(|t| t.message_id().to_string()).collect();
    assert_eq!(finished_ids, expected);
    assert!(saw_finished);

    server.await.expect("server task");
}

#[tokio::test]
async fn abort_finalizes_pending_transactions() {
    let (listener, addr) = bind().await;

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.expect("accept");
        let mut conn = ServerConn::new(sock);
        conn.send("220 ready\r\n").await;
        conn.expect("EHLO localhost").await;
        // Withhold the reply so the client sits in the session when the
        // abort arrives.
        conn.drain().await;
    });

    let mut transport = SmtpTransport::new(plain_config());
    let txn = transport.enqueue(text_message("a@x", "b@y", "doomed", "x\r\n"));
    let handle = transport.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
    });

    let started = std::time::Instant::now();
    transport.run_addr(addr.ip(), addr.port()).await;
    // Aborting must not wait for the 60 second inactivity timeout.
    assert!(started.elapsed() < Duration::from_secs(5));

    txn.finished().await;
    assert_eq!(txn.error(), TransactionErrorKind::Aborted);

    server.await.expect("server task");
}

#[tokio::test]
async fn invalid_envelope_is_finalized_locally() {
    let (listener, addr) = bind().await;

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.expect("accept");
        let mut conn = ServerConn::new(sock);
        conn.send("220 ready\r\n").await;
        conn.expect("EHLO localhost").await;
        conn.send("250 ok\r\n").await;
        // The sender-less message never reaches the wire; the next
        // command is the MAIL FROM of the valid one.
        accept_one_message(&mut conn, "a@x", "b@y").await;
        conn.expect("QUIT").await;
        conn.send("221 bye\r\n").await;
    });

    let mut transport = SmtpTransport::new(plain_config());

    let mut orphan = Message::new();
    orphan.set_to(Address::new("b@y"));
    orphan.set_body(BodyPart::new("no sender\r\n"));
    let orphan_txn = transport.enqueue(orphan);

    let ok_txn = transport.enqueue(text_message("a@x", "b@y", "ok", "fine\r\n"));
    transport.run_addr(addr.ip(), addr.port()).await;

    orphan_txn.finished().await;
    assert_eq!(orphan_txn.error(), TransactionErrorKind::NoSender);

    ok_txn.finished().await;
    assert_eq!(ok_txn.error(), TransactionErrorKind::NoError);

    server.await.expect("server task");
}

/// Accepts the server side of a TLS handshake with a throwaway
/// self-signed certificate.
async fn tls_accept(sock: TcpStream) -> tokio_rustls::server::TlsStream<TcpStream> {
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("generate certificate");
    let cert_der = certified.cert.der().clone();
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.key_pair.serialize_der(),
    ));

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .expect("server config");
    let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(config));
    acceptor.accept(sock).await.expect("tls accept")
}
