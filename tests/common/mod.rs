//! Shared helpers for integration tests
//!
//! Provides an in-process PKI (CA plus server certificates generated with
//! OpenSSL) and a mock TLS-terminating remote server.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{Ssl, SslAcceptor, SslMethod};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509NameBuilder, X509};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_openssl::SslStream;

use tls_forwarder::{create_tls_connector, Forwarder, ForwarderConfig, ForwarderHandle, Result};

/// Name the server certificate is issued for
pub enum CertName {
    Ip(&'static str),
    Dns(&'static str),
}

fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn serial() -> openssl::asn1::Asn1Integer {
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    serial.to_asn1_integer().unwrap()
}

/// Test certificate authority
pub struct TestPki {
    ca_cert: X509,
    ca_key: PKey<Private>,
    ca_file: NamedTempFile,
}

impl TestPki {
    pub fn new() -> Self {
        let ca_key = new_key();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "tls-forwarder test CA").unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&serial()).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&ca_key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(2).unwrap()).unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build().unwrap())
            .unwrap();
        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .unwrap();
        builder.append_extension(ski).unwrap();
        builder.sign(&ca_key, MessageDigest::sha256()).unwrap();
        let ca_cert = builder.build();

        let mut ca_file = NamedTempFile::new().unwrap();
        ca_file.write_all(&ca_cert.to_pem().unwrap()).unwrap();
        ca_file.flush().unwrap();

        Self { ca_cert, ca_key, ca_file }
    }

    /// PEM file holding the CA certificate
    pub fn ca_path(&self) -> &Path {
        self.ca_file.path()
    }

    /// Issue a server certificate signed by this CA
    pub fn issue(&self, name: CertName) -> (X509, PKey<Private>) {
        let key = new_key();
        let mut subject = X509NameBuilder::new().unwrap();
        subject.append_entry_by_text("CN", "mock remote").unwrap();
        let subject = subject.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&serial()).unwrap();
        builder.set_subject_name(&subject).unwrap();
        builder.set_issuer_name(self.ca_cert.subject_name()).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();

        let mut san = SubjectAlternativeName::new();
        match name {
            CertName::Ip(ip) => san.ip(ip),
            CertName::Dns(dns) => san.dns(dns),
        };
        let san = san
            .build(&builder.x509v3_context(Some(&*self.ca_cert), None))
            .unwrap();
        builder.append_extension(san).unwrap();
        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .build(&builder.x509v3_context(Some(&*self.ca_cert), None))
            .unwrap();
        builder.append_extension(aki).unwrap();
        builder
            .append_extension(ExtendedKeyUsage::new().server_auth().build().unwrap())
            .unwrap();
        builder.sign(&self.ca_key, MessageDigest::sha256()).unwrap();

        (builder.build(), key)
    }
}

/// What the mock remote does with each accepted TLS connection
#[derive(Clone, Copy)]
pub enum Behavior {
    /// Echo everything back until the peer closes
    Echo,
    /// Wait for `PING`, answer `PONG`, then read until the peer closes
    PingPong,
    /// Complete the handshake, then close without sending anything
    CloseAfterHandshake,
}

/// Things the mock remote observed, one report per connection
#[derive(Debug)]
pub enum ServerEvent {
    /// TLS handshake with the forwarder failed
    HandshakeFailed,
    /// Connection ended; all application bytes received on it
    Closed { received: Vec<u8> },
}

/// Mock TLS-terminating remote server
pub struct MockTlsServer {
    pub addr: SocketAddr,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
    task: JoinHandle<()>,
}

impl MockTlsServer {
    pub async fn start(pki: &TestPki, name: CertName, behavior: Behavior) -> Self {
        let (cert, key) = pki.issue(name);
        let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
        acceptor.set_certificate(&cert).unwrap();
        acceptor.set_private_key(&key).unwrap();
        acceptor.check_private_key().unwrap();
        let acceptor = Arc::new(acceptor.build());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, events) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            loop {
                let Ok((tcp, _)) = listener.accept().await else {
                    break;
                };
                let acceptor = Arc::clone(&acceptor);
                let tx = tx.clone();

                tokio::spawn(async move {
                    let ssl = Ssl::new(acceptor.context()).unwrap();
                    let mut stream = SslStream::new(ssl, tcp).unwrap();
                    if Pin::new(&mut stream).accept().await.is_err() {
                        let _ = tx.send(ServerEvent::HandshakeFailed);
                        return;
                    }

                    let received = serve(stream, behavior).await;
                    let _ = tx.send(ServerEvent::Closed { received });
                });
            }
        });

        Self { addr, events, task }
    }

    /// Wait for the next connection report
    pub async fn next_event(&mut self, within: Duration) -> ServerEvent {
        tokio::time::timeout(within, self.events.recv())
            .await
            .expect("mock server reported nothing in time")
            .expect("mock server stopped")
    }
}

impl Drop for MockTlsServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: SslStream<tokio::net::TcpStream>, behavior: Behavior) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = [0u8; 8192];

    match behavior {
        Behavior::Echo => loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    received.extend_from_slice(&buf[..n]);
                    if stream.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        },
        Behavior::PingPong => {
            let mut answered = false;
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        received.extend_from_slice(&buf[..n]);
                        if !answered && received.starts_with(b"PING") {
                            answered = true;
                            if stream.write_all(b"PONG").await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        Behavior::CloseAfterHandshake => {
            let _ = stream.shutdown().await;
        }
    }

    received
}

/// Forwarder started on an ephemeral local port
pub struct TestForwarder {
    pub addr: SocketAddr,
    pub handle: ForwarderHandle,
    pub task: JoinHandle<Result<()>>,
}

/// Start a forwarder toward `remote` trusting the test CA
pub async fn start_forwarder(pki: &TestPki, remote: &str, idle_timeout: u64) -> TestForwarder {
    let config = ForwarderConfig {
        remote: Some(remote.parse().unwrap()),
        ca_file: Some(pki.ca_path().to_path_buf()),
        idle_timeout,
        connect_timeout: 5,
        shutdown_timeout: 2,
        ..ForwarderConfig::default()
    };

    let connector = create_tls_connector(config.ca_file.as_deref()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let forwarder = Forwarder::from_listener(listener, &config, connector).unwrap();
    let addr = forwarder.local_addr();
    let (handle, task) = forwarder.start();

    TestForwarder { addr, handle, task }
}
