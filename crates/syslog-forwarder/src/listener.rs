// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Syslog server accepting messages over UDP and TCP.
//!
//! Both sockets are bound on the same address. Every decoded message becomes
//! one [`Record`] on the ingestion queue; messages that fail to decode are
//! dropped without affecting their neighbours. A UDP datagram carries one
//! message, a TCP connection carries a stream of framed messages.

use chrono::Utc;
use futures::StreamExt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::batcher::IngestHandle;
use crate::decoder::decode;
use crate::errors::ListenerError;
use crate::framing::SyslogFrameDecoder;
use crate::record::Record;

// Largest possible UDP payload
const BUFFER_SIZE: usize = 65_536;

// Pause after a failed accept so a persistent error (e.g. out of file
// descriptors) does not spin the task
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

pub const DEFAULT_PORT: u16 = 514;
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Configuration for the syslog listener
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Host to bind both sockets to (e.g., "0.0.0.0")
    pub host: String,
    /// Port to bind both sockets to (e.g., 514)
    pub port: u16,
}

impl ListenerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Syslog server bound on UDP and TCP, feeding one ingestion queue.
pub struct Listener {
    udp: UdpSocket,
    tcp: TcpListener,
    ingest: IngestHandle,
    cancel_token: CancellationToken,
}

impl Listener {
    /// Binds both sockets. Failing to bind either one is an error: the
    /// forwarder never runs on a single protocol.
    pub async fn bind(
        config: &ListenerConfig,
        ingest: IngestHandle,
        cancel_token: CancellationToken,
    ) -> Result<Listener, ListenerError> {
        let address = config.address();
        let addr = tokio::net::lookup_host(&address)
            .await
            .map_err(|e| ListenerError::Address(address.clone(), e.to_string()))?
            .next()
            .ok_or_else(|| ListenerError::Address(address.clone(), "no address".to_string()))?;

        let udp = UdpSocket::bind(addr)
            .await
            .map_err(|e| ListenerError::BindUdp(addr, e))?;
        let tcp = TcpListener::bind(addr)
            .await
            .map_err(|e| ListenerError::BindTcp(addr, e))?;

        Ok(Listener {
            udp,
            tcp,
            ingest,
            cancel_token,
        })
    }

    pub fn udp_local_addr(&self) -> std::io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub fn tcp_local_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Serves both protocols until the cancel token fires.
    pub async fn spin(self) {
        let Listener {
            udp,
            tcp,
            ingest,
            cancel_token,
        } = self;

        tokio::join!(
            serve_udp(udp, ingest.clone(), cancel_token.clone()),
            serve_tcp(tcp, ingest, cancel_token),
        );
        debug!("Syslog listener stopped");
    }
}

fn decode_message(text: &str, src: &SocketAddr) -> Option<Record> {
    match decode(text, Utc::now()) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("Dropping message from {src}: {e}");
            None
        }
    }
}

async fn serve_udp(socket: UdpSocket, ingest: IngestHandle, cancel_token: CancellationToken) {
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let received = tokio::select! {
            _ = cancel_token.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };
        let (amt, src) = match received {
            Ok(received) => received,
            Err(e) => {
                warn!("Failed to receive udp datagram: {e}");
                continue;
            }
        };

        let text = String::from_utf8_lossy(&buf[..amt]);
        trace!("Received datagram: {} from {}", text, src);
        if let Some(record) = decode_message(&text, &src) {
            if ingest.send(record).await.is_err() {
                error!("Ingestion queue closed, stopping udp listener");
                break;
            }
        }
    }
}

async fn serve_tcp(listener: TcpListener, ingest: IngestHandle, cancel_token: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = cancel_token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!("Accepted tcp connection from {peer}");
                tokio::spawn(serve_connection(
                    stream,
                    peer,
                    ingest.clone(),
                    cancel_token.clone(),
                ));
            }
            Err(e) => {
                warn!("Failed to accept tcp connection: {e}");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ingest: IngestHandle,
    cancel_token: CancellationToken,
) {
    let mut frames = FramedRead::new(stream, SyslogFrameDecoder::default());
    loop {
        let frame = tokio::select! {
            _ = cancel_token.cancelled() => break,
            frame = frames.next() => frame,
        };
        match frame {
            None => break,
            Some(Ok(text)) => {
                trace!("Received frame: {} from {}", text, peer);
                if let Some(record) = decode_message(&text, &peer) {
                    if ingest.send(record).await.is_err() {
                        error!("Ingestion queue closed, dropping tcp connection from {peer}");
                        break;
                    }
                }
            }
            Some(Err(e)) => {
                warn!("Closing tcp connection from {peer}: {e}");
                break;
            }
        }
    }
    debug!("Tcp connection from {peer} closed");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::batcher::ingest_queue;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    async fn start() -> (SocketAddr, SocketAddr, mpsc::Receiver<Record>, CancellationToken) {
        let (ingest, rx) = ingest_queue(16);
        let cancel_token = CancellationToken::new();
        let config = ListenerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let listener = Listener::bind(&config, ingest, cancel_token.clone())
            .await
            .unwrap();
        let udp = listener.udp_local_addr().unwrap();
        let tcp = listener.tcp_local_addr().unwrap();
        tokio::spawn(listener.spin());
        (udp, tcp, rx, cancel_token)
    }

    async fn next(rx: &mut mpsc::Receiver<Record>) -> Record {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for record")
            .unwrap()
    }

    #[tokio::test]
    async fn test_udp_datagrams_become_records() {
        let (udp, _, mut rx, cancel_token) = start().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        socket.send_to(b"not syslog", udp).await.unwrap();
        socket
            .send_to(b"<13>Oct 11 22:14:15 host sshd[7]: hello", udp)
            .await
            .unwrap();

        let record = next(&mut rx).await;
        assert_eq!(record.hostname.as_deref(), Some("host"));
        assert_eq!(record.render().as_deref(), Some("host sshd [7]: hello"));
        cancel_token.cancel();
    }

    #[tokio::test]
    async fn test_tcp_stream_becomes_records() {
        let (_, tcp, mut rx, cancel_token) = start().await;
        let mut stream = TcpStream::connect(tcp).await.unwrap();

        stream
            .write_all(b"<14>1 2024-01-01T00:00:00Z h app 1 - - one\n<garbage\n23 <14>1 - h app 2 - - two")
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let first = next(&mut rx).await;
        let second = next(&mut rx).await;
        assert_eq!(first.render().as_deref(), Some("h app [1]: one"));
        assert_eq!(second.render().as_deref(), Some("h app [2]: two"));
        cancel_token.cancel();
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_taken() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let (ingest, _rx) = ingest_queue(1);
        let config = ListenerConfig {
            host: "127.0.0.1".to_string(),
            port,
        };

        let result = Listener::bind(&config, ingest, CancellationToken::new()).await;
        assert!(matches!(result, Err(ListenerError::BindTcp(_, _))));
    }

    #[tokio::test]
    async fn test_bind_fails_when_udp_port_taken() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let (ingest, _rx) = ingest_queue(1);
        let config = ListenerConfig {
            host: "127.0.0.1".to_string(),
            port,
        };

        let result = Listener::bind(&config, ingest, CancellationToken::new()).await;
        assert!(matches!(result, Err(ListenerError::BindUdp(_, _))));
    }

    #[tokio::test]
    async fn test_cancel_stops_listener() {
        let (ingest, _rx) = ingest_queue(1);
        let cancel_token = CancellationToken::new();
        let config = ListenerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let listener = Listener::bind(&config, ingest, cancel_token.clone())
            .await
            .unwrap();
        let task = tokio::spawn(listener.spin());

        cancel_token.cancel();
        let result = timeout(Duration::from_millis(500), task).await;
        assert!(result.is_ok(), "listener should stop after cancellation");
    }
}
