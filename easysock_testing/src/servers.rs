//! Loopback servers answering test-codec traffic.
//!
//! [`ServerMode`] selects whether the UDP server echoes requests unchanged,
//! answers with a different sequence id, or stays silent.

use std::net::SocketAddr;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, UdpSocket},
    task::JoinHandle,
};

use crate::codec::UserReply;

/// Behaviour of a test server.
#[derive(Debug, Clone, Copy, Default)]
pub enum ServerMode {
    /// Echo each request back unchanged.
    #[default]
    Echo,
    /// Reply with a different (mismatched) sequence id.
    Mismatch,
    /// Never reply.
    Silent,
}

/// Offset added to the sequence id in [`ServerMode::Mismatch`] replies.
pub const MISMATCH_OFFSET: u32 = 999;

/// Build the reply to one request, or `None` for no reply.
#[must_use]
pub fn respond(mode: ServerMode, request: &[u8]) -> Option<Vec<u8>> {
    match mode {
        ServerMode::Echo => Some(request.to_vec()),
        ServerMode::Mismatch => {
            let mut message: UserReply = serde_json::from_slice(request).ok()?;
            message.seq = message.seq.wrapping_add(MISMATCH_OFFSET);
            serde_json::to_vec(&message).ok()
        }
        ServerMode::Silent => None,
    }
}

/// Spawn a TCP server echoing every byte on every accepted connection.
///
/// # Panics
///
/// Panics if the listener cannot be bound.
pub async fn spawn_tcp_echo() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");

    let handle = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, handle)
}

/// Spawn a UDP server answering each datagram according to `mode`.
///
/// # Panics
///
/// Panics if the socket cannot be bound.
pub async fn spawn_udp_server(mode: ServerMode) -> (SocketAddr, JoinHandle<()>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind udp socket");
    let addr = socket.local_addr().expect("udp addr");

    let handle = tokio::spawn(async move {
        let mut buf = vec![0u8; 65_535];
        while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
            if let Some(reply) = respond(mode, &buf[..len]) {
                let _ = socket.send_to(&reply, peer).await;
            }
        }
    });

    (addr, handle)
}
