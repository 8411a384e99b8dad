// SPDX-License-Identifier: MIT OR Apache-2.0
//! Outbound UDP transport with latest-payload semantics.

use crate::slot::LatestSlot;
use parking_lot::Mutex;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// How long the sender thread parks between shutdown checks
const PARK_TIMEOUT: Duration = Duration::from_millis(100);

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket could not be bound
    #[error("failed to bind UDP socket: {0}")]
    Bind(#[source] io::Error),

    /// Socket option could not be applied
    #[error("failed to configure UDP socket: {0}")]
    Configure(#[source] io::Error),

    /// Worker thread could not be spawned
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Background sender that pushes the most recent payload to a UDP endpoint.
///
/// Submission never blocks: a payload that has not been sent yet is simply
/// replaced by the next one, so a stuck network path cannot delay the
/// governor. Send failures are logged and counted, never fatal.
pub struct UdpSender {
    slot: Arc<LatestSlot<Vec<u8>>>,
    target: Arc<Mutex<SocketAddr>>,
    send_errors: Arc<AtomicU64>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl UdpSender {
    /// Bind an ephemeral local socket and start the sender thread
    pub fn start(target: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(TransportError::Bind)?;

        let slot: Arc<LatestSlot<Vec<u8>>> = Arc::new(LatestSlot::new());
        let shared_target = Arc::new(Mutex::new(target));
        let send_errors = Arc::new(AtomicU64::new(0));

        let worker = {
            let slot = Arc::clone(&slot);
            let shared_target = Arc::clone(&shared_target);
            let send_errors = Arc::clone(&send_errors);
            std::thread::Builder::new()
                .name("curvecast-udp-send".to_string())
                .spawn(move || loop {
                    match slot.take_timeout(PARK_TIMEOUT) {
                        Some(payload) => {
                            let addr = *shared_target.lock();
                            if let Err(err) = socket.send_to(&payload, addr) {
                                send_errors.fetch_add(1, Ordering::Relaxed);
                                warn!("telemetry send to {addr} failed: {err}");
                            }
                        }
                        None => {
                            if slot.is_closed() {
                                break;
                            }
                        }
                    }
                })
                .map_err(TransportError::Spawn)?
        };

        debug!("udp sender started, target {target}");
        Ok(Self {
            slot,
            target: shared_target,
            send_errors,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue a payload for sending, superseding any unsent one
    pub fn submit(&self, payload: Vec<u8>) {
        self.slot.publish(payload);
    }

    /// Point subsequent sends at a new endpoint
    pub fn reconfigure(&self, target: SocketAddr) {
        *self.target.lock() = target;
    }

    /// Number of sends that failed so far
    pub fn error_count(&self) -> u64 {
        self.send_errors.load(Ordering::Relaxed)
    }

    /// Stop the sender thread and release the socket. Idempotent.
    pub fn shutdown(&self) {
        self.slot.close();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("udp sender thread panicked during shutdown");
            }
        }
    }
}

impl Drop for UdpSender {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;

    fn loopback_receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[test]
    fn delivers_submitted_payload() {
        let (receiver, addr) = loopback_receiver();
        let sender = UdpSender::start(addr).unwrap();

        sender.submit(b"hello".to_vec());

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello");
        sender.shutdown();
    }

    #[test]
    fn later_payload_supersedes_unsent_one() {
        let (receiver, addr) = loopback_receiver();
        // Park the worker first so both submissions land before it wakes.
        let sender = UdpSender::start(addr).unwrap();
        sender.submit(b"first".to_vec());
        sender.submit(b"second".to_vec());

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let got = &buf[..len];
        // Either the worker won the race and sent both, or the second
        // replaced the first; the last datagram observed must be "second".
        let last = if got == b"second" {
            got.to_vec()
        } else {
            let (len, _) = receiver.recv_from(&mut buf).unwrap();
            buf[..len].to_vec()
        };
        assert_eq!(last, b"second");
        sender.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (_receiver, addr) = loopback_receiver();
        let sender = UdpSender::start(addr).unwrap();
        sender.shutdown();
        sender.shutdown();
    }

    #[test]
    fn send_failure_is_counted_not_fatal() {
        // Port 9 on the loopback with nothing listening: sends may error
        // (ECONNREFUSED on some platforms) or vanish; either way the sender
        // must stay alive and keep accepting payloads.
        let target: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let sender = UdpSender::start(target).unwrap();
        sender.submit(b"x".to_vec());
        std::thread::sleep(Duration::from_millis(50));
        sender.submit(b"y".to_vec());
        std::thread::sleep(Duration::from_millis(50));
        sender.shutdown();
    }
}
