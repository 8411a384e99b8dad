// SPDX-License-Identifier: MIT OR Apache-2.0
//! Inbound UDP listener for sync mode.
//!
//! Decodes external float position updates and forwards them, latest-only,
//! to the owning control loop. The loop applies them through the playback
//! clock's seek on its own thread; this module never touches the clock.

use crate::slot::LatestSlot;
use crate::transport::TransportError;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Read timeout so the loop can observe the stop flag
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Inbound packet decode errors; the packet is dropped, the loop continues
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is neither a 4-byte float nor an 8-byte double
    #[error("unexpected sync packet size: {0} bytes")]
    UnexpectedLength(usize),
}

/// Decode a sync payload into a position value.
///
/// Accepts a 4-byte `f32` or an 8-byte `f64`. Senders are supposed to use
/// network byte order, but little-endian packets show up in practice, so the
/// network-order reading is swapped out when it looks like a byte-swap
/// artifact: a denormal/near-zero value while the little-endian reading has
/// meaningful magnitude, or an absurd magnitude while the little-endian
/// reading is finite and smaller.
pub fn decode_position(data: &[u8]) -> Result<f64, DecodeError> {
    match *data {
        [a, b, c, d] => {
            let network = f64::from(f32::from_be_bytes([a, b, c, d]));
            if data.iter().all(|&byte| byte == 0) {
                return Ok(network);
            }
            let little = f64::from(f32::from_le_bytes([a, b, c, d]));
            Ok(pick_decoding(network, little, 1e-4, 1e30))
        }
        [a, b, c, d, e, f, g, h] => {
            let network = f64::from_be_bytes([a, b, c, d, e, f, g, h]);
            if data.iter().all(|&byte| byte == 0) {
                return Ok(network);
            }
            let little = f64::from_le_bytes([a, b, c, d, e, f, g, h]);
            Ok(pick_decoding(network, little, 1e-9, 1e100))
        }
        _ => Err(DecodeError::UnexpectedLength(data.len())),
    }
}

fn pick_decoding(network: f64, little: f64, small: f64, large: f64) -> f64 {
    if network.abs() < small && little.abs() >= small {
        return little;
    }
    if (!network.is_finite() || network.abs() > large)
        && little.is_finite()
        && little.abs() < network.abs()
    {
        return little;
    }
    network
}

/// Background listener feeding decoded positions into a [`LatestSlot`].
pub struct SyncReceiver {
    slot: Arc<LatestSlot<f64>>,
    stop: Arc<AtomicBool>,
    local_addr: SocketAddr,
    worker: Option<JoinHandle<()>>,
}

impl SyncReceiver {
    /// Bind the listener port and start the receive thread
    pub fn start(port: u16, slot: Arc<LatestSlot<f64>>) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).map_err(TransportError::Bind)?;
        socket
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(TransportError::Configure)?;
        let local_addr = socket.local_addr().map_err(TransportError::Configure)?;

        let stop = Arc::new(AtomicBool::new(false));
        let worker = {
            let slot = Arc::clone(&slot);
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("curvecast-udp-recv".to_string())
                .spawn(move || {
                    let mut buf = [0u8; 1024];
                    while !stop.load(Ordering::Relaxed) {
                        match socket.recv_from(&mut buf) {
                            Ok((len, _)) => match decode_position(&buf[..len]) {
                                Ok(position) => {
                                    slot.publish(position);
                                }
                                Err(err) => warn!("dropping sync packet: {err}"),
                            },
                            Err(err)
                                if err.kind() == io::ErrorKind::WouldBlock
                                    || err.kind() == io::ErrorKind::TimedOut =>
                            {
                                continue;
                            }
                            Err(err) => {
                                if !stop.load(Ordering::Relaxed) {
                                    warn!("sync receive failed: {err}");
                                }
                                break;
                            }
                        }
                    }
                })
                .map_err(TransportError::Spawn)?
        };

        debug!("sync receiver listening on {local_addr}");
        Ok(Self {
            slot,
            stop,
            local_addr,
            worker: Some(worker),
        })
    }

    /// Port the listener actually bound (useful with port 0)
    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop the receive thread. The blocked read unblocks within its read
    /// timeout. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.slot.close();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("sync receiver thread panicked during shutdown");
            }
        }
    }
}

impl Drop for SyncReceiver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
