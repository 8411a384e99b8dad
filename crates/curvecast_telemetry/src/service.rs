// SPDX-License-Identifier: MIT OR Apache-2.0
//! Telemetry service lifecycle.
//!
//! Three execution contexts cooperate here. The owning control loop keeps
//! the playback clock and publishes one consistent playhead snapshot per
//! tick. The governor thread wakes on its deadlines, samples the timeline
//! through the pure evaluation path, and hands the encoded frame to the
//! transport. The receive thread feeds decoded sync positions back through
//! a latest-only slot that the owning loop drains on its own schedule.

use crate::config::{ConfigError, PayloadFormat, TelemetryConfig};
use crate::frame;
use crate::governor::RateGovernor;
use crate::receiver::SyncReceiver;
use crate::slot::LatestSlot;
use crate::transport::{TransportError, UdpSender};
use curvecast_timeline::{PlayheadSnapshot, Timeline};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Timeline shared between the owning context and the governor
pub type SharedTimeline = Arc<RwLock<Timeline>>;

/// Governor park time while playback is idle or a deadline is distant.
/// Also bounds how long shutdown and config changes wait to be observed.
const MAX_PARK: Duration = Duration::from_millis(100);

/// Errors raised when starting the service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Configuration was rejected; the governor did not start
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Socket setup failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Cross-thread view of the playhead, written only by the owning loop
pub struct SharedPlayhead {
    inner: Mutex<PlayheadSnapshot>,
}

impl SharedPlayhead {
    /// Create a stopped playhead at position zero
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PlayheadSnapshot {
                position: 0.0,
                frame_index: 0,
                playing: false,
            }),
        }
    }

    /// Publish a fresh snapshot; called once per owning-loop tick
    pub fn store(&self, snapshot: PlayheadSnapshot) {
        *self.inner.lock() = snapshot;
    }

    /// Read one consistent snapshot
    pub fn load(&self) -> PlayheadSnapshot {
        *self.inner.lock()
    }
}

impl Default for SharedPlayhead {
    fn default() -> Self {
        Self::new()
    }
}

struct GovernorSignals {
    stop: AtomicBool,
    gate: Mutex<()>,
    wake: Condvar,
}

impl GovernorSignals {
    fn park(&self, timeout: Duration) {
        let mut gate = self.gate.lock();
        let _ = self.wake.wait_for(&mut gate, timeout);
    }

    fn wake_all(&self) {
        let _gate = self.gate.lock();
        self.wake.notify_all();
    }
}

/// Running telemetry subsystem: governor thread, outbound transport, and
/// optional sync receiver.
pub struct TelemetryService {
    config: Arc<Mutex<TelemetryConfig>>,
    session_id: Arc<Mutex<String>>,
    sender: Arc<UdpSender>,
    receiver: Option<SyncReceiver>,
    sync_slot: Arc<LatestSlot<f64>>,
    signals: Arc<GovernorSignals>,
    frames_sent: Arc<AtomicU64>,
    governor: Option<JoinHandle<()>>,
}

impl TelemetryService {
    /// Validate the config and spawn the telemetry threads.
    ///
    /// The governor starts disarmed; the first frame goes out one full
    /// period after the playhead first reports playing.
    pub fn start(
        config: TelemetryConfig,
        timeline: SharedTimeline,
        playhead: Arc<SharedPlayhead>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let target = config.target()?;
        let session_id = Arc::new(Mutex::new(config.resolved_session_id()));

        let sender = Arc::new(UdpSender::start(target)?);
        let sync_slot = Arc::new(LatestSlot::new());
        let receiver = if config.sync_enabled {
            Some(SyncReceiver::start(
                config.sync_port,
                Arc::clone(&sync_slot),
            )?)
        } else {
            None
        };

        let shared_config = Arc::new(Mutex::new(config));
        let signals = Arc::new(GovernorSignals {
            stop: AtomicBool::new(false),
            gate: Mutex::new(()),
            wake: Condvar::new(),
        });
        let frames_sent = Arc::new(AtomicU64::new(0));

        let governor = {
            let config = Arc::clone(&shared_config);
            let session_id = Arc::clone(&session_id);
            let sender = Arc::clone(&sender);
            let signals = Arc::clone(&signals);
            let frames_sent = Arc::clone(&frames_sent);
            std::thread::Builder::new()
                .name("curvecast-governor".to_string())
                .spawn(move || {
                    governor_loop(
                        &config,
                        &session_id,
                        &timeline,
                        &playhead,
                        &sender,
                        &signals,
                        &frames_sent,
                    );
                })
                .map_err(TransportError::Spawn)?
        };

        info!("telemetry service started, target {target}");
        Ok(Self {
            config: shared_config,
            session_id,
            sender,
            receiver,
            sync_slot,
            signals,
            frames_sent,
            governor: Some(governor),
        })
    }

    /// Swap in a new configuration; it takes effect from the next cycle.
    /// The in-flight cycle completes honoring the period that began it.
    pub fn reconfigure(&mut self, config: TelemetryConfig) -> Result<(), ServiceError> {
        config.validate()?;
        self.sender.reconfigure(config.target()?);

        if let Some(id) = config.session_id.as_deref().filter(|id| !id.is_empty()) {
            *self.session_id.lock() = id.to_string();
        }

        let sync_changed = {
            let current = self.config.lock();
            current.sync_enabled != config.sync_enabled || current.sync_port != config.sync_port
        };
        if sync_changed {
            if let Some(mut receiver) = self.receiver.take() {
                receiver.shutdown();
            }
            if config.sync_enabled {
                self.receiver = Some(SyncReceiver::start(
                    config.sync_port,
                    Arc::clone(&self.sync_slot),
                )?);
            }
        }

        *self.config.lock() = config;
        self.signals.wake_all();
        Ok(())
    }

    /// Latest inbound sync position, if one arrived since the last call.
    /// Earlier pending values are already superseded; the owning loop feeds
    /// the result to its playback clock's seek.
    pub fn sync_position(&self) -> Option<f64> {
        self.sync_slot.take()
    }

    /// Port the sync listener bound, when it is running
    pub fn sync_port(&self) -> Option<u16> {
        self.receiver.as_ref().map(SyncReceiver::local_port)
    }

    /// Frames handed to the transport so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Outbound sends that failed so far
    pub fn send_errors(&self) -> u64 {
        self.sender.error_count()
    }

    /// Stop all telemetry threads and join them. Idempotent: a second call
    /// finds nothing left to stop.
    pub fn shutdown(&mut self) {
        self.signals.stop.store(true, Ordering::Relaxed);
        self.signals.wake_all();
        if let Some(governor) = self.governor.take() {
            if governor.join().is_err() {
                warn!("governor thread panicked during shutdown");
            }
        }
        self.sender.shutdown();
        if let Some(mut receiver) = self.receiver.take() {
            receiver.shutdown();
        }
        self.sync_slot.close();
    }
}

impl Drop for TelemetryService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn governor_loop(
    config: &Mutex<TelemetryConfig>,
    session_id: &Mutex<String>,
    timeline: &RwLock<Timeline>,
    playhead: &SharedPlayhead,
    sender: &UdpSender,
    signals: &GovernorSignals,
    frames_sent: &AtomicU64,
) {
    let mut governor = RateGovernor::from_rate(config.lock().rate_hz);

    while !signals.stop.load(Ordering::Relaxed) {
        // One config snapshot per cycle; never re-read mid-frame.
        let cycle_config = config.lock().clone();
        governor.set_period(cycle_config.period());

        let snapshot = playhead.load();
        if !(cycle_config.enabled && snapshot.playing) {
            // Disarming makes the next play wait a full period again.
            governor.disarm();
            signals.park(MAX_PARK);
            continue;
        }

        let now = Instant::now();
        if !governor.is_armed() {
            governor.arm(now);
        }
        if let Some(remaining) = governor.wait_hint(now) {
            if !remaining.is_zero() {
                signals.park(remaining.min(MAX_PARK));
                continue;
            }
        }

        if governor.fire(Instant::now()) {
            // Sample the latest playhead at send time, not the one observed
            // before the wait.
            let snapshot = playhead.load();
            let session = session_id.lock().clone();
            let frame = {
                let timeline = timeline.read();
                frame::assemble(&timeline, &snapshot, &session)
            };
            let payload = match cycle_config.payload_format {
                PayloadFormat::Json => frame.encode_json(),
                PayloadFormat::Binary => frame.encode_binary(),
            };
            sender.submit(payload);
            frames_sent.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvecast_timeline::{InterpolationKind, Keyframe, Track};
    use std::net::UdpSocket;

    fn demo_timeline() -> SharedTimeline {
        let mut timeline = Timeline::new();
        let mut track = Track::new("a", InterpolationKind::Linear);
        track.add_keyframe(Keyframe::new(0.0, 0.0));
        track.add_keyframe(Keyframe::new(2.0, 10.0));
        timeline.add_track(track);
        Arc::new(RwLock::new(timeline))
    }

    fn playing_at(position: f64) -> PlayheadSnapshot {
        PlayheadSnapshot {
            position,
            frame_index: 1,
            playing: true,
        }
    }

    fn test_config(port: u16, rate_hz: u32) -> TelemetryConfig {
        TelemetryConfig {
            enabled: true,
            port,
            rate_hz,
            session_id: Some("test".to_string()),
            ..TelemetryConfig::default()
        }
    }

    fn loopback_receiver() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    #[test]
    fn first_frame_waits_one_period() {
        let (socket, port) = loopback_receiver();
        let playhead = Arc::new(SharedPlayhead::new());
        let mut service =
            TelemetryService::start(test_config(port, 2), demo_timeline(), Arc::clone(&playhead))
                .unwrap();

        playhead.store(playing_at(0.5));

        // Rate 2 Hz: nothing may arrive during the first ~500 ms.
        socket
            .set_read_timeout(Some(Duration::from_millis(250)))
            .unwrap();
        let mut buf = [0u8; 2048];
        assert!(socket.recv_from(&mut buf).is_err(), "frame sent too early");

        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        assert!(len > 0);
        service.shutdown();
    }

    #[test]
    fn sends_json_frames_while_playing() {
        let (socket, port) = loopback_receiver();
        let playhead = Arc::new(SharedPlayhead::new());
        let mut service =
            TelemetryService::start(test_config(port, 60), demo_timeline(), Arc::clone(&playhead))
                .unwrap();

        playhead.store(playing_at(1.0));

        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut buf = [0u8; 2048];
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(doc["version"], "1.0");
        assert_eq!(doc["session_id"], "test");
        assert_eq!(doc["timestamp_ms"], 1000);
        assert_eq!(doc["tracks"][0]["name"], "a");
        assert_eq!(doc["tracks"][0]["values"][0], 5.0);
        assert!(service.frames_sent() >= 1);
        service.shutdown();
    }

    #[test]
    fn cycle_count_stays_within_rate_bound() {
        let (socket, port) = loopback_receiver();
        let playhead = Arc::new(SharedPlayhead::new());
        let mut service =
            TelemetryService::start(test_config(port, 50), demo_timeline(), Arc::clone(&playhead))
                .unwrap();

        playhead.store(playing_at(0.25));
        let window = Duration::from_millis(600);
        std::thread::sleep(window);
        let sent = service.frames_sent();
        service.shutdown();
        drop(socket);

        // ceil(0.6 s * 50 Hz) + 1, with no lower bound because the governor
        // only promises not to burst.
        assert!(sent <= 31, "sent {sent} frames in 600 ms at 50 Hz");
        assert!(sent >= 5, "governor barely ran: {sent} frames");
    }

    #[test]
    fn no_frames_when_disabled() {
        let (socket, port) = loopback_receiver();
        let mut config = test_config(port, 60);
        config.enabled = false;
        let playhead = Arc::new(SharedPlayhead::new());
        let mut service =
            TelemetryService::start(config, demo_timeline(), Arc::clone(&playhead)).unwrap();

        playhead.store(playing_at(1.0));
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(service.frames_sent(), 0);
        service.shutdown();
        drop(socket);
    }

    #[test]
    fn no_frames_while_stopped() {
        let (socket, port) = loopback_receiver();
        let playhead = Arc::new(SharedPlayhead::new());
        let mut service =
            TelemetryService::start(test_config(port, 60), demo_timeline(), Arc::clone(&playhead))
                .unwrap();

        // Playhead never reports playing.
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(service.frames_sent(), 0);
        service.shutdown();
        drop(socket);
    }

    #[test]
    fn invalid_config_refuses_to_start() {
        let mut config = test_config(9000, 60);
        config.rate_hz = 500;
        let result = TelemetryService::start(
            config,
            demo_timeline(),
            Arc::new(SharedPlayhead::new()),
        );
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }

    #[test]
    fn sync_positions_flow_latest_only() {
        let (_socket, port) = loopback_receiver();
        let mut config = test_config(port, 60);
        config.sync_enabled = true;
        config.sync_port = 0;
        let playhead = Arc::new(SharedPlayhead::new());
        let mut service =
            TelemetryService::start(config, demo_timeline(), Arc::clone(&playhead)).unwrap();

        let sync_port = service.sync_port().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        for value in [0.5_f64, 1.0, 1.75] {
            sender
                .send_to(&value.to_be_bytes(), ("127.0.0.1", sync_port))
                .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut latest = None;
        while Instant::now() < deadline {
            if let Some(position) = service.sync_position() {
                latest = Some(position);
                if position == 1.75 {
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(latest, Some(1.75));
        service.shutdown();
    }

    #[test]
    fn shutdown_twice_is_clean() {
        let (_socket, port) = loopback_receiver();
        let playhead = Arc::new(SharedPlayhead::new());
        let mut service =
            TelemetryService::start(test_config(port, 60), demo_timeline(), playhead).unwrap();
        service.shutdown();
        service.shutdown();
    }

    #[test]
    fn reconfigure_redirects_outbound_frames() {
        let (old_socket, old_port) = loopback_receiver();
        let (new_socket, new_port) = loopback_receiver();
        let playhead = Arc::new(SharedPlayhead::new());
        let mut service = TelemetryService::start(
            test_config(old_port, 60),
            demo_timeline(),
            Arc::clone(&playhead),
        )
        .unwrap();

        service.reconfigure(test_config(new_port, 60)).unwrap();
        playhead.store(playing_at(1.0));

        new_socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut buf = [0u8; 2048];
        assert!(new_socket.recv_from(&mut buf).is_ok());
        service.shutdown();
        drop(old_socket);
    }
}
