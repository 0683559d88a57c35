//! Listener loop (C8): the async task that receives beacon packets,
//! correlates them into pairs, and reports matches.

use std::net::SocketAddr;

use chrono::Utc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::constants::{BEACON_MAX_BYTES, BEACON_MIN_BYTES};
use crate::error::{BeaconError, Result};
use crate::hash::Hasher;
use crate::keystore::Keystore;
use crate::logging::{AuditLog, AuditOutcome};
use crate::recognizer::{scan, BeaconObserver};
use crate::tracker::{PairTracker, TrackerEvent};

/// Receives a signal on the listener's host-event channel. Returning `false`
/// requests the listener stop; this mirrors `ChannelObserver` in spirit but
/// for a side-channel unrelated to beacon delivery (e.g. a CLI "shutdown"
/// command).
pub trait ChannelObserver: Send {
    fn on_channel(&mut self) -> bool;
}

/// A `ChannelObserver` that always signals continue; used when the listener
/// runs with no host-side channel at all.
pub struct NullChannelObserver;

impl ChannelObserver for NullChannelObserver {
    fn on_channel(&mut self) -> bool {
        true
    }
}

pub fn bind_listener_socket(bind_addr: SocketAddr) -> Result<std::net::UdpSocket> {
    let socket = std::net::UdpSocket::bind(bind_addr).map_err(|source| BeaconError::Bind {
        addr: bind_addr,
        source,
    })?;
    socket
        .set_nonblocking(true)
        .map_err(|source| BeaconError::Bind {
            addr: bind_addr,
            source,
        })?;
    Ok(socket)
}

/// Runs the listener loop until the channel observer signals stop.
///
/// `channel_observer` fires each time a value arrives on `host_events`; when
/// it returns `false` the loop exits. Once `host_events`'s sender is
/// dropped (`recv()` returns `None`), the host-event branch is permanently
/// disabled for the rest of the loop and the listener keeps serving beacons
/// off the socket alone. Pass a channel that never sends anything (or
/// `tokio::sync::mpsc::channel(1)` with the sender dropped immediately)
/// plus [`NullChannelObserver`] to run a listener with no host-channel at
/// all.
pub async fn run_listener(
    bind_addr: SocketAddr,
    pending_map_cap: usize,
    keystore: &dyn Keystore,
    hasher: &dyn Hasher,
    beacon_observer: &mut dyn BeaconObserver,
    mut host_events: tokio::sync::mpsc::Receiver<()>,
    mut channel_observer: Box<dyn ChannelObserver>,
    audit_log: Option<&AuditLog>,
) -> Result<()> {
    let std_socket = bind_listener_socket(bind_addr)?;
    let socket = UdpSocket::from_std(std_socket).map_err(|source| BeaconError::Bind {
        addr: bind_addr,
        source,
    })?;

    let mut tracker = PairTracker::with_capacity(pending_map_cap);
    let mut buf = vec![0u8; BEACON_MAX_BYTES];

    // Once the host-event sender is dropped, `host_events.recv()` resolves
    // to `None` immediately on every poll; left enabled, that would win the
    // select race every iteration and starve the socket branch. Disabling
    // the branch once closed lets the loop fall through to polling the
    // socket alone.
    let mut host_events_open = true;

    loop {
        tokio::select! {
            recv = socket.recv_from(&mut buf) => {
                match recv {
                    Ok((len, peer)) => {
                        if len < BEACON_MIN_BYTES {
                            debug!(%peer, len, "datagram too short, ignoring");
                            continue;
                        }
                        let source = peer.to_string();
                        let event = tracker.receive(&source, &buf[..len], hasher);
                        record_audit(audit_log, hasher, &source, &event);
                        match event {
                            TrackerEvent::Paired { challenge, entries } => {
                                scan(&entries, challenge, keystore, hasher, beacon_observer);
                            }
                            TrackerEvent::StructuralReject
                            | TrackerEvent::HardReject
                            | TrackerEvent::SlotShifted
                            | TrackerEvent::Pending => {}
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "listener recv error, continuing");
                    }
                }
            }
            event = host_events.recv(), if host_events_open => {
                match event {
                    Some(()) => {
                        if !channel_observer.on_channel() {
                            break;
                        }
                    }
                    None => {
                        host_events_open = false;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Appends one audit record for a just-processed datagram, if an audit log
/// is configured. `Pending` is not a verdict yet (the pair isn't resolved),
/// so it is not recorded.
fn record_audit(audit_log: Option<&AuditLog>, hasher: &dyn Hasher, source: &str, event: &TrackerEvent) {
    let Some(log) = audit_log else {
        return;
    };

    let (outcome, challenge) = match event {
        TrackerEvent::Pending => return,
        TrackerEvent::StructuralReject => (AuditOutcome::RejectedStructural, None),
        TrackerEvent::HardReject => (AuditOutcome::RejectedChecksum, None),
        TrackerEvent::SlotShifted => (AuditOutcome::RejectedTiming, None),
        TrackerEvent::Paired { challenge, .. } => (AuditOutcome::Accepted, Some(*challenge)),
    };

    if let Err(e) = log.record(hasher, source, outcome, challenge, Utc::now()) {
        warn!(error = %e, "failed to write audit log record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blind::blind;
    use crate::codec::encode_packet;
    use crate::constants::BEACON_MEMBER_SIZE;
    use crate::hash::Blake3Hasher;
    use crate::keystore::{KeyEntry, MemoryKeystore, PublicKey};
    use std::time::Duration;

    struct Recorder(std::sync::Arc<std::sync::Mutex<Vec<String>>>);

    impl BeaconObserver for Recorder {
        fn on_beacon(&mut self, matched: &KeyEntry, _challenge: u64) {
            self.0.lock().unwrap().push(matched.tag.clone().unwrap_or_default());
        }
    }

    #[tokio::test]
    async fn listener_recognizes_a_full_pair_sent_over_loopback() {
        let ks = MemoryKeystore::new();
        let key = PublicKey([7u8; BEACON_MEMBER_SIZE]);
        ks.insert(key, Some("carol".into()));
        let hasher = Blake3Hasher;

        let bind_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let std_socket = bind_listener_socket(bind_addr).unwrap();
        let listener_addr = std_socket.local_addr().unwrap();
        std_socket.set_nonblocking(true).unwrap();
        drop(std_socket); // re-bind happens inside run_listener; just needed the assigned port

        let matches = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let (_host_tx, host_rx) = tokio::sync::mpsc::channel(1);

        let mut observer = Recorder(matches.clone());

        // run_listener takes &mut dyn BeaconObserver; we need a stable
        // address across the spawned task, so this test drives the loop
        // directly on the current task instead of spawning, with a short
        // timeout standing in for shutdown.
        let ks_ref: &dyn Keystore = &ks;
        let hasher_ref: &dyn Hasher = &hasher;

        let run = run_listener(
            listener_addr,
            64,
            ks_ref,
            hasher_ref,
            &mut observer,
            host_rx,
            Box::new(NullChannelObserver),
            None,
        );

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let a = encode_packet(10, &blind(&hasher, 10, &key.0), &hasher);
        let b = encode_packet(11, &blind(&hasher, 11, &key.0), &hasher);

        let driver = async {
            sender.send_to(&a, listener_addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1000)).await;
            sender.send_to(&b, listener_addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        };

        tokio::select! {
            _ = run => {}
            _ = driver => {}
        }

        assert_eq!(*matches.lock().unwrap(), vec!["carol".to_string()]);
    }

    #[tokio::test]
    async fn dropping_the_host_sender_immediately_does_not_stall_beacon_processing() {
        // Regression test: host_events.recv() resolving to None on every
        // poll must not win the select race forever and starve the socket
        // branch.
        let ks = MemoryKeystore::new();
        let key = PublicKey([8u8; BEACON_MEMBER_SIZE]);
        ks.insert(key, Some("erin".into()));
        let hasher = Blake3Hasher;

        let bind_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let std_socket = bind_listener_socket(bind_addr).unwrap();
        let listener_addr = std_socket.local_addr().unwrap();
        std_socket.set_nonblocking(true).unwrap();
        drop(std_socket);

        let matches = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let (host_tx, host_rx) = tokio::sync::mpsc::channel::<()>(1);
        drop(host_tx); // sender gone before run_listener ever polls it

        let mut observer = Recorder(matches.clone());
        let ks_ref: &dyn Keystore = &ks;
        let hasher_ref: &dyn Hasher = &hasher;

        let run = run_listener(
            listener_addr,
            64,
            ks_ref,
            hasher_ref,
            &mut observer,
            host_rx,
            Box::new(NullChannelObserver),
            None,
        );

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let a = encode_packet(20, &blind(&hasher, 20, &key.0), &hasher);
        let b = encode_packet(21, &blind(&hasher, 21, &key.0), &hasher);

        let driver = async {
            sender.send_to(&a, listener_addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1000)).await;
            sender.send_to(&b, listener_addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        };

        tokio::select! {
            _ = run => {}
            _ = driver => {}
        }

        assert_eq!(*matches.lock().unwrap(), vec!["erin".to_string()]);
    }

    #[tokio::test]
    async fn accepted_and_rejected_beacons_are_written_to_the_audit_log() {
        let ks = MemoryKeystore::new();
        let key = PublicKey([9u8; BEACON_MEMBER_SIZE]);
        ks.insert(key, Some("frank".into()));
        let hasher = Blake3Hasher;

        let bind_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let std_socket = bind_listener_socket(bind_addr).unwrap();
        let listener_addr = std_socket.local_addr().unwrap();
        std_socket.set_nonblocking(true).unwrap();
        drop(std_socket);

        let dir = tempfile::tempdir().unwrap();
        let audit_path = dir.path().join("audit.jsonl");
        let audit_log = crate::logging::AuditLog::open(&audit_path).unwrap();

        let matches = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let (_host_tx, host_rx) = tokio::sync::mpsc::channel(1);
        let mut observer = Recorder(matches.clone());
        let ks_ref: &dyn Keystore = &ks;
        let hasher_ref: &dyn Hasher = &hasher;

        let run = run_listener(
            listener_addr,
            64,
            ks_ref,
            hasher_ref,
            &mut observer,
            host_rx,
            Box::new(NullChannelObserver),
            Some(&audit_log),
        );

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // Long enough to pass the listener's length floor but with an
        // entry section that isn't a multiple of BEACON_MEMBER_SIZE, so it
        // reaches the tracker and fails there (structural reject).
        let misaligned = vec![0u8; BEACON_MIN_BYTES + 1];
        let a = encode_packet(30, &blind(&hasher, 30, &key.0), &hasher);
        let b = encode_packet(31, &blind(&hasher, 31, &key.0), &hasher);

        let driver = async {
            sender.send_to(&misaligned, listener_addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            sender.send_to(&a, listener_addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1000)).await;
            sender.send_to(&b, listener_addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        };

        tokio::select! {
            _ = run => {}
            _ = driver => {}
        }

        assert_eq!(*matches.lock().unwrap(), vec!["frank".to_string()]);

        let content = std::fs::read_to_string(&audit_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(first["outcome"], "rejected_structural");
        assert_eq!(second["outcome"], "accepted");
    }
}
