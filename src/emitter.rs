//! Emitter loop (C7): the async task that advertises local keys by sending
//! paired broadcast packets.
//!
//! Socket setup goes through `socket2` before handing the socket to tokio,
//! since neither `SO_BROADCAST` nor `IP_MULTICAST_LOOP` is settable on
//! every platform after `bind`.

use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::builder::build_pair;
use crate::constants::BEACON_PAIR_INTERVAL_S;
use crate::error::{BeaconError, Result};
use crate::hash::Hasher;
use crate::keystore::Keystore;
use crate::mask::KeystoreMask;

/// Binds a UDP socket suitable for broadcast emission: `SO_BROADCAST` is
/// enabled, and `IP_MULTICAST_LOOP` is enabled best-effort (some platforms
/// reject it on a non-multicast socket; that failure is logged and ignored,
/// best-effort).
pub fn bind_emitter_socket(local_addr: SocketAddr) -> Result<UdpSocket> {
    let domain = if local_addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(|source| {
        BeaconError::Bind {
            addr: local_addr,
            source,
        }
    })?;

    socket
        .set_broadcast(true)
        .map_err(|source| BeaconError::SocketOption {
            option: "SO_BROADCAST",
            source,
        })?;

    if let Err(e) = socket.set_multicast_loop_v4(true) {
        warn!(error = %e, "IP_MULTICAST_LOOP not supported on this socket, continuing without it");
    }

    socket
        .bind(&local_addr.into())
        .map_err(|source| BeaconError::Bind {
            addr: local_addr,
            source,
        })?;

    let std_socket: std::net::UdpSocket = socket.into();
    std_socket
        .set_nonblocking(true)
        .map_err(|source| BeaconError::Bind {
            addr: local_addr,
            source,
        })?;
    UdpSocket::from_std(std_socket).map_err(|source| BeaconError::Bind {
        addr: local_addr,
        source,
    })
}

/// Runs the emitter loop until `shutdown` reports true or a send fails.
///
/// `local_addr` is the address to bind (typically `0.0.0.0:0`, an ephemeral
/// source port); `broadcast_addr` is the destination, typically
/// `255.255.255.255:6680`.
pub async fn run_emitter(
    local_addr: SocketAddr,
    broadcast_addr: SocketAddr,
    keystore: &dyn Keystore,
    hasher: &dyn Hasher,
    timesleep: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let socket = bind_emitter_socket(local_addr)?;
    let mut mask = KeystoreMask::new();

    info!(%broadcast_addr, "emitter loop starting");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let pair = match build_pair(&mut mask, keystore, hasher) {
            Some(pair) => pair,
            None => {
                mask.reset();
                if wait_or_shutdown(timesleep, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        if let Err(source) = socket.send_to(&pair.packet_a, broadcast_addr).await {
            error!(%broadcast_addr, %source, "emitter send (A) failed, terminating loop");
            return Err(BeaconError::Send {
                addr: broadcast_addr,
                source,
            });
        }

        if wait_or_shutdown(Duration::from_secs(BEACON_PAIR_INTERVAL_S), &mut shutdown).await {
            break;
        }

        if let Err(source) = socket.send_to(&pair.packet_b, broadcast_addr).await {
            error!(%broadcast_addr, %source, "emitter send (B) failed, terminating loop");
            return Err(BeaconError::Send {
                addr: broadcast_addr,
                source,
            });
        }
    }

    info!("emitter loop stopped");
    Ok(())
}

/// Sleeps for `duration` unless `shutdown` flips to true first. Returns
/// `true` if shutdown was observed.
async fn wait_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(duration) => *shutdown.borrow(),
        result = shutdown.changed() => result.is_err() || *shutdown.borrow(),
    }
}
