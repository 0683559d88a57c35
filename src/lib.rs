//! LAN peer discovery beacon protocol: blinded-identity UDP broadcast
//! beaconing and correlation.
//!
//! A beacon advertises a batch of local public keys as a pair of broadcast
//! packets, each entry blinded by a per-pair random challenge so that an
//! observer who does not already hold one of the advertised keys learns
//! nothing from the wire bytes. A peer holding a matching key recognizes it
//! by recomputing the same blind and comparing.

pub mod blind;
pub mod builder;
pub mod codec;
pub mod config;
pub mod constants;
pub mod emitter;
pub mod error;
pub mod hash;
pub mod keystore;
pub mod listener;
pub mod logging;
pub mod mask;
pub mod recognizer;
pub mod tracker;

pub use builder::{build_pair, BeaconPair};
pub use codec::{decode_packet, encode_packet, CodecError, DecodedPacket};
pub use config::Config;
pub use error::{BeaconError, Result};
pub use keystore::{FileKeystore, KeyEntry, Keystore, MemoryKeystore, PublicKey};
pub use listener::{ChannelObserver, NullChannelObserver};
pub use recognizer::{BeaconObserver, MpscBeaconObserver};
pub use tracker::{PairTracker, TrackerEvent};
