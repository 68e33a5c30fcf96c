//! Client for the OBS WebSocket (v5) remote-control protocol.
//!
//! Only the subset clipcast needs: the Hello/Identify handshake, requests
//! with correlated responses, and event subscriptions.  Plus one derived
//! operation, [`ObsClient::set_source_in_preview`].

pub mod client;
pub mod error;
pub mod preview;
pub mod protocol;

pub use client::{ConnectionState, ObsClient, SubscriptionId, HANDSHAKE_TIMEOUT, REQUEST_TIMEOUT};
pub use error::ObsError;
pub use preview::PreviewSource;
