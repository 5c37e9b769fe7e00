//! Session and track negotiation against a hosted WebRTC track broker.
//!
//! A [`CallsClient`] bootstraps one peer connection with the broker, publishes
//! local tracks on it and pulls tracks other sessions published. The network
//! hop ([`SignalingApi`]), the peer connection ([`MediaConnection`]) and media
//! capture ([`MediaCapture`]) are traits so the protocol runs against fakes in
//! tests.

pub mod capture;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod negotiation;
pub mod publisher;
pub mod resolver;
pub mod rtc;
pub mod session;
pub mod signaling;
pub mod subscriber;

pub use capture::{
    CaptureError, CaptureRequest, LocalStream, LocalTrack, MediaCapture, SyntheticCapture,
    SyntheticFeed, SYNTHETIC_FRAME_INTERVAL,
};
pub use client::CallsClient;
pub use config::{IceServer, NegotiationConfig};
pub use connection::{
    ConnectionFactory, IceConnectionState, InboundTrackHandler, MediaConnection, MediaKind,
    RemoteTrack, RtcError, Transceiver,
};
pub use error::{CallError, ErrorClass, Stage};
pub use negotiation::NegotiationEngine;
pub use publisher::{PublishedTrack, PublishedTracks, TrackPublisher};
pub use resolver::{PendingTrack, TrackResolver, TrackWaitError};
pub use rtc::{RtcConnection, RtcConnectionFactory};
pub use session::{Session, SessionSlot};
pub use signaling::{HttpSignalingClient, SignalingApi, SignalingError};
pub use subscriber::{RemoteStream, TrackSubscriber};
