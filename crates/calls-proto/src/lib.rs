//! Wire types shared by the calls relay and the peer core.
//!
//! Field names follow the broker's JSON exactly (`camelCase`, `type` for the
//! SDP kind). The relay forwards these bodies untouched apart from the
//! offer/answer discipline, so keeping them in one crate keeps both hops in
//! agreement.

mod api;
mod description;
mod track;

pub use api::{
    BrokerFault, BrokerRejection, CreateSessionRequest, CreateSessionResponse,
    GetSessionResponse, NewTrackRequest, NewTrackResponse, RenegotiateRequest,
    RenegotiateResponse,
};
pub use description::{DescriptionError, SdpType, SessionDescription};
pub use track::{TrackLocation, TrackObject, TrackStatus};

/// Relay endpoint paths, relative to the relay base url.
pub mod routes {
    pub const CREATE_SESSION: &str = "api/create-session";
    pub const GET_SESSION: &str = "api/get-session";
    pub const NEW_TRACK: &str = "api/new-track";
    pub const RENEGOTIATE: &str = "api/renegotiate";
}
