//! HTTP relay in front of the hosted track broker.
//!
//! Exposes `api/create-session`, `api/get-session/{id}`, `api/new-track` and
//! `api/renegotiate`, each forwarded to one broker endpoint with the
//! application's bearer token. Offer/answer typing is checked here so a
//! misdirected description never reaches the broker.

pub mod broker;
pub mod config;
pub mod metrics;
pub mod routes;
pub mod state;
