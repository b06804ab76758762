//! HTTP surface of the pipeline: auth boundary, chunked upload endpoints,
//! ownership confirmation endpoints and the websocket progress channel.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod progress;
pub mod services;
pub mod setup;
pub mod state;
pub mod telemetry;
