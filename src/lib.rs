//! Legal battle game backend: case scoring, match flow, narrative
//! generation and score persistence behind an axum HTTP API.

pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod llms_txt;
pub mod metrics;
pub mod narrative;
pub mod persona;
pub mod rate_limit;
pub mod scoring;
pub mod session;
