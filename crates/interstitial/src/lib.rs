//! Interstitial - framing proxy for OpenAI-style chat completions
//!
//! This crate provides a small HTTP intermediary that injects instructional
//! framing messages into chat requests, streams the upstream inference
//! server's response back to the client, and synthesizes a model listing
//! from a probe call.

pub mod config;
pub mod error;
pub mod proxy;

pub use error::InterstitialError;
