//! # stem-mixer
//!
//! Multi-stem audio mixing engine: a dynamic registry of audio stems, each
//! fetched and decoded asynchronously, mixed in real time into fixed-size
//! output chunks, with a background pipeline producing a PNG waveform
//! preview per stem.
//!
//! **Architecture:** [`manager::StemManager`] owns the registry and drives
//! one background pipeline ([`pipeline`]) per stem via a [`runner::TaskRunner`];
//! the real-time render path never blocks on I/O or decoding.
//!
//! This crate does not fetch, decode, encode, or persist anything itself —
//! those are narrow traits in [`external`] with reference adapters; a host
//! application supplies the concrete implementations (or its own).

pub mod config;
pub mod error;
pub mod external;
pub mod manager;
mod pipeline;
pub mod runner;
pub mod silence;
pub mod stem;
pub mod waveform;

pub use config::MixerConfig;
pub use error::{Result, StemMixerError};
pub use manager::{AudioChunk, StemManager};
pub use stem::StemInfo;
