//! KoboNFT advisory rate limiting.
//!
//! This crate implements the client-side quota guard used by the KoboNFT
//! application: per-key fixed-window counters that admit or refuse work for
//! operations such as AI generation, uploads and minting. Counters are
//! mirrored to a durable key-value store so quotas survive restarts on the
//! same device. The limiter is advisory; it protects the user experience and
//! backend capacity, not security.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod storage;
