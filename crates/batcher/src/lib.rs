#![doc = include_str!("../README.md")]
#![warn(missing_debug_implementations, missing_docs, rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod builder;
pub mod channel;
pub mod channel_out;
pub mod config;
pub mod errors;
pub mod manager;
pub mod metrics;
pub mod params;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use errors::{BatcherError, ChannelOutError, FullReason};
pub use manager::ChannelManager;
