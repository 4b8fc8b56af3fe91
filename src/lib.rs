#![doc = include_str!("RUSTDOC.md")]

pub mod context;
pub mod logger;
pub mod navigation;
pub mod platform;
pub mod provider;
pub mod tracker;

pub use context::use_fathom;
pub use provider::{Fathom, FathomProvider, Mount, ProviderOptions};
pub use tracker::{EventData, TrackerError, TrackerResult};

#[cfg(test)]
pub mod test_support;
