pub mod client;

pub use client::{MediaAsset, MediaError, MediaGraphClient};
