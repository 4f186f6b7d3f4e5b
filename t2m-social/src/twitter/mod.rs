//! Twitter/X streaming surface exposed to the ingestion pipeline.
//!
//! - [`types`]: tweet and user models that round-trip unknown fields
//! - [`stream`]: track filter, channel items, and the subscription handle
//! - [`client`]: OAuth-signed filter stream with reconnect backoff
//! - [`extract`]: relaxed URL matching over tweet text
pub mod backoff;
pub mod client;
pub mod extract;
pub mod stream;
pub mod types;

pub use client::TwitterStreamClient;
pub use stream::{StopHandle, StreamItem, Subscription, TrackFilter};
pub use types::Tweet;
