//! Ingestion pipeline: stream items in, documents and URL tasks out.
//!
//! - [`dispatcher`]: reads the subscription and spawns one task per tweet
//! - [`processor`]: stores a tweet and fans out its URLs
//! - [`url`]: the per-URL extension point
//!
//! Persistence failures stop the dispatcher with [`t2m_common::T2mError::Persist`]
//! unless [`t2m_common::PersistFailurePolicy::Skip`] is configured.
pub mod dispatcher;
pub mod processor;
pub mod url;

pub use dispatcher::{DispatchStats, Dispatcher, PipelineOptions};
pub use processor::{Outcome, TweetProcessor};
pub use url::{NoopUrlProcessor, UrlProcessor};
