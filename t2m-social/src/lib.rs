//! Social network clients and extractors used by twitter2mongo.
//!
//! Only the Twitter/X public filter stream is implemented: the tweet model, the
//! streaming source that feeds the ingestion pipeline, and relaxed URL extraction.
pub mod twitter;
