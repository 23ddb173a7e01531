//! The three batch stages run by the CLI.
//!
//! - [`scrape`]: feeds and boards into the NEWS store, deduplicated
//! - [`enrich`]: full article text into the warehouse
//! - [`analyze`]: model analysis of enriched articles

pub mod analyze;
pub mod enrich;
pub mod scrape;
