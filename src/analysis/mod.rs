//! Analysis modules.
//!
//! `aggregator` turns the dataset into per-cohort rows; `ranking` orders
//! those rows and derives second-stage metrics from them.

pub mod aggregator;
pub mod ranking;

pub use aggregator::*;
pub use ranking::*;
