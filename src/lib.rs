//! Scheduled synchronizer for a club news XML feed.
//!
//! Every tick the [`scheduler`] starts a [`sync`] run: load the external ids
//! already in [`storage`], fetch the list page from the [`feed`], fetch the
//! detail document for each new item concurrently and insert the assembled
//! batch in one transaction.

pub mod config;
pub mod feed;
pub mod logging;
pub mod scheduler;
pub mod storage;
pub mod sync;
