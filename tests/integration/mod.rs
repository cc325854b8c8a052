//! Integration tests for vntm-crawler
//!
//! These exercise the public API end to end: configuration files on disk,
//! a SQLite database in a temp directory and the full validate→fetch crawl.

mod crawl_tests;
mod support;
mod transport_tests;
