//! routecheck — black-box email-routing validation harness.
//!
//! Sends uniquely-tokened test messages into an opaque categorization
//! pipeline, waits for it to settle, locates each token over IMAP, maps
//! folders to categories, and reports classification quality.

pub mod config;
pub mod corpus;
pub mod dispatch;
pub mod error;
pub mod inspect;
pub mod mail;
pub mod metrics;
pub mod report;
pub mod run;
pub mod token;
