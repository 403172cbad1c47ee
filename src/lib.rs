//! snipbin: a small code-snippet sharing service.
//!
//! Users register, sign in with JWTs, and publish syntax-highlighted
//! snippets that are either public or visible to their owner only.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod highlight;
pub mod languages;
pub mod notify;
pub mod snippets;
pub mod state;
