//! Scriptorium - a small multi-author blog
//!
//! Authors write posts filed under categories and locations, readers
//! comment on them, and admins curate what is published.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;
