//! Discourse comment sync library.
//!
//! Keeps the comment counts of CMS posts in step with the Discourse topics
//! that mirror them, and serves the reconciled counts and comment markup.

pub mod config;
pub mod db;
pub mod render;
pub mod sync;
pub mod web;
