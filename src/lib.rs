//! letterbox - newsletter detection and import for Gmail and Outlook mailboxes
//!
//! This crate finds newsletters in connected mailboxes, scores them with a
//! rule-driven classifier, previews them per sender domain, and imports
//! accepted ones exactly once.

pub mod auth;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod providers;
pub mod services;
pub mod storage;
