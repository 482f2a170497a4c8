//! Business services layer.
//!
//! This module contains the services that orchestrate the newsletter engine,
//! coordinating between providers, the classifier, auth and storage.
//!
//! # Architecture
//!
//! ```text
//!       Binary / embedding application
//!          |
//!          v
//!    Services Layer  <-- You are here
//!          |
//!          v
//! Infrastructure (Providers, Auth, Storage)
//! ```
//!
//! # Services Overview
//!
//! - [`SyncService`]: preview and commit syncs for one account
//! - [`DomainPreviewBuilder`]: groups classified candidates by sender domain
//! - [`NewsletterService`]: imported newsletter queries and account removal

mod newsletter_service;
mod preview_builder;
mod sync_service;

pub use newsletter_service::{
    AccountRemoval, NewsletterError, NewsletterService, NewsletterStorage,
    Result as NewsletterResult,
};
pub use preview_builder::DomainPreviewBuilder;
pub use sync_service::{
    FailureKind, Result, SyncError, SyncFailure, SyncReport, SyncService, SyncStorage,
};
