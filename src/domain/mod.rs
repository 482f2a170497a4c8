//! Domain layer types for the newsletter engine.
//!
//! This module contains the core types shared by every layer: accounts,
//! normalized candidate messages, classifier output, persisted newsletters
//! and domain previews.

mod account;
mod address;
mod classification;
mod message;
mod newsletter;
mod preview;
mod types;

pub use account::{EmailAccount, ProviderKind};
pub use address::{extract_domain, local_part, Address};
pub use classification::{ClassificationResult, Confidence};
pub use message::{CandidateMessage, Header, MessageHeaders};
pub use newsletter::Newsletter;
pub use preview::{DomainPreview, PreviewSample};
pub use types::{AccountId, MessageId, NewsletterId, UserId};
