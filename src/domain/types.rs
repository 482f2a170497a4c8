//! Core identifier types for domain entities.
//!
//! These newtype wrappers keep account, user, newsletter and provider
//! message identifiers from being mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_id! {
    /// Unique identifier for a connected mailbox.
    AccountId
}

string_id! {
    /// Identifier of the user owning accounts and newsletters.
    UserId
}

string_id! {
    /// Unique identifier for a persisted newsletter row.
    NewsletterId
}

string_id! {
    /// Provider-assigned message identifier (Gmail message id, Graph message id).
    ///
    /// Together with the account id this is the dedup key for imports.
    MessageId
}
