//! Sender address parsing and domain extraction.

use serde::{Deserialize, Serialize};

/// An email address with optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Email address.
    pub email: String,
    /// Display name (e.g., "Morning Brew").
    pub name: Option<String>,
}

impl Address {
    /// Creates a new address with just an email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    /// Creates a new address with email and display name.
    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }

    /// Parses a header value like `"Name" <email@example.com>` or a bare address.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if let (Some(start), Some(end)) = (value.rfind('<'), value.rfind('>')) {
            if start < end {
                let email = value[start + 1..end].trim().to_string();
                let name = value[..start].trim().trim_matches('"').trim().to_string();
                return Address {
                    email,
                    name: if name.is_empty() { None } else { Some(name) },
                };
            }
        }
        Address::new(value)
    }

    /// Returns the display name, falling back to the address.
    pub fn display(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }

    /// Returns the lowercase domain of this address.
    pub fn domain(&self) -> Option<String> {
        extract_domain(&self.email)
    }

    /// Returns the lowercase local part of this address.
    pub fn local_part(&self) -> Option<String> {
        local_part(&self.email)
    }
}

/// Extracts the lowercase sender domain from a `From` header or bare address.
///
/// Handles both `Display Name <addr@domain>` and `addr@domain`. When angle
/// brackets hold an address, the domain follows the last unescaped `@`
/// inside them; otherwise it follows the last unescaped `@` in the whole
/// string. Returns `None` when no `@` is present or nothing follows it.
pub fn extract_domain(from: &str) -> Option<String> {
    let address = bracketed(from).unwrap_or(from);
    let at = last_unescaped_at(address)?;

    let domain = address[at + 1..]
        .trim()
        .trim_end_matches(|c: char| c == '>' || c == '"' || c == '.' || c.is_whitespace())
        .to_lowercase();

    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

/// Extracts the lowercase local part (before the `@`) of an address.
pub fn local_part(from: &str) -> Option<String> {
    let address = bracketed(from).unwrap_or(from);
    let at = last_unescaped_at(address)?;

    let local = address[..at]
        .trim()
        .trim_start_matches(|c: char| c == '<' || c == '"')
        .to_lowercase();

    if local.is_empty() {
        None
    } else {
        Some(local)
    }
}

/// Returns the text inside the last `<...>` pair if it contains an `@`.
fn bracketed(value: &str) -> Option<&str> {
    let start = value.rfind('<')?;
    let end = start + value[start..].find('>')?;
    let inner = &value[start + 1..end];
    last_unescaped_at(inner).map(|_| inner)
}

fn last_unescaped_at(value: &str) -> Option<usize> {
    value
        .char_indices()
        .filter(|&(i, c)| c == '@' && !value[..i].ends_with('\\'))
        .map(|(i, _)| i)
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_display_name_form() {
        assert_eq!(
            extract_domain("Morning Brew <crew@MorningBrew.com>"),
            Some("morningbrew.com".to_string())
        );
    }

    #[test]
    fn extracts_from_bare_address() {
        assert_eq!(
            extract_domain("hello@digest.example.com"),
            Some("digest.example.com".to_string())
        );
    }

    #[test]
    fn uses_bracketed_address_over_display_name() {
        assert_eq!(
            extract_domain("\"team@fake.com\" <news@real.org>"),
            Some("real.org".to_string())
        );
    }

    #[test]
    fn uses_last_at_sign() {
        assert_eq!(
            extract_domain("\"odd@local\"@example.net"),
            Some("example.net".to_string())
        );
    }

    #[test]
    fn ignores_escaped_at_sign() {
        assert_eq!(
            extract_domain("weird\\@name@example.io"),
            Some("example.io".to_string())
        );
        assert_eq!(extract_domain("no\\@domain"), None);
    }

    #[test]
    fn returns_none_without_at() {
        assert_eq!(extract_domain("Undisclosed recipients"), None);
        assert_eq!(extract_domain(""), None);
        assert_eq!(extract_domain("dangling@"), None);
    }

    #[test]
    fn falls_back_when_brackets_hold_no_address() {
        assert_eq!(
            extract_domain("alerts@bank.com <Bank Alerts>"),
            Some("bank.com".to_string())
        );
    }

    #[test]
    fn local_part_is_lowercased() {
        assert_eq!(local_part("News <Hello@Example.com>"), Some("hello".to_string()));
        assert_eq!(local_part("example.com"), None);
    }

    #[test]
    fn parse_address_with_name() {
        let addr = Address::parse("\"The Hustle\" <news@thehustle.co>");
        assert_eq!(addr.email, "news@thehustle.co");
        assert_eq!(addr.name.as_deref(), Some("The Hustle"));
        assert_eq!(addr.display(), "The Hustle");
        assert_eq!(addr.domain().as_deref(), Some("thehustle.co"));
    }

    #[test]
    fn parse_bare_address() {
        let addr = Address::parse("  jane@gmail.com ");
        assert_eq!(addr.email, "jane@gmail.com");
        assert!(addr.name.is_none());
        assert_eq!(addr.display(), "jane@gmail.com");
    }
}
