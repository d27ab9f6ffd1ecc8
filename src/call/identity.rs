//! Caller identity resolution
//!
//! Resolved once per call: static contact directory first, then the memory
//! store's contact cards, then an unknown-caller default.

use std::collections::HashMap;

use crate::config::{ContactEntry, OwnerConfig};
use crate::db::MemoryStore;
use crate::db::memory::CATEGORY_CONTACT;

/// Relationship of the caller to the owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
    Owner,
    Contact,
    Unknown,
}

impl CallerRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Contact => "contact",
            Self::Unknown => "unknown",
        }
    }
}

/// How far the caller's claims are believed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustTier {
    Full,
    Trusted,
    Untrusted,
}

/// What the agent may disclose to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTier {
    /// Anything, including schedule and finances
    Unrestricted,
    /// General business information
    Standard,
    /// Schedule, financial and personal details withheld
    Guarded,
}

/// Who is on the line
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub role: CallerRole,
    pub trust: TrustTier,
    pub access: AccessTier,
    /// Custom greeting template
    pub greeting: Option<String>,
    /// Caller-specific prompt instructions
    pub prompt_notes: Option<String>,
    history: Option<String>,
}

impl CallerIdentity {
    #[must_use]
    pub fn owner(name: &str, phone: Option<String>) -> Self {
        Self {
            display_name: Some(name.to_string()),
            phone,
            role: CallerRole::Owner,
            trust: TrustTier::Full,
            access: AccessTier::Unrestricted,
            greeting: None,
            prompt_notes: None,
            history: None,
        }
    }

    #[must_use]
    pub fn contact(name: &str, phone: Option<String>) -> Self {
        Self {
            display_name: Some(name.to_string()),
            phone,
            role: CallerRole::Contact,
            trust: TrustTier::Trusted,
            access: AccessTier::Standard,
            greeting: None,
            prompt_notes: None,
            history: None,
        }
    }

    #[must_use]
    pub const fn unknown(phone: Option<String>) -> Self {
        Self {
            display_name: None,
            phone,
            role: CallerRole::Unknown,
            trust: TrustTier::Untrusted,
            access: AccessTier::Guarded,
            greeting: None,
            prompt_notes: None,
            history: None,
        }
    }

    /// Attach prior-call history
    #[must_use]
    pub fn with_history(mut self, history: Option<String>) -> Self {
        self.history = history.filter(|h| !h.trim().is_empty());
        self
    }

    #[must_use]
    pub fn history(&self) -> Option<&str> {
        self.history.as_deref()
    }

    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.role == CallerRole::Owner
    }

    /// Name for greetings, falling back to "there"
    #[must_use]
    pub fn name_or_there(&self) -> &str {
        self.display_name.as_deref().unwrap_or("there")
    }
}

/// Normalize a phone number to E.164-ish form
///
/// Ten-digit numbers are assumed to be North American.
#[must_use]
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }

    let normalized = match digits.len() {
        10 => format!("+1{digits}"),
        11 if digits.starts_with('1') => format!("+{digits}"),
        _ if raw.trim_start().starts_with('+') => format!("+{digits}"),
        _ => digits,
    };
    Some(normalized)
}

/// Static phone → identity lookup
#[derive(Debug, Clone, Default)]
pub struct ContactDirectory {
    entries: HashMap<String, CallerIdentity>,
}

impl ContactDirectory {
    /// Build from the owner and contact configuration
    #[must_use]
    pub fn from_config(owner: &OwnerConfig, contacts: &[ContactEntry]) -> Self {
        let mut entries = HashMap::new();

        for contact in contacts {
            let Some(phone) = normalize_phone(&contact.phone) else {
                tracing::warn!(name = %contact.name, "contact has no usable phone number");
                continue;
            };
            let mut identity = CallerIdentity::contact(&contact.name, Some(phone.clone()));
            identity.greeting.clone_from(&contact.greeting);
            identity.prompt_notes.clone_from(&contact.notes);
            entries.insert(phone, identity);
        }

        // Owner last so it wins over a duplicate contact entry
        if let Some(phone) = owner.phone.as_deref().and_then(normalize_phone) {
            entries.insert(phone.clone(), CallerIdentity::owner(&owner.name, Some(phone)));
        }

        Self { entries }
    }

    #[must_use]
    pub fn lookup(&self, phone: &str) -> Option<&CallerIdentity> {
        self.entries.get(phone)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve who is calling
///
/// Store errors are logged and treated as "not found".
pub async fn resolve_identity(
    directory: &ContactDirectory,
    memory: &dyn MemoryStore,
    raw_phone: Option<&str>,
) -> CallerIdentity {
    let Some(phone) = raw_phone.and_then(normalize_phone) else {
        return CallerIdentity::unknown(None);
    };

    if let Some(identity) = directory.lookup(&phone) {
        return identity.clone();
    }

    match memory.search(&phone).await {
        Ok(records) => {
            if let Some(card) = records
                .into_iter()
                .find(|r| r.category == CATEGORY_CONTACT && !r.subject.trim().is_empty())
            {
                tracing::debug!(phone = %phone, name = %card.subject, "caller found in memory store");
                let mut identity = CallerIdentity::contact(card.subject.trim(), Some(phone));
                identity.prompt_notes = Some(card.content);
                return identity;
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "contact lookup in memory store failed");
        }
    }

    CallerIdentity::unknown(Some(phone))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_config() -> OwnerConfig {
        OwnerConfig {
            name: "Jordan".to_string(),
            phone: Some("(555) 000-1111".to_string()),
            email: None,
        }
    }

    #[test]
    fn normalizes_common_formats() {
        assert_eq!(normalize_phone("555-123-4567").as_deref(), Some("+15551234567"));
        assert_eq!(normalize_phone("1 (555) 123-4567").as_deref(), Some("+15551234567"));
        assert_eq!(normalize_phone("+44 20 7946 0958").as_deref(), Some("+442079460958"));
        assert_eq!(normalize_phone("anonymous"), None);
    }

    #[test]
    fn directory_resolves_owner_and_contacts() {
        let contacts = vec![ContactEntry {
            name: "Dana".to_string(),
            phone: "555.123.4567".to_string(),
            greeting: Some("Hey {name}!".to_string()),
            notes: None,
        }];
        let directory = ContactDirectory::from_config(&owner_config(), &contacts);
        assert_eq!(directory.len(), 2);

        let owner = directory.lookup("+15550001111").unwrap();
        assert!(owner.is_owner());
        assert_eq!(owner.access, AccessTier::Unrestricted);

        let dana = directory.lookup("+15551234567").unwrap();
        assert_eq!(dana.role, CallerRole::Contact);
        assert_eq!(dana.greeting.as_deref(), Some("Hey {name}!"));
    }

    #[test]
    fn history_is_attached_once_resolved() {
        let identity = CallerIdentity::unknown(None).with_history(Some("  ".to_string()));
        assert!(identity.history().is_none());

        let identity = identity.with_history(Some("Asked about pricing".to_string()));
        assert_eq!(identity.history(), Some("Asked about pricing"));
        assert_eq!(identity.name_or_there(), "there");
    }
}
