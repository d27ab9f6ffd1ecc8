//! Capability discovery
//!
//! The capability table is static configuration. Each turn keeps only the
//! entries whose keywords show up in the utterance.

use crate::config::CapabilityEntry;
use crate::steering::mentions_any;

/// Upper bound on capabilities considered per turn
pub const MAX_CAPABILITIES: usize = 20;

/// Registered capabilities
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    entries: Vec<CapabilityEntry>,
}

impl CapabilityCatalog {
    #[must_use]
    pub const fn new(entries: Vec<CapabilityEntry>) -> Self {
        Self { entries }
    }

    /// Bounded list of registered capabilities
    #[must_use]
    pub fn list(&self) -> &[CapabilityEntry] {
        &self.entries[..self.entries.len().min(MAX_CAPABILITIES)]
    }

    /// Capabilities whose keywords (or name) overlap the utterance
    #[must_use]
    pub fn relevant(&self, utterance: &str) -> Vec<&CapabilityEntry> {
        self.list()
            .iter()
            .filter(|cap| {
                mentions_any(utterance, &cap.keywords)
                    || mentions_any(utterance, std::slice::from_ref(&cap.name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(name: &str, keywords: &[&str]) -> CapabilityEntry {
        CapabilityEntry {
            name: name.to_string(),
            description: format!("{name} capability"),
            keywords: keywords.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn keeps_overlapping_capabilities() {
        let catalog = CapabilityCatalog::new(vec![
            cap("booking", &["book", "appointment", "meeting"]),
            cap("quotes", &["quote", "estimate", "price"]),
        ]);
        let relevant = catalog.relevant("Can I book a meeting next week?");
        assert_eq!(relevant.len(), 1);
        assert_eq!(relevant[0].name, "booking");
        assert!(catalog.relevant("Tell me a joke").is_empty());
        assert_eq!(catalog.relevant("Do you do quotes?").len(), 1);
    }

    #[test]
    fn list_is_bounded() {
        let entries = (0..30).map(|i| cap(&format!("cap{i}"), &[])).collect();
        assert_eq!(CapabilityCatalog::new(entries).list().len(), MAX_CAPABILITIES);
    }
}
