use crate::status::{Status, StatusTaxonomy, Tier};
use std::collections::HashSet;

/// Decides who may post. Anything outside the allowed tiers is denied, including
/// status values the taxonomy does not recognise.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    allowed: HashSet<Tier>,
}

impl AccessPolicy {
    pub fn new(allowed: impl IntoIterator<Item = Tier>) -> Self {
        Self {
            allowed: allowed
                .into_iter()
                .filter(|tier| *tier != Tier::Observer)
                .collect(),
        }
    }

    pub fn from_taxonomy(taxonomy: &StatusTaxonomy) -> Self {
        Self::new(taxonomy.allowed.iter().copied())
    }

    pub fn is_allowed(&self, status: &Status) -> bool {
        match status.tier() {
            Some(tier) => self.allowed.contains(&tier),
            None => false,
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new([Tier::Participant, Tier::Partner, Tier::Resident])
    }
}
