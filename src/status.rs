//! Status taxonomy
//!
//! The status cell is free text edited by hand in the spreadsheet, so every read goes
//! through [`StatusTaxonomy::normalize`] before the policy sees it. The taxonomy itself is
//! configuration data, versioned so that superseded layouts are rejected at startup
//! instead of being half-supported.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current taxonomy layout. Earlier revisions used other column orders and tier sets.
pub const TAXONOMY_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Observer,
    Participant,
    Partner,
    Resident,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Observer, Tier::Participant, Tier::Partner, Tier::Resident];

    pub fn name(self) -> &'static str {
        match self {
            Tier::Observer => "observer",
            Tier::Participant => "participant",
            Tier::Partner => "partner",
            Tier::Resident => "resident",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Known(Tier),
    /// Non-blank cell text that matches no label or alias.
    Unrecognized(String),
}

impl Status {
    pub const OBSERVER: Status = Status::Known(Tier::Observer);

    pub fn tier(&self) -> Option<Tier> {
        match self {
            Status::Known(tier) => Some(*tier),
            Status::Unrecognized(_) => None,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::OBSERVER
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Known(tier) => write!(f, "{}", tier.name()),
            Status::Unrecognized(raw) => write!(f, "unrecognized({raw})"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierLabels {
    pub tier: Tier,
    /// Spelling written to the sheet and shown to users.
    pub label: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTaxonomy {
    pub version: u32,
    pub tiers: Vec<TierLabels>,
    pub allowed: Vec<Tier>,
}

impl Default for StatusTaxonomy {
    fn default() -> Self {
        let tier = |tier, label: &str, aliases: &[&str]| TierLabels {
            tier,
            label: label.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        };

        Self {
            version: TAXONOMY_VERSION,
            tiers: vec![
                tier(Tier::Observer, "Наблюдатель", &["observer"]),
                tier(Tier::Participant, "Участник", &["participant", "member"]),
                tier(Tier::Partner, "Партнёр", &["Партнер", "partner"]),
                tier(Tier::Resident, "Резидент", &["resident"]),
            ],
            allowed: vec![Tier::Participant, Tier::Partner, Tier::Resident],
        }
    }
}

impl StatusTaxonomy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != TAXONOMY_VERSION {
            return Err(ConfigError::UnsupportedTaxonomy {
                found: self.version,
                expected: TAXONOMY_VERSION,
            });
        }
        for tier in Tier::ALL {
            if !self.tiers.iter().any(|t| t.tier == tier && !t.label.trim().is_empty()) {
                return Err(ConfigError::MissingTierLabel(tier.name().to_string()));
            }
        }
        if self.allowed.contains(&Tier::Observer) {
            return Err(ConfigError::ObserverAllowed);
        }
        Ok(())
    }

    /// Map raw cell text to a status. Blank means Observer.
    pub fn normalize(&self, raw: &str) -> Status {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Status::OBSERVER;
        }

        let key = fold(trimmed);
        for labels in &self.tiers {
            let matches = std::iter::once(&labels.label)
                .chain(labels.aliases.iter())
                .any(|candidate| fold(candidate) == key);
            if matches {
                return Status::Known(labels.tier);
            }
        }

        log::debug!("Unrecognized status value: '{trimmed}'");
        Status::Unrecognized(trimmed.to_string())
    }

    pub fn label(&self, tier: Tier) -> &str {
        self.tiers
            .iter()
            .find(|t| t.tier == tier)
            .map(|t| t.label.as_str())
            .unwrap_or(tier.name())
    }

    /// Human-readable form for replies. Unrecognized values are echoed as stored.
    pub fn display(&self, status: &Status) -> String {
        match status {
            Status::Known(tier) => self.label(*tier).to_string(),
            Status::Unrecognized(raw) => raw.clone(),
        }
    }
}

// Case-insensitive comparison key: strips quoting and treats ё as е.
fn fold(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '«' | '»'))
        .trim()
        .to_lowercase()
        .replace('ё', "е")
}
