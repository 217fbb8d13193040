//! License tiers and the immutable license record.
//!
//! There are exactly three tiers. No dynamic tiers, no temporary boosts.
//! This is policy, not anti-piracy: the record is plain JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// License tier. The only valid tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LicenseTier {
    #[default]
    Free,
    Freelance,
    Facility,
}

impl LicenseTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseTier::Free => "free",
            LicenseTier::Freelance => "freelance",
            LicenseTier::Facility => "facility",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Some(LicenseTier::Free),
            "freelance" => Some(LicenseTier::Freelance),
            "facility" => Some(LicenseTier::Facility),
            _ => None,
        }
    }

    /// Locked per-tier worker limits. None means unlimited.
    pub fn max_workers(&self) -> Option<u32> {
        match self {
            LicenseTier::Free => Some(1),
            LicenseTier::Freelance => Some(3),
            LicenseTier::Facility => None,
        }
    }

    /// Free tier monitoring is local-only.
    pub fn allows_lan_monitoring(&self) -> bool {
        !matches!(self, LicenseTier::Free)
    }
}

impl std::fmt::Display for LicenseTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable license record, resolved once per process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub tier: LicenseTier,
    /// None = unlimited.
    pub max_workers: Option<u32>,
    pub issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl License {
    /// Create a license with the tier's locked limit.
    pub fn for_tier(tier: LicenseTier, note: Option<String>) -> Self {
        Self {
            tier,
            max_workers: tier.max_workers(),
            issued_at: Utc::now(),
            note,
        }
    }

    /// The default license used without any file or override.
    pub fn default_free() -> Self {
        Self::for_tier(
            LicenseTier::Free,
            Some("Default free license for evaluation".to_string()),
        )
    }

    /// Resolve a tier name, falling back to Free with an explanatory note
    /// on unknown input. The fallback is explicit, not silent.
    pub fn from_tier_name(name: &str) -> Self {
        match LicenseTier::parse(name) {
            Some(tier) => Self::for_tier(tier, None),
            None => Self::for_tier(
                LicenseTier::Free,
                Some(format!("Unknown tier '{name}' - defaulted to free")),
            ),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_workers.is_none()
    }
}

impl std::fmt::Display for License {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max_workers {
            Some(n) => write!(f, "License({}, max_workers={n})", self.tier),
            None => write!(f, "License({}, max_workers=unlimited)", self.tier),
        }
    }
}
