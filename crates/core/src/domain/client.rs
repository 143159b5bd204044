use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::{AgencyId, UserId};
use crate::domain::demande::{DemandeStatus, ReferenceCode};

/// Internal credit rating letter, A (best) to E (worst).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientRating {
    A,
    B,
    C,
    D,
    E,
}

impl ClientRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "E" => Some(Self::E),
            _ => None,
        }
    }

    pub fn ordinal(&self) -> u32 {
        match self {
            Self::A => 1,
            Self::B => 2,
            Self::C => 3,
            Self::D => 4,
            Self::E => 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientClassification {
    Normal,
    Sensible,
    Restructure,
    Defaut,
}

impl ClientClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Sensible => "sensible",
            Self::Restructure => "restructure",
            Self::Defaut => "defaut",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "sensible" | "sensitive" => Some(Self::Sensible),
            "restructure" | "restructuré" | "restructured" => Some(Self::Restructure),
            "defaut" | "défaut" | "default" => Some(Self::Defaut),
            _ => None,
        }
    }

    pub fn weight(&self) -> u32 {
        match self {
            Self::Normal => 1,
            Self::Sensible => 3,
            Self::Restructure => 4,
            Self::Defaut => 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRiskProfile {
    pub client_id: UserId,
    pub agency_id: AgencyId,
    pub advisor_id: Option<UserId>,
    pub rating: ClientRating,
    pub classification: ClientClassification,
    pub balance: Decimal,
    pub overdraft_limit: Decimal,
}

impl ClientRiskProfile {
    /// Balance plus overdraft line, saturating at the `Decimal` bounds.
    pub fn available_capacity(&self) -> Decimal {
        self.balance.checked_add(self.overdraft_limit).unwrap_or(
            if self.balance.is_sign_negative() { Decimal::MIN } else { Decimal::MAX },
        )
    }
}

/// Outcome of one earlier demande of the same client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHistoryEntry {
    pub reference: ReferenceCode,
    pub status: DemandeStatus,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}
