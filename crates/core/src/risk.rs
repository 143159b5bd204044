//! Risk classification and advisory priority for forcing requests.
//!
//! Both functions are pure: identical inputs always give identical outputs.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::client::{ClientHistoryEntry, ClientRiskProfile};
use crate::domain::demande::{DemandeStatus, Priority, RiskScore};

pub const CRITIQUE_THRESHOLD: i64 = 80;
pub const ELEVE_THRESHOLD: i64 = 60;
pub const MOYEN_THRESHOLD: i64 = 40;

pub const URGENT_AMOUNT: i64 = 20_000_000;
pub const URGENT_ELEVE_AMOUNT: i64 = 5_000_000;
pub const URGENT_AGE_HOURS: i64 = 48;

const RATING_MULTIPLIER: i64 = 4;
const CLASSIFICATION_MULTIPLIER: i64 = 3;
const REJECTION_PENALTY: i64 = 3;
const LOYALTY_BONUS: i64 = -2;
const LOYALTY_MIN_VALIDATED: usize = 5;

/// Per-factor points, kept for explanation to reviewers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub rating: i64,
    pub classification: i64,
    pub capacity: i64,
    pub history: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: RiskScore,
    pub points: i64,
    pub capacity_ratio: Decimal,
    pub factors: RiskFactors,
}

pub fn compute_risk(
    profile: &ClientRiskProfile,
    amount: Decimal,
    history: &[ClientHistoryEntry],
) -> RiskAssessment {
    let capacity_ratio = capacity_ratio(profile, amount);
    let factors = RiskFactors {
        rating: i64::from(profile.rating.ordinal()) * RATING_MULTIPLIER,
        classification: i64::from(profile.classification.weight()) * CLASSIFICATION_MULTIPLIER,
        capacity: capacity_points(capacity_ratio),
        history: history_points(history),
    };

    let points = (factors.rating + factors.classification + factors.capacity + factors.history)
        .clamp(0, 100);

    RiskAssessment { score: classify(points), points, capacity_ratio, factors }
}

/// Requested amount over available capacity; the divisor never drops below one.
pub fn capacity_ratio(profile: &ClientRiskProfile, amount: Decimal) -> Decimal {
    let divisor = profile.available_capacity().max(Decimal::ONE);
    amount / divisor
}

fn capacity_points(ratio: Decimal) -> i64 {
    if ratio > Decimal::new(15, 1) {
        10
    } else if ratio > Decimal::ONE {
        6
    } else if ratio > Decimal::new(5, 1) {
        4
    } else {
        0
    }
}

fn history_points(history: &[ClientHistoryEntry]) -> i64 {
    let rejected = history.iter().any(|entry| entry.status == DemandeStatus::Rejected);
    let validated =
        history.iter().filter(|entry| entry.status == DemandeStatus::Validated).count();

    let mut points = 0;
    if rejected {
        points += REJECTION_PENALTY;
    }
    if validated > LOYALTY_MIN_VALIDATED {
        points += LOYALTY_BONUS;
    }
    points
}

pub fn classify(points: i64) -> RiskScore {
    if points >= CRITIQUE_THRESHOLD {
        RiskScore::Critique
    } else if points >= ELEVE_THRESHOLD {
        RiskScore::Eleve
    } else if points >= MOYEN_THRESHOLD {
        RiskScore::Moyen
    } else {
        RiskScore::Faible
    }
}

/// Advisory only: recomputed from stored fields whenever needed.
pub fn compute_priority(
    risk: RiskScore,
    amount: Decimal,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Priority {
    let urgent = risk == RiskScore::Critique
        || amount > Decimal::from(URGENT_AMOUNT)
        || now - created_at > Duration::hours(URGENT_AGE_HOURS)
        || (risk == RiskScore::Eleve && amount > Decimal::from(URGENT_ELEVE_AMOUNT));

    if urgent {
        Priority::Urgente
    } else {
        Priority::Normale
    }
}
