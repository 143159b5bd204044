use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgencyId(pub String);

impl fmt::Display for AgencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of roles known to the authorization model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Conseiller,
    Rm,
    Dce,
    Adg,
    Dga,
    Risques,
    Admin,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Client,
        Role::Conseiller,
        Role::Rm,
        Role::Dce,
        Role::Adg,
        Role::Dga,
        Role::Risques,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Conseiller => "conseiller",
            Self::Rm => "rm",
            Self::Dce => "dce",
            Self::Adg => "adg",
            Self::Dga => "dga",
            Self::Risques => "risques",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "client" => Some(Self::Client),
            "conseiller" | "advisor" => Some(Self::Conseiller),
            "rm" => Some(Self::Rm),
            "dce" => Some(Self::Dce),
            "adg" => Some(Self::Adg),
            "dga" => Some(Self::Dga),
            "risques" | "risk" => Some(Self::Risques),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Position in the capability tiers. Roles sharing a rank share a capability set.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Client => 0,
            Self::Conseiller => 1,
            Self::Rm | Self::Dce => 2,
            Self::Adg => 3,
            Self::Dga | Self::Risques => 4,
            Self::Admin => 5,
        }
    }

    pub fn is_staff(&self) -> bool {
        !matches!(self, Self::Client)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An already-authenticated caller. The core only authorizes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub agency_id: AgencyId,
    /// Maximum amount this actor may approve. `None` for non-approving roles.
    pub authorization_ceiling: Option<Decimal>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role, agency_id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            role,
            agency_id: AgencyId(agency_id.into()),
            authorization_ceiling: None,
        }
    }

    pub fn with_ceiling(mut self, ceiling: Decimal) -> Self {
        self.authorization_ceiling = Some(ceiling);
        self
    }

    pub fn ceiling(&self) -> Decimal {
        self.authorization_ceiling.unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn role_storage_encoding_round_trips() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn role_parse_accepts_english_aliases() {
        assert_eq!(Role::parse("Advisor"), Some(Role::Conseiller));
        assert_eq!(Role::parse(" risk "), Some(Role::Risques));
        assert_eq!(Role::parse("teller"), None);
    }
}
