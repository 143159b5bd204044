//! Role to capability table. Every authorization decision in the crate goes
//! through [`has_capability`].
//!
//! Staff capabilities are tiered and cumulative upward, with admin on top.
//! The own-scope capabilities belong to the client role alone.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::actor::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    ViewOwnDashboard,
    ViewOwnDemande,
    CreateDemande,
    ReviewDemande,
    ValidateDemande,
    EscalateDemande,
    RegularizeDemande,
    ViewTeamDashboard,
    ViewAgencyDashboard,
    ExportReports,
    ViewGlobalDashboard,
    ViewRiskStats,
    ManageUsers,
}

impl Capability {
    pub const ALL: [Capability; 13] = [
        Capability::ViewOwnDashboard,
        Capability::ViewOwnDemande,
        Capability::CreateDemande,
        Capability::ReviewDemande,
        Capability::ValidateDemande,
        Capability::EscalateDemande,
        Capability::RegularizeDemande,
        Capability::ViewTeamDashboard,
        Capability::ViewAgencyDashboard,
        Capability::ExportReports,
        Capability::ViewGlobalDashboard,
        Capability::ViewRiskStats,
        Capability::ManageUsers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewOwnDashboard => "VIEW_OWN_DASHBOARD",
            Self::ViewOwnDemande => "VIEW_OWN_DEMANDE",
            Self::CreateDemande => "CREATE_DEMANDE",
            Self::ReviewDemande => "REVIEW_DEMANDE",
            Self::ValidateDemande => "VALIDATE_DEMANDE",
            Self::EscalateDemande => "ESCALATE_DEMANDE",
            Self::RegularizeDemande => "REGULARIZE_DEMANDE",
            Self::ViewTeamDashboard => "VIEW_TEAM_DASHBOARD",
            Self::ViewAgencyDashboard => "VIEW_AGENCY_DASHBOARD",
            Self::ExportReports => "EXPORT_REPORTS",
            Self::ViewGlobalDashboard => "VIEW_GLOBAL_DASHBOARD",
            Self::ViewRiskStats => "VIEW_RISK_STATS",
            Self::ManageUsers => "MANAGE_USERS",
        }
    }

    /// Lowest staff tier (see [`Role::rank`]) that holds this capability, or
    /// `None` for the client-only ones.
    fn min_rank(&self) -> Option<u8> {
        match self {
            Self::ViewOwnDashboard | Self::ViewOwnDemande | Self::CreateDemande => None,
            Self::ReviewDemande
            | Self::ValidateDemande
            | Self::EscalateDemande
            | Self::RegularizeDemande => Some(1),
            Self::ViewTeamDashboard => Some(2),
            Self::ViewAgencyDashboard | Self::ExportReports => Some(3),
            Self::ViewGlobalDashboard | Self::ViewRiskStats => Some(4),
            Self::ManageUsers => Some(5),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn has_capability(role: Role, capability: Capability) -> bool {
    match capability.min_rank() {
        None => role == Role::Client,
        Some(_) if role == Role::Admin => true,
        Some(rank) => role.rank() >= rank,
    }
}

pub fn capabilities_for(role: Role) -> BTreeSet<Capability> {
    Capability::ALL.into_iter().filter(|capability| has_capability(role, *capability)).collect()
}

/// Admins approve any amount; everyone else is held to their ceiling.
pub fn bypasses_authorization_ceiling(role: Role) -> bool {
    role == Role::Admin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_only_sees_own_scope() {
        let caps = capabilities_for(Role::Client);
        assert_eq!(
            caps,
            BTreeSet::from([
                Capability::ViewOwnDashboard,
                Capability::ViewOwnDemande,
                Capability::CreateDemande
            ])
        );
        assert!(!has_capability(Role::Client, Capability::ReviewDemande));
    }

    #[test]
    fn staff_do_not_inherit_client_capabilities() {
        for role in Role::ALL.into_iter().filter(Role::is_staff) {
            assert!(!has_capability(role, Capability::CreateDemande), "{role} can create");
            assert!(!has_capability(role, Capability::ViewOwnDemande), "{role} owns demandes");
            assert!(!has_capability(role, Capability::ViewOwnDashboard));
        }
        assert!(!capabilities_for(Role::Rm).contains(&Capability::CreateDemande));
    }

    #[test]
    fn staff_tiers_are_cumulative_upward() {
        let staff = || Role::ALL.into_iter().filter(Role::is_staff);
        for lower in staff() {
            for higher in staff().filter(|role| role.rank() > lower.rank()) {
                assert!(
                    capabilities_for(lower).is_subset(&capabilities_for(higher)),
                    "{lower} should be a subset of {higher}"
                );
            }
        }
    }

    #[test]
    fn peers_share_capability_sets() {
        assert_eq!(capabilities_for(Role::Rm), capabilities_for(Role::Dce));
        assert_eq!(capabilities_for(Role::Dga), capabilities_for(Role::Risques));
    }

    #[test]
    fn review_starts_at_advisor_and_risk_stats_at_deputy_level() {
        assert!(has_capability(Role::Conseiller, Capability::ReviewDemande));
        assert!(has_capability(Role::Conseiller, Capability::ValidateDemande));
        assert!(!has_capability(Role::Conseiller, Capability::ViewTeamDashboard));
        assert!(has_capability(Role::Adg, Capability::ViewAgencyDashboard));
        assert!(!has_capability(Role::Adg, Capability::ViewRiskStats));
        assert!(has_capability(Role::Risques, Capability::ViewRiskStats));
        assert!(!has_capability(Role::Risques, Capability::ManageUsers));
    }

    #[test]
    fn admin_holds_every_staff_capability_and_skips_ceiling_checks() {
        let admin = capabilities_for(Role::Admin);
        assert_eq!(admin.len(), Capability::ALL.len() - capabilities_for(Role::Client).len());
        assert!(admin.is_disjoint(&capabilities_for(Role::Client)));
        assert!(bypasses_authorization_ceiling(Role::Admin));
        assert!(!bypasses_authorization_ceiling(Role::Dga));
    }
}
