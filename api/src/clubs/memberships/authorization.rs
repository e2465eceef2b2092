use serde::{Deserialize, Serialize};

use super::Membership;
use crate::error::{AppError, AppResult};

/// Privilege levels within a single club, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Applicant,
    Member,
    Officer,
    Owner,
}

impl Membership {
    /// Owners count as officers even if their officer flag was cleared.
    pub fn has_role(&self, role: Role) -> bool {
        match role {
            Role::Applicant => self.is_applicant,
            Role::Member => self.is_member,
            Role::Officer => self.is_officer || self.is_owner,
            Role::Owner => self.is_owner,
        }
    }

    /// The most privileged role this membership holds.
    pub fn highest_role(&self) -> Option<Role> {
        [Role::Owner, Role::Officer, Role::Member, Role::Applicant]
            .into_iter()
            .find(|role| self.has_role(*role))
    }
}

/// Fails closed: no membership row at all is a denial.
pub fn require_role(membership: Option<&Membership>, role: Role) -> AppResult<&Membership> {
    match membership {
        Some(membership) if membership.has_role(role) => Ok(membership),
        _ => Err(AppError::Unauthorized),
    }
}

pub fn member_required(membership: Option<Membership>) -> AppResult<Membership> {
    require_role(membership.as_ref(), Role::Member)?;
    membership.ok_or(AppError::Unauthorized)
}

pub fn officer_required(membership: Option<Membership>) -> AppResult<Membership> {
    require_role(membership.as_ref(), Role::Officer)?;
    membership.ok_or(AppError::Unauthorized)
}

pub fn owner_required(membership: Option<Membership>) -> AppResult<Membership> {
    require_role(membership.as_ref(), Role::Owner)?;
    membership.ok_or(AppError::Unauthorized)
}
