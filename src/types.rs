//! Core authorization types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique role identifier
pub type RoleId = String;

/// Unique user identifier
pub type UserId = String;

/// What a role assignment is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentTargetType {
    /// Direct assignment to a single user
    User,
    /// Assignment to every member of a department
    Department,
    /// Assignment to a department and all of its descendants
    DepartmentHierarchy,
    /// Assignment to every member of a virtual group
    VirtualGroup,
}

/// A role granted to a target, optionally bounded by a validity window.
///
/// Assignments are created and removed by the admin service; this engine
/// only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Assignment identifier
    pub id: String,

    /// The granted role
    pub role_id: RoleId,

    /// Kind of target this assignment is attached to
    pub target_type: AssignmentTargetType,

    /// Target identifier (user id, department id or group id)
    pub target_id: String,

    /// Start of the validity window, if bounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,

    /// End of the validity window, if bounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    /// Create an unbounded assignment
    pub fn new(
        id: impl Into<String>,
        role_id: impl Into<String>,
        target_type: AssignmentTargetType,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role_id: role_id.into(),
            target_type,
            target_id: target_id.into(),
            valid_from: None,
            valid_to: None,
        }
    }

    /// Bound the assignment to a validity window
    pub fn with_window(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_to = valid_to;
        self
    }

    /// An assignment is valid when it has no window, or `now` falls inside
    /// the window (bounds inclusive).
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(from) = self.valid_from {
            if now < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to {
            if now > to {
                return false;
            }
        }
        true
    }
}

/// Role lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleStatus {
    /// Role is active and grants its permissions
    Active,
    /// Role is disabled; assignments referencing it are skipped
    Disabled,
}

/// A role definition as read from the policy store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role identifier
    pub id: RoleId,
    /// Stable role code, e.g. "DEV_LEAD"
    pub code: String,
    /// Display name
    pub name: String,
    /// Lifecycle status
    pub status: RoleStatus,
}

impl Role {
    /// Create an active role
    pub fn active(id: impl Into<String>, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            name: name.into(),
            status: RoleStatus::Active,
        }
    }

    /// Whether the role currently grants anything
    pub fn is_active(&self) -> bool {
        self.status == RoleStatus::Active
    }
}

/// The assignment path through which an effective role was granted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSource {
    /// Kind of assignment that matched
    pub source_type: AssignmentTargetType,
    /// Identifier of the matching target (user/department/group id)
    pub source_id: String,
    /// Display name of the source
    pub source_name: String,
    /// Identifier of the originating assignment
    pub assignment_id: String,
}

/// A role actually held by a user after merging all assignment sources.
///
/// A role id appears at most once in an effective-role list; additional
/// matching assignments accumulate as further [`RoleSource`] entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveRole {
    /// Role identifier
    pub role_id: RoleId,
    /// Stable role code
    pub role_code: String,
    /// Display name
    pub role_name: String,
    /// Assignment paths that granted this role, in discovery order
    pub sources: Vec<RoleSource>,
}

/// The caller on whose behalf a check runs.
///
/// Checks without an authenticated principal are denied before any lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User identifier
    pub id: UserId,
    /// Whether the surrounding request carried valid authentication
    pub authenticated: bool,
}

impl Principal {
    /// An authenticated principal
    pub fn authenticated(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authenticated: true,
        }
    }

    /// An unauthenticated placeholder principal
    pub fn anonymous() -> Self {
        Self {
            id: String::new(),
            authenticated: false,
        }
    }
}
