//! Policy store abstraction
//!
//! The engine never talks to a database directly; every lookup goes through
//! the [`PolicyStore`] trait. Production deployments back it with their own
//! persistence; [`InMemoryPolicyStore`] serves embedding, bootstrap and
//! tests.

use crate::error::Result;
use crate::types::{AssignmentTargetType, Role, RoleAssignment};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read-only view of users, departments, groups, roles and assignments.
///
/// Implementations signal infrastructure problems with
/// [`AuthzError::LookupFailure`](crate::AuthzError::LookupFailure); the
/// resolver propagates those to the evaluator, which applies fail-safe deny.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Whether the user holds the permission directly (roles included)
    async fn has_permission(&self, user_id: &str, permission: &str) -> Result<bool>;

    /// Whether the user holds the role directly
    async fn has_role(&self, user_id: &str, role_code: &str) -> Result<bool>;

    /// Look up a role definition by id
    async fn find_role_by_id(&self, role_id: &str) -> Result<Option<Role>>;

    /// Currently-valid assignments of the given target type attached to any
    /// of the given target ids, in creation order
    async fn find_valid_assignments(
        &self,
        target_type: AssignmentTargetType,
        target_ids: &[String],
    ) -> Result<Vec<RoleAssignment>>;

    /// The user's direct department, if any
    async fn find_user_department_id(&self, user_id: &str) -> Result<Option<String>>;

    /// The department's materialized path: `/`-separated ancestor ids,
    /// root first
    async fn find_department_path(&self, department_id: &str) -> Result<Option<String>>;

    /// Ids of the virtual groups the user belongs to
    async fn find_virtual_group_ids(&self, user_id: &str) -> Result<Vec<String>>;

    /// Display name for an assignment target (department or group)
    async fn find_target_name(
        &self,
        target_type: AssignmentTargetType,
        target_id: &str,
    ) -> Result<Option<String>>;
}

/// In-memory policy store
///
/// Assignments are kept in insertion order so effective-role discovery
/// order is deterministic.
pub struct InMemoryPolicyStore {
    roles: Arc<RwLock<HashMap<String, Role>>>,
    assignments: Arc<RwLock<Vec<RoleAssignment>>>,
    user_departments: Arc<RwLock<HashMap<String, String>>>,
    department_paths: Arc<RwLock<HashMap<String, String>>>,
    group_memberships: Arc<RwLock<HashMap<String, Vec<String>>>>,
    target_names: Arc<RwLock<HashMap<(AssignmentTargetType, String), String>>>,
    user_permissions: Arc<RwLock<HashMap<String, HashSet<String>>>>,
    user_roles: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl InMemoryPolicyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            roles: Arc::new(RwLock::new(HashMap::new())),
            assignments: Arc::new(RwLock::new(Vec::new())),
            user_departments: Arc::new(RwLock::new(HashMap::new())),
            department_paths: Arc::new(RwLock::new(HashMap::new())),
            group_memberships: Arc::new(RwLock::new(HashMap::new())),
            target_names: Arc::new(RwLock::new(HashMap::new())),
            user_permissions: Arc::new(RwLock::new(HashMap::new())),
            user_roles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a role definition
    pub async fn add_role(&self, role: Role) {
        self.roles.write().await.insert(role.id.clone(), role);
    }

    /// Register a role assignment
    pub async fn add_assignment(&self, assignment: RoleAssignment) {
        self.assignments.write().await.push(assignment);
    }

    /// Attach a user to a department
    pub async fn set_user_department(&self, user_id: &str, department_id: &str) {
        self.user_departments
            .write()
            .await
            .insert(user_id.to_string(), department_id.to_string());
    }

    /// Record a department's materialized path
    pub async fn set_department_path(&self, department_id: &str, path: &str) {
        self.department_paths
            .write()
            .await
            .insert(department_id.to_string(), path.to_string());
    }

    /// Add a user to a virtual group
    pub async fn add_group_membership(&self, user_id: &str, group_id: &str) {
        self.group_memberships
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(group_id.to_string());
    }

    /// Record a display name for a department or group
    pub async fn set_target_name(
        &self,
        target_type: AssignmentTargetType,
        target_id: &str,
        name: &str,
    ) {
        self.target_names
            .write()
            .await
            .insert((target_type, target_id.to_string()), name.to_string());
    }

    /// Grant a permission directly to a user
    pub async fn grant_permission(&self, user_id: &str, permission: &str) {
        self.user_permissions
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .insert(permission.to_string());
    }

    /// Grant a role code directly to a user
    pub async fn grant_role(&self, user_id: &str, role_code: &str) {
        self.user_roles
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .insert(role_code.to_string());
    }
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn has_permission(&self, user_id: &str, permission: &str) -> Result<bool> {
        let permissions = self.user_permissions.read().await;
        Ok(permissions
            .get(user_id)
            .map(|set| set.contains(permission))
            .unwrap_or(false))
    }

    async fn has_role(&self, user_id: &str, role_code: &str) -> Result<bool> {
        let roles = self.user_roles.read().await;
        Ok(roles
            .get(user_id)
            .map(|set| set.contains(role_code))
            .unwrap_or(false))
    }

    async fn find_role_by_id(&self, role_id: &str) -> Result<Option<Role>> {
        let roles = self.roles.read().await;
        Ok(roles.get(role_id).cloned())
    }

    async fn find_valid_assignments(
        &self,
        target_type: AssignmentTargetType,
        target_ids: &[String],
    ) -> Result<Vec<RoleAssignment>> {
        let now = Utc::now();
        let assignments = self.assignments.read().await;
        Ok(assignments
            .iter()
            .filter(|a| {
                a.target_type == target_type
                    && target_ids.iter().any(|id| id == &a.target_id)
                    && a.is_valid_at(now)
            })
            .cloned()
            .collect())
    }

    async fn find_user_department_id(&self, user_id: &str) -> Result<Option<String>> {
        let departments = self.user_departments.read().await;
        Ok(departments.get(user_id).cloned())
    }

    async fn find_department_path(&self, department_id: &str) -> Result<Option<String>> {
        let paths = self.department_paths.read().await;
        Ok(paths.get(department_id).cloned())
    }

    async fn find_virtual_group_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let memberships = self.group_memberships.read().await;
        Ok(memberships.get(user_id).cloned().unwrap_or_default())
    }

    async fn find_target_name(
        &self,
        target_type: AssignmentTargetType,
        target_id: &str,
    ) -> Result<Option<String>> {
        let names = self.target_names.read().await;
        Ok(names.get(&(target_type, target_id.to_string())).cloned())
    }
}
