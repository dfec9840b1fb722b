//! Effective-role resolution
//!
//! Merges four assignment sources into one ordered effective-role list:
//!
//! 1. Roles assigned directly to the user
//! 2. Roles assigned to the user's department
//! 3. Roles assigned to any ancestor department via hierarchy assignments
//! 4. Roles assigned to virtual groups the user belongs to
//!
//! The first source that grants a role creates its entry; later sources
//! append to the entry's source list instead of duplicating the role.
//! Lookup failures propagate to the caller: fail-safe deny is applied by
//! the [`PermissionEvaluator`](crate::engine::PermissionEvaluator), not here.

use crate::error::Result;
use crate::store::PolicyStore;
use crate::types::{AssignmentTargetType, EffectiveRole, RoleAssignment, RoleSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Source name attached to USER-type assignments
const DIRECT_ASSIGNMENT: &str = "Direct Assignment";

/// Computes a user's effective roles from all assignment sources
pub struct RoleAssignmentResolver {
    store: Arc<dyn PolicyStore>,
}

impl RoleAssignmentResolver {
    /// Create a resolver over the given policy store
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Resolve the user's effective roles in discovery order.
    ///
    /// Assignments referencing missing or disabled roles are skipped
    /// silently. Any store failure propagates.
    pub async fn resolve_effective_roles(&self, user_id: &str) -> Result<Vec<EffectiveRole>> {
        debug!(user = %user_id, "resolving effective roles");

        let mut roles: Vec<EffectiveRole> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        // 1. Direct user assignments
        let user_assignments = self
            .store
            .find_valid_assignments(AssignmentTargetType::User, &[user_id.to_string()])
            .await?;
        for assignment in &user_assignments {
            self.merge_assignment(
                &mut roles,
                &mut index,
                assignment,
                AssignmentTargetType::User,
                user_id,
                Some(DIRECT_ASSIGNMENT),
            )
            .await?;
        }

        // 2-4. Department, then the department's ancestor chain
        if let Some(department_id) = self.store.find_user_department_id(user_id).await? {
            let department_assignments = self
                .store
                .find_valid_assignments(
                    AssignmentTargetType::Department,
                    std::slice::from_ref(&department_id),
                )
                .await?;
            for assignment in &department_assignments {
                self.merge_assignment(
                    &mut roles,
                    &mut index,
                    assignment,
                    AssignmentTargetType::Department,
                    &assignment.target_id,
                    None,
                )
                .await?;
            }

            let ancestors = self.ancestor_chain(&department_id).await?;
            let hierarchy_assignments = self
                .store
                .find_valid_assignments(AssignmentTargetType::DepartmentHierarchy, &ancestors)
                .await?;
            for assignment in &hierarchy_assignments {
                self.merge_assignment(
                    &mut roles,
                    &mut index,
                    assignment,
                    AssignmentTargetType::DepartmentHierarchy,
                    &assignment.target_id,
                    None,
                )
                .await?;
            }
        }

        // 5. Virtual group memberships
        let group_ids = self.store.find_virtual_group_ids(user_id).await?;
        if !group_ids.is_empty() {
            let group_assignments = self
                .store
                .find_valid_assignments(AssignmentTargetType::VirtualGroup, &group_ids)
                .await?;
            for assignment in &group_assignments {
                self.merge_assignment(
                    &mut roles,
                    &mut index,
                    assignment,
                    AssignmentTargetType::VirtualGroup,
                    &assignment.target_id,
                    None,
                )
                .await?;
            }
        }

        debug!(user = %user_id, count = roles.len(), "resolved effective roles");
        Ok(roles)
    }

    /// Distinct effective role codes in discovery order
    pub async fn effective_role_codes(&self, user_id: &str) -> Result<Vec<String>> {
        let roles = self.resolve_effective_roles(user_id).await?;
        let mut codes: Vec<String> = Vec::with_capacity(roles.len());
        for role in roles {
            if !codes.contains(&role.role_code) {
                codes.push(role.role_code);
            }
        }
        Ok(codes)
    }

    /// The department's ancestor ids, root first, direct department last.
    ///
    /// The materialized path is a `/`-separated sequence of ancestor
    /// department ids; each non-empty segment is one ancestor.
    async fn ancestor_chain(&self, department_id: &str) -> Result<Vec<String>> {
        let mut chain: Vec<String> = Vec::new();

        if let Some(path) = self.store.find_department_path(department_id).await? {
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                if !chain.iter().any(|id| id == segment) {
                    chain.push(segment.to_string());
                }
            }
        }
        if !chain.iter().any(|id| id == department_id) {
            chain.push(department_id.to_string());
        }

        Ok(chain)
    }

    /// Add the assignment's role to the result, or append a source to an
    /// existing entry
    async fn merge_assignment(
        &self,
        roles: &mut Vec<EffectiveRole>,
        index: &mut HashMap<String, usize>,
        assignment: &RoleAssignment,
        source_type: AssignmentTargetType,
        source_id: &str,
        source_name: Option<&str>,
    ) -> Result<()> {
        let Some(role) = self.store.find_role_by_id(&assignment.role_id).await? else {
            debug!(role = %assignment.role_id, "skipping assignment for unknown role");
            return Ok(());
        };
        if !role.is_active() {
            debug!(role = %assignment.role_id, "skipping assignment for inactive role");
            return Ok(());
        }

        let source_name = match source_name {
            Some(name) => name.to_string(),
            None => self
                .store
                .find_target_name(source_type, source_id)
                .await?
                .unwrap_or_else(|| source_id.to_string()),
        };

        let source = RoleSource {
            source_type,
            source_id: source_id.to_string(),
            source_name,
            assignment_id: assignment.id.clone(),
        };

        if let Some(&position) = index.get(&role.id) {
            roles[position].sources.push(source);
        } else {
            index.insert(role.id.clone(), roles.len());
            roles.push(EffectiveRole {
                role_id: role.id,
                role_code: role.code,
                role_name: role.name,
                sources: vec![source],
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryPolicyStore;
    use crate::types::Role;

    async fn store_with_role(role_id: &str, code: &str) -> InMemoryPolicyStore {
        let store = InMemoryPolicyStore::new();
        store.add_role(Role::active(role_id, code, code)).await;
        store
    }

    #[tokio::test]
    async fn test_direct_assignment_resolves() {
        let store = store_with_role("r-1", "DEVELOPER").await;
        store
            .add_assignment(RoleAssignment::new(
                "a-1",
                "r-1",
                AssignmentTargetType::User,
                "u-1",
            ))
            .await;

        let resolver = RoleAssignmentResolver::new(Arc::new(store));
        let roles = resolver.resolve_effective_roles("u-1").await.unwrap();

        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].role_code, "DEVELOPER");
        assert_eq!(roles[0].sources.len(), 1);
        assert_eq!(roles[0].sources[0].source_type, AssignmentTargetType::User);
        assert_eq!(roles[0].sources[0].source_name, "Direct Assignment");
        assert_eq!(roles[0].sources[0].assignment_id, "a-1");
    }

    #[tokio::test]
    async fn test_duplicate_role_accumulates_sources() {
        let store = store_with_role("r-1", "DEVELOPER").await;
        store
            .add_assignment(RoleAssignment::new(
                "a-1",
                "r-1",
                AssignmentTargetType::User,
                "u-1",
            ))
            .await;
        store.set_user_department("u-1", "d-1").await;
        store
            .add_assignment(RoleAssignment::new(
                "a-2",
                "r-1",
                AssignmentTargetType::Department,
                "d-1",
            ))
            .await;

        let resolver = RoleAssignmentResolver::new(Arc::new(store));
        let roles = resolver.resolve_effective_roles("u-1").await.unwrap();

        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].sources.len(), 2);
        assert_eq!(roles[0].sources[0].source_type, AssignmentTargetType::User);
        assert_eq!(
            roles[0].sources[1].source_type,
            AssignmentTargetType::Department
        );
    }

    #[tokio::test]
    async fn test_inactive_and_missing_roles_skipped() {
        let store = InMemoryPolicyStore::new();
        store
            .add_role(Role {
                id: "r-1".to_string(),
                code: "OLD".to_string(),
                name: "Old".to_string(),
                status: crate::types::RoleStatus::Disabled,
            })
            .await;
        store
            .add_assignment(RoleAssignment::new(
                "a-1",
                "r-1",
                AssignmentTargetType::User,
                "u-1",
            ))
            .await;
        store
            .add_assignment(RoleAssignment::new(
                "a-2",
                "r-missing",
                AssignmentTargetType::User,
                "u-1",
            ))
            .await;

        let resolver = RoleAssignmentResolver::new(Arc::new(store));
        let roles = resolver.resolve_effective_roles("u-1").await.unwrap();
        assert!(roles.is_empty());
    }

    #[tokio::test]
    async fn test_ancestor_chain_from_path() {
        let store = InMemoryPolicyStore::new();
        store.set_department_path("d-3", "d-1/d-2").await;

        let resolver = RoleAssignmentResolver::new(Arc::new(store));
        let chain = resolver.ancestor_chain("d-3").await.unwrap();
        assert_eq!(chain, vec!["d-1", "d-2", "d-3"]);
    }

    #[tokio::test]
    async fn test_ancestor_chain_without_path() {
        let store = InMemoryPolicyStore::new();
        let resolver = RoleAssignmentResolver::new(Arc::new(store));
        let chain = resolver.ancestor_chain("d-1").await.unwrap();
        assert_eq!(chain, vec!["d-1"]);
    }

    #[tokio::test]
    async fn test_role_codes_distinct_in_order() {
        let store = store_with_role("r-1", "DEVELOPER").await;
        store.add_role(Role::active("r-2", "REVIEWER", "Reviewer")).await;
        store
            .add_assignment(RoleAssignment::new(
                "a-1",
                "r-1",
                AssignmentTargetType::User,
                "u-1",
            ))
            .await;
        store
            .add_assignment(RoleAssignment::new(
                "a-2",
                "r-2",
                AssignmentTargetType::User,
                "u-1",
            ))
            .await;

        let resolver = RoleAssignmentResolver::new(Arc::new(store));
        let codes = resolver.effective_role_codes("u-1").await.unwrap();
        assert_eq!(codes, vec!["DEVELOPER", "REVIEWER"]);
    }
}
