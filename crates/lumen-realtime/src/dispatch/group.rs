//! Group membership lookup used by group selectors.

use std::collections::HashMap;

use async_trait::async_trait;

use lumen_core::result::AppResult;
use lumen_core::types::SubjectId;

/// Resolves a group to its member subjects.
///
/// Membership lives outside this layer (usually the persistence service),
/// so the dispatcher only depends on this trait.
#[async_trait]
pub trait GroupDirectory: Send + Sync + std::fmt::Debug + 'static {
    /// Members of a group. An unknown group is a `NotFound` error.
    async fn members(&self, group_id: i64) -> AppResult<Vec<SubjectId>>;
}

/// Fixed group table.
#[derive(Debug, Clone, Default)]
pub struct StaticGroups {
    groups: HashMap<i64, Vec<SubjectId>>,
}

impl StaticGroups {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a group.
    pub fn with_group(mut self, group_id: i64, members: impl IntoIterator<Item = SubjectId>) -> Self {
        self.groups.insert(group_id, members.into_iter().collect());
        self
    }
}

#[async_trait]
impl GroupDirectory for StaticGroups {
    async fn members(&self, group_id: i64) -> AppResult<Vec<SubjectId>> {
        self.groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| lumen_core::AppError::not_found(format!("Group {group_id} not found")))
    }
}
