use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::errors::StoreError;

/// Group membership storage: group id -> set of connection ids.
///
/// Groups are created implicitly by the first add. Adding a present member or
/// removing an absent one is a no-op.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn add_to_group(&self, conn_id: &str, group_id: &str) -> Result<(), StoreError>;
    async fn remove_from_group(&self, conn_id: &str, group_id: &str) -> Result<(), StoreError>;
    /// Current members. Unknown groups have no members.
    async fn group_members(&self, group_id: &str) -> Result<Vec<String>, StoreError>;
    /// Drop the whole group.
    async fn delete_group(&self, group_id: &str) -> Result<(), StoreError>;
}

/// A membership mutation, shared by every backend so they agree on no-ops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipChange {
    Add,
    Remove,
}

impl MembershipChange {
    /// Apply in place. Returns `false` when the member list is unchanged.
    pub fn apply(self, members: &mut Vec<String>, conn_id: &str) -> bool {
        let position = members.iter().position(|m| m == conn_id);
        match (self, position) {
            (Self::Add, None) => {
                members.push(conn_id.to_string());
                true
            }
            (Self::Remove, Some(i)) => {
                members.remove(i);
                true
            }
            _ => false,
        }
    }
}

/// Single-process group store.
#[derive(Default)]
pub struct InMemoryGroups {
    groups: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty groups.
    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}

#[async_trait]
impl GroupStore for InMemoryGroups {
    async fn add_to_group(&self, conn_id: &str, group_id: &str) -> Result<(), StoreError> {
        let mut groups = self.groups.write();
        let members = groups.entry(group_id.to_string()).or_default();
        MembershipChange::Add.apply(members, conn_id);
        Ok(())
    }

    async fn remove_from_group(&self, conn_id: &str, group_id: &str) -> Result<(), StoreError> {
        let mut groups = self.groups.write();
        if let Some(members) = groups.get_mut(group_id) {
            if MembershipChange::Remove.apply(members, conn_id) && members.is_empty() {
                groups.remove(group_id);
            }
        }
        Ok(())
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.groups.read().get(group_id).cloned().unwrap_or_default())
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), StoreError> {
        self.groups.write().remove(group_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn change_add_is_idempotent() {
        let mut members = vec![];
        assert!(MembershipChange::Add.apply(&mut members, "a"));
        assert!(!MembershipChange::Add.apply(&mut members, "a"));
        assert_eq!(members, vec!["a".to_string()]);
    }

    #[test]
    fn change_remove_absent_is_noop() {
        let mut members = vec!["a".to_string()];
        assert!(!MembershipChange::Remove.apply(&mut members, "b"));
        assert!(MembershipChange::Remove.apply(&mut members, "a"));
        assert!(members.is_empty());
    }

    #[tokio::test]
    async fn add_twice_equals_add_once() {
        let store = InMemoryGroups::new();
        store.add_to_group("a", "g1").await.unwrap();
        let once = store.group_members("g1").await.unwrap();
        store.add_to_group("a", "g1").await.unwrap();
        let twice = store.group_members("g1").await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn remove_absent_member_is_noop() {
        let store = InMemoryGroups::new();
        store.add_to_group("a", "g1").await.unwrap();
        store.remove_from_group("b", "g1").await.unwrap();
        store.remove_from_group("a", "missing").await.unwrap();
        assert_eq!(store.group_members("g1").await.unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn unknown_group_has_no_members() {
        let store = InMemoryGroups::new();
        assert!(store.group_members("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn groups_are_independent() {
        let store = InMemoryGroups::new();
        store.add_to_group("a", "g1").await.unwrap();
        store.add_to_group("b", "g2").await.unwrap();
        store.add_to_group("c", "g1").await.unwrap();
        assert_eq!(store.group_members("g1").await.unwrap(), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(store.group_members("g2").await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn last_member_leaving_drops_group() {
        let store = InMemoryGroups::new();
        store.add_to_group("a", "g1").await.unwrap();
        assert_eq!(store.len(), 1);
        store.remove_from_group("a", "g1").await.unwrap();
        assert!(store.is_empty());
        assert!(store.group_members("g1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_group_wipes_members() {
        let store = InMemoryGroups::new();
        store.add_to_group("a", "g1").await.unwrap();
        store.add_to_group("b", "g1").await.unwrap();
        store.delete_group("g1").await.unwrap();
        assert!(store.group_members("g1").await.unwrap().is_empty());
        // Re-created implicitly on the next join.
        store.add_to_group("c", "g1").await.unwrap();
        assert_eq!(store.group_members("g1").await.unwrap(), vec!["c".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_all_land() {
        let store = Arc::new(InMemoryGroups::new());
        let mut handles = vec![];
        for i in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.add_to_group(&format!("conn-{i}"), "g1").await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.group_members("g1").await.unwrap().len(), 50);
    }
}
