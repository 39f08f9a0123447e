use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// A live member of a consumer group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub member_id: String,
    /// Static instance id, stable across restarts of the consumer
    pub group_instance_id: Option<String>,
}

/// Membership of one group, persisted to the group's offsets log on every change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub group_id: String,
    /// Bumped on every membership change
    pub generation_id: i32,
    pub members: HashMap<String, GroupMember>,
    /// instance id -> member id currently holding it
    pub static_members: HashMap<String, String>,
    /// member id -> instance id it was fenced from
    pub fenced_members: HashMap<String, String>,
}

impl GroupMetadata {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            generation_id: 0,
            members: HashMap::new(),
            static_members: HashMap::new(),
            fenced_members: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(super) fn bump_generation(&mut self) {
        self.generation_id += 1;
    }

    /// Removes a member. A static member releases its instance, which also
    /// forgets the members fenced from it.
    pub(super) fn remove_member(
        &mut self,
        member_id: &str,
    ) -> Option<GroupMember> {
        let member = self.members.remove(member_id)?;
        if let Some(instance) = &member.group_instance_id {
            if self.static_members.get(instance).map(String::as_str) == Some(member_id) {
                self.static_members.remove(instance);
                self.fenced_members.retain(|_, fenced_from| fenced_from != instance);
            }
        }
        Some(member)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGroupResult {
    pub member_id: String,
    pub generation_id: i32,
    /// Previous holder of the static instance id, now fenced
    pub fenced_member_id: Option<String>,
}
