use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use tracing::info;

use crate::GroupError;
use crate::GroupMember;
use crate::GroupMetadata;
use crate::JoinGroupResult;
use crate::NodeId;
use crate::OffsetCommitManager;
use crate::Result;
use crate::FENCED_REQUESTS_TOTAL;
use crate::NO_GENERATION;

/// Consumer group membership and fencing.
///
/// A group is coordinated by the leader of its consumer offsets partition.
/// Every membership change is appended to that log before it is acknowledged,
/// so validation on any node reads the same members and generation. Session
/// liveness is tracked in memory by the coordinating node only.
pub struct ConsumerGroupCoordinator {
    node_id: NodeId,
    session_timeout_ms: u64,
    offsets: Arc<OffsetCommitManager>,
    /// (group id, member id) -> last heartbeat seen by this node
    heartbeats: DashMap<(String, String), u64>,
}

impl ConsumerGroupCoordinator {
    pub fn new(
        node_id: NodeId,
        session_timeout_ms: u64,
        offsets: Arc<OffsetCommitManager>,
    ) -> Self {
        Self {
            node_id,
            session_timeout_ms,
            offsets,
            heartbeats: DashMap::new(),
        }
    }

    fn touch(
        &self,
        group_id: &str,
        member_id: &str,
        now_ms: u64,
    ) {
        self.heartbeats.insert((group_id.to_string(), member_id.to_string()), now_ms);
    }

    fn forget(
        &self,
        group_id: &str,
        member_id: &str,
    ) {
        self.heartbeats.remove(&(group_id.to_string(), member_id.to_string()));
    }

    /// Adds a member, or refreshes a known one.
    ///
    /// A new member gets a generated id and bumps the generation. Joining with a
    /// static instance id already held by another member hands the instance to
    /// the new member and fences the old one.
    pub async fn join_group(
        &self,
        group_id: &str,
        member_id: Option<&str>,
        group_instance_id: Option<&str>,
        now_ms: u64,
    ) -> Result<JoinGroupResult> {
        if group_id.is_empty() {
            return Err(GroupError::InvalidGroupId.into());
        }

        if let Some(member_id) = member_id.filter(|m| !m.is_empty()) {
            let generation_id = self
                .offsets
                .update_group(group_id, self.node_id, |g| {
                    if let Some(instance) = g.fenced_members.get(member_id) {
                        return Err(fenced(group_id, instance, member_id));
                    }
                    if !g.members.contains_key(member_id) {
                        return Err(unknown(group_id, member_id));
                    }
                    Ok(g.generation_id)
                })
                .await?;
            self.touch(group_id, member_id, now_ms);
            return Ok(JoinGroupResult {
                member_id: member_id.to_string(),
                generation_id,
                fenced_member_id: None,
            });
        }

        let prefix = group_instance_id.unwrap_or("consumer");
        let new_member_id = format!("{}-{}", prefix, nanoid::nanoid!());
        let (generation_id, fenced_member_id) = self
            .offsets
            .update_group(group_id, self.node_id, |g| {
                g.members.insert(
                    new_member_id.clone(),
                    GroupMember {
                        member_id: new_member_id.clone(),
                        group_instance_id: group_instance_id.map(str::to_string),
                    },
                );
                let fenced_member_id = match group_instance_id {
                    Some(instance) => claim(g, instance, &new_member_id),
                    None => None,
                };
                if fenced_member_id.is_none() {
                    g.bump_generation();
                }
                Ok((g.generation_id, fenced_member_id))
            })
            .await?;
        self.touch(group_id, &new_member_id, now_ms);
        if let Some(previous) = &fenced_member_id {
            self.forget(group_id, previous);
        }

        info!(
            group_id,
            member_id = %new_member_id,
            generation = generation_id,
            fenced = ?fenced_member_id,
            "member joined"
        );
        Ok(JoinGroupResult {
            member_id: new_member_id,
            generation_id,
            fenced_member_id,
        })
    }

    /// Hands `instance_id` to `new_member_id`, fencing its previous holder
    pub async fn claim_static_instance(
        &self,
        group_id: &str,
        instance_id: &str,
        new_member_id: &str,
    ) -> Result<Option<String>> {
        let previous = self
            .offsets
            .update_group(group_id, self.node_id, |g| Ok(claim(g, instance_id, new_member_id)))
            .await?;
        if let Some(previous) = &previous {
            self.forget(group_id, previous);
        }
        Ok(previous)
    }

    pub async fn leave_group(
        &self,
        group_id: &str,
        member_id: &str,
    ) -> Result<()> {
        let generation_id = self
            .offsets
            .update_group(group_id, self.node_id, |g| {
                if let Some(instance) = g.fenced_members.get(member_id) {
                    return Err(fenced(group_id, instance, member_id));
                }
                g.remove_member(member_id).ok_or_else(|| unknown(group_id, member_id))?;
                g.bump_generation();
                Ok(g.generation_id)
            })
            .await?;
        self.forget(group_id, member_id);
        info!(group_id, member_id, generation = generation_id, "member left");
        Ok(())
    }

    /// Refreshes a member's session. Only the group's coordinator accepts heartbeats.
    pub async fn heartbeat(
        &self,
        group_id: &str,
        member_id: &str,
        generation_id: i32,
        now_ms: u64,
    ) -> Result<()> {
        self.offsets
            .update_group(group_id, self.node_id, |g| {
                validate(g, member_id, generation_id, None)
            })
            .await?;
        self.touch(group_id, member_id, now_ms);
        Ok(())
    }

    /// Evicts members of the groups this node coordinates whose session timed
    /// out. Every eviction bumps the generation.
    ///
    /// A member not yet seen by this node, such as after a coordinator change,
    /// starts its session now.
    pub async fn expire_members(
        &self,
        now_ms: u64,
    ) -> Result<Vec<(String, String)>> {
        let mut evicted = Vec::new();
        for group in self.offsets.led_groups(self.node_id).await? {
            let expired: Vec<String> = group
                .members
                .keys()
                .filter(|member_id| {
                    let seen = *self
                        .heartbeats
                        .entry((group.group_id.clone(), (*member_id).clone()))
                        .or_insert(now_ms);
                    now_ms.saturating_sub(seen) > self.session_timeout_ms
                })
                .cloned()
                .collect();
            if expired.is_empty() {
                continue;
            }

            let generation_id = self
                .offsets
                .update_group(&group.group_id, self.node_id, |g| {
                    for member_id in &expired {
                        if g.remove_member(member_id).is_some() {
                            g.bump_generation();
                        }
                    }
                    Ok(g.generation_id)
                })
                .await?;
            for member_id in expired {
                self.forget(&group.group_id, &member_id);
                info!(
                    group_id = %group.group_id,
                    member_id = %member_id,
                    generation = generation_id,
                    "member session expired"
                );
                evicted.push((group.group_id.clone(), member_id));
            }
        }
        Ok(evicted)
    }

    /// Checks that a member may commit offsets for the group.
    ///
    /// Fencing is checked before membership, and membership before the
    /// generation. An empty member id with generation -1 is a commit from
    /// outside group management and always passes. Any node may validate, as
    /// membership is read from the group's offsets log.
    pub async fn validate_member(
        &self,
        group_id: &str,
        member_id: &str,
        generation_id: i32,
        group_instance_id: Option<&str>,
    ) -> Result<()> {
        if group_id.is_empty() {
            return Err(GroupError::InvalidGroupId.into());
        }
        if member_id.is_empty() && generation_id == NO_GENERATION {
            return Ok(());
        }
        let g = self
            .offsets
            .load_group(group_id)
            .await?
            .ok_or_else(|| unknown(group_id, member_id))?;
        validate(&g, member_id, generation_id, group_instance_id)
    }

    /// Snapshot of a group's membership
    pub async fn describe_group(
        &self,
        group_id: &str,
    ) -> Result<Option<GroupMetadata>> {
        self.offsets.load_group(group_id).await
    }
}

fn claim(
    g: &mut GroupMetadata,
    instance_id: &str,
    new_member_id: &str,
) -> Option<String> {
    let previous = g.static_members.insert(instance_id.to_string(), new_member_id.to_string())?;
    if previous == new_member_id {
        return None;
    }
    g.members.remove(&previous);
    g.fenced_members.insert(previous.clone(), instance_id.to_string());
    info!(
        group_id = %g.group_id,
        instance_id,
        fenced = %previous,
        "static instance re-claimed"
    );
    Some(previous)
}

fn validate(
    g: &GroupMetadata,
    member_id: &str,
    generation_id: i32,
    group_instance_id: Option<&str>,
) -> Result<()> {
    if let Some(instance) = g.fenced_members.get(member_id) {
        return Err(fenced(&g.group_id, instance, member_id));
    }
    if let Some(instance) = group_instance_id {
        if let Some(holder) = g.static_members.get(instance) {
            if holder != member_id {
                return Err(fenced(&g.group_id, instance, member_id));
            }
        }
    }
    if !g.members.contains_key(member_id) {
        debug!(group_id = %g.group_id, member_id, "unknown member");
        return Err(unknown(&g.group_id, member_id));
    }
    if generation_id != g.generation_id {
        return Err(GroupError::IllegalGeneration {
            group_id: g.group_id.clone(),
            current: g.generation_id,
            received: generation_id,
        }
        .into());
    }
    Ok(())
}

fn unknown(
    group_id: &str,
    member_id: &str,
) -> crate::Error {
    FENCED_REQUESTS_TOTAL.with_label_values(&["unknown_member"]).inc();
    GroupError::UnknownMemberId {
        group_id: group_id.to_string(),
        member_id: member_id.to_string(),
    }
    .into()
}

fn fenced(
    group_id: &str,
    instance: &str,
    member_id: &str,
) -> crate::Error {
    FENCED_REQUESTS_TOTAL.with_label_values(&["static_instance"]).inc();
    GroupError::FencedInstanceId {
        group_id: group_id.to_string(),
        group_instance_id: instance.to_string(),
        member_id: member_id.to_string(),
    }
    .into()
}
