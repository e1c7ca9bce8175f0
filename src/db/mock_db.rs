use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{
    channel_repository::ChannelRepository, post_repository::PostRepository,
    user_repository::UserRepository, workspace_repository::WorkspaceRepository,
};
use crate::models::{
    channel::{Channel, NewChannel},
    post::{NewPost, Page, Post, PostChanges, PostChannelRow, PostFilter, PostStatus},
    user::User,
    workspace::{
        MemberRow, Membership, NewWorkspace, Workspace, WorkspaceMembershipSummary,
        WorkspaceRole, WorkspaceUpdate,
    },
};

/// In-memory stand-in for every repository, mirroring the Postgres constraints.
#[derive(Default)]
pub struct InMemoryDb {
    pub users: Mutex<Vec<User>>,
    pub workspaces: Mutex<Vec<Workspace>>,
    pub memberships: Mutex<Vec<Membership>>,
    pub channels: Mutex<Vec<Channel>>,
    pub posts: Mutex<Vec<Post>>,
    /// (post_id, channel_id, linked_at)
    pub post_channels: Mutex<Vec<(Uuid, Uuid, OffsetDateTime)>>,
    pub should_fail: AtomicBool,
    /// Next membership insert behaves as if a concurrent request won the slot.
    pub lose_next_invite_race: AtomicBool,
    /// Next `create_workspace_with_creator` fails while everything else works.
    pub fail_next_workspace_create: AtomicBool,
}

fn fail() -> sqlx::Error {
    sqlx::Error::Protocol("Mock DB failure".into())
}

impl InMemoryDb {
    fn check(&self) -> Result<(), sqlx::Error> {
        if self.should_fail.load(Ordering::SeqCst) {
            Err(fail())
        } else {
            Ok(())
        }
    }

    pub fn add_user(&self, email: &str, username: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash: String::new(),
            is_verified: true,
            created_at: OffsetDateTime::now_utc(),
        };
        self.users.lock().unwrap().push(user.clone());
        user
    }

    pub fn membership(&self, membership_id: Uuid) -> Option<Membership> {
        self.memberships
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == membership_id)
            .cloned()
    }

    pub fn memberships_in(&self, workspace_id: Uuid) -> Vec<Membership> {
        self.memberships
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    /// Moves a membership's invite timestamps into the past.
    pub fn age_membership(&self, membership_id: Uuid, by: time::Duration) {
        let mut memberships = self.memberships.lock().unwrap();
        if let Some(m) = memberships.iter_mut().find(|m| m.id == membership_id) {
            m.created_at -= by;
            m.updated_at -= by;
        }
    }

    pub fn post_row(&self, post_id: Uuid) -> Option<Post> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == post_id)
            .cloned()
    }

    pub fn linked_channels(&self, post_id: Uuid) -> Vec<Uuid> {
        self.post_channels
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _, _)| *p == post_id)
            .map(|(_, c, _)| *c)
            .collect()
    }

    pub fn channel_row(&self, channel_id: Uuid) -> Option<Channel> {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == channel_id)
            .cloned()
    }

    fn link_channels(&self, post_id: Uuid, channel_ids: &[Uuid]) {
        let mut links = self.post_channels.lock().unwrap();
        for channel_id in channel_ids {
            if !links
                .iter()
                .any(|(p, c, _)| *p == post_id && c == channel_id)
            {
                links.push((post_id, *channel_id, OffsetDateTime::now_utc()));
            }
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryDb {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned())
    }

    async fn is_email_taken(&self, email: &str) -> Result<bool, sqlx::Error> {
        self.check()?;
        Ok(self.users.lock().unwrap().iter().any(|u| u.email == email))
    }

    async fn is_username_taken(&self, username: &str) -> Result<bool, sqlx::Error> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .any(|u| u.username == username))
    }

    async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        self.check()?;
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.email == email || u.username == username)
        {
            return Err(sqlx::Error::Protocol("duplicate user".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            is_verified: false,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        self.check()?;
        self.users.lock().unwrap().retain(|u| u.id != user_id);
        Ok(())
    }
}

#[async_trait]
impl WorkspaceRepository for InMemoryDb {
    async fn create_workspace_with_creator(
        &self,
        workspace: &NewWorkspace,
        creator_id: Uuid,
        creator_email: &str,
    ) -> Result<(Workspace, Membership), sqlx::Error> {
        self.check()?;
        if self.fail_next_workspace_create.swap(false, Ordering::SeqCst) {
            return Err(fail());
        }
        let now = OffsetDateTime::now_utc();
        let created = Workspace {
            id: Uuid::new_v4(),
            name: workspace.name.clone(),
            time_zone: workspace.time_zone.clone(),
            time_zone_offset: workspace.time_zone_offset.clone(),
            start_day: workspace.start_day.clone(),
            created_at: now,
            updated_at: now,
        };
        let membership = Membership {
            id: Uuid::new_v4(),
            workspace_id: created.id,
            user_id: Some(creator_id),
            email: creator_email.to_string(),
            role: WorkspaceRole::Creator,
            is_confirmed: true,
            created_at: now,
            updated_at: now,
        };
        self.workspaces.lock().unwrap().push(created.clone());
        self.memberships.lock().unwrap().push(membership.clone());
        Ok((created, membership))
    }

    async fn find_workspace(&self, workspace_id: Uuid) -> Result<Option<Workspace>, sqlx::Error> {
        self.check()?;
        Ok(self
            .workspaces
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.id == workspace_id)
            .cloned())
    }

    async fn update_workspace(
        &self,
        workspace_id: Uuid,
        update: &WorkspaceUpdate,
    ) -> Result<Option<Workspace>, sqlx::Error> {
        self.check()?;
        let mut workspaces = self.workspaces.lock().unwrap();
        let Some(workspace) = workspaces.iter_mut().find(|w| w.id == workspace_id) else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            workspace.name = name.clone();
        }
        if let Some(time_zone) = &update.time_zone {
            workspace.time_zone = time_zone.clone();
        }
        if let Some(offset) = &update.time_zone_offset {
            workspace.time_zone_offset = offset.clone();
        }
        if let Some(start_day) = &update.start_day {
            workspace.start_day = start_day.clone();
        }
        workspace.updated_at = OffsetDateTime::now_utc();
        Ok(Some(workspace.clone()))
    }

    async fn find_membership(
        &self,
        membership_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        self.check()?;
        Ok(self.membership(membership_id))
    }

    async fn find_membership_by_email(
        &self,
        workspace_id: Uuid,
        email: &str,
    ) -> Result<Option<Membership>, sqlx::Error> {
        self.check()?;
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.workspace_id == workspace_id && m.email == email)
            .cloned())
    }

    async fn find_membership_for_user(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        self.check()?;
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.workspace_id == workspace_id && m.user_id == Some(user_id))
            .cloned())
    }

    async fn insert_membership_if_absent(
        &self,
        workspace_id: Uuid,
        user_id: Option<Uuid>,
        email: &str,
        role: WorkspaceRole,
    ) -> Result<Option<Membership>, sqlx::Error> {
        self.check()?;
        let now = OffsetDateTime::now_utc();
        let row = Membership {
            id: Uuid::new_v4(),
            workspace_id,
            user_id,
            email: email.to_string(),
            role,
            is_confirmed: false,
            created_at: now,
            updated_at: now,
        };
        let mut memberships = self.memberships.lock().unwrap();
        if self.lose_next_invite_race.swap(false, Ordering::SeqCst) {
            memberships.push(row);
            return Ok(None);
        }
        let taken = memberships.iter().any(|m| {
            m.workspace_id == workspace_id
                && (m.email == email || (user_id.is_some() && m.user_id == user_id))
        });
        if taken {
            return Ok(None);
        }
        memberships.push(row.clone());
        Ok(Some(row))
    }

    async fn touch_membership(
        &self,
        membership_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        self.check()?;
        let mut memberships = self.memberships.lock().unwrap();
        let Some(m) = memberships
            .iter_mut()
            .find(|m| m.id == membership_id && !m.is_confirmed)
        else {
            return Ok(None);
        };
        m.updated_at = OffsetDateTime::now_utc();
        Ok(Some(m.clone()))
    }

    async fn confirm_membership(
        &self,
        membership_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        self.check()?;
        let mut memberships = self.memberships.lock().unwrap();
        let Some(m) = memberships
            .iter_mut()
            .find(|m| m.id == membership_id && !m.is_confirmed)
        else {
            return Ok(None);
        };
        m.is_confirmed = true;
        m.user_id = Some(user_id);
        m.updated_at = OffsetDateTime::now_utc();
        Ok(Some(m.clone()))
    }

    async fn update_membership(
        &self,
        membership_id: Uuid,
        role: WorkspaceRole,
        is_confirmed: bool,
    ) -> Result<Option<Membership>, sqlx::Error> {
        self.check()?;
        let mut memberships = self.memberships.lock().unwrap();
        let Some(m) = memberships
            .iter_mut()
            .find(|m| m.id == membership_id && m.role != WorkspaceRole::Creator)
        else {
            return Ok(None);
        };
        m.role = role;
        m.is_confirmed = is_confirmed;
        Ok(Some(m.clone()))
    }

    async fn delete_membership(&self, membership_id: Uuid) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut memberships = self.memberships.lock().unwrap();
        let before = memberships.len();
        memberships.retain(|m| !(m.id == membership_id && m.role != WorkspaceRole::Creator));
        Ok(memberships.len() < before)
    }

    async fn list_confirmed_members(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<MemberRow>, sqlx::Error> {
        self.check()?;
        let users = self.users.lock().unwrap();
        let mut rows: Vec<Membership> = self
            .memberships
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.workspace_id == workspace_id && m.is_confirmed)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.role != WorkspaceRole::Creator, m.updated_at));
        Ok(rows
            .into_iter()
            .map(|m| MemberRow {
                membership_id: m.id,
                workspace_id: m.workspace_id,
                user_id: m.user_id,
                username: m
                    .user_id
                    .and_then(|id| users.iter().find(|u| u.id == id))
                    .map(|u| u.username.clone()),
                email: m.email,
                role: m.role,
                is_confirmed: m.is_confirmed,
            })
            .collect())
    }

    async fn list_user_workspaces(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkspaceMembershipSummary>, sqlx::Error> {
        self.check()?;
        let workspaces = self.workspaces.lock().unwrap();
        let mut rows: Vec<Membership> = self
            .memberships
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.user_id == Some(user_id) && m.is_confirmed)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.role != WorkspaceRole::Creator, m.updated_at));
        Ok(rows
            .into_iter()
            .filter_map(|m| {
                workspaces
                    .iter()
                    .find(|w| w.id == m.workspace_id)
                    .map(|w| WorkspaceMembershipSummary {
                        id: w.id,
                        name: w.name.clone(),
                        time_zone: w.time_zone.clone(),
                        time_zone_offset: w.time_zone_offset.clone(),
                        start_day: w.start_day.clone(),
                        role: m.role,
                        membership_id: m.id,
                        created_at: w.created_at,
                        membership_updated_at: m.updated_at,
                    })
            })
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[async_trait]
impl ChannelRepository for InMemoryDb {
    async fn list_channels(&self, workspace_id: Uuid) -> Result<Vec<Channel>, sqlx::Error> {
        self.check()?;
        Ok(self
            .channels
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn find_channel(
        &self,
        workspace_id: Uuid,
        channel_id: Uuid,
    ) -> Result<Option<Channel>, sqlx::Error> {
        self.check()?;
        Ok(self
            .channel_row(channel_id)
            .filter(|c| c.workspace_id == workspace_id))
    }

    async fn find_channels_by_ids(
        &self,
        workspace_id: Uuid,
        channel_ids: &[Uuid],
    ) -> Result<Vec<Channel>, sqlx::Error> {
        self.check()?;
        Ok(self
            .channels
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.workspace_id == workspace_id && channel_ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn insert_channel(&self, channel: &NewChannel) -> Result<Option<Channel>, sqlx::Error> {
        self.check()?;
        let mut channels = self.channels.lock().unwrap();
        if channels
            .iter()
            .any(|c| c.workspace_id == channel.workspace_id && c.name == channel.name)
        {
            return Ok(None);
        }
        let now = OffsetDateTime::now_utc();
        let created = Channel {
            id: Uuid::new_v4(),
            workspace_id: channel.workspace_id,
            user_id: channel.user_id,
            name: channel.name.clone(),
            platform: channel.platform,
            auth_token: channel.auth_token.clone(),
            is_valid: true,
            created_at: now,
            updated_at: now,
        };
        channels.push(created.clone());
        Ok(Some(created))
    }

    async fn delete_channel(
        &self,
        workspace_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut channels = self.channels.lock().unwrap();
        let before = channels.len();
        channels.retain(|c| !(c.id == channel_id && c.workspace_id == workspace_id));
        let removed = channels.len() < before;
        if removed {
            self.post_channels
                .lock()
                .unwrap()
                .retain(|(_, c, _)| *c != channel_id);
        }
        Ok(removed)
    }

    async fn set_auth_token(
        &self,
        workspace_id: Uuid,
        channel_id: Uuid,
        encrypted_token: Option<&str>,
        is_valid: bool,
    ) -> Result<Option<Channel>, sqlx::Error> {
        self.check()?;
        let mut channels = self.channels.lock().unwrap();
        let Some(c) = channels
            .iter_mut()
            .find(|c| c.id == channel_id && c.workspace_id == workspace_id)
        else {
            return Ok(None);
        };
        c.auth_token = encrypted_token.map(str::to_string);
        c.is_valid = is_valid;
        c.updated_at = OffsetDateTime::now_utc();
        Ok(Some(c.clone()))
    }

    async fn set_validity(
        &self,
        workspace_id: Uuid,
        channel_id: Uuid,
        is_valid: bool,
    ) -> Result<Option<Channel>, sqlx::Error> {
        self.check()?;
        let mut channels = self.channels.lock().unwrap();
        let Some(c) = channels
            .iter_mut()
            .find(|c| c.id == channel_id && c.workspace_id == workspace_id)
        else {
            return Ok(None);
        };
        c.is_valid = is_valid;
        c.updated_at = OffsetDateTime::now_utc();
        Ok(Some(c.clone()))
    }
}

#[async_trait]
impl PostRepository for InMemoryDb {
    async fn create_post(
        &self,
        post: &NewPost,
        channel_ids: &[Uuid],
    ) -> Result<Post, sqlx::Error> {
        self.check()?;
        let now = OffsetDateTime::now_utc();
        let created = Post {
            id: Uuid::new_v4(),
            workspace_id: post.workspace_id,
            user_id: post.user_id,
            content: post.content.clone(),
            media_key: post.media.as_ref().map(|m| m.key.clone()),
            media_name: post.media.as_ref().and_then(|m| m.name.clone()),
            media_type: post.media.as_ref().and_then(|m| m.content_type.clone()),
            status: post.status,
            scheduled_at: post.scheduled_at,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.posts.lock().unwrap().push(created.clone());
        self.link_channels(created.id, channel_ids);
        Ok(created)
    }

    async fn find_post(
        &self,
        workspace_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<Post>, sqlx::Error> {
        self.check()?;
        Ok(self
            .post_row(post_id)
            .filter(|p| p.workspace_id == workspace_id && p.deleted_at.is_none()))
    }

    async fn channels_for_posts(
        &self,
        post_ids: &[Uuid],
    ) -> Result<Vec<PostChannelRow>, sqlx::Error> {
        self.check()?;
        let channels = self.channels.lock().unwrap();
        let mut links: Vec<(Uuid, Uuid, OffsetDateTime)> = self
            .post_channels
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _, _)| post_ids.contains(p))
            .copied()
            .collect();
        links.sort_by_key(|(_, _, at)| *at);
        Ok(links
            .into_iter()
            .filter_map(|(post_id, channel_id, _)| {
                channels
                    .iter()
                    .find(|c| c.id == channel_id)
                    .map(|c| PostChannelRow {
                        post_id,
                        channel_id,
                        name: c.name.clone(),
                        platform: c.platform,
                    })
            })
            .collect())
    }

    async fn update_post(
        &self,
        workspace_id: Uuid,
        post_id: Uuid,
        changes: &PostChanges,
        add_channels: &[Uuid],
        remove_channels: &[Uuid],
    ) -> Result<Option<Post>, sqlx::Error> {
        self.check()?;
        let updated = {
            let mut posts = self.posts.lock().unwrap();
            let Some(post) = posts.iter_mut().find(|p| {
                p.id == post_id && p.workspace_id == workspace_id && p.deleted_at.is_none()
            }) else {
                return Ok(None);
            };
            if let Some(content) = &changes.content {
                post.content = content.clone();
            }
            if let Some(media) = &changes.media {
                post.media_key = media.as_ref().map(|m| m.key.clone());
                post.media_name = media.as_ref().and_then(|m| m.name.clone());
                post.media_type = media.as_ref().and_then(|m| m.content_type.clone());
            }
            if let Some(status) = changes.status {
                post.status = status;
            }
            if let Some(scheduled_at) = changes.scheduled_at {
                post.scheduled_at = scheduled_at;
            }
            post.updated_at = OffsetDateTime::now_utc();
            post.clone()
        };
        self.post_channels
            .lock()
            .unwrap()
            .retain(|(p, c, _)| !(*p == post_id && remove_channels.contains(c)));
        self.link_channels(post_id, add_channels);
        Ok(Some(updated))
    }

    async fn soft_delete_post(
        &self,
        workspace_id: Uuid,
        post_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut posts = self.posts.lock().unwrap();
        let Some(post) = posts.iter_mut().find(|p| {
            p.id == post_id && p.workspace_id == workspace_id && p.deleted_at.is_none()
        }) else {
            return Ok(false);
        };
        post.deleted_at = Some(OffsetDateTime::now_utc());
        Ok(true)
    }

    async fn filter_posts(
        &self,
        workspace_id: Uuid,
        filter: &PostFilter,
    ) -> Result<Vec<Post>, sqlx::Error> {
        self.check()?;
        let links = self.post_channels.lock().unwrap().clone();
        let mut posts: Vec<Post> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.workspace_id == workspace_id && p.deleted_at.is_none())
            .filter(|p| filter.status.matches(p.status))
            .filter(|p| match &filter.date_range {
                Some(range) => {
                    p.scheduled_at.map(|at| range.contains(at)).unwrap_or(false)
                        || range.contains(p.created_at)
                }
                None => true,
            })
            .filter(|p| {
                filter.channel_ids.is_empty()
                    || links
                        .iter()
                        .any(|(post, c, _)| *post == p.id && filter.channel_ids.contains(c))
            })
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn list_posts_by_status(
        &self,
        workspace_id: Uuid,
        status: PostStatus,
        unscheduled_only: bool,
        page: Page,
    ) -> Result<Vec<Post>, sqlx::Error> {
        self.check()?;
        let mut posts: Vec<Post> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| {
                p.workspace_id == workspace_id
                    && p.status == status
                    && p.deleted_at.is_none()
                    && (!unscheduled_only || p.scheduled_at.is_none())
            })
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }
}
