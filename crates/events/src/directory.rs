//! Host capabilities: resolving target objects and looking up users.
//!
//! Herald never touches domain objects directly. The host application
//! implements [`ObjectResolver`] and [`UserDirectory`]; [`SqlDirectory`] is
//! an implementation over the `herald_*` directory tables.

use async_trait::async_trait;
use herald_core::catalog::PREDICATE_IS_FOLLOWING;
use herald_core::preference::RecipientProfile;
use herald_core::target::{ActorDisplay, GroupDisplay, ObjectRef, TargetDisplay};
use herald_core::types::DbId;
use herald_db::repositories::DirectoryRepo;
use herald_db::DbPool;

use crate::error::EventsError;

/// A live target object as seen by Herald.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetInfo {
    pub target: ObjectRef,
    /// Owning group; `None` for groups themselves.
    pub group_id: Option<DbId>,
    pub creator_id: Option<DbId>,
    pub display: TargetDisplay,
    pub group: Option<GroupDisplay>,
    pub publicly_readable: bool,
}

#[async_trait]
pub trait ObjectResolver: Send + Sync {
    /// `None` when the object no longer exists.
    async fn resolve(&self, target: &ObjectRef) -> Result<Option<TargetInfo>, EventsError>;

    async fn can_read(&self, user_id: DbId, target: &TargetInfo) -> Result<bool, EventsError>;

    async fn is_following(&self, user_id: DbId, target: &ObjectRef) -> Result<bool, EventsError>;

    async fn is_following_group(&self, user_id: DbId, group_id: DbId) -> Result<bool, EventsError>;

    /// Evaluate a named type-specific predicate (state checks and special
    /// alert reasons).
    async fn check_predicate(
        &self,
        predicate: &str,
        user_id: DbId,
        target: &TargetInfo,
    ) -> Result<bool, EventsError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn profile(&self, user_id: DbId) -> Result<Option<RecipientProfile>, EventsError>;

    async fn actor(&self, user_id: DbId) -> Result<Option<ActorDisplay>, EventsError>;

    async fn portal_moderators(&self) -> Result<Vec<RecipientProfile>, EventsError>;
}

// ---------------------------------------------------------------------------
// SqlDirectory
// ---------------------------------------------------------------------------

/// Directory over the `herald_users` / `herald_groups` / `herald_objects`
/// tables.
#[derive(Clone)]
pub struct SqlDirectory {
    pool: DbPool,
}

impl SqlDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObjectResolver for SqlDirectory {
    async fn resolve(&self, target: &ObjectRef) -> Result<Option<TargetInfo>, EventsError> {
        if target.is_group() {
            let Some(group) = DirectoryRepo::find_group(&self.pool, target.object_id).await? else {
                return Ok(None);
            };
            return Ok(Some(TargetInfo {
                target: target.clone(),
                group_id: None,
                creator_id: None,
                display: TargetDisplay {
                    title: group.title.clone(),
                    url: group.url.clone(),
                    alert_image_url: None,
                    image_url: group.icon_url.clone(),
                },
                group: None,
                publicly_readable: group.is_public,
            }));
        }

        let Some(object) = DirectoryRepo::find_object(&self.pool, target).await? else {
            return Ok(None);
        };
        let group = match object.group_id {
            Some(group_id) => DirectoryRepo::find_group(&self.pool, group_id)
                .await?
                .map(|g| g.display()),
            None => None,
        };
        Ok(Some(TargetInfo {
            target: target.clone(),
            group_id: object.group_id,
            creator_id: object.creator_id,
            display: object.display(),
            group,
            publicly_readable: object.is_public,
        }))
    }

    async fn can_read(&self, user_id: DbId, target: &TargetInfo) -> Result<bool, EventsError> {
        if target.publicly_readable || target.creator_id == Some(user_id) {
            return Ok(true);
        }
        let group_id = if target.target.is_group() {
            Some(target.target.object_id)
        } else {
            target.group_id
        };
        match group_id {
            Some(group_id) => Ok(DirectoryRepo::is_member(&self.pool, group_id, user_id).await?),
            None => Ok(false),
        }
    }

    async fn is_following(&self, user_id: DbId, target: &ObjectRef) -> Result<bool, EventsError> {
        Ok(DirectoryRepo::is_following(&self.pool, user_id, target).await?)
    }

    async fn is_following_group(&self, user_id: DbId, group_id: DbId) -> Result<bool, EventsError> {
        Ok(DirectoryRepo::is_member(&self.pool, group_id, user_id).await?)
    }

    async fn check_predicate(
        &self,
        predicate: &str,
        user_id: DbId,
        target: &TargetInfo,
    ) -> Result<bool, EventsError> {
        if predicate == PREDICATE_IS_FOLLOWING {
            return self.is_following(user_id, &target.target).await;
        }
        Ok(DirectoryRepo::has_relation(&self.pool, user_id, &target.target, predicate).await?)
    }
}

#[async_trait]
impl UserDirectory for SqlDirectory {
    async fn profile(&self, user_id: DbId) -> Result<Option<RecipientProfile>, EventsError> {
        Ok(DirectoryRepo::find_user(&self.pool, user_id)
            .await?
            .map(|u| u.profile()))
    }

    async fn actor(&self, user_id: DbId) -> Result<Option<ActorDisplay>, EventsError> {
        Ok(DirectoryRepo::find_user(&self.pool, user_id)
            .await?
            .map(|u| u.actor()))
    }

    async fn portal_moderators(&self) -> Result<Vec<RecipientProfile>, EventsError> {
        Ok(DirectoryRepo::list_moderators(&self.pool)
            .await?
            .iter()
            .map(|u| u.profile())
            .collect())
    }
}
