//! Repository for the host directory tables (`herald_users`,
//! `herald_groups`, `herald_objects` and the relation tables).

use herald_core::target::ObjectRef;
use herald_core::types::DbId;
use sqlx::PgPool;

use crate::models::directory::{GroupRow, ObjectRow, UserRow};

/// Column list for `herald_users` queries.
const USER_COLUMNS: &str = "id, email, display_name, profile_url, avatar_url, is_active, \
    is_anonymous, email_blacklisted, last_login_at, tos_accepted, utc_offset_secs, \
    is_portal_moderator";

/// Column list for `herald_objects` queries.
const OBJECT_COLUMNS: &str = "content_type, object_id, group_id, creator_id, title, url, \
    alert_image_url, image_url, is_public";

/// Read-only lookups into the host directory.
pub struct DirectoryRepo;

impl DirectoryRepo {
    pub async fn find_user(pool: &PgPool, user_id: DbId) -> Result<Option<UserRow>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM herald_users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Active portal moderators.
    pub async fn list_moderators(pool: &PgPool) -> Result<Vec<UserRow>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM herald_users \
             WHERE is_portal_moderator AND is_active \
             ORDER BY id"
        );
        sqlx::query_as::<_, UserRow>(&query).fetch_all(pool).await
    }

    pub async fn find_group(pool: &PgPool, group_id: DbId) -> Result<Option<GroupRow>, sqlx::Error> {
        sqlx::query_as::<_, GroupRow>(
            "SELECT id, title, url, icon_url, is_public FROM herald_groups WHERE id = $1",
        )
        .bind(group_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_object(
        pool: &PgPool,
        target: &ObjectRef,
    ) -> Result<Option<ObjectRow>, sqlx::Error> {
        let query = format!(
            "SELECT {OBJECT_COLUMNS} FROM herald_objects \
             WHERE content_type = $1 AND object_id = $2"
        );
        sqlx::query_as::<_, ObjectRow>(&query)
            .bind(&target.content_type)
            .bind(target.object_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn is_member(pool: &PgPool, group_id: DbId, user_id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM herald_group_members WHERE group_id = $1 AND user_id = $2)",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn is_following(
        pool: &PgPool,
        user_id: DbId,
        target: &ObjectRef,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM herald_follows \
             WHERE user_id = $1 AND content_type = $2 AND object_id = $3)",
        )
        .bind(user_id)
        .bind(&target.content_type)
        .bind(target.object_id)
        .fetch_one(pool)
        .await
    }

    /// Whether a named relation (e.g. `is_assignee`) links the user to the
    /// object.
    pub async fn has_relation(
        pool: &PgPool,
        user_id: DbId,
        target: &ObjectRef,
        relation: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM herald_object_relations \
             WHERE content_type = $1 AND object_id = $2 AND user_id = $3 AND relation = $4)",
        )
        .bind(&target.content_type)
        .bind(target.object_id)
        .bind(user_id)
        .bind(relation)
        .fetch_one(pool)
        .await
    }
}
