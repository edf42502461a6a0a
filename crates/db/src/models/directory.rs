//! Host directory rows: users, groups and the objects notifications point at.

use herald_core::preference::RecipientProfile;
use herald_core::target::{ActorDisplay, GroupDisplay, TargetDisplay};
use herald_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `herald_users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserRow {
    pub id: DbId,
    pub email: Option<String>,
    pub display_name: String,
    pub profile_url: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub is_anonymous: bool,
    pub email_blacklisted: bool,
    pub last_login_at: Option<Timestamp>,
    pub tos_accepted: bool,
    pub utc_offset_secs: i32,
    pub is_portal_moderator: bool,
}

impl UserRow {
    pub fn profile(&self) -> RecipientProfile {
        RecipientProfile {
            user_id: self.id,
            email: self.email.clone(),
            is_active: self.is_active,
            is_anonymous: self.is_anonymous,
            email_blacklisted: self.email_blacklisted,
            has_logged_in: self.last_login_at.is_some(),
            tos_accepted: self.tos_accepted,
            utc_offset_secs: self.utc_offset_secs,
        }
    }

    pub fn actor(&self) -> ActorDisplay {
        ActorDisplay {
            user_id: self.id,
            name: self.display_name.clone(),
            url: self.profile_url.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// A row from the `herald_groups` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GroupRow {
    pub id: DbId,
    pub title: String,
    pub url: String,
    pub icon_url: Option<String>,
    pub is_public: bool,
}

impl GroupRow {
    pub fn display(&self) -> GroupDisplay {
        GroupDisplay {
            group_id: self.id,
            title: self.title.clone(),
            url: self.url.clone(),
            icon_url: self.icon_url.clone(),
        }
    }
}

/// A row from the `herald_objects` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ObjectRow {
    pub content_type: String,
    pub object_id: DbId,
    pub group_id: Option<DbId>,
    pub creator_id: Option<DbId>,
    pub title: String,
    pub url: String,
    pub alert_image_url: Option<String>,
    pub image_url: Option<String>,
    pub is_public: bool,
}

impl ObjectRow {
    pub fn display(&self) -> TargetDisplay {
        TargetDisplay {
            title: self.title.clone(),
            url: self.url.clone(),
            alert_image_url: self.alert_image_url.clone(),
            image_url: self.image_url.clone(),
        }
    }
}
