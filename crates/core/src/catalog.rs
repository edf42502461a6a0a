//! Built-in notification type declarations, one function per feature.
//!
//! [`build_registry`] collects every feature's declarations into the
//! validated [`NotificationRegistry`] used by the worker. Embedding
//! applications with their own features can start from
//! [`registry_builder`] and register more before building.

use crate::error::CoreError;
use crate::registry::{
    DigestCategory, MultiMergeKind, MultiPreferenceSet, NotificationRegistry,
    NotificationTypeDescriptor, RegistryBuilder,
};
use crate::setting::NotificationSetting;

/// Object-state predicate: the recipient still follows the target.
pub const PREDICATE_IS_FOLLOWING: &str = "is_following";

/// Alert reason predicate: the recipient is assigned to the target.
pub const PREDICATE_IS_ASSIGNEE: &str = "is_assignee";

/// Multi-preference set for content the user follows.
pub const FOLLOWED_CONTENT_SET: &str = "followed_content";

pub mod groups {
    use super::*;

    pub const INVITED: &str = "groups__invited";
    pub const MEMBER_JOINED: &str = "groups__member_joined";
    pub const GROUP_UPDATED: &str = "groups__group_updated";

    pub fn declarations() -> Vec<NotificationTypeDescriptor> {
        vec![
            NotificationTypeDescriptor::new(INVITED, "You were invited to a group", NotificationSetting::Now)
                .with_alert(MultiMergeKind::None),
            NotificationTypeDescriptor::new(MEMBER_JOINED, "New group member", NotificationSetting::Weekly)
                .with_alert(MultiMergeKind::MultiUser)
                .with_icon_image("/static/images/icons/group.png"),
            NotificationTypeDescriptor::new(GROUP_UPDATED, "Group updated", NotificationSetting::Daily)
                .with_alert(MultiMergeKind::MultiUser),
        ]
    }
}

pub mod notes {
    use super::*;

    pub const NOTE_CREATED: &str = "notes__note_created";
    pub const NOTE_UPDATED: &str = "notes__note_updated";
    pub const COMMENT_POSTED: &str = "notes__comment_posted";
    pub const MENTIONED: &str = "notes__mentioned";

    pub fn declarations() -> Vec<NotificationTypeDescriptor> {
        vec![
            NotificationTypeDescriptor::new(NOTE_CREATED, "New post", NotificationSetting::Daily)
                .with_alert(MultiMergeKind::Bundle)
                .superseding(["note_updated"])
                .moderatable()
                .with_icon_image("/static/images/icons/note.png"),
            NotificationTypeDescriptor::new(NOTE_UPDATED, "Post updated", NotificationSetting::Daily)
                .with_alert(MultiMergeKind::MultiUser),
            NotificationTypeDescriptor::new(COMMENT_POSTED, "New comment", NotificationSetting::Daily)
                .with_alert(MultiMergeKind::MultiUser)
                .with_icon_image("/static/images/icons/comment.png"),
            NotificationTypeDescriptor::new(MENTIONED, "You were mentioned", NotificationSetting::Now)
                .with_alert(MultiMergeKind::None)
                .superseding(["comment_posted", "note_updated"]),
        ]
    }
}

pub mod events {
    use super::*;

    pub const EVENT_CREATED: &str = "events__event_created";
    pub const EVENT_UPDATED: &str = "events__event_updated";
    pub const EVENT_CANCELLED: &str = "events__event_cancelled";

    pub fn declarations() -> Vec<NotificationTypeDescriptor> {
        vec![
            NotificationTypeDescriptor::new(EVENT_CREATED, "New event", NotificationSetting::Daily)
                .with_alert(MultiMergeKind::Bundle)
                .moderatable(),
            NotificationTypeDescriptor::new(EVENT_UPDATED, "Event updated", NotificationSetting::Daily)
                .with_alert(MultiMergeKind::MultiUser),
            NotificationTypeDescriptor::new(EVENT_CANCELLED, "Event cancelled", NotificationSetting::Now)
                .with_alert(MultiMergeKind::None)
                .superseding(["event_updated", "event_created"]),
        ]
    }
}

pub mod files {
    use super::*;

    pub const FILE_UPLOADED: &str = "files__file_uploaded";

    pub fn declarations() -> Vec<NotificationTypeDescriptor> {
        vec![
            NotificationTypeDescriptor::new(FILE_UPLOADED, "New file", NotificationSetting::Weekly)
                .with_alert(MultiMergeKind::Bundle),
        ]
    }
}

pub mod todos {
    use super::*;

    pub const TODO_ASSIGNED: &str = "todos__todo_assigned";
    pub const TODO_COMPLETED: &str = "todos__todo_completed";

    pub fn declarations() -> Vec<NotificationTypeDescriptor> {
        vec![
            NotificationTypeDescriptor::new(TODO_ASSIGNED, "A task was assigned to you", NotificationSetting::Now)
                .with_alert(MultiMergeKind::None)
                .with_reason_check(PREDICATE_IS_ASSIGNEE),
            NotificationTypeDescriptor::new(TODO_COMPLETED, "Task completed", NotificationSetting::Daily)
                .with_alert(MultiMergeKind::MultiUser),
        ]
    }
}

pub mod follow {
    use super::*;

    pub const FOLLOWED_UPDATED: &str = "follow__followed_updated";
    pub const FOLLOWED_COMMENTED: &str = "follow__followed_commented";

    pub fn declarations() -> Vec<NotificationTypeDescriptor> {
        vec![
            NotificationTypeDescriptor::new(FOLLOWED_UPDATED, "Followed content updated", NotificationSetting::Daily)
                .with_alert(MultiMergeKind::MultiUser)
                .with_state_check(PREDICATE_IS_FOLLOWING),
            NotificationTypeDescriptor::new(FOLLOWED_COMMENTED, "New comment on followed content", NotificationSetting::Daily)
                .with_alert(MultiMergeKind::MultiUser)
                .with_state_check(PREDICATE_IS_FOLLOWING)
                .superseding(["followed_updated"]),
        ]
    }
}

fn category(label: &str, types: &[&str]) -> DigestCategory {
    DigestCategory {
        label: label.to_string(),
        types: types.iter().map(|t| t.to_string()).collect(),
    }
}

/// Builder pre-loaded with every built-in feature.
pub fn registry_builder() -> Result<RegistryBuilder, CoreError> {
    let mut builder = RegistryBuilder::new();
    builder.register_all(groups::declarations())?;
    builder.register_all(notes::declarations())?;
    builder.register_all(events::declarations())?;
    builder.register_all(files::declarations())?;
    builder.register_all(todos::declarations())?;
    builder.register_all(follow::declarations())?;

    builder
        .multi_preference(MultiPreferenceSet {
            key: FOLLOWED_CONTENT_SET.to_string(),
            label: "Updates on content I follow".to_string(),
            types: [follow::FOLLOWED_UPDATED, follow::FOLLOWED_COMMENTED]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            default_setting: NotificationSetting::Daily,
        })
        .category(category(
            "Groups",
            &[groups::MEMBER_JOINED, groups::GROUP_UPDATED],
        ))
        .category(category(
            "Posts",
            &[
                notes::NOTE_CREATED,
                notes::NOTE_UPDATED,
                notes::COMMENT_POSTED,
                notes::MENTIONED,
            ],
        ))
        .category(category(
            "Events",
            &[events::EVENT_CREATED, events::EVENT_UPDATED, events::EVENT_CANCELLED],
        ))
        .category(category(
            "Followed content",
            &[follow::FOLLOWED_UPDATED, follow::FOLLOWED_COMMENTED],
        ))
        .ignore_user_setting(groups::INVITED);

    Ok(builder)
}

/// The validated registry of every built-in feature, plus extra
/// ignore-user-setting types from configuration.
pub fn build_registry(ignore_user_setting: &[String]) -> Result<NotificationRegistry, CoreError> {
    let mut builder = registry_builder()?;
    for key in ignore_user_setting {
        builder.ignore_user_setting(key.clone());
    }
    builder.build()
}
