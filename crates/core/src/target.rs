//! Polymorphic target object references and the display data resolved for
//! them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// Content type tag used for groups themselves.
pub const CONTENT_TYPE_GROUP: &str = "group";

/// A reference to any domain object: `{content_type, object_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub content_type: String,
    pub object_id: DbId,
}

impl ObjectRef {
    pub fn new(content_type: impl Into<String>, object_id: DbId) -> Self {
        Self {
            content_type: content_type.into(),
            object_id,
        }
    }

    pub fn group(group_id: DbId) -> Self {
        Self::new(CONTENT_TYPE_GROUP, group_id)
    }

    pub fn is_group(&self) -> bool {
        self.content_type == CONTENT_TYPE_GROUP
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.content_type, self.object_id)
    }
}

/// Display data for a live target object, supplied by the object resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDisplay {
    pub title: String,
    pub url: String,
    /// Image meant specifically for alerts.
    pub alert_image_url: Option<String>,
    /// General image of the object.
    pub image_url: Option<String>,
}

/// Display data for the group an object lives in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDisplay {
    pub group_id: DbId,
    pub title: String,
    pub url: String,
    pub icon_url: Option<String>,
}

/// Display data for an acting user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorDisplay {
    pub user_id: DbId,
    pub name: String,
    pub url: String,
    pub avatar_url: Option<String>,
}
