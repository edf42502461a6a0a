//! Composite alert keys and their storage digests.
//!
//! [`ItemKey`] identifies "the same underlying thing happened again" and
//! [`BundleKey`] identifies "the same actor is doing a lot of this". Both are
//! plain value types compared field by field. For storage they are reduced to
//! a SHA-256 hex digest over length-prefixed components, so no component can
//! bleed into its neighbour.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::target::ObjectRef;
use crate::types::DbId;

/// Feed one length-prefixed component into the hasher.
fn feed(hasher: &mut Sha256, component: &[u8]) {
    hasher.update((component.len() as u64).to_be_bytes());
    hasher.update(component);
}

fn feed_opt_id(hasher: &mut Sha256, id: Option<DbId>) {
    match id {
        Some(id) => {
            hasher.update([1u8]);
            hasher.update(id.to_be_bytes());
        }
        None => hasher.update([0u8]),
    }
}

// ---------------------------------------------------------------------------
// ItemKey
// ---------------------------------------------------------------------------

/// portal / group / object type / notification type / object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub portal_id: DbId,
    pub group_id: Option<DbId>,
    pub content_type: String,
    pub notification_type: String,
    pub object_id: DbId,
}

impl ItemKey {
    pub fn new(
        portal_id: DbId,
        group_id: Option<DbId>,
        target: &ObjectRef,
        notification_type: &str,
    ) -> Self {
        Self {
            portal_id,
            group_id,
            content_type: target.content_type.clone(),
            notification_type: notification_type.to_string(),
            object_id: target.object_id,
        }
    }

    /// Stable storage digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        feed(&mut hasher, b"item");
        hasher.update(self.portal_id.to_be_bytes());
        feed_opt_id(&mut hasher, self.group_id);
        feed(&mut hasher, self.content_type.as_bytes());
        feed(&mut hasher, self.notification_type.as_bytes());
        hasher.update(self.object_id.to_be_bytes());
        format!("{:x}", hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// BundleKey
// ---------------------------------------------------------------------------

/// portal / group / object type / notification type / actor id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleKey {
    pub portal_id: DbId,
    pub group_id: Option<DbId>,
    pub content_type: String,
    pub notification_type: String,
    pub actor_id: DbId,
}

impl BundleKey {
    pub fn new(
        portal_id: DbId,
        group_id: Option<DbId>,
        target: &ObjectRef,
        notification_type: &str,
        actor_id: DbId,
    ) -> Self {
        Self {
            portal_id,
            group_id,
            content_type: target.content_type.clone(),
            notification_type: notification_type.to_string(),
            actor_id,
        }
    }

    /// Stable storage digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        feed(&mut hasher, b"bundle");
        hasher.update(self.portal_id.to_be_bytes());
        feed_opt_id(&mut hasher, self.group_id);
        feed(&mut hasher, self.content_type.as_bytes());
        feed(&mut hasher, self.notification_type.as_bytes());
        hasher.update(self.actor_id.to_be_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(content_type: &str, id: DbId) -> ObjectRef {
        ObjectRef::new(content_type, id)
    }

    #[test]
    fn same_components_same_digest() {
        let a = ItemKey::new(1, Some(4), &target("note", 9), "notes__comment_posted");
        let b = ItemKey::new(1, Some(4), &target("note", 9), "notes__comment_posted");
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn separator_characters_do_not_collide() {
        // "a/b" + "c" must differ from "a" + "b/c".
        let a = ItemKey::new(1, None, &target("a/b", 1), "c");
        let b = ItemKey::new(1, None, &target("a", 1), "b/c");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn missing_group_differs_from_group_zero() {
        let a = ItemKey::new(1, None, &target("note", 1), "notes__x");
        let b = ItemKey::new(1, Some(0), &target("note", 1), "notes__x");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn item_and_bundle_digests_never_collide() {
        let t = target("note", 7);
        let item = ItemKey::new(1, Some(2), &t, "notes__x");
        let bundle = BundleKey::new(1, Some(2), &t, "notes__x", 7);
        assert_ne!(item.digest(), bundle.digest());
    }
}
