//! Notification type catalog.
//!
//! Every feature module declares the notification types it fires as
//! [`NotificationTypeDescriptor`]s. A [`RegistryBuilder`] collects them once
//! at startup, validates the whole set and produces an immutable
//! [`NotificationRegistry`] that is shared by reference (usually behind an
//! `Arc`) with every component that needs delivery policy.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::setting::{NotificationSetting, RESERVED_KEYS};

/// Notification type keys are namespaced by their owning feature:
/// `<feature>__<name>`.
const KEY_PATTERN: &str = r"^[a-z][a-z0-9_]*__[a-z][a-z0-9_]*$";

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(KEY_PATTERN).expect("valid regex"));

/// Separator between the feature namespace and the type name.
const NAMESPACE_SEPARATOR: &str = "__";

/// Strip the feature namespace from a type key.
///
/// `"notes__comment_posted"` becomes `"comment_posted"`. Keys without a
/// namespace are returned unchanged.
pub fn unprefixed(key: &str) -> &str {
    key.split_once(NAMESPACE_SEPARATOR)
        .map(|(_, name)| name)
        .unwrap_or(key)
}

// ---------------------------------------------------------------------------
// MultiMergeKind
// ---------------------------------------------------------------------------

/// How repeated events of one type are folded into existing alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiMergeKind {
    /// Every qualifying event creates its own alert.
    #[default]
    None,
    /// Same object, many actors.
    MultiUser,
    /// Same actor, many objects, within the bundle window.
    Bundle,
}

// ---------------------------------------------------------------------------
// NotificationTypeDescriptor
// ---------------------------------------------------------------------------

/// Static delivery policy for one notification type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTypeDescriptor {
    /// Globally unique key, `<feature>__<name>`.
    pub key: String,
    /// Human-readable label used as the mail subject line.
    pub label: String,
    pub can_be_alert: bool,
    pub can_be_email: bool,
    /// Setting applied when the user has no explicit preference.
    pub default_setting: NotificationSetting,
    pub multi_merge: MultiMergeKind,
    /// Unprefixed type names this type makes redundant on the same object.
    pub supersedes: BTreeSet<String>,
    /// Name of an object-state predicate re-checked at digest time (for
    /// example "is the recipient still following this").
    pub state_check: Option<String>,
    /// Name of a predicate that grants the `special` alert reason.
    pub reason_check: Option<String>,
    /// Whether the acting user may be part of the audience.
    pub allow_creator_as_audience: bool,
    /// Whether anonymous accounts may be mailed.
    pub allow_anonymous: bool,
    /// Portal moderators are mailed for publicly readable content.
    pub moderatable: bool,
    /// Image derived from the type icon, used as an alert image fallback.
    pub icon_image_url: Option<String>,
}

impl NotificationTypeDescriptor {
    /// Create a descriptor with the required fields.
    ///
    /// The type can be mailed but not alerted, and never merges, until the
    /// builder methods say otherwise.
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        default_setting: NotificationSetting,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            can_be_alert: false,
            can_be_email: true,
            default_setting,
            multi_merge: MultiMergeKind::None,
            supersedes: BTreeSet::new(),
            state_check: None,
            reason_check: None,
            allow_creator_as_audience: false,
            allow_anonymous: false,
            moderatable: false,
            icon_image_url: None,
        }
    }

    /// Enable in-app alerts with the given merge behaviour.
    pub fn with_alert(mut self, multi_merge: MultiMergeKind) -> Self {
        self.can_be_alert = true;
        self.multi_merge = multi_merge;
        self
    }

    /// Alert-only types are never mailed.
    pub fn without_email(mut self) -> Self {
        self.can_be_email = false;
        self
    }

    pub fn superseding<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supersedes.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_state_check(mut self, predicate: impl Into<String>) -> Self {
        self.state_check = Some(predicate.into());
        self
    }

    pub fn with_reason_check(mut self, predicate: impl Into<String>) -> Self {
        self.reason_check = Some(predicate.into());
        self
    }

    pub fn allowing_creator(mut self) -> Self {
        self.allow_creator_as_audience = true;
        self
    }

    pub fn allowing_anonymous(mut self) -> Self {
        self.allow_anonymous = true;
        self
    }

    pub fn moderatable(mut self) -> Self {
        self.moderatable = true;
        self
    }

    pub fn with_icon_image(mut self, url: impl Into<String>) -> Self {
        self.icon_image_url = Some(url.into());
        self
    }

    /// The type name without its feature namespace.
    pub fn name(&self) -> &str {
        unprefixed(&self.key)
    }

    /// Mail template reference for instant notifications of this type.
    pub fn instant_template(&self) -> String {
        format!("herald/instant/{}", self.key)
    }
}

// ---------------------------------------------------------------------------
// Multi-preference sets and digest categories
// ---------------------------------------------------------------------------

/// A group-independent opt-in covering several notification types (for
/// example "updates on content I follow").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiPreferenceSet {
    pub key: String,
    pub label: String,
    pub types: BTreeSet<String>,
    pub default_setting: NotificationSetting,
}

/// A labelled section of the digest email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestCategory {
    pub label: String,
    pub types: BTreeSet<String>,
}

/// Label of the implicit section holding uncategorised events.
pub const UNCATEGORISED_LABEL: &str = "Other";

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

/// Collects declarations from every feature module before validation.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    types: HashMap<String, NotificationTypeDescriptor>,
    order: Vec<String>,
    multi_preferences: Vec<MultiPreferenceSet>,
    categories: Vec<DigestCategory>,
    ignore_user_setting: HashSet<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one notification type.
    ///
    /// Fails with [`CoreError::DuplicateKey`] if the key is already present
    /// and with [`CoreError::Configuration`] if it is a reserved key.
    pub fn register(&mut self, descriptor: NotificationTypeDescriptor) -> Result<(), CoreError> {
        if RESERVED_KEYS.contains(&descriptor.key.as_str()) {
            return Err(CoreError::Configuration(format!(
                "'{}' is a reserved preference key",
                descriptor.key
            )));
        }
        if self.types.contains_key(&descriptor.key) {
            return Err(CoreError::DuplicateKey(descriptor.key));
        }
        self.order.push(descriptor.key.clone());
        self.types.insert(descriptor.key.clone(), descriptor);
        Ok(())
    }

    /// Register every declaration of one feature module.
    pub fn register_all<I>(&mut self, descriptors: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = NotificationTypeDescriptor>,
    {
        descriptors.into_iter().try_for_each(|d| self.register(d))
    }

    pub fn multi_preference(&mut self, set: MultiPreferenceSet) -> &mut Self {
        self.multi_preferences.push(set);
        self
    }

    pub fn category(&mut self, category: DigestCategory) -> &mut Self {
        self.categories.push(category);
        self
    }

    /// Mark a type as always sent immediately, bypassing user preferences.
    pub fn ignore_user_setting(&mut self, key: impl Into<String>) -> &mut Self {
        self.ignore_user_setting.insert(key.into());
        self
    }

    /// Validate every declaration and freeze the registry.
    pub fn build(self) -> Result<NotificationRegistry, CoreError> {
        let names: HashSet<&str> = self.types.keys().map(|k| unprefixed(k)).collect();

        for key in &self.order {
            let d = &self.types[key];
            validate_descriptor(d, &names)?;
        }

        let mut set_keys = HashSet::new();
        for set in &self.multi_preferences {
            if set.key.trim().is_empty() || !set_keys.insert(set.key.as_str()) {
                return Err(CoreError::Configuration(format!(
                    "Multi-preference set key '{}' is empty or duplicated",
                    set.key
                )));
            }
            self.require_known(&set.types, &format!("multi-preference set '{}'", set.key))?;
        }

        for category in &self.categories {
            if category.label.trim().is_empty() {
                return Err(CoreError::Configuration(
                    "Digest category label must not be empty".to_string(),
                ));
            }
            self.require_known(&category.types, &format!("digest category '{}'", category.label))?;
        }

        for key in &self.ignore_user_setting {
            if !self.types.contains_key(key) {
                return Err(CoreError::Configuration(format!(
                    "ignore-user-setting list names unknown type '{key}'"
                )));
            }
        }

        Ok(NotificationRegistry {
            types: self.types,
            order: self.order,
            multi_preferences: self.multi_preferences,
            categories: self.categories,
            ignore_user_setting: self.ignore_user_setting,
        })
    }

    fn require_known<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a String>,
        owner: &str,
    ) -> Result<(), CoreError> {
        for key in keys {
            if !self.types.contains_key(key) {
                return Err(CoreError::Configuration(format!(
                    "{owner} names unknown type '{key}'"
                )));
            }
        }
        Ok(())
    }
}

fn validate_descriptor(
    d: &NotificationTypeDescriptor,
    names: &HashSet<&str>,
) -> Result<(), CoreError> {
    if !KEY_RE.is_match(&d.key) {
        return Err(CoreError::Configuration(format!(
            "Notification type key '{}' must look like '<feature>__<name>'",
            d.key
        )));
    }
    if d.label.trim().is_empty() {
        return Err(CoreError::Configuration(format!(
            "Notification type '{}' has an empty label",
            d.key
        )));
    }
    if !d.can_be_alert && !d.can_be_email {
        return Err(CoreError::Configuration(format!(
            "Notification type '{}' can be neither alert nor email",
            d.key
        )));
    }
    if d.multi_merge != MultiMergeKind::None && !d.can_be_alert {
        return Err(CoreError::Configuration(format!(
            "Notification type '{}' declares a merge kind but cannot be an alert",
            d.key
        )));
    }
    for name in &d.supersedes {
        if name == d.name() {
            return Err(CoreError::Configuration(format!(
                "Notification type '{}' supersedes itself",
                d.key
            )));
        }
        if !names.contains(name.as_str()) {
            return Err(CoreError::Configuration(format!(
                "Notification type '{}' supersedes unknown type '{name}'",
                d.key
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// NotificationRegistry
// ---------------------------------------------------------------------------

/// Immutable, validated catalog of notification types.
///
/// Safe for unsynchronized concurrent reads; share it behind an `Arc`.
#[derive(Debug)]
pub struct NotificationRegistry {
    types: HashMap<String, NotificationTypeDescriptor>,
    order: Vec<String>,
    multi_preferences: Vec<MultiPreferenceSet>,
    categories: Vec<DigestCategory>,
    ignore_user_setting: HashSet<String>,
}

impl NotificationRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a descriptor, failing with [`CoreError::UnknownType`].
    pub fn get(&self, key: &str) -> Result<&NotificationTypeDescriptor, CoreError> {
        self.types
            .get(key)
            .ok_or_else(|| CoreError::UnknownType(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.types.contains_key(key)
    }

    /// Every `(key, descriptor)` pair. Call again to restart.
    pub fn all(&self) -> impl Iterator<Item = (&str, &NotificationTypeDescriptor)> + Clone + '_ {
        self.order
            .iter()
            .map(|k| (k.as_str(), &self.types[k]))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The multi-preference set a type belongs to, if any.
    pub fn multi_preference_for(&self, key: &str) -> Option<&MultiPreferenceSet> {
        self.multi_preferences.iter().find(|s| s.types.contains(key))
    }

    pub fn multi_preferences(&self) -> &[MultiPreferenceSet] {
        &self.multi_preferences
    }

    pub fn categories(&self) -> &[DigestCategory] {
        &self.categories
    }

    pub fn ignores_user_setting(&self, key: &str) -> bool {
        self.ignore_user_setting.contains(key)
    }

    /// Whether either type declares the other redundant for the same object.
    ///
    /// Unknown keys never supersede anything.
    pub fn either_supersedes(&self, a: &str, b: &str) -> bool {
        let declares = |x: &str, y: &str| {
            self.types
                .get(x)
                .is_some_and(|d| d.supersedes.contains(unprefixed(y)))
        };
        declares(a, b) || declares(b, a)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
