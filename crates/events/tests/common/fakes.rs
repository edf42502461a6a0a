//! In-memory collaborators: [`StaticDirectory`] implements both host
//! capabilities over plain maps, [`RecordingMailer`] keeps every mail and
//! [`ManualClock`] only moves when told to.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Duration;
use herald_core::clock::Clock;
use herald_core::preference::RecipientProfile;
use herald_core::target::{ActorDisplay, GroupDisplay, ObjectRef, TargetDisplay};
use herald_core::types::{DbId, Timestamp};
use herald_events::delivery::email::EmailError;
use herald_events::directory::{ObjectResolver, TargetInfo, UserDirectory};
use herald_events::{EventsError, Mailer, OutgoingMail};

/// An active, logged-in account that accepted the terms of service.
pub fn active_user(user_id: DbId) -> RecipientProfile {
    RecipientProfile {
        user_id,
        email: Some(format!("user{user_id}@example.org")),
        is_active: true,
        is_anonymous: false,
        email_blacklisted: false,
        has_logged_in: true,
        tos_accepted: true,
        utc_offset_secs: 0,
    }
}

/// A readable object in a group, created by `creator_id`.
pub fn object_in_group(target: ObjectRef, group_id: Option<DbId>, creator_id: DbId) -> TargetInfo {
    TargetInfo {
        display: TargetDisplay {
            title: format!("Object {}", target.object_id),
            url: format!("/{}/{}", target.content_type, target.object_id),
            alert_image_url: None,
            image_url: None,
        },
        group: group_id.map(|id| GroupDisplay {
            group_id: id,
            title: format!("Group {id}"),
            url: format!("/group/{id}"),
            icon_url: None,
        }),
        target,
        group_id,
        creator_id: Some(creator_id),
        publicly_readable: false,
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<DbId, RecipientProfile>,
    moderators: Vec<DbId>,
    objects: HashMap<ObjectRef, TargetInfo>,
    members: HashSet<(DbId, DbId)>,
    follows: HashSet<(DbId, ObjectRef)>,
    relations: HashSet<(String, DbId, ObjectRef)>,
    failing_users: HashSet<DbId>,
}

/// Map-backed [`ObjectResolver`] and [`UserDirectory`].
///
/// Everyone can read objects of groups they are a member of, objects they
/// created, and publicly readable objects.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    state: Mutex<DirectoryState>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_user(&self, profile: RecipientProfile) -> &Self {
        self.state().users.insert(profile.user_id, profile);
        self
    }

    pub fn add_moderator(&self, profile: RecipientProfile) -> &Self {
        let mut state = self.state();
        state.moderators.push(profile.user_id);
        state.users.insert(profile.user_id, profile);
        self
    }

    pub fn update_user(&self, user_id: DbId, update: impl FnOnce(&mut RecipientProfile)) {
        if let Some(profile) = self.state().users.get_mut(&user_id) {
            update(profile);
        }
    }

    /// Make profile lookups for this user fail with a transient error.
    pub fn fail_user(&self, user_id: DbId) -> &Self {
        self.state().failing_users.insert(user_id);
        self
    }

    pub fn add_object(&self, info: TargetInfo) -> &Self {
        self.state().objects.insert(info.target.clone(), info);
        self
    }

    pub fn remove_object(&self, target: &ObjectRef) {
        self.state().objects.remove(target);
    }

    pub fn join_group(&self, user_id: DbId, group_id: DbId) -> &Self {
        self.state().members.insert((group_id, user_id));
        self
    }

    pub fn leave_group(&self, user_id: DbId, group_id: DbId) {
        self.state().members.remove(&(group_id, user_id));
    }

    pub fn follow(&self, user_id: DbId, target: &ObjectRef) -> &Self {
        self.state().follows.insert((user_id, target.clone()));
        self
    }

    pub fn unfollow(&self, user_id: DbId, target: &ObjectRef) {
        self.state().follows.remove(&(user_id, target.clone()));
    }

    /// Make a named predicate hold for the user on the target.
    pub fn relate(&self, predicate: &str, user_id: DbId, target: &ObjectRef) -> &Self {
        self.state()
            .relations
            .insert((predicate.to_string(), user_id, target.clone()));
        self
    }
}

#[async_trait]
impl ObjectResolver for StaticDirectory {
    async fn resolve(&self, target: &ObjectRef) -> Result<Option<TargetInfo>, EventsError> {
        Ok(self.state().objects.get(target).cloned())
    }

    async fn can_read(&self, user_id: DbId, target: &TargetInfo) -> Result<bool, EventsError> {
        let state = self.state();
        let group_id = if target.target.is_group() {
            Some(target.target.object_id)
        } else {
            target.group_id
        };
        Ok(target.publicly_readable
            || target.creator_id == Some(user_id)
            || group_id.is_some_and(|g| state.members.contains(&(g, user_id))))
    }

    async fn is_following(&self, user_id: DbId, target: &ObjectRef) -> Result<bool, EventsError> {
        Ok(self.state().follows.contains(&(user_id, target.clone())))
    }

    async fn is_following_group(&self, user_id: DbId, group_id: DbId) -> Result<bool, EventsError> {
        Ok(self.state().members.contains(&(group_id, user_id)))
    }

    async fn check_predicate(
        &self,
        predicate: &str,
        user_id: DbId,
        target: &TargetInfo,
    ) -> Result<bool, EventsError> {
        let state = self.state();
        if predicate == herald_core::catalog::PREDICATE_IS_FOLLOWING {
            return Ok(state.follows.contains(&(user_id, target.target.clone())));
        }
        Ok(state
            .relations
            .contains(&(predicate.to_string(), user_id, target.target.clone())))
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn profile(&self, user_id: DbId) -> Result<Option<RecipientProfile>, EventsError> {
        let state = self.state();
        if state.failing_users.contains(&user_id) {
            return Err(EventsError::transient("user directory", format!("lookup of user {user_id} failed")));
        }
        Ok(state.users.get(&user_id).cloned())
    }

    async fn actor(&self, user_id: DbId) -> Result<Option<ActorDisplay>, EventsError> {
        Ok(self.state().users.get(&user_id).map(|_| ActorDisplay {
            user_id,
            name: format!("User {user_id}"),
            url: format!("/user/{user_id}"),
            avatar_url: None,
        }))
    }

    async fn portal_moderators(&self) -> Result<Vec<RecipientProfile>, EventsError> {
        let state = self.state();
        Ok(state
            .moderators
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// RecordingMailer
// ---------------------------------------------------------------------------

/// Keeps every mail. Addresses listed with [`fail_for`](Self::fail_for) get
/// a build error instead.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, address: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address.to_string());
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<OutgoingMail> {
        self.sent()
            .into_iter()
            .filter(|m| m.to == address)
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), EmailError> {
        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&mail.to)
        {
            return Err(EmailError::Refused(mail.to.clone()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(mail.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: Timestamp) {
        *self.now.lock().unwrap() = to;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}
