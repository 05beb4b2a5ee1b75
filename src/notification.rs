use std::fmt;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::NotificationPolicy;
use crate::error::NotificationError;

/// Current grant of the platform notification facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    #[default]
    NotDetermined,
    Granted,
    Denied,
}

impl From<NotificationPolicy> for Permission {
    fn from(policy: NotificationPolicy) -> Self {
        match policy {
            NotificationPolicy::Granted => Permission::Granted,
            NotificationPolicy::Denied => Permission::Denied,
            NotificationPolicy::Prompt => Permission::NotDetermined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(Uuid);

impl NotificationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    /// Replaces an earlier notification with the same tag.
    pub tag: Option<String>,
    /// Ask the platform not to auto-dismiss the notification.
    pub require_interaction: bool,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: NotificationId::new(),
            title: title.into(),
            body: body.into(),
            tag: None,
            require_interaction: false,
        }
    }
}

/// Invoked by the facility when the operator clicks a notification.
pub type ClickCallback = Box<dyn Fn() + Send + Sync>;

/// The platform notification facility.
#[async_trait]
pub trait NotificationFacility: Send + Sync {
    fn permission(&self) -> Permission;

    /// Ask the operator for permission. Errors when notifications are unsupported.
    async fn request_permission(&self) -> Result<Permission, NotificationError>;

    /// Show a notification. Fire-and-forget.
    fn show(&self, notification: Notification, on_click: ClickCallback);

    fn close(&self, id: NotificationId);

    /// Bring the host surface to the foreground.
    fn focus_host(&self);
}

/// Notifications printed to stderr, for terminal sessions.
///
/// Permission follows the configured policy; `prompt` is granted on request. The most
/// recent notification can be clicked with [`ConsoleNotifier::click_latest`].
pub struct ConsoleNotifier {
    permission: Mutex<Permission>,
    latest: Mutex<Option<(NotificationId, ClickCallback)>>,
}

impl ConsoleNotifier {
    pub fn new(policy: NotificationPolicy) -> Self {
        Self {
            permission: Mutex::new(policy.into()),
            latest: Mutex::new(None),
        }
    }

    fn latest(&self) -> MutexGuard<'_, Option<(NotificationId, ClickCallback)>> {
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Click the most recently shown notification that is still open.
    /// Returns `false` if there is none.
    pub fn click_latest(&self) -> bool {
        match self.latest().take() {
            Some((_, on_click)) => {
                on_click();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl NotificationFacility for ConsoleNotifier {
    fn permission(&self) -> Permission {
        *self.permission.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn request_permission(&self) -> Result<Permission, NotificationError> {
        let mut permission = self
            .permission
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *permission == Permission::NotDetermined {
            *permission = Permission::Granted;
        }
        Ok(*permission)
    }

    fn show(&self, notification: Notification, on_click: ClickCallback) {
        info!(
            id = %notification.id,
            title = %notification.title,
            sticky = notification.require_interaction,
            "notification shown"
        );
        eprintln!("[notification] {}: {}", notification.title, notification.body);
        *self.latest() = Some((notification.id, on_click));
    }

    fn close(&self, id: NotificationId) {
        let mut latest = self.latest();
        if latest.as_ref().is_some_and(|(open, _)| *open == id) {
            *latest = None;
            info!(%id, "notification closed");
        }
    }

    fn focus_host(&self) {
        info!("focus requested by notification click");
    }
}
