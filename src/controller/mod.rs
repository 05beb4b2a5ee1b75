//! The change-watcher and alert controller.
//!
//! One tokio task owns all watcher state and serializes everything that touches it:
//! snapshots from the document feed, operator commands, permission results and timer
//! expiries all pass through [`AlertController::run`]. Timers are deadlines held in
//! state, so leaving the loop cancels every one of them at once.

mod state;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::audio::{AudioAlert, AudioBackend, AudioSettings};
use crate::config::{TimingConfig, WatchConfig};
use crate::diff::Detection;
use crate::error::{ControlError, NotificationError, StoreError};
use crate::notification::{Notification, NotificationFacility, NotificationId, Permission};
use crate::snapshot::SnapshotEvent;
use crate::store::{BACKGROUND_MODE_KEY, DocumentStore, KeyValueStore, Subscription};

pub use state::{WatcherState, WidgetState};

type ToggleReply = oneshot::Sender<Result<bool, ControlError>>;

enum Command {
    TestSound,
    StopSound,
    ToggleSound,
    ToggleBackground(ToggleReply),
    PermissionResolved(Result<Permission, NotificationError>),
    DismissAlert,
    OpenDetail,
    CloseDetail,
    NotificationClicked(NotificationId),
    Shutdown,
}

/// Platform collaborators handed to the controller.
pub struct Platform {
    pub storage: Box<dyn KeyValueStore>,
    pub notifier: Arc<dyn NotificationFacility>,
    pub audio: Box<dyn AudioBackend>,
}

/// Handle used by the presentation layer to drive and observe a running controller.
///
/// The controller stops when [`ControllerHandle::shutdown`] is called or when every
/// handle has been dropped.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<WidgetState>,
}

impl ControllerHandle {
    fn send(&self, command: Command) -> Result<(), ControlError> {
        self.commands.send(command).map_err(|_| ControlError::Closed)
    }

    /// Ring the audio alert as if a new identifier had arrived.
    pub fn test_sound(&self) -> Result<(), ControlError> {
        self.send(Command::TestSound)
    }

    pub fn stop_sound(&self) -> Result<(), ControlError> {
        self.send(Command::StopSound)
    }

    pub fn toggle_sound_enabled(&self) -> Result<(), ControlError> {
        self.send(Command::ToggleSound)
    }

    /// Flip background mode. Enabling waits for the notification permission request and
    /// fails without changing anything if permission is not granted.
    ///
    /// Returns the new value of background mode.
    pub async fn toggle_background_mode(&self) -> Result<bool, ControlError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::ToggleBackground(reply))?;
        response.await.map_err(|_| ControlError::Closed)?
    }

    /// Clear the new-identifier flag and silence the alert.
    pub fn dismiss_alert(&self) -> Result<(), ControlError> {
        self.send(Command::DismissAlert)
    }

    pub fn open_detail(&self) -> Result<(), ControlError> {
        self.send(Command::OpenDetail)
    }

    pub fn close_detail(&self) -> Result<(), ControlError> {
        self.send(Command::CloseDetail)
    }

    /// Ask the controller to tear down. Does nothing if it already stopped.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    /// The most recently published state.
    pub fn state(&self) -> WidgetState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WidgetState> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&WidgetState) -> bool,
    ) -> Result<WidgetState, ControlError> {
        let mut state = self.state.clone();
        let found = state
            .wait_for(predicate)
            .await
            .map_err(|_| ControlError::Closed)?;
        Ok(found.clone())
    }
}

/// Subscribe to the configured document and start the controller task.
///
/// Must be called from within a tokio runtime. The persisted background-mode flag is
/// read here, so it survives restarts.
pub fn spawn(
    config: &WatchConfig,
    documents: &dyn DocumentStore,
    platform: Platform,
) -> Result<(ControllerHandle, JoinHandle<()>), StoreError> {
    let subscription = documents.subscribe(&config.document_path())?;
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    let background_mode = platform.storage.get(BACKGROUND_MODE_KEY).as_deref() == Some("true");
    let initial = WidgetState {
        background_mode,
        permission: platform.notifier.permission(),
        ..WidgetState::default()
    };
    let (view_tx, view_rx) = watch::channel(initial);

    info!(
        document = %subscription.path(),
        field = %config.field,
        background_mode,
        "watcher started"
    );

    let controller = AlertController {
        subscription,
        field: config.field.clone(),
        timing: config.timing.clone(),
        watcher: WatcherState::new(),
        audio: AudioAlert::new(platform.audio, AudioSettings::from(config)),
        storage: platform.storage,
        notifier: platform.notifier,
        commands: commands_rx,
        loopback: commands_tx.downgrade(),
        view: view_tx,
        sound_enabled: true,
        background_mode,
        detail_open: false,
        loading: true,
        error: None,
        feed_open: true,
        alert_clear_at: None,
        open_notifications: Vec::new(),
        permission_request: None,
    };
    let task = tokio::spawn(controller.run());

    Ok((
        ControllerHandle {
            commands: commands_tx,
            state: view_rx,
        },
        task,
    ))
}

struct PendingToggle {
    reply: ToggleReply,
    task: JoinHandle<()>,
}

struct AlertController {
    subscription: Subscription,
    field: String,
    timing: TimingConfig,
    watcher: WatcherState,
    audio: AudioAlert,
    storage: Box<dyn KeyValueStore>,
    notifier: Arc<dyn NotificationFacility>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Weak so that dropping every handle still ends the loop.
    loopback: mpsc::WeakUnboundedSender<Command>,
    view: watch::Sender<WidgetState>,
    sound_enabled: bool,
    background_mode: bool,
    detail_open: bool,
    loading: bool,
    error: Option<String>,
    feed_open: bool,
    alert_clear_at: Option<Instant>,
    open_notifications: Vec<(NotificationId, Instant)>,
    permission_request: Option<PendingToggle>,
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl AlertController {
    async fn run(mut self) {
        loop {
            let deadline = self.next_deadline();
            let feed_open = self.feed_open;
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = self.subscription.next(), if feed_open => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        warn!(document = %self.subscription.path(), "snapshot feed closed");
                        self.feed_open = false;
                    }
                },
                () = sleep_until_deadline(deadline) => self.handle_timers(Instant::now()),
            }
            self.publish();
        }
        self.teardown();
    }

    fn next_deadline(&self) -> Option<Instant> {
        let notifications = self.open_notifications.iter().map(|(_, at)| *at).min();
        [self.audio.next_deadline(), self.alert_clear_at, notifications]
            .into_iter()
            .flatten()
            .min()
    }

    fn handle_event(&mut self, event: SnapshotEvent) {
        self.loading = false;
        match event {
            SnapshotEvent::Snapshot(snapshot) => {
                self.error = None;
                let identifiers = snapshot.identifiers(&self.field);
                if identifiers.is_none() {
                    debug!(field = %self.field, "document absent or identifier field malformed");
                }
                if let Some(detection) = self.watcher.apply(identifiers) {
                    self.on_detected(detection);
                }
                if self.watcher.pending_alert().is_none() {
                    self.alert_clear_at = None;
                }
            }
            SnapshotEvent::Error(err) => {
                warn!(%err, "snapshot listener error");
                self.error = Some(err.to_string());
            }
        }
    }

    fn on_detected(&mut self, detection: Detection) {
        let now = Instant::now();
        info!(
            identifier = %detection.latest,
            new = detection.new_count,
            total = self.watcher.current().len(),
            alerts = self.watcher.alert_count(),
            "new identifier detected"
        );

        self.ring(now);
        if self.background_mode && self.notifier.permission() == Permission::Granted {
            self.show_alert_notification(&detection.latest, now);
        }
        self.alert_clear_at = Some(now + self.timing.alert_clear());
    }

    fn ring(&mut self, now: Instant) {
        if self.sound_enabled {
            self.audio.start(now);
        }
    }

    fn show_alert_notification(&mut self, identifier: &str, now: Instant) {
        let mut notification =
            Notification::new("New registration", format!("Identifier: {identifier}"));
        notification.tag = Some(format!("new-identifier-{identifier}"));
        notification.require_interaction = true;

        let id = notification.id;
        let loopback = self.loopback.clone();
        self.notifier.show(
            notification,
            Box::new(move || {
                if let Some(commands) = loopback.upgrade() {
                    let _ = commands.send(Command::NotificationClicked(id));
                }
            }),
        );
        self.open_notifications
            .push((id, now + self.timing.notification_close()));
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::TestSound => self.ring(Instant::now()),
            Command::StopSound => self.audio.stop(),
            Command::ToggleSound => {
                self.sound_enabled = !self.sound_enabled;
                info!(enabled = self.sound_enabled, "sound alerts toggled");
            }
            Command::ToggleBackground(reply) => self.toggle_background(reply),
            Command::PermissionResolved(result) => self.finish_enable(result),
            Command::DismissAlert => {
                self.watcher.clear_pending();
                self.alert_clear_at = None;
                self.audio.stop();
            }
            Command::OpenDetail => self.detail_open = true,
            Command::CloseDetail => self.detail_open = false,
            Command::NotificationClicked(id) => self.notification_clicked(id),
            Command::Shutdown => {}
        }
    }

    fn toggle_background(&mut self, reply: ToggleReply) {
        if self.permission_request.is_some() {
            let _ = reply.send(Err(ControlError::Busy));
            return;
        }

        if self.background_mode {
            if let Err(err) = self.storage.set(BACKGROUND_MODE_KEY, "false") {
                warn!(%err, "failed to persist background mode");
            }
            self.background_mode = false;
            info!("background mode disabled");
            if self.notifier.permission() == Permission::Granted {
                self.notifier.show(
                    Notification::new(
                        "Background monitoring stopped",
                        "New registrations will no longer raise notifications.",
                    ),
                    Box::new(|| {}),
                );
            }
            let _ = reply.send(Ok(false));
            return;
        }

        // The request may wait on the operator; its answer comes back through the queue.
        let notifier = Arc::clone(&self.notifier);
        let loopback = self.loopback.clone();
        let task = tokio::spawn(async move {
            let result = notifier.request_permission().await;
            if let Some(commands) = loopback.upgrade() {
                let _ = commands.send(Command::PermissionResolved(result));
            }
        });
        self.permission_request = Some(PendingToggle { reply, task });
    }

    fn finish_enable(&mut self, result: Result<Permission, NotificationError>) {
        let Some(pending) = self.permission_request.take() else {
            return;
        };
        let outcome = match result {
            Ok(Permission::Granted) => self.enable_background(),
            Ok(permission) => {
                info!(?permission, "background mode not enabled");
                Err(ControlError::PermissionDenied)
            }
            Err(NotificationError::Unsupported(reason)) => {
                warn!(%reason, "notification permission unavailable");
                Err(ControlError::NotificationsUnsupported(reason))
            }
        };
        let _ = pending.reply.send(outcome);
    }

    fn enable_background(&mut self) -> Result<bool, ControlError> {
        self.storage
            .set(BACKGROUND_MODE_KEY, "true")
            .map_err(|err| ControlError::Persist(err.to_string()))?;
        self.background_mode = true;
        info!("background mode enabled");
        self.notifier.show(
            Notification::new(
                "Background monitoring enabled",
                "You will be notified when new identifiers register.",
            ),
            Box::new(|| {}),
        );
        Ok(true)
    }

    fn notification_clicked(&mut self, id: NotificationId) {
        debug!(%id, "notification clicked");
        self.notifier.focus_host();
        self.detail_open = true;
        if let Some(pos) = self.open_notifications.iter().position(|(open, _)| *open == id) {
            self.open_notifications.remove(pos);
            self.notifier.close(id);
        }
    }

    fn handle_timers(&mut self, now: Instant) {
        self.audio.advance(now);

        if self.alert_clear_at.is_some_and(|at| at <= now) {
            self.alert_clear_at = None;
            if let Some(identifier) = self.watcher.clear_pending() {
                debug!(%identifier, "new-identifier flag expired");
            }
        }

        let notifier = &self.notifier;
        self.open_notifications.retain(|(id, at)| {
            if *at <= now {
                notifier.close(*id);
                false
            } else {
                true
            }
        });
    }

    fn publish(&self) {
        let next = WidgetState {
            identifiers: self.watcher.current().to_vec(),
            pending_alert: self.watcher.pending_alert().map(str::to_owned),
            alert_count: self.watcher.alert_count(),
            sound_enabled: self.sound_enabled,
            background_mode: self.background_mode,
            permission: self.notifier.permission(),
            ringing: self.audio.is_ringing(),
            detail_open: self.detail_open,
            loading: self.loading,
            error: self.error.clone(),
        };
        self.view.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    /// Release the feed, silence audio, and drop every pending timer and request.
    fn teardown(&mut self) {
        self.subscription.release();
        self.audio.stop();
        if let Some(pending) = self.permission_request.take() {
            pending.task.abort();
            let _ = pending.reply.send(Err(ControlError::Closed));
        }
        for (id, _) in self.open_notifications.drain(..) {
            self.notifier.close(id);
        }
        self.alert_clear_at = None;
        self.publish();
        info!(document = %self.subscription.path(), "watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::audio::tests::{AudioLog, FakeAudio};
    use crate::notification::ClickCallback;
    use crate::snapshot::{DocumentPath, Snapshot};
    use crate::store::{MemoryDocumentStore, MemoryKeyValueStore};

    #[derive(Default)]
    struct NotifierLog {
        shown: Vec<Notification>,
        closed: Vec<NotificationId>,
        focused: usize,
        callbacks: HashMap<NotificationId, ClickCallback>,
    }

    struct FakeNotifier {
        permission: Mutex<Permission>,
        answer: Result<Permission, NotificationError>,
        log: Mutex<NotifierLog>,
    }

    impl FakeNotifier {
        fn new(permission: Permission, answer: Result<Permission, NotificationError>) -> Arc<Self> {
            Arc::new(Self {
                permission: Mutex::new(permission),
                answer,
                log: Mutex::default(),
            })
        }

        fn shown(&self) -> Vec<Notification> {
            self.log.lock().unwrap().shown.clone()
        }

        fn closed(&self) -> Vec<NotificationId> {
            self.log.lock().unwrap().closed.clone()
        }

        fn click(&self, id: NotificationId) {
            let callback = self.log.lock().unwrap().callbacks.remove(&id);
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    #[async_trait]
    impl NotificationFacility for FakeNotifier {
        fn permission(&self) -> Permission {
            *self.permission.lock().unwrap()
        }

        async fn request_permission(&self) -> Result<Permission, NotificationError> {
            if let Ok(permission) = &self.answer {
                *self.permission.lock().unwrap() = *permission;
            }
            self.answer.clone()
        }

        fn show(&self, notification: Notification, on_click: ClickCallback) {
            let mut log = self.log.lock().unwrap();
            log.callbacks.insert(notification.id, on_click);
            log.shown.push(notification);
        }

        fn close(&self, id: NotificationId) {
            self.log.lock().unwrap().closed.push(id);
        }

        fn focus_host(&self) {
            self.log.lock().unwrap().focused += 1;
        }
    }

    struct Harness {
        store: MemoryDocumentStore,
        kv: MemoryKeyValueStore,
        notifier: Arc<FakeNotifier>,
        audio: Arc<Mutex<AudioLog>>,
        handle: ControllerHandle,
        task: JoinHandle<()>,
        path: DocumentPath,
    }

    impl Harness {
        async fn start(initial: &[&str]) -> Self {
            Self::start_with(
                initial,
                FakeNotifier::new(Permission::NotDetermined, Ok(Permission::Granted)),
                MemoryKeyValueStore::new(),
            )
            .await
        }

        async fn start_with(
            initial: &[&str],
            notifier: Arc<FakeNotifier>,
            kv: MemoryKeyValueStore,
        ) -> Self {
            let config = WatchConfig::default();
            let path = config.document_path();
            let store = MemoryDocumentStore::new();
            if !initial.is_empty() {
                store.publish_identifiers(&path, &config.field, initial);
            }

            let fake = FakeAudio::new(true);
            let audio = Arc::clone(&fake.log);
            let platform = Platform {
                storage: Box::new(kv.clone()),
                notifier: notifier.clone(),
                audio: Box::new(fake),
            };
            let (handle, task) = spawn(&config, &store, platform).unwrap();
            handle.wait_for(|s| !s.loading).await.unwrap();

            Self {
                store,
                kv,
                notifier,
                audio,
                handle,
                task,
                path,
            }
        }

        async fn publish(&self, identifiers: &[&str]) -> WidgetState {
            self.store.publish_identifiers(&self.path, "uids", identifiers);
            let expected: Vec<String> = identifiers.iter().map(|s| s.to_string()).collect();
            self.handle
                .wait_for(|s| s.identifiers == expected)
                .await
                .unwrap()
        }

        /// Wait until every command sent so far has been processed.
        async fn settle(&self) {
            self.handle.open_detail().unwrap();
            self.handle.wait_for(|s| s.detail_open).await.unwrap();
            self.handle.close_detail().unwrap();
            self.handle.wait_for(|s| !s.detail_open).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_first_snapshot_does_not_alert() {
        let h = Harness::start(&["a", "b"]).await;
        let state = h.handle.state();
        assert_eq!(state.identifiers, ["a", "b"]);
        assert_eq!(state.alert_count, 0);
        assert_eq!(state.pending_alert, None);
        assert!(!state.ringing);
        assert_eq!(h.audio.lock().unwrap().opened, 0);
    }

    #[tokio::test]
    async fn test_growth_raises_one_alert() {
        let h = Harness::start(&["a", "b"]).await;
        let state = h.publish(&["a", "b", "c"]).await;
        assert_eq!(state.pending_alert.as_deref(), Some("c"));
        assert_eq!(state.alert_count, 1);
        assert!(state.ringing);
        assert_eq!(h.audio.lock().unwrap().opened, 1);
    }

    #[tokio::test]
    async fn test_same_length_change_does_not_alert() {
        let h = Harness::start(&["a", "b"]).await;
        let state = h.publish(&["a", "c"]).await;
        assert_eq!(state.alert_count, 0);
        assert_eq!(state.pending_alert, None);
        assert!(!state.ringing);
    }

    #[tokio::test]
    async fn test_batch_of_new_identifiers_counts_once() {
        let h = Harness::start(&["a"]).await;
        let state = h.publish(&["a", "b", "c"]).await;
        assert_eq!(state.pending_alert.as_deref(), Some("c"));
        assert_eq!(state.alert_count, 1);
    }

    #[tokio::test]
    async fn test_empty_document_then_growth_does_not_alert() {
        let h = Harness::start(&[]).await;
        assert!(h.handle.state().identifiers.is_empty());
        let state = h.publish(&["a", "b"]).await;
        assert_eq!(state.alert_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flag_clears_after_window() {
        let h = Harness::start(&["a"]).await;
        h.publish(&["a", "b"]).await;

        tokio::time::sleep(Duration::from_secs(24)).await;
        let state = h.handle.state();
        assert_eq!(state.pending_alert.as_deref(), Some("b"));
        assert!(!state.ringing, "audio stops at its own ceiling");
        assert_eq!(h.audio.lock().unwrap().live_tones(), 0);

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        let state = h.handle.state();
        assert_eq!(state.pending_alert, None);
        assert_eq!(state.alert_count, 1);
    }

    #[tokio::test]
    async fn test_dismiss_clears_flag_and_silences() {
        let h = Harness::start(&["a"]).await;
        h.publish(&["a", "b"]).await;
        h.handle.dismiss_alert().unwrap();
        let state = h
            .handle
            .wait_for(|s| s.pending_alert.is_none())
            .await
            .unwrap();
        assert!(!state.ringing);
        assert_eq!(h.audio.lock().unwrap().live_tones(), 0);
    }

    #[tokio::test]
    async fn test_sound_restart_keeps_one_tone() {
        let h = Harness::start(&["a"]).await;
        h.handle.test_sound().unwrap();
        h.handle.test_sound().unwrap();
        h.settle().await;
        {
            let log = h.audio.lock().unwrap();
            assert_eq!(log.opened, 2);
            assert_eq!(log.live_tones(), 1);
        }
        assert!(h.handle.state().ringing);

        h.handle.stop_sound().unwrap();
        h.handle.wait_for(|s| !s.ringing).await.unwrap();
        h.handle.stop_sound().unwrap();
        h.settle().await;
        assert_eq!(h.audio.lock().unwrap().live_tones(), 0);
    }

    #[tokio::test]
    async fn test_sound_disabled_still_flags() {
        let h = Harness::start(&["a"]).await;
        h.handle.toggle_sound_enabled().unwrap();
        h.handle.wait_for(|s| !s.sound_enabled).await.unwrap();

        let state = h.publish(&["a", "b"]).await;
        assert_eq!(state.pending_alert.as_deref(), Some("b"));
        assert!(!state.ringing);
        assert_eq!(h.audio.lock().unwrap().opened, 0);
    }

    #[tokio::test]
    async fn test_background_denied_changes_nothing() {
        let notifier = FakeNotifier::new(Permission::NotDetermined, Ok(Permission::Denied));
        let h = Harness::start_with(&["a"], notifier, MemoryKeyValueStore::new()).await;

        let result = h.handle.toggle_background_mode().await;
        assert_eq!(result, Err(ControlError::PermissionDenied));
        h.settle().await;
        assert!(!h.handle.state().background_mode);
        assert_eq!(h.kv.get(BACKGROUND_MODE_KEY), None);
        assert!(h.notifier.shown().is_empty());
    }

    #[tokio::test]
    async fn test_background_unsupported_reports_reason() {
        let notifier = FakeNotifier::new(
            Permission::NotDetermined,
            Err(NotificationError::Unsupported("no notification api".into())),
        );
        let h = Harness::start_with(&["a"], notifier, MemoryKeyValueStore::new()).await;

        let result = h.handle.toggle_background_mode().await;
        assert_eq!(
            result,
            Err(ControlError::NotificationsUnsupported("no notification api".into()))
        );
        assert_eq!(h.kv.get(BACKGROUND_MODE_KEY), None);

        // In-app alerting is unaffected.
        let state = h.publish(&["a", "b"]).await;
        assert!(state.ringing);
    }

    #[tokio::test]
    async fn test_background_enable_notify_disable() {
        let h = Harness::start(&["a"]).await;

        assert_eq!(h.handle.toggle_background_mode().await, Ok(true));
        assert_eq!(h.kv.get(BACKGROUND_MODE_KEY).as_deref(), Some("true"));
        let state = h.handle.wait_for(|s| s.background_mode).await.unwrap();
        assert_eq!(state.permission, Permission::Granted);
        assert_eq!(h.notifier.shown().len(), 1, "one confirmation");

        h.publish(&["a", "b"]).await;
        let shown = h.notifier.shown();
        assert_eq!(shown.len(), 2);
        assert!(shown[1].body.contains('b'));
        assert!(shown[1].require_interaction);

        assert_eq!(h.handle.toggle_background_mode().await, Ok(false));
        assert_eq!(h.kv.get(BACKGROUND_MODE_KEY).as_deref(), Some("false"));
        assert_eq!(h.notifier.shown().len(), 3, "one stopped notice");

        h.publish(&["a", "b", "c"]).await;
        assert_eq!(h.notifier.shown().len(), 3);
    }

    #[tokio::test]
    async fn test_persisted_background_mode_is_read_back() {
        let mut kv = MemoryKeyValueStore::new();
        kv.set(BACKGROUND_MODE_KEY, "true").unwrap();
        let notifier = FakeNotifier::new(Permission::Granted, Ok(Permission::Granted));
        let h = Harness::start_with(&["a"], notifier, kv).await;

        assert!(h.handle.state().background_mode);
        h.publish(&["a", "b"]).await;
        assert_eq!(h.notifier.shown().len(), 1);
    }

    #[tokio::test]
    async fn test_other_stored_values_mean_disabled() {
        let mut kv = MemoryKeyValueStore::new();
        kv.set(BACKGROUND_MODE_KEY, "yes").unwrap();
        let notifier = FakeNotifier::new(Permission::Granted, Ok(Permission::Granted));
        let h = Harness::start_with(&["a"], notifier, kv).await;
        assert!(!h.handle.state().background_mode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_notification_closes_after_ten_seconds() {
        let mut kv = MemoryKeyValueStore::new();
        kv.set(BACKGROUND_MODE_KEY, "true").unwrap();
        let notifier = FakeNotifier::new(Permission::Granted, Ok(Permission::Granted));
        let h = Harness::start_with(&["a"], notifier, kv).await;

        h.publish(&["a", "b"]).await;
        let id = h.notifier.shown()[0].id;

        tokio::time::sleep(Duration::from_millis(9_990)).await;
        assert!(h.notifier.closed().is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.notifier.closed(), vec![id]);
    }

    #[tokio::test]
    async fn test_notification_click_opens_detail() {
        let mut kv = MemoryKeyValueStore::new();
        kv.set(BACKGROUND_MODE_KEY, "true").unwrap();
        let notifier = FakeNotifier::new(Permission::Granted, Ok(Permission::Granted));
        let h = Harness::start_with(&["a"], notifier, kv).await;

        h.publish(&["a", "b"]).await;
        let id = h.notifier.shown()[0].id;
        h.notifier.click(id);

        h.handle.wait_for(|s| s.detail_open).await.unwrap();
        assert_eq!(h.notifier.log.lock().unwrap().focused, 1);
        assert_eq!(h.notifier.closed(), vec![id]);
    }

    #[tokio::test]
    async fn test_subscription_error_is_observable_and_recoverable() {
        let h = Harness::start(&["a"]).await;
        h.store.publish_error(&h.path, "permission-denied");
        let state = h.handle.wait_for(|s| s.error.is_some()).await.unwrap();
        assert!(state.error.unwrap().contains("permission-denied"));
        assert_eq!(state.identifiers, ["a"]);

        let state = h.publish(&["a", "b"]).await;
        assert_eq!(state.error, None);
        assert_eq!(state.alert_count, 1);
    }

    #[tokio::test]
    async fn test_malformed_snapshot_publishes_empty_list() {
        let h = Harness::start(&["a"]).await;
        let mut fields = serde_json::Map::new();
        fields.insert("uids".into(), serde_json::json!("not-a-list"));
        h.store.publish(&h.path, Snapshot::Exists(fields));
        let state = h
            .handle
            .wait_for(|s| s.identifiers.is_empty())
            .await
            .unwrap();
        assert_eq!(state.alert_count, 0);

        h.store.publish(&h.path, Snapshot::Absent);
        let state = h.publish(&["a", "b"]).await;
        assert_eq!(state.alert_count, 1, "diffed against the last valid list");
    }

    #[tokio::test]
    async fn test_shutdown_releases_feed_once_and_silences() {
        let h = Harness::start(&["a"]).await;
        h.publish(&["a", "b"]).await;
        assert_eq!(h.store.subscriber_count(&h.path), 1);

        h.handle.shutdown();
        h.handle.shutdown();
        h.task.await.unwrap();

        assert_eq!(h.store.subscriber_count(&h.path), 0);
        assert_eq!(h.store.release_count(), 1);
        assert_eq!(h.audio.lock().unwrap().live_tones(), 0);
        assert!(!h.handle.state().ringing);
        assert_eq!(h.handle.test_sound(), Err(ControlError::Closed));
    }

    #[tokio::test]
    async fn test_dropping_every_handle_stops_controller() {
        let h = Harness::start(&["a"]).await;
        let Harness {
            store,
            handle,
            task,
            path,
            ..
        } = h;
        drop(handle);
        task.await.unwrap();
        assert_eq!(store.subscriber_count(&path), 0);
    }
}
