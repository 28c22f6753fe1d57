use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::RwLock;

use crate::errors::{ReminderError, ReminderResult};

/// Action id the platform reports when the user taps "done" on a reminder.
pub const DONE_ACTION_ID: &str = "done";

pub type Payload = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub id: String,
    pub fire_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledNotification {
    pub id: String,
    pub fire_at: DateTime<Utc>,
}

/// A user response to a delivered notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEvent {
    pub action_id: String,
    pub notification_id: String,
    pub payload: Payload,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn on_action(&self, event: ActionEvent);
}

/// Timestamp-triggered local notifications.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    /// Schedules or replaces the notification with `request.id`.
    async fn schedule(&self, request: NotificationRequest) -> ReminderResult<()>;
    /// No-op for unknown ids.
    async fn cancel(&self, id: &str) -> ReminderResult<()>;
    async fn list_scheduled(&self) -> ReminderResult<Vec<ScheduledNotification>>;
    /// Installs the single receiver for live user actions.
    async fn set_action_handler(&self, handler: Arc<dyn ActionHandler>);
    /// The response that launched the app, replayed on cold start.
    async fn last_action(&self) -> ReminderResult<Option<ActionEvent>>;
}

#[async_trait]
impl<T: NotificationPlatform + ?Sized> NotificationPlatform for Arc<T> {
    async fn schedule(&self, request: NotificationRequest) -> ReminderResult<()> {
        (**self).schedule(request).await
    }

    async fn cancel(&self, id: &str) -> ReminderResult<()> {
        (**self).cancel(id).await
    }

    async fn list_scheduled(&self) -> ReminderResult<Vec<ScheduledNotification>> {
        (**self).list_scheduled().await
    }

    async fn set_action_handler(&self, handler: Arc<dyn ActionHandler>) {
        (**self).set_action_handler(handler).await
    }

    async fn last_action(&self) -> ReminderResult<Option<ActionEvent>> {
        (**self).last_action().await
    }
}

/// In-process platform that keeps pending notifications in memory.
///
/// Backs headless hosts and tests. Ids registered through
/// [`MemoryPlatform::reject_ids_containing`] fail to schedule or cancel.
#[derive(Default)]
pub struct MemoryPlatform {
    pending: RwLock<BTreeMap<String, NotificationRequest>>,
    handler: RwLock<Option<Arc<dyn ActionHandler>>>,
    last_action: RwLock<Option<ActionEvent>>,
    rejected: RwLock<HashSet<String>>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pending(&self) -> Vec<NotificationRequest> {
        self.pending.read().await.values().cloned().collect()
    }

    pub async fn pending_ids(&self) -> Vec<String> {
        self.pending.read().await.keys().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<NotificationRequest> {
        self.pending.read().await.get(id).cloned()
    }

    pub async fn reject_ids_containing(&self, fragment: impl Into<String>) {
        self.rejected.write().await.insert(fragment.into());
    }

    pub async fn accept_all(&self) {
        self.rejected.write().await.clear();
    }

    pub async fn has_handler(&self) -> bool {
        self.handler.read().await.is_some()
    }

    /// Records `event` as the launch response and forwards it to the live handler.
    pub async fn deliver_action(&self, event: ActionEvent) {
        *self.last_action.write().await = Some(event.clone());
        let handler = self.handler.read().await.clone();
        match handler {
            Some(handler) => handler.on_action(event).await,
            None => debug!("no action handler registered, {} kept for replay", event.notification_id),
        }
    }

    async fn check_accepted(&self, id: &str) -> ReminderResult<()> {
        let rejected = self.rejected.read().await;
        if rejected.iter().any(|fragment| id.contains(fragment.as_str())) {
            return Err(ReminderError::PlatformSchedule(format!(
                "platform rejected notification {id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationPlatform for MemoryPlatform {
    async fn schedule(&self, request: NotificationRequest) -> ReminderResult<()> {
        self.check_accepted(&request.id).await?;
        self.pending.write().await.insert(request.id.clone(), request);
        Ok(())
    }

    async fn cancel(&self, id: &str) -> ReminderResult<()> {
        self.check_accepted(id).await?;
        self.pending.write().await.remove(id);
        Ok(())
    }

    async fn list_scheduled(&self) -> ReminderResult<Vec<ScheduledNotification>> {
        Ok(self
            .pending
            .read()
            .await
            .values()
            .map(|request| ScheduledNotification {
                id: request.id.clone(),
                fire_at: request.fire_at,
            })
            .collect())
    }

    async fn set_action_handler(&self, handler: Arc<dyn ActionHandler>) {
        *self.handler.write().await = Some(handler);
    }

    async fn last_action(&self) -> ReminderResult<Option<ActionEvent>> {
        Ok(self.last_action.read().await.clone())
    }
}
