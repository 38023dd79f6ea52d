//! Background notification dispatcher.
//!
//! One worker thread drains a channel of queued notifications into a
//! `NotificationSink`. Enqueueing is the only work done on the caller's
//! thread.

use super::Notifier;
use crate::model::now_epoch_ms;
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use uuid::Uuid;

const WORKER_THREAD_NAME: &str = "scorebook-notify";

/// One queued message for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Correlates enqueue and delivery log lines.
    pub id: Uuid,
    pub user_id: String,
    pub message: String,
    /// Epoch milliseconds at enqueue time.
    pub queued_at: i64,
}

impl Notification {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            message: message.into(),
            queued_at: now_epoch_ms(),
        }
    }
}

/// Delivery failure reported by a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError(pub String);

impl Display for DeliveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification delivery failed: {}", self.0)
    }
}

impl Error for DeliveryError {}

/// Transport that actually delivers a notification (push, mail, queue...).
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Sink that records deliveries in the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            "event=notify_deliver module=notify status=ok sink=log notification_id={} user_id={} message_chars={}",
            notification.id,
            notification.user_id,
            notification.message.chars().count()
        );
        Ok(())
    }
}

/// Queue plus worker thread in front of a `NotificationSink`.
///
/// Dropping the dispatcher closes the queue and waits for already queued
/// notifications to drain.
pub struct NotificationDispatcher {
    sender: Option<Sender<Notification>>,
    worker: Option<JoinHandle<()>>,
}

impl NotificationDispatcher {
    /// Starts the worker thread.
    ///
    /// # Errors
    /// - Returns an error when the OS refuses to spawn the thread.
    pub fn spawn(sink: Arc<dyn NotificationSink>) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(sink.as_ref(), receiver))?;
        info!("event=notify_start module=notify status=ok thread={WORKER_THREAD_NAME}");

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Closes the queue and waits until pending notifications are handled.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("event=notify_stop module=notify status=error error_code=worker_panicked");
            } else {
                info!("event=notify_stop module=notify status=ok");
            }
        }
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl Notifier for NotificationDispatcher {
    fn notify(&self, user_id: &str, message: &str) {
        let notification = Notification::new(user_id, message);
        let id = notification.id;
        let Some(sender) = self.sender.as_ref() else {
            warn!("event=notify_enqueue module=notify status=error notification_id={id} error_code=dispatcher_closed");
            return;
        };

        match sender.send(notification) {
            Ok(()) => debug!("event=notify_enqueue module=notify status=ok notification_id={id}"),
            Err(_) => warn!(
                "event=notify_enqueue module=notify status=error notification_id={id} error_code=worker_gone"
            ),
        }
    }
}

fn run_worker(sink: &dyn NotificationSink, receiver: Receiver<Notification>) {
    for notification in receiver {
        let queue_ms = now_epoch_ms().saturating_sub(notification.queued_at);
        let started_at = Instant::now();
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(&notification)));
        let duration_ms = started_at.elapsed().as_millis();
        match delivered {
            Ok(Ok(())) => debug!(
                "event=notify_dispatch module=notify status=ok notification_id={} queue_ms={} duration_ms={}",
                notification.id, queue_ms, duration_ms
            ),
            Ok(Err(err)) => warn!(
                "event=notify_dispatch module=notify status=error notification_id={} queue_ms={} duration_ms={} error_code=delivery_failed error={}",
                notification.id, queue_ms, duration_ms, err
            ),
            Err(_) => error!(
                "event=notify_dispatch module=notify status=error notification_id={} queue_ms={} duration_ms={} error_code=sink_panicked",
                notification.id, queue_ms, duration_ms
            ),
        }
    }
}
