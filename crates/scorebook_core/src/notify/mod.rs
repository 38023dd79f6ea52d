//! Best-effort user notifications for score changes.
//!
//! # Responsibility
//! - Define the core-facing `Notifier` contract (infallible, non-blocking).
//! - Decouple delivery from score writes through a background dispatcher.
//!
//! # Invariants
//! - `Notifier::notify` never fails and never waits for delivery.
//! - Delivery failures are logged at the dispatcher and never reach callers.

mod dispatcher;

pub use dispatcher::{
    DeliveryError, LogNotificationSink, Notification, NotificationDispatcher, NotificationSink,
};

use std::sync::Arc;

/// Fire-and-forget notification entry point used by the score service.
pub trait Notifier {
    fn notify(&self, user_id: &str, message: &str);
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn notify(&self, user_id: &str, message: &str) {
        (**self).notify(user_id, message);
    }
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify(&self, user_id: &str, message: &str) {
        (**self).notify(user_id, message);
    }
}
