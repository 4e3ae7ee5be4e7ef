//! Notification Dispatcher: state-change fan-out and the deadline sweep.

pub mod deadlines;
pub mod dispatcher;

pub use dispatcher::{Notification, NotificationDispatcher, NotificationKind};
