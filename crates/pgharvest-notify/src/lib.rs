//! Failure notifications for harvest runs.

pub mod notification;
pub mod smtp;

pub use notification::{DisabledNotifier, Notification, Notifier, notify_best_effort};
pub use smtp::SmtpNotifier;

use pgharvest_core::{Credentials, NotifySettings, Result};

/// Build the notifier described by `settings`.
pub fn build_notifier(
    settings: &NotifySettings,
    credentials: Option<Credentials>,
) -> Result<Box<dyn Notifier>> {
    if !settings.enabled {
        return Ok(Box::new(DisabledNotifier));
    }
    Ok(Box::new(SmtpNotifier::from_settings(settings, credentials)?))
}
