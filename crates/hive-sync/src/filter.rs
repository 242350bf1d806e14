use hive_storage::{Notification, NotificationSettings};

/// Whether a notification should be stored for its recipient.
///
/// Categories follow the recipient's toggles. Join and system messages always
/// persist, and a user with no settings record gets everything.
pub fn should_persist(
    notification: &Notification,
    settings: Option<&NotificationSettings>,
) -> bool {
    match (notification.kind.category(), settings) {
        (Some(category), Some(settings)) => settings.is_enabled(category),
        _ => true,
    }
}
