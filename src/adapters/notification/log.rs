use crate::ports::notification::{Error, Notification, NotificationPort};

/// Notifier that only writes the message to the log
///
/// Used where no mail relay is configured. Delivery is synchronous, so nothing
/// is queued in memory and nothing is lost on restart.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl NotificationPort for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), Error> {
        if !notification.recipient.contains('@') {
            return Err(Error::InvalidRecipient(notification.recipient));
        }

        tracing::info!(
            recipient = %notification.recipient,
            template = notification.template.name(),
            "notification sent: {:?}",
            notification.template
        );
        Ok(())
    }
}
