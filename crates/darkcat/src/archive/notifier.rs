//! Telling requesters their bundle is ready.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::info;

use crate::config::SmtpConfig;
use crate::error::NotifyError;

pub const SUBJECT: &str = "Your archive is ready";

/// A ready-bundle notice for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub download_url: String,
}

impl Notification {
    /// Plain-text body; the download URL is the only URL in it.
    pub fn body(&self) -> String {
        format!("Download your archive at {}\r\n", self.download_url)
    }
}

pub trait Notifier: Send + Sync {
    /// Delivers the notification. `Ok` means the message was accepted for
    /// delivery.
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Sends notifications through an SMTP relay with STARTTLS.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.from)?;

        let mut builder = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(config.port)
            .timeout(Some(config.timeout()));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN);

        for recipient in &notification.recipients {
            builder = builder.to(parse_mailbox(recipient)?);
        }

        builder
            .body(notification.body())
            .map_err(|e| NotifyError::Message(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse::<Mailbox>().map_err(|e| NotifyError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

impl Notifier for SmtpNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.build_message(notification)?;
        self.transport
            .send(&message)
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        info!(
            "Notified {} recipient(s) of {}",
            notification.recipients.len(),
            notification.download_url
        );
        Ok(())
    }
}
