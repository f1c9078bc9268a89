use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use model::{from_settings, to_settings, PluginSettings};
use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, Result};
use crate::Notifier;

const SUBJECT: &str = "New torrent";

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    25
}

/// E-mail notifier settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSettings {
    /// Recipient address.
    pub email: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Upgrade the connection with STARTTLS.
    #[serde(default)]
    pub use_tls: bool,
    /// From address; the recipient when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

/// Mails walk results over SMTP.
pub struct EmailNotifier {
    settings: EmailSettings,
    from: Mailbox,
    to: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub const ALIAS: &'static str = "email";

    pub fn new(settings: EmailSettings) -> Result<Self> {
        if settings.email.is_empty() {
            return Err(NotifyError::Config("email is required".into()));
        }
        let to: Mailbox = settings.email.parse()?;
        let from: Mailbox = match &settings.sender {
            Some(sender) => sender.parse()?,
            None => to.clone(),
        };

        let mut builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        }
        .port(settings.port);
        if let (Some(user), Some(password)) = (&settings.user, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            settings,
            from,
            to,
        })
    }

    pub fn spawn(settings: &PluginSettings) -> Result<Arc<dyn Notifier>> {
        let settings = from_settings(Self::ALIAS, settings).map_err(|e| NotifyError::Config(e.to_string()))?;
        Ok(Arc::new(Self::new(settings)?))
    }

    fn message(&self, text: &str) -> Result<Message> {
        Ok(Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(text.to_string())?)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn alias(&self) -> &str {
        Self::ALIAS
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        tracing::debug!("Mailing notification to {}", self.to);
        self.transport.send(self.message(text)?).await?;
        Ok(())
    }

    async fn test_configuration(&self) -> Result<bool> {
        Ok(self.transport.test_connection().await?)
    }

    fn to_settings(&self) -> PluginSettings {
        to_settings(&self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EmailSettings {
        EmailSettings {
            email: "me@example.org".into(),
            host: default_host(),
            port: default_port(),
            user: None,
            password: None,
            use_tls: false,
            sender: None,
        }
    }

    #[tokio::test]
    async fn test_defaults() {
        let mut table = PluginSettings::new();
        table.insert("email".into(), "me@example.org".into());
        let notifier = EmailNotifier::spawn(&table).unwrap();

        assert_eq!(notifier.alias(), "email");
        let stored = notifier.to_settings();
        assert_eq!(stored.get("host").and_then(|v| v.as_str()), Some("localhost"));
        assert_eq!(stored.get("port").and_then(|v| v.as_integer()), Some(25));
        assert_eq!(stored.get("use_tls").and_then(|v| v.as_bool()), Some(false));
        assert!(!stored.contains_key("password"));
    }

    #[tokio::test]
    async fn test_invalid_addresses() {
        assert!(matches!(
            EmailNotifier::spawn(&PluginSettings::new()),
            Err(NotifyError::Config(_))
        ));
        let bad = EmailSettings {
            email: "not an address".into(),
            ..settings()
        };
        assert!(matches!(EmailNotifier::new(bad), Err(NotifyError::Address(_))));
        let bad_sender = EmailSettings {
            sender: Some("@".into()),
            ..settings()
        };
        assert!(matches!(EmailNotifier::new(bad_sender), Err(NotifyError::Address(_))));
    }

    #[tokio::test]
    async fn test_message() {
        let notifier = EmailNotifier::new(EmailSettings {
            sender: Some("retorrent@example.org".into()),
            ..settings()
        })
        .unwrap();

        let message = notifier.message("The following torrents were updated:\nShow\n").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("From: retorrent@example.org"));
        assert!(raw.contains("To: me@example.org"));
        assert!(raw.contains("Subject: New torrent"));
        assert!(raw.contains("Show"));
    }

    #[tokio::test]
    async fn test_sender_defaults_to_recipient() {
        let notifier = EmailNotifier::new(settings()).unwrap();
        assert_eq!(notifier.from, notifier.to);
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let notifier = EmailNotifier::new(EmailSettings {
            host: "127.0.0.1".into(),
            port: 9,
            ..settings()
        })
        .unwrap();
        assert!(matches!(notifier.test_configuration().await, Err(NotifyError::Smtp(_))));
    }
}
