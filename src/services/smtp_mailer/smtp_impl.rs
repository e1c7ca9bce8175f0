use async_trait::async_trait;
use lettre::{
    message::Mailbox,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tracing::info;

use crate::config::SmtpSettings;
use crate::services::smtp_mailer::{MailTemplate, Mailer};

use super::MailError;

#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self, MailError> {
        let sender: Mailbox = settings.from.parse()?;
        let transport = build_transport(settings)?;

        Ok(Self {
            transport: Arc::new(transport),
            sender,
        })
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let recipient: Mailbox = to.parse()?;
        let email = Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(subject)
            .body(body.to_string())?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| e.into())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_template(&self, to: &str, template: &MailTemplate) -> Result<(), MailError> {
        self.send_email(to, &template.subject(), &template.body())
            .await?;
        info!(template = template.name(), "email sent");
        Ok(())
    }
}

fn build_transport(
    settings: &SmtpSettings,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
    let mut builder = if settings.tls_disabled {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host).port(settings.port)
    } else if settings.port == 465 {
        let tls = TlsParameters::new(settings.host.clone())?;
        AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
            .port(settings.port)
            .tls(Tls::Wrapper(tls))
    } else {
        let tls = TlsParameters::new(settings.host.clone())?;
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            .port(settings.port)
            .tls(Tls::Required(tls))
    };

    if let (Some(username), Some(password)) =
        (settings.username.as_ref(), settings.password.as_ref())
    {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }

    Ok(builder.build())
}
