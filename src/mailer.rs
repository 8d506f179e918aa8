use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{debug, info};

use crate::config::{MailConfig, MailTls, MailType};
use crate::error::DispatchError;
use crate::models::Report;

pub const SUBJECT: &str = "weico service exception notifition";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, report: &Report) -> Result<(), DispatchError>;
}

pub fn render_body(report: &Report) -> String {
    format!(
        "<html><body><div> Service exceptions detected at {}: <br/> {} </div></body></html>",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.failure_lines.join("<br/>")
    )
}

/// Sends reports as a single mail to every configured recipient.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    recipients: Vec<Mailbox>,
    mail_type: MailType,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let sender = Mailbox::new(Some(config.user.clone()), parse_address(&config.user)?);
        let recipients = config
            .recipient_list()
            .iter()
            .map(|r| parse_address(r).map(|address| Mailbox::new(None, address)))
            .collect::<Result<Vec<_>, _>>()?;
        if recipients.is_empty() {
            return Err(DispatchError::NoRecipients.into());
        }

        let (host, port) = config.host_and_port()?;
        let tls = match config.tls {
            MailTls::None => Tls::None,
            MailTls::Opportunistic => Tls::Opportunistic(TlsParameters::new(host.clone())?),
            MailTls::Required => Tls::Required(TlsParameters::new(host.clone())?),
            MailTls::Wrapper => Tls::Wrapper(TlsParameters::new(host.clone())?),
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host.as_str())
            .port(port)
            .tls(tls)
            .credentials(Credentials::new(config.user.clone(), config.password.clone()))
            .timeout(Some(config.timeout()))
            .build();

        info!(
            host = %host,
            port,
            recipients = recipients.len(),
            "SMTP notifier configured"
        );

        Ok(Self {
            transport,
            sender,
            recipients,
            mail_type: config.mail_type,
        })
    }

    pub fn build_message(&self, report: &Report) -> Result<Message, DispatchError> {
        let content_type = match self.mail_type {
            MailType::Html => ContentType::TEXT_HTML,
            MailType::Plain => ContentType::TEXT_PLAIN,
        };

        let mut builder = Message::builder()
            .from(self.sender.clone())
            .subject(SUBJECT)
            .header(content_type);
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }

        let body = render_body(report);
        debug!(%body, "Rendered notification body");
        Ok(builder.body(body)?)
    }
}

#[async_trait]
impl Notifier for SmtpMailer {
    async fn send(&self, report: &Report) -> Result<(), DispatchError> {
        let message = self.build_message(report)?;
        let response = self.transport.send(message).await?;
        debug!(code = %response.code(), "SMTP server accepted notification");
        Ok(())
    }
}

fn parse_address(raw: &str) -> Result<Address, DispatchError> {
    raw.trim().parse().map_err(|source| DispatchError::Address {
        address: raw.to_string(),
        source,
    })
}
