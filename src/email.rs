use crate::error::{MailError, Result};
use crate::templates::{Context, TemplateLoader};
use crate::transport::{Envelope, MailTransport, SendResult};
use lettre::message::Mailbox;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub context: Context,
}

impl SendRequest {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        template: impl Into<String>,
        context: Context,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            template: template.into(),
            context,
        }
    }
}

/// Renders templated messages and delivers them through a transport.
pub struct Mailer {
    from: Mailbox,
    loader: TemplateLoader,
    transport: Arc<dyn MailTransport>,
}

impl Mailer {
    pub fn new(from: Mailbox, loader: TemplateLoader, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            from,
            loader,
            transport,
        }
    }

    pub fn from_address(&self) -> &Mailbox {
        &self.from
    }

    /// Renders `template` against `context` without sending anything.
    pub async fn render(&self, template: &str, context: &Context) -> Result<String> {
        let compiled = self.loader.load(template).await?;
        compiled.render(context)
    }

    /// One delivery attempt. Failures are logged here and returned as-is.
    #[tracing::instrument(
        name = "send_email",
        skip(self, request),
        fields(template = %request.template, to_domain = recipient_domain(&request.to))
    )]
    pub async fn send(&self, request: SendRequest) -> Result<SendResult> {
        match self.dispatch(request).await {
            Ok(result) => {
                tracing::info!(message_id = %result.message_id, "Email sent successfully");
                Ok(result)
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not send email");
                Err(e)
            }
        }
    }

    async fn dispatch(&self, request: SendRequest) -> Result<SendResult> {
        let to = parse_mailbox(&request.to)?;
        let html = self.render(&request.template, &request.context).await?;

        let envelope = Envelope {
            from: self.from.clone(),
            to,
            subject: request.subject,
            html,
        };

        self.transport.send(&envelope).await
    }
}

/// Domain part of an address, for logs that should not carry the mailbox.
pub fn recipient_domain(address: &str) -> &str {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim().trim_end_matches('>'))
        .unwrap_or("")
}

pub fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
            address: address.to_string(),
            message: e.to_string(),
        })
}
