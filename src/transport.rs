use crate::config::SmtpConfig;
use crate::error::{MailError, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// A fully composed message, ready for delivery.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: Mailbox,
    pub to: Mailbox,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub message_id: String,
}

/// Hands a composed message to a delivery provider.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<SendResult>;
}

/// `<uuid@domain>` where the domain is taken from the sender.
pub fn generate_message_id(from: &Mailbox) -> String {
    format!("<{}@{}>", uuid::Uuid::new_v4(), from.email.domain())
}

pub struct SmtpTransportClient {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransportClient {
    /// Builds the transport once. No connection is opened until the first send.
    pub fn connect(config: &SmtpConfig) -> Result<Self> {
        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(network_error)?
        } else {
            let tls = TlsParameters::new(config.host.clone()).map_err(network_error)?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .tls(Tls::Opportunistic(tls))
        };

        let mut builder = builder.port(config.port).timeout(config.timeout);
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            secure = config.secure,
            "SMTP transport configured"
        );

        Ok(Self {
            mailer: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpTransportClient {
    async fn send(&self, envelope: &Envelope) -> Result<SendResult> {
        let message_id = generate_message_id(&envelope.from);

        let email = Message::builder()
            .from(envelope.from.clone())
            .to(envelope.to.clone())
            .subject(envelope.subject.clone())
            .message_id(Some(message_id.clone()))
            .header(header::ContentType::TEXT_HTML)
            .body(envelope.html.clone())
            .map_err(|e| MailError::MessageBuild {
                message: e.to_string(),
            })?;

        match self.mailer.send(email).await {
            Ok(response) => {
                tracing::debug!(code = %response.code(), "SMTP server accepted message");
                Ok(SendResult { message_id })
            }
            Err(e) => {
                tracing::debug!(error = ?e, "SMTP send failed");
                Err(classify_smtp_error(&e))
            }
        }
    }
}

/// Logs the message instead of delivering it. Used for local development.
#[derive(Debug, Default)]
pub struct ConsoleTransport;

#[async_trait]
impl MailTransport for ConsoleTransport {
    async fn send(&self, envelope: &Envelope) -> Result<SendResult> {
        let message_id = generate_message_id(&envelope.from);
        tracing::info!(
            message_id = %message_id,
            from = %envelope.from,
            to = %envelope.to,
            subject = %envelope.subject,
            "console transport: email not delivered\n{}",
            envelope.html
        );
        Ok(SendResult { message_id })
    }
}

fn classify_smtp_error(err: &lettre::transport::smtp::Error) -> MailError {
    let message = err.to_string();
    let code = err.status().map(|code| code.to_string());

    if code.as_deref().is_some_and(is_auth_code) || (err.is_client() && is_auth_failure(&message))
    {
        MailError::TransportAuth { message }
    } else if err.is_permanent() {
        MailError::TransportRejected { message }
    } else {
        MailError::TransportNetwork { message }
    }
}

fn network_error(err: lettre::transport::smtp::Error) -> MailError {
    MailError::TransportNetwork {
        message: err.to_string(),
    }
}

fn is_auth_code(code: &str) -> bool {
    matches!(code, "454" | "530" | "534" | "535")
}

fn is_auth_failure(message: &str) -> bool {
    message.to_ascii_lowercase().contains("authentication")
}
