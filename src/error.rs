use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Template '{name}' not found")]
    TemplateNotFound { name: String },

    #[error("Template '{name}' failed to compile: {message}")]
    TemplateCompile { name: String, message: String },

    #[error("Template '{name}' failed to render: {message}")]
    TemplateRender { name: String, message: String },

    #[error("Could not read template '{name}': {source}")]
    TemplateIo {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid email address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Failed to build email: {message}")]
    MessageBuild { message: String },

    #[error("SMTP authentication failed: {message}")]
    TransportAuth { message: String },

    #[error("SMTP connection failed: {message}")]
    TransportNetwork { message: String },

    #[error("SMTP server rejected the message: {message}")]
    TransportRejected { message: String },
}

impl MailError {
    pub fn is_template_error(&self) -> bool {
        matches!(
            self,
            MailError::TemplateNotFound { .. }
                | MailError::TemplateCompile { .. }
                | MailError::TemplateRender { .. }
                | MailError::TemplateIo { .. }
        )
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            MailError::TransportAuth { .. }
                | MailError::TransportNetwork { .. }
                | MailError::TransportRejected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MailError>;
