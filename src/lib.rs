pub mod args;
pub mod config;
pub mod email;
pub mod error;
pub mod logging;
pub mod templates;
pub mod token;
pub mod transport;

// Re-export commonly used items
pub use args::Args;
pub use config::{Config, ConfigError, Environment};
pub use email::{Mailer, SendRequest};
pub use error::MailError;
pub use templates::{CompiledTemplate, Context, TemplateLoader};
pub use token::{Claims, TokenSigner};
pub use transport::{ConsoleTransport, Envelope, MailTransport, SendResult, SmtpTransportClient};
