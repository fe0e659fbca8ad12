use anyhow::{Context as _, anyhow};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use storefront_mailer::args::{Command, SendArgs, TemplateArgs, TokenArgs};
use storefront_mailer::email::parse_mailbox;
use storefront_mailer::{
    Args, Claims, Config, ConsoleTransport, MailTransport, Mailer, SendRequest,
    SmtpTransportClient, TemplateLoader, TokenSigner, logging,
};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(?config, "Configuration loaded");

    match run(args.command, &config).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Command failed: {:#}", e);
            eprintln!("{}", config.environment.public_message(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &Config) -> anyhow::Result<String> {
    match command {
        Command::Send(send) => send_email(send, config).await,
        Command::Render(template) => render_template(template, config).await,
        Command::Token(token) => sign_token(token, config),
    }
}

async fn send_email(args: SendArgs, config: &Config) -> anyhow::Result<String> {
    let transport: Arc<dyn MailTransport> = if args.console {
        Arc::new(ConsoleTransport)
    } else {
        let smtp = config
            .smtp
            .as_ref()
            .ok_or_else(|| anyhow!("EMAIL_HOST is not set; pass --console to log instead"))?;
        Arc::new(SmtpTransportClient::connect(smtp)?)
    };

    let mailer = build_mailer(config, transport)?;
    let context = args.template.build_context()?;
    let request = SendRequest::new(args.to, args.subject, args.template.template, context);

    let result = mailer.send(request).await?;
    Ok(result.message_id)
}

async fn render_template(args: TemplateArgs, config: &Config) -> anyhow::Result<String> {
    let mailer = build_mailer(config, Arc::new(ConsoleTransport))?;
    let context = args.build_context()?;
    Ok(mailer.render(&args.template, &context).await?)
}

fn sign_token(args: TokenArgs, config: &Config) -> anyhow::Result<String> {
    let signer = TokenSigner::new(&config.jwt_secret)?;
    let claims = Claims::new(args.subject, Duration::from_secs(args.ttl_secs));
    Ok(signer.sign(&claims)?)
}

fn build_mailer(config: &Config, transport: Arc<dyn MailTransport>) -> anyhow::Result<Mailer> {
    let from = parse_mailbox(&config.mail_from).context("EMAIL_FROM is not a valid address")?;
    let loader = if config.template_cache {
        TemplateLoader::with_cache(&config.templates_dir)
    } else {
        TemplateLoader::new(&config.templates_dir)
    };
    Ok(Mailer::new(from, loader, transport))
}
