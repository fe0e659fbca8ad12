use crate::templates::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a template and deliver it
    Send(SendArgs),

    /// Render a template and print the HTML without sending it
    Render(TemplateArgs),

    /// Print a signed token for a subject
    Token(TokenArgs),
}

#[derive(ClapArgs, Debug)]
pub struct SendArgs {
    /// Email address of the recipient
    #[arg(short = 't', long)]
    pub to: String,

    /// Subject line
    #[arg(short, long)]
    pub subject: String,

    #[command(flatten)]
    pub template: TemplateArgs,

    /// Log the message instead of delivering it over SMTP
    #[arg(long)]
    pub console: bool,
}

#[derive(ClapArgs, Debug)]
pub struct TemplateArgs {
    /// Template name, resolved as <TEMPLATES_DIR>/<name>.hbs
    #[arg(long)]
    pub template: String,

    /// Context value as key=value (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// JSON file with a context object; --var entries override its keys
    #[arg(long, value_name = "FILE")]
    pub context: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct TokenArgs {
    /// Subject the token is issued for
    #[arg(long)]
    pub subject: String,

    /// Lifetime in seconds
    #[arg(long, default_value_t = 3600)]
    pub ttl_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Could not read context file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in context file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Context file {0} must contain a JSON object")]
    NotAnObject(PathBuf),
}

impl TemplateArgs {
    pub fn build_context(&self) -> Result<Context, ContextError> {
        let mut context = match &self.context {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ContextError::Read {
                    path: path.clone(),
                    source,
                })?;
                let value: Value =
                    serde_json::from_str(&raw).map_err(|source| ContextError::Json {
                        path: path.clone(),
                        source,
                    })?;
                match value {
                    Value::Object(map) => map,
                    _ => return Err(ContextError::NotAnObject(path.clone())),
                }
            }
            None => Context::new(),
        };

        for (key, value) in &self.vars {
            context.insert(key.clone(), Value::String(value.clone()));
        }
        Ok(context)
    }
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
