//! Configuration module

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Marketplace backend configuration
#[derive(Debug, Parser)]
#[command(name = "marketplace", about = "Marketplace backend", long_about = None)]
pub struct Config {
    /// `PostgreSQL` connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Maximum number of pooled database connections
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", global = true, default_value_t = 10)]
    pub database_max_connections: u32,

    /// Address the HTTP server binds to
    #[arg(long, env = "BIND_ADDR", global = true, default_value = "0.0.0.0:8083")]
    pub bind_addr: String,

    /// Secret used to sign access and refresh tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Access token lifetime in minutes
    #[arg(long, env = "ACCESS_TOKEN_MINUTES", global = true, default_value_t = 60_000)]
    pub access_token_minutes: i64,

    /// Refresh token lifetime in days
    #[arg(long, env = "REFRESH_TOKEN_DAYS", global = true, default_value_t = 100)]
    pub refresh_token_days: i64,

    /// NATS server; tasks run in-process when unset
    #[arg(long, env = "NATS_URL", global = true)]
    pub nats_url: Option<String>,

    /// Public base URL used in emailed links
    #[arg(long, env = "BACKEND_URL", global = true, default_value = "http://localhost:8083")]
    pub backend_url: String,

    /// Sender address of outgoing mail
    #[arg(long, env = "EMAIL_FROM", global = true, default_value = "noreply@localhost")]
    pub email_from: String,

    /// SMTP relay; emails are only logged when unset
    #[arg(long, env = "SMTP_HOST", global = true)]
    pub smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", global = true, default_value_t = 587)]
    pub smtp_port: u16,

    #[arg(long, env = "SMTP_USERNAME", global = true)]
    pub smtp_username: Option<String>,

    #[arg(long, env = "SMTP_PASSWORD", global = true, hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// Directory for uploaded and exported price lists
    #[arg(long, env = "DATA_DIR", global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Consume tasks from NATS
    Worker,
    /// Import a partner price list
    LoadCatalog {
        file: PathBuf,
        /// Owner of the shop if the import creates it
        #[arg(long)]
        uploader: Option<i64>,
    },
    /// Write the whole catalog to a file
    ExportCatalog { file: PathBuf },
    /// Create an active admin account
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

impl Config {
    /// Load configuration from the environment, `.env` and CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub fn load() -> Result<Self, clap::Error> {
        _ = dotenvy::dotenv();

        Self::try_parse()
    }

    #[must_use]
    pub fn command(&self) -> Command { self.command.clone().unwrap_or(Command::Serve) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, clap::Error> {
        let required = ["marketplace", "--database-url", "postgres://localhost/db", "--jwt-secret", "secret"];
        Config::try_parse_from(required.iter().chain(args))
    }

    #[test]
    fn serve_is_the_default_command() {
        let config = parse(&[]).unwrap();

        assert_eq!(config.command(), Command::Serve);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn load_catalog_takes_a_file_and_uploader() {
        let config = parse(&["load-catalog", "shop1.json", "--uploader", "4"]).unwrap();

        assert_eq!(config.command(), Command::LoadCatalog { file: "shop1.json".into(), uploader: Some(4) });
    }

    #[test]
    fn required_settings_come_before_the_subcommand() {
        let config = parse(&["export-catalog", "out.json"]).unwrap();

        assert_eq!(config.database_url, "postgres://localhost/db");
        assert_eq!(config.jwt_secret, "secret");
        assert_eq!(config.command(), Command::ExportCatalog { file: "out.json".into() });
    }

    #[test]
    fn create_superuser_requires_credentials() {
        assert!(parse(&["create-superuser", "--email", "a@example.com"]).is_err());
    }
}
