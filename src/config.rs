/// Runtime configuration.
///
/// Values come from CLI flags, then environment variables (through clap's
/// `env` support), then interactive prompts for whatever is still missing.
use anyhow::{Context, Result};
use rpassword::prompt_password;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::batch::BatchOptions;
use crate::parser::{RoomParser, DEFAULT_COMMAND_PREFIXES};

/// Host prefix of the homeserver in front of the domain.
const MATRIX_HOST: &str = "matrix";

/// Ignored sender used when none is configured.
pub const DEFAULT_IGNORE_USER: &str = "jira_bot";

/// Connection and batching flags shared by all commands.
#[derive(Debug, Clone, clap::Args)]
pub struct ConnectionArgs {
    /// Matrix domain; the homeserver is expected at matrix.<domain>
    #[arg(short, long, env = "MATRIX_DOMAIN")]
    pub domain: Option<String>,

    /// Matrix user name (local part)
    #[arg(short = 'u', long = "username", env = "MATRIX_USERNAME")]
    pub user_name: Option<String>,

    /// Matrix password
    #[arg(short, long, env = "MATRIX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Bot users whose activity does not count (comma or space separated)
    #[arg(long, env = "MROOMS_IGNORE_USERS")]
    pub ignore_users: Option<String>,

    /// Rooms processed concurrently per batch
    #[arg(long, env = "MROOMS_BATCH_SIZE", default_value_t = crate::batch::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Delay before each room operation, in milliseconds
    #[arg(long, env = "MROOMS_DELAY_MS", default_value_t = 500)]
    pub delay_ms: u64,

    /// Timeline events per room fetched by the initial sync
    #[arg(long, env = "MROOMS_EVENTS_COUNT", default_value_t = 50)]
    pub events_count: u32,

    /// Prefix of bot command messages (repeatable)
    #[arg(long = "command-prefix")]
    pub command_prefixes: Vec<String>,

    /// Directory for logs and saved reports
    #[arg(long, env = "MROOMS_DATA_DIR", default_value = ".mrooms")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub domain: String,
    pub user_name: String,
    pub password: String,
    pub ignore_users: Vec<String>,
    pub command_prefixes: Vec<String>,
    pub batch: BatchOptions,
    pub events_count: u32,
    pub data_dir: PathBuf,
}

impl Config {
    /// Builds the configuration, prompting for missing credentials.
    pub fn resolve(args: ConnectionArgs) -> Result<Self> {
        let domain = match args.domain {
            Some(d) if !d.trim().is_empty() => d.trim().to_owned(),
            _ => prompt("What is your matrix domain? ")?.trim().to_owned(),
        };
        let user_name = match args.user_name {
            Some(u) if !u.trim().is_empty() => u.trim().to_owned(),
            _ => prompt("What is your username? ")?.trim().to_owned(),
        };
        let password = match args.password {
            Some(p) if !p.is_empty() => p,
            _ => prompt_password("What is your password? ").context("Failed to read password")?,
        };

        if domain.is_empty() || user_name.is_empty() {
            anyhow::bail!("Domain and username are required");
        }

        Ok(Self {
            domain,
            user_name,
            password,
            ignore_users: args
                .ignore_users
                .map(|s| parse_ignore_users(&s))
                .unwrap_or_else(|| vec![DEFAULT_IGNORE_USER.to_owned()]),
            command_prefixes: if args.command_prefixes.is_empty() {
                DEFAULT_COMMAND_PREFIXES.iter().map(|p| (*p).to_owned()).collect()
            } else {
                args.command_prefixes
            },
            batch: BatchOptions {
                batch_size: args.batch_size,
                delay: Duration::from_millis(args.delay_ms),
            },
            events_count: args.events_count,
            data_dir: args.data_dir,
        })
    }

    /// `matrix.<domain>`
    pub fn matrix_host_name(&self) -> String {
        format!("{}.{}", MATRIX_HOST, self.domain)
    }

    pub fn base_url(&self) -> Result<Url> {
        let raw = format!("https://{}", self.matrix_host_name());
        Url::parse(&raw).with_context(|| format!("Invalid homeserver URL: {}", raw))
    }

    pub fn user_id(&self, name: &str) -> String {
        full_user_id(&self.matrix_host_name(), name)
    }

    pub fn own_user_id(&self) -> String {
        self.user_id(&self.user_name)
    }

    pub fn parser(&self) -> RoomParser {
        RoomParser::new(&self.ignore_users).with_command_prefixes(self.command_prefixes.clone())
    }
}

/// Full user id for a local name on `host`; full ids are returned unchanged.
pub fn full_user_id(host: &str, name: &str) -> String {
    let name = name.trim();
    if name.starts_with('@') && name.contains(':') {
        name.to_owned()
    } else {
        format!("@{}:{}", name.trim_start_matches('@'), host)
    }
}

/// Full alias for the local part of a room alias.
pub fn full_room_alias(host: &str, name: &str) -> String {
    format!("#{}:{}", name.trim().trim_start_matches('#'), host)
}

/// Splits a comma/space separated list of user names.
pub fn parse_ignore_users(input: &str) -> Vec<String> {
    input
        .split([' ', ','])
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Month limits accepted from users: 1 to 12.
pub fn is_valid_months_limit(months: i64) -> bool {
    months > 0 && months < 13
}

pub fn prompt(msg: &str) -> Result<String> {
    eprint!("{}", msg);
    io::stderr().flush().ok();
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input)
}
