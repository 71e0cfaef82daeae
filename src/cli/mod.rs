//! CLI commands for Duesbot using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{load_settings, Settings};
use crate::digest::DigestOutcome;
use crate::dispatch::{dispatch_text, Invocation};
use crate::ops::Operations;
use crate::store::Store;

/// Duesbot - membership dues and task tracking for Telegram groups.
#[derive(Parser)]
#[command(name = "duesbot")]
#[command(version)]
#[command(about = "Duesbot - membership dues and task tracker bot", long_about = None)]
pub struct Commands {
    /// Settings file (default: ~/.duesbot/settings.json)
    #[arg(long, global = true, env = "DUESBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overriding settings
    #[arg(long, global = true, env = "DATABASE_PATH")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the Telegram bot and daily digest
    Run,

    /// Create the database schema and exit
    InitDb,

    /// Send the daily digest once, now
    Digest,

    /// Run a chat command locally against the database
    Exec {
        /// Command text, e.g. "/register Alice yes"
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

impl Commands {
    pub async fn run(&self) -> Result<()> {
        let settings = self.settings()?;
        match &self.command {
            Command::Run => cmd_run(&settings).await,
            Command::InitDb => cmd_init_db(&settings),
            Command::Digest => cmd_digest(&settings).await,
            Command::Exec { text } => cmd_exec(&settings, &text.join(" ")).await,
        }
    }

    fn settings(&self) -> Result<Settings> {
        let mut settings = load_settings(self.config.as_deref())?;
        if let Some(path) = &self.database {
            settings.database.path = Some(path.clone());
        }
        Ok(settings)
    }
}

// Command implementations

async fn cmd_run(settings: &Settings) -> Result<()> {
    crate::telegram::run_bot_daemon(settings).await?;
    Ok(())
}

fn cmd_init_db(settings: &Settings) -> Result<()> {
    let store = Store::open(settings.database_path()?)?;
    println!("Database ready at {}", store.path().display());
    Ok(())
}

async fn cmd_digest(settings: &Settings) -> Result<()> {
    match crate::telegram::send_digest_now(settings).await? {
        DigestOutcome::NotConfigured => {
            println!("No task channel configured. Use /taskchannel in the target chat.")
        }
        DigestOutcome::Unavailable => println!("Task channel could not be reached. See logs."),
        DigestOutcome::Sent { tasks } => println!("Digest sent ({} active tasks).", tasks),
    }
    Ok(())
}

/// Local commands run as an administrator, outside any chat.
async fn cmd_exec(settings: &Settings, text: &str) -> Result<()> {
    let store = Store::open(settings.database_path()?)?;
    let ops = Operations::new(store, settings.clear_timeout());
    let invocation = Invocation {
        sender: 0,
        chat: None,
        elevated: true,
    };

    match dispatch_text(&ops, &invocation, text, None, None).await? {
        Some(reply) => println!("{}", reply.to_plain()),
        None => anyhow::bail!("Not a command: {:?}. Commands start with /", text),
    }
    Ok(())
}
