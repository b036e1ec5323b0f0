#![deny(dead_code)] // DO NOT REMOVE THIS EVER
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mod utils;

use deskline::config::{self, ClientConfig};
use deskline::messaging::{
    AttachmentFile, AttachmentPipeline, Category, ConversationDirectory, ReplyCoordinator, Signal, Signals,
    ThreadStore, UnreadTracker,
};
use deskline::models::Actor;
use deskline::transport::HttpTransport;

/// Command line arguments for deskline
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "deskline: talk to the course administrators from the terminal.",
    long_about = "deskline is a command-line client for the learning platform's admin messaging.\n\n\
    Configuration is read from the per-user config directory (see `deskline init`).\n\
    DESKLINE_BASE_URL and DESKLINE_TOKEN override the stored values."
)]
struct Args {
    /// Use this config file instead of the per-user one
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store server address, token and identity
    Init {
        #[arg(long)]
        base_url: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// The account is an administrator
        #[arg(long)]
        admin: bool,
    },
    /// List conversations
    Conversations {
        #[arg(long, default_value = "")]
        search: String,
        /// all, unread or recent
        #[arg(long, default_value = "all")]
        category: Category,
    },
    /// List every user an administrator can message
    Users,
    /// Show the conversation with a counterpart
    History {
        counterpart: String,
        /// Extra pages of older history to fetch
        #[arg(long, default_value_t = 0)]
        older: u32,
        /// Mark incoming messages as read
        #[arg(long)]
        mark_read: bool,
    },
    /// Send a message and/or a file
    Send {
        counterpart: String,
        #[arg(short, long)]
        message: Option<String>,
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        #[arg(long, value_name = "MESSAGE_ID")]
        reply_to: Option<String>,
    },
    /// Delete one of the messages in a conversation
    Delete { counterpart: String, message_id: String },
    /// Edit a message
    Edit { message_id: String, text: String },
    /// Keep polling the unread count until Ctrl-C
    Watch,
}

fn report_signal(signal: Signal) {
    match signal {
        Signal::UnreadCountChanged(count) => println!("Unread messages: {}", count),
        Signal::ConversationSelected(id) => debug!("Conversation {} selected", id),
        Signal::MutationFailed { operation, message } => eprintln!("! {} failed: {}", operation, message),
    }
}

fn drain_signals(rx: &mut mpsc::Receiver<Signal>) {
    while let Ok(signal) = rx.try_recv() {
        report_signal(signal);
    }
}

fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.parse().ok())
        .unwrap_or(80)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    utils::setup_logging(args.log_file.as_deref().and_then(|p| p.to_str()), level)?;

    if let Some(path) = &args.config {
        config::set_config_path_override(path.clone());
        info!("Config path overridden to: {}", path.display());
    }

    if let Command::Init { base_url, token, id, name, email, admin } = &args.command {
        let actor = Actor {
            id: id.clone(),
            display_name: name.clone(),
            email: email.clone(),
            is_privileged: *admin,
            avatar_ref: None,
        };
        let mut config = ClientConfig::new(base_url, actor);
        config.set_token(token);
        config::save_config(&config)?;
        println!("Saved configuration for {}", email);
        return Ok(());
    }

    let config = config::load_config()?
        .ok_or_else(|| anyhow!("No configuration found, run `deskline init` first"))?;
    let actor = config.actor.clone();
    let transport = Arc::new(HttpTransport::new(&config)?);
    let (signals, mut signal_rx) = Signals::channel(64);

    let directory = ConversationDirectory::new(transport.clone(), actor.clone(), signals.clone());
    let thread = ThreadStore::new(transport.clone(), actor.clone(), config.page_size, signals.clone());

    let outcome = match args.command {
        Command::Init { .. } => Ok(()),
        Command::Conversations { search, category } => {
            directory.refresh().await?;
            let shown = directory.filter(&search, category).await;
            utils::print_conversations(&shown);
            println!("\nTotal unread: {}", directory.aggregate_unread().await);
            Ok(())
        }
        Command::Users => {
            for user in directory.list_all_counterparts().await? {
                println!("{} <{}> {}", user.display_name, user.email, user.id);
            }
            Ok(())
        }
        Command::History { counterpart, older, mark_read } => {
            directory.select(&counterpart).await;
            thread.load(&counterpart).await?;
            for _ in 0..older {
                if thread.load_older().await? == 0 {
                    break;
                }
            }
            if let Some(peer) = thread.counterpart().await {
                println!("Conversation with {} <{}>", peer.display_name, peer.email);
            }
            utils::print_thread(&thread.messages().await, &actor.id, terminal_width());
            if mark_read {
                let marked = thread.mark_conversation_read().await;
                println!("\nMarked {} message(s) read", marked);
            }
            Ok(())
        }
        Command::Send { counterpart, message, file, reply_to } => {
            thread.load(&counterpart).await?;

            let mut attachments = AttachmentPipeline::new();
            if let Some(path) = file {
                let file = AttachmentFile::from_path(&path).await?;
                attachments.select_file(file)?;
            }

            let mut reply = ReplyCoordinator::new();
            if let Some(target_id) = reply_to {
                let target = thread
                    .message(&target_id)
                    .await
                    .ok_or_else(|| anyhow!("Message {} is not in this conversation", target_id))?;
                reply.select(&target, &actor.id)?;
            }

            thread
                .send_composed(message, &mut attachments, &mut reply)
                .await
                .map(|sent| println!("Sent message {}", sent.id))
        }
        Command::Delete { counterpart, message_id } => {
            thread.load(&counterpart).await?;
            thread
                .delete(&message_id)
                .await
                .map(|()| println!("Deleted message {}", message_id))
        }
        Command::Edit { message_id, text } => ReplyCoordinator::new().edit(&message_id, &text),
        Command::Watch => {
            let mut tracker = UnreadTracker::new(
                directory.clone(),
                Duration::from_secs(config.poll_interval_secs),
                signals.clone(),
            );
            tracker.activate();
            println!("Watching for unread messages, Ctrl-C to stop");
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    Some(signal) = signal_rx.recv() => report_signal(signal),
                }
            }
            tracker.deactivate().await;
            Ok(())
        }
    };

    drain_signals(&mut signal_rx);
    outcome?;
    Ok(())
}
