use anyhow::Result;
use chrono::{DateTime, Local};
use log::{LevelFilter, Record};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use deskline::messaging::timeline::{day_label, local_timeline, TimelineEntry};
use deskline::models::{Conversation, LifecycleState, Message};

// Logging and terminal rendering helpers for the CLI host.

pub struct SimpleLogger {
    log_file: Option<Mutex<std::fs::File>>,
}

impl SimpleLogger {
    pub fn new(log_file_path: Option<&str>) -> Result<Self> {
        let log_file = match log_file_path {
            Some(path) => Some(Mutex::new(OpenOptions::new().create(true).append(true).open(path)?)),
            None => None,
        };
        Ok(SimpleLogger { log_file })
    }
}

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now: DateTime<Local> = Local::now();
        let line = format!(
            "[{}] {} [{}:{}] {}\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        );

        match &self.log_file {
            Some(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.write_all(line.as_bytes());
                }
            }
            // Only print to stdout if no log file is specified
            None => print!("{}", line),
        }
    }

    fn flush(&self) {
        match &self.log_file {
            Some(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.flush();
                }
            }
            None => {
                let _ = std::io::stdout().flush();
            }
        }
    }
}

pub fn setup_logging(log_file: Option<&str>, level: LevelFilter) -> Result<()> {
    let logger = SimpleLogger::new(log_file)?;
    log::set_boxed_logger(Box::new(logger)).map(|()| log::set_max_level(level))?;

    log::info!("Logging initialized at level: {}", level);
    log::info!("{} version {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    Ok(())
}

fn state_marker(message: &Message) -> &'static str {
    match message.lifecycle_state {
        LifecycleState::Sent => "✓",
        LifecycleState::Delivered => "✓✓",
        LifecycleState::Read => "✓✓ read",
        LifecycleState::Deleting => "deleting…",
        LifecycleState::Deleted => "",
    }
}

/// Print a thread with date separators, wrapping long bodies
pub fn print_thread(messages: &[Message], actor_id: &str, width: usize) {
    let today = Local::now().date_naive();
    for entry in local_timeline(messages) {
        match entry {
            TimelineEntry::DateSeparator(day) => println!("\n──── {} ────", day_label(day, today)),
            TimelineEntry::Message(message) => {
                let who = if message.sender_id == actor_id { "you" } else { "them" };
                let time = message.created_at.with_timezone(&Local).format("%H:%M");
                let mut header = format!("[{}] {} ({})", time, who, message.id);
                if let Some(reply_to) = &message.reply_to_id {
                    header.push_str(&format!(" ↪ {}", reply_to));
                }
                println!("{} {}", header, state_marker(message));
                for line in textwrap::wrap(&message.preview_text(), width.saturating_sub(4).max(20)) {
                    println!("    {}", line);
                }
            }
        }
    }
}

pub fn print_conversations(conversations: &[Conversation]) {
    if conversations.is_empty() {
        println!("No conversations.");
        return;
    }
    for c in conversations {
        let when = c.last_message.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let unread = if c.unread_count > 0 {
            format!(" ({} unread)", c.unread_count)
        } else {
            String::new()
        };
        let preview: String = c.last_message.preview_text().chars().take(60).collect();
        println!("{} <{}> [{}]{}", c.counterpart.display_name, c.counterpart.id, when, unread);
        println!("    {}", preview);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log};

    #[test]
    fn test_logger_targets() {
        assert!(SimpleLogger::new(None).unwrap().log_file.is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deskline.log");
        let logger = SimpleLogger::new(path.to_str()).unwrap();
        log::set_max_level(LevelFilter::Info);
        logger.log(
            &Record::builder()
                .args(format_args!("poll finished"))
                .level(Level::Info)
                .file(Some("unread.rs"))
                .line(Some(7))
                .build(),
        );
        logger.flush();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("INFO [unread.rs:7] poll finished"));
    }
}
