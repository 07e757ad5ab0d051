//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde_json::Value;

use tether_core::{Document, Notification, NotificationEvent};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print the result of a raw query
    pub fn print_result(&self, result: &Value) {
        match self.format {
            OutputFormat::Human => println!("{}", pretty(result)),
            OutputFormat::Json => println!("{}", result),
            OutputFormat::Quiet => {
                if let Some(id) = result.get("_id").and_then(Value::as_str) {
                    println!("{}", id);
                }
            }
        }
    }

    /// Print one page of documents
    pub fn print_documents(&self, documents: &[Document]) {
        match self.format {
            OutputFormat::Human => {
                for document in documents {
                    let source = Value::Object(document.source.clone()).to_string();
                    println!("{} | {}", truncate(&document.id, 24), truncate(&source, 70));
                }
            }
            OutputFormat::Json => {
                for document in documents {
                    println!("{}", serde_json::json!({ "_id": document.id, "_source": document.source }));
                }
            }
            OutputFormat::Quiet => {
                for document in documents {
                    println!("{}", document.id);
                }
            }
        }
    }

    /// Print the totals after a search
    pub fn print_search_summary(&self, fetched: u64, total: u64) {
        if self.format == OutputFormat::Human {
            println!("\n{} of {} document(s)", fetched, total);
        }
    }

    /// Print a realtime notification
    pub fn print_notification(&self, notification: &Notification) {
        let id = notification.result.id.as_deref().unwrap_or("-");
        match self.format {
            OutputFormat::Human => {
                let event = match notification.event {
                    NotificationEvent::Write => "write",
                    NotificationEvent::Delete => "delete",
                    NotificationEvent::Publish => "publish",
                    NotificationEvent::Other => "other",
                };
                let source = notification
                    .result
                    .source
                    .as_ref()
                    .map(|s| truncate(&Value::Object(s.clone()).to_string(), 60))
                    .unwrap_or_default();
                println!("{:<8} {} {}", event, id, source);
            }
            OutputFormat::Json => match serde_json::to_string(notification) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("Could not encode notification: {}", e),
            },
            OutputFormat::Quiet => println!("{}", id),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
