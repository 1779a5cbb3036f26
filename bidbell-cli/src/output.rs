use bidbell::{Notification, SessionStatus, Snapshot, StoreChange, StoreView};
#[cfg(feature = "colored-output")]
use colored::Colorize;
use serde_json::json;

use crate::cli::OutputFormat;

#[derive(Clone, Copy)]
enum Color {
    Green,
    Yellow,
    Cyan,
    Red,
    Dim,
}

/// Renders notifications, store changes and session status.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    format: OutputFormat,
    colored: bool,
}

impl Printer {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn notifications(&self, snapshot: &Snapshot) -> String {
        match self.format {
            OutputFormat::Json => json!({
                "unreadCount": snapshot.unread_count,
                "notifications": snapshot.notifications,
            })
            .to_string(),
            OutputFormat::Pretty => {
                if snapshot.notifications.is_empty() {
                    return self.paint("No notifications", Color::Dim, false);
                }
                let mut out = self.paint(
                    &format!("{} unread", snapshot.unread_count),
                    Color::Green,
                    true,
                );
                for n in &snapshot.notifications {
                    out.push('\n');
                    out.push_str(&self.notification_line(n));
                }
                out
            }
        }
    }

    pub fn change(&self, change: &StoreChange, view: &StoreView<'_>) -> String {
        match self.format {
            OutputFormat::Json => json!({
                "event": "store",
                "change": change,
                "unreadCount": view.unread_count,
            })
            .to_string(),
            OutputFormat::Pretty => {
                let detail = match change {
                    StoreChange::Added { id } | StoreChange::Updated { id } => view
                        .items
                        .iter()
                        .find(|n| &n.id == id)
                        .map(|n| self.notification_line(n))
                        .unwrap_or_else(|| id.clone()),
                    StoreChange::SnapshotLoaded { count } => format!("loaded {count} notifications"),
                    StoreChange::MarkedRead { id } => format!("{id} marked read"),
                    StoreChange::MarkedAllRead => "all marked read".to_string(),
                    StoreChange::Removed { id } => format!("{id} removed"),
                    StoreChange::UnreadCountSet { count } => format!("server unread count {count}"),
                };
                format!(
                    "{} {}",
                    self.paint(&format!("[{} unread]", view.unread_count), Color::Yellow, true),
                    detail
                )
            }
        }
    }

    pub fn status(&self, status: &SessionStatus) -> String {
        match self.format {
            OutputFormat::Json => json!({ "event": "status", "status": status }).to_string(),
            OutputFormat::Pretty => {
                let color = if status.is_permanently_disconnected() {
                    Color::Red
                } else {
                    Color::Dim
                };
                self.paint(
                    &format!("-- {} (connection {})", status.state, status.connection),
                    color,
                    false,
                )
            }
        }
    }

    pub fn confirmation(&self, action: &str, id: Option<&str>) -> String {
        match self.format {
            OutputFormat::Json => json!({ "status": "ok", "action": action, "id": id }).to_string(),
            OutputFormat::Pretty => {
                let subject = id.map(|id| format!(" {id}")).unwrap_or_default();
                format!("{} {action}{subject}", self.paint("✓", Color::Green, true))
            }
        }
    }

    pub fn error(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => json!({ "status": "error", "message": message }).to_string(),
            OutputFormat::Pretty => format!("{} {message}", self.paint("Error:", Color::Red, true)),
        }
    }

    fn notification_line(&self, n: &Notification) -> String {
        let marker = if n.is_read {
            self.paint(" ", Color::Dim, false)
        } else {
            self.paint("●", Color::Cyan, true)
        };
        format!(
            "{marker} {} {} {} {}",
            self.paint(&n.created_at.format("%Y-%m-%d %H:%M").to_string(), Color::Dim, false),
            self.paint(n.kind.as_str(), Color::Yellow, false),
            n.title,
            self.paint(&format!("({})", n.id), Color::Dim, false),
        )
    }

    fn paint(&self, text: &str, color: Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let painted = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Cyan => text.cyan(),
                    Color::Red => text.red(),
                    Color::Dim => text.dimmed(),
                };
                return if bold {
                    painted.bold().to_string()
                } else {
                    painted.to_string()
                };
            }
        }

        #[cfg(not(feature = "colored-output"))]
        let _ = (color, bold);

        text.to_string()
    }
}
