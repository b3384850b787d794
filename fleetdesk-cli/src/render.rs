//! Plain-text rendering for terminal output.

use std::fmt::Write as _;

use client::store::StoredMessage;
use shared::models::{ConversationSummary, Direction, Profile};

pub fn message_line(stored: &StoredMessage) -> String {
    let marker = match stored.direction {
        Direction::Sent => '>',
        Direction::Received => '<',
    };
    let sender = if stored.message.sender_name.is_empty() {
        "unknown"
    } else {
        stored.message.sender_name.as_str()
    };
    format!(
        "{marker} [{}] {sender}: {}",
        stored.message.sent_at.display_short(),
        stored.message.content
    )
}

pub fn summary_line(summary: &ConversationSummary) -> String {
    let mut line = format!("{:>8}  {}", summary.id.as_str(), summary.title);
    if summary.unread_count > 0 {
        let _ = write!(line, " ({} unread)", summary.unread_count);
    }
    if let Some(at) = summary.last_activity_at {
        let _ = write!(line, "  {}", at.display_short());
    }
    if !summary.last_message.is_empty() {
        let _ = write!(line, "\n          {}", preview(&summary.last_message, 60));
    }
    line
}

pub fn profile_summary(profile: &Profile) -> String {
    let mut out = format!("Signed in as {}\n", profile.email);
    let _ = writeln!(out, "display name: {}", profile.display_name);
    let _ = writeln!(out, "role: {}", profile.role);
    if let Some(id) = &profile.id {
        let _ = writeln!(out, "id: {id}");
    }
    out
}

fn preview(text: &str, max_chars: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
