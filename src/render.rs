//! Reply texts, record summaries and inline keyboards.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::callback::{AdminsAction, BackupAction, CallbackAction, MenuTarget};
use crate::channels::traits::{Button, Keyboard, OutboundMessage};
use crate::store::Subscription;

pub const DENIED: &str = "Access denied.";
pub const UNSUPPORTED: &str = "Unsupported action.";
pub const INVALID_ARGUMENT: &str = "Invalid argument.";
pub const INTERNAL_ERROR: &str = "Something went wrong. Please try again.";

pub const PROMPT_DESCRIPTION: &str = "Send the subscription description.";
pub const PROMPT_DATE: &str =
    "Send the purchase date (YYYY-MM-DD or DD/MM/YYYY). /cancel to abort.";
pub const REPROMPT_DESCRIPTION: &str = "Description cannot be empty. Send the description.";
pub const REPROMPT_DATE: &str =
    "Could not read that date. Use YYYY-MM-DD or DD/MM/YYYY, or /cancel.";
pub const PROMPT_OPERATOR_ADD: &str = "Send the numeric chat id of the operator to add.";
pub const PROMPT_OPERATOR_REMOVE: &str = "Send the numeric chat id of the operator to remove.";
pub const REPROMPT_OPERATOR_ID: &str = "The id must be a number. Try again or /cancel.";
pub const CANCELLED: &str = "Cancelled.";
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";

pub const NO_ACTIVE: &str = "No active subscriptions.";
pub const NO_EXPIRED: &str = "No expired subscriptions.";
pub const NO_MATCHES: &str = "No matching subscriptions.";

fn button(label: &str, action: CallbackAction) -> Button {
    Button::new(label, action.token())
}

fn back_row() -> Vec<Button> {
    vec![button("« Back", CallbackAction::Menu(MenuTarget::Home))]
}

/// Instant rendered in the operator timezone.
pub fn local_time(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

pub fn main_menu() -> OutboundMessage {
    let keyboard = Keyboard {
        rows: vec![
            vec![
                button("➕ Add", CallbackAction::Menu(MenuTarget::Add)),
                button("📋 Active", CallbackAction::Menu(MenuTarget::List)),
            ],
            vec![
                button("⌛ Expired", CallbackAction::Menu(MenuTarget::Expired)),
                button("📤 Export CSV", CallbackAction::Menu(MenuTarget::Export)),
            ],
            vec![
                button("👤 Operators", CallbackAction::Menu(MenuTarget::Admins)),
                button("💾 Backup", CallbackAction::Menu(MenuTarget::Backup)),
            ],
        ],
    };
    OutboundMessage::with_keyboard("Subscription manager. Choose an action:", keyboard)
}

pub fn admins_menu(ids: &[i64]) -> OutboundMessage {
    let keyboard = Keyboard {
        rows: vec![
            vec![
                button("List", CallbackAction::Admins(AdminsAction::List)),
                button("Add", CallbackAction::Admins(AdminsAction::Add)),
                button("Remove", CallbackAction::Admins(AdminsAction::Remove)),
            ],
            back_row(),
        ],
    };
    OutboundMessage::with_keyboard(
        format!("Operators: {}", ids.len()),
        keyboard,
    )
}

pub fn admins_list(ids: &[i64]) -> String {
    if ids.is_empty() {
        return "No operators registered.".to_owned();
    }
    let lines: Vec<String> = ids.iter().map(|id| format!("• {id}")).collect();
    format!("Operators:\n{}", lines.join("\n"))
}

pub fn backup_menu(enabled: bool, interval_hours: u32) -> OutboundMessage {
    let status = if enabled {
        format!("Automatic backup: every {interval_hours}h")
    } else {
        "Automatic backup: off".to_owned()
    };
    let on = |hours: u32| {
        button(
            &format!("Every {hours}h"),
            CallbackAction::Backup(BackupAction::On { hours }),
        )
    };
    let keyboard = Keyboard {
        rows: vec![
            vec![button("Back up now", CallbackAction::Backup(BackupAction::Now))],
            vec![on(6), on(12), on(24)],
            vec![button("Turn off", CallbackAction::Backup(BackupAction::Off))],
            back_row(),
        ],
    };
    OutboundMessage::with_keyboard(status, keyboard)
}

pub fn set_days_menu(current: u32) -> OutboundMessage {
    let keyboard = Keyboard {
        rows: vec![
            [30, 60, 90]
                .into_iter()
                .map(|days| button(&format!("{days} days"), CallbackAction::SetDays { days }))
                .collect(),
        ],
    };
    OutboundMessage::with_keyboard(
        format!("Default duration: {current} days. Pick a new default:"),
        keyboard,
    )
}

/// Multi-line summary of one record.
pub fn summary(record: &Subscription, tz: Tz) -> String {
    let mut text = format!("#{} {}\n", record.id, record.description);
    if let Some(buyer) = &record.buyer_ref {
        text.push_str(&format!("Buyer: {buyer}\n"));
    }
    text.push_str(&format!(
        "Purchased: {}\nDuration: {} days\nExpires: {}\nStatus: {}",
        record.purchase_date.format("%Y-%m-%d"),
        record.duration_days,
        local_time(record.expires_at, tz),
        if record.active { "active" } else { "finished" },
    ));
    text
}

/// Record summary with renew/finish buttons.
pub fn record_card(record: &Subscription, tz: Tz) -> OutboundMessage {
    let text = summary(record, tz);
    if !record.active {
        return OutboundMessage::text(text);
    }
    let keyboard = Keyboard {
        rows: vec![vec![
            button("Renew", CallbackAction::Renew { id: record.id }),
            button("Finish", CallbackAction::Finish { id: record.id }),
        ]],
    };
    OutboundMessage::with_keyboard(text, keyboard)
}

pub fn created(record: &Subscription, tz: Tz) -> String {
    format!(
        "Saved #{}. Expires {}.",
        record.id,
        local_time(record.expires_at, tz)
    )
}

pub fn renewed(id: i64, days: u32, expires_at: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "#{id} renewed by {days} days. New expiry {}.",
        local_time(expires_at, tz)
    )
}

pub fn finished(id: i64, changed: bool) -> String {
    if changed {
        format!("#{id} marked finished.")
    } else {
        format!("#{id} was already finished.")
    }
}

pub fn not_found(id: i64) -> String {
    format!("Record #{id} not found.")
}

pub fn find_header(query: &str, count: usize) -> String {
    format!("{count} result(s) for \"{query}\":")
}

pub fn default_days_set(days: u32) -> String {
    format!("Default duration set to {days} days.")
}

pub fn backup_enabled(hours: u32, grace_minutes: u64) -> String {
    format!("Automatic backup every {hours}h. First run in {grace_minutes} min.")
}

pub fn backup_too_large(path: &std::path::Path, size_bytes: u64, limit_mb: u64) -> String {
    format!(
        "Backup is {:.1} MiB, above the {limit_mb} MiB attachment limit. Saved on the server at {}",
        size_bytes as f64 / (1024.0 * 1024.0),
        path.display()
    )
}

pub fn backup_caption(at: DateTime<Utc>, tz: Tz) -> String {
    format!("Backup {}", local_time(at, tz))
}

/// Daily digest: expired and expiring-soon sections.
pub fn digest(expired: &[Subscription], upcoming: &[Subscription], tz: Tz) -> String {
    if expired.is_empty() && upcoming.is_empty() {
        return "Daily report: nothing expired and nothing due in the next 48 hours.".to_owned();
    }
    let line = |r: &Subscription| {
        format!(
            "• #{} {} ({})",
            r.id,
            r.description,
            local_time(r.expires_at, tz)
        )
    };
    let mut sections = vec!["Daily report".to_owned()];
    if !expired.is_empty() {
        let lines: Vec<String> = expired.iter().map(line).collect();
        sections.push(format!("Expired ({}):\n{}", expired.len(), lines.join("\n")));
    }
    if !upcoming.is_empty() {
        let lines: Vec<String> = upcoming.iter().map(line).collect();
        sections.push(format!(
            "Expiring within 48h ({}):\n{}",
            upcoming.len(),
            lines.join("\n")
        ));
    }
    sections.join("\n\n")
}
