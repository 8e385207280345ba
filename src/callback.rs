//! Button tokens of the form `namespace:action[:argument]`.
//!
//! Tokens are parsed once at the boundary into [`CallbackAction`]; the
//! dispatcher matches on the variant and never re-splits strings.

use crate::command::parse_positive;

/// Menu destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuTarget {
    Home,
    Add,
    List,
    Expired,
    Export,
    Admins,
    Backup,
}

/// Operator-management sub-menu actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminsAction {
    List,
    Add,
    Remove,
}

/// Backup sub-menu actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupAction {
    Now,
    On { hours: u32 },
    Off,
}

/// A parsed button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Menu(MenuTarget),
    Admins(AdminsAction),
    Backup(BackupAction),
    Renew { id: i64 },
    Finish { id: i64 },
    SetDays { days: u32 },
}

/// Why a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackError {
    /// Namespace or action not recognised.
    Unsupported,
    /// Recognised shape, malformed numeric argument.
    Invalid,
}

impl CallbackAction {
    pub fn parse(token: &str) -> Result<Self, CallbackError> {
        let parts: Vec<&str> = token.trim().split(':').collect();
        match parts.as_slice() {
            ["menu", target] => {
                let target = match *target {
                    "home" => MenuTarget::Home,
                    "add" => MenuTarget::Add,
                    "list" => MenuTarget::List,
                    "expired" => MenuTarget::Expired,
                    "export" => MenuTarget::Export,
                    "admins" => MenuTarget::Admins,
                    "backup" => MenuTarget::Backup,
                    _ => return Err(CallbackError::Unsupported),
                };
                Ok(Self::Menu(target))
            }
            ["admins", "list"] => Ok(Self::Admins(AdminsAction::List)),
            ["admins", "add"] => Ok(Self::Admins(AdminsAction::Add)),
            ["admins", "remove"] => Ok(Self::Admins(AdminsAction::Remove)),
            ["backup", "now"] => Ok(Self::Backup(BackupAction::Now)),
            ["backup", "off"] => Ok(Self::Backup(BackupAction::Off)),
            ["backup", "on", hours] => hours
                .parse::<u32>()
                .ok()
                .filter(|h| *h >= 1)
                .map(|hours| Self::Backup(BackupAction::On { hours }))
                .ok_or(CallbackError::Invalid),
            ["renew", id] => parse_record_id(id).map(|id| Self::Renew { id }),
            ["finish", id] => parse_record_id(id).map(|id| Self::Finish { id }),
            ["setdays", days] => parse_positive(days)
                .map(|days| Self::SetDays { days })
                .ok_or(CallbackError::Invalid),
            _ => Err(CallbackError::Unsupported),
        }
    }

    /// The wire token for this action.
    pub fn token(&self) -> String {
        match self {
            Self::Menu(target) => {
                let name = match target {
                    MenuTarget::Home => "home",
                    MenuTarget::Add => "add",
                    MenuTarget::List => "list",
                    MenuTarget::Expired => "expired",
                    MenuTarget::Export => "export",
                    MenuTarget::Admins => "admins",
                    MenuTarget::Backup => "backup",
                };
                format!("menu:{name}")
            }
            Self::Admins(AdminsAction::List) => "admins:list".to_owned(),
            Self::Admins(AdminsAction::Add) => "admins:add".to_owned(),
            Self::Admins(AdminsAction::Remove) => "admins:remove".to_owned(),
            Self::Backup(BackupAction::Now) => "backup:now".to_owned(),
            Self::Backup(BackupAction::Off) => "backup:off".to_owned(),
            Self::Backup(BackupAction::On { hours }) => format!("backup:on:{hours}"),
            Self::Renew { id } => format!("renew:{id}"),
            Self::Finish { id } => format!("finish:{id}"),
            Self::SetDays { days } => format!("setdays:{days}"),
        }
    }
}

fn parse_record_id(raw: &str) -> Result<i64, CallbackError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or(CallbackError::Invalid)
}
