//! Typed slash commands.

use crate::store::MAX_GRANT_DAYS;

/// A recognised command with its arguments already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Add,
    Cancel,
    List,
    Expired,
    Renew { id: i64, days: Option<u32> },
    Finish { id: i64 },
    Find { query: String },
    SetDefaultDays { days: Option<u32> },
    Export,
}

/// Why a command could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Name is not a known command.
    Unknown(String),
    /// Known command, malformed arguments. Carries the usage line.
    Usage(&'static str),
}

pub const RENEW_USAGE: &str = "Usage: /renew <id> [days]";
pub const FINISH_USAGE: &str = "Usage: /finish <id>";
pub const FIND_USAGE: &str = "Usage: /find <text>";
pub const SET_DAYS_USAGE: &str = "Usage: /setdefaultdays <days>";

impl Command {
    /// Parse a command name (without the leading slash) and its arguments.
    pub fn parse(name: &str, args: &[String]) -> Result<Self, CommandError> {
        match name.to_ascii_lowercase().as_str() {
            "start" | "menu" => Ok(Self::Start),
            "add" => Ok(Self::Add),
            "cancel" => Ok(Self::Cancel),
            "list" => Ok(Self::List),
            "expired" => Ok(Self::Expired),
            "export" => Ok(Self::Export),
            "renew" => {
                let id = args
                    .first()
                    .and_then(|a| parse_id(a))
                    .ok_or(CommandError::Usage(RENEW_USAGE))?;
                let days = match args.get(1) {
                    Some(raw) => Some(parse_positive(raw).ok_or(CommandError::Usage(RENEW_USAGE))?),
                    None => None,
                };
                Ok(Self::Renew { id, days })
            }
            "finish" => {
                let id = args
                    .first()
                    .and_then(|a| parse_id(a))
                    .ok_or(CommandError::Usage(FINISH_USAGE))?;
                Ok(Self::Finish { id })
            }
            "find" => {
                let query = args.join(" ");
                if query.trim().is_empty() {
                    return Err(CommandError::Usage(FIND_USAGE));
                }
                Ok(Self::Find { query })
            }
            "setdefaultdays" | "set_default_days" => {
                let days = match args.first() {
                    Some(raw) => Some(parse_positive(raw).ok_or(CommandError::Usage(SET_DAYS_USAGE))?),
                    None => None,
                };
                Ok(Self::SetDefaultDays { days })
            }
            other => Err(CommandError::Unknown(other.to_owned())),
        }
    }
}

/// Split whitespace-separated arguments.
pub fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_owned).collect()
}

pub(crate) fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

/// A day count in `1..=MAX_GRANT_DAYS`.
pub(crate) fn parse_positive(raw: &str) -> Option<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=MAX_GRANT_DAYS).contains(n))
}
