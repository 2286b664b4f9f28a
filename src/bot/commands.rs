use thiserror::Error;

use crate::indicator::Kind;
use crate::indicator::rank::DEFAULT_TOP;
use crate::quotes::QuoteId;

pub const DEFAULT_PREFIX: &str = "--";
pub const MAX_TOP: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Quote { message: String },
    Random,
    Get { id: QuoteId },
    Last,
    Leaderboard { kind: Kind, top: usize },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErr {
    #[error("you didn't write anything to quote")]
    MissingMessage,

    #[error("'{0}' isn't a quote id")]
    BadId(String),

    #[error("'{0}' isn't a number between 1 and {MAX_TOP}")]
    BadCount(String),

    #[error("no idea what '{0}' means, try help")]
    Unknown(String),
}

/// Parses one chat message. Returns `None` when the message isn't addressed to the bot at all.
pub fn parse(prefix: &str, content: &str) -> Option<Result<BotCommand, ParseErr>> {
    let body = content.trim_start().strip_prefix(prefix)?;

    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };

    if name.is_empty() {
        return None;
    }

    let cmd = match name.to_lowercase().as_str() {
        "quote" | "q" => {
            if rest.is_empty() {
                Err(ParseErr::MissingMessage)
            } else {
                Ok(BotCommand::Quote {
                    message: rest.to_owned(),
                })
            }
        }
        "random" | "r" => Ok(BotCommand::Random),
        "get" | "g" => rest
            .parse::<QuoteId>()
            .map(|id| BotCommand::Get { id })
            .map_err(|_| ParseErr::BadId(rest.to_owned())),
        "last" => Ok(BotCommand::Last),
        "quoters" | "top" => parse_top(rest).map(|top| BotCommand::Leaderboard {
            kind: Kind::Quoted,
            top,
        }),
        "requesters" => parse_top(rest).map(|top| BotCommand::Leaderboard {
            kind: Kind::Requested,
            top,
        }),
        "help" | "h" => Ok(BotCommand::Help),
        other => Err(ParseErr::Unknown(other.to_owned())),
    };

    Some(cmd)
}

fn parse_top(arg: &str) -> Result<usize, ParseErr> {
    if arg.is_empty() {
        return Ok(DEFAULT_TOP);
    }

    match arg.parse::<usize>() {
        Ok(n) if (1..=MAX_TOP).contains(&n) => Ok(n),
        _ => Err(ParseErr::BadCount(arg.to_owned())),
    }
}
