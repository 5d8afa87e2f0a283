use serde::Deserialize;
use thiserror::Error;

use signoff_core::domain::{ChannelId, RequestId, TeamId, UserId};

/// Raw slash-command payload as Slack delivers it over Socket Mode.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    pub team_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub trigger_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unsupported command: {command}")]
    UnsupportedCommand { command: String },
}

/// A slash invocation after normalization: ids wrapped in their domain
/// newtypes, verb text still unclassified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedCommand {
    pub user_id: UserId,
    pub team_id: TeamId,
    pub channel_id: ChannelId,
    pub trigger_id: String,
    pub text: String,
}

pub fn normalize(payload: SlashCommandPayload) -> Result<NormalizedCommand, CommandError> {
    if payload.command != "/signoff" {
        return Err(CommandError::UnsupportedCommand { command: payload.command });
    }
    Ok(NormalizedCommand {
        user_id: UserId(payload.user_id),
        team_id: TeamId(payload.team_id),
        channel_id: ChannelId(payload.channel_id),
        trigger_id: payload.trigger_id,
        text: payload.text,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignoffCommand {
    /// `/signoff` or `/signoff new`, both open the request modal.
    New,
    Status { request_id: RequestId },
    LogChannel { channel: ChannelId },
    Help,
    Unknown { verb: String },
}

/// Classifies the free text following `/signoff`. The bare command and
/// `new` both open the modal; everything else routes by first word.
pub fn classify(text: &str) -> SignoffCommand {
    let mut words = text.split_whitespace();
    let verb = match words.next() {
        None => return SignoffCommand::New,
        Some(verb) => verb.to_ascii_lowercase(),
    };

    match verb.as_str() {
        "new" => SignoffCommand::New,
        "help" => SignoffCommand::Help,
        "status" => match words.next() {
            Some(token) => SignoffCommand::Status { request_id: RequestId(token.to_string()) },
            None => SignoffCommand::Unknown { verb },
        },
        "logchannel" => match words.next().and_then(parse_channel_reference) {
            Some(channel) => SignoffCommand::LogChannel { channel },
            None => SignoffCommand::Unknown { verb },
        },
        _ => SignoffCommand::Unknown { verb },
    }
}

/// Accepts either an escaped channel reference (`<#C123|general>`) or a
/// bare channel id.
pub fn parse_channel_reference(token: &str) -> Option<ChannelId> {
    let inner = token.strip_prefix("<#").and_then(|rest| rest.strip_suffix('>'));
    let id = match inner {
        Some(inner) => inner.split('|').next().unwrap_or(inner),
        None => token,
    };
    let id = id.trim();
    if id.starts_with('C') && id.len() > 1 && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ChannelId(id.to_string()))
    } else {
        None
    }
}
