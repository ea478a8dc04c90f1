// ABOUTME: Slash-command parsing for the relay bot
// ABOUTME: Recognizes /start, /stop, /getid and flags every other /command as unknown

/// A recognized bot command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Stop,
    GetId,
}

impl BotCommand {
    pub fn name(self) -> &'static str {
        match self {
            BotCommand::Start => "start",
            BotCommand::Stop => "stop",
            BotCommand::GetId => "getid",
        }
    }
}

/// Result of classifying a text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// A command the bot handles
    Command(BotCommand),
    /// A `/command` the bot does not know; never relayed
    Unknown(String),
    /// Regular text to relay
    Message,
}

impl ParseResult {
    pub fn is_command(&self) -> bool {
        matches!(self, ParseResult::Command(_))
    }

    pub fn as_command(&self) -> Option<BotCommand> {
        match self {
            ParseResult::Command(cmd) => Some(*cmd),
            _ => None,
        }
    }
}

/// Classify a message body.
///
/// A command starts at the very first character. It may carry trailing
/// arguments, which are ignored, and a `@botname` suffix. When `bot_username`
/// is known, a suffix naming another bot makes the command unknown. Matching
/// is case-insensitive.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> ParseResult {
    let Some(rest) = text.strip_prefix('/') else {
        return ParseResult::Message;
    };

    // Whitespace right after the slash leaves an empty word: "/ hello" is text
    let word = rest.split(char::is_whitespace).next().unwrap_or("");
    let (name, addressee) = match word.split_once('@') {
        Some((name, addressee)) => (name.to_lowercase(), Some(addressee)),
        None => (word.to_lowercase(), None),
    };

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return ParseResult::Message;
    }

    if let (Some(addressee), Some(own)) = (addressee, bot_username) {
        if !addressee.eq_ignore_ascii_case(own) {
            return ParseResult::Unknown(name);
        }
    }

    match name.as_str() {
        "start" => ParseResult::Command(BotCommand::Start),
        "stop" => ParseResult::Command(BotCommand::Stop),
        "getid" => ParseResult::Command(BotCommand::GetId),
        _ => ParseResult::Unknown(name),
    }
}
