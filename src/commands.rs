//! Prefix-command parsing.
//!
//! Maps raw message content to one of a closed set of [`CommandKind`]s.
//! Matching is case-sensitive and checked in a fixed order; the first rule
//! that matches wins.

/// Every command the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Ping,
    Help,
    Choose,
    Clear,
    WhoIsTchola,
    Weather,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    Exact,
    Prefix,
}

/// Routing table, in priority order.
const RULES: &[(&str, Match, CommandKind)] = &[
    ("!ping", Match::Exact, CommandKind::Ping),
    ("!help", Match::Exact, CommandKind::Help),
    ("!choose", Match::Prefix, CommandKind::Choose),
    ("!clear", Match::Prefix, CommandKind::Clear),
    ("!whoistchola", Match::Exact, CommandKind::WhoIsTchola),
    ("!weather", Match::Prefix, CommandKind::Weather),
];

impl CommandKind {
    /// The literal that triggers this command.
    pub fn trigger(self) -> &'static str {
        RULES
            .iter()
            .find(|(_, _, kind)| *kind == self)
            .map(|(trigger, _, _)| *trigger)
            .unwrap_or_default()
    }
}

/// A message that matched one of the commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub kind: CommandKind,
    content: &'a str,
}

impl<'a> ParsedCommand<'a> {
    /// Everything after the command literal, untouched.
    pub fn rest(&self) -> &'a str {
        &self.content[self.kind.trigger().len()..]
    }

    /// Whitespace-separated tokens of the whole message, minus the first.
    pub fn args(&self) -> impl Iterator<Item = &'a str> {
        self.content.split_whitespace().skip(1)
    }
}

/// Determine which command (if any) `content` invokes.
pub fn parse(content: &str) -> Option<ParsedCommand<'_>> {
    RULES
        .iter()
        .find(|(trigger, rule, _)| match rule {
            Match::Exact => content == *trigger,
            Match::Prefix => content.starts_with(trigger),
        })
        .map(|&(_, _, kind)| ParsedCommand { kind, content })
}
