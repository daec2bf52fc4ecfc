//! Prompt assembly for one dialogue turn.
//!
//! The system message uses XML tag boundaries so the model can tell the
//! persona, what is known about the user and the per-turn directives apart:
//!
//! ```text
//! <persona>You are {name}. {persona prompt}</persona>
//! <user>Name: ... / Name: unknown</user>
//! <facts>- ...</facts>
//! <avoid_repeating>- ...</avoid_repeating>
//! <style>tone: ...; moves: ...; cadence: ...</style>
//! <context>Timezone: ...</context>
//! <instructions>...</instructions>
//! ```
//!
//! followed by the summary context line (if any), the recent turns, and the
//! new user message for `say`.

use std::sync::Arc;

use confidant_types::chat::ReplyLength;
use confidant_types::config::PersonaConfig;
use confidant_types::identity::Identity;
use confidant_types::llm::Message;
use confidant_types::memory::Memory;

use super::compressor::CompressedContext;
use super::style::StyleHintProvider;

/// Assistant lines listed as phrasing to avoid.
pub const ANTI_REPEAT_LINES: usize = 5;
/// Each avoided line is cut to this many characters.
pub const ANTI_REPEAT_CHARS: usize = 120;

/// What the reply must accomplish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    Greet,
    Reply { message: &'a str, len: ReplyLength },
    AcknowledgeName { name: &'a str },
    AcknowledgeFact { fact: &'a str },
    Nudge,
}

/// Everything known about the user for this turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub identity: &'a Identity,
    pub memory: &'a Memory,
    pub compressed: &'a CompressedContext,
    pub timezone: &'a str,
}

pub struct PromptAssembler {
    persona: PersonaConfig,
    style: Arc<dyn StyleHintProvider>,
}

impl PromptAssembler {
    pub fn new(persona: PersonaConfig, style: Arc<dyn StyleHintProvider>) -> Self {
        Self { persona, style }
    }

    /// Build the ordered provider messages for `directive`.
    pub fn assemble(&self, ctx: &TurnContext<'_>, directive: Directive<'_>) -> Vec<Message> {
        let mut messages = Vec::with_capacity(ctx.compressed.recent.len() + 3);
        messages.push(Message::system(self.system_prompt(ctx, directive)));

        if let Some(summary) = &ctx.compressed.summary {
            messages.push(Message::system(format!(
                "Summary of the earlier conversation: {summary}"
            )));
        }

        messages.extend(
            ctx.compressed
                .recent
                .iter()
                .filter(|t| !t.text.trim().is_empty())
                .map(|t| Message {
                    role: t.role.into(),
                    content: t.text.clone(),
                }),
        );

        if let Directive::Reply { message, .. } = directive {
            messages.push(Message::user(message));
        }
        messages
    }

    fn system_prompt(&self, ctx: &TurnContext<'_>, directive: Directive<'_>) -> String {
        let mut sections = Vec::with_capacity(7);

        sections.push(format!(
            "<persona>\nYou are {}. {}\n</persona>",
            self.persona.assistant_name,
            self.persona.prompt.trim()
        ));

        let user_line = match ctx.identity.known_name() {
            Some(name) => format!(
                "Name: {name}. You already know their name; never ask for it again."
            ),
            None => "Name: unknown.".to_string(),
        };
        sections.push(format!("<user>\n{user_line}\n</user>"));

        if !ctx.memory.facts.is_empty() {
            let facts: Vec<String> = ctx.memory.facts.iter().map(|f| format!("- {f}")).collect();
            sections.push(format!("<facts>\n{}\n</facts>", facts.join("\n")));
        }

        let recent_lines = ctx.memory.recent_assistant_lines(ANTI_REPEAT_LINES);
        if !recent_lines.is_empty() {
            let lines: Vec<String> = recent_lines
                .iter()
                .map(|l| format!("- {}", truncate_chars(l.trim(), ANTI_REPEAT_CHARS)))
                .collect();
            sections.push(format!(
                "<avoid_repeating>\nDo not reuse the openings or phrasing of these recent replies:\n{}\n</avoid_repeating>",
                lines.join("\n")
            ));
        }

        sections.push(format!("<style>\n{}\n</style>", self.style.hint()));
        sections.push(format!(
            "<context>\nUser timezone: {}\n</context>",
            ctx.timezone
        ));
        sections.push(format!(
            "<instructions>\n{}\n</instructions>",
            instructions(ctx.identity, directive)
        ));

        sections.join("\n\n")
    }
}

fn instructions(identity: &Identity, directive: Directive<'_>) -> String {
    match directive {
        Directive::Greet => match (identity.known_name(), identity.last_topic.as_deref()) {
            (Some(name), Some(topic)) => format!(
                "Welcome {name} back by name in one or two sentences. Last time they talked \
                 about: \"{topic}\". You may gently recall it."
            ),
            (Some(name), None) => {
                format!("Welcome {name} back by name in one or two sentences.")
            }
            (None, _) => "Greet this new visitor in one or two sentences and ask what name \
                          they would like you to use."
                .to_string(),
        },
        Directive::Reply { len, .. } => {
            let length = match len {
                ReplyLength::Short => "Keep it to one or two sentences.",
                ReplyLength::Medium => "Keep it to a few sentences.",
                ReplyLength::Long => "You may take a full paragraph or two.",
            };
            format!("Reply to the user's latest message. {length}")
        }
        Directive::AcknowledgeName { name } => format!(
            "The user just told you their name is {name}. Acknowledge it warmly in one sentence."
        ),
        Directive::AcknowledgeFact { fact } => format!(
            "The user just shared: \"{fact}\". Acknowledge that you will remember it, in one sentence."
        ),
        Directive::Nudge => "The user has gone quiet. Write one short, gentle check-in line. \
                             Do not pressure them to reply."
            .to_string(),
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
