//! CLI command definitions for the `confidant` binary.

pub mod chat;
pub mod respond;

use clap::{Parser, Subcommand, ValueEnum};

use confidant_types::chat::ReplyLength;

/// A companion that remembers.
#[derive(Parser)]
#[command(name = "confidant", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "CONFIDANT_JSON_LOGS")]
    pub json_logs: bool,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "CONFIDANT_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value_t = 3000, env = "CONFIDANT_PORT")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1", env = "CONFIDANT_HOST")]
        host: String,

        /// Keep state in memory only; nothing survives a restart.
        #[arg(long)]
        ephemeral: bool,
    },

    /// Run one dialogue action and print the reply.
    Respond {
        /// User identifier (at least 6 characters).
        #[arg(long, short)]
        user: String,

        /// Action to perform.
        #[arg(long, short, value_enum, default_value_t = ActionArg::Say)]
        action: ActionArg,

        /// Message, name, or fact, depending on the action.
        text: Option<String>,

        /// Output-length hint for `say`.
        #[arg(long, value_enum)]
        len: Option<LenArg>,

        /// IANA timezone of the user.
        #[arg(long)]
        timezone: Option<String>,

        /// Print the full response body as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Chat interactively; idle check-ins back off while you are away.
    Chat {
        /// User identifier (at least 6 characters).
        #[arg(long, short)]
        user: String,

        /// Output-length hint.
        #[arg(long, value_enum)]
        len: Option<LenArg>,
    },

    /// Stream a reply to a message, printing fragments as they arrive.
    Stream {
        /// User identifier (at least 6 characters).
        #[arg(long, short)]
        user: String,

        /// The message to send.
        message: String,

        /// Output-length hint.
        #[arg(long, value_enum)]
        len: Option<LenArg>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    Init,
    Say,
    LearnIdentity,
    AddFact,
    Nudge,
}

impl ActionArg {
    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionArg::Init => "init",
            ActionArg::Say => "say",
            ActionArg::LearnIdentity => "learn_identity",
            ActionArg::AddFact => "add_fact",
            ActionArg::Nudge => "nudge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LenArg {
    Short,
    Medium,
    Long,
}

impl From<LenArg> for ReplyLength {
    fn from(len: LenArg) -> Self {
        match len {
            LenArg::Short => ReplyLength::Short,
            LenArg::Medium => ReplyLength::Medium,
            LenArg::Long => ReplyLength::Long,
        }
    }
}
