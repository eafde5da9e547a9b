//! Command-line parsing.
//!
//! ```text
//! accessfeed [subscriptionId] [add|modify|disable]
//! ```
//!
//! Help tokens are recognised anywhere on the command line before clap
//! sees it, so the DOS-style `/?` and `-help` spellings work too.

use std::ffi::OsString;

use clap::Parser;
use thiserror::Error;

/// Tokens that print usage and exit successfully.
const HELP_TOKENS: &[&str] = &["help", "usage", "?", "--help", "--h", "-help", "-h", "/?"];

#[derive(Parser, Debug)]
#[command(name = "accessfeed")]
#[command(about = "Registers an access-control event subscription and prints pushed events")]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Existing subscription id, required for modify and disable.
    subscription_id: Option<String>,
    /// add, modify or disable (case-insensitive).
    mode: Option<String>,
}

/// Subscription lifecycle operation to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Create a new subscription.
    Add,
    /// Update an existing subscription.
    Modify {
        /// Subscription to update.
        id: i64,
    },
    /// Disable an existing subscription. No bridge is opened.
    Disable {
        /// Subscription to disable.
        id: i64,
    },
}

impl Mode {
    /// Whether this mode may open the notification bridge.
    pub fn listens(self) -> bool {
        !matches!(self, Mode::Disable { .. })
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// Print usage and exit.
    Help,
    /// Run the lifecycle in the given mode.
    Run(Mode),
}

/// Command line that cannot be turned into an [`Invocation`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsageError {
    /// Rejected by the argument parser (too many or unknown arguments).
    #[error("{0}")]
    Arguments(String),
    /// The mode word is not add, modify or disable.
    #[error("unknown mode `{0}`, expected add, modify or disable")]
    UnknownMode(String),
    /// The id is not a positive integer.
    #[error("subscription id `{0}` is not a positive integer")]
    InvalidId(String),
    /// modify or disable given without an id.
    #[error("`{0}` requires a subscription id")]
    MissingId(&'static str),
    /// An id given without a mode.
    #[error("a mode (modify or disable) is required after a subscription id")]
    MissingMode,
    /// `add` given together with an id.
    #[error("`add` does not take a subscription id")]
    IdWithAdd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeWord {
    Add,
    Modify,
    Disable,
}

impl ModeWord {
    fn parse(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("add") {
            Some(Self::Add)
        } else if word.eq_ignore_ascii_case("modify") {
            Some(Self::Modify)
        } else if word.eq_ignore_ascii_case("disable") {
            Some(Self::Disable)
        } else {
            None
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Disable => "disable",
        }
    }
}

/// Parses a full command line, program name first.
///
/// # Errors
///
/// Returns a [`UsageError`] for any combination the tool does not accept.
pub fn parse<I, T>(args: I) -> Result<Invocation, UsageError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

    if args.iter().skip(1).any(|arg| is_help_token(&arg.to_string_lossy())) {
        return Ok(Invocation::Help);
    }

    let parsed = Args::try_parse_from(args.iter().cloned()).map_err(|e| {
        let rendered = e.to_string();
        let first_line = rendered.lines().next().unwrap_or_default();
        UsageError::Arguments(
            first_line
                .trim_start_matches("error: ")
                .trim()
                .to_string(),
        )
    })?;

    interpret(parsed.subscription_id.as_deref(), parsed.mode.as_deref()).map(Invocation::Run)
}

fn is_help_token(arg: &str) -> bool {
    HELP_TOKENS.iter().any(|token| token.eq_ignore_ascii_case(arg))
}

fn interpret(first: Option<&str>, second: Option<&str>) -> Result<Mode, UsageError> {
    match (first, second) {
        (None, _) => Ok(Mode::Add),
        (Some(word), None) => match ModeWord::parse(word) {
            Some(ModeWord::Add) => Ok(Mode::Add),
            Some(other) => Err(UsageError::MissingId(other.name())),
            None if parse_id(word).is_ok() => Err(UsageError::MissingMode),
            None => Err(UsageError::UnknownMode(word.to_string())),
        },
        (Some(id), Some(word)) => {
            let mode = ModeWord::parse(word).ok_or_else(|| UsageError::UnknownMode(word.to_string()))?;
            match mode {
                ModeWord::Add => Err(UsageError::IdWithAdd),
                ModeWord::Modify => Ok(Mode::Modify { id: parse_id(id)? }),
                ModeWord::Disable => Ok(Mode::Disable { id: parse_id(id)? }),
            }
        }
    }
}

fn parse_id(raw: &str) -> Result<i64, UsageError> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(UsageError::InvalidId(raw.to_string())),
    }
}

/// Usage text printed for help and after usage errors.
pub fn usage() -> String {
    let program = env!("CARGO_PKG_NAME");
    format!(
        "Usage: {program} [subscriptionId] [add|modify|disable]\n\
         \n\
         \x20 {program}                  create a subscription and listen for events\n\
         \x20 {program} add              same as above\n\
         \x20 {program} <id> modify      update subscription <id> and listen for events\n\
         \x20 {program} <id> disable     disable subscription <id> and exit\n\
         \n\
         Settings are read from $ACCESSFEED_CONFIG or the platform config directory\n\
         (accessfeed/config.json). Press Ctrl+C to stop listening."
    )
}
