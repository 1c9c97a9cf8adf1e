//! Console grammar for driving the scheduler by hand.
//!
//! Two commands are understood:
//!
//! ```text
//! song <trackNumber|random|shuffle|default|category>
//! song shuffle <category1> <category2> ...
//! resume_default
//! ```

use crate::{Category, Clock, DaggerwalkError, Directive, Result, TrackId, TrackScheduler};

pub const USAGE: &str = "Usage: song <trackNumber/random/shuffle/default/category>\n\
     Or: song shuffle <category1> <category2> ...\n\
     Categories: all, world, dungeon, battle, misc, off";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongCommand {
    /// `song` with no arguments: print usage and the current mode.
    Status,
    Track(TrackId),
    Random,
    /// Category names as typed; empty means every category.
    Shuffle(Vec<String>),
    Category(Category),
    /// `song default` and `resume_default`.
    Default,
}

impl SongCommand {
    /// Parses a full console line such as `song shuffle world dungeon`.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        match words.next().map(str::to_lowercase).as_deref() {
            Some("song") => Self::parse(&words.collect::<Vec<_>>()),
            Some("resume_default") => Ok(Self::Default),
            Some(other) => Err(DaggerwalkError::InvalidCommand(format!(
                "unknown command `{other}`"
            ))),
            None => Err(DaggerwalkError::InvalidCommand("empty command".to_string())),
        }
    }

    /// Parses the arguments that follow `song`.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let Some(first) = args.first() else {
            return Ok(Self::Status);
        };
        let first = first.as_ref().to_lowercase();

        match first.as_str() {
            "shuffle" => Ok(Self::Shuffle(
                args[1..].iter().map(|arg| arg.as_ref().to_lowercase()).collect(),
            )),
            "default" => Ok(Self::Default),
            "random" => Ok(Self::Random),
            _ => {
                if let Ok(category) = first.parse::<Category>() {
                    return Ok(Self::Category(category));
                }
                first.parse::<i32>().map(|id| Self::Track(TrackId(id))).map_err(|_| {
                    DaggerwalkError::InvalidCommand(format!(
                        "`{first}` is not a track number or category; use a numeric track id, \
                         'random', 'shuffle', or one of world, dungeon, battle, misc, off"
                    ))
                })
            }
        }
    }
}

/// Result of running a command: what the player should do and what to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub directive: Directive,
    pub reply: String,
}

impl CommandOutcome {
    fn new(directive: Directive, reply: impl Into<String>) -> Self {
        Self {
            directive,
            reply: reply.into(),
        }
    }
}

/// Applies `command` to `scheduler`.
pub fn execute<C: Clock>(
    scheduler: &mut TrackScheduler<C>,
    command: &SongCommand,
) -> Result<CommandOutcome> {
    let outcome = match command {
        SongCommand::Status => {
            let mode = if scheduler.is_shuffling() {
                format!("(Shuffle mode active - categories: {})", scheduler.filter())
            } else {
                "(Shuffle mode off)".to_string()
            };
            CommandOutcome::new(Directive::Idle, format!("{USAGE}\n{mode}"))
        }
        SongCommand::Track(track) => {
            let directive = scheduler.select_explicit(*track)?;
            CommandOutcome::new(directive, format!("Now playing track {track}."))
        }
        SongCommand::Random => {
            let directive = scheduler.select_random()?;
            CommandOutcome::new(directive, format!("Now playing random track {}.", describe(directive)))
        }
        SongCommand::Shuffle(names) => {
            let directive = scheduler.enable_shuffle(names)?;
            CommandOutcome::new(
                directive,
                format!(
                    "Shuffle mode enabled for categories: {}, starting with {}.",
                    scheduler.filter(),
                    describe(directive)
                ),
            )
        }
        SongCommand::Category(category) => {
            let directive = scheduler.select_from_category(*category)?;
            CommandOutcome::new(
                directive,
                format!("Now playing {} from category '{category}'.", describe(directive)),
            )
        }
        SongCommand::Default => {
            CommandOutcome::new(scheduler.disable(), "Resumed default music system.")
        }
    };

    tracing::debug!(?command, directive = ?outcome.directive, "console command executed");
    Ok(outcome)
}

fn describe(directive: Directive) -> String {
    match directive {
        Directive::Play(track) | Directive::Replay(track) => format!("track {track}"),
        Directive::Idle | Directive::ResumeDefault => "nothing".to_string(),
    }
}
