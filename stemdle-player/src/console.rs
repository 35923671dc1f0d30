//! Line-oriented console
//!
//! `parse_command` turns one input line into a [`Command`]; `Console`
//! executes commands against a game session and returns the text to show.

use crate::error::Error;
use crate::game::GameSession;
use crate::playback::PlaybackSnapshot;
use crate::report;
use std::fmt::Write;
use std::sync::Arc;
use stemdle_common::time::format_clock;
use stemdle_common::StemKind;

pub const HELP: &str = "\
Commands:
  play [stem]           play all stems, or one
  pause [stem]          pause all stems, or one
  restart [stem]        back to the snippet start
  seek <secs>           move the playhead within the snippet
  vol <stem> <percent>  set a stem's volume (0-200)
  status                playhead, stems and rating
  songs                 list the song catalog
  guess <song-id>       submit a guess
  confirm               accept the score and load the next song
  next                  load a new song
  help                  this text
  quit                  exit
Stems: drums, bass, piano, guitar, vocals, other";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play(Option<StemKind>),
    Pause(Option<StemKind>),
    Restart(Option<StemKind>),
    Seek(f64),
    Volume(StemKind, i32),
    Status,
    Songs,
    Guess(String),
    Confirm,
    Next,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("unknown stem '{0}'")]
    UnknownStem(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

fn parse_stem(word: &str) -> Result<StemKind, ParseError> {
    word.parse()
        .map_err(|_| ParseError::UnknownStem(word.to_string()))
}

fn optional_stem(words: &[&str]) -> Result<Option<StemKind>, ParseError> {
    words.first().map(|w| parse_stem(w)).transpose()
}

/// Parse one console line
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((name, args)) = words.split_first() else {
        return Err(ParseError::Empty);
    };

    match name.to_ascii_lowercase().as_str() {
        "play" => Ok(Command::Play(optional_stem(args)?)),
        "pause" => Ok(Command::Pause(optional_stem(args)?)),
        "restart" => Ok(Command::Restart(optional_stem(args)?)),
        "seek" => {
            let secs = args
                .first()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|s| s.is_finite())
                .ok_or(ParseError::Usage("seek <secs>"))?;
            Ok(Command::Seek(secs))
        }
        "vol" | "volume" => match args {
            [stem, percent] => {
                let stem = parse_stem(stem)?;
                let percent = percent
                    .trim_end_matches('%')
                    .parse::<i32>()
                    .map_err(|_| ParseError::Usage("vol <stem> <percent>"))?;
                Ok(Command::Volume(stem, percent))
            }
            _ => Err(ParseError::Usage("vol <stem> <percent>")),
        },
        "status" => Ok(Command::Status),
        "songs" => Ok(Command::Songs),
        "guess" => {
            if args.is_empty() {
                Err(ParseError::Usage("guess <song-id>"))
            } else {
                Ok(Command::Guess(args.join(" ")))
            }
        }
        "confirm" => Ok(Command::Confirm),
        "next" => Ok(Command::Next),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

/// What the input loop should do after a command
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Continue(String),
    Quit,
}

/// Render the transport state
pub fn render_status(snapshot: &PlaybackSnapshot, rating: i64) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} / {}  ({:?})  rating {}",
        format_clock(snapshot.position),
        format_clock(snapshot.length),
        snapshot.state,
        rating
    );
    if snapshot.stems.is_empty() {
        let _ = write!(out, "No stems loaded");
    }
    for stem in &snapshot.stems {
        let _ = writeln!(
            out,
            "  {:<7} {:<7} {:>3}%{}",
            stem.label,
            if stem.playing { "playing" } else { "stopped" },
            stem.volume_percent,
            if stem.ever_unmuted { "  (used)" } else { "" }
        );
    }
    out.trim_end().to_string()
}

pub struct Console {
    session: Arc<GameSession>,
}

impl Console {
    pub fn new(session: Arc<GameSession>) -> Self {
        Self { session }
    }

    /// Parse and run one line
    pub async fn handle_line(&self, line: &str) -> Flow {
        match parse_command(line) {
            Ok(command) => self.execute(command).await,
            Err(ParseError::Empty) => Flow::Continue(String::new()),
            Err(e @ ParseError::Unknown(_)) => Flow::Continue(format!("{}\n{}", e, HELP)),
            Err(e) => Flow::Continue(e.to_string()),
        }
    }

    pub async fn execute(&self, command: Command) -> Flow {
        let engine = self.session.engine();
        let text = match command {
            Command::Play(None) => {
                let started = engine.play_all().await;
                format!("Playing {} stems", started)
            }
            Command::Play(Some(stem)) => match engine.play_one(stem).await {
                Ok(true) => format!("Playing {}", stem),
                Ok(false) => format!("{} could not start", stem),
                Err(e) => e.to_string(),
            },
            Command::Pause(None) => {
                engine.pause_all().await;
                "Paused".to_string()
            }
            Command::Pause(Some(stem)) => match engine.pause_one(stem).await {
                Ok(()) => format!("Paused {}", stem),
                Err(e) => e.to_string(),
            },
            Command::Restart(None) => {
                engine.restart_all().await;
                "Restarted".to_string()
            }
            Command::Restart(Some(stem)) => match engine.restart_one(stem).await {
                Ok(()) => format!("Restarted {}", stem),
                Err(e) => e.to_string(),
            },
            Command::Seek(secs) => {
                let position = engine.seek(secs).await;
                format!("At {}", format_clock(position))
            }
            Command::Volume(stem, percent) => match engine.set_volume(stem, percent).await {
                Ok(applied) => format!("{} volume {}%", stem, applied),
                Err(e) => e.to_string(),
            },
            Command::Status => render_status(&engine.snapshot().await, self.session.rating()),
            Command::Songs => match self.session.catalog().await {
                Ok(songs) if songs.is_empty() => "No songs available".to_string(),
                Ok(songs) => songs
                    .iter()
                    .map(|song| format!("{:>6}  {}", song.id, song.display_name()))
                    .collect::<Vec<_>>()
                    .join("\n"),
                Err(e) => format!("Could not load songs: {}", e),
            },
            Command::Guess(id) => match self.session.submit_guess(Some(&id)).await {
                Ok(Some(scored)) => {
                    let mut text = report::render(&scored.response, &scored.score);
                    if let Some(url) = self
                        .session
                        .current_round()
                        .await
                        .and_then(|round| round.audio_url)
                    {
                        let _ = write!(text, "\nFull song: {}", url);
                    }
                    text.push_str("\nType 'confirm' to accept.");
                    text
                }
                Ok(None) => "The round changed before the guess was scored".to_string(),
                Err(e) => e.to_string(),
            },
            // Confirming moves straight on to the next song
            Command::Confirm => match self.session.confirm().await {
                Ok(rating) => {
                    let next = self.next_round().await;
                    if next.is_empty() {
                        format!("Rating is now {}", rating)
                    } else {
                        format!("Rating is now {}\n{}", rating, next)
                    }
                }
                Err(Error::NoPendingScore) => "Nothing to confirm; guess first".to_string(),
                Err(e) => e.to_string(),
            },
            Command::Next => self.next_round().await,
            Command::Help => HELP.to_string(),
            Command::Quit => return Flow::Quit,
        };
        Flow::Continue(text)
    }

    async fn next_round(&self) -> String {
        match self.session.new_round().await {
            Ok(Some(round)) if round.stems.is_empty() => {
                "New song loaded, but it has no stems".to_string()
            }
            Ok(Some(round)) => format!("New song loaded with {} stems", round.stems.len()),
            Ok(None) => String::new(),
            Err(e) => format!("Could not load a song: {}", e),
        }
    }
}
