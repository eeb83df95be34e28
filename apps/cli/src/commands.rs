//! Parsing of lines typed at the prompt.

use std::path::PathBuf;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text to send as a message.
    Text(String),
    /// Offer files or folders; several are zipped together.
    Send(Vec<PathBuf>),
    /// Offer a folder the way a folder picker would.
    Folder(PathBuf),
    Name(String),
    Get(String),
    Dark,
    Users,
    Help,
    Quit,
    /// Nothing to do (blank line).
    Empty,
    /// Unknown command or missing argument.
    Invalid(String),
}

pub const HELP: &str = "\
commands:
  <text>            send a message
  /send PATH...     offer files or folders (several are zipped)
  /folder DIR       offer a folder as one archive named after it
  /name NEW         change your display name
  /get FILE_ID      download an offered file
  /users            list who is in the room
  /dark             toggle dark mode
  /help             show this list
  /quit             leave";

impl Command {
    pub fn parse(line: &str) -> Self {
        let Some(rest) = line.strip_prefix('/') else {
            return if line.trim().is_empty() {
                Command::Empty
            } else {
                Command::Text(line.to_string())
            };
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest.trim(), ""),
        };

        match (name, arg) {
            ("send", "") | ("folder", "") | ("name", "") | ("get", "") => {
                Command::Invalid(format!("/{name} needs an argument"))
            }
            ("send", arg) => Command::Send(arg.split_whitespace().map(PathBuf::from).collect()),
            ("folder", arg) => Command::Folder(PathBuf::from(arg)),
            ("name", arg) => Command::Name(arg.to_string()),
            ("get", arg) => Command::Get(arg.to_string()),
            ("dark", _) => Command::Dark,
            ("users", _) => Command::Users,
            ("help", _) => Command::Help,
            ("quit", _) | ("exit", _) => Command::Quit,
            (other, _) => Command::Invalid(format!("unknown command /{other}")),
        }
    }
}
