//! # Operator command module
//!
//! Commands are sent by the operator console as short tokens. The first character gives the edge
//! of the key event (`D` for key down, `U` for key up) and the second character gives the key:
//!
//! | Key | Action |
//! |-----|--------|
//! | `q`/`e` | turn left/right |
//! | `w`/`s` | forward/backward |
//! | `a`/`d` | left/right |
//! | `r`/`f` | up/down |
//! | `Du` | take off |
//! | `Dl` | land |
//! | `Uh` | set home |
//! | `U0` | return home |
//! | `Un` | mark a checkpoint |
//! | `U1`..`U9` | fly to checkpoint N |

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A movement key on the operator console.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKey {
    TurnLeft,
    TurnRight,
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// A command from the operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cmd {
    /// Start moving in the direction of the key.
    Press(MoveKey),

    /// Stop moving in the direction of the key and hover.
    Release(MoveKey),

    TakeOff,
    Land,

    /// Record the current pose as the home pose.
    SetHome,

    /// Autonomously return to the home pose.
    ReturnHome,

    /// Mark a checkpoint at the current position, linked to the previous mark.
    MarkCheckpoint,

    /// Autonomously fly to the checkpoint with the given id.
    RecallCheckpoint(u32),
}

/// Possible parsing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CmdParseError {
    #[error("Command token is empty")]
    Empty,

    #[error("Command token must be two characters long, found {0:?}")]
    InvalidLength(String),

    #[error("Expected the key edge to be 'D' or 'U', found {0:?}")]
    InvalidEdge(char),

    #[error("{0:?} is not a recognised command")]
    UnknownCommand(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Cmd {
    /// Parse a command from a console token, for example `Dw` or `U3`.
    pub fn from_token(token: &str) -> Result<Self, CmdParseError> {
        let token = token.trim();

        let mut chars = token.chars();
        let (edge, key) = match (chars.next(), chars.next(), chars.next()) {
            (None, _, _) => return Err(CmdParseError::Empty),
            (Some(e), Some(k), None) => (e, k),
            _ => return Err(CmdParseError::InvalidLength(token.to_string())),
        };

        let unknown = || CmdParseError::UnknownCommand(token.to_string());

        match edge {
            'D' => match key {
                'u' => Ok(Cmd::TakeOff),
                'l' => Ok(Cmd::Land),
                k => MoveKey::from_char(k).map(Cmd::Press).ok_or_else(unknown),
            },
            'U' => match key {
                'h' => Ok(Cmd::SetHome),
                '0' => Ok(Cmd::ReturnHome),
                'n' => Ok(Cmd::MarkCheckpoint),
                k @ '1'..='9' => k.to_digit(10).map(Cmd::RecallCheckpoint).ok_or_else(unknown),
                k => MoveKey::from_char(k).map(Cmd::Release).ok_or_else(unknown),
            },
            e => Err(CmdParseError::InvalidEdge(e)),
        }
    }

    /// Human readable description of the command, as reported back to the operator.
    pub fn info(&self) -> String {
        match self {
            Cmd::Press(k) => format!("Started {}", k.action()),
            Cmd::Release(k) => format!("Stopped {}", k.action()),
            Cmd::TakeOff => "Started Take Off".into(),
            Cmd::Land => "Started Land".into(),
            Cmd::SetHome => "Home set".into(),
            Cmd::ReturnHome => "Returning Home".into(),
            Cmd::MarkCheckpoint => "Checkpoint marked".into(),
            Cmd::RecallCheckpoint(id) => format!("Flying to Checkpoint {}", id),
        }
    }
}

impl Display for Cmd {
    /// Formats the command as its console token.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cmd::Press(k) => write!(f, "D{}", k.to_char()),
            Cmd::Release(k) => write!(f, "U{}", k.to_char()),
            Cmd::TakeOff => write!(f, "Du"),
            Cmd::Land => write!(f, "Dl"),
            Cmd::SetHome => write!(f, "Uh"),
            Cmd::ReturnHome => write!(f, "U0"),
            Cmd::MarkCheckpoint => write!(f, "Un"),
            Cmd::RecallCheckpoint(id) => write!(f, "U{}", id),
        }
    }
}

impl MoveKey {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'q' => Some(MoveKey::TurnLeft),
            'e' => Some(MoveKey::TurnRight),
            'w' => Some(MoveKey::Forward),
            's' => Some(MoveKey::Backward),
            'a' => Some(MoveKey::Left),
            'd' => Some(MoveKey::Right),
            'r' => Some(MoveKey::Up),
            'f' => Some(MoveKey::Down),
            _ => None,
        }
    }

    fn to_char(self) -> char {
        match self {
            MoveKey::TurnLeft => 'q',
            MoveKey::TurnRight => 'e',
            MoveKey::Forward => 'w',
            MoveKey::Backward => 's',
            MoveKey::Left => 'a',
            MoveKey::Right => 'd',
            MoveKey::Up => 'r',
            MoveKey::Down => 'f',
        }
    }

    fn action(self) -> &'static str {
        match self {
            MoveKey::TurnLeft => "Turning Left",
            MoveKey::TurnRight => "Turning Right",
            MoveKey::Forward => "Going Forward",
            MoveKey::Backward => "Going Backward",
            MoveKey::Left => "Going Left",
            MoveKey::Right => "Going Right",
            MoveKey::Up => "Going Up",
            MoveKey::Down => "Going Down",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_token() {
        assert_eq!(Cmd::from_token("Dw"), Ok(Cmd::Press(MoveKey::Forward)));
        assert_eq!(Cmd::from_token("Uq"), Ok(Cmd::Release(MoveKey::TurnLeft)));
        assert_eq!(Cmd::from_token("Du"), Ok(Cmd::TakeOff));
        assert_eq!(Cmd::from_token("Dl"), Ok(Cmd::Land));
        assert_eq!(Cmd::from_token("Uh"), Ok(Cmd::SetHome));
        assert_eq!(Cmd::from_token("U0"), Ok(Cmd::ReturnHome));
        assert_eq!(Cmd::from_token("Un"), Ok(Cmd::MarkCheckpoint));
        assert_eq!(Cmd::from_token("U7"), Ok(Cmd::RecallCheckpoint(7)));
        assert_eq!(Cmd::from_token(" Df\n"), Ok(Cmd::Press(MoveKey::Down)));
    }

    #[test]
    fn test_from_token_errors() {
        assert_eq!(Cmd::from_token(""), Err(CmdParseError::Empty));
        assert_eq!(
            Cmd::from_token("Dww"),
            Err(CmdParseError::InvalidLength("Dww".into()))
        );
        assert_eq!(Cmd::from_token("Xw"), Err(CmdParseError::InvalidEdge('X')));
        assert_eq!(
            Cmd::from_token("Uu"),
            Err(CmdParseError::UnknownCommand("Uu".into()))
        );
        assert_eq!(
            Cmd::from_token("D3"),
            Err(CmdParseError::UnknownCommand("D3".into()))
        );
    }

    #[test]
    fn test_token_display() {
        for token in &[
            "Dq", "Uq", "De", "Ue", "Dw", "Uw", "Ds", "Us", "Da", "Ua", "Dd", "Ud", "Dr", "Ur",
            "Df", "Uf", "Du", "Dl", "Uh", "U0", "Un", "U1", "U9",
        ] {
            assert_eq!(Cmd::from_token(token).unwrap().to_string(), *token);
        }
    }

    #[test]
    fn test_info() {
        assert_eq!(Cmd::Press(MoveKey::Right).info(), "Started Going Right");
        assert_eq!(Cmd::Release(MoveKey::Up).info(), "Stopped Going Up");
        assert_eq!(Cmd::SetHome.info(), "Home set");
    }
}
