//! # Command script interpreter module
//!
//! This module provides an interpreter for pilot command scripts, allowing operator commands to be
//! replayed without a console attached. A script is a list of `<time_s>: <token>;` entries, for
//! example:
//!
//! ```text
//! # Take off, mark a checkpoint and come back
//! 0.5: Du;
//! 2.0: Uh;
//! 3.0: Dw;
//! 5.0: Uw;
//! 5.5: Un;
//! 8.0: U0;
//! ```
//!
//! Anything which doesn't match the entry pattern (such as comments) is ignored.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use regex::RegexBuilder;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal
use crate::session::get_elapsed_seconds;
use comms_if::cmd::{Cmd, CmdParseError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command which is scripted to occur at a specific time.
#[derive(Debug)]
struct ScriptedCmd {
    /// The time the command is supposed to execute at
    exec_time_s: f64,

    /// The command to run
    cmd: Cmd,
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use `.get_pending_cmds` to
/// acquire a list of commands that need executing.
#[derive(Debug)]
pub struct ScriptInterpreter {
    _script_path: Option<PathBuf>,
    cmds: VecDeque<ScriptedCmd>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)"
    )]
    InvalidTimestamp(String),

    #[error("Script contains an invalid command at {0} s: {1}")]
    InvalidCmd(f64, CmdParseError),

    #[error("Could not build the script pattern: {0}")]
    PatternError(regex::Error),
}

#[derive(Debug, PartialEq)]
pub enum PendingCmds {
    None,
    Some(Vec<Cmd>),
    EndOfScript,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {
    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let path = script_path.as_ref().to_path_buf();

        // Check that the script file exists.
        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path));
        }

        let script = fs::read_to_string(&path).map_err(ScriptError::ScriptLoadError)?;

        let mut si = Self::from_script(&script)?;
        si._script_path = Some(path);

        Ok(si)
    }

    /// Create a new interpreter from the text of a script.
    pub fn from_script(script: &str) -> Result<Self, ScriptError> {
        let mut cmd_queue: VecDeque<ScriptedCmd> = VecDeque::new();

        // Go through the script executing __the magic regex__.
        let re = RegexBuilder::new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
            .map_err(ScriptError::PatternError)?;

        for cap in re.captures_iter(script) {
            let (time_str, token) = match (cap.get(1), cap.get(3)) {
                (Some(t), Some(c)) => (t.as_str(), c.as_str()),
                _ => continue,
            };

            // Parse the exec time
            let exec_time_s: f64 = time_str
                .parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            let cmd =
                Cmd::from_token(token).map_err(|e| ScriptError::InvalidCmd(exec_time_s, e))?;

            cmd_queue.push_back(ScriptedCmd { exec_time_s, cmd });
        }

        if cmd_queue.is_empty() {
            return Err(ScriptError::ScriptEmpty);
        }

        Ok(ScriptInterpreter {
            _script_path: None,
            cmds: cmd_queue,
        })
    }

    /// Return the commands due at the current session time.
    pub fn get_pending_cmds(&mut self) -> PendingCmds {
        self.get_pending_cmds_at(get_elapsed_seconds())
    }

    /// Return the commands due at the given time, or `None` if no commands need executing yet.
    pub fn get_pending_cmds_at(&mut self, current_time_s: f64) -> PendingCmds {
        // If the queue is empty the script is over and we return the end of
        // script variant
        if self.cmds.is_empty() {
            return PendingCmds::EndOfScript;
        }

        if current_time_s.is_nan() {
            return PendingCmds::None;
        }

        let mut cmd_vec: Vec<Cmd> = vec![];

        while let Some(c) = self.cmds.front() {
            if c.exec_time_s >= current_time_s {
                break;
            }

            if let Some(c) = self.cmds.pop_front() {
                cmd_vec.push(c.cmd);
            }
        }

        if cmd_vec.is_empty() {
            PendingCmds::None
        } else {
            PendingCmds::Some(cmd_vec)
        }
    }

    /// Get the number of commands remaining in the script
    pub fn get_num_cmds(&self) -> usize {
        self.cmds.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.cmds.back() {
            Some(c) => c.exec_time_s,
            None => 0f64,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::cmd::MoveKey;

    const SCRIPT: &str = "\
# Take off then mark a checkpoint
0.5: Du;
1.0: Dw;
1.0: Uw;
  2.5 : Un;
";

    #[test]
    fn test_pending_cmds() {
        let mut si = ScriptInterpreter::from_script(SCRIPT).unwrap();

        assert_eq!(si.get_num_cmds(), 4);
        assert_eq!(si.get_duration(), 2.5);

        assert_eq!(si.get_pending_cmds_at(0.1), PendingCmds::None);
        assert_eq!(
            si.get_pending_cmds_at(0.6),
            PendingCmds::Some(vec![Cmd::TakeOff])
        );
        assert_eq!(
            si.get_pending_cmds_at(2.0),
            PendingCmds::Some(vec![
                Cmd::Press(MoveKey::Forward),
                Cmd::Release(MoveKey::Forward)
            ])
        );
        assert_eq!(
            si.get_pending_cmds_at(3.0),
            PendingCmds::Some(vec![Cmd::MarkCheckpoint])
        );
        assert_eq!(si.get_pending_cmds_at(4.0), PendingCmds::EndOfScript);
    }

    #[test]
    fn test_script_errors() {
        assert!(matches!(
            ScriptInterpreter::from_script("# nothing here\n"),
            Err(ScriptError::ScriptEmpty)
        ));
        assert!(matches!(
            ScriptInterpreter::from_script("1.0: Dz;\n"),
            Err(ScriptError::InvalidCmd(t, CmdParseError::UnknownCommand(_))) if t == 1.0
        ));
        assert!(matches!(
            ScriptInterpreter::new("/this/script/does/not/exist.pcs"),
            Err(ScriptError::ScriptNotFound(_))
        ));
    }
}
