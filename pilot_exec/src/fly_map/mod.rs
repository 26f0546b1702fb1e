//! # Fly map module
//!
//! The fly map is an undirected graph of checkpoints marked by the operator. Checkpoint ids are
//! allocated from 1 upwards and never freed, so they always form the contiguous range
//! `1..=len`. Checkpoints are stored in id order and every iteration (persistence, lookup) walks
//! them in that order.
//!
//! The map is persisted in a subset of the Wavefront OBJ format:
//!
//! ```text
//! mtllib map.mtl
//! o FlyMap
//! v 1.000000 2.000000 3.000000
//! v 4.000000 5.000000 6.000000
//! l 1 2
//! ```
//!
//! `v` lines are checkpoints in id order, `l` lines are edges written once each as `min max`.
//! Parsing is tolerant: unknown directives and malformed numbers are logged and skipped (numbers
//! fall back to zero), only I/O failures are errors.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{
    borrow::Cow,
    collections::HashSet,
    fmt::Write as _,
    fs,
    io::{BufRead, BufReader, Write},
    path::Path,
    str::FromStr,
};

use log::warn;
use parking_lot::RwLock;
use thiserror::Error;

use util::maths::V3D;

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// Identifier of a checkpoint within a map, starting at 1.
pub type CheckpointId = u32;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A waypoint in the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub position: V3D,

    /// Linked checkpoints in the order the links were made.
    pub neighbours: Vec<CheckpointId>,
}

/// A thread safe checkpoint graph.
///
/// Every operation takes the map's lock, so a map can be shared between threads behind an `Arc`.
#[derive(Debug, Default)]
pub struct FlyMap {
    data: RwLock<FlyMapData>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct FlyMapData {
    name: String,
    mtl_lib: String,

    /// Checkpoint with id `n` lives at index `n - 1`.
    checkpoints: Vec<Checkpoint>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FlyMapError {
    #[error("Checkpoint {0} isn't found")]
    NotFound(CheckpointId),

    #[error("Checkpoint {0} cannot be linked to itself")]
    SelfLink(CheckpointId),

    #[error("Checkpoints {0} and {1} are already linked")]
    AlreadyLinked(CheckpointId, CheckpointId),

    #[error("Map file I/O error: {0}")]
    Io(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FlyMap {
    /// Create an empty map.
    pub fn new(name: &str, mtl_lib: &str) -> Self {
        Self {
            data: RwLock::new(FlyMapData {
                name: name.into(),
                mtl_lib: mtl_lib.into(),
                checkpoints: Vec::new(),
            }),
        }
    }

    pub fn name(&self) -> String {
        self.data.read().name.clone()
    }

    pub fn mtl_lib(&self) -> String {
        self.data.read().mtl_lib.clone()
    }

    /// Number of checkpoints in the map.
    pub fn len(&self) -> usize {
        self.data.read().checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add an unlinked checkpoint at the given position, returning its id.
    ///
    /// The id is the smallest one not already in use.
    pub fn add_checkpoint(&self, position: V3D) -> CheckpointId {
        self.data.write().add_checkpoint(position)
    }

    /// Link two checkpoints together.
    ///
    /// If either checkpoint doesn't exist, the checkpoints are the same, or the link already exists
    /// a warning is logged and the map is left unchanged.
    pub fn link_checkpoint(&self, from: CheckpointId, to: CheckpointId) -> Result<(), FlyMapError> {
        self.data.write().link_checkpoint(from, to)
    }

    /// Get the position of a checkpoint.
    pub fn get_checkpoint(&self, id: CheckpointId) -> Result<V3D, FlyMapError> {
        self.data.read().get(id).map(|c| c.position)
    }

    /// Get the ids linked to a checkpoint, in the order the links were made.
    pub fn neighbours(&self, id: CheckpointId) -> Result<Vec<CheckpointId>, FlyMapError> {
        self.data.read().get(id).map(|c| c.neighbours.clone())
    }

    /// Snapshot of every checkpoint, in id order.
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.data.read().checkpoints.clone()
    }

    /// Serialize the map into its text form.
    pub fn serialize(&self) -> String {
        self.data.read().serialize()
    }

    /// Write the map's text form to the writer.
    ///
    /// The map is serialized under the lock, the write itself happens after it is released.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), FlyMapError> {
        let text = self.serialize();

        writer.write_all(text.as_bytes()).map_err(FlyMapError::Io)?;
        writer.flush().map_err(FlyMapError::Io)
    }

    /// Parse a map from its text form.
    pub fn parse(text: &str) -> Self {
        let mut data = FlyMapData::default();

        for line in text.lines() {
            data.parse_line(line);
        }

        Self {
            data: RwLock::new(data),
        }
    }

    /// Read a map from a buffered reader.
    ///
    /// Lines which aren't valid UTF-8 are decoded lossily and parsed like any other line.
    pub fn read_from<R: BufRead>(mut reader: R) -> Result<Self, FlyMapError> {
        let mut data = FlyMapData::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).map_err(FlyMapError::Io)? == 0 {
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            if let Cow::Owned(_) = line {
                warn!("Map line is not valid UTF-8: {:?}", line);
            }

            data.parse_line(&line);
        }

        Ok(Self {
            data: RwLock::new(data),
        })
    }

    /// Load a map from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FlyMapError> {
        let file = fs::File::open(path).map_err(FlyMapError::Io)?;

        Self::read_from(BufReader::new(file))
    }

    /// Save the map to a file, creating any missing parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), FlyMapError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(FlyMapError::Io)?;
        }

        let file = fs::File::create(path).map_err(FlyMapError::Io)?;

        self.write_to(file)
    }
}

impl PartialEq for FlyMap {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }

        *self.data.read() == *other.data.read()
    }
}

impl FlyMapData {
    fn get(&self, id: CheckpointId) -> Result<&Checkpoint, FlyMapError> {
        index(id)
            .and_then(|i| self.checkpoints.get(i))
            .ok_or(FlyMapError::NotFound(id))
    }

    fn add_checkpoint(&mut self, position: V3D) -> CheckpointId {
        let id = self.checkpoints.len() as CheckpointId + 1;

        self.checkpoints.push(Checkpoint {
            id,
            position,
            neighbours: Vec::new(),
        });

        id
    }

    fn link_checkpoint(&mut self, from: CheckpointId, to: CheckpointId) -> Result<(), FlyMapError> {
        let result = self.check_link(from, to);

        match result {
            Ok((from_idx, to_idx)) => {
                self.checkpoints[from_idx].neighbours.push(to);
                self.checkpoints[to_idx].neighbours.push(from);
                Ok(())
            }
            Err(e) => {
                warn!("Cannot link checkpoints {} and {}: {}", from, to, e);
                Err(e)
            }
        }
    }

    /// Check a link can be made, returning the indices of both ends.
    fn check_link(
        &self,
        from: CheckpointId,
        to: CheckpointId,
    ) -> Result<(usize, usize), FlyMapError> {
        let from_cp = self.get(from)?;
        self.get(to)?;

        if from == to {
            return Err(FlyMapError::SelfLink(from));
        }

        if from_cp.neighbours.contains(&to) {
            return Err(FlyMapError::AlreadyLinked(from, to));
        }

        // Both ids were just found, so they are valid indices
        Ok(((from - 1) as usize, (to - 1) as usize))
    }

    fn serialize(&self) -> String {
        let mut text = String::new();

        // Writing to a String cannot fail, so the results are ignored
        writeln!(text, "mtllib {}", self.mtl_lib).ok();
        writeln!(text, "o {}", self.name).ok();

        for cp in self.checkpoints.iter() {
            writeln!(
                text,
                "v {:.6} {:.6} {:.6}",
                cp.position.x, cp.position.y, cp.position.z
            )
            .ok();
        }

        let mut linked: HashSet<(CheckpointId, CheckpointId)> = HashSet::new();

        for cp in self.checkpoints.iter() {
            for &next in cp.neighbours.iter() {
                let key = (cp.id.min(next), cp.id.max(next));

                if linked.insert(key) {
                    writeln!(text, "l {} {}", key.0, key.1).ok();
                }
            }
        }

        text
    }

    fn parse_line(&mut self, line: &str) {
        let line = line.trim();

        let (directive, rest) = match line.find(' ') {
            Some(i) => (&line[..i], line[i + 1..].trim()),
            None => (line, ""),
        };

        match directive {
            "" => (),
            "o" => {
                if rest.is_empty() {
                    warn!("Broken name line: {:?}", line);
                } else {
                    self.name = rest.into();
                }
            }
            "mtllib" => {
                if rest.is_empty() {
                    warn!("Broken material library line: {:?}", line);
                } else {
                    self.mtl_lib = rest.into();
                }
            }
            "v" => {
                let fields: Vec<&str> = rest.split_whitespace().collect();
                if fields.len() < 3 {
                    warn!("Broken vertex line: {:?}", line);
                    return;
                }

                self.add_checkpoint(V3D::new(
                    parse_or_zero(fields[0]),
                    parse_or_zero(fields[1]),
                    parse_or_zero(fields[2]),
                ));
            }
            "l" => {
                let fields: Vec<&str> = rest.split_whitespace().collect();
                if fields.len() < 2 {
                    warn!("Broken link line: {:?}", line);
                    return;
                }

                // Failures are logged by the link itself
                self.link_checkpoint(parse_or_zero(fields[0]), parse_or_zero(fields[1]))
                    .ok();
            }
            d => warn!("Unknown map directive {:?}, line skipped", d),
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn index(id: CheckpointId) -> Option<usize> {
    (id as usize).checked_sub(1)
}

/// Parse a number, logging a warning and returning zero if it's malformed.
fn parse_or_zero<T: FromStr + Default>(s: &str) -> T {
    match s.parse() {
        Ok(v) => v,
        Err(_) => {
            warn!("Cannot convert {:?} to a number, using 0", s);
            T::default()
        }
    }
}
