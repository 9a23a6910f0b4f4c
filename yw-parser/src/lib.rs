//! # yw_parser
//!
//! The [Project] struct and its entities describe a yWriter novel project.
//! A project is read from a `.yw7`, `.yw6` or `.yw5` file with a [YwFile] or [parse_yw],
//! other projects can be merged into it with [merge], and it is written back with [YwFile::write] or [serialize_yw].
//! Writing reuses the tree that was read, so elements this crate does not know about survive a round trip.
//!
//! With the `html` feature, a project can be exported to HTML through templates and edited HTML documents can be read back.


use std::path::{Path, PathBuf};

use thiserror::Error;

mod model;
pub use model::*;

mod format;
pub use format::FileFormat;

mod reader;
pub use reader::*;

mod merge;
pub use merge::*;

mod writer;
pub use writer::*;

mod postprocess;
pub use postprocess::*;

mod split;
pub use split::*;

mod yw;
pub use yw::*;

mod mapping;
pub use mapping::*;

#[cfg(feature = "html")]
mod html;
#[cfg(feature = "html")]
pub use html::*;

#[cfg(feature = "html")]
mod html_import;
#[cfg(feature = "html")]
pub use html_import::*;


/// Possible errors. Every variant names the file it concerns.
#[derive(Error, Debug)]
pub enum Error {
    /// The file does not exist.
    #[error("File not found: \"{}\"", .0.display())]
    NotFound(PathBuf),
    /// A `.lock` file next to the project says yWriter has it open.
    #[error("yWriter seems to be open, please close it first: \"{}\"", .0.display())]
    Locked(PathBuf),
    /// The extension doesn't belong to a known file type.
    #[error("File type is not supported: \"{}\"", .0.display())]
    UnsupportedType(PathBuf),
    /// The file isn't well-formed or lacks a mandatory element.
    #[error("Cannot process file \"{}\": {reason}", path.display())]
    Malformed {
        path: PathBuf,
        reason: String,
    },
    /// A merge brought in entities the existing project doesn't know.
    #[error("Project structure mismatch in \"{}\": {count} unknown element(s)", path.display())]
    StructuralMismatch {
        path: PathBuf,
        count: usize,
    },
    /// The operating system refused to write the file.
    #[error("Cannot write \"{}\", the file is write protected", .0.display())]
    WriteProtected(PathBuf),
    #[error("Cannot read file \"{}\": {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot write file \"{}\": {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn malformed(reason: impl ToString) -> Self {
        Error::Malformed { path: PathBuf::new(), reason: reason.to_string() }
    }

    /// Attaches a path to errors raised before the file was known.
    pub(crate) fn at(self, path: &Path) -> Self {
        match self {
            Error::Malformed { path: p, reason } if p.as_os_str().is_empty() => Error::Malformed { path: path.to_path_buf(), reason },
            e => e,
        }
    }

    pub(crate) fn write(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Error::WriteProtected(path.to_path_buf())
        } else {
            Error::Write { path: path.to_path_buf(), source }
        }
    }
}

/// Possible warnings while reading or merging.
/// Data that doesn't fit the model is dropped with a warning instead of failing the whole file.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// The root element isn't the one the file extension promises.
    RootTagUnexpected {
        expected: &'static str,
        found: String,
    },
    /// An entity without an `ID` element has been discarded.
    IdMissing(EntityKind),
    /// A status outside 1-5 has been discarded.
    /// The arguments are the scene id and the value found.
    SceneStatusInvalid(String, String),
    /// A reference to an entity that doesn't exist has been dropped.
    ReferenceDangling {
        kind: EntityKind,
        owner: String,
        id: String,
    },
    /// A scene listed by more than one chapter has been kept in the first one only.
    SceneDuplicated(String),
    /// The file wasn't valid UTF-8 and has been decoded as windows-1252.
    EncodingFallback,
    /// An imported scene appears before any chapter and has been discarded.
    SceneOutsideChapter(String),
    /// The merge created an entity the target didn't have.
    EntityAdded(EntityKind, String),
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::RootTagUnexpected { expected, found } => write!(f, "Root element is <{found}>, expected <{expected}>."),
            Warning::IdMissing(kind) => write!(f, "A {kind} without ID has been discarded."),
            Warning::SceneStatusInvalid(scene, value) => write!(f, "Scene \"{scene}\" has the invalid status \"{value}\", which has been discarded."),
            Warning::ReferenceDangling { kind, owner, id } => write!(f, "\"{owner}\" refers to the unknown {kind} \"{id}\", the reference has been dropped."),
            Warning::SceneDuplicated(scene) => write!(f, "Scene \"{scene}\" is listed by more than one chapter, using the first occurrence."),
            Warning::EncodingFallback => write!(f, "File is not valid UTF-8 and has been read as windows-1252."),
            Warning::SceneOutsideChapter(scene) => write!(f, "Scene \"{scene}\" is not inside a chapter and has been discarded."),
            Warning::EntityAdded(kind, id) => write!(f, "The project had no {kind} \"{id}\", it has been added."),
        }
    }
}

/// The result of a successful read.
#[derive(Debug, Clone, Default)]
pub struct ReadSummary {
    pub scenes: usize,
    pub warnings: Vec<Warning>,
}

/// Something a [Project] can be read from.
pub trait Source {
    fn path(&self) -> &Path;
    /// Human readable kind of file, for status messages.
    fn description(&self) -> &'static str;
    /// Reads the file. On failure the previously read project stays in place.
    fn read(&mut self) -> Result<ReadSummary, Error>;
    fn project(&self) -> &Project;
}

/// Something a [Project] can be merged into and written out.
pub trait Target {
    fn path(&self) -> &Path;
    fn description(&self) -> &'static str;
    /// Reads the existing file, if there is one, so the merge has something to update.
    fn load_existing(&mut self) -> Result<Option<ReadSummary>, Error> {
        Ok(None)
    }
    /// Whether the target holds an existing project that a merge must not restructure.
    fn is_established(&self) -> bool {
        false
    }
    fn merge(&mut self, source: &Project) -> MergeReport;
    fn write(&mut self) -> Result<PathBuf, Error>;
}
