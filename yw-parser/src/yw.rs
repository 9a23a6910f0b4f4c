use std::{collections::{BTreeSet, HashSet}, fs, path::{Path, PathBuf}};

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use tracing::{debug, info, warn};
use xmltree::Element;

use crate::*;
use crate::merge::restore_order;
use crate::reader::parse_tree;


/// Decodes file content. Invalid UTF-8 falls back to windows-1252, signalled by the flag.
pub(crate) fn decode(bytes: &[u8], encoding: &'static Encoding) -> (String, bool) {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors && encoding == UTF_8 {
        let (text, _, _) = WINDOWS_1252.decode(bytes);
        return (text.into_owned(), true);
    }
    (text.into_owned(), false)
}

pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>, Error> {
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    fs::read(path).map_err(|source| Error::Read { path: path.to_path_buf(), source })
}

/// Writes `bytes` to `path`, keeping the previous file as `<path>.bak`.
/// If writing fails, the previous file is put back.
pub(crate) fn write_with_backup(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let mut backup = path.as_os_str().to_os_string();
    backup.push(".bak");
    let backup = PathBuf::from(backup);
    let had_file = path.is_file();
    if had_file {
        let readonly = fs::metadata(path).map(|m| m.permissions().readonly()).unwrap_or(false);
        if readonly {
            return Err(Error::WriteProtected(path.to_path_buf()));
        }
        fs::rename(path, &backup).map_err(|e| Error::write(path, e))?;
    }
    if let Err(e) = fs::write(path, bytes) {
        if had_file {
            restore_backup(&backup, path);
        }
        return Err(Error::write(path, e));
    }
    debug!("wrote {} bytes to \"{}\"", bytes.len(), path.display());
    Ok(())
}

/// Moves `backup` back to `path`. Returns false, with a warning, if that fails.
fn restore_backup(backup: &Path, path: &Path) -> bool {
    match fs::rename(backup, path) {
        Ok(()) => true,
        Err(e) => {
            warn!("could not restore \"{}\" from its backup \"{}\": {e}", path.display(), backup.display());
            false
        }
    }
}

fn keep_unlisted(before: &Project, project: &mut Project) {
    let chapters: HashSet<String> = project.chapters.keys().cloned().collect();
    restore_order(&mut project.chapter_order, &before.chapter_order, |c| chapters.contains(c));
    let listed: HashSet<String> = project.chapters.values().flat_map(|c| c.scene_order.iter().cloned()).collect();
    for (id, old) in &before.chapters {
        if let Some(chapter) = project.chapters.get_mut(id) {
            restore_order(&mut chapter.scene_order, &old.scene_order, |s| !listed.contains(s));
        }
    }
}


/// A yWriter project file on disk.
///
/// Reading keeps the parsed tree, so writing only touches what the [Project] knows
/// and leaves everything else in the file as it was.
#[derive(Debug)]
pub struct YwFile {
    path: PathBuf,
    format: FileFormat,
    config: ReaderConfig,
    pub project: Project,
    tree: Option<Element>,
    cdata_tags: BTreeSet<String>,
}

impl YwFile {
    /// Fails with [Error::UnsupportedType] for extensions other than `.yw7`, `.yw6` and `.yw5`.
    pub fn new(path: impl Into<PathBuf>, config: ReaderConfig) -> Result<Self, Error> {
        let path = path.into();
        let format = FileFormat::from_path(&path).ok_or_else(|| Error::UnsupportedType(path.clone()))?;
        Ok(YwFile { path, format, config, project: Project::new(), tree: None, cdata_tags: BTreeSet::new() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// yWriter creates this file while the project is open.
    pub fn lock_path(&self) -> PathBuf {
        let mut lock = self.path.as_os_str().to_os_string();
        lock.push(".lock");
        PathBuf::from(lock)
    }

    pub fn is_locked(&self) -> bool {
        self.lock_path().exists()
    }

    fn check_lock(&self) -> Result<(), Error> {
        if self.is_locked() {
            return Err(Error::Locked(self.path.clone()));
        }
        Ok(())
    }

    /// Reads the file. The previous project is only replaced if reading succeeds.
    pub fn read(&mut self) -> Result<ReadSummary, Error> {
        let bytes = read_bytes(&self.path)?;
        self.check_lock()?;
        let (text, fallback) = decode(&bytes, self.format.encoding());
        let mut summary = self.load(&text).map_err(|e| e.at(&self.path))?;
        if fallback {
            summary.warnings.insert(0, Warning::EncodingFallback);
        }
        info!("read {} scenes from \"{}\"", summary.scenes, self.path.display());
        Ok(summary)
    }

    /// Reads the project from already decoded text.
    pub fn load(&mut self, text: &str) -> Result<ReadSummary, Error> {
        let root = parse_tree(text)?;
        let (project, warnings) = read_tree(&root, self.format, &self.config)?;
        self.cdata_tags = discover_cdata_tags(text);
        self.project = project;
        self.tree = Some(root);
        Ok(ReadSummary { scenes: self.project.scenes.len(), warnings })
    }

    /// Merges `source` into the project. If the source brought scene content, scenes carrying heading markers are split.
    /// Chapters and scenes the source leaves out, like those an export skips, keep their place.
    pub fn merge(&mut self, source: &Project) -> MergeReport {
        let before = self.project.clone();
        let report = merge(&mut self.project, source);
        keep_unlisted(&before, &mut self.project);
        let has_content = source.scenes.values().any(|s| s.content().is_some());
        if has_content && split_scenes(&mut self.project) {
            info!("split scenes at heading markers");
        }
        report
    }

    fn render(&self) -> Result<(Element, String), Error> {
        let root = build_tree(&self.project, self.format, self.tree.clone());
        let xml = PostProcessor::new(self.format)
            .with_tags(self.cdata_tags.iter().cloned())
            .with_tags(self.config.extra_cdata_tags.iter().cloned())
            .serialize(&root)?;
        Ok((root, xml))
    }

    /// The text [YwFile::write] would write.
    pub fn to_xml(&self) -> Result<String, Error> {
        self.render().map(|(_, xml)| xml).map_err(|e| e.at(&self.path))
    }

    /// Writes the project, keeping the previous file as a backup.
    pub fn write(&mut self) -> Result<PathBuf, Error> {
        self.check_lock()?;
        let (root, xml) = self.render().map_err(|e| e.at(&self.path))?;
        let bytes = PostProcessor::new(self.format).encode(&xml);
        write_with_backup(&self.path, &bytes)?;
        self.tree = Some(root);
        info!("wrote \"{}\"", self.path.display());
        Ok(self.path.clone())
    }
}

impl Source for YwFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn description(&self) -> &'static str {
        self.format.description()
    }

    fn read(&mut self) -> Result<ReadSummary, Error> {
        YwFile::read(self)
    }

    fn project(&self) -> &Project {
        &self.project
    }
}

impl Target for YwFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn description(&self) -> &'static str {
        self.format.description()
    }

    fn load_existing(&mut self) -> Result<Option<ReadSummary>, Error> {
        if self.path.exists() {
            YwFile::read(self).map(Some)
        } else {
            Ok(None)
        }
    }

    fn is_established(&self) -> bool {
        self.tree.is_some()
    }

    fn merge(&mut self, source: &Project) -> MergeReport {
        YwFile::merge(self, source)
    }

    fn write(&mut self) -> Result<PathBuf, Error> {
        YwFile::write(self)
    }
}
