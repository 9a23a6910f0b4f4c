use std::{fs, path::{Path, PathBuf}};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use yw_parser::{FileFormat, HtmlExport, HtmlImport, ReaderConfig, Source, Target, Templates, YwFile, HTML_EXTENSION};

use crate::ui::Ui;


/// Settings from the configuration file, overridden by command line flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Appended to the project name to name the HTML document.
    pub suffix: String,
    /// Directory with template files.
    pub templates: Option<PathBuf>,
    /// Shown instead of "Chapter " in exported chapter titles.
    pub chapter_title_prefix: Option<String>,
    pub suppress_title_marker: char,
    pub extra_cdata_tags: Vec<String>,
    /// Refuse to write an existing project if the document brings entities it doesn't know.
    pub strict_structure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            suffix: String::new(),
            templates: None,
            chapter_title_prefix: None,
            suppress_title_marker: '@',
            extra_cdata_tags: vec![],
            strict_structure: true,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|_| Error::FileNotFound(path.display().to_string()))?;
        toml::from_str(&text).map_err(|source| Error::Config { path: path.display().to_string(), source })
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            suppress_title_marker: self.suppress_title_marker,
            extra_cdata_tags: self.extra_cdata_tags.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not open file: {0}")]
    FileNotFound(String),
    #[error("Could not open directory: {0}")]
    DirNotFound(String),
    #[error("Invalid configuration file {path}: {source}")]
    Config {
        path: String,
        source: toml::de::Error,
    },
}

/// How a conversion ended, if it didn't fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Written(PathBuf),
    /// The user declined to overwrite the output.
    Aborted,
}


fn stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// The HTML document of a project: `<project><suffix>.html` next to it.
pub fn export_path(project: &Path, suffix: &str) -> PathBuf {
    project.with_file_name(format!("{}{suffix}.{HTML_EXTENSION}", stem(project)))
}

/// The project file a document was exported from, preferring `.yw7` over `.yw6` over `.yw5`.
pub fn project_for(document: &Path, suffix: &str) -> Option<PathBuf> {
    let name = stem(document);
    let name = name.strip_suffix(suffix).filter(|n| !n.is_empty())?;
    FileFormat::ALL.into_iter()
        .map(|f| document.with_file_name(format!("{name}.{}", f.extension())))
        .find(|p| p.is_file())
}

/// The project file created for a document without one.
pub fn created_path(document: &Path, suffix: &str) -> PathBuf {
    let name = stem(document);
    let name = name.strip_suffix(suffix).filter(|n| !n.is_empty()).unwrap_or(&name);
    document.with_file_name(format!("{name}.{}", FileFormat::Yw7.extension()))
}

fn is_document(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(HTML_EXTENSION) || e.eq_ignore_ascii_case("htm"))
        .unwrap_or(false)
}


/// Runs conversions between project files and HTML documents.
pub struct Converter<U: Ui> {
    pub ui: U,
    pub config: Config,
}

impl<U: Ui> Converter<U> {
    pub fn new(ui: U, config: Config) -> Self {
        Converter { ui, config }
    }

    /// Reads `source`, merges it into `target` and writes the target.
    /// Any failing step stops the conversion, leaving the target file as it was.
    pub fn convert(&mut self, source: &mut dyn Source, target: &mut dyn Target) -> Result<Outcome, yw_parser::Error> {
        self.ui.set_info_what(&format!(
            "Input: {} \"{}\"\nOutput: {} \"{}\"",
            source.description(), source.path().display(), target.description(), target.path().display(),
        ));
        let result = self.run_steps(source, target);
        match &result {
            Ok(Outcome::Written(path)) => self.ui.set_info_how(&format!("File written: \"{}\".", path.display())),
            Ok(Outcome::Aborted) => self.ui.set_info_how("Action canceled by user."),
            Err(e) => self.ui.set_info_how(&format!("Error: {e}")),
        }
        result
    }

    fn run_steps(&mut self, source: &mut dyn Source, target: &mut dyn Target) -> Result<Outcome, yw_parser::Error> {
        if target.path().exists() && !self.ui.confirm_overwrite(target.path()) {
            return Ok(Outcome::Aborted);
        }
        let summary = source.read()?;
        for w in &summary.warnings {
            warn!("{}: {w}", source.path().display());
        }
        if let Some(existing) = target.load_existing()? {
            for w in &existing.warnings {
                warn!("{}: {w}", target.path().display());
            }
        }
        let report = target.merge(source.project());
        if target.is_established() && !report.is_clean() {
            for w in report.warnings() {
                warn!("{}: {w}", target.path().display());
            }
            if self.config.strict_structure {
                return Err(yw_parser::Error::StructuralMismatch {
                    path: target.path().to_path_buf(),
                    count: report.mismatches.len(),
                });
            }
        }
        debug!("merged {} scenes", summary.scenes);
        target.write().map(Outcome::Written)
    }

    fn templates(&self) -> Result<Templates, yw_parser::Error> {
        match &self.config.templates {
            Some(dir) => Templates::from_dir(dir),
            None => Ok(Templates::default()),
        }
    }

    /// Exports a project file to its HTML document.
    pub fn export(&mut self, project: &Path) -> Result<Outcome, yw_parser::Error> {
        let mut source = YwFile::new(project, self.config.reader_config())?;
        let mut target = HtmlExport::new(export_path(project, &self.config.suffix), self.templates()?)
            .with_project_path(project)
            .with_chapter_prefix(self.config.chapter_title_prefix.clone());
        self.convert(&mut source, &mut target)
    }

    /// Merges a document into the project it was exported from, or creates a new project.
    pub fn import(&mut self, document: &Path) -> Result<Outcome, yw_parser::Error> {
        let project = project_for(document, &self.config.suffix)
            .unwrap_or_else(|| created_path(document, &self.config.suffix));
        let mut source = HtmlImport::new(document);
        let mut target = YwFile::new(project, self.config.reader_config())?;
        self.convert(&mut source, &mut target)
    }

    /// Exports project files and imports documents.
    pub fn run(&mut self, path: &Path) -> Result<Outcome, yw_parser::Error> {
        if FileFormat::from_path(path).is_some() {
            self.export(path)
        } else if is_document(path) {
            self.import(path)
        } else {
            Err(yw_parser::Error::UnsupportedType(path.to_path_buf()))
        }
    }
}
