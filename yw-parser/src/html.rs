use std::{collections::BTreeMap, fs, path::{Path, PathBuf}, sync::OnceLock};

use encoding_rs::UTF_8;
use regex::{Captures, Regex};
use tracing::{debug, info};

use crate::*;
use crate::yw::{decode, read_bytes, write_with_backup};


pub const HTML_EXTENSION: &str = "html";

/// Title of the unused chapter whose scenes override templates.
pub const TEMPLATE_CHAPTER_TITLE: &str = "html templates";

pub const DEFAULT_HEADER: &str = r#"<html>
<head>
<meta http-equiv="Content-Type" content="text/html; charset=utf-8"/>

<style type="text/css">
h1, h2, h3, h4, p {font: 1em monospace; margin: 3em; line-height: 1.5em}
h1, h2, h3, h4 {text-align: center}
h1 {letter-spacing: 0.5em; font-style: italic}
h1, h2 {font-weight: bold}
h3 {font-style: italic}
p {margin-top:0; margin-bottom:0}
p+p {margin-top:0; margin-bottom:0; text-indent: 1em}
p.title {text-align:center; font-weight:normal; text-transform: uppercase}
p.author {text-align:center; font-weight:normal}
p.scenedivider {text-align:center; margin: 1.5em; line-height: 1.5em}
strong {font-weight:normal; text-transform: uppercase}
</style>

<title>$Title</title>
</head>

<body>
<p class=title><strong>$Title</strong></p>
<p class=author>by</p>
<p class=author>$AuthorName</p>

"#;

pub const DEFAULT_PART: &str = "<h1><a name=\"ChID:$ID\" />$Title</h1>\n";
pub const DEFAULT_CHAPTER: &str = "<h2><a name=\"ChID:$ID\" />$Title</h2>\n";
pub const DEFAULT_SCENE: &str = "<a name=\"ScID:$ID\" /><!-- ${Title} -->\n<p>$SceneContent</p>\n";
pub const DEFAULT_SCENE_DIVIDER: &str = "<p class=\"scenedivider\">* * *</p>\n";
pub const DEFAULT_FOOTER: &str = "</body>\n</html>\n";

/// The template slots of an HTML export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TemplateName {
    Header,
    Character,
    Location,
    Item,
    ProjectNote,
    Footer,
    Part,
    Chapter,
    ChapterEnd,
    UnusedChapter,
    UnusedChapterEnd,
    NotesChapter,
    NotesChapterEnd,
    TodoChapter,
    TodoChapterEnd,
    Scene,
    FirstScene,
    UnusedScene,
    NotesScene,
    TodoScene,
    SceneDivider,
}

impl TemplateName {
    pub const ALL: [TemplateName; 21] = [
        TemplateName::Header, TemplateName::Character, TemplateName::Location, TemplateName::Item, TemplateName::ProjectNote,
        TemplateName::Footer,
        TemplateName::Part, TemplateName::Chapter, TemplateName::ChapterEnd,
        TemplateName::UnusedChapter, TemplateName::UnusedChapterEnd, TemplateName::NotesChapter, TemplateName::NotesChapterEnd,
        TemplateName::TodoChapter, TemplateName::TodoChapterEnd,
        TemplateName::Scene, TemplateName::FirstScene, TemplateName::UnusedScene, TemplateName::NotesScene, TemplateName::TodoScene,
        TemplateName::SceneDivider,
    ];

    /// The name of the template file without extension, also the title of an overriding scene.
    pub fn name(self) -> &'static str {
        match self {
            TemplateName::Header => "html_header",
            TemplateName::Character => "character_template",
            TemplateName::Location => "location_template",
            TemplateName::Item => "item_template",
            TemplateName::ProjectNote => "project_note_template",
            TemplateName::Footer => "html_footer",
            TemplateName::Part => "part_template",
            TemplateName::Chapter => "chapter_template",
            TemplateName::ChapterEnd => "chapter_end_template",
            TemplateName::UnusedChapter => "unused_chapter_template",
            TemplateName::UnusedChapterEnd => "unused_chapter_end_template",
            TemplateName::NotesChapter => "notes_chapter_template",
            TemplateName::NotesChapterEnd => "notes_chapter_end_template",
            TemplateName::TodoChapter => "todo_chapter_template",
            TemplateName::TodoChapterEnd => "todo_chapter_end_template",
            TemplateName::Scene => "scene_template",
            TemplateName::FirstScene => "first_scene_template",
            TemplateName::UnusedScene => "unused_scene_template",
            TemplateName::NotesScene => "notes_scene_template",
            TemplateName::TodoScene => "todo_scene_template",
            TemplateName::SceneDivider => "scene_divider",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn file_name(self) -> String {
        format!("{}.{HTML_EXTENSION}", self.name())
    }
}

/// The template set of an HTML export.
/// An empty or missing template means the entities using it are left out.
#[derive(Debug, Clone, PartialEq)]
pub struct Templates {
    map: BTreeMap<TemplateName, String>,
}

impl Default for Templates {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(TemplateName::Header, DEFAULT_HEADER.to_string());
        map.insert(TemplateName::Part, DEFAULT_PART.to_string());
        map.insert(TemplateName::Chapter, DEFAULT_CHAPTER.to_string());
        map.insert(TemplateName::Scene, DEFAULT_SCENE.to_string());
        map.insert(TemplateName::SceneDivider, DEFAULT_SCENE_DIVIDER.to_string());
        map.insert(TemplateName::Footer, DEFAULT_FOOTER.to_string());
        Templates { map }
    }
}

impl Templates {
    /// A template set without any template.
    pub fn empty() -> Self {
        Templates { map: BTreeMap::new() }
    }

    pub fn get(&self, name: TemplateName) -> Option<&str> {
        self.map.get(&name).map(|t| t.as_str()).filter(|t| !t.is_empty())
    }

    pub fn set(&mut self, name: TemplateName, template: impl Into<String>) {
        self.map.insert(name, template.into());
    }

    /// The built-in templates, overridden by the template files found in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, Error> {
        if !dir.is_dir() {
            return Err(Error::NotFound(dir.to_path_buf()));
        }
        let mut templates = Templates::default();
        for name in TemplateName::ALL {
            let path = dir.join(name.file_name());
            if path.is_file() {
                let (text, _) = decode(&read_bytes(&path)?, UTF_8);
                debug!("template {} from \"{}\"", name.name(), path.display());
                templates.set(name, text);
            }
        }
        Ok(templates)
    }

    /// Writes every non-empty template into `dir` and returns the written files.
    pub fn write_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, Error> {
        fs::create_dir_all(dir).map_err(|e| Error::write(dir, e))?;
        let mut written = vec![];
        for name in TemplateName::ALL {
            if let Some(template) = self.get(name) {
                let path = dir.join(name.file_name());
                fs::write(&path, template).map_err(|e| Error::write(&path, e))?;
                written.push(path);
            }
        }
        Ok(written)
    }

    /// Overrides templates with the scenes of the project's template chapter.
    pub fn apply_project(&mut self, project: &Project) {
        for chapter in project.chapters.values() {
            if !is_template_chapter(chapter) {
                continue;
            }
            for s in &chapter.scene_order {
                let Some(scene) = project.scenes.get(s) else {
                    continue;
                };
                if let (Some(name), Some(content)) = (scene.title.as_deref().and_then(TemplateName::from_name), scene.content()) {
                    debug!("template {} from the project", name.name());
                    self.set(name, content);
                }
            }
        }
    }
}

fn is_template_chapter(chapter: &Chapter) -> bool {
    chapter.unused() && chapter.title.as_deref() == Some(TEMPLATE_CHAPTER_TITLE)
}


fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(?:(\$)|\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap())
}

/// Replaces `$Name` and `${Name}` placeholders. `$$` is a literal `$`, unknown placeholders stay as they are.
pub fn substitute(template: &str, mapping: &Mapping) -> String {
    placeholder().replace_all(template, |c: &Captures| {
        if c.get(1).is_some() {
            return "$".to_string();
        }
        let name = c.get(2).or_else(|| c.get(3)).map(|m| m.as_str()).unwrap_or("");
        match mapping.get(name) {
            Some(value) => value.clone(),
            None => c[0].to_string(),
        }
    }).into_owned()
}

const SPECIAL_CODES: [&str; 6] = ["HTM", "TEX", "RTF", "epub", "mobi", "rtfimg"];

fn special_codes() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| SPECIAL_CODES.iter().map(|code| Regex::new(&format!(r"<{code} .+?/{code}>")).unwrap()).collect())
}

fn leftover_codes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[/?[hcrs]\d*\]").unwrap())
}

const HTML_REPLACEMENTS: [(&str, &str); 11] = [
    ("\n", "</p>\n<p>"),
    ("[i]", "<em>"),
    ("[/i]", "</em>"),
    ("[b]", "<strong>"),
    ("[/b]", "</strong>"),
    ("[u]", "<u>"),
    ("[/u]", "</u>"),
    ("<p></p>", "<p><br /></p>"),
    ("/*", "<!--"),
    ("*/", "-->"),
    ("\r", ""),
];

/// Converts yWriter markup to HTML.
pub fn yw_to_html(text: &str) -> String {
    let mut text = text.replace("<RTFBRK>", "");
    for re in special_codes() {
        text = re.replace_all(&text, "").into_owned();
    }
    let mut text = text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");
    for (yw, html) in HTML_REPLACEMENTS {
        text = text.replace(yw, html);
    }
    leftover_codes().replace_all(&text, "").into_owned()
}


/// Renders a project through templates.
pub struct Renderer<'a> {
    templates: &'a Templates,
    mapper: Mapper<'a>,
}

impl<'a> Renderer<'a> {
    pub fn new(templates: &'a Templates, mapper: Mapper<'a>) -> Self {
        Renderer { templates, mapper }
    }

    fn apply(&self, name: TemplateName, mapping: Mapping, out: &mut String) {
        if let Some(template) = self.templates.get(name) {
            out.push_str(&substitute(template, &mapping));
        }
    }

    pub fn render(&self) -> String {
        let project = self.mapper.project;
        let mut out = String::new();
        self.apply(TemplateName::Header, self.mapper.project(), &mut out);
        self.chapters(&mut out);
        for id in ordered_ids(&project.character_order, &project.characters) {
            self.apply(TemplateName::Character, self.mapper.character(id), &mut out);
        }
        for id in ordered_ids(&project.location_order, &project.locations) {
            self.apply(TemplateName::Location, self.mapper.location(id), &mut out);
        }
        for id in ordered_ids(&project.item_order, &project.items) {
            self.apply(TemplateName::Item, self.mapper.item(id), &mut out);
        }
        for id in ordered_ids(&project.project_note_order, &project.project_notes) {
            self.apply(TemplateName::ProjectNote, self.mapper.project_note(id), &mut out);
        }
        self.apply(TemplateName::Footer, self.mapper.project(), &mut out);
        out
    }

    fn chapters(&self, out: &mut String) {
        let project = self.mapper.project;
        let mut chapter_number = 0;
        let mut totals = Totals::default();
        for id in project.chapters_in_order() {
            let Some(chapter) = project.chapters.get(id) else {
                continue;
            };
            if chapter.trash() || is_template_chapter(chapter) {
                continue;
            }
            let scenes: Vec<&Scene> = chapter.scene_order.iter().filter_map(|s| project.scenes.get(s)).collect();
            let not_exported = !scenes.is_empty() && scenes.iter().all(|s| s.do_not_export.unwrap_or(false));

            let mut number = 0;
            let (start, end) = match chapter.kind() {
                ContentType::Todo => (Some(TemplateName::TodoChapter), Some(TemplateName::TodoChapterEnd)),
                ContentType::Notes => (Some(TemplateName::NotesChapter), Some(TemplateName::NotesChapterEnd)),
                ContentType::Normal if chapter.unused() => (Some(TemplateName::UnusedChapter), Some(TemplateName::UnusedChapterEnd)),
                ContentType::Normal if not_exported => (None, None),
                ContentType::Normal if chapter.is_part() && self.templates.get(TemplateName::Part).is_some() => {
                    (Some(TemplateName::Part), Some(TemplateName::ChapterEnd))
                }
                ContentType::Normal => {
                    chapter_number += 1;
                    number = chapter_number;
                    (Some(TemplateName::Chapter), Some(TemplateName::ChapterEnd))
                }
            };
            if let Some(start) = start {
                self.apply(start, self.mapper.chapter(id, number), out);
            }
            self.scenes(chapter, not_exported, &mut totals, out);
            if let Some(end) = end {
                self.apply(end, self.mapper.chapter(id, number), out);
            }
        }
    }

    fn scenes(&self, chapter: &Chapter, not_exported: bool, totals: &mut Totals, out: &mut String) {
        let project = self.mapper.project;
        let mut first = true;
        for id in &chapter.scene_order {
            let Some(scene) = project.scenes.get(id) else {
                continue;
            };
            let content = scene.content().unwrap_or("");
            let mut number = 0;
            let mut template = match scene.kind() {
                ContentType::Todo => TemplateName::TodoScene,
                ContentType::Notes => TemplateName::NotesScene,
                ContentType::Normal if scene.unused() || chapter.unused() => TemplateName::UnusedScene,
                ContentType::Normal if scene.do_not_export.unwrap_or(false) || not_exported => continue,
                ContentType::Normal if content.starts_with("<HTML>") || content.starts_with("<TEX>") => continue,
                ContentType::Normal => {
                    totals.scenes += 1;
                    totals.words += scene.word_count();
                    totals.letters += scene.letter_count();
                    number = totals.scenes;
                    TemplateName::Scene
                }
            };
            if self.templates.get(template).is_none() {
                continue;
            }
            if !(first || scene.append_to_prev.unwrap_or(false)) {
                self.apply(TemplateName::SceneDivider, Mapping::new(), out);
            }
            if first && self.templates.get(TemplateName::FirstScene).is_some() {
                template = TemplateName::FirstScene;
            }
            self.apply(template, self.mapper.scene(id, number, totals.words, totals.letters), out);
            first = false;
        }
    }
}

#[derive(Default)]
struct Totals {
    scenes: usize,
    words: usize,
    letters: usize,
}


/// An HTML document rendered from a project.
#[derive(Debug, Clone)]
pub struct HtmlExport {
    path: PathBuf,
    project_path: Option<PathBuf>,
    chapter_prefix: Option<String>,
    templates: Templates,
    project: Project,
}

impl HtmlExport {
    pub fn new(path: impl Into<PathBuf>, templates: Templates) -> Self {
        HtmlExport { path: path.into(), project_path: None, chapter_prefix: None, templates, project: Project::new() }
    }

    /// The project file the document is made from, for `ProjectName` and `ProjectPath`.
    pub fn with_project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_path = Some(path.into());
        self
    }

    /// Shown instead of "Chapter " at the start of chapter titles.
    pub fn with_chapter_prefix(mut self, prefix: Option<String>) -> Self {
        self.chapter_prefix = prefix;
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    pub fn to_html(&self) -> String {
        let mapper = Mapper::new(&self.project)
            .with_path(self.project_path.as_deref().unwrap_or(&self.path))
            .with_chapter_prefix(self.chapter_prefix.clone())
            .with_converter(yw_to_html);
        Renderer::new(&self.templates, mapper).render()
    }
}

impl Target for HtmlExport {
    fn path(&self) -> &Path {
        &self.path
    }

    fn description(&self) -> &'static str {
        "HTML export"
    }

    fn merge(&mut self, source: &Project) -> MergeReport {
        self.project = source.clone();
        for (i, title) in self.project.field_titles.iter_mut().enumerate() {
            if title.is_none() {
                *title = Some(format!("Field {}", i + 1));
            }
        }
        self.templates.apply_project(&self.project);
        MergeReport::default()
    }

    fn write(&mut self) -> Result<PathBuf, Error> {
        let html = self.to_html();
        write_with_backup(&self.path, html.as_bytes())?;
        info!("wrote \"{}\"", self.path.display());
        Ok(self.path.clone())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn test_project() -> Project {
        parse_yw(include_str!("../test-data/Test Project.yw7"), FileFormat::Yw7, &ReaderConfig::default()).unwrap().0
    }

    fn export(project: &Project, templates: Templates) -> String {
        let mut export = HtmlExport::new("/tmp/Test Project.html", templates);
        export.merge(project);
        export.to_html()
    }

    #[test]
    fn substitution() {
        let mut m = Mapping::new();
        m.insert("Title", "Fog".to_string());
        assert_eq!(substitute("<h1>$Title</h1> ${Title}s $$5 $Unknown ${Other}", &m), "<h1>Fog</h1> Fogs $5 $Unknown ${Other}");
    }

    #[test]
    fn markup() {
        assert_eq!(yw_to_html("A [i]quiet[/i] & [b]dark[/b] night\n\nEnd [u]now[/u]"),
            "A <em>quiet</em> &amp; <strong>dark</strong> night</p>\n<p><br /></p>\n<p>End <u>now</u>");
        assert_eq!(yw_to_html("Text<HTM <b>raw</b> /HTM> /*note*/[c][h1]x[/h1]"), "Text <!--note-->x");
    }

    #[test]
    fn default_export() {
        let html = export(&test_project(), Templates::default());
        assert!(html.starts_with("<html>"));
        assert!(html.contains("<title>The Test Novel</title>"));
        assert!(html.contains("<h1><a name=\"ChID:1\" />Part One</h1>"));
        assert!(html.contains("<h2><a name=\"ChID:2\" />Chapter 1</h2>"));
        assert!(html.contains("<a name=\"ScID:1\" /><!-- Arrival -->\n<p>The <em>fog</em> rolled in, thick and grey.</p>\n<p>Mara stepped off the ferry - alone.</p>"));
        // Todo scene, trash chapter
        assert!(!html.contains("ScID:2"));
        assert!(!html.contains("ScID:4"));
        assert!(!html.contains("ChID:4"));
        // Suppressed title
        assert!(html.contains("<h2><a name=\"ChID:3\" /></h2>"));
        assert!(html.ends_with("</body>\n</html>\n"));
        assert!(!html.contains("scenedivider\">"));
    }

    #[test]
    fn selection_rules() {
        let mut templates = Templates::empty();
        templates.set(TemplateName::Chapter, "[C$ChapterNumber $ChNumberRoman]");
        templates.set(TemplateName::ChapterEnd, "[/C]");
        templates.set(TemplateName::Scene, "[S$SceneNumber $WordsTotal]");
        templates.set(TemplateName::TodoScene, "[T$ID]");
        templates.set(TemplateName::SceneDivider, "|");
        templates.set(TemplateName::Character, "[$Title:$Status]");
        templates.set(TemplateName::ProjectNote, "[N$ID $Title]");
        let html = export(&test_project(), templates);
        // Part One has no part template, so it is numbered like a chapter.
        assert_eq!(html, "[C1 I][/C][C2 II][S1 13]|[T2][/C][C3 III][S2 15][/C][Mara:Major][Tobias:Minor][N1 Research]");
    }

    #[test]
    fn first_scene_and_append() {
        let mut p = test_project();
        p.scenes.get_mut("2").unwrap().scene_type = Some(ContentType::Normal);
        p.scenes.get_mut("2").unwrap().is_unused = Some(false);
        p.scenes.get_mut("2").unwrap().append_to_prev = Some(true);
        let mut templates = Templates::empty();
        templates.set(TemplateName::Scene, "[S$ID]");
        templates.set(TemplateName::FirstScene, "[F$ID]");
        templates.set(TemplateName::SceneDivider, "|");
        assert_eq!(export(&p, templates), "[F1][S2][F3]");
    }

    #[test]
    fn excluded_chapters_are_skipped() {
        let mut p = test_project();
        p.scenes.get_mut("3").unwrap().do_not_export = Some(true);
        let mut templates = Templates::empty();
        templates.set(TemplateName::Chapter, "[C$ID]");
        templates.set(TemplateName::Scene, "[S$ID]");
        assert_eq!(export(&p, templates), "[C1][C2][S1]");
    }

    #[test]
    fn templates_from_project() {
        let mut p = test_project();
        let mut chapter = Chapter::new();
        chapter.title = Some(TEMPLATE_CHAPTER_TITLE.into());
        chapter.is_unused = Some(true);
        chapter.scene_order = vec!["10".into()];
        p.chapters.insert("10".into(), chapter);
        p.chapter_order.push("10".into());
        let mut scene = Scene::new();
        scene.title = Some("html_footer".into());
        scene.is_unused = Some(true);
        scene.set_content("<!-- $Title ends -->");
        p.scenes.insert("10".into(), scene);
        let html = export(&p, Templates::default());
        assert!(html.ends_with("<!-- The Test Novel ends -->"));
        assert!(!html.contains("ChID:10"));
    }

    #[test]
    fn template_dir() {
        let dir = tempfile::tempdir().unwrap();
        let written = Templates::default().write_dir(dir.path()).unwrap();
        assert_eq!(written.len(), 6);
        fs::write(dir.path().join("scene_template.html"), "<p>$SceneContent</p>").unwrap();
        let templates = Templates::from_dir(dir.path()).unwrap();
        assert_eq!(templates.get(TemplateName::Scene), Some("<p>$SceneContent</p>"));
        assert_eq!(templates.get(TemplateName::Header), Some(DEFAULT_HEADER));
        assert!(matches!(Templates::from_dir(&dir.path().join("none")), Err(Error::NotFound(_))));
    }

    #[test]
    fn write_with_backup_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("novel.html");
        fs::write(&path, "old").unwrap();
        let mut export = HtmlExport::new(&path, Templates::default());
        Target::merge(&mut export, &test_project());
        export.write().unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("novel.html.bak")).unwrap(), "old");
        assert!(fs::read_to_string(&path).unwrap().contains("ScID:3"));
        assert_eq!(export.project().field_titles[2].as_deref(), Some("Field 3"));
    }
}
