use std::{collections::HashSet, path::{Path, PathBuf}, sync::OnceLock};

use encoding_rs::UTF_8;
use regex::Regex;
use tracing::{debug, info};

use crate::*;
use crate::yw::{decode, read_bytes};


fn anchor() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)<a\s+name="(ChID|ScID):([^"]+)"\s*/?>(?:</a>)?"#).unwrap())
}

fn document_title() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title>(.*?)</title>").unwrap())
}

fn body() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<body[^>]*>(.*?)(?:</body>|$)").unwrap())
}

fn heading_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^<h(\d)[^>]*>\s*$").unwrap())
}

fn trailing_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<h\d[^>]*>\s*$").unwrap())
}

fn title_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\s*<!--(.*?)-->").unwrap())
}

fn divider() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)<p\s+class="?scenedivider"?[^>]*>.*?</p>"#).unwrap())
}

struct Markup {
    line_break: Regex,
    comment: Regex,
    paragraph_end: Regex,
    paragraph: Regex,
    italic: Regex,
    bold: Regex,
    underline: Regex,
    tag: Regex,
}

fn markup() -> &'static Markup {
    static RE: OnceLock<Markup> = OnceLock::new();
    RE.get_or_init(|| Markup {
        line_break: Regex::new(r"(?i)<br\s*/?>").unwrap(),
        comment: Regex::new(r"(?s)<!--(.*?)-->").unwrap(),
        paragraph_end: Regex::new(r"(?i)</p>\s*").unwrap(),
        paragraph: Regex::new(r"(?i)<p(?:\s[^>]*)?>").unwrap(),
        italic: Regex::new(r"(?i)<(/?)(?:em|i)>").unwrap(),
        bold: Regex::new(r"(?i)<(/?)(?:strong|b)>").unwrap(),
        underline: Regex::new(r"(?i)<(/?)u>").unwrap(),
        tag: Regex::new(r"<[^>]*>").unwrap(),
    })
}

/// Converts HTML paragraphs and inline formatting back to yWriter markup.
pub fn html_to_yw(html: &str) -> String {
    let m = markup();
    let text = html.replace('\r', "").replace('\n', " ");
    let text = m.line_break.replace_all(&text, "");
    let text = m.comment.replace_all(&text, "/*$1*/");
    let text = m.paragraph_end.replace_all(&text, "\n");
    let text = m.paragraph.replace_all(&text, "");
    let text = m.italic.replace_all(&text, "[${1}i]");
    let text = m.bold.replace_all(&text, "[${1}b]");
    let text = m.underline.replace_all(&text, "[${1}u]");
    let text = m.tag.replace_all(&text, "");
    let text = unescape_xml(&text.replace("&nbsp;", " "));
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    lines.join("\n").trim().to_string()
}

fn plain_text(html: &str) -> String {
    let text = markup().tag.replace_all(html, "");
    unescape_xml(&text.replace("&nbsp;", " ")).trim().to_string()
}

/// The heading level of the element the anchor sits in, if the text before the anchor opens one.
fn heading_level(before: &str) -> Option<ChapterLevel> {
    let tag = &before[before.rfind('<')?..];
    let level = heading_open().captures(tag)?;
    Some(if &level[1] == "1" { ChapterLevel::Part } else { ChapterLevel::Chapter })
}

fn scene_fields(segment: &str) -> (Option<String>, String) {
    let mut segment = segment;
    if let Some(end) = segment.to_ascii_lowercase().find("</body>") {
        segment = &segment[..end];
    }
    let mut title = None;
    if let Some(c) = title_comment().captures(segment) {
        title = Some(unescape_xml(c[1].trim())).filter(|t| !t.is_empty());
        segment = &segment[c[0].len()..];
    }
    let segment = divider().replace_all(segment, "");
    let segment = trailing_heading().replace(&segment, "");
    (title, html_to_yw(&segment))
}

/// Reads a project back from an exported HTML document.
///
/// Chapters and scenes are found by their `ChID:` and `ScID:` anchors.
/// A chapter's title is the text of the heading holding its anchor, a scene holds everything up to the next anchor.
/// A document without anchors becomes a single chapter with a single scene, ready to be split at heading markers.
pub fn parse_html(html: &str) -> (Project, Vec<Warning>) {
    let mut project = Project::new();
    let mut warnings = vec![];
    project.title = document_title().captures(html).map(|c| plain_text(&c[1])).filter(|t| !t.is_empty());

    let anchors: Vec<_> = anchor().captures_iter(html).collect();
    if anchors.is_empty() {
        let text = body().captures(html).and_then(|c| c.get(1)).map(|m| m.as_str()).unwrap_or(html);
        let content = html_to_yw(text);
        if !content.is_empty() {
            let mut chapter = Chapter::new();
            chapter.title = Some("Chapter 1".into());
            chapter.scene_order = vec!["1".into()];
            project.chapters.insert("1".into(), chapter);
            project.chapter_order.push("1".into());
            let mut scene = Scene::new();
            scene.set_content(content);
            project.scenes.insert("1".into(), scene);
        }
        return (project, warnings);
    }

    let mut current_chapter: Option<String> = None;
    let mut seen_scenes = HashSet::new();
    for (i, c) in anchors.iter().enumerate() {
        let (Some(whole), kind, id) = (c.get(0), &c[1], c[2].to_string()) else {
            continue;
        };
        let end = anchors.get(i + 1).and_then(|n| n.get(0)).map(|m| m.start()).unwrap_or(html.len());
        let segment = &html[whole.end()..end];
        if kind.eq_ignore_ascii_case("ChID") {
            if !project.chapters.contains_key(&id) {
                let mut chapter = Chapter::new();
                let title = segment.find("</h").or_else(|| segment.find("</H")).map(|e| &segment[..e]).unwrap_or("");
                chapter.title = Some(plain_text(title)).filter(|t| !t.is_empty());
                chapter.level = heading_level(&html[..whole.start()]);
                project.chapters.insert(id.clone(), chapter);
                project.chapter_order.push(id.clone());
            }
            current_chapter = Some(id);
        } else {
            let Some(chapter) = current_chapter.as_ref().and_then(|c| project.chapters.get_mut(c)) else {
                warnings.push(Warning::SceneOutsideChapter(id));
                continue;
            };
            if !seen_scenes.insert(id.clone()) {
                warnings.push(Warning::SceneDuplicated(id));
                continue;
            }
            let (title, content) = scene_fields(segment);
            chapter.scene_order.push(id.clone());
            let mut scene = Scene::new();
            scene.title = title;
            scene.set_content(content);
            project.scenes.insert(id, scene);
        }
    }
    debug!("found {} chapters and {} scenes", project.chapters.len(), project.scenes.len());
    (project, warnings)
}


/// An HTML document to read a project from.
#[derive(Debug, Clone)]
pub struct HtmlImport {
    path: PathBuf,
    project: Project,
}

impl HtmlImport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        HtmlImport { path: path.into(), project: Project::new() }
    }
}

impl Source for HtmlImport {
    fn path(&self) -> &Path {
        &self.path
    }

    fn description(&self) -> &'static str {
        "HTML document"
    }

    fn read(&mut self) -> Result<ReadSummary, Error> {
        let (text, fallback) = decode(&read_bytes(&self.path)?, UTF_8);
        let (project, mut warnings) = parse_html(&text);
        if project.scenes.is_empty() {
            return Err(Error::malformed("the document has no content").at(&self.path));
        }
        if fallback {
            warnings.insert(0, Warning::EncodingFallback);
        }
        self.project = project;
        info!("read {} scenes from \"{}\"", self.project.scenes.len(), self.path.display());
        Ok(ReadSummary { scenes: self.project.scenes.len(), warnings })
    }

    fn project(&self) -> &Project {
        &self.project
    }
}
