use std::{collections::{BTreeMap, HashSet}, fmt::Display, sync::OnceLock};

use regex::Regex;
use serde::Serialize;


/// The kind of a content container: a chapter or a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ContentType {
    #[default]
    Normal,
    Notes,
    Todo,
}

impl ContentType {
    /// The numeric code used by `Field_SceneType` and `ChapterType`.
    pub fn code(self) -> u8 {
        match self {
            ContentType::Normal => 0,
            ContentType::Notes => 1,
            ContentType::Todo => 2,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "0" => Some(ContentType::Normal),
            "1" => Some(ContentType::Notes),
            "2" => Some(ContentType::Todo),
            _ => None,
        }
    }
}

/// Whether a chapter is a plain chapter or begins a new part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ChapterLevel {
    #[default]
    Chapter,
    Part,
}

/// Editing status of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SceneStatus {
    Outline = 1,
    Draft = 2,
    FirstEdit = 3,
    SecondEdit = 4,
    Done = 5,
}

impl SceneStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SceneStatus::Outline),
            2 => Some(SceneStatus::Draft),
            3 => Some(SceneStatus::FirstEdit),
            4 => Some(SceneStatus::SecondEdit),
            5 => Some(SceneStatus::Done),
            _ => None,
        }
    }

    /// The label yWriter shows for the status.
    pub fn label(self) -> &'static str {
        match self {
            SceneStatus::Outline => "Outline",
            SceneStatus::Draft => "Draft",
            SceneStatus::FirstEdit => "1st Edit",
            SceneStatus::SecondEdit => "2nd Edit",
            SceneStatus::Done => "Done",
        }
    }
}

/// When a scene takes place.
/// A scene is either pinned to a calendar date or placed relative to the story start, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SceneStart {
    Specific {
        date: String,
        time: String,
    },
    Relative {
        day: Option<String>,
        hour: Option<String>,
        minute: Option<String>,
    },
}

/// The entity categories of a [Project], in merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntityKind {
    Location,
    Item,
    Character,
    Scene,
    Chapter,
    ProjectNote,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EntityKind::Location => "location",
            EntityKind::Item => "item",
            EntityKind::Character => "character",
            EntityKind::Scene => "scene",
            EntityKind::Chapter => "chapter",
            EntityKind::ProjectNote => "project note",
        })
    }
}


/// A scene.
/// Every field is optional: `None` means "unknown here", which the merge keeps apart from an explicit value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scene {
    pub title: Option<String>,
    pub desc: Option<String>,
    content: Option<String>,
    word_count: usize,
    letter_count: usize,
    /// Name of the RTF file holding the content of `.yw5` projects.
    pub rtf_file: Option<String>,
    pub is_unused: Option<bool>,
    pub scene_type: Option<ContentType>,
    pub do_not_export: Option<bool>,
    pub status: Option<SceneStatus>,
    pub notes: Option<String>,
    /// `Some(vec![])` explicitly clears the tags, `None` leaves them alone.
    pub tags: Option<Vec<String>>,
    pub fields: [Option<String>; 4],
    pub append_to_prev: Option<bool>,
    pub is_reaction: Option<bool>,
    pub is_subplot: Option<bool>,
    pub goal: Option<String>,
    pub conflict: Option<String>,
    pub outcome: Option<String>,
    pub characters: Option<Vec<String>>,
    pub locations: Option<Vec<String>>,
    pub items: Option<Vec<String>>,
    pub start: Option<SceneStart>,
    pub lasts_days: Option<String>,
    pub lasts_hours: Option<String>,
    pub lasts_minutes: Option<String>,
    pub image: Option<String>,
}

fn count_filter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[.+?\]|\.|,| -").unwrap())
}

fn markup() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[.+?\]").unwrap())
}

/// Counts the words of yWriter text the way yWriter does.
pub fn count_words(text: &str) -> usize {
    count_filter().replace_all(text, "").split_whitespace().count()
}

/// Counts the letters of yWriter text, ignoring markup and line breaks.
pub fn count_letters(text: &str) -> usize {
    markup().replace_all(text, "").chars().filter(|c| *c != '\n' && *c != '\r').count()
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Replaces the content and recomputes the word and letter counts.
    pub fn set_content(&mut self, content: impl Into<String>) {
        let content = content.into();
        self.word_count = count_words(&content);
        self.letter_count = count_letters(&content);
        self.content = Some(content);
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn letter_count(&self) -> usize {
        self.letter_count
    }

    /// Counts stored in the file for projects that keep the content elsewhere.
    pub(crate) fn set_counts(&mut self, words: usize, letters: usize) {
        self.word_count = words;
        self.letter_count = letters;
    }

    pub fn kind(&self) -> ContentType {
        self.scene_type.unwrap_or_default()
    }

    pub fn unused(&self) -> bool {
        self.is_unused.unwrap_or(false)
    }

    /// A used scene of the Normal type, the only kind that is part of the manuscript.
    pub fn is_normal(&self) -> bool {
        self.kind() == ContentType::Normal && !self.unused()
    }
}


/// A chapter, or the first chapter of a part.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Chapter {
    pub title: Option<String>,
    pub desc: Option<String>,
    pub level: Option<ChapterLevel>,
    pub chapter_type: Option<ContentType>,
    /// The `Type` code of old project files: 0 is a normal chapter, 1 anything else.
    pub legacy_type: Option<u8>,
    pub is_unused: Option<bool>,
    pub suppress_title: Option<bool>,
    pub is_trash: Option<bool>,
    pub suppress_break: Option<bool>,
    pub scene_order: Vec<String>,
}

impl Chapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> ContentType {
        self.chapter_type.unwrap_or_default()
    }

    pub fn unused(&self) -> bool {
        self.is_unused.unwrap_or(false)
    }

    pub fn trash(&self) -> bool {
        self.is_trash.unwrap_or(false)
    }

    pub fn is_part(&self) -> bool {
        self.level == Some(ChapterLevel::Part)
    }
}


/// A location or an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorldElement {
    pub title: Option<String>,
    pub desc: Option<String>,
    pub tags: Option<Vec<String>>,
    pub aka: Option<String>,
    pub image: Option<String>,
}

/// A character: a [WorldElement] with a personal record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Character {
    #[serde(flatten)]
    pub base: WorldElement,
    pub notes: Option<String>,
    pub bio: Option<String>,
    pub goals: Option<String>,
    pub full_name: Option<String>,
    pub is_major: Option<bool>,
}


/// A note on the project as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectNote {
    pub title: Option<String>,
    pub desc: Option<String>,
}


/// An in-memory yWriter project.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Project {
    pub title: Option<String>,
    pub desc: Option<String>,
    pub author: Option<String>,
    pub author_bio: Option<String>,
    /// Labels of the four scene rating fields.
    pub field_titles: [Option<String>; 4],
    /// ISO 639 code of the text's language.
    pub language_code: Option<String>,
    /// ISO 3166 code going with the language.
    pub country_code: Option<String>,
    /// The chapters in document order.
    pub chapter_order: Vec<String>,
    pub chapters: BTreeMap<String, Chapter>,
    pub scenes: BTreeMap<String, Scene>,
    pub location_order: Vec<String>,
    pub locations: BTreeMap<String, WorldElement>,
    pub item_order: Vec<String>,
    pub items: BTreeMap<String, WorldElement>,
    pub character_order: Vec<String>,
    pub characters: BTreeMap<String, Character>,
    pub project_note_order: Vec<String>,
    pub project_notes: BTreeMap<String, ProjectNote>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id of the chapter listing the scene, if any.
    pub fn chapter_of(&self, scene: &str) -> Option<&str> {
        self.chapter_order.iter()
            .chain(self.chapters.keys())
            .find(|c| self.chapters.get(*c).map(|c| c.scene_order.iter().any(|s| s == scene)).unwrap_or(false))
            .map(|c| c.as_str())
    }

    /// All (chapter, scene) pairs in document order.
    pub fn document_scenes(&self) -> Vec<(&str, &str)> {
        self.chapter_order.iter().filter_map(|c| self.chapters.get_key_value(c))
            .flat_map(|(c, ch)| ch.scene_order.iter().map(move |s| (c.as_str(), s.as_str())))
            .collect()
    }

    /// Chapters in document order, followed by chapters the order list does not mention.
    pub fn chapters_in_order(&self) -> Vec<&str> {
        ordered_ids(&self.chapter_order, &self.chapters)
    }

    /// Descriptions of every broken cross-reference, empty for a consistent project.
    pub fn integrity_errors(&self) -> Vec<String> {
        let mut errors = vec![];
        for c in &self.chapter_order {
            if !self.chapters.contains_key(c) {
                errors.push(format!("chapter order lists unknown chapter {c}"));
            }
        }
        let mut seen = HashSet::new();
        for (c, ch) in &self.chapters {
            for s in &ch.scene_order {
                if !self.scenes.contains_key(s) {
                    errors.push(format!("chapter {c} lists unknown scene {s}"));
                }
                if !seen.insert(s.as_str()) {
                    errors.push(format!("scene {s} is listed by more than one chapter"));
                }
            }
        }
        errors
    }
}

/// `order` filtered to known ids, followed by the remaining ids of `map`.
pub(crate) fn ordered_ids<'a, T>(order: &'a [String], map: &'a BTreeMap<String, T>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut ids: Vec<&str> = order.iter().filter(|id| map.contains_key(*id) && seen.insert(id.as_str())).map(|id| id.as_str()).collect();
    ids.extend(map.keys().filter(|id| !seen.contains(id.as_str())).map(|id| id.as_str()));
    ids
}

/// Splits a semicolon separated tag string. Entries are trimmed, empty entries and duplicates dropped.
pub fn string_to_list(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = vec![];
    for tag in text.split(';').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

pub fn list_to_string(tags: &[String], divider: &str) -> String {
    tags.join(divider)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_content() {
        let mut scene = Scene::new();
        scene.set_content("The [i]fog[/i] rolled in, thick and grey.\nMara stepped off the ferry - alone.");
        assert_eq!(scene.word_count(), 13);
        assert_eq!(scene.letter_count(), 69);
        scene.set_content("Two words.");
        assert_eq!(scene.word_count(), 2);
        assert_eq!(scene.letter_count(), 10);
    }

    #[test]
    fn counts_are_deterministic() {
        let text = "One, two. Three -- four\r\nfive";
        let mut a = Scene::new();
        a.set_content(text);
        let first = (a.word_count(), a.letter_count());
        a.set_content(text);
        assert_eq!(first, (a.word_count(), a.letter_count()));
    }

    #[test]
    fn markup_does_not_count() {
        let mut plain = Scene::new();
        plain.set_content("A quiet night at sea");
        let mut marked = Scene::new();
        marked.set_content("A [b]quiet[/b] night at [i]sea[/i][c]");
        assert_eq!(plain.word_count(), marked.word_count());
        assert_eq!(plain.letter_count(), marked.letter_count());
    }

    #[test]
    fn tag_strings() {
        assert_eq!(string_to_list(" a; b ;;a; c "), vec!["a", "b", "c"]);
        assert!(string_to_list(" ; ").is_empty());
        assert_eq!(list_to_string(&["a".into(), "b".into()], ";"), "a;b");
    }

    #[test]
    fn status_codes() {
        assert_eq!(SceneStatus::from_code(3), Some(SceneStatus::FirstEdit));
        assert_eq!(SceneStatus::from_code(0), None);
        assert_eq!(SceneStatus::Done.code(), 5);
        assert_eq!(SceneStatus::SecondEdit.label(), "2nd Edit");
    }

    #[test]
    fn integrity() {
        let mut project = Project::new();
        project.chapter_order.push("1".into());
        let mut ch = Chapter::new();
        ch.scene_order.push("7".into());
        project.chapters.insert("1".into(), ch.clone());
        project.chapters.insert("2".into(), ch);
        project.scenes.insert("7".into(), Scene::new());
        let errors = project.integrity_errors();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(project.chapters_in_order(), vec!["1", "2"]);
        assert_eq!(project.chapter_of("7"), Some("1"));
    }
}
