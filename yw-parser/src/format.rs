use std::{collections::HashMap, path::Path};

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use serde::Serialize;
use xmltree::{Element, XMLNode};


/// The on-disk schema variants of a yWriter project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileFormat {
    /// yWriter 7, UTF-8, scene content inline.
    Yw7,
    /// yWriter 6, UTF-8, scene content inline, no `ChapterType`.
    Yw6,
    /// yWriter 5, windows-1252, scene content in external RTF files.
    Yw5,
}

impl FileFormat {
    pub const ALL: [FileFormat; 3] = [FileFormat::Yw7, FileFormat::Yw6, FileFormat::Yw5];

    /// Selects the format by file extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Yw7 => "yw7",
            FileFormat::Yw6 => "yw6",
            FileFormat::Yw5 => "yw5",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FileFormat::Yw7 => "yWriter 7 project",
            FileFormat::Yw6 => "yWriter 6 project",
            FileFormat::Yw5 => "yWriter 5 project",
        }
    }

    pub fn root_tag(self) -> &'static str {
        match self {
            FileFormat::Yw7 => "YWRITER7",
            FileFormat::Yw6 => "YWRITER6",
            FileFormat::Yw5 => "YWRITER5",
        }
    }

    /// Value of the `Ver` element.
    pub fn version(self) -> &'static str {
        match self {
            FileFormat::Yw7 => "7",
            FileFormat::Yw6 | FileFormat::Yw5 => "5",
        }
    }

    pub fn encoding(self) -> &'static Encoding {
        match self {
            FileFormat::Yw7 | FileFormat::Yw6 => UTF_8,
            FileFormat::Yw5 => WINDOWS_1252,
        }
    }

    /// The name written into the XML declaration.
    pub fn encoding_label(self) -> &'static str {
        match self {
            FileFormat::Yw7 | FileFormat::Yw6 => "utf-8",
            FileFormat::Yw5 => "windows-1252",
        }
    }

    /// Whether chapters carry a `ChapterType` element next to the legacy `Type`.
    pub fn has_chapter_type(self) -> bool {
        self == FileFormat::Yw7
    }

    /// Whether scene content lives in `SceneContent` rather than RTF files.
    pub fn inline_content(self) -> bool {
        self != FileFormat::Yw5
    }

    /// Whether the legacy `RTFFile` reference is kept on write.
    pub fn keeps_rtf_file(self) -> bool {
        self != FileFormat::Yw7
    }
}


/// The child elements of one node, indexed by tag once so each field lookup is a map access.
/// The first child with a given tag wins.
pub(crate) struct Fields<'a> {
    map: HashMap<&'a str, &'a Element>,
}

impl<'a> Fields<'a> {
    pub fn of(e: &'a Element) -> Self {
        let mut map = HashMap::new();
        for c in e.children.iter().filter_map(XMLNode::as_element) {
            map.entry(c.name.as_str()).or_insert(c);
        }
        Fields { map }
    }

    pub fn get(&self, tag: &str) -> Option<&'a Element> {
        self.map.get(tag).copied()
    }

    pub fn has(&self, tag: &str) -> bool {
        self.map.contains_key(tag)
    }

    /// Text of the child, `None` for a missing child or empty text.
    pub fn text(&self, tag: &str) -> Option<String> {
        self.get(tag).and_then(text_of)
    }

    /// A marker flag: present means set, absent means cleared.
    pub fn marker(&self, tag: &str) -> Option<bool> {
        Some(self.has(tag))
    }

    pub fn number(&self, tag: &str) -> Option<usize> {
        self.text(tag).and_then(|t| t.trim().parse().ok())
    }

    /// Text of a child of the `Fields` sub-element.
    pub fn field(&self, tag: &str) -> Option<String> {
        self.get("Fields").and_then(|f| f.get_child(tag)).and_then(text_of)
    }

    /// Texts of every `item` child of the `container` child, in order.
    pub fn id_list(&self, container: &str, item: &str) -> Option<Vec<String>> {
        self.get(container).map(|c| {
            c.children.iter().filter_map(XMLNode::as_element)
                .filter(|e| e.name == item)
                .filter_map(text_of)
                .map(|t| t.trim().to_string())
                .collect()
        })
    }
}

pub(crate) fn text_of(e: &Element) -> Option<String> {
    e.get_text().map(|t| t.into_owned()).filter(|t| !t.is_empty())
}
