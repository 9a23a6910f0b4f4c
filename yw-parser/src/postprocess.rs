use std::{collections::BTreeSet, sync::OnceLock};

use regex::{Captures, Regex};
use tracing::warn;
use xmltree::Element;

use crate::*;
use crate::reader::strip_declaration;


/// Elements whose text yWriter writes as CDATA.
pub const CDATA_TAGS: &[&str] = &[
    "Title", "AuthorName", "Bio", "Desc",
    "FieldTitle1", "FieldTitle2", "FieldTitle3", "FieldTitle4",
    "LaTeXHeaderFile", "Tags", "AKA", "ImageFile", "FullName", "Goals", "Notes",
    "RTFFile", "SceneContent", "Outcome", "Goal", "Conflict",
];

fn cdata_use() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([A-Za-z_][\w.\-]*)>\s*<!\[CDATA\[").unwrap())
}

fn entity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|lt|gt|amp|quot|apos);").unwrap())
}

/// The elements a project file writes as CDATA.
pub fn discover_cdata_tags(source: &str) -> BTreeSet<String> {
    cdata_use().captures_iter(source).map(|c| c[1].to_string()).collect()
}

/// Resolves the predefined XML entities and character references.
pub fn unescape_xml(text: &str) -> String {
    entity().replace_all(text, |c: &Captures| {
        let name = &c[1];
        let resolved = match name {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                let code = match name.strip_prefix("#x") {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => name[1..].parse().ok(),
                };
                code.and_then(char::from_u32)
            }
        };
        resolved.map(String::from).unwrap_or_else(|| c[0].to_string())
    }).into_owned()
}

/// Turns a serialized project tree into the text of a yWriter file.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    format: FileFormat,
    cdata_tags: BTreeSet<String>,
}

impl PostProcessor {
    pub fn new(format: FileFormat) -> Self {
        PostProcessor { format, cdata_tags: CDATA_TAGS.iter().map(|t| t.to_string()).collect() }
    }

    /// Adds elements to write as CDATA.
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.cdata_tags.extend(tags);
        self
    }

    pub fn serialize(&self, root: &Element) -> Result<String, Error> {
        let mut out = vec![];
        root.write_with_config(&mut out, xmltree::EmitterConfig::new().perform_indent(false).write_document_declaration(false))
            .map_err(|e| Error::malformed(e.to_string()))?;
        let raw = String::from_utf8(out).map_err(Error::malformed)?;
        Ok(self.format_xml(&raw))
    }

    /// Wraps the text of the CDATA elements and adds the declaration for the file's encoding.
    pub fn format_xml(&self, raw: &str) -> String {
        let mut text = strip_declaration(raw).trim_start().to_string();
        if !self.cdata_tags.is_empty() {
            let names: Vec<String> = self.cdata_tags.iter().map(|t| regex::escape(t)).collect();
            // Leaf elements only: escaped text never contains '<'.
            if let Ok(re) = Regex::new(&format!(r"<({})>([^<]*)</([^>]+)>", names.join("|"))) {
                text = re.replace_all(&text, |c: &Captures| {
                    if c[1] != c[3] {
                        return c[0].to_string();
                    }
                    let data = unescape_xml(&c[2]).replace("]]>", "]]]]><![CDATA[>");
                    format!("<{0}><![CDATA[{data}]]></{0}>", &c[1])
                }).into_owned();
            }
        }
        let text = text.replace("[CDATA[ \n", "[CDATA[");
        format!("<?xml version=\"1.0\" encoding=\"{}\"?>\n{}\n", self.format.encoding_label(), text.trim_end())
    }

    /// Encodes the text for the file.
    /// Characters the encoding can't represent become numeric character references.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let (bytes, _, unmappable) = self.format.encoding().encode(text);
        if unmappable {
            warn!("some characters can't be written as {}", self.format.encoding_label());
        }
        bytes.into_owned()
    }
}
