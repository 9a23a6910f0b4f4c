use std::collections::{HashMap, HashSet};

use xmltree::{Element, XMLNode};

use crate::*;
use crate::format::text_of;
use crate::reader::parse_tree;


fn is_element(n: &XMLNode, tag: &str) -> bool {
    matches!(n, XMLNode::Element(e) if e.name == tag)
}

fn has(parent: &Element, tag: &str) -> bool {
    parent.children.iter().any(|n| is_element(n, tag))
}

/// The first child called `tag`, appended if there is none.
fn child<'e>(parent: &'e mut Element, tag: &str) -> &'e mut Element {
    let i = match parent.children.iter().position(|n| is_element(n, tag)) {
        Some(i) => i,
        None => {
            parent.children.push(XMLNode::Element(Element::new(tag)));
            parent.children.len() - 1
        }
    };
    match &mut parent.children[i] {
        XMLNode::Element(e) => e,
        _ => unreachable!("position() only matches elements"),
    }
}

fn set_text(parent: &mut Element, tag: &str, text: &str) {
    let e = child(parent, tag);
    e.children.retain(|n| !matches!(n, XMLNode::Text(_) | XMLNode::CData(_)));
    if !text.is_empty() {
        e.children.push(XMLNode::Text(text.to_string()));
    }
}

fn set_opt(parent: &mut Element, tag: &str, value: Option<&str>) {
    if let Some(v) = value {
        set_text(parent, tag, v);
    }
}

/// Like [set_opt], but `None` removes the element.
fn set_or_remove(parent: &mut Element, tag: &str, value: Option<&str>) {
    match value {
        Some(v) => set_text(parent, tag, v),
        None => remove(parent, tag),
    }
}

fn remove(parent: &mut Element, tag: &str) {
    parent.children.retain(|n| !is_element(n, tag));
}

fn set_marker(parent: &mut Element, tag: &str, flag: Option<bool>) {
    match flag {
        Some(true) if !has(parent, tag) => set_text(parent, tag, "-1"),
        Some(false) => remove(parent, tag),
        _ => {}
    }
}

/// Sets or removes a child of the `Fields` element.
fn set_field(parent: &mut Element, tag: &str, value: Option<&str>) {
    match value {
        Some(v) => set_text(child(parent, "Fields"), tag, v),
        None => {
            if let Some(fields) = parent.get_mut_child("Fields") {
                remove(fields, tag);
            }
        }
    }
}

fn set_flag_field(parent: &mut Element, tag: &str, flag: Option<bool>) {
    match flag {
        Some(true) => set_field(parent, tag, Some("1")),
        Some(false) => set_field(parent, tag, None),
        None => {}
    }
}

/// An explicitly empty tag list removes the element.
fn set_tags(parent: &mut Element, tags: &Option<Vec<String>>) {
    match tags {
        Some(tags) if tags.is_empty() => remove(parent, "Tags"),
        Some(tags) => set_text(parent, "Tags", &list_to_string(tags, ";")),
        None => {}
    }
}

fn set_refs(parent: &mut Element, container: &str, item: &str, ids: Option<&[String]>) {
    let Some(ids) = ids else {
        return;
    };
    if ids.is_empty() {
        remove(parent, container);
        return;
    }
    let c = child(parent, container);
    c.children.clear();
    for id in ids {
        let mut e = Element::new(item);
        e.children.push(XMLNode::Text(id.clone()));
        c.children.push(XMLNode::Element(e));
    }
}

fn element_id(e: &Element) -> Option<String> {
    e.get_child("ID").and_then(text_of).map(|id| id.trim().to_string())
}

/// Replaces the `tag` children of `section` by one element per id, in order.
/// Elements that exist already are reused so unknown children survive; `write` gets the element,
/// the id, the 1-based position and whether the element is new.
fn rebuild_section(root: &mut Element, section: &str, tag: &str, ids: &[&str], mut write: impl FnMut(&mut Element, &str, usize, bool)) {
    let sec = child(root, section);
    let mut existing: HashMap<String, Element> = HashMap::new();
    let mut kept = vec![];
    for node in std::mem::take(&mut sec.children) {
        match node {
            XMLNode::Element(e) if e.name == tag => {
                if let Some(id) = element_id(&e) {
                    existing.entry(id).or_insert(e);
                }
            }
            XMLNode::Text(_) => {}
            other => kept.push(other),
        }
    }
    sec.children = kept;
    for (i, id) in ids.iter().enumerate() {
        let (mut e, created) = match existing.remove(*id) {
            Some(e) => (e, false),
            None => {
                let mut e = Element::new(tag);
                set_text(&mut e, "ID", id);
                (e, true)
            }
        };
        write(&mut e, id, i + 1, created);
        sec.children.push(XMLNode::Element(e));
    }
}

fn write_project(prj: &mut Element, project: &Project, format: FileFormat) {
    set_text(prj, "Ver", format.version());
    set_opt(prj, "Title", project.title.as_deref());
    set_opt(prj, "AuthorName", project.author.as_deref());
    set_opt(prj, "Bio", project.author_bio.as_deref());
    set_opt(prj, "Desc", project.desc.as_deref());
    for (i, title) in project.field_titles.iter().enumerate() {
        set_opt(prj, &format!("FieldTitle{}", i + 1), title.as_deref());
    }
}

fn write_world_element(e: &mut Element, element: &WorldElement, sort_order: usize) {
    set_opt(e, "Title", element.title.as_deref());
    set_opt(e, "ImageFile", element.image.as_deref());
    set_opt(e, "Desc", element.desc.as_deref());
    set_opt(e, "AKA", element.aka.as_deref());
    set_tags(e, &element.tags);
    set_text(e, "SortOrder", &sort_order.to_string());
}

fn write_character(e: &mut Element, character: &Character, sort_order: usize) {
    write_world_element(e, &character.base, sort_order);
    set_opt(e, "Notes", character.notes.as_deref());
    set_opt(e, "Bio", character.bio.as_deref());
    set_opt(e, "Goals", character.goals.as_deref());
    set_opt(e, "FullName", character.full_name.as_deref());
    set_marker(e, "Major", character.is_major);
}

fn write_project_note(e: &mut Element, note: &ProjectNote, sort_order: usize) {
    set_opt(e, "Title", note.title.as_deref());
    set_opt(e, "Desc", note.desc.as_deref());
    set_text(e, "SortOrder", &sort_order.to_string());
}

/// Stores the language and country codes as project variables, adding the variables if needed.
fn write_locale(root: &mut Element, project: &Project) {
    let vars = [("Language", project.language_code.as_deref()), ("Country", project.country_code.as_deref())];
    if vars.iter().all(|(_, code)| code.is_none()) {
        return;
    }
    if let Some(fields) = child(root, "PROJECT").get_mut_child("Fields") {
        remove(fields, "Field_LanguageCode");
        remove(fields, "Field_CountryCode");
    }
    let sec = child(root, "PROJECTVARS");
    for (title, code) in vars {
        let Some(code) = code else {
            continue;
        };
        let found = sec.children.iter().position(|n| {
            matches!(n, XMLNode::Element(e) if e.name == "PROJECTVAR" && e.get_child("Title").and_then(text_of).as_deref() == Some(title))
        });
        match found {
            Some(i) => {
                if let XMLNode::Element(e) = &mut sec.children[i] {
                    set_text(e, "Desc", code);
                }
            }
            None => {
                let next = sec.children.iter()
                    .filter_map(XMLNode::as_element)
                    .filter_map(element_id)
                    .filter_map(|id| id.parse::<u64>().ok())
                    .max()
                    .unwrap_or(0) + 1;
                let mut e = Element::new("PROJECTVAR");
                set_text(&mut e, "ID", &next.to_string());
                set_text(&mut e, "Title", title);
                set_text(&mut e, "Desc", code);
                set_text(&mut e, "Tags", "0");
                sec.children.push(XMLNode::Element(e));
            }
        }
    }
}

fn write_scene(e: &mut Element, scene: &Scene, chapter: Option<&str>, format: FileFormat) {
    set_opt(e, "Title", scene.title.as_deref());
    if let Some(chapter) = chapter {
        set_text(e, "BelongsToChID", chapter);
    }
    set_opt(e, "Desc", scene.desc.as_deref());
    match scene.content() {
        Some(content) => {
            if format.inline_content() {
                set_text(e, "SceneContent", content);
            }
            set_text(e, "WordCount", &scene.word_count().to_string());
            set_text(e, "LetterCount", &scene.letter_count().to_string());
        }
        None if !has(e, "WordCount") => {
            set_text(e, "WordCount", &scene.word_count().to_string());
            set_text(e, "LetterCount", &scene.letter_count().to_string());
        }
        None => {}
    }
    if format.keeps_rtf_file() {
        set_opt(e, "RTFFile", scene.rtf_file.as_deref());
    } else {
        remove(e, "RTFFile");
    }

    // Unused | Field_SceneType | type
    //   -    |       -         | Normal
    //  -1    |       1         | Notes
    //  -1    |       2         | Todo
    //  -1    |       0         | Normal, unused
    let unused = match scene.scene_type {
        Some(kind) if kind != ContentType::Normal => Some(true),
        _ => scene.is_unused,
    };
    set_marker(e, "Unused", unused);
    if let Some(kind) = scene.scene_type {
        let code = match kind {
            ContentType::Normal if unused != Some(true) => None,
            kind => Some(kind.code().to_string()),
        };
        set_field(e, "Field_SceneType", code.as_deref());
    }

    match scene.do_not_export {
        Some(true) => {
            set_marker(e, "ExportCondSpecific", Some(true));
            remove(e, "ExportWhenRTF");
        }
        Some(false) if has(e, "ExportCondSpecific") => set_marker(e, "ExportWhenRTF", Some(true)),
        _ => {}
    }
    if let Some(status) = scene.status {
        set_text(e, "Status", &status.code().to_string());
    }
    set_opt(e, "Notes", scene.notes.as_deref());
    set_tags(e, &scene.tags);
    for (i, field) in scene.fields.iter().enumerate() {
        set_opt(e, &format!("Field{}", i + 1), field.as_deref());
    }
    set_marker(e, "AppendToPrev", scene.append_to_prev);

    // The two ways to place a scene in time exclude each other.
    match &scene.start {
        Some(SceneStart::Specific { date, time }) => {
            set_text(e, "SpecificDateTime", format!("{date} {time}").trim());
            set_marker(e, "SpecificDateMode", Some(true));
            for tag in ["Day", "Hour", "Minute"] {
                remove(e, tag);
            }
        }
        Some(SceneStart::Relative { day, hour, minute }) => {
            remove(e, "SpecificDateTime");
            remove(e, "SpecificDateMode");
            set_or_remove(e, "Day", day.as_deref());
            set_or_remove(e, "Hour", hour.as_deref());
            set_or_remove(e, "Minute", minute.as_deref());
        }
        None => {}
    }
    set_opt(e, "LastsDays", scene.lasts_days.as_deref());
    set_opt(e, "LastsHours", scene.lasts_hours.as_deref());
    set_opt(e, "LastsMinutes", scene.lasts_minutes.as_deref());
    set_marker(e, "ReactionScene", scene.is_reaction);
    set_marker(e, "SubPlot", scene.is_subplot);
    set_opt(e, "Goal", scene.goal.as_deref());
    set_opt(e, "Conflict", scene.conflict.as_deref());
    set_opt(e, "Outcome", scene.outcome.as_deref());
    set_opt(e, "ImageFile", scene.image.as_deref());
    set_refs(e, "Characters", "CharID", scene.characters.as_deref());
    set_refs(e, "Locations", "LocID", scene.locations.as_deref());
    set_refs(e, "Items", "ItemID", scene.items.as_deref());
}

fn write_chapter(e: &mut Element, chapter: &Chapter, sort_order: usize, created: bool, format: FileFormat) {
    set_opt(e, "Title", chapter.title.as_deref());
    set_opt(e, "Desc", chapter.desc.as_deref());
    set_text(e, "SortOrder", &sort_order.to_string());
    if let Some(level) = chapter.level {
        set_marker(e, "SectionStart", Some(level == ChapterLevel::Part));
    }

    // Unused | Type | ChapterType | type
    //   -    |  0   |     0       | Normal
    //  -1    |  1   |     1       | Notes
    //  -1    |  1   |     2       | Todo
    //  -1    |  1   |     0       | Normal, unused
    let (kind, unused) = match (chapter.chapter_type, chapter.is_unused) {
        (None, None) if created => (Some(ContentType::Normal), Some(false)),
        (Some(kind), _) if kind != ContentType::Normal => (Some(kind), Some(true)),
        (kind, unused) => (kind, unused),
    };
    set_marker(e, "Unused", unused);
    if kind.is_some() || unused.is_some() {
        let unused = unused.unwrap_or_else(|| has(e, "Unused"));
        set_text(e, "Type", if unused { "1" } else { "0" });
        if let Some(kind) = kind {
            if format.has_chapter_type() {
                set_text(e, "ChapterType", &kind.code().to_string());
            }
        }
    }
    if !format.has_chapter_type() {
        remove(e, "ChapterType");
    }

    set_flag_field(e, "Field_SuppressChapterTitle", chapter.suppress_title);
    set_flag_field(e, "Field_IsTrash", chapter.is_trash);
    set_flag_field(e, "Field_SuppressChapterBreak", chapter.suppress_break);
    // The trash keeps whatever yWriter put into it.
    if !chapter.trash() || !has(e, "Scenes") {
        set_refs(e, "Scenes", "ScID", Some(chapter.scene_order.as_slice()));
    }
}

/// Scenes in the order they appear on disk, then in document order, then the rest.
fn scene_ids<'a>(root: &Element, project: &'a Project) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut ids = vec![];
    let on_disk: Vec<String> = root.get_child("SCENES").into_iter()
        .flat_map(|s| s.children.iter().filter_map(XMLNode::as_element))
        .filter_map(element_id)
        .collect();
    let candidates = on_disk.iter().filter_map(|id| project.scenes.get_key_value(id).map(|(k, _)| k.as_str()))
        .chain(project.document_scenes().into_iter().map(|(_, s)| s))
        .chain(project.scenes.keys().map(|k| k.as_str()));
    for id in candidates {
        if project.scenes.contains_key(id) && seen.insert(id) {
            ids.push(id);
        }
    }
    ids
}

/// Turns CDATA sections into plain text; the post-processor decides what is written as CDATA.
fn flatten_cdata(e: &mut Element) {
    if e.children.iter().any(|n| matches!(n, XMLNode::CData(_))) && !e.children.iter().any(|n| matches!(n, XMLNode::Element(_))) {
        let text = e.get_text().map(|t| t.into_owned()).unwrap_or_default();
        e.children.retain(|n| !matches!(n, XMLNode::Text(_) | XMLNode::CData(_)));
        if !text.is_empty() {
            e.children.push(XMLNode::Text(text));
        }
    }
    for c in e.children.iter_mut() {
        if let XMLNode::Element(c) = c {
            flatten_cdata(c);
        }
    }
}

/// Writes `project` into a project tree.
///
/// With an `existing` tree, only the fields the project has values for are touched, everything else is kept.
/// Without one, a new tree is built.
/// The result is indented and ready for [PostProcessor::serialize].
pub fn build_tree(project: &Project, format: FileFormat, existing: Option<Element>) -> Element {
    let mut root = match existing {
        Some(mut root) => {
            root.name = format.root_tag().to_string();
            root
        }
        None => Element::new(format.root_tag()),
    };
    flatten_cdata(&mut root);
    for section in ["PROJECT", "LOCATIONS", "ITEMS", "CHARACTERS", "SCENES", "CHAPTERS"] {
        child(&mut root, section);
    }
    write_project(child(&mut root, "PROJECT"), project, format);

    let ids = ordered_ids(&project.location_order, &project.locations);
    rebuild_section(&mut root, "LOCATIONS", "LOCATION", &ids, |e, id, n, _| {
        if let Some(l) = project.locations.get(id) {
            write_world_element(e, l, n);
        }
    });
    let ids = ordered_ids(&project.item_order, &project.items);
    rebuild_section(&mut root, "ITEMS", "ITEM", &ids, |e, id, n, _| {
        if let Some(i) = project.items.get(id) {
            write_world_element(e, i, n);
        }
    });
    let ids = ordered_ids(&project.character_order, &project.characters);
    rebuild_section(&mut root, "CHARACTERS", "CHARACTER", &ids, |e, id, n, _| {
        if let Some(c) = project.characters.get(id) {
            write_character(e, c, n);
        }
    });
    if project.project_notes.is_empty() {
        remove(&mut root, "PROJECTNOTES");
    } else {
        let ids = ordered_ids(&project.project_note_order, &project.project_notes);
        rebuild_section(&mut root, "PROJECTNOTES", "PROJECTNOTE", &ids, |e, id, n, _| {
            if let Some(note) = project.project_notes.get(id) {
                write_project_note(e, note, n);
            }
        });
    }
    write_locale(&mut root, project);

    let chapters = project.chapters_in_order();
    let mut owner: HashMap<&str, &str> = HashMap::new();
    for c in &chapters {
        if let Some(ch) = project.chapters.get(*c) {
            for s in &ch.scene_order {
                owner.entry(s.as_str()).or_insert(*c);
            }
        }
    }
    let ids = scene_ids(&root, project);
    rebuild_section(&mut root, "SCENES", "SCENE", &ids, |e, id, _, _| {
        if let Some(s) = project.scenes.get(id) {
            write_scene(e, s, owner.get(id).copied(), format);
        }
    });
    rebuild_section(&mut root, "CHAPTERS", "CHAPTER", &chapters, |e, id, n, created| {
        if let Some(c) = project.chapters.get(id) {
            write_chapter(e, c, n, created, format);
        }
    });

    indent(&mut root, 0);
    root
}

/// Serializes `project` as the text of a project file.
/// `existing` is the text of the file being updated, if any; its tree and its CDATA usage are kept.
pub fn serialize_yw(project: &Project, format: FileFormat, existing: Option<&str>, config: &ReaderConfig) -> Result<String, Error> {
    let mut post = PostProcessor::new(format).with_tags(config.extra_cdata_tags.iter().cloned());
    let tree = match existing {
        Some(source) => {
            post = post.with_tags(discover_cdata_tags(source));
            Some(parse_tree(source)?)
        }
        None => None,
    };
    post.serialize(&build_tree(project, format, tree))
}

/// Indents the tree with two spaces per level.
/// Whitespace between elements is replaced; the text of leaf elements is left alone.
pub fn indent(e: &mut Element, level: usize) {
    if !e.children.iter().any(|n| matches!(n, XMLNode::Element(_))) {
        return;
    }
    let inner = format!("\n{}", "  ".repeat(level + 1));
    let outer = format!("\n{}", "  ".repeat(level));
    for node in std::mem::take(&mut e.children) {
        match node {
            XMLNode::Text(t) if t.trim().is_empty() => {}
            XMLNode::Element(mut c) => {
                indent(&mut c, level + 1);
                e.children.push(XMLNode::Text(inner.clone()));
                e.children.push(XMLNode::Element(c));
            }
            XMLNode::Comment(c) => {
                e.children.push(XMLNode::Text(inner.clone()));
                e.children.push(XMLNode::Comment(c));
            }
            other => e.children.push(other),
        }
    }
    e.children.push(XMLNode::Text(outer));
}


#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = include_str!("../test-data/Test Project.yw7");

    fn read(text: &str) -> Project {
        parse_yw(text, FileFormat::Yw7, &ReaderConfig::default()).unwrap().0
    }

    fn write(project: &Project, existing: Option<&str>) -> String {
        serialize_yw(project, FileFormat::Yw7, existing, &ReaderConfig::default()).unwrap()
    }

    fn scene_element(xml: &str, id: &str) -> Element {
        let root = parse_tree(xml).unwrap();
        let scenes = root.get_child("SCENES").unwrap();
        scenes.children.iter().filter_map(XMLNode::as_element)
            .find(|e| element_id(e).as_deref() == Some(id))
            .unwrap()
            .clone()
    }

    #[test]
    fn todo_scene_survives() {
        let mut p = Project::new();
        let mut ch = Chapter::new();
        ch.title = Some("One".into());
        ch.scene_order = vec!["1".into(), "2".into()];
        p.chapters.insert("1".into(), ch);
        p.chapter_order.push("1".into());
        let mut normal = Scene::new();
        normal.set_content("Written.");
        p.scenes.insert("1".into(), normal);
        let mut todo = Scene::new();
        todo.scene_type = Some(ContentType::Todo);
        p.scenes.insert("2".into(), todo);

        let xml = write(&p, None);
        let reread = read(&xml);
        assert_eq!(reread.scenes["2"].kind(), ContentType::Todo);
        assert!(!reread.scenes["2"].is_normal());
        assert!(reread.scenes["1"].is_normal());
        let e = scene_element(&xml, "2");
        assert!(e.get_child("Unused").is_some());
        assert_eq!(e.get_child("BelongsToChID").and_then(text_of).as_deref(), Some("1"));
    }

    #[test]
    fn switching_to_a_date_removes_day_and_hour() {
        let mut p = read(SOURCE);
        let scene = p.scenes.get_mut("3").unwrap();
        scene.start = Some(SceneStart::Relative { day: Some("5".into()), hour: Some("14".into()), minute: None });
        let xml = write(&p, Some(SOURCE));
        let e = scene_element(&xml, "3");
        assert_eq!(e.get_child("Day").and_then(text_of).as_deref(), Some("5"));
        assert!(e.get_child("Minute").is_none());

        let scene = p.scenes.get_mut("3").unwrap();
        scene.start = Some(SceneStart::Specific { date: "2024-05-01".into(), time: "09:00:00".into() });
        let xml = write(&p, Some(&xml));
        let e = scene_element(&xml, "3");
        assert!(e.get_child("Day").is_none());
        assert!(e.get_child("Hour").is_none());
        assert_eq!(e.get_child("SpecificDateTime").and_then(text_of).as_deref(), Some("2024-05-01 09:00:00"));
        assert!(e.get_child("SpecificDateMode").is_some());
    }

    #[test]
    fn empty_tags_remove_the_element() {
        let mut p = read(SOURCE);
        p.scenes.get_mut("1").unwrap().tags = None;
        let xml = write(&p, Some(SOURCE));
        assert!(scene_element(&xml, "1").get_child("Tags").is_some());

        p.scenes.get_mut("1").unwrap().tags = Some(vec![]);
        let xml = write(&p, Some(SOURCE));
        assert!(scene_element(&xml, "1").get_child("Tags").is_none());
        assert_eq!(read(&xml).scenes["1"].tags, None);
    }

    #[test]
    fn false_markers_are_removed() {
        let mut p = read(SOURCE);
        let scene = p.scenes.get_mut("1").unwrap();
        scene.is_reaction = Some(false);
        scene.is_subplot = Some(true);
        let xml = write(&p, Some(SOURCE));
        let e = scene_element(&xml, "1");
        assert!(e.get_child("ReactionScene").is_none());
        assert_eq!(e.get_child("SubPlot").and_then(text_of).as_deref(), Some("-1"));
    }

    #[test]
    fn unknown_elements_survive() {
        let source = SOURCE.replace("<Goal>", "<CustomThing>keep me</CustomThing><Goal>");
        let p = read(&source);
        let xml = write(&p, Some(&source));
        assert_eq!(scene_element(&xml, "1").get_child("CustomThing").and_then(text_of).as_deref(), Some("keep me"));
    }

    #[test]
    fn fresh_tree_has_sort_order_and_types() {
        let mut p = read(SOURCE);
        p.chapter_order = vec!["3".into(), "2".into(), "1".into(), "4".into()];
        let root = build_tree(&p, FileFormat::Yw7, None);
        let chapters: Vec<&Element> = root.get_child("CHAPTERS").unwrap().children.iter().filter_map(XMLNode::as_element).collect();
        assert_eq!(chapters.len(), 4);
        assert_eq!(element_id(chapters[0]).as_deref(), Some("3"));
        assert_eq!(chapters[0].get_child("SortOrder").and_then(text_of).as_deref(), Some("1"));
        assert_eq!(chapters[3].get_child("SortOrder").and_then(text_of).as_deref(), Some("4"));
        assert_eq!(chapters[1].get_child("Type").and_then(text_of).as_deref(), Some("0"));
        assert_eq!(chapters[1].get_child("ChapterType").and_then(text_of).as_deref(), Some("0"));
        assert_eq!(root.get_child("PROJECT").unwrap().get_child("Ver").and_then(text_of).as_deref(), Some("7"));
    }

    #[test]
    fn notes_and_locale_round_trip() {
        let mut p = read(SOURCE);
        p.country_code = Some("GB".into());
        p.project_notes.insert("2".into(), ProjectNote { title: Some("Names".into()), desc: None });
        p.project_note_order = vec!["2".into(), "1".into()];
        let xml = write(&p, Some(SOURCE));
        let q = read(&xml);
        assert_eq!(q.project_note_order, vec!["2", "1"]);
        assert_eq!(q.project_notes["1"].desc.as_deref(), Some("Tide tables for October 1901."));
        assert_eq!(q.language_code.as_deref(), Some("en"));
        assert_eq!(q.country_code.as_deref(), Some("GB"));

        let root = parse_tree(&xml).unwrap();
        let vars: Vec<&Element> = root.get_child("PROJECTVARS").unwrap().children.iter().filter_map(XMLNode::as_element).collect();
        assert_eq!(vars.len(), 2);
        assert_eq!(element_id(vars[1]).as_deref(), Some("2"));
        assert_eq!(vars[1].get_child("Title").and_then(text_of).as_deref(), Some("Country"));
        assert_eq!(vars[1].get_child("Tags").and_then(text_of).as_deref(), Some("0"));

        let mut p = q;
        p.project_notes.clear();
        p.project_note_order.clear();
        let xml = write(&p, Some(&xml));
        assert!(parse_tree(&xml).unwrap().get_child("PROJECTNOTES").is_none());
        assert!(read(&xml).project_notes.is_empty());
    }

    #[test]
    fn legacy_locale_fields_become_variables() {
        let start = SOURCE.find("<PROJECTVARS>").unwrap();
        let end = SOURCE.find("</PROJECTVARS>").unwrap() + "</PROJECTVARS>".len();
        let mut source = SOURCE.to_string();
        source.replace_range(start..end, "");
        let source = source.replace("<WordTarget>", "<Fields><Field_LanguageCode>fr</Field_LanguageCode></Fields><WordTarget>");
        let p = read(&source);
        assert_eq!(p.language_code.as_deref(), Some("fr"));
        let xml = write(&p, Some(&source));
        let root = parse_tree(&xml).unwrap();
        let fields = root.get_child("PROJECT").unwrap().get_child("Fields");
        assert!(fields.map_or(true, |f| f.get_child("Field_LanguageCode").is_none()));
        assert_eq!(read(&xml).language_code.as_deref(), Some("fr"));
    }

    #[test]
    fn trash_keeps_its_scenes() {
        let p = read(SOURCE);
        let xml = write(&p, Some(SOURCE));
        let root = parse_tree(&xml).unwrap();
        let trash = root.get_child("CHAPTERS").unwrap().children.iter().filter_map(XMLNode::as_element)
            .find(|e| element_id(e).as_deref() == Some("4"))
            .unwrap();
        assert!(trash.get_child("Scenes").is_some());
    }

    #[test]
    fn older_formats() {
        let p = read(SOURCE);
        let xml = serialize_yw(&p, FileFormat::Yw6, Some(SOURCE), &ReaderConfig::default()).unwrap();
        assert!(xml.contains("<YWRITER6>"));
        assert!(!xml.contains("<ChapterType>"));
        assert!(xml.contains("<Ver>5</Ver>"));
        let (reread, _) = parse_yw(&xml, FileFormat::Yw6, &ReaderConfig::default()).unwrap();
        assert_eq!(reread.scenes["1"].content(), p.scenes["1"].content());
        assert_eq!(reread.chapters["2"].kind(), ContentType::Normal);
    }

    #[test]
    fn indentation() {
        let mut root = Element::parse("<A><B><C>text</C></B>\n\n<D>x</D></A>".as_bytes()).unwrap();
        indent(&mut root, 0);
        let mut out = vec![];
        root.write_with_config(&mut out, xmltree::EmitterConfig::new().perform_indent(false).write_document_declaration(false)).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(crate::reader::strip_declaration(&out), "<A>\n  <B>\n    <C>text</C>\n  </B>\n  <D>x</D>\n</A>");
    }
}
