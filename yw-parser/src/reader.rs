use std::{collections::{BTreeMap, HashSet}, sync::OnceLock};

use regex::Regex;
use tracing::debug;
use xmltree::{Element, XMLNode};

use crate::*;
use crate::format::Fields;


/// Settings applied while reading a project.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// A chapter title starting with this character suppresses the title in exports.
    pub suppress_title_marker: char,
    /// Elements to write as CDATA in addition to the built-in list.
    pub extra_cdata_tags: Vec<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            suppress_title_marker: '@',
            extra_cdata_tags: vec![],
        }
    }
}

fn declaration() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*<\?xml[^>]*\?>").unwrap())
}

/// Removes the XML declaration, the text is already decoded and the declared encoding would mislead the parser.
pub(crate) fn strip_declaration(source: &str) -> &str {
    match declaration().find(source) {
        Some(m) => &source[m.end()..],
        None => source,
    }
}

pub(crate) fn parse_tree(source: &str) -> Result<Element, Error> {
    Element::parse(strip_declaration(source).as_bytes()).map_err(Error::malformed)
}

/// Parses the text of a yWriter project into a [Project].
pub fn parse_yw(source: &str, format: FileFormat, config: &ReaderConfig) -> Result<(Project, Vec<Warning>), Error> {
    let root = parse_tree(source)?;
    read_tree(&root, format, config)
}

fn entities<'a>(root: &'a Element, section: &str, tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    root.get_child(section).into_iter()
        .flat_map(|s| s.children.iter().filter_map(XMLNode::as_element))
        .filter(move |e| e.name == tag)
}

fn read_id(f: &Fields, kind: EntityKind, warnings: &mut Vec<Warning>) -> Option<String> {
    let id = f.text("ID").map(|id| id.trim().to_string()).filter(|id| !id.is_empty());
    if id.is_none() {
        warnings.push(Warning::IdMissing(kind));
    }
    id
}

fn read_tags(f: &Fields) -> Option<Vec<String>> {
    f.text("Tags").map(|t| string_to_list(&t)).filter(|t| !t.is_empty())
}

fn read_world_element(f: &Fields) -> WorldElement {
    WorldElement {
        title: f.text("Title"),
        desc: f.text("Desc"),
        tags: read_tags(f),
        aka: f.text("AKA"),
        image: f.text("ImageFile"),
    }
}

fn read_world(root: &Element, section: &str, tag: &str, kind: EntityKind, order: &mut Vec<String>, map: &mut BTreeMap<String, WorldElement>, warnings: &mut Vec<Warning>) {
    for e in entities(root, section, tag) {
        let f = Fields::of(e);
        if let Some(id) = read_id(&f, kind, warnings) {
            if map.insert(id.clone(), read_world_element(&f)).is_none() {
                order.push(id);
            }
        }
    }
}

fn read_scene(f: &Fields, id: &str, format: FileFormat, warnings: &mut Vec<Warning>) -> Scene {
    let mut scene = Scene::new();
    scene.title = f.text("Title");
    scene.desc = f.text("Desc");
    scene.set_counts(f.number("WordCount").unwrap_or(0), f.number("LetterCount").unwrap_or(0));
    if format.inline_content() {
        if let Some(content) = f.text("SceneContent") {
            scene.set_content(content);
        }
    }
    scene.rtf_file = f.text("RTFFile");

    // Unused | Field_SceneType | type
    //   -    |   -  or 0       | Normal
    //   x    |   1             | Notes
    //   x    |   2             | Todo
    //  -1    |   -  or 0       | Normal, unused
    scene.is_unused = f.marker("Unused");
    scene.scene_type = Some(f.field("Field_SceneType").and_then(|c| ContentType::from_code(&c)).unwrap_or_default());
    scene.do_not_export = Some(f.has("ExportCondSpecific") && !f.has("ExportWhenRTF"));
    if let Some(status) = f.text("Status") {
        scene.status = status.trim().parse().ok().and_then(SceneStatus::from_code);
        if scene.status.is_none() {
            warnings.push(Warning::SceneStatusInvalid(id.to_string(), status));
        }
    }
    scene.notes = f.text("Notes");
    scene.tags = read_tags(f);
    for (i, field) in scene.fields.iter_mut().enumerate() {
        *field = f.text(&format!("Field{}", i + 1));
    }
    scene.append_to_prev = f.marker("AppendToPrev");
    scene.is_reaction = f.marker("ReactionScene");
    scene.is_subplot = f.marker("SubPlot");
    scene.goal = f.text("Goal");
    scene.conflict = f.text("Conflict");
    scene.outcome = f.text("Outcome");
    scene.image = f.text("ImageFile");

    scene.start = if let Some(date_time) = f.text("SpecificDateTime") {
        let mut date = String::new();
        let mut time = String::new();
        for part in date_time.split(' ') {
            if part.contains('-') {
                date = part.to_string();
            } else if part.contains(':') {
                time = part.to_string();
            }
        }
        Some(SceneStart::Specific { date, time })
    } else {
        let (day, hour, minute) = (f.text("Day"), f.text("Hour"), f.text("Minute"));
        if day.is_some() || hour.is_some() || minute.is_some() {
            Some(SceneStart::Relative { day, hour, minute })
        } else {
            None
        }
    };
    scene.lasts_days = f.text("LastsDays");
    scene.lasts_hours = f.text("LastsHours");
    scene.lasts_minutes = f.text("LastsMinutes");

    scene.characters = Some(f.id_list("Characters", "CharID").unwrap_or_default());
    scene.locations = Some(f.id_list("Locations", "LocID").unwrap_or_default());
    scene.items = Some(f.id_list("Items", "ItemID").unwrap_or_default());
    scene
}

fn read_chapter(f: &Fields, format: FileFormat, config: &ReaderConfig) -> Chapter {
    let mut chapter = Chapter::new();
    chapter.title = f.text("Title");
    chapter.desc = f.text("Desc");
    chapter.level = Some(if f.has("SectionStart") { ChapterLevel::Part } else { ChapterLevel::Chapter });
    chapter.is_unused = f.marker("Unused");
    chapter.legacy_type = f.text("Type").and_then(|t| t.trim().parse().ok());

    // Older files only know Type: 1 is a notes chapter.
    let code = match f.text("ChapterType") {
        Some(t) if format.has_chapter_type() => ContentType::from_code(&t),
        _ => chapter.legacy_type.map(|t| if t == 1 { ContentType::Notes } else { ContentType::Normal }),
    };
    chapter.chapter_type = Some(code.unwrap_or_default());

    let starts_with_marker = chapter.title.as_deref().map(|t| t.starts_with(config.suppress_title_marker)).unwrap_or(false);
    chapter.suppress_title = Some(match f.field("Field_SuppressChapterTitle") {
        Some(v) => v.trim() == "1",
        None => starts_with_marker,
    });
    chapter.is_trash = Some(f.field("Field_IsTrash").map(|v| v.trim() == "1").unwrap_or(false));
    chapter.suppress_break = Some(f.field("Field_SuppressChapterBreak").map(|v| v.trim() == "1").unwrap_or(false));
    chapter
}

fn read_locale(root: &Element, project: &mut Project) {
    for e in entities(root, "PROJECTVARS", "PROJECTVAR") {
        let f = Fields::of(e);
        let Some(desc) = f.text("Desc") else {
            continue;
        };
        match f.text("Title").as_deref() {
            Some("Language") => project.language_code = Some(desc),
            Some("Country") => project.country_code = Some(desc),
            _ => {}
        }
    }
}

fn keep_known<T>(ids: &mut Option<Vec<String>>, known: &BTreeMap<String, T>, kind: EntityKind, owner: &str, warnings: &mut Vec<Warning>) {
    if let Some(ids) = ids {
        ids.retain(|id| {
            let ok = known.contains_key(id);
            if !ok {
                warnings.push(Warning::ReferenceDangling { kind, owner: owner.to_string(), id: id.clone() });
            }
            ok
        });
    }
}

/// Builds a [Project] from a parsed project tree.
pub fn read_tree(root: &Element, format: FileFormat, config: &ReaderConfig) -> Result<(Project, Vec<Warning>), Error> {
    let mut warnings = vec![];
    if root.name != format.root_tag() {
        warnings.push(Warning::RootTagUnexpected { expected: format.root_tag(), found: root.name.clone() });
    }
    let prj = root.get_child("PROJECT").ok_or_else(|| Error::malformed("PROJECT element is missing"))?;
    let f = Fields::of(prj);
    let mut project = Project::new();
    project.title = f.text("Title");
    project.desc = f.text("Desc");
    project.author = f.text("AuthorName");
    project.author_bio = f.text("Bio");
    for (i, title) in project.field_titles.iter_mut().enumerate() {
        *title = f.text(&format!("FieldTitle{}", i + 1));
    }
    // Written by yWriter 7.6 to 7.10, project variables take precedence.
    project.language_code = f.field("Field_LanguageCode");
    project.country_code = f.field("Field_CountryCode");
    read_locale(root, &mut project);

    read_world(root, "LOCATIONS", "LOCATION", EntityKind::Location, &mut project.location_order, &mut project.locations, &mut warnings);
    read_world(root, "ITEMS", "ITEM", EntityKind::Item, &mut project.item_order, &mut project.items, &mut warnings);

    for e in entities(root, "CHARACTERS", "CHARACTER") {
        let f = Fields::of(e);
        if let Some(id) = read_id(&f, EntityKind::Character, &mut warnings) {
            let character = Character {
                base: read_world_element(&f),
                notes: f.text("Notes"),
                bio: f.text("Bio"),
                goals: f.text("Goals"),
                full_name: f.text("FullName"),
                is_major: f.marker("Major"),
            };
            if project.characters.insert(id.clone(), character).is_none() {
                project.character_order.push(id);
            }
        }
    }

    for e in entities(root, "PROJECTNOTES", "PROJECTNOTE") {
        let f = Fields::of(e);
        if let Some(id) = read_id(&f, EntityKind::ProjectNote, &mut warnings) {
            let note = ProjectNote { title: f.text("Title"), desc: f.text("Desc") };
            if project.project_notes.insert(id.clone(), note).is_none() {
                project.project_note_order.push(id);
            }
        }
    }

    for e in entities(root, "SCENES", "SCENE") {
        let f = Fields::of(e);
        if let Some(id) = read_id(&f, EntityKind::Scene, &mut warnings) {
            let mut scene = read_scene(&f, &id, format, &mut warnings);
            keep_known(&mut scene.characters, &project.characters, EntityKind::Character, &id, &mut warnings);
            keep_known(&mut scene.locations, &project.locations, EntityKind::Location, &id, &mut warnings);
            keep_known(&mut scene.items, &project.items, EntityKind::Item, &id, &mut warnings);
            project.scenes.insert(id, scene);
        }
    }

    let mut assigned = HashSet::new();
    for e in entities(root, "CHAPTERS", "CHAPTER") {
        let f = Fields::of(e);
        let Some(id) = read_id(&f, EntityKind::Chapter, &mut warnings) else {
            continue;
        };
        let mut chapter = read_chapter(&f, format, config);
        // Scenes in the trash are not part of the document.
        if !chapter.trash() {
            let mut scenes = Some(f.id_list("Scenes", "ScID").unwrap_or_default());
            keep_known(&mut scenes, &project.scenes, EntityKind::Scene, &id, &mut warnings);
            for s in scenes.unwrap_or_default() {
                if assigned.insert(s.clone()) {
                    chapter.scene_order.push(s);
                } else {
                    warnings.push(Warning::SceneDuplicated(s));
                }
            }
        }
        if !project.chapters.contains_key(&id) {
            project.chapter_order.push(id.clone());
            project.chapters.insert(id, chapter);
        }
    }

    inherit_chapter_types(&mut project);
    debug!("read {} chapters and {} scenes", project.chapters.len(), project.scenes.len());
    Ok((project, warnings))
}

/// Scenes of Notes, Todo and unused chapters take over the chapter's type.
fn inherit_chapter_types(project: &mut Project) {
    for chapter in project.chapters.values() {
        let kind = chapter.kind();
        if kind == ContentType::Normal && !chapter.unused() {
            continue;
        }
        for s in &chapter.scene_order {
            if let Some(scene) = project.scenes.get_mut(s) {
                if kind == ContentType::Normal {
                    scene.is_unused = Some(true);
                } else {
                    scene.scene_type = Some(kind);
                    scene.is_unused = Some(true);
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn test_project() -> Project {
        parse_yw(include_str!("../test-data/Test Project.yw7"), FileFormat::Yw7, &ReaderConfig::default()).unwrap().0
    }

    #[test]
    fn project_fields() {
        let p = test_project();
        assert_eq!(p.author.as_deref(), Some("Jane Doe"));
        assert_eq!(p.field_titles[0].as_deref(), Some("Tension"));
        assert_eq!(p.location_order, vec!["1", "2"]);
        assert_eq!(p.locations["1"].desc.as_deref(), Some("Fog & gulls."));
        assert_eq!(p.locations["1"].tags, Some(vec!["coast".to_string(), "night".to_string()]));
        assert_eq!(p.items["1"].title.as_deref(), Some("Brass Key"));
        let mara = &p.characters["1"];
        assert_eq!(mara.full_name.as_deref(), Some("Mara Quinn"));
        assert_eq!(mara.is_major, Some(true));
        assert_eq!(p.characters["2"].is_major, Some(false));
    }

    #[test]
    fn notes_and_locale() {
        let p = test_project();
        assert_eq!(p.project_note_order, vec!["1"]);
        assert_eq!(p.project_notes["1"].title.as_deref(), Some("Research"));
        assert_eq!(p.project_notes["1"].desc.as_deref(), Some("Tide tables for October 1901."));
        assert_eq!(p.language_code.as_deref(), Some("en"));
        assert_eq!(p.country_code, None);

        let source = "<YWRITER7><PROJECT><Fields><Field_LanguageCode>de</Field_LanguageCode><Field_CountryCode>AT</Field_CountryCode></Fields></PROJECT>\
            <PROJECTVARS><PROJECTVAR><ID>1</ID><Title>Country</Title><Desc>DE</Desc></PROJECTVAR></PROJECTVARS></YWRITER7>";
        let (p, _) = parse_yw(source, FileFormat::Yw7, &ReaderConfig::default()).unwrap();
        assert_eq!(p.language_code.as_deref(), Some("de"));
        assert_eq!(p.country_code.as_deref(), Some("DE"));
        assert!(p.project_notes.is_empty());
    }

    #[test]
    fn scene_fields() {
        let p = test_project();
        let arrival = &p.scenes["1"];
        assert_eq!(arrival.word_count(), 13);
        assert_eq!(arrival.letter_count(), 69);
        assert_eq!(arrival.status, Some(SceneStatus::FirstEdit));
        assert_eq!(arrival.is_reaction, Some(true));
        assert_eq!(arrival.is_subplot, Some(false));
        assert_eq!(arrival.fields[0].as_deref(), Some("4"));
        assert_eq!(arrival.start, Some(SceneStart::Specific { date: "1901-10-03".into(), time: "18:30:00".into() }));
        assert_eq!(arrival.lasts_hours.as_deref(), Some("2"));
        assert_eq!(arrival.characters, Some(vec!["1".to_string()]));
        assert_eq!(arrival.items, Some(vec!["1".to_string()]));
        assert!(arrival.is_normal());

        let todo = &p.scenes["2"];
        assert_eq!(todo.kind(), ContentType::Todo);
        assert!(!todo.is_normal());

        let waiting = &p.scenes["3"];
        assert_eq!(waiting.start, Some(SceneStart::Relative { day: Some("2".into()), hour: Some("7".into()), minute: Some("15".into()) }));
        assert_eq!(waiting.do_not_export, Some(false));
    }

    #[test]
    fn chapter_fields() {
        let p = test_project();
        assert_eq!(p.chapter_order, vec!["1", "2", "3", "4"]);
        assert!(p.chapters["1"].is_part());
        assert_eq!(p.chapters["2"].scene_order, vec!["1", "2"]);
        assert_eq!(p.chapters["3"].suppress_title, Some(true));
        assert_eq!(p.chapters["2"].suppress_title, Some(false));
        let trash = &p.chapters["4"];
        assert!(trash.trash());
        assert!(trash.scene_order.is_empty());
        assert_eq!(p.chapter_of("4"), None);
    }

    #[test]
    fn legacy_type_forces_notes() {
        let source = "<YWRITER6><PROJECT><Title>x</Title></PROJECT><SCENES>\
            <SCENE><ID>1</ID><Title>a</Title></SCENE>\
            <SCENE><ID>2</ID><Title>b</Title><Fields><Field_SceneType>2</Field_SceneType></Fields></SCENE></SCENES>\
            <CHAPTERS><CHAPTER><ID>1</ID><Type>1</Type><Unused>-1</Unused><Scenes><ScID>1</ScID><ScID>2</ScID></Scenes></CHAPTER></CHAPTERS></YWRITER6>";
        let (p, _) = parse_yw(source, FileFormat::Yw6, &ReaderConfig::default()).unwrap();
        assert_eq!(p.chapters["1"].kind(), ContentType::Notes);
        assert_eq!(p.scenes["1"].kind(), ContentType::Notes);
        assert_eq!(p.scenes["2"].kind(), ContentType::Notes);
    }

    #[test]
    fn unused_chapter_marks_scenes_unused() {
        let source = "<YWRITER7><PROJECT/><SCENES><SCENE><ID>1</ID></SCENE></SCENES>\
            <CHAPTERS><CHAPTER><ID>1</ID><Type>1</Type><ChapterType>0</ChapterType><Unused>-1</Unused><Scenes><ScID>1</ScID></Scenes></CHAPTER></CHAPTERS></YWRITER7>";
        let (p, _) = parse_yw(source, FileFormat::Yw7, &ReaderConfig::default()).unwrap();
        assert_eq!(p.chapters["1"].kind(), ContentType::Normal);
        assert_eq!(p.scenes["1"].kind(), ContentType::Normal);
        assert!(p.scenes["1"].unused());
    }

    #[test]
    fn warnings_for_bad_data() {
        let source = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<YWRITER7><PROJECT/><CHARACTERS><CHARACTER><Title>nobody</Title></CHARACTER></CHARACTERS>\
            <SCENES><SCENE><ID>1</ID><Status>9</Status><Characters><CharID>5</CharID></Characters></SCENE></SCENES>\
            <CHAPTERS><CHAPTER><ID>1</ID><Scenes><ScID>1</ScID><ScID>8</ScID></Scenes></CHAPTER>\
            <CHAPTER><ID>2</ID><Scenes><ScID>1</ScID></Scenes></CHAPTER></CHAPTERS></YWRITER7>";
        let (p, warnings) = parse_yw(source, FileFormat::Yw7, &ReaderConfig::default()).unwrap();
        assert!(warnings.contains(&Warning::IdMissing(EntityKind::Character)));
        assert!(warnings.contains(&Warning::SceneStatusInvalid("1".into(), "9".into())));
        assert!(warnings.contains(&Warning::ReferenceDangling { kind: EntityKind::Character, owner: "1".into(), id: "5".into() }));
        assert!(warnings.contains(&Warning::ReferenceDangling { kind: EntityKind::Scene, owner: "1".into(), id: "8".into() }));
        assert!(warnings.contains(&Warning::SceneDuplicated("1".into())));
        assert_eq!(p.chapters["1"].scene_order, vec!["1"]);
        assert!(p.chapters["2"].scene_order.is_empty());
        assert!(p.integrity_errors().is_empty());
    }

    #[test]
    fn suppress_title_marker() {
        let source = "<YWRITER7><PROJECT/><CHAPTERS><CHAPTER><ID>1</ID><Title>Chapter 1</Title></CHAPTER>\
            <CHAPTER><ID>2</ID><Title>#Prologue</Title></CHAPTER>\
            <CHAPTER><ID>3</ID><Title>#Forced</Title><Fields><Field_SuppressChapterTitle>0</Field_SuppressChapterTitle></Fields></CHAPTER></CHAPTERS></YWRITER7>";
        let config = ReaderConfig { suppress_title_marker: '#', ..Default::default() };
        let (p, _) = parse_yw(source, FileFormat::Yw7, &config).unwrap();
        assert_eq!(p.chapters["1"].title.as_deref(), Some("Chapter 1"));
        assert_eq!(p.chapters["1"].suppress_title, Some(false));
        assert_eq!(p.chapters["2"].suppress_title, Some(true));
        assert_eq!(p.chapters["3"].suppress_title, Some(false));
    }

    #[test]
    fn malformed() {
        assert!(matches!(parse_yw("<YWRITER7><PROJECT>", FileFormat::Yw7, &ReaderConfig::default()), Err(Error::Malformed { .. })));
        assert!(matches!(parse_yw("<YWRITER7/>", FileFormat::Yw7, &ReaderConfig::default()), Err(Error::Malformed { .. })));
    }
}
