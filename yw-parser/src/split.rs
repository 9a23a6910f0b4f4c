use crate::*;


/// Starts a new part.
pub const PART_SEPARATOR: &str = "#";
/// Starts a new chapter.
pub const CHAPTER_SEPARATOR: &str = "##";
/// Starts a new scene.
pub const SCENE_SEPARATOR: &str = "###";

const DESC_SEPARATOR: char = '|';
const WARNING: &str = "(!)";
const CLIP_TITLE: usize = 20;

fn max_id<T>(map: &std::collections::BTreeMap<String, T>) -> u64 {
    map.keys().filter_map(|id| id.parse().ok()).max().unwrap_or(0)
}

/// Title and description of a heading line like `### Title|Description`.
fn heading(line: &str) -> (&str, &str) {
    let heading = line.trim_matches(|c: char| c == '#' || c == ' ');
    let mut parts = heading.split(DESC_SEPARATOR);
    (parts.next().unwrap_or(""), parts.next().unwrap_or(""))
}

fn create_scene(project: &mut Project, id: &str, parent_id: &str, split_count: usize, title: &str, desc: &str) {
    let Some(parent) = project.scenes.get_mut(parent_id) else {
        return;
    };
    let mut scene = Scene::new();
    scene.title = Some(if !title.is_empty() {
        title.to_string()
    } else if let Some(parent_title) = parent.title.as_deref().filter(|t| !t.is_empty()) {
        let clipped = if parent_title.chars().count() > CLIP_TITLE {
            format!("{}...", parent_title.chars().take(CLIP_TITLE).collect::<String>())
        } else {
            parent_title.to_string()
        };
        format!("{clipped} Split: {split_count}")
    } else {
        format!("New Scene Split: {split_count}")
    });
    if !desc.is_empty() {
        scene.desc = Some(desc.to_string());
    }

    // The parent's outline no longer describes all of its text.
    for field in [&mut parent.desc, &mut parent.goal, &mut parent.conflict, &mut parent.outcome] {
        if let Some(text) = field {
            if !text.is_empty() && !text.starts_with(WARNING) {
                *text = format!("{WARNING}{text}");
            }
        }
    }
    if parent.status.map(|s| s > SceneStatus::Draft).unwrap_or(false) {
        parent.status = Some(SceneStatus::Draft);
    }

    scene.status = parent.status;
    scene.scene_type = parent.scene_type;
    scene.is_unused = parent.is_unused;
    scene.start = parent.start.clone();
    scene.lasts_days = parent.lasts_days.clone();
    scene.lasts_hours = parent.lasts_hours.clone();
    scene.lasts_minutes = parent.lasts_minutes.clone();
    scene.set_content("");
    project.scenes.insert(id.to_string(), scene);
}

fn create_chapter(project: &mut Project, id: &str, title: &str, desc: &str, level: ChapterLevel) {
    let mut chapter = Chapter::new();
    chapter.title = Some(title.to_string());
    if !desc.is_empty() {
        chapter.desc = Some(desc.to_string());
    }
    chapter.level = Some(level);
    chapter.chapter_type = Some(ContentType::Normal);
    chapter.is_unused = Some(false);
    project.chapters.insert(id.to_string(), chapter);
}

fn set_content(project: &mut Project, scene: &str, lines: &mut Vec<&str>) {
    if let Some(s) = project.scenes.get_mut(scene) {
        s.set_content(lines.join("\n"));
    }
    lines.clear();
}

/// Splits scenes at heading lines.
///
/// A line starting with `###` begins a new scene, `##` a new chapter and `#` a new part,
/// with an optional title and `|`-separated description after the marker.
/// New entities get the next free numeric id and are inserted right after the one they were split from.
/// Returns whether anything was split.
pub fn split_scenes(project: &mut Project) -> bool {
    let mut chapter_max = max_id(&project.chapters);
    let mut scene_max = max_id(&project.scenes);
    let mut split = false;
    let mut new_order = vec![];

    for chapter_id in project.chapters_in_order().into_iter().map(String::from).collect::<Vec<_>>() {
        new_order.push(chapter_id.clone());
        let Some(scene_order) = project.chapters.get(&chapter_id).map(|c| c.scene_order.clone()) else {
            continue;
        };
        let mut current_chapter = chapter_id;
        let mut scenes = vec![];
        for parent_id in scene_order {
            scenes.push(parent_id.clone());
            let Some(content) = project.scenes.get(&parent_id).and_then(|s| s.content()).map(String::from) else {
                continue;
            };
            if !content.split('\n').any(|l| l.starts_with(PART_SEPARATOR)) {
                continue;
            }

            let mut current_scene = parent_id.clone();
            let mut lines = vec![];
            let mut in_scene = true;
            let mut split_count = 0;
            for line in content.split('\n') {
                let (title, desc) = heading(line);
                if line.starts_with(SCENE_SEPARATOR) {
                    set_content(project, &current_scene, &mut lines);
                    split_count += 1;
                    scene_max += 1;
                    current_scene = scene_max.to_string();
                    create_scene(project, &current_scene, &parent_id, split_count, title, desc);
                    scenes.push(current_scene.clone());
                    split = true;
                    in_scene = true;
                } else if line.starts_with(PART_SEPARATOR) {
                    if in_scene {
                        set_content(project, &current_scene, &mut lines);
                        split_count = 0;
                        in_scene = false;
                    }
                    if let Some(c) = project.chapters.get_mut(&current_chapter) {
                        c.scene_order = std::mem::take(&mut scenes);
                    }
                    chapter_max += 1;
                    current_chapter = chapter_max.to_string();
                    let (level, default_title) = if line.starts_with(CHAPTER_SEPARATOR) {
                        (ChapterLevel::Chapter, "New Chapter")
                    } else {
                        (ChapterLevel::Part, "New Part")
                    };
                    let title = if title.is_empty() { default_title } else { title };
                    create_chapter(project, &current_chapter, title, desc, level);
                    new_order.push(current_chapter.clone());
                    split = true;
                } else if !in_scene {
                    // Text after a chapter heading needs a scene to live in.
                    lines.push(line);
                    split_count += 1;
                    scene_max += 1;
                    current_scene = scene_max.to_string();
                    create_scene(project, &current_scene, &parent_id, split_count, "", "");
                    scenes.push(current_scene.clone());
                    in_scene = true;
                } else {
                    lines.push(line);
                }
            }
            if in_scene {
                set_content(project, &current_scene, &mut lines);
            }
        }
        if let Some(c) = project.chapters.get_mut(&current_chapter) {
            c.scene_order = scenes;
        }
    }
    if split {
        project.chapter_order = new_order;
    }
    split
}


#[cfg(test)]
mod tests {
    use super::*;

    fn project(content: &str) -> Project {
        let mut p = Project::new();
        let mut ch = Chapter::new();
        ch.title = Some("One".into());
        ch.scene_order = vec!["1".into(), "2".into()];
        p.chapters.insert("1".into(), ch);
        p.chapter_order.push("1".into());
        let mut parent = Scene::new();
        parent.title = Some("A rather long scene title".into());
        parent.desc = Some("What happens.".into());
        parent.status = Some(SceneStatus::Done);
        parent.start = Some(SceneStart::Relative { day: Some("3".into()), hour: None, minute: None });
        parent.set_content(content);
        p.scenes.insert("1".into(), parent);
        let mut next = Scene::new();
        next.set_content("Next.");
        p.scenes.insert("2".into(), next);
        p
    }

    #[test]
    fn nothing_to_split() {
        let mut p = project("Plain text.\nNo markers.");
        let before = p.clone();
        assert!(!split_scenes(&mut p));
        assert_eq!(p, before);
    }

    #[test]
    fn splits_scenes_and_chapters() {
        let mut p = project("First part.\n### Second|The next one\nMore.\n## |Chapter desc\nChapter text.");
        assert!(split_scenes(&mut p));
        assert_eq!(p.chapter_order, vec!["1", "2"]);
        assert_eq!(p.chapters["1"].scene_order, vec!["1", "3"]);
        assert_eq!(p.chapters["2"].scene_order, vec!["4", "2"]);
        assert_eq!(p.chapters["2"].title.as_deref(), Some("New Chapter"));
        assert_eq!(p.chapters["2"].desc.as_deref(), Some("Chapter desc"));
        assert_eq!(p.chapters["2"].level, Some(ChapterLevel::Chapter));

        let parent = &p.scenes["1"];
        assert_eq!(parent.content(), Some("First part."));
        assert_eq!(parent.word_count(), 2);
        assert_eq!(parent.desc.as_deref(), Some("(!)What happens."));
        assert_eq!(parent.status, Some(SceneStatus::Draft));

        let second = &p.scenes["3"];
        assert_eq!(second.title.as_deref(), Some("Second"));
        assert_eq!(second.desc.as_deref(), Some("The next one"));
        assert_eq!(second.content(), Some("More."));
        assert_eq!(second.status, Some(SceneStatus::Draft));
        assert_eq!(second.start, parent.start);

        let untitled = &p.scenes["4"];
        assert_eq!(untitled.title.as_deref(), Some("A rather long scene ... Split: 1"));
        assert_eq!(untitled.content(), Some("Chapter text."));
        assert!(p.integrity_errors().is_empty());
    }

    #[test]
    fn part_heading() {
        let mut p = project("Intro.\n# Book Two");
        assert!(split_scenes(&mut p));
        let part = &p.chapters["2"];
        assert!(part.is_part());
        assert_eq!(part.title.as_deref(), Some("Book Two"));
        assert_eq!(p.scenes["1"].content(), Some("Intro."));
        assert_eq!(p.chapters["1"].scene_order, vec!["1"]);
        // Scene 2 follows the heading, so it moves along.
        assert_eq!(part.scene_order, vec!["2"]);
    }

    #[test]
    fn untitled_parent() {
        let mut p = project("");
        let parent = p.scenes.get_mut("1").unwrap();
        parent.title = None;
        parent.set_content("a\n###\nb");
        split_scenes(&mut p);
        assert_eq!(p.scenes["3"].title.as_deref(), Some("New Scene Split: 1"));
        assert_eq!(p.scenes["3"].content(), Some("b"));
    }
}
