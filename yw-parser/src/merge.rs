use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::*;


/// An id the source had and the target didn't.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub kind: EntityKind,
    pub id: String,
}

/// What a [merge] did.
/// The merge is always fully applied; mismatches are reported, never rolled back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub mismatches: Vec<Mismatch>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.mismatches.iter().map(|m| Warning::EntityAdded(m.kind, m.id.clone())).collect()
    }
}

fn take<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
    if let Some(v) = source {
        *target = Some(v.clone());
    }
}

/// Titles are only taken when they have content, so an empty field in an edited document doesn't erase one.
fn take_title(target: &mut Option<String>, source: &Option<String>) {
    if let Some(title) = source.as_ref().filter(|t| !t.is_empty()) {
        *target = Some(title.clone());
    }
}

fn take_refs<T>(target: &mut Option<Vec<String>>, source: &Option<Vec<String>>, known: &BTreeMap<String, T>) {
    if let Some(ids) = source {
        let mut seen = HashSet::new();
        *target = Some(ids.iter().filter(|id| known.contains_key(*id) && seen.insert(id.as_str())).cloned().collect());
    }
}

fn take_order<T>(target: &mut Vec<String>, source: &[String], known: &BTreeMap<String, T>) {
    if !source.is_empty() {
        let mut seen = HashSet::new();
        *target = source.iter().filter(|id| known.contains_key(*id) && seen.insert(id.as_str())).cloned().collect();
    }
}

/// Puts the ids of `old` that `order` lost and `lost` confirms back behind their old predecessor.
pub(crate) fn restore_order(order: &mut Vec<String>, old: &[String], lost: impl Fn(&str) -> bool) {
    for (i, id) in old.iter().enumerate() {
        if order.contains(id) || !lost(id) {
            continue;
        }
        let at = old[..i].iter().rev()
            .find_map(|prev| order.iter().position(|o| o == prev))
            .map(|p| p + 1)
            .unwrap_or(0);
        order.insert(at, id.clone());
    }
}

fn category<T: Default>(target: &mut BTreeMap<String, T>, source: &BTreeMap<String, T>, kind: EntityKind, report: &mut MergeReport, mut merge_one: impl FnMut(&mut T, &T)) {
    for (id, src) in source {
        let tgt = target.entry(id.clone()).or_insert_with(|| {
            report.mismatches.push(Mismatch { kind, id: id.clone() });
            T::default()
        });
        merge_one(tgt, src);
    }
}

fn merge_world_element(target: &mut WorldElement, source: &WorldElement) {
    take_title(&mut target.title, &source.title);
    take(&mut target.desc, &source.desc);
    take(&mut target.tags, &source.tags);
    take(&mut target.aka, &source.aka);
    take(&mut target.image, &source.image);
}

fn merge_character(target: &mut Character, source: &Character) {
    merge_world_element(&mut target.base, &source.base);
    take(&mut target.notes, &source.notes);
    take(&mut target.bio, &source.bio);
    take(&mut target.goals, &source.goals);
    take(&mut target.full_name, &source.full_name);
    take(&mut target.is_major, &source.is_major);
}

fn merge_project_note(target: &mut ProjectNote, source: &ProjectNote) {
    take_title(&mut target.title, &source.title);
    take(&mut target.desc, &source.desc);
}

fn merge_scene(target: &mut Scene, source: &Scene) {
    take_title(&mut target.title, &source.title);
    take(&mut target.desc, &source.desc);
    if let Some(content) = source.content() {
        target.set_content(content);
    }
    take(&mut target.rtf_file, &source.rtf_file);
    take(&mut target.is_unused, &source.is_unused);
    take(&mut target.scene_type, &source.scene_type);
    take(&mut target.do_not_export, &source.do_not_export);
    take(&mut target.status, &source.status);
    take(&mut target.notes, &source.notes);
    take(&mut target.tags, &source.tags);
    for (t, s) in target.fields.iter_mut().zip(&source.fields) {
        take(t, s);
    }
    take(&mut target.append_to_prev, &source.append_to_prev);
    take(&mut target.is_reaction, &source.is_reaction);
    take(&mut target.is_subplot, &source.is_subplot);
    take(&mut target.goal, &source.goal);
    take(&mut target.conflict, &source.conflict);
    take(&mut target.outcome, &source.outcome);
    take(&mut target.image, &source.image);
    take(&mut target.start, &source.start);
    take(&mut target.lasts_days, &source.lasts_days);
    take(&mut target.lasts_hours, &source.lasts_hours);
    take(&mut target.lasts_minutes, &source.lasts_minutes);
}

fn merge_chapter(target: &mut Chapter, source: &Chapter) {
    take_title(&mut target.title, &source.title);
    take(&mut target.desc, &source.desc);
    take(&mut target.level, &source.level);
    take(&mut target.chapter_type, &source.chapter_type);
    take(&mut target.legacy_type, &source.legacy_type);
    take(&mut target.is_unused, &source.is_unused);
    take(&mut target.suppress_title, &source.suppress_title);
    take(&mut target.is_trash, &source.is_trash);
    take(&mut target.suppress_break, &source.suppress_break);
}

/// Merges `source` into `target`.
///
/// Every entity of the source is looked up by id in the target; missing ones are created empty and reported.
/// Fields are copied when the source has them, titles only when they are not empty.
/// Reference lists are rebuilt from the source's lists, keeping ids the merged target knows,
/// and every scene ends up in at most one chapter.
/// A chapter keeps the scenes the source knows nothing about.
/// Merging the same source twice leaves the target as merging it once.
pub fn merge(target: &mut Project, source: &Project) -> MergeReport {
    let mut report = MergeReport::default();

    take_title(&mut target.title, &source.title);
    take(&mut target.desc, &source.desc);
    take(&mut target.author, &source.author);
    take(&mut target.author_bio, &source.author_bio);
    for (t, s) in target.field_titles.iter_mut().zip(&source.field_titles) {
        take(t, s);
    }
    take(&mut target.language_code, &source.language_code);
    take(&mut target.country_code, &source.country_code);

    category(&mut target.locations, &source.locations, EntityKind::Location, &mut report, merge_world_element);
    take_order(&mut target.location_order, &source.location_order, &target.locations);
    category(&mut target.items, &source.items, EntityKind::Item, &mut report, merge_world_element);
    take_order(&mut target.item_order, &source.item_order, &target.items);
    category(&mut target.characters, &source.characters, EntityKind::Character, &mut report, merge_character);
    take_order(&mut target.character_order, &source.character_order, &target.characters);
    category(&mut target.project_notes, &source.project_notes, EntityKind::ProjectNote, &mut report, merge_project_note);
    take_order(&mut target.project_note_order, &source.project_note_order, &target.project_notes);

    category(&mut target.scenes, &source.scenes, EntityKind::Scene, &mut report, merge_scene);
    for (id, src) in &source.scenes {
        if let Some(scene) = target.scenes.get_mut(id) {
            take_refs(&mut scene.characters, &src.characters, &target.characters);
            take_refs(&mut scene.locations, &src.locations, &target.locations);
            take_refs(&mut scene.items, &src.items, &target.items);
        }
    }

    category(&mut target.chapters, &source.chapters, EntityKind::Chapter, &mut report, merge_chapter);
    // Source chapters claim their scenes in document order, first come first served.
    let mut assigned: HashSet<&str> = HashSet::new();
    let mut rebuilt = vec![];
    for id in source.chapters_in_order() {
        let (Some(src), Some(chapter)) = (source.chapters.get(id), target.chapters.get_mut(id)) else {
            continue;
        };
        let old = std::mem::take(&mut chapter.scene_order);
        chapter.scene_order = src.scene_order.iter()
            .filter(|s| target.scenes.contains_key(*s) && assigned.insert(s.as_str()))
            .cloned()
            .collect();
        rebuilt.push((id, old));
    }
    for (id, old) in rebuilt {
        if let Some(chapter) = target.chapters.get_mut(id) {
            restore_order(&mut chapter.scene_order, &old, |s| !source.scenes.contains_key(s) && !assigned.contains(s));
        }
    }
    for (id, chapter) in target.chapters.iter_mut() {
        if !source.chapters.contains_key(id) {
            chapter.scene_order.retain(|s| !assigned.contains(s.as_str()));
        }
    }
    take_order(&mut target.chapter_order, &source.chapter_order, &target.chapters);

    debug!("merged {} scenes and {} chapters, {} mismatches", source.scenes.len(), source.chapters.len(), report.mismatches.len());
    report
}
