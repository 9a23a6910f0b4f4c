use std::{collections::BTreeMap, path::Path};

use crate::*;


/// Placeholder name to value. Missing values are empty strings.
pub type Mapping = BTreeMap<&'static str, String>;

/// A date yWriter writes when a scene has no date.
const NULL_DATE: &str = "0001-01-01";
const DIVIDER: &str = ", ";

const ROMAN: [(usize, &str); 13] = [
    (1000, "M"), (900, "CM"), (500, "D"), (400, "CD"), (100, "C"), (90, "XC"),
    (50, "L"), (40, "XL"), (10, "X"), (9, "IX"), (5, "V"), (4, "IV"), (1, "I"),
];

const ZERO_TO_TWENTY: [&str; 21] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen", "nineteen", "twenty",
];

const TENS: [&str; 10] = ["", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety"];

pub fn number_to_roman(mut n: usize) -> String {
    let mut out = String::new();
    for (value, numeral) in ROMAN {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}

/// Spells out numbers below one million, empty for larger ones.
pub fn number_to_english(n: usize) -> String {
    match n {
        0..=20 => ZERO_TO_TWENTY[n].to_string(),
        21..=99 if n % 10 == 0 => TENS[n / 10].to_string(),
        21..=99 => format!("{} {}", TENS[n / 10], ZERO_TO_TWENTY[n % 10]),
        100..=999 if n % 100 == 0 => format!("{} hundred", number_to_english(n / 100)),
        100..=999 => format!("{} hundred {}", number_to_english(n / 100), number_to_english(n % 100)),
        1000..=999_999 if n % 1000 == 0 => format!("{} thousand", number_to_english(n / 1000)),
        1000..=999_999 => format!("{} thousand {}", number_to_english(n / 1000), number_to_english(n % 1000)),
        _ => String::new(),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn or_empty(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number(n: usize) -> String {
    if n == 0 { String::new() } else { n.to_string() }
}

/// Leaves text unchanged.
pub fn plain(text: &str) -> String {
    text.to_string()
}

/// Builds the placeholder mappings of a project's entities for template rendering.
///
/// Multi-line fields (descriptions, scene content, notes) pass through the converter,
/// one-liners are taken as they are.
#[derive(Clone)]
pub struct Mapper<'p> {
    pub project: &'p Project,
    pub project_name: String,
    pub project_path: String,
    chapter_prefix: Option<String>,
    convert: fn(&str) -> String,
}

impl<'p> Mapper<'p> {
    pub fn new(project: &'p Project) -> Self {
        Mapper { project, project_name: String::new(), project_path: String::new(), chapter_prefix: None, convert: plain }
    }

    /// `ProjectName` and `ProjectPath` from the project file.
    pub fn with_path(mut self, path: &Path) -> Self {
        self.project_name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        self.project_path = path.parent().map(|p| p.display().to_string()).unwrap_or_default();
        self
    }

    /// Replaces the "Chapter " that starts automatic chapter titles. The project itself is left alone.
    pub fn with_chapter_prefix(mut self, prefix: Option<String>) -> Self {
        self.chapter_prefix = prefix;
        self
    }

    fn chapter_title(&self, c: &Chapter) -> String {
        if c.suppress_title.unwrap_or(false) {
            return String::new();
        }
        let title = or_empty(&c.title);
        match (&self.chapter_prefix, title.strip_prefix("Chapter ")) {
            (Some(prefix), Some(rest)) => format!("{prefix}{rest}"),
            _ => title,
        }
    }

    pub fn with_converter(mut self, convert: fn(&str) -> String) -> Self {
        self.convert = convert;
        self
    }

    fn rich(&self, value: &Option<String>) -> String {
        value.as_deref().map(self.convert).unwrap_or_default()
    }

    fn titles<T>(&self, ids: &Option<Vec<String>>, map: &BTreeMap<String, T>, title: impl Fn(&T) -> &Option<String>) -> Vec<String> {
        ids.iter().flatten()
            .filter_map(|id| map.get(id))
            .map(|e| or_empty(title(e)))
            .collect()
    }

    pub fn project(&self) -> Mapping {
        let p = self.project;
        let mut m = Mapping::new();
        m.insert("Title", or_empty(&p.title));
        m.insert("Desc", self.rich(&p.desc));
        m.insert("AuthorName", or_empty(&p.author));
        m.insert("AuthorBio", or_empty(&p.author_bio));
        self.field_titles(&mut m);
        m
    }

    fn field_titles(&self, m: &mut Mapping) {
        const NAMES: [&str; 4] = ["FieldTitle1", "FieldTitle2", "FieldTitle3", "FieldTitle4"];
        for (name, title) in NAMES.into_iter().zip(&self.project.field_titles) {
            m.insert(name, or_empty(title));
        }
    }

    fn project_keys(&self, m: &mut Mapping) {
        m.insert("ProjectName", self.project_name.clone());
        m.insert("ProjectPath", self.project_path.clone());
    }

    /// `number` is the running chapter number, 0 for chapters that aren't numbered.
    pub fn chapter(&self, id: &str, number: usize) -> Mapping {
        let mut m = Mapping::new();
        let Some(c) = self.project.chapters.get(id) else {
            return m;
        };
        m.insert("ID", id.to_string());
        m.insert("ChapterNumber", self::number(number));
        m.insert("Title", self.chapter_title(c));
        m.insert("Desc", self.rich(&c.desc));
        let (english, roman) = if number > 0 {
            (capitalize(&number_to_english(number)), number_to_roman(number))
        } else {
            (String::new(), String::new())
        };
        m.insert("ChNumberEnglish", english);
        m.insert("ChNumberRoman", roman);
        self.project_keys(&mut m);
        m
    }

    /// `number` is the running scene number, 0 for scenes that aren't numbered.
    /// The totals include this scene.
    pub fn scene(&self, id: &str, number: usize, words_total: usize, letters_total: usize) -> Mapping {
        let mut m = Mapping::new();
        let Some(s) = self.project.scenes.get(id) else {
            return m;
        };
        m.insert("ID", id.to_string());
        m.insert("SceneNumber", self::number(number));
        m.insert("Title", or_empty(&s.title));
        m.insert("Desc", self.rich(&s.desc));
        m.insert("WordCount", s.word_count().to_string());
        m.insert("WordsTotal", words_total.to_string());
        m.insert("LetterCount", s.letter_count().to_string());
        m.insert("LettersTotal", letters_total.to_string());
        m.insert("Status", s.status.map(|st| st.label().to_string()).unwrap_or_default());
        m.insert("SceneContent", s.content().map(self.convert).unwrap_or_default());
        self.field_titles(&mut m);
        for (name, field) in ["Field1", "Field2", "Field3", "Field4"].into_iter().zip(&s.fields) {
            m.insert(name, or_empty(field));
        }

        let (mut date, mut time, mut day, mut hour, mut minute) = (String::new(), String::new(), String::new(), String::new(), String::new());
        let (mut sc_date, mut sc_time) = (String::new(), String::new());
        match &s.start {
            Some(SceneStart::Specific { date: d, time: t }) if !d.is_empty() && d != NULL_DATE => {
                date = d.clone();
                sc_date = d.clone();
                if !t.is_empty() {
                    time = t.clone();
                    sc_time = t.rsplit_once(':').map(|(hm, _)| hm.to_string()).unwrap_or_else(|| t.clone());
                }
            }
            Some(SceneStart::Relative { day: d, hour: h, minute: mi }) => {
                if let Some(d) = d {
                    day = d.clone();
                    sc_date = format!("Day {d}");
                }
                if h.is_some() || mi.is_some() {
                    hour = h.clone().unwrap_or_else(|| "00".into());
                    minute = mi.clone().unwrap_or_else(|| "00".into());
                    sc_time = format!("{:0>2}:{:0>2}", hour, minute);
                }
            }
            _ => {}
        }
        m.insert("Date", date);
        m.insert("Time", time);
        m.insert("Day", day);
        m.insert("Hour", hour);
        m.insert("Minute", minute);
        m.insert("ScDate", sc_date);
        m.insert("ScTime", sc_time);

        let lasting = |v: &Option<String>| v.clone().filter(|v| v != "0").unwrap_or_default();
        let (days, hours, minutes) = (lasting(&s.lasts_days), lasting(&s.lasts_hours), lasting(&s.lasts_minutes));
        let mut duration = String::new();
        if !days.is_empty() {
            duration.push_str(&format!("{days}d "));
        }
        if !hours.is_empty() {
            duration.push_str(&format!("{hours}h "));
        }
        if !minutes.is_empty() {
            duration.push_str(&format!("{minutes}min"));
        }
        m.insert("LastsDays", days);
        m.insert("LastsHours", hours);
        m.insert("LastsMinutes", minutes);
        m.insert("Duration", duration);

        m.insert("ReactionScene", if s.is_reaction.unwrap_or(false) { "R" } else { "A" }.to_string());
        m.insert("Goal", self.rich(&s.goal));
        m.insert("Conflict", self.rich(&s.conflict));
        m.insert("Outcome", self.rich(&s.outcome));
        m.insert("Tags", s.tags.as_deref().map(|t| list_to_string(t, DIVIDER)).unwrap_or_default());
        m.insert("Image", or_empty(&s.image));

        let characters = self.titles(&s.characters, &self.project.characters, |c| &c.base.title);
        m.insert("Viewpoint", characters.first().cloned().unwrap_or_default());
        m.insert("Characters", characters.join(DIVIDER));
        m.insert("Locations", self.titles(&s.locations, &self.project.locations, |l| &l.title).join(DIVIDER));
        m.insert("Items", self.titles(&s.items, &self.project.items, |i| &i.title).join(DIVIDER));
        m.insert("Notes", self.rich(&s.notes));
        self.project_keys(&mut m);
        m
    }

    fn world_element(&self, id: &str, e: &WorldElement, m: &mut Mapping) {
        m.insert("ID", id.to_string());
        m.insert("Title", or_empty(&e.title));
        m.insert("Desc", self.rich(&e.desc));
        m.insert("Tags", e.tags.as_deref().map(|t| list_to_string(t, DIVIDER)).unwrap_or_default());
        m.insert("Image", or_empty(&e.image));
        m.insert("AKA", or_empty(&e.aka));
        self.project_keys(m);
    }

    pub fn character(&self, id: &str) -> Mapping {
        let mut m = Mapping::new();
        if let Some(c) = self.project.characters.get(id) {
            self.world_element(id, &c.base, &mut m);
            m.insert("Notes", self.rich(&c.notes));
            m.insert("Bio", self.rich(&c.bio));
            m.insert("Goals", self.rich(&c.goals));
            m.insert("FullName", or_empty(&c.full_name));
            m.insert("Status", if c.is_major.unwrap_or(false) { "Major" } else { "Minor" }.to_string());
        }
        m
    }

    pub fn location(&self, id: &str) -> Mapping {
        let mut m = Mapping::new();
        if let Some(l) = self.project.locations.get(id) {
            self.world_element(id, l, &mut m);
        }
        m
    }

    pub fn item(&self, id: &str) -> Mapping {
        let mut m = Mapping::new();
        if let Some(i) = self.project.items.get(id) {
            self.world_element(id, i, &mut m);
        }
        m
    }

    pub fn project_note(&self, id: &str) -> Mapping {
        let mut m = Mapping::new();
        if let Some(n) = self.project.project_notes.get(id) {
            m.insert("ID", id.to_string());
            m.insert("Title", or_empty(&n.title));
            m.insert("Desc", self.rich(&n.desc));
            self.project_keys(&mut m);
        }
        m
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn test_project() -> Project {
        parse_yw(include_str!("../test-data/Test Project.yw7"), FileFormat::Yw7, &ReaderConfig::default()).unwrap().0
    }

    #[test]
    fn numbers() {
        assert_eq!(number_to_roman(1994), "MCMXCIV");
        assert_eq!(number_to_roman(4), "IV");
        assert_eq!(number_to_english(7), "seven");
        assert_eq!(number_to_english(40), "forty");
        assert_eq!(number_to_english(42), "forty two");
        assert_eq!(number_to_english(300), "three hundred");
        assert_eq!(number_to_english(1215), "one thousand two hundred fifteen");
        assert_eq!(capitalize(&number_to_english(21)), "Twenty one");
    }

    #[test]
    fn scene_mapping() {
        let p = test_project();
        let m = Mapper::new(&p).with_path(Path::new("/novels/Test.yw7")).scene("1", 1, 13, 69);
        assert_eq!(m["SceneNumber"], "1");
        assert_eq!(m["Title"], "Arrival");
        assert_eq!(m["Status"], "1st Edit");
        assert_eq!(m["ScDate"], "1901-10-03");
        assert_eq!(m["ScTime"], "18:30");
        assert_eq!(m["Day"], "");
        assert_eq!(m["Duration"], "2h ");
        assert_eq!(m["ReactionScene"], "R");
        assert_eq!(m["Tags"], "opening, fog");
        assert_eq!(m["Characters"], "Mara");
        assert_eq!(m["Viewpoint"], "Mara");
        assert_eq!(m["Locations"], "Harbour");
        assert_eq!(m["Items"], "Brass Key");
        assert_eq!(m["FieldTitle1"], "Tension");
        assert_eq!(m["Field1"], "4");
        assert_eq!(m["Notes"], "");
        assert_eq!(m["ProjectName"], "Test");
        assert_eq!(m["ProjectPath"], "/novels");

        let m = Mapper::new(&p).scene("3", 0, 15, 83);
        assert_eq!(m["SceneNumber"], "");
        assert_eq!(m["ScDate"], "Day 2");
        assert_eq!(m["ScTime"], "07:15");
        assert_eq!(m["ReactionScene"], "A");
        assert_eq!(m["Viewpoint"], "Tobias");
    }

    #[test]
    fn chapter_mapping() {
        let p = test_project();
        let mapper = Mapper::new(&p);
        let m = mapper.chapter("2", 3);
        assert_eq!(m["Title"], "Chapter 1");
        assert_eq!(m["ChNumberEnglish"], "Three");
        assert_eq!(m["ChNumberRoman"], "III");
        let m = mapper.chapter("3", 0);
        assert_eq!(m["Title"], "");
        assert_eq!(m["ChapterNumber"], "");
        assert!(mapper.chapter("99", 1).is_empty());

        let mapper = Mapper::new(&p).with_chapter_prefix(Some("Kapitel ".into()));
        assert_eq!(mapper.chapter("2", 1)["Title"], "Kapitel 1");
        assert_eq!(mapper.chapter("1", 0)["Title"], "Part One");
        assert_eq!(p.chapters["2"].title.as_deref(), Some("Chapter 1"));
    }

    #[test]
    fn world_mappings() {
        let p = test_project();
        let mapper = Mapper::new(&p).with_converter(|t| t.to_uppercase());
        let m = mapper.character("1");
        assert_eq!(m["FullName"], "Mara Quinn");
        assert_eq!(m["Status"], "Major");
        assert_eq!(m["Bio"], "GREW UP INLAND.");
        assert_eq!(mapper.character("2")["Status"], "Minor");
        let m = mapper.location("1");
        assert_eq!(m["AKA"], "The Docks");
        assert_eq!(m["Tags"], "coast, night");
        assert_eq!(m["Desc"], "FOG & GULLS.");
        assert_eq!(mapper.item("1")["Title"], "Brass Key");
        assert_eq!(mapper.project()["AuthorName"], "Jane Doe");
        let m = mapper.project_note("1");
        assert_eq!(m["ID"], "1");
        assert_eq!(m["Title"], "Research");
        assert_eq!(m["Desc"], "TIDE TABLES FOR OCTOBER 1901.");
        assert!(mapper.project_note("9").is_empty());
    }
}
