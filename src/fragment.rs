use serde::{Deserialize, Deserializer, Serialize};
use anyhow::Result;

/// The fragment set shipped with the binary. The field layout follows a
/// chronological "snake" path, so declaration order is display order.
const FRAGMENTS_JSON: &str = include_str!("../data/fragments.json");

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Event,
    Work,
    Poem,
    Muse,
    Location,
    Oracle,
}

impl Kind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Kind::Event => "Evento",
            Kind::Work => "Opera",
            Kind::Poem => "Poesia",
            Kind::Muse => "Musa",
            Kind::Location => "Luogo",
            Kind::Oracle => "Oracolo",
        }
    }
}

/// Critical analysis block shown behind the reveal toggle.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Analysis {
    pub title: String,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GalleryEntry {
    pub title: String,
    pub description: String,
    pub image: String,
}

/// One spatial, clickable unit of content on the exploratory field.
///
/// `x`/`y` are 0-100 percent coordinates; `scale` and `rotation` are kept
/// from the source data even though the terminal renderer only uses them
/// for emphasis, not geometry.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Fragment {
    pub id: String,
    pub label: String,
    pub kind: Kind,
    pub era: String,
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotation: f64,
    #[serde(default)]
    pub meta: Option<String>,
    #[serde(default, rename = "content", deserialize_with = "pages_from_content")]
    pub pages: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub gallery: Vec<GalleryEntry>,
}

/// Source data stores content as either a single string or a list of pages.
#[derive(Deserialize)]
#[serde(untagged)]
enum ContentRepr {
    One(String),
    Many(Vec<String>),
}

fn pages_from_content<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ContentRepr::deserialize(deserializer)? {
        ContentRepr::One(page) => vec![page],
        ContentRepr::Many(pages) => pages,
    })
}

/// Derived chronicle entry consumed by the archive layout.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub year: String,
    pub title: String,
    pub description: String,
}

pub struct FragmentAtlas {
    fragments: Vec<Fragment>,
}

impl FragmentAtlas {
    /// Load the embedded fragment set.
    pub fn load() -> Result<Self> {
        Self::from_json(FRAGMENTS_JSON)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let fragments: Vec<Fragment> = serde_json::from_str(json)?;
        Ok(Self { fragments })
    }

    pub fn all(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.id == id)
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Fragment> {
        self.fragments.get(index)
    }

    /// The chronicle shown in the archive layout: every event, work,
    /// location and muse fragment, in path order. The year is the era label
    /// up to the first dash; the description is the first content page.
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        self.fragments
            .iter()
            .filter(|f| {
                matches!(f.kind, Kind::Event | Kind::Work | Kind::Location | Kind::Muse)
            })
            .map(|f| TimelineEntry {
                year: f.era.split('-').next().unwrap_or("1900").trim().to_string(),
                title: f.label.clone(),
                description: f
                    .pages
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "Frammenti di memoria...".to_string()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_atlas_loads() {
        let atlas = FragmentAtlas::load().unwrap();
        assert!(!atlas.is_empty());
        // The oracle entry point is part of the field
        let oracle = atlas.get("oracle").unwrap();
        assert_eq!(oracle.kind, Kind::Oracle);
        assert_eq!(oracle.pages.len(), 1);
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let atlas = FragmentAtlas::load().unwrap();
        let first = atlas.get_by_index(0).unwrap();
        assert_eq!(first.id, "prodigio");
        let last = atlas.get_by_index(atlas.len() - 1).unwrap();
        assert_eq!(last.id, "oracle");
    }

    #[test]
    fn test_single_string_content_becomes_one_page() {
        let atlas = FragmentAtlas::from_json(
            r#"[{
                "id": "x", "label": "X", "kind": "location", "era": "1921",
                "x": 0, "y": 0, "scale": 1.0, "rotation": 0,
                "content": "una sola pagina"
            }]"#,
        )
        .unwrap();
        assert_eq!(atlas.get("x").unwrap().pages, vec!["una sola pagina"]);
    }

    #[test]
    fn test_timeline_skips_poems_and_oracle() {
        let atlas = FragmentAtlas::load().unwrap();
        let timeline = atlas.timeline();
        assert!(timeline.iter().all(|e| e.title != "L'Ombra"));
        assert!(timeline.iter().all(|e| e.title != "La Sera Fiesolana"));
        // Era "1863-1938" yields the opening year
        let genesis = timeline.iter().find(|e| e.title == "La Genesi").unwrap();
        assert_eq!(genesis.year, "1863");
        assert!(genesis.description.starts_with("1. Un Inizio"));
    }

    #[test]
    fn test_unknown_id_is_none() {
        let atlas = FragmentAtlas::load().unwrap();
        assert!(atlas.get("maia").is_none());
    }
}
