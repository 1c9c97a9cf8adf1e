use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::Path,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{DaggerwalkError, Result};

/// Identifier of a song in the host's song table. Negative ids are reserved
/// for the silence sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub i32);

impl TrackId {
    /// The "no song" track. Selecting it means a stretch of silence.
    pub const SILENCE: TrackId = TrackId(-1);

    pub fn is_silence(self) -> bool {
        self == Self::SILENCE
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for TrackId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Musical category of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    World,
    Dungeon,
    Battle,
    Misc,
    Off,
    Unknown,
}

impl Category {
    /// Categories that may appear in a filter.
    pub const SELECTABLE: [Category; 5] = [
        Category::World,
        Category::Dungeon,
        Category::Battle,
        Category::Misc,
        Category::Off,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::World => "World",
            Category::Dungeon => "Dungeon",
            Category::Battle => "Battle",
            Category::Misc => "Misc",
            Category::Off => "Off",
            Category::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = DaggerwalkError;

    /// Case-insensitive; `Unknown` is deliberately not parseable.
    fn from_str(s: &str) -> Result<Self> {
        Category::SELECTABLE
            .into_iter()
            .find(|category| category.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DaggerwalkError::InvalidCategory(s.trim().to_lowercase()))
    }
}

/// Static table mapping track ids to categories. Built once and never
/// mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    tracks: BTreeMap<TrackId, Category>,
}

impl Catalog {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (TrackId, Category)>,
    {
        Self {
            tracks: entries.into_iter().collect(),
        }
    }

    /// Loads a catalog from a JSON object of `"id": "Category"` pairs.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&raw)?;
        tracing::debug!(?path, tracks = catalog.len(), "loaded track catalog");
        Ok(catalog)
    }

    /// The song table shipped with the game. Ids that were never assigned a
    /// category map to [`Category::Unknown`].
    pub fn daggerfall() -> Self {
        let mut tracks: BTreeMap<TrackId, Category> = (0..=131)
            .map(|id| (TrackId(id), Category::Unknown))
            .collect();
        tracks.insert(TrackId::SILENCE, Category::Off);

        let groups: [(Category, &[i32]); 4] = [
            (Category::World, WORLD_TRACKS),
            (Category::Dungeon, DUNGEON_TRACKS),
            (Category::Battle, BATTLE_TRACKS),
            (Category::Misc, MISC_TRACKS),
        ];
        for (category, ids) in groups {
            for &id in ids {
                tracks.insert(TrackId(id), category);
            }
        }

        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, track: TrackId) -> bool {
        self.tracks.contains_key(&track)
    }

    pub fn category_of(&self, track: TrackId) -> Option<Category> {
        self.tracks.get(&track).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrackId, Category)> + '_ {
        self.tracks.iter().map(|(id, category)| (*id, *category))
    }

    /// Tracks eligible for random selection under `filter`, in id order.
    pub fn pool(&self, filter: &CategoryFilter) -> Vec<TrackId> {
        self.iter()
            .filter(|(_, category)| filter.admits(*category))
            .map(|(id, _)| id)
            .collect()
    }
}

/// Set of categories a shuffle draws from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryFilter {
    /// Every categorized track except the silence sentinel.
    #[default]
    All,
    Only(BTreeSet<Category>),
}

impl CategoryFilter {
    /// Parses filter names as typed on the console. Any `all` entry wins over
    /// the rest; an empty list also means `All`.
    pub fn parse<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .collect();

        if names.is_empty() || names.iter().any(|name| name == "all") {
            return Ok(Self::All);
        }

        let categories = names
            .iter()
            .map(|name| name.parse::<Category>())
            .collect::<Result<_>>()?;
        Ok(Self::Only(categories))
    }

    pub fn only(category: Category) -> Self {
        Self::Only([category].into_iter().collect())
    }

    pub fn admits(&self, category: Category) -> bool {
        match self {
            Self::All => !matches!(category, Category::Unknown | Category::Off),
            Self::Only(set) => category != Category::Unknown && set.contains(&category),
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(set) => {
                let names: Vec<&str> = set.iter().map(|category| category.name()).collect();
                f.write_str(&names.join(", "))
            }
        }
    }
}

const WORLD_TRACKS: &[i32] = &[
    1, 3, 8, 10, 14, 16, 27, 31, 33, 35, 37, 39, 41, 44, 74, 80, 81, 88, 91, 92, 93, 94, 95, 99,
    100, 103, 104, 110, 111, 112, 118, 119, 120, 121, 125, 127, 130,
];

const DUNGEON_TRACKS: &[i32] = &[
    5, 7, 12, 17, 19, 42, 47, 50, 52, 54, 56, 58, 60, 62, 64, 66, 67, 68, 69, 70, 71, 72, 76, 77,
    78, 79, 82, 83, 84, 85, 86, 87, 106, 107, 108, 109,
];

const BATTLE_TRACKS: &[i32] = &[25, 29, 46, 75, 105];

const MISC_TRACKS: &[i32] = &[49, 73, 89, 96, 97, 98, 101, 116, 131];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_category_names_case_insensitively() {
        assert_eq!("world".parse::<Category>().unwrap(), Category::World);
        assert_eq!("DUNGEON".parse::<Category>().unwrap(), Category::Dungeon);
        assert_eq!(" Off ".parse::<Category>().unwrap(), Category::Off);
        assert!(matches!(
            "unknown".parse::<Category>(),
            Err(DaggerwalkError::InvalidCategory(name)) if name == "unknown"
        ));
    }

    #[test]
    fn all_entry_overrides_other_filter_names() {
        let filter = CategoryFilter::parse(["world", "all", "bogus"]).unwrap();
        assert_eq!(filter, CategoryFilter::All);
        assert_eq!(CategoryFilter::parse(Vec::<String>::new()).unwrap(), CategoryFilter::All);
    }

    #[test]
    fn rejects_unknown_filter_names() {
        let err = CategoryFilter::parse(["world", "jazz"]).unwrap_err();
        assert!(format!("{err}").contains("jazz"));
    }

    #[test]
    fn builtin_catalog_pools_exclude_uncategorized_and_silence() {
        let catalog = Catalog::daggerfall();
        assert_eq!(catalog.category_of(TrackId(0)), Some(Category::Unknown));
        assert_eq!(catalog.category_of(TrackId::SILENCE), Some(Category::Off));

        let all = catalog.pool(&CategoryFilter::All);
        assert!(!all.contains(&TrackId(0)));
        assert!(!all.contains(&TrackId::SILENCE));
        assert_eq!(
            all.len(),
            WORLD_TRACKS.len() + DUNGEON_TRACKS.len() + BATTLE_TRACKS.len() + MISC_TRACKS.len()
        );

        let battle = catalog.pool(&CategoryFilter::only(Category::Battle));
        assert_eq!(battle, BATTLE_TRACKS.iter().map(|&id| TrackId(id)).collect::<Vec<_>>());

        let off = catalog.pool(&CategoryFilter::only(Category::Off));
        assert_eq!(off, vec![TrackId::SILENCE]);
    }

    #[test]
    fn loads_catalog_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"{"-1": "Off", "1": "World", "3": "Dungeon"}"#).unwrap();

        let catalog = Catalog::from_json_file(&path).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.category_of(TrackId(3)), Some(Category::Dungeon));
    }
}
