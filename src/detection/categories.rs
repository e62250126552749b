use crate::detection::runtime::{ClassId, ClassNames};
use crate::models::RipenessStage;

/// Accepted spellings per stage, compared after normalization
/// (lowercased, whitespace/hyphens/underscores removed).
const SYNONYMS: [(RipenessStage, &[&str]); 4] = [
    (RipenessStage::NotMature, &["notmature", "unripe", "immature", "notripe"]),
    (RipenessStage::Mature, &["mature"]),
    (RipenessStage::Ripe, &["ripe", "fullyripe"]),
    (RipenessStage::OverRipe, &["overripe", "overmature"]),
];

/// Resolves model class identifiers to ripeness stages.
///
/// With a name table, ids are looked up and their names matched against the
/// synonym sets. Without one, ids 0..=3 map positionally to
/// NotMature, Mature, Ripe, OverRipe. Anything else is unmapped (`None`).
#[derive(Debug, Clone, Default)]
pub struct CategoryMapper {
    names: Option<ClassNames>,
}

impl CategoryMapper {
    pub fn new(names: Option<ClassNames>) -> Self {
        Self { names }
    }

    /// Mapper that only uses positional ids
    pub fn positional() -> Self {
        Self { names: None }
    }

    pub fn has_name_table(&self) -> bool {
        self.names.is_some()
    }

    /// Map a raw class id, preferring a name the runtime attached to the record
    pub fn map(&self, class_id: &ClassId, class_name: Option<&str>) -> Option<RipenessStage> {
        if let Some(name) = class_name.filter(|n| !n.trim().is_empty()) {
            return match_name(name);
        }

        match class_id {
            ClassId::Index(id) => self.map_index(*id),
            ClassId::Name(name) => match name.trim().parse::<u32>() {
                Ok(id) => self.map_index(id),
                Err(_) => match_name(name),
            },
        }
    }

    fn map_index(&self, id: u32) -> Option<RipenessStage> {
        match &self.names {
            Some(names) => names.get(&id).and_then(|name| match_name(name)),
            None => RipenessStage::from_index(id as usize),
        }
    }
}

/// Match a free-form class name against the synonym sets
pub fn match_name(name: &str) -> Option<RipenessStage> {
    let normalized = normalize(name);
    SYNONYMS
        .iter()
        .find(|(_, spellings)| spellings.contains(&normalized.as_str()))
        .map(|(stage, _)| *stage)
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}
