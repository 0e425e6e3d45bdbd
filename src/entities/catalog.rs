//! Canonical entity catalog and its reverse alias index.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// A canonical name plus every known way of writing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEntity {
    name: String,
    aliases: Vec<String>,
}

impl CanonicalEntity {
    /// Aliases are lowercased; the canonical name is always one of them.
    pub fn new(name: &str, aliases: &[&str]) -> Self {
        let mut all: Vec<String> = Vec::with_capacity(aliases.len() + 1);
        for alias in std::iter::once(&name).chain(aliases.iter()) {
            let alias = alias.trim().to_lowercase();
            if !alias.is_empty() && !all.contains(&alias) {
                all.push(alias);
            }
        }
        Self {
            name: name.to_string(),
            aliases: all,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }
}

/// Reverse lookup alias → entity. Entities keep their declaration order,
/// which is the order fuzzy matching walks them in.
#[derive(Debug)]
pub struct AliasIndex {
    entities: Vec<CanonicalEntity>,
    lookup: HashMap<String, usize>,
}

impl AliasIndex {
    pub fn new(entities: Vec<CanonicalEntity>) -> Self {
        let mut lookup = HashMap::new();
        for (idx, entity) in entities.iter().enumerate() {
            for alias in entity.aliases() {
                if let Some(&existing) = lookup.get(alias) {
                    let owner: &CanonicalEntity = &entities[existing];
                    warn!(
                        "Alias '{}' of '{}' already belongs to '{}', keeping the first",
                        alias,
                        entity.name(),
                        owner.name()
                    );
                    continue;
                }
                lookup.insert(alias.clone(), idx);
            }
        }
        debug!(
            "Built alias index: {} entities, {} aliases",
            entities.len(),
            lookup.len()
        );
        Self { entities, lookup }
    }

    /// Exact lookup of an already normalized alias.
    pub fn get(&self, alias: &str) -> Option<&CanonicalEntity> {
        self.lookup.get(alias).map(|&idx| &self.entities[idx])
    }

    pub fn entities(&self) -> &[CanonicalEntity] {
        &self.entities
    }

    pub fn entity(&self, name: &str) -> Option<&CanonicalEntity> {
        self.entities.iter().find(|e| e.name() == name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

static AFL_TEAMS: OnceLock<Arc<AliasIndex>> = OnceLock::new();

/// The AFL team index, built on first use and shared afterwards.
pub fn afl_team_index() -> Arc<AliasIndex> {
    AFL_TEAMS
        .get_or_init(|| Arc::new(AliasIndex::new(afl_teams())))
        .clone()
}

/// All 18 AFL clubs with nicknames, abbreviations and historical names.
pub fn afl_teams() -> Vec<CanonicalEntity> {
    vec![
        CanonicalEntity::new(
            "Adelaide",
            &["adelaide", "crows", "adelaide crows", "the crows", "ade"],
        ),
        CanonicalEntity::new(
            "Brisbane Lions",
            &["brisbane", "brisbane lions", "lions", "the lions", "bri", "brisbane bears"],
        ),
        CanonicalEntity::new(
            "Carlton",
            &["carlton", "blues", "the blues", "car", "navy blues"],
        ),
        CanonicalEntity::new(
            "Collingwood",
            &["collingwood", "magpies", "the magpies", "pies", "col", "the pies"],
        ),
        CanonicalEntity::new(
            "Essendon",
            &["essendon", "bombers", "the bombers", "dons", "ess", "the dons"],
        ),
        CanonicalEntity::new(
            "Fremantle",
            &["fremantle", "dockers", "the dockers", "freo", "fre"],
        ),
        CanonicalEntity::new(
            "Geelong",
            &["geelong", "cats", "geelong cats", "the cats", "gee"],
        ),
        CanonicalEntity::new(
            "Gold Coast",
            &["gold coast", "suns", "gold coast suns", "the suns", "gcs"],
        ),
        CanonicalEntity::new(
            "Greater Western Sydney",
            &[
                "greater western sydney",
                "gws",
                "giants",
                "gws giants",
                "the giants",
                "western sydney",
            ],
        ),
        CanonicalEntity::new("Hawthorn", &["hawthorn", "hawks", "the hawks", "haw"]),
        CanonicalEntity::new(
            "Melbourne",
            &["melbourne", "demons", "the demons", "dees", "mel", "the dees"],
        ),
        CanonicalEntity::new(
            "North Melbourne",
            &[
                "north melbourne",
                "kangaroos",
                "roos",
                "the roos",
                "nm",
                "the kangaroos",
                "north",
                "shinboners",
            ],
        ),
        CanonicalEntity::new(
            "Port Adelaide",
            &["port adelaide", "power", "port adelaide power", "the power", "pa", "port"],
        ),
        CanonicalEntity::new(
            "Richmond",
            &["richmond", "tigers", "richmond tigers", "the tigers", "ric", "tiges"],
        ),
        CanonicalEntity::new(
            "St Kilda",
            &["st kilda", "saints", "the saints", "stk", "st. kilda"],
        ),
        CanonicalEntity::new(
            "Sydney",
            &["sydney", "swans", "sydney swans", "the swans", "syd", "south melbourne"],
        ),
        CanonicalEntity::new(
            "West Coast",
            &["west coast", "eagles", "west coast eagles", "the eagles", "wce", "weagles"],
        ),
        CanonicalEntity::new(
            "Western Bulldogs",
            &[
                "western bulldogs",
                "bulldogs",
                "dogs",
                "the dogs",
                "wb",
                "footscray",
                "the bulldogs",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name_is_an_alias() {
        let entity = CanonicalEntity::new("St Kilda", &["saints"]);
        assert_eq!(entity.aliases(), &["st kilda".to_string(), "saints".to_string()]);
    }

    #[test]
    fn test_duplicate_alias_keeps_first_owner() {
        let index = AliasIndex::new(vec![
            CanonicalEntity::new("Alpha", &["shared"]),
            CanonicalEntity::new("Beta", &["shared"]),
        ]);
        assert_eq!(index.get("shared").map(|e| e.name()), Some("Alpha"));
    }

    #[test]
    fn test_shared_index_is_built_once() {
        let a = afl_team_index();
        let b = afl_team_index();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 18);
        assert_eq!(a.get("cats").map(|e| e.name()), Some("Geelong"));
    }

    #[test]
    fn test_shared_index_under_concurrent_first_use() {
        use std::sync::Barrier;
        use std::thread;

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    afl_team_index()
                })
            })
            .collect();
        let indexes: Vec<Arc<AliasIndex>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for index in &indexes[1..] {
            assert!(Arc::ptr_eq(&indexes[0], index));
        }
        assert!(Arc::ptr_eq(&indexes[0], &afl_team_index()));
    }
}
