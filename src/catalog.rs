//! Static reference data: leagues and the appearance-role catalog.

use crate::constants::{self, APPEARANCE_TYPES, LEAGUES, LINEUP_SLOTS, UNKNOWN_POSITION_CODE};
use crate::error::{MigrationError, Result};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct League {
    pub league_id: String,
    pub name: String,
}

pub fn leagues() -> Vec<League> {
    LEAGUES
        .iter()
        .map(|(id, name)| League {
            league_id: id.to_string(),
            name: name.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppearanceType {
    pub appearance_type_id: String,
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppearanceCatalog {
    types: Vec<AppearanceType>,
}

impl AppearanceCatalog {
    pub fn builtin() -> Self {
        let types = APPEARANCE_TYPES
            .iter()
            .map(|(id, name, category)| AppearanceType {
                appearance_type_id: id.to_string(),
                name: name.to_string(),
                category: category.to_string(),
            })
            .collect();
        Self { types }
    }

    /// Reads `appearance_type_id,name,category` rows. The result must still
    /// cover every id the reshaping rules emit.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(path.as_ref())?;
        let types = rdr
            .deserialize::<AppearanceType>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let catalog = Self { types };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn types(&self) -> &[AppearanceType] {
        &self.types
    }

    pub fn contains(&self, id: &str) -> bool {
        self.types.iter().any(|t| t.appearance_type_id == id)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for t in &self.types {
            if !seen.insert(t.appearance_type_id.as_str()) {
                return Err(MigrationError::Catalog(format!(
                    "duplicate appearance type '{}'",
                    t.appearance_type_id
                )));
            }
        }
        if let Some(missing) = emitted_appearance_ids().into_iter().find(|id| !self.contains(id)) {
            return Err(MigrationError::Catalog(format!(
                "appearance type '{missing}' is emitted by the game log reshaping but not defined"
            )));
        }
        Ok(())
    }
}

/// Every appearance type id the person-appearance rules can produce.
pub fn emitted_appearance_ids() -> BTreeSet<String> {
    let mut ids: BTreeSet<String> = BTreeSet::new();
    for slot in 1..=LINEUP_SLOTS {
        ids.insert(format!("O{slot}"));
    }
    for pos in 1..=UNKNOWN_POSITION_CODE {
        ids.insert(format!("D{pos}"));
    }
    for (_, id) in constants::UMPIRE_POSITIONS {
        ids.insert(id.to_string());
    }
    for id in [
        constants::MANAGER,
        constants::WINNING_PITCHER,
        constants::LOSING_PITCHER,
        constants::SAVING_PITCHER,
        constants::WINNING_RBI_BATTER,
        constants::STARTING_PITCHER,
    ] {
        ids.insert(id.to_string());
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_catalog_covers_emitted_ids() {
        let catalog = AppearanceCatalog::builtin();
        catalog.validate().unwrap();
        assert_eq!(emitted_appearance_ids().len(), catalog.types().len());
        assert!(catalog.contains("D10"));
    }

    #[test]
    fn test_six_leagues() {
        let leagues = leagues();
        assert_eq!(leagues.len(), 6);
        assert!(leagues.iter().any(|l| l.league_id == "FL" && l.name == "Federal League"));
    }

    #[test]
    fn test_csv_catalog_must_cover_emitted_ids() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "appearance_type_id,name,category").unwrap();
        writeln!(file, "MM,Manager,manager").unwrap();
        let err = AppearanceCatalog::from_csv(file.path()).unwrap_err();
        assert!(matches!(err, MigrationError::Catalog(_)));
    }

    #[test]
    fn test_csv_catalog_round_trips_builtin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "appearance_type_id,name,category").unwrap();
        for (id, name, category) in APPEARANCE_TYPES {
            writeln!(file, "{id},{name},{category}").unwrap();
        }
        file.flush().unwrap();
        let catalog = AppearanceCatalog::from_csv(file.path()).unwrap();
        assert_eq!(catalog, AppearanceCatalog::builtin());
    }
}
