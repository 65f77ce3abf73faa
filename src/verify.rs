//! Post-migration consistency checks.

use crate::constants::{
    APPEARANCE_TYPE, GAME, GAME_ID_COLUMN, GAME_LOG, LOSING_PITCHER, PERSON_APPEARANCE,
    SAVING_PITCHER, TEAM_APPEARANCE, WINNING_PITCHER, WINNING_RBI_BATTER,
};
use crate::error::Result;
use crate::populate::{derive_game_id, parse_game_date, raw_game_keys};
use crate::schema::NORMALIZED_TABLES;
use crate::sql::quote_ident;
use crate::store::Store;
use rusqlite::types::ValueRef;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Columns left out of the content fingerprint because their values are
/// assigned by the store rather than derived from the inputs.
const SURROGATE_COLUMNS: [&str; 1] = ["appearance_id"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    pub table_counts: BTreeMap<String, i64>,
    pub foreign_key_violations: usize,
    /// Games whose team appearance rows are not exactly one home and one
    /// visiting row.
    pub games_without_team_pair: i64,
    /// Games whose id differs from date + home team + game number.
    pub mismatched_game_ids: i64,
    /// Raw game log rows whose stored key differs from the derivation.
    /// `None` once the raw table is gone.
    pub raw_game_key_mismatches: Option<i64>,
    pub team_appearances_without_league: i64,
    pub games: i64,
    pub games_with_person_appearances: i64,
    pub duplicate_person_appearances: i64,
    /// Umpire rows with a team, or non-umpire rows without one.
    pub team_affiliation_mismatches: i64,
    pub tied_games_with_awards: i64,
    pub fingerprint: String,
}

impl VerificationReport {
    pub fn is_consistent(&self) -> bool {
        self.problems().is_empty()
    }

    /// One entry per failed check, with its count.
    pub fn problems(&self) -> Vec<String> {
        let checks = [
            ("foreign key violations", self.foreign_key_violations as i64),
            ("games without a home/visiting pair", self.games_without_team_pair),
            ("games with mismatched ids", self.mismatched_game_ids),
            ("raw rows with mismatched game keys", self.raw_game_key_mismatches.unwrap_or(0)),
            ("duplicate person appearances", self.duplicate_person_appearances),
            ("person appearances with wrong team affiliation", self.team_affiliation_mismatches),
        ];
        checks
            .iter()
            .filter(|(_, n)| *n != 0)
            .map(|(what, n)| format!("{n} {what}"))
            .collect()
    }

    /// Conditions that are legal but worth a look.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.games_with_person_appearances != self.games {
            warnings.push(format!(
                "{} of {} games have no person appearances",
                self.games - self.games_with_person_appearances,
                self.games
            ));
        }
        if self.tied_games_with_awards > 0 {
            warnings.push(format!(
                "{} tied games carry awards; they were attributed to the visiting team",
                self.tied_games_with_awards
            ));
        }
        if self.team_appearances_without_league > 0 {
            warnings.push(format!(
                "{} team appearances have no league",
                self.team_appearances_without_league
            ));
        }
        warnings
    }
}

fn count(store: &Store, sql: &str) -> Result<i64> {
    Ok(store.connection().query_row(sql, [], |row| row.get(0))?)
}

pub fn verify(store: &Store) -> Result<VerificationReport> {
    let mut report = VerificationReport::default();
    for table in NORMALIZED_TABLES.iter() {
        report
            .table_counts
            .insert(table.name.to_string(), store.row_count(table.name)?);
    }

    report.foreign_key_violations = store.foreign_key_violations()?.len();

    report.games_without_team_pair = count(
        store,
        "SELECT COUNT(*) FROM game g
         WHERE (SELECT COUNT(*) FROM team_appearance ta WHERE ta.game_id = g.game_id) <> 2
            OR NOT EXISTS (SELECT 1 FROM team_appearance ta WHERE ta.game_id = g.game_id AND ta.home = 1)
            OR NOT EXISTS (SELECT 1 FROM team_appearance ta WHERE ta.game_id = g.game_id AND ta.home = 0)",
    )?;

    report.mismatched_game_ids = mismatched_game_ids(store)?;

    report.raw_game_key_mismatches = if store.table_exists(GAME_LOG)?
        && store.column_names(GAME_LOG)?.iter().any(|c| c == GAME_ID_COLUMN)
    {
        let mismatches = raw_game_keys(store)?
            .iter()
            .filter(|key| key.expected_game_id().ok() != key.game_id)
            .count();
        Some(mismatches as i64)
    } else {
        None
    };

    report.team_appearances_without_league = count(
        store,
        "SELECT COUNT(*) FROM team_appearance WHERE league_id IS NULL",
    )?;

    report.games = count(store, "SELECT COUNT(DISTINCT game_id) FROM game")?;
    report.games_with_person_appearances =
        count(store, "SELECT COUNT(DISTINCT game_id) FROM person_appearance")?;

    report.duplicate_person_appearances = count(
        store,
        "SELECT COUNT(*) FROM (
             SELECT 1 FROM person_appearance
             GROUP BY person_id, IFNULL(team_id, ''), game_id, appearance_type_id
             HAVING COUNT(*) > 1
         )",
    )?;

    report.team_affiliation_mismatches = count(
        store,
        "SELECT COUNT(*) FROM person_appearance pa
         JOIN appearance_type at ON at.appearance_type_id = pa.appearance_type_id
         WHERE (at.category = 'umpire') <> (pa.team_id IS NULL)",
    )?;

    report.tied_games_with_awards = count(
        store,
        &format!(
            "SELECT COUNT(DISTINCT h.game_id) FROM team_appearance h
             JOIN team_appearance v ON v.game_id = h.game_id AND v.home = 0
             WHERE h.home = 1 AND h.score = v.score
               AND EXISTS (SELECT 1 FROM person_appearance pa
                           WHERE pa.game_id = h.game_id
                             AND pa.appearance_type_id IN ('{}', '{}', '{}', '{}'))",
            WINNING_PITCHER, LOSING_PITCHER, SAVING_PITCHER, WINNING_RBI_BATTER
        ),
    )?;

    report.fingerprint = fingerprint(store)?;

    for warning in report.warnings() {
        warn!(%warning, "Verification warning");
    }
    info!(
        consistent = report.is_consistent(),
        games = report.games,
        fingerprint = %report.fingerprint,
        "Verification finished"
    );
    Ok(report)
}

/// Games whose stored id differs from the id rebuilt from the stored date,
/// home team and game number.
fn mismatched_game_ids(store: &Store) -> Result<i64> {
    let mut stmt = store.connection().prepare(
        "SELECT g.game_id, g.date, g.number_of_game, ta.team_id FROM game g
         JOIN team_appearance ta ON ta.game_id = g.game_id AND ta.home = 1",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mismatches = rows
        .iter()
        .filter(|(game_id, date, number, team)| {
            let expected = date
                .as_deref()
                .and_then(parse_game_date)
                .zip(*number)
                .map(|(date, number)| derive_game_id(date, team, number));
            expected.as_deref() != Some(game_id.as_str())
        })
        .count();
    Ok(mismatches as i64)
}

/// SHA-256 over the content of every normalized table, rows ordered by
/// natural key. Equal fingerprints mean equal table contents.
pub fn fingerprint(store: &Store) -> Result<String> {
    let mut hasher = Sha256::new();
    for table in NORMALIZED_TABLES.iter() {
        let columns: Vec<String> = table
            .column_names()
            .into_iter()
            .filter(|c| !SURROGATE_COLUMNS.contains(c))
            .map(quote_ident)
            .collect();
        let order: Vec<String> = table.natural_key.iter().map(|c| quote_ident(c)).collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.join(", "),
            quote_ident(table.name),
            order.join(", ")
        );

        hasher.update(table.name.as_bytes());
        hasher.update(b"\n");
        let mut stmt = store.connection().prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for i in 0..columns.len() {
                hash_value(&mut hasher, row.get_ref(i)?);
            }
            hasher.update(b"\n");
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

fn hash_value(hasher: &mut Sha256, value: ValueRef<'_>) {
    match value {
        ValueRef::Null => hasher.update(b"N"),
        ValueRef::Integer(i) => {
            hasher.update(b"I");
            hasher.update(i.to_le_bytes());
        }
        ValueRef::Real(f) => {
            hasher.update(b"R");
            hasher.update(f.to_le_bytes());
        }
        ValueRef::Text(t) => {
            hasher.update(b"T");
            hasher.update((t.len() as u64).to_le_bytes());
            hasher.update(t);
        }
        ValueRef::Blob(b) => {
            hasher.update(b"B");
            hasher.update((b.len() as u64).to_le_bytes());
            hasher.update(b);
        }
    }
}

/// A game row looked up by its derived key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameRow {
    pub game_id: String,
    pub date: Option<String>,
    pub number_of_game: Option<i64>,
    pub park_id: Option<String>,
}

pub fn lookup_game(
    store: &Store,
    date: &str,
    home_team: &str,
    game_number: i64,
) -> Result<Option<GameRow>> {
    let game_id = derive_game_id(date, home_team, game_number);
    let sql = format!(
        "SELECT game_id, date, number_of_game, park_id FROM {} WHERE game_id = ?1",
        quote_ident(GAME)
    );
    let row = store
        .connection()
        .query_row(&sql, params![game_id], |row| {
            Ok(GameRow {
                game_id: row.get(0)?,
                date: row.get(1)?,
                number_of_game: row.get(2)?,
                park_id: row.get(3)?,
            })
        })
        .optional()?;
    Ok(row)
}

/// Appearance type ids recorded for one person in one game.
pub fn appearances_for(
    store: &Store,
    game_id: &str,
    person_id: &str,
) -> Result<Vec<(Option<String>, String)>> {
    let sql = format!(
        "SELECT pa.team_id, pa.appearance_type_id FROM {} pa
         JOIN {} at ON at.appearance_type_id = pa.appearance_type_id
         WHERE pa.game_id = ?1 AND pa.person_id = ?2
         ORDER BY pa.appearance_type_id, pa.team_id",
        quote_ident(PERSON_APPEARANCE),
        quote_ident(APPEARANCE_TYPE)
    );
    let mut stmt = store.connection().prepare(&sql)?;
    let rows = stmt
        .query_map(params![game_id, person_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Home flags recorded for a game, in ascending order.
pub fn home_flags(store: &Store, game_id: &str) -> Result<Vec<bool>> {
    let sql = format!(
        "SELECT home FROM {} WHERE game_id = ?1 ORDER BY home",
        quote_ident(TEAM_APPEARANCE)
    );
    let mut stmt = store.connection().prepare(&sql)?;
    let flags = stmt
        .query_map(params![game_id], |row| row.get::<_, bool>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::leagues;
    use crate::constants::GAME_LOG;
    use crate::loader::{import_raw_table, RawTable};
    use crate::populate::{derive_game_ids, insert_leagues};
    use crate::schema::SchemaBuilder;
    use crate::store::{ForeignKeys, StoreConfig};
    use tempfile::tempdir;

    #[test]
    fn test_fingerprint_tracks_content() {
        let dir = tempdir().unwrap();
        let store = Store::open(&StoreConfig::new(dir.path().join("v.db"), ForeignKeys::Enforced)).unwrap();
        SchemaBuilder::create_all(&store).unwrap();

        let empty = fingerprint(&store).unwrap();
        assert_eq!(empty.len(), 64);
        assert_eq!(fingerprint(&store).unwrap(), empty);

        insert_leagues(&store, &leagues()).unwrap();
        let filled = fingerprint(&store).unwrap();
        assert_ne!(filled, empty);
        insert_leagues(&store, &leagues()).unwrap();
        assert_eq!(fingerprint(&store).unwrap(), filled);
    }

    #[test]
    fn test_empty_store_is_consistent() {
        let dir = tempdir().unwrap();
        let store = Store::open(&StoreConfig::new(dir.path().join("v.db"), ForeignKeys::Enforced)).unwrap();
        SchemaBuilder::create_all(&store).unwrap();

        let report = verify(&store).unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.raw_game_key_mismatches, None);
        assert_eq!(report.table_counts.len(), 8);
        assert!(report.warnings().is_empty());
        assert_eq!(lookup_game(&store, "18710504", "FW1", 0).unwrap(), None);
    }

    #[test]
    fn test_problems_name_every_failed_check() {
        let report = VerificationReport {
            duplicate_person_appearances: 2,
            team_affiliation_mismatches: 1,
            raw_game_key_mismatches: Some(3),
            ..Default::default()
        };
        assert!(!report.is_consistent());
        assert_eq!(
            report.problems(),
            vec![
                "3 raw rows with mismatched game keys".to_string(),
                "2 duplicate person appearances".to_string(),
                "1 person appearances with wrong team affiliation".to_string(),
            ]
        );
        assert!(VerificationReport::default().problems().is_empty());
    }

    #[test]
    fn test_truncated_raw_key_is_a_mismatch() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(&StoreConfig::new(dir.path().join("v.db"), ForeignKeys::Enforced)).unwrap();
        SchemaBuilder::create_all(&store).unwrap();
        let log = RawTable::from_reader(
            GAME_LOG,
            "date,number_of_game,h_name\n18710504,0,FW1\n18710505,0,FW1\n".as_bytes(),
        )
        .unwrap();
        import_raw_table(&mut store, &log, 10).unwrap();
        derive_game_ids(&store).unwrap();
        assert_eq!(verify(&store).unwrap().raw_game_key_mismatches, Some(0));

        store
            .connection()
            .execute("UPDATE game_log SET game_id = '1871FW10' WHERE rowid = 1", [])
            .unwrap();
        let report = verify(&store).unwrap();
        assert_eq!(report.raw_game_key_mismatches, Some(1));
        assert!(!report.is_consistent());
    }

    #[test]
    fn test_stored_game_id_is_checked_against_date_team_and_number() {
        let dir = tempdir().unwrap();
        let store = Store::open(&StoreConfig::new(dir.path().join("v.db"), ForeignKeys::Disabled)).unwrap();
        SchemaBuilder::create_all(&store).unwrap();
        store
            .connection()
            .execute_batch(
                "INSERT INTO game (game_id, date, number_of_game) VALUES ('18710504FW10', '18710504', 0);
                 INSERT INTO game (game_id, date, number_of_game) VALUES ('1871FW10', '1871', 0);
                 INSERT INTO team_appearance (team_id, game_id, home) VALUES ('FW1', '18710504FW10', 1);
                 INSERT INTO team_appearance (team_id, game_id, home) VALUES ('FW1', '1871FW10', 1);",
            )
            .unwrap();

        assert_eq!(verify(&store).unwrap().mismatched_game_ids, 1);
    }
}
