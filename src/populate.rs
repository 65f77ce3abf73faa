use crate::catalog::{AppearanceCatalog, League};
use crate::constants::{
    APPEARANCE_TYPE, GAME_ID_COLUMN, GAME_LOG, LEAGUE, PARK, PARK_CODES, PERSON, PERSON_CODES,
    TEAM, TEAM_CODES,
};
use crate::error::{MigrationError, Result};
use crate::reshape;
use crate::schema;
use crate::sql::{quote_ident, render_game_key_update, render_insert, render_pending_count};
use crate::store::Store;
use crate::transform::{Expr, InsertPlan, SelectDescriptor, Side};
use chrono::NaiveDate;
use metrics::counter;
use rusqlite::params;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Rust-side mirror of the derived game key: date, home team id and the
/// game's sequence number within the day, concatenated.
pub fn derive_game_id(date: &str, home_team: &str, game_number: i64) -> String {
    format!("{}{}{}", date.trim(), home_team.trim(), game_number)
}

/// Strips the `.0` a float-typed export appends to whole numbers.
fn whole_number_digits(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let digits = raw.strip_suffix(".0").unwrap_or(raw);
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(digits)
}

/// A `YYYYMMDD` calendar date, optionally written as `YYYYMMDD.0`.
pub fn parse_game_date(raw: &str) -> Option<&str> {
    let digits = whole_number_digits(raw)?;
    if digits.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()?;
    Some(digits)
}

pub fn parse_game_number(raw: &str) -> Option<i64> {
    whole_number_digits(raw)?.parse().ok()
}

/// Key columns of one raw game log row, as imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGameKey {
    pub rowid: i64,
    pub date: Option<String>,
    pub number_of_game: Option<String>,
    pub home_team: Option<String>,
    pub game_id: Option<String>,
}

impl RawGameKey {
    /// The key this row should carry, or why it cannot have one.
    pub fn expected_game_id(&self) -> std::result::Result<String, String> {
        let date = self.date.as_deref().ok_or("date is missing")?;
        let date = parse_game_date(date).ok_or_else(|| format!("date '{date}' is not YYYYMMDD"))?;
        let number = self.number_of_game.as_deref().ok_or("game number is missing")?;
        let number = parse_game_number(number)
            .ok_or_else(|| format!("game number '{number}' is not a whole number"))?;
        let home = self
            .home_team
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or("home team is missing")?;
        Ok(derive_game_id(date, home, number))
    }
}

pub fn raw_game_keys(store: &Store) -> Result<Vec<RawGameKey>> {
    let game_id = if store.column_names(GAME_LOG)?.iter().any(|c| c == GAME_ID_COLUMN) {
        quote_ident(GAME_ID_COLUMN)
    } else {
        "NULL".to_string()
    };
    let sql = format!(
        "SELECT rowid, {}, {}, {}, {} FROM {} ORDER BY rowid",
        quote_ident("date"),
        quote_ident("number_of_game"),
        quote_ident(&Side::Home.column("name")),
        game_id,
        quote_ident(GAME_LOG)
    );
    let mut stmt = store.connection().prepare(&sql)?;
    let keys = stmt
        .query_map([], |row| {
            Ok(RawGameKey {
                rowid: row.get(0)?,
                date: row.get(1)?,
                number_of_game: row.get(2)?,
                home_team: row.get(3)?,
                game_id: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(keys)
}

/// Fails on the first raw game log row whose date, game number or home
/// team cannot form a key.
pub fn validate_game_keys(store: &Store) -> Result<usize> {
    let keys = raw_game_keys(store)?;
    for key in &keys {
        key.expected_game_id()
            .map_err(|reason| MigrationError::InvalidGameKey { row: key.rowid, reason })?;
    }
    Ok(keys.len())
}

pub fn person_plan() -> InsertPlan {
    InsertPlan::new(PERSON, PERSON, vec!["person_id", "first_name", "last_name"]).select(
        SelectDescriptor::from_table(
            PERSON_CODES,
            vec![Expr::column("id"), Expr::column("first"), Expr::column("last")],
        )
        .when_present("id"),
    )
}

pub fn park_plan() -> InsertPlan {
    InsertPlan::new(
        PARK,
        PARK,
        vec!["park_id", "name", "nickname", "city", "state", "notes"],
    )
    .select(
        SelectDescriptor::from_table(
            PARK_CODES,
            vec![
                Expr::column("park_id"),
                Expr::column("name"),
                Expr::column("aka"),
                Expr::column("city"),
                Expr::column("state"),
                Expr::column("notes"),
            ],
        )
        .when_present("park_id"),
    )
}

pub fn team_plan() -> InsertPlan {
    InsertPlan::new(
        TEAM,
        TEAM,
        vec!["team_id", "league_id", "city", "nickname", "franch_id"],
    )
    .select(
        SelectDescriptor::from_table(
            TEAM_CODES,
            vec![
                Expr::column("team_id"),
                Expr::column("league"),
                Expr::column("city"),
                Expr::column("nickname"),
                Expr::column("franch_id"),
            ],
        )
        .when_present("team_id"),
    )
}

/// Every plan that reads a raw table, in the order they must run.
pub fn source_plans() -> Vec<InsertPlan> {
    let mut plans = vec![
        person_plan(),
        park_plan(),
        team_plan(),
        reshape::game_plan(),
        reshape::team_appearance_plan(),
    ];
    plans.extend(reshape::person_appearance_plans());
    plans
}

/// Raw columns the migration reads from `source`.
pub fn required_columns(source: &str) -> BTreeSet<String> {
    let mut cols: BTreeSet<String> = source_plans()
        .iter()
        .flat_map(|p| p.required_columns(source))
        .collect();
    if source == GAME_LOG {
        cols.extend(Expr::GameKey.columns());
    }
    cols
}

/// Source rows of `plan` not yet present in its target table.
pub fn pending_rows(store: &Store, plan: &InsertPlan) -> Result<i64> {
    let table = schema::table(plan.target).ok_or_else(|| {
        MigrationError::Config(format!("plan '{}' targets unknown table '{}'", plan.name, plan.target))
    })?;
    let required: Vec<&str> = table
        .natural_key
        .iter()
        .copied()
        .filter(|c| table.is_required(c))
        .collect();
    let sql = render_pending_count(plan, table.natural_key, &required);
    Ok(store.connection().query_row(&sql, [], |row| row.get(0))?)
}

/// Executes one plan as a single statement. Returns the rows inserted;
/// rows whose key already exists are skipped, not counted.
pub fn run_plan(store: &Store, plan: &InsertPlan) -> Result<usize> {
    if !plan.is_well_formed() {
        return Err(MigrationError::Config(format!(
            "insert plan '{}' does not match its target columns",
            plan.name
        )));
    }
    let inserted = store.execute_step(&plan.name, &render_insert(plan))?;
    counter!("gamelog_rows_inserted_total", "table" => plan.target).increment(inserted as u64);
    debug!(plan = %plan.name, inserted, "Ran insert plan");
    Ok(inserted)
}

pub fn insert_leagues(store: &Store, leagues: &[League]) -> Result<usize> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} (league_id, name) VALUES (?1, ?2)",
        quote_ident(LEAGUE)
    );
    let mut stmt = store.connection().prepare(&sql)?;
    let mut inserted = 0;
    for league in leagues {
        inserted += stmt
            .execute(params![league.league_id, league.name])
            .map_err(|e| MigrationError::from_sqlite(LEAGUE, e))?;
    }
    info!(inserted, "Populated leagues");
    Ok(inserted)
}

pub fn insert_appearance_types(store: &Store, catalog: &AppearanceCatalog) -> Result<usize> {
    catalog.validate()?;
    let sql = format!(
        "INSERT OR IGNORE INTO {} (appearance_type_id, name, category) VALUES (?1, ?2, ?3)",
        quote_ident(APPEARANCE_TYPE)
    );
    let mut stmt = store.connection().prepare(&sql)?;
    let mut inserted = 0;
    for t in catalog.types() {
        inserted += stmt
            .execute(params![t.appearance_type_id, t.name, t.category])
            .map_err(|e| MigrationError::from_sqlite(APPEARANCE_TYPE, e))?;
    }
    info!(inserted, "Populated appearance types");
    Ok(inserted)
}

/// Adds `game_id` to the raw game log (if absent) and fills it for rows
/// that do not have one yet. Every row is validated first; nothing is
/// keyed if any row is malformed. Returns the number of rows keyed.
pub fn derive_game_ids(store: &Store) -> Result<usize> {
    let checked = validate_game_keys(store)?;
    debug!(rows = checked, "Validated game keys");
    let added = store.add_column_if_missing(GAME_LOG, GAME_ID_COLUMN, "TEXT")?;
    let keyed = store.execute_step("derive_game_ids", &render_game_key_update(GAME_LOG))?;
    info!(column_added = added, keyed, "Derived game keys");
    Ok(keyed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{leagues, AppearanceCatalog};
    use crate::loader::{import_raw_table, RawTable};
    use crate::schema::SchemaBuilder;
    use crate::store::{ForeignKeys, StoreConfig};
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(&StoreConfig::new(dir.path().join("p.db"), ForeignKeys::Enforced)).unwrap();
        (dir, store)
    }

    #[test]
    fn test_derive_game_id() {
        assert_eq!(derive_game_id("18710504", "FW1", 0), "18710504FW10");
        assert_eq!(derive_game_id("20161002", "SFN", 2), "20161002SFN2");
    }

    #[test]
    fn test_required_columns_per_source() {
        let people: Vec<String> = required_columns(PERSON_CODES).into_iter().collect();
        assert_eq!(people, vec!["first", "id", "last"]);

        let log = required_columns(GAME_LOG);
        for col in ["date", "number_of_game", "1b_umpire_id", "h_player_9_def_pos", "forefeit"] {
            assert!(log.contains(col), "game log should require {col}");
        }
        assert!(!log.contains(GAME_ID_COLUMN));
    }

    #[test]
    fn test_static_reference_rows_are_idempotent() {
        let (_dir, store) = store();
        SchemaBuilder::create_all(&store).unwrap();

        assert_eq!(insert_leagues(&store, &leagues()).unwrap(), 6);
        assert_eq!(insert_leagues(&store, &leagues()).unwrap(), 0);

        let catalog = AppearanceCatalog::builtin();
        assert_eq!(insert_appearance_types(&store, &catalog).unwrap(), catalog.types().len());
        assert_eq!(insert_appearance_types(&store, &catalog).unwrap(), 0);
    }

    #[test]
    fn test_park_nickname_comes_from_aka() {
        let (_dir, mut store) = store();
        SchemaBuilder::create_all(&store).unwrap();
        let parks = RawTable::from_reader(
            PARK_CODES,
            "park_id,name,aka,city,state,start,end,league,notes\n\
             CHI11,Wrigley Field,Cubs Park,Chicago,IL,04/20/1916,,NL,\n"
                .as_bytes(),
        )
        .unwrap();
        import_raw_table(&mut store, &parks, 10).unwrap();

        assert_eq!(run_plan(&store, &park_plan()).unwrap(), 1);
        assert_eq!(run_plan(&store, &park_plan()).unwrap(), 0);
        let nickname: String = store
            .connection()
            .query_row("SELECT nickname FROM park WHERE park_id = 'CHI11'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(nickname, "Cubs Park");
    }

    #[test]
    fn test_unknown_league_on_team_is_fatal() {
        let (_dir, mut store) = store();
        SchemaBuilder::create_all(&store).unwrap();
        insert_leagues(&store, &leagues()).unwrap();
        let teams = RawTable::from_reader(
            TEAM_CODES,
            "team_id,league,start,end,city,nickname,franch_id,seq\n\
             XX1,ZZ,1900,1901,Nowhere,Ghosts,XX1,1\n"
                .as_bytes(),
        )
        .unwrap();
        import_raw_table(&mut store, &teams, 10).unwrap();

        let err = run_plan(&store, &team_plan()).unwrap_err();
        assert!(err.is_foreign_key_violation());
        assert_eq!(store.row_count(TEAM).unwrap(), 0);
    }

    #[test]
    fn test_game_ids_are_derived_once() {
        let (_dir, mut store) = store();
        let log = RawTable::from_reader(
            GAME_LOG,
            "date,number_of_game,h_name\n18710504,0,FW1\n18710505,0.0,WS3\n".as_bytes(),
        )
        .unwrap();
        import_raw_table(&mut store, &log, 10).unwrap();

        assert_eq!(derive_game_ids(&store).unwrap(), 2);
        assert_eq!(derive_game_ids(&store).unwrap(), 0);

        let ids: Vec<String> = store
            .connection()
            .prepare("SELECT game_id FROM game_log ORDER BY date")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(ids, vec!["18710504FW10", "18710505WS30"]);
    }

    #[test]
    fn test_game_date_and_number_parsing() {
        assert_eq!(parse_game_date("18710504"), Some("18710504"));
        assert_eq!(parse_game_date("18710504.0"), Some("18710504"));
        assert_eq!(parse_game_date("1871-05-04"), None);
        assert_eq!(parse_game_date("18711304"), None);
        assert_eq!(parse_game_date("1871050"), None);
        assert_eq!(parse_game_date("18710504.5"), None);

        assert_eq!(parse_game_number("0"), Some(0));
        assert_eq!(parse_game_number("2.0"), Some(2));
        assert_eq!(parse_game_number("A"), None);
        assert_eq!(parse_game_number(""), None);
    }

    #[test]
    fn test_malformed_date_stops_key_derivation() {
        let (_dir, mut store) = store();
        let log = RawTable::from_reader(
            GAME_LOG,
            "date,number_of_game,h_name\n18710504,0,FW1\n1871-05-05,0,FW1\n".as_bytes(),
        )
        .unwrap();
        import_raw_table(&mut store, &log, 10).unwrap();

        match derive_game_ids(&store).unwrap_err() {
            MigrationError::InvalidGameKey { row, reason } => {
                assert_eq!(row, 2);
                assert!(reason.contains("1871-05-05"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!store.column_names(GAME_LOG).unwrap().iter().any(|c| c == GAME_ID_COLUMN));
    }

    #[test]
    fn test_raw_game_keys_report_expected_ids() {
        let (_dir, mut store) = store();
        let log = RawTable::from_reader(
            GAME_LOG,
            "date,number_of_game,h_name\n18710504.0,0.0,FW1\n18710505,1,\n".as_bytes(),
        )
        .unwrap();
        import_raw_table(&mut store, &log, 10).unwrap();

        let keys = raw_game_keys(&store).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].game_id, None);
        assert_eq!(keys[0].expected_game_id(), Ok("18710504FW10".to_string()));
        assert_eq!(keys[1].expected_game_id(), Err("home team is missing".to_string()));
    }
}
