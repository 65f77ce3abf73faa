//! Table schema definitions for the normalized game log store.

use crate::constants::*;
use crate::error::{MigrationError, Result};
use crate::sql::quote_ident;
use crate::store::Store;
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Boolean,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub not_null: bool,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            not_null: false,
        }
    }

    pub const fn required(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            not_null: true,
        }
    }
}

/// `column` references the same-named key column of `table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub table: &'static str,
}

impl ForeignKey {
    pub const fn new(column: &'static str, table: &'static str) -> Self {
        Self { column, table }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueIndex {
    pub name: &'static str,
    /// Indexed expressions, written as SQL.
    pub expressions: &'static [&'static str],
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub primary_key: &'static [&'static str],
    /// Columns identifying a row by content. Same as the primary key except
    /// where the key is a surrogate.
    pub natural_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
    pub unique_indexes: &'static [UniqueIndex],
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn referenced_tables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.foreign_keys.iter().map(|fk| fk.table)
    }

    pub fn is_required(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column && c.not_null)
    }
}

// =============================================================================
// Independent tables (no FK dependencies)
// =============================================================================

pub static PERSON_TABLE: TableSchema = TableSchema {
    name: PERSON,
    columns: &[
        Column::required("person_id", ColumnType::Text),
        Column::new("first_name", ColumnType::Text),
        Column::new("last_name", ColumnType::Text),
    ],
    primary_key: &["person_id"],
    natural_key: &["person_id"],
    foreign_keys: &[],
    unique_indexes: &[],
};

pub static PARK_TABLE: TableSchema = TableSchema {
    name: PARK,
    columns: &[
        Column::required("park_id", ColumnType::Text),
        Column::new("name", ColumnType::Text),
        Column::new("nickname", ColumnType::Text),
        Column::new("city", ColumnType::Text),
        Column::new("state", ColumnType::Text),
        Column::new("notes", ColumnType::Text),
    ],
    primary_key: &["park_id"],
    natural_key: &["park_id"],
    foreign_keys: &[],
    unique_indexes: &[],
};

pub static LEAGUE_TABLE: TableSchema = TableSchema {
    name: LEAGUE,
    columns: &[
        Column::required("league_id", ColumnType::Text),
        Column::new("name", ColumnType::Text),
    ],
    primary_key: &["league_id"],
    natural_key: &["league_id"],
    foreign_keys: &[],
    unique_indexes: &[],
};

pub static APPEARANCE_TYPE_TABLE: TableSchema = TableSchema {
    name: APPEARANCE_TYPE,
    columns: &[
        Column::required("appearance_type_id", ColumnType::Text),
        Column::new("name", ColumnType::Text),
        Column::new("category", ColumnType::Text),
    ],
    primary_key: &["appearance_type_id"],
    natural_key: &["appearance_type_id"],
    foreign_keys: &[],
    unique_indexes: &[],
};

// =============================================================================
// Dependent tables
// =============================================================================

pub static TEAM_TABLE: TableSchema = TableSchema {
    name: TEAM,
    columns: &[
        Column::required("team_id", ColumnType::Text),
        Column::new("league_id", ColumnType::Text),
        Column::new("city", ColumnType::Text),
        Column::new("nickname", ColumnType::Text),
        Column::new("franch_id", ColumnType::Text),
    ],
    primary_key: &["team_id"],
    natural_key: &["team_id"],
    foreign_keys: &[ForeignKey::new("league_id", LEAGUE)],
    unique_indexes: &[],
};

pub static GAME_TABLE: TableSchema = TableSchema {
    name: GAME,
    columns: &[
        Column::required("game_id", ColumnType::Text),
        Column::new("date", ColumnType::Text),
        Column::new("number_of_game", ColumnType::Integer),
        Column::new("park_id", ColumnType::Text),
        Column::new("length_outs", ColumnType::Integer),
        Column::new("day", ColumnType::Boolean),
        Column::new("completion", ColumnType::Text),
        Column::new("forfeit", ColumnType::Text),
        Column::new("protest", ColumnType::Text),
        Column::new("attendance", ColumnType::Integer),
        Column::new("length_minutes", ColumnType::Integer),
        Column::new("additional_info", ColumnType::Text),
        Column::new("acquisition_info", ColumnType::Text),
    ],
    primary_key: &["game_id"],
    natural_key: &["game_id"],
    foreign_keys: &[ForeignKey::new("park_id", PARK)],
    unique_indexes: &[],
};

pub static TEAM_APPEARANCE_TABLE: TableSchema = TableSchema {
    name: TEAM_APPEARANCE,
    columns: &[
        Column::required("team_id", ColumnType::Text),
        Column::required("game_id", ColumnType::Text),
        Column::required("home", ColumnType::Boolean),
        Column::new("league_id", ColumnType::Text),
        Column::new("score", ColumnType::Integer),
        Column::new("line_score", ColumnType::Text),
        Column::new("at_bats", ColumnType::Integer),
        Column::new("hits", ColumnType::Integer),
        Column::new("doubles", ColumnType::Integer),
        Column::new("triples", ColumnType::Integer),
        Column::new("homeruns", ColumnType::Integer),
        Column::new("rbi", ColumnType::Integer),
        Column::new("sacrifice_hits", ColumnType::Integer),
        Column::new("sacrifice_flies", ColumnType::Integer),
        Column::new("hit_by_pitch", ColumnType::Integer),
        Column::new("walks", ColumnType::Integer),
        Column::new("intentional_walks", ColumnType::Integer),
        Column::new("strikeouts", ColumnType::Integer),
        Column::new("stolen_bases", ColumnType::Integer),
        Column::new("caught_stealing", ColumnType::Integer),
        Column::new("grounded_into_double", ColumnType::Integer),
        Column::new("first_catcher_interference", ColumnType::Integer),
        Column::new("left_on_base", ColumnType::Integer),
        Column::new("pitchers_used", ColumnType::Integer),
        Column::new("individual_earned_runs", ColumnType::Integer),
        Column::new("team_earned_runs", ColumnType::Integer),
        Column::new("wild_pitches", ColumnType::Integer),
        Column::new("balks", ColumnType::Integer),
        Column::new("putouts", ColumnType::Integer),
        Column::new("assists", ColumnType::Integer),
        Column::new("errors", ColumnType::Integer),
        Column::new("passed_balls", ColumnType::Integer),
        Column::new("double_plays", ColumnType::Integer),
        Column::new("triple_plays", ColumnType::Integer),
    ],
    primary_key: &["team_id", "game_id"],
    natural_key: &["team_id", "game_id"],
    foreign_keys: &[
        ForeignKey::new("team_id", TEAM),
        ForeignKey::new("game_id", GAME),
        ForeignKey::new("league_id", LEAGUE),
    ],
    unique_indexes: &[],
};

pub static PERSON_APPEARANCE_TABLE: TableSchema = TableSchema {
    name: PERSON_APPEARANCE,
    columns: &[
        Column::new("appearance_id", ColumnType::Integer),
        Column::required("person_id", ColumnType::Text),
        Column::new("team_id", ColumnType::Text),
        Column::required("game_id", ColumnType::Text),
        Column::required("appearance_type_id", ColumnType::Text),
    ],
    primary_key: &["appearance_id"],
    natural_key: &["person_id", "team_id", "game_id", "appearance_type_id"],
    foreign_keys: &[
        ForeignKey::new("person_id", PERSON),
        ForeignKey::new("team_id", TEAM),
        ForeignKey::new("game_id", GAME),
        ForeignKey::new("appearance_type_id", APPEARANCE_TYPE),
    ],
    // NULL team ids (umpires) would never collide in a plain UNIQUE
    // constraint, so the index folds them to ''.
    unique_indexes: &[UniqueIndex {
        name: "person_appearance_unique_tuple",
        expressions: &[
            "person_id",
            "IFNULL(team_id, '')",
            "game_id",
            "appearance_type_id",
        ],
    }],
};

/// All normalized tables, listed so every foreign key target precedes its
/// referrer.
pub static NORMALIZED_TABLES: [&TableSchema; 8] = [
    &PERSON_TABLE,
    &PARK_TABLE,
    &LEAGUE_TABLE,
    &APPEARANCE_TYPE_TABLE,
    &TEAM_TABLE,
    &GAME_TABLE,
    &TEAM_APPEARANCE_TABLE,
    &PERSON_APPEARANCE_TABLE,
];

pub fn table(name: &str) -> Option<&'static TableSchema> {
    NORMALIZED_TABLES.iter().copied().find(|t| t.name == name)
}

pub fn normalized_table_names() -> Vec<&'static str> {
    NORMALIZED_TABLES.iter().map(|t| t.name).collect()
}

/// Checks that each table only references tables that come before it.
pub fn dependency_order(tables: &[&'static TableSchema]) -> Result<Vec<&'static str>> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(tables.len());
    for t in tables {
        if let Some(missing) = t.referenced_tables().find(|r| !seen.contains(r)) {
            return Err(MigrationError::SchemaOrder {
                table: t.name.to_string(),
                references: missing.to_string(),
            });
        }
        seen.insert(t.name);
        order.push(t.name);
    }
    Ok(order)
}

pub fn create_table_sql(table: &TableSchema) -> String {
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut line = format!("    {} {}", quote_ident(c.name), c.ty.sql());
            if c.not_null {
                line.push_str(" NOT NULL");
            }
            line
        })
        .collect();

    let pk: Vec<String> = table.primary_key.iter().map(|c| quote_ident(c)).collect();
    lines.push(format!("    PRIMARY KEY ({})", pk.join(", ")));

    for fk in table.foreign_keys {
        lines.push(format!(
            "    FOREIGN KEY ({col}) REFERENCES {table}({col})",
            col = quote_ident(fk.column),
            table = quote_ident(fk.table)
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        quote_ident(table.name),
        lines.join(",\n")
    )
}

pub fn create_index_sql(table: &TableSchema, index: &UniqueIndex) -> String {
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(index.name),
        quote_ident(table.name),
        index.expressions.join(", ")
    )
}

/// Full DDL script for the normalized schema.
pub fn ddl() -> String {
    let mut statements = Vec::new();
    for table in NORMALIZED_TABLES.iter() {
        statements.push(create_table_sql(table));
        for index in table.unique_indexes {
            statements.push(create_index_sql(table, index));
        }
    }
    statements
        .into_iter()
        .map(|s| format!("{s};\n"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct SchemaBuilder;

impl SchemaBuilder {
    /// Creates every normalized table that does not exist yet. Existing
    /// tables and their rows are left alone.
    pub fn create_all(store: &Store) -> Result<Vec<&'static str>> {
        dependency_order(&NORMALIZED_TABLES)?;
        Self::create_tables(store, &NORMALIZED_TABLES)
    }

    /// Creates `tables` in the given order. A table whose foreign key
    /// target is not in the store yet is a configuration error.
    pub fn create_tables(store: &Store, tables: &[&'static TableSchema]) -> Result<Vec<&'static str>> {
        let mut order = Vec::with_capacity(tables.len());
        for table in tables {
            for referenced in table.referenced_tables() {
                if referenced != table.name && !store.table_exists(referenced)? {
                    return Err(MigrationError::SchemaOrder {
                        table: table.name.to_string(),
                        references: referenced.to_string(),
                    });
                }
            }
            debug!(table = table.name, "Creating table if absent");
            store.execute_batch_step(table.name, &create_table_sql(table))?;
            for index in table.unique_indexes {
                store.execute_batch_step(table.name, &create_index_sql(table, index))?;
            }
            order.push(table.name);
        }
        info!(tables = order.len(), "Normalized schema in place");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ForeignKeys, StoreConfig};
    use tempfile::tempdir;

    #[test]
    fn test_normalized_tables_are_in_dependency_order() {
        let order = dependency_order(&NORMALIZED_TABLES).unwrap();
        assert_eq!(order.len(), 8);
        assert_eq!(order.last(), Some(&PERSON_APPEARANCE));
    }

    #[test]
    fn test_out_of_order_tables_are_rejected() {
        let err = dependency_order(&[&TEAM_TABLE, &LEAGUE_TABLE]).unwrap_err();
        match err {
            MigrationError::SchemaOrder { table, references } => {
                assert_eq!(table, TEAM);
                assert_eq!(references, LEAGUE);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_create_table_sql_declares_keys() {
        let sql = create_table_sql(&TEAM_APPEARANCE_TABLE);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"team_appearance\" ("));
        assert!(sql.contains("PRIMARY KEY (\"team_id\", \"game_id\")"));
        assert!(sql.contains("FOREIGN KEY (\"league_id\") REFERENCES \"league\"(\"league_id\")"));
        assert!(sql.contains("\"home\" BOOLEAN NOT NULL"));
    }

    #[test]
    fn test_team_appearance_carries_every_team_stat() {
        let names = TEAM_APPEARANCE_TABLE.column_names();
        for stat in TEAM_STATS {
            assert!(names.contains(&stat), "missing stat column {stat}");
        }
    }

    #[test]
    fn test_create_all_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = Store::open(&StoreConfig::new(dir.path().join("s.db"), ForeignKeys::Enforced)).unwrap();

        SchemaBuilder::create_all(&store).unwrap();
        store
            .execute_step("seed", "INSERT INTO league VALUES ('NL', 'National League')")
            .unwrap();
        SchemaBuilder::create_all(&store).unwrap();

        assert_eq!(store.row_count(LEAGUE).unwrap(), 1);
        let mut expected = normalized_table_names();
        expected.sort();
        assert_eq!(store.table_names().unwrap(), expected);
    }

    #[test]
    fn test_missing_reference_target_is_fatal() {
        let dir = tempdir().unwrap();
        let store = Store::open(&StoreConfig::new(dir.path().join("s.db"), ForeignKeys::Enforced)).unwrap();

        let err = SchemaBuilder::create_tables(&store, &[&GAME_TABLE]).unwrap_err();
        assert!(matches!(err, MigrationError::SchemaOrder { .. }));
        assert!(!store.table_exists(GAME).unwrap());
    }
}
