use crate::catalog::AppearanceCatalog;
use crate::config::InputConfig;
use crate::constants::{GAME_LOG, PARK_CODES, PERSON_CODES, TEAM_CODES};
use crate::error::{MigrationError, Result};
use crate::sql::quote_ident;
use crate::store::Store;
use csv::{ReaderBuilder, Trim};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// The four flat inputs and the raw table each one is imported into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawSource {
    GameLog,
    ParkCodes,
    PersonCodes,
    TeamCodes,
}

impl RawSource {
    pub const ALL: [RawSource; 4] = [
        RawSource::GameLog,
        RawSource::ParkCodes,
        RawSource::PersonCodes,
        RawSource::TeamCodes,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            RawSource::GameLog => GAME_LOG,
            RawSource::ParkCodes => PARK_CODES,
            RawSource::PersonCodes => PERSON_CODES,
            RawSource::TeamCodes => TEAM_CODES,
        }
    }

    pub fn path(self, inputs: &InputConfig) -> PathBuf {
        match self {
            RawSource::GameLog => inputs.game_log_path(),
            RawSource::ParkCodes => inputs.park_codes_path(),
            RawSource::PersonCodes => inputs.person_codes_path(),
            RawSource::TeamCodes => inputs.team_codes_path(),
        }
    }
}

/// A CSV file held in memory. Empty fields are stored as `None`.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn read_csv<P: AsRef<Path>>(name: &str, path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            MigrationError::Config(format!("Failed to open input '{}': {}", path.display(), e))
        })?;
        Self::from_reader(name, file)
    }

    pub fn from_reader<R: Read>(name: &str, reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let row = record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        None
                    } else {
                        Some(field.to_string())
                    }
                })
                .collect();
            rows.push(row);
        }

        debug!(table = name, columns = headers.len(), rows = rows.len(), "Read raw table");
        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    /// Fails on the first required column missing from the header row.
    pub fn require_columns(&self, required: &BTreeSet<String>) -> Result<()> {
        let present: BTreeSet<&str> = self.headers.iter().map(String::as_str).collect();
        match required.iter().find(|c| !present.contains(c.as_str())) {
            Some(missing) => Err(MigrationError::MissingColumn {
                table: self.name.clone(),
                column: missing.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Reads an appearance catalog override with the header
/// `appearance_type_id,name,category`.
pub fn read_appearance_types<P: AsRef<Path>>(path: P) -> Result<AppearanceCatalog> {
    AppearanceCatalog::from_csv(path)
}

/// Replaces the raw table `table.name` with the given rows, all columns
/// typed TEXT. The drop, create and every batch of `batch_size` rows share
/// one transaction, so a failed import leaves the previous copy in place.
#[instrument(skip(store, table), fields(table = %table.name))]
pub fn import_raw_table(store: &mut Store, table: &RawTable, batch_size: usize) -> Result<usize> {
    let quoted = quote_ident(&table.name);
    let columns: Vec<String> = table
        .headers
        .iter()
        .map(|h| format!("{} TEXT", quote_ident(h)))
        .collect();
    let placeholders: Vec<String> = (1..=table.headers.len()).map(|i| format!("?{i}")).collect();
    let insert_sql = format!(
        "INSERT INTO {} VALUES ({})",
        quoted,
        placeholders.join(", ")
    );

    let tx = store.connection_mut().transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {quoted};\nCREATE TABLE {quoted} ({});",
        columns.join(", ")
    ))?;

    let mut inserted = 0;
    {
        let mut stmt = tx.prepare_cached(&insert_sql)?;
        for chunk in table.rows.chunks(batch_size.max(1)) {
            for row in chunk {
                stmt.execute(rusqlite::params_from_iter(row.iter()))?;
            }
            inserted += chunk.len();
            debug!(rows = inserted, "Imported batch");
        }
    }
    tx.commit()?;

    info!(rows = inserted, "Imported raw table");
    Ok(inserted)
}
