use crate::constants::{GAME_ID_COLUMN, GAME_LOG, RAW_TABLES};
use crate::error::{MigrationError, Result};
use crate::populate::{pending_rows, source_plans};
use crate::schema::normalized_table_names;
use crate::store::Store;
use metrics::counter;
use tracing::{info, warn};

/// Proof that every raw row has reached the normalized tables. Only
/// [`Cleanup::check_ready`] hands one out.
#[derive(Debug)]
pub struct PopulatedStore {
    _checked: (),
}

pub struct Cleanup;

impl Cleanup {
    /// Verifies the normalized tables are complete: they all exist, no raw
    /// row is still waiting to be inserted, and no foreign key dangles.
    pub fn check_ready(store: &Store) -> Result<PopulatedStore> {
        let problems = Self::readiness_problems(store)?;
        if problems.is_empty() {
            Ok(PopulatedStore { _checked: () })
        } else {
            for problem in &problems {
                warn!(%problem, "Store not ready for cleanup");
            }
            Err(MigrationError::CleanupRefused(problems.join("; ")))
        }
    }

    pub fn readiness_problems(store: &Store) -> Result<Vec<String>> {
        let mut problems = Vec::new();
        for table in normalized_table_names() {
            if !store.table_exists(table)? {
                problems.push(format!("normalized table '{table}' does not exist"));
            }
        }
        if !problems.is_empty() {
            return Ok(problems);
        }

        if store.table_exists(GAME_LOG)?
            && !store.column_names(GAME_LOG)?.iter().any(|c| c == GAME_ID_COLUMN)
        {
            problems.push("game keys have not been derived".to_string());
            return Ok(problems);
        }

        for plan in source_plans() {
            let mut sources_present = true;
            for source in plan.sources() {
                sources_present &= store.table_exists(source)?;
            }
            if !sources_present {
                continue;
            }
            let pending = pending_rows(store, &plan)?;
            if pending > 0 {
                problems.push(format!("{pending} rows pending for '{}'", plan.name));
            }
        }

        let violations = store.foreign_key_violations()?;
        if !violations.is_empty() {
            problems.push(format!("{} foreign key violations", violations.len()));
        }
        Ok(problems)
    }

    /// Drops whichever raw input tables are still present. The normalized
    /// tables and foreign keys are checked again right before dropping.
    pub fn drop_raw_tables(store: &Store, _proof: &PopulatedStore) -> Result<Vec<&'static str>> {
        for table in normalized_table_names() {
            if !store.table_exists(table)? {
                return Err(MigrationError::CleanupRefused(format!(
                    "normalized table '{table}' disappeared"
                )));
            }
        }
        let violations = store.foreign_key_violations()?;
        if !violations.is_empty() {
            return Err(MigrationError::CleanupRefused(format!(
                "{} foreign key violations",
                violations.len()
            )));
        }

        let mut dropped = Vec::new();
        for table in RAW_TABLES {
            if store.table_exists(table)? {
                store.drop_table(table)?;
                dropped.push(table);
            }
        }
        counter!("gamelog_raw_tables_dropped_total").increment(dropped.len() as u64);
        info!(dropped = ?dropped, "Dropped raw input tables");
        Ok(dropped)
    }
}
