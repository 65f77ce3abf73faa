use crate::catalog::{leagues, AppearanceCatalog};
use crate::cleanup::Cleanup;
use crate::config::Config;
use crate::error::{MigrationError, Result};
use crate::loader::{import_raw_table, read_appearance_types, RawSource, RawTable};
use crate::populate::{
    derive_game_ids, insert_appearance_types, insert_leagues, required_columns, run_plan,
    source_plans,
};
use crate::schema::SchemaBuilder;
use crate::store::Store;
use crate::verify::{verify, VerificationReport};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::fs;
use std::time::Instant;
use tracing::{error, info, info_span, instrument, warn};

/// Rows touched and time spent by one migration step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    pub rows: usize,
    pub duration_ms: u128,
}

/// Result of a migration run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub database: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepReport>,
    pub dropped_tables: Vec<String>,
    pub verification: Option<VerificationReport>,
    pub errors: Vec<String>,
}

impl MigrationReport {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
            dropped_tables: Vec::new(),
            verification: None,
            errors: Vec::new(),
        }
    }

    pub fn rows_for(&self, step: &str) -> Option<usize> {
        self.steps.iter().find(|s| s.step == step).map(|s| s.rows)
    }

    pub fn total_rows(&self) -> usize {
        self.steps.iter().map(|s| s.rows).sum()
    }

    /// Runs `f` as the step `name`, recording its row count and duration.
    fn record<F>(&mut self, name: &str, f: F) -> Result<usize>
    where
        F: FnOnce() -> Result<usize>,
    {
        let started = Instant::now();
        let rows = f()?;
        let elapsed = started.elapsed();
        histogram!("gamelog_step_duration_seconds", "step" => name.to_string())
            .record(elapsed.as_secs_f64());
        self.steps.push(StepReport {
            step: name.to_string(),
            rows,
            duration_ms: elapsed.as_millis(),
        });
        Ok(rows)
    }
}

pub struct Migrator {
    config: Config,
    catalog: AppearanceCatalog,
}

impl Migrator {
    pub fn new(config: Config) -> Result<Self> {
        let catalog = match config.inputs.appearance_types_path() {
            Some(path) => {
                info!(path = %path.display(), "Using appearance catalog override");
                read_appearance_types(path)?
            }
            None => AppearanceCatalog::builtin(),
        };
        Ok(Self { config, catalog })
    }

    pub fn open_store(&self) -> Result<Store> {
        if !self.config.store.foreign_keys.is_enforced() {
            warn!("Foreign keys are disabled for this store; integrity is only checked by verify");
        }
        Store::open(&self.config.store)
    }

    pub fn new_report(&self) -> MigrationReport {
        MigrationReport::new(self.config.store.path.display().to_string())
    }

    /// Reads every input file, checks its headers against the columns the
    /// migration reads, then replaces the raw tables. Nothing is written
    /// unless all four inputs validate.
    #[instrument(skip(self, store, report))]
    pub fn import(&self, store: &mut Store, report: &mut MigrationReport) -> Result<()> {
        let mut tables = Vec::with_capacity(RawSource::ALL.len());
        for source in RawSource::ALL {
            let path = source.path(&self.config.inputs);
            info!(table = source.table_name(), path = %path.display(), "Reading input");
            let table = RawTable::read_csv(source.table_name(), &path)?;
            table.require_columns(&required_columns(source.table_name()))?;
            tables.push(table);
        }

        let batch_size = self.config.migration.batch_size;
        for table in &tables {
            let step = format!("import.{}", table.name);
            let rows = report.record(&step, || import_raw_table(store, table, batch_size))?;
            counter!("gamelog_raw_rows_imported_total", "table" => table.name.clone())
                .increment(rows as u64);
        }
        Ok(())
    }

    /// Derives game keys, creates the normalized schema and fills it from
    /// the raw tables. Safe to run again: existing rows are skipped.
    #[instrument(skip(self, store, report))]
    pub fn normalize(&self, store: &Store, report: &mut MigrationReport) -> Result<()> {
        for source in RawSource::ALL {
            if !store.table_exists(source.table_name())? {
                return Err(MigrationError::NotImported(source.table_name().to_string()));
            }
        }

        report.record("derive_game_ids", || derive_game_ids(store))?;
        report.record("schema", || Ok(SchemaBuilder::create_all(store)?.len()))?;
        report.record("league", || insert_leagues(store, &leagues()))?;
        report.record("appearance_type", || insert_appearance_types(store, &self.catalog))?;

        for plan in source_plans() {
            let span = info_span!("plan", name = %plan.name);
            let _enter = span.enter();
            let rows = report.record(&plan.name, || run_plan(store, &plan))?;
            info!(rows, "Populated");
        }
        Ok(())
    }

    /// Checks the store is fully populated, then drops the raw tables.
    #[instrument(skip(self, store, report))]
    pub fn cleanup(&self, store: &Store, report: &mut MigrationReport) -> Result<()> {
        let proof = Cleanup::check_ready(store)?;
        let mut dropped = Vec::new();
        report.record("cleanup", || {
            dropped = Cleanup::drop_raw_tables(store, &proof)?;
            Ok(dropped.len())
        })?;
        report
            .dropped_tables
            .extend(dropped.into_iter().map(str::to_string));
        Ok(())
    }

    #[instrument(skip(self, store, report))]
    pub fn verify(&self, store: &Store, report: &mut MigrationReport) -> Result<VerificationReport> {
        let verification = verify(store)?;
        report.verification = Some(verification.clone());
        Ok(verification)
    }

    /// Import, normalize, verify and (when configured) drop the raw tables.
    /// The report is persisted whether or not the run succeeds.
    pub fn run(&self) -> Result<MigrationReport> {
        info!(database = %self.config.store.path.display(), "Starting migration");
        counter!("gamelog_migration_runs_total").increment(1);
        let started = Instant::now();

        let mut report = self.new_report();
        let outcome = self.run_steps(&mut report);
        report.finished_at = Some(Utc::now());
        histogram!("gamelog_migration_duration_seconds").record(started.elapsed().as_secs_f64());

        if let Err(e) = &outcome {
            error!(error = %e, "Migration failed");
            counter!("gamelog_migration_failures_total").increment(1);
            report.errors.push(e.to_string());
        }
        self.persist_report(&report)?;
        outcome?;

        info!(
            steps = report.steps.len(),
            rows = report.total_rows(),
            "Migration finished"
        );
        Ok(report)
    }

    fn run_steps(&self, report: &mut MigrationReport) -> Result<()> {
        let mut store = self.open_store()?;
        self.import(&mut store, report)?;
        self.normalize(&store, report)?;

        let verification = self.verify(&store, report)?;
        if !verification.is_consistent() {
            return Err(MigrationError::Inconsistent(verification.problems().join(", ")));
        }

        if self.config.migration.drop_raw_tables {
            self.cleanup(&store, report)?;
        } else {
            info!("Keeping raw tables");
        }
        Ok(())
    }

    /// Writes the report as pretty JSON if a report path is configured.
    pub fn persist_report(&self, report: &MigrationReport) -> Result<()> {
        let Some(path) = &self.config.migration.report_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(report)?)?;
        info!(path = %path.display(), "Saved migration report");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_records_steps_in_order() {
        let mut report = MigrationReport::new("test.db");
        report.record("first", || Ok(3)).unwrap();
        report.record("second", || Ok(4)).unwrap();

        assert_eq!(report.rows_for("second"), Some(4));
        assert_eq!(report.rows_for("missing"), None);
        assert_eq!(report.total_rows(), 7);
        let names: Vec<&str> = report.steps.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_failed_step_is_not_recorded() {
        let mut report = MigrationReport::new("test.db");
        let err = report
            .record("broken", || Err(MigrationError::Catalog("nope".into())))
            .unwrap_err();
        assert!(matches!(err, MigrationError::Catalog(_)));
        assert!(report.steps.is_empty());
    }
}
