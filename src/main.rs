use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gamelog_db::config::Config;
use gamelog_db::logging;
use gamelog_db::migration::{MigrationReport, Migrator};
use gamelog_db::schema;
use gamelog_db::verify::VerificationReport;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "gamelog_db")]
#[command(about = "Normalizes game log files into a relational SQLite store")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the config file (defaults to $GAMELOG_CONFIG, then config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import, normalize, verify and drop the raw tables
    Migrate {
        /// Keep the raw tables after a successful migration
        #[arg(long)]
        keep_raw: bool,
    },
    /// Load the input files into raw tables
    Import,
    /// Populate the normalized tables from the raw tables
    Normalize,
    /// Drop the raw tables once the normalized tables are complete
    Cleanup,
    /// Check integrity and print row counts and the content fingerprint
    Verify,
    /// Print the DDL of the normalized schema
    Schema,
}

fn print_steps(report: &MigrationReport) {
    for step in &report.steps {
        println!("   {:<32} {:>10} rows {:>8} ms", step.step, step.rows, step.duration_ms);
    }
}

fn print_verification(verification: &VerificationReport) {
    println!("\n📊 Table counts:");
    for (table, count) in &verification.table_counts {
        println!("   {:<20} {:>10}", table, count);
    }
    println!("   Foreign key violations: {}", verification.foreign_key_violations);
    println!("   Games without a team pair: {}", verification.games_without_team_pair);
    println!("   Mismatched game ids: {}", verification.mismatched_game_ids);
    println!("   Fingerprint: {}", verification.fingerprint);
    for warning in verification.warnings() {
        println!("⚠️  {warning}");
    }
}

fn load_migrator(config_path: Option<&Path>) -> anyhow::Result<Migrator> {
    let config = Config::load(config_path).context("loading configuration")?;
    Migrator::new(config).context("preparing migration")
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Migrate { keep_raw } => {
            let mut config = Config::load(config_path).context("loading configuration")?;
            if keep_raw {
                config.migration.drop_raw_tables = false;
            }
            let migrator = Migrator::new(config).context("preparing migration")?;
            println!("🚀 Running full migration...");
            match migrator.run() {
                Ok(report) => {
                    print_steps(&report);
                    if let Some(verification) = &report.verification {
                        print_verification(verification);
                    }
                    if !report.dropped_tables.is_empty() {
                        println!("🧹 Dropped raw tables: {}", report.dropped_tables.join(", "));
                    }
                    println!("✅ Migration completed successfully");
                }
                Err(e) => {
                    error!(error = %e, "Migration failed");
                    println!("❌ Migration failed: {e}");
                    return Err(e.into());
                }
            }
        }
        Commands::Import => {
            let migrator = load_migrator(config_path)?;
            let mut store = migrator.open_store()?;
            let mut report = migrator.new_report();
            migrator.import(&mut store, &mut report).context("importing inputs")?;
            print_steps(&report);
            println!("✅ Imported raw tables");
        }
        Commands::Normalize => {
            let migrator = load_migrator(config_path)?;
            let store = migrator.open_store()?;
            let mut report = migrator.new_report();
            migrator.normalize(&store, &mut report).context("normalizing")?;
            print_steps(&report);
            println!("✅ Normalized tables populated");
        }
        Commands::Cleanup => {
            let migrator = load_migrator(config_path)?;
            let store = migrator.open_store()?;
            let mut report = migrator.new_report();
            migrator.cleanup(&store, &mut report).context("dropping raw tables")?;
            println!("🧹 Dropped raw tables: {}", report.dropped_tables.join(", "));
        }
        Commands::Verify => {
            let migrator = load_migrator(config_path)?;
            let store = migrator.open_store()?;
            let mut report = migrator.new_report();
            let verification = migrator.verify(&store, &mut report)?;
            print_verification(&verification);
            if !verification.is_consistent() {
                bail!("store failed verification");
            }
            info!("Store verified");
        }
        Commands::Schema => {
            println!("{}", schema::ddl());
        }
    }
    Ok(())
}
