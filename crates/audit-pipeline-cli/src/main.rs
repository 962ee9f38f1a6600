//! audit-pipeline CLI - Bulk seeding and partition migration for audit tables.

use std::path::PathBuf;
use std::process::ExitCode;

use audit_pipeline::{
    validate_table, AuditTarget, Config, DbPool, EntityKind, Migrator, PipelineError, SeedRequest,
    Seeder,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "audit-pipeline")]
#[command(about = "Bulk seeding and partition migration for PostgreSQL audit tables")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

/// Entity kinds are a closed set; anything else is rejected at parse time.
#[derive(Clone, Copy, ValueEnum)]
enum EntityArg {
    User,
    Course,
    Tenant,
    Enrollment,
}

impl From<EntityArg> for EntityKind {
    fn from(arg: EntityArg) -> EntityKind {
        match arg {
            EntityArg::User => EntityKind::User,
            EntityArg::Course => EntityKind::Course,
            EntityArg::Tenant => EntityKind::Tenant,
            EntityArg::Enrollment => EntityKind::Enrollment,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ConnectionArg {
    Operational,
    Audit,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and bulk-load synthetic entities with audit trails
    Seed {
        /// Number of entities to create
        count: u64,

        /// Tenant the records belong to (must already exist); not used when
        /// seeding tenants themselves
        #[arg(long, required_if_eq_any([
            ("entity", "user"),
            ("entity", "course"),
            ("entity", "enrollment"),
        ]))]
        tenant: Option<Uuid>,

        /// Kind of entity to seed
        #[arg(long, value_enum, default_value = "user")]
        entity: EntityArg,

        /// First day of the seeded time range (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// Last day of the seeded time range (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<NaiveDate>,

        /// Keep staged COPY files after loading
        #[arg(long)]
        keep_csv: bool,

        /// Connection the audit rows are loaded through
        #[arg(long, value_enum, default_value = "operational")]
        audit_connection: ConnectionArg,
    },

    /// Migrate one kind's audit table into the partitioned audit store
    Migrate {
        /// Kind of entity whose audit table to migrate
        #[arg(value_enum)]
        entity: EntityArg,
    },

    /// Compare ordered ID checksums between the two stores
    Validate {
        /// Kind of entity whose audit table to check
        #[arg(value_enum)]
        entity: EntityArg,
    },

    /// Test both database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), PipelineError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let operational = DbPool::connect(&config.operational, "operational").await?;
    let audit = DbPool::connect(&config.audit, "audit").await?;

    match cli.command {
        Commands::Seed {
            count,
            tenant,
            entity,
            start_date,
            end_date,
            keep_csv,
            audit_connection,
        } => {
            let request = SeedRequest {
                kind: entity.into(),
                tenant_id: tenant,
                count,
                start: start_date,
                end: end_date,
                keep_files: keep_csv,
                audit_target: match audit_connection {
                    ConnectionArg::Operational => AuditTarget::Operational,
                    ConnectionArg::Audit => AuditTarget::Audit,
                },
            };

            let seeder = Seeder::new(&operational, &audit, &config.pipeline);
            let summary = seeder.seed(&request).await?;

            println!("\nSeeding completed!");
            println!("  Time buckets: {}", summary.buckets);
            println!("  Entity rows: {}", summary.entity_rows);
            println!("  Audit rows: {}", summary.audit_rows);
        }

        Commands::Migrate { entity } => {
            let migrator = Migrator::new(&operational, &audit, &config.pipeline);
            let summary = migrator.migrate(entity.into()).await?;

            println!("\nMigration completed!");
            println!("  Table: {}", summary.table);
            println!("  Months: {}", summary.months);
            println!("  Rows: {}", summary.rows);
        }

        Commands::Validate { entity } => {
            let kind: EntityKind = entity.into();
            let staging_dir = PathBuf::from(&config.pipeline.staging_dir);
            let report =
                validate_table(&operational, &audit, kind.audit_table(), &staging_dir).await?;
            report.remove_artifacts().await?;

            println!("Validation completed successfully");
            println!("  Table: {}", report.table);
            println!("  Rows: {}", report.row_count);
            println!("  SHA-256: {}", report.digest);
        }

        Commands::HealthCheck => {
            operational.ping().await?;
            audit.ping().await?;
            println!("Health Check Results:");
            println!("  Operational (PostgreSQL): OK");
            println!("  Audit (PostgreSQL): OK");
            println!("\n  Overall: HEALTHY");
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
