use anyhow::Context;
use bulk_record_validator::app::ports::SchemaValidatorPort;
use bulk_record_validator::app::run_service::RunService;
use bulk_record_validator::config::AppConfig;
use bulk_record_validator::constants;
use bulk_record_validator::infra::SqliteAuditStore;
use bulk_record_validator::pipeline::record::{decode_record, extract_correlation_id, parse_records};
use bulk_record_validator::validation::JsonSchemaValidator;
use bulk_record_validator::{build_orchestrator, logging, metrics, server};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "bulk-record-validator")]
#[command(about = "Validate bulk customer record files and route them to valid/invalid sinks")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = constants::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the number of inputs processed concurrently
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once over every input in the raw container
    Run,
    /// Serve the HTTP run endpoint (and Prometheus metrics if configured)
    Serve {
        /// Port for the HTTP server
        #[arg(long, default_value = "8080")]
        port: u16,
    },
    /// Validate a single input file without writing anything
    ValidateFile {
        /// Path to a JSON array of records
        path: PathBuf,
    },
    /// Print rows from the audit table
    Audit {
        /// Only show rows of this partition key
        #[arg(long)]
        partition: Option<String>,
    },
    /// Load and check the configuration and schema, then exit
    CheckConfig,
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    logging::init_logging(&config.log_dir);

    match cli.command {
        Commands::Run => {
            if let Some(port) = config.metrics_port {
                metrics::init_metrics(port);
            }
            let orchestrator = build_orchestrator(&config)?;
            match orchestrator.run_once().await {
                Ok(summary) => {
                    println!("{}", summary);
                    if !summary.success() {
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    error!("Run aborted: {}", e);
                    println!("❌ Run aborted: {}", e);
                    std::process::exit(2);
                }
            }
        }
        Commands::Serve { port } => {
            if let Some(metrics_port) = config.metrics_port {
                metrics::init_metrics(metrics_port);
            }
            let service = RunService::new(Arc::new(build_orchestrator(&config)?));
            info!("Serving runs for {}", config.data_root.display());
            server::start_server(service, port).await?;
        }
        Commands::ValidateFile { path } => {
            let validator = JsonSchemaValidator::from_file(&config.schema_path)?;
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let records = parse_records(&content)
                .with_context(|| format!("{} is not a JSON array of records", path.display()))?;

            let mut invalid = 0;
            for (index, raw) in records.iter().enumerate() {
                let record = decode_record(raw)
                    .with_context(|| format!("decoding record {} of {}", index, path.display()))?;
                let id = extract_correlation_id(&record, &config.correlation_pointer).unwrap_or_default();
                let outcome = validator.validate(&record);
                println!("[{}] correlationId='{}' {}", index, id, outcome.status());
                for violation in &outcome.errors {
                    println!("      - {}", violation);
                }
                if !outcome.is_valid {
                    invalid += 1;
                }
            }
            println!("{} records, {} invalid", records.len(), invalid);
            if invalid > 0 {
                std::process::exit(1);
            }
        }
        Commands::Audit { partition } => {
            let store = SqliteAuditStore::open(config.audit_db_path(), &config.audit_table)?;
            let rows = store.list(partition.as_deref())?;
            for row in &rows {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    row.entry.partition_key,
                    row.entry.row_key,
                    row.entry.status,
                    row.entry.error_message,
                    row.updated_at.to_rfc3339()
                );
            }
            println!("{} rows", rows.len());
        }
        Commands::CheckConfig => {
            JsonSchemaValidator::from_file(&config.schema_path)?;
            println!("✅ Configuration OK");
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
