//! Command-line interface.
//!
//! `serve` runs the HTTP API (the default); `stats` and `history` read the
//! analysis database directly for offline inspection.

use clap::{Parser, Subcommand};

use crate::storage::{RecordStore, SqliteStorage, DEFAULT_HISTORY_LIMIT, DEFAULT_TREND_DAYS};

/// Leaf disease detection service
#[derive(Parser, Debug)]
#[command(name = "leaf-disease-detection", version, about)]
pub struct Cli {
    /// Bind host, overrides SERVER_HOST
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Bind port, overrides SERVER_PORT
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run the HTTP API server
    Serve,

    /// Print aggregate statistics from the analysis database
    Stats,

    /// Print the most recent analyses
    History {
        /// Maximum number of analyses to show
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: u32,
    },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute an offline database command. `Serve` is handled by the binary.
pub async fn execute_command(command: Commands, storage: &SqliteStorage) -> CliResult {
    match command {
        Commands::Serve => CliResult::error("serve is not an offline command"),
        Commands::Stats => execute_stats(storage).await,
        Commands::History { limit } => execute_history(storage, limit).await,
    }
}

async fn execute_stats(storage: &SqliteStorage) -> CliResult {
    let stats = match storage.aggregate_stats().await {
        Ok(s) => s,
        Err(e) => return CliResult::error(format!("Failed to read statistics: {}", e)),
    };
    let trend = match storage.daily_counts(DEFAULT_TREND_DAYS).await {
        Ok(t) => t,
        Err(e) => return CliResult::error(format!("Failed to read daily trend: {}", e)),
    };

    let mut output = String::new();
    output.push_str("\nAnalysis Statistics\n");
    output.push_str("═══════════════════════════════════════════\n\n");
    output.push_str(&format!("Total analyses:      {}\n", stats.total_analyses));
    output.push_str(&format!("Disease detections:  {}\n", stats.disease_detections));
    output.push_str(&format!("Healthy plants:      {}\n", stats.healthy_plants));
    output.push_str(&format!("Invalid images:      {}\n", stats.invalid_images));

    if !stats.disease_distribution.is_empty() {
        output.push_str("\nDisease distribution:\n");
        for (kind, count) in &stats.disease_distribution.0 {
            output.push_str(&format!("  {:<18} {}\n", kind, count));
        }
    }

    if !trend.is_empty() {
        output.push_str(&format!("\nDaily trend (last {} days):\n", DEFAULT_TREND_DAYS));
        for day in &trend {
            output.push_str(&format!("  {}         {}\n", day.date.format("%Y-%m-%d"), day.count));
        }
    }

    CliResult::success(output)
}

async fn execute_history(storage: &SqliteStorage, limit: u32) -> CliResult {
    let records = match storage.list_recent(limit).await {
        Ok(r) => r,
        Err(e) => return CliResult::error(format!("Failed to read history: {}", e)),
    };

    if records.is_empty() {
        return CliResult::success("No analyses recorded yet.");
    }

    let mut output = String::new();
    output.push_str(&format!("\nRecent Analyses ({})\n", records.len()));
    output.push_str("═══════════════════════════════════════════\n\n");

    for record in &records {
        let outcome = if record.diagnosis.disease_detected {
            record
                .diagnosis
                .disease_name
                .clone()
                .unwrap_or_else(|| record.diagnosis.disease_type.clone())
        } else {
            record.diagnosis.disease_type.clone()
        };

        output.push_str(&format!(
            "#{:<5} {}  {:<24} {:<28} {:>5.1}%\n",
            record.id,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.image_filename,
            outcome,
            record.diagnosis.confidence
        ));
    }

    CliResult::success(output)
}
