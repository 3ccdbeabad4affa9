//! # Gradebook CLI Module
//!
//! This module implements the CLI interface for the gradebook.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database
//! - `seed` - Load disciplines, classes and enrollments from a roster file
//! - `grade` - Record or clear one grade
//! - `policy` - Replace a discipline's averaging policy
//! - `adjusted-mode` - Toggle adjusted final grades for a discipline
//! - `final-grades` - Show final grades of a class
//! - `pendencies` - Show missing grades of a class
//! - `export` - Write the final report of a class to a file
//! - `audit` - Show the grade history of a class

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use gradebook_core::{ActorContext, GradebookError, ProfessorId};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Gradebook - academic grade records and final grades
///
/// Records assessment grades, computes simple or weighted final grades,
/// and refuses to export a class while any grade is missing.
#[derive(Parser, Debug)]
#[command(name = "gradebook")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the gradebook database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" (ACID database) or "memory" (volatile)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Acting professor id, required by grading commands
    #[arg(short = 'P', long, global = true)]
    pub professor: Option<u64>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Roster file loaded before serving
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Load disciplines, components, classes, students and enrollments
    Seed {
        /// Path to the roster JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Record, change or clear one grade
    Grade {
        #[arg(short, long)]
        enrollment: u64,

        #[arg(short = 'm', long)]
        component: u64,

        /// Grade value in [0, 10]; rounded to two decimals
        #[arg(short, long, conflicts_with = "clear", required_unless_present = "clear")]
        value: Option<f64>,

        /// Clear the grade instead of setting it
        #[arg(long)]
        clear: bool,
    },

    /// Replace the averaging policy of a discipline
    Policy {
        #[arg(short, long)]
        discipline: u64,

        /// Weights as `P1=0.4,P2=0.6`; omit for the simple average
        #[arg(short, long)]
        weights: Option<String>,
    },

    /// Enable or disable adjusted final grades of a discipline
    AdjustedMode {
        #[arg(short, long)]
        discipline: u64,

        /// Disable instead of enable
        #[arg(long)]
        disable: bool,
    },

    /// Show final grades of a class
    FinalGrades {
        #[arg(short, long)]
        discipline: u64,

        #[arg(short = 'k', long)]
        class: u64,
    },

    /// Show missing grades of a class
    Pendencies {
        #[arg(short, long)]
        discipline: u64,

        #[arg(short = 'k', long)]
        class: u64,
    },

    /// Export the final report of a class
    Export {
        #[arg(short, long)]
        discipline: u64,

        #[arg(short = 'k', long)]
        class: u64,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the grade history of a class, newest first
    Audit {
        #[arg(short = 'k', long)]
        class: u64,
    },
}

impl Cli {
    /// Apply the CLI layer over a loaded configuration.
    pub fn apply_to(&self, config: &mut AppConfig) -> Result<(), GradebookError> {
        if let Some(database) = &self.database {
            config.storage.database.clone_from(database);
        }
        if let Some(backend) = &self.backend {
            config.storage.backend = backend.parse()?;
        }
        if let Some(Commands::Server { host, port, .. }) = &self.command {
            if let Some(host) = host {
                config.server.host.clone_from(host);
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
        }
        Ok(())
    }

    fn actor(&self) -> Result<ActorContext, GradebookError> {
        self.professor
            .map(|id| ActorContext::new(ProfessorId(id)))
            .ok_or_else(|| {
                GradebookError::Config("--professor is required for this command".to_string())
            })
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments and the merged configuration.
pub async fn execute(cli: Cli, config: AppConfig) -> Result<(), GradebookError> {
    let json_mode = cli.json_mode;

    match &cli.command {
        Some(Commands::Server { seed, .. }) => cmd_server(&config, seed.as_deref()).await,
        Some(Commands::Init { force }) => cmd_init(&config, *force),
        Some(Commands::Seed { file }) => cmd_seed(&config, file),
        Some(Commands::Grade {
            enrollment,
            component,
            value,
            clear,
        }) => {
            let value = if *clear { None } else { *value };
            cmd_grade(&config, &cli.actor()?, json_mode, *enrollment, *component, value)
        }
        Some(Commands::Policy {
            discipline,
            weights,
        }) => cmd_policy(&config, &cli.actor()?, *discipline, weights.as_deref()),
        Some(Commands::AdjustedMode {
            discipline,
            disable,
        }) => cmd_adjusted_mode(&config, &cli.actor()?, *discipline, !*disable),
        Some(Commands::FinalGrades { discipline, class }) => {
            cmd_final_grades(&config, &cli.actor()?, json_mode, *discipline, *class)
        }
        Some(Commands::Pendencies { discipline, class }) => {
            cmd_pendencies(&config, &cli.actor()?, json_mode, *discipline, *class)
        }
        Some(Commands::Export {
            discipline,
            class,
            output,
        }) => cmd_export(&config, &cli.actor()?, *discipline, *class, output),
        Some(Commands::Audit { class }) => {
            cmd_audit(&config, &cli.actor()?, json_mode, *class)
        }
        None => cmd_info(&config, json_mode),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::parse_from([
            "gradebook",
            "--backend",
            "memory",
            "-D",
            "other.db",
            "server",
            "--port",
            "9100",
        ]);
        let mut config = AppConfig::default();
        cli.apply_to(&mut config).expect("apply");

        assert_eq!(config.storage.backend, Backend::Memory);
        assert_eq!(config.storage.database, PathBuf::from("other.db"));
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn grading_commands_need_a_professor() {
        let cli = Cli::parse_from(["gradebook", "audit", "--class", "1"]);
        assert!(matches!(cli.actor(), Err(GradebookError::Config(_))));

        let cli = Cli::parse_from(["gradebook", "-P", "7", "audit", "--class", "1"]);
        assert_eq!(cli.actor().ok(), Some(ActorContext::new(ProfessorId(7))));
    }

    #[test]
    fn grade_requires_value_or_clear() {
        assert!(Cli::try_parse_from(["gradebook", "grade", "-e", "1", "-m", "1"]).is_err());
        assert!(
            Cli::try_parse_from(["gradebook", "grade", "-e", "1", "-m", "1", "--clear"]).is_ok()
        );
        assert!(
            Cli::try_parse_from([
                "gradebook", "grade", "-e", "1", "-m", "1", "-v", "7.5", "--clear"
            ])
            .is_err()
        );
    }
}
