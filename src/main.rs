use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use jobtagger::config::AppConfig;
use jobtagger::jobs::JobRef;
use jobtagger::registry::{check_label, FieldCheck};
use jobtagger::rename::EntityKind;

#[derive(Parser)]
#[command(
    name = "jobtagger",
    about = "Category tagging and recent-execution tracking for automation job steps",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = jobtagger::config::CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (HTTP API)
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Manage categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Set or check the configuration label
    Label {
        #[command(subcommand)]
        action: LabelAction,
    },

    /// Set the configuration description
    Description {
        value: String,
    },

    /// Print the current configuration
    Show {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Record a completed job run under a category
    Record {
        /// Job run reference, e.g. infra/deploy#42
        #[arg(long)]
        job: String,

        /// Category identifier
        #[arg(long)]
        category: String,
    },

    /// Propagate a rename from the job system
    Rename {
        #[arg(long, value_enum, default_value = "job")]
        kind: KindArg,

        #[arg(long)]
        old: String,

        #[arg(long)]
        new: String,
    },

    /// Show the recent execution history
    History {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CategoryAction {
    /// List all categories
    List,

    /// Add a category
    Add {
        #[arg(long)]
        name: String,

        /// Identifier; a UUID is generated when omitted
        #[arg(long)]
        id: Option<String>,
    },

    /// Change a category's display name
    Rename {
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,
    },

    /// Remove a category
    Remove {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum LabelAction {
    /// Set the label (letters and spaces only)
    Set { value: String },

    /// Check a candidate label without saving it
    Check { value: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Job,
    Category,
}

impl From<KindArg> for EntityKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Job => EntityKind::Job,
            KindArg::Category => EntityKind::Category,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }
    jobtagger::init_tracing(&config.logging);

    let tracker = Arc::new(jobtagger::open_tracker(&config)?);
    let registry = tracker.registry();

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            tracing::info!(%bind, "Starting jobtagger daemon");
            jobtagger::serve(tracker.clone(), &bind).await?;
        }
        Commands::Category { action } => match action {
            CategoryAction::List => {
                let list = registry.list_all().await;
                if list.is_empty() {
                    println!("No categories found.");
                } else {
                    println!("{:<38} | Name", "Id");
                    println!("{:-<38}-|-{:-<20}", "", "");
                    for c in list {
                        println!("{:<38} | {}", c.id(), c.name());
                    }
                }
            }
            CategoryAction::Add { name, id } => {
                let c = registry.create_category(&name, id.as_deref()).await?;
                println!("Category '{}' added with id {}.", c.name(), c.id());
            }
            CategoryAction::Rename { id, name } => {
                registry.rename_category(&id, &name).await?;
                println!("Category '{}' renamed to '{}'.", id, name);
            }
            CategoryAction::Remove { id } => {
                registry.delete_category(&id).await?;
                println!("Category '{}' removed.", id);
            }
        },
        Commands::Label { action } => match action {
            LabelAction::Set { value } => {
                registry.set_label(&value).await?;
                println!("Label set to '{}'.", value);
            }
            LabelAction::Check { value } => match check_label(&value) {
                FieldCheck::Ok => println!("OK"),
                FieldCheck::Warning(msg) => println!("WARNING: {}", msg),
                FieldCheck::Error(msg) => println!("ERROR: {}", msg),
            },
        },
        Commands::Description { value } => {
            registry.set_description(&value).await?;
            println!("Description updated.");
        }
        Commands::Show { json } => {
            let snapshot = registry.snapshot().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("Label:       {}", snapshot.label.as_deref().unwrap_or("-"));
                println!(
                    "Description: {}",
                    snapshot.description.as_deref().unwrap_or("-")
                );
                println!(
                    "Last job:    {}",
                    snapshot.last_categorized_job.as_deref().unwrap_or("-")
                );
                println!("Categories:  {}", snapshot.categories.len());
            }
        }
        Commands::Record { job, category } => {
            let record = tracker
                .on_execution_complete(JobRef::new(job), &category)
                .await?;
            println!(
                "Recorded {} under category {}.",
                record.job_reference,
                record.category.name()
            );
        }
        Commands::Rename { kind, old, new } => {
            let report = tracker.on_rename(kind.into(), &old, &new).await;
            println!("Rename delivered to {} listener(s).", report.delivered);
            if !report.is_clean() {
                anyhow::bail!("rename failed for: {}", report.failed.join("; "));
            }
        }
        Commands::History { json } => {
            let items = tracker.history_view().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                println!("No executions recorded.");
            } else {
                println!("{:<30} | {:<20} | Link", "Job", "Category");
                println!("{:-<30}-|-{:-<20}-|-{:-<30}", "", "", "");
                for item in items {
                    println!(
                        "{:<30} | {:<20} | {}",
                        item.job_reference,
                        item.category_name,
                        item.url.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }

    Ok(())
}
