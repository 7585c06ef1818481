use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use std::path::PathBuf;
use wishlist::db::{ApplicationPatch, FeaturePatch};
use wishlist::{backup, github, BackupFormat, Config, Database, Link, LinkEnvironment, LinkTarget};

#[derive(Parser)]
#[command(name = "wishlist")]
#[command(author, version, about = "Local-first feature request tracker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture and manage feature requests
    #[command(subcommand)]
    Feature(FeatureCommand),

    /// Manage tags
    #[command(subcommand)]
    Tag(TagCommand),

    /// Track GitHub repositories
    #[command(subcommand)]
    Repo(RepoCommand),

    /// Group repositories into applications
    #[command(subcommand)]
    App(AppCommand),

    /// Export and restore backups
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum FeatureCommand {
    /// Add a new feature request
    Add {
        title: String,

        /// Longer description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Tag to attach (repeatable); created if it doesn't exist
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// List all features, most recently updated first
    List,

    /// Update an existing feature
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Replacement tag list (repeatable)
        #[arg(short, long = "tag")]
        tags: Option<Vec<String>>,
    },

    /// Delete a feature
    Remove { id: String },

    /// Print a pre-filled GitHub new-issue URL for a feature
    Issue {
        id: String,

        /// Repository id to file against (defaults to the only tracked repo)
        #[arg(short, long)]
        repo: Option<String>,
    },
}

#[derive(Subcommand)]
enum TagCommand {
    /// Add a tag (no-op if it already exists, in any case)
    Add { name: String },

    /// List all tags with their colors
    List,

    /// Delete a tag (features keep the name)
    Remove { id: String },
}

#[derive(Subcommand)]
enum RepoCommand {
    /// Track a repository by its GitHub URL
    Add { url: String },

    /// List tracked repositories
    List,

    /// Stop tracking a repository
    Remove { id: String },
}

#[derive(Subcommand)]
enum AppCommand {
    /// Add an application
    Add {
        name: String,

        /// Repository id to include (repeatable)
        #[arg(short, long = "repo")]
        repos: Vec<String>,
    },

    /// List applications
    List,

    /// Update an application
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        /// Replacement repository id list (repeatable)
        #[arg(short, long = "repo")]
        repos: Option<Vec<String>>,
    },

    /// Delete an application
    Remove { id: String },

    /// Manage an application's links
    #[command(subcommand)]
    Link(AppLinkCommand),
}

#[derive(Subcommand)]
enum AppLinkCommand {
    /// Attach a link to an application
    Add {
        app_id: String,
        display_name: String,
        href: String,

        #[arg(short, long, default_value = "")]
        description: String,

        #[arg(long)]
        icon: Option<String>,

        /// new-tab, same-tab, parent-frame, or full-window
        #[arg(long, default_value = "new-tab")]
        target: String,

        /// production, test, or development
        #[arg(short, long, default_value = "production")]
        environment: String,
    },

    /// Remove a link from an application
    Remove { app_id: String, link_id: String },
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Write a backup file
    Export {
        /// Output path (default: wishlist_backup_<timestamp>.<ext>)
        path: Option<PathBuf>,

        /// json, xml, or csv (inferred from the path extension when omitted)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Restore records from a backup file (upserts by id)
    Import {
        path: PathBuf,

        /// json, xml, or csv (inferred from the path extension when omitted)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Show when the last backup was written
    Status,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Feature(cmd) => run_feature(cmd),
        Command::Tag(cmd) => run_tag(cmd),
        Command::Repo(cmd) => run_repo(cmd),
        Command::App(cmd) => run_app(cmd),
        Command::Backup(cmd) => run_backup(cmd),
        Command::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "wishlist", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn run_feature(cmd: FeatureCommand) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::shared()?;
    match cmd {
        FeatureCommand::Add {
            title,
            description,
            tags,
        } => {
            for name in &tags {
                db.add_tag(name)?;
            }
            let feature = db.add_feature(&title, &description, &tags)?;
            println!("{} {} ({})", "Added".green().bold(), feature.title, feature.id.dimmed());
        }
        FeatureCommand::List => {
            let features = db.list_features()?;
            if features.is_empty() {
                println!("No features yet. Add one with `wishlist feature add <title>`.");
                return Ok(());
            }
            for feature in features {
                let tags = if feature.tags.is_empty() {
                    String::new()
                } else {
                    format!("  [{}]", feature.tags.join(", "))
                };
                println!(
                    "{}  {}{}",
                    feature.id.dimmed(),
                    feature.title.bold(),
                    tags.cyan()
                );
                if !feature.description.is_empty() {
                    println!("    {}", feature.description);
                }
            }
        }
        FeatureCommand::Update {
            id,
            title,
            description,
            tags,
        } => {
            if let Some(ref new_tags) = tags {
                for name in new_tags {
                    db.add_tag(name)?;
                }
            }
            let patch = FeaturePatch {
                title,
                description,
                tags,
            };
            match db.update_feature(&id, patch)? {
                Some(feature) => {
                    println!("{} {}", "Updated".green().bold(), feature.title)
                }
                None => println!("{} no feature with id {}", "Skipped:".yellow(), id),
            }
        }
        FeatureCommand::Remove { id } => {
            db.delete_feature(&id)?;
            println!("{} {}", "Removed".green().bold(), id);
        }
        FeatureCommand::Issue { id, repo } => {
            let feature = db
                .get_feature(&id)?
                .ok_or_else(|| format!("no feature with id {}", id))?;
            let repositories = db.list_repositories()?;
            let repository = match repo {
                Some(repo_id) => repositories
                    .iter()
                    .find(|r| r.id == repo_id)
                    .ok_or_else(|| format!("no repository with id {}", repo_id))?,
                None => match repositories.as_slice() {
                    [only] => only,
                    [] => return Err("no repositories tracked; add one first".into()),
                    _ => return Err("multiple repositories tracked; pass --repo <id>".into()),
                },
            };
            let url = github::new_issue_url(
                &repository.owner,
                &repository.name,
                &feature.title,
                &feature.description,
            );
            println!("{}", url);
        }
    }
    Ok(())
}

fn run_tag(cmd: TagCommand) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::shared()?;
    match cmd {
        TagCommand::Add { name } => {
            let tag = db.add_tag(&name)?;
            println!(
                "{} {} {} ({})",
                "Added".green().bold(),
                tag.name,
                tag.color.dimmed(),
                tag.id.dimmed()
            );
        }
        TagCommand::List => {
            for tag in db.list_tags()? {
                println!("{}  {}  {}", tag.id.dimmed(), tag.name.bold(), tag.color);
            }
        }
        TagCommand::Remove { id } => {
            db.delete_tag(&id)?;
            println!("{} {}", "Removed".green().bold(), id);
        }
    }
    Ok(())
}

fn run_repo(cmd: RepoCommand) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::shared()?;
    match cmd {
        RepoCommand::Add { url } => {
            let parsed = github::parse_repo_url(&url)
                .ok_or("not a valid GitHub repository URL")?;
            let existing = db.list_repositories()?;
            if let Some(found) = github::find_existing(&existing, &parsed.owner, &parsed.name) {
                println!(
                    "{} {}/{} is already tracked ({})",
                    "Skipped:".yellow(),
                    found.owner,
                    found.name,
                    found.id.dimmed()
                );
                return Ok(());
            }
            let repository = db.add_repository(&parsed.owner, &parsed.name, &parsed.url)?;
            println!(
                "{} {}/{} ({})",
                "Tracking".green().bold(),
                repository.owner,
                repository.name,
                repository.id.dimmed()
            );
        }
        RepoCommand::List => {
            for repository in db.list_repositories()? {
                println!(
                    "{}  {}/{}  {}",
                    repository.id.dimmed(),
                    repository.owner,
                    repository.name.bold(),
                    repository.url.dimmed()
                );
            }
        }
        RepoCommand::Remove { id } => {
            db.delete_repository(&id)?;
            println!("{} {}", "Removed".green().bold(), id);
        }
    }
    Ok(())
}

fn run_app(cmd: AppCommand) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::shared()?;
    match cmd {
        AppCommand::Add { name, repos } => {
            let application = db.add_application(&name, &repos, &[])?;
            println!(
                "{} {} ({})",
                "Added".green().bold(),
                application.name,
                application.id.dimmed()
            );
        }
        AppCommand::List => {
            for application in db.list_applications()? {
                println!(
                    "{}  {}  {} repo(s), {} link(s)",
                    application.id.dimmed(),
                    application.name.bold(),
                    application.repository_ids.len(),
                    application.links.len()
                );
                for link in &application.links {
                    println!(
                        "    {}  {} -> {} [{}]",
                        link.id.dimmed(),
                        link.display_name,
                        link.href,
                        link.environment.as_str()
                    );
                }
            }
        }
        AppCommand::Update { id, name, repos } => {
            let patch = ApplicationPatch {
                name,
                repository_ids: repos,
                links: None,
            };
            match db.update_application(&id, patch)? {
                Some(application) => {
                    println!("{} {}", "Updated".green().bold(), application.name)
                }
                None => println!("{} no application with id {}", "Skipped:".yellow(), id),
            }
        }
        AppCommand::Remove { id } => {
            db.delete_application(&id)?;
            println!("{} {}", "Removed".green().bold(), id);
        }
        AppCommand::Link(link_cmd) => run_app_link(db, link_cmd)?,
    }
    Ok(())
}

fn run_app_link(
    db: &Database,
    cmd: AppLinkCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        AppLinkCommand::Add {
            app_id,
            display_name,
            href,
            description,
            icon,
            target,
            environment,
        } => {
            let target = LinkTarget::from_name(&target)
                .ok_or_else(|| format!("invalid link target '{}'", target))?;
            let environment = LinkEnvironment::from_name(&environment)
                .ok_or_else(|| format!("invalid environment '{}'", environment))?;
            let link = Link {
                id: String::new(), // assigned on insert
                display_name,
                description,
                icon,
                href,
                target,
                environment,
            };
            match db.add_application_link(&app_id, link)? {
                Some(link) => println!(
                    "{} {} ({})",
                    "Linked".green().bold(),
                    link.display_name,
                    link.id.dimmed()
                ),
                None => println!("{} no application with id {}", "Skipped:".yellow(), app_id),
            }
        }
        AppLinkCommand::Remove { app_id, link_id } => {
            if db.remove_application_link(&app_id, &link_id)? {
                println!("{} {}", "Removed".green().bold(), link_id);
            } else {
                println!("{} link {} not found on {}", "Skipped:".yellow(), link_id, app_id);
            }
        }
    }
    Ok(())
}

fn run_backup(cmd: BackupCommand) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        BackupCommand::Export { path, format } => {
            let db = Database::shared()?;
            let format = resolve_format(format.as_deref(), path.as_deref(), BackupFormat::Json)?;
            let path =
                path.unwrap_or_else(|| PathBuf::from(backup::backup_filename(format)));
            let snapshot = backup::export_snapshot(db)?;
            std::fs::write(&path, backup::render(&snapshot, format))?;
            backup::record_backup_time()?;
            println!(
                "{} {} features, {} tags, {} repositories -> {}",
                "Exported".green().bold(),
                snapshot.features.len(),
                snapshot.tags.len(),
                snapshot.repositories.len(),
                path.display()
            );
        }
        BackupCommand::Import { path, format } => {
            let db = Database::shared()?;
            let format = resolve_format_required(format.as_deref(), &path)?;
            let text = std::fs::read_to_string(&path)?;
            let summary = backup::import_snapshot(db, &text, format)?;
            println!(
                "{} {} features, {} tags, {} repositories",
                "Restored".green().bold(),
                summary.features,
                summary.tags,
                summary.repositories
            );
        }
        BackupCommand::Status => {
            let config = Config::load();
            match backup::last_backup_time() {
                Some(at) => {
                    let when = chrono::DateTime::from_timestamp_millis(at)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
                        .unwrap_or_else(|| format!("{} ms", at));
                    if backup::backup_is_stale(config.backup.reminder_days) {
                        println!(
                            "{} last backup {} (over {} days ago)",
                            "Stale:".yellow().bold(),
                            when,
                            config.backup.reminder_days
                        );
                    } else {
                        println!("{} last backup {}", "OK:".green().bold(), when);
                    }
                }
                None => println!(
                    "{} no backup recorded yet. Run `wishlist backup export`.",
                    "Stale:".yellow().bold()
                ),
            }
        }
    }
    Ok(())
}

/// Format from an explicit flag, then the path extension, then a default.
fn resolve_format(
    flag: Option<&str>,
    path: Option<&std::path::Path>,
    default: BackupFormat,
) -> Result<BackupFormat, Box<dyn std::error::Error>> {
    if let Some(name) = flag {
        return BackupFormat::from_name(name)
            .ok_or_else(|| backup::BackupError::UnknownFormat(name.to_string()).into());
    }
    Ok(path.and_then(BackupFormat::from_path).unwrap_or(default))
}

/// Same, but with no fallback: imports must name a format somehow.
fn resolve_format_required(
    flag: Option<&str>,
    path: &std::path::Path,
) -> Result<BackupFormat, Box<dyn std::error::Error>> {
    if let Some(name) = flag {
        return BackupFormat::from_name(name)
            .ok_or_else(|| backup::BackupError::UnknownFormat(name.to_string()).into());
    }
    BackupFormat::from_path(path).ok_or_else(|| {
        backup::BackupError::UnknownFormat(path.display().to_string()).into()
    })
}
