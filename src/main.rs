//! yt - command line access to YouTrack issues
//!
//! Profiles (URL and login) live in the configuration file; passwords come
//! from `YT_PASSWORD` or the OS keyring.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use youtrack_client::api::{
    auth, ApiError, Command as IssueCommand, CreateOutput, CreatedIssue, Credentials, NewIssue,
    YouTrackClient,
};
use youtrack_client::config::{Config, Profile};
use youtrack_client::error::{AppError, Result};
use youtrack_client::logging;

/// Environment variable that overrides the stored password.
const PASSWORD_ENV: &str = "YT_PASSWORD";

#[derive(Parser)]
#[command(name = "yt")]
#[command(about = "Work with YouTrack issues from the terminal", version)]
struct Cli {
    /// Profile to use instead of the default one
    #[arg(short, long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage connection profiles
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Work with issues
    #[command(subcommand)]
    Issue(IssueAction),
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Add or replace a profile
    Add {
        name: String,
        url: String,
        login: String,
        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },
    /// List profiles
    List,
    /// Remove a profile and its stored password
    Remove { name: String },
    /// Check the password and store it in the keyring
    Login,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputKind {
    Link,
    Id,
    Issue,
}

impl From<OutputKind> for CreateOutput {
    fn from(kind: OutputKind) -> Self {
        match kind {
            OutputKind::Link => CreateOutput::Link,
            OutputKind::Id => CreateOutput::Id,
            OutputKind::Issue => CreateOutput::Issue,
        }
    }
}

#[derive(Subcommand)]
enum IssueAction {
    /// Create an issue
    Create {
        project: String,
        summary: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Group the issue is visible to
        #[arg(long)]
        permitted_group: Option<String>,
        #[arg(long, value_enum, default_value = "link")]
        output: OutputKind,
    },
    /// Show an issue as JSON
    Get {
        id: String,
        /// Render the description as HTML
        #[arg(long)]
        wikify: bool,
    },
    /// Update summary and/or description
    Update {
        id: String,
        #[arg(short, long)]
        summary: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Check whether an issue exists
    Exists { id: String },
    /// Show every historical state of an issue
    History { id: String },
    /// Show the change log of an issue
    Changes { id: String },
    /// Delete an issue
    Delete { id: String },
    /// Apply a command, e.g. "Fixed assignee root"
    Command {
        id: String,
        command: String,
        #[arg(short, long)]
        comment: Option<String>,
        /// Group the comment is visible to
        #[arg(short, long)]
        group: Option<String>,
        #[arg(long)]
        disable_notifications: bool,
        /// Run the command as this user
        #[arg(long)]
        run_as: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init() {
        eprintln!("warning: logging disabled: {}", e);
    }

    let result = run(cli).await;
    tracing::info!("yt shutting down");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            eprintln!("error: {}", e.user_message());
            if let Some(action) = e.suggested_action() {
                eprintln!("hint: {}", action);
            } else if e.is_recoverable() {
                eprintln!("hint: try again in a moment.");
            }
            if let Some(dir) = logging::log_directory() {
                eprintln!("details: see the logs in {}", dir.display());
            }
            if e.is_critical() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;

    match cli.command {
        Commands::Profile(command) => {
            run_profile(command, cli.profile.as_deref(), &mut config).await
        }
        Commands::Issue(action) => {
            let profile = config.select_profile(cli.profile.as_deref())?;
            let client = connect(&config, profile).await?;
            let result = run_issue(action, &client).await;
            client.close();
            result
        }
    }
}

async fn run_profile(
    command: ProfileCommand,
    selected: Option<&str>,
    config: &mut Config,
) -> Result<()> {
    match command {
        ProfileCommand::Add {
            name,
            url,
            login,
            default,
        } => {
            config.add_profile(Profile::new(name.clone(), url, login))?;
            if default || config.settings.default_profile.is_none() {
                config.settings.default_profile = Some(name.clone());
            }
            config.save()?;
            println!(
                "Profile '{}' saved. Run 'yt -p {} profile login' to store the password.",
                name, name
            );
        }
        ProfileCommand::List => {
            for profile in &config.profiles {
                let marker = if config.settings.default_profile.as_deref() == Some(&profile.name) {
                    "*"
                } else {
                    " "
                };
                let stored = if auth::has_password(&profile.name) {
                    "password stored"
                } else {
                    "no password"
                };
                println!(
                    "{} {} {} {} ({})",
                    marker, profile.name, profile.url, profile.login, stored
                );
            }
        }
        ProfileCommand::Remove { name } => {
            config.remove_profile(&name)?;
            config.save()?;
            if let Err(e) = auth::delete_password(&name) {
                tracing::debug!("No password removed for '{}': {}", name, e);
            }
            println!("Profile '{}' removed.", name);
        }
        ProfileCommand::Login => {
            let profile = config.select_profile(selected)?.clone();
            let password = match std::env::var(PASSWORD_ENV) {
                Ok(password) => password,
                Err(_) => prompt_password(&profile)?,
            };
            let client =
                YouTrackClient::with_config(&profile.url, None, config.settings.client_config())?;
            client.login(&profile.login, &password).await?;
            client.close();
            auth::store_password(&profile.name, &password)?;
            println!("Logged in as {}; password stored.", profile.login);
        }
    }
    Ok(())
}

fn prompt_password(profile: &Profile) -> Result<String> {
    print!("Password for {} at {}: ", profile.login, profile.url);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(AppError::other("No password given."));
    }
    Ok(password)
}

async fn connect(config: &Config, profile: &Profile) -> Result<YouTrackClient> {
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => auth::get_password(&profile.name)?,
    };
    let client = YouTrackClient::with_config(
        &profile.url,
        Some(Credentials::new(&profile.login, &password)),
        config.settings.client_config(),
    )?;
    client.login(&profile.login, &password).await?;
    Ok(client)
}

async fn run_issue(action: IssueAction, client: &YouTrackClient) -> Result<()> {
    match action {
        IssueAction::Create {
            project,
            summary,
            description,
            permitted_group,
            output,
        } => {
            let issue = NewIssue {
                description,
                permitted_group,
                ..NewIssue::new(&project, &summary)
            };
            match client.create_issue(&issue, output.into()).await? {
                Some(CreatedIssue::Link(link)) => println!("{}", link),
                Some(CreatedIssue::Id(id)) => println!("{}", id),
                Some(CreatedIssue::Issue(issue)) => print_json(&issue)?,
                None => return Err(AppError::other("YouTrack did not create the issue.")),
            }
        }
        IssueAction::Get { id, wikify } => match client.get_issue(&id, wikify).await? {
            Some(issue) => print_json(&issue)?,
            None => return Err(ApiError::NotFound(id).into()),
        },
        IssueAction::Update {
            id,
            summary,
            description,
        } => {
            let updated = client
                .update_issue(&id, summary.as_deref(), description.as_deref())
                .await?;
            report(updated, &format!("Updated {}.", id), "YouTrack rejected the update.")?;
        }
        IssueAction::Exists { id } => {
            println!("{}", client.issue_exists(&id).await?);
        }
        IssueAction::History { id } => match client.get_issue_history(&id).await? {
            Some(history) => print_json(&history)?,
            None => return Err(ApiError::NotFound(id).into()),
        },
        IssueAction::Changes { id } => match client.get_issue_changes(&id).await? {
            Some(changes) => print_json(&changes)?,
            None => return Err(ApiError::NotFound(id).into()),
        },
        IssueAction::Delete { id } => {
            let deleted = client.delete_issue(&id).await?;
            report(deleted, &format!("Deleted {}.", id), "YouTrack rejected the delete.")?;
        }
        IssueAction::Command {
            id,
            command,
            comment,
            group,
            disable_notifications,
            run_as,
        } => {
            let command = IssueCommand {
                comment,
                group,
                disable_notifications,
                run_as,
                ..IssueCommand::new(&command)
            };
            let applied = client.execute_command(&id, &command).await?;
            report(applied, &format!("Applied to {}.", id), "YouTrack rejected the command.")?;
        }
    }
    Ok(())
}

fn report(ok: bool, success: &str, failure: &str) -> Result<()> {
    if ok {
        println!("{}", success);
        Ok(())
    } else {
        Err(AppError::other(failure))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| AppError::other(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
