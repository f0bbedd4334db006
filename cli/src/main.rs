use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use folio::api::upload::ImageFile;
use folio::api::{auth, blog, contact, notion, optional, projects, skills, upload};
use folio::config::DEFAULT_BASE_URL;
use folio::guard::LOGIN_ROUTE;
use folio::types::{ContactForm, Credentials, ProjectCreate, ProjectFilter, ProjectUpdate, SkillCreate, SkillUpdate};
use folio::{ApiClient, ApiConfig, ApiError, AuthGuard, FileStorage, SessionStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{code}: {0}", code = .0.error_code())]
    Api(#[from] ApiError),
    #[error("not found")]
    NotFound,
    #[error("failed to read {path}: {source}")]
    ReadData { path: String, source: std::io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "folio", about = "Portfolio service admin CLI")]
struct Cli {
    #[arg(long, env = "FOLIO_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Directory holding the saved session.
    #[arg(long, env = "FOLIO_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login(CredentialArgs),
    Register(CredentialArgs),
    Logout,
    Whoami,
    Status,
    Projects(ProjectsCommand),
    Skills(SkillsCommand),
    Upload { path: PathBuf },
    Blog(BlogCommand),
    Contact(ContactCommand),
    Notion {
        page_id: String,
        /// Read through the blocks endpoint instead of the page endpoint.
        #[arg(long, default_value_t = false)]
        blocks: bool,
    },
}

#[derive(Args, Debug)]
struct CredentialArgs {
    #[arg(long)]
    username: String,
    #[arg(long, env = "FOLIO_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct ProjectsCommand {
    #[command(subcommand)]
    command: ProjectsSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProjectsSubcommand {
    List {
        #[arg(long, help = "Only featured (true) or only non-featured (false) projects")]
        featured: Option<bool>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    Get {
        id: String,
    },
    Create {
        #[arg(long, help = "JSON body, or @path to read it from a file")]
        data: String,
    },
    Update {
        id: String,
        #[arg(long, help = "JSON body, or @path to read it from a file")]
        data: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Args, Debug)]
struct SkillsCommand {
    #[command(subcommand)]
    command: SkillsSubcommand,
}

#[derive(Subcommand, Debug)]
enum SkillsSubcommand {
    List {
        #[arg(long)]
        category: Option<String>,
    },
    Get {
        id: i64,
    },
    Create {
        #[arg(long)]
        data: String,
    },
    Bulk {
        #[arg(long, help = "JSON array of skills, or @path")]
        data: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        data: String,
    },
    Delete {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct BlogCommand {
    #[command(subcommand)]
    command: BlogSubcommand,
}

#[derive(Subcommand, Debug)]
enum BlogSubcommand {
    List,
    Get { id: String },
}

#[derive(Args, Debug)]
struct ContactCommand {
    #[command(subcommand)]
    command: ContactSubcommand,
}

#[derive(Subcommand, Debug)]
enum ContactSubcommand {
    Send {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        message: String,
    },
    List,
}

type Guard = AuthGuard<fn(&str)>;

struct CliContext {
    client: ApiClient,
    guard: Guard,
    session_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn prompt_login(route: &str) {
    tracing::warn!(route, "admin session required");
    eprintln!("not signed in; run `folio login --username <name>` ({route})");
}

fn connect(cli: &Cli) -> Result<CliContext, CliError> {
    let from_env = ApiConfig::from_env()?;
    let session_dir = cli.session_dir.clone().unwrap_or(from_env.session_dir);
    let config = ApiConfig::new(&cli.base_url)?
        .with_timeouts(from_env.timeouts)
        .with_session_dir(session_dir);

    let storage = FileStorage::new(&config.session_dir);
    let session_file = storage.path().to_path_buf();
    let session = SessionStore::open(Arc::new(storage));
    let client = ApiClient::new(&config, session)?;
    let guard: Guard = AuthGuard::new(prompt_login as fn(&str));
    Ok(CliContext { client, guard, session_file })
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = connect(&cli)?;
    match cli.command {
        Command::Login(args) => {
            ctx.guard.observe(auth::sign_in(&ctx.client, &args.into()).await)?;
            eprintln!("signed in");
            Ok(())
        }
        Command::Register(args) => {
            ctx.guard.observe(auth::sign_up(&ctx.client, &args.into()).await)?;
            eprintln!("registered and signed in");
            Ok(())
        }
        Command::Logout => {
            if ctx.client.session().logout() {
                eprintln!("signed out");
            } else {
                eprintln!("already signed out");
            }
            Ok(())
        }
        Command::Whoami => {
            ctx.guard.require_session(ctx.client.session())?;
            print_json(&ctx.guard.observe(auth::me(&ctx.client).await)?)
        }
        Command::Status => print_json(&json!({
            "baseUrl": ctx.client.base_url().as_str(),
            "isAuthenticated": ctx.client.session().is_authenticated(),
            "sessionFile": ctx.session_file.display().to_string(),
            "loginRoute": LOGIN_ROUTE,
        })),
        Command::Projects(cmd) => run_projects(&ctx, cmd.command).await,
        Command::Skills(cmd) => run_skills(&ctx, cmd.command).await,
        Command::Upload { path } => {
            let image = ImageFile::from_path(&path)?;
            print_json(&ctx.guard.observe(upload::upload_image(&ctx.client, image).await)?)
        }
        Command::Blog(cmd) => match cmd.command {
            BlogSubcommand::List => print_json(&ctx.guard.observe(blog::list_blog_posts(&ctx.client).await)?),
            BlogSubcommand::Get { id } => {
                print_found(ctx.guard.observe(optional(blog::get_blog_post(&ctx.client, &id).await))?)
            }
        },
        Command::Contact(cmd) => match cmd.command {
            ContactSubcommand::Send { name, email, subject, message } => {
                let form = ContactForm { name, email, subject, message };
                print_json(&ctx.guard.observe(contact::submit_contact(&ctx.client, &form).await)?)
            }
            ContactSubcommand::List => {
                print_json(&ctx.guard.observe(contact::list_contact_messages(&ctx.client).await)?)
            }
        },
        Command::Notion { page_id, blocks } => {
            let page = if blocks {
                notion::get_notion_blocks(&ctx.client, &page_id).await
            } else {
                notion::get_notion_page(&ctx.client, &page_id).await
            };
            print_json(&ctx.guard.observe(page)?)
        }
    }
}

async fn run_projects(ctx: &CliContext, command: ProjectsSubcommand) -> Result<(), CliError> {
    let client = &ctx.client;
    match command {
        ProjectsSubcommand::List { featured, category, status } => {
            let filter = ProjectFilter { featured, category, status };
            print_json(&ctx.guard.observe(projects::list_projects(client, &filter).await)?)
        }
        ProjectsSubcommand::Get { id } => {
            print_found(ctx.guard.observe(optional(projects::get_project(client, &id).await))?)
        }
        ProjectsSubcommand::Create { data } => {
            let body: ProjectCreate = read_data(&data)?;
            print_json(&ctx.guard.observe(projects::create_project(client, &body).await)?)
        }
        ProjectsSubcommand::Update { id, data } => {
            let body: ProjectUpdate = read_data(&data)?;
            print_json(&ctx.guard.observe(projects::update_project(client, &id, &body).await)?)
        }
        ProjectsSubcommand::Delete { id } => {
            print_json(&ctx.guard.observe(projects::delete_project(client, &id).await)?)
        }
    }
}

async fn run_skills(ctx: &CliContext, command: SkillsSubcommand) -> Result<(), CliError> {
    let client = &ctx.client;
    match command {
        SkillsSubcommand::List { category } => {
            print_json(&ctx.guard.observe(skills::list_skills(client, category.as_deref()).await)?)
        }
        SkillsSubcommand::Get { id } => print_found(ctx.guard.observe(optional(skills::get_skill(client, id).await))?),
        SkillsSubcommand::Create { data } => {
            let body: SkillCreate = read_data(&data)?;
            print_json(&ctx.guard.observe(skills::create_skill(client, &body).await)?)
        }
        SkillsSubcommand::Bulk { data } => {
            let body: Vec<SkillCreate> = read_data(&data)?;
            print_json(&ctx.guard.observe(skills::create_skills_bulk(client, &body).await)?)
        }
        SkillsSubcommand::Update { id, data } => {
            let body: SkillUpdate = read_data(&data)?;
            print_json(&ctx.guard.observe(skills::update_skill(client, id, &body).await)?)
        }
        SkillsSubcommand::Delete { id } => print_json(&ctx.guard.observe(skills::delete_skill(client, id).await)?),
    }
}

impl From<CredentialArgs> for Credentials {
    fn from(args: CredentialArgs) -> Self {
        Self { username: args.username, password: args.password }
    }
}

/// Parse `--data`: inline JSON, or `@path` to read the JSON from a file.
fn read_data<T: DeserializeOwned>(data: &str) -> Result<T, CliError> {
    let text = match data.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).map_err(|source| CliError::ReadData { path: path.to_owned(), source })?,
        None => data.to_owned(),
    };
    Ok(serde_json::from_str(&text)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

fn print_found<T: Serialize>(value: Option<T>) -> Result<(), CliError> {
    match value {
        Some(value) => print_json(&value),
        None => Err(CliError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_data_accepts_inline_json() {
        let skill: SkillCreate = read_data(r#"{"name":"Rust","order":2}"#).unwrap();
        assert_eq!(skill.name, "Rust");
        assert_eq!(skill.order, 2);
    }

    #[test]
    fn read_data_reads_at_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skills.json");
        std::fs::write(&path, r#"[{"name":"Go"}]"#).unwrap();

        let skills: Vec<SkillCreate> = read_data(&format!("@{}", path.display())).unwrap();
        assert_eq!(skills.len(), 1);
    }

    #[test]
    fn read_data_missing_file_names_path() {
        let err = read_data::<SkillCreate>("@/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }

    #[test]
    fn login_prompt_guard_passes_unauthorized_through() {
        let guard: Guard = AuthGuard::new(prompt_login as fn(&str));
        let err = guard
            .observe::<()>(Err(ApiError::Unauthorized { detail: "expired".into() }))
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[test]
    fn print_found_none_is_not_found() {
        assert!(matches!(print_found::<u8>(None), Err(CliError::NotFound)));
    }

    #[test]
    fn cli_parses_project_list_flags() {
        let cli =
            Cli::try_parse_from(["folio", "--base-url", "http://x", "projects", "list", "--featured", "true"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Projects(ProjectsCommand { command: ProjectsSubcommand::List { featured: Some(true), .. } })
        ));
    }

    #[test]
    fn cli_parses_featured_false_and_absent() {
        let cli = Cli::try_parse_from(["folio", "projects", "list", "--featured", "false"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Projects(ProjectsCommand { command: ProjectsSubcommand::List { featured: Some(false), .. } })
        ));

        let cli = Cli::try_parse_from(["folio", "projects", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Projects(ProjectsCommand { command: ProjectsSubcommand::List { featured: None, .. } })
        ));
    }
}
