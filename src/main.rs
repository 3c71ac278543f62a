use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use eventhub::app::{App, Screen};
use eventhub::backend::supabase::SupabaseBackend;
use eventhub::backend::{Backend, BackendError};
use eventhub::config::{AppConfig, ConfigError};
use eventhub::pages::auth::AuthPage;
use eventhub::pages::dashboard::{CreateOutcome, DashboardPage, DashboardView, EventFormError, RegisterOutcome};
use eventhub::routes::ROOT_PATH;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_LOG_FILTER: &str = "eventhub=warn";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("not signed in; run `eventhub sign-in` first")]
    NotSignedIn,
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Form(#[from] EventFormError),
    #[error("only admins can view registrants")]
    AdminOnly,
    #[error("the backend rejected the event")]
    EventRejected,
    #[error("registration failed")]
    RegistrationFailed,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "eventhub", about = "College Event Hub client")]
struct Cli {
    /// Where the signed-in session is kept between runs.
    #[arg(long, env = "EVENTHUB_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    SignIn(Credentials),
    Register(Credentials),
    SignOut,
    Whoami,
    Dashboard,
    Events(EventsCommand),
}

#[derive(Args, Debug)]
struct Credentials {
    #[arg(long)]
    email: String,
    #[arg(long, env = "EVENTHUB_PASSWORD")]
    password: String,
}

#[derive(Args, Debug)]
struct EventsCommand {
    #[command(subcommand)]
    command: EventsSubcommand,
}

#[derive(Subcommand, Debug)]
enum EventsSubcommand {
    List,
    Create(NewEventArgs),
    Participants { event_id: Uuid },
    Register { event_id: Uuid },
}

#[derive(Args, Debug)]
struct NewEventArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    event_type: String,
    #[arg(long)]
    description: String,
    /// `YYYY-MM-DDTHH:MM`, UTC.
    #[arg(long)]
    start: String,
    #[arg(long)]
    end: String,
    #[arg(long)]
    location: String,
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    max_participants: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(path) = cli.session_file {
        config.session_file = path;
    }

    let backend: Arc<dyn Backend> = Arc::new(SupabaseBackend::new(&config)?);
    let mut app = App::new(backend).with_community(config.community_id);
    app.ready().await;

    let result = run(&mut app, cli.command).await;
    app.shutdown().await;
    result
}

async fn run(app: &mut App, command: Command) -> Result<(), CliError> {
    match command {
        Command::SignIn(creds) => run_auth(app, creds, false).await,
        Command::Register(creds) => run_auth(app, creds, true).await,
        Command::SignOut => {
            app.backend().sign_out().await?;
            println!("signed out");
            Ok(())
        }
        Command::Whoami => {
            let page = dashboard(app).await?;
            let email = page.user().email.as_deref().unwrap_or("unknown");
            println!("{email} ({})", page.role());
            Ok(())
        }
        Command::Dashboard => {
            let page = dashboard(app).await?;
            print!("{}", page.render());
            Ok(())
        }
        Command::Events(events) => run_events(app, events).await,
    }
}

async fn run_auth(app: &mut App, creds: Credentials, register: bool) -> Result<(), CliError> {
    let mut page = AuthPage::new(app.backend());
    if register {
        page.toggle_mode();
    }
    page.set_email(creds.email);
    page.set_password(creds.password);

    let Some(next) = page.submit().await else {
        let message = page.error().unwrap_or("sign-up returned no user");
        return Err(CliError::Rejected(message.to_owned()));
    };
    app.navigate(next);

    match app.backend().get_session().await? {
        Some(session) => println!("signed in as {}", session.user.email.as_deref().unwrap_or("unknown")),
        None => println!("registered; confirm your email, then sign in"),
    }
    Ok(())
}

async fn run_events(app: &mut App, events: EventsCommand) -> Result<(), CliError> {
    let mut page = dashboard(app).await?;
    match events.command {
        EventsSubcommand::List => print_json(&page.events()),
        EventsSubcommand::Create(args) => {
            page.toggle_event_form();
            page.form.title = args.title;
            page.form.event_type = args.event_type;
            page.form.description = args.description;
            page.form.start_date = args.start;
            page.form.end_date = args.end;
            page.form.location = args.location;
            page.form.max_participants = args.max_participants;
            match page.create_event().await? {
                CreateOutcome::Created => print_json(&page.events()),
                CreateOutcome::Rejected => Err(CliError::EventRejected),
            }
        }
        EventsSubcommand::Participants { event_id } => {
            if page.view() != DashboardView::Management {
                return Err(CliError::AdminOnly);
            }
            page.fetch_participants(event_id).await;
            for p in page.participants() {
                println!("{}\t{}", p.display_name(), eventhub::records::format_date(p.registered_at));
            }
            Ok(())
        }
        EventsSubcommand::Register { event_id } => match page.register(event_id).await {
            RegisterOutcome::Registered => {
                println!("registered");
                Ok(())
            }
            RegisterOutcome::AlreadyRegistered | RegisterOutcome::Duplicate => {
                println!("already registered");
                Ok(())
            }
            RegisterOutcome::Failed => Err(CliError::RegistrationFailed),
        },
    }
}

/// Resolve the protected root path, or fail if the guard redirects.
async fn dashboard(app: &mut App) -> Result<Box<DashboardPage>, CliError> {
    app.navigate(ROOT_PATH);
    match app.screen().await {
        Screen::Dashboard(page) => Ok(page),
        Screen::Auth(_) | Screen::Loading => Err(CliError::NotSignedIn),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
