use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use voyage::config::{ClientConfig, ConfigError};
use voyage::net::{ApiClient, ApiError, ApiRequest, Credentials, Navigator};
use voyage::state::SessionStore;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("login failed; check username and password")]
    LoginFailed,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "voyage", about = "Cruise booking API client")]
struct Cli {
    #[arg(long, env = "VOYAGE_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the returned token.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "VOYAGE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Verify the stored session and print the current user.
    Check,
    /// End the session and forget the stored token.
    Logout,
    Api(ApiCommand),
}

#[derive(Args, Debug)]
struct ApiCommand {
    #[command(subcommand)]
    command: ApiSubcommand,
}

#[derive(Subcommand, Debug)]
enum ApiSubcommand {
    Get {
        path: String,
        #[arg(long, help = "Query parameters as a flat JSON object")]
        query: Option<String>,
    },
    Post {
        path: String,
        #[arg(long)]
        data: String,
    },
    Put {
        path: String,
        #[arg(long)]
        data: String,
    },
    Delete {
        path: String,
    },
}

/// A terminal has no page to navigate to; tell the user what to do instead.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect(&self, path: &str) {
        eprintln!("session rejected (login page: {path}); run `voyage login` to sign in again");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "no .env loaded");
    }

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_owned();
    }

    let client = Arc::new(
        ApiClient::builder(&config)
            .navigator(Arc::new(TerminalNavigator))
            .build()?,
    );

    match cli.command {
        Command::Login { username, password } => run_login(client, Credentials::new(username, password)).await,
        Command::Check => run_check(client).await,
        Command::Logout => run_logout(client).await,
        Command::Api(api) => run_api(&client, api).await,
    }
}

async fn run_login(client: Arc<ApiClient>, credentials: Credentials) -> Result<(), CliError> {
    let store = SessionStore::new(client);
    if !store.login(&credentials).await {
        return Err(CliError::LoginFailed);
    }
    print_session(&store)
}

async fn run_check(client: Arc<ApiClient>) -> Result<(), CliError> {
    let store = SessionStore::new(client);
    store.check_login_status().await;
    if !store.is_authenticated() {
        return Err(CliError::NotLoggedIn);
    }
    print_session(&store)
}

async fn run_logout(client: Arc<ApiClient>) -> Result<(), CliError> {
    let store = SessionStore::new(client);
    store.logout().await?;
    println!("logged out");
    Ok(())
}

fn print_session(store: &SessionStore<Arc<ApiClient>>) -> Result<(), CliError> {
    let rendered = serde_json::json!({
        "user": store.user(),
        "is_admin": store.is_admin(),
        "is_user": store.is_user(),
    });
    print_json(&rendered)
}

async fn run_api(client: &ApiClient, api: ApiCommand) -> Result<(), CliError> {
    let request = match api.command {
        ApiSubcommand::Get { path, query } => {
            let mut request = ApiRequest::get(path);
            if let Some(query) = query {
                request = request.with_query(serde_json::from_str(&query)?);
            }
            request
        }
        ApiSubcommand::Post { path, data } => ApiRequest::post(path, serde_json::from_str(&data)?),
        ApiSubcommand::Put { path, data } => ApiRequest::put(path, serde_json::from_str(&data)?),
        ApiSubcommand::Delete { path } => ApiRequest::delete(path),
    };

    let payload: Value = client.send_until(request, interrupted()).await?;
    print_json(&payload)
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
