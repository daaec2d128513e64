use std::fs;
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use commons::auth::TokenGenerator;
use commons::cache::IdentityCache;
use commons::config::ServerConfig;
use commons::index::{self, CommunityIndex};
use commons::notify::Notifier;
use commons::server::{AppState, create_router};
use commons::store::{SqliteStore, Store};
use commons::types::{Token, User};

const ADMIN_TOKEN_FILE: &str = ".admin_token";

#[derive(Parser)]
#[command(name = "commons")]
#[command(about = "A communities and membership server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Reject group-subject membership operations
        #[arg(long)]
        disable_groups: bool,

        /// Lifetime in seconds of cached identity→community lookups
        #[arg(long, default_value = "300")]
        cache_ttl: u64,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and admin token)
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },
}

fn mint_token(
    generator: &TokenGenerator,
    is_admin: bool,
    user_id: Option<String>,
) -> anyhow::Result<(Token, String)> {
    let (raw_token, lookup, hash) = generator.generate()?;
    let token = Token {
        id: Uuid::new_v4().to_string(),
        token_hash: hash,
        token_lookup: lookup,
        is_admin,
        user_id,
        created_at: Utc::now(),
        expires_at: None,
        last_used_at: None,
    };
    Ok((token, raw_token))
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

fn print_token_banner(heading: &str, raw_token: &str) {
    println!();
    println!("========================================");
    println!("{heading}");
    println!();
    println!("  {raw_token}");
    println!();
    println!("========================================");
    println!();
}

fn run_init(data_dir: String, non_interactive: bool) -> anyhow::Result<()> {
    let data_path: std::path::PathBuf = data_dir.into();
    fs::create_dir_all(&data_path)?;

    let store = SqliteStore::new(data_path.join("commons.db"))?;
    store.initialize()?;

    let token_file = data_path.join(ADMIN_TOKEN_FILE);

    if store.has_admin_token()? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let generator = TokenGenerator::new();
    let (token, raw_token) = mint_token(&generator, true, None)?;

    store.create_token(&token)?;
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    print_token_banner(
        "Admin token (save this, it won't be shown again):",
        &raw_token,
    );
    println!("Token also written to: {}", token_file.display());

    if !non_interactive {
        create_default_user_prompt(&store, &generator)?;
    }

    Ok(())
}

fn create_default_user_prompt(
    store: &SqliteStore,
    generator: &TokenGenerator,
) -> anyhow::Result<()> {
    let create_user = inquire::Confirm::new("Would you like to create a default user?")
        .with_default(false)
        .prompt()?;

    if !create_user {
        return Ok(());
    }

    let username = inquire::Text::new("Username:")
        .with_validator(|input: &str| {
            if input.trim().is_empty() {
                Err("Username cannot be empty".into())
            } else if input.contains(char::is_whitespace) {
                Err("Username cannot contain whitespace".into())
            } else {
                Ok(inquire::validator::Validation::Valid)
            }
        })
        .prompt()?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.clone(),
        display_name: username.clone(),
        revision: 1,
        created_at: now,
        updated_at: now,
    };
    store.create_user(&user)?;

    let (user_token, raw_token) = mint_token(generator, false, Some(user.id))?;
    store.create_token(&user_token)?;

    print_token_banner(&format!("Created user '{username}' with token:"), &raw_token);

    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    let token_file = config.data_dir.join(ADMIN_TOKEN_FILE);
    if !token_file.exists() {
        bail!(
            "Server not initialized. Run 'commons admin init' first to create the database and admin token."
        );
    }

    let store = SqliteStore::new(config.db_path())?;
    if !store.has_admin_token()? {
        bail!(
            "Server not initialized. Run 'commons admin init' first to create the database and admin token."
        );
    }

    info!("Admin token available at {}", token_file.display());

    let community_index = Arc::new(CommunityIndex::new());
    let projected = index::rebuild(&store, community_index.as_ref())?;
    info!("Projected {projected} communities into the search index");

    let state = Arc::new(AppState {
        store: Arc::new(store),
        index: community_index,
        identity_cache: IdentityCache::new(config.cache_ttl()),
        notifier: Notifier::default(),
        groups_enabled: config.groups_enabled,
    });

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("commons=info".parse()?))
        .init();

    match Cli::parse().command {
        Commands::Admin {
            command:
                AdminCommands::Init {
                    data_dir,
                    non_interactive,
                },
        } => run_init(data_dir, non_interactive),
        Commands::Serve {
            host,
            port,
            data_dir,
            disable_groups,
            cache_ttl,
        } => {
            run_serve(ServerConfig {
                host,
                port,
                data_dir: data_dir.into(),
                groups_enabled: !disable_groups,
                cache_ttl_secs: cache_ttl,
            })
            .await
        }
    }
}
