use anyhow::Context;
use apivault::app::VaultContext;
use apivault::cli::{
    CategoryAction, Cli, Commands, ConfigAction, KeyAction, ServeOpts, TokenAction, ViewAction,
};
use apivault::config::Config;
use apivault::vault::ViewStatePatch;
use apivault::{demo, logging};
use clap::Parser;
use std::io::Read;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Version => {
            println!("apivault {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Config(ConfigAction::Init) => {
            let path = config_path.unwrap_or("apivault.json");
            Config::write_default(path)?;
            println!("Wrote default configuration to {path}");
        }
        Commands::Config(action) => {
            let config = Config::load(config_path)?;
            logging::init(&config.logging);
            match action {
                ConfigAction::Show => println!("{}", serde_json::to_string_pretty(&config)?),
                ConfigAction::Validate => println!("Configuration is valid"),
                ConfigAction::Init => {}
            }
        }
        command => {
            let config = Config::load(config_path)?;
            logging::init(&config.logging);
            let ctx = VaultContext::open(config).await?;
            run(&ctx, command).await?;
        }
    }

    Ok(())
}

async fn run(ctx: &VaultContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve(opts) => serve(ctx, opts).await?,
        Commands::Key(action) => key(ctx, action).await?,
        Commands::Category(action) => category(ctx, action).await?,
        Commands::View(action) => view(ctx, action).await?,
        Commands::Token(action) => token(ctx, action).await?,
        Commands::Demo => {
            demo::populate_demo_data(&ctx.store).await?;
            println!("Demo data populated successfully!");
        }
        Commands::Config(_) | Commands::Version => {}
    }
    Ok(())
}

// ============================================================================
// Serve
// ============================================================================

async fn serve(ctx: &VaultContext, opts: ServeOpts) -> anyhow::Result<()> {
    if opts.issue_token {
        let token = ctx.tokens.generate_token().await?;
        println!("Access token: {}", token.token);
    } else if ctx.tokens.list_tokens().await.is_empty() {
        warn!("No access tokens exist; run `apivault token generate` to create one");
    }

    let service = ctx.external_access();
    let handle = match opts.port {
        Some(port) => service.start_on(None, port).await?,
        None => service.start(None).await?,
    };
    println!("External access listening on http://{}", handle.addr());

    shutdown_signal().await;
    handle.stop().await;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}

// ============================================================================
// Keys and Categories
// ============================================================================

async fn key(ctx: &VaultContext, action: KeyAction) -> anyhow::Result<()> {
    match action {
        KeyAction::Set {
            name,
            value,
            category,
        } => {
            let value = match value {
                Some(value) => value,
                None => read_stdin_value()?,
            };
            ctx.store
                .store_key(&name, &value, category.as_deref())
                .await?;
            println!("Stored {name}");
        }
        KeyAction::Get { name } => println!("{}", ctx.store.require_value(&name).await?),
        KeyAction::List { category } => {
            for key in ctx.store.list_keys_in_category(category.as_deref()).await? {
                match key.category {
                    Some(category) => println!("{}\t{}", key.name, category),
                    None => println!("{}", key.name),
                }
            }
        }
        KeyAction::Delete { name } => ctx.store.delete_key(&name).await?,
        KeyAction::Move { name, category } => {
            ctx.store
                .update_key_category(&name, category.as_deref())
                .await?
        }
        KeyAction::Order { names } => ctx.store.update_key_order(&names).await?,
    }
    Ok(())
}

fn read_stdin_value() -> anyhow::Result<String> {
    let mut value = String::new();
    std::io::stdin()
        .read_to_string(&mut value)
        .context("Failed to read secret value from stdin")?;
    Ok(value.trim_end_matches(['\r', '\n']).to_string())
}

async fn category(ctx: &VaultContext, action: CategoryAction) -> anyhow::Result<()> {
    match action {
        CategoryAction::Create { name, icon, color } => {
            ctx.store
                .create_category(&name, icon.as_deref(), color.as_deref())
                .await?
        }
        CategoryAction::Style { name, icon, color } => {
            ctx.store
                .update_category_style(&name, icon.as_deref(), color.as_deref())
                .await?
        }
        CategoryAction::Delete { name } => ctx.store.delete_category(&name).await?,
        CategoryAction::Toggle { name } => ctx.store.toggle_category(&name).await?,
        CategoryAction::List => {
            for category in ctx.store.list_categories().await? {
                let marker = if category.expanded { "-" } else { "+" };
                println!("{} {} ({})", marker, category.name, category.order);
            }
        }
        CategoryAction::Order { names } => ctx.store.update_category_order(&names).await?,
    }
    Ok(())
}

async fn view(ctx: &VaultContext, action: ViewAction) -> anyhow::Result<()> {
    let state = match action {
        ViewAction::Show => ctx.store.view_state().await?,
        ViewAction::Set { mode, compact } => {
            ctx.store
                .update_view_state(ViewStatePatch { mode, compact })
                .await?
        }
    };
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

// ============================================================================
// Tokens
// ============================================================================

async fn token(ctx: &VaultContext, action: TokenAction) -> anyhow::Result<()> {
    match action {
        TokenAction::Generate => {
            let token = ctx.tokens.generate_token().await?;
            println!("{}", token.token);
        }
        TokenAction::List => {
            for token in ctx.tokens.list_tokens().await {
                let expiry = if token.never_expires() {
                    "never".to_string()
                } else {
                    chrono::DateTime::from_timestamp_millis(token.expires_at)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| token.expires_at.to_string())
                };
                println!("{}\texpires: {}", token.fingerprint(), expiry);
            }
        }
        TokenAction::Revoke { token } => {
            if ctx.tokens.revoke_token(&token).await? {
                println!("Token revoked");
            } else {
                println!("Token not found");
            }
        }
        TokenAction::RevokeAll => {
            let count = ctx.tokens.revoke_all().await?;
            println!("Revoked {count} token(s)");
        }
    }
    Ok(())
}
