use crate::vault::ViewMode;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "apivault", version, about = "Local API key vault with token-gated HTTP access")]
pub struct Cli {
    /// Config file (JSON, JSON5, YAML or TOML).
    #[arg(short, long, global = true, env = "APIVAULT_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the external access service until interrupted.
    Serve(ServeOpts),
    #[command(subcommand)]
    Key(KeyAction),
    #[command(subcommand)]
    Category(CategoryAction),
    #[command(subcommand)]
    View(ViewAction),
    #[command(subcommand)]
    Token(TokenAction),
    #[command(subcommand)]
    Config(ConfigAction),
    /// Fill the vault with sample categories and keys.
    Demo,
    Version,
}

#[derive(clap::Args)]
pub struct ServeOpts {
    /// Start the port search here instead of the saved/configured port.
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Issue a fresh token and print it before serving.
    #[arg(long)]
    pub issue_token: bool,
}

#[derive(Subcommand)]
pub enum KeyAction {
    /// Store a secret; the value is read from stdin when `--value` is absent.
    Set {
        name: String,
        #[arg(long)]
        value: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    Get {
        name: String,
    },
    List {
        #[arg(long)]
        category: Option<String>,
    },
    Delete {
        name: String,
    },
    /// Move a key into a category, or out of all categories.
    Move {
        name: String,
        #[arg(long)]
        category: Option<String>,
    },
    Order {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum CategoryAction {
    Create {
        name: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    Style {
        name: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    Delete {
        name: String,
    },
    Toggle {
        name: String,
    },
    List,
    /// Replace the category order; categories not named are dropped.
    Order {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ViewAction {
    Show,
    Set {
        #[arg(long)]
        mode: Option<ViewMode>,
        #[arg(long)]
        compact: Option<bool>,
    },
}

#[derive(Subcommand)]
pub enum TokenAction {
    Generate,
    List,
    Revoke { token: String },
    RevokeAll,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Validate,
    Init,
}
