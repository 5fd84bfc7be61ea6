use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::info;
use rainbox_anchors::JsonFileStore;
use rainbox_anchors_config::Config;

mod commands;
mod endpoint;

use commands::Shell;

#[derive(Parser, Debug)]
#[command(
    name = "rainbox-anchors",
    version,
    about = "Capture and re-render bookmarked passages of emails"
)]
struct Cli {
    /// Anchor store file, overriding `store_path` from the config file
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Print an email's HTML with its anchors painted in
    Render(RenderCmd),
    /// Bookmark the passage between two boundaries of an email
    Capture(CaptureCmd),
    /// List the anchors stored for an email
    List(ListCmd),
    /// Set or clear an anchor's annotation
    Annotate(AnnotateCmd),
    /// Add or remove labels on an anchor
    Label(LabelCmd),
    /// Delete an anchor
    Remove(RemoveCmd),
}

#[derive(Args, Debug)]
pub struct RenderCmd {
    /// HTML file holding the rendered email body
    pub email: PathBuf,
    #[arg(short, long)]
    pub document: String,
    /// Delete anchors that no longer resolve from the store
    #[arg(long)]
    pub evict: bool,
    /// Write the painted HTML here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CaptureCmd {
    pub email: PathBuf,
    #[arg(short, long)]
    pub document: String,
    /// Start boundary as PATH:OFFSET, e.g. 0.0:6
    #[arg(long)]
    pub start: String,
    /// End boundary as PATH:OFFSET
    #[arg(long)]
    pub end: String,
    #[arg(short, long)]
    pub annotation: Option<String>,
    #[arg(short, long = "label")]
    pub labels: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ListCmd {
    #[arg(short, long)]
    pub document: String,
    /// Print the stored records as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AnnotateCmd {
    pub id: String,
    #[arg(short, long)]
    pub document: String,
    /// New annotation; omit to clear it
    pub text: Option<String>,
}

#[derive(Args, Debug)]
pub struct LabelCmd {
    pub id: String,
    #[arg(short, long)]
    pub document: String,
    #[arg(long)]
    pub add: Vec<String>,
    #[arg(long)]
    pub remove: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RemoveCmd {
    pub id: String,
    #[arg(short, long)]
    pub document: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    info!("Config path: {}", Config::config_path().display());
    let mut config = Config::load()?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    info!("Anchor store: {}", config.store_path.display());

    let store = JsonFileStore::new(config.store_path.clone());
    let shell = Shell::new(&config.highlight, &store);
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        CliCommand::Render(cmd) => shell.render(&cmd, &mut stdout).await,
        CliCommand::Capture(cmd) => shell.capture(&cmd, &mut stdout).await,
        CliCommand::List(cmd) => shell.list(&cmd, &mut stdout).await,
        CliCommand::Annotate(cmd) => shell.annotate(&cmd).await,
        CliCommand::Label(cmd) => shell.label(&cmd).await,
        CliCommand::Remove(cmd) => shell.remove(&cmd).await,
    }
}
