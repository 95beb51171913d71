//! dom-syringe command line tool
//!
//! Manages a catalog of copy items stored in a JSON file and runs them against live
//! pages in a Chrome instance.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dom_syringe::browser::{BrowserSession, ChromeHost, ConnectionOptions, LaunchOptions};
use dom_syringe::coordinator::menu_item_id;
use dom_syringe::dom::{extract_text, synthesize};
use dom_syringe::host::{MemoryClipboard, PageHost, RecordingMenu};
use dom_syringe::protocol::{Bus, Delivery, message_schema, response_schema};
use dom_syringe::store::{Catalog, CopyItem, EditTarget, JsonFileStore, MemoryStore, RecoveryStore, StoreArea};
use dom_syringe::{Clock, Coordinator, Locator, SyringeConfig, SystemClock};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dom-syringe")]
#[command(version)]
#[command(about = "Bind template variables to page elements and copy rendered results", long_about = None)]
struct Cli {
    /// Catalog file holding the copy items
    #[arg(long, short = 'c', value_name = "FILE", default_value = "copy-items.json", global = true)]
    catalog: PathBuf,

    /// Launch browser in headed mode (default: headless)
    #[arg(long, short = 'H', global = true)]
    headed: bool,

    /// Path to custom browser executable
    #[arg(long, value_name = "PATH", global = true)]
    executable_path: Option<PathBuf>,

    /// WebSocket endpoint URL of a running browser
    #[arg(long, value_name = "URL", global = true)]
    ws_endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the durable locator and current text of the element matching a CSS selector
    Locate {
        url: String,
        selector: String,
    },

    /// List the copy items in the catalog
    List,

    /// Add a copy item to the catalog
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        template: String,

        /// Variable binding, as name=selector; may be repeated
        #[arg(long = "var", value_name = "NAME=SELECTOR", value_parser = parse_binding)]
        variables: Vec<(String, String)>,
    },

    /// Render a copy item against a page and print the result
    Copy {
        /// Catalog position as shown by `list`
        index: usize,

        url: String,

        /// Print the HTML rendering instead of plain text
        #[arg(long)]
        html: bool,
    },

    /// Print the JSON schemas of the message protocol
    Schema,
}

fn parse_binding(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, selector)) if !name.trim().is_empty() && !selector.trim().is_empty() => {
            Ok((name.trim().to_string(), selector.trim().to_string()))
        }
        _ => Err(format!("expected NAME=SELECTOR, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Locate { url, selector } => locate(&cli, url, selector),
        Command::List => list(&cli.catalog).await,
        Command::Add {
            name,
            template,
            variables,
        } => add(&cli.catalog, name, template, variables).await,
        Command::Copy { index, url, html } => copy(&cli, *index, url, *html).await,
        Command::Schema => {
            let schemas = json!({
                "message": message_schema(),
                "response": response_schema(),
            });
            println!("{}", serde_json::to_string_pretty(&schemas)?);
            Ok(())
        }
    }
}

fn open_browser(cli: &Cli, url: &str) -> anyhow::Result<BrowserSession> {
    let session = match &cli.ws_endpoint {
        Some(endpoint) => BrowserSession::connect(ConnectionOptions::new(endpoint))?,
        None => {
            let mut options = LaunchOptions::new().headless(!cli.headed);
            if let Some(path) = &cli.executable_path {
                options = options.chrome_path(path);
            }
            BrowserSession::launch(options)?
        }
    };

    session.navigate(url)?;
    session.wait_for_navigation()?;
    log::info!("Loaded {}", url);
    Ok(session)
}

async fn open_catalog(path: &Path) -> anyhow::Result<Catalog> {
    let store = JsonFileStore::open(path, StoreArea::Sync)
        .await
        .with_context(|| format!("Failed to open catalog {}", path.display()))?;
    Ok(Catalog::new(Arc::new(store), Arc::new(SystemClock)))
}

fn locate(cli: &Cli, url: &str, selector: &str) -> anyhow::Result<()> {
    let config = SyringeConfig::default();
    let session = open_browser(cli, url)?;
    let tree = session.snapshot_dom()?;

    let Some(node) = tree.query_selector(selector)? else {
        bail!("No element matches '{}'", selector);
    };
    let result = json!({
        "selector": synthesize(&tree, node),
        "text": extract_text(&tree, Some(node), config.text_limit),
        "tagName": tree.tag_name(node).unwrap_or_default().to_lowercase(),
    });
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn list(path: &Path) -> anyhow::Result<()> {
    let items = open_catalog(path).await?.load().await?;
    if items.is_empty() {
        println!("No copy items yet");
    }
    for (index, item) in items.iter().enumerate() {
        println!("{:>3}  {}", index, item.display_name());
        for (name, locator) in &item.variables {
            println!("       {{{}}} = {}", name, locator);
        }
    }
    Ok(())
}

async fn add(path: &Path, name: &str, template: &str, variables: &[(String, String)]) -> anyhow::Result<()> {
    let catalog = open_catalog(path).await?;
    let mut item = CopyItem::new(SystemClock.now_millis())
        .with_name(name)
        .with_template(template);
    for (variable, selector) in variables {
        item.bind_variable(variable.as_str(), Locator::from(selector.as_str()));
    }

    let items = catalog.commit(&item, EditTarget::New).await?;
    println!("Saved '{}' at index {}", item.display_name(), items.len() - 1);
    Ok(())
}

async fn copy(cli: &Cli, index: usize, url: &str, html: bool) -> anyhow::Result<()> {
    let catalog = open_catalog(&cli.catalog).await?;
    let session = Arc::new(open_browser(cli, url)?);

    let config = SyringeConfig::default();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let recovery = RecoveryStore::new(Arc::new(MemoryStore::new(StoreArea::Local)), clock, &config);
    let bus = Bus::new();
    let host = Arc::new(ChromeHost::new(session, bus.clone(), recovery, config.clone()));
    let delivery = Delivery::new(Arc::new(bus.clone()), host.clone(), config);

    let clipboard = Arc::new(MemoryClipboard::new());
    let coordinator = Arc::new(Coordinator::new(
        catalog,
        delivery,
        Arc::new(RecordingMenu::new()),
        clipboard.clone(),
    ));
    let _handle = coordinator.start(&bus).await;

    let tab = host.active_tab().await.context("No active tab")?;
    let rendered = coordinator
        .on_menu_click(&menu_item_id(index), &tab)
        .await?
        .with_context(|| format!("No copy item at index {}", index))?;

    println!("{}", if html { rendered.html } else { rendered.plain });
    Ok(())
}
