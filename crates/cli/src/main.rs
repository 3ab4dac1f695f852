//! TabQueue CLI - Command-line interface for the TabQueue daemon

mod rpc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rpc::{RpcClient, RpcError};
use serde_json::{json, Map, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9627";

#[derive(Parser)]
#[command(name = "tabqueue")]
#[command(about = "TabQueue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "TABQUEUE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show window queues and saved queues
    List {
        /// Only this window's queue
        #[arg(short, long)]
        window: Option<i64>,
    },

    /// Add a link to a window queue
    Enqueue {
        window: i64,
        url: String,
        #[arg(short, long, default_value = "")]
        title: String,
    },

    /// Open a queued item as a tab
    Dequeue {
        window: i64,
        index: usize,
        /// Focus the new tab
        #[arg(short, long)]
        activate: bool,
        /// Leave the item in the queue
        #[arg(short, long)]
        keep: bool,
        /// Tab position: rightmost or rightnext
        #[arg(short, long, default_value = "rightmost")]
        position: String,
    },

    /// Delete a queued item
    Remove { window: i64, index: usize },

    /// Lock a queued item or a saved queue
    Lock(LockTarget),

    /// Unlock a queued item or a saved queue
    Unlock(LockTarget),

    /// Move a window queue into a saved queue
    Save { window: i64 },

    /// Move every window queue into saved queues
    SaveAll,

    /// Append a saved queue to a window queue
    Deploy {
        key: String,
        window: i64,
        /// Keep the saved queue after deploying
        #[arg(short, long)]
        keep: bool,
    },

    /// Rename a saved queue
    Rename { key: String, name: String },

    /// Delete a saved queue
    DropSaved { key: String },

    /// Show or change configuration
    Config {
        /// Window-specific layer instead of the shared one
        #[arg(short, long)]
        window: Option<i64>,
        /// Override to store (repeatable), e.g. --set upper_limit_value=20
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        set: Vec<String>,
    },

    /// Show browser windows and tabs
    Windows,

    /// Open an empty browser window
    OpenWindow,

    /// Open a tab in a window
    OpenTab {
        window: i64,
        url: String,
        #[arg(short, long, default_value = "")]
        title: String,
    },

    /// Close a tab
    CloseTab { tab: i64 },

    /// Close a window with all of its tabs
    CloseWindow { window: i64 },

    /// Queue a tab (closing it if configured)
    SendTab { tab: i64 },

    /// Queue every tab of a window, then close it
    SendWindow { window: i64 },

    /// Queue a link without opening it
    SendLink {
        window: i64,
        url: String,
        #[arg(short, long, default_value = "")]
        title: String,
    },
}

#[derive(Args)]
struct LockTarget {
    #[arg(required_unless_present = "saved", requires = "index")]
    window: Option<i64>,
    index: Option<usize>,
    /// Saved queue key
    #[arg(long, conflicts_with_all = ["window", "index"])]
    saved: Option<String>,
}

#[derive(Tabled)]
struct ItemRow {
    window: i64,
    index: usize,
    locked: String,
    title: String,
    url: String,
}

#[derive(Tabled)]
struct SavedRow {
    key: String,
    name: String,
    items: usize,
    locked: String,
}

#[derive(Tabled)]
struct TabRow {
    window: i64,
    tab: i64,
    index: u64,
    active: String,
    status: String,
    url: String,
}

fn flag(value: &Value) -> String {
    if value.as_bool().unwrap_or(false) {
        "yes".to_string()
    } else {
        String::new()
    }
}

fn text(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}

fn item_rows(window_queues: &[Value], only: Option<i64>) -> Vec<ItemRow> {
    window_queues
        .iter()
        .filter(|queue| only.is_none() || queue["windowId"].as_i64() == only)
        .flat_map(|queue| {
            let window = queue["windowId"].as_i64().unwrap_or_default();
            queue["items"]
                .as_array()
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(move |(index, item)| ItemRow {
                    window,
                    index,
                    locked: flag(&item["locked"]),
                    title: text(&item["title"]),
                    url: text(&item["url"]),
                })
        })
        .collect()
}

fn saved_rows(saved_queues: &[Value]) -> Vec<SavedRow> {
    saved_queues
        .iter()
        .map(|queue| SavedRow {
            key: text(&queue["key"]),
            name: text(&queue["name"]),
            items: queue["items"].as_array().map_or(0, Vec::len),
            locked: flag(&queue["locked"]),
        })
        .collect()
}

fn tab_rows(windows: &[Value]) -> Vec<TabRow> {
    windows
        .iter()
        .flat_map(|window| {
            let window_id = window["id"].as_i64().unwrap_or_default();
            window["tabs"]
                .as_array()
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .map(move |tab| TabRow {
                    window: window_id,
                    tab: tab["id"].as_i64().unwrap_or_default(),
                    index: tab["index"].as_u64().unwrap_or_default(),
                    active: flag(&tab["active"]),
                    status: text(&tab["status"]),
                    url: text(&tab["url"]),
                })
        })
        .collect()
}

/// Parse `field=value`; the value is JSON when it parses, a string otherwise
fn parse_assignment(assignment: &str) -> Result<(String, Value)> {
    let (field, raw) = assignment
        .split_once('=')
        .with_context(|| format!("Expected FIELD=VALUE, got '{}'", assignment))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((field.trim().to_string(), value))
}

fn array(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or_default()
}

fn success(message: impl AsRef<str>) {
    println!("{}", format!("✓ {}", message.as_ref()).green().bold());
}

async fn set_lock(client: &RpcClient, target: LockTarget, locked: bool) -> Result<()> {
    let verb = if locked { "Locked" } else { "Unlocked" };
    match (target.saved, target.window, target.index) {
        (Some(key), _, _) => {
            let result = client
                .call(
                    "saved.set",
                    json!({"key": key, "patch": {"locked": locked}}),
                )
                .await?;
            if result["changed"].as_bool().unwrap_or(false) {
                success(format!("{} saved queue {}", verb, key));
            } else {
                println!("{}", format!("No saved queue {}", key).yellow());
            }
        }
        (None, Some(window), Some(index)) => {
            client
                .call(
                    "queues.set_item",
                    json!({"window_id": window, "index": index, "patch": {"locked": locked}}),
                )
                .await?;
            success(format!("{} item {} of window {}", verb, index, window));
        }
        _ => anyhow::bail!("Give WINDOW INDEX or --saved KEY"),
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let client = RpcClient::new(cli.rpc_url);

    match cli.command {
        Commands::List { window } => {
            let result = client.call("queues.list", json!({})).await?;

            let items = item_rows(array(&result["window_queues"]), window);
            println!("{}", "Window queues".cyan().bold());
            if items.is_empty() {
                println!("{}", "  (empty)".dimmed());
            } else {
                println!("{}", Table::new(items));
            }

            if window.is_none() {
                println!();
                let saved = saved_rows(array(&result["saved_queues"]));
                println!("{}", "Saved queues".cyan().bold());
                if saved.is_empty() {
                    println!("{}", "  (empty)".dimmed());
                } else {
                    println!("{}", Table::new(saved));
                }
            }
        }

        Commands::Enqueue { window, url, title } => {
            let result = client
                .call(
                    "queues.enqueue",
                    json!({"window_id": window, "items": [{"url": url, "title": title}]}),
                )
                .await?;
            match result["inserted"].as_u64().unwrap_or(0) {
                0 => println!("{}", "Already queued (duplicate skipped)".yellow()),
                _ => success(format!("Queued {} in window {}", url, window)),
            }
        }

        Commands::Dequeue {
            window,
            index,
            activate,
            keep,
            position,
        } => {
            let result = client
                .call(
                    "queues.dequeue",
                    json!({
                        "window_id": window,
                        "index": index,
                        "options": {"active": activate, "delete": !keep, "position": position},
                    }),
                )
                .await?;
            success(format!(
                "Opened tab {} at index {}",
                result["tab"]["id"], result["tab"]["index"]
            ));
        }

        Commands::Remove { window, index } => {
            let result = client
                .call(
                    "queues.remove_item",
                    json!({"window_id": window, "index": index}),
                )
                .await?;
            success(format!("Removed {}", text(&result["item"]["url"])));
        }

        Commands::Lock(target) => set_lock(&client, target, true).await?,

        Commands::Unlock(target) => set_lock(&client, target, false).await?,

        Commands::Save { window } => {
            let result = client
                .call("queues.save_window", json!({"window_id": window}))
                .await?;
            match result["key"].as_str() {
                Some(key) => success(format!("Saved window {} as {}", window, key)),
                None => println!("{}", format!("Window {} has no queue", window).yellow()),
            }
        }

        Commands::SaveAll => {
            let result = client.call("queues.save_all", json!({})).await?;
            success(format!("Saved {} window queues", array(&result["keys"]).len()));
        }

        Commands::Deploy { key, window, keep } => {
            let result = client
                .call(
                    "saved.deploy",
                    json!({"key": key, "window_id": window, "options": {"delete": !keep}}),
                )
                .await?;
            success(format!(
                "Deployed {} items into window {}",
                result["inserted"], window
            ));
        }

        Commands::Rename { key, name } => {
            let result = client
                .call("saved.rename", json!({"key": key, "name": name}))
                .await?;
            if result["changed"].as_bool().unwrap_or(false) {
                success(format!("Renamed {} to {}", key, name));
            } else {
                println!("{}", format!("No saved queue {}", key).yellow());
            }
        }

        Commands::DropSaved { key } => {
            let result = client.call("saved.remove", json!({"key": key})).await?;
            if result["changed"].as_bool().unwrap_or(false) {
                success(format!("Dropped saved queue {}", key));
            } else {
                println!("{}", format!("No saved queue {}", key).yellow());
            }
        }

        Commands::Config { window, set } => {
            if set.is_empty() {
                let result = client
                    .call("config.get", json!({"window_id": window}))
                    .await?;
                println!("{}", "Effective configuration".cyan().bold());
                println!("{}", serde_json::to_string_pretty(&result["effective"])?);
            } else {
                // Merge onto the stored layer so unrelated overrides survive
                let current = client
                    .call("config.get", json!({"window_id": window}))
                    .await?;
                let layer = match window {
                    Some(_) => &current["window"],
                    None => &current["shared"],
                };
                let mut overrides: Map<String, Value> =
                    layer.as_object().cloned().unwrap_or_default();
                for assignment in &set {
                    let (field, value) = parse_assignment(assignment)?;
                    overrides.insert(field, value);
                }

                let result = match window {
                    Some(window_id) => {
                        client
                            .call(
                                "config.set_window",
                                json!({"window_id": window_id, "config": overrides}),
                            )
                            .await?
                    }
                    None => {
                        client
                            .call("config.set_shared", json!({"config": overrides}))
                            .await?
                    }
                };
                success("Configuration saved");
                println!("{}", serde_json::to_string_pretty(&result["effective"])?);
            }
        }

        Commands::Windows => {
            let result = client.call("browser.windows", json!({})).await?;
            let rows = tab_rows(array(&result["windows"]));
            if rows.is_empty() {
                println!("{}", "No open tabs".dimmed());
            } else {
                println!("{}", Table::new(rows));
            }
        }

        Commands::OpenWindow => {
            let result = client.call("browser.open_window", json!({})).await?;
            success(format!("Opened window {}", result["window_id"]));
        }

        Commands::OpenTab { window, url, title } => {
            let result = client
                .call(
                    "browser.open_tab",
                    json!({"window_id": window, "url": url, "title": title}),
                )
                .await?;
            success(format!("Opened tab {}", result["tab"]["id"]));
        }

        Commands::CloseTab { tab } => {
            client
                .call("browser.close_tab", json!({"tab_id": tab}))
                .await?;
            success(format!("Closed tab {}", tab));
        }

        Commands::CloseWindow { window } => {
            client
                .call("browser.close_window", json!({"window_id": window}))
                .await?;
            success(format!("Closed window {}", window));
        }

        Commands::SendTab { tab } => {
            client
                .call("browser.send_tab", json!({"tab_id": tab}))
                .await?;
            success(format!("Sent tab {} to its queue", tab));
        }

        Commands::SendWindow { window } => {
            let result = client
                .call("browser.send_window", json!({"window_id": window}))
                .await?;
            success(format!(
                "Queued {} tabs and closed window {}",
                result["inserted"], window
            ));
        }

        Commands::SendLink { window, url, title } => {
            let result = client
                .call(
                    "browser.send_link",
                    json!({"window_id": window, "url": url, "title": title}),
                )
                .await?;
            match result["inserted"].as_u64().unwrap_or(0) {
                0 => println!("{}", "Already queued (duplicate skipped)".yellow()),
                _ => success(format!("Queued {} in window {}", url, window)),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<RpcError>() {
            Some(rpc_error) => eprintln!("{}", rpc_error.to_string().red().bold()),
            None => eprintln!("{} {:#}", "Error:".red().bold(), e),
        }
        std::process::exit(1);
    }
}
