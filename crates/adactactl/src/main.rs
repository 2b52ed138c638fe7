use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use adacta_client::inbox::inbox_source;
use adacta_client::{
    search_fetcher, ApiClient, ClientConfig, FileStore, HttpTransport, QueryComposer,
    RequestAuthenticator, SearchResults, SessionStore,
};
use adacta_core::api::ArchiveRequest;
use adacta_core::query::{DateRange, FilterFacets};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "adactactl", version, about = "Command-line client for the Adacta document server")]
struct Cli {
    /// Config file. Defaults to ~/.adacta/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server API base URL, e.g. http://127.0.0.1:8000/api
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Where the session credential is kept.
    #[arg(long, global = true)]
    session_file: Option<String>,

    #[arg(long, global = true)]
    debounce_ms: Option<u64>,

    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Whoami,
    /// Show documents awaiting review.
    Inbox {
        /// Keep polling and print every change until Ctrl-C.
        #[arg(long)]
        watch: bool,
    },
    Search {
        #[arg(long)]
        text: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Earliest upload date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Latest upload date (YYYY-MM-DD).
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Interactive search. Reads facet edits from stdin, one per line:
    /// `text <q>`, `tag <t>`, `untag <t>`, `from <date|->`, `to <date|->`, `clear`, `quit`.
    Browse,
    Bundle {
        #[command(subcommand)]
        bundle: BundleCmd,
    },
    /// Add a PDF to the inbox.
    Upload {
        pdf: PathBuf,
    },
    Document {
        id: String,
        /// Write to a file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Preview {
        id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Labels {
        /// Suggest labels for a document instead of listing all.
        #[arg(long)]
        guess: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum BundleCmd {
    Get {
        id: String,
    },
    /// Mark an inbox document as reviewed.
    Archive {
        id: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Metadata as key=value, repeatable.
        #[arg(long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,
    },
    Delete {
        id: String,
    },
}

fn parse_property(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if k.trim().is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((k.trim().to_string(), v.to_string()))
}

fn resolve_config(cli: &Cli) -> Result<ClientConfig> {
    let path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let mut cfg = match &cli.config {
        Some(path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load_or_default(&path)?,
    };
    if let Some(base_url) = &cli.base_url {
        cfg.base_url = base_url.clone();
    }
    if let Some(session_file) = &cli.session_file {
        cfg.session_file = session_file.clone();
    }
    if let Some(ms) = cli.debounce_ms {
        cfg.debounce_ms = ms;
    }
    if let Some(ms) = cli.poll_interval_ms {
        cfg.poll_interval_ms = ms;
    }
    cfg.validate().with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn write_bytes(bytes: Vec<u8>, out: Option<PathBuf>) -> Result<()> {
    match out {
        Some(path) => {
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("write {}", path.display()))?;
            info!("wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("write stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = resolve_config(&cli)?;

    let transport = Arc::new(HttpTransport::new(&cfg.base_url)?);
    let store = Arc::new(FileStore::new(cfg.session_path()));
    let session = Arc::new(
        SessionStore::open(store, transport.clone()).context("open session store")?,
    );
    let auth = RequestAuthenticator::new(transport, session.clone())
        .on_rejected(|| warn!("session expired; run `adactactl login` again"));
    let api = ApiClient::new(Arc::new(auth));

    match cli.cmd {
        Cmd::Login { username, password } => {
            let cred = session.login(&username, &password).await?;
            print_json(&serde_json::json!({ "username": cred.username }))?;
        }
        Cmd::Logout => {
            session.logout().await?;
        }
        Cmd::Whoami => {
            let cred = session.credential();
            print_json(&serde_json::json!({
                "authenticated": cred.is_authenticated(),
                "username": cred.username,
            }))?;
        }
        Cmd::Inbox { watch: false } => {
            print_json(&api.inbox().await?)?;
        }
        Cmd::Inbox { watch: true } => {
            watch_inbox(api, session, cfg.poll_interval()).await?;
        }
        Cmd::Search {
            text,
            tags,
            from,
            to,
        } => {
            let mut facets = FilterFacets::new();
            if let Some(text) = text {
                facets.set_text(text);
            }
            for tag in &tags {
                facets.add_tag(tag);
            }
            facets.set_uploaded(DateRange::new(from, to));
            let resp = api.search(&facets.combined_query()).await?;
            print_json(&SearchResults::from_response(resp))?;
        }
        Cmd::Browse => {
            browse(api, cfg.debounce()).await?;
        }
        Cmd::Bundle { bundle } => match bundle {
            BundleCmd::Get { id } => {
                print_json(&api.bundle(&id).await?)?;
            }
            BundleCmd::Archive {
                id,
                tags,
                properties,
            } => {
                let req = ArchiveRequest {
                    reviewed: Utc::now(),
                    tags,
                    properties: properties.into_iter().collect::<BTreeMap<_, _>>(),
                };
                api.archive(&id, &req).await?;
                info!("archived {id}");
            }
            BundleCmd::Delete { id } => {
                api.delete_bundle(&id).await?;
                info!("deleted {id}");
            }
        },
        Cmd::Upload { pdf } => {
            let bytes = tokio::fs::read(&pdf)
                .await
                .with_context(|| format!("read {}", pdf.display()))?;
            let uploaded = api.upload(bytes).await?;
            info!("uploaded {} as {}", pdf.display(), uploaded.id);
            print_json(&uploaded)?;
        }
        Cmd::Document { id, out } => {
            write_bytes(api.document(&id).await?, out).await?;
        }
        Cmd::Preview { id, out } => {
            write_bytes(api.preview(&id).await?, out).await?;
        }
        Cmd::Labels { guess: None } => {
            print_json(&api.labels().await?)?;
        }
        Cmd::Labels { guess: Some(id) } => {
            print_json(&api.guess_labels(&id).await?)?;
        }
    }

    Ok(())
}

async fn watch_inbox(api: ApiClient, session: Arc<SessionStore>, period: Duration) -> Result<()> {
    if !session.authenticated() {
        bail!("not logged in");
    }
    let source = inbox_source(api, session.clone(), period);
    let mut inbox = source.subscribe();
    let mut loading = source.subscribe_loading();
    let mut credential = session.subscribe();

    loop {
        tokio::select! {
            changed = inbox.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = inbox.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    print_json(&snapshot)?;
                }
            }
            changed = loading.changed() => {
                if changed.is_err() {
                    break;
                }
                let error = loading.borrow_and_update().error.clone();
                if let Some(error) = error {
                    warn!("inbox refresh failed: {}", error.message);
                }
            }
            changed = credential.changed() => {
                if changed.is_err() || !credential.borrow_and_update().is_authenticated() {
                    bail!("logged out; stopping");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("stopping");
                break;
            }
        }
    }
    Ok(())
}

async fn browse(api: ApiClient, debounce: Duration) -> Result<()> {
    let composer = QueryComposer::default();
    let fetcher = search_fetcher(api, &composer, debounce);
    let mut results = fetcher.subscribe();
    let mut loading = fetcher.subscribe_loading();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("read stdin")? else {
                    break;
                };
                match apply_edit(&composer, line.trim()) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => warn!("{e:#}"),
                }
            }
            changed = results.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = results.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    print_json(&snapshot)?;
                }
            }
            changed = loading.changed() => {
                if changed.is_err() {
                    break;
                }
                let error = loading.borrow_and_update().error.clone();
                if let Some(error) = error {
                    warn!("search failed: {}", error.message);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// Applies one facet edit. Returns false on `quit`.
fn apply_edit(composer: &QueryComposer, line: &str) -> Result<bool> {
    let (cmd, arg) = line
        .split_once(char::is_whitespace)
        .map(|(c, a)| (c, a.trim()))
        .unwrap_or((line, ""));
    match cmd {
        "" => {}
        "text" => {
            composer.set_text(arg);
        }
        "tag" => {
            composer.add_tag(arg);
        }
        "untag" => {
            composer.remove_tag(arg);
        }
        "from" => {
            let to = composer.facets().uploaded().to;
            composer.set_uploaded(DateRange::new(parse_bound(arg)?, to));
        }
        "to" => {
            let from = composer.facets().uploaded().from;
            composer.set_uploaded(DateRange::new(from, parse_bound(arg)?));
        }
        "clear" => {
            composer.clear();
        }
        "quit" | "exit" => return Ok(false),
        other => return Err(anyhow!("unknown command '{other}'")),
    }
    Ok(true)
}

fn parse_bound(arg: &str) -> Result<Option<NaiveDate>> {
    if arg.is_empty() || arg == "-" {
        return Ok(None);
    }
    let date = NaiveDate::parse_from_str(arg, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{arg}'"))?;
    Ok(Some(date))
}
