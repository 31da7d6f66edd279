//! Point d'entrée de Modalbrows : shell sans affichage.
//!
//! Usage :
//!   modalbrows [URL] [--config PATH] [--check-url URL]...
//!
//! Chaque ligne de l'entrée standard est une séquence de touches (`gg`,
//! `5j`, `<C-d>`, `:open example.com<Return>`), ou une directive :
//!   !sleep MS    → attend MS millisecondes (laisse expirer les bindings ambigus)
//!   !url URI     → affiche la décision du filtre réseau pour URI
//!
//! Exemples :
//!   cargo run -- --check-url https://ads.example.com/banner.js
//!   printf 'gg\n5j\nZQ\n' | cargo run -- wikipedia.org

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use modalbrows::command::Commands;
use modalbrows::config::Config;
use modalbrows::host::LoggingHost;
use modalbrows::keys::KeySequence;
use modalbrows::mode::KeyPress;
use modalbrows::privacy::RequestFilter;
use modalbrows::shell::Shell;

#[derive(Debug, Parser)]
#[command(name = "modalbrows", version, about = "Modal keyboard-driven browser shell")]
struct Args {
    /// Page initiale (un domaine nu reçoit `https://`, le reste part en recherche).
    url: Option<String>,

    /// Fichier de configuration TOML.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Attend la fin du chargement des listes, affiche la décision pour
    /// chaque URL puis quitte.
    #[arg(long = "check-url", value_name = "URL")]
    check_url: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // ── 1. Configuration ───────────────────────────────────────────────
    // Le niveau vient de la config : un subscriber provisoire (RUST_LOG ou
    // `info`) couvre le chargement pour que ses warn! ne soient pas perdus.
    let provisional = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    let config = tracing::subscriber::with_default(provisional, || {
        Config::load(args.config.as_deref())
    });

    // ── 2. Logging / Tracing ───────────────────────────────────────────
    // RUST_LOG prioritaire, sinon `[logging] level`.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid [logging] level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ── 3. Mode vérification d'URL ─────────────────────────────────────
    if !args.check_url.is_empty() {
        return check_urls(&config, &args.check_url).await;
    }

    // ── 4. Hôte et machine modale ──────────────────────────────────────
    let initial = args
        .url
        .as_deref()
        .and_then(|input| Commands::new(config.search.engine_url.as_str()).resolve_input(input));
    let host = Arc::new(LoggingHost::new(initial));
    let Shell {
        machine,
        dispatcher,
        filter,
        ..
    } = Shell::start(&config, host.clone());

    let (keys_tx, keys_rx) = mpsc::channel(1);
    let mut last_line = String::new();
    let pump = tokio::spawn(machine.run(keys_rx, move |state| {
        let line = state.status_line();
        if line != last_line {
            println!("{line}");
            last_line = line;
        }
    }));

    // ── 5. Boucle d'entrée ─────────────────────────────────────────────
    let spacing = config.input.debounce() + Duration::from_millis(1);
    let mut dispatcher = dispatcher;
    tokio::select! {
        result = read_keys(keys_tx, filter, spacing) => {
            result?;
            // Laisse le temps aux bindings ambigus en attente de se résoudre.
            let grace = config.input.ambiguity_timeout() + Duration::from_millis(100);
            if tokio::time::timeout(grace, host.quit_requested()).await.is_ok() {
                info!("quit requested");
            }
        }
        _ = host.quit_requested() => info!("quit requested"),
        joined = &mut dispatcher => {
            if let Err(e) = joined
                && e.is_panic()
            {
                bail!("action dispatcher panicked");
            }
        }
    }

    pump.abort();
    dispatcher.abort();
    Ok(())
}

/// Feeds stdin to the machine, one key at a time.
///
/// Keys of the same line get timestamps `spacing` apart so the debouncer
/// does not take `gg` for a double fire.
async fn read_keys(
    keys: mpsc::Sender<KeyPress>,
    filter: RequestFilter,
    spacing: Duration,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_at: Option<Instant> = None;

    while let Some(line) = lines.next_line().await.context("cannot read stdin")? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(directive) = line.strip_prefix('!') {
            let (name, arg) = directive.split_once(' ').unwrap_or((directive, ""));
            match name {
                "sleep" => match arg.trim().parse::<u64>() {
                    Ok(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                    Err(e) => warn!(arg, error = %e, "invalid !sleep"),
                },
                "url" => println!("{:?} {}", filter.decide(arg), arg.trim()),
                other => warn!(directive = other, "unknown directive"),
            }
            continue;
        }

        let sequence = match KeySequence::parse(line) {
            Ok(sequence) => sequence,
            Err(e) => {
                warn!(input = line, error = %e, "cannot parse keys");
                continue;
            }
        };
        for key in &sequence {
            let now = Instant::now();
            let at = match last_at {
                Some(prev) if now < prev + spacing => prev + spacing,
                _ => now,
            };
            last_at = Some(at);
            let mut press = KeyPress::new(*key);
            press.at = at;
            if keys.send(press).await.is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}

async fn check_urls(config: &Config, urls: &[String]) -> anyhow::Result<()> {
    let shell = Shell::start(config, Arc::new(LoggingHost::new(None)));
    let Some(ingestion) = shell.ingestion else {
        bail!("ad-blocking is disabled or no filters directory was found");
    };
    let report = ingestion.await.context("filter ingestion failed")?;
    println!(
        "{} rules from {} lists ({} malformed lines, {} unreadable lists)",
        report.rules, report.files, report.malformed, report.failed_files
    );
    for url in urls {
        println!("{:?} {url}", shell.filter.decide(url));
    }
    Ok(())
}
