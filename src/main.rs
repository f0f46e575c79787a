use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use proxyprobe::config::CheckerConfig;
use proxyprobe::endpoint::{Endpoint, EndpointResult, Status};
use proxyprobe::import::ImportedSettings;
use proxyprobe::probes::{ChannelSink, ProgressSink};
use proxyprobe::results::persist::ResultRecord;
use proxyprobe::results::{self, SpeedBounds, Summary};

#[derive(Parser)]
#[command(
    name = "proxyprobe",
    about = "Concurrent latency and throughput checker for proxy endpoints",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (default: $PROXYPROBE_CONFIG, then ./proxyprobe.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a list of endpoints and save ranked results
    Check {
        /// Endpoints as address:port
        servers: Vec<String>,

        /// Read endpoints from a text file (one address:port per line)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Read endpoints and shared settings from a client config with `outbounds`
        #[arg(long)]
        import: Option<PathBuf>,

        /// Credential (UUID) stamped on every endpoint
        #[arg(long)]
        uuid: Option<String>,

        /// Server name (SNI) stamped on every endpoint
        #[arg(long)]
        sni: Option<String>,

        /// Transport path stamped on every endpoint
        #[arg(long)]
        path: Option<String>,

        /// Per-endpoint timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Reference download used for the throughput sample
        #[arg(long)]
        test_url: Option<String>,

        /// Keep only servers faster than this (MB/s, exclusive)
        #[arg(long)]
        min_speed: Option<f64>,

        /// Keep only servers slower than this (MB/s, exclusive)
        #[arg(long)]
        max_speed: Option<f64>,

        /// Drop the lower speed bound
        #[arg(long, conflicts_with = "min_speed")]
        no_min_speed: bool,

        /// Drop the upper speed bound
        #[arg(long, conflicts_with = "max_speed")]
        no_max_speed: bool,

        /// Directory for the result files
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Do not write result files
        #[arg(long)]
        no_save: bool,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show the endpoints an import file resolves to
    Import {
        /// A .json client config or a text list of address:port lines
        file: PathBuf,
    },

    /// Re-filter a saved JSON result file and save the matches
    Filter {
        /// JSON results written by `check`
        results: PathBuf,

        #[arg(long)]
        min_speed: Option<f64>,

        #[arg(long)]
        max_speed: Option<f64>,

        /// Drop the lower speed bound
        #[arg(long, conflicts_with = "min_speed")]
        no_min_speed: bool,

        /// Drop the upper speed bound
        #[arg(long, conflicts_with = "max_speed")]
        no_max_speed: bool,

        /// Output prefix (default: <output dir>/filtered_servers)
        #[arg(long)]
        prefix: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut cfg = match &cli.config {
        Some(path) => CheckerConfig::load(path)?,
        None => CheckerConfig::load_or_default(),
    };

    match cli.command {
        Commands::Check {
            servers,
            file,
            import,
            uuid,
            sni,
            path,
            timeout,
            test_url,
            min_speed,
            max_speed,
            no_min_speed,
            no_max_speed,
            output_dir,
            no_save,
            json,
        } => {
            let mut pairs = proxyprobe::import::parse_server_list(&servers.join("\n"));
            let mut defaults = cfg.endpoint_defaults();

            if let Some(file) = &file {
                pairs.extend(proxyprobe::import::load_text_file(file)?);
            }
            if let Some(import) = &import {
                let imported = proxyprobe::import::load_outbounds_file(import)?;
                tracing::info!(count = imported.servers.len(), file = %import.display(), "Imported outbounds");
                pairs.extend(imported.servers);
                if let Some(settings) = imported.settings {
                    defaults = settings.apply_to(defaults);
                }
            }

            if let Some(v) = uuid {
                defaults.uuid = v;
            }
            if let Some(v) = sni {
                defaults.server_name = v;
            }
            if let Some(v) = path {
                defaults.path = v;
            }
            if let Some(v) = timeout {
                cfg.probe.timeout_secs = v;
            }
            if let Some(v) = test_url {
                cfg.probe.test_url = v;
            }
            cfg.filter.min_speed_mbps =
                override_bound(cfg.filter.min_speed_mbps, min_speed, no_min_speed);
            cfg.filter.max_speed_mbps =
                override_bound(cfg.filter.max_speed_mbps, max_speed, no_max_speed);
            warn_if_unsatisfiable(cfg.speed_bounds());
            if let Some(dir) = output_dir {
                cfg.output.dir = dir;
            }

            if pairs.is_empty() {
                anyhow::bail!("Enter at least one server in address:port form");
            }
            let endpoints = Endpoint::from_pairs(&pairs, &defaults);

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
            let printer = tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    eprintln!("{}", line);
                }
            });
            let sink: Arc<dyn ProgressSink> = Arc::new(ChannelSink(tx));

            let report = proxyprobe::run_check(
                endpoints,
                cfg.probe_config(),
                cfg.speed_bounds(),
                Some(sink),
            )
            .await?;
            let _ = printer.await;

            let saved = if no_save {
                None
            } else {
                Some(report.save(&cfg.output)?)
            };

            if json {
                let ranked: Vec<ResultRecord> =
                    report.ranked.iter().map(ResultRecord::from).collect();
                let output = serde_json::json!({
                    "checked_at": report.checked_at,
                    "summary": report.summary,
                    "results": ranked,
                    "saved": saved,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_table(&report.ranked);
                print_summary(&report.summary);
                if let Some(saved) = saved {
                    for (json_file, txt_file) in saved.all.iter().chain(saved.filtered.iter()) {
                        println!("Saved: {} , {}", json_file.display(), txt_file.display());
                    }
                }
            }
        }
        Commands::Import { file } => {
            let (pairs, settings) = import_any(&file)?;
            if pairs.is_empty() {
                println!("No servers in address:port form found in {}", file.display());
            } else {
                for (host, port) in &pairs {
                    println!("{}:{}", host, port);
                }
                println!("\n{} server(s)", pairs.len());
            }
            if let Some(settings) = settings {
                let d = settings.apply_to(cfg.endpoint_defaults());
                println!("UUID: {}", d.uuid);
                println!("SNI:  {}", d.server_name);
                println!("Path: {}", d.path);
            }
        }
        Commands::Filter {
            results: results_file,
            min_speed,
            max_speed,
            no_min_speed,
            no_max_speed,
            prefix,
        } => {
            let loaded = results::load_json(&results_file)?;
            let bounds = SpeedBounds {
                min_speed_mbps: override_bound(cfg.filter.min_speed_mbps, min_speed, no_min_speed),
                max_speed_mbps: override_bound(cfg.filter.max_speed_mbps, max_speed, no_max_speed),
            };
            warn_if_unsatisfiable(bounds);
            let filtered = results::filter(&loaded, bounds);
            print_table(&filtered);
            print_summary(&Summary::new(&loaded, &filtered));

            if filtered.is_empty() {
                println!("No servers to save.");
            } else {
                let prefix = prefix.unwrap_or_else(|| cfg.output.filtered_path());
                let (json_file, txt_file) = results::persist(&filtered, &prefix)?;
                println!("Saved: {} , {}", json_file.display(), txt_file.display());
            }
        }
    }

    Ok(())
}

/// A flag value wins over the configured bound; `clear` drops it.
fn override_bound(configured: Option<f64>, flag: Option<f64>, clear: bool) -> Option<f64> {
    if clear {
        None
    } else {
        flag.or(configured)
    }
}

fn warn_if_unsatisfiable(bounds: SpeedBounds) {
    if bounds.admits_nothing() {
        tracing::warn!(
            min_speed_mbps = ?bounds.min_speed_mbps,
            max_speed_mbps = ?bounds.max_speed_mbps,
            "Speed bounds admit no server; pass --no-max-speed or set max_speed_mbps = false to lift the upper bound"
        );
    }
}

fn import_any(file: &Path) -> Result<(Vec<(String, u16)>, Option<ImportedSettings>)> {
    let is_json = file
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        let imported = proxyprobe::import::load_outbounds_file(file)
            .with_context(|| format!("failed to import {}", file.display()))?;
        Ok((imported.servers, imported.settings))
    } else {
        let pairs = proxyprobe::import::load_text_file(file)
            .with_context(|| format!("failed to import {}", file.display()))?;
        Ok((pairs, None))
    }
}

fn print_table(results: &[EndpointResult]) {
    println!();
    println!(
        "{:<4} | {:<28} | {:<11} | {:>10} | {:>12} | Tag",
        "#", "Server", "Status", "Speed", "Latency"
    );
    println!("{:-<4}-|-{:-<28}-|-{:-<11}-|-{:-<10}-|-{:-<12}-|-{:-<12}", "", "", "", "", "", "");
    for (i, r) in results.iter().enumerate() {
        let status = match r.status() {
            Status::Ok => "✅ ok".to_string(),
            other => format!("❌ {}", other),
        };
        let speed = if r.is_ok() {
            format!("{:.2} MB/s", r.speed_mbps())
        } else {
            "-".to_string()
        };
        let latency = if r.latency_ms() > 0.0 {
            format!("{:.1} ms", r.latency_ms())
        } else {
            "-".to_string()
        };
        println!(
            "{:<4} | {:<28} | {:<11} | {:>10} | {:>12} | {}",
            i + 1,
            r.address(),
            status,
            speed,
            latency,
            r.endpoint.tag
        );
    }
    println!();
}

fn print_summary(summary: &Summary) {
    println!("{}", summary);
}
