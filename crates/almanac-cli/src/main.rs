use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use almanac::BASE_URL;
use almanac::checkpoint::CheckpointStore;
use almanac::pipeline::{Pipeline, PipelineConfig, scrape_unit};
use almanac::scraper::{FetchStats, Fetcher, RetryPolicy};
use almanac::sink::JsonLinesSink;
use almanac::types::{FetchUnit, League};
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "almanac")]
#[command(about = "A resumable baseball-almanac.com yearly statistics scraper", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep every season of the selected leagues, resuming from saved checkpoints
    Run {
        #[arg(long, default_value = BASE_URL, help = "Site root to fetch yearly pages from")]
        base_url: String,

        #[arg(
            long,
            value_parser = parse_league,
            help = "League to sweep (repeatable; defaults to both)"
        )]
        league: Vec<League>,

        #[arg(long, help = "First season to sweep")]
        start_year: Option<i32>,

        #[arg(long, help = "Last season to sweep")]
        end_year: Option<i32>,

        #[arg(long, default_value_t = 1500, help = "Delay between yearly pages in milliseconds")]
        delay_ms: u64,

        #[arg(
            long,
            default_value_t = 30,
            help = "Delay before each retry of a failed season in seconds"
        )]
        retry_delay_secs: u64,

        #[arg(long, default_value_t = 3, help = "Retries per request after the first attempt")]
        max_retries: u32,

        #[arg(long, default_value = "checkpoints", help = "Directory holding checkpoint files")]
        checkpoint_dir: PathBuf,

        #[arg(
            long,
            default_value = "almanac_records.jsonl",
            help = "JSON lines file records are appended to"
        )]
        records: PathBuf,

        #[arg(long, help = "Sweep leagues concurrently")]
        concurrent: bool,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Fetch and extract a single season without touching checkpoints
    Year {
        #[arg(value_parser = parse_league, help = "League: a/al/american or n/nl/national")]
        league: League,

        #[arg(help = "Season to fetch")]
        year: i32,

        #[arg(long, default_value = BASE_URL, help = "Site root to fetch yearly pages from")]
        base_url: String,

        #[arg(long, default_value_t = 3, help = "Retries per request after the first attempt")]
        max_retries: u32,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Show saved progress for each league
    Status {
        #[arg(long, default_value = "checkpoints", help = "Directory holding checkpoint files")]
        checkpoint_dir: PathBuf,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
}

fn parse_league(s: &str) -> Result<League, String> {
    League::from_str(s).map_err(|e| e.to_string())
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Run {
            base_url,
            league,
            start_year,
            end_year,
            delay_ms,
            retry_delay_secs,
            max_retries,
            checkpoint_dir,
            records,
            concurrent,
            format,
        } => {
            let config = PipelineConfig {
                base_url,
                leagues: if league.is_empty() {
                    League::ALL.to_vec()
                } else {
                    league
                },
                start_year,
                end_year,
                request_delay: Duration::from_millis(delay_ms),
                retry_delay: Duration::from_secs(retry_delay_secs),
                concurrent,
                retry: RetryPolicy {
                    max_retries,
                    ..RetryPolicy::default()
                },
            };

            let sink = JsonLinesSink::open(&records).unwrap_or_else(|e| {
                log::error!("Error opening {}: {}", records.display(), e);
                process::exit(1);
            });

            let pipeline = Pipeline::with_http(config, CheckpointStore::new(&checkpoint_dir), sink)
                .unwrap_or_else(|e| {
                    log::error!("Error creating scraper: {}", e);
                    process::exit(1);
                });

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted; finishing the current season before stopping");
                    on_signal.cancel();
                }
            });

            let summary = pipeline.run(&cancel).await.unwrap_or_else(|e| {
                log::error!("Run aborted: {}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&summary),
                OutputFormat::Text => {
                    print!("{}", summary);
                    if summary.cancelled {
                        println!("\nRun again to resume from checkpoint.");
                    }
                }
            }
        }

        Commands::Year {
            league,
            year,
            base_url,
            max_retries,
            format,
        } => {
            let policy = RetryPolicy {
                max_retries,
                ..RetryPolicy::default()
            };
            let fetcher = Fetcher::new(policy, Arc::new(FetchStats::default())).unwrap_or_else(|e| {
                log::error!("Error creating scraper: {}", e);
                process::exit(1);
            });

            let unit = FetchUnit::new(league, year, &base_url);
            log::info!("Fetching {} from {}...", unit, unit.url);

            let page = scrape_unit(&fetcher, &unit).await.unwrap_or_else(|e| {
                log::error!("Error scraping {}: {}", unit, e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&page.records),
                OutputFormat::Text => {
                    if page.records.is_empty() {
                        println!("No records found.");
                    } else {
                        for record in &page.records {
                            println!("{}", record);
                        }
                    }
                    let counts = page.counts();
                    println!(
                        "\n{} [{}]: {} player, {} pitcher, {} standings records",
                        unit, page.era, counts.player_stats, counts.pitcher_stats, counts.standings
                    );
                }
            }
        }

        Commands::Status {
            checkpoint_dir,
            format,
        } => {
            let store = CheckpointStore::new(&checkpoint_dir);
            let checkpoints: Vec<_> = League::ALL
                .into_iter()
                .map(|league| {
                    let checkpoint = store.load(league).unwrap_or_else(|e| {
                        log::error!("Error reading checkpoint: {}", e);
                        process::exit(1);
                    });
                    (league, checkpoint)
                })
                .collect();

            match format {
                OutputFormat::Json => {
                    let saved: Vec<_> = checkpoints.into_iter().filter_map(|(_, c)| c).collect();
                    serialize_json(&saved);
                }
                OutputFormat::Text => {
                    for (league, checkpoint) in checkpoints {
                        match checkpoint {
                            None => println!("{}: no checkpoint", league),
                            Some(c) => {
                                let failed = if c.failed_years.is_empty() {
                                    "none".to_string()
                                } else {
                                    c.failed_years
                                        .iter()
                                        .map(|y| y.to_string())
                                        .collect::<Vec<_>>()
                                        .join(", ")
                                };
                                println!(
                                    "{}: last completed {}, {} seasons done, failed: {} (saved {})",
                                    league,
                                    c.last_completed_year
                                        .map_or("-".to_string(), |y| y.to_string()),
                                    c.total_completed,
                                    failed,
                                    c.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}
