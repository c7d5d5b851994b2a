use chrono::{TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crack_inspector::analysis::AnalysisResult;
use crack_inspector::config::{App, AppConfig, DEFAULT_TIMEOUT_SECS};
use crack_inspector::media::preview;
use crack_inspector::state::library::SqliteStore;
use crack_inspector::state::records::DEFAULT_PREFIX;
use crack_inspector::state::session::SessionState;
use crack_inspector::state::settings::{ConfigurationUpdate, Sensitivity, UnitSystem};
use crack_inspector::{Error, Record};

/// Structural crack assessment with a local history
#[derive(Debug, Parser)]
#[command(name = "crack-inspector", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Base URL of the crack detector
    #[arg(long, env = "CRACK_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// History database file
    #[arg(long, env = "CRACK_DB", global = true)]
    db: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, env = "CRACK_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    timeout: u64,

    /// Use the built-in offline analyzer
    #[arg(long, env = "CRACK_OFFLINE", global = true)]
    offline: bool,

    /// Seed for the offline analyzer
    #[arg(long, env = "CRACK_SEED", global = true)]
    seed: Option<u64>,

    /// Keep history in memory for this run only
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze an image and save the result to history
    Analyze {
        file: PathBuf,
        #[arg(long)]
        sensitivity: Option<Sensitivity>,
        #[arg(long)]
        unit: Option<UnitSystem>,
        /// Leave out the engineering recommendation
        #[arg(long)]
        no_recommendations: bool,
        /// Also export the saved record to this directory
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// List past analyses, newest first
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one past analysis
    Show {
        id: String,
        /// Export image, overlay and verdict (default: data dir)
        #[arg(long, num_args = 0..=1)]
        export: Option<Option<PathBuf>>,
    },
    /// Delete past analyses
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete the whole history
    Clear,
    /// Show or change the saved analysis settings
    Config {
        #[arg(long)]
        sensitivity: Option<Sensitivity>,
        #[arg(long)]
        unit: Option<UnitSystem>,
        #[arg(long)]
        recommendations: Option<bool>,
        /// Restore defaults
        #[arg(long)]
        reset: bool,
    },
}

impl GlobalArgs {
    fn to_config(&self) -> AppConfig {
        AppConfig {
            endpoint: self
                .endpoint
                .clone()
                .unwrap_or_else(|| AppConfig::default().endpoint),
            db_path: self.db.clone().unwrap_or_else(SqliteStore::default_path),
            request_timeout: Duration::from_secs(self.timeout),
            prefix: DEFAULT_PREFIX.to_string(),
            offline: self.offline,
            seed: self.seed,
            ephemeral: self.ephemeral,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crack_inspector=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Error> {
    let app = App::open(&cli.global.to_config()).await?;

    match cli.command {
        Command::Analyze {
            file,
            sensitivity,
            unit,
            no_recommendations,
            export: export_dir,
        } => {
            // Per-run overrides; not saved
            app.settings
                .update(ConfigurationUpdate {
                    sensitivity,
                    unit,
                    include_recommendations: no_recommendations.then_some(false),
                })
                .await;

            app.session.select_file(&file).await?;
            let state = app.session.start_analysis().await?;

            match state {
                SessionState::Complete {
                    result,
                    record_id,
                    warning,
                    ..
                } => {
                    print_result(&result);
                    if let Some(id) = &record_id {
                        println!("saved as {}", id);
                    }
                    if let Some(warning) = warning {
                        eprintln!("warning: {}", warning);
                    }
                    if let (Some(dir), Some(id)) = (export_dir, record_id) {
                        export(&app, &id, dir).await?;
                    }
                    Ok(ExitCode::SUCCESS)
                }
                SessionState::Error { cause } => {
                    eprintln!("analysis failed: {}", cause);
                    Ok(ExitCode::FAILURE)
                }
                other => {
                    eprintln!("analysis did not finish ({:?})", other.phase());
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Command::History { limit } => {
            let entries = app.history.entries().await;
            if entries.is_empty() {
                println!("No analyses yet.");
            }
            for record in entries.iter().take(limit.unwrap_or(usize::MAX)) {
                println!(
                    "{}  {}  {}",
                    record.id,
                    format_timestamp(record.timestamp),
                    record.result.summary()
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Show { id, export: dir } => {
            app.history.select_from_history(&id, &app.session).await?;
            if let Some(record) = app.history.find(&id).await {
                print_record(&record);
            }
            if let Some(dir) = dir {
                let dir = dir.unwrap_or_else(preview::default_export_dir);
                export(&app, &id, dir).await?;
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Delete { ids } => {
            for id in &ids {
                let remaining = app.history.delete_entry(id).await?;
                println!("deleted {} ({} left)", id, remaining);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Clear => {
            let before = app.history.len().await;
            let remaining = app.history.clear().await?;
            println!("deleted {} analyses", before.saturating_sub(remaining));
            Ok(ExitCode::SUCCESS)
        }

        Command::Config {
            sensitivity,
            unit,
            recommendations,
            reset,
        } => {
            if reset {
                app.settings.reset().await;
            }
            let update = ConfigurationUpdate {
                sensitivity,
                unit,
                include_recommendations: recommendations,
            };
            let current = if update.is_empty() {
                app.settings.current().await
            } else {
                app.settings.update(update).await
            };
            if reset || !update.is_empty() {
                app.save_settings().await?;
            }

            println!("sensitivity:             {}", current.sensitivity);
            println!("unit:                    {}", current.unit);
            println!("include recommendations: {}", current.include_recommendations);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn export(app: &App, id: &str, dir: PathBuf) -> Result<(), Error> {
    let record = app.history.store().get(id).await?;
    for path in preview::export_record(record, dir).await? {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn format_timestamp(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn print_record(record: &Record) {
    println!("id:        {}", record.id);
    println!("analyzed:  {}", format_timestamp(record.timestamp));
    if let Some(name) = &record.image.file_name {
        println!("file:      {}", name);
    }
    println!(
        "image:     {} ({} bytes)",
        record.image.media_type, record.image.size
    );
    print_result(&record.result);
}

fn print_result(result: &AnalysisResult) {
    match result {
        AnalysisResult::NoCrack => println!("verdict:   no crack detected"),
        AnalysisResult::NonStructuralFeature { reason } => {
            println!("verdict:   non-structural feature");
            println!("reason:    {}", reason);
        }
        AnalysisResult::StructuralCrack {
            severity,
            metrics,
            recommendation,
            overlay_image,
        } => {
            println!("verdict:   structural crack");
            println!("severity:  {}", severity);
            if let Some(risk) = result.risk_level() {
                println!("risk:      {}", risk);
            }
            println!(
                "size:      {:.2} x {:.2} px, {}",
                metrics.length_pixels, metrics.width_pixels, metrics.orientation
            );
            if let Some(physical) = &metrics.physical {
                let unit = match physical.unit {
                    UnitSystem::Metric => "mm",
                    UnitSystem::Imperial => "in",
                };
                println!(
                    "estimate:  {} x {} {}",
                    physical.length, physical.width, unit
                );
            }
            println!("pattern:   {}", metrics.pattern);
            if let Some(rec) = recommendation {
                println!("action:    {}", rec.recommended_action);
                if let Some(time) = &rec.estimated_repair_time {
                    println!("repair:    {}", time);
                }
                println!(
                    "engineer:  {}",
                    if rec.engineer_required { "required" } else { "not required" }
                );
            }
            if overlay_image.is_some() {
                println!("overlay:   available (use --export)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("crack-inspector").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze() {
        let cli = parse(&[
            "analyze",
            "wall.jpg",
            "--sensitivity",
            "high",
            "--unit",
            "imperial",
            "--no-recommendations",
            "--export",
            "out",
        ]);
        match cli.command {
            Command::Analyze {
                file,
                sensitivity,
                unit,
                no_recommendations,
                export,
            } => {
                assert_eq!(file, PathBuf::from("wall.jpg"));
                assert_eq!(sensitivity, Some(Sensitivity::High));
                assert_eq!(unit, Some(UnitSystem::Imperial));
                assert!(no_recommendations);
                assert_eq!(export, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_sensitivity() {
        let err = Cli::try_parse_from(["crack-inspector", "analyze", "a.jpg", "--sensitivity", "max"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_parse_history_and_global_flags() {
        let cli = parse(&["history", "--limit", "5", "--offline", "--seed", "7", "--timeout", "3"]);
        assert!(matches!(cli.command, Command::History { limit: Some(5) }));

        let config = cli.global.to_config();
        assert!(config.offline);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.prefix, DEFAULT_PREFIX);
    }

    #[test]
    fn test_parse_show_export_forms() {
        let bare = parse(&["show", "abc"]);
        assert!(matches!(bare.command, Command::Show { export: None, .. }));

        // No directory means the default export dir
        let default_dir = parse(&["show", "abc", "--export"]);
        match default_dir.command {
            Command::Show { id, export } => {
                assert_eq!(id, "abc");
                assert_eq!(export, Some(None));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let explicit = parse(&["show", "abc", "--export", "/tmp/out"]);
        assert!(matches!(
            explicit.command,
            Command::Show { export: Some(Some(ref dir)), .. } if dir == &PathBuf::from("/tmp/out")
        ));
    }

    #[test]
    fn test_parse_delete_needs_an_id() {
        assert!(Cli::try_parse_from(["crack-inspector", "delete"]).is_err());

        let cli = parse(&["delete", "a", "b"]);
        match cli.command {
            Command::Delete { ids } => assert_eq!(ids, vec!["a", "b"]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_clear_and_config() {
        assert!(matches!(parse(&["clear"]).command, Command::Clear));

        let cli = parse(&["config", "--unit", "metric", "--recommendations", "false", "--reset"]);
        match cli.command {
            Command::Config {
                sensitivity,
                unit,
                recommendations,
                reset,
            } => {
                assert_eq!(sensitivity, None);
                assert_eq!(unit, Some(UnitSystem::Metric));
                assert_eq!(recommendations, Some(false));
                assert!(reset);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_offline_analyze_exports_record() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("wall.png");
        std::fs::write(&image, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]).unwrap();
        let out = dir.path().join("exports");
        let image_arg = image.to_string_lossy().into_owned();
        let out_arg = out.to_string_lossy().into_owned();

        let code = run(parse(&[
            "--offline",
            "--seed",
            "3",
            "--ephemeral",
            "analyze",
            &image_arg,
            "--export",
            &out_arg,
        ]))
        .await
        .unwrap();
        assert_eq!(format!("{:?}", code), format!("{:?}", ExitCode::SUCCESS));
        assert!(std::fs::read_dir(&out).unwrap().count() >= 2);
    }
}
