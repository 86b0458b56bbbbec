use anyhow::{bail, Context, Result};
use attendance_api::{ApiClient, Attachment, AttendanceType, Gps, LogEntry, LogSource};
use attendance_core::EmployeeCache;
use attendance_scan::{CancellationToken, ReplaySource, ScanSession};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod config;
mod evidence;
mod password;
mod sink;
mod state;

use config::Config;
use sink::ApiCommitSink;
use state::{LastResult, LocalState};

#[derive(Parser)]
#[command(name = "attendance", about = "Face attendance client", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the attendance API answers
    Ping,
    /// Match faces from a detector sample stream and record attendance
    Scan(ScanArgs),
    /// Record a scan-desk log entry for an employee code
    Log {
        #[arg(short, long)]
        code: String,
        #[arg(long = "type", default_value = "IN")]
        kind: AttendanceType,
        #[arg(short, long, default_value = "")]
        note: String,
        /// Photo taken at the desk
        #[arg(long)]
        photo: Option<PathBuf>,
        /// Supporting document
        #[arg(long)]
        evidence: Option<PathBuf>,
        #[command(flatten)]
        gps: GpsArgs,
    },
    /// Record a manual entry (a reason is required)
    Manual {
        #[arg(short, long)]
        code: String,
        #[arg(long = "type", default_value = "IN")]
        kind: AttendanceType,
        #[arg(short, long)]
        reason: String,
        #[arg(long)]
        evidence: Option<PathBuf>,
        #[command(flatten)]
        gps: GpsArgs,
    },
    /// Show today's records for an employee
    Check {
        #[arg(short, long)]
        code: String,
        /// Day to query (YYYY-MM-DD); defaults to today on the server
        #[arg(long, value_parser = parse_date)]
        date: Option<String>,
    },
    /// Show the attendance summary for a day
    Summary {
        #[arg(long, value_parser = parse_date)]
        date: Option<String>,
    },
    /// Log in as HR admin
    Login {
        #[arg(short, long)]
        username: String,
        /// Prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Upload an employee's reference face photo (HR only)
    UploadFace {
        #[arg(short, long)]
        code: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// List enrolled employees with usable face descriptors
    Employees,
    /// Show the last recorded result
    Last,
    /// Forget the admin token and last result
    Clear,
    /// Show or change client configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// JSON-lines file of detector samples (descriptor array, null, or {"error": ...})
    #[arg(short, long)]
    samples: PathBuf,
    /// Replay the sample file from the start when it runs out
    #[arg(long = "loop")]
    repeat: bool,
    #[arg(long = "type", default_value = "IN")]
    kind: AttendanceType,
    /// Photo to attach as evidence when committing
    #[arg(long)]
    photo: Option<PathBuf>,
    /// Commit without asking for confirmation
    #[arg(short, long)]
    yes: bool,
    /// Seconds to wait for a stable match
    #[arg(long)]
    timeout: Option<u64>,
    #[command(flatten)]
    gps: GpsArgs,
}

#[derive(Args, Default)]
struct GpsArgs {
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,
    /// Position accuracy in metres
    #[arg(long, requires = "lat")]
    acc: Option<f64>,
}

impl GpsArgs {
    fn to_gps(&self) -> Result<Option<Gps>> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Ok(Some(Gps::new(lat, lng, self.acc)?)),
            _ => Ok(None),
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Save the API endpoint URL
    SetUrl { url: String },
    /// Forget the saved API endpoint URL
    ResetUrl,
}

impl Commands {
    /// Commands that can run over an unreadable state file and overwrite it.
    fn repairs_state(&self) -> bool {
        matches!(
            self,
            Commands::Clear
                | Commands::Config {
                    action: ConfigAction::SetUrl { .. } | ConfigAction::ResetUrl
                }
        )
    }
}

fn parse_date(raw: &str) -> std::result::Result<String, String> {
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

struct App {
    config: Config,
    state: LocalState,
}

impl App {
    fn load(repair: bool) -> Result<Self> {
        let config = Config::load()?;
        let state = load_state(&config.state_path, repair)?;
        Ok(Self { config, state })
    }

    fn api_url(&self) -> Option<&str> {
        self.config.api_url.as_deref().or(self.state.api_url.as_deref())
    }

    fn client(&self) -> Result<ApiClient> {
        Ok(ApiClient::new(
            self.api_url().unwrap_or_default(),
            self.config.http_timeout,
        )?)
    }

    fn save(&self) -> Result<()> {
        self.state
            .save(&self.config.state_path)
            .with_context(|| format!("failed to save {}", self.config.state_path.display()))
    }

    fn record(&mut self, title: String, detail: String) -> Result<()> {
        self.state.last_result = Some(LastResult::now(title, detail));
        self.save()
    }
}

/// Load local state. With `repair`, an unreadable file is replaced by the
/// empty state instead of failing.
fn load_state(path: &std::path::Path, repair: bool) -> Result<LocalState> {
    match LocalState::load(path) {
        Ok(state) => Ok(state),
        Err(e) if repair => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable state file");
            Ok(LocalState::default())
        }
        Err(e) => Err(e).with_context(|| {
            format!(
                "failed to load {}; `attendance clear` resets it",
                path.display()
            )
        }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut app = App::load(cli.command.repairs_state())?;

    match cli.command {
        Commands::Ping => {
            let client = app.client()?;
            client.ping().await.context("API test failed")?;
            println!("API OK: {}", client.url());
        }
        Commands::Scan(args) => scan(&mut app, args).await?,
        Commands::Log {
            code,
            kind,
            note,
            photo,
            evidence: evidence_path,
            gps,
        } => {
            let client = app.client()?;
            let mut entry = LogEntry::new(&code, kind, LogSource::Scan, &app.config.device);
            entry.note = note.trim().to_string();
            entry.gps = gps.to_gps()?;
            entry.validate()?;

            let photo = match photo {
                Some(path) => {
                    let ev = evidence::load_photo(&path).await?;
                    entry.captured = Some(evidence::captured_info(&ev));
                    Some(evidence::photo_attachment(ev))
                }
                None => None,
            };
            let evidence = attachment("evidence", evidence_path.as_deref()).await?;

            let saved = client.save_log(&entry, photo, evidence).await?;
            print_json(&saved.raw)?;
            let detail = if entry.note.is_empty() {
                String::new()
            } else {
                format!("note: {}", entry.note)
            };
            app.record(format!("Logged {kind} • code {}", entry.employee_code), detail)?;
            println!("Saved");
        }
        Commands::Manual {
            code,
            kind,
            reason,
            evidence: evidence_path,
            gps,
        } => {
            let client = app.client()?;
            let mut entry = LogEntry::new(&code, kind, LogSource::Manual, &app.config.device);
            entry.note = reason.trim().to_string();
            entry.gps = gps.to_gps()?;
            entry.validate()?;
            let evidence = attachment("evidence", evidence_path.as_deref()).await?;

            let saved = client.save_log(&entry, None, evidence).await?;
            print_json(&saved.raw)?;
            app.record(
                format!("Manual {kind} • code {}", entry.employee_code),
                entry.note.clone(),
            )?;
            println!("Manual entry saved");
        }
        Commands::Check { code, date } => {
            let res = app.client()?.today_by_code(&code, date.as_deref()).await?;
            println!("Records for {}", code.trim());
            print_json(&res)?;
        }
        Commands::Summary { date } => {
            let res = app.client()?.today_summary(date.as_deref()).await?;
            print_json(&res)?;
        }
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => password::read("Password: ").await?,
            };
            let token = app
                .client()?
                .login_admin(&username, &password)
                .await
                .context("login failed")?;
            app.state.admin_token = Some(token);
            app.save()?;
            println!("Logged in as {}", username.trim());
        }
        Commands::UploadFace { code, file } => {
            if !app.state.is_logged_in() {
                bail!("HR login required: run `attendance login` first");
            }
            let client = app.client()?;
            let face = Attachment::from_path("face", &file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let file_name = face.file_name.clone();
            let res = client.upload_employee_face(&code, face).await?;
            print_json(&res)?;
            app.record(format!("Face uploaded • code {}", code.trim()), file_name)?;
            println!("Face uploaded");
        }
        Commands::Employees => {
            let raw = app.client()?.employees().await?;
            let cache = EmployeeCache::new();
            let report = cache.refresh(raw);
            for record in cache.snapshot().iter() {
                println!(
                    "{:<12} {:<32} {}-d",
                    record.code,
                    record.full_name,
                    record.descriptor.len()
                );
            }
            println!("{} usable, {} skipped", report.loaded, report.skipped);
        }
        Commands::Last => match &app.state.last_result {
            Some(last) => println!("{}  {}\n  {}", last.time, last.title, last.detail),
            None => println!("No recent result"),
        },
        Commands::Clear => {
            app.state.clear_local();
            app.save()?;
            println!("Local data cleared");
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let source = if app.config.api_url.is_some() {
                    "config/env"
                } else if app.state.api_url.is_some() {
                    "saved"
                } else {
                    "unset"
                };
                println!("api_url:      {} ({source})", app.api_url().unwrap_or("-"));
                println!("state_path:   {}", app.config.state_path.display());
                println!("http_timeout: {}s", app.config.http_timeout.as_secs());
                println!("scan_timeout: {}s", app.config.scan_timeout.as_secs());
                println!("device:       {}", app.config.device);
                println!("hr_login:     {}", app.state.is_logged_in());
            }
            ConfigAction::SetUrl { url } => {
                // Validates the URL without contacting it.
                ApiClient::new(&url, app.config.http_timeout)?;
                app.state.set_api_url(&url);
                app.save()?;
                if app.config.api_url.is_some() {
                    tracing::warn!("ATTENDANCE_API_URL or config file overrides the saved URL");
                }
                println!("API URL saved");
            }
            ConfigAction::ResetUrl => {
                app.state.api_url = None;
                app.save()?;
                println!("API URL removed");
            }
        },
    }

    Ok(())
}

async fn scan(app: &mut App, args: ScanArgs) -> Result<()> {
    let client = app.client()?;
    let gps = args.gps.to_gps()?;

    let cache = Arc::new(EmployeeCache::new());
    let employees = client
        .employees()
        .await
        .context("failed to load enrolled faces")?;
    let report = cache.refresh(employees);
    println!(
        "Loaded {} enrolled faces ({} skipped)",
        report.loaded, report.skipped
    );
    if report.loaded == 0 {
        bail!("no enrolled faces to match against");
    }

    let source = ReplaySource::open(&args.samples, args.repeat)
        .with_context(|| format!("failed to open samples {}", args.samples.display()))?;
    let mut session = ScanSession::new(source, cache);

    let mut statuses = session.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = String::new();
        while statuses.changed().await.is_ok() {
            let line = statuses.borrow_and_update().to_string();
            if line != last {
                println!("  {line}");
                last = line;
            }
        }
    });

    let cancel = CancellationToken::new();
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(app.config.scan_timeout);
    let watchdog = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let reason = tokio::select! {
                _ = tokio::time::sleep(timeout) => ScanStop::TimedOut,
                _ = tokio::signal::ctrl_c() => ScanStop::Interrupted,
            };
            tracing::info!(?reason, "scan stopping");
            cancel.cancel();
            reason
        })
    };

    let locked = session.run_until_ready(&cancel).await;
    printer.abort();

    let Some(candidate) = locked else {
        // Only the watchdog cancels, so it has finished by now.
        let reason = watchdog.await.unwrap_or(ScanStop::TimedOut);
        bail!("{}", stop_message(reason, timeout));
    };
    watchdog.abort();
    println!(
        "Matched {} {} (distance {:.3})",
        candidate.code, candidate.full_name, candidate.distance
    );

    let question = format!("Record {} for {}? [y/N] ", args.kind, candidate.code);
    if !args.yes && !is_yes(&prompt(&question).await?) {
        session.reset();
        println!("Not recorded");
        return Ok(());
    }

    let evidence = match &args.photo {
        Some(path) => Some(evidence::load_photo(path).await?),
        None => None,
    };
    let sink = ApiCommitSink {
        client: &client,
        kind: args.kind,
        device: app.config.device.clone(),
        gps,
    };
    let receipt = session.commit(&sink, evidence).await?;
    print_json(&receipt.raw)?;

    app.record(
        format!("Face {} • code {}", args.kind, candidate.code),
        format!("{} • distance {:.3}", candidate.full_name, candidate.distance),
    )?;
    match receipt.recorded_at {
        Some(at) => println!("Recorded at {at}"),
        None => println!("Recorded"),
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanStop {
    TimedOut,
    Interrupted,
}

fn stop_message(reason: ScanStop, timeout: Duration) -> String {
    match reason {
        ScanStop::TimedOut => format!("no stable match within {}s", timeout.as_secs()),
        ScanStop::Interrupted => "scan interrupted before a stable match".to_string(),
    }
}

async fn attachment(field: &str, path: Option<&std::path::Path>) -> Result<Option<Attachment>> {
    match path {
        Some(p) => Ok(Some(
            Attachment::from_path(field, p)
                .await
                .with_context(|| format!("failed to read {}", p.display()))?,
        )),
        None => Ok(None),
    }
}

/// Print `question` and read one line from stdin.
async fn prompt(question: &str) -> Result<String> {
    use std::io::Write;

    print!("{question}");
    std::io::stdout().flush()?;
    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
