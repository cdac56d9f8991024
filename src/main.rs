use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use jobboard_sync::api::{
    AuthContext, HttpJobBoardApi, JobBoardApi, KeyValueStore, MemoryJobBoard,
    MemoryKeyValueStore, SessionUser,
};
use jobboard_sync::config::AppConfig;
use jobboard_sync::error::AppError;
use jobboard_sync::sync::{
    AppState, ApplicationDraft, ApplicationStatus, ChannelDispatcher, Collection, CsvJobSeed,
    DemoSeed, DerivedStats, JobDraft, JobFilter, LoadPhase, NoopDispatcher, NotificationDispatcher,
    Role, SeedProvider, SyncEvent, SyncOptions, TransitionMode,
};
use jobboard_sync::telemetry;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "jobboard-sync",
    about = "Synchronize job board jobs, applications, and notifications",
    version
)]
struct Cli {
    /// Override the configured transition mode (optimistic or confirmed)
    #[arg(long, global = true, value_parser = parse_mode)]
    transition_mode: Option<TransitionMode>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the recruiter scenario against the in-memory backend (default command)
    Demo(DemoArgs),
    /// Fetch every collection from the configured API and report per-collection status
    Sync(SyncArgs),
}

#[derive(Args, Debug, Default)]
struct DemoArgs {
    /// CSV of extra jobs to seed into the recruiter's view
    #[arg(long)]
    seed_csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Bearer token for the API
    #[arg(long)]
    token: String,
    /// Id of the signed-in account
    #[arg(long)]
    user_id: String,
    /// Sign in as a recruiter instead of a job seeker
    #[arg(long)]
    recruiter: bool,
    /// Override the configured API base URL
    #[arg(long)]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    if let Some(mode) = cli.transition_mode {
        config.sync.transition_mode = mode;
    }
    telemetry::init(&config.telemetry)?;

    let command = cli
        .command
        .unwrap_or_else(|| Command::Demo(DemoArgs::default()));

    match command {
        Command::Demo(args) => run_demo(&config, args).await,
        Command::Sync(args) => run_sync(config, args).await,
    }
}

fn parse_mode(raw: &str) -> Result<TransitionMode, String> {
    TransitionMode::parse(raw).ok_or_else(|| format!("unknown transition mode '{raw}'"))
}

fn options(config: &AppConfig) -> SyncOptions {
    SyncOptions {
        transition_mode: config.sync.transition_mode,
        ..SyncOptions::default()
    }
}

fn state_for<A, D>(
    api: A,
    dispatcher: Arc<D>,
    user: SessionUser,
    config: &AppConfig,
) -> AppState<A, D>
where
    A: JobBoardApi + 'static,
    D: NotificationDispatcher + 'static,
{
    AppState::new(Arc::new(api), dispatcher, user, options(config))
}

async fn run_demo(config: &AppConfig, args: DemoArgs) -> Result<(), AppError> {
    let board = MemoryJobBoard::new();
    let recruiter = SessionUser::new("demo-recruiter", "Rita Recruiter", Role::Recruiter);
    let seeker = SessionUser::new("demo-seeker", "Sam Seeker", Role::JobSeeker);

    let (dispatcher, mut events) = ChannelDispatcher::new();
    let recruiter_state = state_for(
        board.session(&recruiter.id),
        Arc::new(dispatcher),
        recruiter.clone(),
        config,
    );
    let seeker_state = state_for(
        board.session(&seeker.id),
        Arc::new(NoopDispatcher),
        seeker,
        config,
    );

    if config.environment.allows_seed_data() {
        let provider: Box<dyn SeedProvider> = match args.seed_csv {
            Some(path) => Box::new(CsvJobSeed::new(path)),
            None => Box::new(DemoSeed::new(recruiter.id.clone())),
        };
        for job in provider.jobs()? {
            board.insert_job(job);
        }
        let summary = recruiter_state.apply_seed(provider.as_ref())?;
        info!(jobs = summary.jobs, "demo seed loaded");
    }

    let mut draft = JobDraft::new("Backend Engineer", "Acme Corp");
    draft.location = "Remote".to_string();
    draft.remote = true;
    let job = recruiter_state.post_job(draft).await?;
    println!("Posted {} ({})", job.title, job.id);

    seeker_state.fetch_jobs(JobFilter::default()).await?;
    let application = seeker_state
        .apply(
            &job.id,
            ApplicationDraft {
                cover_letter: "I have shipped Rust services for five years.".to_string(),
                ..ApplicationDraft::default()
            },
        )
        .await?;
    println!("Seeker applied: {} is {}", application.id, application.status);

    recruiter_state.fetch_applications().await?;
    recruiter_state
        .transition(&application.id, ApplicationStatus::Shortlisted)
        .await?;
    print_stats("After shortlisting", &recruiter_state.stats());

    recruiter_state
        .transition(&application.id, ApplicationStatus::Accepted)
        .await?;
    print_stats("After accepting", &recruiter_state.stats());

    match recruiter_state
        .transition(&application.id, ApplicationStatus::Rejected)
        .await
    {
        Ok(_) => warn!("terminal application accepted another transition"),
        Err(err) => println!("Rejecting afterwards fails as expected: {err}"),
    }

    while let Ok(event) = events.try_recv() {
        let SyncEvent::ApplicationStatusChanged { from, to, .. } = event;
        println!("Event: application moved {from} -> {to}");
    }

    seeker_state.fetch_notifications().await?;
    let marked = seeker_state.mark_all_read().await?;
    println!("Seeker read {marked} notification(s)");
    Ok(())
}

async fn run_sync(mut config: AppConfig, args: SyncArgs) -> Result<(), AppError> {
    if let Some(url) = args.api_url {
        config.api.base_url = url;
    }
    let role = if args.recruiter {
        Role::Recruiter
    } else {
        Role::JobSeeker
    };

    let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    AuthContext {
        user: SessionUser::new(args.user_id, "", role),
        token: args.token,
    }
    .store_into(storage.as_ref())?;
    let auth = AuthContext::from_store(storage.as_ref())?;

    let api = HttpJobBoardApi::new(&config.api.base_url, config.api.timeout(), storage)?;
    let state = state_for(api, Arc::new(NoopDispatcher), auth.user, &config);

    info!(base_url = %config.api.base_url, role = role.label(), "syncing");
    let report = state.refresh_all().await;

    for collection in Collection::ALL {
        let status = state.collection_status(collection);
        match (status.phase, status.error) {
            (LoadPhase::Failed, Some(err)) => println!("{:<14} failed: {err}", collection.label()),
            (LoadPhase::Ready, _) => println!(
                "{:<14} ok (synced {})",
                collection.label(),
                status
                    .last_synced
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default()
            ),
            (phase, _) => println!("{:<14} {phase:?}", collection.label()),
        }
    }

    if role == Role::Recruiter {
        print_stats("Local stats", &state.stats());
        match state.fetch_remote_stats().await {
            Ok(remote) => println!(
                "Server stats: {} active jobs, {} candidates, {:.1}% success",
                remote.active_jobs, remote.candidates, remote.success_rate
            ),
            Err(err) => warn!(error = %err, "remote stats unavailable"),
        }
    }

    match report.failures().first() {
        Some((_, err)) => Err(AppError::Sync((*err).clone())),
        None => Ok(()),
    }
}

fn print_stats(heading: &str, stats: &DerivedStats) {
    println!(
        "{heading}: {} active jobs, {} candidates, {:.0}% success, {} unread",
        stats.active_jobs, stats.candidates, stats.success_rate, stats.unread_notifications
    );
}
