//! Contention simulator for Craftable likes.
//!
//! Spawns one thread per actor; every thread flips its own like on a single
//! shared post a number of times. Afterwards the stored record must agree with
//! itself (`likes == |likedBy|`) and with what each actor did last.
//!
//! Usage:
//!   craftable-sim --actors 16 --toggles 101
//!   RUST_LOG=craftable=debug craftable-sim -a 4 -t 10

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use craftable::{
    ActorId, CraftConfig, CraftEngine, CraftError, DocumentStore, EngagementTarget, InMemoryDocumentStore, NewPost,
    StaticAuth,
};

/// Craftable like/unlike contention simulator
#[derive(Parser, Debug)]
#[command(name = "craftable-sim")]
#[command(about = "Hammer one post with concurrent like toggles and check the result")]
struct Args {
    /// Number of concurrent actors
    #[arg(short, long, default_value_t = 8)]
    actors: usize,

    /// Toggles per actor. Odd counts leave every actor liking the post.
    #[arg(short, long, default_value_t = 51)]
    toggles: usize,

    /// Transaction retry budget
    #[arg(long, default_value_t = craftable::storage::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Default)]
struct ActorReport {
    last_intent: Option<bool>,
    failures: usize,
}

fn run_actor(engine: &CraftEngine, post_id: &craftable::PostId, toggles: usize) -> Result<ActorReport, CraftError> {
    let mut report = ActorReport::default();
    for round in 0..toggles {
        let liked = round % 2 == 0;
        match engine.set_post_liked(post_id, liked) {
            Ok(_) => report.last_intent = Some(liked),
            Err(err @ CraftError::ReconciliationFailed { .. }) => {
                warn!(error = %err, "Toggle gave up");
                report.failures += 1;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(report)
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let cfg = CraftConfig {
        transaction_max_attempts: args.max_attempts,
        ..CraftConfig::default()
    }
    .validate()?;
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::from_config(&cfg));

    let host = Arc::new(StaticAuth::signed_in(ActorId::new("host")?));
    let host_engine = CraftEngine::with_config(Arc::clone(&store), host, cfg.clone());
    let post_id = host_engine.create_post(&NewPost::new("Contended post", "simulation", "c2lt"))?;
    info!(%post_id, actors = args.actors, toggles = args.toggles, "Starting simulation");

    let started = Instant::now();
    let mut workers = Vec::with_capacity(args.actors);
    for i in 0..args.actors {
        let actor = ActorId::new(format!("actor-{i}"))?;
        let engine = CraftEngine::with_config(
            Arc::clone(&store),
            Arc::new(StaticAuth::signed_in(actor.clone())),
            cfg.clone(),
        );
        let post_id = post_id.clone();
        let toggles = args.toggles;
        let handle = thread::Builder::new()
            .name(format!("sim-{i}"))
            .spawn(move || run_actor(&engine, &post_id, toggles))
            .expect("failed to spawn simulation thread");
        workers.push((actor, handle));
    }

    let mut expected = std::collections::BTreeSet::new();
    let mut failures = 0;
    for (actor, handle) in workers {
        let report = handle
            .join()
            .map_err(|_| format!("simulation thread for {actor} panicked"))??;
        failures += report.failures;
        if report.last_intent == Some(true) {
            expected.insert(actor);
        }
    }
    let elapsed = started.elapsed();

    let record = host_engine.engagement(&EngagementTarget::post(post_id.clone()))?;
    let consistent = record.count() == record.engaged_by().len() as u64;
    let matches_intent = failures > 0 || record.engaged_by() == &expected;

    println!("post:           {post_id}");
    println!("likes:          {}", record.count());
    println!("likedBy:        {}", record.engaged_by().len());
    println!("gave up:        {failures}");
    println!("elapsed:        {elapsed:?}");
    println!("count matches:  {consistent}");
    println!("intent matches: {matches_intent}");

    if consistent && matches_intent {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
