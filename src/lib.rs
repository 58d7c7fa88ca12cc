// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod errors;
pub mod exec;
pub mod jobs;
pub mod liveaction;
pub mod lock;
pub mod logging;
pub mod model;
pub mod policy;
pub mod queue;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod transport;
pub mod types;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, EnqueueArgs, ServeArgs};
use crate::clock::SystemClock;
use crate::config::{default_config_path, load_and_validate, ConfigFile, RawConfigFile};
use crate::exec::LocalRunner;
use crate::jobs::{run_periodic, PeriodicJob};
use crate::model::{EnqueueOptions, LiveAction};
use crate::scheduler::Scheduler;
use crate::services::Services;
use crate::storage::open_stores;
use crate::transport::ClusterTransport;
use crate::types::{ExecutionStatus, StorageBackend};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(&args)?;

    match args.command {
        Command::Serve(serve_args) => serve(cfg, serve_args).await,
        Command::Enqueue(enqueue_args) => enqueue(cfg, enqueue_args),
    }
}

/// An explicit `--config` must exist; the default path may be absent, in
/// which case every section takes its defaults.
fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    if let Some(path) = &args.config {
        return Ok(load_and_validate(path)?);
    }

    let path = default_config_path();
    if path.exists() {
        Ok(load_and_validate(&path)?)
    } else {
        info!(path = %path.display(), "no config file found; using defaults");
        Ok(ConfigFile::try_from(RawConfigFile::default())?)
    }
}

fn enqueue(cfg: ConfigFile, args: EnqueueArgs) -> Result<()> {
    if cfg.storage.backend == StorageBackend::Memory {
        warn!("storage backend is 'memory'; the request is lost when this process exits");
    }

    let stores = open_stores(&cfg.storage)?;
    let services = Services::build(cfg, stores, Arc::new(SystemClock))?;

    let mut parameters = json!({ "cmd": args.cmd });
    if let Some(timeout) = args.timeout {
        parameters["timeout"] = Value::from(timeout);
    }

    let liveaction = LiveAction::new(args.action, parameters, services.clock.now());
    services.liveactions.create(&liveaction)?;

    let mut options = EnqueueOptions::default()
        .delay(args.delay.unwrap_or_default())
        .priority(args.priority);
    if let Some(affinity) = args.affinity {
        options = options.affinity(affinity);
    }
    let request = services.queue.enqueue(liveaction, options)?;

    println!("{}", request.liveaction_id());
    Ok(())
}

async fn serve(cfg: ConfigFile, args: ServeArgs) -> Result<()> {
    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let stores = open_stores(&cfg.storage)?;
    let services = Services::build(cfg, stores, Arc::new(SystemClock))?;
    let mode = services.coordinator.start().await;
    info!(?mode, "coordinator started");

    // Transport + local runner reporting completions back to the scheduler.
    let (transport, nodes) = ClusterTransport::from_config(&services.config.transport);
    let (done_tx, mut done_rx) = mpsc::channel::<LiveAction>(services.config.transport.channel_capacity);
    let _runners = LocalRunner::new(services.liveactions.clone(), done_tx).spawn(nodes);

    let scheduler = Arc::new(services.scheduler(Arc::new(transport)));

    let completed = Arc::new(AtomicUsize::new(0));
    {
        let scheduler = scheduler.clone();
        let completed = completed.clone();
        tokio::spawn(async move {
            while let Some(liveaction) = done_rx.recv().await {
                if let Err(err) = scheduler.handle_completion(liveaction) {
                    warn!(error = %err, "failed to apply after-policies");
                }
                completed.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    let result = if args.once {
        run_once(&services, &scheduler, &completed).await
    } else {
        run_forever(&services, scheduler).await
    };

    services.coordinator.stop().await;
    result
}

/// Serve until Ctrl-C: scheduler loop plus the periodic jobs.
async fn run_forever(services: &Services, scheduler: Arc<Scheduler>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let jobs: Vec<Arc<dyn PeriodicJob>> = vec![
        Arc::new(services.rescheduler()),
        Arc::new(services.garbage_collector()),
    ];
    let job_handles: Vec<_> = jobs
        .into_iter()
        .map(|job| tokio::spawn(run_periodic(job, shutdown_rx.clone())))
        .collect();

    // Ctrl-C → graceful shutdown.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await?;

    for handle in job_handles {
        if let Err(err) = handle.await {
            warn!(error = %err, "periodic job task failed");
        }
    }
    Ok(())
}

/// Drain the queue and wait for every dispatched execution to finish.
/// Delayed executions are picked up by the rescheduler as they go stale.
async fn run_once(services: &Services, scheduler: &Scheduler, completed: &AtomicUsize) -> Result<()> {
    let rescheduler = services.rescheduler();
    let poll = services.config.scheduler.poll_interval;

    loop {
        let handled = scheduler.drain().await?;
        rescheduler.tick().await?;

        let in_flight = scheduler
            .dispatched_count()
            .saturating_sub(completed.load(Ordering::SeqCst));
        let delayed = services
            .stores
            .liveactions
            .query_liveactions(ExecutionStatus::Delayed, services.clock.now())?
            .len();

        if handled == 0 && in_flight == 0 && delayed == 0 && services.queue.is_empty()? {
            break;
        }
        debug!(handled, in_flight, delayed, "waiting for executions to settle");
        tokio::time::sleep(poll).await;
    }

    info!(dispatched = scheduler.dispatched_count(), "queue drained; exiting");
    Ok(())
}

/// Simple dry-run output: print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("runq dry-run");
    println!(
        "  scheduler: poll_interval={:?} pool_size={} backoff={:?}x{}..{:?}",
        cfg.scheduler.poll_interval,
        cfg.scheduler.pool_size,
        cfg.scheduler.backoff_initial,
        cfg.scheduler.backoff_multiplier,
        cfg.scheduler.backoff_max
    );
    println!(
        "  rescheduler: interval={:?} recovery_threshold={:?} lock={}",
        cfg.rescheduler.interval, cfg.rescheduler.recovery_threshold, cfg.rescheduler.lock_name
    );
    println!(
        "  garbage_collector: interval={:?} executions_ttl={:?} purge_incomplete={} lock={}",
        cfg.garbage_collector.interval,
        cfg.garbage_collector.executions_ttl,
        cfg.garbage_collector.purge_incomplete,
        cfg.garbage_collector.lock_name
    );
    println!(
        "  lock: backend={:?} timeout={:?} poll_interval={:?} ttl={:?}",
        cfg.lock.backend, cfg.lock.timeout, cfg.lock.poll_interval, cfg.lock.ttl
    );
    match &cfg.coordination.url {
        Some(url) => println!("  coordination: {url}"),
        None => println!("  coordination: (none, degraded)"),
    }
    match &cfg.storage.path {
        Some(path) => println!("  storage: {:?} at {}", cfg.storage.backend, path.display()),
        None => println!("  storage: {:?}", cfg.storage.backend),
    }
    println!(
        "  transport: cluster_size={} channel_capacity={}",
        cfg.transport.cluster_size, cfg.transport.channel_capacity
    );
    println!();

    println!("policies ({}):", cfg.policy.len());
    for policy in cfg.policy.iter() {
        println!("  - {}", policy.name);
        println!("      resource_ref: {}", policy.resource_ref);
        println!("      policy_type: {}", policy.policy_type);
        if !policy.enabled {
            println!("      enabled: false");
        }
        println!("      parameters: {}", policy.parameters);
    }

    debug!("dry-run complete (no execution)");
}
