use clap::Parser;
use mapstate_cli::commands::{cli, config, persist, simulate, sync};
use mapstate_cli::error::CliError;
use mapstate_cli::output::{print_json, EventPrinter};
use mapstate_core::api::AppConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let mut cfg = match args.config.as_deref() {
        Some(path) => mapstate_core::config::load_from_path(path),
        None => mapstate_core::config::load_default(),
    }
    .map_err(|e| CliError::Config(format!("{e:#}")))?;
    if let Some(dir) = args.storage_dir.clone() {
        cfg.store.storage_dir = Some(dir);
    }
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    dispatch(args, cfg).await
}

async fn dispatch(args: cli::Args, cfg: AppConfig) -> Result<i32, CliError> {
    let (ctx, surface) = mapstate_plugins::factory::build_context(cfg)?;
    let mut events = args.events.then(|| EventPrinter::new(ctx.events().subscribe()));

    let result = match args.command {
        cli::Commands::Simulate(sim_args) => {
            ctx.sync().start();
            let summary = simulate::handle_simulate(sim_args, &ctx, &surface).await;
            ctx.sync().shutdown();
            summary.and_then(to_json).map(Some)
        }
        cli::Commands::Sync(sync_args) => {
            ctx.sync().start();
            let status = sync::handle_sync(sync_args, &ctx).await;
            ctx.sync().shutdown();
            status.and_then(to_json).map(Some)
        }
        cli::Commands::Persist(persist_args) => {
            persist::handle_persist(persist_args, &ctx).map(Some)
        }
        cli::Commands::Restore(restore_args) => {
            persist::handle_restore(restore_args, &ctx).map(Some)
        }
        cli::Commands::Config => {
            print!("{}", config::render_config(ctx.cfg())?);
            Ok(None)
        }
    };

    if let Some(printer) = events.as_mut() {
        let stdout = std::io::stdout();
        let n = printer.drain(&mut stdout.lock())?;
        tracing::debug!(events = n, "event stream flushed");
    }

    if let Some(value) = result? {
        print_json(&value)?;
    }
    Ok(0)
}

fn to_json<T: serde::Serialize>(value: T) -> Result<serde_json::Value, CliError> {
    serde_json::to_value(value).map_err(|e| CliError::Anyhow(e.into()))
}

fn init_tracing(logging: &mapstate_core::config::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("mapstate"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("mapstate.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
