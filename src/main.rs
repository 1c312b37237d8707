use anyhow::Result;
use clap::Parser;
use pixelphone::app::{App, AppBuilder};
use pixelphone::config::{Cli, Command, Config};
use pixelphone::simulator::Simulator;
use std::fs::File;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::resolve(cli.conf.as_deref())?;

    let mut log_fmt = tracing_subscriber::fmt();
    if let Some(ref level) = config.log_level {
        if let Ok(lv) = level.as_str().parse::<LevelFilter>() {
            log_fmt = log_fmt.with_max_level(lv);
        }
    }
    let _guard = if let Some(ref log_file) = config.log_file {
        let file = File::create(log_file)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        log_fmt.with_writer(non_blocking).try_init().ok();
        Some(guard)
    } else {
        log_fmt.try_init().ok();
        None
    };

    let app = Arc::new(AppBuilder::new().config(config).build()?);

    match cli.command {
        Command::Check => check(&app).await,
        Command::Simulate {
            inputs,
            hangup,
            caller,
            record,
        } => simulate(app, inputs, hangup, &caller, record).await,
    }
}

async fn check(app: &App) -> Result<()> {
    let config = &app.config;
    println!("sip account:    {}@{}:{}", config.sip.user, config.sip.domain, config.sip.port);
    println!("drawing server: {} (event {})", config.pixelebbe.url, config.pixelebbe.event);
    println!("max attempts:   {}", config.ivr.max_retries);
    println!("colors:");
    for (i, color) in app.context().catalog.iter().enumerate() {
        println!("  {:>2} {}", i + 1, color);
    }

    let mut problems = Vec::new();
    match config.pixelebbe.require_private_key() {
        Ok(()) => println!("private key:    set"),
        Err(e) => problems.push(e.to_string()),
    }
    let missing = app.check_prompts().await;
    if missing.is_empty() {
        println!("prompts:        ok ({})", config.ivr.audio_dir);
    } else {
        problems.push(format!(
            "missing prompts in {}: {}",
            config.ivr.audio_dir,
            missing.join(", ")
        ));
    }
    if !problems.is_empty() {
        anyhow::bail!("{}", problems.join("; "));
    }
    Ok(())
}

async fn simulate(
    app: Arc<App>,
    inputs: Vec<String>,
    hangup: bool,
    caller: &str,
    record: Option<String>,
) -> Result<()> {
    let runner = {
        let app = app.clone();
        tokio::spawn(async move { app.run().await })
    };

    info!(caller, inputs = ?inputs, "simulating call");
    let simulation = Simulator::new(caller)
        .inputs(inputs)
        .hangup_when_done(hangup)
        .record_audio(record.is_some())
        .run(&app)
        .await?;

    if let Some(path) = record {
        match simulation.write_wav(&path) {
            Ok(()) => info!(path = %path, "call audio written"),
            Err(e) => warn!(path = %path, "failed to write call audio: {}", e),
        }
    }
    println!("{}", serde_json::to_string_pretty(&simulation.record)?);

    app.stop();
    runner.await??;
    Ok(())
}
