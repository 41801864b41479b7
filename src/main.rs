use anyhow::{Context, Result};

use rotolog::{DefaultDirs, DirectoryResolver, LogConfig, LogContext};

#[tokio::main]
async fn main() -> Result<()> {
    let config = LogConfig::load()?;

    // Initialize the logger BEFORE any tracing calls so they reach the bridge
    let core = rotolog::init_global(&DefaultDirs, &config).with_context(|| {
        format!(
            "Failed to initialize logging in {}",
            DefaultDirs.log_dir().display()
        )
    })?;

    let ctx = LogContext::new_trace().with_component("Demo");
    core.info(&ctx, &format!("Logging to {}", core.log_path().display()));
    if let Some(crash_file) = core.crash_file() {
        core.debug(&ctx, &format!("Crash reports go to {}", crash_file.display()));
    }

    // Output from anything using the global tracing/log destination lands as [SYS LOG]
    tracing::info!("Captured through the bridge");

    let mut workers = Vec::new();
    for worker in 0..4 {
        workers.push(tokio::spawn(async move {
            let ctx = LogContext::new_trace().with_component(format!("Worker{worker}"));
            for step in 0..3 {
                core.debug(&ctx, &format!("step {step}"));
            }
            core.info(&ctx, "done");
        }));
    }
    for worker in workers {
        worker.await.context("Worker task failed")?;
    }

    if core.dropped_lines() > 0 {
        core.warn(&ctx, &format!("{} log lines were dropped", core.dropped_lines()));
    }

    core.shutdown();
    println!("Logs written to {}", core.log_path().display());
    Ok(())
}
