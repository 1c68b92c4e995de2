//! CLI entry point for the resource fetcher.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use fetcher_core::fetch::{FetchOptions, Fetcher, FetcherConfig, RequestBody};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

mod cli;
mod output;

use cli::Args;
use output::{ResultLine, target_paths};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries only result lines
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = FetcherConfig::new(
        usize::from(args.concurrency),
        args.timeout,
        u32::from(args.retries),
    )
    .context("invalid fetcher configuration")?;

    let targets = match &args.output_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("cannot create output directory {}", dir.display()))?;
            target_paths(dir, &args.urls).into_iter().map(Some).collect()
        }
        None => vec![None; args.urls.len()],
    };

    let base_options = request_options(&args);
    let fetcher = Fetcher::new(config);

    info!(
        urls = args.urls.len(),
        concurrency = args.concurrency,
        "Fetching"
    );

    let fetches = args.urls.iter().zip(targets).map(|(url, target)| {
        let options = match target {
            Some(path) => base_options.clone().stream_to(path),
            None => base_options.clone(),
        };
        fetcher.fetch(url, options)
    });
    let results = join_all(fetches).await;
    fetcher.close();

    let mut stdout = io::stdout().lock();
    let mut failures = 0usize;
    for (url, result) in args.urls.iter().zip(&results) {
        if let Err(err) = result {
            warn!(error = %err, attempts = err.attempts(), "Fetch failed");
            failures += 1;
        }
        let line = ResultLine::from_result(url, result);
        serde_json::to_writer(&mut stdout, &line).context("failed to encode result")?;
        writeln!(stdout).context("failed to write result")?;
    }
    stdout.flush().context("failed to flush stdout")?;

    info!(
        fetched = results.len() - failures,
        failed = failures,
        "Done"
    );

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Options shared by every URL of one invocation.
fn request_options(args: &Args) -> FetchOptions {
    let mut options = FetchOptions::new().method(args.method.into());
    for (name, value) in &args.headers {
        options = options.header(name.clone(), value.clone());
    }
    if let Some(data) = &args.data {
        options = options.body(RequestBody::Bytes(Bytes::from(data.clone())));
    }
    options
}
