// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use dagwood_reasoner::config::{load_and_validate_config, RuntimeBuilder};
use dagwood_reasoner::traits::QueryResolver;
use tracing_subscriber::EnvFilter;

/// Initialise the fmt subscriber, honouring `RUST_LOG` and defaulting to `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <config1.yaml> [config2.yaml ...]", args[0]);
        eprintln!("Example: {} configs/social-network.yaml", args[0]);
        std::process::exit(1);
    }

    let mut failed = 0;
    for config_file in &args[1..] {
        if let Err(e) = run_single_config(config_file).await {
            eprintln!("❌ Failed to resolve {}: {:#}", config_file, e);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(anyhow!("{} of {} configurations failed", failed, args.len() - 1));
    }
    Ok(())
}

/// Resolve every query in one config file, printing each answer as a JSON line.
async fn run_single_config(config_file: &str) -> Result<()> {
    let start_time = Instant::now();

    let config = load_and_validate_config(config_file).map_err(|e| anyhow!("{}", e))?;
    let (reasoner, _graph) = RuntimeBuilder::from_config(&config).map_err(|e| anyhow!(e))?;

    eprintln!("📋 Configuration: {}", config_file);
    eprintln!("🛡️  Failure Strategy: {:?}", config.failure_strategy);
    eprintln!("📐 Rules: {}", reasoner.rules().len());

    for (index, query) in config.queries.iter().enumerate() {
        let answers = reasoner
            .resolve(query)
            .await
            .with_context(|| format!("query {} ({})", index, query))?;

        eprintln!("🔎 Query {}: {} → {} answers", index, query, answers.len());
        for answer in &answers {
            let line = serde_json::json!({ "query": index, "answer": answer });
            println!("{}", line);
        }
    }

    eprintln!("⏱️  Total Time: {:?}", start_time.elapsed());
    Ok(())
}
