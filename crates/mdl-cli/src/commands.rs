use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::{json, Value};

use mdl_crypto::{to_canonical_string, ContentHasher};
use mdl_gate::{BackpressureGuard, EvictionPolicySource, GateConfig, RedisPolicySource};
use mdl_server::{MedLedgerServer, ServerConfig};
use mdl_types::Asset;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::CheckPolicy(args) => cmd_check_policy(args, cli.format).await,
        Command::Canonical(args) => cmd_canonical(args, cli.format),
    }
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if config.tenants.iter().all(|t| t.api_keys.is_empty()) {
        tracing::warn!("no API keys configured, every request will be rejected");
    }

    println!(
        "{} MedLedger on {} ({} replicas, {} tenants)",
        "▶".green().bold(),
        config.bind_addr.to_string().bold(),
        config.replicas.len(),
        config.tenants.len()
    );
    MedLedgerServer::build(config).await?.serve().await?;
    Ok(())
}

async fn cmd_check_policy(args: CheckPolicyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = GateConfig::default();
    let source = Arc::new(RedisPolicySource::open(&args.redis)?);
    let reply = source.config_get(&config.policy_parameter).await;
    let guard = BackpressureGuard::new(source, config.clone());
    let admits = guard.check_admission_policy().await;

    match format {
        OutputFormat::Json => {
            let reply = match &reply {
                Ok(reply) => json!(reply),
                Err(err) => json!({ "error": err.to_string() }),
            };
            println!("{}", json!({ "redis": args.redis, "reply": reply, "admits": admits }));
        }
        OutputFormat::Text => {
            match &reply {
                Ok(reply) => println!("CONFIG GET {}: {:?}", config.policy_parameter, reply),
                Err(err) => println!("CONFIG GET {}: {}", config.policy_parameter, err.to_string().red()),
            }
            if admits {
                println!("{} {} accepts jobs", "✓".green().bold(), args.redis.bold());
            } else {
                println!(
                    "{} {} would refuse jobs (requires {} = {})",
                    "✗".red().bold(),
                    args.redis.bold(),
                    config.policy_parameter,
                    config.required_policy.yellow()
                );
            }
        }
    }

    if !admits {
        anyhow::bail!("{} is not usable as a job store", args.redis);
    }
    Ok(())
}

fn cmd_canonical(args: CanonicalArgs, format: OutputFormat) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not JSON", args.file.display()))?;

    let kind = if args.asset {
        let asset = Asset::from_value(value.clone())?;
        asset.validate()?;
        Some(asset.kind())
    } else {
        None
    };
    let canonical = to_canonical_string(&value)?;
    let digest = ContentHasher::RECORD.hash(canonical.as_bytes());

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "canonical": canonical,
                "digest": digest.to_hex(),
                "kind": kind.map(|k| k.as_str()),
            })
        ),
        OutputFormat::Text => {
            println!("{canonical}");
            if let Some(kind) = kind {
                println!("  Kind:   {}", kind.as_str().cyan());
            }
            println!("  Digest: {}", digest.to_hex().yellow());
        }
    }
    Ok(())
}
