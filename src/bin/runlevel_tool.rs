use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use clap::Parser;
use runlevel_locator::{
    ActivationPolicy, LocatorConfig, RUNLEVEL_INITIAL, RollbackPolicy, ServiceDescriptor,
    ServiceHandle, ServiceLifecycle, ServiceLocator,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runlevel-tool")]
#[command(about = "Walk a scripted service manifest through its run levels")]
struct Cli {
    /// JSON manifest describing the services to bring up
    #[arg(long)]
    manifest: PathBuf,

    /// Run level to proceed to; defaults to the highest declared level
    #[arg(long, allow_negative_numbers = true)]
    target: Option<i32>,

    /// Activate the services of a level one at a time
    #[arg(long)]
    sequential: bool,

    /// Roll back only the failing level instead of everything
    #[arg(long)]
    step_down: bool,

    /// Leave the services up instead of shutting down afterwards
    #[arg(long)]
    keep: bool,

    #[arg(long, short)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    config: Option<LocatorConfig>,
    services: Vec<ScriptedService>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptedService {
    implementation: String,
    #[serde(default)]
    contracts: Vec<String>,
    #[serde(default)]
    name: Option<String>,
    run_level: i32,
    #[serde(default)]
    rank: i32,
    #[serde(default)]
    delay_ms: u64,
    #[serde(default)]
    fail_on_activate: bool,
    #[serde(default)]
    fail_on_deactivate: bool,
}

/// Lifecycle that sleeps and fails the way the manifest tells it to
struct ScriptedLifecycle {
    scripts: HashMap<String, ScriptedService>,
}

impl ScriptedLifecycle {
    fn script(&self, service: &ServiceHandle) -> Result<&ScriptedService> {
        self.scripts
            .get(service.implementation())
            .ok_or_else(|| anyhow!("no script for '{}'", service.implementation()))
    }
}

#[async_trait]
impl ServiceLifecycle for ScriptedLifecycle {
    async fn activate(&self, service: &ServiceHandle) -> Result<()> {
        let script = self.script(service)?;
        if script.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(script.delay_ms)).await;
        }
        if script.fail_on_activate {
            return Err(anyhow!("scripted activation failure"));
        }
        println!("  + {}", service);
        Ok(())
    }

    async fn deactivate(&self, service: &ServiceHandle) -> Result<()> {
        let script = self.script(service)?;
        if script.fail_on_deactivate {
            return Err(anyhow!("scripted deactivation failure"));
        }
        println!("  - {}", service);
        Ok(())
    }
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse manifest '{}'", path.display()))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "runlevel_locator=debug" } else { "runlevel_locator=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let manifest = load_manifest(&cli.manifest)?;
    let mut config = manifest.config.unwrap_or_default();
    if cli.sequential {
        config = config.activation_policy(ActivationPolicy::Sequential);
    }
    if cli.step_down {
        config = config.rollback_policy(RollbackPolicy::StepDown);
    }

    let lifecycle = Arc::new(ScriptedLifecycle {
        scripts: manifest
            .services
            .iter()
            .map(|s| (s.implementation.clone(), s.clone()))
            .collect(),
    });
    let locator = ServiceLocator::with_config(config, lifecycle)?;

    for service in &manifest.services {
        let mut descriptor = ServiceDescriptor::new(&service.implementation)
            .run_level(service.run_level)
            .rank(service.rank);
        for contract in &service.contracts {
            descriptor = descriptor.contract(contract);
        }
        if let Some(name) = &service.name {
            descriptor = descriptor.name(name);
        }
        locator.register(descriptor)?;
    }

    let target = cli
        .target
        .or_else(|| locator.registry().levels().into_iter().max())
        .unwrap_or(RUNLEVEL_INITIAL);

    println!(
        "Locator '{}': {} service(s), proceeding to run level {} ({}, {})",
        locator.config().name,
        locator.registry().len(),
        target,
        locator.config().activation_policy,
        locator.config().rollback_policy
    );

    let outcome = locator.proceed_to(target).await;
    match &outcome {
        Ok(report) => println!("{}", report),
        Err(err) => {
            println!("Transition failed: {}", err);
            for failure in err.teardown_failures() {
                println!("  ! {}", failure);
            }
        }
    }

    if !cli.keep {
        let report = locator.shutdown().await?;
        println!("{}", report);
        for failure in &report.teardown_failures {
            println!("  ! {}", failure);
        }
    }

    outcome?;
    Ok(())
}
