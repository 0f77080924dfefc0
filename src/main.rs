//! Shardline - Routing and Dispatch Core for Sharded, Replicated Services
//!
//! Command line front end: writes and validates configuration files and
//! runs an in-process cluster simulation through the routing engine.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shardline::config::{default_config_path, ShardlineConfig};
use shardline::context::ServiceContext;
use shardline::dispatcher::OffCriticalHandler;
use shardline::error::{Error, Result};
use shardline::layout::{plan, AllocationPolicy};
use shardline::registry::TypeRegistry;
use shardline::routing::{SelectionPolicy, ServiceClient};
use shardline::service::Service;
use shardline::substrate::{ClientTransport, GroupTransport, LocalCluster, LocalMember};
use shardline::types::{Action, NodeId, Object};

/// Shardline - Routing and Dispatch Core for Sharded, Replicated Services
#[derive(Parser)]
#[command(name = "shardline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value_os_t = default_config_path())]
        output: PathBuf,

        /// Node ID
        #[arg(long, default_value_t = 1)]
        node_id: NodeId,
    },

    /// Validate configuration file
    Validate,

    /// Show the planned shard layout
    Info,

    /// Run an in-process cluster and route a workload through it
    Simulate {
        /// Nodes in the group, this node included
        #[arg(short, long, default_value_t = 4)]
        nodes: u32,

        /// Objects written per shard
        #[arg(long, default_value_t = 8)]
        ops: u32,

        /// Keep running until Ctrl+C
        #[arg(long)]
        hold: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it is readable
    let logging = ShardlineConfig::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    let level = cli.log_level.clone().unwrap_or(logging.level);
    init_logging(&level, &logging.format);

    match cli.command {
        Commands::Init { output, node_id } => run_init(output, node_id),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
        Commands::Simulate { nodes, ops, hold } => run_simulate(cli.config, nodes, ops, hold).await,
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Registry with one versioned store type per layout entry
fn registry_for(config: &ShardlineConfig) -> Result<Arc<TypeRegistry>> {
    let mut builder = TypeRegistry::builder();
    for (i, entry) in config.layout.0.iter().enumerate() {
        let name = entry.name.clone().unwrap_or_else(|| format!("type{}", i));
        builder = builder.register(name);
    }
    Ok(Arc::new(builder.build()?))
}

/// Write a sample configuration file
fn run_init(output: PathBuf, node_id: NodeId) -> Result<()> {
    std::fs::write(&output, ShardlineConfig::sample(node_id))?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the layout and routing sections for your deployment.");
    println!("Then try it with: shardline --config {} simulate", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    let checked = ShardlineConfig::from_file(&config_path).and_then(|config| {
        let registry = registry_for(&config)?;
        plan(&config.layout, &registry)?;
        config.policy_bindings(&registry)?;
        Ok(config)
    });

    match checked {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Data Types: {}", config.layout.len());
            println!("  Default Policy: {}", config.routing.default_policy);
            println!("  Policy Overrides: {}", config.routing.policies.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show the planned layout
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = ShardlineConfig::from_file(&config_path)?;
    let registry = registry_for(&config)?;
    let info = plan(&config.layout, &registry)?;

    println!("Shardline Node Information");
    println!("==========================");
    println!();
    println!("Node ID:          {}", config.node.id);
    println!("Thread Prefix:    {}", config.node.thread_name);
    if config.dispatcher.pool_size == 0 {
        println!();
        println!("Auto-tuned:");
        for line in shardline::tuning::tuning_summary(&shardline::tuning::auto_tune()).lines() {
            println!("  {}", line.trim());
        }
        println!();
    } else {
        println!("Pool Size:        {}", config.dispatcher.pool_size);
    }
    println!("Default Policy:   {}", config.default_policy()?);
    println!();
    println!("Layout:");
    for descriptor in registry.iter() {
        match info.policy(descriptor.data_type) {
            Some(AllocationPolicy::Sharded(subgroups)) => {
                println!("  {} ({})", descriptor.name, descriptor.data_type);
                for (i, subgroup) in subgroups.iter().enumerate() {
                    println!(
                        "    subgroup {}: {} shards, min {:?}, max {:?}, {:?}",
                        i,
                        subgroup.num_shards(),
                        subgroup.min_nodes_by_shard,
                        subgroup.max_nodes_by_shard,
                        subgroup.mode
                    );
                }
            }
            Some(AllocationPolicy::CrossProduct(cross)) => {
                println!(
                    "  {} ({}): cross product {:?} -> {:?}",
                    descriptor.name, descriptor.data_type, cross.source, cross.target
                );
            }
            None => println!("  {} ({}): no layout", descriptor.name, descriptor.data_type),
        }
    }

    Ok(())
}

/// Run an in-process cluster through the routing engine
async fn run_simulate(config_path: PathBuf, nodes: u32, ops: u32, hold: bool) -> Result<()> {
    if nodes == 0 {
        return Err(Error::Config("simulate needs at least one node".into()));
    }

    let config = ShardlineConfig::from_file(&config_path)?;
    let registry = registry_for(&config)?;
    let info = plan(&config.layout, &registry)?;
    let cluster = LocalCluster::with_barrier_timeout(info, Arc::clone(&registry), config.barrier_timeout());
    let me = config.node.id;

    let handled = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&handled);
    let handler: Arc<dyn OffCriticalHandler<ServiceContext>> =
        Arc::new(move |action: Action, ctx: &ServiceContext| {
            counter.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                node = ctx.node_id(),
                key = %action.key,
                object = %action.object_key,
                version = action.version,
                "action handled"
            );
        });

    let joining = cluster.clone();
    let service = Service::start(&config, Arc::clone(&registry), handler, move |_, context| {
        let member = joining.join(me, Some(context))?;
        Ok(member as Arc<dyn GroupTransport>)
    })?
    .ok_or_else(|| Error::Internal("a service is already running".into()))?;
    let service = Arc::new(service);

    let peers: Vec<Arc<LocalMember>> = (0..nodes)
        .map(|i| if i >= me { i + 1 } else { i })
        .take(nodes as usize - 1)
        .map(|id| cluster.join(id, None))
        .collect::<Result<_>>()?;

    println!("Simulated group: {:?}", cluster.members());
    let client = service.client();
    for key in cluster.info().shard_keys() {
        println!("  {} -> {:?}", key, cluster.shard_members(key));
    }
    println!();

    // Workload through this node's routing engine
    let mut written = 0u64;
    for key in cluster.info().shard_keys() {
        if client.get_shard_members(key).is_empty() {
            println!("  {}: no members, skipped", key);
            continue;
        }
        for i in 0..ops {
            let pending = client.put(key, Object::new(format!("obj-{}", i), format!("value-{}", i)))?;
            let route = pending.route();
            let receipt = pending.await?;
            tracing::debug!(%key, ?route, version = receipt.version, "put");
            written += 1;
        }
        let keys = client.list_keys(key, None)?.await?;
        let picks: Vec<NodeId> = (0..4)
            .map(|_| client.pick_member(key, false))
            .collect::<Result<_>>()?;
        println!(
            "  {}: {} objects, my shard: {:?}, next picks: {:?}",
            key,
            keys.len(),
            client.my_shard(key.data_type, key.subgroup),
            picks
        );
    }

    // The same reads from outside the group
    let external = ServiceClient::external(
        cluster.external_client() as Arc<dyn ClientTransport>,
        Arc::clone(&registry),
        SelectionPolicy::Random,
    );
    for key in cluster.info().shard_keys() {
        if external.get_shard_members(key).is_empty() {
            continue;
        }
        let size = external.get_size(key, "obj-0", None)?.await?;
        println!("  external read {} obj-0: {} bytes", key, size);
    }
    println!();
    println!("Wrote {} objects", written);

    if hold {
        println!("Running; press Ctrl+C to stop");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        ctrlc::set_handler(move || {
            let _ = tx.send(());
        })
        .map_err(|e| Error::Internal(format!("failed to install Ctrl+C handler: {}", e)))?;
        rx.recv().await;
        println!("\nStopping");
    }

    // Peers meet this node at the shutdown barrier, then leave
    let peer_threads: Vec<_> = peers
        .into_iter()
        .map(|peer| {
            std::thread::spawn(move || {
                if let Err(e) = peer.barrier_sync() {
                    tracing::warn!(node = peer.my_id(), error = %e, "peer barrier failed");
                }
                peer.leave()
            })
        })
        .collect();

    let stopping = Arc::clone(&service);
    tokio::task::spawn_blocking(move || stopping.stop(true))
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;
    for thread in peer_threads {
        if let Ok(Err(e)) = thread.join() {
            tracing::warn!(error = %e, "peer leave failed");
        }
    }

    println!("Handled {} actions off the critical path", handled.load(Ordering::Relaxed));
    Ok(())
}
