use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tether_api::{ConfigMap, FlexModule, Plugin, PluginConfig};
use tether_core::CallContext;
use tether_example::{DemoHost, GREET_API, HelloPlugin};
use tether_protocol::handshake::{MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE};
use tether_protocol::{HostSession, ServeConfig, connect_in_process, connect_io, serve};
use tracing::info;
use tracing_subscriber::EnvFilter;

const PLUGIN_ID: &str = "hello";

/// Tether demo - a hello plugin and a host to run it against
#[derive(Parser)]
#[command(name = "tether-demo")]
#[command(about = "Run the tether hello plugin", long_about = None)]
#[command(version)]
struct Cli {
    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Subcommand)]
enum Commands {
    /// Run the plugin in this process against the demo host
    Run {
        /// Player who says hello
        #[arg(short, long, default_value = "steve")]
        player: String,
        /// Greeting handed to the plugin
        #[arg(short, long, default_value = "hello")]
        greeting: String,
    },
    /// Serve the plugin to the host that launched this process
    Serve {
        /// TOML file selecting the transport
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Launch a plugin executable over stdio and drive it with the demo host
    Launch {
        /// Plugin executable
        program: PathBuf,
        /// Arguments passed to the plugin
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
        /// Player who says hello
        #[arg(short, long, default_value = "steve")]
        player: String,
        /// Greeting handed to the plugin
        #[arg(short, long, default_value = "hello")]
        greeting: String,
    },
}

/// Logs go to stderr: stdout may be the plugin transport.
fn init_tracing(json: bool, verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn plugin_config(greeting: &str) -> (PluginConfig, ConfigMap) {
    let mut config = ConfigMap::new();
    config.insert("greeting".into(), greeting.into());
    let entry = PluginConfig {
        name: "Hello".into(),
        description: "says hello".into(),
        config: config.clone(),
        ..Default::default()
    };
    (entry, config)
}

/// Init and load the plugin, greet it once, call its API, then unload.
async fn drive(session: HostSession, player: &str, greeting: &str) -> anyhow::Result<()> {
    let host = DemoHost::new();
    let (entry, config) = plugin_config(greeting);
    host.configure(PLUGIN_ID, entry);

    let plugin = session.plugin();
    let ctx = CallContext::with_timeout(Duration::from_secs(5));
    plugin.init(host.frame(), PLUGIN_ID, config).await?;
    plugin.load(&ctx).await?;

    host.say(player, "hello there");
    match host.next_reply(Duration::from_secs(2)).await {
        Some(line) => println!("chat: {line}"),
        None => println!("chat: (no answer)"),
    }

    let reply = host
        .flex
        .call(&ctx, GREET_API, serde_json::to_vec(player)?)
        .await?;
    if reply.error.is_empty() {
        let text = String::from_utf8_lossy(&reply.result_bytes()).into_owned();
        println!("{GREET_API}: {text}");
    } else {
        println!("{GREET_API} failed: {}", reply.error);
    }

    plugin.unload(&ctx).await?;
    session.shutdown().await;
    info!("demo finished");
    Ok(())
}

async fn launch(program: PathBuf, args: Vec<String>) -> anyhow::Result<HostSession> {
    let mut child = tokio::process::Command::new(&program)
        .args(args)
        .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to launch {}", program.display()))?;
    let stdin = child.stdin.take().context("plugin stdin unavailable")?;
    let stdout = child.stdout.take().context("plugin stdout unavailable")?;
    info!(program = %program.display(), pid = child.id(), "plugin launched");

    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => info!(%status, "plugin exited"),
            Err(e) => tracing::warn!(error = %e, "lost track of plugin process"),
        }
    });
    Ok(connect_io(
        tokio::io::join(stdout, stdin),
        ServeConfig::default().broker,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, cli.verbose);

    match cli.command {
        Commands::Run { player, greeting } => {
            let session =
                connect_in_process(Arc::new(HelloPlugin::new()), ServeConfig::in_process())?;
            drive(session, &player, &greeting).await
        }
        Commands::Serve { config } => {
            let config = match config {
                Some(path) => ServeConfig::load(path)?,
                None => ServeConfig::default(),
            };
            serve(Arc::new(HelloPlugin::new()), config).await?;
            Ok(())
        }
        Commands::Launch {
            program,
            args,
            player,
            greeting,
        } => {
            let session = launch(program, args).await?;
            drive(session, &player, &greeting).await
        }
    }
}
