// eiscp test application -- CLI tool for exercising an Onkyo, Pioneer, or
// Integra receiver over eISCP.
//
// Usage:
//   eiscp-test-app --host 192.168.1.40 ping
//   eiscp-test-app --host 192.168.1.40 power on
//   eiscp-test-app --host 192.168.1.40 --zone 2 volume set 30
//   eiscp-test-app --host 192.168.1.40 volume level 0.35
//   eiscp-test-app --host 192.168.1.40 input set NET
//   eiscp-test-app --config receiver.toml probe --json --output probe.json
//   eiscp-test-app --host 192.168.1.40 raw LMD QSTN
//   eiscp-test-app input list

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use eiscp::models::{input_label, standard_inputs};
use eiscp::probe::probe;
use eiscp::{EiscpClient, FromProbe, ReceiverConfig};
use eiscp_core::{Capabilities, Zone};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// eiscp test application -- controls a network receiver from the command line.
#[derive(Parser)]
#[command(name = "eiscp-test-app", version, about)]
struct Cli {
    /// Receiver host name or IP address. Required unless --config is given.
    #[arg(long)]
    host: Option<String>,

    /// TCP port (default: 60128, or the value from --config).
    #[arg(long)]
    port: Option<u16>,

    /// Zone identifier (e.g. 1 for main, 2 for zone 2).
    #[arg(long)]
    zone: Option<String>,

    /// TOML file with receiver settings. Command-line flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-command response timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether the receiver answers a power query.
    Ping,

    /// Power operations.
    Power {
        #[command(subcommand)]
        action: PowerAction,
    },

    /// Master volume operations.
    Volume {
        #[command(subcommand)]
        action: VolumeAction,
    },

    /// Muting operations.
    Mute {
        #[command(subcommand)]
        action: MuteAction,
    },

    /// Input selector operations.
    Input {
        #[command(subcommand)]
        action: InputAction,
    },

    /// Send a status query (e.g. `LMD`) and print the raw reply.
    Query {
        /// Three-letter command code.
        code: String,
    },

    /// Query every status value and report which ones the receiver answers.
    Probe {
        /// Print the raw report as JSON.
        #[arg(long)]
        json: bool,

        /// Write the JSON report to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Send an arbitrary command.
    Raw {
        /// Three-letter command code.
        code: String,

        /// Argument appended after the code.
        argument: Option<String>,

        /// Do not wait for a reply.
        #[arg(long)]
        no_response: bool,
    },
}

#[derive(Subcommand)]
enum PowerAction {
    /// Power on.
    On,
    /// Standby.
    Off,
    /// Read the power state.
    Get,
}

#[derive(Subcommand)]
enum VolumeAction {
    /// One step up.
    Up,
    /// One step down.
    Down,
    /// Absolute step (clamped to 0-255).
    Set {
        #[arg(allow_negative_numbers = true)]
        step: i64,
    },
    /// Level from 0.0 to 1.0, scaled by the volume resolution.
    Level { level: f32 },
    /// Read the current step.
    Get,
}

#[derive(Subcommand)]
enum MuteAction {
    /// Mute.
    On,
    /// Unmute.
    Off,
    /// Read the muting state.
    Get,
}

#[derive(Subcommand)]
enum InputAction {
    /// Select an input by label (e.g. NET) or hex code (e.g. 2B).
    Set { input: String },
    /// Read the selected input.
    Get,
    /// List the standard input labels and codes.
    List,
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Merge --config and the individual flags into one settings value.
fn resolve_config(cli: &Cli) -> Result<ReceiverConfig> {
    let mut config = match (&cli.config, &cli.host) {
        (Some(path), _) => ReceiverConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        (None, Some(host)) => ReceiverConfig::new(host),
        (None, None) => bail!("--host or --config is required"),
    };

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(zone) = &cli.zone {
        config.zone = zone.clone();
    }
    if let Some(ms) = cli.timeout_ms {
        config.command_timeout_ms = ms;
    }

    config.validate().context("invalid receiver settings")?;
    Ok(config)
}

fn create_client(config: &ReceiverConfig) -> Result<EiscpClient> {
    let client = config
        .builder()
        .context("invalid receiver settings")?
        .build()
        .context("failed to create client")?;
    tracing::debug!(addr = %client.addr(), zone = %client.zone(), "client ready");
    Ok(client)
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_ping(client: &EiscpClient) -> Result<()> {
    if client.ping().await {
        println!("{}: alive", client.addr());
        Ok(())
    } else {
        bail!("{}: no answer to power query", client.addr())
    }
}

async fn cmd_power(client: &EiscpClient, zone: Zone, action: &PowerAction) -> Result<()> {
    match action {
        PowerAction::On => client.turn_on(zone).await?,
        PowerAction::Off => client.turn_off(zone).await?,
        PowerAction::Get => match client.power_state(zone).await? {
            Some(true) => println!("zone {zone}: on"),
            Some(false) => println!("zone {zone}: standby"),
            None => println!("zone {zone}: no answer"),
        },
    }
    Ok(())
}

async fn cmd_volume(client: &EiscpClient, zone: Zone, action: &VolumeAction) -> Result<()> {
    match action {
        VolumeAction::Up => client.volume_up(zone).await?,
        VolumeAction::Down => client.volume_down(zone).await?,
        VolumeAction::Set { step } => client.set_volume_step(*step, zone).await?,
        VolumeAction::Level { level } => {
            let step = client
                .set_volume_level(*level, client.volume_resolution(), zone)
                .await?;
            println!(
                "zone {zone}: volume step {step} of {}",
                client.volume_resolution()
            );
        }
        VolumeAction::Get => match client.volume(zone).await? {
            Some(step) => println!(
                "zone {zone}: volume step {step} ({:.0}%)",
                f64::from(step) * 100.0 / f64::from(client.volume_resolution())
            ),
            None => println!("zone {zone}: volume unavailable"),
        },
    }
    Ok(())
}

async fn cmd_mute(client: &EiscpClient, zone: Zone, action: &MuteAction) -> Result<()> {
    match action {
        MuteAction::On => client.set_mute(true, zone).await?,
        MuteAction::Off => client.set_mute(false, zone).await?,
        MuteAction::Get => match client.is_muted(zone).await? {
            Some(true) => println!("zone {zone}: muted"),
            Some(false) => println!("zone {zone}: not muted"),
            None => println!("zone {zone}: muting unavailable"),
        },
    }
    Ok(())
}

fn cmd_input_list() -> Result<()> {
    for (label, code) in standard_inputs() {
        println!("  {code}  {label}");
    }
    Ok(())
}

async fn cmd_input(client: &EiscpClient, zone: Zone, action: &InputAction) -> Result<()> {
    match action {
        InputAction::Set { input } => {
            let code = standard_inputs()
                .into_iter()
                .find(|(label, _)| label.eq_ignore_ascii_case(input))
                .map(|(_, code)| code)
                .unwrap_or_else(|| input.clone());
            client.select_input(&code, zone).await?;
        }
        InputAction::Get => match client.input(zone).await? {
            Some(code) => println!(
                "zone {zone}: input {code} ({})",
                input_label(&code).unwrap_or("unknown")
            ),
            None => println!("zone {zone}: no answer"),
        },
        InputAction::List => cmd_input_list()?,
    }
    Ok(())
}

async fn cmd_query(client: &EiscpClient, zone: Zone, code: &str) -> Result<()> {
    match client.query(&code.to_ascii_uppercase(), zone).await? {
        Some(text) => println!("{}", text.trim_end()),
        None => println!("(no answer)"),
    }
    Ok(())
}

async fn cmd_probe(
    client: &EiscpClient,
    zone: Zone,
    json: bool,
    output: Option<&PathBuf>,
) -> Result<()> {
    let report = probe(client, zone).await.context("probe failed")?;

    if json || output.is_some() {
        let text = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        match output {
            Some(path) => {
                std::fs::write(path, text)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("wrote probe report to {}", path.display());
            }
            None => println!("{text}"),
        }
        return Ok(());
    }

    println!("Probe of {} (zone {})", report.host, report.zone);
    for (code, reply) in &report.raw {
        match reply {
            Some(text) => println!("  {code}  {}", text.trim_end()),
            None => println!("  {code}  -"),
        }
    }

    let caps = Capabilities::from_probe(&report);
    println!();
    println!("Capabilities");
    println!(
        "  Zones:          {}",
        caps.zones
            .iter()
            .map(|z| z.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Volume steps:   {}", client.volume_resolution());
    if let Some(code) = &caps.current_input {
        println!(
            "  Current input:  {code} ({})",
            input_label(code).unwrap_or("unknown")
        );
    }
    Ok(())
}

async fn cmd_raw(
    client: &EiscpClient,
    zone: Zone,
    code: &str,
    argument: Option<&str>,
    no_response: bool,
) -> Result<()> {
    let reply = client
        .send_command(
            &code.to_ascii_uppercase(),
            argument,
            zone,
            !no_response,
            client.command_timeout(),
        )
        .await?;
    match reply {
        Some(text) => println!("{}", text.trim_end()),
        None if no_response => println!("sent"),
        None => println!("(no answer)"),
    }
    Ok(())
}

async fn run(cli: &Cli, client: &EiscpClient) -> Result<()> {
    let zone = client.zone();
    match &cli.command {
        Command::Ping => cmd_ping(client).await,
        Command::Power { action } => cmd_power(client, zone, action).await,
        Command::Volume { action } => cmd_volume(client, zone, action).await,
        Command::Mute { action } => cmd_mute(client, zone, action).await,
        Command::Input { action } => cmd_input(client, zone, action).await,
        Command::Query { code } => cmd_query(client, zone, code).await,
        Command::Probe { json, output } => cmd_probe(client, zone, *json, output.as_ref()).await,
        Command::Raw {
            code,
            argument,
            no_response,
        } => cmd_raw(client, zone, code, argument.as_deref(), *no_response).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Listing inputs does not require a receiver.
    if matches!(
        &cli.command,
        Command::Input {
            action: InputAction::List
        }
    ) {
        return cmd_input_list();
    }

    let config = resolve_config(&cli)?;
    let client = create_client(&config)?;
    client
        .connect_with_timeout(Duration::from_millis(config.connect_timeout_ms))
        .await
        .with_context(|| format!("failed to connect to {}", client.addr()))?;

    let result = run(&cli, &client).await;
    client.close().await;
    result
}
