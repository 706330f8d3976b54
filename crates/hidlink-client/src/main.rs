//! HID-Link client binary.
//!
//! Declares the configured virtual devices, connects to the peer over TCP
//! and forwards reports typed on stdin:
//!
//! ```text
//! input <dev> <report> <hex>     send an input report
//! feature <dev> <report> <hex>   send a feature report
//! enable <dev> / disable <dev>   announce / withdraw a device
//! status                         connection state, devices and grabs
//! quit
//! ```
//!
//! Reports, output reports and sollicitations received from the peer are
//! printed to stdout.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()               -- TOML + CLI overrides
//!  └─ HidClient::new(TcpTransport) -- devices declared, Idle
//!  └─ connect_by_hostname()
//!  └─ event loop (current_thread)
//!       ├─ TransportEvent  -> client.handle_transport_event()
//!       ├─ stdin line      -> Command -> client.send_* / enable / ...
//!       └─ Ctrl-C / quit   -> client.teardown()
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hidlink_client::infrastructure::storage::config::load_config;
use hidlink_client::infrastructure::transport::TcpTransport;
use hidlink_client::{ConnectionState, HidClient, HidHandler, Transport};

/// Command-line arguments.  Each overrides the matching config entry.
#[derive(Debug, Parser)]
#[command(
    name = "hidlink-client",
    about = "Expose virtual HID devices to a remote peer and forward their reports",
    version
)]
struct Cli {
    /// Configuration file (default: platform config dir, hidlink/client.toml).
    #[arg(long, env = "HIDLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Peer host name or address.
    #[arg(long, env = "HIDLINK_HOST")]
    host: Option<String>,

    /// Peer port.
    #[arg(long, env = "HIDLINK_PORT")]
    port: Option<u16>,
}

// ── Console handler ───────────────────────────────────────────────────────────

/// Prints everything the peer sends.
struct ConsoleHandler;

impl HidHandler for ConsoleHandler {
    fn on_status(&mut self, state: ConnectionState) {
        println!("Status: {state}");
    }

    fn on_feature_report(&mut self, device_id: u32, report_id: u8, payload: &[u8]) {
        println!("feature report dev={device_id} report={report_id} {}", hex::encode(payload));
    }

    fn on_output_report(&mut self, device_id: u32, report_id: u8, payload: &[u8]) {
        println!("output report dev={device_id} report={report_id} {}", hex::encode(payload));
    }

    fn on_feature_sollicit(&mut self, device_id: u32, report_id: u8) {
        println!("feature sollicit dev={device_id} report={report_id}");
    }

    fn on_device_open(&mut self, device_id: u32) {
        println!("device {device_id} opened");
    }

    fn on_device_close(&mut self, device_id: u32) {
        println!("device {device_id} closed");
    }
}

// ── Stdin commands ────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Input { dev: usize, report: u8, payload: Vec<u8> },
    Feature { dev: usize, report: u8, payload: Vec<u8> },
    Enable(usize),
    Disable(usize),
    Status,
    Quit,
}

fn parse_command(line: &str) -> anyhow::Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let mut next = |what: &str| {
        words
            .next()
            .with_context(|| format!("{verb}: missing {what}"))
    };

    let cmd = match verb {
        "input" | "feature" => {
            let dev = next("device")?.parse::<usize>().context("device index")?;
            let report = next("report id")?.parse::<u8>().context("report id")?;
            let payload = hex::decode(next("payload")?).context("payload hex")?;
            if verb == "input" {
                Command::Input { dev, report, payload }
            } else {
                Command::Feature { dev, report, payload }
            }
        }
        "enable" => Command::Enable(next("device")?.parse::<usize>().context("device index")?),
        "disable" => Command::Disable(next("device")?.parse::<usize>().context("device index")?),
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command {other:?}"),
    };
    Ok(Some(cmd))
}

fn print_status<T: Transport, H: HidHandler>(client: &HidClient<T, H>) {
    println!("state: {}", client.state());
    if let Some(target) = client.target() {
        println!("peer: {target}");
    }
    for index in 0..client.device_count() {
        let Some(desc) = client.descriptor(index) else {
            continue;
        };
        let grabbed: Vec<String> = (0..=u8::MAX)
            .filter(|r| client.is_grabbed(index, *r))
            .map(|r| r.to_string())
            .collect();
        println!(
            "  [{index}] {} v{} {} grabbed=[{}]",
            desc.name,
            desc.version,
            if client.is_enabled(index) { "enabled" } else { "disabled" },
            grabbed.join(",")
        );
    }
}

/// Applies one command.  Returns `false` on `quit`.
fn apply<T: Transport, H: HidHandler>(client: &mut HidClient<T, H>, cmd: Command) -> bool {
    match cmd {
        Command::Input { dev, report, payload } => {
            client.send_input_report(dev, report, true, &payload)
        }
        Command::Feature { dev, report, payload } => {
            client.send_feature_report(dev, report, true, &payload)
        }
        Command::Enable(dev) => client.enable(dev),
        Command::Disable(dev) => client.disable(dev),
        Command::Status => print_status(client),
        Command::Quit => return false,
    }
    true
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level)),
        )
        .init();

    info!("HID-Link client starting");

    let devices = config.devices().context("declaring devices")?;
    let (descriptors, enabled): (Vec<_>, Vec<_>) = devices.into_iter().unzip();

    let (transport, mut events) =
        TcpTransport::with_channel(Handle::current(), config.reconnect_interval());
    let mut client = HidClient::new(transport, ConsoleHandler, descriptors)
        .context("initializing client")?;

    for (index, _) in enabled.iter().enumerate().filter(|(_, on)| **on) {
        client.enable(index);
    }

    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    client
        .connect_by_hostname(&host, port, config.server.ip_flags)
        .context("connecting")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // ── Main event loop ───────────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => client.handle_transport_event(event),
                None => break,
            },
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => match parse_command(&line) {
                    Ok(Some(cmd)) => {
                        if !apply(&mut client, cmd) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("{e:#}"),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    client.teardown().context("tearing down client")?;
    info!("HID-Link client stopped");
    Ok(())
}
