//! Command line tool for PI GCS 2.0 and GCS 2.1 controllers.
//!
//! Subcommands:
//! - `enumerate`: List controllers on USB, TCP/IP or a daisy chain
//! - `info`: Identification, axes, positions and servo states
//! - `query`: Send one raw GCS command
//! - `move`: Move an axis and wait for it to settle
//! - `reference`: Reference axes and wait
//! - `params`: Dump the parameter schema
//! - `record`: Run the data recorder and print CSV
//! - `repl`: Interactive GCS command prompt

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use pigcs::datarecorder::{DataRecorder, PerTable};
use pigcs::gcs2::RecordOption;
use pigcs::tools::{self, WaitOptions};
use pigcs::transport::{enumerate_tcpip, enumerate_usb, DEFAULT_PORT};
use pigcs::{ConnectionSettings, DaisyChainOptions, GcsCommands, GcsDevice, Interface};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// PI GCS controller tool
#[derive(Parser, Debug)]
#[command(name = "gcs_tool")]
#[command(about = "Talk to PI motion controllers over GCS 2.0 / 2.1")]
#[command(version)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct ConnectionArgs {
    /// TCP/IP host, optionally with `:port`
    #[arg(long, global = true, conflicts_with_all = ["serial", "usb"])]
    tcp: Option<String>,

    /// RS-232 port name
    #[arg(long, global = true, conflicts_with = "usb")]
    serial: Option<String>,

    /// RS-232 baudrate
    #[arg(long, global = true, default_value = "115200")]
    baud: u32,

    /// USB description or serial number
    #[arg(long, global = true)]
    usb: Option<String>,

    /// Address this device of a daisy chain on the selected port
    /// (`enumerate` lists the chain when given)
    #[arg(long, global = true)]
    daisy: Option<u8>,

    /// JSON file with connection settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Read timeout in milliseconds (overrides the config file)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Do not poll ERR? after commands
    #[arg(long, global = true)]
    no_errcheck: bool,

    /// Append controller traffic to this file
    #[arg(long, global = true)]
    logfile: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List reachable controllers
    Enumerate {
        /// Only list devices whose description contains this text
        #[arg(short, long, default_value = "")]
        mask: String,

        /// Also broadcast for TCP/IP controllers
        #[arg(long)]
        network: bool,

        /// How long to wait for network answers, in seconds
        #[arg(long, default_value = "1.0")]
        wait: f64,
    },

    /// Query identification, axes, positions and servo states
    Info,

    /// Send a raw GCS command; queries (containing '?') print the answer
    Query {
        /// Command line, e.g. "POS? 1"
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },

    /// Move an axis
    Move {
        /// Axis identifier
        #[arg(short, long)]
        axis: String,

        /// Target position, or distance with --relative
        position: f64,

        /// Move relative to the current target
        #[arg(short, long)]
        relative: bool,

        /// Timeout in seconds for the motion to complete
        #[arg(short, long, default_value = "30")]
        timeout: u64,

        /// Don't wait for the axis to reach its target
        #[arg(long)]
        no_wait: bool,
    },

    /// Reference axes with FRF
    Reference {
        /// Axes to reference (all if omitted)
        axes: Vec<String>,

        /// Timeout in seconds
        #[arg(short, long, default_value = "300")]
        timeout: u64,
    },

    /// Dump the controller's parameter schema
    Params {
        /// Only show parameters whose description contains this text
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Record axis signals with the data recorder and print CSV
    Record {
        /// Axis to record
        #[arg(short, long)]
        axis: Option<String>,

        /// Record options, possibly abbreviated (ACT_POS, COM_POS, ...)
        #[arg(short, long, default_values_t = vec!["ACT_POS".to_string()])]
        options: Vec<String>,

        /// Seconds between samples
        #[arg(long)]
        sample_time: Option<f64>,

        /// Number of points per table
        #[arg(short, long)]
        points: Option<usize>,

        /// Start recording immediately instead of on the next command
        #[arg(long)]
        immediate: bool,
    },

    /// Interactive GCS command REPL
    Repl,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Enumerate {
            ref mask,
            network,
            wait,
        } => cmd_enumerate(&args.connection, mask, network, wait),
        Command::Info => cmd_info(&mut connect(&args.connection)?),
        Command::Query { command } => cmd_query(&mut connect(&args.connection)?, &command.join(" ")),
        Command::Move {
            axis,
            position,
            relative,
            timeout,
            no_wait,
        } => cmd_move(
            &mut connect(&args.connection)?,
            &axis,
            position,
            relative,
            timeout,
            no_wait,
        ),
        Command::Reference { axes, timeout } => {
            cmd_reference(&mut connect(&args.connection)?, &axes, timeout)
        }
        Command::Params { filter } => cmd_params(&mut connect(&args.connection)?, filter.as_deref()),
        Command::Record {
            axis,
            options,
            sample_time,
            points,
            immediate,
        } => cmd_record(
            &mut connect(&args.connection)?,
            axis,
            &options,
            sample_time,
            points,
            immediate,
        ),
        Command::Repl => cmd_repl(&mut connect(&args.connection)?),
    }
}

fn settings(args: &ConnectionArgs) -> Result<ConnectionSettings> {
    let mut settings = match &args.config {
        Some(path) => ConnectionSettings::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConnectionSettings::default(),
    };
    if let Some(timeout_ms) = args.timeout_ms {
        settings.timeout_ms = timeout_ms;
    }
    if args.no_errcheck {
        settings.errcheck = false;
    }
    if args.logfile.is_some() {
        settings.logfile_path = args.logfile.clone();
    }
    Ok(settings)
}

fn interface(args: &ConnectionArgs) -> Result<Interface> {
    if let Some(tcp) = &args.tcp {
        let (host, port) = match tcp.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), port.parse().context("invalid TCP port")?),
            None => (tcp.clone(), DEFAULT_PORT),
        };
        return Ok(Interface::TcpIp { host, port });
    }
    if let Some(port) = &args.serial {
        return Ok(Interface::Rs232 {
            port: port.clone(),
            baudrate: args.baud,
        });
    }
    if let Some(description) = &args.usb {
        return Ok(Interface::Usb {
            description: description.clone(),
        });
    }
    bail!("select a controller with --tcp, --serial or --usb")
}

fn connect(args: &ConnectionArgs) -> Result<GcsDevice> {
    let interface = interface(args)?;
    let settings = settings(args)?;
    let device = match args.daisy {
        Some(id) => {
            let chain = GcsDevice::open_daisy_chain(&interface, settings, DaisyChainOptions::default())?;
            chain.connect(id)?
        }
        None => GcsDevice::open(&interface, settings)?,
    };
    info!("Connected to {interface} ({})", device.syntax());
    Ok(device)
}

fn cmd_enumerate(args: &ConnectionArgs, mask: &str, network: bool, wait: f64) -> Result<()> {
    if args.daisy.is_some() {
        let interface = interface(args)?;
        let chain = GcsDevice::open_daisy_chain(&interface, settings(args)?, DaisyChainOptions::default())?;
        println!("Daisy chain on {interface} ({}):", chain.syntax());
        for device in chain.devices() {
            println!("  {:>2}  {}", device.id, device.description);
        }
        chain.close()?;
        return Ok(());
    }

    println!("USB:");
    for device in enumerate_usb(mask)? {
        println!("  {}  ({})", device.description, device.port_name);
    }
    if network {
        println!("TCP/IP:");
        for device in enumerate_tcpip(mask, Duration::from_secs_f64(wait))? {
            println!("  {}", device.description());
        }
    }
    Ok(())
}

fn cmd_info(device: &mut GcsDevice) -> Result<()> {
    println!("IDN:      {}", device.qidn()?);
    println!("Syntax:   {}", device.syntax());
    let axes = device.axes()?;
    println!("Axes:     {}", axes.join(" "));
    if device.supports("qPOS")? {
        for (axis, pos) in device.qpos(&axes)? {
            println!("  {axis:<10} pos={pos}");
        }
    }
    if device.supports("qSVO")? {
        for (axis, servo) in device.qsvo(&axes)? {
            println!("  {axis:<10} servo={}", if servo { "on" } else { "off" });
        }
    }
    let commands = device.core().capabilities()?.len();
    println!("Commands: {commands}");
    Ok(())
}

fn run_line(device: &mut GcsDevice, line: &str) -> Result<Option<String>> {
    let core = device.core();
    if line.contains('?') {
        Ok(Some(core.read(line)?))
    } else {
        core.send(line)?;
        Ok(None)
    }
}

fn cmd_query(device: &mut GcsDevice, line: &str) -> Result<()> {
    match run_line(device, line)? {
        Some(answer) => print!("{answer}"),
        None => println!("OK"),
    }
    Ok(())
}

fn cmd_move(
    device: &mut GcsDevice,
    axis: &str,
    position: f64,
    relative: bool,
    timeout: u64,
    no_wait: bool,
) -> Result<()> {
    if relative {
        device.mvr((axis, position))?;
    } else {
        device.mov((axis, position))?;
    }
    if no_wait {
        return Ok(());
    }
    let options = WaitOptions::with_timeout(Duration::from_secs(timeout));
    tools::wait_on_target(device, &[axis.to_string()], &options)?;
    let pos = device.qpos(axis)?;
    println!("{axis} at {}", pos[axis]);
    Ok(())
}

fn cmd_reference(device: &mut GcsDevice, axes: &[String], timeout: u64) -> Result<()> {
    let axes = if axes.is_empty() { device.axes()? } else { axes.to_vec() };
    device.frf(&axes)?;
    let options = WaitOptions::with_timeout(Duration::from_secs(timeout));
    tools::wait_on_referencing(device, &axes, &options)?;
    for (axis, referenced) in device.qfrf(&axes)? {
        println!("{axis}: {}", if referenced { "referenced" } else { "not referenced" });
    }
    Ok(())
}

fn cmd_params(device: &mut GcsDevice, filter: Option<&str>) -> Result<()> {
    let keep = |description: &str| filter.map_or(true, |f| description.contains(f));
    match device {
        GcsDevice::Gcs2(dev) => {
            for param in dev.schema()?.iter().filter(|p| keep(&p.description)) {
                println!(
                    "0x{:08X}  {:<8}  {:<12}  {}",
                    param.id, param.data_type, param.group, param.description
                );
            }
        }
        GcsDevice::Gcs21(dev) => {
            for param in dev.schema()?.iter().filter(|p| keep(&p.description)) {
                let dims: Vec<String> = param.dimension.iter().map(usize::to_string).collect();
                println!(
                    "0x{:08X}  {:<8}  [{}]  {}",
                    param.id,
                    param.data_type,
                    dims.join("x"),
                    param.description
                );
            }
        }
    }
    Ok(())
}

fn cmd_record(
    device: &mut GcsDevice,
    axis: Option<String>,
    options: &[String],
    sample_time: Option<f64>,
    points: Option<usize>,
    immediate: bool,
) -> Result<()> {
    let options = options
        .iter()
        .map(|o| RecordOption::from_abbreviation(o))
        .collect::<Result<Vec<_>, _>>()?;
    let gcs = match device.as_gcs2() {
        Ok(gcs) => gcs,
        Err(_) => bail!("record supports GCS 2.0 controllers; use REC_* commands through `query` on GCS 2.1"),
    };
    let mut recorder = DataRecorder::new(gcs);
    if let Some(axis) = axis {
        recorder.set_sources(PerTable::Same(axis));
    }
    recorder.set_options(PerTable::Each(options));
    if let Some(sample_time) = sample_time {
        recorder.set_sample_time(sample_time)?;
    }
    if let Some(points) = points {
        recorder.set_num_values(points)?;
    }
    if immediate {
        recorder.set_triggers(PerTable::Same(pigcs::gcs2::TriggerSource::TriggerImmediately));
    }
    info!(
        "Recording {} points every {} s",
        recorder.num_values()?,
        recorder.sample_time()?
    );
    recorder.arm()?;
    if !immediate {
        warn!("Recording starts with the next command, sending one");
        recorder.gcs().qpos(())?;
    }
    let (header, data) = recorder.get_data(None, None, None)?;
    let timescale = recorder.timescale()?;

    let mut names = vec!["time".to_string()];
    names.extend(header.names());
    println!("{}", names.join(","));
    for (t, row) in timescale.iter().zip(data.rows()) {
        let values: Vec<String> = row.iter().map(f64::to_string).collect();
        println!("{t},{}", values.join(","));
    }
    Ok(())
}

fn cmd_repl(device: &mut GcsDevice) -> Result<()> {
    println!("Connected: {}", device.qidn()?);
    println!();
    println!("GCS REPL - Enter commands (queries contain '?'), 'quit' to exit");
    println!("Examples: *IDN?, POS?, SVO 1 1, MOV 1 10");
    println!();

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }
        editor.add_history_entry(cmd)?;

        if cmd.eq_ignore_ascii_case("quit") || cmd.eq_ignore_ascii_case("exit") {
            break;
        }

        match run_line(device, cmd) {
            Ok(Some(answer)) => {
                for line in answer.lines() {
                    println!("{line}");
                }
            }
            Ok(None) => println!("OK"),
            Err(e) => println!("Error: {e}"),
        }
    }

    device.close()?;
    println!("Bye!");
    Ok(())
}
