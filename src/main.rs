//! Process log generator CLI
//!
//! Generate random processes, simulate them into logs, or stream their events live.
//!
//! # Example
//!
//! ```bash
//! # Generate a random process and print its Petri net as PNML
//! plg --seed 42 generate --name "Order handling"
//!
//! # Simulate 500 traces of a BPMN model into a JSON log
//! plg simulate model.bpmn --traces 500 --output log.json
//!
//! # Stream an evolving random process on port 1337 for ten minutes
//! plg --config plg.toml stream --evolve-every 60 --seconds 600
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use process_log_generator::{
    evolve, generate, BpmnImporter, Config, Error, Exporter, Importer, LogGenerator, LogProgress, PetriNet,
    PnmlExporter, Process, StreamState, Streamer,
};

/// Process log generator
///
/// Produces random business processes and the event logs of their simulated instances.
#[derive(Parser, Debug)]
#[command(name = "plg")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML configuration file. Missing keys take their default value.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Random seed for reproducible results. When omitted, a random seed is used.
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a random process and write its Petri net as PNML
    Generate {
        /// Name of the new process
        #[arg(short, long, default_value = "Process")]
        name: String,
        /// Output file, standard output when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Evolve a BPMN process and write the result as PNML
    Evolve {
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Convert a BPMN process into a PNML Petri net
    Convert {
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Simulate a process into a JSON log. A random process is used when no input is given.
    Simulate {
        input: Option<PathBuf>,
        /// Number of traces, overrides the configuration
        #[arg(short, long)]
        traces: Option<usize>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Stream simulated events to TCP clients. A random process is used when no input is given.
    ///
    /// Without `--seconds`, reads commands from standard input: `pause`, `resume` and `stop`.
    Stream {
        input: Option<PathBuf>,
        /// Port to listen on, overrides the configuration
        #[arg(short, long)]
        port: Option<u16>,
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
        /// Replace the streamed process with an evolution of it every this many seconds
        #[arg(long)]
        evolve_every: Option<u64>,
    },
}

fn main() -> Result<(), Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,process_log_generator=info,plg=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    info!(seed, "starting");

    match args.command {
        Command::Generate { name, output } => {
            let process = generate(&name, &config.generator, &mut rng)?;
            info!(%process, "process generated");
            write_process(output.as_deref(), &process)
        }
        Command::Evolve { input, output } => {
            let original = import(input.as_deref())?;
            let evolved = evolve(&original, &config.generator, &config.evolution, &mut rng)?;
            info!(from = ?original.size(), to = ?evolved.size(), "process evolved");
            write_process(output.as_deref(), &evolved)
        }
        Command::Convert { input, output } => {
            let process = import(input.as_deref())?;
            info!(net = %PetriNet::from(&process), "converted");
            write_process(output.as_deref(), &process)
        }
        Command::Simulate { input, traces, output } => {
            let process = import_or_generate(input.as_deref(), &config, &mut rng)?;
            let mut simulation = config.simulation.clone();
            simulation.seed.get_or_insert(seed);
            if let Some(traces) = traces {
                simulation.number_of_traces = traces;
            }
            let generator = LogGenerator::new(&process, &simulation)?;
            let log = generator.generate(&LogProgress::new(simulation.number_of_traces))?;
            write_output(output.as_deref(), |writer| {
                serde_json::to_writer_pretty(&mut *writer, &log)?;
                writeln!(writer)?;
                Ok(())
            })
        }
        Command::Stream { input, port, seconds, evolve_every } => {
            let process = import_or_generate(input.as_deref(), &config, &mut rng)?;
            let mut stream = config.stream.clone();
            if let Some(port) = port {
                stream.service_port = port;
            }
            let mut simulation = config.simulation.clone();
            simulation.seed.get_or_insert(seed);
            let streamer = Streamer::for_process(stream, process, simulation)?;
            streamer.start()?;
            if let Some(addr) = streamer.local_addr() {
                info!(%addr, "streaming, type pause, resume or stop");
            }

            thread::scope(|scope| {
                if let (Some(every), Some(handle)) = (evolve_every, streamer.process_handle()) {
                    let streamer = &streamer;
                    let config = &config;
                    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
                    scope.spawn(move || {
                        let period = Duration::from_secs(every.max(1));
                        let mut next = Instant::now() + period;
                        while streamer.state() != StreamState::Stopped {
                            thread::sleep(Duration::from_millis(100));
                            if Instant::now() < next {
                                continue;
                            }
                            next += period;
                            let current = handle.current();
                            match evolve(&current, &config.generator, &config.evolution, &mut rng)
                                .and_then(|evolved| Ok(handle.replace(evolved)?))
                            {
                                Ok(()) => info!("streamed process evolved"),
                                Err(error) => warn!(%error, "cannot evolve streamed process"),
                            }
                        }
                    });
                }
                match seconds {
                    Some(seconds) => {
                        let deadline = Instant::now() + Duration::from_secs(seconds);
                        while Instant::now() < deadline && streamer.state() != StreamState::Stopped {
                            thread::sleep(Duration::from_millis(100));
                        }
                        streamer.stop();
                    }
                    None => control(&streamer),
                }
            });
            streamer.stop();
            Ok(())
        }
    }
}

/// Apply commands typed on standard input until `stop` or end of input
fn control(streamer: &Streamer) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        match line.trim() {
            "pause" | "p" => streamer.pause(),
            "resume" | "r" | "start" => {
                if let Err(error) = streamer.start() {
                    warn!(%error, "cannot resume");
                }
            }
            "stop" | "q" | "quit" => break,
            "" => {}
            other => warn!(command = other, "unknown command, expected pause, resume or stop"),
        }
        info!(state = %streamer.state(), clients = streamer.client_count(), emitted = streamer.emitted(), "stream status");
    }
    streamer.stop();
}

fn import(input: Option<&Path>) -> Result<Process, Error> {
    let path = input.ok_or(Error::NoInputFile)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("bpmn") | Some("xml") => {}
        _ => return Err(Error::UnsupportedFileExt),
    }
    let mut file = File::open(path).map(BufReader::new)?;
    let process = BpmnImporter.import(&mut file)?;
    process.check()?;
    Ok(process)
}

fn import_or_generate(input: Option<&Path>, config: &Config, rng: &mut ChaCha8Rng) -> Result<Process, Error> {
    match input {
        Some(path) => import(Some(path)),
        None => {
            let process = generate("Process", &config.generator, rng)?;
            info!(%process, "random process generated");
            Ok(process)
        }
    }
}

/// Write the Petri net of a process as PNML
fn write_process(output: Option<&Path>, process: &Process) -> Result<(), Error> {
    match output {
        Some(path) => {
            let path = PnmlExporter.export_file(process, path)?;
            info!(path = %path.display(), "written");
            Ok(())
        }
        None => write_output(None, |writer| PnmlExporter.export(process, writer)),
    }
}

fn write_output(output: Option<&Path>, write: impl FnOnce(&mut dyn Write) -> Result<(), Error>) -> Result<(), Error> {
    match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            write(&mut writer)?;
            writer.flush()?;
            info!(path = %path.display(), "written");
            Ok(())
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            write(&mut writer)
        }
    }
}
