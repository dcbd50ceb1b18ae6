use clap::Parser;
use env_logger::Env;

use cachesim::trace::{load_traces, resolve_trace_set};
use cachesim::{Protocol, Simulator, SystemSpec, NUM_CORES};

/// Simulate MESI and Dragon cache coherence over per-core memory traces.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Coherence protocol: MESI or Dragon
    protocol: String,

    /// A `<base>_0.data` trace file or a bare benchmark name
    input: String,

    /// Cache size in bytes
    #[arg(default_value_t = 4096)]
    cache_size: u32,

    /// Associativity in blocks per set
    #[arg(default_value_t = 2)]
    associativity: u32,

    /// Block size in bytes
    #[arg(default_value_t = 32)]
    block_size: u32,

    /// Emit the report as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("warn"));
    let cli = Cli::parse();

    let specs = SystemSpec {
        protocol: cli.protocol.parse::<Protocol>()?,
        cache_size: cli.cache_size,
        cache_assoc: cli.associativity,
        block_size: cli.block_size,
        ..Default::default()
    };

    let paths = resolve_trace_set(&cli.input, NUM_CORES)?;
    let traces = load_traces(&paths, NUM_CORES)?;

    let report = Simulator::new(specs, traces)?.run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
