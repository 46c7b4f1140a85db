use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The port for the coordinator server to run on.
    #[arg(short, long, default_value = "8030")]
    pub port: u16,

    /// Number of reduce buckets (R).
    #[arg(short = 'r', long, default_value = "10")]
    pub n_reduce: u32,

    /// Task lease in seconds. A task not reported complete within this
    /// window becomes eligible for reassignment.
    #[arg(short, long, default_value = "10")]
    pub lease_secs: u64,

    /// Input files for the map phase, one map task per file. Glob patterns
    /// are expanded.
    #[arg(required = true)]
    pub inputs: Vec<String>,
}
