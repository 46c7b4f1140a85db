use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The address of the coordinator server.
    #[arg(short = 'j', long = "join", default_value = "http://[::1]:8030")]
    pub address: String,

    /// Root directory of the shared storage every worker can reach.
    #[arg(short, long, default_value = ".")]
    pub store: String,

    /// Name of the workload to execute.
    #[arg(short, long)]
    pub workload: String,

    /// Auxiliary arguments to pass to the MapReduce application.
    #[clap(value_parser, last = true)]
    pub args: Vec<String>,
}
