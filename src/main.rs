use std::path::PathBuf;
use std::time::Instant;
use atomcut::algorithms::LabelPropagationPartitioner;
use atomcut::io::{
    machine_file_path, read_matrix_market_as_graph, write_machine_data_to_file,
    write_partition_data_to_file,
};
use atomcut::Partition;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path of the .mtx file
    mtx_filepath: PathBuf,

    /// Number of atoms (partitions)
    #[arg(default_value_t = 10)]
    num_atoms: usize,

    /// Filename where the partition mapping is stored. The machine mapping goes
    /// next to it, prefixed with `machine_`
    #[arg(default_value = "partitioning.txt")]
    partition_file: PathBuf,

    /// Number of simulated machines
    #[arg(short, long, default_value_t = 1)]
    machines: usize,

    /// Vertex updates between two refreshes of the global statistics
    #[arg(long, default_value_t = 100)]
    sync_interval: usize,

    /// Maximum number of atom changes per vertex
    #[arg(long, default_value_t = 10)]
    max_changes: usize,

    /// Number of colors used to batch vertex updates
    #[arg(short, long, default_value_t = 10)]
    colors: usize,

    /// Seed for a reproducible run
    #[arg(short, long)]
    seed: Option<u64>,

    /// Fail after this many seeding rounds
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Size of the worker thread pool, all cores by default
    #[arg(short, long)]
    threads: Option<usize>,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("atomcut=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing();

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new().num_threads(threads).build_global()?;
    }

    let graph = read_matrix_market_as_graph(&args.mtx_filepath)?;
    info!(
        path = %args.mtx_filepath.display(),
        vertices = graph.len(),
        edges = graph.num_edges(),
        "loaded graph"
    );

    let mut partition = vec![0; graph.len()];
    let start = Instant::now();
    let report = LabelPropagationPartitioner {
        num_atoms: args.num_atoms,
        sync_interval: args.sync_interval,
        max_changes: args.max_changes,
        num_colors: args.colors,
        num_machines: args.machines,
        seed: args.seed,
        max_rounds: args.max_rounds,
    }.partition(&mut partition, &graph)?;
    let elapsed_time = start.elapsed();

    write_partition_data_to_file(&partition, &args.partition_file)?;
    write_machine_data_to_file(&report.machines, &machine_file_path(&args.partition_file))?;

    println!("Atom sizes {:?}", report.counts);
    println!("Edge cut {:?}", report.edge_cut);
    println!("Imbalance {:?}", report.imbalance);
    println!("Rounds {:?}", report.convergence.rounds);
    println!("Execution time {:?}", elapsed_time);
    Ok(())
}
