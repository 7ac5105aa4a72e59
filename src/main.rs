use spike_binner::{run, BinningConfig};
use std::env;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("spike-binner");

    let config = match BinningConfig::from_args(args.iter().skip(1).cloned()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!(
                "Usage: {} <binaries_path> <indicators_path> <bin_size_ms> <patient_id>",
                program
            );
            process::exit(2);
        }
    };

    match run(config) {
        Ok(summary) => {
            println!(
                "Binned {} spike file(s) and {} indicator function(s); edges at {}",
                summary.spikes.len(),
                summary.indicators.len(),
                summary.edges.display()
            );
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
