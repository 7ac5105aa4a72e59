use spike_binner::{Binner, BinningConfig};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // Patient 46, 100 ms bins
    let config = BinningConfig::new("data/binaries/", "data/indicator/", 100, 46)?;
    let binner = Binner::new(config)?;

    // Print recording information
    let window = binner.window();
    println!(
        "Recording window: {:.1} to {:.1} ms ({:.1} s)",
        window.start_ms,
        window.stop_ms,
        window.span_ms() / 1000.0
    );

    let edges = binner.edges();
    println!(
        "Number of bins: {} (actual width {:.3} ms)",
        edges.num_bins(),
        (edges.last() - edges.first()) / edges.num_bins() as f64
    );

    // List what would be binned before writing anything
    let spikes = binner.discover_spike_sources()?;
    println!("\nSpike files:");
    for source in spikes.iter().take(5) {
        println!("  {}", source.path.display());
    }
    if spikes.len() > 5 {
        println!("  ... and {} more", spikes.len() - 5);
    }

    let indicators = binner.discover_indicator_sources()?;
    println!("Indicator functions: {}", indicators.len());

    // Bin and summarize the first channel
    let binned = binner.bin_sources(&spikes)?;
    if let Some(first) = binned.first() {
        let counts = &first.histogram.counts;
        println!("\n{}:", first.output.display());
        println!("  Spikes counted: {}", first.histogram.total());
        println!("  Outside window: {}", first.histogram.excluded);
        println!(
            "  First bins: {:?}",
            counts.iter().take(5).collect::<Vec<_>>()
        );
    }

    binner.bin_sources(&indicators)?;
    let edges_path = binner.save_edges()?;
    println!("\nEdges saved to {}", edges_path.display());

    Ok(())
}
