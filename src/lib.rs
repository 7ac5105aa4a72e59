mod binning;
pub mod config;
pub mod layout;
pub mod npy;
pub mod types;

use tracing::info_span;

// Re-export types
pub use binning::{load_array, read_recording_window, Binner};
pub use config::BinningConfig;
pub use layout::OutputLayout;
pub use types::*;

/// Runs a full binning pass for one patient and bin size: spike files,
/// then indicator functions, then the bin edges.
///
/// # Examples
///
/// ```no_run
/// use spike_binner::{run, BinningConfig};
///
/// let config = BinningConfig::new("data/binaries/", "data/indicator/", 100, 46)?;
/// let summary = run(config)?;
/// println!("Binned {} spike files", summary.spikes.len());
/// # Ok::<(), spike_binner::BinningError>(())
/// ```
pub fn run(config: BinningConfig) -> Result<RunSummary> {
    let _span = info_span!(
        "binning",
        patient = config.patient_id,
        bin_size_ms = config.bin_size_ms
    )
    .entered();

    let binner = Binner::new(config)?;
    let spikes = binner.bin_spikes()?;
    let indicators = binner.bin_indicators()?;
    let edges = binner.save_edges()?;

    Ok(RunSummary {
        spikes,
        indicators,
        edges,
    })
}
