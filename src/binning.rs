use ndarray::ArrayD;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::BinningConfig;
use crate::layout::{self, OutputLayout};
use crate::npy::{self, NpyElement, NpyError};
use crate::types::*;

// Read/write buffer size for array files
const IO_BUFFER_SIZE: usize = 65536;

/// Bins every recorded file of one patient against a shared set of edges.
///
/// Construction loads the recording window and computes the edges; each
/// binning pass then reads a source fully, counts it and writes the counts
/// before moving on to the next file.
///
/// # Examples
///
/// ```no_run
/// use spike_binner::{Binner, BinningConfig};
///
/// let config = BinningConfig::new("data/binaries", "data/indicator", 100, 46)?;
/// let binner = Binner::new(config)?;
/// binner.bin_spikes()?;
/// binner.bin_indicators()?;
/// binner.save_edges()?;
/// # Ok::<(), spike_binner::BinningError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Binner {
    config: BinningConfig,
    layout: OutputLayout,
    window: RecordingWindow,
    edges: BinEdges,
}

impl Binner {
    /// Loads the patient's boundary record and builds the bin edges.
    ///
    /// Fails with [`BinningError::MissingInput`] if the record does not exist
    /// and with [`BinningError::MalformedInput`] if it holds fewer than two
    /// values or describes a window shorter than one bin or too long to bin.
    pub fn new(config: BinningConfig) -> Result<Self> {
        let layout = OutputLayout::new(&config);
        let rec_refs_path = layout.rec_refs_path();

        let window = read_recording_window(&rec_refs_path)?;
        let edges = BinEdges::for_window(&window, config.bin_size_ms, config.edge_spacing)
            .ok_or_else(|| {
                let reason = if window.bin_count(config.bin_size_ms) == 0 {
                    format!(
                        "recording window of {} ms is shorter than one {} ms bin",
                        window.span_ms(),
                        config.bin_size_ms
                    )
                } else {
                    format!(
                        "recording window of {} ms needs more than {} bins of {} ms",
                        window.span_ms(),
                        BinEdges::MAX_BINS,
                        config.bin_size_ms
                    )
                };
                BinningError::malformed(&rec_refs_path, reason)
            })?;

        info!(
            patient = config.patient_id,
            start_ms = window.start_ms,
            stop_ms = window.stop_ms,
            "Built {} bin{} of ~{} ms.",
            edges.num_bins(),
            plural(edges.num_bins()),
            config.bin_size_ms
        );

        Ok(Binner {
            config,
            layout,
            window,
            edges,
        })
    }

    pub fn config(&self) -> &BinningConfig {
        &self.config
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn window(&self) -> &RecordingWindow {
        &self.window
    }

    pub fn edges(&self) -> &BinEdges {
        &self.edges
    }

    /// Lists the spike files (`CSC*.npy`) in the patient's binary directory.
    pub fn discover_spike_sources(&self) -> Result<Vec<SourceFile>> {
        let sources = list_sources(
            &self.layout.patient_dir(),
            layout::is_spike_file,
            OutputKind::Spikes,
        )?;
        info!("Found {} spike file{}.", sources.len(), plural(sources.len()));
        Ok(sources)
    }

    /// Lists the indicator function files (`*fxn.npy`) in the indicators directory.
    pub fn discover_indicator_sources(&self) -> Result<Vec<SourceFile>> {
        let sources = list_sources(
            self.layout.indicators_dir(),
            layout::is_indicator_file,
            OutputKind::Indicator,
        )?;
        info!(
            "Found {} indicator function file{}.",
            sources.len(),
            plural(sources.len())
        );
        Ok(sources)
    }

    /// Bins an explicit list of sources, stopping at the first failure.
    ///
    /// Outputs already written before a failure stay on disk.
    pub fn bin_sources(&self, sources: &[SourceFile]) -> Result<Vec<BinnedFile>> {
        let mut binned = Vec::with_capacity(sources.len());
        for source in sources {
            binned.push(self.bin_file(source)?);
        }
        Ok(binned)
    }

    /// Counts one source file against the edges and writes the counts.
    pub fn bin_file(&self, source: &SourceFile) -> Result<BinnedFile> {
        let output = self
            .layout
            .output_path(&source.path, source.kind)
            .ok_or_else(|| BinningError::malformed(&source.path, "path has no file name"))?;

        let values = load_array(&source.path)?;
        let histogram = self.edges.histogram(values.iter());

        debug!(
            source = %source.path.display(),
            values = values.len(),
            excluded = histogram.excluded,
            "Counted {} value{} into {} bins.",
            histogram.total(),
            plural(histogram.total() as usize),
            histogram.counts.len()
        );
        if histogram.excluded > 0 {
            debug!(
                "{} value{} of {} fell outside the recording window.",
                histogram.excluded,
                plural(histogram.excluded),
                source.path.display()
            );
        }

        create_dir(&self.layout.output_dir(source.kind))?;
        write_output(&output, histogram.counts.iter().copied(), self.config.overwrite)?;
        info!("Wrote {}", output.display());

        Ok(BinnedFile {
            source: source.path.clone(),
            output,
            histogram,
        })
    }

    /// Bins every spike file of the patient into `<patient>/<bin>/`.
    ///
    /// The output directory is created even when no spike file matches.
    pub fn bin_spikes(&self) -> Result<Vec<BinnedFile>> {
        create_dir(&self.layout.output_dir(OutputKind::Spikes))?;
        let sources = self.discover_spike_sources()?;
        self.bin_sources(&sources)
    }

    /// Bins every indicator function into `<patient>/<bin>/indicators/`.
    ///
    /// The output directory is created even when no indicator file matches.
    pub fn bin_indicators(&self) -> Result<Vec<BinnedFile>> {
        create_dir(&self.layout.output_dir(OutputKind::Indicator))?;
        let sources = self.discover_indicator_sources()?;
        self.bin_sources(&sources)
    }

    /// Writes the bin edges to `<patient>/<bin>/edges_bin<bin>.npy`.
    ///
    /// Honors the same overwrite policy as the binning passes.
    pub fn save_edges(&self) -> Result<PathBuf> {
        let path = self.layout.edges_path();
        create_dir(&self.layout.bin_dir())?;
        write_output(
            &path,
            self.edges.as_array().iter().copied(),
            self.config.overwrite,
        )?;
        info!("Wrote {}", path.display());
        Ok(path)
    }
}

/// Loads any `.npy` file as an array of `f64`.
pub fn load_array(path: &Path) -> Result<ArrayD<f64>> {
    let file = File::open(path).map_err(|e| BinningError::from_io(path, e))?;
    let mut reader = BufReader::with_capacity(IO_BUFFER_SIZE, file);
    npy::read_array(&mut reader).map_err(|e| match e {
        NpyError::Io(source) => BinningError::from_io(path, source),
        other => BinningError::malformed(path, other.to_string()),
    })
}

/// Reads start and stop from the first two values of a boundary record.
pub fn read_recording_window(path: &Path) -> Result<RecordingWindow> {
    let recs = load_array(path)?;

    let mut values = recs.iter().copied();
    let (start_ms, stop_ms) = match (values.next(), values.next()) {
        (Some(start), Some(stop)) => (start, stop),
        _ => {
            return Err(BinningError::malformed(
                path,
                format!("expected at least 2 values, found {}", recs.len()),
            ))
        }
    };

    if !start_ms.is_finite() || !stop_ms.is_finite() {
        return Err(BinningError::malformed(
            path,
            "recording start and stop must be finite",
        ));
    }
    if stop_ms <= start_ms {
        return Err(BinningError::malformed(
            path,
            format!("recording stop {} is not after start {}", stop_ms, start_ms),
        ));
    }
    if recs.len() > 2 {
        warn!(
            "{} holds {} values; using the first two as start and stop.",
            path.display(),
            recs.len()
        );
    }

    Ok(RecordingWindow { start_ms, stop_ms })
}

// Helper function to list regular files in `dir` whose name passes `matches`
fn list_sources(
    dir: &Path,
    matches: fn(&str) -> bool,
    kind: OutputKind,
) -> Result<Vec<SourceFile>> {
    let entries = fs::read_dir(dir).map_err(|e| BinningError::from_io(dir, e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| BinningError::from_io(dir, e))?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !matches(name) {
            continue;
        }
        if !path.is_file() {
            debug!("Skipping {}: not a regular file", path.display());
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| SourceFile::new(path, kind))
        .collect())
}

// Helper function to create an output directory if it is missing
fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| BinningError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

// Helper function to write a one-dimensional array under the overwrite policy
fn write_output<T, I>(path: &Path, values: I, overwrite: OverwritePolicy) -> Result<()>
where
    T: NpyElement,
    I: ExactSizeIterator<Item = T>,
{
    let mut options = OpenOptions::new();
    options.write(true);
    match overwrite {
        // create_new fails without touching an existing file
        OverwritePolicy::Refuse => options.create_new(true),
        OverwritePolicy::Force => options.create(true).truncate(true),
    };

    let io_error = |source: io::Error| match source.kind() {
        io::ErrorKind::AlreadyExists => BinningError::DuplicateOutput {
            path: path.to_path_buf(),
        },
        _ => BinningError::Io {
            path: path.to_path_buf(),
            source,
        },
    };

    let file = options.open(path).map_err(io_error)?;
    write_or_remove(path, file, |writer| {
        npy::write_array(writer, values).map_err(|e| match e {
            NpyError::Io(source) => io_error(source),
            other => BinningError::malformed(path, other.to_string()),
        })?;
        writer.flush().map_err(io_error)
    })
}

// Helper function to run `write` on a freshly opened output file
//
// A failed write removes the file, so a rerun is not blocked by a partial
// output under the refuse policy.
fn write_or_remove<F>(path: &Path, file: File, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let mut writer = BufWriter::with_capacity(IO_BUFFER_SIZE, file);
    let result = write(&mut writer);
    if result.is_err() {
        drop(writer);
        if let Err(e) = fs::remove_file(path) {
            warn!("Could not remove partial output {}: {}", path.display(), e);
        }
    }
    result
}

fn plural(count: usize) -> &'static str {
    if count != 1 {
        "s"
    } else {
        ""
    }
}
