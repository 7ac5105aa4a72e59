use ndarray::Array1;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for binning operations
pub type Result<T> = std::result::Result<T, BinningError>;

/// Time span of a patient's recording.
///
/// Loaded once per patient from the `rec_refs<patient>.npy` boundary record
/// and never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingWindow {
    /// Recording start (ms)
    pub start_ms: f64,
    /// Recording stop (ms)
    pub stop_ms: f64,
}

impl RecordingWindow {
    /// Returns the length of the recording in milliseconds.
    pub fn span_ms(&self) -> f64 {
        self.stop_ms - self.start_ms
    }

    /// Number of whole bins of `bin_size_ms` that fit in the window.
    ///
    /// The quotient is truncated toward zero.
    pub fn bin_count(&self, bin_size_ms: u32) -> usize {
        (self.span_ms() / f64::from(bin_size_ms)).trunc() as usize
    }
}

/// How bin edges are laid out across the recording window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeSpacing {
    /// `bin_count + 1` edges linearly spaced from start to stop inclusive.
    ///
    /// Matches the existing output files. Because the bin count is truncated
    /// but the edges still span the full window, the real bin width is
    /// `span / bin_count`, which is only approximately the requested size.
    #[default]
    Linear,
    /// Edges at `start + i * bin_size`; the trailing partial bin is dropped.
    Exact,
}

/// What happens when an output file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Fail with [`BinningError::DuplicateOutput`] and leave the file untouched
    #[default]
    Refuse,
    /// Replace the existing file
    Force,
}

/// Ordered, strictly increasing bin boundaries.
///
/// Holds `N + 1` values for `N` bins. Computed once per patient and bin size
/// and shared by every histogram of that run.
#[derive(Debug, Clone, PartialEq)]
pub struct BinEdges {
    edges: Array1<f64>,
}

impl BinEdges {
    /// Upper bound on the number of bins in one run (about 74 hours at 1 ms).
    pub const MAX_BINS: usize = 1 << 28;

    /// Builds the edges for `window` at `bin_size_ms`.
    ///
    /// Returns `None` when the window does not hold a single whole bin, since
    /// no strictly increasing edge sequence exists in that case, or when it
    /// would need more than [`BinEdges::MAX_BINS`] bins.
    pub fn for_window(
        window: &RecordingWindow,
        bin_size_ms: u32,
        spacing: EdgeSpacing,
    ) -> Option<Self> {
        let bin_count = window.bin_count(bin_size_ms);
        if bin_count == 0 || bin_count > Self::MAX_BINS {
            return None;
        }
        let num_edges = bin_count.checked_add(1)?;

        let edges = match spacing {
            EdgeSpacing::Linear => {
                let step = window.span_ms() / bin_count as f64;
                let mut edges =
                    Array1::from_shape_fn(num_edges, |i| window.start_ms + step * i as f64);
                // Pin the last edge so floating point drift cannot drop values at `stop`
                edges[bin_count] = window.stop_ms;
                edges
            }
            EdgeSpacing::Exact => {
                let width = f64::from(bin_size_ms);
                Array1::from_shape_fn(num_edges, |i| window.start_ms + width * i as f64)
            }
        };

        Some(BinEdges { edges })
    }

    /// Number of bins (one less than the number of edges).
    pub fn num_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Lowest edge
    pub fn first(&self) -> f64 {
        self.edges[0]
    }

    /// Highest edge
    pub fn last(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    pub fn as_array(&self) -> &Array1<f64> {
        &self.edges
    }

    pub fn as_slice(&self) -> &[f64] {
        // Always built in standard layout
        self.edges.as_slice().unwrap_or(&[])
    }

    /// Returns the bin index for `value`, or `None` when it falls outside
    /// `[first, last]` or is not a finite number.
    ///
    /// Bins are half-open `[edges[i], edges[i + 1])` except the last one,
    /// which also includes its right edge.
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        if !value.is_finite() || value < self.first() || value > self.last() {
            return None;
        }
        if value == self.last() {
            return Some(self.num_bins() - 1);
        }
        let upper = self.as_slice().partition_point(|edge| *edge <= value);
        Some(upper - 1)
    }

    /// Counts `values` into the bins.
    pub fn histogram<'a, I>(&self, values: I) -> Histogram
    where
        I: IntoIterator<Item = &'a f64>,
    {
        let mut counts = Array1::<i64>::zeros(self.num_bins());
        let mut excluded = 0;

        for &value in values {
            match self.bin_index(value) {
                Some(i) => counts[i] += 1,
                None => excluded += 1,
            }
        }

        Histogram { counts, excluded }
    }
}

/// Per-bin counts for one source file.
///
/// Written once and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// One count per bin
    pub counts: Array1<i64>,
    /// Number of input values that landed in no bin
    pub excluded: usize,
}

impl Histogram {
    /// Sum of all bin counts
    pub fn total(&self) -> i64 {
        self.counts.sum()
    }
}

/// Which pass a source file belongs to, and therefore where its output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Spike timestamps of one recording channel
    Spikes,
    /// Indicator function trace
    Indicator,
}

/// An input file together with the kind of output it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: OutputKind,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, kind: OutputKind) -> Self {
        SourceFile {
            path: path.into(),
            kind,
        }
    }

    pub fn spikes(path: impl Into<PathBuf>) -> Self {
        Self::new(path, OutputKind::Spikes)
    }

    pub fn indicator(path: impl Into<PathBuf>) -> Self {
        Self::new(path, OutputKind::Indicator)
    }
}

/// Outcome of binning a single source file.
#[derive(Debug, Clone)]
pub struct BinnedFile {
    pub source: PathBuf,
    pub output: PathBuf,
    pub histogram: Histogram,
}

/// Everything written by a full run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub spikes: Vec<BinnedFile>,
    pub indicators: Vec<BinnedFile>,
    /// Location of the saved bin edges
    pub edges: PathBuf,
}

/// Errors raised while binning a patient's recordings.
///
/// None of them are recoverable within a run: the operator has to fix the
/// inputs (or remove stale outputs) and start again.
#[derive(Error, Debug)]
pub enum BinningError {
    /// A required boundary record or source file does not exist
    #[error("Missing input file: {}", path.display())]
    MissingInput { path: PathBuf },

    /// The destination file is already on disk
    #[error("Output already exists: {}", path.display())]
    DuplicateOutput { path: PathBuf },

    /// An input file could not be decoded or has the wrong shape
    #[error("Malformed input {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any other I/O failure
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BinningError {
    pub(crate) fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        BinningError::MalformedInput {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Maps an I/O error on `path` to the matching variant.
    pub(crate) fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => BinningError::MissingInput {
                path: path.to_path_buf(),
            },
            io::ErrorKind::AlreadyExists => BinningError::DuplicateOutput {
                path: path.to_path_buf(),
            },
            _ => BinningError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn window(start_ms: f64, stop_ms: f64) -> RecordingWindow {
        RecordingWindow { start_ms, stop_ms }
    }

    #[test]
    fn linear_edges_cover_whole_window() {
        let edges = BinEdges::for_window(&window(0.0, 1000.0), 100, EdgeSpacing::Linear).unwrap();
        assert_eq!(edges.num_bins(), 10);
        for (i, edge) in edges.as_slice().iter().enumerate() {
            assert_relative_eq!(*edge, 100.0 * i as f64);
        }
    }

    #[test]
    fn linear_edges_stretch_over_truncated_remainder() {
        // 1050 / 100 truncates to 10 bins, each 105 ms wide
        let edges = BinEdges::for_window(&window(0.0, 1050.0), 100, EdgeSpacing::Linear).unwrap();
        assert_eq!(edges.num_bins(), 10);
        assert_relative_eq!(edges.as_slice()[1], 105.0);
        assert_eq!(edges.last(), 1050.0);
    }

    #[test]
    fn exact_edges_drop_partial_bin() {
        let edges = BinEdges::for_window(&window(20.0, 1070.0), 100, EdgeSpacing::Exact).unwrap();
        assert_eq!(edges.num_bins(), 10);
        assert_eq!(edges.first(), 20.0);
        assert_eq!(edges.last(), 1020.0);
    }

    #[test]
    fn window_shorter_than_one_bin_has_no_edges() {
        assert!(BinEdges::for_window(&window(0.0, 99.0), 100, EdgeSpacing::Linear).is_none());
    }

    #[test]
    fn oversized_window_has_no_edges() {
        let huge = window(0.0, 1e30);
        assert!(BinEdges::for_window(&huge, 1, EdgeSpacing::Linear).is_none());
        assert!(BinEdges::for_window(&huge, 100, EdgeSpacing::Exact).is_none());

        let just_over = window(0.0, (BinEdges::MAX_BINS + 1) as f64);
        assert!(BinEdges::for_window(&just_over, 1, EdgeSpacing::Linear).is_none());
    }

    #[test]
    fn histogram_matches_reference_example() {
        let edges = BinEdges::for_window(&window(0.0, 1000.0), 100, EdgeSpacing::Linear).unwrap();
        let spikes = [50.0, 150.0, 999.0, 1000.0, 1001.0];
        let hist = edges.histogram(spikes.iter());

        let mut expected = vec![0i64; 10];
        expected[0] = 1;
        expected[1] = 1;
        expected[9] = 2;
        assert_eq!(hist.counts.to_vec(), expected);
        assert_eq!(hist.total(), 4);
        assert_eq!(hist.excluded, 1);
    }

    #[test]
    fn interior_edge_belongs_to_upper_bin() {
        let edges = BinEdges::for_window(&window(0.0, 1000.0), 100, EdgeSpacing::Linear).unwrap();
        assert_eq!(edges.bin_index(0.0), Some(0));
        assert_eq!(edges.bin_index(100.0), Some(1));
        assert_eq!(edges.bin_index(999.999), Some(9));
        assert_eq!(edges.bin_index(1000.0), Some(9));
    }

    #[test]
    fn values_outside_window_are_excluded() {
        let edges = BinEdges::for_window(&window(100.0, 200.0), 10, EdgeSpacing::Linear).unwrap();
        assert_eq!(edges.bin_index(99.9), None);
        assert_eq!(edges.bin_index(200.1), None);
        assert_eq!(edges.bin_index(f64::NAN), None);
        assert_eq!(edges.bin_index(f64::INFINITY), None);
    }

    #[test]
    fn io_errors_map_to_taxonomy() {
        let path = Path::new("/data/46/rec_refs46.npy");
        let missing = BinningError::from_io(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(missing, BinningError::MissingInput { .. }));

        let dup = BinningError::from_io(path, io::Error::from(io::ErrorKind::AlreadyExists));
        assert!(matches!(dup, BinningError::DuplicateOutput { .. }));

        let other = BinningError::from_io(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(other, BinningError::Io { .. }));
    }
}
