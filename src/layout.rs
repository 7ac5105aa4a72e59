//! Directory and file naming conventions of the binning pipeline.
//!
//! ```text
//! <binaries_root>/<patient>/rec_refs<patient>.npy          boundary record
//! <binaries_root>/<patient>/CSC*.npy                      spike sources
//! <indicators_root>/*fxn.npy                              indicator sources
//! <binaries_root>/<patient>/<bin>/<stem>_bin<bin>.npy     spike counts
//! <binaries_root>/<patient>/<bin>/indicators/<stem>_bin<bin>.npy
//! <binaries_root>/<patient>/<bin>/edges_bin<bin>.npy
//! ```

use std::path::{Path, PathBuf};

use crate::config::BinningConfig;
use crate::types::OutputKind;

const NPY_EXTENSION: &str = "npy";
const SPIKE_PREFIX: &str = "CSC";
const INDICATOR_SUFFIX: &str = "fxn.npy";
const INDICATOR_SUBDIR: &str = "indicators";

/// Resolves every input and output path for one patient and bin size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    binaries_root: PathBuf,
    indicators_root: PathBuf,
    patient_id: u32,
    bin_size_ms: u32,
}

impl OutputLayout {
    pub fn new(config: &BinningConfig) -> Self {
        OutputLayout {
            binaries_root: config.binaries_root.clone(),
            indicators_root: config.indicators_root.clone(),
            patient_id: config.patient_id,
            bin_size_ms: config.bin_size_ms,
        }
    }

    /// Directory of the patient's raw binaries
    pub fn patient_dir(&self) -> PathBuf {
        self.binaries_root.join(self.patient_id.to_string())
    }

    pub fn indicators_dir(&self) -> &Path {
        &self.indicators_root
    }

    /// Boundary record holding recording start and stop
    pub fn rec_refs_path(&self) -> PathBuf {
        self.patient_dir()
            .join(format!("rec_refs{}.{}", self.patient_id, NPY_EXTENSION))
    }

    /// Size-tagged directory for all outputs of this bin size
    pub fn bin_dir(&self) -> PathBuf {
        self.patient_dir().join(self.bin_size_ms.to_string())
    }

    /// Directory that receives outputs of the given kind
    pub fn output_dir(&self, kind: OutputKind) -> PathBuf {
        match kind {
            OutputKind::Spikes => self.bin_dir(),
            OutputKind::Indicator => self.bin_dir().join(INDICATOR_SUBDIR),
        }
    }

    /// Output path for `source`: its stem plus `_bin<size>.npy`.
    ///
    /// Returns `None` if the source path has no file name.
    pub fn output_path(&self, source: &Path, kind: OutputKind) -> Option<PathBuf> {
        let name = source.file_name()?.to_string_lossy();
        let stem = name
            .strip_suffix(&format!(".{}", NPY_EXTENSION))
            .unwrap_or(&*name);
        Some(self.output_dir(kind).join(format!(
            "{}_bin{}.{}",
            stem, self.bin_size_ms, NPY_EXTENSION
        )))
    }

    pub fn edges_path(&self) -> PathBuf {
        self.bin_dir()
            .join(format!("edges_bin{}.{}", self.bin_size_ms, NPY_EXTENSION))
    }
}

/// Spike sources are named `CSC<channel>.npy`.
pub fn is_spike_file(name: &str) -> bool {
    name.starts_with(SPIKE_PREFIX) && name.ends_with(&format!(".{}", NPY_EXTENSION))
}

/// Indicator sources end in `fxn.npy`.
pub fn is_indicator_file(name: &str) -> bool {
    name.ends_with(INDICATOR_SUFFIX)
}
