use std::path::PathBuf;

use crate::types::{BinningError, EdgeSpacing, OverwritePolicy, Result};

/// Everything a [`Binner`](crate::Binner) needs to know about one run.
///
/// # Examples
///
/// ```
/// use spike_binner::{BinningConfig, OverwritePolicy};
///
/// let config = BinningConfig::new("data/binaries", "data/indicator", 100, 46)
///     .unwrap()
///     .with_overwrite(OverwritePolicy::Force);
/// assert_eq!(config.bin_size_ms, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinningConfig {
    /// Root holding one directory of raw binaries per patient
    pub binaries_root: PathBuf,
    /// Directory holding the indicator function files
    pub indicators_root: PathBuf,
    /// Bin width (ms)
    pub bin_size_ms: u32,
    /// Patient number
    pub patient_id: u32,
    pub overwrite: OverwritePolicy,
    pub edge_spacing: EdgeSpacing,
}

impl BinningConfig {
    /// Creates a configuration that refuses to overwrite and uses linear edges.
    ///
    /// Fails with [`BinningError::InvalidConfig`] when the bin size or patient
    /// id is zero.
    pub fn new(
        binaries_root: impl Into<PathBuf>,
        indicators_root: impl Into<PathBuf>,
        bin_size_ms: u32,
        patient_id: u32,
    ) -> Result<Self> {
        if bin_size_ms == 0 {
            return Err(BinningError::InvalidConfig(
                "bin size must be a positive number of milliseconds".to_string(),
            ));
        }
        if patient_id == 0 {
            return Err(BinningError::InvalidConfig(
                "patient id must be a positive integer".to_string(),
            ));
        }

        Ok(BinningConfig {
            binaries_root: binaries_root.into(),
            indicators_root: indicators_root.into(),
            bin_size_ms,
            patient_id,
            overwrite: OverwritePolicy::default(),
            edge_spacing: EdgeSpacing::default(),
        })
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn with_edge_spacing(mut self, edge_spacing: EdgeSpacing) -> Self {
        self.edge_spacing = edge_spacing;
        self
    }

    /// Parses the four positional values
    /// `<binaries_root> <indicators_root> <bin_size_ms> <patient_id>`.
    ///
    /// The iterator must not include the program name.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        if args.len() != 4 {
            return Err(BinningError::InvalidConfig(format!(
                "expected 4 arguments (binaries, indicators, bin size, patient id), got {}",
                args.len()
            )));
        }

        let bin_size_ms = parse_positive(&args[2], "bin size")?;
        let patient_id = parse_positive(&args[3], "patient id")?;

        BinningConfig::new(&args[0], &args[1], bin_size_ms, patient_id)
    }
}

// Helper function to parse an integer argument
fn parse_positive(value: &str, what: &str) -> Result<u32> {
    value.trim().parse::<u32>().map_err(|_| {
        BinningError::InvalidConfig(format!("{} must be a positive integer, got '{}'", what, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_arguments() {
        let config = BinningConfig::from_args(["/bin/", "/ind/", "100", "46"]).unwrap();
        assert_eq!(config.binaries_root, PathBuf::from("/bin/"));
        assert_eq!(config.indicators_root, PathBuf::from("/ind/"));
        assert_eq!(config.bin_size_ms, 100);
        assert_eq!(config.patient_id, 46);
        assert_eq!(config.overwrite, OverwritePolicy::Refuse);
        assert_eq!(config.edge_spacing, EdgeSpacing::Linear);
    }

    #[test]
    fn rejects_wrong_argument_count() {
        let result = BinningConfig::from_args(["/bin/", "/ind/", "100"]);
        assert!(matches!(result, Err(BinningError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_non_numeric_and_zero_values() {
        for args in [
            ["/bin/", "/ind/", "abc", "46"],
            ["/bin/", "/ind/", "100", "-3"],
            ["/bin/", "/ind/", "0", "46"],
            ["/bin/", "/ind/", "100", "0"],
        ] {
            assert!(
                matches!(BinningConfig::from_args(args), Err(BinningError::InvalidConfig(_))),
                "accepted {:?}",
                args
            );
        }
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = BinningConfig::new("a", "b", 50, 1)
            .unwrap()
            .with_overwrite(OverwritePolicy::Force)
            .with_edge_spacing(EdgeSpacing::Exact);
        assert_eq!(config.overwrite, OverwritePolicy::Force);
        assert_eq!(config.edge_spacing, EdgeSpacing::Exact);
    }
}
