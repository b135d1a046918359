use std::time::Duration;

use anyhow::Result;

use crate::error::TrimError;

/// Default forward adapter (Illumina TruSeq).
pub const DEFAULT_ADAPTER1: &str = "AGATCGGAAGAGCACACGTCTGAACTCCAGTCA";
/// Default reverse adapter (Illumina TruSeq).
pub const DEFAULT_ADAPTER2: &str = "AGATCGGAAGAGCGTCGTGTAGGGAAAGAGTGT";
/// Adapters shorter than this are rejected.
pub const MIN_ADAPTER_LEN: usize = 15;
/// Upper bound (exclusive) of supported read lengths. Also the size of all
/// length-indexed histograms.
pub const MAXLEN: usize = 1000;
/// Number of adapter bases after a candidate insert boundary that are checked
/// for adapter evidence.
pub const ADAPTER_OVERLAP: usize = 10;
/// Maximum number of adapter bases compared in the residual adapter search.
pub const MAX_ADAPTER_COMPARE: usize = 20;

/// Parameters of a trimming run. Constructed once, then shared read-only by
/// all pipeline stages.
#[derive(Debug, Clone)]
pub struct RunParameters {
    pub adapter1: Vec<u8>,
    pub adapter2: Vec<u8>,
    pub match_perc: f64,  // minimum percentage of matching bases of insert/adapter matches
    pub mep: f64,  // maximum probability of a match to be random
    pub min_overlap: usize,  // minimum number of compared bases for insert/adapter matches
    pub qcut: u32,
    pub qwin: usize,
    pub qoff: u8,
    pub ncut: usize,
    pub min_len: usize,
    pub block_size: usize,
    pub block_prefetch: usize,
    pub threads: usize,
    pub error_correction: bool,
    pub collect_qc: bool,
    pub progress: Option<Duration>,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            adapter1: DEFAULT_ADAPTER1.as_bytes().to_vec(),
            adapter2: DEFAULT_ADAPTER2.as_bytes().to_vec(),
            match_perc: 80.0,
            mep: 1e-6,
            min_overlap: 10,
            qcut: 15,
            qwin: 5,
            qoff: 33,
            ncut: 7,
            min_len: 30,
            block_size: 10000,
            block_prefetch: 32,
            threads: 1,
            error_correction: false,
            collect_qc: false,
            progress: None,
        }
    }
}

impl RunParameters {
    pub fn with_adapters(mut self, adapter1: &str, adapter2: &str) -> Self {
        self.adapter1 = normalize_adapter(adapter1);
        self.adapter2 = normalize_adapter(adapter2);
        self
    }

    pub fn with_match_perc(mut self, match_perc: f64) -> Self {
        self.match_perc = match_perc;
        self
    }

    pub fn with_mep(mut self, mep: f64) -> Self {
        self.mep = mep;
        self
    }

    pub fn with_min_overlap(mut self, min_overlap: usize) -> Self {
        self.min_overlap = min_overlap;
        self
    }

    /// Quality trimming cutoff, window size and FASTQ score offset. A cutoff
    /// of 0 disables quality trimming.
    pub fn with_quality_trimming(mut self, qcut: u32, qwin: usize, qoff: u8) -> Self {
        self.qcut = qcut;
        self.qwin = qwin;
        self.qoff = qoff;
        self
    }

    pub fn with_ncut(mut self, ncut: usize) -> Self {
        self.ncut = ncut;
        self
    }

    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_block_prefetch(mut self, block_prefetch: usize) -> Self {
        self.block_prefetch = block_prefetch;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_error_correction(mut self, enable: bool) -> Self {
        self.error_correction = enable;
        self
    }

    pub fn with_qc(mut self, enable: bool) -> Self {
        self.collect_qc = enable;
        self
    }

    pub fn with_progress(mut self, interval: Option<Duration>) -> Self {
        self.progress = interval;
        self
    }

    /// Number of adapter bases compared in the residual adapter search.
    pub fn adapter_compare_len(&self) -> usize {
        MAX_ADAPTER_COMPARE.min(self.adapter1.len()).min(self.adapter2.len())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, adapter) in [("Forward", &self.adapter1), ("Reverse", &self.adapter2)] {
            if adapter.len() < MIN_ADAPTER_LEN {
                return Err(TrimError::config(format!(
                    "{} adapter {} too short! At least {} bases are required.",
                    name, String::from_utf8_lossy(adapter), MIN_ADAPTER_LEN,
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.match_perc) {
            return Err(TrimError::config(format!(
                "match_perc must be within [0, 100]: {}",
                self.match_perc,
            )));
        }
        if !(0.0..=1.0).contains(&self.mep) {
            return Err(TrimError::config(format!("mep must be within [0, 1]: {}", self.mep)));
        }
        if self.qcut > 0 && self.qwin == 0 {
            return Err(TrimError::config("qwin must be positive when quality trimming is enabled"));
        }
        if self.block_size == 0 || self.block_prefetch == 0 || self.threads == 0 {
            return Err(TrimError::config("block_size, block_prefetch and threads must be positive"));
        }
        Ok(())
    }
}

fn normalize_adapter(adapter: &str) -> Vec<u8> {
    adapter.trim().to_ascii_uppercase().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = RunParameters::default();
        params.validate().unwrap();
        assert_eq!(params.adapter_compare_len(), 20);
    }

    #[test]
    fn test_short_adapter() {
        let err = RunParameters::default()
            .with_adapters("AGATCGGAAGAGC", DEFAULT_ADAPTER2)
            .validate()
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<TrimError>(), Some(TrimError::Config(_))));
        assert!(err.to_string().contains("AGATCGGAAGAGC"));
    }

    #[test]
    fn test_adapter_normalization() {
        let params = RunParameters::default().with_adapters(" agatcggaagagcacac \n", DEFAULT_ADAPTER2);
        assert_eq!(params.adapter1, b"AGATCGGAAGAGCACAC");
        assert_eq!(params.adapter_compare_len(), 17);
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(RunParameters::default().with_match_perc(120.0).validate().is_err());
        assert!(RunParameters::default().with_mep(-0.1).validate().is_err());
        assert!(RunParameters::default().with_threads(0).validate().is_err());
        assert!(RunParameters::default().with_quality_trimming(15, 0, 33).validate().is_err());
        assert!(RunParameters::default().with_quality_trimming(0, 0, 33).validate().is_ok());
    }
}
