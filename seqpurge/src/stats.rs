use std::io::Write;

use anyhow::Result;
use itertools::Itertools;

use crate::params::{RunParameters, MAXLEN};
use crate::qc::{Metrics, ReadQc};

/// Number of adapter positions tracked for the consensus adapter sequence.
pub const CONSENSUS_LEN: usize = 40;
/// Minimum number of observed bases for a consensus position to be reported.
const CONSENSUS_MIN_DEPTH: u64 = 20;

/// Base composition at one position.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BaseCounts {
    pub a: u64,
    pub c: u64,
    pub g: u64,
    pub t: u64,
    pub n: u64,
}

impl BaseCounts {
    pub fn inc(&mut self, base: u8) {
        match base {
            b'A' => self.a += 1,
            b'C' => self.c += 1,
            b'G' => self.g += 1,
            b'T' => self.t += 1,
            _ => self.n += 1,
        }
    }

    /// Number of unambiguous bases.
    pub fn depth(&self) -> u64 {
        self.a + self.c + self.g + self.t
    }

    pub fn max(&self) -> u64 {
        self.a.max(self.c).max(self.g).max(self.t)
    }

    /// Majority base, or `N` if no base reaches more than half of the depth.
    pub fn call(&self) -> u8 {
        let max = self.max();
        let depth = self.depth();
        if depth == 0 || max as f64 / depth as f64 <= 0.5 {
            b'N'
        } else if self.a == max {
            b'A'
        } else if self.c == max {
            b'C'
        } else if self.g == max {
            b'G'
        } else {
            b'T'
        }
    }

    fn merge(&mut self, other: &Self) {
        self.a += other.a;
        self.c += other.c;
        self.g += other.g;
        self.t += other.t;
        self.n += other.n;
    }
}

/// Accumulates the bases observed after insert boundaries in order to
/// reconstruct the adapter that is actually present in the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConsensus(Vec<BaseCounts>);

impl Default for AdapterConsensus {
    fn default() -> Self {
        Self(vec![BaseCounts::default(); CONSENSUS_LEN])
    }
}

impl AdapterConsensus {
    pub fn add(&mut self, adapter: impl IntoIterator<Item = u8>) {
        self.0.iter_mut().zip(adapter).for_each(|(counts, base)| counts.inc(base));
    }

    /// Consensus sequence. It stops at the first position with fewer than 20
    /// observed bases.
    pub fn sequence(&self) -> String {
        self.0.iter()
            .take_while(|x| x.depth() >= CONSENSUS_MIN_DEPTH)
            .map(|x| x.call() as char)
            .collect()
    }

    fn merge(&mut self, other: &Self) {
        self.0.iter_mut().zip(&other.0).for_each(|(a, b)| a.merge(b));
    }

    fn reset(&mut self) {
        self.0.fill(BaseCounts::default());
    }
}

/// Statistics of the optional mate-overlap error correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCorrectionStats {
    pub mismatch_r1: Vec<u64>,  // corrected bases per cycle of read 1
    pub mismatch_r2: Vec<u64>,  // corrected bases per cycle of read 2
    pub errors_per_read: Vec<u64>,  // number of pairs by mismatch count
}

impl Default for ErrorCorrectionStats {
    fn default() -> Self {
        Self {
            mismatch_r1: vec![0; MAXLEN],
            mismatch_r2: vec![0; MAXLEN],
            errors_per_read: vec![0; MAXLEN],
        }
    }
}

impl ErrorCorrectionStats {
    fn merge(&mut self, other: &Self) {
        add_assign(&mut self.mismatch_r1, &other.mismatch_r1);
        add_assign(&mut self.mismatch_r2, &other.mismatch_r2);
        add_assign(&mut self.errors_per_read, &other.errors_per_read);
    }

    fn reset(&mut self) {
        self.mismatch_r1.fill(0);
        self.mismatch_r2.fill(0);
        self.errors_per_read.fill(0);
    }

    pub fn write_report<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out)?;
        writeln!(out, "Read error per cycle (read 1):")?;
        write_histogram(out, &self.mismatch_r1, 1)?;
        writeln!(out)?;
        writeln!(out, "Read error per cycle (read 2):")?;
        write_histogram(out, &self.mismatch_r2, 1)?;
        writeln!(out)?;
        writeln!(out, "Read error count distribution:")?;
        write_histogram(out, &self.errors_per_read[1..], 1)?;
        Ok(())
    }
}

/// Trimming statistics. A job accumulates its own partial statistics which
/// are merged into the run-wide aggregate once the job has been written.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub read_num: u64,  // forward + reverse reads
    pub insert_trimmed_pairs: u64,
    pub adapter_trimmed_pairs: u64,
    pub quality_trimmed_reads: u64,
    pub n_trimmed_reads: u64,
    pub kept_pairs: u64,
    pub singleton_reads: u64,
    pub removed_reads: u64,
    pub bases_perc_trim_sum: f64,  // sum of the trimmed fraction of each read
    pub length_histogram: Vec<u64>,  // read length after trimming of written reads
    pub consensus1: AdapterConsensus,
    pub consensus2: AdapterConsensus,
    pub error_correction: ErrorCorrectionStats,
    pub qc: ReadQc,
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self {
            read_num: 0,
            insert_trimmed_pairs: 0,
            adapter_trimmed_pairs: 0,
            quality_trimmed_reads: 0,
            n_trimmed_reads: 0,
            kept_pairs: 0,
            singleton_reads: 0,
            removed_reads: 0,
            bases_perc_trim_sum: 0.0,
            length_histogram: vec![0; MAXLEN],
            consensus1: AdapterConsensus::default(),
            consensus2: AdapterConsensus::default(),
            error_correction: ErrorCorrectionStats::default(),
            qc: ReadQc::default(),
        }
    }
}

impl RunStatistics {
    /// Clear all counters, keeping the allocated histograms.
    pub fn reset(&mut self) {
        self.read_num = 0;
        self.insert_trimmed_pairs = 0;
        self.adapter_trimmed_pairs = 0;
        self.quality_trimmed_reads = 0;
        self.n_trimmed_reads = 0;
        self.kept_pairs = 0;
        self.singleton_reads = 0;
        self.removed_reads = 0;
        self.bases_perc_trim_sum = 0.0;
        self.length_histogram.fill(0);
        self.consensus1.reset();
        self.consensus2.reset();
        self.error_correction.reset();
        self.qc = ReadQc::default();
    }

    pub fn merge(&mut self, other: &Self) {
        self.read_num += other.read_num;
        self.insert_trimmed_pairs += other.insert_trimmed_pairs;
        self.adapter_trimmed_pairs += other.adapter_trimmed_pairs;
        self.quality_trimmed_reads += other.quality_trimmed_reads;
        self.n_trimmed_reads += other.n_trimmed_reads;
        self.kept_pairs += other.kept_pairs;
        self.singleton_reads += other.singleton_reads;
        self.removed_reads += other.removed_reads;
        self.bases_perc_trim_sum += other.bases_perc_trim_sum;
        add_assign(&mut self.length_histogram, &other.length_histogram);
        self.consensus1.merge(&other.consensus1);
        self.consensus2.merge(&other.consensus2);
        self.error_correction.merge(&other.error_correction);
        self.qc.merge(&other.qc);
    }

    /// Record a read that has been written with `len` remaining bases.
    pub(crate) fn add_written_read(&mut self, len: usize, orig_len: usize) {
        self.length_histogram[len] += 1;
        if orig_len > 0 {
            self.bases_perc_trim_sum += (orig_len - len) as f64 / orig_len as f64;
        }
    }

    /// Record a read that has been discarded.
    pub(crate) fn add_removed_read(&mut self) {
        self.removed_reads += 1;
        self.bases_perc_trim_sum += 1.0;
    }

    pub fn write_summary<W: Write>(&self, out: &mut W, params: &RunParameters) -> Result<()> {
        let read_num = self.read_num;
        let reads_trimmed_insert = 2 * self.insert_trimmed_pairs;
        let reads_trimmed_adapter = 2 * self.adapter_trimmed_pairs;
        let reads_trimmed = reads_trimmed_insert + reads_trimmed_adapter;

        writeln!(out, "Reads (forward + reverse): {}", read_num)?;
        writeln!(out)?;
        writeln!(out, "Reads trimmed by insert match: {}", reads_trimmed_insert)?;
        writeln!(out, "Reads trimmed by adapter match: {}", reads_trimmed_adapter)?;
        writeln!(out, "Reads trimmed by quality: {}", self.quality_trimmed_reads)?;
        writeln!(out, "Reads trimmed by N stretches: {}", self.n_trimmed_reads)?;
        writeln!(
            out,
            "Trimmed reads: {} of {} ({:.2}%)",
            reads_trimmed,
            read_num,
            percent(reads_trimmed as f64, read_num),
        )?;
        writeln!(
            out,
            "Removed reads: {} of {} ({:.2}%)",
            self.removed_reads,
            read_num,
            percent(self.removed_reads as f64, read_num),
        )?;
        writeln!(out, "Removed bases: {:.2}%", percent(self.bases_perc_trim_sum, read_num))?;
        writeln!(out)?;

        writeln!(out, "Forward adapter sequence (given)    : {}", String::from_utf8_lossy(&params.adapter1))?;
        writeln!(out, "Forward adapter sequence (consensus): {}", self.consensus1.sequence())?;
        writeln!(out, "Reverse adapter sequence (given)    : {}", String::from_utf8_lossy(&params.adapter2))?;
        writeln!(out, "Reverse adapter sequence (consensus): {}", self.consensus2.sequence())?;
        writeln!(out)?;

        writeln!(out, "Read length distribution after trimming:")?;
        write_histogram(out, &self.length_histogram, 0)?;
        Ok(())
    }

    /// Machine-readable summary: trimming counts and raw read QC.
    pub fn report(&self, metric: &mut Metrics) {
        metric.insert("read_count".to_string(), self.read_num as f64);
        metric.insert("insert_trimmed_reads".to_string(), (2 * self.insert_trimmed_pairs) as f64);
        metric.insert("adapter_trimmed_reads".to_string(), (2 * self.adapter_trimmed_pairs) as f64);
        metric.insert("quality_trimmed_reads".to_string(), self.quality_trimmed_reads as f64);
        metric.insert("n_trimmed_reads".to_string(), self.n_trimmed_reads as f64);
        metric.insert("kept_pairs".to_string(), self.kept_pairs as f64);
        metric.insert("singleton_reads".to_string(), self.singleton_reads as f64);
        metric.insert("removed_reads".to_string(), self.removed_reads as f64);
        metric.insert(
            "frac_removed_bases".to_string(),
            percent(self.bases_perc_trim_sum, self.read_num) / 100.0,
        );
        self.qc.report(metric);
    }

    /// One-line summary for logging.
    pub fn brief(&self) -> String {
        [
            ("reads", self.read_num),
            ("kept_pairs", self.kept_pairs),
            ("singletons", self.singleton_reads),
            ("removed", self.removed_reads),
        ].iter().map(|(k, v)| format!("{}={}", k, v)).join(" ")
    }
}

fn percent(value: f64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { 100.0 * value / total as f64 }
}

fn add_assign(target: &mut [u64], other: &[u64]) {
    target.iter_mut().zip(other).for_each(|(a, b)| *a += b);
}

/// Write `label: count` lines up to the last non-zero entry, labelling
/// entry `i` as `i + label_offset`.
fn write_histogram<W: Write>(out: &mut W, counts: &[u64], label_offset: usize) -> Result<()> {
    if let Some(last) = counts.iter().rposition(|&x| x > 0) {
        for (i, count) in counts[..=last].iter().enumerate() {
            writeln!(out, "{:>4}: {}", i + label_offset, count)?;
        }
    }
    Ok(())
}
