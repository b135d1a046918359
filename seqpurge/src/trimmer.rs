//! Adapter, quality and N trimming of read pairs.
//!
//! For every pair the insert is first searched by overlapping read 1 with the
//! reverse complement of read 2: if the fragment is shorter than the reads,
//! both reads run into adapter sequence at the same position and the
//! overlap of the insert parts is a significant match. Only if no insert
//! match is found, the reads are scanned for the adapter sequences
//! directly. Quality and N trimming are applied afterwards.

use anyhow::Result;
use bstr::ByteSlice;
use log::{debug, log_enabled, Level};
use noodles::fastq;

use crate::adapter::{find_adapter, has_adapter_evidence, MatchCount, MatchCriteria};
use crate::error::TrimError;
use crate::job::{Job, JobStatus};
use crate::params::{RunParameters, MAXLEN};
use crate::probability::MatchProbabilityCache;
use crate::stats::{RunStatistics, CONSENSUS_LEN};
use crate::trim::{trim_n, trim_quality, truncate};
use crate::utils::{complement, is_mate_pair, rev_compl};

/// An accepted overlap between read 1 and the reverse complement of read 2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsertMatch {
    /// Number of adapter bases at the end of read 2.
    pub offset: usize,
    /// Probability of the overlap being random.
    pub probability: f64,
}

pub struct Trimmer {
    params: RunParameters,
    criteria: MatchCriteria,
    cache: MatchProbabilityCache,
    adapter1_prefix: Vec<u8>,
    adapter2_prefix: Vec<u8>,
}

impl Trimmer {
    pub fn new(params: RunParameters) -> Result<Self> {
        params.validate()?;
        let criteria = MatchCriteria {
            match_perc: params.match_perc,
            mep: params.mep,
            min_overlap: params.min_overlap,
        };
        let a_size = params.adapter_compare_len();
        Ok(Self {
            criteria,
            cache: MatchProbabilityCache::new(MAXLEN),
            adapter1_prefix: params.adapter1[..a_size].to_vec(),
            adapter2_prefix: params.adapter2[..a_size].to_vec(),
            params,
        })
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    /// Trim all read pairs of a job in place.
    pub fn analyze(&self, job: &mut Job) -> Result<()> {
        for r in 0..job.read_count {
            let (r1, r2) = (&mut job.r1[r], &mut job.r2[r]);
            check_pair(r1, r2)?;
            if self.params.collect_qc {
                job.stats.qc.add_pair(r1, r2, self.params.qoff);
            }
            job.length_r1_orig[r] = r1.sequence().len();
            job.length_r2_orig[r] = r2.sequence().len();
            self.trim_pair(r1, r2, &mut job.stats);
        }
        job.status = JobStatus::ToBeWritten;
        Ok(())
    }

    /// Trim one read pair and record what happened in `stats`. The pair must
    /// have passed [`check_pair`].
    pub fn trim_pair(
        &self,
        r1: &mut fastq::Record,
        r2: &mut fastq::Record,
        stats: &mut RunStatistics,
    ) {
        if log_enabled!(Level::Debug) {
            debug!(
                "pair {} - read1: {} read2: {}",
                r1.name().as_bstr(), r1.sequence().as_bstr(), r2.sequence().as_bstr(),
            );
        }

        match self.find_insert(r1.sequence(), r2.sequence()) {
            Some(hit) => {
                let insert_len = r2.sequence().len() - hit.offset;
                stats.consensus1.add(adapter_tail(r1, insert_len));
                stats.consensus2.add(adapter_tail(r2, insert_len));
                truncate(r1, insert_len);
                truncate(r2, insert_len);
                stats.insert_trimmed_pairs += 1;
                debug!(
                    "insert match - offset: {} prob: {:e} insert: {}",
                    hit.offset, hit.probability, insert_len,
                );

                if self.params.error_correction {
                    self.correct_errors(r1, r2, stats);
                }
            }
            None => {
                let (criteria, cache) = (&self.criteria, &self.cache);
                let hit1 = find_adapter(r1.sequence(), &self.adapter1_prefix, criteria, cache);
                let hit2 = find_adapter(r2.sequence(), &self.adapter2_prefix, criteria, cache);
                let (pos1, pos2) = match (hit1, hit2) {
                    (None, None) => (None, None),
                    (Some((p1, _)), None) => (Some(p1), Some(p1)),
                    (None, Some((p2, _))) => (Some(p2), Some(p2)),
                    (Some((p1, _)), Some((p2, _))) => (Some(p1), Some(p2)),
                };
                if let (Some(pos1), Some(pos2)) = (pos1, pos2) {
                    debug!("adapter match - read1: {:?} read2: {:?}", hit1, hit2);
                    truncate(r1, pos1);
                    truncate(r2, pos2);
                    stats.adapter_trimmed_pairs += 1;
                }
            }
        }

        if self.params.qcut > 0 {
            for record in [&mut *r1, &mut *r2] {
                if trim_quality(record, self.params.qcut, self.params.qwin, self.params.qoff) > 0 {
                    stats.quality_trimmed_reads += 1;
                }
            }
        }

        if self.params.ncut > 0 {
            for record in [&mut *r1, &mut *r2] {
                if trim_n(record, self.params.ncut) > 0 {
                    stats.n_trimmed_reads += 1;
                }
            }
        }
    }

    /// Search the overlap of read 1 and the reverse complement of read 2
    /// that is least likely to be random. Among equally likely overlaps the
    /// one implying the longest insert wins.
    pub fn find_insert(&self, seq1: &[u8], seq2: &[u8]) -> Option<InsertMatch> {
        let seq2_rc = rev_compl(seq2);
        let min_length = seq1.len().min(seq2.len());
        let mut best: Option<InsertMatch> = None;

        for offset in 1..min_length {
            let overlap = min_length - offset;
            if overlap < self.criteria.min_overlap {
                break;
            }
            let max_mismatches =
                ((1.0 - self.criteria.match_perc / 100.0) * overlap as f64).ceil() as usize;
            let count = MatchCount::compare_bounded(
                &seq1[..overlap], &seq2_rc[offset..min_length], max_mismatches,
            );
            let Some(p) = count.significance(&self.criteria, &self.cache) else { continue };

            // bases after the insert, i.e. where the adapters should start
            let insert_len = seq2.len() - offset;
            let tail1 = seq1.get(insert_len..).unwrap_or_default();
            let tail2 = &seq2[insert_len..];
            if !has_adapter_evidence(
                offset,
                tail1,
                tail2,
                &self.params.adapter1,
                &self.params.adapter2,
                self.criteria.mep,
                &self.cache,
            ) {
                continue;
            }

            if best.is_none_or(|b| p < b.probability) {
                best = Some(InsertMatch { offset, probability: p });
            }
        }
        best
    }

    /// Correct mismatches in the overlap of a trimmed pair. At each position
    /// where the mates disagree, the base with the lower quality is replaced
    /// by the complement of the mate's base.
    fn correct_errors(
        &self,
        r1: &mut fastq::Record,
        r2: &mut fastq::Record,
        stats: &mut RunStatistics,
    ) {
        let count = r1.sequence().len().min(r2.sequence().len());
        let ec = &mut stats.error_correction;
        let mut mismatches = 0;
        for i in 0..count {
            let i2 = count - i - 1;
            let (b1, b2) = (r1.sequence()[i], r2.sequence()[i2]);
            if b1 == complement(b2) {
                continue;
            }
            mismatches += 1;
            let (q1, q2) = (r1.quality_scores()[i], r2.quality_scores()[i2]);
            if q1 > q2 {
                r2.sequence_mut()[i2] = complement(b1);
                r2.quality_scores_mut()[i2] = q1;
                ec.mismatch_r2[i2] += 1;
            } else if q1 < q2 {
                r1.sequence_mut()[i] = complement(b2);
                r1.quality_scores_mut()[i] = q2;
                ec.mismatch_r1[i] += 1;
            }
        }
        if mismatches > 0 {
            ec.errors_per_read[mismatches] += 1;
        }
    }
}

/// Bases following the insert, used for the adapter consensus.
fn adapter_tail(record: &fastq::Record, insert_len: usize) -> impl Iterator<Item = u8> + '_ {
    record.sequence().iter().skip(insert_len).take(CONSENSUS_LEN).copied()
}

/// Reject records that cannot be trimmed consistently.
pub fn check_pair(r1: &fastq::Record, r2: &fastq::Record) -> Result<()> {
    if !is_mate_pair(r1.name(), r2.name()) {
        return Err(TrimError::format(format!(
            "Headers of reads do not match:\n{}\n{}",
            r1.name().as_bstr(),
            r2.name().as_bstr(),
        )));
    }
    for record in [r1, r2] {
        let len = record.sequence().len();
        if len != record.quality_scores().len() {
            return Err(TrimError::format(format!(
                "Read {} has {} bases but {} quality scores",
                record.name().as_bstr(),
                len,
                record.quality_scores().len(),
            )));
        }
        if len >= MAXLEN {
            return Err(TrimError::format(format!(
                "Read length unsupported! A maximum read length of {} is supported: {}",
                MAXLEN - 1,
                record.name().as_bstr(),
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{DEFAULT_ADAPTER1, DEFAULT_ADAPTER2};
    use noodles::fastq::record::Definition;

    const INSERT: &str = "TTGACCATGACCAGTGGGTACCGATTAGCA";

    fn record(name: &str, seq: &[u8]) -> fastq::Record {
        fastq::Record::new(Definition::new(name, ""), seq.to_vec(), vec![b'I'; seq.len()])
    }

    fn pair(insert: &str, read_len: usize) -> (fastq::Record, fastq::Record) {
        let mut seq1 = [insert.as_bytes(), DEFAULT_ADAPTER1.as_bytes()].concat();
        let mut seq2 = [rev_compl(insert.as_bytes()).as_slice(), DEFAULT_ADAPTER2.as_bytes()].concat();
        seq1.resize(read_len, b'A');
        seq2.resize(read_len, b'A');
        (record("frag/1", &seq1), record("frag/2", &seq2))
    }

    fn trimmer(params: RunParameters) -> Trimmer {
        Trimmer::new(params).unwrap()
    }

    #[test]
    fn test_insert_match() {
        let trimmer = trimmer(RunParameters::default());
        let (mut r1, mut r2) = pair(INSERT, 60);
        let hit = trimmer.find_insert(r1.sequence(), r2.sequence()).unwrap();
        assert_eq!(hit.offset, 30);

        let mut stats = RunStatistics::default();
        trimmer.trim_pair(&mut r1, &mut r2, &mut stats);
        assert_eq!(r1.sequence(), INSERT.as_bytes());
        assert_eq!(r2.sequence(), rev_compl(INSERT.as_bytes()).as_slice());
        assert_eq!(r1.quality_scores().len(), 30);
        assert_eq!(stats.insert_trimmed_pairs, 1);
        assert_eq!(stats.adapter_trimmed_pairs, 0);
    }

    #[test]
    fn test_periodic_insert() {
        let trimmer = trimmer(RunParameters::default().with_min_len(10));
        let (mut r1, mut r2) = pair("ACGTACGTACGTACGTACGT", 53);
        let mut stats = RunStatistics::default();
        trimmer.trim_pair(&mut r1, &mut r2, &mut stats);
        assert_eq!(r1.sequence(), b"ACGTACGTACGTACGTACGT");
        assert_eq!(r2.sequence(), b"ACGTACGTACGTACGTACGT");
        assert_eq!(stats.insert_trimmed_pairs, 1);
        assert_eq!(stats.adapter_trimmed_pairs, 0);
    }

    #[test]
    fn test_no_adapter() {
        let trimmer = trimmer(RunParameters::default());
        let seq1 = b"TTGACCATGACCAGTGGGTACCGATTAGCAGGCTTACACGTAGC";
        let seq2 = b"GACTTGCAAGCATCCGAGTCCAGTAGACCTTGATGGCTACGGAT";
        assert_eq!(trimmer.find_insert(seq1, seq2), None);

        let (mut r1, mut r2) = (record("frag/1", seq1), record("frag/2", seq2));
        let mut stats = RunStatistics::default();
        trimmer.trim_pair(&mut r1, &mut r2, &mut stats);
        assert_eq!(r1.sequence(), seq1);
        assert_eq!(r2.sequence(), seq2);
        assert_eq!(stats, RunStatistics::default());
    }

    #[test]
    fn test_short_overlap_never_accepted() {
        // a permissive threshold would otherwise accept the 8 base overlap
        let params = RunParameters::default().with_mep(1.0).with_match_perc(0.0);
        let permissive = trimmer(params);
        let (r1, r2) = pair("ACCGTTAG", 40);
        let accepted = permissive.find_insert(r1.sequence(), r2.sequence());
        assert!(accepted.is_none_or(|hit| r2.sequence().len() - hit.offset >= 10));
        assert!(accepted.is_none_or(|hit| hit.offset != 32));

        let (r1, r2) = pair(INSERT, 60);
        let strict = trimmer(RunParameters::default().with_min_overlap(31));
        assert_eq!(strict.find_insert(r1.sequence(), r2.sequence()), None);
        let relaxed = trimmer(RunParameters::default().with_min_overlap(30));
        assert_eq!(relaxed.find_insert(r1.sequence(), r2.sequence()).map(|hit| hit.offset), Some(30));
    }

    #[test]
    fn test_adapter_match_without_overlap() {
        // read 2 contains no insert sequence, so only read 1 reveals the adapter
        let trimmer = trimmer(RunParameters::default());
        let seq1 = [INSERT.as_bytes(), DEFAULT_ADAPTER1.as_bytes()].concat();
        let seq2 = b"GACTTGCAAGCATCCGAGTCCAGTAGACCTTGATGGCTACGGATCCTTAGGACTCGACAGTCA";
        let (mut r1, mut r2) = (record("frag/1", &seq1), record("frag/2", seq2));
        let mut stats = RunStatistics::default();
        trimmer.trim_pair(&mut r1, &mut r2, &mut stats);
        assert_eq!(r1.sequence(), INSERT.as_bytes());
        assert_eq!(r2.sequence().len(), INSERT.len());
        assert_eq!(stats.insert_trimmed_pairs, 0);
        assert_eq!(stats.adapter_trimmed_pairs, 1);
    }

    #[test]
    fn test_quality_trimming_without_adapter() {
        let params = RunParameters::default().with_quality_trimming(15, 5, 33);
        let trimmer = trimmer(params);
        let seq1 = b"TTGACCATGACCAGTGGGTACCGATTAGCAGGCTTACACGTAGC";
        let seq2 = b"GACTTGCAAGCATCCGAGTCCAGTAGACCTTGATGGCTACGGAT";
        let mut r1 = record("frag/1", seq1);
        let r1_len = seq1.len();
        r1.quality_scores_mut()[r1_len - 5..].fill(b'#');
        let mut r2 = record("frag/2", seq2);
        let mut stats = RunStatistics::default();
        trimmer.trim_pair(&mut r1, &mut r2, &mut stats);
        assert_eq!(r1.sequence(), &seq1[..r1_len - 5]);
        assert_eq!(r2.sequence(), seq2);
        assert_eq!(stats.quality_trimmed_reads, 1);
    }

    #[test]
    fn test_retrimming_is_idempotent() {
        let trimmer = trimmer(RunParameters::default().with_min_len(10));
        for (insert, len) in [(INSERT, 60), ("ACGTACGTACGTACGTACGT", 53)] {
            let (mut r1, mut r2) = pair(insert, len);
            let mut stats = RunStatistics::default();
            trimmer.trim_pair(&mut r1, &mut r2, &mut stats);
            let (once1, once2) = (r1.clone(), r2.clone());

            let mut stats = RunStatistics::default();
            trimmer.trim_pair(&mut r1, &mut r2, &mut stats);
            assert_eq!(r1, once1);
            assert_eq!(r2, once2);
            assert_eq!(stats, RunStatistics::default());
        }
    }

    #[test]
    fn test_quality_retrimming_is_idempotent() {
        let trimmer = trimmer(RunParameters::default());
        let seq1 = b"TTGACCATGACCAGTGGGTACCGATTAGCAGGCTTACACGTAGC";
        let seq2 = b"GACTTGCAAGCATCCGAGTCCAGTAGACCTTGATGGCTACGGAT";
        let (mut r1, mut r2) = (record("frag/1", seq1), record("frag/2", seq2));
        // Phred 2, 2, 2, 2, 17, 15, 15, 14, 14
        r1.quality_scores_mut()[35..].copy_from_slice(b"####200//");

        let mut stats = RunStatistics::default();
        trimmer.trim_pair(&mut r1, &mut r2, &mut stats);
        assert_eq!(r1.sequence(), &seq1[..35]);
        assert_eq!(stats.quality_trimmed_reads, 1);

        let once = r1.clone();
        let mut stats = RunStatistics::default();
        trimmer.trim_pair(&mut r1, &mut r2, &mut stats);
        assert_eq!(r1, once);
        assert_eq!(r2.sequence(), seq2);
        assert_eq!(stats, RunStatistics::default());
    }

    #[test]
    fn test_error_correction() {
        let params = RunParameters::default().with_error_correction(true);
        let trimmer = trimmer(params);
        let (mut r1, mut r2) = pair(INSERT, 60);
        // sequencing error in read 1 with low quality
        r1.sequence_mut()[5] = b'A';
        r1.quality_scores_mut()[5] = b'#';
        // sequencing error in read 2 with low quality, position 10 of the insert
        let i2 = INSERT.len() - 10 - 1;
        r2.sequence_mut()[i2] = b'A';
        r2.quality_scores_mut()[i2] = b'#';

        let mut stats = RunStatistics::default();
        trimmer.trim_pair(&mut r1, &mut r2, &mut stats);
        assert_eq!(stats.insert_trimmed_pairs, 1);
        assert_eq!(r1.sequence(), INSERT.as_bytes());
        assert_eq!(r2.sequence(), rev_compl(INSERT.as_bytes()).as_slice());
        assert_eq!(r1.quality_scores()[5], b'I');
        assert_eq!(stats.error_correction.mismatch_r1[5], 1);
        assert_eq!(stats.error_correction.mismatch_r2[i2], 1);
        assert_eq!(stats.error_correction.errors_per_read[2], 1);
    }

    #[test]
    fn test_check_pair() {
        check_pair(&record("x/1", b"ACGT"), &record("x/2", b"ACGT")).unwrap();

        let err = check_pair(&record("x/1", b"ACGT"), &record("y/2", b"ACGT")).unwrap_err();
        assert!(matches!(err.downcast_ref::<TrimError>(), Some(TrimError::Format(_))));

        let broken = fastq::Record::new(Definition::new("x/2", ""), b"ACGT".to_vec(), b"II".to_vec());
        assert!(check_pair(&record("x/1", b"ACGT"), &broken).is_err());

        let long = vec![b'A'; MAXLEN];
        assert!(check_pair(&record("x/1", &long), &record("x/2", &long)).is_err());
    }

    #[test]
    fn test_analyze_job() {
        let trimmer = trimmer(RunParameters::default().with_qc(true));
        let mut job = Job::new(0, 4);
        let (r1, r2) = pair(INSERT, 60);
        job.r1[0] = r1;
        job.r2[0] = r2;
        job.read_count = 1;
        trimmer.analyze(&mut job).unwrap();
        assert_eq!(job.status, JobStatus::ToBeWritten);
        assert_eq!(job.length_r1_orig[0], 60);
        assert_eq!(job.length_r2_orig[0], 60);
        assert_eq!(job.r1[0].sequence().len(), 30);
        assert_eq!(job.stats.insert_trimmed_pairs, 1);
    }
}
