use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use noodles::fastq;

use crate::error::TrimError;
use crate::io::open_file_for_read;
use crate::job::{Job, JobStatus};

const READ_BUFFER_SIZE: usize = 1 << 16;

type FastqStream = fastq::io::Reader<Box<dyn BufRead + Send>>;

struct OpenPair {
    path1: PathBuf,
    path2: PathBuf,
    reader1: FastqStream,
    reader2: FastqStream,
}

impl OpenPair {
    fn open(path1: &Path, path2: &Path) -> Result<Self> {
        let open = |path: &Path| -> Result<FastqStream> {
            let inner: Box<dyn BufRead + Send> = Box::new(
                BufReader::with_capacity(READ_BUFFER_SIZE, open_file_for_read(path)?)
            );
            Ok(fastq::io::Reader::new(inner))
        };
        Ok(Self {
            path1: path1.to_path_buf(),
            path2: path2.to_path_buf(),
            reader1: open(path1)?,
            reader2: open(path2)?,
        })
    }
}

/// Reads batches of read pairs from a list of forward/reverse file pairs.
/// Files are consumed in order; reaching the end of one pair moves on to the
/// next one within the same batch.
pub struct PairedReader {
    files: Vec<(PathBuf, PathBuf)>,
    next_file: usize,
    current: Option<OpenPair>,
    pairs_read: u64,
}

impl PairedReader {
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(in1: &[P1], in2: &[P2]) -> Result<Self> {
        if in1.len() != in2.len() {
            return Err(TrimError::config(format!(
                "Input file lists 'in1' and 'in2' differ in counts: {} != {}", in1.len(), in2.len()
            )));
        }
        if in1.is_empty() {
            return Err(TrimError::config("No input files given"));
        }
        let files = in1.iter().zip(in2)
            .map(|(p1, p2)| (p1.as_ref().to_path_buf(), p2.as_ref().to_path_buf()))
            .collect();
        Ok(Self { files, next_file: 0, current: None, pairs_read: 0 })
    }

    /// Total number of read pairs read so far.
    pub fn pairs_read(&self) -> u64 {
        self.pairs_read
    }

    fn current_pair(&mut self) -> Result<Option<&mut OpenPair>> {
        if self.current.is_none() && self.next_file < self.files.len() {
            let (path1, path2) = &self.files[self.next_file];
            info!("starting - forward: {} reverse: {}", path1.display(), path2.display());
            self.current = Some(OpenPair::open(path1, path2)?);
            self.next_file += 1;
        }
        Ok(self.current.as_mut())
    }

    /// Fill `job` with the next batch of read pairs. Returns `false` if the
    /// input is exhausted and no pair was read.
    pub fn next_job(&mut self, job: &mut Job) -> Result<bool> {
        job.clear();
        while !job.is_full() {
            let i = job.read_count;
            let Some(pair) = self.current_pair()? else { break };
            let n1 = pair.reader1.read_record(&mut job.r1[i])
                .with_context(|| format!("cannot read FASTQ record from {}", pair.path1.display()))?;
            let n2 = pair.reader2.read_record(&mut job.r2[i])
                .with_context(|| format!("cannot read FASTQ record from {}", pair.path2.display()))?;
            match (n1, n2) {
                (0, 0) => self.current = None,
                (_, 0) => return Err(TrimError::format(format!(
                    "File {} has more entries than {}!", pair.path1.display(), pair.path2.display()
                ))),
                (0, _) => return Err(TrimError::format(format!(
                    "File {} has more entries than {}!", pair.path2.display(), pair.path1.display()
                ))),
                _ => job.read_count += 1,
            }
        }

        self.pairs_read += job.read_count as u64;
        if job.read_count > 0 {
            job.status = JobStatus::ToBeAnalyzed;
            Ok(true)
        } else {
            job.status = JobStatus::Done;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fastq(path: &Path, names: &[&str], suffix: &str) {
        let mut file = std::fs::File::create(path).unwrap();
        for name in names {
            write!(file, "@{}{}\nACGTACGT\n+\nIIIIIIII\n", name, suffix).unwrap();
        }
    }

    #[test]
    fn test_batches_span_file_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let (a1, a2) = (dir.path().join("a_R1.fastq"), dir.path().join("a_R2.fastq"));
        let (b1, b2) = (dir.path().join("b_R1.fastq"), dir.path().join("b_R2.fastq"));
        write_fastq(&a1, &["r1", "r2", "r3"], "/1");
        write_fastq(&a2, &["r1", "r2", "r3"], "/2");
        write_fastq(&b1, &["r4", "r5"], "/1");
        write_fastq(&b2, &["r4", "r5"], "/2");

        let mut reader = PairedReader::new(&[&a1, &b1], &[&a2, &b2]).unwrap();
        let mut job = Job::new(0, 4);
        assert!(reader.next_job(&mut job).unwrap());
        assert_eq!(job.read_count, 4);
        assert_eq!(job.status, JobStatus::ToBeAnalyzed);
        assert_eq!(job.r1[3].name(), &b"r4/1"[..]);
        assert_eq!(job.r2[3].name(), &b"r4/2"[..]);

        assert!(reader.next_job(&mut job).unwrap());
        assert_eq!(job.read_count, 1);
        assert_eq!(job.r1[0].name(), &b"r5/1"[..]);

        assert!(!reader.next_job(&mut job).unwrap());
        assert_eq!(job.read_count, 0);
        assert!(!reader.next_job(&mut job).unwrap());
        assert_eq!(reader.pairs_read(), 5);
    }

    #[test]
    fn test_unequal_mate_counts() {
        let dir = tempfile::tempdir().unwrap();
        let (p1, p2) = (dir.path().join("R1.fastq"), dir.path().join("R2.fastq"));
        write_fastq(&p1, &["r1", "r2"], "/1");
        write_fastq(&p2, &["r1"], "/2");

        let mut reader = PairedReader::new(&[&p1], &[&p2]).unwrap();
        let mut job = Job::new(0, 10);
        let err = reader.next_job(&mut job).unwrap_err();
        assert!(matches!(err.downcast_ref::<TrimError>(), Some(TrimError::Format(_))));
        assert!(err.to_string().contains("R1.fastq has more entries than"));
    }

    #[test]
    fn test_file_list_mismatch() {
        let err = PairedReader::new(&["a_R1.fastq", "b_R1.fastq"], &["a_R2.fastq"]).err().unwrap();
        assert!(matches!(err.downcast_ref::<TrimError>(), Some(TrimError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let mut reader = PairedReader::new(&["/nonexistent/R1.fastq"], &["/nonexistent/R2.fastq"]).unwrap();
        let err = reader.next_job(&mut Job::new(0, 2)).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/R1.fastq"));
    }
}
