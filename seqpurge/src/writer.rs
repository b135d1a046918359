use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use noodles::fastq;

use crate::io::{open_file_for_write, Compression, FileWriter};
use crate::job::{Job, JobStatus};
use crate::stats::RunStatistics;

type FastqSink = fastq::io::Writer<FileWriter>;

/// A FASTQ output stream together with its file name for error messages.
struct Output {
    path: PathBuf,
    writer: FastqSink,
}

impl Output {
    fn create(path: &Path, compression_level: u32) -> Result<Self> {
        let inner = open_file_for_write(path, Compression::from_path(path), Some(compression_level), 1)?;
        Ok(Self::new(path, inner))
    }

    fn new(path: &Path, inner: FileWriter) -> Self {
        Self { path: path.to_path_buf(), writer: fastq::io::Writer::new(inner) }
    }

    fn write(&mut self, record: &fastq::Record) -> Result<()> {
        self.writer.write_record(record)
            .with_context(|| format!("cannot write to file: {}", self.path.display()))
    }

    fn finish(self) -> Result<()> {
        self.writer.into_inner().finish()
            .with_context(|| format!("cannot write to file: {}", self.path.display()))
    }
}

/// Writes trimmed read pairs to the paired outputs, and mates whose partner
/// was too short to the optional singleton outputs.
pub struct PairWriter {
    min_len: usize,
    out1: Output,
    out2: Output,
    singletons: Option<(Output, Output)>,
}

/// Paths of the singleton outputs for a prefix.
pub fn singleton_paths(prefix: &str) -> (PathBuf, PathBuf) {
    (PathBuf::from(format!("{}_R1.fastq.gz", prefix)), PathBuf::from(format!("{}_R2.fastq.gz", prefix)))
}

impl PairWriter {
    /// Create the output files. Compression is chosen by file extension,
    /// singleton files are always gzip compressed.
    pub fn from_paths<P1: AsRef<Path>, P2: AsRef<Path>>(
        out1: P1,
        out2: P2,
        singleton_prefix: Option<&str>,
        min_len: usize,
        compression_level: u32,
    ) -> Result<Self> {
        let singletons = singleton_prefix
            .map(|prefix| {
                let (path1, path2) = singleton_paths(prefix);
                Ok::<_, anyhow::Error>((
                    Output::create(&path1, compression_level)?,
                    Output::create(&path2, compression_level)?,
                ))
            })
            .transpose()?;
        Ok(Self {
            min_len,
            out1: Output::create(out1.as_ref(), compression_level)?,
            out2: Output::create(out2.as_ref(), compression_level)?,
            singletons,
        })
    }

    /// Create a writer on top of already opened streams.
    pub fn new(
        min_len: usize,
        out1: Box<dyn Write + Send>,
        out2: Box<dyn Write + Send>,
        singletons: Option<(Box<dyn Write + Send>, Box<dyn Write + Send>)>,
    ) -> Self {
        Self {
            min_len,
            out1: Output::new(Path::new("<forward output>"), FileWriter::Stream(out1)),
            out2: Output::new(Path::new("<reverse output>"), FileWriter::Stream(out2)),
            singletons: singletons.map(|(s1, s2)| (
                Output::new(Path::new("<forward singletons>"), FileWriter::Stream(s1)),
                Output::new(Path::new("<reverse singletons>"), FileWriter::Stream(s2)),
            )),
        }
    }

    /// Write all pairs of an analyzed job and fold its statistics into
    /// `shared`.
    pub fn emit(&mut self, job: &mut Job, shared: &Mutex<RunStatistics>) -> Result<()> {
        let stats = &mut job.stats;
        for r in 0..job.read_count {
            let (r1, r2) = (&job.r1[r], &job.r2[r]);
            let (len1, len2) = (r1.sequence().len(), r2.sequence().len());
            let (orig1, orig2) = (job.length_r1_orig[r], job.length_r2_orig[r]);
            let (pass1, pass2) = (len1 >= self.min_len, len2 >= self.min_len);

            match (pass1, pass2, self.singletons.as_mut()) {
                (true, true, _) => {
                    self.out1.write(r1)?;
                    self.out2.write(r2)?;
                    stats.kept_pairs += 1;
                    stats.add_written_read(len1, orig1);
                    stats.add_written_read(len2, orig2);
                }
                (true, false, Some((s1, _))) => {
                    s1.write(r1)?;
                    stats.singleton_reads += 1;
                    stats.add_written_read(len1, orig1);
                    stats.add_removed_read();
                }
                (false, true, Some((_, s2))) => {
                    s2.write(r2)?;
                    stats.singleton_reads += 1;
                    stats.add_written_read(len2, orig2);
                    stats.add_removed_read();
                }
                _ => {
                    stats.add_removed_read();
                    stats.add_removed_read();
                }
            }
            stats.read_num += 2;
        }

        shared.lock().map_err(|_| anyhow::anyhow!("statistics lock poisoned"))?.merge(stats);
        job.status = JobStatus::Done;
        Ok(())
    }

    /// Flush all outputs and write their compression trailers.
    pub fn finish(self) -> Result<()> {
        self.out1.finish()?;
        self.out2.finish()?;
        if let Some((s1, s2)) = self.singletons {
            s1.finish()?;
            s2.finish()?;
        }
        Ok(())
    }
}
