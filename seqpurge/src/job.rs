use noodles::fastq;

use crate::stats::RunStatistics;

/// Progress of a job slot through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Empty,
    Reading,
    ToBeAnalyzed,
    ToBeWritten,
    Done,
}

/// A batch of read pairs. Jobs are allocated once and recycled for the whole
/// run: the record buffers keep their capacity and only the first
/// `read_count` pairs are meaningful after a reload.
#[derive(Debug)]
pub struct Job {
    pub index: usize,
    pub status: JobStatus,
    pub read_count: usize,
    pub r1: Vec<fastq::Record>,
    pub r2: Vec<fastq::Record>,
    pub length_r1_orig: Vec<usize>,
    pub length_r2_orig: Vec<usize>,
    pub stats: RunStatistics,  // partial statistics of this batch
}

impl Job {
    pub fn new(index: usize, block_size: usize) -> Self {
        Self {
            index,
            status: JobStatus::Empty,
            read_count: 0,
            r1: vec![fastq::Record::default(); block_size],
            r2: vec![fastq::Record::default(); block_size],
            length_r1_orig: vec![0; block_size],
            length_r2_orig: vec![0; block_size],
            stats: RunStatistics::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.r1.len()
    }

    pub fn is_full(&self) -> bool {
        self.read_count == self.capacity()
    }

    /// Prepare the job for a reload.
    pub fn clear(&mut self) {
        self.read_count = 0;
        self.stats.reset();
    }
}
