//! Multi-threaded trimming pipeline.
//!
//! A fixed set of `block_prefetch` jobs cycles through reading, analysis and
//! writing. Reading happens on a dedicated thread that owns the input files,
//! analysis and writing run on a rayon pool. The [`Scheduler`] decides which
//! job moves next; it is driven by completion events sent back over a
//! channel, so the driving loop is the only place that mutates it.

use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::{debug, info, warn};

use crate::job::{Job, JobStatus};
use crate::params::RunParameters;
use crate::reader::PairedReader;
use crate::stats::RunStatistics;
use crate::trimmer::Trimmer;
use crate::writer::PairWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Finished,
}

/// Work item for one job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Read(usize),
    Analyze(usize),
    Write(usize),
}

/// State machine deciding which job moves to which stage.
///
/// At most one read and one write are in flight at any time. Analysis and
/// writing share `max_busy` workers, and pending writes are dispatched
/// before pending analyses.
#[derive(Debug)]
pub struct Scheduler {
    phase: Phase,
    slots: Vec<JobStatus>,
    pending_reads: VecDeque<usize>,
    pending_analysis: VecDeque<usize>,
    pending_writes: VecDeque<usize>,
    read_in_flight: bool,
    write_in_flight: bool,
    busy: usize,
    max_busy: usize,
}

impl Scheduler {
    /// All slots start out queued for reading.
    pub fn new(num_slots: usize, max_busy: usize) -> Self {
        Self {
            phase: Phase::Running,
            slots: vec![JobStatus::Reading; num_slots],
            pending_reads: (0..num_slots).collect(),
            pending_analysis: VecDeque::new(),
            pending_writes: VecDeque::new(),
            read_in_flight: false,
            write_in_flight: false,
            busy: 0,
            max_busy: max_busy.max(1),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self, index: usize) -> JobStatus {
        self.slots[index]
    }

    /// Next task that can be started right now.
    pub fn next_task(&mut self) -> Option<Task> {
        if !self.write_in_flight && self.busy < self.max_busy {
            if let Some(i) = self.pending_writes.pop_front() {
                self.write_in_flight = true;
                self.busy += 1;
                return Some(Task::Write(i));
            }
        }
        if self.phase == Phase::Running && !self.read_in_flight {
            if let Some(i) = self.pending_reads.pop_front() {
                self.read_in_flight = true;
                return Some(Task::Read(i));
            }
        }
        if self.busy < self.max_busy {
            if let Some(i) = self.pending_analysis.pop_front() {
                self.busy += 1;
                return Some(Task::Analyze(i));
            }
        }
        None
    }

    /// A read finished. Without data the input is exhausted: no further
    /// reads are started and the slots still waiting for one are retired.
    pub fn read_done(&mut self, index: usize, has_data: bool) {
        self.read_in_flight = false;
        if has_data {
            self.slots[index] = JobStatus::ToBeAnalyzed;
            self.pending_analysis.push_back(index);
        } else {
            self.slots[index] = JobStatus::Done;
            if self.phase == Phase::Running {
                self.phase = Phase::Draining;
            }
            for i in self.pending_reads.drain(..) {
                self.slots[i] = JobStatus::Done;
            }
        }
    }

    pub fn analysis_done(&mut self, index: usize) {
        self.busy -= 1;
        self.slots[index] = JobStatus::ToBeWritten;
        self.pending_writes.push_back(index);
    }

    pub fn write_done(&mut self, index: usize) {
        self.busy -= 1;
        self.write_in_flight = false;
        if self.phase == Phase::Running {
            self.slots[index] = JobStatus::Reading;
            self.pending_reads.push_back(index);
        } else {
            self.slots[index] = JobStatus::Done;
        }
    }

    /// Check for the end of the run. Once draining has started and all
    /// slots are done, the run is finished.
    pub fn is_finished(&mut self) -> bool {
        if self.phase == Phase::Draining
            && !self.read_in_flight
            && self.busy == 0
            && self.slots.iter().all(|s| *s == JobStatus::Done)
        {
            self.phase = Phase::Finished;
        }
        self.phase == Phase::Finished
    }

    /// Number of slots per state, for status reports.
    pub fn status_line(&self) -> String {
        [
            ("reading", JobStatus::Reading),
            ("to_be_analyzed", JobStatus::ToBeAnalyzed),
            ("to_be_written", JobStatus::ToBeWritten),
            ("done", JobStatus::Done),
        ].iter()
            .map(|(name, status)| format!("{}={}", name, self.slots.iter().filter(|s| *s == status).count()))
            .join(" ")
    }
}

enum Event {
    Loaded(Job, Result<bool>),
    Analyzed(Job, Result<()>),
    Written(Job, Result<()>),
}

pub struct Pipeline {
    trimmer: Trimmer,
}

impl Pipeline {
    pub fn new(params: RunParameters) -> Result<Self> {
        Ok(Self { trimmer: Trimmer::new(params)? })
    }

    pub fn params(&self) -> &RunParameters {
        self.trimmer.params()
    }

    /// Trim all read pairs of `reader` and write them to `writer`. Returns
    /// the statistics of the run. The first error aborts the run.
    pub fn run(&self, mut reader: PairedReader, writer: PairWriter) -> Result<RunStatistics> {
        let params = self.params();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.threads)
            .thread_name(|i| format!("seqpurge-worker-{}", i))
            .build()
            .context("cannot create thread pool")?;
        let writer = Mutex::new(writer);
        let stats = Mutex::new(RunStatistics::default());
        let progress_bar = match params.progress {
            Some(_) => ProgressBar::new_spinner().with_style(
                ProgressStyle::with_template("[{elapsed}] {human_pos} read pairs ({per_sec})")?
            ),
            None => ProgressBar::hidden(),
        };

        let mut jobs: Vec<Option<Job>> = (0..params.block_prefetch)
            .map(|i| Some(Job::new(i, params.block_size)))
            .collect();
        let mut scheduler = Scheduler::new(params.block_prefetch, params.threads);
        let (event_tx, event_rx) = mpsc::channel::<Event>();
        let (read_tx, read_rx) = mpsc::channel::<Job>();
        info!(
            "trimming with {} threads, {} blocks of {} read pairs",
            params.threads, params.block_prefetch, params.block_size,
        );

        std::thread::scope(|s| -> Result<()> {
            let reader_events = event_tx.clone();
            s.spawn(move || {
                for mut job in read_rx {
                    let result = reader.next_job(&mut job);
                    if reader_events.send(Event::Loaded(job, result)).is_err() {
                        break;
                    }
                }
                debug!("reader finished after {} read pairs", reader.pairs_read());
            });

            let (trimmer, writer, stats) = (&self.trimmer, &writer, &stats);
            pool.in_place_scope(|scope| -> Result<()> {
                // dropped on return, which stops the reader thread
                let read_tx = read_tx;
                let mut last_report = Instant::now();
                loop {
                    while let Some(task) = scheduler.next_task() {
                        let (Task::Read(i) | Task::Analyze(i) | Task::Write(i)) = task;
                        let mut job = jobs[i].take().with_context(|| format!("job {} is not available", i))?;
                        match task {
                            Task::Read(_) => read_tx
                                .send(job)
                                .map_err(|_| anyhow!("reader thread terminated"))?,
                            Task::Analyze(_) => {
                                let events = event_tx.clone();
                                scope.spawn(move |_| {
                                    let result = trimmer.analyze(&mut job);
                                    let _ = events.send(Event::Analyzed(job, result));
                                });
                            }
                            Task::Write(_) => {
                                let events = event_tx.clone();
                                scope.spawn(move |_| {
                                    let result = writer.lock()
                                        .map_err(|_| anyhow!("output lock poisoned"))
                                        .and_then(|mut w| w.emit(&mut job, stats));
                                    let _ = events.send(Event::Written(job, result));
                                });
                            }
                        }
                    }
                    if scheduler.is_finished() {
                        return Ok(());
                    }

                    let event = match params.progress {
                        Some(interval) => match event_rx.recv_timeout(interval) {
                            Ok(event) => Some(event),
                            Err(RecvTimeoutError::Timeout) => None,
                            Err(RecvTimeoutError::Disconnected) => bail!("pipeline channel closed"),
                        },
                        None => Some(event_rx.recv().context("pipeline channel closed")?),
                    };
                    if let Some(interval) = params.progress {
                        if last_report.elapsed() >= interval {
                            info!("status - {}", scheduler.status_line());
                            last_report = Instant::now();
                        }
                    }

                    match event {
                        Some(Event::Loaded(job, result)) => {
                            let has_data = result?;
                            let index = job.index;
                            scheduler.read_done(index, has_data);
                            jobs[index] = Some(job);
                        }
                        Some(Event::Analyzed(job, result)) => {
                            result?;
                            let index = job.index;
                            scheduler.analysis_done(index);
                            jobs[index] = Some(job);
                        }
                        Some(Event::Written(job, result)) => {
                            result?;
                            progress_bar.inc(job.read_count as u64);
                            let index = job.index;
                            scheduler.write_done(index);
                            jobs[index] = Some(job);
                        }
                        None => {}
                    }
                }
            })
        })?;
        progress_bar.finish_and_clear();

        let stats = std::mem::take(&mut *stats.lock().map_err(|_| anyhow!("statistics lock poisoned"))?);
        writer.into_inner().map_err(|_| anyhow!("output lock poisoned"))?.finish()?;
        if stats.read_num == 0 {
            warn!("input files contain no reads");
        }
        info!("finished - {}", stats.brief());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_cycle() {
        let mut scheduler = Scheduler::new(2, 2);
        assert_eq!(scheduler.next_task(), Some(Task::Read(0)));
        // only one read at a time
        assert_eq!(scheduler.next_task(), None);

        scheduler.read_done(0, true);
        assert_eq!(scheduler.status(0), JobStatus::ToBeAnalyzed);
        assert_eq!(scheduler.next_task(), Some(Task::Read(1)));
        assert_eq!(scheduler.next_task(), Some(Task::Analyze(0)));
        assert_eq!(scheduler.next_task(), None);

        scheduler.analysis_done(0);
        assert_eq!(scheduler.status(0), JobStatus::ToBeWritten);
        assert_eq!(scheduler.next_task(), Some(Task::Write(0)));

        scheduler.write_done(0);
        assert_eq!(scheduler.status(0), JobStatus::Reading);
        // read 1 is still in flight
        assert_eq!(scheduler.next_task(), None);
        assert!(!scheduler.is_finished());
    }

    #[test]
    fn test_write_before_analysis() {
        let mut scheduler = Scheduler::new(3, 1);
        for i in 0..3 {
            assert_eq!(scheduler.next_task(), Some(Task::Read(i)));
            scheduler.read_done(i, true);
        }
        assert_eq!(scheduler.next_task(), Some(Task::Analyze(0)));
        assert_eq!(scheduler.next_task(), None);
        scheduler.analysis_done(0);

        // slots 1 and 2 wait for analysis, but writing slot 0 comes first
        assert_eq!(scheduler.next_task(), Some(Task::Write(0)));
        assert_eq!(scheduler.next_task(), None);
        scheduler.write_done(0);
        assert_eq!(scheduler.next_task(), Some(Task::Read(0)));
        assert_eq!(scheduler.next_task(), Some(Task::Analyze(1)));
    }

    #[test]
    fn test_single_write_in_flight() {
        let mut scheduler = Scheduler::new(2, 4);
        for i in 0..2 {
            assert_eq!(scheduler.next_task(), Some(Task::Read(i)));
            scheduler.read_done(i, true);
        }
        assert_eq!(scheduler.next_task(), Some(Task::Analyze(0)));
        assert_eq!(scheduler.next_task(), Some(Task::Analyze(1)));
        scheduler.analysis_done(0);
        scheduler.analysis_done(1);
        assert_eq!(scheduler.next_task(), Some(Task::Write(0)));
        assert_eq!(scheduler.next_task(), None);
        scheduler.write_done(0);
        assert_eq!(scheduler.next_task(), Some(Task::Write(1)));
    }

    #[test]
    fn test_draining() {
        let mut scheduler = Scheduler::new(3, 2);
        assert_eq!(scheduler.next_task(), Some(Task::Read(0)));
        scheduler.read_done(0, true);
        assert_eq!(scheduler.next_task(), Some(Task::Read(1)));
        assert_eq!(scheduler.next_task(), Some(Task::Analyze(0)));

        // input exhausted: slot 2 never gets read
        scheduler.read_done(1, false);
        assert_eq!(scheduler.phase(), Phase::Draining);
        assert_eq!(scheduler.status(1), JobStatus::Done);
        assert_eq!(scheduler.status(2), JobStatus::Done);
        assert!(!scheduler.is_finished());

        scheduler.analysis_done(0);
        assert_eq!(scheduler.next_task(), Some(Task::Write(0)));
        assert!(!scheduler.is_finished());
        scheduler.write_done(0);
        assert_eq!(scheduler.status(0), JobStatus::Done);
        assert_eq!(scheduler.next_task(), None);
        assert!(scheduler.is_finished());
        assert_eq!(scheduler.phase(), Phase::Finished);
    }

    #[test]
    fn test_empty_input() {
        let mut scheduler = Scheduler::new(2, 1);
        assert_eq!(scheduler.next_task(), Some(Task::Read(0)));
        scheduler.read_done(0, false);
        assert!(scheduler.is_finished());
        assert_eq!(scheduler.status_line(), "reading=0 to_be_analyzed=0 to_be_written=0 done=2");
    }
}
