//! Parallel compression: a bounded job queue, one worker per core and a
//! single writer that restores input order.
//!
//! Workers push finished sequences onto an unbounded results channel;
//! the writer parks out-of-order arrivals in a map keyed by id and
//! drains it every time the next expected id shows up. The compressed
//! stream therefore always grows in ascending original-id order, no
//! matter how the workers are scheduled.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Sender};

use crate::align::AlignMem;
use crate::coarse::CoarseDB;
use crate::compress::compress_seq;
use crate::compressed::{CompressedSeq, CompressedWriter};
use crate::db::{Db, DbParams};
use crate::error::{ParalogError, Result};

struct Job {
    id: u32,
    name: String,
    residues: Vec<u8>,
}

pub struct Pool {
    jobs: Option<Sender<Job>>,
    results: Option<Sender<CompressedSeq>>,
    workers: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<Result<u32>>>,
    cancel: Arc<AtomicBool>,
    next_id: u32,
}

impl Pool {
    /// Spawn `num_workers` compression workers and the ordered writer
    /// for `db`. Original ids continue from whatever the compressed
    /// index already holds.
    pub fn start(db: &Db, num_workers: usize) -> Result<Pool> {
        let mut writer_dest = CompressedWriter::open(&db.dir)?;
        let first_id = writer_dest.next_id();

        let (jobs_tx, jobs_rx) = bounded::<Job>(num_workers.max(1) * 4);
        let (results_tx, results_rx) = unbounded::<CompressedSeq>();
        let cancel = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(num_workers);
        for _ in 0..num_workers.max(1) {
            let jobs_rx = jobs_rx.clone();
            let results_tx = results_tx.clone();
            let coarse: Arc<CoarseDB> = Arc::clone(&db.coarse);
            let params: DbParams = db.params.clone();
            workers.push(std::thread::spawn(move || {
                let mut mem = AlignMem::new();
                for job in jobs_rx.iter() {
                    let cseq =
                        compress_seq(&coarse, &params, &mut mem, job.id, &job.name, &job.residues);
                    if results_tx.send(cseq).is_err() {
                        break;
                    }
                }
            }));
        }

        let writer = std::thread::spawn(move || -> Result<u32> {
            let mut pending: BTreeMap<u32, CompressedSeq> = BTreeMap::new();
            let mut next = first_id;
            for cseq in results_rx.iter() {
                pending.insert(cseq.id, cseq);
                while let Some(ready) = pending.remove(&next) {
                    writer_dest.write(&ready)?;
                    next += 1;
                }
            }
            if let Some((&id, _)) = pending.iter().next() {
                return Err(ParalogError::Internal(format!(
                    "writer finished with sequence {id} still pending"
                )));
            }
            writer_dest.finish()?;
            Ok(next)
        });

        Ok(Pool {
            jobs: Some(jobs_tx),
            results: Some(results_tx),
            workers,
            writer: Some(writer),
            cancel,
            next_id: first_id,
        })
    }

    /// Queue one sequence for compression; blocks when the job queue is
    /// full. Returns the original id assigned to it.
    pub fn compress(&mut self, name: String, residues: Vec<u8>) -> Result<u32> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(ParalogError::WorkerCancelled);
        }
        let id = self.next_id;
        self.jobs
            .as_ref()
            .expect("pool already finished")
            .send(Job { id, name, residues })
            .map_err(|_| ParalogError::Internal("jobs channel closed early".into()))?;
        self.next_id += 1;
        Ok(id)
    }

    /// Stop accepting new jobs. Jobs already queued still finish.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Ids handed out so far, including those still in flight.
    pub fn sequences_submitted(&self) -> u32 {
        self.next_id
    }

    /// Close the queues, wait for the workers to drain and for the
    /// writer to serialize everything. Returns the id one past the last
    /// written sequence.
    pub fn finish(mut self) -> Result<u32> {
        drop(self.jobs.take());
        for worker in self.workers.drain(..) {
            worker.join().expect("compression worker panicked");
        }
        drop(self.results.take());
        self.writer
            .take()
            .expect("pool already finished")
            .join()
            .expect("writer thread panicked")
    }
}
