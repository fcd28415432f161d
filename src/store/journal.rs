use std::io;
use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::model::Event;
use crate::observability;
use crate::wal::Wal;

use super::StoreError;

// ── Group-commit channel ─────────────────────────────────

enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Handle to the background task that owns the WAL file.
pub struct Journal {
    tx: mpsc::Sender<JournalCommand>,
}

impl Journal {
    /// Replay the WAL at `path`, then spawn the writer. Must run inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let events = Wal::recover(path)?;
        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(writer_loop(wal, rx));
        debug!("journal {} opened, {} events replayed", path.display(), events.len());
        Ok((Self { tx }, events))
    }

    pub async fn append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Journal("journal writer dropped response".into()))?
            .map_err(|e| StoreError::Journal(e.to_string()))
    }

    pub async fn compact(&self, events: Vec<Event>) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Journal("journal writer dropped response".into()))?
            .map_err(|e| StoreError::Journal(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush what we have before handling it.
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                flush_and_respond(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_other(&mut wal, other);
                }
            }
            other => handle_other(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// All or nothing: if any event fails to encode, nothing from the batch is
/// written, and a failed write is cut back off the file by `flush_sync`.
fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            wal.discard_pending();
            return Err(e);
        }
    }
    wal.flush_sync()
}

fn handle_other(wal: &mut Wal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        JournalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            flush_and_respond(wal, &mut batch);
        }
    }
}
