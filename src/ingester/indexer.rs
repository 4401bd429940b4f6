//! Per-metric indexer actor
//!
//! Wraps one [`ShardIndex`] and owns its filesystem path exclusively.
//! Appends are acknowledged immediately and reach a segment on the periodic
//! flush tick; shutdown flushes whatever is still buffered.

use crate::actor::{ask, reply, send};
use crate::bit::Bit;
use crate::index::{eval, ShardIndex};
use crate::schema::Schema;
use crate::sql::{Expression, SelectStatement};
use crate::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

enum IndexerCommand {
    AddRecord {
        bit: Bit,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteRecord {
        bit: Bit,
        reply: oneshot::Sender<Result<bool>>,
    },
    GetCount {
        reply: oneshot::Sender<usize>,
    },
    ExecuteSelect {
        statement: SelectStatement,
        schema: Schema,
        reply: oneshot::Sender<Result<Vec<Bit>>>,
    },
    ExecuteDelete {
        condition: Expression,
        reply: oneshot::Sender<Result<usize>>,
    },
    Flush {
        reply: oneshot::Sender<Result<usize>>,
    },
    Stop {
        erase: bool,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Actor owning one metric's shard index.
pub struct IndexerActor {
    path: PathBuf,
    index: ShardIndex,
    flush_interval: Duration,
    shutdown: CancellationToken,
    rx: mpsc::Receiver<IndexerCommand>,
}

impl IndexerActor {
    /// Open the shard at `path` and spawn the actor.
    pub fn spawn(
        path: impl Into<PathBuf>,
        flush_interval: Duration,
        timeout: Duration,
    ) -> Result<IndexerHandle> {
        let path = path.into();
        let index = ShardIndex::open(&path)?;
        let (tx, rx) = mpsc::channel(256);
        let shutdown = CancellationToken::new();
        let actor = Self {
            path,
            index,
            flush_interval,
            shutdown: shutdown.clone(),
            rx,
        };
        tokio::spawn(actor.run());
        Ok(IndexerHandle {
            tx,
            shutdown,
            timeout,
        })
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.reset();

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => {
                        if self.handle(command) {
                            break;
                        }
                    }
                    None => {
                        self.flush_now();
                        break;
                    }
                },
                _ = ticker.tick() => self.flush_now(),
                _ = self.shutdown.cancelled() => {
                    debug!(path = %self.path.display(), "indexer shutting down, flushing remaining records");
                    self.flush_now();
                    break;
                }
            }
        }
    }

    /// Returns true when the actor should stop.
    fn handle(&mut self, command: IndexerCommand) -> bool {
        match command {
            IndexerCommand::AddRecord { bit, reply: tx } => {
                self.index.append(bit);
                reply(tx, Ok(()));
            }
            IndexerCommand::DeleteRecord { bit, reply: tx } => {
                reply(tx, self.index.delete(&bit));
            }
            IndexerCommand::GetCount { reply: tx } => {
                reply(tx, self.index.count());
            }
            IndexerCommand::ExecuteSelect {
                statement,
                schema,
                reply: tx,
            } => {
                let bits: Vec<Bit> = self.index.bits().cloned().collect();
                reply(tx, eval::execute_select(&statement, &schema, bits));
            }
            IndexerCommand::ExecuteDelete {
                condition,
                reply: tx,
            } => {
                reply(tx, self.index.delete_matching(&condition));
            }
            IndexerCommand::Flush { reply: tx } => {
                reply(tx, self.index.flush());
            }
            IndexerCommand::Stop { erase, reply: tx } => {
                let result = if erase {
                    std::fs::remove_dir_all(&self.path).map_err(Into::into)
                } else {
                    self.index.flush().map(|_| ())
                };
                reply(tx, result);
                return true;
            }
        }
        false
    }

    fn flush_now(&mut self) {
        if let Err(e) = self.index.flush() {
            error!(path = %self.path.display(), error = %e, "scheduled flush failed");
        }
    }
}

/// Handle to a metric's indexer.
#[derive(Clone)]
pub struct IndexerHandle {
    tx: mpsc::Sender<IndexerCommand>,
    shutdown: CancellationToken,
    timeout: Duration,
}

impl IndexerHandle {
    pub async fn add_record(&self, bit: Bit) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(&self.tx, IndexerCommand::AddRecord { bit, reply: tx }).await?;
        ask(rx, self.timeout).await?
    }

    pub async fn delete_record(&self, bit: Bit) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        send(&self.tx, IndexerCommand::DeleteRecord { bit, reply: tx }).await?;
        ask(rx, self.timeout).await?
    }

    pub async fn count(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        send(&self.tx, IndexerCommand::GetCount { reply: tx }).await?;
        ask(rx, self.timeout).await
    }

    pub async fn execute_select(
        &self,
        statement: SelectStatement,
        schema: Schema,
    ) -> Result<Vec<Bit>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            IndexerCommand::ExecuteSelect {
                statement,
                schema,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    pub async fn execute_delete(&self, condition: Expression) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            IndexerCommand::ExecuteDelete {
                condition,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    /// Force a flush, for callers that need quiescence now.
    pub async fn flush(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        send(&self.tx, IndexerCommand::Flush { reply: tx }).await?;
        ask(rx, self.timeout).await?
    }

    /// Stop the actor. With `erase` the shard directory is removed instead
    /// of flushed.
    pub async fn stop(&self, erase: bool) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(&self.tx, IndexerCommand::Stop { erase, reply: tx }).await?;
        ask(rx, self.timeout).await?
    }

    /// Trigger a shutdown flush without waiting for it.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }
}
