//! Ask-pattern plumbing shared by all actor handles
//!
//! Every component runs as a task draining an mpsc command queue one
//! message at a time. Requests carry a oneshot reply sender; handles await
//! the reply under the configured timeout.

use crate::{Error, Result};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Send a command to an actor, mapping a closed queue to an error.
pub(crate) async fn send<C>(tx: &mpsc::Sender<C>, command: C) -> Result<()> {
    tx.send(command)
        .await
        .map_err(|_| Error::Internal("actor is no longer running".to_string()))
}

/// Await a oneshot reply under `timeout`.
///
/// Elapse maps to [`Error::Timeout`]; a dropped sender (the actor died
/// before replying) maps to an internal error.
pub(crate) async fn ask<T>(rx: oneshot::Receiver<T>, timeout: Duration) -> Result<T> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(_)) => Err(Error::Internal(
            "actor dropped the reply channel".to_string(),
        )),
        Err(_) => Err(Error::Timeout),
    }
}

/// Deliver a reply, ignoring an asker that already gave up (e.g. timed out).
pub(crate) fn reply<T>(tx: oneshot::Sender<T>, value: T) {
    let _ = tx.send(value);
}
