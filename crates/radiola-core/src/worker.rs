//! Run blocking or slow work off the UI loop and hand the result back.
//!
//! The UI loop owns an `mpsc::Receiver<M>`; the worker posts `deliver(output)`
//! into the matching sender once the job is done.  A closed channel means
//! the UI is gone and the result is dropped.

use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct Worker<M> {
    tx: mpsc::Sender<M>,
}

impl<M> Clone for Worker<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M: Send + 'static> Worker<M> {
    pub fn new(tx: mpsc::Sender<M>) -> Self {
        Self { tx }
    }

    /// Run `job` on the runtime.
    pub fn send<T, F, D>(&self, job: F, deliver: D) -> JoinHandle<()>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        D: FnOnce(T) -> M + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let output = job.await;
            if tx.send(deliver(output)).await.is_err() {
                debug!("worker result dropped: receiver closed");
            }
        })
    }

    /// Run `job` on the blocking pool.
    pub fn send_blocking<T, F, D>(&self, job: F, deliver: D) -> JoinHandle<()>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
        D: FnOnce(T) -> M + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(job).await {
                Ok(output) => {
                    if tx.send(deliver(output)).await.is_err() {
                        debug!("worker result dropped: receiver closed");
                    }
                }
                Err(e) => warn!("blocking worker job failed: {}", e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Msg {
        Sum(u32),
        Text(String),
    }

    #[tokio::test]
    async fn delivers_async_result() {
        let (tx, mut rx) = mpsc::channel(4);
        let worker = Worker::new(tx);
        worker.send(async { 2 + 3 }, Msg::Sum);
        assert_eq!(rx.recv().await, Some(Msg::Sum(5)));
    }

    #[tokio::test]
    async fn delivers_blocking_result() {
        let (tx, mut rx) = mpsc::channel(4);
        let worker = Worker::new(tx);
        worker.send_blocking(|| "done".to_string(), Msg::Text);
        assert_eq!(rx.recv().await, Some(Msg::Text("done".into())));
    }

    #[tokio::test]
    async fn closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::channel::<Msg>(1);
        drop(rx);
        let worker = Worker::new(tx);
        worker.send(async { 1 }, Msg::Sum).await.unwrap();
    }
}
