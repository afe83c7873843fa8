//! Usage: UI-bound execution context for work that may present interactive prompts.
//!
//! `UiQueue` owns one dedicated thread running a current-thread runtime with a
//! `LocalSet`. Every queued task runs on that thread, interleaved at await points;
//! nothing runs in parallel. Shutting the queue down drops unfinished tasks.

use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::thread::{JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};

pub type UiTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub trait UiDispatcher: Send + Sync {
    /// Queues `task` on the UI context. Returns `false` (dropping the task) when
    /// the context is unavailable or shutting down.
    fn try_enqueue(&self, task: UiTask) -> bool;
}

#[derive(Debug, Clone)]
pub struct UiQueueHandle {
    tx: mpsc::UnboundedSender<UiTask>,
    thread_id: ThreadId,
}

impl UiQueueHandle {
    /// True when called from the queue's own thread.
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }
}

impl UiDispatcher for UiQueueHandle {
    fn try_enqueue(&self, task: UiTask) -> bool {
        self.tx.send(task).is_ok()
    }
}

pub struct UiQueue {
    handle: UiQueueHandle,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for UiQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiQueue")
            .field("thread_id", &self.handle.thread_id)
            .finish_non_exhaustive()
    }
}

impl UiQueue {
    pub fn start(thread_name: &str) -> AppResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("SYSTEM_ERROR: ui queue runtime init failed: {e}"))?;

        let (tx, rx) = mpsc::unbounded_channel::<UiTask>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || run_queue(runtime, rx, shutdown_rx))
            .map_err(|e| format!("SYSTEM_ERROR: ui queue thread spawn failed: {e}"))?;

        let handle = UiQueueHandle {
            tx,
            thread_id: thread.thread().id(),
        };

        Ok(Self {
            handle,
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn handle(&self) -> UiQueueHandle {
        self.handle.clone()
    }

    /// Stops accepting work and waits for the queue thread to exit. Tasks still
    /// running are dropped.
    pub fn shutdown(&self) {
        if let Some(tx) = self.shutdown.lock_or_recover().take() {
            let _ = tx.send(());
        }
        let thread = self.thread.lock_or_recover().take();
        if let Some(thread) = thread {
            if thread.thread().id() == std::thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::error!("ui queue thread panicked");
            }
        }
    }
}

impl Drop for UiQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_queue(
    runtime: tokio::runtime::Runtime,
    mut rx: mpsc::UnboundedReceiver<UiTask>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, async {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                task = rx.recv() => match task {
                    Some(task) => {
                        tokio::task::spawn_local(task);
                    }
                    None => break,
                },
            }
        }
        rx.close();
    });
    tracing::debug!("ui queue stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn tasks_run_on_the_queue_thread() {
        let queue = UiQueue::start("ui-queue-test").expect("start");
        let handle = queue.handle();
        assert!(!handle.is_current());

        let (tx, rx) = oneshot::channel();
        let probe = handle.clone();
        assert!(handle.try_enqueue(Box::pin(async move {
            let _ = tx.send(probe.is_current());
        })));
        assert!(rx.await.expect("task ran"));
    }

    #[tokio::test]
    async fn enqueue_fails_after_shutdown() {
        let queue = UiQueue::start("ui-queue-test").expect("start");
        let handle = queue.handle();
        queue.shutdown();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let accepted = handle.try_enqueue(Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
        }));
        assert!(!accepted);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_drops_unfinished_tasks() {
        let queue = UiQueue::start("ui-queue-test").expect("start");
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (_never_tx, never_rx) = oneshot::channel::<()>();
        let (dropped_tx, dropped_rx) = oneshot::channel::<()>();

        struct NotifyOnDrop(Option<oneshot::Sender<()>>);
        impl Drop for NotifyOnDrop {
            fn drop(&mut self) {
                if let Some(tx) = self.0.take() {
                    let _ = tx.send(());
                }
            }
        }

        let guard = NotifyOnDrop(Some(dropped_tx));
        assert!(queue.handle().try_enqueue(Box::pin(async move {
            let _guard = guard;
            let _ = started_tx.send(());
            let _ = never_rx.await;
        })));

        started_rx.await.expect("task started");
        queue.shutdown();
        dropped_rx.await.expect("task dropped on shutdown");
    }
}
