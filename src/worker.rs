//! Single-thread FIFO executor that owns hardware state.
//!
//! Every hardware call for a session runs here, in submission order, against
//! state only this thread can touch. Tasks are never interrupted; shutting
//! down queues behind whatever is already pending.

use crate::errors::CameraError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Message<S> {
    Run(Task<S>),
    Shutdown,
}

/// Cloneable submission side of a [`Worker`].
///
/// Hardware callbacks that fire on foreign threads use this to hop back onto
/// the worker before touching state.
pub struct WorkerHandle<S> {
    sender: Sender<Message<S>>,
}

impl<S> Clone for WorkerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<S> std::fmt::Debug for WorkerHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("pending", &self.sender.len())
            .finish()
    }
}

impl<S> WorkerHandle<S> {
    /// Queue a task. Returns false once the worker has shut down.
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.sender.send(Message::Run(Box::new(task))).is_ok()
    }
}

pub struct Worker<S> {
    name: String,
    handle: WorkerHandle<S>,
    thread: Option<JoinHandle<()>>,
}

impl<S: Send + 'static> Worker<S> {
    pub fn spawn(name: impl Into<String>, state: S) -> Result<Self, CameraError> {
        Self::spawn_with(name, |_| state)
    }

    /// Build the state with a handle to its own queue, for callbacks that
    /// must re-post onto the worker.
    pub fn spawn_with<F>(name: impl Into<String>, init: F) -> Result<Self, CameraError>
    where
        F: FnOnce(WorkerHandle<S>) -> S,
    {
        let name = name.into();
        let (sender, receiver) = unbounded();
        let state = init(WorkerHandle {
            sender: sender.clone(),
        });
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_loop(receiver, state))
            .map_err(|e| {
                CameraError::DeviceUnavailable(format!("Failed to spawn worker thread: {}", e))
            })?;

        log::debug!("Started worker {}", name);
        Ok(Self {
            name,
            handle: WorkerHandle { sender },
            thread: Some(thread),
        })
    }
}

impl<S> Worker<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let queued = self.handle.post(task);
        if !queued {
            log::warn!("Worker {} is gone; dropping task", self.name);
        }
        queued
    }

    pub fn handle(&self) -> WorkerHandle<S> {
        self.handle.clone()
    }

    /// Stop after every task queued so far has run, waiting up to `timeout`.
    ///
    /// A hardware call that never returns keeps the thread alive; on timeout
    /// the thread is left detached and an error is returned.
    pub fn shutdown(&mut self, timeout: Duration) -> Result<(), CameraError> {
        let _ = self.handle.sender.send(Message::Shutdown);
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        let start = Instant::now();
        while !thread.is_finished() {
            if start.elapsed() >= timeout {
                log::warn!("Worker {} did not stop within {:?}", self.name, timeout);
                return Err(CameraError::DeviceUnavailable(format!(
                    "worker {} is stuck in a hardware call",
                    self.name
                )));
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        if thread.join().is_err() {
            log::error!("Worker {} panicked", self.name);
        }
        log::debug!("Stopped worker {}", self.name);
        Ok(())
    }
}

impl<S> Drop for Worker<S> {
    fn drop(&mut self) {
        // Let queued teardown finish in the background.
        let _ = self.handle.sender.send(Message::Shutdown);
    }
}

fn run_loop<S>(receiver: Receiver<Message<S>>, mut state: S) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(task) => task(&mut state),
            Message::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_tasks_run_in_submission_order() {
        let mut worker = Worker::spawn("test-worker", Vec::<u32>::new()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..50 {
            worker.post(move |log: &mut Vec<u32>| log.push(i));
        }
        let out = seen.clone();
        worker.post(move |log: &mut Vec<u32>| *out.lock().unwrap() = log.clone());
        worker.shutdown(Duration::from_secs(5)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_handle_reposts_from_other_threads() {
        let mut worker = Worker::spawn("test-repost", 0u32).unwrap();
        let handle = worker.handle();
        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            handle.post(|count: &mut u32| *count += 41);
            handle.post(move |count: &mut u32| {
                *count += 1;
                let _ = tx.send(*count);
            });
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        worker.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_post_after_shutdown_is_rejected() {
        let mut worker = Worker::spawn("test-closed", ()).unwrap();
        worker.shutdown(Duration::from_secs(5)).unwrap();
        assert!(!worker.post(|_| {}));
    }
}
