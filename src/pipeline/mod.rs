//! Worker threads of the pipeline and their lifecycle

pub mod backoff;
pub mod batch_writer;
pub mod forwarder;
pub mod ingestion;
pub mod lifecycle;
pub mod worker_pool;

pub use backoff::Backoff;
pub use batch_writer::BatchWriter;
pub use forwarder::{Forwarder, ForwarderState};
pub use ingestion::IngestionServer;
pub use lifecycle::Pipeline;
pub use worker_pool::WorkerPool;

use std::any::Any;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Interval between checks while waiting for threads to finish
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Join every handle that finishes before `deadline`.
///
/// Finished handles are removed from `handles`; the ones still running
/// are left in place so a caller can escalate and wait again. Returns
/// `true` once all threads have exited cleanly.
pub(crate) fn join_all(handles: &mut Vec<JoinHandle<()>>, deadline: Instant, what: &str) -> bool {
    let mut clean = true;
    loop {
        let mut i = 0;
        while i < handles.len() {
            if handles[i].is_finished() {
                let handle = handles.swap_remove(i);
                if let Err(e) = handle.join() {
                    eprintln!(
                        "[LOGGER ERROR] {} thread panicked during shutdown: {}",
                        what,
                        panic_message(e.as_ref())
                    );
                    clean = false;
                }
            } else {
                i += 1;
            }
        }

        if handles.is_empty() {
            return clean;
        }

        if Instant::now() >= deadline {
            eprintln!(
                "[LOGGER WARNING] {} {} thread(s) did not finish within timeout. \
                 Some logs may be lost.",
                handles.len(),
                what
            );
            return false;
        }

        thread::sleep(JOIN_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_all_finished_threads() {
        let mut handles: Vec<_> = (0..3).map(|_| thread::spawn(|| {})).collect();
        assert!(join_all(&mut handles, Instant::now() + Duration::from_secs(5), "test"));
        assert!(handles.is_empty());
    }

    #[test]
    fn test_join_all_times_out_and_keeps_handle() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        let mut handles = vec![thread::spawn(move || {
            let _ = rx.recv();
        })];
        assert!(!join_all(&mut handles, Instant::now() + Duration::from_millis(30), "test"));
        assert_eq!(handles.len(), 1);

        drop(tx);
        assert!(join_all(&mut handles, Instant::now() + Duration::from_secs(5), "test"));
    }

    #[test]
    fn test_join_all_reports_panic() {
        let mut handles = vec![thread::spawn(|| panic!("worker failed"))];
        assert!(!join_all(&mut handles, Instant::now() + Duration::from_secs(5), "test"));
        assert!(handles.is_empty());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "Unknown panic");
    }
}
