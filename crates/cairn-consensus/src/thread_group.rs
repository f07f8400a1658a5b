//! Shutdown coordinator tracking in-flight operations.

use parking_lot::{Condvar, Mutex};

use cairn_core::error::ConsensusError;

#[derive(Default)]
struct State {
    active: usize,
    stopped: bool,
}

/// Operations register with [`ThreadGroup::add`] before touching the store;
/// [`ThreadGroup::stop`] refuses new ones and waits for the rest to finish.
#[derive(Default)]
pub struct ThreadGroup {
    state: Mutex<State>,
    drained: Condvar,
}

/// Registration of one in-flight operation. Deregisters on drop.
pub struct ThreadGuard<'g> {
    group: &'g ThreadGroup,
}

impl ThreadGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) -> Result<ThreadGuard<'_>, ConsensusError> {
        let mut state = self.state.lock();
        if state.stopped {
            return Err(ConsensusError::ShuttingDown);
        }
        state.active += 1;
        Ok(ThreadGuard { group: self })
    }

    /// Stop accepting operations and block until in-flight ones drain.
    pub fn stop(&self) -> Result<(), ConsensusError> {
        let mut state = self.state.lock();
        if state.stopped {
            return Err(ConsensusError::AlreadyStopped);
        }
        state.stopped = true;
        while state.active > 0 {
            self.drained.wait(&mut state);
        }
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

impl Drop for ThreadGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.group.state.lock();
        state.active -= 1;
        if state.active == 0 {
            self.group.drained.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn add_after_stop_fails() {
        let tg = ThreadGroup::new();
        tg.stop().unwrap();
        assert!(matches!(tg.add(), Err(ConsensusError::ShuttingDown)));
        assert!(matches!(tg.stop(), Err(ConsensusError::AlreadyStopped)));
        assert!(tg.is_stopped());
    }

    #[test]
    fn stop_waits_for_in_flight_operations() {
        let tg = Arc::new(ThreadGroup::new());
        let finished = Arc::new(AtomicBool::new(false));

        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let worker = {
            let tg = Arc::clone(&tg);
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                let _guard = tg.add().unwrap();
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                finished.store(true, Ordering::SeqCst);
            })
        };

        started_rx.recv().unwrap();
        tg.stop().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        worker.join().unwrap();
    }
}
