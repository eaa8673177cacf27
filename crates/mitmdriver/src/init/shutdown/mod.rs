use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use mea::{condvar::Condvar, mutex::Mutex};

mod ctrlc;

/// Install the Ctrl-C handler and return a `GracefulShutdown` the binary
/// entry point awaits before telling the `Proxy` to stop.
pub fn init() -> Result<GracefulShutdown> {
    let ctrlc = ctrlc::init()?;
    let shutdown = GracefulShutdown::new();
    termination(ctrlc, shutdown.clone());
    Ok(shutdown)
}

fn termination(ctrlc: ctrlc2::AsyncCtrlC, shutdown_for_signal: GracefulShutdown) {
    smol::spawn(async move {
        let _ = ctrlc.await;
        log::info!("Shutdown requested (Ctrl+C).");
        shutdown_for_signal.initiate();
    })
    .detach();
}

#[derive(Clone, Debug)]
pub struct GracefulShutdown {
    inner: Arc<GracefulShutdownInner>,
}

#[derive(Debug)]
struct GracefulShutdownInner {
    shutting_down: AtomicBool,
    gate: Mutex<()>,
    cv: Condvar,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GracefulShutdownInner {
                shutting_down: AtomicBool::new(false),
                gate: Mutex::new(()),
                cv: Condvar::new(),
            }),
        }
    }

    pub fn initiate(&self) {
        if self.inner.shutting_down.swap(true, Ordering::Release) {
            return;
        }
        self.inner.cv.notify_all();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    pub async fn wait_shutting_down(&self) {
        if self.is_shutting_down() {
            return;
        }
        let mut guard = self.inner.gate.lock().await;
        while !self.is_shutting_down() {
            guard = self.inner.cv.wait(guard).await;
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}
