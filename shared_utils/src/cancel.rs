//! Cancellation slot for the currently active external process.
//!
//! The interrupt handler runs on its own thread and must be able to kill
//! whatever conversion is in flight without owning it. The orchestrator
//! parks a `Weak` copy of the active handle here before consuming its
//! output and clears it after the exit status is consumed; the handler
//! resolves the weak reference under the same lock. Once the strong owner
//! releases the handle the upgrade fails and the trigger does nothing,
//! which is exactly the safe outcome for a process that already finished.
//!
//! This slot and the cancel flag are the only process-wide mutable state in
//! the tool; everything else travels through explicit arguments.

use crate::process::ToolProcess;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::info;

static ACTIVE: Mutex<Option<Weak<ToolProcess>>> = Mutex::new(None);
static CANCEL_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Park the handle of the process that is about to be supervised.
pub fn set_active(handle: &Arc<ToolProcess>) {
    *lock_slot() = Some(Arc::downgrade(handle));
}

/// Empty the slot once the exit status has been consumed.
pub fn clear_active() {
    *lock_slot() = None;
}

/// Kill the active process, if one is still alive, and return its exit
/// status. Returns `None` when the slot is empty or the owner already
/// released the handle; that case is silent by design.
pub fn kill_active() -> Option<ExitStatus> {
    // Resolve under the lock, kill outside of it; the slot lock is never
    // held across anything that can block.
    let handle = lock_slot().as_ref().and_then(Weak::upgrade)?;
    handle.kill();
    let status = handle.wait();
    info!(code = ?status.code(), "active process killed on request");
    Some(status)
}

/// Mark the run as cancelled; the orchestrator stops after the current file.
pub fn request_cancel() {
    CANCEL_REQUESTED.store(true, Ordering::SeqCst);
}

pub fn cancel_requested() -> bool {
    CANCEL_REQUESTED.load(Ordering::SeqCst)
}

/// Test hook: forget a pending cancellation.
pub fn reset_cancel() {
    CANCEL_REQUESTED.store(false, Ordering::SeqCst);
}

fn lock_slot() -> std::sync::MutexGuard<'static, Option<Weak<ToolProcess>>> {
    ACTIVE.lock().unwrap_or_else(PoisonError::into_inner)
}
