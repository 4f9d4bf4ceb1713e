use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;

lazy_static! {
    static ref GUARDS: Mutex<HashMap<PathBuf, Arc<StartGuard>>> = Mutex::new(HashMap::new());
}

/// One-shot "already started" flag for the watcher of a store root.
///
/// Exactly one caller of [`StartGuard::try_acquire`] ever gets `true`; the flag is never reset.
#[derive(Debug, Default)]
pub struct StartGuard {
    started: AtomicBool,
}

impl StartGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide guard for `root`.  Every call with the same root shares one guard.
    pub fn for_root(root: &Path) -> Arc<StartGuard> {
        let key = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let mut guards = GUARDS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(guards.entry(key).or_default())
    }

    pub fn try_acquire(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_acquired(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}
