//! Process-wide SDK lifecycle registry.
//!
//! Vendor SDKs use global state: their init and uninit calls affect the
//! whole process, while several device instances may come and go
//! independently. The registry counts open handles per SDK name: the first
//! open initializes, dropping the last [`SdkGuard`] shuts the SDK down.
//! A failed initialization leaves no trace, so a later open retries.

use crate::error::AdapterError;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Init/teardown hooks for one vendor SDK.
pub trait SdkLifecycle: Send + Sync {
    /// Registry key; one refcount exists per name.
    fn sdk_name(&self) -> &str;

    /// Called on the 0 -> 1 open transition.
    fn initialize(&self) -> Result<(), AdapterError>;

    /// Called on the 1 -> 0 close transition.
    fn shutdown(&self) -> Result<(), AdapterError>;
}

struct SdkEntry {
    refs: usize,
    lifecycle: Arc<dyn SdkLifecycle>,
}

static REGISTRY: Lazy<Mutex<HashMap<String, SdkEntry>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Open handle on an initialized SDK.
///
/// Dropping the guard decrements the refcount; the last drop shuts the SDK
/// down. A shutdown failure is logged, not propagated (drops cannot fail).
#[must_use = "dropping the guard closes the SDK handle"]
pub struct SdkGuard {
    name: String,
}

impl SdkGuard {
    /// Name of the SDK this guard keeps open.
    #[must_use]
    pub fn sdk_name(&self) -> &str {
        &self.name
    }
}

impl Drop for SdkGuard {
    fn drop(&mut self) {
        close_sdk(&self.name);
    }
}

impl std::fmt::Debug for SdkGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkGuard").field("sdk", &self.name).finish()
    }
}

/// Open a handle on the SDK described by `lifecycle`.
///
/// The registry lock is held across `initialize()`, so concurrent opens of
/// the same SDK cannot race the init call.
pub fn open_sdk(lifecycle: Arc<dyn SdkLifecycle>) -> Result<SdkGuard, AdapterError> {
    let name = lifecycle.sdk_name().to_string();
    let mut registry = REGISTRY.lock();

    match registry.get_mut(&name) {
        Some(entry) => {
            entry.refs += 1;
        }
        None => {
            // First handle: initialize before registering, so a failure
            // rolls back to "never opened".
            lifecycle.initialize()?;
            registry.insert(
                name.clone(),
                SdkEntry {
                    refs: 1,
                    lifecycle,
                },
            );
            info!(sdk = %name, "SDK initialized");
        }
    }

    Ok(SdkGuard { name })
}

fn close_sdk(name: &str) {
    let mut registry = REGISTRY.lock();
    let Some(entry) = registry.get_mut(name) else {
        error!(sdk = %name, "SDK guard dropped for an unregistered SDK");
        return;
    };

    entry.refs -= 1;
    if entry.refs > 0 {
        return;
    }

    if let Some(entry) = registry.remove(name) {
        match entry.lifecycle.shutdown() {
            Ok(()) => info!(sdk = %name, "SDK shut down"),
            Err(err) => error!(sdk = %name, error = %err, "SDK shutdown failed"),
        }
    }
}

/// Current refcount for an SDK name. Intended for diagnostics and tests.
#[must_use]
pub fn sdk_ref_count(name: &str) -> usize {
    REGISTRY.lock().get(name).map_or(0, |entry| entry.refs)
}
