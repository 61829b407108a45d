use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;

use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::models::{ImageCallback, ImageKey, ImageResult};

struct InflightDownload {
    handle: Option<AbortHandle>,
    waiters: Vec<ImageCallback>,
}

/// Coordinates download de-duplication and result fan-out.
///
/// At most one download exists per key. Callers either start a new one or
/// append their callback to the waiter list of the running one; on
/// completion every waiter is invoked exactly once, in registration order,
/// and the entry is gone. No terminal state is retained here - a
/// successful result lives on only in the memory cache.
pub struct InflightRegistry {
    downloads: Mutex<HashMap<ImageKey, InflightDownload>>,
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self {
            downloads: Mutex::new(HashMap::new()),
        }
    }

    /// Register `callback` for `key`. Returns `true` when a new download
    /// was created: the caller must then start the fetch and attach its
    /// abort handle via [`attach_handle`](Self::attach_handle).
    pub fn begin_or_join(&self, key: &ImageKey, callback: ImageCallback) -> bool {
        let mut downloads = self.downloads.lock().unwrap();
        match downloads.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().waiters.push(callback);
                trace!("Joined in-flight download for {}", key);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(InflightDownload {
                    handle: None,
                    waiters: vec![callback],
                });
                true
            }
        }
    }

    /// Attach the abort handle of the task serving `key`.
    ///
    /// If completion raced ahead and the entry is already gone there is
    /// nothing left to control; that only ever happens after every waiter
    /// was served, so it is logged and ignored.
    pub fn attach_handle(&self, key: &ImageKey, handle: AbortHandle) {
        let mut downloads = self.downloads.lock().unwrap();
        match downloads.get_mut(key) {
            Some(download) => download.handle = Some(handle),
            None => warn!("No in-flight download for {} to attach a handle to", key),
        }
    }

    /// Remove the download for `key` and deliver `result` to every waiter,
    /// in registration order. No-op when the key is not pending.
    ///
    /// Waiters run outside the registry lock, so a callback may issue new
    /// requests without deadlocking.
    pub fn complete(&self, key: &ImageKey, result: ImageResult) {
        let download = self.downloads.lock().unwrap().remove(key);
        let Some(download) = download else {
            return;
        };

        trace!(
            "Completing download for {} ({} waiter(s))",
            key,
            download.waiters.len()
        );
        for waiter in download.waiters {
            waiter(result.clone());
        }
    }

    /// Abort the download for `key` and drop its waiters without invoking
    /// them. Returns whether a download existed.
    pub fn cancel(&self, key: &ImageKey) -> bool {
        let download = self.downloads.lock().unwrap().remove(key);
        match download {
            Some(download) => {
                if let Some(handle) = download.handle {
                    handle.abort();
                }
                debug!(
                    "Cancelled download for {} ({} waiter(s) dropped)",
                    key,
                    download.waiters.len()
                );
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &ImageKey) -> bool {
        self.downloads.lock().unwrap().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl Default for InflightRegistry {
    fn default() -> Self {
        Self::new()
    }
}
