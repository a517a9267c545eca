//! Provider names known to the caller
//!
//! Records that are not self-describing may come with a schema that names neither the provider nor
//! its message. [`Schema::resolve_provider_name`](crate::schema::Schema::resolve_provider_name)
//! then falls back to a [`ProviderNameCache`] supplied by the caller.
use std::collections::HashMap;
use std::sync::Mutex;

use crate::native::guid::Guid;

/// A lookup from provider GUIDs to provider names
pub trait ProviderNameCache {
    fn lookup(&self, provider: &Guid) -> Option<String>;
}

impl ProviderNameCache for HashMap<Guid, String> {
    fn lookup(&self, provider: &Guid) -> Option<String> {
        self.get(provider).cloned()
    }
}

/// A [`ProviderNameCache`] that can be shared between threads and filled as names are learnt
///
/// # Example
/// ```
/// # use ferrisetw_decode::provider_names::{ProviderNameCache, ProviderNameMap};
/// # use ferrisetw_decode::Guid;
/// let names = ProviderNameMap::new();
/// let dns: Guid = "1C95126E-7EEA-49A9-A3FE-A378B03DDB4D".parse().unwrap();
/// names.insert(dns, "Microsoft-Windows-DNS-Client");
/// assert_eq!(names.lookup(&dns).as_deref(), Some("Microsoft-Windows-DNS-Client"));
/// ```
#[derive(Default)]
pub struct ProviderNameMap {
    names: Mutex<HashMap<Guid, String>>,
}

impl ProviderNameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers a name, returning the one it replaces
    pub fn insert(&self, provider: Guid, name: &str) -> Option<String> {
        match self.names.lock() {
            Ok(mut names) => names.insert(provider, name.to_string()),
            Err(_) => {
                log::warn!("provider name map poisoned, not recording {}", provider);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.names.lock().map(|names| names.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProviderNameCache for ProviderNameMap {
    fn lookup(&self, provider: &Guid) -> Option<String> {
        self.names.lock().ok()?.get(provider).cloned()
    }
}

impl std::fmt::Debug for ProviderNameMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderNameMap")
            .field("len", &self.names.try_lock().map(|guard| guard.len()))
            .finish()
    }
}
