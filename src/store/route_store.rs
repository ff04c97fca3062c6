//! Thread-safe route storage behind a single reader/writer lock.

use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::error::StoreError;

use super::types::{Endpoint, RouteBinding, RouteSnapshot, SyncSummary};

#[derive(Debug, Default)]
struct Inner {
    bindings: HashMap<String, RouteBinding>,
    /// hostname -> application id
    by_hostname: HashMap<String, String>,
}

impl Inner {
    fn insert(&mut self, binding: RouteBinding) {
        self.by_hostname
            .insert(binding.hostname.clone(), binding.application_id.clone());
        self.bindings.insert(binding.application_id.clone(), binding);
    }

    fn hostname_owner(&self, hostname: &str) -> Option<&str> {
        self.by_hostname.get(hostname).map(String::as_str)
    }
}

/// Thread-safe storage for route bindings.
///
/// All reads and writes go through one `RwLock`: readers share it,
/// mutations are exclusive. Callers only ever receive copies, so no
/// reference into the maps outlives a method call. The store version is
/// published on a `watch` channel and bumped, under the write lock, by
/// every mutation that changes observable state.
pub struct RouteStore {
    inner: RwLock<Inner>,
    version: watch::Sender<u64>,
}

impl RouteStore {
    /// Creates a new empty route store.
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner::default()),
            version,
        }
    }

    /// Binds `hostname` to `application_id` and returns its virtual address.
    ///
    /// Binding an identifier that already exists is idempotent: the stored
    /// address is returned and the stored hostname is kept, even when a
    /// different hostname is supplied.
    pub fn bind(&self, application_id: &str, hostname: &str) -> Result<Ipv4Addr, StoreError> {
        let (application_id, hostname) = validate(application_id, hostname)?;

        let mut inner = self.inner.write();
        if let Some(existing) = inner.bindings.get(&application_id) {
            return Ok(existing.virtual_address);
        }

        if let Some(owner) = inner.hostname_owner(&hostname) {
            return Err(StoreError::HostnameConflict {
                hostname,
                existing: owner.to_string(),
            });
        }

        let binding = RouteBinding::new(application_id, hostname);
        let vip = binding.virtual_address;
        tracing::debug!(
            application_id = %binding.application_id,
            hostname = %binding.hostname,
            %vip,
            "route bound"
        );
        inner.insert(binding);
        self.bump();

        Ok(vip)
    }

    /// Removes the binding for `application_id`.
    ///
    /// Returns whether a binding was removed; unknown identifiers are a no-op.
    pub fn unbind(&self, application_id: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(binding) = inner.bindings.remove(normalize_id(application_id)) else {
            return false;
        };

        if inner.hostname_owner(&binding.hostname) == Some(binding.application_id.as_str()) {
            inner.by_hostname.remove(&binding.hostname);
        }
        self.bump();

        tracing::debug!(
            application_id = %binding.application_id,
            hostname = %binding.hostname,
            "route unbound"
        );
        true
    }

    /// Replaces the backend set of an existing binding.
    ///
    /// Unknown identifiers are ignored: the scheduler may report
    /// applications the registrar has not bound yet. Returns whether the
    /// stored set changed.
    pub fn sync_backends<I>(&self, application_id: &str, endpoints: I) -> bool
    where
        I: IntoIterator<Item = Endpoint>,
    {
        let endpoints: BTreeSet<Endpoint> = endpoints.into_iter().collect();

        let mut inner = self.inner.write();
        let Some(binding) = inner.bindings.get_mut(normalize_id(application_id)) else {
            return false;
        };
        if binding.backends == endpoints {
            return false;
        }

        binding.backends = endpoints;
        self.bump();
        true
    }

    /// Replaces the full set of registrar bindings in one step.
    ///
    /// `routes` is the complete desired state. Identifiers missing from it
    /// are unbound and new identifiers are bound. An identifier already
    /// present with the same hostname keeps its binding untouched; one
    /// whose hostname changed is rebound to the new hostname and address,
    /// keeping its backends, and counts as one removal plus one addition.
    /// Hostname conflicts are checked within `routes` only, so a hostname
    /// may move between identifiers. Nothing changes if any entry is
    /// invalid or two identifiers in `routes` claim the same hostname.
    pub fn sync_bindings<I>(&self, routes: I) -> Result<SyncSummary, StoreError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let routes = routes
            .into_iter()
            .map(|(id, host)| validate(&id, &host))
            .collect::<Result<Vec<_>, _>>()?;

        let mut inner = self.inner.write();
        let mut next = Inner::default();
        let mut summary = SyncSummary::default();

        for (application_id, hostname) in routes {
            if next.bindings.contains_key(&application_id) {
                continue;
            }

            let binding = match inner.bindings.get(&application_id) {
                Some(existing) if existing.hostname == hostname => {
                    summary.retained += 1;
                    existing.clone()
                }
                Some(existing) => {
                    summary.removed += 1;
                    summary.added += 1;
                    let mut rebound = RouteBinding::new(application_id, hostname);
                    rebound.backends = existing.backends.clone();
                    rebound
                }
                None => {
                    summary.added += 1;
                    RouteBinding::new(application_id, hostname)
                }
            };

            if let Some(owner) = next.hostname_owner(&binding.hostname) {
                return Err(StoreError::HostnameConflict {
                    hostname: binding.hostname,
                    existing: owner.to_string(),
                });
            }
            next.insert(binding);
        }

        summary.removed += inner
            .bindings
            .keys()
            .filter(|id| !next.bindings.contains_key(*id))
            .count() as u32;

        if summary.added > 0 || summary.removed > 0 {
            *inner = next;
            self.bump();
        }

        Ok(summary)
    }

    /// Returns a consistent copy of all bindings, ordered by hostname.
    pub fn snapshot(&self) -> RouteSnapshot {
        let inner = self.inner.read();
        let version = *self.version.borrow();
        let mut bindings: Vec<RouteBinding> = inner.bindings.values().cloned().collect();
        drop(inner);

        bindings.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        RouteSnapshot { version, bindings }
    }

    /// Looks a binding up by hostname.
    pub fn lookup_hostname(&self, hostname: &str) -> Option<RouteBinding> {
        let hostname = normalize_hostname(hostname);
        let inner = self.inner.read();
        let application_id = inner.by_hostname.get(&hostname)?;
        inner.bindings.get(application_id).cloned()
    }

    /// Returns the identifiers of all current bindings.
    pub fn application_ids(&self) -> Vec<String> {
        self.inner.read().bindings.keys().cloned().collect()
    }

    /// Returns the number of bindings.
    pub fn len(&self) -> usize {
        self.inner.read().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current store version.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Subscribes to version changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    // Callers hold the write lock.
    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

impl Default for RouteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_id(application_id: &str) -> &str {
    application_id.trim()
}

/// Lowercases a hostname and strips surrounding whitespace.
fn normalize_hostname(hostname: &str) -> String {
    hostname.trim().to_ascii_lowercase()
}

fn validate(application_id: &str, hostname: &str) -> Result<(String, String), StoreError> {
    let application_id = normalize_id(application_id);
    if application_id.is_empty() {
        return Err(StoreError::InvalidArgument(
            "application_id must not be empty".to_string(),
        ));
    }

    let hostname = normalize_hostname(hostname);
    if hostname.is_empty() {
        return Err(StoreError::InvalidArgument(
            "hostname must not be empty".to_string(),
        ));
    }

    Ok((application_id.to_string(), hostname))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::vip;

    fn endpoints(list: &[(&str, u32)]) -> Vec<Endpoint> {
        list.iter().map(|(a, p)| Endpoint::new(*a, *p)).collect()
    }

    #[test]
    fn test_new_store_empty() {
        let store = RouteStore::new();
        assert_eq!(store.version(), 0);
        assert!(store.is_empty());
        assert!(store.snapshot().bindings.is_empty());
    }

    #[test]
    fn test_bind_returns_allocated_vip() {
        let store = RouteStore::new();
        let vip = store.bind("guid-1", "foo.apps.internal").unwrap();

        assert_eq!(vip, vip::allocate("foo.apps.internal"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_bind_twice_keeps_vip_and_first_hostname() {
        let store = RouteStore::new();
        let first = store.bind("guid-1", "foo.apps.internal").unwrap();
        let second = store.bind("guid-1", "bar.apps.internal").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.version(), 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.bindings.len(), 1);
        assert_eq!(snapshot.bindings[0].hostname, "foo.apps.internal");
        assert!(store.lookup_hostname("bar.apps.internal").is_none());
    }

    #[test]
    fn test_bind_rejects_empty_fields() {
        let store = RouteStore::new();

        assert!(matches!(
            store.bind("", "foo.apps.internal"),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.bind("guid-1", "   "),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(store.is_empty());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_bind_normalizes_hostname() {
        let store = RouteStore::new();
        let vip = store.bind("guid-1", " Foo.Apps.Internal ").unwrap();

        assert_eq!(vip, vip::allocate("foo.apps.internal"));
        let binding = store.lookup_hostname("FOO.apps.internal").unwrap();
        assert_eq!(binding.application_id, "guid-1");
        assert_eq!(binding.hostname, "foo.apps.internal");
    }

    #[test]
    fn test_bind_rejects_hostname_owned_by_other_app() {
        let store = RouteStore::new();
        store.bind("guid-1", "foo.apps.internal").unwrap();

        let err = store.bind("guid-2", "foo.apps.internal").unwrap_err();
        assert_eq!(
            err,
            StoreError::HostnameConflict {
                hostname: "foo.apps.internal".into(),
                existing: "guid-1".into(),
            }
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sync_backends_unknown_app_is_noop() {
        let store = RouteStore::new();
        let changed = store.sync_backends("guid-404", endpoints(&[("10.0.0.5", 8080)]));

        assert!(!changed);
        assert!(store.is_empty());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_sync_backends_replaces_set() {
        let store = RouteStore::new();
        store.bind("guid-1", "foo.apps.internal").unwrap();

        assert!(store.sync_backends("guid-1", endpoints(&[("10.0.0.5", 8080), ("10.0.0.6", 8080)])));
        assert!(store.sync_backends("guid-1", endpoints(&[("10.0.0.7", 8080)])));

        let binding = store.lookup_hostname("foo.apps.internal").unwrap();
        assert_eq!(binding.backends.len(), 1);
        assert!(binding.backends.contains(&Endpoint::new("10.0.0.7", 8080)));
    }

    #[test]
    fn test_sync_backends_unchanged_set_keeps_version() {
        let store = RouteStore::new();
        store.bind("guid-1", "foo.apps.internal").unwrap();
        store.sync_backends("guid-1", endpoints(&[("10.0.0.5", 8080)]));
        let version = store.version();

        // Duplicates collapse into the same set.
        let changed = store.sync_backends("guid-1", endpoints(&[("10.0.0.5", 8080), ("10.0.0.5", 8080)]));

        assert!(!changed);
        assert_eq!(store.version(), version);
    }

    #[test]
    fn test_unbind_removes_binding_and_index() {
        let store = RouteStore::new();
        store.bind("guid-1", "foo.apps.internal").unwrap();

        assert!(store.unbind("guid-1"));
        assert!(store.snapshot().bindings.is_empty());
        assert!(store.lookup_hostname("foo.apps.internal").is_none());

        // Later scheduler updates for the removed id are ignored.
        assert!(!store.sync_backends("guid-1", endpoints(&[("10.0.0.5", 8080)])));
        assert!(store.is_empty());
    }

    #[test]
    fn test_unbind_unknown_is_noop() {
        let store = RouteStore::new();
        assert!(!store.unbind("guid-404"));
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_rebind_after_unbind_restores_same_vip() {
        let store = RouteStore::new();
        let first = store.bind("guid-1", "foo.apps.internal").unwrap();
        store.unbind("guid-1");
        let second = store.bind("guid-7", "foo.apps.internal").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_end_to_end_bind_sync_snapshot() {
        let store = RouteStore::new();
        let vip = store.bind("guid-1", "foo.apps.internal").unwrap();
        store.sync_backends("guid-1", endpoints(&[("10.0.0.5", 8080)]));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.bindings.len(), 1);
        let binding = &snapshot.bindings[0];
        assert_eq!(binding.hostname, "foo.apps.internal");
        assert_eq!(binding.virtual_address, vip);
        assert_eq!(
            binding.backends.iter().cloned().collect::<Vec<_>>(),
            endpoints(&[("10.0.0.5", 8080)])
        );
    }

    #[test]
    fn test_snapshot_ordered_by_hostname() {
        let store = RouteStore::new();
        store.bind("guid-c", "c.apps.internal").unwrap();
        store.bind("guid-a", "a.apps.internal").unwrap();
        store.bind("guid-b", "b.apps.internal").unwrap();

        let hostnames: Vec<String> = store
            .snapshot()
            .bindings
            .into_iter()
            .map(|b| b.hostname)
            .collect();
        assert_eq!(hostnames, vec!["a.apps.internal", "b.apps.internal", "c.apps.internal"]);
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let store = RouteStore::new();
        store.bind("guid-1", "foo.apps.internal").unwrap();

        let before = store.snapshot();
        store.sync_backends("guid-1", endpoints(&[("10.0.0.5", 8080)]));

        assert!(before.bindings[0].backends.is_empty());
        assert!(store.snapshot().version > before.version);
    }

    #[test]
    fn test_sync_bindings_adds_removes_and_retains() {
        let store = RouteStore::new();
        store.bind("guid-1", "foo.apps.internal").unwrap();
        store.bind("guid-2", "bar.apps.internal").unwrap();
        store.sync_backends("guid-1", endpoints(&[("10.0.0.5", 8080)]));

        let summary = store
            .sync_bindings(vec![
                ("guid-1".to_string(), "foo.apps.internal".to_string()),
                ("guid-3".to_string(), "baz.apps.internal".to_string()),
            ])
            .unwrap();

        assert_eq!(
            summary,
            SyncSummary {
                added: 1,
                removed: 1,
                retained: 1
            }
        );
        let mut ids = store.application_ids();
        ids.sort();
        assert_eq!(ids, vec!["guid-1", "guid-3"]);

        // Retained bindings keep their backends.
        let foo = store.lookup_hostname("foo.apps.internal").unwrap();
        assert_eq!(foo.backends.len(), 1);
        assert!(store.lookup_hostname("bar.apps.internal").is_none());
    }

    #[test]
    fn test_sync_bindings_invalid_entry_changes_nothing() {
        let store = RouteStore::new();
        store.bind("guid-1", "foo.apps.internal").unwrap();
        let version = store.version();

        let result = store.sync_bindings(vec![
            ("guid-2".to_string(), "bar.apps.internal".to_string()),
            ("guid-3".to_string(), String::new()),
        ]);

        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
        assert_eq!(store.application_ids(), vec!["guid-1"]);
        assert_eq!(store.version(), version);
    }

    #[test]
    fn test_sync_bindings_duplicate_hostname_conflicts() {
        let store = RouteStore::new();

        let result = store.sync_bindings(vec![
            ("guid-1".to_string(), "foo.apps.internal".to_string()),
            ("guid-2".to_string(), "FOO.apps.internal".to_string()),
        ]);

        assert!(matches!(result, Err(StoreError::HostnameConflict { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_sync_bindings_identical_set_keeps_version() {
        let store = RouteStore::new();
        store.bind("guid-1", "foo.apps.internal").unwrap();
        let version = store.version();

        let summary = store
            .sync_bindings(vec![("guid-1".to_string(), "foo.apps.internal".to_string())])
            .unwrap();

        assert_eq!(summary.retained, 1);
        assert_eq!(store.version(), version);
    }

    #[test]
    fn test_sync_bindings_moves_hostname_between_apps() {
        let store = RouteStore::new();
        store.bind("guid-1", "foo.apps.internal").unwrap();

        let summary = store
            .sync_bindings(vec![
                ("guid-1".to_string(), "bar.apps.internal".to_string()),
                ("guid-2".to_string(), "foo.apps.internal".to_string()),
            ])
            .unwrap();

        assert_eq!(
            summary,
            SyncSummary {
                added: 2,
                removed: 1,
                retained: 0
            }
        );
        let foo = store.lookup_hostname("foo.apps.internal").unwrap();
        assert_eq!(foo.application_id, "guid-2");
        assert_eq!(foo.virtual_address, vip::allocate("foo.apps.internal"));
        let bar = store.lookup_hostname("bar.apps.internal").unwrap();
        assert_eq!(bar.application_id, "guid-1");
        assert_eq!(bar.virtual_address, vip::allocate("bar.apps.internal"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_sync_bindings_renames_single_app() {
        let store = RouteStore::new();
        store.bind("guid-1", "foo.apps.internal").unwrap();
        store.sync_backends("guid-1", endpoints(&[("10.0.0.5", 8080)]));
        let version = store.version();

        let summary = store
            .sync_bindings(vec![("guid-1".to_string(), "bar.apps.internal".to_string())])
            .unwrap();

        assert_eq!(
            summary,
            SyncSummary {
                added: 1,
                removed: 1,
                retained: 0
            }
        );
        assert!(store.version() > version);
        assert!(store.lookup_hostname("foo.apps.internal").is_none());
        let bar = store.lookup_hostname("bar.apps.internal").unwrap();
        assert_eq!(bar.application_id, "guid-1");
        assert_eq!(bar.virtual_address, vip::allocate("bar.apps.internal"));
        assert_eq!(bar.backends.len(), 1);
    }

    #[test]
    fn test_application_id_whitespace_is_trimmed_everywhere() {
        let store = RouteStore::new();
        store.bind("  guid-1 ", "foo.apps.internal").unwrap();
        assert_eq!(store.application_ids(), vec!["guid-1"]);

        assert!(store.sync_backends(" guid-1  ", endpoints(&[("10.0.0.5", 8080)])));
        let foo = store.lookup_hostname("foo.apps.internal").unwrap();
        assert_eq!(foo.backends.len(), 1);

        assert!(store.unbind("\tguid-1\n"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_observes_mutations() {
        let store = RouteStore::new();
        let mut rx = store.subscribe();

        store.bind("guid-1", "foo.apps.internal").unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);

        store.unbind("guid-1");
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);
    }

    #[test]
    fn test_concurrent_bind_and_snapshot() {
        let store = Arc::new(RouteStore::new());
        let mut handles = vec![];

        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for j in 0..50 {
                    let id = format!("guid-{}-{}", i, j);
                    let host = format!("app-{}-{}.apps.internal", i, j);
                    store.bind(&id, &host).unwrap();
                    store.sync_backends(&id, vec![Endpoint::new("10.0.0.1", 8000 + j)]);
                }
            }));
        }

        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = store.snapshot();
                    for binding in &snapshot.bindings {
                        assert!(!binding.hostname.is_empty());
                        assert!(!binding.virtual_address.is_unspecified());
                        assert_eq!(binding.virtual_address, vip::allocate(&binding.hostname));
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 16 * 50);
        assert!(store
            .snapshot()
            .bindings
            .iter()
            .all(|b| b.backends.len() == 1));
    }

    #[test]
    fn test_default_impl() {
        let store = RouteStore::default();
        assert_eq!(store.version(), 0);
        assert!(store.is_empty());
    }
}
