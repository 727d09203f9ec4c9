//! Module `manager` implement the concurrent registry of named sets.
//!
//! The registry uses a simple form of Multi-Version-Concurrency-Control
//! to keep lookups off any mutex. Two radix trees exist at any time:
//! the *primary*, published to readers as an immutable snapshot, and an
//! *alternate* owned by the vacuum. Destructive operations never touch
//! a tree; they serialize on a single write mutex and append an entry
//! to a delta log. Readers search the primary and fall back to walking
//! the delta log, newest first.
//!
//! The vacuum thread periodically replays deltas into the alternate
//! tree, swaps it in as the new primary, then waits on a *version
//! barrier*: a synthetic delta that every client must checkpoint past,
//! proving no reader still walks the pre-swap tree. Only then are the
//! replayed deltas unlinked and retired sets destroyed. Clients report
//! progress through [SetManager::checkpoint] and deregister with
//! [SetManager::leave].

use log::{debug, error, info, warn};

use std::{
    fs, mem,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering::SeqCst},
        Arc, Mutex,
    },
    thread, time,
};

use crate::{
    config::Config,
    err_at,
    radix::{Radix, WalkRes},
    set::{Set, FOLDER_PREFIX},
    util::Spinlock,
    Error, Result,
};

/// How long the vacuum sleeps between poll iterations.
pub const VACUUM_POLL: time::Duration = time::Duration::from_millis(500);

/// Warn when this many outstanding versions cannot be vacuumed.
const WARN_THRESHOLD: u64 = 32;

/// Wraps a [Set] with the flags the manager needs to coordinate
/// destruction with outstanding references.
pub struct SetHandle {
    // cleared the moment a destructive op is accepted.
    is_active: AtomicBool,
    // set on every add, cleared by the cold sweep probe.
    is_hot: AtomicBool,
    // on reclamation, remove from disk instead of merely closing.
    should_delete: AtomicBool,

    set: Set,
}

impl SetHandle {
    fn new(set: Set, is_hot: bool) -> Arc<SetHandle> {
        Arc::new(SetHandle {
            is_active: AtomicBool::new(true),
            is_hot: AtomicBool::new(is_hot),
            should_delete: AtomicBool::new(false),
            set,
        })
    }

    /// The underlying set.
    pub fn set(&self) -> &Set {
        &self.set
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(SeqCst)
    }
}

#[derive(Clone)]
enum DeltaKind {
    Create(Arc<SetHandle>),
    Delete(Arc<SetHandle>),
    Barrier,
}

// Delta log entry, immutable once published, newest first.
struct Delta {
    vsn: u64,
    kind: DeltaKind,
    next: Option<Arc<Delta>>,
}

impl Delta {
    fn handle(&self) -> Option<&Arc<SetHandle>> {
        match &self.kind {
            DeltaKind::Create(handle) | DeltaKind::Delete(handle) => Some(handle),
            DeltaKind::Barrier => None,
        }
    }
}

// The published state: primary tree, the version it materializes, and
// the delta log head. Readers clone the Arc under a short spin latch
// and then work on an immutable snapshot.
struct Maps {
    primary: Arc<Radix<Arc<SetHandle>>>,
    primary_vsn: u64,
    delta: Option<Arc<Delta>>,
}

// Per-client checkpoint entry; vsn is the last version the client
// witnessed and gates reclamation.
struct Client {
    id: thread::ThreadId,
    vsn: AtomicU64,
}

/// The concurrent registry of name -> set.
pub struct SetManager {
    config: Arc<Config>,

    should_run: AtomicBool,
    vacuum_thread: Mutex<Option<thread::JoinHandle<()>>>,

    // current version; incremented only under the write mutex, read
    // without it.
    vsn: AtomicU64,
    // serializes all destructive operations.
    write_lock: Mutex<u32>,

    maps: Spinlock<Arc<Maps>>,
    // the alternate tree, owned by the vacuum between swaps.
    alt: Mutex<Radix<Arc<SetHandle>>>,

    clients: Spinlock<Vec<Arc<Client>>>,

    // names deleted from the primary whose files the vacuum has not
    // yet removed; create returns DeletePending for these.
    pending_deletes: Spinlock<Vec<String>>,
}

impl SetManager {
    /// Create a manager, discovering existing sets under the data
    /// directory. `vacuum` starts the background vacuum thread; tests
    /// and embedded callers can disable it and drive
    /// [SetManager::vacuum] directly.
    pub fn init(config: Arc<Config>, vacuum: bool) -> Result<Arc<SetManager>> {
        let primary = load_existing_sets(&config)?;
        let alt = primary.copy();

        let mgr = Arc::new(SetManager {
            config,

            should_run: AtomicBool::new(vacuum),
            vacuum_thread: Mutex::new(None),

            vsn: AtomicU64::new(0),
            write_lock: Mutex::new(0),

            maps: Spinlock::new(Arc::new(Maps {
                primary: Arc::new(primary),
                primary_vsn: 0,
                delta: None,
            })),
            alt: Mutex::new(alt),

            clients: Spinlock::new(Vec::default()),
            pending_deletes: Spinlock::new(Vec::default()),
        });

        if vacuum {
            let m = Arc::clone(&mgr);
            let handle = thread::spawn(move || m.vacuum_main());
            *err_at!(Fatal, mgr.vacuum_thread.lock())? = Some(handle);
        }

        Ok(mgr)
    }

    /// Stop the vacuum thread and tear down every set. Sets flagged
    /// for deletion are removed from disk, the rest are closed.
    pub fn close(&self) -> Result<()> {
        self.should_run.store(false, SeqCst);
        let handle = err_at!(Fatal, self.vacuum_thread.lock())?.take();
        if let Some(handle) = handle {
            err_at!(ThreadFail, handle.join().map_err(|e| format!("{:?}", e)))?;
        }

        let maps = Arc::clone(&self.maps.read());
        maps.primary.iter(&mut |_key, handle: &Arc<SetHandle>| {
            reclaim_set(handle);
            WalkRes::Ok
        });
        // pending creates are only in the delta log; pending deletes
        // are still in the primary tree and already handled.
        let mut delta = maps.delta.as_ref();
        while let Some(d) = delta {
            if let DeltaKind::Create(handle) = &d.kind {
                reclaim_set(handle);
            }
            delta = d.next.as_ref();
        }
        Ok(())
    }

    /// Record that the calling thread has witnessed the current
    /// version. Invoked implicitly by every manager operation, and
    /// periodically by long running background work, so that the
    /// vacuum can make progress.
    pub fn checkpoint(&self) {
        let id = thread::current().id();
        let vsn = self.vsn.load(SeqCst);
        {
            let clients = self.clients.read();
            if let Some(client) = clients.iter().find(|c| c.id == id) {
                client.vsn.store(vsn, SeqCst);
                return;
            }
        }
        // not a client yet, register ourself.
        let client = Arc::new(Client {
            id,
            vsn: AtomicU64::new(vsn),
        });
        self.clients.write().push(client);
    }

    /// Deregister the calling thread. Used when a worker shuts down or
    /// a connection closes.
    pub fn leave(&self) {
        let id = thread::current().id();
        self.clients.write().retain(|c| c.id != id);
    }

    /// Create a new set. `custom` carries per-set overrides of the
    /// default precision/eps/in-memory settings; such sets are built
    /// resident, default creates fault in lazily. In-memory sets are
    /// always built resident, they have nothing on disk to fault in
    /// from and are never proxied.
    pub fn create_set(&self, name: &str, custom: Option<Arc<Config>>) -> Result<()> {
        self.checkpoint();
        let _w = err_at!(Fatal, self.write_lock.lock())?;

        if let Some(handle) = self.find_set(name) {
            return match handle.is_active() {
                true => Err(Error::SetExists),
                false => Err(Error::DeletePending),
            };
        }
        // scan the pending delete queue; the primary may already hide
        // the delete while its files are still on disk.
        if self.pending_deletes.read().iter().any(|n| n == name) {
            return Err(Error::DeletePending);
        }

        let (config, discover) = match custom {
            Some(config) => (config, true),
            // an in-memory set is never proxied after creation.
            None => (Arc::clone(&self.config), self.config.in_memory),
        };
        let set = Set::open(config, name, discover)?;
        let handle = SetHandle::new(set, true);
        self.append_delta(DeltaKind::Create(handle));
        Ok(())
    }

    /// Drop the set entirely: remove it from the manager and, once
    /// reclaimed, from disk. Permanent.
    pub fn drop_set(&self, name: &str) -> Result<()> {
        self.checkpoint();
        let _w = err_at!(Fatal, self.write_lock.lock())?;

        let handle = self.take_set(name).ok_or(Error::SetNotFound)?;
        handle.is_active.store(false, SeqCst);
        handle.should_delete.store(true, SeqCst);
        self.append_delta(DeltaKind::Delete(handle));
        Ok(())
    }

    /// Clear the set from the internal data stores, leaving its files
    /// on disk for a later re-create. Only allowed while proxied.
    pub fn clear_set(&self, name: &str) -> Result<()> {
        self.checkpoint();
        let _w = err_at!(Fatal, self.write_lock.lock())?;

        let handle = self.take_set(name).ok_or(Error::SetNotFound)?;
        if !handle.set().is_proxied() {
            return Err(Error::NotProxied);
        }
        // critical: merely closed on reclamation, never deleted.
        handle.is_active.store(false, SeqCst);
        handle.should_delete.store(false, SeqCst);
        self.append_delta(DeltaKind::Delete(handle));
        Ok(())
    }

    /// Flush the named set.
    pub fn flush_set(&self, name: &str) -> Result<()> {
        self.checkpoint();
        let handle = self.take_set(name).ok_or(Error::SetNotFound)?;
        handle.set().flush()
    }

    /// Fault the named set out of memory, leaving it registered. No-op
    /// for in-memory sets.
    pub fn unmap_set(&self, name: &str) -> Result<()> {
        self.checkpoint();
        let handle = self.take_set(name).ok_or(Error::SetNotFound)?;
        if handle.set().in_memory() {
            return Ok(());
        }
        handle.set().close()
    }

    /// Add `keys` to the named set. Stops at the first failure.
    pub fn set_keys(&self, name: &str, keys: &[&str]) -> Result<()> {
        self.checkpoint();
        let handle = self.take_set(name).ok_or(Error::SetNotFound)?;
        let mut res = Ok(());
        for key in keys {
            res = handle.set().add(key);
            if res.is_err() {
                break;
            }
        }
        handle.is_hot.store(true, SeqCst);
        res
    }

    /// Estimated cardinality of the named set.
    pub fn set_size(&self, name: &str) -> Result<u64> {
        self.checkpoint();
        let handle = self.take_set(name).ok_or(Error::SetNotFound)?;
        handle.set().size()
    }

    /// Invoke `callb` with the named set for read-only inspection,
    /// metrics and size information. The set is not locked; callers
    /// must not use this to mutate it.
    pub fn with_set<F, T>(&self, name: &str, callb: F) -> Result<T>
    where
        F: FnOnce(&Set) -> T,
    {
        self.checkpoint();
        let handle = self.take_set(name).ok_or(Error::SetNotFound)?;
        Ok(callb(handle.set()))
    }

    /// List the names of all active sets, optionally restricted to a
    /// prefix, in lexicographic order with unmerged creates at the
    /// tail. Returns copies so callers never outlive the sets.
    pub fn list_sets(&self, prefix: Option<&str>) -> Vec<String> {
        self.checkpoint();
        let maps = Arc::clone(&self.maps.read());

        let mut names = vec![];
        {
            let mut callb = |key: &[u8], handle: &Arc<SetHandle>| {
                if handle.is_active() {
                    names.push(key_to_name(key));
                }
                WalkRes::Ok
            };
            match prefix {
                Some(prefix) => maps.primary.iter_prefix(prefix.as_bytes(), &mut callb),
                None => maps.primary.iter(&mut callb),
            };
        }

        // joy... we have to potentially handle the delta updates.
        if maps.primary_vsn == self.vsn.load(SeqCst) {
            return names;
        }
        let mut delta = maps.delta.as_ref();
        while let Some(d) = delta {
            if let DeltaKind::Create(handle) = &d.kind {
                let matches = match prefix {
                    Some(prefix) => handle.set().name().starts_with(prefix),
                    None => true,
                };
                if matches && handle.is_active() {
                    names.push(handle.set().name().to_string());
                }
            }
            // don't seek past what the primary tree incorporates.
            if d.vsn == maps.primary_vsn + 1 {
                break;
            }
            delta = d.next.as_ref();
        }
        names
    }

    /// List the names of cold sets: resident but not touched since the
    /// previous sweep. Clears the hot flag as a side effect. Deltas are
    /// not considered, they are either new (hot) or being deleted.
    pub fn list_cold_sets(&self) -> Vec<String> {
        self.checkpoint();
        let maps = Arc::clone(&self.maps.read());

        let mut names = vec![];
        maps.primary.iter(&mut |key: &[u8], handle: &Arc<SetHandle>| {
            if handle.is_hot.swap(false, SeqCst) {
                return WalkRes::Ok;
            }
            if handle.set().is_proxied() {
                return WalkRes::Ok;
            }
            names.push(key_to_name(key));
            WalkRes::Ok
        });
        names
    }

    /// Force a vacuum up to the current version, without a barrier.
    /// Generally unsafe while serving traffic, but usable in an
    /// embedded or test environment with the vacuum thread disabled.
    pub fn vacuum(&self) -> Result<()> {
        let vsn = self.vsn.load(SeqCst);
        let mut alt = err_at!(Fatal, self.alt.lock())?;
        self.merge_old_versions(&mut alt, vsn)?;
        let old_primary = self.swap_set_maps(&mut alt, vsn)?;
        let mut next_alt = recover_tree(old_primary);
        self.merge_old_versions(&mut next_alt, vsn)?;
        *alt = next_alt;
        mem::drop(alt);
        self.delete_old_versions(vsn)?;
        Ok(())
    }

    // ---- read path

    // search the primary tree, then the delta log.
    fn find_set(&self, name: &str) -> Option<Arc<SetHandle>> {
        let maps = Arc::clone(&self.maps.read());

        if let Some(handle) = maps.primary.search(&name_to_key(name)) {
            return Some(Arc::clone(handle));
        }
        // check if the primary has all delta changes.
        if maps.primary_vsn == self.vsn.load(SeqCst) {
            return None;
        }
        // newest create or delete for the name dominates.
        let mut delta = maps.delta.as_ref();
        while let Some(d) = delta {
            if let Some(handle) = d.handle() {
                if handle.set().name() == name {
                    return Some(Arc::clone(handle));
                }
            }
            if d.vsn == maps.primary_vsn + 1 {
                break;
            }
            delta = d.next.as_ref();
        }
        None
    }

    fn take_set(&self, name: &str) -> Option<Arc<SetHandle>> {
        self.find_set(name).filter(|handle| handle.is_active())
    }

    // ---- write path, callers hold the write mutex.

    fn append_delta(&self, kind: DeltaKind) -> u64 {
        let vsn = self.vsn.fetch_add(1, SeqCst) + 1;
        let maps = Arc::clone(&self.maps.read());
        let delta = Arc::new(Delta {
            vsn,
            kind,
            next: maps.delta.clone(),
        });
        let new = Maps {
            primary: Arc::clone(&maps.primary),
            primary_vsn: maps.primary_vsn,
            delta: Some(delta),
        };
        *self.maps.write() = Arc::new(new);
        vsn
    }

    // ---- vacuum

    fn vacuum_main(&self) {
        while self.should_run.load(SeqCst) {
            if let Err(err) = self.vacuum_iteration() {
                error!(target: "setmgr", "vacuum iteration failed: {}", err);
                thread::sleep(VACUUM_POLL);
            }
        }
    }

    fn vacuum_iteration(&self) -> Result<()> {
        // do nothing while there are no changes.
        if self.vsn.load(SeqCst) == self.primary_vsn() {
            thread::sleep(VACUUM_POLL);
            return Ok(());
        }

        // the version barrier itself creates a version, so handle the
        // special case where the only outstanding delta is a barrier
        // by just moving primary_vsn forward.
        let mgr_vsn = self.vsn.load(SeqCst);
        if mgr_vsn - self.primary_vsn() == 1 {
            let _w = err_at!(Fatal, self.write_lock.lock())?;
            let maps = Arc::clone(&self.maps.read());
            let barrier_only = mgr_vsn == self.vsn.load(SeqCst)
                && matches!(
                    maps.delta.as_ref().map(|d| &d.kind),
                    Some(DeltaKind::Barrier)
                );
            if barrier_only {
                *self.maps.write() = Arc::new(Maps {
                    primary: Arc::clone(&maps.primary),
                    primary_vsn: mgr_vsn,
                    delta: maps.delta.clone(),
                });
                info!(target: "setmgr", "all updates applied (vsn: {})", mgr_vsn);
                return Ok(());
            }
        }

        let min_vsn = self.client_min_vsn();
        if self.vsn.load(SeqCst) - min_vsn > WARN_THRESHOLD {
            warn!(
                target: "setmgr",
                "many delta versions detected! min: {} (vsn: {})",
                min_vsn, self.vsn.load(SeqCst)
            );
        } else {
            debug!(
                target: "setmgr",
                "applying delta update up to: {} (vsn: {})",
                min_vsn, self.vsn.load(SeqCst)
            );
        }

        let mut alt = err_at!(Fatal, self.alt.lock())?;

        // merge the old versions into the alternate tree.
        self.merge_old_versions(&mut alt, min_vsn)?;

        // mark pending deletes before the swap, so that a
        // create/drop/create cycle cannot recreate a set whose files
        // have not been removed yet.
        self.mark_pending_deletes(min_vsn);

        // swap the trees; new readers now see the merged state.
        let old_primary = self.swap_set_maps(&mut alt, min_vsn)?;

        // wait on a barrier until nobody is using the old tree.
        self.version_barrier()?;

        // merge the same changes into the recovered tree, both trees
        // now incorporate them.
        let mut next_alt = recover_tree(old_primary);
        self.merge_old_versions(&mut next_alt, min_vsn)?;
        *alt = next_alt;
        mem::drop(alt);

        // both trees agree, safe to unlink deltas and destroy sets.
        self.delete_old_versions(min_vsn)?;

        // deletes completed, creates of these names may proceed.
        self.clear_pending_deletes();

        info!(
            target: "setmgr",
            "finished delta updates up to: {} (vsn: {})", min_vsn, self.vsn.load(SeqCst)
        );
        Ok(())
    }

    fn primary_vsn(&self) -> u64 {
        self.maps.read().primary_vsn
    }

    fn client_min_vsn(&self) -> u64 {
        let mut min_vsn = self.vsn.load(SeqCst);
        for client in self.clients.read().iter() {
            min_vsn = std::cmp::min(min_vsn, client.vsn.load(SeqCst));
        }
        min_vsn
    }

    // replay deltas upto `min_vsn` into `tree`, oldest first, so a
    // create-then-delete for the same name lands in the right state.
    fn merge_old_versions(
        &self,
        tree: &mut Radix<Arc<SetHandle>>,
        min_vsn: u64,
    ) -> Result<()> {
        let maps = Arc::clone(&self.maps.read());
        let mut entries = vec![];
        let mut delta = maps.delta.as_ref();
        while let Some(d) = delta {
            if d.vsn <= min_vsn {
                entries.push(d);
            }
            delta = d.next.as_ref();
        }
        for d in entries.into_iter().rev() {
            match &d.kind {
                DeltaKind::Create(handle) => {
                    let key = name_to_key(handle.set().name());
                    tree.insert(&key, Arc::clone(handle));
                }
                DeltaKind::Delete(handle) => {
                    tree.remove(&name_to_key(handle.set().name()));
                }
                DeltaKind::Barrier => (),
            }
        }
        Ok(())
    }

    fn mark_pending_deletes(&self, min_vsn: u64) {
        let maps = Arc::clone(&self.maps.read());
        let mut pending = vec![];
        let mut delta = maps.delta.as_ref();
        while let Some(d) = delta {
            if d.vsn <= min_vsn {
                if let DeltaKind::Delete(handle) = &d.kind {
                    pending.push(handle.set().name().to_string());
                }
            }
            delta = d.next.as_ref();
        }
        *self.pending_deletes.write() = pending;
    }

    fn clear_pending_deletes(&self) {
        *self.pending_deletes.write() = Vec::default();
    }

    // publish `alt` as the new primary and hand back the old one.
    fn swap_set_maps(
        &self,
        alt: &mut Radix<Arc<SetHandle>>,
        primary_vsn: u64,
    ) -> Result<Arc<Radix<Arc<SetHandle>>>> {
        let merged = Arc::new(mem::take(alt));
        let _w = err_at!(Fatal, self.write_lock.lock())?;
        let maps = Arc::clone(&self.maps.read());
        let old_primary = Arc::clone(&maps.primary);
        *self.maps.write() = Arc::new(Maps {
            primary: merged,
            primary_vsn,
            delta: maps.delta.clone(),
        });
        Ok(old_primary)
    }

    // a non-locking synchronisation mechanism: add a version and wait
    // for every client to reach it.
    fn version_barrier(&self) -> Result<()> {
        let vsn = {
            let _w = err_at!(Fatal, self.write_lock.lock())?;
            self.append_delta(DeltaKind::Barrier)
        };
        while self.should_run.load(SeqCst) && self.client_min_vsn() < vsn {
            thread::sleep(VACUUM_POLL);
        }
        Ok(())
    }

    // unlink deltas upto `min_vsn` and destroy the sets of DELETE
    // entries. Safe only after both trees incorporate the deltas and
    // every client is past the barrier.
    fn delete_old_versions(&self, min_vsn: u64) -> Result<()> {
        let removed = {
            let _w = err_at!(Fatal, self.write_lock.lock())?;
            let maps = Arc::clone(&self.maps.read());

            // entries are newest first; keep the strictly newer
            // prefix and detach the rest.
            let mut kept = vec![];
            let mut cursor = maps.delta.clone();
            let removed = loop {
                match cursor {
                    Some(d) if d.vsn > min_vsn => {
                        kept.push((d.vsn, d.kind.clone()));
                        cursor = d.next.clone();
                    }
                    tail => break tail,
                }
            };

            let mut head: Option<Arc<Delta>> = None;
            for (vsn, kind) in kept.into_iter().rev() {
                head = Some(Arc::new(Delta {
                    vsn,
                    kind,
                    next: head,
                }));
            }
            *self.maps.write() = Arc::new(Maps {
                primary: Arc::clone(&maps.primary),
                primary_vsn: maps.primary_vsn,
                delta: head,
            });
            removed
        };

        // destroy outside the write mutex, file removal can be slow.
        let mut delta = removed.as_ref();
        while let Some(d) = delta {
            if let DeltaKind::Delete(handle) = &d.kind {
                reclaim_set(handle);
            }
            delta = d.next.as_ref();
        }
        Ok(())
    }
}

// delete or close the set, once it is unreachable.
fn reclaim_set(handle: &Arc<SetHandle>) {
    let res = match handle.should_delete.load(SeqCst) {
        true => handle.set().delete(),
        false => handle.set().close(),
    };
    if let Err(err) = res {
        error!(
            target: "setmgr",
            "failed to reclaim set {:?}: {}", handle.set().name(), err
        );
    }
}

fn name_to_key(name: &str) -> Vec<u8> {
    let mut key = name.as_bytes().to_vec();
    key.push(0);
    key
}

fn key_to_name(key: &[u8]) -> String {
    let name = match key.last() {
        Some(0) => &key[..key.len() - 1],
        _ => key,
    };
    String::from_utf8_lossy(name).to_string()
}

fn recover_tree(old: Arc<Radix<Arc<SetHandle>>>) -> Radix<Arc<SetHandle>> {
    // after the barrier the vacuum should hold the only reference;
    // degrade to a deep copy if a straggler still does.
    match Arc::try_unwrap(old) {
        Ok(tree) => tree,
        Err(arc) => arc.copy(),
    }
}

// discover existing sets by scanning the data directory. Not thread
// safe, assumes we are initializing.
fn load_existing_sets(config: &Arc<Config>) -> Result<Radix<Arc<SetHandle>>> {
    let mut tree = Radix::new();
    let dirs = match fs::read_dir(&config.data_dir) {
        Ok(dirs) => dirs,
        Err(err) => {
            error!(
                target: "setmgr",
                "failed to scan {:?} for existing sets: {}", config.data_dir, err
            );
            return Ok(tree);
        }
    };

    let mut count = 0;
    for entry in dirs.filter_map(|e| e.ok()) {
        let file_name = entry.file_name();
        let folder = file_name.to_string_lossy();
        let name = match folder.strip_prefix(FOLDER_PREFIX) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };
        match Set::open(Arc::clone(config), &name, false) {
            Ok(set) => {
                let handle = SetHandle::new(set, false);
                tree.insert(&name_to_key(&name), handle);
                count += 1;
            }
            Err(err) => {
                error!(target: "setmgr", "failed to load set {:?}: {}", name, err)
            }
        }
    }
    info!(target: "setmgr", "found {} existing sets", count);
    Ok(tree)
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
