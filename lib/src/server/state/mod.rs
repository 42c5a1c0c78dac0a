//! The state manager: clients, owners, opens, locks, delegations,
//! sessions, leases and grace, all held as flat maps under one
//! process-wide lock. Cross references are by key (stateid `other`,
//! `(clientid, owner)` pairs, session ids, filehandles), never by
//! pointer.

pub mod client;
pub mod delegation;
pub mod grace;
pub mod lock;
pub mod open;
pub mod persist;
pub mod session;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use moka::sync::Cache;
use rand::Rng;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use keel_proto::nfs4_proto::{
    Clientid4, NfsFh4, NfsStat4, OpenDelegationType4, SessionId4, Stateid4, Verifier4,
    NFS4_OTHER_SIZE,
};

use super::metrics::ServerMetrics;
use client::{MultiIndexClientRecordMap, MultiIndexV41ClientRecordMap};
use delegation::{DelegationRec, RecallDispatcher};
use grace::GraceState;
use lock::{LockOwnerRec, LockStateRec};
use open::{OpenOwnerRec, OpenStateRec};
use session::Session;

pub type StateidOther = [u8; NFS4_OTHER_SIZE];
pub type OwnerKey = (Clientid4, Vec<u8>);

/// Stateid type tags carried in `other[0]`.
pub const STATE_TYPE_OPEN: u8 = 0x01;
pub const STATE_TYPE_LOCK: u8 = 0x02;
pub const STATE_TYPE_DELEG: u8 = 0x03;

/// Files whose delegation was recalled recently are not re-delegated
/// until this much time has passed.
pub const RECENTLY_RECALLED_TTL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct StateConfig {
    pub lease_duration: Duration,
    pub grace_duration: Duration,
}

impl Default for StateConfig {
    fn default() -> Self {
        StateConfig {
            lease_duration: Duration::from_secs(60),
            grace_duration: Duration::from_secs(90),
        }
    }
}

pub(crate) struct StateInner {
    pub clients: MultiIndexClientRecordMap,
    pub v41_clients: MultiIndexV41ClientRecordMap,
    pub client_id_seq: u64,
    pub open_owners: HashMap<OwnerKey, OpenOwnerRec>,
    pub opens: HashMap<StateidOther, OpenStateRec>,
    pub opens_by_file: HashMap<NfsFh4, Vec<StateidOther>>,
    pub lock_owners: HashMap<OwnerKey, LockOwnerRec>,
    pub locks: HashMap<StateidOther, LockStateRec>,
    pub locks_by_file: HashMap<NfsFh4, Vec<StateidOther>>,
    pub delegations: HashMap<StateidOther, DelegationRec>,
    pub delegations_by_file: HashMap<NfsFh4, Vec<StateidOther>>,
    pub sessions: HashMap<SessionId4, Arc<Session>>,
    pub session_seq: u64,
    pub state_counters: [u64; 3],
    pub grace: GraceState,
}

impl StateInner {
    fn new() -> Self {
        StateInner {
            clients: MultiIndexClientRecordMap::default(),
            v41_clients: MultiIndexV41ClientRecordMap::default(),
            client_id_seq: 0,
            open_owners: HashMap::new(),
            opens: HashMap::new(),
            opens_by_file: HashMap::new(),
            lock_owners: HashMap::new(),
            locks: HashMap::new(),
            locks_by_file: HashMap::new(),
            delegations: HashMap::new(),
            delegations_by_file: HashMap::new(),
            sessions: HashMap::new(),
            session_seq: 0,
            state_counters: [0; 3],
            grace: GraceState::inactive(),
        }
    }
}

/// What a stateid resolved to, with what a handler needs to enforce
/// open-mode and conflict rules.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidatedState {
    /// Anonymous (all zero) or READ-bypass (all ones) special stateid.
    Special,
    Open {
        stateid: Stateid4,
        clientid: Clientid4,
        share_access: u32,
        share_deny: u32,
    },
    Lock {
        stateid: Stateid4,
        clientid: Clientid4,
        /// Share access of the open the lock state hangs off.
        share_access: u32,
    },
    Delegation {
        stateid: Stateid4,
        clientid: Clientid4,
        deleg_type: OpenDelegationType4,
    },
}

impl ValidatedState {
    pub fn clientid(&self) -> Option<Clientid4> {
        match self {
            ValidatedState::Special => None,
            ValidatedState::Open { clientid, .. }
            | ValidatedState::Lock { clientid, .. }
            | ValidatedState::Delegation { clientid, .. } => Some(*clientid),
        }
    }
}

pub struct StateManager {
    pub(crate) inner: RwLock<StateInner>,
    pub config: StateConfig,
    pub metrics: Arc<ServerMetrics>,
    started_at: Instant,
    boot_epoch: [u8; 3],
    boot_verifier: Verifier4,
    pub(crate) recently_recalled: Cache<NfsFh4, ()>,
    pub(crate) recaller: Arc<dyn RecallDispatcher>,
    pub(crate) self_ref: Weak<StateManager>,
}

impl StateManager {
    /// Builds the manager and starts its lease sweeper.
    pub fn start(
        config: StateConfig,
        recaller: Arc<dyn RecallDispatcher>,
        metrics: Arc<ServerMetrics>,
    ) -> Arc<Self> {
        let boot_secs = std::time::UNIX_EPOCH
            .elapsed()
            .unwrap_or_default()
            .as_secs();
        // low 24 bits of the boot time are the stateid epoch
        let boot_epoch = [
            ((boot_secs >> 16) & 0xff) as u8,
            ((boot_secs >> 8) & 0xff) as u8,
            (boot_secs & 0xff) as u8,
        ];
        let mut boot_verifier = [0u8; 8];
        rand::thread_rng().fill(&mut boot_verifier);

        let manager = Arc::new_cyclic(|weak: &Weak<StateManager>| StateManager {
            inner: RwLock::new(StateInner::new()),
            config,
            metrics,
            started_at: Instant::now(),
            boot_epoch,
            boot_verifier,
            recently_recalled: Cache::builder()
                .time_to_live(RECENTLY_RECALLED_TTL)
                .max_capacity(10_000)
                .build(),
            recaller,
            self_ref: weak.clone(),
        });

        let sweeper = Arc::downgrade(&manager);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                let Some(manager) = sweeper.upgrade() else {
                    break;
                };
                manager.sweep_expired_leases().await;
            }
        });

        manager
    }

    pub fn boot_verifier(&self) -> Verifier4 {
        self.boot_verifier
    }

    pub fn boot_epoch(&self) -> [u8; 3] {
        self.boot_epoch
    }

    pub(crate) fn now_millis(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub(crate) fn lease_millis(&self) -> u64 {
        self.config.lease_duration.as_millis() as u64
    }

    /// Fresh lease clock set to "renewed now".
    pub(crate) fn new_lease(&self) -> Arc<AtomicU64> {
        Arc::new(AtomicU64::new(self.now_millis()))
    }

    pub(crate) fn renew(&self, lease: &AtomicU64) {
        lease.store(self.now_millis(), Ordering::Relaxed);
    }

    pub(crate) fn lease_expired(&self, lease: &AtomicU64) -> bool {
        self.now_millis().saturating_sub(lease.load(Ordering::Relaxed)) > self.lease_millis()
    }

    /// Seconds since the lease was last renewed, for the metrics surface.
    pub async fn lease_age_seconds(&self, clientid: Clientid4) -> Option<u64> {
        let inner = self.inner.read().await;
        let millis = if let Some(client) = client::any_client(&inner.clients, clientid) {
            client.lease.load(Ordering::Relaxed)
        } else if let Some(client) = inner.v41_clients.get_by_clientid(&clientid) {
            client.lease.load(Ordering::Relaxed)
        } else {
            return None;
        };
        Some(self.now_millis().saturating_sub(millis) / 1000)
    }

    /// Mints the `other` field for a new stateid: type tag, boot epoch,
    /// then a per-type monotonic counter.
    pub(crate) fn mint_other(inner: &mut StateInner, epoch: [u8; 3], type_tag: u8) -> StateidOther {
        let slot = (type_tag - 1) as usize;
        inner.state_counters[slot] += 1;
        let counter = inner.state_counters[slot];
        let mut other = [0u8; NFS4_OTHER_SIZE];
        other[0] = type_tag;
        other[1..4].copy_from_slice(&epoch);
        other[4..12].copy_from_slice(&counter.to_be_bytes());
        other
    }

    fn epoch_of(other: &StateidOther) -> [u8; 3] {
        [other[1], other[2], other[3]]
    }

    /// Stateid validation per the protocol rules: specials pass through,
    /// wrong epoch is STALE, unknown is BAD, newer-than-current seqid is
    /// BAD, older is OLD, and the bound filehandle must match. A valid
    /// non-special stateid renews the owning client's lease.
    pub async fn validate_stateid(
        &self,
        stateid: &Stateid4,
        fh: Option<&NfsFh4>,
    ) -> Result<ValidatedState, NfsStat4> {
        if stateid.is_special() {
            return Ok(ValidatedState::Special);
        }
        if Self::epoch_of(&stateid.other) != self.boot_epoch {
            return Err(NfsStat4::Nfs4errStaleStateid);
        }

        let inner = self.inner.read().await;
        let (current_seqid, bound_fh, validated) = match stateid.other[0] {
            STATE_TYPE_OPEN => match inner.opens.get(&stateid.other) {
                Some(open) => (
                    open.seqid,
                    open.fh.clone(),
                    ValidatedState::Open {
                        stateid: Stateid4 {
                            seqid: open.seqid,
                            other: stateid.other,
                        },
                        clientid: open.clientid,
                        share_access: open.share_access,
                        share_deny: open.share_deny,
                    },
                ),
                None => return Err(NfsStat4::Nfs4errBadStateid),
            },
            STATE_TYPE_LOCK => match inner.locks.get(&stateid.other) {
                Some(lock) => {
                    let share_access = inner
                        .opens
                        .get(&lock.open_other)
                        .map(|open| open.share_access)
                        .unwrap_or(0);
                    (
                        lock.seqid,
                        lock.fh.clone(),
                        ValidatedState::Lock {
                            stateid: Stateid4 {
                                seqid: lock.seqid,
                                other: stateid.other,
                            },
                            clientid: lock.clientid,
                            share_access,
                        },
                    )
                }
                None => return Err(NfsStat4::Nfs4errBadStateid),
            },
            STATE_TYPE_DELEG => match inner.delegations.get(&stateid.other) {
                Some(deleg) if deleg.revoked => return Err(NfsStat4::Nfs4errBadStateid),
                Some(deleg) => (
                    deleg.seqid,
                    deleg.fh.clone(),
                    ValidatedState::Delegation {
                        stateid: Stateid4 {
                            seqid: deleg.seqid,
                            other: stateid.other,
                        },
                        clientid: deleg.clientid,
                        deleg_type: deleg.deleg_type,
                    },
                ),
                None => return Err(NfsStat4::Nfs4errBadStateid),
            },
            _ => return Err(NfsStat4::Nfs4errBadStateid),
        };

        // seqid 0 means "use current"
        if stateid.seqid != 0 {
            if stateid.seqid > current_seqid {
                return Err(NfsStat4::Nfs4errBadStateid);
            }
            if stateid.seqid < current_seqid {
                return Err(NfsStat4::Nfs4errOldStateid);
            }
        }

        if let Some(fh) = fh {
            if &bound_fh != fh {
                return Err(NfsStat4::Nfs4errBadStateid);
            }
        }

        if let Some(clientid) = validated.clientid() {
            self.renew_lease_locked(&inner, clientid);
        }
        Ok(validated)
    }

    /// Lease renewal under an already-held read guard.
    pub(crate) fn renew_lease_locked(&self, inner: &StateInner, clientid: Clientid4) {
        if let Some(client) = client::any_client(&inner.clients, clientid) {
            self.renew(&client.lease);
        } else if let Some(client) = inner.v41_clients.get_by_clientid(&clientid) {
            self.renew(&client.lease);
        }
    }

    pub async fn renew_lease(&self, clientid: Clientid4) -> Result<(), NfsStat4> {
        let inner = self.inner.read().await;
        if client::confirmed_client(&inner.clients, clientid).is_none()
            && inner.v41_clients.get_by_clientid(&clientid).is_none()
        {
            return Err(NfsStat4::Nfs4errStaleClientid);
        }
        self.renew_lease_locked(&inner, clientid);
        Ok(())
    }

    async fn sweep_expired_leases(&self) {
        let expired: Vec<(Clientid4, Vec<u8>)> = {
            let inner = self.inner.read().await;
            let mut expired = Vec::new();
            for (_, client) in inner.clients.iter() {
                if client.confirmed && self.lease_expired(&client.lease) {
                    expired.push((client.clientid, client.id_string.clone()));
                }
            }
            for (_, client) in inner.v41_clients.iter() {
                if client.confirmed && self.lease_expired(&client.lease) {
                    expired.push((client.clientid, client.co_ownerid.clone()));
                }
            }
            expired
        };
        for (clientid, owner_id) in expired {
            warn!(clientid, "lease expired, dismantling client state");
            self.expire_client(clientid, &owner_id).await;
        }
    }

    /// Tears down everything a client owns, in the fixed order: locks,
    /// opens, owners, then delegations (revoked). An expected client
    /// expiring during grace counts toward grace completion.
    pub async fn expire_client(&self, clientid: Clientid4, owner_id: &[u8]) {
        let mut inner = self.inner.write().await;
        Self::teardown_client_state(&mut inner, clientid, &self.recently_recalled);
        inner.clients.remove_by_clientid(&clientid);
        inner.v41_clients.remove_by_clientid(&clientid);
        let sessions: Vec<SessionId4> = inner
            .sessions
            .iter()
            .filter(|(_, s)| s.clientid == clientid)
            .map(|(id, _)| *id)
            .collect();
        for id in sessions {
            if let Some(session) = inner.sessions.remove(&id) {
                session.release_cache(&self.metrics);
            }
        }
        if inner.grace.is_active() {
            inner.grace.mark_reclaimed(owner_id);
            if inner.grace.all_reclaimed() {
                info!("all expected clients accounted for, ending grace early");
                inner.grace.end();
            }
        }
    }

    pub(crate) fn teardown_client_state(
        inner: &mut StateInner,
        clientid: Clientid4,
        recently_recalled: &Cache<NfsFh4, ()>,
    ) {
        // locks first
        let lock_ids: Vec<StateidOther> = inner
            .locks
            .iter()
            .filter(|(_, l)| l.clientid == clientid)
            .map(|(id, _)| *id)
            .collect();
        for id in lock_ids {
            if let Some(lock) = inner.locks.remove(&id) {
                if let Some(by_file) = inner.locks_by_file.get_mut(&lock.fh) {
                    by_file.retain(|other| *other != id);
                }
            }
        }
        inner.lock_owners.retain(|key, _| key.0 != clientid);

        // then opens and their owners
        let open_ids: Vec<StateidOther> = inner
            .opens
            .iter()
            .filter(|(_, o)| o.clientid == clientid)
            .map(|(id, _)| *id)
            .collect();
        for id in open_ids {
            if let Some(open) = inner.opens.remove(&id) {
                if let Some(by_file) = inner.opens_by_file.get_mut(&open.fh) {
                    by_file.retain(|other| *other != id);
                }
            }
        }
        inner.open_owners.retain(|key, _| key.0 != clientid);

        // delegations last, revoked rather than silently dropped
        let deleg_ids: Vec<StateidOther> = inner
            .delegations
            .iter()
            .filter(|(_, d)| d.clientid == clientid)
            .map(|(id, _)| *id)
            .collect();
        for id in deleg_ids {
            delegation::revoke_in_place(inner, &id, recently_recalled);
        }
        debug!(clientid, "client state dismantled");
    }

    /// All confirmed client owner ids, for the persisted reboot list.
    pub async fn persisted_client_ids(&self) -> Vec<Vec<u8>> {
        let inner = self.inner.read().await;
        let mut ids = Vec::new();
        for (_, client) in inner.clients.iter() {
            if client.confirmed {
                ids.push(client.id_string.clone());
            }
        }
        for (_, client) in inner.v41_clients.iter() {
            if client.confirmed {
                ids.push(client.co_ownerid.clone());
            }
        }
        ids.sort();
        ids.dedup();
        ids
    }

    /// Enters grace for the configured window, expecting the given
    /// clients to reclaim.
    pub async fn seed_grace(&self, expected: Vec<Vec<u8>>) {
        if expected.is_empty() {
            return;
        }
        let mut inner = self.inner.write().await;
        info!(clients = expected.len(), "entering grace period");
        inner.grace = GraceState::begin(expected, Instant::now() + self.config.grace_duration);
    }

    pub async fn in_grace(&self) -> bool {
        let mut inner = self.inner.write().await;
        inner.grace.check_active()
    }

    /// Records a finished reclaim (RECLAIM_COMPLETE, or DESTROY_CLIENTID
    /// during grace) and ends grace early once everyone reported in.
    pub async fn reclaim_finished(&self, owner_id: &[u8]) {
        let mut inner = self.inner.write().await;
        if !inner.grace.check_active() {
            return;
        }
        inner.grace.mark_reclaimed(owner_id);
        if inner.grace.all_reclaimed() {
            info!("all expected clients reclaimed, ending grace early");
            inner.grace.end();
        }
    }

    pub(crate) fn manager_arc(&self) -> Option<Arc<StateManager>> {
        self.self_ref.upgrade()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::delegation::{RecallDispatcher, RecallTarget};
    use super::*;
    use std::sync::Mutex;

    /// Records recall dispatches instead of sending them anywhere.
    #[derive(Default)]
    pub struct RecordingRecaller {
        pub recalls: Mutex<Vec<RecallTarget>>,
    }

    impl RecallDispatcher for RecordingRecaller {
        fn dispatch_recall(&self, target: RecallTarget) {
            self.recalls.lock().unwrap().push(target);
        }
    }

    pub fn test_manager() -> Arc<StateManager> {
        StateManager::start(
            StateConfig::default(),
            Arc::new(RecordingRecaller::default()),
            Arc::new(ServerMetrics::new()),
        )
    }

    pub fn test_manager_with(config: StateConfig) -> (Arc<StateManager>, Arc<RecordingRecaller>) {
        let recaller = Arc::new(RecordingRecaller::default());
        let manager = StateManager::start(config, recaller.clone(), Arc::new(ServerMetrics::new()));
        (manager, recaller)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_manager;
    use super::*;

    #[tokio::test]
    async fn minted_stateids_carry_epoch_and_type() {
        let manager = test_manager();
        let epoch = manager.boot_epoch();
        let mut inner = manager.inner.write().await;
        let open = StateManager::mint_other(&mut inner, epoch, STATE_TYPE_OPEN);
        let lock = StateManager::mint_other(&mut inner, epoch, STATE_TYPE_LOCK);
        let deleg = StateManager::mint_other(&mut inner, epoch, STATE_TYPE_DELEG);
        assert_eq!(open[0], STATE_TYPE_OPEN);
        assert_eq!(lock[0], STATE_TYPE_LOCK);
        assert_eq!(deleg[0], STATE_TYPE_DELEG);
        for other in [open, lock, deleg] {
            assert_eq!(&other[1..4], &epoch);
        }
        // counters are per type
        let open2 = StateManager::mint_other(&mut inner, epoch, STATE_TYPE_OPEN);
        assert_eq!(u64::from_be_bytes(open2[4..12].try_into().unwrap()), 2);
    }

    #[tokio::test]
    async fn special_stateids_bypass_lookup() {
        let manager = test_manager();
        let validated = manager
            .validate_stateid(&Stateid4::anonymous(), None)
            .await
            .unwrap();
        assert_eq!(validated, ValidatedState::Special);
        let validated = manager
            .validate_stateid(&Stateid4::read_bypass(), None)
            .await
            .unwrap();
        assert_eq!(validated, ValidatedState::Special);
    }

    #[tokio::test]
    async fn stale_epoch_is_stale_stateid() {
        let manager = test_manager();
        let mut other = [0u8; 12];
        other[0] = STATE_TYPE_OPEN;
        // an epoch that cannot match the current one
        other[1] = manager.boot_epoch()[0].wrapping_add(1);
        let stateid = Stateid4 { seqid: 1, other };
        assert_eq!(
            manager.validate_stateid(&stateid, None).await,
            Err(NfsStat4::Nfs4errStaleStateid)
        );
    }

    #[tokio::test]
    async fn unknown_stateid_in_current_epoch_is_bad() {
        let manager = test_manager();
        let mut other = [0u8; 12];
        other[0] = STATE_TYPE_OPEN;
        other[1..4].copy_from_slice(&manager.boot_epoch());
        other[11] = 9;
        let stateid = Stateid4 { seqid: 0, other };
        assert_eq!(
            manager.validate_stateid(&stateid, None).await,
            Err(NfsStat4::Nfs4errBadStateid)
        );
    }
}
