//! v4.1 sessions: slot tables with exactly-once execution and reply
//! caching, CREATE_SESSION negotiation and replay, connection binding.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use keel_proto::nfs41_proto::{
    BindConnToSession4resok, ChannelAttrs4, ChannelDirFromClient4, ChannelDirFromServer4,
    CreateSession4args, CreateSession4resok, Sequence4args, CREATE_SESSION4_FLAG_CONN_BACK_CHAN,
};
use keel_proto::nfs4_proto::{Clientid4, NfsStat4, SessionId4};

use super::super::metrics::{SequenceErrorKind, ServerMetrics};
use super::StateManager;

/*
 * Server-side channel limits. CREATE_SESSION clamps what the client
 * asked for to these.
 */
pub const MAX_FORE_SLOTS: u32 = 64;
pub const MAX_FORE_REQUEST: u32 = 1024 * 1024;
pub const MAX_FORE_RESPONSE: u32 = 1024 * 1024;
pub const MAX_FORE_RESPONSE_CACHED: u32 = 64 * 1024;
pub const MAX_BACK_SLOTS: u32 = 8;
pub const MAX_BACK_SIZE: u32 = 64 * 1024;
/// Also the compound op ceiling (MaxCompoundOps).
pub const MAX_OPERATIONS: u32 = 128;

#[derive(Debug, Default)]
pub struct Slot {
    pub sequenceid: u32,
    pub in_use: bool,
    pub cache_this: bool,
    pub cached_reply: Option<Vec<u8>>,
}

#[derive(Debug)]
struct SlotTable {
    slots: Vec<Slot>,
}

/// What SEQUENCE decided for this request.
#[derive(Debug)]
pub enum SequenceDisposition {
    /// New request: the slot is reserved for the caller.
    Proceed,
    /// Retry of a cached request: answer with these bytes verbatim.
    Replay(Vec<u8>),
    Reject(NfsStat4),
}

#[derive(Debug)]
pub struct Session {
    pub id: SessionId4,
    pub clientid: Clientid4,
    pub flags: u32,
    pub fore_attrs: ChannelAttrs4,
    pub back_attrs: ChannelAttrs4,
    pub cb_program: u32,
    slots: Mutex<SlotTable>,
    connections: Mutex<Vec<u64>>,
}

impl Session {
    fn new(
        id: SessionId4,
        clientid: Clientid4,
        flags: u32,
        fore_attrs: ChannelAttrs4,
        back_attrs: ChannelAttrs4,
        cb_program: u32,
    ) -> Self {
        // the slot table is sized at creation and never grows
        let count = fore_attrs.ca_maxrequests as usize;
        let mut slots = Vec::with_capacity(count);
        slots.resize_with(count, Slot::default);
        Session {
            id,
            clientid,
            flags,
            fore_attrs,
            back_attrs,
            cb_program,
            slots: Mutex::new(SlotTable { slots }),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn highest_slotid(&self) -> u32 {
        let table = self.slots.lock().unwrap();
        (table.slots.len() - 1) as u32
    }

    /// Slot sequencing: new requests reserve the slot, equal sequence
    /// ids replay or report, anything else is misordered.
    pub fn sequence(&self, args: &Sequence4args, metrics: &ServerMetrics) -> SequenceDisposition {
        metrics.sequence_seen();
        let mut table = self.slots.lock().unwrap();
        let Some(slot) = table.slots.get_mut(args.sa_slotid as usize) else {
            metrics.sequence_error(SequenceErrorKind::BadSlot);
            return SequenceDisposition::Reject(NfsStat4::Nfs4errBadslot);
        };

        if args.sa_sequenceid == slot.sequenceid.wrapping_add(1) {
            slot.sequenceid = args.sa_sequenceid;
            slot.in_use = true;
            slot.cache_this = args.sa_cachethis;
            if let Some(old) = slot.cached_reply.take() {
                metrics.cache_bytes_released(old.len());
            }
            metrics.slot_reserved();
            return SequenceDisposition::Proceed;
        }
        if args.sa_sequenceid == slot.sequenceid {
            if slot.in_use {
                // duplicate of a request still executing
                metrics.sequence_error(SequenceErrorKind::Delay);
                return SequenceDisposition::Reject(NfsStat4::Nfs4errDelay);
            }
            if let Some(reply) = &slot.cached_reply {
                metrics.replay_hit();
                return SequenceDisposition::Replay(reply.clone());
            }
            metrics.sequence_error(SequenceErrorKind::RetryUncached);
            return SequenceDisposition::Reject(NfsStat4::Nfs4errRetryUncachedRep);
        }
        metrics.sequence_error(SequenceErrorKind::Misordered);
        SequenceDisposition::Reject(NfsStat4::Nfs4errSeqMisordered)
    }

    /// Completion: release the slot and, when requested and within the
    /// negotiated bound, retain the full encoded response for replay.
    pub fn complete(&self, slotid: u32, reply: &[u8], metrics: &ServerMetrics) {
        let mut table = self.slots.lock().unwrap();
        let Some(slot) = table.slots.get_mut(slotid as usize) else {
            return;
        };
        if !slot.in_use {
            return;
        }
        slot.in_use = false;
        metrics.slot_released();
        if slot.cache_this && reply.len() <= self.fore_attrs.ca_maxresponsesize_cached as usize {
            slot.cached_reply = Some(reply.to_vec());
            metrics.cache_bytes_added(reply.len());
        }
    }

    /// Releases a reserved slot without caching, for disconnects between
    /// SEQUENCE and completion.
    pub fn abandon(&self, slotid: u32, metrics: &ServerMetrics) {
        let mut table = self.slots.lock().unwrap();
        if let Some(slot) = table.slots.get_mut(slotid as usize) {
            if slot.in_use {
                slot.in_use = false;
                metrics.slot_released();
            }
        }
    }

    /// Drops every cached reply, adjusting the byte gauge. Used when the
    /// session dies.
    pub fn release_cache(&self, metrics: &ServerMetrics) {
        let mut table = self.slots.lock().unwrap();
        for slot in &mut table.slots {
            if let Some(old) = slot.cached_reply.take() {
                metrics.cache_bytes_released(old.len());
            }
            if slot.in_use {
                slot.in_use = false;
                metrics.slot_released();
            }
        }
    }

    pub fn bind_connection(&self, conn_id: u64) {
        let mut connections = self.connections.lock().unwrap();
        if !connections.contains(&conn_id) {
            connections.push(conn_id);
        }
    }

    pub fn unbind_connection(&self, conn_id: u64) {
        self.connections.lock().unwrap().retain(|id| *id != conn_id);
    }

    pub fn is_bound(&self, conn_id: u64) -> bool {
        self.connections.lock().unwrap().contains(&conn_id)
    }

    pub fn bound_connections(&self) -> Vec<u64> {
        self.connections.lock().unwrap().clone()
    }
}

fn clamp_fore(requested: &ChannelAttrs4) -> ChannelAttrs4 {
    ChannelAttrs4 {
        ca_headerpadsize: 0,
        ca_maxrequestsize: requested.ca_maxrequestsize.min(MAX_FORE_REQUEST),
        ca_maxresponsesize: requested.ca_maxresponsesize.min(MAX_FORE_RESPONSE),
        ca_maxresponsesize_cached: requested
            .ca_maxresponsesize_cached
            .min(MAX_FORE_RESPONSE_CACHED),
        ca_maxoperations: requested.ca_maxoperations.min(MAX_OPERATIONS).max(1),
        ca_maxrequests: requested.ca_maxrequests.min(MAX_FORE_SLOTS).max(1),
        ca_rdma_ird: None,
    }
}

fn clamp_back(requested: &ChannelAttrs4) -> ChannelAttrs4 {
    ChannelAttrs4 {
        ca_headerpadsize: 0,
        ca_maxrequestsize: requested.ca_maxrequestsize.min(MAX_BACK_SIZE),
        ca_maxresponsesize: requested.ca_maxresponsesize.min(MAX_BACK_SIZE),
        ca_maxresponsesize_cached: 0,
        ca_maxoperations: requested.ca_maxoperations.min(MAX_OPERATIONS).max(1),
        ca_maxrequests: requested.ca_maxrequests.min(MAX_BACK_SLOTS).max(1),
        ca_rdma_ird: None,
    }
}

impl StateManager {
    /// CREATE_SESSION with its one-deep replay cache on the client
    /// record.
    pub async fn create_session(
        &self,
        args: &CreateSession4args,
    ) -> Result<CreateSession4resok, NfsStat4> {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.v41_clients.get_by_clientid(&args.csa_clientid).cloned() else {
            return Err(NfsStat4::Nfs4errStaleClientid);
        };

        if args.csa_sequence == record.sequenceid.wrapping_sub(1) {
            // retry of the previous CREATE_SESSION
            if let Some((cached_seq, cached)) = &record.cached_create_session {
                if *cached_seq == args.csa_sequence {
                    debug!(clientid = record.clientid, "CREATE_SESSION replay");
                    return Ok(cached.clone());
                }
            }
            return Err(NfsStat4::Nfs4errSeqMisordered);
        }
        if args.csa_sequence != record.sequenceid {
            return Err(NfsStat4::Nfs4errSeqMisordered);
        }

        let fore_attrs = clamp_fore(&args.csa_fore_chan_attrs);
        let back_attrs = clamp_back(&args.csa_back_chan_attrs);
        // no reply-cache persistence, no RDMA
        let flags = args.csa_flags & CREATE_SESSION4_FLAG_CONN_BACK_CHAN;

        inner.session_seq += 1;
        let mut id: SessionId4 = [0u8; 16];
        id[..8].copy_from_slice(&self.boot_verifier());
        id[8..].copy_from_slice(&inner.session_seq.to_be_bytes());

        let session = Arc::new(Session::new(
            id,
            record.clientid,
            flags,
            fore_attrs,
            back_attrs,
            args.csa_cb_program,
        ));
        inner.sessions.insert(id, session);

        let resok = CreateSession4resok {
            csr_sessionid: id,
            csr_sequence: args.csa_sequence,
            csr_flags: flags,
            csr_fore_chan_attrs: fore_attrs,
            csr_back_chan_attrs: back_attrs,
        };

        inner.v41_clients.modify_by_clientid(&record.clientid, |c| {
            c.confirmed = true;
            c.sequenceid = c.sequenceid.wrapping_add(1);
            c.cached_create_session = Some((args.csa_sequence, resok.clone()));
        });
        self.renew(&record.lease);
        if flags & CREATE_SESSION4_FLAG_CONN_BACK_CHAN != 0 {
            // the backchannel rides the fore connection; the path is
            // proven as soon as that connection is bound
            record.cb_path_up.store(true, Ordering::Relaxed);
        }
        info!(clientid = record.clientid, "session created");
        Ok(resok)
    }

    pub async fn session_for(&self, id: &SessionId4) -> Option<Arc<Session>> {
        let inner = self.inner.read().await;
        inner.sessions.get(id).cloned()
    }

    pub async fn destroy_session(&self, id: &SessionId4) -> Result<(), NfsStat4> {
        let mut inner = self.inner.write().await;
        match inner.sessions.remove(id) {
            Some(session) => {
                session.release_cache(&self.metrics);
                info!(clientid = session.clientid, "session destroyed");
                Ok(())
            }
            None => Err(NfsStat4::Nfs4errBadsession),
        }
    }

    /// BIND_CONN_TO_SESSION with the generous direction policy: anything
    /// that may carry both directions gets both.
    pub async fn bind_conn_to_session(
        &self,
        id: &SessionId4,
        dir: ChannelDirFromClient4,
        conn_id: u64,
    ) -> Result<BindConnToSession4resok, NfsStat4> {
        let inner = self.inner.read().await;
        let Some(session) = inner.sessions.get(id) else {
            return Err(NfsStat4::Nfs4errBadsession);
        };
        session.bind_connection(conn_id);
        self.renew_lease_locked(&inner, session.clientid);
        let granted = match dir {
            ChannelDirFromClient4::Fore => ChannelDirFromServer4::Fore,
            ChannelDirFromClient4::Back => ChannelDirFromServer4::Back,
            ChannelDirFromClient4::ForeOrBoth | ChannelDirFromClient4::BackOrBoth => {
                ChannelDirFromServer4::Both
            }
        };
        Ok(BindConnToSession4resok {
            bctsr_sessid: *id,
            bctsr_dir: granted,
            bctsr_use_conn_in_rdma_mode: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_manager;
    use super::*;
    use keel_proto::nfs41_proto::{ClientOwner4, ExchangeId4args, StateProtect4A};

    async fn v41_client(manager: &StateManager, owner: &[u8]) -> Clientid4 {
        let args = ExchangeId4args {
            eia_clientowner: ClientOwner4 {
                co_verifier: [5; 8],
                co_ownerid: owner.to_vec(),
            },
            eia_flags: 0,
            eia_state_protect: StateProtect4A::None,
            eia_client_impl_id: None,
        };
        manager.exchange_id(&args).await.unwrap().0
    }

    fn session_args(clientid: Clientid4, sequence: u32) -> CreateSession4args {
        CreateSession4args {
            csa_clientid: clientid,
            csa_sequence: sequence,
            csa_flags: 0,
            csa_fore_chan_attrs: ChannelAttrs4 {
                ca_headerpadsize: 0,
                ca_maxrequestsize: 8 * 1024 * 1024,
                ca_maxresponsesize: 8 * 1024 * 1024,
                ca_maxresponsesize_cached: 1024 * 1024,
                ca_maxoperations: 1024,
                ca_maxrequests: 1024,
                ca_rdma_ird: None,
            },
            csa_back_chan_attrs: ChannelAttrs4::default(),
            csa_cb_program: 0x40000000,
            csa_sec_parms: vec![],
        }
    }

    fn sequence_args(session: &Session, slot: u32, seq: u32, cache: bool) -> Sequence4args {
        Sequence4args {
            sa_sessionid: session.id,
            sa_sequenceid: seq,
            sa_slotid: slot,
            sa_highest_slotid: session.highest_slotid(),
            sa_cachethis: cache,
        }
    }

    #[tokio::test]
    async fn create_session_clamps_channel_attrs() {
        let manager = test_manager();
        let clientid = v41_client(&manager, b"owner-cs").await;
        let resok = manager
            .create_session(&session_args(clientid, 1))
            .await
            .unwrap();
        assert_eq!(resok.csr_fore_chan_attrs.ca_maxrequests, MAX_FORE_SLOTS);
        assert_eq!(
            resok.csr_fore_chan_attrs.ca_maxresponsesize_cached,
            MAX_FORE_RESPONSE_CACHED
        );
        assert_eq!(resok.csr_fore_chan_attrs.ca_maxoperations, MAX_OPERATIONS);
        assert_eq!(resok.csr_sequence, 1);
    }

    #[tokio::test]
    async fn create_session_replay_and_misorder() {
        let manager = test_manager();
        let clientid = v41_client(&manager, b"owner-replay").await;
        let first = manager
            .create_session(&session_args(clientid, 1))
            .await
            .unwrap();

        // same sequence: replayed byte-for-byte (same resok)
        let replay = manager
            .create_session(&session_args(clientid, 1))
            .await
            .unwrap();
        assert_eq!(first, replay);

        // next sequence: a fresh session
        let second = manager
            .create_session(&session_args(clientid, 2))
            .await
            .unwrap();
        assert_ne!(first.csr_sessionid, second.csr_sessionid);

        // anything else: misordered
        assert_eq!(
            manager
                .create_session(&session_args(clientid, 9))
                .await
                .unwrap_err(),
            NfsStat4::Nfs4errSeqMisordered
        );
    }

    #[tokio::test]
    async fn slot_sequencing_rules() {
        let manager = test_manager();
        let clientid = v41_client(&manager, b"owner-slots").await;
        let resok = manager
            .create_session(&session_args(clientid, 1))
            .await
            .unwrap();
        let session = manager.session_for(&resok.csr_sessionid).await.unwrap();
        let metrics = manager.metrics.clone();

        // new request reserves the slot
        let disposition = session.sequence(&sequence_args(&session, 0, 1, true), &metrics);
        assert!(matches!(disposition, SequenceDisposition::Proceed));

        // duplicate while executing: DELAY
        let disposition = session.sequence(&sequence_args(&session, 0, 1, true), &metrics);
        match disposition {
            SequenceDisposition::Reject(status) => {
                assert_eq!(status, NfsStat4::Nfs4errDelay)
            }
            other => panic!("unexpected: {:?}", other),
        }

        session.complete(0, b"full-response-bytes", &metrics);

        // retry now replays the cached bytes verbatim
        let disposition = session.sequence(&sequence_args(&session, 0, 1, true), &metrics);
        match disposition {
            SequenceDisposition::Replay(bytes) => assert_eq!(bytes, b"full-response-bytes"),
            other => panic!("unexpected: {:?}", other),
        }

        // a jump is misordered
        let disposition = session.sequence(&sequence_args(&session, 0, 5, false), &metrics);
        match disposition {
            SequenceDisposition::Reject(status) => {
                assert_eq!(status, NfsStat4::Nfs4errSeqMisordered)
            }
            other => panic!("unexpected: {:?}", other),
        }

        // unknown slot
        let disposition = session.sequence(
            &Sequence4args {
                sa_sessionid: session.id,
                sa_sequenceid: 1,
                sa_slotid: 10_000,
                sa_highest_slotid: 0,
                sa_cachethis: false,
            },
            &metrics,
        );
        match disposition {
            SequenceDisposition::Reject(status) => {
                assert_eq!(status, NfsStat4::Nfs4errBadslot)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn uncached_retry_is_reported() {
        let manager = test_manager();
        let clientid = v41_client(&manager, b"owner-uncached").await;
        let resok = manager
            .create_session(&session_args(clientid, 1))
            .await
            .unwrap();
        let session = manager.session_for(&resok.csr_sessionid).await.unwrap();
        let metrics = manager.metrics.clone();

        let disposition = session.sequence(&sequence_args(&session, 2, 1, false), &metrics);
        assert!(matches!(disposition, SequenceDisposition::Proceed));
        session.complete(2, b"whatever", &metrics);

        let disposition = session.sequence(&sequence_args(&session, 2, 1, false), &metrics);
        match disposition {
            SequenceDisposition::Reject(status) => {
                assert_eq!(status, NfsStat4::Nfs4errRetryUncachedRep)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn abandoned_slot_is_released_without_caching() {
        let manager = test_manager();
        let clientid = v41_client(&manager, b"owner-abandon").await;
        let resok = manager
            .create_session(&session_args(clientid, 1))
            .await
            .unwrap();
        let session = manager.session_for(&resok.csr_sessionid).await.unwrap();
        let metrics = manager.metrics.clone();

        assert!(matches!(
            session.sequence(&sequence_args(&session, 0, 1, true), &metrics),
            SequenceDisposition::Proceed
        ));
        // the connection died before completion
        session.abandon(0, &metrics);
        assert_eq!(
            metrics
                .slots_in_use
                .load(std::sync::atomic::Ordering::Relaxed),
            0
        );

        // the retry finds no cached reply, the next sequence proceeds
        let disposition = session.sequence(&sequence_args(&session, 0, 1, true), &metrics);
        assert!(matches!(
            disposition,
            SequenceDisposition::Reject(NfsStat4::Nfs4errRetryUncachedRep)
        ));
        let disposition = session.sequence(&sequence_args(&session, 0, 2, false), &metrics);
        assert!(matches!(disposition, SequenceDisposition::Proceed));
        session.complete(0, b"x", &metrics);
    }

    #[tokio::test]
    async fn destroy_session_releases_cache_bytes() {
        let manager = test_manager();
        let clientid = v41_client(&manager, b"owner-destroy").await;
        let resok = manager
            .create_session(&session_args(clientid, 1))
            .await
            .unwrap();
        let session = manager.session_for(&resok.csr_sessionid).await.unwrap();
        let metrics = manager.metrics.clone();

        assert!(matches!(
            session.sequence(&sequence_args(&session, 0, 1, true), &metrics),
            SequenceDisposition::Proceed
        ));
        session.complete(0, b"cached", &metrics);
        assert_eq!(
            metrics
                .replay_cache_bytes
                .load(std::sync::atomic::Ordering::Relaxed),
            6
        );

        manager.destroy_session(&resok.csr_sessionid).await.unwrap();
        assert_eq!(
            metrics
                .replay_cache_bytes
                .load(std::sync::atomic::Ordering::Relaxed),
            0
        );
        assert!(manager.session_for(&resok.csr_sessionid).await.is_none());
    }

    #[tokio::test]
    async fn bind_conn_generous_direction() {
        let manager = test_manager();
        let clientid = v41_client(&manager, b"owner-bind").await;
        let resok = manager
            .create_session(&session_args(clientid, 1))
            .await
            .unwrap();

        let bound = manager
            .bind_conn_to_session(&resok.csr_sessionid, ChannelDirFromClient4::ForeOrBoth, 7)
            .await
            .unwrap();
        assert!(matches!(bound.bctsr_dir, ChannelDirFromServer4::Both));

        let session = manager.session_for(&resok.csr_sessionid).await.unwrap();
        assert!(session.is_bound(7));
        assert!(!session.is_bound(8));
    }
}
