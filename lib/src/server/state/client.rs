//! Client records for both minor versions: the SETCLIENTID /
//! SETCLIENTID_CONFIRM handshake of v4.0 and the EXCHANGE_ID path of
//! v4.1.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use multi_index_map::MultiIndexMap;
use rand::Rng;
use tracing::debug;

use keel_proto::nfs41_proto::{
    ExchangeId4args, NfsImplId4, StateProtect4A, EXCHGID4_FLAG_CONFIRMED_R,
    EXCHGID4_FLAG_USE_NON_PNFS,
};
use keel_proto::nfs4_proto::{Clientid4, NfsStat4, Verifier4};

use super::{StateInner, StateManager};

/// Callback contact information a v4.0 client registered.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientCallback {
    pub program: u32,
    pub rnetid: String,
    pub raddr: String,
    pub callback_ident: u32,
}

// https://datatracker.ietf.org/doc/html/rfc7530#section-16.33.5
#[derive(MultiIndexMap, Debug, Clone)]
#[multi_index_derive(Debug, Clone)]
pub struct ClientRecord {
    // https://datatracker.ietf.org/doc/html/rfc7530#section-3.3.3
    #[multi_index(hashed_non_unique)]
    pub clientid: Clientid4,
    #[multi_index(hashed_non_unique)]
    pub id_string: Vec<u8>,
    pub verifier: Verifier4,
    pub callback: ClientCallback,
    #[multi_index(hashed_unique)]
    pub setclientid_confirm: Verifier4,
    pub confirmed: bool,
    pub principal: Option<String>,
    /// Supplementary groups captured from the AUTH_SYS credential.
    pub groups: Vec<u32>,
    /// Milliseconds-since-boot of the last lease renewal.
    pub lease: Arc<AtomicU64>,
    /// Set once an asynchronous CB_NULL probe succeeded.
    pub cb_path_up: Arc<AtomicBool>,
}

#[derive(MultiIndexMap, Debug, Clone)]
#[multi_index_derive(Debug, Clone)]
pub struct V41ClientRecord {
    #[multi_index(hashed_unique)]
    pub clientid: Clientid4,
    #[multi_index(hashed_unique)]
    pub co_ownerid: Vec<u8>,
    pub verifier: Verifier4,
    /// Expected csa_sequence of the next CREATE_SESSION.
    pub sequenceid: u32,
    pub confirmed: bool,
    pub impl_id: Option<NfsImplId4>,
    /// Replay cache for CREATE_SESSION: the sequence it answered and the
    /// result it produced.
    pub cached_create_session: Option<(u32, keel_proto::nfs41_proto::CreateSession4resok)>,
    pub lease: Arc<AtomicU64>,
    pub cb_path_up: Arc<AtomicBool>,
    pub reclaim_complete: bool,
}

/// The confirmed record for a v4.0 clientid, if any.
pub(crate) fn confirmed_client(
    map: &MultiIndexClientRecordMap,
    clientid: Clientid4,
) -> Option<&ClientRecord> {
    map.get_by_clientid(&clientid)
        .into_iter()
        .find(|record| record.confirmed)
}

/// Any record for a v4.0 clientid, preferring the confirmed one.
pub(crate) fn any_client(
    map: &MultiIndexClientRecordMap,
    clientid: Clientid4,
) -> Option<&ClientRecord> {
    let records = map.get_by_clientid(&clientid);
    records
        .iter()
        .find(|record| record.confirmed)
        .copied()
        .or_else(|| records.into_iter().next())
}

/// What SETCLIENTID hands back to its caller.
#[derive(Clone, Debug)]
pub struct UpsertedClient {
    pub clientid: Clientid4,
    pub setclientid_confirm: Verifier4,
}

/// What SETCLIENTID_CONFIRM hands back, enough to launch the CB_NULL
/// probe without holding the state lock.
#[derive(Clone, Debug)]
pub struct ConfirmedClient {
    pub clientid: Clientid4,
    pub callback: ClientCallback,
    pub cb_path_up: Arc<AtomicBool>,
}

impl StateManager {
    /// SETCLIENTID: record an unconfirmed client, replacing any previous
    /// unconfirmed record for the same id string.
    pub async fn upsert_client(
        &self,
        verifier: Verifier4,
        id_string: Vec<u8>,
        callback: ClientCallback,
        principal: Option<String>,
        groups: Vec<u32>,
    ) -> Result<UpsertedClient, NfsStat4> {
        let mut inner = self.inner.write().await;
        let entries: Vec<ClientRecord> = inner
            .clients
            .get_by_id_string(&id_string)
            .into_iter()
            .cloned()
            .collect();
        let mut existing_clientid = None;
        for entry in &entries {
            if entry.confirmed && entry.principal != principal {
                // For any confirmed record with the same id string x, if
                // the recorded principal does not match that of the
                // SETCLIENTID call, the server returns NFS4ERR_CLID_INUSE.
                return Err(NfsStat4::Nfs4errClidInuse);
            }
            existing_clientid = Some(entry.clientid);
        }
        for entry in entries.iter().filter(|e| !e.confirmed) {
            inner
                .clients
                .remove_by_setclientid_confirm(&entry.setclientid_confirm);
        }

        let clientid = existing_clientid.unwrap_or_else(|| {
            inner.client_id_seq += 1;
            inner.client_id_seq
        });
        let mut setclientid_confirm = [0u8; 8];
        rand::thread_rng().fill(&mut setclientid_confirm);

        let record = ClientRecord {
            clientid,
            id_string,
            verifier,
            callback,
            setclientid_confirm,
            confirmed: false,
            principal,
            groups,
            lease: self.new_lease(),
            cb_path_up: Arc::new(AtomicBool::new(false)),
        };
        inner.clients.insert(record);
        debug!(clientid, "recorded unconfirmed client");
        Ok(UpsertedClient {
            clientid,
            setclientid_confirm,
        })
    }

    /// SETCLIENTID_CONFIRM: flip the matching record to confirmed and
    /// drop a superseded confirmed record for the same id string.
    pub async fn confirm_client(
        &self,
        clientid: Clientid4,
        setclientid_confirm: Verifier4,
        principal: Option<String>,
    ) -> Result<ConfirmedClient, NfsStat4> {
        let mut inner = self.inner.write().await;
        let entries: Vec<ClientRecord> = inner
            .clients
            .get_by_clientid(&clientid)
            .into_iter()
            .cloned()
            .collect();
        if entries.is_empty() {
            return Err(NfsStat4::Nfs4errStaleClientid);
        }

        let mut old_confirmed = None;
        let mut matching = None;
        for entry in &entries {
            if entry.principal != principal {
                return Err(NfsStat4::Nfs4errClidInuse);
            }
            if entry.confirmed && entry.setclientid_confirm != setclientid_confirm {
                old_confirmed = Some(entry.setclientid_confirm);
            }
            if entry.setclientid_confirm == setclientid_confirm {
                matching = Some(entry.clone());
            }
        }

        let Some(record) = matching else {
            return Err(NfsStat4::Nfs4errStaleClientid);
        };
        if let Some(stale) = old_confirmed {
            inner.clients.remove_by_setclientid_confirm(&stale);
        }
        inner
            .clients
            .modify_by_setclientid_confirm(&setclientid_confirm, |c| {
                c.confirmed = true;
            });
        self.renew(&record.lease);
        Ok(ConfirmedClient {
            clientid,
            callback: record.callback,
            cb_path_up: record.cb_path_up,
        })
    }

    /// Whether the client's callback path has been proven up.
    pub async fn cb_path_up(&self, clientid: Clientid4) -> bool {
        let inner = self.inner.read().await;
        if let Some(record) = confirmed_client(&inner.clients, clientid) {
            return record.cb_path_up.load(Ordering::Relaxed);
        }
        if let Some(record) = inner.v41_clients.get_by_clientid(&clientid) {
            return record.cb_path_up.load(Ordering::Relaxed);
        }
        false
    }

    /// The callback contact of a confirmed v4.0 client.
    pub async fn client_callback(&self, clientid: Clientid4) -> Option<ClientCallback> {
        let inner = self.inner.read().await;
        confirmed_client(&inner.clients, clientid).map(|record| record.callback.clone())
    }

    /// The supplementary group list a confirmed client registered.
    pub async fn client_groups(&self, clientid: Clientid4) -> Vec<u32> {
        let inner = self.inner.read().await;
        confirmed_client(&inner.clients, clientid)
            .map(|record| record.groups.clone())
            .unwrap_or_default()
    }

    /// EXCHANGE_ID: resolve or create the v4.1 client record.
    pub async fn exchange_id(
        &self,
        args: &ExchangeId4args,
    ) -> Result<(Clientid4, u32, u32, Arc<AtomicBool>), NfsStat4> {
        if !matches!(args.eia_state_protect, StateProtect4A::None) {
            return Err(NfsStat4::Nfs4errNotsupp);
        }
        let mut inner = self.inner.write().await;
        let existing = inner
            .v41_clients
            .get_by_co_ownerid(&args.eia_clientowner.co_ownerid)
            .cloned();
        match existing {
            Some(record) if record.verifier == args.eia_clientowner.co_verifier => {
                let mut flags = EXCHGID4_FLAG_USE_NON_PNFS;
                if record.confirmed {
                    flags |= EXCHGID4_FLAG_CONFIRMED_R;
                }
                self.renew(&record.lease);
                Ok((
                    record.clientid,
                    record.sequenceid,
                    flags,
                    record.cb_path_up,
                ))
            }
            Some(record) => {
                // new incarnation of the same owner: the old instance's
                // state is gone
                debug!(clientid = record.clientid, "client rebooted, resetting state");
                Self::teardown_client_state(&mut inner, record.clientid, &self.recently_recalled);
                let sessions: Vec<_> = inner
                    .sessions
                    .iter()
                    .filter(|(_, s)| s.clientid == record.clientid)
                    .map(|(id, _)| *id)
                    .collect();
                for id in sessions {
                    if let Some(session) = inner.sessions.remove(&id) {
                        session.release_cache(&self.metrics);
                    }
                }
                inner.v41_clients.remove_by_clientid(&record.clientid);
                let created = self.insert_v41_client(&mut inner, args);
                Ok((created.clientid, created.sequenceid, EXCHGID4_FLAG_USE_NON_PNFS, created.cb_path_up))
            }
            None => {
                let created = self.insert_v41_client(&mut inner, args);
                Ok((created.clientid, created.sequenceid, EXCHGID4_FLAG_USE_NON_PNFS, created.cb_path_up))
            }
        }
    }

    fn insert_v41_client(&self, inner: &mut StateInner, args: &ExchangeId4args) -> V41ClientRecord {
        inner.client_id_seq += 1;
        let record = V41ClientRecord {
            clientid: inner.client_id_seq,
            co_ownerid: args.eia_clientowner.co_ownerid.clone(),
            verifier: args.eia_clientowner.co_verifier,
            sequenceid: 1,
            confirmed: false,
            impl_id: args.eia_client_impl_id.clone(),
            cached_create_session: None,
            lease: self.new_lease(),
            cb_path_up: Arc::new(AtomicBool::new(false)),
            reclaim_complete: false,
        };
        inner.v41_clients.insert(record.clone());
        debug!(clientid = record.clientid, "recorded v4.1 client");
        record
    }

    /// RECLAIM_COMPLETE bookkeeping on the client record. A second
    /// completion is an error.
    pub async fn mark_reclaim_complete(&self, clientid: Clientid4) -> Result<Vec<u8>, NfsStat4> {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.v41_clients.get_by_clientid(&clientid).cloned() else {
            return Err(NfsStat4::Nfs4errStaleClientid);
        };
        if record.reclaim_complete {
            return Err(NfsStat4::Nfs4errCompleteAlready);
        }
        inner
            .v41_clients
            .modify_by_clientid(&clientid, |c| c.reclaim_complete = true);
        self.renew(&record.lease);
        Ok(record.co_ownerid)
    }

    /// DESTROY_CLIENTID. Busy clients (sessions or state) are refused.
    pub async fn destroy_clientid(&self, clientid: Clientid4) -> Result<Vec<u8>, NfsStat4> {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.v41_clients.get_by_clientid(&clientid).cloned() else {
            return Err(NfsStat4::Nfs4errStaleClientid);
        };
        if inner.sessions.values().any(|s| s.clientid == clientid) {
            return Err(NfsStat4::Nfs4errClientidBusy);
        }
        let has_state = inner.opens.values().any(|o| o.clientid == clientid)
            || inner.locks.values().any(|l| l.clientid == clientid)
            || inner
                .delegations
                .values()
                .any(|d| d.clientid == clientid && !d.revoked);
        if has_state {
            return Err(NfsStat4::Nfs4errClientidBusy);
        }
        inner.v41_clients.remove_by_clientid(&clientid);
        Ok(record.co_ownerid)
    }

    /// v4.0 client count is part of the destroy/expiry tests' surface.
    pub async fn client_record_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.clients.len() + inner.v41_clients.len()
    }
}
