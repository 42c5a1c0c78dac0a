//! Open owners and open states: share reservations, the per-owner seqid
//! discipline of v4.0, OPEN_CONFIRM, OPEN_DOWNGRADE and CLOSE.

use tracing::debug;

use keel_proto::nfs4_proto::{Clientid4, NfsFh4, NfsStat4, Stateid4};

use super::client::{any_client, confirmed_client};
use super::{OwnerKey, StateManager, StateidOther, STATE_TYPE_OPEN};

#[derive(Clone, Debug)]
pub struct OpenOwnerRec {
    pub clientid: Clientid4,
    pub owner: Vec<u8>,
    /// Per-owner sequence number; v4.1 compounds bypass it.
    pub seqid: u32,
    /// First OPEN on a fresh owner must be confirmed before use.
    pub confirmed: bool,
    pub opens: Vec<StateidOther>,
}

#[derive(Clone, Debug)]
pub struct OpenStateRec {
    pub other: StateidOther,
    pub seqid: u32,
    pub clientid: Clientid4,
    pub owner_key: OwnerKey,
    pub fh: NfsFh4,
    pub share_access: u32,
    pub share_deny: u32,
    pub locks: Vec<StateidOther>,
}

/// Inputs of the state-manager half of OPEN.
#[derive(Clone, Debug)]
pub struct OpenParams {
    pub clientid: Clientid4,
    pub owner: Vec<u8>,
    pub seqid: u32,
    pub skip_owner_seqid: bool,
    pub fh: NfsFh4,
    pub share_access: u32,
    pub share_deny: u32,
    pub reclaim: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenGrant {
    pub stateid: Stateid4,
    pub confirm_required: bool,
}

impl StateManager {
    /// Allocates (or upgrades) the open state for `(owner, fh)` after the
    /// share-reservation check. The caller has already resolved the file
    /// and delegation conflicts.
    pub async fn register_open(&self, params: OpenParams) -> Result<OpenGrant, NfsStat4> {
        let mut inner = self.inner.write().await;

        let grace_active = inner.grace.check_active();
        if grace_active && !params.reclaim {
            return Err(NfsStat4::Nfs4errGrace);
        }
        if !grace_active && params.reclaim {
            return Err(NfsStat4::Nfs4errNoGrace);
        }

        if confirmed_client(&inner.clients, params.clientid).is_none()
            && inner.v41_clients.get_by_clientid(&params.clientid).is_none()
        {
            // unconfirmed v4.0 clients may not open
            if any_client(&inner.clients, params.clientid).is_some() {
                return Err(NfsStat4::Nfs4errBadStateid);
            }
            return Err(NfsStat4::Nfs4errStaleClientid);
        }
        self.renew_lease_locked(&inner, params.clientid);

        let owner_key: OwnerKey = (params.clientid, params.owner.clone());

        // per-owner seqid discipline (v4.0 only)
        let confirm_required;
        match inner.open_owners.get_mut(&owner_key) {
            Some(owner) => {
                if !params.skip_owner_seqid {
                    if params.seqid != owner.seqid.wrapping_add(1) {
                        return Err(NfsStat4::Nfs4errBadSeqid);
                    }
                    owner.seqid = params.seqid;
                }
                confirm_required = !owner.confirmed && !params.skip_owner_seqid;
            }
            None => {
                let owner = OpenOwnerRec {
                    clientid: params.clientid,
                    owner: params.owner.clone(),
                    seqid: params.seqid,
                    confirmed: params.skip_owner_seqid,
                    opens: Vec::new(),
                };
                confirm_required = !owner.confirmed;
                inner.open_owners.insert(owner_key.clone(), owner);
            }
        }

        // share reservation check against every other open of the file
        let existing = inner
            .opens_by_file
            .get(&params.fh)
            .cloned()
            .unwrap_or_default();
        for other in &existing {
            let Some(open) = inner.opens.get(other) else {
                continue;
            };
            if open.owner_key == owner_key {
                continue;
            }
            if (params.share_access & open.share_deny) != 0
                || (params.share_deny & open.share_access) != 0
            {
                debug!(?owner_key, "share reservation conflict");
                return Err(NfsStat4::Nfs4errShareDenied);
            }
        }

        // same owner re-opening the file upgrades the existing state
        let upgraded = existing.iter().find_map(|other| {
            inner
                .opens
                .get(other)
                .filter(|open| open.owner_key == owner_key)
                .map(|open| open.other)
        });
        if let Some(other) = upgraded {
            let open = inner.opens.get_mut(&other).unwrap();
            open.share_access |= params.share_access;
            open.share_deny |= params.share_deny;
            open.seqid += 1;
            let stateid = Stateid4 {
                seqid: open.seqid,
                other,
            };
            return Ok(OpenGrant {
                stateid,
                confirm_required,
            });
        }

        let other = Self::mint_other(&mut inner, self.boot_epoch(), STATE_TYPE_OPEN);
        let open = OpenStateRec {
            other,
            seqid: 1,
            clientid: params.clientid,
            owner_key: owner_key.clone(),
            fh: params.fh.clone(),
            share_access: params.share_access,
            share_deny: params.share_deny,
            locks: Vec::new(),
        };
        inner.opens.insert(other, open);
        inner
            .opens_by_file
            .entry(params.fh)
            .or_default()
            .push(other);
        inner
            .open_owners
            .get_mut(&owner_key)
            .unwrap()
            .opens
            .push(other);

        Ok(OpenGrant {
            stateid: Stateid4 { seqid: 1, other },
            confirm_required,
        })
    }

    /// OPEN_CONFIRM: first use of a fresh open owner.
    pub async fn confirm_open(
        &self,
        stateid: &Stateid4,
        seqid: u32,
    ) -> Result<Stateid4, NfsStat4> {
        let mut inner = self.inner.write().await;
        let Some(open) = inner.opens.get(&stateid.other).map(|o| o.clone()) else {
            return Err(NfsStat4::Nfs4errBadStateid);
        };
        if stateid.seqid != 0 && stateid.seqid != open.seqid {
            return Err(if stateid.seqid < open.seqid {
                NfsStat4::Nfs4errOldStateid
            } else {
                NfsStat4::Nfs4errBadStateid
            });
        }
        let Some(owner) = inner.open_owners.get_mut(&open.owner_key) else {
            return Err(NfsStat4::Nfs4errBadStateid);
        };
        if seqid != owner.seqid.wrapping_add(1) {
            return Err(NfsStat4::Nfs4errBadSeqid);
        }
        owner.seqid = seqid;
        owner.confirmed = true;
        let rec = inner.opens.get_mut(&stateid.other).unwrap();
        rec.seqid += 1;
        let confirmed = Stateid4 {
            seqid: rec.seqid,
            other: rec.other,
        };
        self.renew_lease_locked(&inner, open.clientid);
        Ok(confirmed)
    }

    /// OPEN_DOWNGRADE: shrink the share bits to a subset of the current
    /// reservation.
    pub async fn downgrade_open(
        &self,
        stateid: &Stateid4,
        seqid: u32,
        share_access: u32,
        share_deny: u32,
        skip_owner_seqid: bool,
    ) -> Result<Stateid4, NfsStat4> {
        let mut inner = self.inner.write().await;
        let Some(open) = inner.opens.get(&stateid.other).map(|o| o.clone()) else {
            return Err(NfsStat4::Nfs4errBadStateid);
        };
        if stateid.seqid != 0 && stateid.seqid != open.seqid {
            return Err(if stateid.seqid < open.seqid {
                NfsStat4::Nfs4errOldStateid
            } else {
                NfsStat4::Nfs4errBadStateid
            });
        }
        if share_access == 0
            || (share_access & !open.share_access) != 0
            || (share_deny & !open.share_deny) != 0
        {
            return Err(NfsStat4::Nfs4errInval);
        }
        if !skip_owner_seqid {
            let Some(owner) = inner.open_owners.get_mut(&open.owner_key) else {
                return Err(NfsStat4::Nfs4errBadStateid);
            };
            if seqid != owner.seqid.wrapping_add(1) {
                return Err(NfsStat4::Nfs4errBadSeqid);
            }
            owner.seqid = seqid;
        }
        let rec = inner.opens.get_mut(&stateid.other).unwrap();
        rec.share_access = share_access;
        rec.share_deny = share_deny;
        rec.seqid += 1;
        let downgraded = Stateid4 {
            seqid: rec.seqid,
            other: rec.other,
        };
        self.renew_lease_locked(&inner, open.clientid);
        Ok(downgraded)
    }

    /// CLOSE: release the open and its share reservation. Lock states
    /// opened through it are released with it.
    pub async fn close_open(
        &self,
        stateid: &Stateid4,
        seqid: u32,
        skip_owner_seqid: bool,
    ) -> Result<(), NfsStat4> {
        let mut inner = self.inner.write().await;
        let Some(open) = inner.opens.get(&stateid.other).map(|o| o.clone()) else {
            return Err(NfsStat4::Nfs4errBadStateid);
        };
        if stateid.seqid != 0 && stateid.seqid != open.seqid {
            return Err(if stateid.seqid < open.seqid {
                NfsStat4::Nfs4errOldStateid
            } else {
                NfsStat4::Nfs4errBadStateid
            });
        }
        if !skip_owner_seqid {
            let Some(owner) = inner.open_owners.get_mut(&open.owner_key) else {
                return Err(NfsStat4::Nfs4errBadStateid);
            };
            if seqid != owner.seqid.wrapping_add(1) {
                return Err(NfsStat4::Nfs4errBadSeqid);
            }
            owner.seqid = seqid;
        }

        for lock_other in &open.locks {
            if let Some(lock) = inner.locks.remove(lock_other) {
                if let Some(by_file) = inner.locks_by_file.get_mut(&lock.fh) {
                    by_file.retain(|other| other != lock_other);
                }
                if let Some(owner) = inner.lock_owners.get_mut(&lock.owner_key) {
                    owner.locks.retain(|other| other != lock_other);
                }
            }
        }
        inner.opens.remove(&stateid.other);
        if let Some(by_file) = inner.opens_by_file.get_mut(&open.fh) {
            by_file.retain(|other| *other != stateid.other);
        }
        if let Some(owner) = inner.open_owners.get_mut(&open.owner_key) {
            owner.opens.retain(|other| *other != stateid.other);
        }
        self.renew_lease_locked(&inner, open.clientid);
        debug!(clientid = open.clientid, "open closed");
        Ok(())
    }

    /// Whether any open of `fh` by a client other than `clientid` exists.
    pub(crate) async fn file_opened_by_others(
        &self,
        fh: &NfsFh4,
        clientid: Clientid4,
    ) -> bool {
        let inner = self.inner.read().await;
        inner
            .opens_by_file
            .get(fh)
            .map(|ids| {
                ids.iter().any(|other| {
                    inner
                        .opens
                        .get(other)
                        .map(|open| open.clientid != clientid)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::super::client::ClientCallback;
    use super::super::StateManager;
    use keel_proto::nfs4_proto::Clientid4;

    pub async fn confirmed_v40_client(manager: &StateManager, id: &[u8]) -> Clientid4 {
        let callback = ClientCallback {
            program: 0x40000000,
            rnetid: "tcp".to_string(),
            raddr: "127.0.0.1.149.18".to_string(),
            callback_ident: 1,
        };
        let client = manager
            .upsert_client([3; 8], id.to_vec(), callback, None, vec![])
            .await
            .unwrap();
        manager
            .confirm_client(client.clientid, client.setclientid_confirm, None)
            .await
            .unwrap();
        client.clientid
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_manager;
    use super::test_support::confirmed_v40_client;
    use super::*;
    use keel_proto::nfs4_proto::{
        OPEN4_SHARE_ACCESS_BOTH, OPEN4_SHARE_ACCESS_READ, OPEN4_SHARE_ACCESS_WRITE,
        OPEN4_SHARE_DENY_NONE, OPEN4_SHARE_DENY_WRITE,
    };

    fn params(clientid: u64, owner: &[u8], seqid: u32, fh: &[u8]) -> OpenParams {
        OpenParams {
            clientid,
            owner: owner.to_vec(),
            seqid,
            skip_owner_seqid: false,
            fh: fh.to_vec(),
            share_access: OPEN4_SHARE_ACCESS_READ,
            share_deny: OPEN4_SHARE_DENY_NONE,
            reclaim: false,
        }
    }

    #[tokio::test]
    async fn open_mints_stateid_and_requires_confirm() {
        let manager = test_manager();
        let clientid = confirmed_v40_client(&manager, b"client-a").await;

        let grant = manager
            .register_open(params(clientid, b"owner-1", 1, b"fh-1"))
            .await
            .unwrap();
        assert!(grant.confirm_required);
        assert_eq!(grant.stateid.seqid, 1);
        assert_eq!(grant.stateid.other[0], STATE_TYPE_OPEN);

        let confirmed = manager.confirm_open(&grant.stateid, 2).await.unwrap();
        assert_eq!(confirmed.seqid, 2);

        // second open by the same owner needs no confirm
        let grant2 = manager
            .register_open(params(clientid, b"owner-1", 3, b"fh-2"))
            .await
            .unwrap();
        assert!(!grant2.confirm_required);
    }

    #[tokio::test]
    async fn owner_seqid_enforced() {
        let manager = test_manager();
        let clientid = confirmed_v40_client(&manager, b"client-b").await;
        let grant = manager
            .register_open(params(clientid, b"owner-1", 1, b"fh-1"))
            .await
            .unwrap();
        manager.confirm_open(&grant.stateid, 2).await.unwrap();

        // skipping a seqid is refused
        let err = manager
            .register_open(params(clientid, b"owner-1", 5, b"fh-2"))
            .await;
        assert_eq!(err.unwrap_err(), NfsStat4::Nfs4errBadSeqid);

        // the next in sequence works
        manager
            .register_open(params(clientid, b"owner-1", 3, b"fh-2"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn share_deny_blocks_conflicting_access() {
        let manager = test_manager();
        let client_a = confirmed_v40_client(&manager, b"client-a").await;
        let client_b = confirmed_v40_client(&manager, b"client-b").await;

        let mut first = params(client_a, b"owner-a", 1, b"fh-shared");
        first.share_access = OPEN4_SHARE_ACCESS_BOTH;
        first.share_deny = OPEN4_SHARE_DENY_WRITE;
        manager.register_open(first).await.unwrap();

        // writer denied by the existing reservation
        let mut second = params(client_b, b"owner-b", 1, b"fh-shared");
        second.share_access = OPEN4_SHARE_ACCESS_WRITE;
        let err = manager.register_open(second).await;
        assert_eq!(err.unwrap_err(), NfsStat4::Nfs4errShareDenied);

        // a reader is fine; the denied attempt still consumed a seqid
        let mut third = params(client_b, b"owner-b", 2, b"fh-shared");
        third.share_access = OPEN4_SHARE_ACCESS_READ;
        manager.register_open(third).await.unwrap();
    }

    #[tokio::test]
    async fn close_releases_share_reservation() {
        let manager = test_manager();
        let client_a = confirmed_v40_client(&manager, b"client-a").await;
        let client_b = confirmed_v40_client(&manager, b"client-b").await;

        let mut first = params(client_a, b"owner-a", 1, b"fh-x");
        first.share_deny = OPEN4_SHARE_DENY_WRITE;
        let grant = manager.register_open(first).await.unwrap();
        manager.confirm_open(&grant.stateid, 2).await.unwrap();

        let mut blocked = params(client_b, b"owner-b", 1, b"fh-x");
        blocked.share_access = OPEN4_SHARE_ACCESS_WRITE;
        assert_eq!(
            manager.register_open(blocked.clone()).await.unwrap_err(),
            NfsStat4::Nfs4errShareDenied
        );

        let current = Stateid4 {
            seqid: 0,
            other: grant.stateid.other,
        };
        manager.close_open(&current, 3, false).await.unwrap();

        blocked.seqid = 2;
        manager.register_open(blocked).await.unwrap();
    }

    #[tokio::test]
    async fn same_owner_open_upgrades_in_place() {
        let manager = test_manager();
        let clientid = confirmed_v40_client(&manager, b"client-a").await;

        let grant = manager
            .register_open(params(clientid, b"owner-1", 1, b"fh-up"))
            .await
            .unwrap();
        manager.confirm_open(&grant.stateid, 2).await.unwrap();

        let mut upgrade = params(clientid, b"owner-1", 3, b"fh-up");
        upgrade.share_access = OPEN4_SHARE_ACCESS_WRITE;
        let upgraded = manager.register_open(upgrade).await.unwrap();
        assert_eq!(upgraded.stateid.other, grant.stateid.other);
        assert!(upgraded.stateid.seqid > grant.stateid.seqid);

        let validated = manager
            .validate_stateid(
                &Stateid4 {
                    seqid: 0,
                    other: upgraded.stateid.other,
                },
                Some(&b"fh-up".to_vec()),
            )
            .await
            .unwrap();
        match validated {
            super::super::ValidatedState::Open { share_access, .. } => {
                assert_eq!(share_access, OPEN4_SHARE_ACCESS_BOTH);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn downgrade_requires_subset() {
        let manager = test_manager();
        let clientid = confirmed_v40_client(&manager, b"client-a").await;

        let mut open = params(clientid, b"owner-1", 1, b"fh-d");
        open.share_access = OPEN4_SHARE_ACCESS_BOTH;
        let grant = manager.register_open(open).await.unwrap();
        manager.confirm_open(&grant.stateid, 2).await.unwrap();

        let current = Stateid4 {
            seqid: 0,
            other: grant.stateid.other,
        };
        // growing the deny set is not a downgrade
        let err = manager
            .downgrade_open(&current, 3, OPEN4_SHARE_ACCESS_READ, OPEN4_SHARE_DENY_WRITE, false)
            .await;
        assert_eq!(err.unwrap_err(), NfsStat4::Nfs4errInval);

        let downgraded = manager
            .downgrade_open(&current, 3, OPEN4_SHARE_ACCESS_READ, OPEN4_SHARE_DENY_NONE, false)
            .await
            .unwrap();
        assert!(downgraded.seqid > grant.stateid.seqid);
    }

    #[tokio::test]
    async fn grace_gates_open_and_reclaim() {
        let manager = test_manager();
        let clientid = confirmed_v40_client(&manager, b"client-a").await;

        // reclaim outside grace is refused
        let mut reclaim = params(clientid, b"owner-1", 1, b"fh-g");
        reclaim.reclaim = true;
        assert_eq!(
            manager.register_open(reclaim.clone()).await.unwrap_err(),
            NfsStat4::Nfs4errNoGrace
        );

        manager.seed_grace(vec![b"client-a".to_vec()]).await;

        // plain opens are held off during grace
        assert_eq!(
            manager
                .register_open(params(clientid, b"owner-1", 1, b"fh-g"))
                .await
                .unwrap_err(),
            NfsStat4::Nfs4errGrace
        );

        // reclaims pass
        manager.register_open(reclaim).await.unwrap();

        manager.reclaim_finished(b"client-a").await;
        assert!(!manager.in_grace().await);

        // and regular opens flow again
        manager
            .register_open(params(clientid, b"owner-1", 2, b"fh-g2"))
            .await
            .unwrap();
    }
}
