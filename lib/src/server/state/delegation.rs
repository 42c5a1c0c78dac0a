//! Delegations: the grant policy, conflict-driven recall with a revoke
//! timer, and DELEGRETURN. Revoked delegations stay in the by-stateid
//! map so their stateid answers BAD_STATEID instead of being reused.

use moka::sync::Cache;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use keel_proto::nfs4_proto::{
    Clientid4, NfsFh4, NfsStat4, OpenDelegationType4, SessionId4, Stateid4,
    OPEN4_SHARE_ACCESS_WRITE,
};

use super::client::{confirmed_client, ClientCallback};
use super::{StateInner, StateManager, StateidOther, STATE_TYPE_DELEG};

/// How a recall reaches the client: a dialed-back v4.0 callback
/// connection, or a v4.1 session backchannel.
#[derive(Clone, Debug)]
pub enum CallbackChannel {
    Dialback(ClientCallback),
    Session(SessionId4),
}

#[derive(Clone, Debug)]
pub struct RecallTarget {
    pub clientid: Clientid4,
    pub stateid: Stateid4,
    pub fh: NfsFh4,
    pub truncate: bool,
    pub channel: CallbackChannel,
}

/// Sink for CB_RECALL dispatches; the callback client implements it, the
/// tests record it.
pub trait RecallDispatcher: Send + Sync {
    fn dispatch_recall(&self, target: RecallTarget);
}

#[derive(Clone, Debug)]
pub struct DelegationRec {
    pub other: StateidOther,
    pub seqid: u32,
    pub clientid: Clientid4,
    pub fh: NfsFh4,
    pub deleg_type: OpenDelegationType4,
    pub recall_sent: bool,
    pub recall_time: Option<Instant>,
    pub revoked: bool,
    pub recall_abort: Option<tokio::task::AbortHandle>,
}

/// Marks a delegation revoked, drops the by-file index entry, and bars
/// the file from re-delegation for the cache TTL.
pub(crate) fn revoke_in_place(
    inner: &mut StateInner,
    other: &StateidOther,
    recently_recalled: &Cache<NfsFh4, ()>,
) {
    let Some(deleg) = inner.delegations.get_mut(other) else {
        return;
    };
    if deleg.revoked {
        return;
    }
    deleg.revoked = true;
    if let Some(abort) = deleg.recall_abort.take() {
        abort.abort();
    }
    let fh = deleg.fh.clone();
    if let Some(by_file) = inner.delegations_by_file.get_mut(&fh) {
        by_file.retain(|id| id != other);
        if by_file.is_empty() {
            inner.delegations_by_file.remove(&fh);
        }
    }
    recently_recalled.insert(fh, ());
}

impl StateManager {
    /// Delegation grant policy: a proven callback path, no opens by
    /// other clients, no delegation already held on the file by this
    /// client, and the file not recently recalled. WRITE access upgrades
    /// the grant to a write delegation.
    pub async fn maybe_grant_delegation(
        &self,
        clientid: Clientid4,
        fh: &NfsFh4,
        share_access: u32,
        cb_path_up: bool,
    ) -> Option<(Stateid4, OpenDelegationType4)> {
        if !cb_path_up {
            return None;
        }
        if self.recently_recalled.get(fh).is_some() {
            debug!("file recently recalled, withholding delegation");
            return None;
        }
        let mut inner = self.inner.write().await;

        if let Some(ids) = inner.delegations_by_file.get(fh) {
            if !ids.is_empty() {
                return None;
            }
        }
        if let Some(opens) = inner.opens_by_file.get(fh) {
            let foreign_open = opens.iter().any(|other| {
                inner
                    .opens
                    .get(other)
                    .map(|open| open.clientid != clientid)
                    .unwrap_or(false)
            });
            if foreign_open {
                return None;
            }
        }

        let deleg_type = if share_access & OPEN4_SHARE_ACCESS_WRITE != 0 {
            OpenDelegationType4::OpenDelegateWrite
        } else {
            OpenDelegationType4::OpenDelegateRead
        };
        let other = Self::mint_other(&mut inner, self.boot_epoch(), STATE_TYPE_DELEG);
        let rec = DelegationRec {
            other,
            seqid: 1,
            clientid,
            fh: fh.clone(),
            deleg_type,
            recall_sent: false,
            recall_time: None,
            revoked: false,
            recall_abort: None,
        };
        inner.delegations.insert(other, rec);
        inner
            .delegations_by_file
            .entry(fh.clone())
            .or_default()
            .push(other);
        debug!(clientid, ?deleg_type, "delegation granted");
        Some((Stateid4 { seqid: 1, other }, deleg_type))
    }

    /// Checks whether an operation by `requester` (None for anonymous
    /// paths) breaks a delegation held on `fh`. If so, recall is
    /// initiated on every conflicting delegation and the caller answers
    /// DELAY while the client returns it.
    pub async fn check_delegation_conflict(
        &self,
        requester: Option<Clientid4>,
        fh: &NfsFh4,
        would_write: bool,
    ) -> bool {
        let mut inner = self.inner.write().await;
        let ids = match inner.delegations_by_file.get(fh) {
            Some(ids) => ids.clone(),
            None => return false,
        };
        let mut conflicting = Vec::new();
        for other in ids {
            let Some(deleg) = inner.delegations.get(&other) else {
                continue;
            };
            if deleg.revoked {
                continue;
            }
            if Some(deleg.clientid) == requester {
                continue;
            }
            let breaks = match deleg.deleg_type {
                OpenDelegationType4::OpenDelegateWrite => true,
                OpenDelegationType4::OpenDelegateRead => would_write,
                OpenDelegationType4::OpenDelegateNone => false,
            };
            if breaks {
                conflicting.push(other);
            }
        }
        if conflicting.is_empty() {
            return false;
        }
        for other in conflicting {
            self.initiate_recall(&mut inner, &other, would_write);
        }
        true
    }

    fn initiate_recall(&self, inner: &mut StateInner, other: &StateidOther, truncate: bool) {
        let Some(deleg) = inner.delegations.get(other).cloned() else {
            return;
        };
        if deleg.recall_sent {
            return;
        }

        let channel = if let Some(client) = confirmed_client(&inner.clients, deleg.clientid) {
            CallbackChannel::Dialback(client.callback.clone())
        } else {
            let session = inner
                .sessions
                .iter()
                .find(|(_, s)| s.clientid == deleg.clientid)
                .map(|(id, _)| *id);
            match session {
                Some(id) => CallbackChannel::Session(id),
                None => {
                    // no way to reach the client; revoke straight away
                    warn!(clientid = deleg.clientid, "no callback channel, revoking");
                    revoke_in_place(inner, other, &self.recently_recalled);
                    return;
                }
            }
        };

        let stateid = Stateid4 {
            seqid: deleg.seqid,
            other: *other,
        };
        info!(clientid = deleg.clientid, "recalling delegation");
        self.recaller.dispatch_recall(RecallTarget {
            clientid: deleg.clientid,
            stateid,
            fh: deleg.fh.clone(),
            truncate,
            channel,
        });
        // re-delegation of this file is suppressed while the recall runs
        self.recently_recalled.insert(deleg.fh.clone(), ());

        // the revoke timer fires after one lease period without a
        // DELEGRETURN
        let abort = if let Some(manager) = self.manager_arc() {
            let lease = self.config.lease_duration;
            let target = *other;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(lease).await;
                manager.revoke_delegation(&target).await;
            });
            Some(handle.abort_handle())
        } else {
            None
        };

        let rec = inner.delegations.get_mut(other).unwrap();
        rec.recall_sent = true;
        rec.recall_time = Some(Instant::now());
        rec.recall_abort = abort;
    }

    /// Recall timer expiry: the client never returned the delegation.
    pub async fn revoke_delegation(&self, other: &StateidOther) {
        let mut inner = self.inner.write().await;
        if let Some(deleg) = inner.delegations.get(other) {
            if deleg.revoked {
                return;
            }
            warn!(clientid = deleg.clientid, "recall timer fired, revoking delegation");
        }
        revoke_in_place(&mut inner, other, &self.recently_recalled);
    }

    /// DELEGRETURN. Accepted idempotently: a return of an unknown or
    /// already-revoked delegation clears the residue and succeeds.
    pub async fn delegreturn(&self, stateid: &Stateid4) -> Result<(), NfsStat4> {
        if stateid.other[0] != STATE_TYPE_DELEG {
            return Err(NfsStat4::Nfs4errBadStateid);
        }
        let mut inner = self.inner.write().await;
        let Some(mut deleg) = inner.delegations.remove(&stateid.other) else {
            return Ok(());
        };
        if let Some(abort) = deleg.recall_abort.take() {
            abort.abort();
        }
        if let Some(by_file) = inner.delegations_by_file.get_mut(&deleg.fh) {
            by_file.retain(|id| id != &stateid.other);
            if by_file.is_empty() {
                inner.delegations_by_file.remove(&deleg.fh);
            }
        }
        self.renew_lease_locked(&inner, deleg.clientid);
        debug!(clientid = deleg.clientid, "delegation returned");
        Ok(())
    }

    /// Whether the client already holds a usable delegation on the file.
    pub async fn delegation_held(&self, clientid: Clientid4, fh: &NfsFh4) -> bool {
        let inner = self.inner.read().await;
        inner
            .delegations_by_file
            .get(fh)
            .map(|ids| {
                ids.iter().any(|other| {
                    inner
                        .delegations
                        .get(other)
                        .map(|deleg| deleg.clientid == clientid && !deleg.revoked)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::super::open::test_support::confirmed_v40_client;
    use super::super::open::OpenParams;
    use super::super::test_support::{test_manager, test_manager_with};
    use super::super::StateConfig;
    use super::*;
    use keel_proto::nfs4_proto::{
        OPEN4_SHARE_ACCESS_BOTH, OPEN4_SHARE_ACCESS_READ, OPEN4_SHARE_DENY_NONE,
    };
    use std::time::Duration;

    async fn open_file(manager: &StateManager, clientid: u64, owner: &[u8], fh: &[u8]) {
        let grant = manager
            .register_open(OpenParams {
                clientid,
                owner: owner.to_vec(),
                seqid: 1,
                skip_owner_seqid: false,
                fh: fh.to_vec(),
                share_access: OPEN4_SHARE_ACCESS_BOTH,
                share_deny: OPEN4_SHARE_DENY_NONE,
                reclaim: false,
            })
            .await
            .unwrap();
        manager.confirm_open(&grant.stateid, 2).await.unwrap();
    }

    #[tokio::test]
    async fn grant_requires_callback_path() {
        let manager = test_manager();
        let client = confirmed_v40_client(&manager, b"c1").await;
        let fh = b"fh".to_vec();
        assert!(manager
            .maybe_grant_delegation(client, &fh, OPEN4_SHARE_ACCESS_READ, false)
            .await
            .is_none());
        assert!(manager
            .maybe_grant_delegation(client, &fh, OPEN4_SHARE_ACCESS_READ, true)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn write_access_upgrades_grant() {
        let manager = test_manager();
        let client = confirmed_v40_client(&manager, b"c1").await;
        let (stateid, deleg_type) = manager
            .maybe_grant_delegation(client, &b"fh-w".to_vec(), OPEN4_SHARE_ACCESS_BOTH, true)
            .await
            .unwrap();
        assert_eq!(deleg_type, OpenDelegationType4::OpenDelegateWrite);
        assert_eq!(stateid.other[0], STATE_TYPE_DELEG);
    }

    #[tokio::test]
    async fn no_grant_when_other_client_has_file_open() {
        let manager = test_manager();
        let client_a = confirmed_v40_client(&manager, b"c1").await;
        let client_b = confirmed_v40_client(&manager, b"c2").await;
        let fh = b"fh-open".to_vec();
        open_file(&manager, client_a, b"owner-a", &fh).await;
        assert!(manager
            .maybe_grant_delegation(client_b, &fh, OPEN4_SHARE_ACCESS_READ, true)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn at_most_one_delegation_per_file() {
        let manager = test_manager();
        let client_a = confirmed_v40_client(&manager, b"c1").await;
        let client_b = confirmed_v40_client(&manager, b"c2").await;
        let fh = b"fh-one".to_vec();
        assert!(manager
            .maybe_grant_delegation(client_a, &fh, OPEN4_SHARE_ACCESS_BOTH, true)
            .await
            .is_some());
        assert!(manager
            .maybe_grant_delegation(client_b, &fh, OPEN4_SHARE_ACCESS_READ, true)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn conflict_dispatches_recall_and_delays() {
        let (manager, recaller) = test_manager_with(StateConfig::default());
        let client_a = confirmed_v40_client(&manager, b"c1").await;
        let client_b = confirmed_v40_client(&manager, b"c2").await;
        let fh = b"fh-recall".to_vec();
        let (stateid, _) = manager
            .maybe_grant_delegation(client_a, &fh, OPEN4_SHARE_ACCESS_BOTH, true)
            .await
            .unwrap();

        // B's open conflicts: recall goes out, caller should DELAY
        assert!(manager
            .check_delegation_conflict(Some(client_b), &fh, true)
            .await);
        let recalls = recaller.recalls.lock().unwrap();
        assert_eq!(recalls.len(), 1);
        assert_eq!(recalls[0].clientid, client_a);
        assert_eq!(recalls[0].stateid, stateid);
        drop(recalls);

        // the second probe does not re-send the recall
        assert!(manager
            .check_delegation_conflict(Some(client_b), &fh, true)
            .await);
        assert_eq!(recaller.recalls.lock().unwrap().len(), 1);

        // after DELEGRETURN the conflict is gone
        manager.delegreturn(&stateid).await.unwrap();
        assert!(!manager
            .check_delegation_conflict(Some(client_b), &fh, true)
            .await);
    }

    #[tokio::test]
    async fn holder_operations_do_not_conflict() {
        let manager = test_manager();
        let client_a = confirmed_v40_client(&manager, b"c1").await;
        let fh = b"fh-self".to_vec();
        manager
            .maybe_grant_delegation(client_a, &fh, OPEN4_SHARE_ACCESS_BOTH, true)
            .await
            .unwrap();
        assert!(!manager
            .check_delegation_conflict(Some(client_a), &fh, true)
            .await);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_recall_revokes_and_stateid_goes_bad() {
        let (manager, _recaller) = test_manager_with(StateConfig {
            lease_duration: Duration::from_secs(2),
            grace_duration: Duration::from_secs(90),
        });
        let client_a = confirmed_v40_client(&manager, b"c1").await;
        let client_b = confirmed_v40_client(&manager, b"c2").await;
        let fh = b"fh-revoke".to_vec();
        let (stateid, _) = manager
            .maybe_grant_delegation(client_a, &fh, OPEN4_SHARE_ACCESS_BOTH, true)
            .await
            .unwrap();
        assert!(manager
            .check_delegation_conflict(Some(client_b), &fh, true)
            .await);

        tokio::time::advance(Duration::from_secs(3)).await;
        // give the revoke task a chance to run
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(
            manager.validate_stateid(&stateid, Some(&fh)).await,
            Err(NfsStat4::Nfs4errBadStateid)
        );
        // conflict is gone once the delegation is revoked
        assert!(!manager
            .check_delegation_conflict(Some(client_b), &fh, true)
            .await);
        // and the late DELEGRETURN still succeeds
        manager.delegreturn(&stateid).await.unwrap();
    }

    #[tokio::test]
    async fn delegreturn_is_idempotent() {
        let manager = test_manager();
        let client = confirmed_v40_client(&manager, b"c1").await;
        let fh = b"fh-ret".to_vec();
        let (stateid, _) = manager
            .maybe_grant_delegation(client, &fh, OPEN4_SHARE_ACCESS_READ, true)
            .await
            .unwrap();
        manager.delegreturn(&stateid).await.unwrap();
        manager.delegreturn(&stateid).await.unwrap();
    }
}
