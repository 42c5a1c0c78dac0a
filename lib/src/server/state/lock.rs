//! Lock owners and byte-range lock states: conflict detection, range
//! merge on LOCK, range split on LOCKU, and RELEASE_LOCKOWNER.

use tracing::debug;

use keel_proto::nfs4_proto::{
    Clientid4, Lock4denied, LockOwner4, NfsFh4, NfsLockType4, NfsStat4, Stateid4,
};

use super::{OwnerKey, StateInner, StateManager, StateidOther, STATE_TYPE_LOCK, STATE_TYPE_OPEN};

#[derive(Clone, Debug)]
pub struct LockOwnerRec {
    pub clientid: Clientid4,
    pub owner: Vec<u8>,
    pub seqid: u32,
    pub locks: Vec<StateidOther>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LockRange {
    pub offset: u64,
    pub length: u64,
    pub locktype: NfsLockType4,
}

impl LockRange {
    /// Exclusive end; a length of all ones reaches the end of file.
    fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    fn overlaps(&self, offset: u64, length: u64) -> bool {
        let other_end = offset.saturating_add(length);
        self.offset < other_end && offset < self.end()
    }

    fn conflicts_with(&self, locktype: NfsLockType4, offset: u64, length: u64) -> bool {
        self.overlaps(offset, length) && (self.locktype.is_write() || locktype.is_write())
    }
}

#[derive(Clone, Debug)]
pub struct LockStateRec {
    pub other: StateidOther,
    pub seqid: u32,
    pub clientid: Clientid4,
    pub owner_key: OwnerKey,
    pub fh: NfsFh4,
    /// The open state this lock state was created through.
    pub open_other: StateidOther,
    pub ranges: Vec<LockRange>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LockOutcome {
    Granted(Stateid4),
    Denied(Lock4denied),
}

fn check_range(offset: u64, length: u64) -> Result<(), NfsStat4> {
    if length == 0 {
        return Err(NfsStat4::Nfs4errInval);
    }
    if length != u64::MAX && offset.checked_add(length).is_none() {
        return Err(NfsStat4::Nfs4errInval);
    }
    Ok(())
}

/// First conflicting range held by a different lock owner, with the
/// holder's identity for the DENIED result.
fn find_conflict(
    inner: &StateInner,
    fh: &NfsFh4,
    owner_key: &OwnerKey,
    locktype: NfsLockType4,
    offset: u64,
    length: u64,
) -> Option<Lock4denied> {
    let ids = inner.locks_by_file.get(fh)?;
    for other in ids {
        let Some(lock) = inner.locks.get(other) else {
            continue;
        };
        if &lock.owner_key == owner_key {
            continue;
        }
        for range in &lock.ranges {
            if range.conflicts_with(locktype, offset, length) {
                return Some(Lock4denied {
                    offset: range.offset,
                    length: range.length,
                    locktype: range.locktype,
                    owner: LockOwner4 {
                        clientid: lock.owner_key.0,
                        owner: lock.owner_key.1.clone(),
                    },
                });
            }
        }
    }
    None
}

/// Adds a granted range, merging same-type overlapping or adjacent
/// ranges into one.
fn merge_range(ranges: &mut Vec<LockRange>, granted: LockRange) {
    let mut merged = granted;
    ranges.retain(|range| {
        let joinable = range.locktype == merged.locktype
            && range.offset <= merged.end()
            && merged.offset <= range.end();
        if joinable {
            let end = merged.end().max(range.end());
            merged.offset = merged.offset.min(range.offset);
            merged.length = if end == u64::MAX {
                u64::MAX
            } else {
                end - merged.offset
            };
            false
        } else {
            true
        }
    });
    ranges.push(merged);
    ranges.sort_by_key(|range| range.offset);
}

/// Removes `[offset, offset+length)` from the held set, splitting ranges
/// that straddle the region.
fn subtract_range(ranges: &mut Vec<LockRange>, offset: u64, length: u64) {
    let cut_end = offset.saturating_add(length);
    let mut rebuilt = Vec::with_capacity(ranges.len() + 1);
    for range in ranges.drain(..) {
        if !range.overlaps(offset, length) {
            rebuilt.push(range);
            continue;
        }
        if range.offset < offset {
            rebuilt.push(LockRange {
                offset: range.offset,
                length: offset - range.offset,
                locktype: range.locktype,
            });
        }
        if range.end() > cut_end {
            let tail_len = if range.end() == u64::MAX {
                u64::MAX
            } else {
                range.end() - cut_end
            };
            rebuilt.push(LockRange {
                offset: cut_end,
                length: tail_len,
                locktype: range.locktype,
            });
        }
    }
    rebuilt.sort_by_key(|range| range.offset);
    *ranges = rebuilt;
}

impl StateManager {
    fn grace_gate(inner: &mut StateInner, reclaim: bool) -> Result<(), NfsStat4> {
        let grace_active = inner.grace.check_active();
        if grace_active && !reclaim {
            return Err(NfsStat4::Nfs4errGrace);
        }
        if !grace_active && reclaim {
            return Err(NfsStat4::Nfs4errNoGrace);
        }
        Ok(())
    }

    /// LOCK through the open-owner arm: first lock of a new lock owner
    /// on this file, authorized by the open stateid.
    #[allow(clippy::too_many_arguments)]
    pub async fn lock_new_owner(
        &self,
        fh: &NfsFh4,
        locktype: NfsLockType4,
        reclaim: bool,
        offset: u64,
        length: u64,
        open_stateid: &Stateid4,
        open_seqid: u32,
        lock_seqid: u32,
        lock_owner: &LockOwner4,
        skip_owner_seqid: bool,
    ) -> Result<LockOutcome, NfsStat4> {
        check_range(offset, length)?;
        let mut inner = self.inner.write().await;
        Self::grace_gate(&mut inner, reclaim)?;

        if open_stateid.other[0] != STATE_TYPE_OPEN {
            return Err(NfsStat4::Nfs4errBadStateid);
        }
        let Some(open) = inner.opens.get(&open_stateid.other).map(|o| o.clone()) else {
            return Err(NfsStat4::Nfs4errBadStateid);
        };
        if &open.fh != fh {
            return Err(NfsStat4::Nfs4errBadStateid);
        }
        if open_stateid.seqid != 0 && open_stateid.seqid != open.seqid {
            return Err(if open_stateid.seqid < open.seqid {
                NfsStat4::Nfs4errOldStateid
            } else {
                NfsStat4::Nfs4errBadStateid
            });
        }
        if !skip_owner_seqid {
            let Some(owner) = inner.open_owners.get_mut(&open.owner_key) else {
                return Err(NfsStat4::Nfs4errBadStateid);
            };
            if open_seqid != owner.seqid.wrapping_add(1) {
                return Err(NfsStat4::Nfs4errBadSeqid);
            }
            owner.seqid = open_seqid;
        }

        let owner_key: OwnerKey = (lock_owner.clientid, lock_owner.owner.clone());
        if let Some(conflict) = find_conflict(&inner, fh, &owner_key, locktype, offset, length) {
            if reclaim {
                return Err(NfsStat4::Nfs4errReclaimConflict);
            }
            return Ok(LockOutcome::Denied(conflict));
        }

        // a lock owner returning to the same file continues on its
        // existing lock state
        let existing = inner
            .lock_owners
            .get(&owner_key)
            .map(|owner| owner.locks.clone())
            .unwrap_or_default()
            .into_iter()
            .find(|other| {
                inner
                    .locks
                    .get(other)
                    .map(|lock| &lock.fh == fh)
                    .unwrap_or(false)
            });

        let stateid = match existing {
            Some(other) => {
                let lock = inner.locks.get_mut(&other).unwrap();
                merge_range(
                    &mut lock.ranges,
                    LockRange {
                        offset,
                        length,
                        locktype,
                    },
                );
                lock.seqid += 1;
                Stateid4 {
                    seqid: lock.seqid,
                    other,
                }
            }
            None => {
                let other = Self::mint_other(&mut inner, self.boot_epoch(), STATE_TYPE_LOCK);
                let lock = LockStateRec {
                    other,
                    seqid: 1,
                    clientid: lock_owner.clientid,
                    owner_key: owner_key.clone(),
                    fh: fh.clone(),
                    open_other: open.other,
                    ranges: vec![LockRange {
                        offset,
                        length,
                        locktype,
                    }],
                };
                inner.locks.insert(other, lock);
                inner.locks_by_file.entry(fh.clone()).or_default().push(other);
                inner
                    .lock_owners
                    .entry(owner_key.clone())
                    .or_insert_with(|| LockOwnerRec {
                        clientid: lock_owner.clientid,
                        owner: lock_owner.owner.clone(),
                        seqid: lock_seqid,
                        locks: Vec::new(),
                    })
                    .locks
                    .push(other);
                if let Some(open) = inner.opens.get_mut(&open_stateid.other) {
                    open.locks.push(other);
                }
                Stateid4 { seqid: 1, other }
            }
        };

        self.renew_lease_locked(&inner, lock_owner.clientid);
        debug!(clientid = lock_owner.clientid, ?locktype, offset, length, "lock granted");
        Ok(LockOutcome::Granted(stateid))
    }

    /// LOCK through the lock-owner arm: another range for an existing
    /// lock state.
    #[allow(clippy::too_many_arguments)]
    pub async fn lock_existing(
        &self,
        fh: &NfsFh4,
        locktype: NfsLockType4,
        reclaim: bool,
        offset: u64,
        length: u64,
        lock_stateid: &Stateid4,
        lock_seqid: u32,
        skip_owner_seqid: bool,
    ) -> Result<LockOutcome, NfsStat4> {
        check_range(offset, length)?;
        let mut inner = self.inner.write().await;
        Self::grace_gate(&mut inner, reclaim)?;

        let Some(lock) = inner.locks.get(&lock_stateid.other).map(|l| l.clone()) else {
            return Err(NfsStat4::Nfs4errBadStateid);
        };
        if &lock.fh != fh {
            return Err(NfsStat4::Nfs4errBadStateid);
        }
        if lock_stateid.seqid != 0 && lock_stateid.seqid != lock.seqid {
            return Err(if lock_stateid.seqid < lock.seqid {
                NfsStat4::Nfs4errOldStateid
            } else {
                NfsStat4::Nfs4errBadStateid
            });
        }
        if !skip_owner_seqid {
            let Some(owner) = inner.lock_owners.get_mut(&lock.owner_key) else {
                return Err(NfsStat4::Nfs4errBadStateid);
            };
            if lock_seqid != owner.seqid.wrapping_add(1) {
                return Err(NfsStat4::Nfs4errBadSeqid);
            }
            owner.seqid = lock_seqid;
        }

        if let Some(conflict) = find_conflict(&inner, fh, &lock.owner_key, locktype, offset, length)
        {
            if reclaim {
                return Err(NfsStat4::Nfs4errReclaimConflict);
            }
            return Ok(LockOutcome::Denied(conflict));
        }

        let rec = inner.locks.get_mut(&lock_stateid.other).unwrap();
        merge_range(
            &mut rec.ranges,
            LockRange {
                offset,
                length,
                locktype,
            },
        );
        rec.seqid += 1;
        let stateid = Stateid4 {
            seqid: rec.seqid,
            other: rec.other,
        };
        self.renew_lease_locked(&inner, lock.clientid);
        Ok(LockOutcome::Granted(stateid))
    }

    /// LOCKT: pure conflict probe, no state allocated.
    pub async fn test_lock(
        &self,
        fh: &NfsFh4,
        locktype: NfsLockType4,
        offset: u64,
        length: u64,
        owner: &LockOwner4,
    ) -> Result<Option<Lock4denied>, NfsStat4> {
        check_range(offset, length)?;
        let inner = self.inner.read().await;
        let owner_key: OwnerKey = (owner.clientid, owner.owner.clone());
        self.renew_lease_locked(&inner, owner.clientid);
        Ok(find_conflict(&inner, fh, &owner_key, locktype, offset, length))
    }

    /// LOCKU: carve the region out of the held set. An emptied lock
    /// state stays dormant until RELEASE_LOCKOWNER or client expiry.
    pub async fn unlock(
        &self,
        fh: &NfsFh4,
        lock_stateid: &Stateid4,
        seqid: u32,
        offset: u64,
        length: u64,
        skip_owner_seqid: bool,
    ) -> Result<Stateid4, NfsStat4> {
        check_range(offset, length)?;
        let mut inner = self.inner.write().await;
        let Some(lock) = inner.locks.get(&lock_stateid.other).map(|l| l.clone()) else {
            return Err(NfsStat4::Nfs4errBadStateid);
        };
        if &lock.fh != fh {
            return Err(NfsStat4::Nfs4errBadStateid);
        }
        if lock_stateid.seqid != 0 && lock_stateid.seqid != lock.seqid {
            return Err(if lock_stateid.seqid < lock.seqid {
                NfsStat4::Nfs4errOldStateid
            } else {
                NfsStat4::Nfs4errBadStateid
            });
        }
        if !skip_owner_seqid {
            let Some(owner) = inner.lock_owners.get_mut(&lock.owner_key) else {
                return Err(NfsStat4::Nfs4errBadStateid);
            };
            if seqid != owner.seqid.wrapping_add(1) {
                return Err(NfsStat4::Nfs4errBadSeqid);
            }
            owner.seqid = seqid;
        }

        let rec = inner.locks.get_mut(&lock_stateid.other).unwrap();
        subtract_range(&mut rec.ranges, offset, length);
        rec.seqid += 1;
        let stateid = Stateid4 {
            seqid: rec.seqid,
            other: rec.other,
        };
        self.renew_lease_locked(&inner, lock.clientid);
        Ok(stateid)
    }

    /// RELEASE_LOCKOWNER: drop a lock owner once all its ranges are gone.
    pub async fn release_lockowner(&self, owner: &LockOwner4) -> Result<(), NfsStat4> {
        let mut inner = self.inner.write().await;
        let owner_key: OwnerKey = (owner.clientid, owner.owner.clone());
        let Some(rec) = inner.lock_owners.get(&owner_key).cloned() else {
            // nothing to release
            return Ok(());
        };
        for other in &rec.locks {
            if let Some(lock) = inner.locks.get(other) {
                if !lock.ranges.is_empty() {
                    return Err(NfsStat4::Nfs4errLocksHeld);
                }
            }
        }
        for other in &rec.locks {
            if let Some(lock) = inner.locks.remove(other) {
                if let Some(by_file) = inner.locks_by_file.get_mut(&lock.fh) {
                    by_file.retain(|id| id != other);
                }
                if let Some(open) = inner.opens.get_mut(&lock.open_other) {
                    open.locks.retain(|id| id != other);
                }
            }
        }
        inner.lock_owners.remove(&owner_key);
        self.renew_lease_locked(&inner, owner.clientid);
        Ok(())
    }
}
