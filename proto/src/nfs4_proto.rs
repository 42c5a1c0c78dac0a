use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use crate::attr::{Fattr4, FileAttrList};
use crate::nfs41_proto::*;
use crate::xdr::{XdrDecode, XdrEncode, XdrError, XdrReader, XdrResult, XdrWriter};

/*
 * This code was derived from RFC 7531 and RFC 8881.
 */

/*
 * Sizes
 */
pub const NFS4_FHSIZE: usize = 128;
pub const NFS4_VERIFIER_SIZE: usize = 8;
pub const NFS4_OTHER_SIZE: usize = 12;
pub const NFS4_SESSIONID_SIZE: usize = 16;
pub const NFS4_OPAQUE_LIMIT: usize = 1024;

/*
 * File types
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum NfsFtype4 {
    Nf4Undef = 0,     /* undefined */
    Nf4reg = 1,       /* Regular File */
    Nf4dir = 2,       /* Directory */
    Nf4blk = 3,       /* Special File - block device */
    Nf4chr = 4,       /* Special File - character device */
    Nf4lnk = 5,       /* Symbolic Link */
    Nf4sock = 6,      /* Special File - socket */
    Nf4fifo = 7,      /* Special File - fifo */
    Nf4attrdir = 8,   /* Attribute Directory */
    Nf4namedattr = 9, /* Named Attribute */
}

impl XdrEncode for NfsFtype4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u32(*self as u32);
    }
}

impl XdrDecode for NfsFtype4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let raw = reader.read_u32()?;
        FromPrimitive::from_u32(raw).ok_or(XdrError::BadDiscriminant(raw))
    }
}

/*
 * Error status
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum NfsStat4 {
    Nfs4Ok = 0,         /* everything is okay       */
    Nfs4errPerm = 1,    /* caller not privileged    */
    Nfs4errNoent = 2,   /* no such file/directory   */
    Nfs4errIo = 5,      /* hard I/O error           */
    Nfs4errNxio = 6,    /* no such device           */
    Nfs4errAccess = 13, /* access denied            */
    Nfs4errExist = 17,  /* file already exists      */
    Nfs4errXdev = 18,   /* different file systems   */
    /* Unused/reserved        19 */
    Nfs4errNotdir = 20,               /* should be a directory    */
    Nfs4errIsdir = 21,                /* should not be directory  */
    Nfs4errInval = 22,                /* invalid argument         */
    Nfs4errFbig = 27,                 /* file exceeds server max  */
    Nfs4errNospc = 28,                /* no space on file system  */
    Nfs4errRofs = 30,                 /* read-only file system    */
    Nfs4errMlink = 31,                /* too many hard links      */
    Nfs4errNametoolong = 63,          /* name exceeds server max  */
    Nfs4errNotempty = 66,             /* directory not empty      */
    Nfs4errDquot = 69,                /* hard quota limit reached */
    Nfs4errStale = 70,                /* file no longer exists    */
    Nfs4errBadhandle = 10001,         /* Illegal filehandle       */
    Nfs4errBadCookie = 10003,         /* READDIR cookie is stale  */
    Nfs4errNotsupp = 10004,           /* operation not supported  */
    Nfs4errToosmall = 10005,          /* response limit exceeded  */
    Nfs4errServerfault = 10006,       /* undefined server error   */
    Nfs4errBadtype = 10007,           /* type invalid for CREATE  */
    Nfs4errDelay = 10008,             /* file "busy" - retry      */
    Nfs4errSame = 10009,              /* nverify says attrs same  */
    Nfs4errDenied = 10010,            /* lock unavailable         */
    Nfs4errExpired = 10011,           /* lock lease expired       */
    Nfs4errLocked = 10012,            /* I/O failed due to lock   */
    Nfs4errGrace = 10013,             /* in grace period          */
    Nfs4errFhexpired = 10014,         /* filehandle expired       */
    Nfs4errShareDenied = 10015,       /* share reserve denied     */
    Nfs4errWrongsec = 10016,          /* wrong security flavor    */
    Nfs4errClidInuse = 10017,         /* clientid in use          */
    Nfs4errResource = 10018,          /* resource exhaustion      */
    Nfs4errMoved = 10019,             /* file system relocated    */
    Nfs4errNofilehandle = 10020,      /* current FH is not set    */
    Nfs4errMinorVersMismatch = 10021, /* minor vers not supp      */
    Nfs4errStaleClientid = 10022,     /* server has rebooted      */
    Nfs4errStaleStateid = 10023,      /* server has rebooted      */
    Nfs4errOldStateid = 10024,        /* state is out of sync     */
    Nfs4errBadStateid = 10025,        /* incorrect stateid        */
    Nfs4errBadSeqid = 10026,          /* request is out of seq.   */
    Nfs4errNotSame = 10027,           /* verify - attrs not same  */
    Nfs4errLockRange = 10028,         /* lock range not supported */
    Nfs4errSymlink = 10029,           /* should be file/directory */
    Nfs4errRestorefh = 10030,         /* no saved filehandle      */
    Nfs4errLeaseMoved = 10031,        /* some file system moved   */
    Nfs4errAttrnotsupp = 10032,       /* recommended attr not sup */
    Nfs4errNoGrace = 10033,           /* reclaim outside of grace */
    Nfs4errReclaimBad = 10034,        /* reclaim error at server  */
    Nfs4errReclaimConflict = 10035,   /* conflict on reclaim      */
    Nfs4errBadxdr = 10036,            /* XDR decode failed        */
    Nfs4errLocksHeld = 10037,         /* file locks held at CLOSE */
    Nfs4errOpenmode = 10038,          /* conflict in OPEN and I/O */
    Nfs4errBadOwner = 10039,          /* Owner translation bad    */
    Nfs4errBadchar = 10040,           /* UTF-8 char not supported */
    Nfs4errBadname = 10041,           /* name not supported       */
    Nfs4errBadRange = 10042,          /* lock range not supported */
    Nfs4errLockNotsupp = 10043,       /* no atomic up/downgrade   */
    Nfs4errOpIllegal = 10044,         /* undefined operation      */
    Nfs4errDeadlock = 10045,          /* file locking deadlock    */
    Nfs4errFileOpen = 10046,          /* open file blocks op.     */
    Nfs4errAdminRevoked = 10047,      /* lock-Owner state revoked */
    Nfs4errCbPathDown = 10048,        /* callback path down       */
    /* NFSv4.1 errors, RFC 8881 section 15.1 */
    Nfs4errBadiomode = 10049,
    Nfs4errBadlayout = 10050,
    Nfs4errBadSessionDigest = 10051,
    Nfs4errBadsession = 10052, /* session not recognized   */
    Nfs4errBadslot = 10053,    /* slot outside slot table  */
    Nfs4errCompleteAlready = 10054,
    Nfs4errConnNotBoundToSession = 10055,
    Nfs4errDelegAlreadyWanted = 10056,
    Nfs4errBackChanBusy = 10057,
    Nfs4errLayouttrylater = 10058,
    Nfs4errLayoutunavailable = 10059,
    Nfs4errNomatchingLayout = 10060,
    Nfs4errRecallconflict = 10061,
    Nfs4errUnknownLayouttype = 10062,
    Nfs4errSeqMisordered = 10063, /* sequenceid out of order  */
    Nfs4errSequencePos = 10064,   /* SEQUENCE not first op    */
    Nfs4errReqTooBig = 10065,
    Nfs4errRepTooBig = 10066,
    Nfs4errRepTooBigToCache = 10067,
    Nfs4errRetryUncachedRep = 10068, /* retry of uncached reply  */
    Nfs4errUnsafeCompound = 10069,
    Nfs4errTooManyOps = 10070,
    Nfs4errOpNotInSession = 10071, /* first op not SEQUENCE    */
    Nfs4errHashAlgUnsupp = 10072,
    Nfs4errClientidBusy = 10074,
    Nfs4errPnfsIoHole = 10075,
    Nfs4errSeqFalseRetry = 10076,
    Nfs4errBadHighSlot = 10077,
    Nfs4errDeadsession = 10078,
    Nfs4errEncrAlgUnsupp = 10079,
    Nfs4errPnfsNoLayout = 10080,
    Nfs4errNotOnlyOp = 10081,
    Nfs4errWrongCred = 10082,
    Nfs4errWrongType = 10083,
    Nfs4errDirdelegUnavail = 10084,
    Nfs4errRejectDeleg = 10085,
    Nfs4errReturnconflict = 10086,
    Nfs4errDelegRevoked = 10087,
}

impl XdrEncode for NfsStat4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u32(*self as u32);
    }
}

impl XdrDecode for NfsStat4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let raw = reader.read_u32()?;
        FromPrimitive::from_u32(raw).ok_or(XdrError::BadDiscriminant(raw))
    }
}

/*
 * Basic data types
 */
pub type Clientid4 = u64;
pub type Seqid4 = u32;
pub type Sequenceid4 = u32;
pub type Slotid4 = u32;
pub type Count4 = u32;
pub type Length4 = u64;
pub type Offset4 = u64;
pub type NfsCookie4 = u64;
pub type Changeid4 = u64;
pub type Mode4 = u32;
pub type NfsLease4 = u32;
pub type NfsFh4 = Vec<u8>;
pub type Verifier4 = [u8; NFS4_VERIFIER_SIZE];
pub type SessionId4 = [u8; NFS4_SESSIONID_SIZE];
pub type Component4 = String;

/*
 * Timeval
 */
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Nfstime4 {
    pub seconds: i64,
    pub nseconds: u32,
}

impl XdrEncode for Nfstime4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_i64(self.seconds);
        writer.write_u32(self.nseconds);
    }
}

impl XdrDecode for Nfstime4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Nfstime4 {
            seconds: reader.read_i64()?,
            nseconds: reader.read_u32()?,
        })
    }
}

/// settime4: either the server stamps "now" or the client supplies a time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Settime4 {
    ServerTime,
    ClientTime(Nfstime4),
}

impl XdrDecode for Settime4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        match reader.read_u32()? {
            0 => Ok(Settime4::ServerTime),
            1 => Ok(Settime4::ClientTime(Nfstime4::decode(reader)?)),
            d => Err(XdrError::BadDiscriminant(d)),
        }
    }
}

impl XdrEncode for Settime4 {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Settime4::ServerTime => writer.write_u32(0),
            Settime4::ClientTime(t) => {
                writer.write_u32(1);
                t.encode(writer);
            }
        }
    }
}

/*
 * FSID structure for major/minor
 */
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Fsid4 {
    pub major: u64,
    pub minor: u64,
}

impl XdrEncode for Fsid4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u64(self.major);
        writer.write_u64(self.minor);
    }
}

impl XdrDecode for Fsid4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Fsid4 {
            major: reader.read_u64()?,
            minor: reader.read_u64()?,
        })
    }
}

/*
 * Special data/attribute associated with
 * file types NF4BLK and NF4CHR.
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Specdata4 {
    pub specdata1: u32, /* major device number */
    pub specdata2: u32, /* minor device number */
}

impl XdrEncode for Specdata4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u32(self.specdata1);
        writer.write_u32(self.specdata2);
    }
}

impl XdrDecode for Specdata4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Specdata4 {
            specdata1: reader.read_u32()?,
            specdata2: reader.read_u32()?,
        })
    }
}

/*
 * Mask that indicates which Access Control Entries
 * are supported.  Values for the aclsupport attribute.
 */
pub const ACL4_SUPPORT_ALLOW_ACL: u32 = 0x00000001;
pub const ACL4_SUPPORT_DENY_ACL: u32 = 0x00000002;
pub const ACL4_SUPPORT_AUDIT_ACL: u32 = 0x00000004;
pub const ACL4_SUPPORT_ALARM_ACL: u32 = 0x00000008;

/*
 * Acetype4 values
 */
pub const ACE4_ACCESS_ALLOWED_ACE_TYPE: u32 = 0x00000000;
pub const ACE4_ACCESS_DENIED_ACE_TYPE: u32 = 0x00000001;
pub const ACE4_SYSTEM_AUDIT_ACE_TYPE: u32 = 0x00000002;
pub const ACE4_SYSTEM_ALARM_ACE_TYPE: u32 = 0x00000003;

/*
 * ACE mask values
 */
pub const ACE4_READ_DATA: u32 = 0x00000001;
pub const ACE4_WRITE_DATA: u32 = 0x00000002;
pub const ACE4_APPEND_DATA: u32 = 0x00000004;
pub const ACE4_EXECUTE: u32 = 0x00000020;
pub const ACE4_READ_ATTRIBUTES: u32 = 0x00000080;
pub const ACE4_WRITE_ATTRIBUTES: u32 = 0x00000100;
pub const ACE4_READ_ACL: u32 = 0x00020000;
pub const ACE4_WRITE_ACL: u32 = 0x00040000;
pub const ACE4_SYNCHRONIZE: u32 = 0x00100000;

pub const ACE4_GENERIC_READ: u32 = 0x00120081;
pub const ACE4_GENERIC_WRITE: u32 = 0x00160106;
pub const ACE4_GENERIC_EXECUTE: u32 = 0x001200A0;

/*
 * Access Control Entry definition
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nfsace4 {
    pub acetype: u32,
    pub flag: u32,
    pub access_mask: u32,
    pub who: String,
}

impl XdrEncode for Nfsace4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u32(self.acetype);
        writer.write_u32(self.flag);
        writer.write_u32(self.access_mask);
        writer.write_string(&self.who);
    }
}

impl XdrDecode for Nfsace4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Nfsace4 {
            acetype: reader.read_u32()?,
            flag: reader.read_u32()?,
            access_mask: reader.read_u32()?,
            who: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
        })
    }
}

/*
 * Field definitions for the mode attribute
 */
pub const MODE4_SUID: u32 = 0x800; /* set user id on execution */
pub const MODE4_SGID: u32 = 0x400; /* set group id on execution */
pub const MODE4_SVTX: u32 = 0x200; /* save text even after use */
pub const MODE4_RUSR: u32 = 0x100; /* read permission: Owner */
pub const MODE4_WUSR: u32 = 0x080; /* write permission: Owner */
pub const MODE4_XUSR: u32 = 0x040; /* execute permission: Owner */
pub const MODE4_RGRP: u32 = 0x020; /* read permission: group */
pub const MODE4_WGRP: u32 = 0x010; /* write permission: group */
pub const MODE4_XGRP: u32 = 0x008; /* execute permission: group */
pub const MODE4_ROTH: u32 = 0x004; /* read permission: other */
pub const MODE4_WOTH: u32 = 0x002; /* write permission: other */
pub const MODE4_XOTH: u32 = 0x001; /* execute permission: other */

/*
 * Values for fh_expire_type
 */
pub const FH4_PERSISTENT: u32 = 0x00000000;
pub const FH4_NOEXPIRE_WITH_OPEN: u32 = 0x00000001;
pub const FH4_VOLATILE_ANY: u32 = 0x00000002;
pub const FH4_VOL_MIGRATION: u32 = 0x00000004;
pub const FH4_VOL_RENAME: u32 = 0x00000008;

/*
 * Change info for the client
 */
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChangeInfo4 {
    pub atomic: bool,
    pub before: Changeid4,
    pub after: Changeid4,
}

impl XdrEncode for ChangeInfo4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_bool(self.atomic);
        writer.write_u64(self.before);
        writer.write_u64(self.after);
    }
}

impl XdrDecode for ChangeInfo4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(ChangeInfo4 {
            atomic: reader.read_bool()?,
            before: reader.read_u64()?,
            after: reader.read_u64()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientAddr4 {
    /* see struct rpcb in RFC 1833 */
    pub rnetid: String, /* network id */
    pub raddr: String,  /* universal address */
}

impl XdrEncode for ClientAddr4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_string(&self.rnetid);
        writer.write_string(&self.raddr);
    }
}

impl XdrDecode for ClientAddr4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(ClientAddr4 {
            rnetid: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
            raddr: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
        })
    }
}

/*
 * Callback program info as provided by the client
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CbClient4 {
    pub cb_program: u32,
    pub cb_location: ClientAddr4,
}

impl XdrEncode for CbClient4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u32(self.cb_program);
        self.cb_location.encode(writer);
    }
}

impl XdrDecode for CbClient4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(CbClient4 {
            cb_program: reader.read_u32()?,
            cb_location: ClientAddr4::decode(reader)?,
        })
    }
}

/*
 * Stateid
 */
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Stateid4 {
    pub seqid: u32,
    pub other: [u8; NFS4_OTHER_SIZE],
}

impl Stateid4 {
    /// The anonymous stateid: all fields zero.
    pub fn anonymous() -> Self {
        Stateid4 {
            seqid: 0,
            other: [0; NFS4_OTHER_SIZE],
        }
    }

    /// The READ bypass stateid: all fields ones.
    pub fn read_bypass() -> Self {
        Stateid4 {
            seqid: u32::MAX,
            other: [0xff; NFS4_OTHER_SIZE],
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.seqid == 0 && self.other == [0; NFS4_OTHER_SIZE]
    }

    pub fn is_read_bypass(&self) -> bool {
        self.seqid == u32::MAX && self.other == [0xff; NFS4_OTHER_SIZE]
    }

    pub fn is_special(&self) -> bool {
        self.is_anonymous() || self.is_read_bypass()
    }
}

impl XdrEncode for Stateid4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u32(self.seqid);
        writer.write_fixed(&self.other);
    }
}

impl XdrDecode for Stateid4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Stateid4 {
            seqid: reader.read_u32()?,
            other: reader.read_fixed()?,
        })
    }
}

/*
 * Client ID
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NfsClientId4 {
    pub verifier: Verifier4,
    pub id: Vec<u8>,
}

impl XdrDecode for NfsClientId4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(NfsClientId4 {
            verifier: reader.read_fixed()?,
            id: reader.read_opaque_max(NFS4_OPAQUE_LIMIT)?,
        })
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct OpenOwner4 {
    pub clientid: Clientid4,
    pub owner: Vec<u8>,
}

impl XdrDecode for OpenOwner4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(OpenOwner4 {
            clientid: reader.read_u64()?,
            owner: reader.read_opaque_max(NFS4_OPAQUE_LIMIT)?,
        })
    }
}

impl XdrEncode for OpenOwner4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u64(self.clientid);
        writer.write_opaque(&self.owner);
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct LockOwner4 {
    pub clientid: Clientid4,
    pub owner: Vec<u8>,
}

impl XdrDecode for LockOwner4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(LockOwner4 {
            clientid: reader.read_u64()?,
            owner: reader.read_opaque_max(NFS4_OPAQUE_LIMIT)?,
        })
    }
}

impl XdrEncode for LockOwner4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u64(self.clientid);
        writer.write_opaque(&self.owner);
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum NfsLockType4 {
    ReadLt = 1,
    WriteLt = 2,
    ReadwLt = 3,  /* blocking read */
    WritewLt = 4, /* blocking write */
}

impl NfsLockType4 {
    /// Blocking and non-blocking variants conflict identically.
    pub fn is_write(&self) -> bool {
        matches!(self, NfsLockType4::WriteLt | NfsLockType4::WritewLt)
    }
}

impl XdrDecode for NfsLockType4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let raw = reader.read_u32()?;
        FromPrimitive::from_u32(raw).ok_or(XdrError::BadDiscriminant(raw))
    }
}

impl XdrEncode for NfsLockType4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u32(*self as u32);
    }
}

/*
 * ACCESS: Check Access Rights
 */
pub const ACCESS4_READ: u32 = 0x00000001;
pub const ACCESS4_LOOKUP: u32 = 0x00000002;
pub const ACCESS4_MODIFY: u32 = 0x00000004;
pub const ACCESS4_EXTEND: u32 = 0x00000008;
pub const ACCESS4_DELETE: u32 = 0x00000010;
pub const ACCESS4_EXECUTE: u32 = 0x00000020;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Access4args {
    /* CURRENT_FH: object */
    pub access: u32,
}

impl XdrDecode for Access4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Access4args {
            access: reader.read_u32()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Access4resok {
    pub supported: u32,
    pub access: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Access4res {
    Resok4(Access4resok),
    Err(NfsStat4),
}

impl XdrEncode for Access4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Access4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_u32(ok.supported);
                writer.write_u32(ok.access);
            }
            Access4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * CLOSE: Close a file and release share reservations
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Close4args {
    /* CURRENT_FH: object */
    pub seqid: Seqid4,
    pub open_stateid: Stateid4,
}

impl XdrDecode for Close4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Close4args {
            seqid: reader.read_u32()?,
            open_stateid: Stateid4::decode(reader)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Close4res {
    OpenStateid(Stateid4),
    Err(NfsStat4),
}

impl XdrEncode for Close4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Close4res::OpenStateid(stateid) => {
                NfsStat4::Nfs4Ok.encode(writer);
                stateid.encode(writer);
            }
            Close4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * COMMIT: Commit cached data on server to stable storage
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Commit4args {
    /* CURRENT_FH: file */
    pub offset: Offset4,
    pub count: Count4,
}

impl XdrDecode for Commit4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Commit4args {
            offset: reader.read_u64()?,
            count: reader.read_u32()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Commit4res {
    Resok4(Verifier4),
    Err(NfsStat4),
}

impl XdrEncode for Commit4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Commit4res::Resok4(writeverf) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_fixed(writeverf);
            }
            Commit4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * CREATE: Create a non-regular file
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Createtype4 {
    Link(String),
    BlockDevice(Specdata4),
    CharDevice(Specdata4),
    Socket,
    Fifo,
    Directory,
}

impl Createtype4 {
    pub fn ftype(&self) -> NfsFtype4 {
        match self {
            Createtype4::Link(_) => NfsFtype4::Nf4lnk,
            Createtype4::BlockDevice(_) => NfsFtype4::Nf4blk,
            Createtype4::CharDevice(_) => NfsFtype4::Nf4chr,
            Createtype4::Socket => NfsFtype4::Nf4sock,
            Createtype4::Fifo => NfsFtype4::Nf4fifo,
            Createtype4::Directory => NfsFtype4::Nf4dir,
        }
    }
}

impl XdrDecode for Createtype4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let disc = reader.read_u32()?;
        match FromPrimitive::from_u32(disc) {
            Some(NfsFtype4::Nf4lnk) => Ok(Createtype4::Link(
                reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
            )),
            Some(NfsFtype4::Nf4blk) => Ok(Createtype4::BlockDevice(Specdata4::decode(reader)?)),
            Some(NfsFtype4::Nf4chr) => Ok(Createtype4::CharDevice(Specdata4::decode(reader)?)),
            Some(NfsFtype4::Nf4sock) => Ok(Createtype4::Socket),
            Some(NfsFtype4::Nf4fifo) => Ok(Createtype4::Fifo),
            Some(NfsFtype4::Nf4dir) => Ok(Createtype4::Directory),
            _ => Err(XdrError::BadDiscriminant(disc)),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Create4args {
    /* CURRENT_FH: directory for creation */
    pub objtype: Createtype4,
    pub objname: Component4,
    pub createattrs: Fattr4,
}

impl XdrDecode for Create4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Create4args {
            objtype: Createtype4::decode(reader)?,
            objname: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
            createattrs: Fattr4::decode(reader)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Create4resok {
    pub cinfo: ChangeInfo4,
    pub attrset: FileAttrList,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Create4res {
    Resok4(Create4resok),
    Err(NfsStat4),
}

impl XdrEncode for Create4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Create4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                ok.cinfo.encode(writer);
                ok.attrset.encode(writer);
            }
            Create4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * DELEGPURGE: Purge Delegations Awaiting Recovery
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DelegPurge4args {
    pub clientid: Clientid4,
}

impl XdrDecode for DelegPurge4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(DelegPurge4args {
            clientid: reader.read_u64()?,
        })
    }
}

/*
 * DELEGRETURN: Return a delegation
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DelegReturn4args {
    /* CURRENT_FH: delegated file */
    pub deleg_stateid: Stateid4,
}

impl XdrDecode for DelegReturn4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(DelegReturn4args {
            deleg_stateid: Stateid4::decode(reader)?,
        })
    }
}

/*
 * GETATTR: Get file attributes
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Getattr4args {
    /* CURRENT_FH: directory or file */
    pub attr_request: FileAttrList,
}

impl XdrDecode for Getattr4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Getattr4args {
            attr_request: FileAttrList::decode(reader)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Getattr4res {
    Resok4(Fattr4),
    Err(NfsStat4),
}

impl XdrEncode for Getattr4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Getattr4res::Resok4(fattr) => {
                NfsStat4::Nfs4Ok.encode(writer);
                fattr.encode(writer);
            }
            Getattr4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * GETFH: Get current filehandle
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GetFh4res {
    Resok4(NfsFh4),
    Err(NfsStat4),
}

impl XdrEncode for GetFh4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            GetFh4res::Resok4(object) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_opaque(object);
            }
            GetFh4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * LINK: Create link to an object
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Link4args {
    /* SAVED_FH: source object */
    /* CURRENT_FH: target directory */
    pub newname: Component4,
}

impl XdrDecode for Link4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Link4args {
            newname: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Link4res {
    Resok4(ChangeInfo4),
    Err(NfsStat4),
}

impl XdrEncode for Link4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Link4res::Resok4(cinfo) => {
                NfsStat4::Nfs4Ok.encode(writer);
                cinfo.encode(writer);
            }
            Link4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * For LOCK, transition from open_owner to new lock_owner
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenToLockOwner4 {
    pub open_seqid: Seqid4,
    pub open_stateid: Stateid4,
    pub lock_seqid: Seqid4,
    pub lock_owner: LockOwner4,
}

/*
 * For LOCK, existing lock_owner continues to request file locks
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExistLockOwner4 {
    pub lock_stateid: Stateid4,
    pub lock_seqid: Seqid4,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Locker4 {
    OpenOwner(OpenToLockOwner4),
    LockOwner(ExistLockOwner4),
}

impl XdrDecode for Locker4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        match reader.read_bool()? {
            true => Ok(Locker4::OpenOwner(OpenToLockOwner4 {
                open_seqid: reader.read_u32()?,
                open_stateid: Stateid4::decode(reader)?,
                lock_seqid: reader.read_u32()?,
                lock_owner: LockOwner4::decode(reader)?,
            })),
            false => Ok(Locker4::LockOwner(ExistLockOwner4 {
                lock_stateid: Stateid4::decode(reader)?,
                lock_seqid: reader.read_u32()?,
            })),
        }
    }
}

/*
 * LOCK/LOCKT/LOCKU: Record lock management
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lock4args {
    /* CURRENT_FH: file */
    pub locktype: NfsLockType4,
    pub reclaim: bool,
    pub offset: Offset4,
    pub length: Length4,
    pub locker: Locker4,
}

impl XdrDecode for Lock4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Lock4args {
            locktype: NfsLockType4::decode(reader)?,
            reclaim: reader.read_bool()?,
            offset: reader.read_u64()?,
            length: reader.read_u64()?,
            locker: Locker4::decode(reader)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lock4denied {
    pub offset: Offset4,
    pub length: Length4,
    pub locktype: NfsLockType4,
    pub owner: LockOwner4,
}

impl XdrEncode for Lock4denied {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u64(self.offset);
        writer.write_u64(self.length);
        self.locktype.encode(writer);
        self.owner.encode(writer);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Lock4res {
    Resok4(Stateid4),
    Denied(Lock4denied),
    Err(NfsStat4),
}

impl XdrEncode for Lock4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Lock4res::Resok4(lock_stateid) => {
                NfsStat4::Nfs4Ok.encode(writer);
                lock_stateid.encode(writer);
            }
            Lock4res::Denied(denied) => {
                NfsStat4::Nfs4errDenied.encode(writer);
                denied.encode(writer);
            }
            Lock4res::Err(status) => status.encode(writer),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lockt4args {
    /* CURRENT_FH: file */
    pub locktype: NfsLockType4,
    pub offset: Offset4,
    pub length: Length4,
    pub owner: LockOwner4,
}

impl XdrDecode for Lockt4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Lockt4args {
            locktype: NfsLockType4::decode(reader)?,
            offset: reader.read_u64()?,
            length: reader.read_u64()?,
            owner: LockOwner4::decode(reader)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Lockt4res {
    Resok4,
    Denied(Lock4denied),
    Err(NfsStat4),
}

impl XdrEncode for Lockt4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Lockt4res::Resok4 => NfsStat4::Nfs4Ok.encode(writer),
            Lockt4res::Denied(denied) => {
                NfsStat4::Nfs4errDenied.encode(writer);
                denied.encode(writer);
            }
            Lockt4res::Err(status) => status.encode(writer),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Locku4args {
    /* CURRENT_FH: file */
    pub locktype: NfsLockType4,
    pub seqid: Seqid4,
    pub lock_stateid: Stateid4,
    pub offset: Offset4,
    pub length: Length4,
}

impl XdrDecode for Locku4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Locku4args {
            locktype: NfsLockType4::decode(reader)?,
            seqid: reader.read_u32()?,
            lock_stateid: Stateid4::decode(reader)?,
            offset: reader.read_u64()?,
            length: reader.read_u64()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Locku4res {
    LockStateid(Stateid4),
    Err(NfsStat4),
}

impl XdrEncode for Locku4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Locku4res::LockStateid(stateid) => {
                NfsStat4::Nfs4Ok.encode(writer);
                stateid.encode(writer);
            }
            Locku4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * LOOKUP: Lookup filename
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lookup4args {
    /* CURRENT_FH: directory */
    pub objname: Component4,
}

impl XdrDecode for Lookup4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Lookup4args {
            objname: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
        })
    }
}

/// A status-only result body, shared by the ops whose success carries no
/// payload (LOOKUP, LOOKUPP, PUTFH, RENEW, DELEGRETURN, ...).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusRes {
    pub status: NfsStat4,
}

impl StatusRes {
    pub fn ok() -> Self {
        StatusRes {
            status: NfsStat4::Nfs4Ok,
        }
    }
}

impl From<NfsStat4> for StatusRes {
    fn from(status: NfsStat4) -> Self {
        StatusRes { status }
    }
}

impl XdrEncode for StatusRes {
    fn encode(&self, writer: &mut XdrWriter) {
        self.status.encode(writer);
    }
}

/*
 * NVERIFY: Verify attributes different / VERIFY: Verify same attributes
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nverify4args {
    /* CURRENT_FH: object */
    pub obj_attributes: Fattr4,
}

impl XdrDecode for Nverify4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Nverify4args {
            obj_attributes: Fattr4::decode(reader)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Verify4args {
    /* CURRENT_FH: object */
    pub obj_attributes: Fattr4,
}

impl XdrDecode for Verify4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Verify4args {
            obj_attributes: Fattr4::decode(reader)?,
        })
    }
}

/*
 * Various definitions for OPEN
 */
pub const OPEN4_SHARE_ACCESS_READ: u32 = 0x00000001;
pub const OPEN4_SHARE_ACCESS_WRITE: u32 = 0x00000002;
pub const OPEN4_SHARE_ACCESS_BOTH: u32 = 0x00000003;

pub const OPEN4_SHARE_DENY_NONE: u32 = 0x00000000;
pub const OPEN4_SHARE_DENY_READ: u32 = 0x00000001;
pub const OPEN4_SHARE_DENY_WRITE: u32 = 0x00000002;
pub const OPEN4_SHARE_DENY_BOTH: u32 = 0x00000003;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CreateHow4 {
    Unchecked4(Fattr4),
    Guarded4(Fattr4),
    Exclusive4(Verifier4),
}

impl XdrDecode for CreateHow4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        match reader.read_u32()? {
            0 => Ok(CreateHow4::Unchecked4(Fattr4::decode(reader)?)),
            1 => Ok(CreateHow4::Guarded4(Fattr4::decode(reader)?)),
            2 => Ok(CreateHow4::Exclusive4(reader.read_fixed()?)),
            d => Err(XdrError::BadDiscriminant(d)),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OpenFlag4 {
    Open4Nocreate,
    How(CreateHow4),
}

impl XdrDecode for OpenFlag4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        match reader.read_u32()? {
            0 => Ok(OpenFlag4::Open4Nocreate),
            1 => Ok(OpenFlag4::How(CreateHow4::decode(reader)?)),
            d => Err(XdrError::BadDiscriminant(d)),
        }
    }
}

/* Next definitions used for OPEN delegation */
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum OpenDelegationType4 {
    OpenDelegateNone = 0,
    OpenDelegateRead = 1,
    OpenDelegateWrite = 2,
}

impl XdrDecode for OpenDelegationType4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let raw = reader.read_u32()?;
        FromPrimitive::from_u32(raw).ok_or(XdrError::BadDiscriminant(raw))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenClaimDelegateCur4 {
    pub delegate_stateid: Stateid4,
    pub file: Component4,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OpenClaim4 {
    /*
     * No special rights to file.
     * Ordinary OPEN of the specified file.
     */
    /* CURRENT_FH: directory */
    ClaimNull(Component4),
    /*
     * Right to the file established by an
     * open previous to server reboot.  File
     * identified by filehandle obtained at
     * that time rather than by name.
     */
    /* CURRENT_FH: file being reclaimed */
    ClaimPrevious(OpenDelegationType4),
    /*
     * Right to file based on a delegation
     * granted by the server.  File is
     * specified by name.
     */
    /* CURRENT_FH: directory */
    ClaimDelegateCur(OpenClaimDelegateCur4),
    /*
     * Right to file based on a delegation
     * granted to a previous boot instance
     * of the client.  File is specified by name.
     */
    /* CURRENT_FH: directory */
    ClaimDelegatePrev(Component4),
}

impl XdrDecode for OpenClaim4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        match reader.read_u32()? {
            0 => Ok(OpenClaim4::ClaimNull(
                reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
            )),
            1 => Ok(OpenClaim4::ClaimPrevious(OpenDelegationType4::decode(
                reader,
            )?)),
            2 => Ok(OpenClaim4::ClaimDelegateCur(OpenClaimDelegateCur4 {
                delegate_stateid: Stateid4::decode(reader)?,
                file: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
            })),
            3 => Ok(OpenClaim4::ClaimDelegatePrev(
                reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
            )),
            d => Err(XdrError::BadDiscriminant(d)),
        }
    }
}

/*
 * OPEN: Open a file, potentially receiving an open delegation
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Open4args {
    pub seqid: Seqid4,
    pub share_access: u32,
    pub share_deny: u32,
    pub owner: OpenOwner4,
    pub openhow: OpenFlag4,
    pub claim: OpenClaim4,
}

impl XdrDecode for Open4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Open4args {
            seqid: reader.read_u32()?,
            share_access: reader.read_u32()?,
            share_deny: reader.read_u32()?,
            owner: OpenOwner4::decode(reader)?,
            openhow: OpenFlag4::decode(reader)?,
            claim: OpenClaim4::decode(reader)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenReadDelegation4 {
    /* Stateid for delegation */
    pub stateid: Stateid4,
    /* Pre-recalled flag for delegations obtained by reclaim */
    pub recall: bool,
    /* Defines users who don't need an ACCESS call to open for read */
    pub permissions: Nfsace4,
}

impl XdrEncode for OpenReadDelegation4 {
    fn encode(&self, writer: &mut XdrWriter) {
        self.stateid.encode(writer);
        writer.write_bool(self.recall);
        self.permissions.encode(writer);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NfsSpaceLimit4 {
    /* limit specified as file size */
    Filesize(u64),
    /* limit specified by number of blocks */
    ModBlocks {
        num_blocks: u32,
        bytes_per_block: u32,
    },
}

impl XdrEncode for NfsSpaceLimit4 {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            NfsSpaceLimit4::Filesize(size) => {
                writer.write_u32(1);
                writer.write_u64(*size);
            }
            NfsSpaceLimit4::ModBlocks {
                num_blocks,
                bytes_per_block,
            } => {
                writer.write_u32(2);
                writer.write_u32(*num_blocks);
                writer.write_u32(*bytes_per_block);
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenWriteDelegation4 {
    pub stateid: Stateid4,
    pub recall: bool,
    /* Condition the client must check to determine whether the file
    needs to be flushed to the server on close. */
    pub space_limit: NfsSpaceLimit4,
    pub permissions: Nfsace4,
}

impl XdrEncode for OpenWriteDelegation4 {
    fn encode(&self, writer: &mut XdrWriter) {
        self.stateid.encode(writer);
        writer.write_bool(self.recall);
        self.space_limit.encode(writer);
        self.permissions.encode(writer);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OpenDelegation4 {
    None,
    Read(OpenReadDelegation4),
    Write(OpenWriteDelegation4),
}

impl XdrEncode for OpenDelegation4 {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            OpenDelegation4::None => writer.write_u32(0),
            OpenDelegation4::Read(read) => {
                writer.write_u32(1);
                read.encode(writer);
            }
            OpenDelegation4::Write(write) => {
                writer.write_u32(2);
                write.encode(writer);
            }
        }
    }
}

/*
 * Result flags
 */
/* Client must confirm open */
pub const OPEN4_RESULT_CONFIRM: u32 = 0x00000002;
/* Type of file locking behavior at the server */
pub const OPEN4_RESULT_LOCKTYPE_POSIX: u32 = 0x00000004;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Open4resok {
    /* Stateid for open */
    pub stateid: Stateid4,
    /* Directory change info */
    pub cinfo: ChangeInfo4,
    /* Result flags */
    pub rflags: u32,
    /* attribute set for create */
    pub attrset: FileAttrList,
    /* Info on any open delegation */
    pub delegation: OpenDelegation4,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Open4res {
    /* CURRENT_FH: opened file */
    Resok4(Open4resok),
    Err(NfsStat4),
}

impl XdrEncode for Open4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Open4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                ok.stateid.encode(writer);
                ok.cinfo.encode(writer);
                writer.write_u32(ok.rflags);
                ok.attrset.encode(writer);
                ok.delegation.encode(writer);
            }
            Open4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * OPENATTR: open named attributes directory (not supported)
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenAttr4args {
    /* CURRENT_FH: object */
    pub createdir: bool,
}

impl XdrDecode for OpenAttr4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(OpenAttr4args {
            createdir: reader.read_bool()?,
        })
    }
}

/*
 * OPEN_CONFIRM: confirm the open
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenConfirm4args {
    /* CURRENT_FH: opened file */
    pub open_stateid: Stateid4,
    pub seqid: Seqid4,
}

impl XdrDecode for OpenConfirm4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(OpenConfirm4args {
            open_stateid: Stateid4::decode(reader)?,
            seqid: reader.read_u32()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OpenConfirm4res {
    Resok4(Stateid4),
    Err(NfsStat4),
}

impl XdrEncode for OpenConfirm4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            OpenConfirm4res::Resok4(open_stateid) => {
                NfsStat4::Nfs4Ok.encode(writer);
                open_stateid.encode(writer);
            }
            OpenConfirm4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * OPEN_DOWNGRADE: downgrade the access/deny bits of an open
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenDowngrade4args {
    /* CURRENT_FH: opened file */
    pub open_stateid: Stateid4,
    pub seqid: Seqid4,
    pub share_access: u32,
    pub share_deny: u32,
}

impl XdrDecode for OpenDowngrade4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(OpenDowngrade4args {
            open_stateid: Stateid4::decode(reader)?,
            seqid: reader.read_u32()?,
            share_access: reader.read_u32()?,
            share_deny: reader.read_u32()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OpenDowngrade4res {
    Resok4(Stateid4),
    Err(NfsStat4),
}

impl XdrEncode for OpenDowngrade4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            OpenDowngrade4res::Resok4(open_stateid) => {
                NfsStat4::Nfs4Ok.encode(writer);
                open_stateid.encode(writer);
            }
            OpenDowngrade4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * PUTFH: Set current filehandle
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PutFh4args {
    pub object: NfsFh4,
}

impl XdrDecode for PutFh4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        // The 128-byte handle bound is a protocol precondition, not a
        // framing limit; decode loosely so the handler can answer
        // BADHANDLE instead of tearing down the compound with BADXDR.
        Ok(PutFh4args {
            object: reader.read_opaque()?,
        })
    }
}

/*
 * READ: Read from file
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Read4args {
    /* CURRENT_FH: file */
    pub stateid: Stateid4,
    pub offset: Offset4,
    pub count: Count4,
}

impl XdrDecode for Read4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Read4args {
            stateid: Stateid4::decode(reader)?,
            offset: reader.read_u64()?,
            count: reader.read_u32()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Read4resok {
    pub eof: bool,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Read4res {
    Resok4(Read4resok),
    Err(NfsStat4),
}

impl XdrEncode for Read4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Read4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_bool(ok.eof);
                writer.write_opaque(&ok.data);
            }
            Read4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * READDIR: Read directory
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Readdir4args {
    /* CURRENT_FH: directory */
    pub cookie: NfsCookie4,
    pub cookieverf: Verifier4,
    pub dircount: Count4,
    pub maxcount: Count4,
    pub attr_request: FileAttrList,
}

impl XdrDecode for Readdir4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Readdir4args {
            cookie: reader.read_u64()?,
            cookieverf: reader.read_fixed()?,
            dircount: reader.read_u32()?,
            maxcount: reader.read_u32()?,
            attr_request: FileAttrList::decode(reader)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry4 {
    pub cookie: NfsCookie4,
    pub name: Component4,
    pub attrs: Fattr4,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirList4 {
    pub entries: Vec<Entry4>,
    pub eof: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadDir4resok {
    pub cookieverf: Verifier4,
    pub reply: DirList4,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReadDir4res {
    Resok4(ReadDir4resok),
    Err(NfsStat4),
}

impl XdrEncode for ReadDir4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            ReadDir4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_fixed(&ok.cookieverf);
                // entry4 list is a value-follows chain on the wire
                for entry in &ok.reply.entries {
                    writer.write_bool(true);
                    writer.write_u64(entry.cookie);
                    writer.write_string(&entry.name);
                    entry.attrs.encode(writer);
                }
                writer.write_bool(false);
                writer.write_bool(ok.reply.eof);
            }
            ReadDir4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * READLINK: Read symbolic link
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReadLink4res {
    Resok4(String),
    Err(NfsStat4),
}

impl XdrEncode for ReadLink4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            ReadLink4res::Resok4(link) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_string(link);
            }
            ReadLink4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * REMOVE: Remove filesystem object
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Remove4args {
    /* CURRENT_FH: directory */
    pub target: Component4,
}

impl XdrDecode for Remove4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Remove4args {
            target: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Remove4res {
    Resok4(ChangeInfo4),
    Err(NfsStat4),
}

impl XdrEncode for Remove4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Remove4res::Resok4(cinfo) => {
                NfsStat4::Nfs4Ok.encode(writer);
                cinfo.encode(writer);
            }
            Remove4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * RENAME: Rename directory entry
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rename4args {
    /* SAVED_FH: source directory */
    pub oldname: Component4,
    /* CURRENT_FH: target directory */
    pub newname: Component4,
}

impl XdrDecode for Rename4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Rename4args {
            oldname: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
            newname: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rename4resok {
    pub source_cinfo: ChangeInfo4,
    pub target_cinfo: ChangeInfo4,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Rename4res {
    Resok4(Rename4resok),
    Err(NfsStat4),
}

impl XdrEncode for Rename4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Rename4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                ok.source_cinfo.encode(writer);
                ok.target_cinfo.encode(writer);
            }
            Rename4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * RENEW: Renew a lease
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Renew4args {
    pub clientid: Clientid4,
}

impl XdrDecode for Renew4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Renew4args {
            clientid: reader.read_u64()?,
        })
    }
}

/*
 * SECINFO: Obtain available security mechanisms
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecInfo4args {
    /* CURRENT_FH: directory */
    pub name: Component4,
}

impl XdrDecode for SecInfo4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(SecInfo4args {
            name: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
        })
    }
}

pub const AUTH_NONE: u32 = 0;
pub const AUTH_SYS: u32 = 1;
pub const RPCSEC_GSS: u32 = 6;

/// One flavor entry of a SECINFO result. RPCSEC_GSS entries carry the
/// flavor info body, plain flavors just the number.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SecInfoFlavor4 {
    Flavor(u32),
    FlavorInfo { oid: Vec<u8>, qop: u32, service: u32 },
}

impl XdrEncode for SecInfoFlavor4 {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            SecInfoFlavor4::Flavor(flavor) => writer.write_u32(*flavor),
            SecInfoFlavor4::FlavorInfo { oid, qop, service } => {
                writer.write_u32(RPCSEC_GSS);
                writer.write_opaque(oid);
                writer.write_u32(*qop);
                writer.write_u32(*service);
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SecInfo4res {
    Resok4(Vec<SecInfoFlavor4>),
    Err(NfsStat4),
}

impl XdrEncode for SecInfo4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            SecInfo4res::Resok4(flavors) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_u32(flavors.len() as u32);
                for flavor in flavors {
                    flavor.encode(writer);
                }
            }
            SecInfo4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * SETATTR: Set attributes
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SetAttr4args {
    /* CURRENT_FH: target object */
    pub stateid: Stateid4,
    pub obj_attributes: Fattr4,
}

impl XdrDecode for SetAttr4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(SetAttr4args {
            stateid: Stateid4::decode(reader)?,
            obj_attributes: Fattr4::decode(reader)?,
        })
    }
}

/// SETATTR reports the attribute set written even on failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SetAttr4res {
    pub status: NfsStat4,
    pub attrsset: FileAttrList,
}

impl XdrEncode for SetAttr4res {
    fn encode(&self, writer: &mut XdrWriter) {
        self.status.encode(writer);
        self.attrsset.encode(writer);
    }
}

/*
 * SETCLIENTID
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SetClientId4args {
    pub client: NfsClientId4,
    pub callback: CbClient4,
    pub callback_ident: u32,
}

impl XdrDecode for SetClientId4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(SetClientId4args {
            client: NfsClientId4::decode(reader)?,
            callback: CbClient4::decode(reader)?,
            callback_ident: reader.read_u32()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SetClientId4resok {
    pub clientid: Clientid4,
    pub setclientid_confirm: Verifier4,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SetClientId4res {
    Resok4(SetClientId4resok),
    ClientInuse(ClientAddr4),
    Err(NfsStat4),
}

impl XdrEncode for SetClientId4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            SetClientId4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_u64(ok.clientid);
                writer.write_fixed(&ok.setclientid_confirm);
            }
            SetClientId4res::ClientInuse(addr) => {
                NfsStat4::Nfs4errClidInuse.encode(writer);
                addr.encode(writer);
            }
            SetClientId4res::Err(status) => status.encode(writer),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SetClientIdConfirm4args {
    pub clientid: Clientid4,
    pub setclientid_confirm: Verifier4,
}

impl XdrDecode for SetClientIdConfirm4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(SetClientIdConfirm4args {
            clientid: reader.read_u64()?,
            setclientid_confirm: reader.read_fixed()?,
        })
    }
}

/*
 * WRITE: Write to file
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum StableHow4 {
    Unstable4 = 0,
    DataSync4 = 1,
    FileSync4 = 2,
}

impl XdrDecode for StableHow4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let raw = reader.read_u32()?;
        FromPrimitive::from_u32(raw).ok_or(XdrError::BadDiscriminant(raw))
    }
}

impl XdrEncode for StableHow4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u32(*self as u32);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Write4args {
    /* CURRENT_FH: file */
    pub stateid: Stateid4,
    pub offset: Offset4,
    pub stable: StableHow4,
    pub data: Vec<u8>,
}

impl XdrDecode for Write4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Write4args {
            stateid: Stateid4::decode(reader)?,
            offset: reader.read_u64()?,
            stable: StableHow4::decode(reader)?,
            data: reader.read_opaque()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Write4resok {
    pub count: Count4,
    pub committed: StableHow4,
    pub writeverf: Verifier4,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Write4res {
    Resok4(Write4resok),
    Err(NfsStat4),
}

impl XdrEncode for Write4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Write4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_u32(ok.count);
                ok.committed.encode(writer);
                writer.write_fixed(&ok.writeverf);
            }
            Write4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * RELEASE_LOCKOWNER: drop residual lock-owner state
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReleaseLockowner4args {
    pub lock_owner: LockOwner4,
}

impl XdrDecode for ReleaseLockowner4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(ReleaseLockowner4args {
            lock_owner: LockOwner4::decode(reader)?,
        })
    }
}

/*
 * Operation numbers
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum NfsOpnum4 {
    OpAccess = 3,
    OpClose = 4,
    OpCommit = 5,
    OpCreate = 6,
    OpDelegPurge = 7,
    OpDelegReturn = 8,
    OpGetattr = 9,
    OpGetfh = 10,
    OpLink = 11,
    OpLock = 12,
    OpLockt = 13,
    OpLocku = 14,
    OpLookup = 15,
    OpLookupP = 16,
    OpNverify = 17,
    OpOpen = 18,
    OpOpenattr = 19,
    OpOpenConfirm = 20,
    OpOpenDowngrade = 21,
    OpPutfh = 22,
    OpPutpubfh = 23,
    OpPutrootfh = 24,
    OpRead = 25,
    OpReaddir = 26,
    OpReadlink = 27,
    OpRemove = 28,
    OpRename = 29,
    OpRenew = 30,
    OpRestorefh = 31,
    OpSavefh = 32,
    OpSecinfo = 33,
    OpSetattr = 34,
    OpSetclientid = 35,
    OpSetclientidConfirm = 36,
    OpVerify = 37,
    OpWrite = 38,
    OpReleaseLockowner = 39,
    /* NFSv4.1 */
    OpBackchannelCtl = 40,
    OpBindConnToSession = 41,
    OpExchangeId = 42,
    OpCreateSession = 43,
    OpDestroySession = 44,
    OpFreeStateid = 45,
    OpGetDirDelegation = 46,
    OpGetdeviceinfo = 47,
    OpGetdevicelist = 48,
    OpLayoutcommit = 49,
    OpLayoutget = 50,
    OpLayoutreturn = 51,
    OpSecinfoNoName = 52,
    OpSequence = 53,
    OpSetSsv = 54,
    OpTestStateid = 55,
    OpWantDelegation = 56,
    OpDestroyClientid = 57,
    OpReclaimComplete = 58,
    OpIllegal = 10044,
}

/// A fully-formed operation result: the opcode followed by the result body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NfsResOp4 {
    OpAccess(Access4res),
    OpClose(Close4res),
    OpCommit(Commit4res),
    OpCreate(Create4res),
    OpDelegPurge(StatusRes),
    OpDelegReturn(StatusRes),
    OpGetattr(Getattr4res),
    OpGetfh(GetFh4res),
    OpLink(Link4res),
    OpLock(Lock4res),
    OpLockt(Lockt4res),
    OpLocku(Locku4res),
    OpLookup(StatusRes),
    OpLookupP(StatusRes),
    OpNverify(StatusRes),
    OpOpen(Open4res),
    OpOpenattr(StatusRes),
    OpOpenConfirm(OpenConfirm4res),
    OpOpenDowngrade(OpenDowngrade4res),
    OpPutfh(StatusRes),
    OpPutpubfh(StatusRes),
    OpPutrootfh(StatusRes),
    OpRead(Read4res),
    OpReaddir(ReadDir4res),
    OpReadlink(ReadLink4res),
    OpRemove(Remove4res),
    OpRename(Rename4res),
    OpRenew(StatusRes),
    OpRestorefh(StatusRes),
    OpSavefh(StatusRes),
    OpSecinfo(SecInfo4res),
    OpSetattr(SetAttr4res),
    OpSetclientid(SetClientId4res),
    OpSetclientidConfirm(StatusRes),
    OpVerify(StatusRes),
    OpWrite(Write4res),
    OpReleaseLockowner(StatusRes),
    /* NFSv4.1 */
    OpBackchannelCtl(StatusRes),
    OpBindConnToSession(BindConnToSession4res),
    OpExchangeId(ExchangeId4res),
    OpCreateSession(CreateSession4res),
    OpDestroySession(StatusRes),
    OpFreeStateid(StatusRes),
    OpGetDirDelegation(StatusRes),
    OpGetdeviceinfo(StatusRes),
    OpGetdevicelist(StatusRes),
    OpLayoutcommit(StatusRes),
    OpLayoutget(StatusRes),
    OpLayoutreturn(StatusRes),
    OpSecinfoNoName(SecInfo4res),
    OpSequence(Sequence4res),
    OpSetSsv(StatusRes),
    OpTestStateid(TestStateid4res),
    OpWantDelegation(StatusRes),
    OpDestroyClientid(StatusRes),
    OpReclaimComplete(StatusRes),
    OpIllegal(StatusRes),
}

impl NfsResOp4 {
    pub fn opnum(&self) -> NfsOpnum4 {
        match self {
            NfsResOp4::OpAccess(_) => NfsOpnum4::OpAccess,
            NfsResOp4::OpClose(_) => NfsOpnum4::OpClose,
            NfsResOp4::OpCommit(_) => NfsOpnum4::OpCommit,
            NfsResOp4::OpCreate(_) => NfsOpnum4::OpCreate,
            NfsResOp4::OpDelegPurge(_) => NfsOpnum4::OpDelegPurge,
            NfsResOp4::OpDelegReturn(_) => NfsOpnum4::OpDelegReturn,
            NfsResOp4::OpGetattr(_) => NfsOpnum4::OpGetattr,
            NfsResOp4::OpGetfh(_) => NfsOpnum4::OpGetfh,
            NfsResOp4::OpLink(_) => NfsOpnum4::OpLink,
            NfsResOp4::OpLock(_) => NfsOpnum4::OpLock,
            NfsResOp4::OpLockt(_) => NfsOpnum4::OpLockt,
            NfsResOp4::OpLocku(_) => NfsOpnum4::OpLocku,
            NfsResOp4::OpLookup(_) => NfsOpnum4::OpLookup,
            NfsResOp4::OpLookupP(_) => NfsOpnum4::OpLookupP,
            NfsResOp4::OpNverify(_) => NfsOpnum4::OpNverify,
            NfsResOp4::OpOpen(_) => NfsOpnum4::OpOpen,
            NfsResOp4::OpOpenattr(_) => NfsOpnum4::OpOpenattr,
            NfsResOp4::OpOpenConfirm(_) => NfsOpnum4::OpOpenConfirm,
            NfsResOp4::OpOpenDowngrade(_) => NfsOpnum4::OpOpenDowngrade,
            NfsResOp4::OpPutfh(_) => NfsOpnum4::OpPutfh,
            NfsResOp4::OpPutpubfh(_) => NfsOpnum4::OpPutpubfh,
            NfsResOp4::OpPutrootfh(_) => NfsOpnum4::OpPutrootfh,
            NfsResOp4::OpRead(_) => NfsOpnum4::OpRead,
            NfsResOp4::OpReaddir(_) => NfsOpnum4::OpReaddir,
            NfsResOp4::OpReadlink(_) => NfsOpnum4::OpReadlink,
            NfsResOp4::OpRemove(_) => NfsOpnum4::OpRemove,
            NfsResOp4::OpRename(_) => NfsOpnum4::OpRename,
            NfsResOp4::OpRenew(_) => NfsOpnum4::OpRenew,
            NfsResOp4::OpRestorefh(_) => NfsOpnum4::OpRestorefh,
            NfsResOp4::OpSavefh(_) => NfsOpnum4::OpSavefh,
            NfsResOp4::OpSecinfo(_) => NfsOpnum4::OpSecinfo,
            NfsResOp4::OpSetattr(_) => NfsOpnum4::OpSetattr,
            NfsResOp4::OpSetclientid(_) => NfsOpnum4::OpSetclientid,
            NfsResOp4::OpSetclientidConfirm(_) => NfsOpnum4::OpSetclientidConfirm,
            NfsResOp4::OpVerify(_) => NfsOpnum4::OpVerify,
            NfsResOp4::OpWrite(_) => NfsOpnum4::OpWrite,
            NfsResOp4::OpReleaseLockowner(_) => NfsOpnum4::OpReleaseLockowner,
            NfsResOp4::OpBackchannelCtl(_) => NfsOpnum4::OpBackchannelCtl,
            NfsResOp4::OpBindConnToSession(_) => NfsOpnum4::OpBindConnToSession,
            NfsResOp4::OpExchangeId(_) => NfsOpnum4::OpExchangeId,
            NfsResOp4::OpCreateSession(_) => NfsOpnum4::OpCreateSession,
            NfsResOp4::OpDestroySession(_) => NfsOpnum4::OpDestroySession,
            NfsResOp4::OpFreeStateid(_) => NfsOpnum4::OpFreeStateid,
            NfsResOp4::OpGetDirDelegation(_) => NfsOpnum4::OpGetDirDelegation,
            NfsResOp4::OpGetdeviceinfo(_) => NfsOpnum4::OpGetdeviceinfo,
            NfsResOp4::OpGetdevicelist(_) => NfsOpnum4::OpGetdevicelist,
            NfsResOp4::OpLayoutcommit(_) => NfsOpnum4::OpLayoutcommit,
            NfsResOp4::OpLayoutget(_) => NfsOpnum4::OpLayoutget,
            NfsResOp4::OpLayoutreturn(_) => NfsOpnum4::OpLayoutreturn,
            NfsResOp4::OpSecinfoNoName(_) => NfsOpnum4::OpSecinfoNoName,
            NfsResOp4::OpSequence(_) => NfsOpnum4::OpSequence,
            NfsResOp4::OpSetSsv(_) => NfsOpnum4::OpSetSsv,
            NfsResOp4::OpTestStateid(_) => NfsOpnum4::OpTestStateid,
            NfsResOp4::OpWantDelegation(_) => NfsOpnum4::OpWantDelegation,
            NfsResOp4::OpDestroyClientid(_) => NfsOpnum4::OpDestroyClientid,
            NfsResOp4::OpReclaimComplete(_) => NfsOpnum4::OpReclaimComplete,
            NfsResOp4::OpIllegal(_) => NfsOpnum4::OpIllegal,
        }
    }

    /// Builds the status-only result body for `opnum`, used by the
    /// dispatcher when a handler failed without producing a payload.
    pub fn error(opnum: NfsOpnum4, status: NfsStat4) -> NfsResOp4 {
        let res = StatusRes { status };
        match opnum {
            NfsOpnum4::OpAccess => NfsResOp4::OpAccess(Access4res::Err(status)),
            NfsOpnum4::OpClose => NfsResOp4::OpClose(Close4res::Err(status)),
            NfsOpnum4::OpCommit => NfsResOp4::OpCommit(Commit4res::Err(status)),
            NfsOpnum4::OpCreate => NfsResOp4::OpCreate(Create4res::Err(status)),
            NfsOpnum4::OpDelegPurge => NfsResOp4::OpDelegPurge(res),
            NfsOpnum4::OpDelegReturn => NfsResOp4::OpDelegReturn(res),
            NfsOpnum4::OpGetattr => NfsResOp4::OpGetattr(Getattr4res::Err(status)),
            NfsOpnum4::OpGetfh => NfsResOp4::OpGetfh(GetFh4res::Err(status)),
            NfsOpnum4::OpLink => NfsResOp4::OpLink(Link4res::Err(status)),
            NfsOpnum4::OpLock => NfsResOp4::OpLock(Lock4res::Err(status)),
            NfsOpnum4::OpLockt => NfsResOp4::OpLockt(Lockt4res::Err(status)),
            NfsOpnum4::OpLocku => NfsResOp4::OpLocku(Locku4res::Err(status)),
            NfsOpnum4::OpLookup => NfsResOp4::OpLookup(res),
            NfsOpnum4::OpLookupP => NfsResOp4::OpLookupP(res),
            NfsOpnum4::OpNverify => NfsResOp4::OpNverify(res),
            NfsOpnum4::OpOpen => NfsResOp4::OpOpen(Open4res::Err(status)),
            NfsOpnum4::OpOpenattr => NfsResOp4::OpOpenattr(res),
            NfsOpnum4::OpOpenConfirm => NfsResOp4::OpOpenConfirm(OpenConfirm4res::Err(status)),
            NfsOpnum4::OpOpenDowngrade => {
                NfsResOp4::OpOpenDowngrade(OpenDowngrade4res::Err(status))
            }
            NfsOpnum4::OpPutfh => NfsResOp4::OpPutfh(res),
            NfsOpnum4::OpPutpubfh => NfsResOp4::OpPutpubfh(res),
            NfsOpnum4::OpPutrootfh => NfsResOp4::OpPutrootfh(res),
            NfsOpnum4::OpRead => NfsResOp4::OpRead(Read4res::Err(status)),
            NfsOpnum4::OpReaddir => NfsResOp4::OpReaddir(ReadDir4res::Err(status)),
            NfsOpnum4::OpReadlink => NfsResOp4::OpReadlink(ReadLink4res::Err(status)),
            NfsOpnum4::OpRemove => NfsResOp4::OpRemove(Remove4res::Err(status)),
            NfsOpnum4::OpRename => NfsResOp4::OpRename(Rename4res::Err(status)),
            NfsOpnum4::OpRenew => NfsResOp4::OpRenew(res),
            NfsOpnum4::OpRestorefh => NfsResOp4::OpRestorefh(res),
            NfsOpnum4::OpSavefh => NfsResOp4::OpSavefh(res),
            NfsOpnum4::OpSecinfo => NfsResOp4::OpSecinfo(SecInfo4res::Err(status)),
            NfsOpnum4::OpSetattr => NfsResOp4::OpSetattr(SetAttr4res {
                status,
                attrsset: FileAttrList::default(),
            }),
            NfsOpnum4::OpSetclientid => NfsResOp4::OpSetclientid(SetClientId4res::Err(status)),
            NfsOpnum4::OpSetclientidConfirm => NfsResOp4::OpSetclientidConfirm(res),
            NfsOpnum4::OpVerify => NfsResOp4::OpVerify(res),
            NfsOpnum4::OpWrite => NfsResOp4::OpWrite(Write4res::Err(status)),
            NfsOpnum4::OpReleaseLockowner => NfsResOp4::OpReleaseLockowner(res),
            NfsOpnum4::OpBackchannelCtl => NfsResOp4::OpBackchannelCtl(res),
            NfsOpnum4::OpBindConnToSession => {
                NfsResOp4::OpBindConnToSession(BindConnToSession4res::Err(status))
            }
            NfsOpnum4::OpExchangeId => NfsResOp4::OpExchangeId(ExchangeId4res::Err(status)),
            NfsOpnum4::OpCreateSession => {
                NfsResOp4::OpCreateSession(CreateSession4res::Err(status))
            }
            NfsOpnum4::OpDestroySession => NfsResOp4::OpDestroySession(res),
            NfsOpnum4::OpFreeStateid => NfsResOp4::OpFreeStateid(res),
            NfsOpnum4::OpGetDirDelegation => NfsResOp4::OpGetDirDelegation(res),
            NfsOpnum4::OpGetdeviceinfo => NfsResOp4::OpGetdeviceinfo(res),
            NfsOpnum4::OpGetdevicelist => NfsResOp4::OpGetdevicelist(res),
            NfsOpnum4::OpLayoutcommit => NfsResOp4::OpLayoutcommit(res),
            NfsOpnum4::OpLayoutget => NfsResOp4::OpLayoutget(res),
            NfsOpnum4::OpLayoutreturn => NfsResOp4::OpLayoutreturn(res),
            NfsOpnum4::OpSecinfoNoName => NfsResOp4::OpSecinfoNoName(SecInfo4res::Err(status)),
            NfsOpnum4::OpSequence => NfsResOp4::OpSequence(Sequence4res::Err(status)),
            NfsOpnum4::OpSetSsv => NfsResOp4::OpSetSsv(res),
            NfsOpnum4::OpTestStateid => NfsResOp4::OpTestStateid(TestStateid4res::Err(status)),
            NfsOpnum4::OpWantDelegation => NfsResOp4::OpWantDelegation(res),
            NfsOpnum4::OpDestroyClientid => NfsResOp4::OpDestroyClientid(res),
            NfsOpnum4::OpReclaimComplete => NfsResOp4::OpReclaimComplete(res),
            NfsOpnum4::OpIllegal => NfsResOp4::OpIllegal(res),
        }
    }
}

impl XdrEncode for NfsResOp4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u32(self.opnum() as u32);
        match self {
            NfsResOp4::OpAccess(r) => r.encode(writer),
            NfsResOp4::OpClose(r) => r.encode(writer),
            NfsResOp4::OpCommit(r) => r.encode(writer),
            NfsResOp4::OpCreate(r) => r.encode(writer),
            NfsResOp4::OpDelegPurge(r) => r.encode(writer),
            NfsResOp4::OpDelegReturn(r) => r.encode(writer),
            NfsResOp4::OpGetattr(r) => r.encode(writer),
            NfsResOp4::OpGetfh(r) => r.encode(writer),
            NfsResOp4::OpLink(r) => r.encode(writer),
            NfsResOp4::OpLock(r) => r.encode(writer),
            NfsResOp4::OpLockt(r) => r.encode(writer),
            NfsResOp4::OpLocku(r) => r.encode(writer),
            NfsResOp4::OpLookup(r) => r.encode(writer),
            NfsResOp4::OpLookupP(r) => r.encode(writer),
            NfsResOp4::OpNverify(r) => r.encode(writer),
            NfsResOp4::OpOpen(r) => r.encode(writer),
            NfsResOp4::OpOpenattr(r) => r.encode(writer),
            NfsResOp4::OpOpenConfirm(r) => r.encode(writer),
            NfsResOp4::OpOpenDowngrade(r) => r.encode(writer),
            NfsResOp4::OpPutfh(r) => r.encode(writer),
            NfsResOp4::OpPutpubfh(r) => r.encode(writer),
            NfsResOp4::OpPutrootfh(r) => r.encode(writer),
            NfsResOp4::OpRead(r) => r.encode(writer),
            NfsResOp4::OpReaddir(r) => r.encode(writer),
            NfsResOp4::OpReadlink(r) => r.encode(writer),
            NfsResOp4::OpRemove(r) => r.encode(writer),
            NfsResOp4::OpRename(r) => r.encode(writer),
            NfsResOp4::OpRenew(r) => r.encode(writer),
            NfsResOp4::OpRestorefh(r) => r.encode(writer),
            NfsResOp4::OpSavefh(r) => r.encode(writer),
            NfsResOp4::OpSecinfo(r) => r.encode(writer),
            NfsResOp4::OpSetattr(r) => r.encode(writer),
            NfsResOp4::OpSetclientid(r) => r.encode(writer),
            NfsResOp4::OpSetclientidConfirm(r) => r.encode(writer),
            NfsResOp4::OpVerify(r) => r.encode(writer),
            NfsResOp4::OpWrite(r) => r.encode(writer),
            NfsResOp4::OpReleaseLockowner(r) => r.encode(writer),
            NfsResOp4::OpBackchannelCtl(r) => r.encode(writer),
            NfsResOp4::OpBindConnToSession(r) => r.encode(writer),
            NfsResOp4::OpExchangeId(r) => r.encode(writer),
            NfsResOp4::OpCreateSession(r) => r.encode(writer),
            NfsResOp4::OpDestroySession(r) => r.encode(writer),
            NfsResOp4::OpFreeStateid(r) => r.encode(writer),
            NfsResOp4::OpGetDirDelegation(r) => r.encode(writer),
            NfsResOp4::OpGetdeviceinfo(r) => r.encode(writer),
            NfsResOp4::OpGetdevicelist(r) => r.encode(writer),
            NfsResOp4::OpLayoutcommit(r) => r.encode(writer),
            NfsResOp4::OpLayoutget(r) => r.encode(writer),
            NfsResOp4::OpLayoutreturn(r) => r.encode(writer),
            NfsResOp4::OpSecinfoNoName(r) => r.encode(writer),
            NfsResOp4::OpSequence(r) => r.encode(writer),
            NfsResOp4::OpSetSsv(r) => r.encode(writer),
            NfsResOp4::OpTestStateid(r) => r.encode(writer),
            NfsResOp4::OpWantDelegation(r) => r.encode(writer),
            NfsResOp4::OpDestroyClientid(r) => r.encode(writer),
            NfsResOp4::OpReclaimComplete(r) => r.encode(writer),
            NfsResOp4::OpIllegal(r) => r.encode(writer),
        }
    }
}

/*
 * COMPOUND envelope
 */

/// The fixed prefix of COMPOUND4args. The operation array that follows is
/// consumed op-by-op by the dispatcher so each handler owns its own args.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompoundHeader {
    pub tag: String,
    pub minorversion: u32,
    pub numops: u32,
}

impl XdrDecode for CompoundHeader {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(CompoundHeader {
            tag: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
            minorversion: reader.read_u32()?,
            numops: reader.read_u32()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Compound4res {
    pub status: NfsStat4,
    pub tag: String,
    pub resarray: Vec<NfsResOp4>,
}

impl XdrEncode for Compound4res {
    fn encode(&self, writer: &mut XdrWriter) {
        self.status.encode(writer);
        writer.write_string(&self.tag);
        writer.write_u32(self.resarray.len() as u32);
        for res in &self.resarray {
            res.encode(writer);
        }
    }
}

/*
 * NFS4 callback procedure definitions
 */
pub const OP_CB_GETATTR: u32 = 3;
pub const OP_CB_RECALL: u32 = 4;
pub const OP_CB_SEQUENCE: u32 = 11;
pub const OP_CB_NOTIFY: u32 = 12;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CbRecall4args {
    pub stateid: Stateid4,
    pub truncate: bool,
    pub fh: NfsFh4,
}

impl XdrEncode for CbRecall4args {
    fn encode(&self, writer: &mut XdrWriter) {
        self.stateid.encode(writer);
        writer.write_bool(self.truncate);
        writer.write_opaque(&self.fh);
    }
}

/// Directory notification kinds carried by CB_NOTIFY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum Notify4 {
    ChangeChildAttrs = 0,
    ChangeDirAttrs = 1,
    RemoveEntry = 2,
    AddEntry = 3,
    RenameEntry = 4,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdr::{XdrReader, XdrWriter};

    #[test]
    fn stateid_roundtrip() {
        let stateid = Stateid4 {
            seqid: 7,
            other: [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
        };
        let mut w = XdrWriter::new();
        stateid.encode(&mut w);
        // seqid + 12 bytes, already aligned
        assert_eq!(w.len(), 16);
        let bytes = w.into_bytes();
        let mut r = XdrReader::new(&bytes);
        assert_eq!(Stateid4::decode(&mut r).unwrap(), stateid);
    }

    #[test]
    fn special_stateids() {
        assert!(Stateid4::anonymous().is_anonymous());
        assert!(Stateid4::read_bypass().is_read_bypass());
        assert!(Stateid4::anonymous().is_special());
        assert!(!Stateid4 {
            seqid: 1,
            other: [0; 12]
        }
        .is_special());
    }

    #[test]
    fn status_code_registry() {
        assert_eq!(NfsStat4::Nfs4errBadxdr as u32, 10036);
        assert_eq!(NfsStat4::Nfs4errSeqMisordered as u32, 10063);
        assert_eq!(NfsStat4::Nfs4errOpNotInSession as u32, 10071);
        let parsed: NfsStat4 = FromPrimitive::from_u32(10013).unwrap();
        assert_eq!(parsed, NfsStat4::Nfs4errGrace);
    }

    #[test]
    fn opnum_registry_covers_both_minor_versions() {
        let access: NfsOpnum4 = FromPrimitive::from_u32(3).unwrap();
        assert_eq!(access, NfsOpnum4::OpAccess);
        let sequence: NfsOpnum4 = FromPrimitive::from_u32(53).unwrap();
        assert_eq!(sequence, NfsOpnum4::OpSequence);
        let reclaim: NfsOpnum4 = FromPrimitive::from_u32(58).unwrap();
        assert_eq!(reclaim, NfsOpnum4::OpReclaimComplete);
        assert!(<NfsOpnum4 as FromPrimitive>::from_u32(59).is_none());
        let illegal: NfsOpnum4 = FromPrimitive::from_u32(10044).unwrap();
        assert_eq!(illegal, NfsOpnum4::OpIllegal);
    }

    #[test]
    fn locker_union_decode() {
        let mut w = XdrWriter::new();
        w.write_bool(false);
        Stateid4::anonymous().encode(&mut w);
        w.write_u32(3);
        let bytes = w.into_bytes();
        let mut r = XdrReader::new(&bytes);
        match Locker4::decode(&mut r).unwrap() {
            Locker4::LockOwner(existing) => {
                assert_eq!(existing.lock_seqid, 3);
                assert!(existing.lock_stateid.is_anonymous());
            }
            other => panic!("wrong arm: {:?}", other),
        }
    }

    #[test]
    fn error_result_is_status_only() {
        let res = NfsResOp4::error(NfsOpnum4::OpOpen, NfsStat4::Nfs4errShareDenied);
        let mut w = XdrWriter::new();
        res.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = XdrReader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), NfsOpnum4::OpOpen as u32);
        assert_eq!(r.read_u32().unwrap(), NfsStat4::Nfs4errShareDenied as u32);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn compound_res_encodes_tag_and_count() {
        let res = Compound4res {
            status: NfsStat4::Nfs4Ok,
            tag: "t".to_string(),
            resarray: vec![NfsResOp4::OpPutrootfh(StatusRes::ok())],
        };
        let mut w = XdrWriter::new();
        res.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = XdrReader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), 0); // overall status
        assert_eq!(r.read_string().unwrap(), "t");
        assert_eq!(r.read_u32().unwrap(), 1); // numres
        assert_eq!(r.read_u32().unwrap(), NfsOpnum4::OpPutrootfh as u32);
        assert_eq!(r.read_u32().unwrap(), 0);
    }
}
