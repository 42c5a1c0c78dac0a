//! NFSv4.1 operation types (RFC 8881), in the same register as the v4.0
//! registry: RFC field names, explicit decode/encode, unions matched by
//! discriminant.

use crate::nfs4_proto::{
    Clientid4, NfsStat4, Nfstime4, SessionId4, Slotid4, Stateid4, Verifier4, NFS4_OPAQUE_LIMIT,
};
use crate::xdr::{XdrDecode, XdrEncode, XdrError, XdrReader, XdrResult, XdrWriter};

/*
 * EXCHANGE_ID flags, RFC 8881 section 18.35
 */
pub const EXCHGID4_FLAG_SUPP_MOVED_REFER: u32 = 0x00000001;
pub const EXCHGID4_FLAG_SUPP_MOVED_MIGR: u32 = 0x00000002;
pub const EXCHGID4_FLAG_BIND_PRINC_STATEID: u32 = 0x00000100;
pub const EXCHGID4_FLAG_USE_NON_PNFS: u32 = 0x00010000;
pub const EXCHGID4_FLAG_USE_PNFS_MDS: u32 = 0x00020000;
pub const EXCHGID4_FLAG_USE_PNFS_DS: u32 = 0x00040000;
pub const EXCHGID4_FLAG_MASK_PNFS: u32 = 0x00070000;
pub const EXCHGID4_FLAG_UPD_CONFIRMED_REC_A: u32 = 0x40000000;
pub const EXCHGID4_FLAG_CONFIRMED_R: u32 = 0x80000000;

/*
 * CREATE_SESSION flags
 */
pub const CREATE_SESSION4_FLAG_PERSIST: u32 = 0x00000001;
pub const CREATE_SESSION4_FLAG_CONN_BACK_CHAN: u32 = 0x00000002;
pub const CREATE_SESSION4_FLAG_CONN_RDMA: u32 = 0x00000004;

/*
 * SEQUENCE status flags
 */
pub const SEQ4_STATUS_CB_PATH_DOWN: u32 = 0x00000001;
pub const SEQ4_STATUS_LEASE_MOVED: u32 = 0x00000008;
pub const SEQ4_STATUS_RESTART_RECLAIM_NEEDED: u32 = 0x00000080;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOwner4 {
    pub co_verifier: Verifier4,
    pub co_ownerid: Vec<u8>,
}

impl XdrDecode for ClientOwner4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(ClientOwner4 {
            co_verifier: reader.read_fixed()?,
            co_ownerid: reader.read_opaque_max(NFS4_OPAQUE_LIMIT)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerOwner4 {
    pub so_minor_id: u64,
    pub so_major_id: Vec<u8>,
}

impl XdrEncode for ServerOwner4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u64(self.so_minor_id);
        writer.write_opaque(&self.so_major_id);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NfsImplId4 {
    pub nii_domain: String,
    pub nii_name: String,
    pub nii_date: Nfstime4,
}

impl XdrDecode for NfsImplId4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(NfsImplId4 {
            nii_domain: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
            nii_name: reader.read_string_max(NFS4_OPAQUE_LIMIT)?,
            nii_date: Nfstime4::decode(reader)?,
        })
    }
}

impl XdrEncode for NfsImplId4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_string(&self.nii_domain);
        writer.write_string(&self.nii_name);
        self.nii_date.encode(writer);
    }
}

/*
 * State protection. Only SP4_NONE is granted by this server; the other
 * arms are decoded so the compound stream stays aligned.
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StateProtect4A {
    None,
    MachCred {
        spo_must_enforce: Vec<u32>,
        spo_must_allow: Vec<u32>,
    },
    Ssv {
        spo_must_enforce: Vec<u32>,
        spo_must_allow: Vec<u32>,
        ssp_hash_algs: Vec<Vec<u8>>,
        ssp_encr_algs: Vec<Vec<u8>>,
        ssp_window: u32,
        ssp_num_gss_handles: u32,
    },
}

fn read_oid_array(reader: &mut XdrReader<'_>) -> XdrResult<Vec<Vec<u8>>> {
    let count = reader.read_u32()? as usize;
    if count > 16 {
        return Err(XdrError::LimitExceeded {
            length: count,
            limit: 16,
        });
    }
    let mut oids = Vec::with_capacity(count);
    for _ in 0..count {
        oids.push(reader.read_opaque_max(NFS4_OPAQUE_LIMIT)?);
    }
    Ok(oids)
}

impl XdrDecode for StateProtect4A {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        match reader.read_u32()? {
            0 => Ok(StateProtect4A::None),
            1 => Ok(StateProtect4A::MachCred {
                spo_must_enforce: reader.read_bitmap()?,
                spo_must_allow: reader.read_bitmap()?,
            }),
            2 => Ok(StateProtect4A::Ssv {
                spo_must_enforce: reader.read_bitmap()?,
                spo_must_allow: reader.read_bitmap()?,
                ssp_hash_algs: read_oid_array(reader)?,
                ssp_encr_algs: read_oid_array(reader)?,
                ssp_window: reader.read_u32()?,
                ssp_num_gss_handles: reader.read_u32()?,
            }),
            d => Err(XdrError::BadDiscriminant(d)),
        }
    }
}

/*
 * EXCHANGE_ID: instantiate the client ID
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExchangeId4args {
    pub eia_clientowner: ClientOwner4,
    pub eia_flags: u32,
    pub eia_state_protect: StateProtect4A,
    pub eia_client_impl_id: Option<NfsImplId4>,
}

impl XdrDecode for ExchangeId4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let eia_clientowner = ClientOwner4::decode(reader)?;
        let eia_flags = reader.read_u32()?;
        let eia_state_protect = StateProtect4A::decode(reader)?;
        // client impl id is an array bounded at one element
        let impl_count = reader.read_u32()?;
        let eia_client_impl_id = match impl_count {
            0 => None,
            1 => Some(NfsImplId4::decode(reader)?),
            d => return Err(XdrError::BadDiscriminant(d)),
        };
        Ok(ExchangeId4args {
            eia_clientowner,
            eia_flags,
            eia_state_protect,
            eia_client_impl_id,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExchangeId4resok {
    pub eir_clientid: Clientid4,
    pub eir_sequenceid: u32,
    pub eir_flags: u32,
    /* state protect: SP4_NONE only */
    pub eir_server_owner: ServerOwner4,
    pub eir_server_scope: Vec<u8>,
    pub eir_server_impl_id: Option<NfsImplId4>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExchangeId4res {
    Resok4(ExchangeId4resok),
    Err(NfsStat4),
}

impl XdrEncode for ExchangeId4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            ExchangeId4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_u64(ok.eir_clientid);
                writer.write_u32(ok.eir_sequenceid);
                writer.write_u32(ok.eir_flags);
                writer.write_u32(0); // SP4_NONE
                ok.eir_server_owner.encode(writer);
                writer.write_opaque(&ok.eir_server_scope);
                match &ok.eir_server_impl_id {
                    Some(impl_id) => {
                        writer.write_u32(1);
                        impl_id.encode(writer);
                    }
                    None => writer.write_u32(0),
                }
            }
            ExchangeId4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * Channel attributes, negotiated at CREATE_SESSION
 */
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChannelAttrs4 {
    pub ca_headerpadsize: u32,
    pub ca_maxrequestsize: u32,
    pub ca_maxresponsesize: u32,
    pub ca_maxresponsesize_cached: u32,
    pub ca_maxoperations: u32,
    pub ca_maxrequests: u32,
    pub ca_rdma_ird: Option<u32>,
}

impl XdrDecode for ChannelAttrs4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let ca_headerpadsize = reader.read_u32()?;
        let ca_maxrequestsize = reader.read_u32()?;
        let ca_maxresponsesize = reader.read_u32()?;
        let ca_maxresponsesize_cached = reader.read_u32()?;
        let ca_maxoperations = reader.read_u32()?;
        let ca_maxrequests = reader.read_u32()?;
        let ird_count = reader.read_u32()?;
        let ca_rdma_ird = match ird_count {
            0 => None,
            1 => Some(reader.read_u32()?),
            d => return Err(XdrError::BadDiscriminant(d)),
        };
        Ok(ChannelAttrs4 {
            ca_headerpadsize,
            ca_maxrequestsize,
            ca_maxresponsesize,
            ca_maxresponsesize_cached,
            ca_maxoperations,
            ca_maxrequests,
            ca_rdma_ird,
        })
    }
}

impl XdrEncode for ChannelAttrs4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u32(self.ca_headerpadsize);
        writer.write_u32(self.ca_maxrequestsize);
        writer.write_u32(self.ca_maxresponsesize);
        writer.write_u32(self.ca_maxresponsesize_cached);
        writer.write_u32(self.ca_maxoperations);
        writer.write_u32(self.ca_maxrequests);
        match self.ca_rdma_ird {
            Some(ird) => {
                writer.write_u32(1);
                writer.write_u32(ird);
            }
            None => writer.write_u32(0),
        }
    }
}

/*
 * Callback channel security parameters
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CallbackSecParms4 {
    AuthNone,
    AuthSys {
        stamp: u32,
        machinename: String,
        uid: u32,
        gid: u32,
        gids: Vec<u32>,
    },
    RpcsecGss {
        service: u32,
        handle_from_server: Vec<u8>,
        handle_from_client: Vec<u8>,
    },
}

impl XdrDecode for CallbackSecParms4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        match reader.read_u32()? {
            0 => Ok(CallbackSecParms4::AuthNone),
            1 => {
                let stamp = reader.read_u32()?;
                let machinename = reader.read_string_max(NFS4_OPAQUE_LIMIT)?;
                let uid = reader.read_u32()?;
                let gid = reader.read_u32()?;
                let gid_count = reader.read_u32()? as usize;
                if gid_count > 16 {
                    return Err(XdrError::LimitExceeded {
                        length: gid_count,
                        limit: 16,
                    });
                }
                let mut gids = Vec::with_capacity(gid_count);
                for _ in 0..gid_count {
                    gids.push(reader.read_u32()?);
                }
                Ok(CallbackSecParms4::AuthSys {
                    stamp,
                    machinename,
                    uid,
                    gid,
                    gids,
                })
            }
            6 => Ok(CallbackSecParms4::RpcsecGss {
                service: reader.read_u32()?,
                handle_from_server: reader.read_opaque_max(NFS4_OPAQUE_LIMIT)?,
                handle_from_client: reader.read_opaque_max(NFS4_OPAQUE_LIMIT)?,
            }),
            d => Err(XdrError::BadDiscriminant(d)),
        }
    }
}

/*
 * CREATE_SESSION
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateSession4args {
    pub csa_clientid: Clientid4,
    pub csa_sequence: u32,
    pub csa_flags: u32,
    pub csa_fore_chan_attrs: ChannelAttrs4,
    pub csa_back_chan_attrs: ChannelAttrs4,
    pub csa_cb_program: u32,
    pub csa_sec_parms: Vec<CallbackSecParms4>,
}

impl XdrDecode for CreateSession4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let csa_clientid = reader.read_u64()?;
        let csa_sequence = reader.read_u32()?;
        let csa_flags = reader.read_u32()?;
        let csa_fore_chan_attrs = ChannelAttrs4::decode(reader)?;
        let csa_back_chan_attrs = ChannelAttrs4::decode(reader)?;
        let csa_cb_program = reader.read_u32()?;
        let parm_count = reader.read_u32()? as usize;
        if parm_count > 16 {
            return Err(XdrError::LimitExceeded {
                length: parm_count,
                limit: 16,
            });
        }
        let mut csa_sec_parms = Vec::with_capacity(parm_count);
        for _ in 0..parm_count {
            csa_sec_parms.push(CallbackSecParms4::decode(reader)?);
        }
        Ok(CreateSession4args {
            csa_clientid,
            csa_sequence,
            csa_flags,
            csa_fore_chan_attrs,
            csa_back_chan_attrs,
            csa_cb_program,
            csa_sec_parms,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateSession4resok {
    pub csr_sessionid: SessionId4,
    pub csr_sequence: u32,
    pub csr_flags: u32,
    pub csr_fore_chan_attrs: ChannelAttrs4,
    pub csr_back_chan_attrs: ChannelAttrs4,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CreateSession4res {
    Resok4(CreateSession4resok),
    Err(NfsStat4),
}

impl XdrEncode for CreateSession4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            CreateSession4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_fixed(&ok.csr_sessionid);
                writer.write_u32(ok.csr_sequence);
                writer.write_u32(ok.csr_flags);
                ok.csr_fore_chan_attrs.encode(writer);
                ok.csr_back_chan_attrs.encode(writer);
            }
            CreateSession4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * DESTROY_SESSION
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DestroySession4args {
    pub dsa_sessionid: SessionId4,
}

impl XdrDecode for DestroySession4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(DestroySession4args {
            dsa_sessionid: reader.read_fixed()?,
        })
    }
}

/*
 * BIND_CONN_TO_SESSION
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelDirFromClient4 {
    Fore,
    Back,
    ForeOrBoth,
    BackOrBoth,
}

impl XdrDecode for ChannelDirFromClient4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        match reader.read_u32()? {
            1 => Ok(ChannelDirFromClient4::Fore),
            2 => Ok(ChannelDirFromClient4::Back),
            3 => Ok(ChannelDirFromClient4::ForeOrBoth),
            4 => Ok(ChannelDirFromClient4::BackOrBoth),
            d => Err(XdrError::BadDiscriminant(d)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelDirFromServer4 {
    Fore = 1,
    Back = 2,
    Both = 3,
}

impl XdrEncode for ChannelDirFromServer4 {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_u32(*self as u32);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BindConnToSession4args {
    pub bctsa_sessid: SessionId4,
    pub bctsa_dir: ChannelDirFromClient4,
    pub bctsa_use_conn_in_rdma_mode: bool,
}

impl XdrDecode for BindConnToSession4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(BindConnToSession4args {
            bctsa_sessid: reader.read_fixed()?,
            bctsa_dir: ChannelDirFromClient4::decode(reader)?,
            bctsa_use_conn_in_rdma_mode: reader.read_bool()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BindConnToSession4resok {
    pub bctsr_sessid: SessionId4,
    pub bctsr_dir: ChannelDirFromServer4,
    pub bctsr_use_conn_in_rdma_mode: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BindConnToSession4res {
    Resok4(BindConnToSession4resok),
    Err(NfsStat4),
}

impl XdrEncode for BindConnToSession4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            BindConnToSession4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_fixed(&ok.bctsr_sessid);
                ok.bctsr_dir.encode(writer);
                writer.write_bool(ok.bctsr_use_conn_in_rdma_mode);
            }
            BindConnToSession4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * SEQUENCE: slot-based exactly-once execution
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Sequence4args {
    pub sa_sessionid: SessionId4,
    pub sa_sequenceid: u32,
    pub sa_slotid: Slotid4,
    pub sa_highest_slotid: Slotid4,
    pub sa_cachethis: bool,
}

impl XdrDecode for Sequence4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(Sequence4args {
            sa_sessionid: reader.read_fixed()?,
            sa_sequenceid: reader.read_u32()?,
            sa_slotid: reader.read_u32()?,
            sa_highest_slotid: reader.read_u32()?,
            sa_cachethis: reader.read_bool()?,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Sequence4resok {
    pub sr_sessionid: SessionId4,
    pub sr_sequenceid: u32,
    pub sr_slotid: Slotid4,
    pub sr_highest_slotid: Slotid4,
    pub sr_target_highest_slotid: Slotid4,
    pub sr_status_flags: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Sequence4res {
    Resok4(Sequence4resok),
    Err(NfsStat4),
}

impl XdrEncode for Sequence4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            Sequence4res::Resok4(ok) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_fixed(&ok.sr_sessionid);
                writer.write_u32(ok.sr_sequenceid);
                writer.write_u32(ok.sr_slotid);
                writer.write_u32(ok.sr_highest_slotid);
                writer.write_u32(ok.sr_target_highest_slotid);
                writer.write_u32(ok.sr_status_flags);
            }
            Sequence4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * FREE_STATEID / TEST_STATEID
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FreeStateid4args {
    pub fsa_stateid: Stateid4,
}

impl XdrDecode for FreeStateid4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(FreeStateid4args {
            fsa_stateid: Stateid4::decode(reader)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestStateid4args {
    pub ts_stateids: Vec<Stateid4>,
}

impl XdrDecode for TestStateid4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let count = reader.read_u32()? as usize;
        if count > 256 {
            return Err(XdrError::LimitExceeded {
                length: count,
                limit: 256,
            });
        }
        let mut ts_stateids = Vec::with_capacity(count);
        for _ in 0..count {
            ts_stateids.push(Stateid4::decode(reader)?);
        }
        Ok(TestStateid4args { ts_stateids })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TestStateid4res {
    Resok4(Vec<NfsStat4>),
    Err(NfsStat4),
}

impl XdrEncode for TestStateid4res {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            TestStateid4res::Resok4(codes) => {
                NfsStat4::Nfs4Ok.encode(writer);
                writer.write_u32(codes.len() as u32);
                for code in codes {
                    code.encode(writer);
                }
            }
            TestStateid4res::Err(status) => status.encode(writer),
        }
    }
}

/*
 * SECINFO_NO_NAME
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SecinfoStyle4 {
    CurrentFh,
    Parent,
}

impl XdrDecode for SecinfoStyle4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        match reader.read_u32()? {
            0 => Ok(SecinfoStyle4::CurrentFh),
            1 => Ok(SecinfoStyle4::Parent),
            d => Err(XdrError::BadDiscriminant(d)),
        }
    }
}

/*
 * DESTROY_CLIENTID
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DestroyClientid4args {
    pub dca_clientid: Clientid4,
}

impl XdrDecode for DestroyClientid4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(DestroyClientid4args {
            dca_clientid: reader.read_u64()?,
        })
    }
}

/*
 * RECLAIM_COMPLETE
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReclaimComplete4args {
    pub rca_one_fs: bool,
}

impl XdrDecode for ReclaimComplete4args {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(ReclaimComplete4args {
            rca_one_fs: reader.read_bool()?,
        })
    }
}

/*
 * Skeleton decoders for the pNFS and delegation-wanting operations this
 * server answers NOTSUPP. They exist to keep the XDR stream aligned: a
 * v4.1 compound may carry them in any position, and the ops that follow
 * must still decode.
 */

pub fn skip_backchannel_ctl_args(reader: &mut XdrReader<'_>) -> XdrResult<()> {
    let _cb_program = reader.read_u32()?;
    let count = reader.read_u32()? as usize;
    for _ in 0..count {
        CallbackSecParms4::decode(reader)?;
    }
    Ok(())
}

pub fn skip_get_dir_delegation_args(reader: &mut XdrReader<'_>) -> XdrResult<()> {
    let _signal_deleg_avail = reader.read_bool()?;
    let _notification_types = reader.read_bitmap()?;
    let _child_attr_delay = Nfstime4::decode(reader)?;
    let _dir_attr_delay = Nfstime4::decode(reader)?;
    let _child_attrs = reader.read_bitmap()?;
    let _dir_attrs = reader.read_bitmap()?;
    Ok(())
}

pub fn skip_getdeviceinfo_args(reader: &mut XdrReader<'_>) -> XdrResult<()> {
    let _deviceid: [u8; 16] = reader.read_fixed()?;
    let _layout_type = reader.read_u32()?;
    let _maxcount = reader.read_u32()?;
    let _notify_types = reader.read_bitmap()?;
    Ok(())
}

pub fn skip_getdevicelist_args(reader: &mut XdrReader<'_>) -> XdrResult<()> {
    let _layout_type = reader.read_u32()?;
    let _maxdevices = reader.read_u32()?;
    let _cookie = reader.read_u64()?;
    let _cookieverf: Verifier4 = reader.read_fixed()?;
    Ok(())
}

pub fn skip_layoutcommit_args(reader: &mut XdrReader<'_>) -> XdrResult<()> {
    let _offset = reader.read_u64()?;
    let _length = reader.read_u64()?;
    let _reclaim = reader.read_bool()?;
    Stateid4::decode(reader)?;
    // newoffset4
    if reader.read_bool()? {
        let _last_write_offset = reader.read_u64()?;
    }
    // newtime4
    if reader.read_bool()? {
        Nfstime4::decode(reader)?;
    }
    // layoutupdate4
    let _layout_type = reader.read_u32()?;
    reader.skip_opaque()?;
    Ok(())
}

pub fn skip_layoutget_args(reader: &mut XdrReader<'_>) -> XdrResult<()> {
    let _signal_layout_avail = reader.read_bool()?;
    let _layout_type = reader.read_u32()?;
    let _iomode = reader.read_u32()?;
    let _offset = reader.read_u64()?;
    let _length = reader.read_u64()?;
    let _minlength = reader.read_u64()?;
    Stateid4::decode(reader)?;
    let _maxcount = reader.read_u32()?;
    Ok(())
}

pub fn skip_layoutreturn_args(reader: &mut XdrReader<'_>) -> XdrResult<()> {
    let _reclaim = reader.read_bool()?;
    let _layout_type = reader.read_u32()?;
    let _iomode = reader.read_u32()?;
    match reader.read_u32()? {
        // LAYOUTRETURN4_FILE
        1 => {
            let _offset = reader.read_u64()?;
            let _length = reader.read_u64()?;
            Stateid4::decode(reader)?;
            reader.skip_opaque()?;
            Ok(())
        }
        // LAYOUTRETURN4_FSID / LAYOUTRETURN4_ALL carry no body
        2 | 3 => Ok(()),
        d => Err(XdrError::BadDiscriminant(d)),
    }
}

pub fn skip_set_ssv_args(reader: &mut XdrReader<'_>) -> XdrResult<()> {
    reader.skip_opaque()?;
    reader.skip_opaque()?;
    Ok(())
}

pub fn skip_want_delegation_args(reader: &mut XdrReader<'_>) -> XdrResult<()> {
    let _want = reader.read_u32()?;
    match reader.read_u32()? {
        // CLAIM_NULL-style: no body; CLAIM_PREVIOUS carries a delegation type
        0 => Ok(()),
        1 => {
            let _deleg_type = reader.read_u32()?;
            Ok(())
        }
        d => Err(XdrError::BadDiscriminant(d)),
    }
}

/*
 * CB_SEQUENCE, for backchannel compounds on a bound session
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CbSequence4args {
    pub csa_sessionid: SessionId4,
    pub csa_sequenceid: u32,
    pub csa_slotid: Slotid4,
    pub csa_highest_slotid: Slotid4,
    pub csa_cachethis: bool,
}

impl XdrEncode for CbSequence4args {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_fixed(&self.csa_sessionid);
        writer.write_u32(self.csa_sequenceid);
        writer.write_u32(self.csa_slotid);
        writer.write_u32(self.csa_highest_slotid);
        writer.write_bool(self.csa_cachethis);
        // no referring call lists
        writer.write_u32(0);
    }
}
