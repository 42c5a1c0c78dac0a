//! NFSv4.1 COMPOUND processing: SEQUENCE-first discipline, the
//! session-exempt operations, verbatim replay from the slot cache, and
//! arg-consuming NOTSUPP skeletons for everything this server stubs.

use num_traits::FromPrimitive;
use tracing::{debug, error};

use keel_proto::nfs41_proto::{
    skip_backchannel_ctl_args, skip_get_dir_delegation_args, skip_getdeviceinfo_args,
    skip_getdevicelist_args, skip_layoutcommit_args, skip_layoutget_args, skip_layoutreturn_args,
    skip_set_ssv_args, skip_want_delegation_args, BindConnToSession4args, CreateSession4args,
    DestroyClientid4args, DestroySession4args, ExchangeId4args, FreeStateid4args,
    ReclaimComplete4args, SecinfoStyle4, Sequence4args, Sequence4res, Sequence4resok,
    TestStateid4args,
};
use keel_proto::nfs4_proto::{
    Compound4res, CompoundHeader, DelegPurge4args, NfsOpnum4, NfsResOp4, NfsStat4, OpenAttr4args,
    OpenConfirm4args, ReleaseLockowner4args, Renew4args, SetClientId4args,
    SetClientIdConfirm4args, StatusRes,
};
use keel_proto::xdr::{XdrDecode, XdrEncode, XdrReader, XdrWriter};

mod op_bind_conn_to_session;
mod op_create_session;
mod op_destroy_clientid;
mod op_destroy_session;
mod op_exchange_id;
mod op_free_stateid;
mod op_reclaim_complete;
mod op_secinfo_no_name;
mod op_test_stateid;

use super::metrics::SequenceErrorKind;
use super::nfs40::NFS40Server;
use super::operation::NfsOperation;
use super::request::{NfsRequest, V41Context};
use super::response::NfsOpResponse;
use super::state::session::{SequenceDisposition, MAX_OPERATIONS};

pub(crate) use op_secinfo_no_name::SecinfoNoNameOp;

/// Operations a v4.1 compound may start with instead of SEQUENCE.
fn session_exempt(op: NfsOpnum4) -> bool {
    matches!(
        op,
        NfsOpnum4::OpExchangeId
            | NfsOpnum4::OpCreateSession
            | NfsOpnum4::OpDestroySession
            | NfsOpnum4::OpBindConnToSession
            | NfsOpnum4::OpDestroyClientid
    )
}

#[derive(Clone, Debug, Default)]
pub struct NFS41Server {
    v40: NFS40Server,
}

impl NFS41Server {
    pub fn new() -> Self {
        NFS41Server {
            v40: NFS40Server::new(),
        }
    }

    fn notsupp(&self, request: NfsRequest, opnum: NfsOpnum4) -> NfsOpResponse {
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::error(opnum, NfsStat4::Nfs4errNotsupp)),
            status: NfsStat4::Nfs4errNotsupp,
        }
    }

    /// Dispatch for every non-SEQUENCE position of a v4.1 compound.
    async fn dispatch_op(
        &self,
        opnum: NfsOpnum4,
        reader: &mut XdrReader<'_>,
        request: NfsRequest,
    ) -> NfsOpResponse {
        macro_rules! run {
            ($args:ty) => {
                match <$args>::decode(reader) {
                    Ok(args) => args.execute(request).await,
                    Err(e) => self.v40.xdr_failure(request, opnum, e),
                }
            };
        }
        macro_rules! consume_notsupp {
            ($args:ty) => {
                match <$args>::decode(reader) {
                    Ok(_) => self.notsupp(request, opnum),
                    Err(e) => self.v40.xdr_failure(request, opnum, e),
                }
            };
        }
        macro_rules! skeleton_notsupp {
            ($skip:path) => {
                match $skip(reader) {
                    Ok(()) => self.notsupp(request, opnum),
                    Err(e) => self.v40.xdr_failure(request, opnum, e),
                }
            };
        }

        match opnum {
            // only valid in the first position
            NfsOpnum4::OpSequence => match Sequence4args::decode(reader) {
                Ok(_) => NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::error(opnum, NfsStat4::Nfs4errSequencePos)),
                    status: NfsStat4::Nfs4errSequencePos,
                },
                Err(e) => self.v40.xdr_failure(request, opnum, e),
            },
            NfsOpnum4::OpExchangeId => run!(ExchangeId4args),
            NfsOpnum4::OpCreateSession => run!(CreateSession4args),
            NfsOpnum4::OpDestroySession => run!(DestroySession4args),
            NfsOpnum4::OpBindConnToSession => run!(BindConnToSession4args),
            NfsOpnum4::OpDestroyClientid => run!(DestroyClientid4args),
            NfsOpnum4::OpReclaimComplete => run!(ReclaimComplete4args),
            NfsOpnum4::OpTestStateid => run!(TestStateid4args),
            NfsOpnum4::OpFreeStateid => run!(FreeStateid4args),
            NfsOpnum4::OpSecinfoNoName => match SecinfoStyle4::decode(reader) {
                Ok(style) => SecinfoNoNameOp { style }.execute(request).await,
                Err(e) => self.v40.xdr_failure(request, opnum, e),
            },
            // v4.0-only operations: consume the args, answer NOTSUPP
            NfsOpnum4::OpSetclientid => consume_notsupp!(SetClientId4args),
            NfsOpnum4::OpSetclientidConfirm => consume_notsupp!(SetClientIdConfirm4args),
            NfsOpnum4::OpRenew => consume_notsupp!(Renew4args),
            NfsOpnum4::OpOpenConfirm => consume_notsupp!(OpenConfirm4args),
            NfsOpnum4::OpReleaseLockowner => consume_notsupp!(ReleaseLockowner4args),
            NfsOpnum4::OpDelegPurge => consume_notsupp!(DelegPurge4args),
            NfsOpnum4::OpOpenattr => consume_notsupp!(OpenAttr4args),
            // layout and pNFS operations: skeleton decoders keep the
            // stream aligned, the answer is NOTSUPP
            NfsOpnum4::OpBackchannelCtl => skeleton_notsupp!(skip_backchannel_ctl_args),
            NfsOpnum4::OpGetDirDelegation => skeleton_notsupp!(skip_get_dir_delegation_args),
            NfsOpnum4::OpGetdeviceinfo => skeleton_notsupp!(skip_getdeviceinfo_args),
            NfsOpnum4::OpGetdevicelist => skeleton_notsupp!(skip_getdevicelist_args),
            NfsOpnum4::OpLayoutcommit => skeleton_notsupp!(skip_layoutcommit_args),
            NfsOpnum4::OpLayoutget => skeleton_notsupp!(skip_layoutget_args),
            NfsOpnum4::OpLayoutreturn => skeleton_notsupp!(skip_layoutreturn_args),
            NfsOpnum4::OpSetSsv => skeleton_notsupp!(skip_set_ssv_args),
            NfsOpnum4::OpWantDelegation => skeleton_notsupp!(skip_want_delegation_args),
            // the shared file operations
            other => self.v40.dispatch_op(other, reader, request).await,
        }
    }

    /// v4.1 COMPOUND: SEQUENCE validation and slot reservation first,
    /// then the op loop, then the reply lands in the slot cache.
    pub async fn compound(
        &self,
        header: CompoundHeader,
        payload: &[u8],
        mut request: NfsRequest,
    ) -> (NfsRequest, Vec<u8>) {
        let state = request.state_manager();
        let metrics = state.metrics.clone();
        let mut reader = XdrReader::new(payload);
        let mut resarray: Vec<NfsResOp4> = Vec::with_capacity(header.numops as usize);
        let mut status = NfsStat4::Nfs4Ok;

        'compound: {
            if header.numops == 0 {
                break 'compound;
            }
            if header.numops > MAX_OPERATIONS {
                status = NfsStat4::Nfs4errResource;
                break 'compound;
            }

            let Ok(first_opcode) = reader.read_u32() else {
                status = NfsStat4::Nfs4errBadxdr;
                break 'compound;
            };
            let first: Option<NfsOpnum4> = FromPrimitive::from_u32(first_opcode);
            let mut remaining = header.numops;

            match first {
                Some(NfsOpnum4::OpSequence) => {
                    let args = match Sequence4args::decode(&mut reader) {
                        Ok(args) => args,
                        Err(_) => {
                            status = NfsStat4::Nfs4errBadxdr;
                            resarray.push(NfsResOp4::error(NfsOpnum4::OpSequence, status));
                            break 'compound;
                        }
                    };
                    let Some(session) = state.session_for(&args.sa_sessionid).await else {
                        metrics.sequence_error(SequenceErrorKind::BadSession);
                        status = NfsStat4::Nfs4errBadsession;
                        resarray.push(NfsResOp4::error(NfsOpnum4::OpSequence, status));
                        break 'compound;
                    };
                    match session.sequence(&args, &metrics) {
                        SequenceDisposition::Replay(bytes) => {
                            // the cached compound reply goes back verbatim
                            debug!(slot = args.sa_slotid, "slot replay");
                            return (request, bytes);
                        }
                        SequenceDisposition::Reject(seq_status) => {
                            status = seq_status;
                            resarray.push(NfsResOp4::error(NfsOpnum4::OpSequence, status));
                            break 'compound;
                        }
                        SequenceDisposition::Proceed => {
                            session.bind_connection(request.conn_id);
                            let _ = state.renew_lease(session.clientid).await;
                            let resok = Sequence4resok {
                                sr_sessionid: session.id,
                                sr_sequenceid: args.sa_sequenceid,
                                sr_slotid: args.sa_slotid,
                                sr_highest_slotid: session.highest_slotid(),
                                sr_target_highest_slotid: session.highest_slotid(),
                                sr_status_flags: 0,
                            };
                            resarray.push(NfsResOp4::OpSequence(Sequence4res::Resok4(resok)));
                            // session compounds obsolete the per-owner seqids
                            request.skip_owner_seqid = true;
                            request.v41 = Some(V41Context {
                                session,
                                slotid: args.sa_slotid,
                                cachethis: args.sa_cachethis,
                            });
                            remaining -= 1;
                            if request.is_draining() {
                                // the client should move to another binding
                                metrics.sequence_error(SequenceErrorKind::Delay);
                                status = NfsStat4::Nfs4errDelay;
                                break 'compound;
                            }
                        }
                    }
                }
                Some(op) if session_exempt(op) => {
                    // the whole compound runs with no session context
                    let response = self.dispatch_op(op, &mut reader, request).await;
                    status = response.status;
                    request = response.request;
                    match response.result {
                        Some(result) => resarray.push(result),
                        None => resarray.push(NfsResOp4::error(op, status)),
                    }
                    remaining -= 1;
                    if status != NfsStat4::Nfs4Ok {
                        break 'compound;
                    }
                }
                Some(op) => {
                    // a session operation without a session
                    status = NfsStat4::Nfs4errOpNotInSession;
                    resarray.push(NfsResOp4::error(op, status));
                    break 'compound;
                }
                None => {
                    resarray.push(NfsResOp4::OpIllegal(StatusRes {
                        status: NfsStat4::Nfs4errOpIllegal,
                    }));
                    status = NfsStat4::Nfs4errOpIllegal;
                    break 'compound;
                }
            }

            for _ in 0..remaining {
                if request.is_draining() {
                    // host shutdown between ops: partial response, the
                    // client retries
                    status = NfsStat4::Nfs4errDelay;
                    break;
                }
                let Ok(opcode) = reader.read_u32() else {
                    status = NfsStat4::Nfs4errBadxdr;
                    break;
                };
                let opnum: Option<NfsOpnum4> = FromPrimitive::from_u32(opcode);
                let Some(op) = opnum.filter(|op| *op != NfsOpnum4::OpIllegal) else {
                    resarray.push(NfsResOp4::OpIllegal(StatusRes {
                        status: NfsStat4::Nfs4errOpIllegal,
                    }));
                    status = NfsStat4::Nfs4errOpIllegal;
                    break;
                };
                let response = self.dispatch_op(op, &mut reader, request).await;
                status = response.status;
                request = response.request;
                match response.result {
                    Some(result) => resarray.push(result),
                    None => resarray.push(NfsResOp4::error(op, status)),
                }
                if status != NfsStat4::Nfs4Ok {
                    error!(?op, ?status, "compound stopped");
                    break;
                }
            }
        }

        let res = Compound4res {
            status,
            tag: header.tag,
            resarray,
        };
        let mut writer = XdrWriter::new();
        res.encode(&mut writer);
        let bytes = writer.into_bytes();

        // the final encoded response is what the slot caches
        if let Some(ctx) = &request.v41 {
            ctx.session.complete(ctx.slotid, &bytes, &metrics);
        }
        (request, bytes)
    }
}
