//! VERIFY and NVERIFY share the byte-exact attribute comparison; only
//! the polarity of the answer differs.

use async_trait::async_trait;
use tracing::debug;

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
};

use keel_proto::attr::Fattr4;
use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, Nverify4args, StatusRes, Verify4args};
use keel_proto::xdr::{XdrEncode, XdrWriter};

/// Byte-exact comparison: the claimed attrs, re-encoded, must equal the
/// server's encoding of the same attribute set.
fn attrs_match(request: &NfsRequest, current: &FsObject, claimed: &Fattr4) -> Result<bool, NfsStat4> {
    let fmanager = request.file_manager();
    let supported = fmanager.attr_supported_attrs();
    for attr in claimed.attrmask.iter() {
        if !supported.contains(*attr) {
            return Err(NfsStat4::Nfs4errAttrnotsupp);
        }
    }
    let ours = fmanager.fattr_for(current, &claimed.attrmask);
    let mut theirs_bytes = XdrWriter::new();
    claimed.encode(&mut theirs_bytes);
    let mut ours_bytes = XdrWriter::new();
    ours.encode(&mut ours_bytes);
    Ok(theirs_bytes.into_bytes() == ours_bytes.into_bytes())
}

#[async_trait]
impl NfsOperation for Verify4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.35
        debug!("Operation 37: VERIFY - Verify Same Attributes");
        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        match attrs_match(&request, &current, &self.obj_attributes) {
            Ok(true) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpVerify(StatusRes::ok())),
                status: NfsStat4::Nfs4Ok,
            },
            Ok(false) => NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNotSame,
            },
            Err(status) => NfsOpResponse {
                request,
                result: None,
                status,
            },
        }
    }
}

#[async_trait]
impl NfsOperation for Nverify4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.17
        debug!("Operation 17: NVERIFY - Verify Attributes Different");
        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        match attrs_match(&request, &current, &self.obj_attributes) {
            Ok(false) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpNverify(StatusRes::ok())),
                status: NfsStat4::Nfs4Ok,
            },
            Ok(true) => NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errSame,
            },
            Err(status) => NfsOpResponse {
                request,
                result: None,
                status,
            },
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::server::nfs40::test_support::test_request_with_file;
    use keel_proto::attr::FileAttrValue;
    use keel_proto::nfs4_proto::NfsFtype4;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn verify_matches_and_mismatches() {
        let request = test_request_with_file("v.txt", b"12345").await;

        let same = Verify4args {
            obj_attributes: Fattr4::from_values(vec![
                FileAttrValue::Type(NfsFtype4::Nf4reg),
                FileAttrValue::Size(5),
            ]),
        };
        let response = same.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);

        let different = Verify4args {
            obj_attributes: Fattr4::from_values(vec![FileAttrValue::Size(99)]),
        };
        let response = different.execute(response.request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errNotSame);
    }

    #[tokio::test]
    #[traced_test]
    async fn nverify_is_the_mirror_image() {
        let request = test_request_with_file("nv.txt", b"12345").await;

        let different = Nverify4args {
            obj_attributes: Fattr4::from_values(vec![FileAttrValue::Size(99)]),
        };
        let response = different.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);

        let same = Nverify4args {
            obj_attributes: Fattr4::from_values(vec![FileAttrValue::Size(5)]),
        };
        let response = same.execute(response.request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errSame);
    }

    #[tokio::test]
    #[traced_test]
    async fn unsupported_attribute_in_verify() {
        let request = test_request_with_file("va.txt", b"").await;
        let args = Verify4args {
            obj_attributes: Fattr4::from_values(vec![FileAttrValue::Hidden(false)]),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errAttrnotsupp);
    }
}
