use async_trait::async_trait;
use tracing::debug;

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs4_proto::{Getattr4args, Getattr4res, NfsResOp4, NfsStat4};

#[async_trait]
impl NfsOperation for Getattr4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.7
        debug!(
            "Operation 9: GETATTR - Get Attributes, {} bits requested",
            self.attr_request.len()
        );
        let Some(current) = request.current_filehandle() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };

        let fattr = request
            .file_manager()
            .fattr_for(current, &self.attr_request);
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpGetattr(Getattr4res::Resok4(fattr))),
            status: NfsStat4::Nfs4Ok,
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::server::nfs40::test_support::{pseudo_root_request, test_request_with_file};
    use keel_proto::attr::{FileAttr, FileAttrList, FileAttrValue};
    use keel_proto::nfs4_proto::NfsFtype4;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn getattr_returns_requested_intersection() {
        let request = test_request_with_file("g.txt", b"12345").await;
        let args = Getattr4args {
            attr_request: FileAttrList::new(vec![
                FileAttr::Type,
                FileAttr::Size,
                FileAttr::Hidden, // unsupported, dropped from the answer
            ]),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        match response.result.unwrap() {
            NfsResOp4::OpGetattr(Getattr4res::Resok4(fattr)) => {
                assert_eq!(fattr.attrmask.0, vec![FileAttr::Type, FileAttr::Size]);
                assert_eq!(
                    fattr.attr_vals,
                    vec![
                        FileAttrValue::Type(NfsFtype4::Nf4reg),
                        FileAttrValue::Size(5)
                    ]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn getattr_without_filehandle() {
        let request = pseudo_root_request().await;
        let mut request = request;
        request.unset_filehandle();
        let args = Getattr4args {
            attr_request: FileAttrList::new(vec![FileAttr::Type]),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errNofilehandle);
    }
}
