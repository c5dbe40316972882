//! [`Transport`] over the AWS SDK S3 client.

use std::error::Error as StdError;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use ruststack_transfer_core::{
    ByteRange, ObjectId, ObjectProbe, PartResult, SessionId, TransferResponse, TransferSession,
    Transport, TransportError, TransportErrorKind,
};
use tracing::debug;

use crate::config::S3TransportConfig;

/// Characters escaped in an object key inside `x-amz-copy-source`.
const COPY_SOURCE_KEY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// S3 transport issuing one SDK request per engine call.
///
/// Retries and request signing are left to the SDK client.
#[derive(Debug, Clone)]
pub struct S3Transport {
    client: Client,
}

impl S3Transport {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default credential chain and `config`.
    pub async fn connect(config: &S3TransportConfig) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        Self::new(Client::from_conf(builder.build()))
    }

    /// The underlying SDK client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Value of `x-amz-copy-source` for `object`.
#[must_use]
pub fn copy_source(object: &ObjectId) -> String {
    let key = utf8_percent_encode(&object.key, COPY_SOURCE_KEY);
    match &object.version_id {
        Some(version_id) => format!("{}/{key}?versionId={version_id}", object.bucket),
        None => format!("{}/{key}", object.bucket),
    }
}

/// Map an S3 error code and HTTP status to a transport error kind.
#[must_use]
pub fn classify(code: Option<&str>, status: u16) -> TransportErrorKind {
    match code {
        Some("NoSuchKey" | "NoSuchBucket" | "NoSuchVersion" | "NotFound") => {
            TransportErrorKind::NotFound
        }
        Some("AccessDenied" | "AllAccessDisabled" | "Forbidden") => {
            TransportErrorKind::AccessDenied
        }
        Some("NoSuchUpload") => TransportErrorKind::NoSuchUpload,
        Some("InvalidPart") => TransportErrorKind::InvalidPart,
        Some("InvalidPartOrder") => TransportErrorKind::InvalidPartOrder,
        Some("RequestTimeout") => TransportErrorKind::Timeout,
        _ => match status {
            404 => TransportErrorKind::NotFound,
            403 => TransportErrorKind::AccessDenied,
            408 => TransportErrorKind::Timeout,
            _ => TransportErrorKind::Service,
        },
    }
}

fn sdk_error<E>(operation: &'static str, err: SdkError<E>) -> TransportError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
{
    let (kind, detail) = match &err {
        SdkError::ServiceError(service) => (
            classify(service.err().code(), service.raw().status().as_u16()),
            service
                .err()
                .message()
                .or_else(|| service.err().code())
                .map(str::to_owned),
        ),
        SdkError::TimeoutError(_) => (TransportErrorKind::Timeout, None),
        _ => (TransportErrorKind::Other, None),
    };
    let message = match detail {
        Some(detail) => format!("{operation}: {detail}"),
        None => format!("{operation} failed"),
    };
    TransportError::new(kind, message).with_source(err)
}

fn missing(operation: &'static str, field: &str) -> TransportError {
    TransportError::new(
        TransportErrorKind::Service,
        format!("{operation}: response has no {field}"),
    )
}

fn part_number_i32(part_number: u32) -> Result<i32, TransportError> {
    i32::try_from(part_number).map_err(|_| {
        TransportError::new(
            TransportErrorKind::Other,
            format!("part number {part_number} is out of range"),
        )
    })
}

#[async_trait]
impl Transport for S3Transport {
    async fn probe(&self, object: &ObjectId) -> Result<ObjectProbe, TransportError> {
        let output = self
            .client
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .set_version_id(object.version_id.clone())
            .send()
            .await
            .map_err(|e| sdk_error("HeadObject", e))?;

        let content_length = output
            .content_length()
            .and_then(|len| u64::try_from(len).ok())
            .ok_or_else(|| missing("HeadObject", "content length"))?;
        Ok(ObjectProbe {
            content_length,
            etag: output.e_tag().map(str::to_owned),
        })
    }

    async fn initiate_session(&self, target: &ObjectId) -> Result<SessionId, TransportError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .send()
            .await
            .map_err(|e| sdk_error("CreateMultipartUpload", e))?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| missing("CreateMultipartUpload", "upload id"))?;
        debug!(object = %target, upload_id, "created multipart upload");
        Ok(SessionId::new(upload_id))
    }

    async fn upload_part(
        &self,
        session: &TransferSession,
        part_number: u32,
        body: Bytes,
    ) -> Result<PartResult, TransportError> {
        let output = self
            .client
            .upload_part()
            .bucket(&session.target.bucket)
            .key(&session.target.key)
            .upload_id(session.id.as_str())
            .part_number(part_number_i32(part_number)?)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error("UploadPart", e))?;

        let etag = output.e_tag().ok_or_else(|| missing("UploadPart", "ETag"))?;
        Ok(PartResult::new(part_number, etag))
    }

    async fn copy_part(
        &self,
        session: &TransferSession,
        part_number: u32,
        source: &ObjectId,
        range: ByteRange,
    ) -> Result<PartResult, TransportError> {
        let output = self
            .client
            .upload_part_copy()
            .bucket(&session.target.bucket)
            .key(&session.target.key)
            .upload_id(session.id.as_str())
            .part_number(part_number_i32(part_number)?)
            .copy_source(copy_source(source))
            .copy_source_range(range.to_string())
            .send()
            .await
            .map_err(|e| sdk_error("UploadPartCopy", e))?;

        let etag = output
            .copy_part_result()
            .and_then(|result| result.e_tag())
            .ok_or_else(|| missing("UploadPartCopy", "ETag"))?;
        Ok(PartResult::new(part_number, etag))
    }

    async fn finalize(
        &self,
        session: &TransferSession,
        parts: &[PartResult],
    ) -> Result<TransferResponse, TransportError> {
        let completed = parts
            .iter()
            .map(|part| {
                Ok(CompletedPart::builder()
                    .part_number(part_number_i32(part.part_number)?)
                    .e_tag(&part.etag)
                    .build())
            })
            .collect::<Result<Vec<_>, TransportError>>()?;

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&session.target.bucket)
            .key(&session.target.key)
            .upload_id(session.id.as_str())
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error("CompleteMultipartUpload", e))?;

        Ok(TransferResponse {
            etag: output.e_tag().map(str::to_owned),
            version_id: output.version_id().map(str::to_owned),
            location: output.location().map(str::to_owned),
            parts_count: u32::try_from(parts.len()).ok(),
        })
    }

    async fn abort(&self, session: &TransferSession) -> Result<(), TransportError> {
        self.client
            .abort_multipart_upload()
            .bucket(&session.target.bucket)
            .key(&session.target.key)
            .upload_id(session.id.as_str())
            .send()
            .await
            .map_err(|e| sdk_error("AbortMultipartUpload", e))?;
        Ok(())
    }

    async fn copy_object(
        &self,
        source: &ObjectId,
        destination: &ObjectId,
    ) -> Result<TransferResponse, TransportError> {
        let output = self
            .client
            .copy_object()
            .copy_source(copy_source(source))
            .bucket(&destination.bucket)
            .key(&destination.key)
            .send()
            .await
            .map_err(|e| sdk_error("CopyObject", e))?;

        Ok(TransferResponse {
            etag: output
                .copy_object_result()
                .and_then(|result| result.e_tag())
                .map(str::to_owned),
            version_id: output.version_id().map(str::to_owned),
            location: None,
            parts_count: None,
        })
    }

    async fn put_object(
        &self,
        destination: &ObjectId,
        body: Bytes,
    ) -> Result<TransferResponse, TransportError> {
        let output = self
            .client
            .put_object()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error("PutObject", e))?;

        Ok(TransferResponse {
            etag: output.e_tag().map(str::to_owned),
            version_id: output.version_id().map(str::to_owned),
            location: None,
            parts_count: None,
        })
    }
}
