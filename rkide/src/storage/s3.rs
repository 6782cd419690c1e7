//! S3 backend based on aws-sdk-s3.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{
    Client,
    config::{Credentials, http::HttpResponse},
    error::{DisplayErrorContext, SdkError},
    operation::get_object::GetObjectError,
    primitives::ByteStream,
};
use bytes::Bytes;

use super::{ObjectReader, ObjectStore, StorageError};
use crate::config::StorageConfig;
use crate::credential::Credential;

pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    pub async fn new(bucket: impl Into<String>, config: &StorageConfig, credential: &Credential) -> Self {
        let credentials = Credentials::new(
            credential.access_key_id.clone(),
            credential.access_key_secret.clone(),
            credential.security_token.clone(),
            None,
            "rkide",
        );
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(credential.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();
        Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.into(),
        }
    }
}

fn is_not_found(err: &SdkError<GetObjectError, HttpResponse>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => {
            service_err.err().is_no_such_key() || service_err.raw().status().as_u16() == 404
        }
        _ => false,
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    async fn get_object(&self, key: &str) -> Result<ObjectReader, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;
        match resp {
            Ok(output) => Ok(Box::pin(output.body.into_async_read())),
            Err(e) if is_not_found(&e) => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => {
                tracing::error!(
                    "Get object {}/{} failed: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                );
                Err(StorageError::backend(key, e))
            }
        }
    }

    async fn put_object(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(
                    "Put object {}/{} failed: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                );
                StorageError::backend(key, e)
            })
    }
}
