//! Amazon S3 and S3-compatible stores.

use std::io::{self, Write};
use std::path::Path;

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use log::debug;
use tokio::runtime::Runtime;

use super::{ObjectIter, ObjectStat, RemoteEntry, RemoteStore, SyncError};
use crate::utils::{commit, staging_file};

/// Region in which S3 rejects an explicit location constraint.
const DEFAULT_S3_REGION: &str = "us-east-1";

/// S3 client with its own runtime; the synchronous store calls block on it.
pub struct S3Backend {
    client: Client,
    rt: Runtime,
}

impl S3Backend {
    /// Credentials come from the standard AWS provider chain. With an
    /// `endpoint`, requests go there using path-style addressing.
    pub fn connect(region: &str, endpoint: Option<&str>) -> Result<Self, SyncError> {
        let rt = Runtime::new()?;
        let client = rt.block_on(async {
            let mut loader =
                aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
            if let Some(url) = endpoint {
                loader = loader.endpoint_url(url);
            }
            let shared = loader.load().await;
            let config = aws_sdk_s3::config::Builder::from(&shared)
                .force_path_style(endpoint.is_some())
                .build();
            Client::from_conf(config)
        });
        debug!("S3 client ready (region {}, endpoint {:?})", region, endpoint);
        Ok(Self { client, rt })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client) -> Result<Self, SyncError> {
        Ok(Self {
            client,
            rt: Runtime::new()?,
        })
    }
}

fn store_error<E, R>(err: SdkError<E, R>) -> SyncError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    SyncError::Store {
        code: err.code().unwrap_or("Unknown").to_string(),
        message: DisplayErrorContext(&err).to_string(),
    }
}

/// S3 answers `HEAD` on a bucket in another region with a bare 301 that
/// names the bucket's region in a header.
fn wrong_region<E>(err: &SdkError<E, HttpResponse>) -> Option<String> {
    let response = err.raw_response()?;
    if response.status().as_u16() != 301 {
        return None;
    }
    let region = response.headers().get("x-amz-bucket-region").unwrap_or("another region");
    Some(region.to_string())
}

impl RemoteStore for S3Backend {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, SyncError> {
        match self
            .rt
            .block_on(self.client.head_bucket().bucket(bucket).send())
        {
            Ok(_) => Ok(true),
            Err(err) => match err.as_service_error() {
                Some(service) if service.is_not_found() => Ok(false),
                _ => match wrong_region(&err) {
                    Some(region) => Err(SyncError::Store {
                        code: "PermanentRedirect".to_string(),
                        message: format!(
                            "bucket {bucket} lives in {region}, rerun with --region {region}"
                        ),
                    }),
                    None => Err(store_error(err)),
                },
            },
        }
    }

    fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), SyncError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if region != DEFAULT_S3_REGION {
            let config = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build();
            request = request.create_bucket_configuration(config);
        }
        self.rt.block_on(request.send()).map_err(store_error)?;
        debug!("CreateBucket {} ({}) succeeded", bucket, region);
        Ok(())
    }

    fn stat(&self, bucket: &str, key: &str) -> Result<ObjectStat, SyncError> {
        match self
            .rt
            .block_on(self.client.head_object().bucket(bucket).key(key).send())
        {
            Ok(head) => Ok(ObjectStat::Found(RemoteEntry {
                key: key.to_string(),
                last_modified: head.last_modified().map(|t| t.secs()).unwrap_or_default(),
            })),
            Err(err) => match err.as_service_error() {
                Some(service) if service.is_not_found() => Ok(ObjectStat::NotFound),
                _ => Err(store_error(err)),
            },
        }
    }

    fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), SyncError> {
        self.rt.block_on(async {
            let body = ByteStream::from_path(local_path)
                .await
                .map_err(io::Error::other)?;
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .send()
                .await
                .map_err(store_error)?;
            Ok::<_, SyncError>(())
        })
    }

    fn download(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), SyncError> {
        self.rt.block_on(async {
            let object = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(store_error)?;
            let mut staged = staging_file(local_path)?;
            let mut body = object.body;
            while let Some(chunk) = body.try_next().await.map_err(io::Error::other)? {
                staged.write_all(&chunk)?;
            }
            commit(staged, local_path)?;
            Ok::<_, SyncError>(())
        })
    }

    fn list_all<'a>(&'a self, bucket: &str) -> Result<ObjectIter<'a>, SyncError> {
        let mut objects = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();
        let pages = std::iter::from_fn(move || self.rt.block_on(objects.next())).flat_map(|page| {
            let items: Vec<Result<_, _>> = match page {
                Ok(page) => page.contents.unwrap_or_default().into_iter().map(Ok).collect(),
                Err(err) => vec![Err(err)],
            };
            items
        });
        Ok(Box::new(pages.filter_map(|object| match object {
            Ok(object) => object.key().map(|key| {
                Ok(RemoteEntry {
                    key: key.to_string(),
                    last_modified: object.last_modified().map(|t| t.secs()).unwrap_or_default(),
                })
            }),
            Err(err) => Some(Err(store_error(err))),
        })))
    }

    fn location(&self, bucket: &str, key: &str) -> String {
        format!("s3://{bucket}/{key}")
    }
}
