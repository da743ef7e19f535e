//! Protobuf messages and client of the `pool.PoolConnector` service
//!
//! Generated from `proto/pool_connector.proto` by the build script.

#![allow(clippy::all)]

tonic::include_proto!("pool");

use chrono::{DateTime, Utc};
use pylon_core::domain::job::{JobDescriptor, JobInput as DomainInput, JobParam as DomainParam};
use std::time::Duration;

impl From<Job> for JobDescriptor {
    fn from(job: Job) -> Self {
        let expiration = match job.expiration {
            0 => None,
            millis => i64::try_from(millis)
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis),
        };

        JobDescriptor {
            id: job.id,
            run_on: job.run_on,
            inputs: job
                .input
                .into_iter()
                .map(|input| DomainInput {
                    data: input.data,
                    kind: input.r#type,
                    marker: input.marker,
                })
                .collect(),
            params: job
                .param
                .into_iter()
                .map(|param| DomainParam {
                    key: param.key,
                    values: param.value,
                })
                .collect(),
            max_execution_time: Duration::from_millis(job.max_execution_time),
            expiration,
        }
    }
}
