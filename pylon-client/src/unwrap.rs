//! RPC result unwrapping
//!
//! Every remote call made by the client goes through [`unwrap_rpc`], so
//! callers only ever see a value or an [`RpcFailure`].

use std::future::Future;
use tonic::{Code, Response, Status};

use crate::error::RpcFailure;

/// Awaits a pending call and returns its message, or the failed status
///
/// A call that fails while reporting `Code::Ok` has no response to return,
/// so it is a failure with code `Unknown`.
pub async fn unwrap_rpc<T, F>(call: F) -> Result<T, RpcFailure>
where
    F: Future<Output = Result<Response<T>, Status>>,
{
    match call.await {
        Ok(response) => Ok(response.into_inner()),
        Err(status) if status.code() == Code::Ok => Err(RpcFailure::new(
            Code::Unknown,
            format!("call failed with an OK status: {}", status.message()),
        )),
        Err(status) => Err(RpcFailure::from(status)),
    }
}
