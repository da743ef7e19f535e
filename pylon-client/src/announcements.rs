//! Announcement remote procedures

use pylon_core::domain::announcement::NodeAnnouncement;
use std::time::Duration;

use crate::PoolClient;
use crate::error::RpcFailure;
use crate::proto::{
    RpcAnnounceNodeRequest, RpcAnnounceNodeResponse, RpcAnnounceTemplateRequest,
    RpcAnnounceTemplateResponse,
};
use crate::unwrap::unwrap_rpc;

impl PoolClient {
    /// Advertise this node
    ///
    /// # Returns
    /// How long the pool keeps the announcement before it must be repeated
    pub async fn announce_node(&self, node: &NodeAnnouncement) -> Result<Duration, RpcFailure> {
        let request = RpcAnnounceNodeRequest {
            icon_url: node.icon_url.clone(),
            name: node.name.clone(),
            description: node.description.clone(),
        };
        let response: RpcAnnounceNodeResponse =
            unwrap_rpc(self.rpc().announce_node(request)).await?;

        Ok(Duration::from_millis(response.refresh_interval))
    }

    /// Advertise a kind of job this node accepts
    ///
    /// # Arguments
    /// * `event_template` - JSON description of the job template
    ///
    /// # Returns
    /// How long the pool keeps the announcement before it must be repeated
    pub async fn announce_event_template(
        &self,
        event_template: &str,
    ) -> Result<Duration, RpcFailure> {
        let request = RpcAnnounceTemplateRequest {
            event_template: event_template.to_string(),
        };
        let response: RpcAnnounceTemplateResponse =
            unwrap_rpc(self.rpc().announce_event_template(request)).await?;

        Ok(Duration::from_millis(response.refresh_interval))
    }
}
