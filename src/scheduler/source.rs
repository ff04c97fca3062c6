//! Scheduler query interface.

use std::collections::HashMap;

use async_trait::async_trait;
use tonic::transport::Channel;

use crate::error::SchedulerError;
use crate::scheduler_api::instance_scheduler_client::InstanceSchedulerClient;
use crate::scheduler_api::{
    ActualInstance, InstanceState, ListActualInstancesRequest, PortMapping,
};
use crate::store::Endpoint;

/// Container port reserved for SSH access; never routable.
const SSH_CONTAINER_PORT: u32 = 2222;

/// Lists running instances grouped by application identifier.
#[async_trait]
pub trait InstanceSource: Send + Sync {
    async fn list_running_instances(&self) -> Result<HashMap<String, Vec<Endpoint>>, SchedulerError>;
}

/// Instance source backed by the scheduler's gRPC API.
///
/// Takes an already configured channel, so transport security is decided
/// by whoever builds it.
#[derive(Clone)]
pub struct GrpcInstanceSource {
    client: InstanceSchedulerClient<Channel>,
}

impl GrpcInstanceSource {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: InstanceSchedulerClient::new(channel),
        }
    }
}

#[async_trait]
impl InstanceSource for GrpcInstanceSource {
    async fn list_running_instances(&self) -> Result<HashMap<String, Vec<Endpoint>>, SchedulerError> {
        let mut client = self.client.clone();
        let response = client
            .list_actual_instances(ListActualInstancesRequest {})
            .await?
            .into_inner();

        let total = response.instances.len();
        let grouped = group_running(response.instances);

        tracing::debug!(
            instances = total,
            applications = grouped.len(),
            "listed scheduler instances"
        );
        Ok(grouped)
    }
}

/// Groups routable endpoints by process guid.
///
/// Every process guid seen in the response gets an entry, even when none
/// of its instances is routable.
fn group_running(instances: Vec<ActualInstance>) -> HashMap<String, Vec<Endpoint>> {
    let mut grouped: HashMap<String, Vec<Endpoint>> = HashMap::new();

    for instance in instances {
        let endpoints = grouped.entry(instance.process_guid.clone()).or_default();

        if instance.state() != InstanceState::Running {
            tracing::trace!(process_guid = %instance.process_guid, "skipping non-running instance");
            continue;
        }
        let Some(port) = routable_port(&instance.ports) else {
            continue;
        };

        endpoints.push(Endpoint::new(instance.address, port));
    }

    grouped
}

/// Host port of the first mapping that is not the SSH port.
fn routable_port(ports: &[PortMapping]) -> Option<u32> {
    ports
        .iter()
        .find(|p| p.container_port != SSH_CONTAINER_PORT)
        .map(|p| p.host_port)
        .filter(|port| *port != 0)
}
