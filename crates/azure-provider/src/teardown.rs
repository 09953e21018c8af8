use tracing::{info, warn};

use crate::cloud::CloudApi;
use crate::lro::{LroConfig, complete};
use crate::naming::ResourceNames;
use crate::{Result, Step};

/// Delete every resource of a target, dependents first: VM, OS disk, NIC,
/// subnet, virtual network.
///
/// Resources that are already gone count as deleted. The first other
/// failure ends the teardown, leaving the remaining resources in place.
pub async fn teardown(
    api: &dyn CloudApi,
    lro: &LroConfig,
    resource_group: &str,
    names: &ResourceNames,
) -> Result<()> {
    let rg = resource_group;

    delete(Step::DeleteVirtualMachine, &names.vm, api.delete_virtual_machine(rg, &names.vm).await, lro).await?;
    delete(Step::DeleteDisk, &names.disk, api.delete_disk(rg, &names.disk).await, lro).await?;
    delete(Step::DeleteNetworkInterface, &names.nic, api.delete_network_interface(rg, &names.nic).await, lro).await?;
    delete(
        Step::DeleteSubnet,
        &names.subnet,
        api.delete_subnet(rg, &names.vnet, &names.subnet).await,
        lro,
    )
    .await?;
    delete(Step::DeleteVirtualNetwork, &names.vnet, api.delete_virtual_network(rg, &names.vnet).await, lro).await?;

    Ok(())
}

async fn delete(
    step: Step,
    resource: &str,
    begin: azure_api::Result<azure_api::BoxPoller<()>>,
    lro: &LroConfig,
) -> Result<()> {
    match complete(step, begin, lro).await {
        Ok(()) => {
            info!(resource, "azure: {step} done");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            warn!(resource, "azure: {step}: resource already absent");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::provision::{MachineSpec, Provisioner};
    use crate::testing::{FakeCloud, options};

    async fn provisioned() -> Arc<FakeCloud> {
        let cloud = Arc::new(FakeCloud::new());
        let spec = MachineSpec::new(&options(), String::new()).unwrap();
        Provisioner::new(
            cloud.clone(),
            LroConfig::default(),
            "daytona",
            "centralus",
            ResourceNames::for_target("t1"),
        )
        .run(&spec)
        .await
        .unwrap();
        cloud.clear_calls();
        cloud
    }

    #[tokio::test(start_paused = true)]
    async fn deletes_in_reverse_dependency_order() {
        let cloud = provisioned().await;
        let names = ResourceNames::for_target("t1");

        teardown(cloud.as_ref(), &LroConfig::default(), "daytona", &names)
            .await
            .unwrap();

        assert_eq!(
            cloud.mutations(),
            vec![
                "delete_virtual_machine daytona-t1",
                "delete_disk daytona-t1-disk",
                "delete_network_interface daytona-iface-t1",
                "delete_subnet daytona-subnet-t1",
                "delete_virtual_network daytona-vnet-t1",
            ]
        );
        assert!(cloud.virtual_machine("daytona-t1").is_none());
        assert!(cloud.virtual_network("daytona-vnet-t1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_at_any_step_stops_later_deletes() {
        let order = [
            ("delete_virtual_machine", "daytona-t1", "cannot delete virtual machine"),
            ("delete_disk", "daytona-t1-disk", "cannot delete instance disk"),
            ("delete_network_interface", "daytona-iface-t1", "cannot delete network interface"),
            ("delete_subnet", "daytona-subnet-t1", "cannot delete subnet"),
            ("delete_virtual_network", "daytona-vnet-t1", "cannot delete virtual network"),
        ];

        for (failing, &(op, _, message)) in order.iter().enumerate() {
            let cloud = provisioned().await;
            cloud.fail_on(op);

            let err = teardown(
                cloud.as_ref(),
                &LroConfig::default(),
                "daytona",
                &ResourceNames::for_target("t1"),
            )
            .await
            .unwrap_err();

            assert!(err.to_string().starts_with(message), "{op}: {err}");
            let attempted: Vec<String> = order[..=failing]
                .iter()
                .map(|(op, name, _)| format!("{op} {name}"))
                .collect();
            assert_eq!(cloud.mutations(), attempted, "{op}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn absent_resources_count_as_deleted() {
        let cloud = FakeCloud::new();

        teardown(&cloud, &LroConfig::default(), "daytona", &ResourceNames::for_target("gone"))
            .await
            .unwrap();

        assert_eq!(cloud.mutations().len(), 5);
    }
}
