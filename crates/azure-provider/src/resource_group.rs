use tracing::info;

use crate::cloud::CloudApi;
use crate::options::TargetOptions;
use crate::{Error, Result, Step};

/// Group used when the target options do not name one.
pub const DEFAULT_RESOURCE_GROUP: &str = "daytona";

pub fn resource_group_name(options: &TargetOptions) -> &str {
    if options.resource_group.is_empty() {
        DEFAULT_RESOURCE_GROUP
    } else {
        &options.resource_group
    }
}

/// Make sure the target's resource group exists and return its name.
///
/// A group named in the options must already exist. The default group is
/// created in the target's region on first use.
pub async fn resolve_resource_group(api: &dyn CloudApi, options: &TargetOptions) -> Result<String> {
    let name = resource_group_name(options);

    match api.get_resource_group(name).await {
        Ok(_) => Ok(name.to_string()),
        Err(e) if e.is_not_found() && !options.resource_group.is_empty() => {
            Err(Error::ResourceGroupNotFound(name.to_string()))
        }
        Err(e) if e.is_not_found() => {
            api.create_resource_group(name, &options.region)
                .await
                .map_err(Error::remote(Step::CreateResourceGroup))?;
            info!(resource_group = name, region = %options.region, "azure: resource group created");
            Ok(name.to_string())
        }
        Err(e) => Err(Error::Remote {
            step: Step::ResolveResourceGroup,
            source: e,
        }),
    }
}
