use crate::{Error, Result};

/// Reject ids that could not be used verbatim as a resource name suffix,
/// a URL path segment or a log file name.
pub fn validate_target_id(target_id: &str) -> Result<()> {
    let valid = !target_id.is_empty()
        && target_id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidTargetId(target_id.to_string()))
    }
}

/// Names of every Azure resource that belongs to one target.
///
/// All names are derived from the target id alone, so nothing about a
/// target's resources has to be persisted between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub vm: String,
    pub vnet: String,
    pub subnet: String,
    pub nic: String,
    pub disk: String,
}

impl ResourceNames {
    pub fn for_target(target_id: &str) -> Self {
        Self {
            vm: resource_name(target_id),
            vnet: resource_name(&format!("vnet-{target_id}")),
            subnet: resource_name(&format!("subnet-{target_id}")),
            nic: resource_name(&format!("iface-{target_id}")),
            disk: resource_name(&format!("{target_id}-disk")),
        }
    }
}

fn resource_name(identifier: &str) -> String {
    format!("daytona-{identifier}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_all_names_from_target_id() {
        let names = ResourceNames::for_target("abc123");
        assert_eq!(names.vm, "daytona-abc123");
        assert_eq!(names.vnet, "daytona-vnet-abc123");
        assert_eq!(names.subnet, "daytona-subnet-abc123");
        assert_eq!(names.nic, "daytona-iface-abc123");
        assert_eq!(names.disk, "daytona-abc123-disk");
    }

    #[test]
    fn target_ids_are_restricted_to_name_safe_characters() {
        for id in ["abc123", "T-1", "0f8e-4c2a"] {
            assert!(validate_target_id(id).is_ok(), "{id}");
        }
        for id in ["", "../escaped", "a/b", "a?b", "a b", "a.b", "a_b", "ünï"] {
            let err = validate_target_id(id).unwrap_err();
            assert!(matches!(err, Error::InvalidTargetId(_)), "{id}");
            assert!(err.is_validation());
        }
    }

    #[test]
    fn naming_is_deterministic() {
        assert_eq!(ResourceNames::for_target("t-1"), ResourceNames::for_target("t-1"));
        assert_ne!(ResourceNames::for_target("t-1"), ResourceNames::for_target("t-2"));
    }
}
