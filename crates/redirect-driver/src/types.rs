//! Requests, capabilities and snapshots exchanged with drivers.

use crate::error::{DriverError, DriverResult};
use redirect_types::{
    FailurePolicyType, HookParams, InspectedSet, InspectionHookElement, InspectionPortElement,
    NetworkElement, TagEncapsulationType,
};
use serde::{Deserialize, Serialize};

/// A request to program one inspection hook.
///
/// `inspection_port` always carries its registered element id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRequest {
    pub inspected: InspectedSet,
    pub inspection_port: InspectionPortElement,
    pub params: HookParams,
}

/// What a driver's controller accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCapabilities {
    pub encapsulations: Vec<TagEncapsulationType>,
    pub failure_policies: Vec<FailurePolicyType>,
    /// Hooks and inspection ports are 1:1 and share their identifier
    /// (port-chain composition).
    pub hook_id_is_port_id: bool,
}

impl DriverCapabilities {
    /// Capabilities of a controller accepting every known value.
    pub fn all() -> Self {
        Self {
            encapsulations: TagEncapsulationType::ALL.to_vec(),
            failure_policies: vec![FailurePolicyType::FailOpen, FailurePolicyType::FailClosed],
            hook_id_is_port_id: false,
        }
    }

    /// Checks hook attributes against this controller.
    ///
    /// # Errors
    ///
    /// Returns `NotSupported` for an encapsulation or failure policy the
    /// controller does not implement, and `InvalidParameter` when the tag
    /// does not fit the encapsulation header.
    pub fn check(&self, params: &HookParams) -> DriverResult<()> {
        if !self.encapsulations.contains(&params.encapsulation) {
            return Err(DriverError::not_supported(format!(
                "encapsulation {}",
                params.encapsulation
            )));
        }
        if !self.failure_policies.contains(&params.failure_policy) {
            return Err(DriverError::not_supported(format!(
                "failure policy {}",
                params.failure_policy
            )));
        }
        if params.tag > params.encapsulation.max_tag() {
            return Err(DriverError::invalid_parameter(format!(
                "tag {} exceeds {} limit {}",
                params.tag,
                params.encapsulation,
                params.encapsulation.max_tag()
            )));
        }
        Ok(())
    }
}

/// Full view of what the controller currently holds.
///
/// Managers rebuild their caches from this after a failure whose outcome
/// is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSnapshot {
    pub elements: Vec<NetworkElement>,
    pub ports: Vec<InspectionPortElement>,
    pub hooks: Vec<InspectionHookElement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(tag: u64, encapsulation: TagEncapsulationType) -> HookParams {
        HookParams::new(tag, encapsulation, 1, FailurePolicyType::FailOpen)
    }

    #[test]
    fn test_all_accepts_everything() {
        let caps = DriverCapabilities::all();
        for enc in TagEncapsulationType::ALL {
            assert!(caps.check(&params(1, enc)).is_ok());
        }
    }

    #[test]
    fn test_check_rejects_unsupported_encapsulation() {
        let caps = DriverCapabilities {
            encapsulations: vec![TagEncapsulationType::Mpls],
            failure_policies: vec![FailurePolicyType::FailOpen],
            hook_id_is_port_id: true,
        };
        let err = caps.check(&params(1, TagEncapsulationType::Vlan)).unwrap_err();
        assert!(matches!(err, DriverError::NotSupported { .. }));

        let closed = HookParams::new(1, TagEncapsulationType::Mpls, 1, FailurePolicyType::FailClosed);
        assert!(caps.check(&closed).is_err());
    }

    #[test]
    fn test_check_rejects_oversized_tag() {
        let caps = DriverCapabilities::all();
        let err = caps.check(&params(5000, TagEncapsulationType::Vlan)).unwrap_err();
        assert!(matches!(err, DriverError::InvalidParameter { .. }));
        assert!(caps.check(&params(5000, TagEncapsulationType::Vxlan)).is_ok());
    }
}
