//! Ingress ownership filter
//!
//! Several ingress controllers can share a cluster; each Ingress names the
//! controller responsible for it through the `kubernetes.io/ingress.class`
//! annotation.

use super::resource::IngressResource;
use serde::{Deserialize, Serialize};

/// Which Ingresses this controller instance claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipPolicy {
    /// Class name identifying this controller instance
    pub class_name: String,
    /// When false, Ingresses without a class annotation are claimed too
    pub class_name_required: bool,
}

impl OwnershipPolicy {
    pub fn new(class_name: impl Into<String>, class_name_required: bool) -> Self {
        Self {
            class_name: class_name.into(),
            class_name_required,
        }
    }
}

/// Check if an Ingress is controlled by this instance
///
/// Unannotated Ingresses are owned only when the class name is not required;
/// otherwise the annotation must equal the class name exactly.
pub fn is_owned(policy: &OwnershipPolicy, ingress: &IngressResource) -> bool {
    let ingress_class = ingress.class_annotation();
    if !policy.class_name_required && ingress_class.is_empty() {
        return true;
    }

    ingress_class == policy.class_name
}
