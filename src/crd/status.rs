//! # Ingress Config Status
//!
//! Component route status entries published by participating operators.

use serde::{Deserialize, Serialize};

/// Status of the Ingress config resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressStatus {
    /// Current route status reported by participating operators,
    /// keyed the same way as `spec.componentRoutes`
    #[serde(default)]
    pub component_routes: Vec<ComponentRouteStatus>,
}

/// Observed state of one component route
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRouteStatus {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    /// Host name the route uses when no customization is applied
    #[serde(default)]
    pub default_hostname: String,
    /// Host names currently served by the route
    #[serde(default)]
    pub current_hostnames: Vec<String>,
    /// Service accounts that need read access to the serving secret
    #[serde(default)]
    pub consuming_users: Vec<String>,
    /// Degraded / Progressing conditions reported by the owning operator
    #[serde(default, rename = "configCondition")]
    pub conditions: Vec<ComponentRouteCondition>,
    /// Objects useful when inspecting how the route is applied
    #[serde(default)]
    pub related_objects: Vec<RelatedObject>,
}

/// Condition reported for a component route
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRouteCondition {
    /// Type of condition (Degraded, Progressing)
    pub r#type: String,
    /// Status of condition (True, False, Unknown)
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Reference to an object related to a component route
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelatedObject {
    #[serde(default)]
    pub group: String,
    pub resource: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions_use_config_condition_key() {
        let status: ComponentRouteStatus = serde_json::from_value(serde_json::json!({
            "namespace": "ns",
            "name": "r",
            "configCondition": [{ "type": "Degraded", "status": "False" }]
        }))
        .expect("status");
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].r#type, "Degraded");

        let value = serde_json::to_value(&status).expect("serialize");
        assert!(value.get("configCondition").is_some());
        assert!(value.get("conditions").is_none());
    }
}
