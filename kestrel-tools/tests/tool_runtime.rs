//! Registry-level behavior of the built-in configuration tools.

use kestrel_core::error::ToolError;
use kestrel_tools::config_tools::{ESTIMATE_COST_SIGNALS, VALIDATE_CONFIG, ValidateConfigOutput};
use kestrel_tools::register_builtin_tools;
use kestrel_tools::registry::ToolRegistry;
use serde_json::json;

fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry).unwrap();
    registry
}

#[tokio::test]
async fn validate_then_estimate() {
    let registry = registry();
    let yaml = "kind: NodePool\nmetadata:\n  name: arm\nspec:\n  template:\n    spec:\n      requirements:\n        - key: karpenter.k8s.aws/instance-family\n          operator: In\n          values: [c7g]\n";

    let validated = registry
        .execute(VALIDATE_CONFIG, json!({ "yaml_text": yaml }))
        .await
        .unwrap();
    let output: ValidateConfigOutput = serde_json::from_value(validated.data).unwrap();
    assert!(output.valid);

    let signals = registry
        .execute(ESTIMATE_COST_SIGNALS, json!({ "config": output.config }))
        .await
        .unwrap();
    assert_eq!(signals.data["signals"]["graviton_used"], 1);
    assert_eq!(signals.data["signals"]["spot_enabled"], 0);
}

#[tokio::test]
async fn schema_violation_aborts_only_that_call() {
    let registry = registry();

    let err = registry
        .execute(VALIDATE_CONFIG, json!({ "yaml": "wrong field" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::InvalidArguments { .. }));

    // The registry stays usable after a rejected call.
    let ok = registry
        .execute(VALIDATE_CONFIG, json!({ "yaml_text": "kind: EC2NodeClass\n" }))
        .await;
    assert!(ok.is_ok());
}

#[test]
fn definitions_carry_schemas() {
    for definition in registry().list_definitions() {
        assert_eq!(definition.parameters["type"], "object", "{}", definition.name);
        assert!(!definition.description.is_empty());
    }
}
