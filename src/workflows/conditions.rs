// Condition evaluation - flat field-equality maps over the lead snapshot
//
// The rule language is deliberately small: a JSON object whose every key
// must equal the matching field on the lead snapshot. No operators, no
// boolean composition.

use crate::models::Lead;
use serde_json::Value as JsonValue;

/// Evaluate a condition map against a lead snapshot. Every key in
/// `conditions` must be present and equal in `snapshot`; a single mismatch
/// fails the whole map. A non-object condition value is a config error.
pub fn evaluate(conditions: &JsonValue, snapshot: &JsonValue) -> Result<bool, String> {
    let map = conditions
        .as_object()
        .ok_or_else(|| "conditions must be a JSON object of field: value pairs".to_string())?;

    for (field, expected) in map {
        let actual = snapshot.get(field).unwrap_or(&JsonValue::Null);
        if actual != expected {
            return Ok(false);
        }
    }

    Ok(true)
}

/// The lead as a flat JSON snapshot for condition evaluation. Serializes
/// the full row so workflow authors can gate on any lead field.
pub fn lead_snapshot(lead: &Lead) -> Result<JsonValue, serde_json::Error> {
    serde_json::to_value(lead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::test_lead;
    use serde_json::json;

    #[test]
    fn test_all_keys_must_match() {
        let snapshot = json!({ "status": "new", "state": "CO", "converted": false });

        assert_eq!(evaluate(&json!({ "status": "new" }), &snapshot), Ok(true));
        assert_eq!(
            evaluate(&json!({ "status": "new", "state": "CO" }), &snapshot),
            Ok(true)
        );
        // One mismatch fails the whole map, no partial match.
        assert_eq!(
            evaluate(&json!({ "status": "new", "state": "TX" }), &snapshot),
            Ok(false)
        );
    }

    #[test]
    fn test_missing_field_only_matches_null() {
        let snapshot = json!({ "status": "new" });
        assert_eq!(evaluate(&json!({ "source": "website" }), &snapshot), Ok(false));
        assert_eq!(evaluate(&json!({ "source": null }), &snapshot), Ok(true));
    }

    #[test]
    fn test_empty_map_always_matches() {
        assert_eq!(evaluate(&json!({}), &json!({ "status": "new" })), Ok(true));
    }

    #[test]
    fn test_non_object_conditions_are_config_errors() {
        assert!(evaluate(&json!("status = new"), &json!({})).is_err());
        assert!(evaluate(&json!(["status"]), &json!({})).is_err());
    }

    #[test]
    fn test_trigger_gating_against_lead_snapshot() {
        let mut lead = test_lead();
        lead.status = "contacted".to_string();
        let snapshot = lead_snapshot(&lead).unwrap();

        // Gate requires "new"; a contacted lead is skipped.
        let gate = json!({ "status": "new" });
        assert_eq!(evaluate(&gate, &snapshot), Ok(false));

        lead.status = "new".to_string();
        let snapshot = lead_snapshot(&lead).unwrap();
        assert_eq!(evaluate(&gate, &snapshot), Ok(true));
    }
}
