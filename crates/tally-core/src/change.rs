use serde_json::Value;

const GENERATED_AT_FIELD: &str = "generatedAt";
const IGNORED_TIMESTAMP: &str = "<ignored>";

/// Whether `next` differs from `previous` in anything but its generation timestamp.
///
/// Missing or non-object documents always count as changed.
pub fn has_material_change(previous: Option<&Value>, next: Option<&Value>) -> bool {
    match (without_timestamp(previous), without_timestamp(next)) {
        (Some(previous), Some(next)) => previous != next,
        _ => true,
    }
}

/// Plain text inequality with a missing side treated as empty.
pub fn has_text_change(previous: Option<&str>, next: Option<&str>) -> bool {
    previous.unwrap_or_default() != next.unwrap_or_default()
}

fn without_timestamp(document: Option<&Value>) -> Option<Value> {
    let mut object = document?.as_object()?.clone();
    object.insert(
        GENERATED_AT_FIELD.to_owned(),
        Value::String(IGNORED_TIMESTAMP.to_owned()),
    );
    Some(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn timestamp_only_difference_is_not_material() {
        let previous = json!({"generatedAt": "2026-02-18T11:00:00.000Z", "stats": {"total": 5}});
        let next = json!({"generatedAt": "2026-02-18T12:00:00.000Z", "stats": {"total": 5}});

        assert!(!has_material_change(Some(&previous), Some(&next)));
    }

    #[test]
    fn content_difference_is_material() {
        let previous = json!({"generatedAt": "a", "stats": {"total": 5}});
        let next = json!({"generatedAt": "a", "stats": {"total": 6}});

        assert!(has_material_change(Some(&previous), Some(&next)));
    }

    #[test]
    fn missing_timestamp_on_one_side_is_still_ignored() {
        let previous = json!({"stats": {"total": 5}});
        let next = json!({"generatedAt": "b", "stats": {"total": 5}});

        assert!(!has_material_change(Some(&previous), Some(&next)));
    }

    #[test]
    fn absent_or_malformed_documents_count_as_changed() {
        let next = json!({"generatedAt": "b"});

        assert!(has_material_change(None, Some(&next)));
        assert!(has_material_change(Some(&json!([1])), Some(&next)));
        assert!(has_material_change(Some(&next), None));
    }

    #[test]
    fn text_change_treats_absent_as_empty() {
        assert!(!has_text_change(None, Some("")));
        assert!(!has_text_change(Some("<svg/>"), Some("<svg/>")));
        assert!(has_text_change(None, Some("<svg/>")));
        assert!(has_text_change(Some("<svg/>"), Some("<svg></svg>")));
    }
}
