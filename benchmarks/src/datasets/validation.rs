use serde_json::Value;

/// Decides whether a raw datapoint takes part in a run. Must be pure per datapoint.
pub trait DatapointValidator: Send + Sync {
    fn is_valid(&self, datapoint: &Value) -> bool;
}

/// Structural checks on the KILT record layout: a non-empty string `id`, a
/// string `input`, and, when present, an `output` array of objects whose
/// `answer` fields are strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct KiltValidator;

impl DatapointValidator for KiltValidator {
    fn is_valid(&self, datapoint: &Value) -> bool {
        let Some(record) = datapoint.as_object() else {
            return false;
        };

        let has_id = record
            .get("id")
            .and_then(Value::as_str)
            .map_or(false, |id| !id.is_empty());
        let has_input = record.get("input").map_or(false, Value::is_string);
        if !has_id || !has_input {
            return false;
        }

        match record.get("output") {
            None => true,
            Some(Value::Array(entries)) => entries.iter().all(|entry| {
                entry.as_object().map_or(false, |entry| {
                    entry.get("answer").map_or(true, Value::is_string)
                })
            }),
            Some(_) => false,
        }
    }
}

impl<F> DatapointValidator for F
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn is_valid(&self, datapoint: &Value) -> bool {
        self(datapoint)
    }
}
