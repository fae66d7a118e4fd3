//! Deal records read from the CRM and the fail-soft lookup used by the start workflow.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::errors::CrmError;

pub const DEFAULT_CUSTOMER_NAME: &str = "Customer";

/// Estimator custom field as it arrives from the CRM, resolved once at ingestion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EstimatorField {
    /// Option-style field rendered as `{ "value": "Kim", ... }`.
    Keyed(String),
    /// Free-text field.
    Plain(String),
    #[default]
    Absent,
}

impl EstimatorField {
    pub fn from_value(raw: Option<&Value>) -> Self {
        match raw {
            Some(Value::Object(object)) => match object.get("value") {
                Some(Value::String(value)) => Self::Keyed(value.clone()),
                Some(Value::Number(value)) => Self::Keyed(value.to_string()),
                _ => Self::Absent,
            },
            Some(Value::String(value)) => Self::Plain(value.clone()),
            _ => Self::Absent,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Keyed(name) | Self::Plain(name) => Some(name.as_str()),
            Self::Absent => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DealRecord {
    pub person_name: Option<String>,
    pub estimator: EstimatorField,
}

impl DealRecord {
    /// Builds a record from the CRM's `data` object. `person_name` is accepted either
    /// as a string or as an expanded person object with a `name` member.
    pub fn from_data(data: &Value, estimator_field_key: &str) -> Self {
        let person_name = match data.get("person_name") {
            Some(Value::String(name)) => Some(name.clone()),
            Some(Value::Object(person)) => {
                person.get("name").and_then(Value::as_str).map(str::to_owned)
            }
            _ => None,
        }
        .filter(|name| !name.is_empty());

        Self {
            person_name,
            estimator: EstimatorField::from_value(data.get(estimator_field_key)),
        }
    }
}

#[async_trait]
pub trait DealDirectory: Send + Sync {
    async fn fetch_deal(&self, deal_id: &str) -> Result<DealRecord, CrmError>;
}

/// What the workflow needs from a deal, with defaults already applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DealSummary {
    pub customer_name: String,
    pub estimator: Option<String>,
}

impl Default for DealSummary {
    fn default() -> Self {
        Self { customer_name: DEFAULT_CUSTOMER_NAME.to_owned(), estimator: None }
    }
}

impl From<DealRecord> for DealSummary {
    fn from(record: DealRecord) -> Self {
        Self {
            customer_name: record
                .person_name
                .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_owned()),
            estimator: record.estimator.name().map(str::to_owned),
        }
    }
}

/// Looks up a deal and never fails: CRM errors are logged and replaced by defaults.
pub async fn lookup_deal(directory: &dyn DealDirectory, deal_id: &str) -> DealSummary {
    match directory.fetch_deal(deal_id).await {
        Ok(record) => DealSummary::from(record),
        Err(error) => {
            warn!(
                event_name = "crm.deal.lookup_failed",
                deal_id,
                error = %error,
                "crm deal lookup failed; continuing with defaults"
            );
            DealSummary::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::{lookup_deal, DealDirectory, DealRecord, DealSummary, EstimatorField};
    use crate::errors::CrmError;

    const KEY: &str = "estimator_key";

    struct FixedDirectory(Result<DealRecord, CrmError>);

    #[async_trait]
    impl DealDirectory for FixedDirectory {
        async fn fetch_deal(&self, _deal_id: &str) -> Result<DealRecord, CrmError> {
            self.0.clone()
        }
    }

    #[test]
    fn estimator_object_with_value_is_keyed() {
        let field = EstimatorField::from_value(Some(&json!({ "value": "Kim", "id": 12 })));
        assert_eq!(field, EstimatorField::Keyed("Kim".to_owned()));
        assert_eq!(field.name(), Some("Kim"));
    }

    #[test]
    fn estimator_string_is_plain() {
        let field = EstimatorField::from_value(Some(&json!("  KIM  ")));
        assert_eq!(field, EstimatorField::Plain("  KIM  ".to_owned()));
    }

    #[test]
    fn other_estimator_shapes_are_absent() {
        assert_eq!(EstimatorField::from_value(None), EstimatorField::Absent);
        assert_eq!(EstimatorField::from_value(Some(&json!(null))), EstimatorField::Absent);
        assert_eq!(EstimatorField::from_value(Some(&json!(42))), EstimatorField::Absent);
        assert_eq!(EstimatorField::from_value(Some(&json!(["Kim"]))), EstimatorField::Absent);
        assert_eq!(
            EstimatorField::from_value(Some(&json!({ "label": "Kim" }))),
            EstimatorField::Absent
        );
    }

    #[test]
    fn record_reads_person_name_in_both_shapes() {
        let flat = DealRecord::from_data(&json!({ "person_name": "Pat Doe" }), KEY);
        let expanded =
            DealRecord::from_data(&json!({ "person_name": { "name": "Pat Doe", "value": 9 } }), KEY);

        assert_eq!(flat.person_name.as_deref(), Some("Pat Doe"));
        assert_eq!(expanded.person_name.as_deref(), Some("Pat Doe"));
    }

    #[test]
    fn summary_defaults_missing_customer() {
        let record = DealRecord::from_data(&json!({ KEY: { "value": "Danica" } }), KEY);
        let summary = DealSummary::from(record);

        assert_eq!(summary.customer_name, "Customer");
        assert_eq!(summary.estimator.as_deref(), Some("Danica"));
    }

    #[tokio::test]
    async fn lookup_failure_yields_defaults() {
        let directory = FixedDirectory(Err(CrmError::Transport("connection refused".to_owned())));

        let summary = lookup_deal(&directory, "107").await;

        assert_eq!(summary, DealSummary::default());
    }

    #[tokio::test]
    async fn lookup_success_maps_record() {
        let directory = FixedDirectory(Ok(DealRecord {
            person_name: Some("Pat Doe".to_owned()),
            estimator: EstimatorField::Plain("Kim".to_owned()),
        }));

        let summary = lookup_deal(&directory, "107").await;

        assert_eq!(summary.customer_name, "Pat Doe");
        assert_eq!(summary.estimator.as_deref(), Some("Kim"));
    }
}
