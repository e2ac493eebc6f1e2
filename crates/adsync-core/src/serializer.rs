use serde::Serialize;

use crate::error::AppError;

/// Encode one entity as a single canonical JSON line (no trailing newline).
///
/// Field names are the entity's snake_case names. Unset scalars are written
/// as `null` and unset nested records as `[]`, so every record carries the
/// full column set.
pub fn to_ndjson_line<T: Serialize>(entity: &T) -> Result<String, AppError> {
    let line = serde_json::to_string(entity)?;
    debug_assert!(!line.contains('\n'));
    Ok(line)
}

/// Encode a batch, skipping records that fail to serialize.
pub fn serialize_batch<T: Serialize>(entities: &[T]) -> Vec<String> {
    entities
        .iter()
        .enumerate()
        .filter_map(|(position, entity)| match to_ndjson_line(entity) {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::warn!(position, error = %e, "Skipping record that failed to serialize");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors;
    use crate::entity::Entity;
    use crate::models::{Account, AccountStatus, AdGroup, AdGroupAd, Campaign, EntityKind};
    use crate::schema::SchemaTranslator;
    use crate::testutil::{
        account_row, ad_group_ad_row, ad_group_row, campaign_row, check_record_shape,
    };

    fn line_for(kind: EntityKind, row: &serde_json::Value) -> String {
        match kind {
            EntityKind::Account => to_ndjson_line(&Account::project(row).unwrap()),
            EntityKind::Campaign => to_ndjson_line(&Campaign::project(row).unwrap()),
            EntityKind::AdGroup => to_ndjson_line(&AdGroup::project(row).unwrap()),
            EntityKind::AdGroupAd => to_ndjson_line(&AdGroupAd::project(row).unwrap()),
        }
        .unwrap()
    }

    #[test]
    fn test_line_uses_snake_case_names() {
        let campaign = Campaign {
            id: Some("123".into()),
            name: Some("Spring sale\nEU".into()),
            ad_serving_optimization_status: Some("OPTIMIZE".into()),
            ..Default::default()
        };
        let line = to_ndjson_line(&campaign).unwrap();
        assert!(!line.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], "123");
        assert_eq!(value["name"], "Spring sale\nEU");
        assert_eq!(value["ad_serving_optimization_status"], "OPTIMIZE");
        assert!(value["end_date"].is_null());
    }

    #[test]
    fn test_lines_match_the_warehouse_schema() {
        let translator = SchemaTranslator::default();
        for kind in EntityKind::ALL {
            let schema = translator.translate(&descriptors::for_kind(kind)).unwrap();
            let row = match kind {
                EntityKind::Account => account_row("customers/1", "ACTIVE"),
                EntityKind::Campaign => campaign_row(1),
                EntityKind::AdGroup => ad_group_row(1),
                EntityKind::AdGroupAd => ad_group_ad_row(1),
            };
            let record: serde_json::Value = serde_json::from_str(&line_for(kind, &row)).unwrap();
            if let Err(e) = check_record_shape(&schema, &record) {
                panic!("{kind}: {e}: {record}");
            }
        }
    }

    #[test]
    fn test_singular_records_are_written_as_arrays() {
        let ad = AdGroupAd::project(&ad_group_ad_row(7)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&to_ndjson_line(&ad).unwrap()).unwrap();
        assert_eq!(value["ad"][0]["id"], "7");
        assert_eq!(value["policy_summary"][0]["approval_status"], "APPROVED");

        let empty = to_ndjson_line(&AdGroupAd::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&empty).unwrap();
        assert_eq!(value["ad"], serde_json::json!([]));
        assert_eq!(value["policy_summary"], serde_json::json!([]));
        assert!(value["resource_name"].is_null());
    }

    #[test]
    fn test_batch_preserves_order() {
        let accounts = vec![
            Account::new("customers/1", AccountStatus::Active),
            Account::new("customers/2", AccountStatus::Inactive),
        ];
        let lines = serialize_batch(&accounts);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("customers/1"));
        assert!(lines[1].contains("INACTIVE"));
    }
}
