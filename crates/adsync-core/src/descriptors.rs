//! Static reflection metadata for the selected fields of each entity kind.
//!
//! Field names are the platform's snake_case names, which are also the keys
//! written into staged records. A descriptor may declare more fields than the
//! record carries; missing columns load as NULL.

use crate::models::EntityKind;
use crate::schema::{FieldDescriptor as Field, MessageDescriptor as Message, WireType};

fn string_value(name: &str) -> Field {
    Field::message(name, Message::wrapper("StringValue", WireType::String))
}

fn int64_value(name: &str) -> Field {
    Field::message(name, Message::wrapper("Int64Value", WireType::Int64))
}

fn int32_value(name: &str) -> Field {
    Field::message(name, Message::wrapper("Int32Value", WireType::Int32))
}

pub fn for_kind(kind: EntityKind) -> Vec<Field> {
    match kind {
        EntityKind::Account => account(),
        EntityKind::Campaign => campaign(),
        EntityKind::AdGroup => ad_group(),
        EntityKind::AdGroupAd => ad_group_ad(),
    }
}

pub fn account() -> Vec<Field> {
    vec![
        Field::scalar("resource_name", WireType::String),
        string_value("client_customer"),
        int64_value("manager_link_id"),
        Field::enumeration("status"),
    ]
}

pub fn campaign() -> Vec<Field> {
    vec![
        Field::scalar("resource_name", WireType::String),
        int64_value("id"),
        string_value("name"),
        Field::enumeration("status"),
        Field::enumeration("serving_status"),
        Field::enumeration("ad_serving_optimization_status"),
        string_value("start_date"),
        string_value("end_date"),
        string_value("campaign_budget"),
    ]
}

pub fn ad_group() -> Vec<Field> {
    let custom_parameter = Message::new(
        "CustomParameter",
        vec![string_value("key"), string_value("value")],
    );

    vec![
        Field::scalar("resource_name", WireType::String),
        int64_value("id"),
        string_value("name"),
        Field::enumeration("status"),
        Field::enumeration("type"),
        Field::enumeration("ad_rotation_mode"),
        string_value("tracking_url_template"),
        Field::message("url_custom_parameters", custom_parameter).repeated(),
        string_value("campaign"),
        int64_value("cpc_bid_micros"),
        int64_value("cpm_bid_micros"),
        int64_value("cpv_bid_micros"),
        int64_value("percent_cpc_bid_micros"),
    ]
}

pub fn ad_group_ad() -> Vec<Field> {
    vec![
        Field::scalar("resource_name", WireType::String),
        Field::enumeration("status"),
        string_value("ad_group"),
        Field::message("ad", ad()),
        Field::message("policy_summary", policy_summary()),
    ]
}

fn ad() -> Message {
    Message::new(
        "Ad",
        vec![
            Field::scalar("resource_name", WireType::String),
            int64_value("id"),
            Field::enumeration("type"),
            string_value("final_urls").repeated(),
            Field::message("hotel_ad", Message::new("HotelAdInfo", vec![])),
            Field::message(
                "shopping_smart_ad",
                Message::new("ShoppingSmartAdInfo", vec![]),
            ),
            Field::message(
                "shopping_product_ad",
                Message::new("ShoppingProductAdInfo", vec![]),
            ),
        ],
    )
}

fn policy_summary() -> Message {
    let text_list = Message::new("TextList", vec![string_value("texts").repeated()]);
    let destination_not_working = Message::new(
        "DestinationNotWorking",
        vec![
            string_value("expanded_url"),
            Field::enumeration("device"),
            string_value("last_checked_date_time"),
            Field::enumeration("dns_error_type"),
            int64_value("http_error_code"),
            int32_value("http_code"),
        ],
    );
    let evidence = Message::new(
        "PolicyTopicEvidence",
        vec![
            Field::message("text_list", text_list),
            Field::message("destination_not_working", destination_not_working),
            int32_value("language_code"),
        ],
    );
    let entry = Message::new(
        "PolicyTopicEntry",
        vec![
            string_value("topic"),
            Field::enumeration("type"),
            Field::message("evidences", evidence).repeated(),
        ],
    );

    Message::new(
        "PolicySummary",
        vec![
            Field::message("policy_topic_entries", entry).repeated(),
            Field::enumeration("review_status"),
            Field::enumeration("approval_status"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec, SchemaTranslator};

    fn find<'a>(fields: &'a [FieldSpec], name: &str) -> &'a FieldSpec {
        fields.iter().find(|f| f.name == name).unwrap()
    }

    #[test]
    fn test_every_kind_translates() {
        let translator = SchemaTranslator::default();
        for kind in EntityKind::ALL {
            let spec = translator.translate(&for_kind(kind)).unwrap();
            assert!(!spec.is_empty(), "{kind} has no columns");
        }
    }

    #[test]
    fn test_ad_group_ad_columns() {
        let spec = SchemaTranslator::default().translate(&ad_group_ad()).unwrap();

        let ad = find(&spec, "ad");
        assert_eq!(ad.kind, FieldKind::Record);
        assert!(ad.repeated);
        assert_eq!(find(&ad.children, "id").kind, FieldKind::Integer);
        assert_eq!(find(&ad.children, "hotel_ad").kind, FieldKind::String);
        let urls = find(&ad.children, "final_urls");
        assert_eq!(urls.kind, FieldKind::String);
        assert!(urls.repeated);

        let summary = find(&spec, "policy_summary");
        let entries = find(&summary.children, "policy_topic_entries");
        let evidences = find(&entries.children, "evidences");
        let texts = find(&find(&evidences.children, "text_list").children, "texts");
        assert_eq!(texts.kind, FieldKind::String);
        assert!(texts.repeated);
        let http_code = find(
            &find(&evidences.children, "destination_not_working").children,
            "http_code",
        );
        assert_eq!(http_code.kind, FieldKind::Integer);
    }

    #[test]
    fn test_ad_group_custom_parameters() {
        let spec = SchemaTranslator::default().translate(&ad_group()).unwrap();
        let params = find(&spec, "url_custom_parameters");
        assert_eq!(params.kind, FieldKind::Record);
        assert!(params.repeated);
        assert_eq!(params.children.len(), 2);
        assert_eq!(find(&spec, "type").kind, FieldKind::String);
    }
}
