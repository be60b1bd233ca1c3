//! Conversions between Nomad wire types and generic field records.

use chrono::{DateTime, Utc};

use crate::resource::{FieldMap, FieldValue};

use super::types::{AclPolicy, AclToken, Namespace, SentinelPolicy};

fn string_field(record: &FieldMap, name: &str) -> String {
    record
        .get(name)
        .and_then(FieldValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn optional_bool_field(record: &FieldMap, name: &str) -> Option<bool> {
    record.get(name).and_then(FieldValue::as_bool)
}

fn set_field(record: &FieldMap, name: &str) -> Vec<String> {
    record
        .get(name)
        .and_then(FieldValue::as_set)
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default()
}

fn record<const N: usize>(entries: [(&str, FieldValue); N]) -> FieldMap {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Renders a timestamp in UTC as `YYYY-MM-DD HH:MM:SS[.fraction] +0000 UTC`,
/// trailing zeros of the fraction trimmed.
#[must_use]
pub fn format_create_time(time: &DateTime<Utc>) -> String {
    let mut rendered = time.format("%Y-%m-%d %H:%M:%S").to_string();
    let nanos = time.timestamp_subsec_nanos();
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        rendered.push('.');
        rendered.push_str(fraction.trim_end_matches('0'));
    }
    rendered.push_str(" +0000 UTC");
    rendered
}

impl From<&AclPolicy> for FieldMap {
    fn from(policy: &AclPolicy) -> Self {
        record([
            ("name", policy.name.clone().into()),
            ("description", policy.description.clone().into()),
            ("rules_hcl", policy.rules.clone().into()),
        ])
    }
}

impl From<&FieldMap> for AclPolicy {
    fn from(fields: &FieldMap) -> Self {
        Self {
            name: string_field(fields, "name"),
            description: string_field(fields, "description"),
            rules: string_field(fields, "rules_hcl"),
            ..Self::default()
        }
    }
}

impl From<&AclToken> for FieldMap {
    fn from(token: &AclToken) -> Self {
        let create_time = token
            .create_time
            .as_ref()
            .map(format_create_time)
            .unwrap_or_default();
        record([
            ("accessor_id", token.accessor_id.clone().into()),
            ("secret_id", token.secret_id.clone().into()),
            ("name", token.name.clone().into()),
            ("type", token.token_type.clone().into()),
            ("policies", token.policies.clone().unwrap_or_default().into()),
            ("global", token.global.unwrap_or_default().into()),
            ("create_time", create_time.into()),
        ])
    }
}

impl From<&FieldMap> for AclToken {
    fn from(fields: &FieldMap) -> Self {
        Self {
            accessor_id: string_field(fields, "accessor_id"),
            name: string_field(fields, "name"),
            token_type: string_field(fields, "type"),
            policies: Some(set_field(fields, "policies")),
            global: optional_bool_field(fields, "global"),
            ..Self::default()
        }
    }
}

impl From<&Namespace> for FieldMap {
    fn from(namespace: &Namespace) -> Self {
        record([
            ("name", namespace.name.clone().into()),
            ("description", namespace.description.clone().into()),
            ("quota", namespace.quota.clone().into()),
        ])
    }
}

impl From<&FieldMap> for Namespace {
    fn from(fields: &FieldMap) -> Self {
        Self {
            name: string_field(fields, "name"),
            description: string_field(fields, "description"),
            quota: string_field(fields, "quota"),
            ..Self::default()
        }
    }
}

impl From<&SentinelPolicy> for FieldMap {
    fn from(policy: &SentinelPolicy) -> Self {
        record([
            ("name", policy.name.clone().into()),
            ("description", policy.description.clone().into()),
            ("scope", policy.scope.clone().into()),
            ("enforcement_level", policy.enforcement_level.clone().into()),
            ("policy", policy.policy.clone().into()),
        ])
    }
}

impl From<&FieldMap> for SentinelPolicy {
    fn from(fields: &FieldMap) -> Self {
        Self {
            name: string_field(fields, "name"),
            description: string_field(fields, "description"),
            scope: string_field(fields, "scope"),
            enforcement_level: string_field(fields, "enforcement_level"),
            policy: string_field(fields, "policy"),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_create_time() {
        let time = Utc
            .with_ymd_and_hms(2017, 8, 23, 22, 47, 14)
            .single()
            .expect("valid timestamp");
        assert_eq!(format_create_time(&time), "2017-08-23 22:47:14 +0000 UTC");

        let precise = time + chrono::Duration::nanoseconds(695_408_000);
        assert_eq!(
            format_create_time(&precise),
            "2017-08-23 22:47:14.695408 +0000 UTC"
        );
    }

    #[test]
    fn test_token_record_round_trip() {
        let token = AclToken {
            accessor_id: String::from("a-1"),
            secret_id: String::from("s-1"),
            name: String::from("ci"),
            token_type: String::from("client"),
            policies: Some(vec![String::from("write"), String::from("read")]),
            global: Some(true),
            ..AclToken::default()
        };
        let fields = FieldMap::from(&token);
        assert_eq!(fields.get("create_time"), Some(&FieldValue::from("")));

        let back = AclToken::from(&fields);
        assert_eq!(back.accessor_id, "a-1");
        assert!(back.secret_id.is_empty());
        assert_eq!(
            back.policies,
            Some(vec![String::from("read"), String::from("write")])
        );
        assert_eq!(back.global, Some(true));
    }

    #[test]
    fn test_policy_rules_field_name() {
        let policy = AclPolicy {
            name: String::from("readonly"),
            rules: String::from("namespace \"default\" { policy = \"read\" }"),
            ..AclPolicy::default()
        };
        let fields = FieldMap::from(&policy);
        assert!(fields.contains_key("rules_hcl"));
        assert_eq!(AclPolicy::from(&fields).rules, policy.rules);
    }

    #[test]
    fn test_token_patch_leaves_global_unset() {
        use crate::resource::{DesiredState, ACL_TOKEN};

        let desired = DesiredState::new()
            .with("type", "client")
            .with("global", true);
        let token = AclToken::from(&ACL_TOKEN.update_record("a-1", &desired));
        assert_eq!(token.global, None);

        let body = serde_json::to_value(&token).expect("token serializes");
        assert!(body.get("Global").is_none(), "body: {body}");

        let created = AclToken::from(&ACL_TOKEN.create_record(&desired));
        assert_eq!(created.global, Some(true));
    }
}
