//! Scalr provider schema layer: declared fields per resource type, configuration
//! validation, provider-side defaults and force-new detection.

#![forbid(unsafe_code)]

use serde::Serialize;
use serde_json::Value as Json;
use thiserror::Error;
use tracing::debug;

use scalr_core::{Attrs, AttrsExt, ID_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Bool,
    /// Ordered list of strings.
    List,
    /// Unordered, duplicate-free collection of strings.
    Set,
    /// Nested block stored as a list of objects.
    Block(&'static [Field]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Required,
    Optional,
    /// Optional in configuration, filled from the remote when omitted.
    OptionalComputed,
    /// Read-only, populated from the remote representation.
    Computed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDefault {
    Bool(bool),
    /// Resolved from provider configuration (environment variable name).
    Env(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub mode: Mode,
    pub force_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldDefault>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_of: Option<&'static [&'static str]>,
    #[serde(skip_serializing_if = "no_names")]
    pub conflicts_with: &'static [&'static str],
    #[serde(skip_serializing_if = "no_names")]
    pub at_least_one_of: &'static [&'static str],
}

impl Field {
    pub const fn new(name: &'static str, ty: FieldType, mode: Mode) -> Self {
        Self {
            name,
            ty,
            mode,
            force_new: false,
            deprecated: None,
            default: None,
            max_items: None,
            one_of: None,
            conflicts_with: &[],
            at_least_one_of: &[],
        }
    }

    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        Self::new(name, ty, Mode::Required)
    }

    pub const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self::new(name, ty, Mode::Optional)
    }

    pub const fn optional_computed(name: &'static str, ty: FieldType) -> Self {
        Self::new(name, ty, Mode::OptionalComputed)
    }

    pub const fn computed(name: &'static str, ty: FieldType) -> Self {
        Self::new(name, ty, Mode::Computed)
    }

    pub const fn force_new(self) -> Self {
        Self { force_new: true, ..self }
    }

    pub const fn deprecated(self, message: &'static str) -> Self {
        Self { deprecated: Some(message), ..self }
    }

    pub const fn default(self, default: FieldDefault) -> Self {
        Self { default: Some(default), ..self }
    }

    pub const fn max_items(self, max: usize) -> Self {
        Self { max_items: Some(max), ..self }
    }

    pub const fn one_of(self, values: &'static [&'static str]) -> Self {
        Self { one_of: Some(values), ..self }
    }

    pub const fn conflicts_with(self, names: &'static [&'static str]) -> Self {
        Self { conflicts_with: names, ..self }
    }

    pub const fn at_least_one_of(self, names: &'static [&'static str]) -> Self {
        Self { at_least_one_of: names, ..self }
    }
}

fn no_names(names: &&'static [&'static str]) -> bool {
    names.is_empty()
}

/// Shared `created_by` block: computed audit metadata.
pub const CREATED_BY: &[Field] = &[
    Field::computed("username", FieldType::String),
    Field::computed("email", FieldType::String),
    Field::computed("full_name", FieldType::String),
];

/// Provider-level default for `account_id`.
pub const ACCOUNT_ID_ENV: &str = "SCALR_ACCOUNT_ID";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResourceSchema {
    pub type_name: &'static str,
    pub version: u32,
    pub fields: &'static [Field],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaIssue {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Error)]
#[error("invalid {type_name} configuration: {}", join_issues(.issues))]
pub struct SchemaError {
    pub type_name: &'static str,
    pub issues: Vec<SchemaIssue>,
}

fn join_issues(issues: &[SchemaIssue]) -> String {
    issues.iter().map(|i| format!("{}: {}", i.path, i.error)).collect::<Vec<_>>().join("; ")
}

impl ResourceSchema {
    pub const fn new(type_name: &'static str, version: u32, fields: &'static [Field]) -> Self {
        Self { type_name, version, fields }
    }

    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check a configuration against the declared fields. Returns deprecation
    /// warnings on success.
    pub fn validate(&self, config: &Attrs) -> Result<Vec<String>, SchemaError> {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        validate_object(self.fields, config, "", &mut issues, &mut warnings);
        if issues.is_empty() {
            Ok(warnings)
        } else {
            debug!(type_name = self.type_name, issues = issues.len(), "configuration rejected");
            Err(SchemaError { type_name: self.type_name, issues })
        }
    }

    /// Fill omitted fields that declare a default. `lookup` resolves
    /// [`FieldDefault::Env`] names against provider configuration.
    pub fn apply_defaults(&self, config: &mut Attrs, lookup: &dyn Fn(&str) -> Option<String>) {
        for field in self.fields {
            if config.present(field.name).is_some() {
                continue;
            }
            let value = match field.default {
                Some(FieldDefault::Bool(b)) => Some(Json::Bool(b)),
                Some(FieldDefault::Env(name)) => lookup(name).filter(|s| !s.is_empty()).map(Json::String),
                None => None,
            };
            if let Some(value) = value {
                config.insert(field.name.to_string(), value);
            }
        }
    }

    /// Force-new fields whose desired value differs from the prior state.
    /// Omitted optional+computed fields keep the prior value and never force
    /// a replacement.
    pub fn requires_replace(&self, prior: &Attrs, desired: &Attrs) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.force_new)
            .filter(|f| match desired.present(f.name) {
                Some(want) => prior.present(f.name) != Some(want),
                None => false,
            })
            .map(|f| f.name)
            .collect()
    }
}

fn path_of(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn validate_object(
    fields: &'static [Field],
    config: &Attrs,
    base: &str,
    issues: &mut Vec<SchemaIssue>,
    warnings: &mut Vec<String>,
) {
    fn push(issues: &mut Vec<SchemaIssue>, path: String, error: impl Into<String>) {
        issues.push(SchemaIssue { path, error: error.into() });
    }

    for key in config.keys() {
        if key == ID_KEY && base.is_empty() && !fields.iter().any(|f| f.name == ID_KEY) {
            continue;
        }
        if !fields.iter().any(|f| f.name == key) {
            push(issues, path_of(base, key), "unsupported argument");
        }
    }

    for field in fields {
        let path = path_of(base, field.name);
        let value = config.present(field.name);

        if field.mode == Mode::Required && value.is_none() {
            push(issues, path.clone(), "required field is missing");
        }
        if !field.at_least_one_of.is_empty()
            && value.is_none()
            && field.at_least_one_of.iter().all(|other| config.present(other).is_none())
        {
            let names: Vec<&str> = std::iter::once(field.name).chain(field.at_least_one_of.iter().copied()).collect();
            push(issues, path.clone(), format!("one of `{}` must be specified", names.join(", ")));
        }

        let Some(value) = value else { continue };

        if field.mode == Mode::Computed {
            push(issues, path, "value is computed and cannot be set");
            continue;
        }
        for other in field.conflicts_with {
            if config.present(other).is_some() {
                push(issues, path.clone(), format!("conflicts with `{}`", other));
            }
        }
        if let Some(message) = field.deprecated {
            warnings.push(format!("{}: {}", path, message));
        }

        match field.ty {
            FieldType::String => match value.as_str() {
                Some(s) => {
                    if let Some(allowed) = field.one_of {
                        if !allowed.contains(&s) {
                            push(issues, path, format!("expected one of [{}], got {:?}", allowed.join(", "), s));
                        }
                    }
                }
                None => push(issues, path, "expected a string"),
            },
            FieldType::Bool => {
                if !value.is_boolean() {
                    push(issues, path, "expected a bool");
                }
            }
            FieldType::List | FieldType::Set => match value.as_array() {
                Some(items) => {
                    let mut seen = std::collections::BTreeSet::new();
                    for (i, item) in items.iter().enumerate() {
                        let item_path = format!("{}.{}", path, i);
                        match item.as_str() {
                            Some("") => push(issues, item_path, "must not be empty"),
                            Some(s) => {
                                if field.ty == FieldType::Set && !seen.insert(s) {
                                    push(issues, item_path, format!("duplicate value {:?} in set", s));
                                }
                            }
                            None => push(issues, item_path, "expected a string"),
                        }
                    }
                }
                None => push(issues, path, "expected a list of strings"),
            },
            FieldType::Block(inner) => match value.as_array() {
                Some(items) => {
                    if let Some(max) = field.max_items {
                        if items.len() > max {
                            push(issues, path.clone(), format!("at most {} block(s) allowed, got {}", max, items.len()));
                        }
                    }
                    for (i, item) in items.iter().enumerate() {
                        let item_path = format!("{}.{}", path, i);
                        match item.as_object() {
                            Some(obj) => validate_object(inner, obj, &item_path, issues, warnings),
                            None => push(issues, item_path, "expected a block"),
                        }
                    }
                }
                None => push(issues, path, "expected a list of blocks"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VCS_REPO: &[Field] = &[
        Field::required("identifier", FieldType::String),
        Field::optional("branch", FieldType::String),
        Field::optional("trigger_prefixes", FieldType::List),
    ];

    const FIELDS: &[Field] = &[
        Field::required("name", FieldType::String),
        Field::optional_computed("account_id", FieldType::String).force_new().default(FieldDefault::Env(ACCOUNT_ID_ENV)),
        Field::optional("auto_apply", FieldType::Bool).default(FieldDefault::Bool(false)),
        Field::optional_computed("mode", FieldType::String).one_of(&["remote", "local"]),
        Field::optional_computed("legacy", FieldType::Bool).deprecated("use `mode` instead"),
        Field::optional("tag_ids", FieldType::Set),
        Field::optional("vcs_repo", FieldType::Block(VCS_REPO)).max_items(1),
        Field::computed("status", FieldType::String),
        Field::computed("created_by", FieldType::Block(CREATED_BY)),
    ];

    const SCHEMA: ResourceSchema = ResourceSchema::new("scalr_widget", 2, FIELDS);

    fn attrs(v: serde_json::Value) -> Attrs {
        v.as_object().cloned().unwrap()
    }

    fn paths(err: SchemaError) -> Vec<String> {
        err.issues.into_iter().map(|i| i.path).collect()
    }

    #[test]
    fn accepts_valid_configuration_and_reports_deprecations() {
        let cfg = attrs(json!({
            "name": "w",
            "mode": "local",
            "legacy": true,
            "tag_ids": ["tag-1", "tag-2"],
            "vcs_repo": [{ "identifier": "org/repo", "trigger_prefixes": ["infra/"] }]
        }));
        let warnings = SCHEMA.validate(&cfg).unwrap();
        assert_eq!(warnings, vec!["legacy: use `mode` instead".to_string()]);
    }

    #[test]
    fn collects_every_issue() {
        let cfg = attrs(json!({
            "mode": "hybrid",
            "status": "Active",
            "tag_ids": ["tag-1", "tag-1", ""],
            "vcs_repo": [{ "branch": "main" }, { "identifier": "x" }],
            "bogus": 1
        }));
        let got = paths(SCHEMA.validate(&cfg).unwrap_err());
        for expected in ["bogus", "name", "mode", "status", "tag_ids.1", "tag_ids.2", "vcs_repo", "vcs_repo.0.identifier"] {
            assert!(got.contains(&expected.to_string()), "missing {} in {:?}", expected, got);
        }
    }

    #[test]
    fn id_key_is_tolerated_at_top_level() {
        let cfg = attrs(json!({ "id": "w-1", "name": "w" }));
        assert!(SCHEMA.validate(&cfg).is_ok());
    }

    #[test]
    fn defaults_fill_only_missing_fields() {
        let mut cfg = attrs(json!({ "name": "w", "auto_apply": true }));
        SCHEMA.apply_defaults(&mut cfg, &|name: &str| (name == ACCOUNT_ID_ENV).then(|| "acc-1".to_string()));
        assert_eq!(cfg["account_id"], json!("acc-1"));
        assert_eq!(cfg["auto_apply"], json!(true));

        let mut cfg = attrs(json!({ "name": "w" }));
        SCHEMA.apply_defaults(&mut cfg, &|_: &str| None);
        assert!(!cfg.contains_key("account_id"));
        assert_eq!(cfg["auto_apply"], json!(false));
    }

    #[test]
    fn replacement_only_for_changed_force_new_fields() {
        let prior = attrs(json!({ "name": "a", "account_id": "acc-1" }));
        assert!(SCHEMA.requires_replace(&prior, &attrs(json!({ "name": "b" }))).is_empty());
        assert!(SCHEMA.requires_replace(&prior, &attrs(json!({ "name": "b", "account_id": "acc-1" }))).is_empty());
        assert_eq!(SCHEMA.requires_replace(&prior, &attrs(json!({ "account_id": "acc-2" }))), vec!["account_id"]);
    }

    #[test]
    fn conflicting_and_alternative_fields() {
        const LOOKUP: &[Field] = &[
            Field::optional_computed("id", FieldType::String).at_least_one_of(&["email"]),
            Field::optional_computed("email", FieldType::String).conflicts_with(&["id"]),
        ];
        let schema = ResourceSchema::new("scalr_lookup", 0, LOOKUP);
        assert_eq!(paths(schema.validate(&Attrs::new()).unwrap_err()), vec!["id"]);
        assert_eq!(paths(schema.validate(&attrs(json!({ "id": "a", "email": "b" }))).unwrap_err()), vec!["email"]);
        assert!(schema.validate(&attrs(json!({ "email": "sa@example.com" }))).is_ok());
    }
}
