use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::AuthzError;

/// A parsed `Type::"id"` identifier; namespaced types (`App::User::"alice"`)
/// are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityUid {
    pub type_name: String,
    pub id: String,
}

impl EntityUid {
    pub fn parse(field: &'static str, raw: &str) -> Result<Self, AuthzError> {
        if raw.trim().is_empty() {
            return Err(AuthzError::invalid(field, raw, "identifier is empty"));
        }
        let Some((type_name, quoted)) = raw.split_once("::\"") else {
            return Err(AuthzError::invalid(
                field,
                raw,
                "expected Type::\"id\" form",
            ));
        };
        validate_type_path(field, raw, type_name)?;

        let Some(id) = quoted.strip_suffix('"') else {
            return Err(AuthzError::invalid(field, raw, "id is not closed by a quote"));
        };
        if has_unescaped_quote(id) {
            return Err(AuthzError::invalid(
                field,
                raw,
                "id contains an unescaped quote or dangling escape",
            ));
        }
        Ok(Self {
            type_name: type_name.to_string(),
            id: id.to_string(),
        })
    }
}

impl fmt::Display for EntityUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::\"{}\"", self.type_name, self.id)
    }
}

fn validate_type_path(field: &'static str, raw: &str, type_name: &str) -> Result<(), AuthzError> {
    for segment in type_name.split("::") {
        let mut chars = segment.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_head || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AuthzError::invalid(
                field,
                raw,
                format!("`{segment}` is not a valid type name segment"),
            ));
        }
    }
    Ok(())
}

fn has_unescaped_quote(id: &str) -> bool {
    let mut escaped = false;
    for c in id.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return true,
            _ => escaped = false,
        }
    }
    escaped
}

/// Closed set of attribute shapes a context may carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Long(i64),
    String(String),
    Set(Vec<AttrValue>),
    Record(HashMap<String, AttrValue>),
}

impl AttrValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttrValue::Bool(b) => serde_json::Value::Bool(*b),
            AttrValue::Long(n) => serde_json::Value::from(*n),
            AttrValue::String(s) => serde_json::Value::String(s.clone()),
            AttrValue::Set(items) => {
                serde_json::Value::Array(items.iter().map(AttrValue::to_json).collect())
            }
            AttrValue::Record(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Long(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(value: Vec<AttrValue>) -> Self {
        AttrValue::Set(value)
    }
}

impl From<HashMap<String, AttrValue>> for AttrValue {
    fn from(value: HashMap<String, AttrValue>) -> Self {
        AttrValue::Record(value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    attrs: HashMap<String, AttrValue>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.attrs.iter()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<AttrValue>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attrs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Identity of the entity data an engine should evaluate against.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityStoreRef {
    pub store_id: String,
    #[serde(default)]
    pub revision: u64,
}

impl EntityStoreRef {
    pub fn new(store_id: impl Into<String>, revision: u64) -> Self {
        Self {
            store_id: store_id.into(),
            revision,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    principal: String,
    action: String,
    resource: String,
    #[serde(default)]
    context: Context,
    #[serde(default)]
    entities: Option<EntityStoreRef>,
}

impl AuthorizationRequest {
    pub fn new(
        principal: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            action: action.into(),
            resource: resource.into(),
            context: Context::default(),
            entities: None,
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_entities(mut self, entities: EntityStoreRef) -> Self {
        self.entities = Some(entities);
        self
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn entities(&self) -> Option<&EntityStoreRef> {
        self.entities.as_ref()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    /// Policies that determined the outcome, in engine order.
    #[serde(default)]
    pub decision_ids: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Decision {
    pub fn allow<I, S>(policy_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: true,
            decision_ids: policy_ids.into_iter().map(Into::into).collect(),
            errors: Vec::new(),
        }
    }

    pub fn deny() -> Self {
        Self::default()
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }
}
