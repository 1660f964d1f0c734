//! Host adapter: the JSON-facing surface of the reconciliation core.
//!
//! The host exchanges states and configurations as JSON objects keyed by
//! attribute name. Unknown values are represented by a sentinel string. The
//! adapter decodes them against a resource's model, runs the generic checks,
//! dispatches to the reconciler, and returns every outcome with a flat list of
//! diagnostics.

use crate::context::ApplyContext;
use crate::datasource::DataSource;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::diff::{self, Action, ChangeSet};
use crate::model::{Attribute, Presence, Schema};
use crate::resource::{ReadOutcome, Reconciler};
use crate::value::{Kind, State, Value, ValueError};
use linode_api::CancelToken;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The host's marker for a value that is unknown until apply.
pub const UNKNOWN_MARKER: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

// =============================================================================
// Encoding
// =============================================================================

fn decode_value(
    path: &str,
    kind: &Kind,
    nested: &[Attribute],
    json: &JsonValue,
) -> Result<Value, ValueError> {
    let mismatch = || ValueError::Kind {
        name: path.to_string(),
        expected: kind.to_string(),
        found: json_type(json).to_string(),
    };

    if json.as_str() == Some(UNKNOWN_MARKER) {
        return Ok(Value::Unknown);
    }
    if json.is_null() {
        return Ok(Value::Null);
    }

    match kind {
        Kind::Bool => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
        Kind::Int => {
            if let Some(n) = json.as_i64() {
                return Ok(Value::Int(n));
            }
            match json.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Value::Int(f as i64)),
                _ => Err(mismatch()),
            }
        }
        Kind::Float => json.as_f64().map(Value::Float).ok_or_else(mismatch),
        Kind::String => json
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(mismatch),
        Kind::Set(inner) | Kind::List(inner) => {
            let items = json.as_array().ok_or_else(mismatch)?;
            let values = items
                .iter()
                .enumerate()
                .map(|(i, item)| decode_value(&format!("{path}.{i}"), inner, nested, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if matches!(kind, Kind::Set(_)) {
                Value::set(values)
            } else {
                Value::List(values)
            })
        }
        Kind::Object => {
            let map = json.as_object().ok_or_else(mismatch)?;
            let mut fields = BTreeMap::new();
            for (key, item) in map {
                let value = match nested.iter().find(|a| a.name == key) {
                    Some(attr) => {
                        decode_value(&format!("{path}.{key}"), &attr.kind, &attr.nested, item)?
                    }
                    None if nested.is_empty() => json_to_value(item),
                    None => {
                        return Err(ValueError::UnsupportedAttribute(format!("{path}.{key}")));
                    }
                };
                fields.insert(key.clone(), value);
            }
            // Every declared field is present, null when omitted.
            for attr in nested {
                fields.entry(attr.name.to_string()).or_insert(Value::Null);
            }
            Ok(Value::Object(fields))
        }
    }
}

/// Untyped conversion for free-form objects.
fn json_to_value(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::Float(n.as_f64().unwrap_or_default()), Value::Int),
        JsonValue::String(s) if s == UNKNOWN_MARKER => Value::Unknown,
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        JsonValue::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect(),
        ),
    }
}

fn json_type(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Encode a value as JSON. Sets come out in canonical order.
pub fn encode_value(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Unknown => json!(UNKNOWN_MARKER),
        Value::Bool(b) => json!(b),
        Value::Int(n) => json!(n),
        Value::Float(f) => json!(f),
        Value::String(s) => json!(s),
        Value::Set(items) | Value::List(items) => {
            JsonValue::Array(items.iter().map(encode_value).collect())
        }
        Value::Object(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect(),
        ),
    }
}

/// Decode a JSON object into a state, checking each attribute's kind.
pub fn decode(schema: &Schema, json: &JsonValue) -> Result<State, ValueError> {
    let map = json
        .as_object()
        .ok_or_else(|| ValueError::NotAnObject(schema.type_name.to_string()))?;
    let mut state = State::new();
    for (key, item) in map {
        let attr = schema
            .attribute(key)
            .ok_or_else(|| ValueError::UnsupportedAttribute(key.clone()))?;
        state.set(key.clone(), decode_value(key, &attr.kind, &attr.nested, item)?);
    }
    Ok(state)
}

/// Encode a state as a JSON object containing every attribute of the model.
pub fn encode(schema: &Schema, state: &State) -> JsonValue {
    let map: Map<String, JsonValue> = schema
        .attributes
        .iter()
        .map(|attr| (attr.name.to_string(), encode_value(state.get(attr.name))))
        .collect();
    JsonValue::Object(map)
}

fn describe_attribute(attr: &Attribute) -> JsonValue {
    let mut out = Map::new();
    out.insert("type".to_string(), json!(attr.kind.to_string()));
    out.insert("presence".to_string(), json!(attr.presence.as_str()));
    if attr.force_replace {
        out.insert("force_new".to_string(), json!(true));
    }
    if let Some(default) = &attr.default {
        out.insert("default".to_string(), encode_value(default));
    }
    if !attr.description.is_empty() {
        out.insert("description".to_string(), json!(attr.description));
    }
    if !attr.nested.is_empty() {
        let nested: Map<String, JsonValue> = attr
            .nested
            .iter()
            .map(|a| (a.name.to_string(), describe_attribute(a)))
            .collect();
        out.insert("attributes".to_string(), JsonValue::Object(nested));
    }
    JsonValue::Object(out)
}

/// Describe a model as JSON for the host.
pub fn describe(schema: &Schema) -> JsonValue {
    let attributes: Map<String, JsonValue> = schema
        .attributes
        .iter()
        .map(|a| (a.name.to_string(), describe_attribute(a)))
        .collect();
    json!({
        "description": schema.description,
        "attributes": attributes,
    })
}

// =============================================================================
// Validation
// =============================================================================

fn validate_value(path: &str, attr: &Attribute, value: &Value, diags: &mut Diagnostics) {
    let elements: Vec<&Value> = match value {
        Value::Set(items) | Value::List(items) => items.iter().collect(),
        other => vec![other],
    };
    for element in &elements {
        for validator in &attr.validators {
            if let Err(msg) = validator.check(element) {
                diags.error_at(path, msg);
            }
        }
        if let Value::Object(fields) = element {
            validate_fields(path, &attr.nested, fields, diags);
        }
    }
}

fn validate_fields(
    path: &str,
    nested: &[Attribute],
    fields: &BTreeMap<String, Value>,
    diags: &mut Diagnostics,
) {
    for attr in nested {
        let value = fields.get(attr.name).unwrap_or(&Value::Null);
        let field_path = format!("{path}.{}", attr.name);
        if attr.is_required() && value.is_null() {
            diags.error_at(&field_path, "required attribute is not set");
        }
        validate_value(&field_path, attr, value, diags);
    }
}

/// Generic configuration checks: required attributes set, computed-only
/// attributes unset, validators satisfied.
pub fn validate_config(schema: &Schema, config: &State, diags: &mut Diagnostics) {
    for attr in &schema.attributes {
        let value = config.get(attr.name);
        match attr.presence {
            Presence::Required if value.is_null() => {
                diags.error_at(attr.name, "required attribute is not set");
            }
            Presence::Computed if !value.is_null() => {
                diags.error_at(attr.name, "attribute is computed and cannot be set");
            }
            _ => {}
        }
        validate_value(attr.name, attr, value, diags);
    }
}

// =============================================================================
// Responses
// =============================================================================

/// The outcome of a host call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Response {
    /// Resulting state or document, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<JsonValue>,
    /// Plan classification, for plan calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSet>,
    /// The resource no longer exists and should be dropped from state.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub gone: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl Response {
    fn failed(diags: Diagnostics) -> Self {
        Self {
            diagnostics: diags.into_vec(),
            ..Default::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == crate::diagnostics::Severity::Error)
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Registry of reconcilers and data sources, driven with JSON documents.
#[derive(Debug, Default, Clone)]
pub struct HostAdapter {
    resources: BTreeMap<&'static str, Arc<dyn Reconciler>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl HostAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reconciler: Arc<dyn Reconciler>) {
        self.resources.insert(reconciler.type_name(), reconciler);
    }

    pub fn register_data_source(&mut self, data_source: Arc<dyn DataSource>) {
        self.data_sources.insert(data_source.type_name(), data_source);
    }

    pub fn resource_types(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }

    pub fn data_source_types(&self) -> Vec<&'static str> {
        self.data_sources.keys().copied().collect()
    }

    fn reconciler(
        &self,
        type_name: &str,
        diags: &mut Diagnostics,
    ) -> Option<&Arc<dyn Reconciler>> {
        let found = self.resources.get(type_name);
        if found.is_none() {
            diags.error(format!("unsupported resource type {type_name:?}"));
        }
        found
    }

    /// Every resource and data source model.
    pub fn schema(&self) -> JsonValue {
        let resources: Map<String, JsonValue> = self
            .resources
            .iter()
            .map(|(name, r)| ((*name).to_string(), describe(r.model())))
            .collect();
        let data_sources: Map<String, JsonValue> = self
            .data_sources
            .iter()
            .map(|(name, d)| ((*name).to_string(), describe(d.model())))
            .collect();
        json!({
            "resources": resources,
            "data_sources": data_sources,
        })
    }

    fn decode_into(
        schema: &Schema,
        json: &JsonValue,
        what: &str,
        diags: &mut Diagnostics,
    ) -> Option<State> {
        match decode(schema, json) {
            Ok(state) => Some(state),
            Err(e) => {
                diags.error(format!("invalid {what}: {e}"));
                None
            }
        }
    }

    fn validate_state(reconciler: &dyn Reconciler, config: &State, diags: &mut Diagnostics) {
        validate_config(reconciler.model(), config, diags);
        reconciler.validate(config, diags);
    }

    /// Validate a configuration.
    pub fn validate(&self, type_name: &str, config: &JsonValue) -> Response {
        let mut diags = Diagnostics::new();
        let Some(reconciler) = self.reconciler(type_name, &mut diags) else {
            return Response::failed(diags);
        };
        let model = reconciler.model();
        if let Some(config) = Self::decode_into(model, config, "configuration", &mut diags) {
            Self::validate_state(reconciler.as_ref(), &config, &mut diags);
        }
        Response::failed(diags)
    }

    /// Plan the change from `prior` to `config`.
    pub fn plan(
        &self,
        cancel: &CancelToken,
        type_name: &str,
        prior: Option<&JsonValue>,
        config: Option<&JsonValue>,
    ) -> Response {
        let mut diags = Diagnostics::new();
        let Some(reconciler) = self.reconciler(type_name, &mut diags) else {
            return Response::failed(diags);
        };
        let model = reconciler.model();

        let prior = match prior {
            Some(json) => match Self::decode_into(model, json, "prior state", &mut diags) {
                Some(state) => Some(state),
                None => return Response::failed(diags),
            },
            None => None,
        };
        let config = match config {
            Some(json) => match Self::decode_into(model, json, "configuration", &mut diags) {
                Some(state) => Some(state),
                None => return Response::failed(diags),
            },
            None => None,
        };

        if let Some(config) = &config {
            Self::validate_state(reconciler.as_ref(), config, &mut diags);
            if diags.has_errors() {
                return Response::failed(diags);
            }
        }

        let mut plan = diff::plan(model, prior.as_ref(), config.as_ref());
        diags.extend(std::mem::take(&mut plan.diagnostics));

        if plan.planned.is_some() {
            let mut ctx = ApplyContext::new(cancel.clone());
            let result = reconciler.modify_plan(&mut ctx, prior.as_ref(), &mut plan);
            diags.extend(ctx.take_diagnostics());
            if let Err(e) = result {
                diags.from_error("Failed to plan resource", &e);
                return Response::failed(diags);
            }
        }

        log::info!(
            "Planned {:?} for {type_name} ({} attribute(s) changing)",
            plan.changes.action,
            plan.changes.attributes.values().filter(|c| **c != diff::Change::Unchanged).count()
        );

        Response {
            state: plan.planned.as_ref().map(|s| encode(model, s)),
            changes: Some(plan.changes),
            gone: false,
            diagnostics: diags.into_vec(),
        }
    }

    /// Apply a planned change.
    ///
    /// `checkpoint` receives partial state as soon as a new resource has an
    /// ID, so the host can persist it before any follow-up step can fail.
    pub fn apply(
        &self,
        cancel: &CancelToken,
        type_name: &str,
        prior: Option<&JsonValue>,
        planned: Option<&JsonValue>,
        checkpoint: &mut dyn FnMut(&JsonValue),
    ) -> Response {
        let mut diags = Diagnostics::new();
        let Some(reconciler) = self.reconciler(type_name, &mut diags) else {
            return Response::failed(diags);
        };
        let model = reconciler.model();

        let prior = prior.map(|json| Self::decode_into(model, json, "prior state", &mut diags));
        let prior = match prior {
            Some(None) => return Response::failed(diags),
            Some(Some(state)) => Some(state),
            None => None,
        };
        let planned =
            planned.map(|json| Self::decode_into(model, json, "planned state", &mut diags));
        let planned = match planned {
            Some(None) => return Response::failed(diags),
            Some(Some(state)) => Some(state),
            None => None,
        };

        if let Some(planned) = &planned {
            let unknown_required: Vec<&str> = model
                .attributes
                .iter()
                .filter(|a| a.is_required() && planned.get(a.name).contains_unknown())
                .map(|a| a.name)
                .collect();
            if !unknown_required.is_empty() {
                diags.error(format!(
                    "cannot apply: required attribute(s) {} are still unknown",
                    unknown_required.join(", ")
                ));
                return Response::failed(diags);
            }
        }

        let changes = diff::plan(model, prior.as_ref(), planned.as_ref()).changes;
        let mut sink = |state: &State| checkpoint(&encode(model, state));
        let mut ctx = ApplyContext::with_checkpoint(cancel.clone(), &mut sink);

        let result = match (&prior, &planned) {
            (None, None) => Ok(None),
            (Some(prior), None) => {
                log::info!("Deleting {type_name} {}", prior.str("id").unwrap_or("?"));
                reconciler.delete(&mut ctx, prior).map(|()| None)
            }
            (None, Some(planned)) => {
                log::info!("Creating {type_name}");
                reconciler.create(&mut ctx, planned).map(Some)
            }
            (Some(prior), Some(planned)) if changes.action == Action::Replace => {
                log::info!(
                    "Replacing {type_name} {} ({} changed)",
                    prior.str("id").unwrap_or("?"),
                    changes.replaced().join(", ")
                );
                reconciler
                    .delete(&mut ctx, prior)
                    .and_then(|()| reconciler.create(&mut ctx, planned))
                    .map(Some)
            }
            (Some(prior), Some(planned)) => {
                log::info!("Updating {type_name} {}", prior.str("id").unwrap_or("?"));
                reconciler
                    .update(&mut ctx, prior, planned, &changes)
                    .map(Some)
            }
        };
        diags.extend(ctx.take_diagnostics());

        match result {
            Ok(mut state) => {
                if let (Some(state), Some(planned)) = (&mut state, &planned) {
                    diff::preserve_blank(model, planned, state);
                }
                if let Some(state) = &state
                    && state.has_unknowns()
                {
                    diags.error(format!(
                        "provider produced unknown values after apply: {}",
                        state.unknown_attributes().join(", ")
                    ));
                }
                Response {
                    state: state.as_ref().map(|s| encode(model, s)),
                    changes: None,
                    gone: false,
                    diagnostics: diags.into_vec(),
                }
            }
            Err(e) => {
                diags.from_error(format!("Failed to apply {type_name}"), &e);
                Response::failed(diags)
            }
        }
    }

    fn read_response(
        model: &Schema,
        type_name: &str,
        outcome: anyhow::Result<ReadOutcome>,
        mut diags: Diagnostics,
    ) -> Response {
        match outcome {
            Ok(ReadOutcome::Found(state)) => Response {
                state: Some(encode(model, &state)),
                changes: None,
                gone: false,
                diagnostics: diags.into_vec(),
            },
            Ok(ReadOutcome::Gone) => {
                log::warn!("{type_name} no longer exists; removing it from state");
                diags.warning(format!(
                    "{type_name} no longer exists and has been removed from state"
                ));
                Response {
                    gone: true,
                    diagnostics: diags.into_vec(),
                    ..Default::default()
                }
            }
            Err(e) => {
                diags.from_error(format!("Failed to read {type_name}"), &e);
                Response::failed(diags)
            }
        }
    }

    /// Refresh a resource from the cloud.
    pub fn read(&self, cancel: &CancelToken, type_name: &str, prior: &JsonValue) -> Response {
        let mut diags = Diagnostics::new();
        let Some(reconciler) = self.reconciler(type_name, &mut diags) else {
            return Response::failed(diags);
        };
        let model = reconciler.model();
        let Some(prior) = Self::decode_into(model, prior, "prior state", &mut diags) else {
            return Response::failed(diags);
        };
        let mut ctx = ApplyContext::new(cancel.clone());
        let outcome = reconciler.read(&mut ctx, &prior).map(|outcome| match outcome {
            ReadOutcome::Found(mut state) => {
                diff::preserve_blank(model, &prior, &mut state);
                ReadOutcome::Found(state)
            }
            ReadOutcome::Gone => ReadOutcome::Gone,
        });
        diags.extend(ctx.take_diagnostics());
        Self::read_response(model, type_name, outcome, diags)
    }

    /// Import an existing resource by ID.
    pub fn import(&self, cancel: &CancelToken, type_name: &str, id: &str) -> Response {
        let mut diags = Diagnostics::new();
        let Some(reconciler) = self.reconciler(type_name, &mut diags) else {
            return Response::failed(diags);
        };
        let mut ctx = ApplyContext::new(cancel.clone());
        let outcome = reconciler.import(&mut ctx, id);
        diags.extend(ctx.take_diagnostics());
        Self::read_response(reconciler.model(), type_name, outcome, diags)
    }

    /// Run a data source.
    pub fn query(&self, cancel: &CancelToken, name: &str, args: &JsonValue) -> Response {
        let mut diags = Diagnostics::new();
        let Some(data_source) = self.data_sources.get(name) else {
            diags.error(format!("unsupported data source {name:?}"));
            return Response::failed(diags);
        };
        data_source.validate(args, &mut diags);
        if diags.has_errors() {
            return Response::failed(diags);
        }
        let mut ctx = ApplyContext::new(cancel.clone());
        let result = data_source.read(&mut ctx, args);
        diags.extend(ctx.take_diagnostics());
        match result {
            Ok(doc) => Response {
                state: Some(doc),
                diagnostics: diags.into_vec(),
                ..Default::default()
            },
            Err(e) => {
                diags.from_error(format!("Failed to read data source {name}"), &e);
                Response::failed(diags)
            }
        }
    }
}
