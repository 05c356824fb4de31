pub mod descriptor;
pub mod schema;

pub use descriptor::{
    BodyShape, HttpMethod, ListEncoding, OperationDescriptor, ParamKind, ParameterSpec, Placement,
    ResponseKind, ValueType,
};

use crate::constants::limits::SUGGESTION_LIMIT;
use crate::errors::AdapterError;
use crate::utils::suggest::suggest;
use jsonschema::JSONSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

static BUILTIN_CATALOG: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/operation_catalog.json"
));

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalog {
    #[serde(default)]
    param_sets: BTreeMap<String, Vec<RawParam>>,
    operations: Vec<RawOperation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParam {
    name: String,
    #[serde(default)]
    kind: ParamKind,
    #[serde(default, rename = "type")]
    value_type: ValueType,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    wire: Option<String>,
    #[serde(default, rename = "in")]
    placement: Option<Placement>,
    #[serde(default)]
    list_encoding: ListEncoding,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOperation {
    name: String,
    #[serde(default)]
    description: String,
    backend: String,
    method: HttpMethod,
    path: String,
    #[serde(default)]
    body: Option<BodyShape>,
    #[serde(default)]
    response: ResponseKind,
    #[serde(default)]
    extension: bool,
    #[serde(default, rename = "use")]
    param_sets: Vec<String>,
    #[serde(default)]
    params: Vec<RawParam>,
}

impl RawParam {
    fn resolve(self, body: BodyShape) -> ParameterSpec {
        let placement = self.placement.unwrap_or(if body.carries_params() {
            Placement::Body
        } else {
            Placement::Query
        });
        ParameterSpec {
            name: self.name,
            kind: self.kind,
            value_type: self.value_type,
            placement,
            required: self.required,
            default: self.default,
            wire_name: self.wire,
            list_encoding: self.list_encoding,
            description: self.description,
        }
    }
}

impl RawOperation {
    fn resolve(
        self,
        param_sets: &BTreeMap<String, Vec<RawParam>>,
    ) -> Result<OperationDescriptor, AdapterError> {
        let body = self.body.unwrap_or(match self.method {
            HttpMethod::Get => BodyShape::None,
            HttpMethod::Post => BodyShape::Json,
        });

        let mut raw_params = Vec::new();
        for set_name in &self.param_sets {
            let Some(set) = param_sets.get(set_name) else {
                return Err(AdapterError::configuration(format!(
                    "{}: unknown param set '{}'",
                    self.name, set_name
                )));
            };
            raw_params.extend(set.iter().cloned());
        }
        raw_params.extend(self.params);

        Ok(OperationDescriptor {
            name: self.name,
            description: self.description,
            backend_id: self.backend,
            http_method: self.method,
            path: self.path,
            body,
            parameter_specs: raw_params.into_iter().map(|p| p.resolve(body)).collect(),
            response_kind: self.response,
            extension: self.extension,
        })
    }
}

struct CatalogEntry {
    descriptor: OperationDescriptor,
    schema: Value,
    validator: JSONSchema,
}

/// Immutable table of every operation the adapter can dispatch. Built once at
/// startup; lookups and validation are read-only and safe to share.
pub struct OperationCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for OperationCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCatalog")
            .field("operations", &self.entries.len())
            .finish()
    }
}

impl OperationCatalog {
    /// The catalog embedded in the binary.
    pub fn builtin() -> Result<Self, AdapterError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(raw: &str) -> Result<Self, AdapterError> {
        let parsed: RawCatalog = serde_json::from_str(raw).map_err(|err| {
            AdapterError::configuration(format!("operation catalog is not valid: {}", err))
        })?;
        let mut descriptors = Vec::with_capacity(parsed.operations.len());
        for op in parsed.operations {
            descriptors.push(op.resolve(&parsed.param_sets)?);
        }
        Self::from_descriptors(descriptors)
    }

    pub fn from_descriptors(descriptors: Vec<OperationDescriptor>) -> Result<Self, AdapterError> {
        let mut entries = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::new();
        for descriptor in descriptors {
            descriptor.check().map_err(AdapterError::configuration)?;
            if index.contains_key(&descriptor.name) {
                return Err(AdapterError::configuration(format!(
                    "duplicate operation name '{}'",
                    descriptor.name
                )));
            }
            let schema = schema::input_schema(&descriptor);
            let validator = JSONSchema::compile(&schema).map_err(|err| {
                AdapterError::configuration(format!(
                    "{}: input schema does not compile: {}",
                    descriptor.name, err
                ))
            })?;
            index.insert(descriptor.name.clone(), entries.len());
            entries.push(CatalogEntry {
                descriptor,
                schema,
                validator,
            });
        }
        Ok(Self { entries, index })
    }

    pub fn get(&self, name: &str) -> Option<&OperationDescriptor> {
        self.index.get(name).map(|&idx| &self.entries[idx].descriptor)
    }

    pub fn resolve(&self, name: &str) -> Result<&OperationDescriptor, AdapterError> {
        self.get(name).ok_or_else(|| AdapterError::UnknownOperation {
            name: name.to_string(),
            suggestions: self.suggest(name),
        })
    }

    pub fn suggest(&self, name: &str) -> Vec<String> {
        suggest(name, &self.names(), SUGGESTION_LIMIT)
    }

    pub fn input_schema(&self, name: &str) -> Option<&Value> {
        self.index.get(name).map(|&idx| &self.entries[idx].schema)
    }

    /// Validates caller arguments against the operation's derived schema.
    /// Null-valued keys count as absent.
    pub fn validate_args(&self, name: &str, args: &Map<String, Value>) -> Result<(), AdapterError> {
        let entry = match self.index.get(name) {
            Some(&idx) => &self.entries[idx],
            None => return self.resolve(name).map(|_| ()),
        };
        let present: Map<String, Value> = args
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let instance = Value::Object(present);
        if let Err(errors) = entry.validator.validate(&instance) {
            let message = schema::format_schema_errors(name, &instance, errors, &entry.schema);
            return Err(AdapterError::invalid_arguments(name, message));
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|op| op.name.clone()).collect()
    }

    pub fn backend_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.iter().map(|op| op.backend_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
