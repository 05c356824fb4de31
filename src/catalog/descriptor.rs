use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    #[default]
    Scalar,
    List,
    Map,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Query,
    Body,
}

/// JSON type of a scalar value, or of each element of a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Integer,
    Number,
    String,
    Boolean,
    Object,
    #[default]
    Any,
}

impl ValueType {
    pub fn schema_type(self) -> Option<&'static str> {
        match self {
            ValueType::Integer => Some("integer"),
            ValueType::Number => Some("number"),
            ValueType::String => Some("string"),
            ValueType::Boolean => Some("boolean"),
            ValueType::Object => Some("object"),
            ValueType::Any => None,
        }
    }
}

/// How a list-kind query parameter is spelled on the wire. Upstream endpoints
/// disagree, so this is declared per parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListEncoding {
    /// `ids=1&ids=2`
    #[default]
    Repeat,
    /// `ids=1,2`
    Comma,
}

/// Request body shape. `EmptyJson` and `None` differ on the wire: the former
/// sends `{}` with a JSON content type, the latter sends no body at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyShape {
    None,
    Json,
    EmptyJson,
    Form,
}

impl BodyShape {
    pub fn carries_params(self) -> bool {
        matches!(self, BodyShape::Json | BodyShape::Form)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BodyShape::None => "none",
            BodyShape::Json => "json",
            BodyShape::EmptyJson => "empty_json",
            BodyShape::Form => "form",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    #[default]
    Json,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub value_type: ValueType,
    pub placement: Placement,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wire_name: Option<String>,
    pub list_encoding: ListEncoding,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind, placement: Placement) -> Self {
        Self {
            name: name.into(),
            kind,
            value_type: ValueType::Any,
            placement,
            required: false,
            default: None,
            wire_name: None,
            list_encoding: ListEncoding::Repeat,
            description: None,
        }
    }

    pub fn scalar(name: impl Into<String>, placement: Placement) -> Self {
        Self::new(name, ParamKind::Scalar, placement)
    }

    pub fn list(name: impl Into<String>, placement: Placement) -> Self {
        Self::new(name, ParamKind::List, placement)
    }

    pub fn typed(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn wire(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = Some(wire_name.into());
        self
    }

    pub fn encoded(mut self, encoding: ListEncoding) -> Self {
        self.list_encoding = encoding;
        self
    }

    /// Key the upstream expects; falls back to the logical name.
    pub fn wire_name(&self) -> &str {
        self.wire_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub description: String,
    pub backend_id: String,
    pub http_method: HttpMethod,
    pub path: String,
    pub body: BodyShape,
    pub parameter_specs: Vec<ParameterSpec>,
    pub response_kind: ResponseKind,
    pub extension: bool,
}

impl OperationDescriptor {
    pub fn new(
        name: impl Into<String>,
        backend_id: impl Into<String>,
        http_method: HttpMethod,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            backend_id: backend_id.into(),
            http_method,
            path: path.into(),
            body: match http_method {
                HttpMethod::Get => BodyShape::None,
                HttpMethod::Post => BodyShape::Json,
            },
            parameter_specs: Vec::new(),
            response_kind: ResponseKind::Json,
            extension: false,
        }
    }

    pub fn body(mut self, body: BodyShape) -> Self {
        self.body = body;
        self
    }

    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.parameter_specs.push(spec);
        self
    }

    pub fn with_extension(mut self) -> Self {
        self.extension = true;
        self
    }

    /// Upstream module segment, e.g. `Application` for
    /// `/api/Application/GetAllSites` or `Meter` for `/Meter/GetMeters`.
    pub fn module(&self) -> &str {
        let mut segments = self.path.trim_matches('/').rsplit('/');
        segments.next();
        segments.next().unwrap_or("")
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameter_specs.iter().find(|spec| spec.name == name)
    }

    /// Checks the shape rules a descriptor must satisfy before it is served.
    pub fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("operation name must not be empty".to_string());
        }
        if !self.path.starts_with('/') {
            return Err(format!("{}: path must start with '/'", self.name));
        }
        if self.http_method == HttpMethod::Get && self.body != BodyShape::None {
            return Err(format!("{}: GET operations cannot declare a body", self.name));
        }
        if self.extension && self.body != BodyShape::Json {
            return Err(format!(
                "{}: extension maps require a json body",
                self.name
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for spec in &self.parameter_specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(format!("{}: duplicate parameter '{}'", self.name, spec.name));
            }
            if spec.placement == Placement::Body && !self.body.carries_params() {
                return Err(format!(
                    "{}: parameter '{}' targets the body but the body shape is {}",
                    self.name,
                    spec.name,
                    self.body.as_str()
                ));
            }
            if spec.required && spec.default.is_some() {
                return Err(format!(
                    "{}: required parameter '{}' cannot declare a default",
                    self.name, spec.name
                ));
            }
        }
        Ok(())
    }
}
