//! Remote endpoints described by OpenAPI documents.
//!
//! Each registered document becomes an [`ApiSource`]: the operations that carry
//! both a description and an `operationId`, named `<prefix>-<operationId>`.
//! The [`EndpointRegistry`] flattens every source into one namespace and
//! dispatches calls by name.
use std::time::Duration;

use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::function::{FunctionDescriptor, ParameterSchema};

const HTTP_METHODS: [&str; 8] = [
    "get", "post", "put", "delete", "options", "head", "patch", "trace",
];
const SPEC_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Malformed endpoint `{endpoint}`: {reason}")]
    MalformedEndpoint { endpoint: String, reason: String },

    #[error("Function name `{0}` is already registered")]
    DuplicateName(String),
}

/// Where a parameter travels in the HTTP request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Query,
    Body,
    Path,
    Header,
}

impl ParamLocation {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "query" => Some(ParamLocation::Query),
            "body" => Some(ParamLocation::Body),
            "path" => Some(ParamLocation::Path),
            "header" => Some(ParamLocation::Header),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointParameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: Value,
}

/// One remote operation, immutable once registered
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDescriptor {
    pub name: String,
    pub description: String,
    pub method: Method,
    pub path: String,
    pub parameters: Vec<EndpointParameter>,
}

impl EndpointDescriptor {
    pub fn parameter(&self, name: &str) -> Option<&EndpointParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// The model-facing view; transmission locations are not exposed
    pub fn to_function_descriptor(&self) -> FunctionDescriptor {
        let properties = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.schema.clone()))
            .collect();
        let required = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.clone())
            .collect();
        FunctionDescriptor::new(
            &self.name,
            &self.description,
            ParameterSchema::new(properties, required),
        )
    }
}

/// Normalized result of a remote call. Transport failures, HTTP errors and
/// undecodable bodies all land in `error` with `data` left empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status_code: u16,
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
}

impl ApiResponse {
    pub fn success(status_code: u16, data: Option<Value>) -> Self {
        Self {
            status_code,
            data,
            error: None,
            response_body: None,
        }
    }

    pub fn failure<S: Into<String>>(status_code: u16, error: S) -> Self {
        Self {
            status_code,
            data: None,
            error: Some(error.into()),
            response_body: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The endpoints parsed from one document
#[derive(Debug, Clone)]
pub struct ApiSource {
    pub prefix: String,
    pub base_url: String,
    endpoints: Vec<EndpointDescriptor>,
    error: Option<String>,
}

impl ApiSource {
    /// A source whose document could not be loaded. It contributes nothing to the catalog.
    pub fn failed(prefix: &str, base_url: &str, error: String) -> Self {
        Self {
            prefix: prefix.to_string(),
            base_url: base_url.to_string(),
            endpoints: Vec::new(),
            error: Some(error),
        }
    }

    /// Build the source from a parsed document.
    ///
    /// `allowed` holds bare operation ids; when non-empty, only those operations
    /// are kept. Operations that lack a description or id are skipped.
    pub fn from_spec(
        prefix: &str,
        spec: &Value,
        base_url: &str,
        allowed: &[String],
    ) -> Result<Self, RegistryError> {
        let Some(paths) = spec.get("paths").and_then(Value::as_object) else {
            return Ok(Self::failed(
                prefix,
                base_url,
                "Document has no `paths` object".to_string(),
            ));
        };

        let allowed: Vec<String> = allowed.iter().map(|id| format!("{}-{}", prefix, id)).collect();
        let mut endpoints = Vec::new();

        for (path, item) in paths {
            let Some(item) = item.as_object() else {
                continue;
            };
            for (method, operation) in item {
                if !HTTP_METHODS.contains(&method.as_str()) {
                    continue;
                }
                let description = operation.get("description").and_then(Value::as_str);
                let operation_id = operation.get("operationId").and_then(Value::as_str);
                let (Some(description), Some(operation_id)) = (description, operation_id) else {
                    continue;
                };

                let name = format!("{}-{}", prefix, operation_id);
                if !allowed.is_empty() && !allowed.contains(&name) {
                    debug!(endpoint = %name, "Skipping endpoint outside the allow-list");
                    continue;
                }

                let method = Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|e| {
                    RegistryError::MalformedEndpoint {
                        endpoint: name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let parameters = parse_parameters(&name, operation)?;
                endpoints.push(EndpointDescriptor {
                    name,
                    description: description.to_string(),
                    method,
                    path: path.clone(),
                    parameters,
                });
            }
        }

        Ok(Self {
            prefix: prefix.to_string(),
            base_url: base_url.to_string(),
            endpoints,
            error: None,
        })
    }

    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    async fn call(
        &self,
        client: &Client,
        endpoint: &EndpointDescriptor,
        arguments: &Map<String, Value>,
    ) -> ApiResponse {
        let mut path = endpoint.path.clone();
        let mut query: Vec<(String, String)> = Vec::new();
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut body = Map::new();

        for (name, value) in arguments {
            let Some(parameter) = endpoint.parameter(name) else {
                return ApiResponse::failure(
                    400,
                    format!("Unknown parameter `{}` for {}", name, endpoint.name),
                );
            };
            match parameter.location {
                ParamLocation::Query => match value {
                    Value::Array(items) => {
                        query.extend(items.iter().map(|item| (name.clone(), plain(item))))
                    }
                    _ => query.push((name.clone(), plain(value))),
                },
                ParamLocation::Body => {
                    body.insert(name.clone(), value.clone());
                }
                ParamLocation::Path => {
                    let segment = plain(value);
                    path = path.replace(
                        &format!("{{{}}}", name),
                        urlencoding::encode(&segment).as_ref(),
                    );
                }
                ParamLocation::Header => headers.push((name.clone(), plain(value))),
            }
        }

        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        debug!(endpoint = %endpoint.name, method = %endpoint.method, %url, "Dispatching remote call");

        let mut request = client.request(endpoint.method.clone(), &url).query(&query);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if !body.is_empty() {
            request = request.json(&Value::Object(body));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return ApiResponse::failure(500, e.to_string()),
        };

        let status_code = response.status().as_u16();
        if !response.status().is_success() {
            let mut failure =
                ApiResponse::failure(status_code, format!("API returned HTTP error: {}", status_code));
            failure.response_body = response.text().await.ok();
            return failure;
        }

        match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => ApiResponse::success(status_code, None),
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(data) => ApiResponse::success(status_code, Some(data)),
                Err(e) => ApiResponse::failure(status_code, format!("Error parsing JSON: {}", e)),
            },
            Err(e) => ApiResponse::failure(status_code, e.to_string()),
        }
    }
}

fn parse_parameters(endpoint: &str, operation: &Value) -> Result<Vec<EndpointParameter>, RegistryError> {
    let malformed = |reason: String| RegistryError::MalformedEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let Some(parameters) = operation.get("parameters") else {
        return Ok(Vec::new());
    };
    let parameters = parameters
        .as_array()
        .ok_or_else(|| malformed("`parameters` is not a list".to_string()))?;

    let mut parsed = Vec::with_capacity(parameters.len());
    for parameter in parameters {
        let name = parameter
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("parameter without a name".to_string()))?;
        let location = parameter
            .get("in")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(format!("parameter `{}` has no `in` location", name)))?;
        let location = ParamLocation::parse(location).ok_or_else(|| {
            malformed(format!(
                "parameter `{}` has unsupported location `{}`",
                name, location
            ))
        })?;
        if parsed.iter().any(|p: &EndpointParameter| p.name == name) {
            return Err(malformed(format!("parameter `{}` is declared twice", name)));
        }

        // Swagger 2 keeps the type inline for non-body parameters
        let mut schema = match parameter.get("schema") {
            Some(schema) => schema.clone(),
            None => {
                let mut inline = Map::new();
                for key in ["type", "items", "enum", "format"] {
                    if let Some(value) = parameter.get(key) {
                        inline.insert(key.to_string(), value.clone());
                    }
                }
                Value::Object(inline)
            }
        };
        if let (Some(schema), Some(description)) =
            (schema.as_object_mut(), parameter.get("description"))
        {
            schema
                .entry("description")
                .or_insert_with(|| description.clone());
        }

        parsed.push(EndpointParameter {
            name: name.to_string(),
            location,
            required: parameter
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            schema,
        });
    }
    Ok(parsed)
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Every registered API source, searched in registration order
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    client: Client,
    sources: Vec<ApiSource>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            sources: Vec::new(),
        }
    }

    /// Fetch the document at `spec_url` and register its endpoints.
    ///
    /// A document that cannot be fetched or decoded is recorded as a failed
    /// source with no endpoints. Only malformed endpoints and name collisions
    /// are returned as errors.
    pub async fn register(
        &mut self,
        prefix: &str,
        spec_url: &str,
        base_url: &str,
        allowed: &[String],
    ) -> Result<(), RegistryError> {
        match self.fetch_spec(spec_url).await {
            Ok(spec) => self.register_spec(prefix, &spec, base_url, allowed),
            Err(e) => {
                warn!(prefix, spec_url, error = %e, "Failed to load API document");
                self.sources
                    .push(ApiSource::failed(prefix, base_url, e.to_string()));
                Ok(())
            }
        }
    }

    async fn fetch_spec(&self, spec_url: &str) -> reqwest::Result<Value> {
        self.client
            .get(spec_url)
            .timeout(SPEC_FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Register endpoints from an already parsed document
    pub fn register_spec(
        &mut self,
        prefix: &str,
        spec: &Value,
        base_url: &str,
        allowed: &[String],
    ) -> Result<(), RegistryError> {
        let source = ApiSource::from_spec(prefix, spec, base_url, allowed)?;
        for endpoint in source.endpoints() {
            if self.endpoint(&endpoint.name).is_some() {
                return Err(RegistryError::DuplicateName(endpoint.name.clone()));
            }
        }
        match source.error() {
            Some(error) => warn!(prefix, error, "API document registered without endpoints"),
            None => info!(prefix, endpoints = source.endpoints().len(), "Registered API"),
        }
        self.sources.push(source);
        Ok(())
    }

    pub fn sources(&self) -> &[ApiSource] {
        &self.sources
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointDescriptor> {
        self.find(name).map(|(_, endpoint)| endpoint)
    }

    fn find(&self, name: &str) -> Option<(&ApiSource, &EndpointDescriptor)> {
        self.sources.iter().find_map(|source| {
            source
                .endpoints
                .iter()
                .find(|endpoint| endpoint.name == name)
                .map(|endpoint| (source, endpoint))
        })
    }

    pub fn function_names(&self) -> Vec<String> {
        self.sources
            .iter()
            .flat_map(|s| s.endpoints.iter().map(|e| e.name.clone()))
            .collect()
    }

    pub fn function_schemas(&self) -> Vec<FunctionDescriptor> {
        self.sources
            .iter()
            .flat_map(|s| s.endpoints.iter().map(EndpointDescriptor::to_function_descriptor))
            .collect()
    }

    /// Call the endpoint registered as `name`. Never fails; problems are
    /// reported inside the returned [`ApiResponse`].
    pub async fn dispatch(&self, name: &str, arguments: &Map<String, Value>) -> ApiResponse {
        match self.find(name) {
            Some((source, endpoint)) => source.call(&self.client, endpoint, arguments).await,
            None => ApiResponse::failure(400, format!("Invalid function name: {}", name)),
        }
    }
}
