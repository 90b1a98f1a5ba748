use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The parameter block of a function descriptor, a JSON-schema object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn new(properties: Map<String, Value>, required: Vec<String>) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties,
            required,
        }
    }
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::new(Map::new(), Vec::new())
    }
}

/// A function the model can call, either a local method or a remote endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDescriptor {
    /// The name of the function
    pub name: String,
    /// A description of what the function does
    pub description: String,
    /// Parameters that the function accepts
    pub parameters: ParameterSchema,
}

impl FunctionDescriptor {
    pub fn new<N, D>(name: N, description: D, parameters: ParameterSchema) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        FunctionDescriptor {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A function call requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    /// The name of the function to execute
    pub name: String,
    /// The decoded arguments
    pub arguments: Map<String, Value>,
}

impl FunctionCall {
    pub fn new<S: Into<String>>(name: S, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}
