//! Test definitions.
//!
//! A [`TestDefinition`] is the raw, deserialised form of a test as written on
//! disk. [`WatchdogTest::from_definition`] checks it once (target URL, HTTP
//! method, validation tags, schema-typed values) and produces the immutable
//! [`WatchdogTest`] the runner works with. Nothing is re-checked at request
//! time.

pub mod loader;

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::validation::{UnknownValidationType, ValidationError, ValidationType};

pub use loader::{DEFAULT_PATTERN, discover, load_file};

/// Errors raised while turning definitions into runnable tests
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("test {test:?}: invalid target {target:?}: {source}")]
    InvalidTarget {
        test: String,
        target: String,
        #[source]
        source: url::ParseError,
    },

    #[error("test {test:?}: target {target:?} must use http or https")]
    UnsupportedScheme { test: String, target: String },

    #[error("test {test:?}: unsupported HTTP method {method:?}")]
    UnsupportedMethod { test: String, method: String },

    #[error("test {test:?}: {source}")]
    UnknownValidationType {
        test: String,
        #[source]
        source: UnknownValidationType,
    },

    #[error("test {test:?}: payload {source}")]
    InvalidPayload {
        test: String,
        #[source]
        source: ValidationError,
    },

    #[error("test {test:?}: expected value for {selector:?} {source}")]
    InvalidExpectation {
        test: String,
        selector: String,
        #[source]
        source: ValidationError,
    },

    #[error("duplicate test name {0:?}")]
    DuplicateName(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Severity of an expectation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectationLevel {
    /// Decides whether the test passes
    #[default]
    Critical,
    /// Recorded in the report, never fails the test
    #[serde(alias = "non-critical", alias = "noncritical")]
    Warning,
    Info,
}

impl ExpectationLevel {
    pub fn is_critical(self) -> bool {
        self == ExpectationLevel::Critical
    }
}

/// A checked expectation: where to look, what to find, how to compare
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expectation {
    pub selector: String,
    pub value: Value,
    pub validation_type: ValidationType,
    pub level: ExpectationLevel,
}

/// Request payload, resolved once when the test is built
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Raw(Value),
    /// Document already checked against `schema`, sent exactly as written
    Validated { schema: ValidationType, document: Value },
}

impl Payload {
    pub fn document(&self) -> &Value {
        match self {
            Payload::Raw(document) | Payload::Validated { document, .. } => document,
        }
    }

    /// Request body, if any. A JSON `null` payload sends no body.
    pub fn body(&self) -> Option<&Value> {
        Some(self.document()).filter(|document| !document.is_null())
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.document().serialize(serializer)
    }
}

/// Immutable, runnable test
#[derive(Debug, Clone)]
pub struct WatchdogTest {
    name: String,
    target: String,
    method: Method,
    payload: Option<Payload>,
    expectations: Vec<Arc<Expectation>>,
    email_to: Vec<String>,
}

impl WatchdogTest {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn expectations(&self) -> &[Arc<Expectation>] {
        &self.expectations
    }

    pub fn email_to(&self) -> &[String] {
        &self.email_to
    }

    /// Check a raw definition and build the test from it
    pub fn from_definition(definition: TestDefinition) -> Result<Self, DefinitionError> {
        let TestDefinition {
            name,
            target,
            method,
            payload,
            validate_payload,
            expectations,
            email_to,
        } = definition;

        let url = Url::parse(&target).map_err(|source| DefinitionError::InvalidTarget {
            test: name.clone(),
            target: target.clone(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DefinitionError::UnsupportedScheme { test: name, target });
        }

        let method = parse_method(method.as_deref())
            .ok_or_else(|| DefinitionError::UnsupportedMethod {
                test: name.clone(),
                method: method.clone().unwrap_or_default(),
            })?;

        let payload = match (payload, validate_payload) {
            (None, _) => None,
            (Some(document), None) => Some(Payload::Raw(document)),
            (Some(document), Some(tag)) => {
                let schema = parse_validation_type(&name, &tag)?;
                schema
                    .check_payload(&document)
                    .map_err(|source| DefinitionError::InvalidPayload { test: name.clone(), source })?;
                Some(Payload::Validated { schema, document })
            }
        };

        let expectations = expectations
            .into_iter()
            .map(|expectation| build_expectation(&name, expectation).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { name, target, method, payload, expectations, email_to: email_to.into_vec() })
    }

    /// Build a test from a JSON definition document
    pub fn from_json(document: Value) -> Result<Self, DefinitionError> {
        let definition: TestDefinition =
            serde_json::from_value(document).map_err(|source| DefinitionError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        Self::from_definition(definition)
    }
}

impl TryFrom<TestDefinition> for WatchdogTest {
    type Error = DefinitionError;

    fn try_from(definition: TestDefinition) -> Result<Self, Self::Error> {
        Self::from_definition(definition)
    }
}

fn parse_method(method: Option<&str>) -> Option<Method> {
    match method.map(|m| m.trim().to_ascii_uppercase()).as_deref() {
        None | Some("GET") => Some(Method::GET),
        Some("POST") => Some(Method::POST),
        Some("PUT") => Some(Method::PUT),
        Some("PATCH") => Some(Method::PATCH),
        Some("DELETE") => Some(Method::DELETE),
        Some("HEAD") => Some(Method::HEAD),
        Some("OPTIONS") => Some(Method::OPTIONS),
        Some(_) => None,
    }
}

fn parse_validation_type(test: &str, tag: &str) -> Result<ValidationType, DefinitionError> {
    tag.parse()
        .map_err(|source| DefinitionError::UnknownValidationType { test: test.to_string(), source })
}

fn build_expectation(
    test: &str,
    definition: ExpectationDefinition,
) -> Result<Expectation, DefinitionError> {
    let validation_type = parse_validation_type(test, &definition.validation_type)?;

    // Schema-typed expectations are compared in canonical form
    let value = if validation_type.is_schema() {
        validation_type.validate(&definition.value).map_err(|source| {
            DefinitionError::InvalidExpectation {
                test: test.to_string(),
                selector: definition.selector.clone(),
                source,
            }
        })?
    } else {
        definition.value
    };

    Ok(Expectation {
        selector: definition.selector,
        value,
        validation_type,
        level: definition.level,
    })
}

/// Raw test definition, as stored in `*.watchdog.json` files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub validate_payload: Option<String>,
    #[serde(default)]
    pub expectations: Vec<ExpectationDefinition>,
    #[serde(default, alias = "email")]
    pub email_to: Recipients,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationDefinition {
    pub selector: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_validation_type", alias = "validate")]
    pub validation_type: String,
    #[serde(default)]
    pub level: ExpectationLevel,
}

fn default_validation_type() -> String {
    ValidationType::Object.as_str().to_string()
}

/// One address or a list of addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Default for Recipients {
    fn default() -> Self {
        Recipients::Many(Vec::new())
    }
}

impl Recipients {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Recipients::One(address) => vec![address],
            Recipients::Many(addresses) => addresses,
        }
    }
}
