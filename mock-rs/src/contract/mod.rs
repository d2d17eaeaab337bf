//! Contract model: Resources -> Actions -> Pairs
//!
//! A parser produces plain [`ContractData`]; [`Contract::from_data`] validates it
//! and builds the immutable tree the mock engine routes against. A reload always
//! builds a brand new `Contract`, it is never mutated in place.

mod parser;

pub use parser::{select_parser, ContractParser, FileParser, MarkdownParser, MARKDOWN_EXTENSION};

use crate::errors::{MockError, Result};
use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Parsed contract, as produced by a [`ContractParser`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractData {
    pub resources: Vec<ResourceData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceData {
    pub pattern: String,
    pub actions: Vec<ActionData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionData {
    pub method: String,
    pub pairs: Vec<PairData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairData {
    pub name: String,
    pub response: ExampleResponse,
}

/// Recorded response of a single example case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleResponse {
    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: String,
}

fn default_status() -> u16 {
    200
}

impl Default for ExampleResponse {
    fn default() -> Self {
        Self {
            status: default_status(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }
}

impl ContractData {
    /// Add one example, keeping first-seen order of resources and actions
    pub fn add_example(&mut self, pattern: &str, method: &str, case: &str, response: ExampleResponse) {
        let method = method.trim().to_uppercase();

        let resource = match self.resources.iter().position(|r| r.pattern == pattern) {
            Some(idx) => &mut self.resources[idx],
            None => {
                self.resources.push(ResourceData {
                    pattern: pattern.to_string(),
                    actions: Vec::new(),
                });
                let last = self.resources.len() - 1;
                &mut self.resources[last]
            }
        };

        let action = match resource.actions.iter().position(|a| a.method == method) {
            Some(idx) => &mut resource.actions[idx],
            None => {
                resource.actions.push(ActionData {
                    method,
                    pairs: Vec::new(),
                });
                let last = resource.actions.len() - 1;
                &mut resource.actions[last]
            }
        };

        action.pairs.push(PairData {
            name: case.to_string(),
            response,
        });
    }

    /// Total number of example cases
    pub fn case_count(&self) -> usize {
        self.resources
            .iter()
            .flat_map(|r| r.actions.iter())
            .map(|a| a.pairs.len())
            .sum()
    }
}

/// Immutable contract tree
#[derive(Debug)]
pub struct Contract {
    resources: Vec<Resource>,
}

/// A resource, identified by its URL pattern
#[derive(Debug)]
pub struct Resource {
    pattern: String,
    matcher: Regex,
    actions: Vec<Action>,
}

/// An action on a resource, keyed by HTTP method
#[derive(Debug)]
pub struct Action {
    method: Method,
    pairs: Vec<Arc<Pair>>,
}

/// A named example request/response
#[derive(Debug)]
pub struct Pair {
    name: String,
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: String,
}

impl Contract {
    /// Validate parsed data and build the contract tree
    ///
    /// # Errors
    ///
    /// Returns `MockError::Contract` on duplicate patterns, methods or case
    /// names, on unparseable methods, status codes or headers, and
    /// `MockError::RegexError` if a pattern cannot be compiled.
    pub fn from_data(data: ContractData) -> Result<Self> {
        let mut patterns = HashSet::new();
        let mut cases = HashSet::new();
        let mut resources = Vec::with_capacity(data.resources.len());

        for resource in data.resources {
            if !patterns.insert(resource.pattern.clone()) {
                return Err(MockError::Contract(format!(
                    "Duplicate resource pattern '{}'",
                    resource.pattern
                )));
            }

            let matcher = compile_pattern(&resource.pattern)?;
            let mut methods = HashSet::new();
            let mut actions = Vec::with_capacity(resource.actions.len());

            for action in resource.actions {
                let method = Method::from_bytes(action.method.trim().to_uppercase().as_bytes())
                    .map_err(|_| {
                        MockError::Contract(format!(
                            "Invalid method '{}' on resource '{}'",
                            action.method, resource.pattern
                        ))
                    })?;

                if !methods.insert(method.clone()) {
                    return Err(MockError::Contract(format!(
                        "Duplicate method '{}' on resource '{}'",
                        method, resource.pattern
                    )));
                }

                let mut pairs = Vec::with_capacity(action.pairs.len());
                for pair in action.pairs {
                    if !cases.insert(pair.name.clone()) {
                        return Err(MockError::Contract(format!(
                            "Duplicate case name '{}'",
                            pair.name
                        )));
                    }
                    pairs.push(Arc::new(Pair::from_data(pair)?));
                }

                actions.push(Action { method, pairs });
            }

            resources.push(Resource {
                pattern: resource.pattern,
                matcher,
                actions,
            });
        }

        Ok(Self { resources })
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Linear scan for the pair with the given case name
    pub fn find_case(&self, case: &str) -> Option<(&Resource, &Action, &Arc<Pair>)> {
        for resource in &self.resources {
            for action in &resource.actions {
                for pair in &action.pairs {
                    if pair.name == case {
                        return Some((resource, action, pair));
                    }
                }
            }
        }
        None
    }

    /// First resource, in contract order, whose pattern matches `path`
    pub fn match_path(&self, path: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.matches(path))
    }
}

impl Resource {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

impl Action {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pairs(&self) -> &[Arc<Pair>] {
        &self.pairs
    }
}

impl Pair {
    fn from_data(data: PairData) -> Result<Self> {
        let status = StatusCode::from_u16(data.response.status).map_err(|_| {
            MockError::Contract(format!(
                "Invalid status {} for case '{}'",
                data.response.status, data.name
            ))
        })?;

        let mut headers = Vec::with_capacity(data.response.headers.len());
        for (name, value) in &data.response.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                MockError::Contract(format!("Invalid header name '{}' for case '{}'", name, data.name))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                MockError::Contract(format!("Invalid header value for '{}' in case '{}'", name, data.name))
            })?;
            headers.push((header_name, header_value));
        }

        Ok(Self {
            name: data.name,
            status,
            headers,
            body: data.response.body,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Build the HTTP response recorded for this case
    pub fn generate_response(&self) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            headers.append(name.clone(), value.clone());
        }
        response
    }
}

/// Compile a resource pattern into an anchored regex
///
/// Supports literal segments, `:name` and `{name}` parameters (one segment
/// each) and a trailing `*` that matches the rest of the path.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    if !pattern.starts_with('/') {
        return Err(MockError::Contract(format!(
            "Resource pattern must start with '/': '{}'",
            pattern
        )));
    }

    let segments: Vec<&str> = pattern[1..].split('/').collect();
    let mut expr = String::from("^");

    for (idx, segment) in segments.iter().enumerate() {
        let last = idx == segments.len() - 1;
        if *segment == "*" && last {
            expr.push_str("/.*");
            continue;
        }

        expr.push('/');
        let is_param = segment.starts_with(':')
            || (segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2);
        if is_param {
            expr.push_str("[^/]+");
        } else {
            expr.push_str(&regex::escape(segment));
        }
    }

    expr.push('$');
    Ok(Regex::new(&expr)?)
}
