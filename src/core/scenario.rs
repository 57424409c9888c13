//! Manual-mode scenarios
//!
//! A scenario declares the resources, a process count and, per process, the
//! `max`, `allocated` and `requested` vectors. It arrives as loosely typed
//! JSON ([`RawScenario`]): numbers may be written as JSON numbers or strings,
//! and vectors as arrays or comma-separated strings such as `"2,1,1"`.
//! [`Scenario::parse`] turns it into a checked [`Scenario`] or rejects it with
//! the path of the first offending field.

use crate::core::banker::BankerInput;
use crate::core::error::{SimError, ValidationError};
use crate::core::types::{ProcessId, Resource};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;

/// A scalar as written by the user
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for RawField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawField::Int(n) => write!(f, "{n}"),
            RawField::Float(x) => write!(f, "{x}"),
            RawField::Text(s) => write!(f, "'{s}'"),
        }
    }
}

/// A per-resource vector as written by the user
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTuple {
    List(Vec<RawField>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawResource {
    pub name: String,
    pub capacity: RawField,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawProcess {
    /// Defaults to `P{n}` by position
    #[serde(default)]
    pub name: Option<String>,
    pub max: RawTuple,
    pub allocated: RawTuple,
    /// Defaults to all zeros
    #[serde(default)]
    pub requested: Option<RawTuple>,
}

/// Unchecked scenario as read from a file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawScenario {
    pub process_count: RawField,
    pub resources: Vec<RawResource>,
    #[serde(default)]
    pub processes: Vec<RawProcess>,
}

/// One declared process; vectors are indexed like [`Scenario::resources`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioProcess {
    pub id: ProcessId,
    pub max: Vec<u32>,
    pub allocated: Vec<u32>,
    pub requested: Vec<u32>,
}

/// A validated scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub resources: Vec<Resource>,
    pub processes: Vec<ScenarioProcess>,
}

type Parsed<T> = std::result::Result<T, ValidationError>;

impl Scenario {
    /// Validate `raw`
    ///
    /// # Errors
    /// Returns the first violation found, naming its field:
    /// * a number that is not a non-negative integer
    /// * fewer than two resources, or an empty or repeated resource name
    /// * a vector whose length differs from the resource count
    /// * `allocated` above `max` for some component
    /// * `requested` above `max - allocated` for some component
    /// * a process list whose length differs from `process_count`
    /// * allocations that sum above a resource's capacity
    pub fn parse(raw: &RawScenario) -> Parsed<Scenario> {
        let process_count = integer("process_count", &raw.process_count)? as usize;

        if raw.resources.len() < 2 {
            return Err(ValidationError::new(
                "resources",
                format!(
                    "at least two resources are required, got {}",
                    raw.resources.len()
                ),
            ));
        }
        let mut names = BTreeSet::new();
        let mut resources = Vec::with_capacity(raw.resources.len());
        for (j, r) in raw.resources.iter().enumerate() {
            let name = r.name.trim();
            if name.is_empty() {
                return Err(ValidationError::new(
                    format!("resources[{j}].name"),
                    "must not be empty",
                ));
            }
            if !names.insert(name) {
                return Err(ValidationError::new(
                    format!("resources[{j}].name"),
                    format!("`{name}` is declared twice"),
                ));
            }
            let capacity = integer(&format!("resources[{j}].capacity"), &r.capacity)?;
            resources.push(Resource::new(name, capacity));
        }

        if raw.processes.len() != process_count {
            return Err(ValidationError::new(
                "processes",
                format!(
                    "process_count is {process_count} but {} processes are declared",
                    raw.processes.len()
                ),
            ));
        }

        let arity = resources.len();
        let mut ids = BTreeSet::new();
        let mut processes = Vec::with_capacity(process_count);
        for (i, p) in raw.processes.iter().enumerate() {
            let id = match p.name.as_deref().map(str::trim) {
                Some("") => {
                    return Err(ValidationError::new(
                        format!("processes[{i}].name"),
                        "must not be empty",
                    ));
                }
                Some(name) => name.to_string(),
                None => format!("P{}", i + 1),
            };
            if !ids.insert(id.clone()) {
                return Err(ValidationError::new(
                    format!("processes[{i}].name"),
                    format!("`{id}` is declared twice"),
                ));
            }

            let max = tuple(&format!("processes[{i}].max"), &p.max, arity)?;
            let allocated = tuple(&format!("processes[{i}].allocated"), &p.allocated, arity)?;
            let requested = match &p.requested {
                Some(raw) => tuple(&format!("processes[{i}].requested"), raw, arity)?,
                None => vec![0; arity],
            };
            if let Some(j) = (0..arity).find(|&j| allocated[j] > max[j]) {
                return Err(ValidationError::new(
                    format!("processes[{i}].allocated[{j}]"),
                    format!(
                        "allocated {} of `{}` exceeds max {}",
                        allocated[j], resources[j].name, max[j]
                    ),
                ));
            }
            if let Some(j) = (0..arity).find(|&j| requested[j] > max[j] - allocated[j]) {
                return Err(ValidationError::new(
                    format!("processes[{i}].requested[{j}]"),
                    format!(
                        "requested {} of `{}` exceeds remaining need {}",
                        requested[j],
                        resources[j].name,
                        max[j] - allocated[j]
                    ),
                ));
            }
            processes.push(ScenarioProcess {
                id,
                max,
                allocated,
                requested,
            });
        }

        for (j, resource) in resources.iter().enumerate() {
            let total: u64 = processes.iter().map(|p| u64::from(p.allocated[j])).sum();
            if total > u64::from(resource.capacity) {
                return Err(ValidationError::new(
                    format!("resources[{j}].capacity"),
                    format!(
                        "`{}` has capacity {} but {total} units are allocated",
                        resource.name, resource.capacity
                    ),
                ));
            }
        }

        Ok(Scenario { resources, processes })
    }

    /// Read and validate a JSON scenario
    ///
    /// # Errors
    /// Returns `SimError::Validation` for malformed JSON or any rule of
    /// [`Scenario::parse`].
    pub fn from_json(json: &str) -> Result<Scenario, SimError> {
        let raw: RawScenario = serde_json::from_str(json)
            .map_err(|e| ValidationError::new("scenario", e.to_string()))?;
        Ok(Scenario::parse(&raw)?)
    }

    /// Free units per resource after the declared allocations
    pub fn available(&self) -> Vec<u32> {
        self.resources
            .iter()
            .enumerate()
            .map(|(j, r)| {
                let held: u32 = self.processes.iter().map(|p| p.allocated[j]).sum();
                r.capacity.saturating_sub(held)
            })
            .collect()
    }

    /// Banker's input for this scenario, processes in declaration order
    pub fn banker_input(&self) -> BankerInput {
        let names = self.resources.iter().map(|r| r.name.clone()).collect();
        self.processes.iter().fold(
            BankerInput::new(names, self.available()),
            |input, p| input.process(p.id.clone(), p.max.clone(), p.allocated.clone()),
        )
    }
}

fn integer(field: &str, raw: &RawField) -> Parsed<u32> {
    let invalid =
        || ValidationError::new(field, format!("must be a non-negative integer, got {raw}"));
    let value = match raw {
        RawField::Int(n) => *n,
        RawField::Float(_) => return Err(invalid()),
        RawField::Text(s) => s.trim().parse::<i64>().map_err(|_| invalid())?,
    };
    if value < 0 {
        return Err(invalid());
    }
    u32::try_from(value).map_err(|_| ValidationError::new(field, format!("{value} is too large")))
}

fn tuple(field: &str, raw: &RawTuple, arity: usize) -> Parsed<Vec<u32>> {
    let fields: Vec<RawField> = match raw {
        RawTuple::List(items) => items.clone(),
        RawTuple::Text(s) if s.trim().is_empty() => Vec::new(),
        RawTuple::Text(s) => s.split(',').map(|v| RawField::Text(v.trim().to_string())).collect(),
    };
    if fields.len() != arity {
        return Err(ValidationError::new(
            field,
            format!("expected {arity} values, one per resource, got {}", fields.len()),
        ));
    }
    fields
        .iter()
        .enumerate()
        .map(|(j, v)| integer(&format!("{field}[{j}]"), v))
        .collect()
}
