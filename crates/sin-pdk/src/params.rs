//! Cell parameter values and explicit parameter schemas

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{PdkError, Result};

/// A single parameter value as supplied by a request file or the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Parse one scalar from form/CLI text: integers, decimals, booleans, otherwise text.
    pub fn parse_scalar(text: &str) -> Self {
        let text = text.trim();
        if let Ok(i) = text.parse::<i64>() {
            return ParamValue::Int(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return ParamValue::Float(f);
        }
        match text.to_lowercase().as_str() {
            "true" | "yes" | "on" => ParamValue::Bool(true),
            "false" | "no" | "off" => ParamValue::Bool(false),
            _ => ParamValue::Str(text.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "string",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
                write!(f, "{x:.1}")
            }
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// Ordered name -> value map
pub type ParamSet = IndexMap<String, ParamValue>;

/// Parsed `name=value` or `name=v1,v2,...` assignments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignments {
    pub fixed: ParamSet,
    pub swept: IndexMap<String, Vec<ParamValue>>,
}

impl Assignments {
    /// Split raw text entries into fixed values and comma-separated sweeps.
    pub fn parse<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut out = Self::default();
        for (name, text) in entries {
            let name = name.trim().to_string();
            if text.contains(',') {
                let values = text
                    .split(',')
                    .filter(|v| !v.trim().is_empty())
                    .map(ParamValue::parse_scalar)
                    .collect();
                out.swept.insert(name, values);
            } else {
                out.fixed.insert(name, ParamValue::parse_scalar(text));
            }
        }
        out
    }

    /// Parse `name=value` strings as given on the command line.
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        let mut split = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let pair = pair.as_ref();
            let (name, value) = pair.split_once('=').ok_or_else(|| {
                PdkError::Config(format!("expected NAME=VALUE, got `{pair}`"))
            })?;
            split.push((name, value));
        }
        Ok(Self::parse(split))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Float,
    Int,
    Bool,
    Str,
}

impl ParamKind {
    fn name(&self) -> &'static str {
        match self {
            ParamKind::Float => "a number",
            ParamKind::Int => "an integer",
            ParamKind::Bool => "a boolean",
            ParamKind::Str => "a string",
        }
    }
}

/// Declared configuration of one cell parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamValue,
    /// Inclusive lower bound for numeric parameters
    pub min: Option<f64>,
    pub doc: &'static str,
}

impl ParamSpec {
    pub fn float(name: &'static str, default: f64, doc: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Float,
            default: ParamValue::Float(default),
            min: None,
            doc,
        }
    }

    pub fn int(name: &'static str, default: i64, doc: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Int,
            default: ParamValue::Int(default),
            min: None,
            doc,
        }
    }

    pub fn string(name: &'static str, default: &str, doc: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Str,
            default: ParamValue::Str(default.to_string()),
            min: None,
            doc,
        }
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Coerce a value to this parameter's kind and check its bound.
    fn check(&self, value: &ParamValue) -> Result<ParamValue> {
        let mismatch = || PdkError::ParameterType {
            name: self.name.to_string(),
            expected: self.kind.name(),
            got: format!("{} ({})", value, value.kind_name()),
        };
        let coerced = match (self.kind, value) {
            (ParamKind::Float, v) => ParamValue::Float(v.as_f64().ok_or_else(mismatch)?),
            (ParamKind::Int, ParamValue::Int(i)) => ParamValue::Int(*i),
            (ParamKind::Int, ParamValue::Float(f)) if f.fract() == 0.0 => {
                ParamValue::Int(*f as i64)
            }
            (ParamKind::Bool, ParamValue::Bool(b)) => ParamValue::Bool(*b),
            (ParamKind::Str, ParamValue::Str(s)) => ParamValue::Str(s.clone()),
            _ => return Err(mismatch()),
        };
        if let (Some(min), Some(v)) = (self.min, coerced.as_f64()) {
            if v < min {
                return Err(PdkError::ParameterRange {
                    name: self.name.to_string(),
                    value: v,
                    min,
                });
            }
        }
        Ok(coerced)
    }
}

/// A cell's full parameter list.
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    pub cell: &'static str,
    pub params: Vec<ParamSpec>,
}

impl Schema {
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Fail if `name` is not declared.
    pub fn require(&self, name: &str) -> Result<&ParamSpec> {
        self.get(name).ok_or_else(|| PdkError::UnknownParameter {
            cell: self.cell.to_string(),
            name: name.to_string(),
        })
    }

    /// Merge defaults with each layer of overrides (later layers win).
    pub fn resolve<'a>(&self, layers: impl IntoIterator<Item = &'a ParamSet>) -> Result<Resolved> {
        let mut values: ParamSet = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.default.clone()))
            .collect();
        for layer in layers {
            for (name, value) in layer {
                let spec = self.require(name)?;
                values.insert(name.clone(), spec.check(value)?);
            }
        }
        Ok(Resolved {
            cell: self.cell,
            values,
        })
    }
}

/// Schema-checked parameters ready for a cell builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    cell: &'static str,
    values: ParamSet,
}

impl Resolved {
    fn missing(&self, name: &str) -> PdkError {
        PdkError::UnknownParameter {
            cell: self.cell.to_string(),
            name: name.to_string(),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        self.values
            .get(name)
            .and_then(ParamValue::as_f64)
            .ok_or_else(|| self.missing(name))
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.values.get(name) {
            Some(ParamValue::Int(i)) => Ok(*i),
            _ => Err(self.missing(name)),
        }
    }

    pub fn string(&self, name: &str) -> Result<&str> {
        match self.values.get(name) {
            Some(ParamValue::Str(s)) => Ok(s),
            _ => Err(self.missing(name)),
        }
    }

    pub fn values(&self) -> &ParamSet {
        &self.values
    }
}
