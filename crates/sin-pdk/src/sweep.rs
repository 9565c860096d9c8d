//! Parameter sweep specification and combination enumeration

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{PdkError, Result};
use crate::params::{ParamSet, ParamValue};

/// How value lists combine into jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// Cartesian product of every list
    #[default]
    AllCombinations,
    /// Element i of every list forms job i; lists must share one length
    Paired,
}

/// Swept parameter names with their candidate values, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SweepSpec(IndexMap<String, Vec<ParamValue>>);

impl SweepSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, values: impl IntoIterator<Item = ParamValue>) -> Self {
        self.0.insert(name.to_string(), values.into_iter().collect());
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn first_name(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    pub fn values(&self, name: &str) -> Option<&[ParamValue]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ParamValue])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the spec is usable in `mode`.
    pub fn validate(&self, mode: SweepMode) -> Result<()> {
        if self.0.is_empty() {
            return Err(PdkError::Config("sweep has no parameters".into()));
        }
        if let Some((name, _)) = self.0.iter().find(|(_, v)| v.is_empty()) {
            return Err(PdkError::Config(format!("sweep parameter `{name}` has no values")));
        }
        if mode == SweepMode::Paired && !self.0.values().map(Vec::len).all_equal() {
            let lengths = self
                .0
                .iter()
                .map(|(k, v)| format!("{k}={}", v.len()))
                .join(", ");
            return Err(PdkError::Config(format!(
                "paired sweep needs equal-length value lists, got {lengths}"
            )));
        }
        Ok(())
    }

    /// Number of combinations `mode` would produce.
    pub fn count(&self, mode: SweepMode) -> Result<usize> {
        self.validate(mode)?;
        Ok(match mode {
            SweepMode::AllCombinations => self.0.values().map(Vec::len).product(),
            SweepMode::Paired => self.0.values().next().map_or(0, Vec::len),
        })
    }

    /// Enumerate combinations. The last parameter varies fastest in product mode.
    pub fn combinations(&self, mode: SweepMode) -> Result<Vec<Combination>> {
        self.validate(mode)?;
        let index_rows: Vec<Vec<usize>> = match mode {
            SweepMode::AllCombinations => self
                .0
                .values()
                .map(|v| 0..v.len())
                .multi_cartesian_product()
                .collect(),
            SweepMode::Paired => {
                let n = self.count(mode)?;
                (0..n).map(|i| vec![i; self.0.len()]).collect()
            }
        };

        Ok(index_rows
            .into_iter()
            .map(|indices| Combination {
                choices: self
                    .0
                    .iter()
                    .zip(indices)
                    .map(|((name, values), i)| Choice {
                        name: name.clone(),
                        value: values[i].clone(),
                        index: first_index(values, i),
                    })
                    .collect(),
            })
            .collect())
    }
}

/// Position of the first candidate equal to `values[i]`.
///
/// Artifact names are derived from the value, so repeated candidates share one name.
fn first_index(values: &[ParamValue], i: usize) -> usize {
    values.iter().position(|v| *v == values[i]).unwrap_or(i)
}

impl FromIterator<(String, Vec<ParamValue>)> for SweepSpec {
    fn from_iter<I: IntoIterator<Item = (String, Vec<ParamValue>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<IndexMap<String, Vec<ParamValue>>> for SweepSpec {
    fn from(map: IndexMap<String, Vec<ParamValue>>) -> Self {
        Self(map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub name: String,
    pub value: ParamValue,
    /// 0-based position of the value in its candidate list
    pub index: usize,
}

/// One value for every swept parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Combination {
    pub choices: Vec<Choice>,
}

impl Combination {
    /// Stable artifact stem, e.g. `length_2gap_1` (1-based indices).
    pub fn artifact_name(&self) -> String {
        self.choices
            .iter()
            .map(|c| format!("{}_{}", c.name, c.index + 1))
            .collect()
    }

    pub fn params(&self) -> ParamSet {
        self.choices
            .iter()
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.choices.iter().find(|c| c.name == name).map(|c| &c.value)
    }

    /// Human readable `name=value` list
    pub fn describe(&self) -> String {
        self.choices
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ints(v: &[i64]) -> Vec<ParamValue> {
        v.iter().map(|&i| ParamValue::Int(i)).collect()
    }

    fn floats(v: &[f64]) -> Vec<ParamValue> {
        v.iter().map(|&f| ParamValue::Float(f)).collect()
    }

    #[test]
    fn test_all_combinations_is_product() {
        let spec = SweepSpec::new()
            .with("length", ints(&[20, 40]))
            .with("gap", floats(&[0.2, 0.3, 0.4]));
        let combos = spec.combinations(SweepMode::AllCombinations).unwrap();
        assert_eq!(combos.len(), 6);
        assert_eq!(spec.count(SweepMode::AllCombinations).unwrap(), 6);

        let names: Vec<String> = combos.iter().map(Combination::artifact_name).collect();
        assert_eq!(
            names,
            vec![
                "length_1gap_1",
                "length_1gap_2",
                "length_1gap_3",
                "length_2gap_1",
                "length_2gap_2",
                "length_2gap_3",
            ]
        );
        assert_eq!(combos[4].get("gap"), Some(&ParamValue::Float(0.3)));
    }

    #[test]
    fn test_paired_zips_positionally() {
        let spec = SweepSpec::new()
            .with("length", ints(&[20, 40]))
            .with("gap", floats(&[0.2, 0.3]));
        let combos = spec.combinations(SweepMode::Paired).unwrap();
        assert_eq!(combos.len(), 2);
        assert_eq!(combos[0].describe(), "length=20, gap=0.2");
        assert_eq!(combos[1].describe(), "length=40, gap=0.3");
        assert_eq!(combos[1].artifact_name(), "length_2gap_2");
    }

    #[test]
    fn test_paired_rejects_unequal_lengths() {
        let spec = SweepSpec::new()
            .with("length", ints(&[20, 40]))
            .with("gap", floats(&[0.2, 0.3, 0.4]));
        let err = spec.combinations(SweepMode::Paired).unwrap_err();
        match err {
            PdkError::Config(msg) => assert!(msg.contains("length=2, gap=3"), "{msg}"),
            other => panic!("expected config error, got {other:?}"),
        }
        // Unequal lengths are fine for the product.
        assert_eq!(spec.count(SweepMode::AllCombinations).unwrap(), 6);
    }

    #[test]
    fn test_empty_specs_are_rejected() {
        assert!(SweepSpec::new().validate(SweepMode::AllCombinations).is_err());
        let spec = SweepSpec::new().with("length", vec![]);
        assert!(matches!(
            spec.combinations(SweepMode::AllCombinations),
            Err(PdkError::Config(_))
        ));
    }

    #[test]
    fn test_names_are_deterministic() {
        let spec = SweepSpec::new().with("length", ints(&[10, 20, 30]));
        let a: Vec<String> = spec
            .combinations(SweepMode::AllCombinations)
            .unwrap()
            .iter()
            .map(Combination::artifact_name)
            .collect();
        let b: Vec<String> = spec
            .combinations(SweepMode::AllCombinations)
            .unwrap()
            .iter()
            .map(Combination::artifact_name)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_values_share_first_index() {
        let spec = SweepSpec::new().with("length", ints(&[10, 10]));
        let combos = spec.combinations(SweepMode::AllCombinations).unwrap();
        assert_eq!(combos[1].artifact_name(), "length_1");
    }

    #[test]
    fn test_deserialize_keeps_order() {
        let spec: SweepSpec = serde_json::from_str(r#"{"width": [1.0, 1.2], "gap": [0.3]}"#).unwrap();
        assert_eq!(spec.names().collect::<Vec<_>>(), vec!["width", "gap"]);
    }
}
