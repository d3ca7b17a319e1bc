// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Named per-point / per-cell field arrays

use crate::error::{Error, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Values of one field array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum FieldData {
    Scalar(Vec<f64>),
    Vector(Vec<Vector3<f64>>),
}

impl FieldData {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            FieldData::Scalar(v) => v.len(),
            FieldData::Vector(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of components per tuple
    pub fn components(&self) -> usize {
        match self {
            FieldData::Scalar(_) => 1,
            FieldData::Vector(_) => 3,
        }
    }

    fn empty_like(&self, capacity: usize) -> Self {
        match self {
            FieldData::Scalar(_) => FieldData::Scalar(Vec::with_capacity(capacity)),
            FieldData::Vector(_) => FieldData::Vector(Vec::with_capacity(capacity)),
        }
    }
}

/// A named field array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldArray {
    pub name: String,
    pub data: FieldData,
}

impl FieldArray {
    pub fn scalar(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: FieldData::Scalar(values),
        }
    }

    pub fn vector(name: impl Into<String>, values: Vec<Vector3<f64>>) -> Self {
        Self {
            name: name.into(),
            data: FieldData::Vector(values),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Min/max of a scalar array
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRange {
    pub min: f64,
    pub max: f64,
}

/// Ordered collection of uniquely named arrays attached to points or cells
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes {
    arrays: Vec<FieldArray>,
}

impl Attributes {
    pub fn new() -> Self {
        Self { arrays: Vec::new() }
    }

    /// Insert an array, replacing any existing array of the same name in place
    pub fn insert(&mut self, array: FieldArray) {
        match self.arrays.iter_mut().find(|a| a.name == array.name) {
            Some(existing) => *existing = array,
            None => self.arrays.push(array),
        }
    }

    /// Remove an array by name, returning it if present
    pub fn remove(&mut self, name: &str) -> Option<FieldArray> {
        let index = self.arrays.iter().position(|a| a.name == name)?;
        Some(self.arrays.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&FieldArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn scalar(&self, name: &str) -> Option<&[f64]> {
        match &self.get(name)?.data {
            FieldData::Scalar(v) => Some(v),
            FieldData::Vector(_) => None,
        }
    }

    pub fn vector(&self, name: &str) -> Option<&[Vector3<f64>]> {
        match &self.get(name)?.data {
            FieldData::Vector(v) => Some(v),
            FieldData::Scalar(_) => None,
        }
    }

    /// Scalar lookup that treats absence as a fatal precondition of `stage`
    pub fn require_scalar(&self, stage: &'static str, name: &str) -> Result<&[f64]> {
        match &self
            .get(name)
            .ok_or_else(|| Error::missing_array(stage, name))?
            .data
        {
            FieldData::Scalar(v) => Ok(v),
            FieldData::Vector(_) => Err(Error::ArrayKind {
                name: name.to_string(),
                expected: "scalar",
            }),
        }
    }

    /// Vector lookup that treats absence as a fatal precondition of `stage`
    pub fn require_vector(&self, stage: &'static str, name: &str) -> Result<&[Vector3<f64>]> {
        match &self
            .get(name)
            .ok_or_else(|| Error::missing_array(stage, name))?
            .data
        {
            FieldData::Vector(v) => Ok(v),
            FieldData::Scalar(_) => Err(Error::ArrayKind {
                name: name.to_string(),
                expected: "vector",
            }),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.iter().map(|a| a.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldArray> {
        self.arrays.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Check every array holds exactly `tuples` entries
    pub fn check_length(&self, tuples: usize) -> Result<()> {
        for array in &self.arrays {
            if array.len() != tuples {
                return Err(Error::ArrayLength {
                    name: array.name.clone(),
                    expected: tuples,
                    actual: array.len(),
                });
            }
        }
        Ok(())
    }

    /// Same array names and kinds with no tuples
    pub fn empty_like(&self, capacity: usize) -> Self {
        Self {
            arrays: self
                .arrays
                .iter()
                .map(|a| FieldArray {
                    name: a.name.clone(),
                    data: a.data.empty_like(capacity),
                })
                .collect(),
        }
    }

    /// Append tuple `index` of `source`. `self` must have been built with
    /// `source.empty_like`.
    pub fn push_row(&mut self, source: &Attributes, index: usize) {
        for (dst, src) in self.arrays.iter_mut().zip(&source.arrays) {
            match (&mut dst.data, &src.data) {
                (FieldData::Scalar(d), FieldData::Scalar(s)) => d.push(s[index]),
                (FieldData::Vector(d), FieldData::Vector(s)) => d.push(s[index]),
                _ => {}
            }
        }
    }

    /// Append the weighted sum of tuples of `source`
    pub fn push_interpolated(&mut self, source: &Attributes, weights: &[(usize, f64)]) {
        for (dst, src) in self.arrays.iter_mut().zip(&source.arrays) {
            match (&mut dst.data, &src.data) {
                (FieldData::Scalar(d), FieldData::Scalar(s)) => {
                    d.push(weights.iter().map(|&(i, w)| s[i] * w).sum());
                }
                (FieldData::Vector(d), FieldData::Vector(s)) => {
                    d.push(
                        weights
                            .iter()
                            .fold(Vector3::zeros(), |acc, &(i, w)| acc + s[i] * w),
                    );
                }
                _ => {}
            }
        }
    }

    /// Append a zero tuple to every array
    pub fn push_zero(&mut self) {
        for array in &mut self.arrays {
            match &mut array.data {
                FieldData::Scalar(d) => d.push(0.0),
                FieldData::Vector(d) => d.push(Vector3::zeros()),
            }
        }
    }

    /// Gather the tuples at `indices` into new arrays
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut out = self.empty_like(indices.len());
        for &i in indices {
            out.push_row(self, i);
        }
        out
    }

    /// Min/max of a scalar array, `None` when absent or empty
    pub fn scalar_range(&self, name: &str) -> Option<FieldRange> {
        let values = self.scalar(name)?;
        if values.is_empty() {
            return None;
        }
        Some(values.iter().fold(
            FieldRange {
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            },
            |r, &v| FieldRange {
                min: r.min.min(v),
                max: r.max.max(v),
            },
        ))
    }

    /// Concatenate arrays from `other` onto matching arrays of `self`.
    /// Arrays missing on either side are dropped so lengths stay consistent.
    pub fn append(&mut self, other: &Attributes) {
        self.arrays.retain(|a| {
            other
                .get(&a.name)
                .is_some_and(|o| o.data.components() == a.data.components())
        });
        for dst in &mut self.arrays {
            let Some(src) = other.get(&dst.name) else {
                continue;
            };
            match (&mut dst.data, &src.data) {
                (FieldData::Scalar(d), FieldData::Scalar(s)) => d.extend_from_slice(s),
                (FieldData::Vector(d), FieldData::Vector(s)) => d.extend_from_slice(s),
                _ => {}
            }
        }
    }
}
