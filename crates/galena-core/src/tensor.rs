//! Parameter tensors and their nested-array JSON form.
//!
//! The cache file stores parameter tensors as plain nested arrays, so the
//! in-memory type round-trips through that representation. Only the element
//! types that actually occur in exported parameters are modeled.

use crate::{Error, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

/// A parameter tensor: shape plus flat element storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    /// Dimensions, outermost first. Empty for a scalar.
    pub shape: Vec<usize>,
    /// Flat elements in row-major order.
    pub values: TensorValues,
}

/// Flat element storage for a [`Tensor`].
#[derive(Debug, Clone, PartialEq)]
pub enum TensorValues {
    F32(Vec<f32>),
    I64(Vec<i64>),
}

impl TensorValues {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            TensorValues::F32(data) => data.len(),
            TensorValues::I64(data) => data.len(),
        }
    }

    /// Check whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Tensor {
    /// Float tensor from a shape and row-major data.
    pub fn from_f32(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        Self::checked(shape, TensorValues::F32(data))
    }

    /// Integer tensor from a shape and row-major data.
    pub fn from_i64(shape: Vec<usize>, data: Vec<i64>) -> Result<Self> {
        Self::checked(shape, TensorValues::I64(data))
    }

    fn checked(shape: Vec<usize>, values: TensorValues) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(Error::InvalidTensor(format!(
                "shape {:?} wants {} elements, got {}",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check whether the tensor has no elements.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Elementwise comparison within `tolerance`, after exact shape match.
    ///
    /// Integer tensors compare exactly; mixed element types compare through
    /// f64.
    pub fn allclose(&self, other: &Tensor, tolerance: f64) -> bool {
        if self.shape != other.shape || self.len() != other.len() {
            return false;
        }
        let a = self.iter_f64();
        let b = other.iter_f64();
        a.zip(b).all(|(x, y)| (x - y).abs() <= tolerance)
    }

    fn iter_f64(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match &self.values {
            TensorValues::F32(data) => Box::new(data.iter().map(|v| f64::from(*v))),
            TensorValues::I64(data) => Box::new(data.iter().map(|v| *v as f64)),
        }
    }

    /// Convert to the nested-array JSON form used by the cache file.
    pub fn to_nested_json(&self) -> Value {
        fn nest<T: Copy>(shape: &[usize], data: &[T], number: &impl Fn(T) -> Value) -> Value {
            match shape {
                [] => number(data[0]),
                [n, rest @ ..] => {
                    let stride = if *n == 0 { 0 } else { data.len() / n };
                    Value::Array(
                        (0..*n)
                            .map(|i| nest(rest, &data[i * stride..(i + 1) * stride], number))
                            .collect(),
                    )
                }
            }
        }

        match &self.values {
            TensorValues::F32(data) => nest(&self.shape, data, &|v: f32| {
                Number::from_f64(f64::from(v))
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }),
            TensorValues::I64(data) => nest(&self.shape, data, &|v: i64| Value::Number(v.into())),
        }
    }

    /// Parse the nested-array JSON form back into a tensor.
    ///
    /// The element type is recovered from the literals: a document containing
    /// any non-integer number parses as f32, otherwise as i64.
    pub fn from_nested_json(value: &Value) -> Result<Self> {
        let mut shape = Vec::new();
        let mut cursor = value;
        while let Value::Array(items) = cursor {
            shape.push(items.len());
            match items.first() {
                Some(first) => cursor = first,
                None => break,
            }
        }

        let mut integers = Vec::new();
        let mut floats = Vec::new();
        let mut all_integers = true;
        flatten(value, &mut |number| {
            if let Some(v) = number.as_i64() {
                integers.push(v);
                floats.push(v as f64);
            } else if let Some(v) = number.as_f64() {
                all_integers = false;
                floats.push(v);
            }
            Ok(())
        })?;

        if all_integers {
            Self::from_i64(shape, integers)
        } else {
            Self::from_f32(shape, floats.into_iter().map(|v| v as f32).collect())
        }
    }
}

fn flatten(value: &Value, visit: &mut impl FnMut(&Number) -> Result<()>) -> Result<()> {
    match value {
        Value::Number(number) => visit(number),
        Value::Array(items) => {
            for item in items {
                flatten(item, visit)?;
            }
            Ok(())
        }
        other => Err(Error::InvalidTensor(format!(
            "expected nested numeric arrays, got {}",
            other
        ))),
    }
}

impl Serialize for Tensor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_nested_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tensor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Tensor::from_nested_json(&value).map_err(D::Error::custom)
    }
}
