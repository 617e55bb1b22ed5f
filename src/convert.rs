//! Conversions between host numeric types and [`Value`].
//!
//! Hosts hand data to the language through globals and positional arguments;
//! these conversions cover the common shapes: scalars, slices, and (behind
//! the `ndarray`/`nalgebra` features) the vector and matrix types of those
//! crates. Everything converts by copying, matching the language's
//! copy-on-assign semantics.

use crate::value::Value;

impl From<&[f64]> for Value {
    fn from(ns: &[f64]) -> Value {
        Value::List(ns.iter().copied().map(Value::Number).collect())
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(ns: [f64; N]) -> Value {
        Value::from(&ns[..])
    }
}

impl From<Vec<Vec<f64>>> for Value {
    fn from(rows: Vec<Vec<f64>>) -> Value {
        Value::List(rows.into_iter().map(Value::from).collect())
    }
}

#[cfg(feature = "ndarray")]
mod ndarray_impls {
    use ndarray::{Array1, Array2};

    use crate::value::Value;

    impl From<&Array1<f64>> for Value {
        fn from(a: &Array1<f64>) -> Value {
            Value::List(a.iter().copied().map(Value::Number).collect())
        }
    }

    impl From<Array1<f64>> for Value {
        fn from(a: Array1<f64>) -> Value {
            Value::from(&a)
        }
    }

    impl From<&Array2<f64>> for Value {
        fn from(a: &Array2<f64>) -> Value {
            Value::List(
                a.rows()
                    .into_iter()
                    .map(|row| Value::List(row.iter().copied().map(Value::Number).collect()))
                    .collect(),
            )
        }
    }

    impl From<Array2<f64>> for Value {
        fn from(a: Array2<f64>) -> Value {
            Value::from(&a)
        }
    }
}

#[cfg(feature = "nalgebra")]
mod nalgebra_impls {
    use nalgebra::{DMatrix, DVector};

    use crate::value::Value;

    impl From<&DVector<f64>> for Value {
        fn from(v: &DVector<f64>) -> Value {
            Value::List(v.iter().copied().map(Value::Number).collect())
        }
    }

    impl From<DVector<f64>> for Value {
        fn from(v: DVector<f64>) -> Value {
            Value::from(&v)
        }
    }

    impl From<&DMatrix<f64>> for Value {
        fn from(m: &DMatrix<f64>) -> Value {
            Value::List(
                m.row_iter()
                    .map(|row| Value::List(row.iter().copied().map(Value::Number).collect()))
                    .collect(),
            )
        }
    }

    impl From<DMatrix<f64>> for Value {
        fn from(m: DMatrix<f64>) -> Value {
            Value::from(&m)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::value::Value;

    #[test]
    fn slices_and_arrays() {
        let v: Value = [3.0, 4.0].into();
        assert_eq!(v, Value::from(vec![3.0, 4.0]));
        let s: Value = (&[1.0, 2.0][..]).into();
        assert_eq!(s, Value::from(vec![1.0, 2.0]));
    }

    #[test]
    fn nested_rows_become_matrices() {
        let m: Value = vec![vec![1.0, 2.0], vec![3.0, 4.0]].into();
        assert_eq!(
            m,
            Value::List(vec![Value::from(vec![1.0, 2.0]), Value::from(vec![3.0, 4.0])])
        );
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn ndarray_conversions() {
        use ndarray::{arr1, arr2};
        assert_eq!(Value::from(arr1(&[1.0, 2.0])), Value::from(vec![1.0, 2.0]));
        assert_eq!(
            Value::from(arr2(&[[1.0, 2.0], [3.0, 4.0]])),
            Value::from(vec![vec![1.0, 2.0], vec![3.0, 4.0]])
        );
    }

    #[cfg(feature = "nalgebra")]
    #[test]
    fn nalgebra_conversions() {
        use nalgebra::{DMatrix, DVector};
        assert_eq!(
            Value::from(DVector::from_vec(vec![1.0, 2.0])),
            Value::from(vec![1.0, 2.0])
        );
        assert_eq!(
            Value::from(DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0])),
            Value::from(vec![vec![1.0, 2.0], vec![3.0, 4.0]])
        );
    }
}
