//! Fold-in: approximate least-squares correction for one observation.
//!
//! Given user row `u`, item row `v` and signed strength `value`, the estimate
//! `u·v` is pushed toward 1 for positive values and toward 0 for negative ones.
//! The step size shrinks as the estimate approaches its bound and grows with
//! `|value|` without overshooting.

use crate::error::{ServingError, ServingResult};
use crate::solver::Solver;
use crate::vectors::{dot, FeatureVector};
use tracing::error;

/// Signed weight of the correction for `estimate` and observed `value`.
pub fn fold_in_weight(estimate: f64, value: f32) -> f64 {
    let value = value as f64;
    if value > 0.0 && estimate < 1.0 {
        (1.0 - 1.0 / (1.0 + value)) * (1.0 - estimate.max(0.0))
    } else if value < 0.0 && estimate > 0.0 {
        (1.0 - 1.0 / (1.0 - value)) * -estimate.min(1.0)
    } else {
        0.0
    }
}

/// Apply one observation to `user` and `item` in place.
///
/// `item_solver` is built from the user matrix and maps a user row to an item
/// correction; `user_solver` is built from the item matrix and maps an item row
/// to a user correction. A missing solver skips that half of the update.
pub fn fold_in(
    user: Option<&FeatureVector>,
    item: Option<&FeatureVector>,
    value: f32,
    user_solver: Option<&dyn Solver>,
    item_solver: Option<&dyn Solver>,
) -> ServingResult<()> {
    let (Some(user), Some(item)) = (user, item) else {
        return Ok(());
    };

    let u = user.snapshot();
    let v = item.snapshot();
    let weight = fold_in_weight(dot(&u, &v), value);
    if weight == 0.0 {
        return Ok(());
    }

    let item_delta = item_solver.map(|s| s.solve(&u));
    let user_delta = user_solver.map(|s| s.solve(&v));

    // check both before touching either row
    for delta in [&item_delta, &user_delta].into_iter().flatten() {
        if delta.iter().any(|d| !(weight * d).is_finite()) {
            error!(weight, "fold-in produced a non-finite delta");
            return Err(ServingError::corruption("non-finite fold-in delta"));
        }
    }

    if let Some(delta) = item_delta {
        item.add_scaled(weight, &delta);
    }
    if let Some(delta) = user_delta {
        user.add_scaled(weight, &delta);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Identity(usize);

    impl Solver for Identity {
        fn solve(&self, rhs: &[f32]) -> Vec<f64> {
            rhs.iter().map(|x| *x as f64).collect()
        }
        fn dimension(&self) -> usize {
            self.0
        }
    }

    struct Exploding;

    impl Solver for Exploding {
        fn solve(&self, rhs: &[f32]) -> Vec<f64> {
            vec![f64::INFINITY; rhs.len()]
        }
        fn dimension(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_weight_zero_value() {
        for estimate in [-2.0, 0.0, 0.5, 1.0, 3.0] {
            assert_eq!(fold_in_weight(estimate, 0.0), 0.0);
        }
    }

    #[test]
    fn test_weight_positive() {
        for estimate in [-1.0, 0.0, 0.25, 0.99] {
            for value in [0.1, 1.0, 10.0] {
                assert!(fold_in_weight(estimate, value) > 0.0);
            }
        }
        assert_eq!(fold_in_weight(1.0, 2.0), 0.0);
        assert_eq!(fold_in_weight(1.5, 2.0), 0.0);
        // value 1, estimate 0: (1 - 1/2) * 1
        assert!((fold_in_weight(0.0, 1.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_weight_negative() {
        for estimate in [0.01, 0.5, 1.0, 4.0] {
            assert!(fold_in_weight(estimate, -1.0) < 0.0);
        }
        assert_eq!(fold_in_weight(0.0, -1.0), 0.0);
        assert_eq!(fold_in_weight(-0.5, -1.0), 0.0);
    }

    #[test]
    fn test_positive_update_raises_estimate() {
        let u = FeatureVector::new(vec![0.1, 0.2]);
        let v = FeatureVector::new(vec![0.3, 0.1]);
        let before = dot(&u.snapshot(), &v.snapshot());
        let solver = Identity(2);
        fold_in(Some(&u), Some(&v), 1.0, Some(&solver), Some(&solver)).unwrap();
        let after = dot(&u.snapshot(), &v.snapshot());
        assert!(after > before);
    }

    #[test]
    fn test_missing_rows_or_solvers() {
        let v = FeatureVector::new(vec![1.0]);
        fold_in(None, Some(&v), 1.0, None, None).unwrap();
        assert_eq!(v.snapshot(), vec![1.0]);

        let u = FeatureVector::new(vec![0.5]);
        let solver = Identity(1);
        fold_in(Some(&u), Some(&v), 1.0, None, Some(&solver)).unwrap();
        assert_eq!(u.snapshot(), vec![0.5], "user half skipped without a user solver");
        assert!(v.snapshot()[0] > 1.0);
    }

    #[test]
    fn test_non_finite_delta_is_corruption() {
        let u = FeatureVector::new(vec![0.1]);
        let v = FeatureVector::new(vec![0.1]);
        let err = fold_in(Some(&u), Some(&v), 1.0, Some(&Exploding), None).unwrap_err();
        assert!(matches!(err, ServingError::ModelCorruption(_)));
        assert_eq!(u.snapshot(), vec![0.1]);
    }
}
