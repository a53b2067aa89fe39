use std::cell::Cell;

use super::*;


#[track_caller]
fn assert_nearly_eq(lhs: f64, rhs: f64, tolerance: f64) {
    let difference = (lhs - rhs).abs();
    assert!(
        difference < tolerance,
        "LHS was {lhs}, RHS was {rhs}, difference was {difference}"
    );
}

#[track_caller]
fn assert_matrix_nearly_eq(lhs: &Matrix, rhs: &Matrix, tolerance: f64) {
    assert_eq!(lhs.nrows(), rhs.nrows());
    assert_eq!(lhs.ncols(), rhs.ncols());
    for i in 0..lhs.nrows() {
        for j in 0..lhs.ncols() {
            assert_nearly_eq(lhs.get(i, j), rhs.get(i, j), tolerance);
        }
    }
}

fn matrix(entries: &[&[f64]]) -> Matrix {
    Matrix::from_entries(entries.iter().map(|row| row.to_vec()).collect()).unwrap()
}

mod vectors {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Vector::new(vec![1.0, 2.0, 3.0]);
        let b = Vector::new(vec![4.0, -5.0, 6.0]);
        assert_eq!(a.add(&b).unwrap(), Vector::new(vec![5.0, -3.0, 9.0]));
        assert_eq!(a.sub(&b).unwrap(), Vector::new(vec![-3.0, 7.0, -3.0]));
        assert_eq!(a.scale(2.0), Vector::new(vec![2.0, 4.0, 6.0]));
        assert_nearly_eq(a.dot(&b).unwrap(), 4.0 - 10.0 + 18.0, 1e-12);
        assert_nearly_eq(Vector::new(vec![3.0, 4.0]).norm(), 5.0, 1e-12);
    }

    #[test]
    fn length_mismatch_is_an_error_not_a_truncation() {
        let a = Vector::new(vec![1.0, 2.0]);
        let b = Vector::new(vec![1.0, 2.0, 3.0]);
        for result in [a.add(&b), a.sub(&b)] {
            assert!(matches!(
                result,
                Err(Error::DimensionMismatch { left: 2, right: 3, .. })
            ));
        }
        assert!(a.dot(&b).is_err());
    }

    #[test]
    fn tensor_product() {
        let a = Vector::new(vec![1.0, 2.0]);
        let b = Vector::new(vec![3.0, 4.0, 5.0]);
        let expected = matrix(&[&[3.0, 4.0, 5.0], &[6.0, 8.0, 10.0]]);
        assert_eq!(a.tensor(&b), expected);
    }

    #[test]
    fn largest_absolute_entry() {
        assert_eq!(Vector::new(vec![3.0, -7.0, 2.0]).max_abs(), 7.0);
        assert_eq!(Vector::zeros(0).max_abs(), 0.0);
    }

    #[test]
    fn entry_replacement() {
        let mut a = Vector::new(vec![1.0, 2.0]);
        let replaced = a.with_entry(0, 9.0);
        assert_eq!(replaced, Vector::new(vec![9.0, 2.0]));
        // Copy-on-write leaves the original alone.
        assert_eq!(a, Vector::new(vec![1.0, 2.0]));
        a.set(1, 7.0);
        assert_eq!(a, Vector::new(vec![1.0, 7.0]));
    }
}

mod matrices {
    use super::*;

    #[test]
    fn ragged_rows_are_rejected() {
        let result = Matrix::from_entries(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn multiplication_dispatch() {
        let a = matrix(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let b = matrix(&[&[0.0, 1.0], &[1.0, 0.0]]);
        assert_eq!(a.mul_matrix(&b).unwrap(), matrix(&[&[2.0, 1.0], &[4.0, 3.0]]));
        assert_eq!(
            a.mul_vector(&Vector::new(vec![1.0, 1.0])).unwrap(),
            Vector::new(vec![3.0, 7.0])
        );
        assert_eq!(a.mul_scalar(2.0), matrix(&[&[2.0, 4.0], &[6.0, 8.0]]));
    }

    #[test]
    fn incompatible_shapes_are_errors() {
        let a = matrix(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let b = matrix(&[&[1.0, 2.0]]);
        assert!(a.mul_matrix(&b).is_err());
        assert!(a.add(&b).is_err());
        assert!(a.mul_vector(&Vector::new(vec![1.0, 2.0, 3.0])).is_err());
    }

    #[test]
    fn column_mismatch_reports_column_counts() {
        let a = matrix(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let b = matrix(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        assert!(matches!(
            a.add(&b),
            Err(Error::DimensionMismatch { left: 2, right: 3, .. })
        ));
    }

    #[test]
    fn row_and_column_extraction() {
        let a = matrix(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        assert_eq!(a.row(1), &Vector::new(vec![4.0, 5.0, 6.0]));
        assert_eq!(a.column(2), Vector::new(vec![3.0, 6.0]));
        assert_eq!(a.diagonal(), Vector::new(vec![1.0, 5.0]));
        assert_eq!(a.transpose().transpose(), a);
    }

    #[test]
    fn qr_round_trip_all_methods() {
        let a = matrix(&[
            &[4.0, -2.0, 1.0],
            &[-1.0, 3.0, 4.0],
            &[5.0, -1.0, 3.0],
        ]);
        for method in [
            QrMethod::ClassicalGramSchmidt,
            QrMethod::ModifiedGramSchmidt,
            QrMethod::GivensRotation,
        ] {
            let qr = a.qr(method).unwrap();
            assert_matrix_nearly_eq(&qr.q.mul_matrix(&qr.r).unwrap(), &a, 1e-10);
            let identity = Matrix::identity(qr.q.ncols());
            assert_matrix_nearly_eq(
                &qr.q.transpose().mul_matrix(&qr.q).unwrap(),
                &identity,
                1e-10,
            );
            // R must come out upper triangular.
            for i in 0..qr.r.nrows() {
                for j in 0..i.min(qr.r.ncols()) {
                    assert_nearly_eq(qr.r.get(i, j), 0.0, 1e-10);
                }
            }
        }
    }

    #[test]
    fn gram_schmidt_reports_dependent_columns() {
        let a = matrix(&[&[1.0, 2.0], &[2.0, 4.0]]);
        for method in [QrMethod::ClassicalGramSchmidt, QrMethod::ModifiedGramSchmidt] {
            assert!(matches!(
                a.qr(method),
                Err(Error::SingularSystem { column: 1 })
            ));
        }
    }
}

mod linear_solve {
    use super::*;

    #[test]
    fn known_three_by_three_system() {
        let a = matrix(&[
            &[4.0, -2.0, 1.0],
            &[-1.0, 3.0, 4.0],
            &[5.0, -1.0, 3.0],
        ]);
        let b = Vector::new(vec![15.0, 15.0, 26.0]);
        let x = linear::solve(&a, &b).unwrap();
        for (actual, expected) in x.iter().zip([2.0, -1.0, 5.0]) {
            assert_nearly_eq(*actual, expected, 1e-9);
        }
    }

    #[test]
    fn scalar_system_solves_trivially() {
        let a = matrix(&[&[2.0]]);
        let x = linear::solve(&a, &Vector::new(vec![6.0])).unwrap();
        assert_nearly_eq(x[0], 3.0, 1e-12);
    }

    #[test]
    fn row_count_mismatch() {
        let a = matrix(&[&[1.0, 0.0], &[0.0, 1.0]]);
        let b = Vector::new(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            linear::solve(&a, &b),
            Err(Error::DimensionMismatch { left: 2, right: 3, .. })
        ));
    }

    #[test]
    fn zero_over_zero_resolves_to_zero_under_givens() {
        // The second unknown is unconstrained; Givens skips the zero pivot
        // column and back-substitution maps the 0/0 to 0 instead of NaN.
        let a = matrix(&[&[1.0, 0.0], &[0.0, 0.0]]);
        let b = Vector::new(vec![3.0, 0.0]);
        let x = linear::solve_with(&a, &b, QrMethod::GivensRotation).unwrap();
        assert_nearly_eq(x[0], 3.0, 1e-12);
        assert_eq!(x[1], 0.0);
    }

    #[test]
    fn inconsistent_singular_system_is_reported() {
        let a = matrix(&[&[1.0, 0.0], &[0.0, 0.0]]);
        let b = Vector::new(vec![3.0, 1.0]);
        assert!(matches!(
            linear::solve_with(&a, &b, QrMethod::GivensRotation),
            Err(Error::SingularSystem { column: 1 })
        ));
    }
}

mod jacobians {
    use super::*;

    fn residuals() -> Vec<Box<ResidualFn<'static>>> {
        vec![
            Box::new(|x: &Vector| (x[0] * x[0] + x[1] * x[1] + x[2] * x[0].sin()).into()),
            Box::new(|x: &Vector| (x[2] * x[2] + x[2] * x[1].sin()).into()),
        ]
    }

    // d/dx of [x^2 + y^2 + z sin x, z^2 + z sin y] at (1, 1, 1).
    const ANALYTIC: [[f64; 3]; 2] = [
        [2.5403023, 2.0, 0.8414710],
        [0.0, 0.5403023, 2.8414710],
    ];

    #[test]
    fn all_schemes_agree_with_the_analytic_jacobian() {
        let point = Vector::new(vec![1.0, 1.0, 1.0]);
        for scheme in [Scheme::Forward, Scheme::Backward, Scheme::Center] {
            let j = jacobian::build(
                &residuals(),
                &point,
                JacobianCfg::default().with_scheme(scheme),
                None,
            )
            .unwrap();
            assert_eq!((j.nrows(), j.ncols()), (2, 3));
            for (i, row) in ANALYTIC.iter().enumerate() {
                for (k, expected) in row.iter().enumerate() {
                    assert_nearly_eq(j.get(i, k), *expected, 1e-6);
                }
            }
        }
    }

    #[test]
    fn precomputed_residual_short_circuits_the_base_evaluation() {
        let point = Vector::new(vec![1.0, 1.0, 1.0]);
        let fns = residuals();
        let at_point = jacobian::probe(&fns, &point).unwrap();
        let with_known = jacobian::build(
            &fns,
            &point,
            JacobianCfg::default().with_scheme(Scheme::Forward),
            Some(&at_point),
        )
        .unwrap();
        let without = jacobian::build(
            &fns,
            &point,
            JacobianCfg::default().with_scheme(Scheme::Forward),
            None,
        )
        .unwrap();
        assert_matrix_nearly_eq(&with_known, &without, 1e-12);
    }

    #[test]
    fn undefined_probe_is_reported_with_its_index() {
        let fns: Vec<Box<ResidualFn<'_>>> = vec![
            Box::new(|x: &Vector| (x[0] * 2.0).into()),
            Box::new(|_: &Vector| Evaluation::Undefined),
        ];
        let result = jacobian::build(
            &fns,
            &Vector::new(vec![1.0]),
            JacobianCfg::default(),
            None,
        );
        assert!(matches!(result, Err(Error::UndefinedResidual { index: 1 })));
    }
}

mod root_proposal {
    use super::*;

    #[test]
    fn exact_root_in_the_observations_is_returned_as_is() {
        let observations =
            Observations::from_pairs(&[(1.0, 3.0), (3.0, -2.0), (2.0, 0.0)]);
        assert_eq!(root::solve(&observations, false).unwrap(), 2.0);
        // Even when forced into fallback mode.
        assert_eq!(root::solve(&observations, true).unwrap(), 2.0);
    }

    #[test]
    fn two_observations_fit_a_line() {
        let observations = Observations::from_pairs(&[(0.0, -1.0), (2.0, 1.0)]);
        assert_nearly_eq(root::solve(&observations, false).unwrap(), 1.0, 1e-12);
    }

    #[test]
    fn three_observations_fit_a_quadratic() {
        // Residuals of r(x) = x^2 - 4; the fit recovers it exactly and the
        // Newton step off the anchor (1, -3) lands at 2.5, inside (1, 3).
        let observations =
            Observations::from_pairs(&[(0.0, -4.0), (1.0, -3.0), (3.0, 5.0)]);
        assert_nearly_eq(root::solve(&observations, false).unwrap(), 2.5, 1e-9);
    }

    #[test]
    fn forced_fallback_bisects_the_bracket() {
        let observations = Observations::from_pairs(&[(0.0, -1.0), (2.0, 1.0)]);
        assert_nearly_eq(root::solve(&observations, true).unwrap(), 1.0, 1e-12);
    }

    #[test]
    fn bisection_skips_already_observed_candidates() {
        // The midpoint of the bracket (0, 2) was already tried, so the next
        // weight (0.01) is used instead.
        let observations =
            Observations::from_pairs(&[(0.0, -1.0), (2.0, 1.0), (1.0, 2.0)]);
        assert_nearly_eq(root::solve(&observations, true).unwrap(), 0.02, 1e-12);
    }

    #[test]
    fn single_signed_observations_have_no_bracket() {
        let observations = Observations::from_pairs(&[(1.0, 2.0), (2.0, 3.0)]);
        assert!(matches!(
            root::solve(&observations, false),
            Err(Error::NoBracket { observations: 2 })
        ));
    }

    #[test]
    fn bracket_picks_the_nearest_sign_change_pair() {
        let observations = Observations::from_pairs(&[
            (0.0, -9.0),
            (10.0, 7.0),
            (4.0, -1.0),
            (6.0, 2.0),
        ]);
        let (above, below) = observations.bracket().unwrap();
        assert_eq!(above.variable, 6.0);
        assert_eq!(below.variable, 4.0);
    }

    #[test]
    fn derived_views_do_not_reorder_the_arena() {
        let mut observations = Observations::from_pairs(&[(0.0, -9.0), (10.0, 7.0)]);
        observations.push(4.0, -1.0);
        let sorted = observations.sorted_by_residual();
        assert_eq!(sorted[0].variable, 4.0);
        // Iteration order is untouched.
        let variables: Vec<f64> = observations.records().iter().map(|o| o.variable).collect();
        assert_eq!(variables, vec![0.0, 10.0, 4.0]);
    }
}

mod gauss_newton {
    use super::*;

    #[test]
    fn rosenbrock_converges_from_a_cold_start() {
        let fns: Vec<Box<ResidualFn<'_>>> = vec![
            Box::new(|x: &Vector| (2f64.sqrt() * (1.0 - x[0])).into()),
            Box::new(|x: &Vector| (200f64.sqrt() * (x[1] - x[0] * x[0])).into()),
        ];
        let mut solver = GaussNewton::new(
            Config::default()
                .with_tolerance(1e-9)
                .with_max_iterations(200)
                .with_max_line_search_iterations(30)
                .with_min_residuum_change(1e-14),
        );
        let report = solver.solve(&fns, Vector::new(vec![0.0, -0.1])).unwrap();
        assert!(report.successful, "failed: {:?}", report.failure_reason);
        assert_nearly_eq(report.x[0], 1.0, 1e-6);
        assert_nearly_eq(report.x[1], 1.0, 1e-6);
    }

    #[test]
    fn zero_iteration_budget_short_circuits_without_evaluating() {
        let calls = Cell::new(0u32);
        let fns: Vec<Box<ResidualFn<'_>>> = vec![Box::new(|x: &Vector| {
            calls.set(calls.get() + 1);
            (x[0] - 1.0).into()
        })];
        let mut solver = GaussNewton::new(Config::default().with_max_iterations(0));
        let report = solver.solve(&fns, Vector::new(vec![5.0])).unwrap();
        assert!(!report.successful);
        assert_eq!(report.iterations, 0);
        assert!(report.failure_reason.unwrap().contains("maximum iterations"));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn starting_on_the_root_succeeds_immediately() {
        let fns: Vec<Box<ResidualFn<'_>>> =
            vec![Box::new(|x: &Vector| (x[0] - 1.0).into())];
        let mut solver = GaussNewton::new(Config::default());
        let report = solver.solve(&fns, Vector::new(vec![1.0])).unwrap();
        assert!(report.successful);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn stall_counts_as_convergence_for_least_squares_minima() {
        // |x^2 + 1| has no root; improvements shrink toward the minimum at
        // x = 0 until they drop under the stall threshold.
        let fns: Vec<Box<ResidualFn<'_>>> =
            vec![Box::new(|x: &Vector| (x[0] * x[0] + 1.0).into())];
        let mut solver = GaussNewton::new(
            Config::default()
                .with_tolerance(1e-8)
                .with_max_iterations(20)
                .with_max_line_search_iterations(12)
                .with_min_residuum_change(1e-3),
        );
        let report = solver.solve(&fns, Vector::new(vec![0.3])).unwrap();
        assert!(report.successful, "failed: {:?}", report.failure_reason);
        assert!(report.iterations >= 2);
        assert!(report.x[0].abs() < 0.05);
    }

    #[test]
    fn duplicate_residuals_make_the_normal_equations_singular() {
        let fns: Vec<Box<ResidualFn<'_>>> = vec![
            Box::new(|x: &Vector| (x[0] + x[1] - 2.0).into()),
            Box::new(|x: &Vector| (x[0] + x[1] - 2.0).into()),
        ];
        let mut solver = GaussNewton::new(Config::default());
        let result = solver.solve(&fns, Vector::new(vec![0.0, 0.0]));
        assert!(matches!(result, Err(Error::SingularSystem { .. })));
    }

    #[test]
    fn undefined_start_is_reported_not_propagated() {
        let fns: Vec<Box<ResidualFn<'_>>> =
            vec![Box::new(|x: &Vector| {
                if x[0] > 0.0 {
                    (x[0].ln()).into()
                } else {
                    Evaluation::Undefined
                }
            })];
        let mut solver = GaussNewton::new(Config::default());
        let report = solver.solve(&fns, Vector::new(vec![-1.0])).unwrap();
        assert!(!report.successful);
        assert_eq!(report.iterations, 0);
        assert!(report.failure_reason.unwrap().contains("starting point"));
    }
}

mod levenberg_marquardt {
    use super::*;

    /// A steep exponential wall: nearly flat left of the root at x = 2, so
    /// the undamped Newton step overshoots by an order of magnitude and no
    /// step the line-search budget can reach improves the residuum.
    fn wall() -> Vec<Box<ResidualFn<'static>>> {
        vec![Box::new(|x: &Vector| {
            ((10.0 * (x[0] - 2.0)).exp() - 1.0).into()
        })]
    }

    fn shared_config() -> Config {
        Config::default()
            .with_tolerance(1e-8)
            .with_max_iterations(30)
            .with_max_line_search_iterations(5)
            .with_min_residuum_change(1e-12)
    }

    #[test]
    fn damping_rescues_a_start_where_gauss_newton_fails() {
        let x0 = Vector::new(vec![1.5]);

        let mut gn = GaussNewton::new(shared_config());
        let gn_report = gn.solve(&wall(), x0.clone()).unwrap();
        assert!(!gn_report.successful);
        assert!(gn_report.failure_reason.unwrap().contains("line search"));

        let mut lm = LevenbergMarquardt::new(shared_config()).with_initial_damping(1.2);
        let lm_report = lm.solve(&wall(), x0).unwrap();
        assert!(lm_report.successful, "failed: {:?}", lm_report.failure_reason);
        assert_nearly_eq(lm_report.x[0], 2.0, 1e-6);
        assert!(lm.damping_increases() >= 1);
    }

    #[test]
    fn full_steps_relax_the_damping_toward_gauss_newton() {
        let fns: Vec<Box<ResidualFn<'_>>> =
            vec![Box::new(|x: &Vector| (x[0] - 3.0).into())];
        let mut lm = LevenbergMarquardt::new(Config::default());
        let report = lm.solve(&fns, Vector::new(vec![0.0])).unwrap();
        assert!(report.successful);
        assert_nearly_eq(report.x[0], 3.0, 1e-6);
        assert_eq!(lm.damping_increases(), 0);
        assert!(lm.final_damping() < 1.0);
    }

    #[test]
    fn zero_iteration_budget_matches_gauss_newton_behavior() {
        let mut lm =
            LevenbergMarquardt::new(Config::default().with_max_iterations(0));
        let report = lm.solve(&wall(), Vector::new(vec![1.5])).unwrap();
        assert!(!report.successful);
        assert_eq!(report.iterations, 0);
    }
}
