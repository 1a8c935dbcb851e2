use std::sync::Arc;

use mads::bbout::{BBOutputType, OutputTypeList};
use mads::blackbox::{ClosureEvaluator, DynEvaluator};
use mads::point::HNormType;
use mads::{Algorithm, AlgorithmRun, Point, RunConfig, StopCode};

fn base_config(dim: usize) -> RunConfig {
    RunConfig {
        dimension: dim,
        lower_bound: vec![-10.0; dim],
        upper_bound: vec![10.0; dim],
        granularity: vec![0.0; dim],
        initial_frame_size: vec![1.0; dim],
        h_norm: HNormType::L2,
        h_max_init: f64::INFINITY,
        max_bb_eval: Some(400),
        max_eval: None,
        max_time_secs: None,
        opportunistic_eval: false,
        nb_threads: 1,
        seed: 42,
        stop_if_feasible: false,
        direction_type: "ORTHO_2N".to_string(),
        anisotropic_mesh: true,
    }
}

#[test]
fn unconstrained_quadratic_converges_near_optimum() {
    let cfg = base_config(2);
    let ev: DynEvaluator = Arc::new(ClosureEvaluator::new(
        OutputTypeList::new(vec![BBOutputType::Obj]),
        |x| {
            let a = x.coord(0).value() - 1.5;
            let b = x.coord(1).value() + 2.0;
            vec![a * a + b * b]
        },
    ));
    let mut algo = Algorithm::new_auto(ev, vec![Point::from_f64(&[0.0, 0.0])], cfg);
    algo.run();

    let best = algo
        .barrier()
        .best_feas_point()
        .expect("unconstrained run should have a feasible incumbent");
    let x = best.x();
    assert!((x.coord(0).value() - 1.5).abs() < 0.5);
    assert!((x.coord(1).value() + 2.0).abs() < 0.5);
}

#[test]
fn inequality_constrained_respects_progressive_barrier() {
    let cfg = base_config(2);
    // minimize x0^2 + x1^2 subject to x0 + x1 >= 1 (PB constraint, not EB)
    let ev: DynEvaluator = Arc::new(ClosureEvaluator::new(
        OutputTypeList::new(vec![BBOutputType::Obj, BBOutputType::Pb]),
        |x| {
            let a = x.coord(0).value();
            let b = x.coord(1).value();
            vec![a * a + b * b, 1.0 - a - b]
        },
    ));
    let mut algo = Algorithm::new_auto(ev, vec![Point::from_f64(&[2.0, 2.0])], cfg);
    algo.run();

    let feas = algo.barrier().x_feas();
    assert!(!feas.is_empty());
    for p in feas {
        let a = p.x().coord(0).value();
        let b = p.x().coord(1).value();
        assert!(a + b >= 1.0 - 1e-6);
    }
}

#[test]
fn eb_infeasible_x0_runs_phase_one_then_mads() {
    let cfg = base_config(2);
    // x0 = (0, 0) violates the EB constraint x0 + x1 >= 1.
    let ev: DynEvaluator = Arc::new(ClosureEvaluator::new(
        OutputTypeList::new(vec![BBOutputType::Obj, BBOutputType::Eb]),
        |x| {
            let a = x.coord(0).value();
            let b = x.coord(1).value();
            vec![a * a + b * b, 1.0 - a - b]
        },
    ));
    let mut algo = Algorithm::new_auto(ev, vec![Point::from_f64(&[0.0, 0.0])], cfg);
    assert!(matches!(algo, Algorithm::PhaseOneThenMads(_)));
    algo.run();

    let feas = algo.barrier().x_feas();
    assert!(!feas.is_empty(), "phase-one should recover EB feasibility");
    for p in feas {
        let a = p.x().coord(0).value();
        let b = p.x().coord(1).value();
        assert!(a + b >= 1.0 - 1e-6);
    }
}

#[test]
fn granular_variable_snaps_to_integers() {
    let mut cfg = base_config(1);
    cfg.granularity = vec![1.0];
    cfg.lower_bound = vec![-20.0];
    cfg.upper_bound = vec![20.0];
    cfg.initial_frame_size = vec![4.0];
    let ev: DynEvaluator = Arc::new(ClosureEvaluator::new(
        OutputTypeList::new(vec![BBOutputType::Obj]),
        |x| {
            let a = x.coord(0).value() - 7.3;
            vec![a * a]
        },
    ));
    let mut algo = Algorithm::new_auto(ev, vec![Point::from_f64(&[0.0])], cfg);
    algo.run();

    let best = algo.barrier().best_feas_point().expect("should have an incumbent");
    let v = best.x().coord(0).value();
    assert!((v - v.round()).abs() < 1e-9, "granular variable must land on an integer: {v}");
}

#[test]
fn budget_limited_rosenbrock_stops_on_bb_eval() {
    let dim = 10;
    let mut cfg = base_config(dim);
    cfg.max_bb_eval = Some(150);
    let ev: DynEvaluator = Arc::new(ClosureEvaluator::new(
        OutputTypeList::new(vec![BBOutputType::Obj]),
        |x| {
            let coords: Vec<f64> = (0..x.dim()).map(|i| x.coord(i).value()).collect();
            let mut sum = 0.0;
            for i in 0..coords.len() - 1 {
                let a = coords[i + 1] - coords[i] * coords[i];
                let b = 1.0 - coords[i];
                sum += 100.0 * a * a + b * b;
            }
            vec![sum]
        },
    ));
    let mut algo = Algorithm::new_auto(ev, vec![Point::from_f64(&vec![0.0; dim])], cfg);
    let code = algo.run();
    assert!(matches!(
        code,
        StopCode::MaxBbEval | StopCode::MeshPrecReached | StopCode::GranularMeshPrecReached
    ));
}
