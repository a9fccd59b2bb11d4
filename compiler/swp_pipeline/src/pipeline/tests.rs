use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use swp_ir::{OpKind, Rewriter};

use crate::error::{NotApplicable, PredicateRejected};
use crate::options::PipeliningOptions;
use crate::schedule::schedule_from_attrs;
use crate::test_helpers::{
    all_fixtures, assert_equivalent, count_kind, peel_options, predicate_options, two_stage_store,
};

use super::*;

// -- Scenarios --

#[test]
fn peeling_two_stages() {
    let mut fixture = two_stage_store(0, 8, 1);
    let original = fixture.func.clone();
    let options = peel_options();
    let mut rw = Rewriter::new(&mut fixture.func);
    let result = pipeline_for_loop(&mut rw, fixture.for_op, &options).unwrap();

    let func = &fixture.func;
    let entry = func.entry();
    assert!(func.is_erased(fixture.for_op));
    // One load in the prologue; one add and one store in the epilogue.
    assert_eq!(count_kind(func, entry, OpKind::Load), 1);
    assert_eq!(count_kind(func, entry, OpKind::Store), 1);
    assert_eq!(count_kind(func, entry, OpKind::For), 1);
    assert_eq!(func.const_value(func.for_upper_bound(result.kernel)), Some(7));
    assert_equivalent(&original, func, &fixture.args);
}

#[test]
fn predicating_two_stages() {
    let mut fixture = two_stage_store(0, 8, 1);
    let original = fixture.func.clone();
    let options = predicate_options();
    let mut rw = Rewriter::new(&mut fixture.func);
    let result = pipeline_for_loop(&mut rw, fixture.for_op, &options).unwrap();

    let func = &fixture.func;
    let entry = func.entry();
    assert_eq!(func.const_value(func.for_upper_bound(result.kernel)), Some(8));
    // Prologue only: no epilogue store follows the kernel.
    assert_eq!(count_kind(func, entry, OpKind::Load), 1);
    assert_eq!(count_kind(func, entry, OpKind::Store), 0);
    assert_equivalent(&original, func, &fixture.args);
}

// -- Equivalence --

#[test]
fn pipelined_loops_match_original() {
    let bounds = [(0, 8, 1), (1, 8, 3), (-3, 10, 2), (4, 30, 5), (0, 3, 1), (0, 2, 1)];
    for (name, build) in all_fixtures() {
        for &(lb, ub, step) in &bounds {
            for predicated in [false, true] {
                let fixture = build(lb, ub, step);
                let original = fixture.func.clone();
                let options = if predicated { predicate_options() } else { peel_options() };
                let mut func = fixture.func;
                let mut rw = Rewriter::new(&mut func);
                match pipeline_for_loop(&mut rw, fixture.for_op, &options) {
                    Ok(_) => assert_equivalent(&original, &func, &fixture.args),
                    Err(PipelineError::NotApplicable(NotApplicable::TooFewIterations { .. })) => {
                        assert_eq!(func, original, "{name} {lb}..{ub} step {step}");
                    }
                    Err(err) => panic!("{name} {lb}..{ub} step {step} predicated={predicated}: {err}"),
                }
            }
        }
    }
}

#[test]
fn loop_at_the_top_of_the_index_range() {
    for options in [peel_options(), predicate_options()] {
        let mut fixture = two_stage_store(i64::MAX - 20, i64::MAX, 7);
        let original = fixture.func.clone();
        let mut rw = Rewriter::new(&mut fixture.func);
        pipeline_for_loop(&mut rw, fixture.for_op, &options).unwrap();
        assert_equivalent(&original, &fixture.func, &fixture.args);
    }
}

#[test]
fn every_fixture_pipelines_at_eight_iterations() {
    for (name, build) in all_fixtures() {
        for options in [peel_options(), predicate_options()] {
            let mut fixture = build(0, 8, 1);
            let mut rw = Rewriter::new(&mut fixture.func);
            let result = pipeline_for_loop(&mut rw, fixture.for_op, &options);
            assert!(result.is_ok(), "{name}: {result:?}");
        }
    }
}

// -- Failure contract --

#[test]
fn inapplicable_loop_left_untouched() {
    let mut fixture = two_stage_store(0, 1, 1);
    let original = fixture.func.clone();
    let options = peel_options();
    let mut rw = Rewriter::new(&mut fixture.func);
    let err = pipeline_for_loop(&mut rw, fixture.for_op, &options).unwrap_err();
    assert!(!err.modified_ir());
    assert_eq!(
        err,
        PipelineError::NotApplicable(NotApplicable::TooFewIterations {
            trip_count: 1,
            max_stage: 1
        })
    );
    assert_eq!(fixture.func, original);
}

#[test]
fn rerun_on_inapplicable_loop_is_a_no_op() {
    let mut fixture = two_stage_store(0, 8, 1);
    let options = PipeliningOptions::new(schedule_from_attrs).with_peel_epilogue(false);
    let original = fixture.func.clone();
    let mut rw = Rewriter::new(&mut fixture.func);
    let first = pipeline_for_loop(&mut rw, fixture.for_op, &options).unwrap_err();
    let second = pipeline_for_loop(&mut rw, fixture.for_op, &options).unwrap_err();
    assert_eq!(first, second);
    assert_eq!(first, PipelineError::NotApplicable(NotApplicable::NoDrainStrategy));
    assert_eq!(fixture.func, original);
}

#[test]
fn rejected_predicate_reports_modified_ir() {
    let mut fixture = two_stage_store(0, 8, 1);
    let options = PipeliningOptions::new(schedule_from_attrs)
        .with_peel_epilogue(false)
        .with_predicate_fn(|_, op, _| Err(PredicateRejected { op }));
    let mut rw = Rewriter::new(&mut fixture.func);
    let err = pipeline_for_loop(&mut rw, fixture.for_op, &options).unwrap_err();
    assert!(matches!(err, PipelineError::PredicateRejected { .. }));
    assert!(err.modified_ir());
    // The original loop is not replaced on failure.
    assert!(!fixture.func.is_erased(fixture.for_op));
}

// -- Callbacks --

#[test]
fn annotate_sees_every_clone() {
    let seen: Rc<RefCell<Vec<(PipelinerPart, u32)>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let options = PipeliningOptions::new(schedule_from_attrs).with_annotate_fn(move |_, _, part, index| {
        sink.borrow_mut().push((part, index));
    });
    let mut fixture = crate::test_helpers::reduction(0, 8, 1);
    let mut rw = Rewriter::new(&mut fixture.func);
    pipeline_for_loop(&mut rw, fixture.for_op, &options).unwrap();

    let seen = seen.borrow();
    let count = |part: PipelinerPart, index: u32| seen.iter().filter(|&&entry| entry == (part, index)).count();
    assert_eq!(count(PipelinerPart::Prologue, 0), 1);
    assert_eq!(count(PipelinerPart::Prologue, 1), 2);
    assert_eq!(count(PipelinerPart::Kernel, 0), 5);
    assert_eq!(count(PipelinerPart::Epilogue, 0), 4);
    assert_eq!(count(PipelinerPart::Epilogue, 1), 3);
    assert_eq!(seen.len(), 15);
}

#[test]
fn schedule_sees_the_original_loop() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&calls);
    let options = PipeliningOptions::new(move |func, for_op| {
        sink.borrow_mut().push(for_op);
        schedule_from_attrs(func, for_op)
    });
    let mut fixture = two_stage_store(0, 8, 1);
    let mut rw = Rewriter::new(&mut fixture.func);
    pipeline_for_loop(&mut rw, fixture.for_op, &options).unwrap();
    assert_eq!(*calls.borrow(), vec![fixture.for_op]);
}
