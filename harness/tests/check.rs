use harness::{
    check_counts, check_elementwise, check_relative, Answer, Error, ELEMENT_TOLERANCE,
    RELATIVE_TOLERANCE,
};

#[test]
fn test_counts_accept_identical() {
    let reference = vec![10u32; 100];
    assert!(check_counts(&reference, &reference.clone(), "task-parallel").is_ok());
}

#[test]
fn test_counts_reject_single_bucket_off_by_one() {
    let reference = vec![10_000u32; 1000];
    let mut candidate = reference.clone();
    candidate[417] += 1;

    match check_counts(&reference, &candidate, "task-parallel") {
        Err(Error::WrongCount {
            label,
            index,
            expected,
            actual,
        }) => {
            assert_eq!(label, "task-parallel");
            assert_eq!(index, 417);
            assert_eq!(expected, 10_000);
            assert_eq!(actual, 10_001);
        }
        other => panic!("expected WrongCount, got {:?}", other),
    }
}

#[test]
fn test_counts_report_first_mismatch() {
    let reference = vec![1u32, 2, 3, 4];
    let candidate = vec![1u32, 0, 3, 0];
    match check_counts(&reference, &candidate, "x") {
        Err(Error::WrongCount { index, .. }) => assert_eq!(index, 1),
        other => panic!("expected WrongCount, got {:?}", other),
    }
}

#[test]
fn test_size_mismatch_names_both_sizes() {
    let err = check_counts(&[1, 2, 3], &[1, 2], "data-parallel-cpu").unwrap_err();
    match &err {
        Error::WrongSize {
            label,
            expected,
            actual,
        } => {
            assert_eq!(label, "data-parallel-cpu");
            assert_eq!(*expected, 3);
            assert_eq!(*actual, 2);
        }
        other => panic!("expected WrongSize, got {:?}", other),
    }
    assert_eq!(
        err.to_string(),
        "data-parallel-cpu answer has the wrong size: 2 instead of 3"
    );
}

#[test]
fn test_elementwise_accepts_within_tolerance() {
    let reference = vec![1.0, 2.0, 384.123456];
    let candidate = vec![1.0 + 5e-5, 2.0 - 5e-5, 384.123456 + 9e-5];
    assert!(check_elementwise(&reference, &candidate, ELEMENT_TOLERANCE, "gpu").is_ok());
}

#[test]
fn test_elementwise_rejects_beyond_tolerance() {
    let reference = vec![1.0, 2.0, 3.0];
    let candidate = vec![1.0, 2.0 + 2e-4, 3.0];
    match check_elementwise(&reference, &candidate, ELEMENT_TOLERANCE, "gpu") {
        Err(Error::WrongValue { index, .. }) => assert_eq!(index, 1),
        other => panic!("expected WrongValue, got {:?}", other),
    }
}

#[test]
fn test_elementwise_rejects_nan() {
    let reference = vec![1.0, 2.0];
    let candidate = vec![1.0, f64::NAN];
    assert!(check_elementwise(&reference, &candidate, ELEMENT_TOLERANCE, "gpu").is_err());
}

#[test]
fn test_relative_accepts_close_integral() {
    let exact = 1.0 - 1.314f64.cos();
    assert!(check_relative(exact, exact * (1.0 + 5e-4), RELATIVE_TOLERANCE, "serial").is_ok());
}

#[test]
fn test_relative_rejects_wrong_leading_digit() {
    let exact = 1.0 - 1.314f64.cos();
    let wrong = exact + 0.1;
    match check_relative(exact, wrong, RELATIVE_TOLERANCE, "data-parallel-gpu") {
        Err(Error::OutOfTolerance {
            label,
            expected,
            actual,
        }) => {
            assert_eq!(label, "data-parallel-gpu");
            assert_eq!(expected, exact);
            assert_eq!(actual, wrong);
        }
        other => panic!("expected OutOfTolerance, got {:?}", other),
    }
}

#[test]
fn test_relative_rejects_nan() {
    assert!(check_relative(0.75, f64::NAN, RELATIVE_TOLERANCE, "x").is_err());
}

#[test]
fn test_answer_trait_dispatches_policy() {
    // Same 5e-4 absolute error: fine for an element, too much for a small scalar.
    assert!(Vec::<f64>::check(&vec![0.1], &vec![0.1 + 5e-5], "m").is_ok());
    assert!(f64::check(&0.1, &(0.1 + 5e-4), "s").is_err());
    assert!(Vec::<u32>::check(&vec![3], &vec![3], "h").is_ok());
}
