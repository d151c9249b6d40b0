//! Property tests for the conv2d problem over random small presets.

use kbook_problems::problems::ConvStandard2dSquare;
use kbook_problems::{check_shape, evaluate, EvalConfig, EvalError, Problem};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn conv_strategy() -> impl Strategy<Value = ConvStandard2dSquare> {
    (
        (1usize..=2, 1usize..=2, 1usize..=2, 1usize..=2),
        (1usize..=3, 1usize..=9, 1usize..=9),
        (1usize..=3, 0usize..=2, 1usize..=2, any::<bool>()),
    )
        .prop_map(|((batch_size, groups, icpg, ocpg), (kernel_size, height, width), (stride, padding, dilation, bias))| {
            ConvStandard2dSquare {
                batch_size,
                in_channels: groups * icpg,
                out_channels: groups * ocpg,
                kernel_size,
                width,
                height,
                stride,
                padding,
                dilation,
                groups,
                bias,
            }
        })
}

fn quick_config() -> EvalConfig {
    EvalConfig { perf_trials: 0, ..EvalConfig::default() }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    // the documented shape is what the framework layer actually produces
    #[test]
    fn output_shape_matches_reference(problem in conv_strategy()) {
        let span = problem.dilation * (problem.kernel_size - 1) + 1;
        let fits = problem.height + 2 * problem.padding >= span
            && problem.width + 2 * problem.padding >= span;
        prop_assert_eq!(problem.validate().is_ok(), fits);

        let result = check_shape(&problem, &mut StdRng::seed_from_u64(3));
        if fits {
            prop_assert_eq!(result.unwrap(), problem.output_shape());
        } else {
            prop_assert!(matches!(result, Err(EvalError::Core(_))));
        }
    }

    #[test]
    fn kernel_solution_matches_reference(problem in conv_strategy()) {
        prop_assume!(problem.validate().is_ok());
        let report = evaluate(&problem, &quick_config()).unwrap();
        prop_assert!(report.shape_ok);
        prop_assert!(report.correct, "max_abs_diff {}", report.max_abs_diff);
    }
}
