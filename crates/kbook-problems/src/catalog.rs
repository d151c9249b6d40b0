//! Registry of every problem in the corpus.

use crate::problem::Problem;
use crate::problems::{ConvStandard2dSquare, ResNet18, Selu, Softplus, Tanh, UpperTriangularMatmul};

/// All problems at their published sizes.
pub fn catalog() -> Vec<Box<dyn Problem>> {
    vec![
        Box::new(Tanh::documented()),
        Box::new(Softplus::documented()),
        Box::new(Selu::documented()),
        Box::new(UpperTriangularMatmul::documented()),
        Box::new(ConvStandard2dSquare::documented()),
        Box::new(ResNet18::documented()),
    ]
}

/// All problems at test sizes.
pub fn catalog_tiny() -> Vec<Box<dyn Problem>> {
    vec![
        Box::new(Tanh::tiny()),
        Box::new(Softplus::tiny()),
        Box::new(Selu::tiny()),
        Box::new(UpperTriangularMatmul::tiny()),
        Box::new(ConvStandard2dSquare::tiny()),
        Box::new(ResNet18::tiny()),
    ]
}

fn lookup(problems: Vec<Box<dyn Problem>>, name: &str) -> Option<Box<dyn Problem>> {
    problems.into_iter().find(|p| p.spec().name == name)
}

/// Documented-size problem by name.
pub fn find(name: &str) -> Option<Box<dyn Problem>> {
    lookup(catalog(), name)
}

/// Tiny-size problem by name.
pub fn find_tiny(name: &str) -> Option<Box<dyn Problem>> {
    lookup(catalog_tiny(), name)
}
