//! The problems of the corpus, one module each.

pub mod selu;
pub mod tanh;
pub mod softplus;
pub mod triu_matmul;
pub mod conv2d;
pub mod resnet18;

pub use selu::Selu;
pub use tanh::Tanh;
pub use softplus::Softplus;
pub use triu_matmul::UpperTriangularMatmul;
pub use conv2d::ConvStandard2dSquare;
pub use resnet18::ResNet18;
