pub mod evaluator;

pub use evaluator::{AreaSource, EyeAssessment, EyeEvaluator, Validity};
