pub mod evaluator;
pub mod features;
pub mod ingest;
pub mod predictor;
pub mod trainer;

pub use evaluator::*;
pub use features::*;
pub use ingest::*;
pub use predictor::*;
pub use trainer::*;
