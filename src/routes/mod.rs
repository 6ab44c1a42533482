pub mod health;
pub mod jobs;
pub mod model_calls;
pub mod sweeps;
