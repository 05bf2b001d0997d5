pub mod system;
pub mod event;
pub mod template;
pub mod criterion;
pub mod score;
pub mod window;
pub mod finding;
pub mod suppressor;
pub mod usage;

pub use criterion::Criterion;
