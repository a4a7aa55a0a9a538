pub mod runtime;
pub mod session;

pub use runtime::{Runtime, RuntimeBuilder};
