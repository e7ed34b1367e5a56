//! Client-side grading core.
//!
//! Raw test cases flow through the [`adapter`] (which uses the
//! [`normalizer`]) into the [`executor`], which runs each case on the
//! [`engine`] sandbox and judges it with the [`evaluator`].

pub mod adapter;
pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod normalizer;

pub use adapter::adapt;
pub use engine::{JsSandbox, Sandbox, SandboxConfig, SandboxError};
pub use evaluator::{canonicalize, equal, serialize_value};
pub use executor::SuiteRunner;
pub use normalizer::{normalize, normalize_arguments};
