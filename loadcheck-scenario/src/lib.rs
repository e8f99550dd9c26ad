//! Declarative scenarios for loadcheck
//!
//! A scenario file describes the load mix and the pre-test checks as lists
//! of steps: templated HTTP actions with status, redirect and structural
//! expectations, session resets and account registrations. Files are
//! compiled once; every attempt renders the templates for its leased user.

pub mod error;
pub mod model;
pub mod scenario;
pub mod template;

mod step;

pub use error::{ScenarioError, ScenarioResult};
pub use model::ScenarioFile;
pub use scenario::{DeclarativeScenario, ScenarioSet};
pub use template::{Bindings, Template};
