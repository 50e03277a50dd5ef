//! Exercise catalog and the shared "current question" state.

pub mod catalog;
pub mod navigator;

pub use catalog::{Example, Problem, ProblemCatalog};
pub use navigator::{QuestionDeps, QuestionNavigator, QuestionView};
