pub mod evaluator;
pub mod persistence;
pub mod predicate;
pub mod preset;
pub mod step_expr;
pub mod step_source;
pub mod track;
