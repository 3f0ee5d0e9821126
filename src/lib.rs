//! Branchwright — static branching for workflow graphs.
//!
//! Declare a few target templates and a parameter table; get back a fully
//! named, dependency-inferred graph before anything runs. Expansions can be
//! combined back into single targets, and everything stays deterministic.

pub mod cli;
pub mod core;
