//! The language registry: a closed set of highlightable languages, seeded
//! from the highlighter's syntax inventory at startup.

pub mod repo;
