pub mod backend;
pub mod classifier;
pub mod conditions;
pub mod datatypes;
pub mod engine;
pub mod error;
pub mod mesh;
pub mod orchestrator;
pub mod post_processor;
pub mod quadrature;
pub mod settings;
pub mod stl;
