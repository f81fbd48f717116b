pub mod binding_builder;
pub mod binding_types;
pub mod pipelines;
pub mod shader;
pub mod uniformbuffer;
