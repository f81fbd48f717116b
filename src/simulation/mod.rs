mod fluid_field;
mod grid_allocator;
mod initial_conditions;

pub use fluid_field::FluidField;
pub use grid_allocator::GridAllocator;
pub use initial_conditions::FieldInit;
