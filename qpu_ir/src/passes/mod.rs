pub mod finalize;
pub mod register_allocation;
