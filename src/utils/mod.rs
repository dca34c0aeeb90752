pub mod gauge;
pub mod scope_guard;
