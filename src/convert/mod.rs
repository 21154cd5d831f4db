pub mod dae;
pub mod profile;
