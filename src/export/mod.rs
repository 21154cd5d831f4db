pub mod dae;
pub mod partition;
pub mod xml;
