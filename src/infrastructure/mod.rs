pub mod mock;
pub mod risk;
