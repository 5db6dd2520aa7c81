pub mod batch;
pub mod estimate;
pub mod info;
pub mod simulate;
pub mod validate;
