pub mod batch;
pub mod call;
pub mod send;
pub mod status;
