//! Turn lifecycle support

pub mod cancellation;
