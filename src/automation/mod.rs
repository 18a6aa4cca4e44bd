pub mod actuator;
pub mod batch;
pub mod driver;
pub mod monitor;
pub mod session;
