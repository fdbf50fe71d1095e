pub mod executor;
pub mod paths;
pub mod privileges;
pub mod progress;

pub use executor::CommandExecutor;
