pub mod interactive;
pub mod process;
