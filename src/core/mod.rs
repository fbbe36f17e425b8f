pub mod flag;
pub mod leader;
pub mod service;
pub mod supervisor;
pub mod ticker;
