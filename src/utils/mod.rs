pub mod barrnap;
pub mod command;
pub mod fastx;
pub mod file;
pub mod prokaryotes;
pub mod sequence;
pub mod srafind;
pub mod stats;
pub mod status;
pub mod streams;
pub mod system;
