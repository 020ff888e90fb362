pub mod args;

use clap::Parser;
pub use args::{Arguments, Module, Subassembler};

pub fn parse() -> Arguments {
    Arguments::parse()
}
