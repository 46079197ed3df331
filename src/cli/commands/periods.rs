//! Explain the period grammar accepted by --period

use anyhow::Result;

use crate::cli::exit_codes;
use crate::domain::period;

pub fn run() -> Result<i32> {
    println!("{}", period::help_text());
    Ok(exit_codes::SUCCESS)
}
