use std::str::FromStr;

use anyhow::Result;

use crate::cmd::{Args, LogLevel};
use crate::init::logger;

pub fn init() -> Result<Args> {
    let (mut args, _remainder) = Args::parse()?;
    logger::init(
        &args.log_level.take().unwrap_or(LogLevel::from_str("info")?),
        args.colored.unwrap_or(false),
    )?;
    log::debug!("{args:?}, {_remainder:?}");

    if args.help.is_some_and(|h| h) {
        println!("{}", Args::help());
        std::process::exit(0);
    }

    Ok(args)
}
