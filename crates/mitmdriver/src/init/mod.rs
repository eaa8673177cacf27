//! Process-level bootstrap for the `mitmdriverd` binary: CLI parsing,
//! logger setup, and Ctrl-C-driven shutdown, mirroring the `init` module
//! every donor crate in this workspace carries.

pub mod cmd;
pub mod logger;
pub mod shutdown;
