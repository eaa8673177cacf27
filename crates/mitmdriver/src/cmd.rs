//! Declarative CLI flags for the `mitmdriverd` binary, in the same
//! `sarge!`-macro style as `httproxy::cmd::Args`/`rproxy::cmd::Args`.

use std::{net::SocketAddr, ops::{Deref, DerefMut}, str::FromStr};

use sarge::{prelude::*, ArgumentType};

use crate::impl_deref_mut;

sarge! {
    #[derive(Debug)]
    pub Args,

    /// The address `mitmdriverd` listens on.
    #ok 'b' @MITMDRIVER_BIND pub bind: BindAddr = BindAddr::from_str("127.0.0.1:8080").unwrap(),

    /// Path to the PEM certificate used to terminate client TLS for
    /// mediated tunnels. Only read if `--intercept` is set.
    #ok @MITMDRIVER_TLS_CERT pub tls_cert: String = "./certs/mitmdriver.pem".to_string(),

    /// Path to the PEM private key matching `--tls-cert`.
    #ok @MITMDRIVER_TLS_KEY pub tls_key: String = "./certs/mitmdriver-key.pem".to_string(),

    /// Mediate CONNECT tunnels with TLS instead of raw-forwarding them.
    /// A standalone `mitmdriverd` run has no interceptor chains to run
    /// anything through, but this still exercises the TLS mediation path.
    #ok pub intercept: bool = false,

    /// log level: "" means no log, v - info, vv - debug, vvv - trace
    #ok 'v' @MITMDRIVER_LOG_LEVEL pub log_level: LogLevel = LogLevel("info".into()),

    /// log with color?
    #ok pub colored: bool = false,

    /// help
    #ok 'h' pub help: bool = false,
}

#[derive(Debug)]
pub struct LogLevel(String);

impl FromStr for LogLevel {
    type Err = core::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(String::from_str(s)?))
    }
}

impl ArgumentType for LogLevel {
    type Error = ArgParseError;
    fn from_value(val: Option<&str>) -> sarge::ArgResult<Self> {
        const VERBOSE_PAT: char = 'v';

        if let Some(v) = val {
            let level_str = match v.trim().to_ascii_lowercase().as_str() {
                "off" => "off",
                "err" | "error" => "error",
                "warn" | "warning" => "warn",
                "info" => "info",
                "debug" => "debug",
                "trace" => "trace",
                s => {
                    let count = s
                        .chars()
                        .filter(|c| c.eq_ignore_ascii_case(&VERBOSE_PAT))
                        .count();
                    match count {
                        0 => "off",
                        1 => "info",
                        2 => "debug",
                        3 => "trace",
                        _ => "trace",
                    }
                }
            };

            return Ok(LogLevel(level_str.into())).into();
        }

        Ok(LogLevel("info".into())).into()
    }
}

impl_deref_mut!(LogLevel(String));

#[derive(Debug)]
pub struct BindAddr(SocketAddr);

impl ArgumentType for BindAddr {
    type Error = ArgParseError;

    fn from_value(val: Option<&str>) -> sarge::ArgResult<Self> {
        if let Some(v) = val {
            let bind_addr = SocketAddr::from_str(v).ok()?;
            return Ok(BindAddr(bind_addr)).into();
        }
        None
    }
}

impl FromStr for BindAddr {
    type Err = std::net::AddrParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(SocketAddr::from_str(s)?))
    }
}

impl_deref_mut!(BindAddr(SocketAddr));
