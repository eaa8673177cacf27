//! An intercepting HTTP/HTTPS proxy for embedding into WebDriver-style
//! test harnesses: plain HTTP is forwarded directly, HTTPS is tunnelled
//! via `CONNECT`, and when an interceptor is configured both directions
//! are decrypted through single-certificate TLS mediation and run
//! through a declarative, ordered, per-field rewrite chain before being
//! relayed.

#[macro_export]
macro_rules! impl_deref_mut {
    (
        $struct:ident ( $target:ident )
    ) => {
        impl Deref for $struct {
            type Target = $target;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl DerefMut for $struct {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }
    };
}

pub mod cmd;
pub mod init;

mod chain;
mod dispatcher;
mod error;
mod field;
mod forward;
mod interceptor;
mod message;
mod prefixed;
mod proxy;
mod registry;
mod rule;
mod tls;
mod upstream;

pub use chain::{Chain, ChainBuilder, Verdict};
pub use error::{ProxyError, Result, TransformError};
pub use field::{Field, Value};
pub use interceptor::{Interceptor, Outcome};
pub use message::{Message, RequestMessage, ResponseMessage};
pub use proxy::{Proxy, ProxyBuilder};
pub use rule::{Action, PredicateFn, Rule, TransformFn};
pub use tls::TlsMaterial;
