//! HTTP method as a typed, ordered enum.
//!
//! Covers RFC 9110 standard methods, WebDAV extensions (RFC 4918 / 4791 / 3253 / 5323),
//! and `PURGE` used by nginx and Varnish for cache invalidation.
//!
//! The derived `Ord` follows declaration order, which is also the order
//! methods are listed in an `Allow` header.

use std::fmt;
use std::str::FromStr;

macro_rules! methods {
    ($($variant:ident => $wire:literal,)+) => {
        /// A known HTTP method.
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub enum Method {
            $($variant,)+
        }

        impl Method {
            /// Returns the uppercase wire representation (e.g. `"GET"`).
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        /// Parses an uppercase method token. Case-sensitive per RFC 9110 §9.1.
        impl FromStr for Method {
            type Err = UnknownMethod;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    _ => Err(UnknownMethod(s.to_owned())),
                }
            }
        }
    };
}

methods! {
    Connect    => "CONNECT",
    Delete     => "DELETE",
    Get        => "GET",
    Head       => "HEAD",
    Options    => "OPTIONS",
    Patch      => "PATCH",
    Post       => "POST",
    Put        => "PUT",
    Trace      => "TRACE",
    Copy       => "COPY",
    Lock       => "LOCK",
    Mkcol      => "MKCOL",
    Move       => "MOVE",
    Propfind   => "PROPFIND",
    Proppatch  => "PROPPATCH",
    Unlock     => "UNLOCK",
    Mkcalendar => "MKCALENDAR",
    Report     => "REPORT",
    Search     => "SEARCH",
    Purge      => "PURGE",
}

/// A method token outside the closed [`Method`] set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown HTTP method `{0}`")]
pub struct UnknownMethod(pub String);

impl TryFrom<&http::Method> for Method {
    type Error = UnknownMethod;

    fn try_from(m: &http::Method) -> Result<Self, Self::Error> {
        m.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
