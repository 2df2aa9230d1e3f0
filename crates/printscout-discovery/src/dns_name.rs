// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DNS-SD naming: service categories, escaped full names, and `dnssd://`
// discovery references.
//
// A discovery reference is a symbolic device URI whose host encodes the
// service instance, registration type and domain:
//
//   dnssd://Office%20Laser._ipps._tcp.local./cups?uuid=...
//
// It is stored in a destination's `device-uri` option and later turned into
// a connectable `ipp://host:port/path` by the resolver.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use url::Url;

use printscout_core::error::{Result, ScoutError};

/// URI scheme of discovery references.
pub const DNSSD_SCHEME: &str = "dnssd";

/// The most-local DNS-SD scope.
pub const LOCAL_DOMAIN: &str = "local.";

/// Characters left unescaped in the instance part of a reference host.
/// `.` is escaped so the instance/regtype boundary stays unambiguous.
const INSTANCE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'~');

/// The two printer service categories that are browsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceCategory {
    /// Plain IPP (`_ipp._tcp`).
    Plain,
    /// IPP over TLS (`_ipps._tcp`).
    Secure,
}

impl ServiceCategory {
    pub fn reg_type(&self) -> &'static str {
        match self {
            Self::Plain => "_ipp._tcp",
            Self::Secure => "_ipps._tcp",
        }
    }

    /// Map a registration type (trailing dot optional) to a category.
    pub fn from_reg_type(reg_type: &str) -> Option<Self> {
        let reg_type = reg_type.trim_end_matches('.');
        if reg_type.eq_ignore_ascii_case("_ipp._tcp") {
            Some(Self::Plain)
        } else if reg_type.eq_ignore_ascii_case("_ipps._tcp") {
            Some(Self::Secure)
        } else {
            None
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reg_type())
    }
}

/// URI scheme to use when connecting to a service of this registration type.
pub fn scheme_for_reg_type(reg_type: &str) -> Option<&'static str> {
    let reg_type = reg_type.trim_end_matches('.').to_ascii_lowercase();
    match reg_type.as_str() {
        "_ipp._tcp" => Some("ipp"),
        "_ipps._tcp" => Some("ipps"),
        "_printer._tcp" => Some("lpd"),
        "_pdl-datastream._tcp" => Some("socket"),
        _ => None,
    }
}

/// Whether `domain` is the most-local scope.
pub fn is_local_domain(domain: &str) -> bool {
    domain.trim_end_matches('.').eq_ignore_ascii_case("local")
}

/// Append the root `.` if missing.
pub fn normalize_domain(domain: &str) -> String {
    if domain.is_empty() {
        LOCAL_DOMAIN.to_string()
    } else if domain.ends_with('.') {
        domain.to_string()
    } else {
        format!("{domain}.")
    }
}

/// One advertised service: instance name, registration type, domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceRef {
    pub name: String,
    pub reg_type: String,
    pub domain: String,
}

impl ServiceRef {
    pub fn new(name: impl Into<String>, reg_type: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reg_type: reg_type.into().trim_end_matches('.').to_string(),
            domain: normalize_domain(&domain.into()),
        }
    }

    pub fn category(&self) -> Option<ServiceCategory> {
        ServiceCategory::from_reg_type(&self.reg_type)
    }

    pub fn is_local(&self) -> bool {
        is_local_domain(&self.domain)
    }

    /// Escaped full DNS name used for record queries,
    /// e.g. `Office\032Laser._ipp._tcp.local.`
    pub fn full_name(&self) -> String {
        format!("{}.{}.{}", escape_label(&self.name), self.reg_type, self.domain)
    }

    /// Parse an escaped full DNS name back into its parts.
    pub fn from_full_name(full_name: &str) -> Option<Self> {
        let boundary = first_unescaped_dot(full_name)?;
        let name = unquote(&full_name[..boundary]);
        let rest = &full_name[boundary + 1..];

        // Registration type is the next two labels (`_service._proto`).
        let mut labels = rest.splitn(3, '.');
        let service = labels.next()?;
        let proto = labels.next()?;
        if !service.starts_with('_') || !proto.starts_with('_') {
            return None;
        }
        let domain = labels.next().unwrap_or("");
        Some(Self::new(name, format!("{service}.{proto}"), domain))
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.name, self.reg_type, self.domain)
    }
}

/// Escape an instance label the way DNS-SD full names expect: `.` and `\`
/// get a backslash, control bytes, space and DEL become `\DDD`.
pub fn escape_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len() + 8);
    for c in label.chars() {
        match c {
            '.' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) <= 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\{:03}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Reverse DNS-SD escaping: `\DDD` is a decimal byte, `\c` is `c`.
pub fn unquote(escaped: &str) -> String {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            let digits = &bytes[i + 1..(i + 4).min(bytes.len())];
            if digits.len() == 3 && digits.iter().all(u8::is_ascii_digit) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));
                out.push(value.min(255) as u8);
                i += 4;
            } else {
                out.push(bytes[i + 1]);
                i += 2;
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn first_unescaped_dot(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'.' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// A parsed `dnssd://` device URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRef {
    pub service: ServiceRef,
    /// Resource path, `/` or `/cups` for shared spooler queues.
    pub path: String,
    /// Optional device UUID filter carried in the `uuid=` parameter.
    pub uuid: Option<String>,
}

impl DiscoveryRef {
    pub fn new(service: ServiceRef, shared_queue: bool, uuid: Option<String>) -> Self {
        Self {
            service,
            path: if shared_queue { "/cups".into() } else { "/".into() },
            uuid,
        }
    }

    /// Whether `uri` has the discovery-reference shape at all.
    pub fn is_discovery_uri(uri: &str) -> bool {
        uri.len() > DNSSD_SCHEME.len() + 3
            && uri
                .get(..DNSSD_SCHEME.len() + 3)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("dnssd://"))
    }

    /// Split a discovery reference into service, path, and `uuid=` filter.
    pub fn parse(uri: &str) -> Result<Self> {
        if !Self::is_discovery_uri(uri) {
            return Err(ScoutError::InvalidReference(format!("not a dnssd URI: {uri}")));
        }

        let url = Url::parse(uri)
            .map_err(|e| ScoutError::InvalidReference(format!("{uri}: {e}")))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ScoutError::InvalidReference(format!("{uri}: missing host")))?;

        // The instance ends at the first "._" (start of the registration type).
        let boundary = host
            .find("._")
            .ok_or_else(|| ScoutError::InvalidReference(format!("{uri}: no registration type")))?;
        let name = percent_decode_str(&host[..boundary])
            .decode_utf8()
            .map_err(|e| ScoutError::InvalidReference(format!("{uri}: {e}")))?;

        let rest = &host[boundary + 1..];
        let mut labels = rest.splitn(3, '.');
        let (service, proto) = match (labels.next(), labels.next()) {
            (Some(s), Some(p)) if s.starts_with('_') && p.starts_with('_') => (s, p),
            _ => {
                return Err(ScoutError::InvalidReference(format!(
                    "{uri}: malformed registration type"
                )));
            }
        };
        let domain = labels.next().unwrap_or("");

        let uuid = url
            .query_pairs()
            .find(|(k, _)| k.eq_ignore_ascii_case("uuid"))
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty());

        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            service: ServiceRef::new(name.into_owned(), format!("{service}.{proto}"), domain),
            path,
            uuid,
        })
    }

    pub fn to_uri(&self) -> String {
        let mut uri = format!(
            "{DNSSD_SCHEME}://{}.{}.{}{}",
            utf8_percent_encode(&self.service.name, INSTANCE_ENCODE_SET),
            self.service.reg_type,
            self.service.domain,
            self.path
        );
        if let Some(uuid) = &self.uuid {
            uri.push_str("?uuid=");
            uri.push_str(&utf8_percent_encode(uuid, INSTANCE_ENCODE_SET).to_string());
        }
        uri
    }
}
