// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Printscout discovery engine.

use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::ScoutError;

/// Well-known option keys carried in a destination's option bag.
pub mod keys {
    pub const DEVICE_URI: &str = "device-uri";
    pub const PRINTER_INFO: &str = "printer-info";
    pub const PRINTER_LOCATION: &str = "printer-location";
    pub const PRINTER_MAKE_AND_MODEL: &str = "printer-make-and-model";
    pub const PRINTER_DEVICE_ID: &str = "printer-device-id";
    pub const PRINTER_TYPE: &str = "printer-type";
}

bitflags! {
    /// Printer capability bits (the `printer-type` value).
    ///
    /// Bit positions match the values spoolers put on the wire so a
    /// `printer-type` TXT key or IPP attribute can be taken verbatim.
    #[derive(Default, Serialize, Deserialize)]
    pub struct PrinterType: u32 {
        const CLASS = 0x0000_0001;
        const REMOTE = 0x0000_0002;
        const BW = 0x0000_0004;
        const COLOR = 0x0000_0008;
        const DUPLEX = 0x0000_0010;
        const STAPLE = 0x0000_0020;
        const COPIES = 0x0000_0040;
        const COLLATE = 0x0000_0080;
        const PUNCH = 0x0000_0100;
        const COVER = 0x0000_0200;
        const BIND = 0x0000_0400;
        const SORT = 0x0000_0800;
        /// Up to US-Legal/A4.
        const SMALL = 0x0000_1000;
        /// Up to ISO-C/A2.
        const MEDIUM = 0x0000_2000;
        /// Larger than ISO-C/A2.
        const LARGE = 0x0000_4000;
        /// Accepts custom media sizes.
        const VARIABLE = 0x0000_8000;
        const IMPLICIT = 0x0001_0000;
        /// The spooler's default destination.
        const DEFAULT = 0x0002_0000;
        const FAX = 0x0004_0000;
        const REJECTING = 0x0008_0000;
        const DELETE = 0x0010_0000;
        const NOT_SHARED = 0x0020_0000;
        const AUTHENTICATED = 0x0040_0000;
        const COMMANDS = 0x0080_0000;
        /// Found through network service discovery.
        const DISCOVERED = 0x0100_0000;
        const SCANNER = 0x0200_0000;
        /// Multi-function device.
        const MFP = 0x0400_0000;
        const PRINTER_3D = 0x0800_0000;
    }
}

impl PrinterType {
    /// Parse a `printer-type` value: decimal, `0x` hex, or leading-zero
    /// octal.  Unparseable input yields no bits.
    pub fn parse_value(value: &str) -> Self {
        let value = value.trim();
        let parsed = if let Some(hex) = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
        {
            u32::from_str_radix(hex, 16).ok()
        } else if value.len() > 1 && value.starts_with('0') {
            u32::from_str_radix(&value[1..], 8).ok()
        } else {
            value.parse().ok()
        };
        Self::from_bits_truncate(parsed.unwrap_or(0))
    }
}

/// Capability filter: the bits the caller wants, and which bits it cares
/// about at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFilter {
    pub wanted: PrinterType,
    pub mask: PrinterType,
}

impl TypeFilter {
    pub fn new(wanted: PrinterType, mask: PrinterType) -> Self {
        Self { wanted, mask }
    }

    /// Accept everything.
    pub fn any() -> Self {
        Self::default()
    }

    /// Whether a destination with the given capability bits passes.
    pub fn matches(&self, ptype: PrinterType) -> bool {
        (ptype & self.mask) == (self.wanted & self.mask)
    }

    /// The caller explicitly rejects discovered printers.
    pub fn excludes_discovered(&self) -> bool {
        self.mask.contains(PrinterType::DISCOVERED) && !self.wanted.contains(PrinterType::DISCOVERED)
    }

    /// The caller explicitly asks for nothing but locally-configured queues.
    pub fn local_only(&self) -> bool {
        self.mask.contains(PrinterType::REMOTE) && !self.wanted.contains(PrinterType::REMOTE)
    }
}

bitflags! {
    /// Flags passed with every delivery to an enumeration or resolve
    /// callback.
    #[derive(Default)]
    pub struct DeliveryFlags: u32 {
        /// More results follow immediately.
        const MORE = 0x01;
        /// The destination is being withdrawn.
        const REMOVED = 0x02;
        /// The operation failed.
        const ERROR = 0x04;
        /// A discovery reference is being resolved.
        const RESOLVING = 0x08;
        /// A connection is being established.
        const CONNECTING = 0x10;
        /// The operation was canceled.
        const CANCELED = 0x20;
    }
}

/// Reserved enumeration flags.  No bits are currently defined; pass
/// [`EnumFlags::empty`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumFlags(u32);

impl EnumFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }
}

/// Ordered option bag with unique, case-insensitive keys.
///
/// Lookup ignores insertion order; serialization preserves it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionBag(Vec<(String, String)>);

impl OptionBag {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace.  A replaced value keeps its original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.0.iter().position(|(k, _)| k.eq_ignore_ascii_case(key))?;
        Some(self.0.remove(pos).1)
    }

    /// Merge another bag into this one; incoming values win.
    pub fn merge(&mut self, other: &OptionBag) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Parse option text as written on a preference-file line.
    ///
    /// Values may be single- or double-quoted, or a `{...}` collection; a
    /// backslash escapes the next character.  A bare `name` means
    /// `name=true` and a bare `noname` means `name=false`.
    pub fn parse(text: &str) -> Self {
        let mut bag = Self::new();
        let mut chars = text.chars().peekable();
        loop {
            skip_whitespace(&mut chars);
            let mut name = String::new();
            while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
                name.push(c);
            }
            if name.is_empty() {
                break;
            }
            skip_whitespace(&mut chars);

            if chars.next_if_eq(&'=').is_none() {
                match name.get(..2) {
                    Some(prefix) if prefix.eq_ignore_ascii_case("no") && name.len() > 2 => {
                        bag.set(&name[2..], "false")
                    }
                    _ => bag.set(name, "true"),
                }
                continue;
            }

            let value = match chars.peek() {
                Some(&quote) if quote == '\'' || quote == '"' => {
                    chars.next();
                    read_quoted(&mut chars, quote)
                }
                Some('{') => read_collection(&mut chars),
                _ => read_word(&mut chars),
            };
            bag.set(name, value);
        }
        bag
    }
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>, quote: char) -> String {
    let mut value = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => value.extend(chars.next()),
            c if c == quote => break,
            c => value.push(c),
        }
    }
    value
}

/// `{...}` with nesting, kept verbatim; `},{` continues the collection.
fn read_collection(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut value = String::new();
    let mut depth = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '\\' => value.extend(chars.next()),
            '{' => {
                depth += 1;
                value.push(c);
            }
            '}' => {
                value.push(c);
                depth = depth.saturating_sub(1);
                if depth == 0 && chars.peek() != Some(&',') {
                    break;
                }
            }
            c => value.push(c),
        }
    }
    value
}

fn read_word(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut value = String::new();
    while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
        if c == '\\' {
            value.extend(chars.next());
        } else {
            value.push(c);
        }
    }
    value
}

/// A named printer or class, optionally a user-defined instance of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    pub instance: Option<String>,
    pub is_default: bool,
    pub options: OptionBag,
}

impl Destination {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: None,
            is_default: false,
            options: OptionBag::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.set(key, value);
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key)
    }

    pub fn device_uri(&self) -> Option<&str> {
        self.options.get(keys::DEVICE_URI)
    }

    /// Capability bits from the `printer-type` option (empty when absent).
    pub fn printer_type(&self) -> PrinterType {
        self.options
            .get(keys::PRINTER_TYPE)
            .map(PrinterType::parse_value)
            .unwrap_or_default()
    }

    /// Whether `reference` names this destination.
    pub fn is(&self, reference: &DestRef) -> bool {
        self.name.eq_ignore_ascii_case(&reference.name)
            && match (&self.instance, &reference.instance) {
                (None, None) => true,
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => false,
            }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}/{}", self.name, instance),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A destination entry saved in user or system preferences, with the
/// options recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDestination {
    pub reference: DestRef,
    pub options: OptionBag,
}

/// A `name[/instance]` reference to a destination, as stored in
/// preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestRef {
    pub name: String,
    pub instance: Option<String>,
}

impl DestRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: None,
        }
    }
}

impl FromStr for DestRef {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, instance) = match s.split_once('/') {
            Some((name, instance)) => (name, Some(instance)),
            None => (s, None),
        };
        if name.is_empty() {
            return Err(ScoutError::Config(format!("empty destination name in '{s}'")));
        }
        Ok(Self {
            name: name.to_string(),
            instance: instance.filter(|i| !i.is_empty()).map(String::from),
        })
    }
}

impl fmt::Display for DestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}/{}", self.name, instance),
            None => write!(f, "{}", self.name),
        }
    }
}
