// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TXT metadata parser.
//
// A TXT blob is a run of entries, each a one-byte length followed by that
// many bytes of `key=value`.  Parsing never fails: an entry that claims more
// bytes than remain ends the parse and whatever was read so far stands.

use printscout_core::types::PrinterType;

/// Iterator over the raw entries of a TXT blob.
#[derive(Debug, Clone)]
pub struct TxtEntries<'a> {
    data: &'a [u8],
}

impl<'a> TxtEntries<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for TxtEntries<'a> {
    /// `(key, value)`; the value is `None` for an entry without `=`.
    type Item = (&'a str, Option<&'a [u8]>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (&len, rest) = self.data.split_first()?;
            let len = usize::from(len);
            if len == 0 || len > rest.len() {
                self.data = &[];
                return None;
            }
            let (entry, rest) = rest.split_at(len);
            self.data = rest;

            let (key, value) = match entry.iter().position(|&b| b == b'=') {
                Some(eq) => (&entry[..eq], Some(&entry[eq + 1..])),
                None => (entry, None),
            };
            // Keys must be printable ASCII; anything else is skipped.
            match std::str::from_utf8(key) {
                Ok(key) if !key.is_empty() && key.is_ascii() => return Some((key, value)),
                _ => continue,
            }
        }
    }
}

/// Printer facts extracted from a TXT blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxtFacts {
    pub make_and_model: String,
    /// IEEE-1284 device id (`MFG:...;MDL:...;`).
    pub device_id: String,
    pub location: Option<String>,
    pub uuid: Option<String>,
    /// Remote resource path from `rp`, normalised to start with `/`.
    pub remote_path: Option<String>,
    pub printer_type: PrinterType,
    /// An authoritative `printer-type` key was present.
    pub has_printer_type: bool,
    /// Whether the `pdl` list names a format we can send.  A missing `pdl`
    /// key counts as compatible.
    pub compatible: bool,
}

impl TxtFacts {
    /// Discovery references for shared spooler queues use the `/cups` path.
    pub fn is_shared_queue(&self) -> bool {
        self.has_printer_type
    }
}

fn flag(value: Option<&[u8]>) -> bool {
    matches!(value, Some(v) if v.eq_ignore_ascii_case(b"t") || v.eq_ignore_ascii_case(b"true"))
}

fn text(value: Option<&[u8]>) -> String {
    value
        .map(|v| String::from_utf8_lossy(v).trim().to_string())
        .unwrap_or_default()
}

/// Parse a TXT blob against the caller's document-format allow-list.
pub fn parse_txt(data: &[u8], document_formats: &[String]) -> TxtFacts {
    let mut facts = TxtFacts {
        compatible: true,
        ..Default::default()
    };
    let mut legacy = PrinterType::BW;
    let mut manufacturer = String::new();
    let mut usb_model = String::new();
    let mut product = String::new();
    let mut ty = String::new();
    let mut usb_fields: Vec<(String, String)> = Vec::new();

    for (key, value) in TxtEntries::new(data) {
        let lower = key.to_ascii_lowercase();
        match lower.as_str() {
            "usb_mfg" | "usb_manu" | "usb_manufacturer" => manufacturer = text(value),
            "usb_mdl" | "usb_model" => usb_model = text(value),
            "product" => {
                let value = text(value);
                let value = value
                    .strip_prefix('(')
                    .and_then(|v| v.strip_suffix(')'))
                    .unwrap_or(&value)
                    .to_string();
                if !value.to_ascii_lowercase().contains("ghostscript") {
                    product = value;
                }
            }
            "ty" => {
                let value = text(value);
                ty = value.split(',').next().unwrap_or_default().trim().to_string();
            }
            "note" => facts.location = Some(text(value)).filter(|v| !v.is_empty()),
            "uuid" => facts.uuid = Some(text(value)).filter(|v| !v.is_empty()),
            "rp" => {
                let value = text(value);
                facts.remote_path = Some(if value.starts_with('/') {
                    value
                } else {
                    format!("/{value}")
                });
            }
            "pdl" => {
                let value = text(value);
                facts.compatible = value.split(',').map(str::trim).any(|format| {
                    document_formats
                        .iter()
                        .any(|wanted| wanted.eq_ignore_ascii_case(format))
                });
            }
            "printer-type" => {
                facts.printer_type =
                    PrinterType::parse_value(&text(value)) | PrinterType::NOT_SHARED;
                facts.has_printer_type = true;
            }
            "air" => {
                let value = text(value);
                if !value.is_empty() && !value.eq_ignore_ascii_case("none") {
                    legacy |= PrinterType::AUTHENTICATED;
                }
            }
            "bind" if flag(value) => legacy |= PrinterType::BIND,
            "collate" if flag(value) => legacy |= PrinterType::COLLATE,
            "color" if flag(value) => legacy |= PrinterType::COLOR,
            "copies" if flag(value) => legacy |= PrinterType::COPIES,
            "duplex" if flag(value) => legacy |= PrinterType::DUPLEX,
            "fax" if flag(value) => legacy |= PrinterType::MFP,
            "papercustom" if flag(value) => legacy |= PrinterType::VARIABLE,
            "punch" if flag(value) => legacy |= PrinterType::PUNCH,
            "sort" if flag(value) => legacy |= PrinterType::SORT,
            "staple" if flag(value) => legacy |= PrinterType::STAPLE,
            "papermax" => {
                let value = text(value).to_ascii_lowercase();
                match value.as_str() {
                    "legal-a4" => legacy |= PrinterType::SMALL,
                    "isoc-a2" => legacy |= PrinterType::MEDIUM | PrinterType::SMALL,
                    ">isoc-a2" => {
                        legacy |= PrinterType::LARGE | PrinterType::MEDIUM | PrinterType::SMALL
                    }
                    _ => {}
                }
            }
            _ => {}
        }

        if lower.starts_with("usb_") {
            usb_fields.push((key[4..].to_ascii_uppercase(), text(value)));
        }
    }

    if !facts.has_printer_type {
        facts.printer_type = legacy;
    }
    facts.printer_type |= PrinterType::DISCOVERED;

    let model = [usb_model, product, ty]
        .into_iter()
        .find(|m| !m.is_empty())
        .unwrap_or_default();
    facts.make_and_model = if model.is_empty() {
        if manufacturer.is_empty() {
            "Unknown".to_string()
        } else {
            manufacturer.clone()
        }
    } else if manufacturer.is_empty()
        || model
            .to_ascii_lowercase()
            .starts_with(&manufacturer.to_ascii_lowercase())
    {
        model
    } else {
        format!("{manufacturer} {model}")
    };

    facts.device_id = if usb_fields.is_empty() {
        let (make, model) = match facts.make_and_model.split_once(' ') {
            Some((make, model)) => (make, model),
            None => (facts.make_and_model.as_str(), ""),
        };
        let make = if manufacturer.is_empty() { make } else { manufacturer.as_str() };
        format!("MFG:{make};MDL:{model};")
    } else {
        usb_fields
            .iter()
            .map(|(k, v)| format!("{k}:{v};"))
            .collect()
    };

    facts
}

/// Encode `key=value` pairs as a TXT blob.  Entries longer than 255 bytes
/// are dropped.
pub fn encode_txt<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in pairs {
        let entry = if value.is_empty() {
            key.to_string()
        } else {
            format!("{key}={value}")
        };
        if let Ok(len) = u8::try_from(entry.len()) {
            out.push(len);
            out.extend_from_slice(entry.as_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats() -> Vec<String> {
        vec!["application/pdf".into(), "image/urf".into()]
    }

    #[test]
    fn make_and_model_from_usb_keys() {
        let blob = encode_txt([
            ("usb_MFG", "HP"),
            ("usb_MDL", "LaserJet 400"),
            ("note", "Room 3"),
            ("pdl", "application/postscript, application/pdf"),
        ]);
        let facts = parse_txt(&blob, &formats());
        assert_eq!(facts.make_and_model, "HP LaserJet 400");
        assert_eq!(facts.device_id, "MFG:HP;MDL:LaserJet 400;");
        assert_eq!(facts.location.as_deref(), Some("Room 3"));
        assert!(facts.compatible);
    }

    #[test]
    fn product_parens_stripped_and_ghostscript_ignored() {
        let blob = encode_txt([("product", "(Epson WF-3720)")]);
        assert_eq!(parse_txt(&blob, &formats()).make_and_model, "Epson WF-3720");

        let blob = encode_txt([("product", "(GPL Ghostscript)"), ("ty", "Brother HL-L2350DW, 1.2")]);
        let facts = parse_txt(&blob, &formats());
        assert_eq!(facts.make_and_model, "Brother HL-L2350DW");
        assert_eq!(facts.device_id, "MFG:Brother;MDL:HL-L2350DW;");
    }

    #[test]
    fn unknown_model_when_nothing_advertised() {
        let facts = parse_txt(&encode_txt([("txtvers", "1")]), &formats());
        assert_eq!(facts.make_and_model, "Unknown");
        assert!(facts.compatible);
        assert!(facts.printer_type.contains(PrinterType::DISCOVERED));
    }

    #[test]
    fn legacy_flags_fold_into_bits() {
        let blob = encode_txt([
            ("Color", "T"),
            ("Duplex", "F"),
            ("Staple", "true"),
            ("Fax", "T"),
            ("papermax", "isoc-a2"),
            ("air", "username,password"),
        ]);
        let ptype = parse_txt(&blob, &formats()).printer_type;
        assert!(ptype.contains(PrinterType::COLOR | PrinterType::STAPLE | PrinterType::MFP));
        assert!(ptype.contains(PrinterType::MEDIUM | PrinterType::SMALL));
        assert!(ptype.contains(PrinterType::AUTHENTICATED));
        assert!(!ptype.contains(PrinterType::DUPLEX));
        assert!(!ptype.contains(PrinterType::LARGE));
    }

    #[test]
    fn printer_type_is_authoritative() {
        let blob = encode_txt([("color", "T"), ("printer-type", "0x801C"), ("duplex", "T")]);
        let facts = parse_txt(&blob, &formats());
        assert!(facts.has_printer_type);
        assert!(facts.is_shared_queue());
        assert_eq!(
            facts.printer_type,
            PrinterType::from_bits_truncate(0x801C)
                | PrinterType::NOT_SHARED
                | PrinterType::DISCOVERED
        );
    }

    #[test]
    fn pdl_without_known_format_is_incompatible() {
        let blob = encode_txt([("pdl", "application/vnd.hp-PCL,application/postscript")]);
        assert!(!parse_txt(&blob, &formats()).compatible);

        let blob = encode_txt([("pdl", "IMAGE/URF")]);
        assert!(parse_txt(&blob, &formats()).compatible);
    }

    #[test]
    fn truncated_final_entry_is_ignored() {
        let mut blob = encode_txt([("note", "Lobby"), ("color", "T")]);
        let complete = parse_txt(&blob, &formats());

        blob.push(40);
        blob.extend_from_slice(b"pdl=application/x-unknown");
        let truncated = parse_txt(&blob, &formats());
        assert_eq!(truncated, complete);
    }

    #[test]
    fn entries_without_value_are_skipped() {
        let blob = encode_txt([("flagonly", ""), ("rp", "ipp/print")]);
        let entries: Vec<_> = TxtEntries::new(&blob).collect();
        assert_eq!(entries[0], ("flagonly", None));
        assert_eq!(parse_txt(&blob, &formats()).remote_path.as_deref(), Some("/ipp/print"));
    }

    #[test]
    fn empty_blob() {
        assert_eq!(TxtEntries::new(&[]).count(), 0);
        assert_eq!(TxtEntries::new(&[0]).count(), 0);
    }
}
