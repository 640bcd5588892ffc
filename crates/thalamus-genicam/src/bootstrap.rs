//! Port-URL bootstrap: fetch the zipped GenICam XML register map named by
//! a device's `GCGetPortURL` and turn it into a [`RegisterNode`] map.
//!
//! The URL is `local:<file>;<address>;<size>` for transports that expose
//! the map inline over the same register port (the common case for USB3
//! Vision / GigE Vision producers); we read that byte range, unzip it with
//! the `zip` crate, and parse the single XML entry inside with
//! `quick-xml`. A module that fails any step here is disabled rather than
//! left half-configured (see `NEO_DATA`/load-failure policy in
//! `SPEC_FULL.md` §6).

use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{GenicamError, Result};
use crate::expr::Expr;
use crate::register::{
    AccessMode, Command, CommandValue, Converter, Enumeration, Float, FloatReg, Integer, IntConverter, IntReg,
    IntSwissKnife, RegisterNode, StringReg, SwissKnife,
};

/// A parsed `local:<name>;<address-hex>;<size-hex>` port URL.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPortUrl {
    pub file_name: String,
    pub address: u64,
    pub size: usize,
}

pub fn parse_port_url(url: &str) -> Result<LocalPortUrl> {
    let rest = url
        .strip_prefix("local:")
        .ok_or_else(|| GenicamError::Parse(format!("unsupported port URL scheme: {url}")))?;
    let parts: Vec<&str> = rest.split(';').collect();
    if parts.len() != 3 {
        return Err(GenicamError::Parse(format!("malformed local port URL: {url}")));
    }
    let address = u64::from_str_radix(parts[1].trim_start_matches("0x"), 16)
        .map_err(|_| GenicamError::Parse(format!("bad address in port URL: {url}")))?;
    let size = usize::from_str_radix(parts[2].trim_start_matches("0x"), 16)
        .map_err(|_| GenicamError::Parse(format!("bad size in port URL: {url}")))?;
    Ok(LocalPortUrl { file_name: parts[0].to_string(), address, size })
}

/// Unzip the register-map archive and return the single XML document
/// inside it (GenICam producers package exactly one `.xml` member).
pub fn extract_register_xml(zip_bytes: &[u8]) -> Result<String> {
    let reader = Cursor::new(zip_bytes);
    let mut archive = zip::ZipArchive::new(reader).map_err(|e| GenicamError::Parse(format!("bad zip archive: {e}")))?;
    if archive.is_empty() {
        return Err(GenicamError::Parse("register map archive is empty".into()));
    }
    let mut file = archive.by_index(0).map_err(|e| GenicamError::Parse(format!("bad zip entry: {e}")))?;
    let mut xml = String::new();
    file.read_to_string(&mut xml).map_err(|e| GenicamError::Parse(format!("bad xml contents: {e}")))?;
    Ok(xml)
}

#[derive(Default)]
struct NodeBuilder {
    kind: String,
    name: String,
    value: Option<String>,
    p_value: Option<String>,
    address: Option<u64>,
    p_address: Option<String>,
    int_swiss_knife: Option<String>,
    length: Option<usize>,
    access_mode: Option<AccessMode>,
    sign_unsigned: bool,
    little_endian: bool,
    lsb: Option<u32>,
    msb: Option<u32>,
    min: Option<String>,
    max: Option<String>,
    inc: Option<String>,
    formula: Option<String>,
    formula_to: Option<String>,
    formula_from: Option<String>,
    dependencies: Vec<String>,
    enum_entries: HashMap<String, i64>,
    current_enum_entry: Option<String>,
    literal_int: Option<i64>,
    literal_float: Option<f64>,
    literal_str: Option<String>,
}

/// Parse a GenICam register-map XML document into a flat symbol table.
/// Supports the node kinds the register model understands
/// (`IntReg`/`StringReg`/`FloatReg`/`Integer`/`Float`/`Enumeration`/
/// `SwissKnife`/`IntSwissKnife`/`Converter`/`IntConverter`/`Command`); tags
/// like `Category`/`Group`/`Port` that are purely organizational in the
/// GenICam schema are walked over and dropped.
pub fn parse_register_map(xml: &str) -> Result<HashMap<String, RegisterNode>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut nodes = HashMap::new();
    let mut stack: Vec<NodeBuilder> = Vec::new();
    let mut text_target: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                if is_node_kind(&name) {
                    let mut builder = NodeBuilder { kind: name.clone(), ..Default::default() };
                    for attr in tag.attributes().flatten() {
                        if attr.key.as_ref() == b"Name" {
                            builder.name = String::from_utf8_lossy(&attr.value).into_owned();
                        }
                    }
                    stack.push(builder);
                } else {
                    text_target = Some(name);
                }
            }
            Ok(Event::Empty(tag)) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                if name == "EnumEntry" {
                    if let Some(top) = stack.last_mut() {
                        for attr in tag.attributes().flatten() {
                            if attr.key.as_ref() == b"Name" {
                                top.current_enum_entry = Some(String::from_utf8_lossy(&attr.value).into_owned());
                            }
                        }
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let content = text.unescape().unwrap_or_default().trim().to_string();
                if content.is_empty() {
                    continue;
                }
                if let (Some(field), Some(top)) = (&text_target, stack.last_mut()) {
                    apply_field(top, field, &content);
                }
            }
            Ok(Event::End(tag)) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                if name == "EnumEntry" {
                    if let Some(top) = stack.last_mut() {
                        top.current_enum_entry = None;
                    }
                } else if is_node_kind(&name) {
                    if let Some(builder) = stack.pop() {
                        let node_name = builder.name.clone();
                        match build_node(builder) {
                            Ok(node) => {
                                nodes.insert(node_name, node);
                            }
                            Err(e) => {
                                tracing::warn!(node = %node_name, error = %e, "skipping unparseable register node");
                            }
                        }
                    }
                } else {
                    text_target = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(GenicamError::Parse(format!("xml error: {e}"))),
            _ => {}
        }
    }

    Ok(nodes)
}

fn is_node_kind(tag: &str) -> bool {
    matches!(
        tag,
        "IntReg"
            | "StringReg"
            | "FloatReg"
            | "Integer"
            | "Float"
            | "Enumeration"
            | "SwissKnife"
            | "IntSwissKnife"
            | "Converter"
            | "IntConverter"
            | "Command"
    )
}

fn apply_field(builder: &mut NodeBuilder, field: &str, content: &str) {
    match field {
        "Value" => {
            if let Some(entry) = builder.current_enum_entry.clone() {
                if let Ok(v) = content.parse::<i64>() {
                    builder.enum_entries.insert(entry, v);
                }
            } else {
                builder.value = Some(content.to_string());
                builder.literal_int = content.parse::<i64>().ok();
                builder.literal_float = content.parse::<f64>().ok();
                builder.literal_str = Some(content.to_string());
            }
        }
        "pValue" => builder.p_value = Some(content.to_string()),
        "Address" => builder.address = u64::from_str_radix(content.trim_start_matches("0x"), 16).ok(),
        "pAddress" => builder.p_address = Some(content.to_string()),
        "IntSwissKnife" | "pIntSwissKnife" => builder.int_swiss_knife = Some(content.to_string()),
        "Length" => builder.length = content.parse().ok(),
        "AccessMode" => {
            builder.access_mode = Some(match content {
                "RO" => AccessMode::Ro,
                "WO" => AccessMode::Wo,
                _ => AccessMode::Rw,
            })
        }
        "Sign" => builder.sign_unsigned = content == "Unsigned",
        "Endianess" | "Endianness" => builder.little_endian = content != "BigEndian",
        "LSB" => builder.lsb = content.parse().ok(),
        "MSB" => builder.msb = content.parse().ok(),
        "pMin" => builder.min = Some(content.to_string()),
        "pMax" => builder.max = Some(content.to_string()),
        "pInc" => builder.inc = Some(content.to_string()),
        "Formula" => builder.formula = Some(content.to_string()),
        "FormulaTo" => builder.formula_to = Some(content.to_string()),
        "FormulaFrom" => builder.formula_from = Some(content.to_string()),
        "pVariable" => builder.dependencies.push(content.to_string()),
        _ => {}
    }
}

fn build_node(b: NodeBuilder) -> Result<RegisterNode> {
    match b.kind.as_str() {
        "IntReg" => Ok(RegisterNode::IntReg(IntReg {
            address: b.address.ok_or_else(|| GenicamError::Parse("IntReg missing Address".into()))?,
            p_address: b.p_address,
            int_swiss_knife: b.int_swiss_knife,
            length: b.length.unwrap_or(4),
            little_endian: b.little_endian,
            unsigned: b.sign_unsigned,
            access_mode: b.access_mode.unwrap_or(AccessMode::Rw),
            lsb: b.lsb,
            msb: b.msb,
        })),
        "StringReg" => Ok(RegisterNode::StringReg(StringReg {
            address: b.address.ok_or_else(|| GenicamError::Parse("StringReg missing Address".into()))?,
            p_address: b.p_address,
            int_swiss_knife: b.int_swiss_knife,
            length: b.length.unwrap_or(64),
            access_mode: b.access_mode.unwrap_or(AccessMode::Rw),
        })),
        "FloatReg" => Ok(RegisterNode::FloatReg(FloatReg {
            address: b.address.ok_or_else(|| GenicamError::Parse("FloatReg missing Address".into()))?,
            p_address: b.p_address,
            int_swiss_knife: b.int_swiss_knife,
            length: b.length.unwrap_or(4),
            little_endian: b.little_endian,
            access_mode: b.access_mode.unwrap_or(AccessMode::Rw),
        })),
        "Integer" => Ok(RegisterNode::Integer(Integer {
            value: b.p_value.or(b.value).ok_or_else(|| GenicamError::Parse("Integer missing pValue".into()))?,
            min: b.min,
            max: b.max,
            inc: b.inc,
        })),
        "Float" => Ok(RegisterNode::Float(Float {
            value: b.p_value.or(b.value).ok_or_else(|| GenicamError::Parse("Float missing pValue".into()))?,
            min: b.min,
            max: b.max,
            inc: b.inc,
        })),
        "Enumeration" => Ok(RegisterNode::Enumeration(Enumeration {
            value: b.p_value.or(b.value).ok_or_else(|| GenicamError::Parse("Enumeration missing pValue".into()))?,
            entries: b.enum_entries,
        })),
        "SwissKnife" => Ok(RegisterNode::SwissKnife(SwissKnife {
            formula: Expr::parse(&b.formula.ok_or_else(|| GenicamError::Parse("SwissKnife missing Formula".into()))?)?,
            dependencies: b.dependencies,
        })),
        "IntSwissKnife" => Ok(RegisterNode::IntSwissKnife(IntSwissKnife {
            formula: Expr::parse(
                &b.formula.ok_or_else(|| GenicamError::Parse("IntSwissKnife missing Formula".into()))?,
            )?,
            dependencies: b.dependencies,
        })),
        "Converter" => Ok(RegisterNode::Converter(Converter {
            value: b.p_value.ok_or_else(|| GenicamError::Parse("Converter missing pValue".into()))?,
            formula_to: Expr::parse(&b.formula_to.unwrap_or_else(|| "FROM".to_string()))?,
            formula_from: Expr::parse(&b.formula_from.unwrap_or_else(|| "TO".to_string()))?,
        })),
        "IntConverter" => Ok(RegisterNode::IntConverter(IntConverter {
            value: b.p_value.ok_or_else(|| GenicamError::Parse("IntConverter missing pValue".into()))?,
            formula_to: Expr::parse(&b.formula_to.unwrap_or_else(|| "FROM".to_string()))?,
            formula_from: Expr::parse(&b.formula_from.unwrap_or_else(|| "TO".to_string()))?,
        })),
        "Command" => Ok(RegisterNode::Command(Command {
            command_value: match (b.p_value, b.literal_int) {
                (Some(reg), _) => CommandValue::Register(reg),
                (None, Some(v)) => CommandValue::Literal(v),
                _ => CommandValue::Literal(1),
            },
        })),
        other => Err(GenicamError::Parse(format!("unsupported node kind {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_port_url() {
        let parsed = parse_port_url("local:regmap.zip;0x10000;0x4000").unwrap();
        assert_eq!(parsed.file_name, "regmap.zip");
        assert_eq!(parsed.address, 0x10000);
        assert_eq!(parsed.size, 0x4000);
    }

    #[test]
    fn parses_int_reg_and_integer_wrapper() {
        let xml = r#"
            <RegisterDescription>
              <IntReg Name="RawGain">
                <Address>0x2000</Address>
                <Length>4</Length>
                <AccessMode>RW</AccessMode>
                <Sign>Unsigned</Sign>
                <Endianess>LittleEndian</Endianess>
              </IntReg>
              <Integer Name="Gain">
                <pValue>RawGain</pValue>
                <pMin>GainMin</pMin>
              </Integer>
            </RegisterDescription>
        "#;
        let nodes = parse_register_map(xml).unwrap();
        assert!(matches!(nodes.get("RawGain"), Some(RegisterNode::IntReg(_))));
        match nodes.get("Gain").unwrap() {
            RegisterNode::Integer(i) => {
                assert_eq!(i.value, "RawGain");
                assert_eq!(i.min.as_deref(), Some("GainMin"));
            }
            _ => panic!("expected Integer node"),
        }
    }

    #[test]
    fn parses_enumeration_entries() {
        let xml = r#"
            <RegisterDescription>
              <Enumeration Name="PixelFormat">
                <pValue>RawFormat</pValue>
                <EnumEntry Name="Mono8"><Value>1</Value></EnumEntry>
                <EnumEntry Name="Mono16"><Value>2</Value></EnumEntry>
              </Enumeration>
            </RegisterDescription>
        "#;
        let nodes = parse_register_map(xml).unwrap();
        match nodes.get("PixelFormat").unwrap() {
            RegisterNode::Enumeration(e) => {
                assert_eq!(e.entries.get("Mono8"), Some(&1));
                assert_eq!(e.entries.get("Mono16"), Some(&2));
            }
            _ => panic!("expected Enumeration node"),
        }
    }
}
