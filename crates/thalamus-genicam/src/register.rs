//! The register symbol table and the read/write semantics for each GenICam
//! node kind, translated from `DeviceImpl::Value`'s variant list
//! (genicam_node.cpp) and its `StringReg`/`IntReg`/`FloatReg`/`Integer`/
//! `Float`/`Enumeration`/`Command`/`SwissKnife` read/write methods.
//!
//! `RegisterIo` is the transport seam: `bootstrap.rs` builds a concrete
//! implementation over a GenTL port handle, while tests use an in-memory
//! byte-array stand-in.

use std::collections::HashMap;

use crate::error::{GenicamError, Result};
use crate::expr::{Expr, Scope};

/// Reads and writes fixed-width byte ranges at a device address. Separated
/// from the symbol table so the register model can be exercised without a
/// real GenTL transport (see the in-memory `RegisterIo` in tests).
pub trait RegisterIo {
    fn read(&self, address: u64, len: usize) -> Result<Vec<u8>>;
    fn write(&self, address: u64, data: &[u8]) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    Rw,
    Ro,
    Wo,
}

impl AccessMode {
    pub fn is_writable(self) -> bool {
        self != AccessMode::Ro
    }
    pub fn is_readable(self) -> bool {
        self != AccessMode::Wo
    }
}

#[derive(Clone, Debug)]
pub struct StringReg {
    pub address: u64,
    pub p_address: Option<String>,
    pub int_swiss_knife: Option<String>,
    pub length: usize,
    pub access_mode: AccessMode,
}

#[derive(Clone, Debug)]
pub struct IntReg {
    pub address: u64,
    pub p_address: Option<String>,
    pub int_swiss_knife: Option<String>,
    pub length: usize,
    pub little_endian: bool,
    pub unsigned: bool,
    pub access_mode: AccessMode,
    pub lsb: Option<u32>,
    pub msb: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct FloatReg {
    pub address: u64,
    pub p_address: Option<String>,
    pub int_swiss_knife: Option<String>,
    pub length: usize, // 4 (f32) or 8 (f64)
    pub little_endian: bool,
    pub access_mode: AccessMode,
}

#[derive(Clone, Debug)]
pub struct IntSwissKnife {
    pub formula: Expr,
    pub dependencies: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct SwissKnife {
    pub formula: Expr,
    pub dependencies: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct IntConverter {
    pub value: String,
    pub formula_to: Expr,
    pub formula_from: Expr,
}

#[derive(Clone, Debug)]
pub struct Converter {
    pub value: String,
    pub formula_to: Expr,
    pub formula_from: Expr,
}

#[derive(Clone, Debug)]
pub struct Integer {
    pub value: String,
    pub min: Option<String>,
    pub max: Option<String>,
    pub inc: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Float {
    pub value: String,
    pub min: Option<String>,
    pub max: Option<String>,
    pub inc: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Enumeration {
    pub value: String,
    pub entries: HashMap<String, i64>,
}

#[derive(Clone, Debug)]
pub enum CommandValue {
    Register(String),
    Literal(i64),
}

#[derive(Clone, Debug)]
pub struct Command {
    pub command_value: CommandValue,
}

/// One entry of the register symbol table. Named to mirror
/// `DeviceImpl::Value`'s variant list exactly.
#[derive(Clone, Debug)]
pub enum RegisterNode {
    IntegerLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    AliasLink(String),
    StringReg(StringReg),
    IntConverter(IntConverter),
    IntReg(IntReg),
    IntSwissKnife(IntSwissKnife),
    FloatReg(FloatReg),
    SwissKnife(SwissKnife),
    Converter(Converter),
    Float(Float),
    Integer(Integer),
    Enumeration(Enumeration),
    Command(Command),
}

/// The full register map for one device, plus the transport used to back
/// the register nodes that actually touch hardware.
pub struct Device<IO: RegisterIo> {
    pub io: IO,
    pub nodes: HashMap<String, RegisterNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RegValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl RegValue {
    pub fn as_int(&self) -> Result<i64> {
        match self {
            RegValue::Int(i) => Ok(*i),
            RegValue::Bool(b) => Ok(*b as i64),
            RegValue::Float(f) => Ok(*f as i64),
            RegValue::Str(_) => Err(GenicamError::GenApi("expected integer, got string".into())),
        }
    }
    pub fn as_float(&self) -> Result<f64> {
        match self {
            RegValue::Float(f) => Ok(*f),
            RegValue::Int(i) => Ok(*i as f64),
            _ => Err(GenicamError::GenApi("expected float".into())),
        }
    }
    pub fn as_str(&self) -> Result<&str> {
        match self {
            RegValue::Str(s) => Ok(s),
            _ => Err(GenicamError::GenApi("expected string".into())),
        }
    }
}

impl<IO: RegisterIo> Device<IO> {
    pub fn new(io: IO, nodes: HashMap<String, RegisterNode>) -> Self {
        Self { io, nodes }
    }

    fn node(&self, name: &str) -> Result<&RegisterNode> {
        self.nodes.get(name).ok_or_else(|| GenicamError::UnknownRegister(name.to_string()))
    }

    fn resolved_address(&self, address: u64, p_address: &Option<String>, isk: &Option<String>) -> Result<u64> {
        let mut addr = address as i64;
        if let Some(p) = p_address {
            addr += self.get(p)?.as_int()?;
        }
        if let Some(isk) = isk {
            addr += self.get(isk)?.as_int()?;
        }
        Ok(addr as u64)
    }

    /// Read a named register, following converters/swiss-knives/links as
    /// needed. Returns `RegValue::Int(0)` for an `IntReg` backed by a
    /// transport that reports GC_ERR_NO_DATA — a silent-zero fallback,
    /// not escalated to an error (see `IntReg::read`).
    pub fn get(&self, name: &str) -> Result<RegValue> {
        match self.node(name)?.clone() {
            RegisterNode::IntegerLiteral(v) => Ok(RegValue::Int(v)),
            RegisterNode::FloatLiteral(v) => Ok(RegValue::Float(v)),
            RegisterNode::StringLiteral(v) => Ok(RegValue::Str(v)),
            RegisterNode::AliasLink(target) => self.get(&target),

            RegisterNode::StringReg(r) => {
                let addr = self.resolved_address(r.address, &r.p_address, &r.int_swiss_knife)?;
                match self.io.read(addr, r.length) {
                    Ok(bytes) => {
                        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                        Ok(RegValue::Str(String::from_utf8_lossy(&bytes[..end]).into_owned()))
                    }
                    Err(GenicamError::NoData) => Ok(RegValue::Str(String::new())),
                    Err(e) => Err(e),
                }
            }

            RegisterNode::IntReg(r) => {
                let addr = self.resolved_address(r.address, &r.p_address, &r.int_swiss_knife)?;
                let bytes = match self.io.read(addr, r.length) {
                    Ok(b) => b,
                    Err(GenicamError::NoData) => return Ok(RegValue::Int(0)),
                    Err(e) => return Err(e),
                };
                Ok(RegValue::Int(decode_int(&bytes, r.little_endian, r.unsigned, r.lsb, r.msb)))
            }

            RegisterNode::FloatReg(r) => {
                let addr = self.resolved_address(r.address, &r.p_address, &r.int_swiss_knife)?;
                let bytes = self.io.read(addr, r.length)?;
                Ok(RegValue::Float(decode_float(&bytes, r.little_endian)))
            }

            RegisterNode::IntSwissKnife(sk) => {
                let scope = self.build_scope(&sk.dependencies)?;
                Ok(RegValue::Int(sk.formula.eval(&scope)? as i64))
            }

            RegisterNode::SwissKnife(sk) => {
                let scope = self.build_scope(&sk.dependencies)?;
                Ok(RegValue::Float(sk.formula.eval(&scope)?))
            }

            RegisterNode::IntConverter(c) => {
                let raw = self.get(&c.value)?.as_float()?;
                let mut scope = Scope::new();
                scope.set("TO", raw);
                Ok(RegValue::Int(c.formula_from.eval(&scope)? as i64))
            }

            RegisterNode::Converter(c) => {
                let raw = self.get(&c.value)?.as_float()?;
                let mut scope = Scope::new();
                scope.set("TO", raw);
                Ok(RegValue::Float(c.formula_from.eval(&scope)?))
            }

            RegisterNode::Integer(i) => self.get(&i.value),
            RegisterNode::Float(f) => self.get(&f.value),

            RegisterNode::Enumeration(e) => {
                let key = self.get(&e.value)?.as_int()?;
                e.entries
                    .iter()
                    .find(|(_, v)| **v == key)
                    .map(|(k, _)| RegValue::Str(k.clone()))
                    .ok_or_else(|| GenicamError::GenApi(format!("no enum entry for value {key}")))
            }

            RegisterNode::Command(_) => Err(GenicamError::GenApi(format!("{name} is a command, not readable"))),
        }
    }

    /// Write a named register, clamping through `Integer`/`Float` bounds
    /// (min/max/inc, inc snapping to `min + k*inc`) the way the original
    /// `Integer::write`/`Float::write` do.
    pub fn set(&mut self, name: &str, value: RegValue) -> Result<()> {
        let node = self.node(name)?.clone();
        match node {
            RegisterNode::AliasLink(target) => self.set(&target, value),

            RegisterNode::StringReg(r) => {
                if !r.access_mode.is_writable() {
                    return Err(GenicamError::AccessDenied(name.to_string()));
                }
                let addr = self.resolved_address(r.address, &r.p_address, &r.int_swiss_knife)?;
                let mut bytes = value.as_str()?.as_bytes().to_vec();
                bytes.resize(r.length, 0);
                self.io.write(addr, &bytes)
            }

            RegisterNode::IntReg(r) => {
                if !r.access_mode.is_writable() {
                    return Err(GenicamError::AccessDenied(name.to_string()));
                }
                let addr = self.resolved_address(r.address, &r.p_address, &None)?;
                let existing = if r.access_mode == AccessMode::Wo {
                    vec![0u8; r.length]
                } else {
                    match self.io.read(addr, r.length) {
                        Ok(b) => b,
                        Err(GenicamError::NoData) => return Ok(()),
                        Err(e) => return Err(e),
                    }
                };
                let merged = encode_int_masked(value.as_int()?, &existing, r.length, r.little_endian, r.lsb, r.msb);
                self.io.write(addr, &merged)
            }

            RegisterNode::FloatReg(r) => {
                if !r.access_mode.is_writable() {
                    return Err(GenicamError::AccessDenied(name.to_string()));
                }
                let addr = self.resolved_address(r.address, &r.p_address, &r.int_swiss_knife)?;
                let bytes = encode_float(value.as_float()?, r.length, r.little_endian);
                self.io.write(addr, &bytes)
            }

            RegisterNode::IntConverter(c) => {
                let mut scope = Scope::new();
                scope.set("FROM", value.as_float()?);
                let raw = c.formula_to.eval(&scope)?;
                self.set(&c.value, RegValue::Int(raw as i64))
            }

            RegisterNode::Converter(c) => {
                let mut scope = Scope::new();
                scope.set("FROM", value.as_float()?);
                let raw = c.formula_to.eval(&scope)?;
                self.set(&c.value, RegValue::Float(raw))
            }

            RegisterNode::Integer(i) => {
                let mut v = value.as_int()?;
                if let Some(min) = &i.min {
                    v = v.max(self.get(min)?.as_int()?);
                }
                if let Some(max) = &i.max {
                    v = v.min(self.get(max)?.as_int()?);
                }
                if let Some(inc) = &i.inc {
                    let inc = self.get(inc)?.as_int()?;
                    let min = i.min.as_ref().map(|m| self.get(m)).transpose()?.map(|v| v.as_int()).transpose()?.unwrap_or(0);
                    if inc > 0 {
                        v = ((v - min) / inc) * inc + min;
                    }
                }
                self.set(&i.value, RegValue::Int(v))
            }

            RegisterNode::Float(f) => {
                let mut v = value.as_float()?;
                if let Some(min) = &f.min {
                    v = v.max(self.get(min)?.as_float()?);
                }
                if let Some(max) = &f.max {
                    v = v.min(self.get(max)?.as_float()?);
                }
                if let Some(inc) = &f.inc {
                    let inc = self.get(inc)?.as_float()?;
                    let min = f.min.as_ref().map(|m| self.get(m)).transpose()?.map(|v| v.as_float()).transpose()?.unwrap_or(0.0);
                    if inc > 0.0 {
                        v = ((v - min) / inc).round() * inc + min;
                    }
                }
                self.set(&f.value, RegValue::Float(v))
            }

            RegisterNode::Enumeration(e) => {
                let key = e
                    .entries
                    .get(value.as_str()?)
                    .copied()
                    .ok_or_else(|| GenicamError::GenApi(format!("no enum entry named {}", value.as_str()?)))?;
                self.set(&e.value, RegValue::Int(key))
            }

            RegisterNode::IntegerLiteral(_) | RegisterNode::FloatLiteral(_) | RegisterNode::StringLiteral(_) => {
                Err(GenicamError::AccessDenied(format!("{name} is a literal")))
            }
            RegisterNode::IntSwissKnife(_) | RegisterNode::SwissKnife(_) => {
                Err(GenicamError::AccessDenied(format!("{name} is a computed value")))
            }
            RegisterNode::Command(_) => Err(GenicamError::GenApi(format!("{name} is a command; use execute()"))),
        }
    }

    /// Execute a `Command` node: resolve its value (a named register or a
    /// literal) and write it to the command's output register.
    pub fn execute(&mut self, name: &str) -> Result<()> {
        let node = self.node(name)?.clone();
        let RegisterNode::Command(cmd) = node else {
            return Err(GenicamError::GenApi(format!("{name} is not a command")));
        };
        let value = match &cmd.command_value {
            CommandValue::Literal(v) => *v,
            CommandValue::Register(reg) => self.get(reg)?.as_int()?,
        };
        self.set(name, RegValue::Int(value))
    }

    fn build_scope(&self, dependencies: &[String]) -> Result<Scope> {
        let mut scope = Scope::new();
        for dep in dependencies {
            scope.set(dep, self.get(dep)?.as_float()?);
        }
        Ok(scope)
    }
}

fn decode_int(bytes: &[u8], little_endian: bool, unsigned: bool, lsb: Option<u32>, msb: Option<u32>) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let first_byte = if little_endian { *bytes.last().unwrap() } else { bytes[0] };
    let negative = !unsigned && (first_byte & 0x80 != 0);
    let mut acc: i64 = if negative { -1 } else { 0 };
    let ordered: Vec<u8> = if little_endian {
        bytes.iter().rev().copied().collect()
    } else {
        bytes.to_vec()
    };
    for b in ordered {
        acc = (acc << 8) | (b as i64);
    }
    if let Some(msb) = msb {
        let mask = (1i64.checked_shl(msb + 1).unwrap_or(0)).wrapping_sub(1);
        acc &= mask;
    }
    if let Some(lsb) = lsb {
        acc = acc.checked_shr(lsb).unwrap_or(0);
    }
    acc
}

fn encode_int_masked(
    value: i64,
    existing: &[u8],
    length: usize,
    little_endian: bool,
    lsb: Option<u32>,
    msb: Option<u32>,
) -> Vec<u8> {
    let mut mask = vec![0u8; length];
    for (i, mask_byte) in mask.iter_mut().enumerate() {
        let mut b: u8 = 0xFF;
        if let Some(lsb) = lsb {
            let lsb = lsb as usize;
            if lsb > i * 8 {
                let shift = lsb - i * 8;
                b = if shift >= 8 { 0 } else { b << shift };
            }
        }
        if let Some(msb) = msb {
            let msb = msb as usize;
            if msb < (i + 1) * 8 {
                let shift = (i + 1) * 8 - (msb + 1);
                let temp: u8 = if shift >= 8 { 0 } else { 0xFFu8 >> shift };
                b &= temp;
            }
        }
        *mask_byte = b;
    }

    let shifted = lsb.map(|l| value.checked_shl(l).unwrap_or(0)).unwrap_or(value);
    let mut value_bytes = vec![0u8; length];
    let mut v = shifted;
    for byte in value_bytes.iter_mut() {
        *byte = (v & 0xFF) as u8;
        v >>= 8;
    }

    let mut current = existing.to_vec();
    current.resize(length, 0);
    if !little_endian {
        current.reverse();
    }
    for i in 0..length {
        current[i] = (current[i] & !mask[i]) | (value_bytes[i] & mask[i]);
    }
    if !little_endian {
        current.reverse();
    }
    current
}

fn decode_float(bytes: &[u8], little_endian: bool) -> f64 {
    match bytes.len() {
        4 => {
            let mut b = [0u8; 4];
            b.copy_from_slice(&bytes[..4]);
            if little_endian { f32::from_le_bytes(b) as f64 } else { f32::from_be_bytes(b) as f64 }
        }
        8 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[..8]);
            if little_endian { f64::from_le_bytes(b) } else { f64::from_be_bytes(b) }
        }
        _ => 0.0,
    }
}

fn encode_float(value: f64, length: usize, little_endian: bool) -> Vec<u8> {
    match length {
        4 => {
            let v = value as f32;
            if little_endian { v.to_le_bytes().to_vec() } else { v.to_be_bytes().to_vec() }
        }
        _ => {
            if little_endian { value.to_le_bytes().to_vec() } else { value.to_be_bytes().to_vec() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct MemIo {
        mem: RefCell<HashMap<u64, Vec<u8>>>,
    }
    impl RegisterIo for MemIo {
        fn read(&self, address: u64, len: usize) -> Result<Vec<u8>> {
            Ok(self.mem.borrow().get(&address).cloned().unwrap_or(vec![0; len]))
        }
        fn write(&self, address: u64, data: &[u8]) -> Result<()> {
            self.mem.borrow_mut().insert(address, data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn int_reg_write_then_read_round_trips_with_bit_window() {
        let io = MemIo { mem: RefCell::new(HashMap::new()) };
        let mut nodes = HashMap::new();
        nodes.insert(
            "Gain".to_string(),
            RegisterNode::IntReg(IntReg {
                address: 0x100,
                p_address: None,
                int_swiss_knife: None,
                length: 4,
                little_endian: true,
                unsigned: true,
                access_mode: AccessMode::Rw,
                lsb: Some(4),
                msb: Some(11),
            }),
        );
        let mut device = Device::new(io, nodes);
        device.set("Gain", RegValue::Int(200)).unwrap();
        assert_eq!(device.get("Gain").unwrap().as_int().unwrap(), 200);
    }

    #[test]
    fn integer_clamps_to_min_max_and_snaps_to_inc() {
        let io = MemIo { mem: RefCell::new(HashMap::new()) };
        let mut nodes = HashMap::new();
        nodes.insert(
            "RawWidth".to_string(),
            RegisterNode::IntReg(IntReg {
                address: 0x200,
                p_address: None,
                int_swiss_knife: None,
                length: 4,
                little_endian: true,
                unsigned: true,
                access_mode: AccessMode::Rw,
                lsb: None,
                msb: None,
            }),
        );
        nodes.insert("WidthMin".to_string(), RegisterNode::IntegerLiteral(64));
        nodes.insert("WidthMax".to_string(), RegisterNode::IntegerLiteral(1024));
        nodes.insert("WidthInc".to_string(), RegisterNode::IntegerLiteral(32));
        nodes.insert(
            "Width".to_string(),
            RegisterNode::Integer(Integer {
                value: "RawWidth".to_string(),
                min: Some("WidthMin".to_string()),
                max: Some("WidthMax".to_string()),
                inc: Some("WidthInc".to_string()),
            }),
        );
        let mut device = Device::new(io, nodes);

        // 50 is below min (64); clamps up to 64, already inc-aligned.
        device.set("Width", RegValue::Int(50)).unwrap();
        assert_eq!(device.get("Width").unwrap().as_int().unwrap(), 64);

        // 2000 exceeds max (1024); clamps down, 1024 is inc-aligned from 64.
        device.set("Width", RegValue::Int(2000)).unwrap();
        assert_eq!(device.get("Width").unwrap().as_int().unwrap(), 1024);

        // 100 is within range but not inc-aligned (100 - 64 = 36, not a
        // multiple of 32); snaps down to 96.
        device.set("Width", RegValue::Int(100)).unwrap();
        assert_eq!(device.get("Width").unwrap().as_int().unwrap(), 96);
    }

    #[test]
    fn converter_applies_formula_to_on_write_and_formula_from_on_read() {
        // Asymmetric formulas (raw = FROM * 2 + 1) catch a direction swap
        // that a linear-and-symmetric formula pair would hide.
        let io = MemIo { mem: RefCell::new(HashMap::new()) };
        let mut nodes = HashMap::new();
        nodes.insert(
            "RawGain".to_string(),
            RegisterNode::FloatReg(FloatReg {
                address: 0x300,
                p_address: None,
                int_swiss_knife: None,
                length: 4,
                little_endian: true,
                access_mode: AccessMode::Rw,
            }),
        );
        nodes.insert(
            "Gain".to_string(),
            RegisterNode::Converter(Converter {
                value: "RawGain".to_string(),
                formula_to: Expr::parse("FROM * 2 + 1").unwrap(),
                formula_from: Expr::parse("(TO - 1) / 2").unwrap(),
            }),
        );
        let mut device = Device::new(io, nodes);

        device.set("Gain", RegValue::Float(3.0)).unwrap();
        // formula_to(FROM=3) = 7 is what must land in the underlying register.
        assert_eq!(device.get("RawGain").unwrap().as_float().unwrap(), 7.0);
        // formula_from(TO=7) = 3 is what a read back through the converter reports.
        assert_eq!(device.get("Gain").unwrap().as_float().unwrap(), 3.0);
    }
}
