//! Rendering values as Python source expressions.

use std::fmt::{self, Write};

use super::{Primitive, Record};
use crate::ConversionError;

impl Primitive {
    /// Render as a Python expression that evaluates to an equal value.
    ///
    /// Fails when a set member or dict key is unhashable.
    pub fn to_expression(&self) -> Result<String, ConversionError> {
        let mut out = String::new();
        Renderer { strict: true }.value(&mut out, self, false)?;
        Ok(out)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        Renderer { strict: false }
            .value(&mut out, self, false)
            .map_err(|_| fmt::Error)?;
        f.write_str(&out)
    }
}

struct Renderer {
    strict: bool,
}

impl Renderer {
    fn value(&self, out: &mut String, value: &Primitive, key: bool) -> Result<(), ConversionError> {
        if key && self.strict && !value.is_hashable() {
            return Err(ConversionError::Unconvertible(format!(
                "unhashable set member or dict key of type `{}`",
                value.type_name()
            )));
        }
        match value {
            Primitive::None => out.push_str("None"),
            Primitive::Bool(true) => out.push_str("True"),
            Primitive::Bool(false) => out.push_str("False"),
            Primitive::Int(i) => push(out, format_args!("{i}")),
            Primitive::Float(f) => float(out, *f),
            Primitive::Str(s) => string(out, s),
            Primitive::Bytes(b) => bytes(out, b),
            Primitive::List(items) if key => {
                out.push('(');
                self.items(out, items, true)?;
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Primitive::List(items) => {
                out.push('[');
                self.items(out, items, false)?;
                out.push(']');
            }
            Primitive::Set(set) if set.is_empty() => out.push_str("set()"),
            Primitive::Set(set) => {
                out.push('{');
                self.items(out, set.as_slice(), true)?;
                out.push('}');
            }
            Primitive::Map(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.value(out, k, true)?;
                    out.push_str(": ");
                    self.value(out, v, false)?;
                }
                out.push('}');
            }
            Primitive::Record(record) => self.record(out, record)?,
        }
        Ok(())
    }

    fn items(&self, out: &mut String, items: &[Primitive], key: bool) -> Result<(), ConversionError> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.value(out, item, key)?;
        }
        Ok(())
    }

    /// `getattr(sys.modules[module], name)(**props)`, or `name(**props)` when
    /// the type name carries no module.
    fn record(&self, out: &mut String, record: &Record) -> Result<(), ConversionError> {
        match record.type_name().rsplit_once('.') {
            Some((module, name)) => {
                out.push_str("getattr(__import__('sys').modules[");
                string(out, module);
                out.push_str("], ");
                string(out, name);
                out.push(')');
            }
            None => out.push_str(record.type_name()),
        }
        out.push_str("(**{");
        for (i, (name, value)) in record.props().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            string(out, name);
            out.push_str(": ");
            self.value(out, value, false)?;
        }
        out.push_str("})");
        Ok(())
    }
}

fn push(out: &mut String, args: fmt::Arguments<'_>) {
    // Writing into a String cannot fail.
    let _ = out.write_fmt(args);
}

fn float(out: &mut String, f: f64) {
    if f.is_nan() {
        out.push_str("float('nan')");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "float('inf')" } else { "float('-inf')" });
    } else {
        // Debug keeps a decimal point or exponent, so the literal stays a float.
        push(out, format_args!("{f:?}"));
    }
}

fn string(out: &mut String, s: &str) {
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => push(out, format_args!("\\U{:08x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn bytes(out: &mut String, b: &[u8]) {
    out.push_str("b'");
    for &byte in b {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            0x20..=0x7e => out.push(char::from(byte)),
            _ => push(out, format_args!("\\x{byte:02x}")),
        }
    }
    out.push('\'');
}
