//! Binary serialization of the parse table.
//!
//! Two layouts share the same structure and differ only in field widths:
//! the standard form (`LRPT`) uses 32-bit fields and has no size ceiling,
//! the compact form (`LRCT`) narrows everything to 16 bits (name lengths
//! to 8) and rejects tables that do not fit. Both are little-endian and
//! written in full in one pass.

use crate::{
    grammar::Grammar,
    parse_table::{Action, ParseTable},
};
use std::io::{self, Read, Write};

pub const STANDARD_MAGIC: &[u8; 4] = b"LRPT";
pub const COMPACT_MAGIC: &[u8; 4] = b"LRCT";

const COMPACT_MAX_PRODUCTIONS: usize = 16382;
const COMPACT_MAX_ROWS: usize = 16382;
const COMPACT_MAX_COLUMNS: usize = 65535;
const COMPACT_MAX_NAME: usize = 255;

const STD_SHIFT: u32 = 0x1000_0000;
const STD_REDUCE: u32 = 0x2000_0000;
const STD_GOTO: u32 = 0x3000_0000;
const STD_OPERAND: u32 = 0x0FFF_FFFF;

const CPT_SHIFT: u16 = 0x4000;
const CPT_REDUCE: u16 = 0x8000;
const CPT_GOTO: u16 = 0xC000;
const CPT_OPERAND: u16 = 0x3FFF;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Standard,
    Compact,
}

/// Serialize `table` in the requested layout.
///
/// Compact limits are validated before any byte is produced, so a limit
/// failure leaves the writer untouched and the in-memory table intact; the
/// caller may retry with [`Format::Standard`].
pub fn write_table(
    table: &ParseTable,
    grammar: &Grammar,
    format: Format,
    writer: &mut impl Write,
) -> Result<(), EncodeError> {
    let layout = match format {
        Format::Standard => Layout {
            magic: STANDARD_MAGIC,
            int: |w, v| w.write_all(&v.to_le_bytes()),
            name_len: |w, v| w.write_all(&v.to_le_bytes()),
            cell: |w, a| w.write_all(&encode_standard(a).to_le_bytes()),
        },
        Format::Compact => {
            check_compact_limits(table, grammar)?;
            Layout {
                magic: COMPACT_MAGIC,
                int: |w, v| w.write_all(&(v as u16).to_le_bytes()),
                name_len: |w, v| w.write_all(&[v as u8]),
                cell: |w, a| w.write_all(&encode_compact(a).to_le_bytes()),
            }
        }
    };

    writer.write_all(layout.magic)?;

    // left column and arity per production, needed by the reduce step
    (layout.int)(writer, grammar.production_count() as u32)?;
    for (_, production) in grammar.productions() {
        (layout.int)(writer, table.column_of(production.left()) as u32)?;
        (layout.int)(writer, production.right().len() as u32)?;
    }

    // named productions, for attaching semantic actions in the consumer
    let named_count = grammar
        .productions()
        .filter(|(_, p)| p.name().is_some())
        .count();
    (layout.int)(writer, named_count as u32)?;
    for (id, production) in grammar.productions() {
        let name = match production.name() {
            Some(name) => name,
            None => continue,
        };
        (layout.int)(writer, id.index() as u32)?;
        (layout.name_len)(writer, name.len() as u32)?;
        writer.write_all(name.as_bytes())?;
    }

    // table header: the column symbols
    (layout.int)(writer, table.column_count() as u32)?;
    for &symbol in table.header() {
        let name = grammar.symbol(symbol).name();
        (layout.name_len)(writer, name.len() as u32)?;
        writer.write_all(name.as_bytes())?;
    }

    // the action grid, row-major
    (layout.int)(writer, table.row_count() as u32)?;
    for &action in table.cells() {
        (layout.cell)(writer, action)?;
    }

    Ok(())
}

struct Layout {
    magic: &'static [u8; 4],
    int: fn(&mut dyn Write, u32) -> io::Result<()>,
    name_len: fn(&mut dyn Write, u32) -> io::Result<()>,
    cell: fn(&mut dyn Write, Action) -> io::Result<()>,
}

fn check_compact_limits(table: &ParseTable, grammar: &Grammar) -> Result<(), EncodeError> {
    if grammar.production_count() > COMPACT_MAX_PRODUCTIONS {
        return Err(EncodeError::TooManyProductions {
            count: grammar.production_count(),
        });
    }
    if table.row_count() > COMPACT_MAX_ROWS {
        return Err(EncodeError::TooManyStates {
            count: table.row_count(),
        });
    }
    if table.column_count() > COMPACT_MAX_COLUMNS {
        return Err(EncodeError::TooManyColumns {
            count: table.column_count(),
        });
    }
    let long_name = grammar
        .productions()
        .filter_map(|(_, p)| p.name())
        .chain(table.header().iter().map(|&s| grammar.symbol(s).name()))
        .find(|name| name.len() > COMPACT_MAX_NAME);
    match long_name {
        Some(name) => Err(EncodeError::NameTooLong {
            name: name.to_owned(),
        }),
        None => Ok(()),
    }
}

fn encode_standard(action: Action) -> u32 {
    match action {
        Action::Error => 0,
        Action::Accept => 1,
        Action::Shift(s) => STD_SHIFT | s.index() as u32,
        Action::Reduce(p) => STD_REDUCE | p.index() as u32,
        Action::Goto(s) => STD_GOTO | s.index() as u32,
    }
}

fn encode_compact(action: Action) -> u16 {
    match action {
        Action::Error => 0,
        Action::Accept => 1,
        Action::Shift(s) => CPT_SHIFT | s.index() as u16,
        Action::Reduce(p) => CPT_REDUCE | p.index() as u16,
        Action::Goto(s) => CPT_GOTO | s.index() as u16,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("{count} productions exceed the compact format's limit of 16382")]
    TooManyProductions { count: usize },

    #[error("{count} states exceed the compact format's limit of 16382")]
    TooManyStates { count: usize },

    #[error("{count} columns exceed the compact format's limit of 65535")]
    TooManyColumns { count: usize },

    #[error("name `{name}' exceeds the compact format's 255-byte limit")]
    NameTooLong { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A decoded table file: the reader half of the wire format, as a consumer
/// runtime would see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableImage {
    pub format: Format,
    pub productions: Vec<ProductionRecord>,
    pub names: Vec<(u32, String)>,
    pub columns: Vec<String>,
    pub rows: u32,
    pub cells: Vec<RawAction>,
}

/// Per-production metadata needed by the reduce step: the left symbol's
/// column and the number of right-hand symbols to pop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProductionRecord {
    pub left: u32,
    pub arity: u32,
}

/// A decoded cell, with raw state/production operands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RawAction {
    Error,
    Accept,
    Shift(u32),
    Reduce(u32),
    Goto(u32),
}

impl TableImage {
    pub fn read(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        let format = match &magic {
            m if m == STANDARD_MAGIC => Format::Standard,
            m if m == COMPACT_MAGIC => Format::Compact,
            _ => return Err(DecodeError::BadMagic(magic)),
        };

        let production_count = read_int(reader, format)?;
        let mut productions = Vec::with_capacity(production_count as usize);
        for _ in 0..production_count {
            let left = read_int(reader, format)?;
            let arity = read_int(reader, format)?;
            productions.push(ProductionRecord { left, arity });
        }

        let named_count = read_int(reader, format)?;
        let mut names = Vec::with_capacity(named_count as usize);
        for _ in 0..named_count {
            let index = read_int(reader, format)?;
            let len = read_name_len(reader, format)?;
            names.push((index, read_string(reader, len)?));
        }

        let column_count = read_int(reader, format)?;
        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let len = read_name_len(reader, format)?;
            columns.push(read_string(reader, len)?);
        }

        let rows = read_int(reader, format)?;
        let cell_count = rows as usize * column_count as usize;
        let mut cells = Vec::with_capacity(cell_count);
        for _ in 0..cell_count {
            let cell = match format {
                Format::Standard => {
                    let mut bytes = [0u8; 4];
                    reader.read_exact(&mut bytes)?;
                    decode_standard(u32::from_le_bytes(bytes))?
                }
                Format::Compact => {
                    let mut bytes = [0u8; 2];
                    reader.read_exact(&mut bytes)?;
                    decode_compact(u16::from_le_bytes(bytes))?
                }
            };
            cells.push(cell);
        }

        Ok(Self {
            format,
            productions,
            names,
            columns,
            rows,
            cells,
        })
    }
}

fn read_int(reader: &mut impl Read, format: Format) -> io::Result<u32> {
    match format {
        Format::Standard => {
            let mut bytes = [0u8; 4];
            reader.read_exact(&mut bytes)?;
            Ok(u32::from_le_bytes(bytes))
        }
        Format::Compact => {
            let mut bytes = [0u8; 2];
            reader.read_exact(&mut bytes)?;
            Ok(u16::from_le_bytes(bytes) as u32)
        }
    }
}

fn read_name_len(reader: &mut impl Read, format: Format) -> io::Result<u32> {
    match format {
        Format::Standard => read_int(reader, Format::Standard),
        Format::Compact => {
            let mut byte = [0u8; 1];
            reader.read_exact(&mut byte)?;
            Ok(byte[0] as u32)
        }
    }
}

fn read_string(reader: &mut impl Read, len: u32) -> Result<String, DecodeError> {
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}

fn decode_standard(value: u32) -> Result<RawAction, DecodeError> {
    match value >> 28 {
        0 => match value {
            0 => Ok(RawAction::Error),
            1 => Ok(RawAction::Accept),
            _ => Err(DecodeError::BadCell(value)),
        },
        1 => Ok(RawAction::Shift(value & STD_OPERAND)),
        2 => Ok(RawAction::Reduce(value & STD_OPERAND)),
        3 => Ok(RawAction::Goto(value & STD_OPERAND)),
        _ => Err(DecodeError::BadCell(value)),
    }
}

fn decode_compact(value: u16) -> Result<RawAction, DecodeError> {
    match value >> 14 {
        0 => match value {
            0 => Ok(RawAction::Error),
            1 => Ok(RawAction::Accept),
            _ => Err(DecodeError::BadCell(value as u32)),
        },
        1 => Ok(RawAction::Shift((value & CPT_OPERAND) as u32)),
        2 => Ok(RawAction::Reduce((value & CPT_OPERAND) as u32)),
        _ => Ok(RawAction::Goto((value & CPT_OPERAND) as u32)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized magic value {0:?}")]
    BadMagic([u8; 4]),

    #[error("cell value {0:#010x} does not decode to an action")]
    BadCell(u32),

    #[error("name is not valid UTF-8: {0}")]
    BadName(#[from] std::string::FromUtf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
