use crate::decoder::{ByteDecode, Decoder};
use crate::errors::{Result, TsdbError};

/// The deduplicated strings of one block's index, loaded once per block.
///
/// Lookup is zero-based, per the canonical TSDB index format. (One decoder
/// in the lineage of this code treated symbol references as 1-based; that
/// was an off-by-one against real indexes and is not reproduced here.)
/// Strings are owned: a block's labels stay usable after the mapping that
/// produced them is gone.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<String>,
}

impl SymbolTable {
    pub fn from_strings(symbols: Vec<String>) -> Self {
        Self { symbols }
    }

    /// Parse the symbol table section: `{u32 len, u32 count}` then `count`
    /// length-prefixed strings. Empty strings are kept so later ids stay
    /// aligned.
    pub fn read(dec: &mut Decoder) -> Result<SymbolTable> {
        dec.read_u32()?; // section length
        let count = dec.read_u32()?;

        let mut symbols = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let len = dec.read_varuint()? as usize;
            let bytes = dec.read_view(len)?;
            let value = std::str::from_utf8(bytes)
                .map_err(|_| TsdbError::Parse("symbol is not valid UTF-8".into()))?;
            symbols.push(value.to_string());
        }

        Ok(SymbolTable { symbols })
    }

    pub fn lookup(&self, id: u64) -> Result<&str> {
        self.symbols
            .get(id as usize)
            .map(String::as_str)
            .ok_or_else(|| {
                TsdbError::Parse(format!(
                    "symbol id {} out of range ({} symbols)",
                    id,
                    self.symbols.len()
                ))
            })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
