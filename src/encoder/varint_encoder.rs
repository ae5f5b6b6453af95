use super::uvarint_encoder::write_uvarint;

/// Write an i64 as a Golang varint (zig-zag encoded uvarint).
pub fn write_varint<W: std::io::Write>(value: i64, writer: &mut W) -> std::io::Result<()> {
    let mut ux = (value as u64) << 1;
    if value < 0 {
        ux = !ux;
    }
    write_uvarint(ux, writer)
}
