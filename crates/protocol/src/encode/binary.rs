//! Binary header layout
//!
//! ```text
//! [total_len:u32][msg_type:u8][group_num:u16][stream_num:u16][ext_field:u16]
//! [data_time_sec:u32][record_count:u16][batch_id:u32]
//! [body_len:u32][body][attr_len:u16][attr][magic:u16]
//! ```
//!
//! `total_len = 25 + body_len + attr_len`. When numeric ids are unknown (or
//! string ids are forced) both numbers are zero, `CHAR_ID_FLAG` is set in
//! `ext_field` and the attribute carries the ids as strings.

use bytes::Bytes;

use super::{PackContext, packet_len};
use crate::Result;
use crate::error::ProtocolError;
use crate::writer::WireWriter;
use crate::{BINARY_FIXED_OVERHEAD, BINARY_MAGIC, CHAR_ID_FLAG};

pub(crate) fn write(ctx: &PackContext<'_>) -> Result<Bytes> {
    let record_count = u16::try_from(ctx.record_count).map_err(|_| ProtocolError::CountOverflow {
        count: ctx.record_count,
        max: u16::MAX as usize,
    })?;

    let numeric_ids = match ctx.header.numeric_ids {
        Some((g, s)) if g != 0 && s != 0 && !ctx.settings.force_char_ids => Some((g, s)),
        _ => None,
    };
    let (group_num, stream_num, char_flag) = match numeric_ids {
        Some((g, s)) => (g, s, 0),
        None => (0, 0, CHAR_ID_FLAG),
    };
    let ext_field = ctx.settings.extend_field | char_flag;
    let attr = attributes(ctx, numeric_ids.is_none());

    let data_time_sec = u32::try_from(ctx.header.data_time_ms / 1000).unwrap_or(u32::MAX);
    let (total_len, packet_size) =
        packet_len(BINARY_FIXED_OVERHEAD + ctx.body.len() + attr.len())?;

    let mut w = WireWriter::with_limit(packet_size);
    w.put_u32(total_len)?;
    w.put_u8(ctx.settings.msg_type.wire_byte(ctx.compressed))?;
    w.put_u16(group_num)?;
    w.put_u16(stream_num)?;
    w.put_u16(ext_field)?;
    w.put_u32(data_time_sec)?;
    w.put_u16(record_count)?;
    w.put_u32(ctx.header.batch_id)?;
    w.put_u32_prefixed(ctx.body)?;
    w.put_u16_prefixed(attr.as_bytes())?;
    w.put_u16(BINARY_MAGIC)?;
    Ok(w.freeze())
}

fn attributes(ctx: &PackContext<'_>, char_ids: bool) -> String {
    if !ctx.settings.trace_ip {
        return ctx.id_attr();
    }

    let trace = format!(
        "node1ip={}&rtime1={}",
        ctx.settings.local_ip, ctx.header.now_ms
    );
    if char_ids {
        format!("{}&{}", ctx.id_attr(), trace)
    } else {
        trace
    }
}
