//! Legacy header layout
//!
//! ```text
//! [total_len:u32][msg_type:u8][body_len:u32][body][attr_len:u32][attr]
//! ```
//!
//! `total_len` counts everything after itself. The attribute string is
//! `groupId=..&streamId=..&dt=..&mid=..[&cp=snappy]&cnt=..&sid=..`.

use std::fmt::Write as _;

use bytes::Bytes;

use super::{PackContext, packet_len};
use crate::Result;
use crate::writer::WireWriter;

pub(crate) fn write(ctx: &PackContext<'_>) -> Result<Bytes> {
    let attr = attributes(ctx);
    let (total_len, packet_size) = packet_len(1 + 4 + ctx.body.len() + 4 + attr.len())?;

    let mut w = WireWriter::with_limit(packet_size);
    w.put_u32(total_len)?;
    w.put_u8(ctx.settings.msg_type.code())?;
    w.put_u32_prefixed(ctx.body)?;
    w.put_u32_prefixed(attr.as_bytes())?;
    Ok(w.freeze())
}

fn attributes(ctx: &PackContext<'_>) -> String {
    let mut attr = ctx.id_attr();
    let _ = write!(attr, "&dt={}&mid={}", ctx.header.data_time_ms, ctx.header.batch_id);
    if ctx.compressed {
        attr.push_str("&cp=snappy");
    }
    let _ = write!(attr, "&cnt={}&sid={}", ctx.record_count, ctx.header.unique_id);
    attr
}
