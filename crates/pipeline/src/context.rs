//! Shared SDK context
//!
//! One `SdkContext` is assembled at startup and handed to every receive
//! buffer by `Arc`, instead of each component looking up process globals.

use std::sync::Arc;

use shipper_config::Config;
use shipper_protocol::{MessageType, PACK_MARGIN, PackSettings};

use crate::id::IdGenerator;

/// Configuration snapshot plus the id generator shared by all buffers
#[derive(Debug)]
pub struct SdkContext {
    config: Arc<Config>,
    ids: IdGenerator,
}

impl SdkContext {
    /// Create a context; the worker id comes from the configured local ip
    pub fn new(config: Arc<Config>) -> Self {
        let ids = IdGenerator::new(IdGenerator::worker_id_for(&config.sdk.local_ip));
        Self { config, ids }
    }

    /// Configuration snapshot
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared configuration handle
    #[inline]
    pub fn config_arc(&self) -> &Arc<Config> {
        &self.config
    }

    /// Id generator
    #[inline]
    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    /// Packing options derived from the SDK settings
    pub fn pack_settings(&self) -> PackSettings {
        let sdk = &self.config.sdk;
        PackSettings {
            msg_type: MessageType::new(sdk.msg_type),
            compress: sdk.compress,
            min_compress_size: sdk.min_compress_size,
            attr_pack_format: sdk.attr_pack_format,
            trace_ip: sdk.trace_ip,
            local_ip: sdk.local_ip.clone(),
            force_char_ids: sdk.force_char_ids,
            extend_field: sdk.extend_field,
        }
    }

    /// Size of a buffer's pack scratch area
    #[inline]
    pub fn scratch_capacity(&self) -> usize {
        let sdk = &self.config.sdk;
        sdk.max_message_size.max(sdk.pack_size) + PACK_MARGIN
    }
}
