//! Image transfer encoding and display previews.
//!
//! `encode_image` is a pure transform: the same bytes always produce the same
//! standard (padded) base64 payload. Previews are a separate concern with an
//! explicit lifetime owned by whoever holds the handle.

use base64::Engine as _;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::domain::error::{AppError, Result};
use crate::domain::inspection::PreviewHandle;

/// Transfer-safe image payload sent to the vision service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub base64: String,
    pub mime_type: &'static str,
    pub byte_len: usize,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

pub fn encode_image(bytes: &[u8]) -> Result<EncodedImage> {
    if bytes.is_empty() {
        return Err(AppError::Codec("image is empty".to_string()));
    }

    let format = image::guess_format(bytes)
        .map_err(|e| AppError::Codec(format!("unreadable image: {}", e)))?;

    Ok(EncodedImage {
        base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        mime_type: format.to_mime_type(),
        byte_len: bytes.len(),
    })
}

/// Decodes a base64 body received from a client, tolerating a `data:` URL prefix.
pub fn decode_base64_image(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => encoded,
    };

    base64::engine::general_purpose::STANDARD
        .decode(payload.trim().as_bytes())
        .map_err(|e| AppError::Codec(format!("invalid base64 payload: {}", e)))
}

/// In-memory registry of preview bytes, keyed by opaque handles.
#[derive(Default)]
pub struct PreviewStore {
    previews: Mutex<HashMap<String, Arc<[u8]>>>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: &[u8]) -> PreviewHandle {
        let handle = PreviewHandle(Uuid::new_v4().to_string());
        self.lock().insert(handle.0.clone(), Arc::from(bytes));
        handle
    }

    pub fn get(&self, handle: &PreviewHandle) -> Option<Arc<[u8]>> {
        self.lock().get(handle.as_str()).cloned()
    }

    /// Returns whether a preview was actually released.
    pub fn release(&self, handle: &PreviewHandle) -> bool {
        self.lock().remove(handle.as_str()).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<[u8]>>> {
        self.previews
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
