//! Verbose query output decoding
//!
//! Rewrites the tool's text into YAML, decodes the header plus every `GPU<n>`
//! block in emission order, and falls back to a header-only decode when the
//! device blocks do not fit the schema.

use crate::error::{DecodeError, Partial};
use crate::smi::document::{DeviceRecord, Document};
use crate::smi::rewrite::rewrite;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Marker the fallback truncates at: the first synthetic device key
const DEVICE_KEY_MARKER: &str = "\nGPU";

/// `GPU` followed by one or more digits
fn is_device_key(key: &str) -> bool {
    key.strip_prefix("GPU")
        .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Document-level header fields
#[derive(Debug, Default, Deserialize)]
struct Header {
    #[serde(rename = "Timestamp", default)]
    timestamp: Option<String>,
    #[serde(rename = "Driver Version", default)]
    driver_version: Option<String>,
    #[serde(rename = "CUDA Version", default)]
    cuda_version: Option<String>,
    #[serde(rename = "Attached GPUs", default)]
    attached_gpus: Option<usize>,
}

impl Header {
    fn into_document(self) -> Document {
        Document {
            timestamp: self.timestamp.unwrap_or_default(),
            driver_version: self.driver_version.unwrap_or_default(),
            cuda_version: self.cuda_version.unwrap_or_default(),
            attached_gpus: self.attached_gpus.unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Header plus device blocks, decoded from the rewritten text
#[derive(Debug, Default)]
struct RawQueryOutput {
    header: Header,
    devices: Vec<DeviceRecord>,
}

impl<'de> Deserialize<'de> for RawQueryOutput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(RawQueryOutputVisitor)
    }
}

struct RawQueryOutputVisitor;

impl<'de> Visitor<'de> for RawQueryOutputVisitor {
    type Value = RawQueryOutput;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("nvidia-smi query output")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut out = RawQueryOutput::default();

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "Timestamp" => out.header.timestamp = map.next_value()?,
                "Driver Version" => out.header.driver_version = map.next_value()?,
                "CUDA Version" => out.header.cuda_version = map.next_value()?,
                "Attached GPUs" => out.header.attached_gpus = map.next_value()?,
                k if is_device_key(k) => {
                    if let Some(device) = map.next_value::<Option<DeviceRecord>>()? {
                        out.devices.push(device);
                    }
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        Ok(out)
    }
}

/// YAML decode that treats blank text as an empty document
fn from_yaml<T>(text: &str) -> Result<T, serde_yaml::Error>
where
    T: serde::de::DeserializeOwned + Default,
{
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(text)
}

/// Decode the output of `nvidia-smi --query`.
///
/// A complete decode returns the full document with `raw` set to the input.
/// If the device blocks do not decode, the header alone is salvaged and
/// returned as a [`Partial`] carrying the original error. Only a header that
/// itself fails to decode is a hard error.
pub fn decode_query_output(input: &[u8]) -> Result<Partial<Document, DecodeError>, DecodeError> {
    let text = String::from_utf8_lossy(input);
    let rewritten = rewrite(&text);

    match from_yaml::<RawQueryOutput>(&rewritten) {
        Ok(raw) => {
            let mut doc = raw.header.into_document();
            doc.gpus = raw.devices;
            doc.raw = text.into_owned();
            doc.propagate_ids();

            log::debug!(
                "decoded query output: driver {} with {} device(s)",
                doc.driver_version,
                doc.gpus.len()
            );
            Ok(Partial::complete(doc))
        }
        Err(err) => {
            log::warn!("query output did not decode, falling back to header: {}", err);

            let head = rewritten
                .split(DEVICE_KEY_MARKER)
                .next()
                .unwrap_or_default();
            let header: Header = from_yaml(head)?;

            Ok(Partial::degraded(header.into_document(), DecodeError::Yaml(err)))
        }
    }
}
