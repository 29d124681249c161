//! Stream URL assembly from cipher queries and scrambled parameters

use crate::core::DecoderState;
use crate::error::DescrambleError;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// Query parameter carrying the transformed throttling value
const TRANSFORM_PARAM: &str = "n";

/// Parsed `signatureCipher` query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamCipher {
    pub url: String,
    /// Query parameter the decoded signature goes into
    pub sp: String,
    /// Scrambled signature
    pub s: String,
}

impl StreamCipher {
    /// Parse a form-encoded cipher query such as `s=...&sp=sig&url=...`
    pub fn parse(query: &str) -> Result<Self, DescrambleError> {
        let mut params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        let url = params
            .remove("url")
            .ok_or_else(|| DescrambleError::InvalidCipher("missing url parameter".to_string()))?;
        let s = params
            .remove("s")
            .ok_or_else(|| DescrambleError::InvalidCipher("missing s parameter".to_string()))?;
        let sp = params
            .remove("sp")
            .unwrap_or_else(|| "signature".to_string());

        Ok(Self { url, sp, s })
    }
}

/// Build a playable stream URL.
///
/// With a cipher its `url` is the base and the decoded signature is appended
/// under `sp`; otherwise `url` is used as is. An `n` parameter, if present, is
/// rewritten through the transform.
pub fn resolve_stream_url(
    state: &DecoderState,
    url: Option<&str>,
    cipher: Option<&str>,
) -> Result<String, DescrambleError> {
    let cipher = cipher.map(StreamCipher::parse).transpose()?;
    let base = match (&cipher, url) {
        (Some(cipher), _) => cipher.url.as_str(),
        (None, Some(url)) => url,
        (None, None) => {
            return Err(DescrambleError::InvalidCipher(
                "neither a stream url nor a cipher was given".to_string(),
            ))
        }
    };
    let mut parsed = Url::parse(base)?;

    if let Some(cipher) = &cipher {
        let signature = state.decode_signature(&cipher.s);
        debug!("Decoded signature into {} parameter", cipher.sp);
        parsed.query_pairs_mut().append_pair(&cipher.sp, &signature);
    }

    let has_transform_param = parsed.query_pairs().any(|(k, _)| k == TRANSFORM_PARAM);
    if has_transform_param {
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == TRANSFORM_PARAM {
                    state.decode_transform(&v)
                } else {
                    v.into_owned()
                };
                (k.into_owned(), v)
            })
            .collect();

        parsed
            .query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    Ok(parsed.to_string())
}
