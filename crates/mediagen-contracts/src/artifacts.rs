use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRef {
    Remote(Url),
    Inline { mime_type: String, byte_len: usize },
}

pub fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64.encode(bytes))
}

/// Splits a base64 data URL into its mime type and decoded payload.
pub fn parse_data_url(raw: &str) -> Result<(String, Vec<u8>), String> {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("data:") else {
        return Err("not a data URL".to_string());
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return Err("data URL is missing its payload separator".to_string());
    };
    let Some(mime_type) = header.strip_suffix(";base64") else {
        return Err("only base64 data URLs are supported".to_string());
    };
    let mime_type = mime_type.trim();
    if mime_type.is_empty() || !mime_type.contains('/') {
        return Err(format!("data URL has invalid mime type '{mime_type}'"));
    }
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|err| format!("data URL payload is not valid base64: {err}"))?;
    Ok((mime_type.to_ascii_lowercase(), bytes))
}

/// Accepts only what a caller can actually render: an http(s) URL with a host, or a
/// decodable base64 data URL.
pub fn validate_artifact_url(raw: &str) -> Result<ArtifactRef, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("artifact URL is empty".to_string());
    }
    if trimmed.starts_with("data:") {
        let (mime_type, bytes) = parse_data_url(trimmed)?;
        if bytes.is_empty() {
            return Err("data URL payload is empty".to_string());
        }
        return Ok(ArtifactRef::Inline {
            mime_type,
            byte_len: bytes.len(),
        });
    }
    let url = Url::parse(trimmed).map_err(|err| format!("invalid artifact URL: {err}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported artifact URL scheme '{}'", url.scheme()));
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err("artifact URL has no host".to_string());
    }
    Ok(ArtifactRef::Remote(url))
}
