//! Minimal PNG chunk reader. No pixel decoding: only the `tEXt`/`iTXt`
//! metadata chunks where workflow tools embed their graph JSON.

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
/// Metadata keys that carry an embedded workflow graph.
const WORKFLOW_KEYS: &[&str] = &["workflow", "prompt"];

/// Extract embedded workflow JSON from PNG bytes. Returns the first
/// `workflow`/`prompt` text chunk whose value parses as a JSON object.
pub fn extract_workflow(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 8 || bytes[..8] != PNG_SIGNATURE {
        return None;
    }

    let mut pos = 8usize;
    while pos + 8 <= bytes.len() {
        let len = u32::from_be_bytes(bytes[pos..pos + 4].try_into().ok()?) as usize;
        let chunk_type = &bytes[pos + 4..pos + 8];
        let data_start = pos + 8;
        let data_end = data_start.checked_add(len)?;
        if data_end + 4 > bytes.len() {
            return None;
        }
        let data = &bytes[data_start..data_end];

        let text = match chunk_type {
            b"tEXt" => parse_text_chunk(data),
            b"iTXt" => parse_itxt_chunk(data),
            b"IEND" => return None,
            _ => None,
        };
        if let Some((key, value)) = text {
            if WORKFLOW_KEYS.contains(&key.as_str()) && is_json_object(&value) {
                return Some(value);
            }
        }

        // Skip data + CRC.
        pos = data_end + 4;
    }
    None
}

/// tEXt: `keyword \0 text` (latin-1).
fn parse_text_chunk(data: &[u8]) -> Option<(String, String)> {
    let sep = data.iter().position(|b| *b == 0)?;
    let key = String::from_utf8_lossy(&data[..sep]).to_string();
    let value = data[sep + 1..].iter().map(|b| *b as char).collect();
    Some((key, value))
}

/// iTXt: `keyword \0 compression_flag compression_method \0 lang \0 translated \0 text`.
/// Compressed payloads are skipped.
fn parse_itxt_chunk(data: &[u8]) -> Option<(String, String)> {
    let sep = data.iter().position(|b| *b == 0)?;
    let key = String::from_utf8_lossy(&data[..sep]).to_string();
    let rest = &data[sep + 1..];
    if rest.len() < 2 || rest[0] != 0 {
        return None;
    }
    let after_flags = &rest[2..];
    let lang_end = after_flags.iter().position(|b| *b == 0)?;
    let after_lang = &after_flags[lang_end + 1..];
    let translated_end = after_lang.iter().position(|b| *b == 0)?;
    let text = &after_lang[translated_end + 1..];
    Some((key, String::from_utf8_lossy(text).to_string()))
}

fn is_json_object(value: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(value)
        .map(|v| v.is_object())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_with_text_chunk(key: &str, value: &str) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        let mut data = key.as_bytes().to_vec();
        data.push(0);
        data.extend_from_slice(value.as_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(b"tEXt");
        out.extend_from_slice(&data);
        out.extend_from_slice(&[0, 0, 0, 0]); // CRC, unchecked
        // IEND
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(b"IEND");
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    #[test]
    fn finds_workflow_text_chunk() {
        let png = png_with_text_chunk("workflow", r#"{"nodes": []}"#);
        assert_eq!(extract_workflow(&png).as_deref(), Some(r#"{"nodes": []}"#));
    }

    #[test]
    fn prompt_key_also_matches() {
        let png = png_with_text_chunk("prompt", r#"{"3": {"class_type": "KSampler"}}"#);
        assert!(extract_workflow(&png).is_some());
    }

    #[test]
    fn non_json_values_are_ignored() {
        let png = png_with_text_chunk("workflow", "not json");
        assert_eq!(extract_workflow(&png), None);
    }

    #[test]
    fn wrong_key_is_ignored() {
        let png = png_with_text_chunk("comment", r#"{"a": 1}"#);
        assert_eq!(extract_workflow(&png), None);
    }

    #[test]
    fn non_png_bytes_are_rejected() {
        assert_eq!(extract_workflow(b"GIF89a"), None);
        assert_eq!(extract_workflow(&[]), None);
    }
}
