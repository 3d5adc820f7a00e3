use std::sync::LazyLock;

use checkup_common::normalize_ws;
use regex::Regex;

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static ENTITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap());

/// Decode entities, replace tags with spaces and collapse whitespace.
pub fn to_plain_text(html: &str) -> String {
    let decoded = decode_entities(html);
    let stripped = TAG_REGEX.replace_all(&decoded, " ");
    normalize_ws(&stripped)
}

pub fn decode_entities(s: &str) -> String {
    ENTITY_REGEX
        .replace_all(s, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            decode_entity(body).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn decode_entity(body: &str) -> Option<String> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    let ch = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ccedil" => 'ç',
        "Ccedil" => 'Ç',
        "ouml" => 'ö',
        "Ouml" => 'Ö',
        "uuml" => 'ü',
        "Uuml" => 'Ü',
        "gbreve" => 'ğ',
        "Gbreve" => 'Ğ',
        "scedil" => 'ş',
        "Scedil" => 'Ş',
        "imath" | "inodot" => 'ı',
        "Idot" => 'İ',
        "rsquo" => '\u{2019}',
        "lsquo" => '\u{2018}',
        "rdquo" => '\u{201d}',
        "ldquo" => '\u{201c}',
        "hellip" => '\u{2026}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        _ => return None,
    };
    Some(ch.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_named_and_numeric() {
        assert_eq!(decode_entities("a &amp; b &#252; &#x15F;"), "a & b ü ş");
        assert_eq!(decode_entities("&unknown; stays"), "&unknown; stays");
    }

    #[test]
    fn test_plain_text_strips_tags() {
        assert_eq!(
            to_plain_text("<div>\n  <h1>Başlık</h1><p>Gövde   metni</p></div>"),
            "Başlık Gövde metni"
        );
    }

    #[test]
    fn test_escaped_markup_is_removed_after_decoding() {
        assert_eq!(to_plain_text("&lt;b&gt;kalın&lt;/b&gt;"), "kalın");
    }
}
