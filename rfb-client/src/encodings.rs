//! SetEncodings list construction.
//!
//! Without an explicit list the client prefers Tight (or Raw when the server
//! runs on the same machine and no tunnel is in use), then every other
//! rectangle encoding, then the hint and cursor pseudo-encodings. An
//! explicit list is taken in the given order, with the pseudo-encodings it
//! implies appended. Either way the list is capped at [`MAX_ENCODINGS`].

use crate::config::EncodingConfig;
use crate::errors::RfbClientError;
use rfb_protocol::messages::types::{
    compress_level, quality_level, ENCODING_COPYRECT, ENCODING_CORRE, ENCODING_HEXTILE,
    ENCODING_RAW, ENCODING_RRE, ENCODING_TIGHT, ENCODING_ZLIB, ENCODING_ZLIBHEX, ENCODING_ZRLE,
    PSEUDO_ENCODING_LAST_RECT, PSEUDO_ENCODING_POINTER_POS, PSEUDO_ENCODING_RICH_CURSOR,
    PSEUDO_ENCODING_X_CURSOR,
};

/// Maximum number of entries sent in one SetEncodings message.
pub const MAX_ENCODINGS: usize = 20;

/// Rectangle encodings offered after the preferred one, in this order.
const SUPPORTED_ENCODINGS: [i32; 6] = [
    ENCODING_ZRLE,
    ENCODING_HEXTILE,
    ENCODING_CORRE,
    ENCODING_RRE,
    ENCODING_RAW,
    ENCODING_TIGHT,
];

/// Quality level used when JPEG is on but the configured level is unusable.
const FALLBACK_QUALITY: u8 = 5;

/// Map an encoding name to its tag. Names compare case-insensitively.
pub fn encoding_from_name(name: &str) -> Option<i32> {
    let tag = match name.to_ascii_lowercase().as_str() {
        "raw" => ENCODING_RAW,
        "copyrect" => ENCODING_COPYRECT,
        "rre" => ENCODING_RRE,
        "corre" => ENCODING_CORRE,
        "hextile" => ENCODING_HEXTILE,
        "zlib" => ENCODING_ZLIB,
        "tight" => ENCODING_TIGHT,
        "zlibhex" => ENCODING_ZLIBHEX,
        "zrle" => ENCODING_ZRLE,
        _ => return None,
    };
    Some(tag)
}

/// Parse encoding names to encoding tags.
pub fn parse_encoding_list(names: &[String]) -> Result<Vec<i32>, RfbClientError> {
    names
        .iter()
        .map(|name| {
            encoding_from_name(name)
                .ok_or_else(|| RfbClientError::Config(format!("Unknown encoding '{}'", name)))
        })
        .collect()
}

/// How the connection was made, as far as encoding choice cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkInfo {
    /// Server and client share an address.
    pub same_machine: bool,
    /// Traffic goes through a tunnel.
    pub tunneled: bool,
}

/// Build the SetEncodings list for a session.
pub fn build_encoding_list(
    config: &EncodingConfig,
    link: LinkInfo,
) -> Result<Vec<i32>, RfbClientError> {
    let mut list = EncodingList::default();

    match &config.list {
        Some(names) => {
            let tags = parse_encoding_list(names)?;
            let mut want_compress = false;
            let mut want_quality = false;
            let mut want_last_rect = false;

            for tag in tags {
                list.push(tag);
                match tag {
                    ENCODING_TIGHT => {
                        want_last_rect = true;
                        want_compress = true;
                        want_quality = config.jpeg;
                    }
                    ENCODING_ZLIB | ENCODING_ZLIBHEX => want_compress = true,
                    _ => {}
                }
            }

            if want_compress {
                if let Some(level) = config.compress_level.filter(|l| *l <= 9) {
                    list.push(compress_level(level));
                }
            }
            if want_quality {
                list.push(quality_level(usable_quality(config.quality_level)));
            }
            list.push_cursor_encodings();
            if want_last_rect {
                list.push(PSEUDO_ENCODING_LAST_RECT);
            }
        }
        None => {
            let preferred = if link.same_machine && !link.tunneled {
                tracing::info!("Same machine: preferring raw encoding");
                ENCODING_RAW
            } else {
                if link.same_machine {
                    tracing::info!("Tunneling active: preferring tight encoding");
                }
                ENCODING_TIGHT
            };

            list.push(PSEUDO_ENCODING_LAST_RECT);
            list.push(ENCODING_COPYRECT);
            list.push(preferred);
            for tag in SUPPORTED_ENCODINGS {
                if tag != preferred {
                    list.push(tag);
                }
            }

            match config.compress_level.filter(|l| *l <= 9) {
                Some(level) => list.push(compress_level(level)),
                None if !link.tunneled => list.push(compress_level(1)),
                None => {}
            }
            if config.jpeg {
                list.push(quality_level(usable_quality(config.quality_level)));
            }
            list.push_cursor_encodings();
        }
    }

    Ok(list.into_inner())
}

fn usable_quality(level: u8) -> u8 {
    if level <= 9 {
        level
    } else {
        FALLBACK_QUALITY
    }
}

/// Encoding list that silently drops entries past [`MAX_ENCODINGS`].
#[derive(Default)]
struct EncodingList(Vec<i32>);

impl EncodingList {
    fn push(&mut self, tag: i32) {
        if self.0.len() < MAX_ENCODINGS {
            self.0.push(tag);
        }
    }

    fn push_cursor_encodings(&mut self) {
        self.push(PSEUDO_ENCODING_X_CURSOR);
        self.push(PSEUDO_ENCODING_RICH_CURSOR);
        self.push(PSEUDO_ENCODING_POINTER_POS);
    }

    fn into_inner(self) -> Vec<i32> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> EncodingConfig {
        EncodingConfig {
            list: Some(list.iter().map(|s| s.to_string()).collect()),
            ..EncodingConfig::default()
        }
    }

    #[test]
    fn test_default_list_prefers_tight() {
        let list = build_encoding_list(&EncodingConfig::default(), LinkInfo::default()).unwrap();
        assert_eq!(
            list,
            vec![
                PSEUDO_ENCODING_LAST_RECT,
                ENCODING_COPYRECT,
                ENCODING_TIGHT,
                ENCODING_ZRLE,
                ENCODING_HEXTILE,
                ENCODING_CORRE,
                ENCODING_RRE,
                ENCODING_RAW,
                compress_level(4),
                quality_level(9),
                PSEUDO_ENCODING_X_CURSOR,
                PSEUDO_ENCODING_RICH_CURSOR,
                PSEUDO_ENCODING_POINTER_POS,
            ]
        );
    }

    #[test]
    fn test_same_machine_prefers_raw() {
        let link = LinkInfo {
            same_machine: true,
            tunneled: false,
        };
        let list = build_encoding_list(&EncodingConfig::default(), link).unwrap();
        assert_eq!(&list[..4], &[
            PSEUDO_ENCODING_LAST_RECT,
            ENCODING_COPYRECT,
            ENCODING_RAW,
            ENCODING_ZRLE
        ]);
        assert_eq!(list.iter().filter(|&&t| t == ENCODING_RAW).count(), 1);
        assert!(list.contains(&ENCODING_TIGHT));
    }

    #[test]
    fn test_tunnel_keeps_tight_and_skips_fast_compression() {
        let link = LinkInfo {
            same_machine: true,
            tunneled: true,
        };
        let config = EncodingConfig {
            compress_level: None,
            jpeg: false,
            ..EncodingConfig::default()
        };
        let list = build_encoding_list(&config, link).unwrap();
        assert_eq!(list[2], ENCODING_TIGHT);
        assert!(!list.iter().any(|t| (-256..=-247).contains(t)));
        assert!(!list.iter().any(|t| (-32..=-23).contains(t)));
    }

    #[test]
    fn test_unset_compression_requests_level_one() {
        let config = EncodingConfig {
            compress_level: None,
            ..EncodingConfig::default()
        };
        let list = build_encoding_list(&config, LinkInfo::default()).unwrap();
        assert!(list.contains(&compress_level(1)));
    }

    #[test]
    fn test_explicit_list_with_tight() {
        let list = build_encoding_list(&names(&["Tight", "copyrect"]), LinkInfo::default())
            .unwrap();
        assert_eq!(
            list,
            vec![
                ENCODING_TIGHT,
                ENCODING_COPYRECT,
                compress_level(4),
                quality_level(9),
                PSEUDO_ENCODING_X_CURSOR,
                PSEUDO_ENCODING_RICH_CURSOR,
                PSEUDO_ENCODING_POINTER_POS,
                PSEUDO_ENCODING_LAST_RECT,
            ]
        );
    }

    #[test]
    fn test_explicit_list_without_tight_has_no_hints() {
        let list = build_encoding_list(&names(&["hextile", "raw"]), LinkInfo::default()).unwrap();
        assert_eq!(
            list,
            vec![
                ENCODING_HEXTILE,
                ENCODING_RAW,
                PSEUDO_ENCODING_X_CURSOR,
                PSEUDO_ENCODING_RICH_CURSOR,
                PSEUDO_ENCODING_POINTER_POS,
            ]
        );

        let list = build_encoding_list(&names(&["zlib"]), LinkInfo::default()).unwrap();
        assert_eq!(list[1], compress_level(4));
        assert!(!list.contains(&PSEUDO_ENCODING_LAST_RECT));
    }

    #[test]
    fn test_list_is_capped() {
        let many: Vec<&str> = std::iter::repeat("raw").take(25).collect();
        let list = build_encoding_list(&names(&many), LinkInfo::default()).unwrap();
        assert_eq!(list.len(), MAX_ENCODINGS);
        assert!(list.iter().all(|&t| t == ENCODING_RAW));

        let mut near: Vec<&str> = std::iter::repeat("raw").take(18).collect();
        near.push("tight");
        let list = build_encoding_list(&names(&near), LinkInfo::default()).unwrap();
        assert_eq!(list.len(), MAX_ENCODINGS);
        assert_eq!(list[18], ENCODING_TIGHT);
        assert_eq!(list[19], compress_level(4));
    }

    #[test]
    fn test_unknown_and_prefix_names_rejected() {
        assert!(build_encoding_list(&names(&["raw", "bogus"]), LinkInfo::default()).is_err());
        assert!(parse_encoding_list(&["ti".to_string()]).is_err());
        assert_eq!(encoding_from_name("ZRLE"), Some(ENCODING_ZRLE));
        assert_eq!(encoding_from_name("zlibhex"), Some(ENCODING_ZLIBHEX));
    }
}
