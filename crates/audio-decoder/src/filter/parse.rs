//! Filter chain description parser.
//!
//! Accepts a single chain: `name[=args][,name[=args]...]`, where args are
//! `:`-separated `key=value` or positional values. A backslash escapes the
//! next character and `'...'` quotes a literal run. `[label]` pads are
//! accepted and ignored.

use crate::error::FilterGraphError;

/// One parsed `name=args` element of the chain.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FilterSpec {
    pub(crate) name: String,
    pub(crate) args: Vec<FilterArg>,
    /// Byte offset of the filter name in the description.
    pub(crate) position: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FilterArg {
    pub(crate) key: Option<String>,
    pub(crate) value: String,
}

/// A character plus whether it was escaped or quoted.
#[derive(Clone, Copy, Debug)]
struct Sym {
    ch: char,
    literal: bool,
    pos: usize,
}

impl Sym {
    fn is(&self, ch: char) -> bool {
        !self.literal && self.ch == ch
    }

    fn is_space(&self) -> bool {
        !self.literal && self.ch.is_whitespace()
    }
}

fn parse_error(position: usize, message: impl Into<String>) -> FilterGraphError {
    FilterGraphError::Parse {
        position,
        message: message.into(),
    }
}

fn lex(desc: &str) -> Result<Vec<Sym>, FilterGraphError> {
    let mut syms = Vec::with_capacity(desc.len());
    let mut chars = desc.char_indices();
    let mut quote_start = None;
    while let Some((pos, ch)) = chars.next() {
        match (ch, quote_start) {
            ('\'', None) => quote_start = Some(pos),
            ('\'', Some(_)) => quote_start = None,
            (_, Some(_)) => syms.push(Sym {
                ch,
                literal: true,
                pos,
            }),
            ('\\', None) => {
                let (pos, ch) = chars
                    .next()
                    .ok_or_else(|| parse_error(pos, "trailing backslash"))?;
                syms.push(Sym {
                    ch,
                    literal: true,
                    pos,
                });
            }
            (_, None) => syms.push(Sym {
                ch,
                literal: false,
                pos,
            }),
        }
    }
    if let Some(pos) = quote_start {
        return Err(parse_error(pos, "unterminated quote"));
    }
    Ok(syms)
}

/// Remove `[label]` pads.
fn strip_labels(syms: Vec<Sym>) -> Result<Vec<Sym>, FilterGraphError> {
    let mut out = Vec::with_capacity(syms.len());
    let mut open = None;
    for sym in syms {
        match open {
            Some(_) if sym.is(']') => open = None,
            Some(_) => {}
            None if sym.is('[') => open = Some(sym.pos),
            None if sym.is(']') => return Err(parse_error(sym.pos, "unexpected ']'")),
            None => out.push(sym),
        }
    }
    if let Some(pos) = open {
        return Err(parse_error(pos, "unterminated pad label"));
    }
    Ok(out)
}

fn split(syms: &[Sym], sep: char) -> Vec<&[Sym]> {
    syms.split(|s| s.is(sep)).collect()
}

fn split_once(syms: &[Sym], sep: char) -> Option<(&[Sym], &[Sym])> {
    let idx = syms.iter().position(|s| s.is(sep))?;
    Some((&syms[..idx], &syms[idx + 1..]))
}

fn trim(syms: &[Sym]) -> &[Sym] {
    let start = syms.iter().position(|s| !s.is_space()).unwrap_or(syms.len());
    let end = syms
        .iter()
        .rposition(|s| !s.is_space())
        .map_or(start, |i| i + 1);
    &syms[start..end]
}

fn text(syms: &[Sym]) -> String {
    syms.iter().map(|s| s.ch).collect()
}

fn parse_args(syms: &[Sym]) -> Vec<FilterArg> {
    split(syms, ':')
        .into_iter()
        .map(|arg| match split_once(arg, '=') {
            Some((key, value)) => FilterArg {
                key: Some(text(trim(key))),
                value: text(trim(value)),
            },
            None => FilterArg {
                key: None,
                value: text(trim(arg)),
            },
        })
        .collect()
}

pub(crate) fn parse_chain(desc: &str) -> Result<Vec<FilterSpec>, FilterGraphError> {
    let syms = strip_labels(lex(desc)?)?;
    if let Some(sym) = syms.iter().find(|s| s.is(';')) {
        return Err(parse_error(sym.pos, "only a single filter chain is supported"));
    }
    if trim(&syms).is_empty() {
        return Err(parse_error(0, "empty filter description"));
    }

    let mut specs = Vec::new();
    let mut offset = 0;
    for segment in split(&syms, ',') {
        let seg = trim(segment);
        let Some(first) = seg.first() else {
            let position = segment.first().map_or(offset, |s| s.pos);
            return Err(parse_error(position, "empty filter in chain"));
        };
        offset = seg.last().map_or(offset, |s| s.pos + s.ch.len_utf8());

        let (name, args) = match split_once(seg, '=') {
            Some((name, args)) => (trim(name), parse_args(args)),
            None => (seg, Vec::new()),
        };
        let name_text = text(name);
        if name_text.is_empty() {
            return Err(parse_error(first.pos, "missing filter name"));
        }
        if let Some(bad) = name
            .iter()
            .find(|s| !(s.ch.is_ascii_alphanumeric() || s.ch == '_'))
        {
            return Err(parse_error(
                bad.pos,
                format!("invalid character '{}' in filter name", bad.ch),
            ));
        }
        specs.push(FilterSpec {
            name: name_text,
            args,
            position: first.pos,
        });
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(key: Option<&str>, value: &str) -> FilterArg {
        FilterArg {
            key: key.map(str::to_string),
            value: value.to_string(),
        }
    }

    #[test]
    fn parses_chain_with_named_and_positional_args() {
        let specs = parse_chain("volume=0.5, aecho=0.8:0.9:1000|1800:0.3|0.25,anull").unwrap();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].name, "volume");
        assert_eq!(specs[0].args, vec![arg(None, "0.5")]);
        assert_eq!(specs[1].name, "aecho");
        assert_eq!(specs[1].position, 12);
        assert_eq!(specs[1].args[2], arg(None, "1000|1800"));
        assert!(specs[2].args.is_empty());
    }

    #[test]
    fn key_value_args_and_whitespace() {
        let specs = parse_chain(" alimiter = limit=0.5 : release=20 ").unwrap();
        assert_eq!(specs[0].name, "alimiter");
        assert_eq!(
            specs[0].args,
            vec![arg(Some("limit"), "0.5"), arg(Some("release"), "20")]
        );
    }

    #[test]
    fn escapes_and_quotes_are_literal() {
        let specs = parse_chain(r"volume=volume='-6dB\,x':eval=once\:now").unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].args[0], arg(Some("volume"), r"-6dB\,x"));
        assert_eq!(specs[0].args[1], arg(Some("eval"), "once:now"));
    }

    #[test]
    fn labels_are_ignored() {
        let specs = parse_chain("[in]volume=2[out]").unwrap();
        assert_eq!(specs[0].name, "volume");
        assert_eq!(specs[0].args, vec![arg(None, "2")]);
    }

    #[test]
    fn rejects_malformed_descriptions() {
        let err = parse_chain("volume=1;anull").unwrap_err();
        assert!(matches!(err, FilterGraphError::Parse { position: 8, .. }));
        assert!(matches!(
            parse_chain("volume,,anull"),
            Err(FilterGraphError::Parse { .. })
        ));
        assert!(matches!(
            parse_chain("   "),
            Err(FilterGraphError::Parse { position: 0, .. })
        ));
        assert!(matches!(
            parse_chain("volume='1"),
            Err(FilterGraphError::Parse { position: 7, .. })
        ));
        assert!(matches!(
            parse_chain("vol ume"),
            Err(FilterGraphError::Parse { position: 3, .. })
        ));
        assert!(matches!(
            parse_chain("[in volume"),
            Err(FilterGraphError::Parse { .. })
        ));
        assert!(matches!(
            parse_chain("anull\\"),
            Err(FilterGraphError::Parse { .. })
        ));
    }
}
