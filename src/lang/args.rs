// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Readers for the arguments following a node keyword.

use log::warn;

use super::error::{PatchError, PatchResult};
use super::lexer::{Token, TokenStream};
use super::span::Location;

/// Volumes are given in percent and limited to this range.
pub const VOLUME_RANGE: (f64, f64) = (-200.0, 200.0);

/// Next token, which must exist.
pub fn next_arg(ts: &mut TokenStream, keyword: &Token, what: &str) -> PatchResult<Token> {
    ts.next().ok_or_else(|| PatchError::MissingArgument {
        keyword: keyword.text.clone(),
        what: what.to_owned(),
        location: keyword.location.clone(),
    })
}

pub fn parse_number(token: &Token, what: &str) -> PatchResult<f64> {
    parse_str(token.as_str(), token, what)
}

pub fn parse_str(text: &str, token: &Token, what: &str) -> PatchResult<f64> {
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(PatchError::InvalidNumber {
            token: token.text.clone(),
            what: what.to_owned(),
            location: token.location.clone(),
        }),
    }
}

pub fn number(ts: &mut TokenStream, keyword: &Token, what: &str) -> PatchResult<f64> {
    let token = next_arg(ts, keyword, what)?;
    parse_number(&token, what)
}

/// A number that is clamped into `[min, max]`, with a warning if that was necessary.
pub fn number_in(
    ts: &mut TokenStream,
    keyword: &Token,
    what: &str,
    min: f64,
    max: f64,
) -> PatchResult<f64> {
    let token = next_arg(ts, keyword, what)?;
    let value = parse_number(&token, what)?;
    Ok(clamp_warn(value, min, max, what, &token.location))
}

pub fn clamp_warn(value: f64, min: f64, max: f64, what: &str, location: &Location) -> f64 {
    let clamped = value.max(min).min(max);
    if clamped != value {
        warn!(
            "{}: {} {} out of range [{}, {}], using {}",
            location, what, value, min, max, clamped
        );
    }
    clamped
}

/// Parse a percentage into a gain factor.
pub fn parse_volume(text: &str, token: &Token) -> PatchResult<f64> {
    let percent = parse_str(text, token, "volume")?;
    let percent = clamp_warn(
        percent,
        VOLUME_RANGE.0,
        VOLUME_RANGE.1,
        "volume",
        &token.location,
    );
    Ok(percent / 100.0)
}

/// Parse `MS:PERCENT` into milliseconds and a gain factor.
pub fn parse_ms_vol(token: &Token) -> PatchResult<(f64, f64)> {
    let (ms, vol) = token
        .as_str()
        .split_once(':')
        .ok_or_else(|| PatchError::MalformedPair {
            token: token.text.clone(),
            expected: "ms:volume",
            location: token.location.clone(),
        })?;
    let ms = parse_str(ms, token, "duration in ms")?;
    if ms < 0.0 {
        return Err(PatchError::InvalidNumber {
            token: token.text.clone(),
            what: "duration in ms".to_owned(),
            location: token.location.clone(),
        });
    }
    Ok((ms, parse_volume(vol, token)?))
}

pub fn ms_vol(ts: &mut TokenStream, keyword: &Token) -> PatchResult<(f64, f64)> {
    let token = next_arg(ts, keyword, "ms:volume")?;
    parse_ms_vol(&token)
}

/// Consume the next token if it is one of `choices`.
pub fn choice(ts: &mut TokenStream, choices: &[&'static str]) -> Option<&'static str> {
    let found = choices
        .iter()
        .copied()
        .find(|choice| ts.peek().map_or(false, |t| t.as_str() == *choice))?;
    ts.next();
    Some(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str) -> Token {
        TokenStream::new("test", text).next().unwrap()
    }

    #[test]
    fn ms_vol_pairs() {
        assert_eq!(parse_ms_vol(&token("100:50")).unwrap(), (100.0, 0.5));
        assert_eq!(parse_ms_vol(&token("0:-300")).unwrap(), (0.0, -2.0));
        assert!(matches!(
            parse_ms_vol(&token("100")),
            Err(PatchError::MalformedPair { .. })
        ));
        assert!(matches!(
            parse_ms_vol(&token("x:10")),
            Err(PatchError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn numbers_are_finite_and_clamped() {
        let mut ts = TokenStream::new("test", "low 12 nan 500");
        let keyword = ts.next().unwrap();
        assert_eq!(number(&mut ts, &keyword, "x").unwrap(), 12.0);
        assert!(number(&mut ts, &keyword, "x").is_err());
        assert_eq!(number_in(&mut ts, &keyword, "x", 0.0, 100.0).unwrap(), 100.0);
        assert!(matches!(
            number(&mut ts, &keyword, "x"),
            Err(PatchError::MissingArgument { .. })
        ));
    }

    #[test]
    fn choices_leave_other_tokens() {
        let mut ts = TokenStream::new("test", "loop sin");
        assert_eq!(choice(&mut ts, &["once", "loop"]), Some("loop"));
        assert_eq!(choice(&mut ts, &["once", "loop"]), None);
        assert_eq!(ts.next().map(|t| t.text), Some("sin".to_owned()));
    }
}
